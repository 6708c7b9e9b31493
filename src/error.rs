use crate::types::Format;
use std::time::Duration;

/// Failures surfaced by the ALEPE client. Every variant maps to a stable
/// `kind()` code that ends up in the failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("could not reach the ALEPE API after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: u32 },

    #[error("request to the ALEPE API timed out after {attempts} attempt(s) ({timeout:?} per attempt)")]
    Timeout { timeout: Duration, attempts: u32 },

    #[error("ALEPE API rejected the request (HTTP {status}): {message}")]
    RemoteClient {
        status: u16,
        message: String,
        attempts: u32,
    },

    #[error("ALEPE API failed after {attempts} attempt(s) (HTTP {status}): {message}")]
    RemoteServer {
        status: u16,
        message: String,
        attempts: u32,
    },

    #[error("response is not valid {format}: {message}")]
    Decode { format: Format, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Network { .. } => "network_error",
            ApiError::Timeout { .. } => "timeout",
            ApiError::RemoteClient { .. } => "remote_client_error",
            ApiError::RemoteServer { .. } => "remote_server_error",
            ApiError::Decode { .. } => "decode_error",
        }
    }

    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::RemoteServer { .. }
        )
    }

    /// HTTP status received from the remote API, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RemoteClient { status, .. } | ApiError::RemoteServer { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            ApiError::Network { attempts, .. }
            | ApiError::Timeout { attempts, .. }
            | ApiError::RemoteClient { attempts, .. }
            | ApiError::RemoteServer { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn with_attempts(mut self, n: u32) -> Self {
        match &mut self {
            ApiError::Network { attempts, .. }
            | ApiError::Timeout { attempts, .. }
            | ApiError::RemoteClient { attempts, .. }
            | ApiError::RemoteServer { attempts, .. } => *attempts = n,
            _ => {}
        }
        self
    }
}
