use log::LevelFilter;
use reqwest::header::HeaderValue;
use std::env;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.alepe.pe.gov.br/api/v1";
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;
const DEFAULT_RATE_LIMIT: u32 = 60;
const ENV_PREFIX: &str = "ALEPE_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    // Also accepts WARNING and CRITICAL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "critical" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err("expected one of error, warn, info, debug, trace".into()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime settings for the ALEPE API client.
/// Built once at startup; read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    rate_limit: NonZeroU32,
    user_agent: String,
    log_level: LogLevel,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Env vars (each also accepted with an `ALEPE_` prefix, which wins):
    /// - BASE_URL (default: https://dadosabertos.alepe.pe.gov.br/api/v1)
    /// - TIMEOUT seconds, float (default: 30.0)
    /// - MAX_RETRIES (default: 3)
    /// - RETRY_DELAY seconds, float (default: 1.0)
    /// - RATE_LIMIT_REQUESTS per 60s window (default: 60)
    /// - LOG_LEVEL (default: info)
    /// - USER_AGENT (default: alepe-mcp/<version> (Data Access Tool))
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(prefixed(|name| env::var(name).ok()))
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = match get("BASE_URL") {
            Some(v) => parse_base_url(&v)?,
            None => DEFAULT_BASE_URL.to_string(),
        };
        let timeout = match get("TIMEOUT") {
            Some(v) => parse_seconds("TIMEOUT", &v, false)?,
            None => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        };
        let max_retries = match get("MAX_RETRIES") {
            Some(v) => v.trim().parse::<u32>().map_err(|_| {
                ConfigError::invalid("MAX_RETRIES", &v, "expected a non-negative integer")
            })?,
            None => DEFAULT_MAX_RETRIES,
        };
        let retry_delay = match get("RETRY_DELAY") {
            Some(v) => parse_seconds("RETRY_DELAY", &v, true)?,
            None => Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
        };
        let rate_limit = match get("RATE_LIMIT_REQUESTS") {
            Some(v) => parse_rate_limit(&v)?,
            None => NonZeroU32::new(DEFAULT_RATE_LIMIT).unwrap_or(NonZeroU32::MIN),
        };
        let log_level = match get("LOG_LEVEL") {
            Some(v) => v
                .parse::<LogLevel>()
                .map_err(|reason| ConfigError::invalid("LOG_LEVEL", &v, reason))?,
            None => LogLevel::Info,
        };
        let user_agent = match get("USER_AGENT") {
            Some(v) => {
                HeaderValue::from_str(&v).map_err(|_| {
                    ConfigError::invalid("USER_AGENT", &v, "not a valid HTTP header value")
                })?;
                v
            }
            None => default_user_agent(),
        };

        Ok(Self {
            base_url,
            timeout,
            max_retries,
            retry_delay,
            rate_limit,
            user_agent,
            log_level,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-attempt request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Base delay of the exponential backoff.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Requests admitted per rolling 60 second window.
    pub fn rate_limit(&self) -> NonZeroU32 {
        self.rate_limit
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            rate_limit: NonZeroU32::new(DEFAULT_RATE_LIMIT).unwrap_or(NonZeroU32::MIN),
            user_agent: default_user_agent(),
            log_level: LogLevel::Info,
        }
    }
}

/// Resolve `KEY` as `ALEPE_KEY`, falling back to `KEY`. Blank values are skipped
/// so an empty prefixed variable does not mask the plain one.
fn prefixed<F>(raw: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |key| {
        let non_blank = |name: &str| raw(name).filter(|v| !v.trim().is_empty());
        non_blank(&format!("{ENV_PREFIX}{key}")).or_else(|| non_blank(key))
    }
}

fn default_user_agent() -> String {
    format!("alepe-mcp/{} (Data Access Tool)", env!("CARGO_PKG_VERSION"))
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::invalid("BASE_URL", raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "BASE_URL",
            raw,
            "scheme must be http or https",
        ));
    }
    if url.query().is_some() {
        return Err(ConfigError::invalid(
            "BASE_URL",
            raw,
            "must not carry a query string",
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_seconds(key: &'static str, raw: &str, allow_zero: bool) -> Result<Duration, ConfigError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, raw, "expected a number of seconds"))?;
    if secs < 0.0 || (!allow_zero && secs == 0.0) {
        let reason = if allow_zero {
            "must not be negative"
        } else {
            "must be greater than zero"
        };
        return Err(ConfigError::invalid(key, raw, reason));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(key, raw, e.to_string()))
}

fn parse_rate_limit(raw: &str) -> Result<NonZeroU32, ConfigError> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid("RATE_LIMIT_REQUESTS", raw, "expected an integer"))?;
    u32::try_from(n)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| {
            ConfigError::invalid(
                "RATE_LIMIT_REQUESTS",
                raw,
                "must be a positive number of requests per minute",
            )
        })
}
