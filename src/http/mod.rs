pub mod rate_limit;
pub mod retry;

use crate::config::Settings;
use crate::error::ApiError;
use crate::types::{
    Endpoint, Filters, Format, HealthReport, HealthStatus, Payload, Record, RequestSpec,
    ResultEnvelope, Target,
};
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

pub use rate_limit::RateLimiter;
pub use retry::{Attempt, RetryFailure, RetryPolicy};

const ERROR_BODY_LIMIT: usize = 200;

/// Raw answer of one HTTP exchange, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

/// Accept is set per request from the requested format.
pub fn build_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent())
        .timeout(settings.timeout())
        .gzip(true)
        .use_rustls_tls()
        .build()
}

pub fn encode_path_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Pull the remote API's own message out of an error body when it has one.
pub fn remote_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "mensagem", "error", "erro", "detail"] {
            if let Some(msg) = obj.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

pub fn map_status_to_error(status: StatusCode, body: &str) -> ApiError {
    let message = remote_message(status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ApiError::RemoteServer {
            status: status.as_u16(),
            message,
            attempts: 1,
        }
    } else {
        ApiError::RemoteClient {
            status: status.as_u16(),
            message,
            attempts: 1,
        }
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration, attempt: u32) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout {
            timeout,
            attempts: attempt,
        }
    } else {
        ApiError::Network {
            message: err.to_string(),
            attempts: attempt,
        }
    }
}

pub fn classify(raw: RawResponse) -> Attempt<RawResponse, ApiError> {
    if raw.status.is_success() {
        return Attempt::Success(raw);
    }
    let err = map_status_to_error(raw.status, &raw.body);
    if err.is_retryable() {
        Attempt::Retryable(err)
    } else {
        Attempt::Terminal(err)
    }
}

/// Decode a 2xx body according to the requested format.
pub fn decode(format: Format, raw: RawResponse) -> Result<Payload, ApiError> {
    let decode_err = |message: String| ApiError::Decode { format, message };
    match format {
        Format::Json => {
            let value: Value =
                serde_json::from_str(&raw.body).map_err(|e| decode_err(e.to_string()))?;
            match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Value::Object(record) => Ok(record),
                        other => Err(decode_err(format!(
                            "item {} is {} rather than an object",
                            i,
                            json_type(&other)
                        ))),
                    })
                    .collect::<Result<Vec<Record>, _>>()
                    .map(Payload::Records),
                Value::Object(record) => Ok(Payload::Records(vec![record])),
                other => Err(decode_err(format!(
                    "expected a list of records, got {}",
                    json_type(&other)
                ))),
            }
        }
        Format::Csv => {
            if raw
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
            {
                return Err(decode_err(format!(
                    "expected delimited text, got content type {}",
                    raw.content_type.unwrap_or_default()
                )));
            }
            Ok(Payload::Text(raw.body))
        }
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Client for the ALEPE open-data API: rate limiting, retries and response
/// normalization around one shared connection pool.
#[derive(Debug)]
pub struct AlepeClient {
    http: Client,
    settings: Settings,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl AlepeClient {
    pub fn new(settings: Settings) -> reqwest::Result<Self> {
        let http = build_client(&settings)?;
        let limiter = RateLimiter::per_minute(settings.rate_limit());
        let retry = RetryPolicy::new(settings.max_retries(), settings.retry_delay());
        info!(
            "ALEPE client ready: base_url={} rate_limit={}/min max_retries={}",
            settings.base_url(),
            settings.rate_limit(),
            settings.max_retries()
        );
        Ok(Self {
            http,
            settings,
            limiter,
            retry,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Tool-facing entry point. Never fails: every problem becomes a failure envelope.
    pub async fn request(
        &self,
        endpoint: &str,
        format: &str,
        filters: Filters,
    ) -> ResultEnvelope {
        match RequestSpec::parse(endpoint, format, filters, false) {
            Ok(spec) => self.execute(&spec).await,
            Err(err) => {
                warn!("rejected request for '{}': {}", endpoint, err);
                ResultEnvelope::failure(&err)
            }
        }
    }

    pub async fn execute(&self, spec: &RequestSpec) -> ResultEnvelope {
        match self.fetch(spec).await {
            Ok(payload) => ResultEnvelope::success(spec, payload),
            Err(err) => ResultEnvelope::failure(&err),
        }
    }

    pub async fn fetch(&self, spec: &RequestSpec) -> Result<Payload, ApiError> {
        let url = self.build_url(spec)?;
        let request_id = Uuid::new_v4();
        let label = format!("[{}] GET /{}", request_id, spec.target.path());
        info!("{} format={} filters={:?}", label, spec.format, spec.filters);

        let started = Instant::now();
        let url = &url;
        let outcome = self
            .retry
            .execute(&label, move |attempt| async move {
                // Every attempt, retries included, spends a permit.
                self.limiter.acquire().await;
                self.send_once(url, spec.format, attempt).await
            })
            .await;
        let raw = match outcome {
            Ok(raw) => raw,
            Err(failure) => {
                let err = failure.error.with_attempts(failure.attempts);
                warn!("{} failed: {}", label, err);
                return Err(err);
            }
        };

        let payload = decode(spec.format, raw).inspect_err(|e| warn!("{} {}", label, e))?;
        info!(
            "{} ok: {} record(s) in {:?}",
            label,
            payload.record_count(),
            started.elapsed()
        );
        Ok(payload)
    }

    /// One bounded request to a known-good endpoint, no retries. Never waits
    /// for the rate limiter: an exhausted budget reports unhealthy at once.
    pub async fn health_check(&self) -> HealthReport {
        let spec = RequestSpec::new(Endpoint::Parlamentares, Format::Json);
        let url = match self.build_url(&spec) {
            Ok(url) => url,
            Err(err) => return self.unhealthy(false, None, err.to_string(), Duration::ZERO),
        };
        if !self.limiter.try_acquire() {
            warn!("health check skipped: rate limit exhausted");
            let message = format!(
                "rate limited: {} request(s) already made in the current {}s window",
                self.limiter.limit(),
                self.limiter.window().as_secs()
            );
            return self.unhealthy(false, None, message, Duration::ZERO);
        }

        let started = Instant::now();
        let attempt = self.send_once(&url, spec.format, 1).await;
        let latency = started.elapsed();
        match attempt {
            Attempt::Success(raw) => self.health_report(
                HealthStatus::Healthy,
                true,
                Some(raw.status.as_u16()),
                None,
                latency,
            ),
            Attempt::Retryable(err) | Attempt::Terminal(err) => {
                warn!("health check failed: {}", err);
                self.unhealthy(err.status().is_some(), err.status(), err.to_string(), latency)
            }
        }
    }

    fn unhealthy(
        &self,
        reachable: bool,
        http_status: Option<u16>,
        error: String,
        latency: Duration,
    ) -> HealthReport {
        self.health_report(HealthStatus::Unhealthy, reachable, http_status, Some(error), latency)
    }

    fn health_report(
        &self,
        status: HealthStatus,
        reachable: bool,
        http_status: Option<u16>,
        error: Option<String>,
        latency: Duration,
    ) -> HealthReport {
        HealthReport {
            status,
            reachable,
            latency_seconds: (latency.as_secs_f64() * 1000.0).round() / 1000.0,
            api_url: self.settings.base_url().to_string(),
            http_status,
            error,
            checked_at: chrono::Utc::now().to_rfc3339(),
            available_endpoints: Endpoint::names(),
        }
    }

    pub fn build_url(&self, spec: &RequestSpec) -> Result<Url, ApiError> {
        let path = match &spec.target {
            Target::Known(endpoint) => endpoint.name().to_string(),
            Target::Passthrough(path) => path
                .split('/')
                .map(encode_path_segment)
                .collect::<Vec<_>>()
                .join("/"),
        };
        let mut url = Url::parse(&format!("{}/{}", self.settings.base_url(), path))
            .map_err(|e| ApiError::validation(format!("cannot build request URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("formato", spec.format.as_str());
            for (key, value) in &spec.filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send_once(
        &self,
        url: &Url,
        format: Format,
        attempt: u32,
    ) -> Attempt<RawResponse, ApiError> {
        debug!("attempt {}: GET {}", attempt, url);
        let timeout = self.settings.timeout();
        let exchange = async {
            let res = self
                .http
                .get(url.clone())
                .header(ACCEPT, format.accept())
                .send()
                .await?;
            let status = res.status();
            let content_type = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = res.text().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                content_type,
                body,
            })
        };
        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => Attempt::Retryable(ApiError::Timeout {
                timeout,
                attempts: attempt,
            }),
            Ok(Err(e)) => Attempt::Retryable(transport_error(e, timeout, attempt)),
            Ok(Ok(raw)) => {
                debug!("attempt {}: HTTP {}", attempt, raw.status);
                classify(raw)
            }
        }
    }
}

impl Drop for AlepeClient {
    fn drop(&mut self) {
        debug!("ALEPE client closed");
    }
}
