/// Resilient JSON fetcher for the SIATA API.
///
/// Every GET goes through `fetch_json`, which applies a bounded retry loop
/// with exponential backoff (`base^(attempt-1)` seconds, no jitter).
/// Not-found is permanent and never retried; other error statuses,
/// transport failures and undecodable bodies are transient and retried
/// until `max_attempts` is reached.

use log::{error, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::config::EtlConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransientCause {
    /// Non-success, non-404 HTTP status.
    Status(u16),
    /// Connection, timeout or body read failure.
    Network(String),
    /// Body was not valid JSON.
    Malformed(String),
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientCause::Status(code) => write!(f, "HTTP status {}", code),
            TransientCause::Network(msg) => write!(f, "network error: {}", msg),
            TransientCause::Malformed(msg) => write!(f, "malformed JSON: {}", msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource does not exist upstream. Not retried.
    #[error("{url} returned 404 Not Found")]
    NotFound { url: String },
    /// Every attempt failed.
    #[error("{url} failed after {attempts} attempt(s): {cause}")]
    Transient {
        url: String,
        attempts: u32,
        cause: TransientCause,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            backoff_base: config.backoff_base,
        }
    }

    /// Wait after failed attempt `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent)).unwrap_or(Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Fetch seam
// ---------------------------------------------------------------------------

/// GET a URL and decode its body as JSON.
pub trait Fetch: Send + Sync {
    fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError>;
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// `Fetch` over a blocking reqwest client. Retry waits block the calling
/// worker thread only.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("siata_etl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            policy,
            sleeper: Arc::new(thread::sleep),
        })
    }

    pub fn from_config(config: &EtlConfig) -> Result<Self, reqwest::Error> {
        Self::new(RetryPolicy::from_config(config))
    }

    /// Replaces the backoff sleep, e.g. to record delays in tests.
    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn attempt(&self, url: &str, timeout: Duration) -> Result<Value, Attempt> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .map_err(|e| Attempt::Retry(TransientCause::Network(e.to_string())))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Attempt::NotFound);
        }
        if !status.is_success() {
            return Err(Attempt::Retry(TransientCause::Status(status.as_u16())));
        }

        let body = response
            .text()
            .map_err(|e| Attempt::Retry(TransientCause::Network(e.to_string())))?;

        serde_json::from_str(&body)
            .map_err(|e| Attempt::Retry(TransientCause::Malformed(e.to_string())))
    }
}

enum Attempt {
    NotFound,
    Retry(TransientCause),
}

impl Fetch for HttpFetcher {
    fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(url, timeout) {
                Ok(value) => return Ok(value),
                Err(Attempt::NotFound) => {
                    warn!("{} returned 404, not retrying", url);
                    return Err(FetchError::NotFound {
                        url: url.to_string(),
                    });
                }
                Err(Attempt::Retry(cause)) => {
                    warn!(
                        "request {} attempt {}/{} failed: {}",
                        url, attempt, max_attempts, cause
                    );
                    if attempt >= max_attempts {
                        error!("giving up on {} after {} attempts: {}", url, attempt, cause);
                        return Err(FetchError::Transient {
                            url: url.to_string(),
                            attempts: attempt,
                            cause,
                        });
                    }
                    (self.sleeper)(self.policy.delay_after(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
