//! Resilient HTTP fetch layer
//!
//! This module owns every request sent to the statistics API:
//! - A process-wide throttle spacing request starts
//! - Bounded retries with `Retry-After` support and exponential backoff
//! - JSON decoding, where an empty body or `null` means "no data"
//! - Cooperative interruption through [`StopSignal`]

mod retry;
mod stop;
mod throttle;

pub use retry::{is_retryable_status, parse_retry_after, retry_after, RetryPolicy, MAX_RETRY_DELAY};
pub use stop::StopSignal;
pub use throttle::Throttle;

use crate::config::HttpConfig;
use crate::ErrorKind;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Floor applied to the configured request timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the fetch layer
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Network error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Retries exhausted for {url} after {attempts} attempts (last status {last_status})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_status: u16,
    },

    #[error("Interrupted by stop request")]
    Interrupted,
}

impl FetchError {
    /// Classifies this error within the crawler's failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => ErrorKind::TransientNetwork,
            Self::Status { status, .. }
            | Self::RetriesExhausted {
                last_status: status,
                ..
            } => status_kind(*status),
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::Interrupted => ErrorKind::Interrupted,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { last_status, .. } => Some(*last_status),
            _ => None,
        }
    }

    fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport { source, .. } => !source.is_builder() && !source.is_redirect(),
            _ => false,
        }
    }
}

fn status_kind(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::RemoteServerError,
        _ => ErrorKind::RemoteClientError,
    }
}

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// What a single attempt produced
enum Attempt<T> {
    Done(Option<T>),
    Retry {
        error: FetchError,
        wait: Option<Duration>,
    },
}

/// Builds the shared HTTP client
///
/// # Arguments
///
/// * `config` - The HTTP adapter configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.timeout_secs).max(MIN_TIMEOUT);

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Throttled, retrying JSON client
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    throttle: Throttle,
    policy: RetryPolicy,
    stop: StopSignal,
}

impl ApiClient {
    /// Creates a client from configuration
    pub fn new(config: &HttpConfig, stop: StopSignal) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let policy = RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        );
        Ok(Self::with_parts(
            client,
            Throttle::new(Duration::from_millis(config.request_delay_ms)),
            policy,
            stop,
        ))
    }

    /// Assembles a client from prebuilt parts
    pub fn with_parts(client: Client, throttle: Throttle, policy: RetryPolicy, stop: StopSignal) -> Self {
        Self {
            client,
            throttle,
            policy,
            stop,
        }
    }

    /// Fetches `url` and decodes its JSON body
    ///
    /// # Request Flow
    ///
    /// 1. Check the stop flag, then wait for a throttle slot
    /// 2. Send the GET request
    /// 3. On success, decode the body (`None` for an empty body or `null`)
    /// 4. On a retryable failure, wait and go back to 1
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | decode and return |
    /// | 429, 500, 502, 503, 504 | retry after `Retry-After` or backoff |
    /// | Timeout, connection failure | retry after backoff |
    /// | Any other status | `Status` error, no retry |
    /// | Malformed JSON | `Decode` error, no retry |
    ///
    /// # Returns
    ///
    /// * `Ok(Some(T))` - Decoded payload
    /// * `Ok(None)` - The server answered with no data
    /// * `Err(FetchError)` - Non-retryable failure, exhaustion, or interruption
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> FetchResult<Option<T>> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if self.stop.is_requested() {
                return Err(FetchError::Interrupted);
            }
            self.throttle.acquire(&self.stop).await?;

            let (error, wait) = match self.attempt(url).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry { error, wait } => (error, wait),
            };

            if attempt >= self.policy.max_attempts {
                tracing::warn!("Giving up on {} after {} attempts: {}", url, attempt, error);
                return Err(match error {
                    FetchError::Status { url, status } => FetchError::RetriesExhausted {
                        url,
                        attempts: attempt,
                        last_status: status,
                    },
                    other => other,
                });
            }

            let delay = wait.unwrap_or_else(|| self.policy.backoff(attempt - 1));
            tracing::debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                self.policy.max_attempts,
                url,
                error,
                delay
            );
            self.stop.sleep(delay).await?;
        }
    }

    /// Sends one request and sorts the outcome into done, retry, or fail
    async fn attempt<T: DeserializeOwned>(&self, url: &str) -> FetchResult<Attempt<T>> {
        let response = match self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return retry_transport(url, e),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            if !is_retryable_status(status) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            let wait = retry_after(response.headers(), Utc::now());
            return Ok(Attempt::Retry {
                error: FetchError::Status {
                    url: url.to_string(),
                    status,
                },
                wait,
            });
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return retry_transport(url, e),
        };

        decode_body(url, &body).map(Attempt::Done)
    }
}

fn retry_transport<T>(url: &str, source: reqwest::Error) -> FetchResult<Attempt<T>> {
    let error = FetchError::from_transport(url, source);
    if error.is_transient() {
        Ok(Attempt::Retry { error, wait: None })
    } else {
        Err(error)
    }
}

/// Decodes a response body, treating blank bodies and `null` as no data
pub fn decode_body<T: DeserializeOwned>(url: &str, body: &[u8]) -> FetchResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}
