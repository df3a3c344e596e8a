//! Rate limiting and retry logic for external API calls
//!
//! Keeps the metadata refresh within the source's request quota and
//! retries transient source failures with exponential backoff.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::services::metadata::MetadataError;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst_size: 10,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    /// Create a new rate-limited client
    pub fn new(name: &str, config: RateLimitConfig) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = Arc::new(RateLimiter::direct(quota));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("penguin/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter,
            name: name.to_string(),
        })
    }

    /// Wait for rate limit and make a GET request with query parameters
    pub async fn get_with_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request with query");

        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Backoff schedule for source requests that failed transiently
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per request, the first one included
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Run a source request, repeating it while it fails with
/// [`MetadataError::Transient`]. Any other outcome is returned as is.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    video_id: &str,
    attempt: F,
) -> Result<T, MetadataError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, MetadataError>>,
{
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let reason = match attempt().await {
            Err(MetadataError::Transient(reason)) => reason,
            outcome => return outcome,
        };

        if attempts >= policy.max_attempts {
            warn!(video_id = %video_id, attempts, reason = %reason, "Giving up on metadata request");
            return Err(MetadataError::Transient(reason));
        }

        let Some(delay) = backoff.next_backoff() else {
            return Err(MetadataError::Transient(reason));
        };
        debug!(
            video_id = %video_id,
            attempt = attempts,
            reason = %reason,
            retry_in_ms = delay.as_millis() as u64,
            "Metadata request failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Statuses worth another attempt: rate limiting, timeouts and server errors.
/// A 403 is how the API reports an exhausted daily quota and is not retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, 5);
        assert_eq!(config.burst_size, 10);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_transient_failures_stop_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), MetadataError> = retry_transient(&fast_retry(), "v", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(MetadataError::Transient("503".to_string()))
        })
        .await;

        assert_eq!(result, Err(MetadataError::Transient("503".to_string())));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), MetadataError> = retry_transient(&fast_retry(), "v", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(MetadataError::NotFound)
        })
        .await;

        assert_matches!(result, Err(MetadataError::NotFound));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_transient(&fast_retry(), "v", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err(MetadataError::Transient("flaky".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_zero_quota_falls_back_to_minimum() {
        let client = RateLimitedClient::new(
            "test",
            RateLimitConfig {
                requests_per_second: 0,
                burst_size: 0,
            },
        )
        .unwrap();
        client.wait_for_permit().await;
    }
}
