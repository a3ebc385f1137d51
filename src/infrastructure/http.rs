//! Page fetching with bounded exponential backoff and optional
//! per-storefront rate limiting.

use crate::error::FetchError;
use crate::infrastructure::CancelSignal;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{clock::DefaultClock, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt-1)`, capped, with +/-25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped = computed.min(self.max_delay_ms);
        let jitter = rand::random::<f64>() * 0.5 + 0.75;
        Duration::from_millis((capped as f64 * jitter) as u64)
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error,
/// or runs out of retries. Cancellation during a backoff sleep yields
/// [`FetchError::Cancelled`] rather than the error that caused the retry.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient fetch error, retrying after backoff"
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        debug!(error = %err, "Run cancelled during backoff");
                        return Err(FetchError::Cancelled);
                    }
                }
            }
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared HTTP front for all storefront adapters.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    policy: RetryPolicy,
    cancel: CancelSignal,
    limiter: Option<Arc<DirectLimiter>>,
}

impl PageFetcher {
    pub fn new(client: Client, policy: RetryPolicy, cancel: CancelSignal) -> Self {
        Self {
            client,
            policy,
            cancel,
            limiter: None,
        }
    }

    /// Every request, retries included, waits for a permit from `quota`.
    pub fn with_rate_limit(mut self, quota: Quota) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(quota)));
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        retry_with_backoff(&self.policy, &self.cancel, || self.get_once(url)).await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
            }
        }

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e.status().map(|s| s.as_u16()), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::network(
                url,
                Some(status.as_u16()),
                format!("HTTP status {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::network(url, None, e))
    }
}
