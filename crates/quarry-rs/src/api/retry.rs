//! Bounded retries with exponential backoff.
//!
//! Used in two places: around reasoning-backend calls, where only transient
//! HTTP/network failures are retried, and by the tool dispatcher, where a
//! tool's own [`RetryConfig`] decides how often a failed invocation is
//! attempted again.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget and backoff curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means fail on the first error.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Scale each delay by a fixed per-attempt factor below 1.0.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff curve with `retries` retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Same budget, different first delay. Mostly useful in tests.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Total attempts this config allows, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        // Deterministic spread; no rand dependency for four constants.
        let factor = [0.75, 0.90, 0.60, 0.85][(attempt % 4) as usize];
        Duration::from_secs_f64(capped * factor)
    }
}

/// Whether an error message describes a failure worth retrying: throttling,
/// 5xx responses, and dropped or slow connections.
pub fn is_transient_error(error: &str) -> bool {
    if ["429", "500", "502", "503", "504"]
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }

    let lower = error.to_lowercase();
    [
        "request failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an error message describes a failure that will repeat no matter
/// how often it is retried (bad request, bad credentials, missing route).
pub fn is_permanent_error(error: &str) -> bool {
    [
        "HTTP 400",
        "HTTP 401",
        "HTTP 403",
        "HTTP 404",
        "HTTP 422",
        "invalid",
        "bad request",
        "unauthorized",
    ]
    .iter()
    .any(|p| error.contains(p))
}

/// Run `call` until it succeeds, returns a non-transient error, or the retry
/// budget in `config` is spent. Returns the last error on failure.
pub async fn retry_transient<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e)
                if attempt < config.max_retries
                    && is_transient_error(&e)
                    && !is_permanent_error(&e) =>
            {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient backend error (attempt {}/{}): {e}. Retrying in {delay:?}",
                    attempt + 1,
                    config.max_attempts(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_surfaces_first_failure() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn delays_grow_until_capped() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        assert_eq!(d0, Duration::from_millis(500));
        assert_eq!(d1, Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(2));
    }

    #[test]
    fn jitter_never_lengthens_delay() {
        let jittered = RetryConfig::with_retries(3);
        let flat = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        for attempt in 0..4 {
            assert!(jittered.delay_for_attempt(attempt) <= flat.delay_for_attempt(attempt));
        }
    }

    #[test]
    fn classifies_errors() {
        assert!(is_transient_error("OpenRouter API HTTP 429: rate limited"));
        assert!(is_transient_error("OpenRouter API HTTP 503: overloaded"));
        assert!(is_transient_error("request failed: connection reset"));
        assert!(!is_transient_error("OpenRouter API HTTP 400: bad request"));
        assert!(!is_transient_error("no idea"));

        assert!(is_permanent_error("OpenRouter API HTTP 401: unauthorized"));
        assert!(!is_permanent_error("OpenRouter API HTTP 502: bad gateway"));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::with_retries(2).initial_delay(Duration::from_millis(1));
        let result = retry_transient(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("HTTP 503: busy".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::with_retries(3).initial_delay(Duration::from_millis(1));
        let result: Result<(), String> = retry_transient(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("OpenRouter API HTTP 401: unauthorized".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_is_respected() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::with_retries(2).initial_delay(Duration::from_millis(1));
        let result: Result<(), String> = retry_transient(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("request failed: connection refused".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
