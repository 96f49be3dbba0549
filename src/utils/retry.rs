//! Retry utilities with exponential backoff for feed requests.
//!
//! Retries only happen inside a single fetch. Once attempts run out the
//! transient error is handed back to the cycle, which gives up until the
//! next scheduled run.

use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::sources::FetchError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 disables retrying)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum total time to spend on retries (including delays)
    pub max_total_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// A config that tries exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay.min(self.max_delay);
        }
        let exp_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(attempt as f64 - 1.0);
        Duration::from_secs_f64(exp_delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Network connectivity issues, timeouts and 5xx responses
    Network,
    /// Rate limit exceeded (with optional retry-after seconds)
    RateLimit(Option<u64>),
}

impl TransientError {
    /// Check if a reqwest error represents a transient error
    pub fn from_reqwest_error(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Some(TransientError::Network);
        }

        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Some(TransientError::RateLimit(None));
            }
            if status.is_server_error() {
                return Some(TransientError::Network);
            }
        }

        None
    }

    /// Check if a FetchError represents a transient error
    pub fn from_fetch_error(err: &FetchError) -> Option<Self> {
        match err {
            FetchError::Transient(_) => Some(TransientError::Network),
            FetchError::RateLimited { retry_after } => Some(TransientError::RateLimit(*retry_after)),
            FetchError::Parse(_) | FetchError::InvalidRequest(_) => None,
        }
    }

    /// Minimum delay the source asked for, if any
    pub fn recommended_delay(&self) -> Option<Duration> {
        match self {
            TransientError::RateLimit(Some(seconds)) => Some(Duration::from_secs(*seconds + 1)),
            TransientError::RateLimit(None) => Some(Duration::from_secs(5)),
            TransientError::Network => None,
        }
    }
}

/// Execute an async fetch operation with retry logic
///
/// Permanent errors (parse, invalid request) are returned immediately.
/// Transient errors are retried with exponential backoff until
/// `max_attempts` or `max_total_time` is reached.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let mut attempts = 0;
    let mut total_elapsed = Duration::ZERO;
    let mut operation = operation;
    let max_attempts = config.max_attempts.max(1);

    loop {
        attempts += 1;

        let error = match timeout(config.max_total_time, operation()).await {
            Ok(Ok(result)) => {
                if attempts > 1 {
                    tracing::info!(
                        "Fetch succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Ok(Err(error)) => error,
            Err(_) => FetchError::Transient("operation timed out".to_string()),
        };

        let Some(transient) = TransientError::from_fetch_error(&error) else {
            return Err(error);
        };

        let mut delay = config.backoff_delay(attempts);
        if let Some(recommended) = transient.recommended_delay() {
            delay = delay.max(recommended);
        }
        total_elapsed += delay;

        if attempts >= max_attempts || total_elapsed >= config.max_total_time {
            tracing::warn!(
                "Fetch failed after {} attempts (total backoff: {:?}): {}",
                attempts,
                total_elapsed,
                error
            );
            return Err(error);
        }

        tracing::debug!(
            "Transient error on attempt {}: {:?}, retrying in {:?}",
            attempts,
            transient,
            delay
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(4), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count < 3 {
                        Err(FetchError::Transient("connection reset".to_string()))
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<(), FetchError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(3), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(FetchError::Transient("down".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(FetchError::Transient(_))));
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_parse_error_immediately() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<(), FetchError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(5), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(FetchError::Parse("not a feed".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(FetchError::Parse(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn test_transient_error_detection() {
        let rate_limited = FetchError::RateLimited { retry_after: Some(30) };
        assert_eq!(
            TransientError::from_fetch_error(&rate_limited),
            Some(TransientError::RateLimit(Some(30)))
        );

        let network = FetchError::Transient("connection refused".to_string());
        assert!(TransientError::from_fetch_error(&network).is_some());

        let parse = FetchError::Parse("invalid xml".to_string());
        assert!(TransientError::from_fetch_error(&parse).is_none());
    }

    #[test]
    fn test_recommended_delay() {
        assert_eq!(
            TransientError::RateLimit(Some(30)).recommended_delay(),
            Some(Duration::from_secs(31))
        );
        assert_eq!(TransientError::Network.recommended_delay(), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(60),
        };
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(5), Duration::from_secs(4));
    }
}
