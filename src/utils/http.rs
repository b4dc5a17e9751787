use crate::utils::error::{AppError, AppResult};
use lazy_static::lazy_static;
use std::future::Future;
use std::time::Duration;

lazy_static! {
    /// Shared HTTP client for every outbound integration (connection pool reuse)
    pub static ref HTTP_CLIENT: reqwest::Client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("scholarshare-service/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client");
}

/// Outcome of a single attempt of a rate-limited call
pub enum Attempt<T> {
    Done(T),
    /// HTTP 429, with the server's Retry-After hint if it sent one
    RateLimited(Option<Duration>),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` (1-based) failed.
    /// Retry-After wins when present; both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(hint) => hint,
            None => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Parses a `Retry-After` header given in seconds
pub fn retry_after_from(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Runs `op` until it stops being rate limited or the policy gives up.
/// `op` receives the 1-based attempt number.
pub async fn retry_on_rate_limit<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<Attempt<T>>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::RateLimited(hint) => {
                if attempt >= policy.max_attempts {
                    log::warn!("⛔ {}: still rate limited after {} attempts", label, attempt);
                    return Err(AppError::RateLimited(format!(
                        "{} rate limited after {} attempts",
                        label, attempt
                    )));
                }
                let delay = policy.delay_for(attempt, hint);
                log::warn!(
                    "⏳ {}: rate limited (attempt {}/{}), retrying in {:?}",
                    label, attempt, policy.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10, None), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_hint_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(120))), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_from(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(retry_after_from(&headers), Some(Duration::from_secs(3)));
        headers.insert(reqwest::header::RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after_from(&headers), None);
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_on_rate_limit(&fast_policy(), "test", |attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Ok(Attempt::RateLimited(None))
                } else {
                    Ok(Attempt::Done("ok"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: AppResult<()> = retry_on_rate_limit(&fast_policy(), "test", |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Attempt::RateLimited(Some(Duration::from_millis(1))))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: AppResult<()> = retry_on_rate_limit(&fast_policy(), "test", |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::ExternalError("500".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::ExternalError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
