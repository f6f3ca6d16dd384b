//! Retry logic shared by every remote call.
//!
//! A failed exchange is sorted into one of three buckets by [`RetryPolicy::classify`]:
//! rate limited (sleep `base * 2^attempt`, then retry), transient (retry straight
//! away) or terminal (give up). Attempts are bounded by [`RetryPolicy::max_attempts`]
//! whatever the bucket.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_BACKOFF_BASE_SECS, DEFAULT_MAX_ATTEMPTS, MAX_BACKOFF};
use crate::error::FetchError;

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The remote asked us to slow down, wait before the next attempt
    Backoff,
    /// Try again immediately
    RetryNow,
    /// Not worth retrying
    Fail,
}

/// Parameters for [`retry_with_backoff`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt after a rate limit, doubled each time
    pub base_delay: Duration,
    /// Cap on any single backoff sleep
    pub max_delay: Duration,
    /// Statuses that mean "rate limited"
    pub rate_limit_statuses: Vec<StatusCode>,
    /// Statuses outside the 5xx range that are still worth an immediate retry
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            max_delay: MAX_BACKOFF,
            rate_limit_statuses: vec![StatusCode::TOO_MANY_REQUESTS],
            retry_statuses: vec![StatusCode::REQUEST_TIMEOUT],
        }
    }
}

impl RetryPolicy {
    /// Sorts a failure into backoff, immediate retry or give up.
    pub fn classify(&self, err: &FetchError) -> Verdict {
        match err.status() {
            Some(status) if self.rate_limit_statuses.contains(&status) => Verdict::Backoff,
            Some(status) if status.is_server_error() || self.retry_statuses.contains(&status) => {
                Verdict::RetryNow
            }
            Some(_) => Verdict::Fail,
            None => match err {
                FetchError::Network(_) | FetchError::Malformed(_) => Verdict::RetryNow,
                FetchError::Io(_) | FetchError::Status { .. } => Verdict::Fail,
            },
        }
    }

    /// Sleep before the attempt after `attempt` (zero based) was rate limited.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs `operation` until it succeeds, fails terminally or runs out of attempts.
///
/// `label` only shows up in log lines. The last error is returned when the
/// budget is spent, callers turn it into a per-item outcome.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(label, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let verdict = policy.classify(&err);
        if verdict == Verdict::Fail || attempt + 1 >= attempts {
            warn!(label, attempts = attempt + 1, "Giving up: {err}");
            return Err(err);
        }

        match verdict {
            Verdict::Backoff => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Verdict::RetryNow => {
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    "Attempt failed, retrying: {err}"
                );
            }
            Verdict::Fail => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn status(code: StatusCode) -> FetchError {
        FetchError::from_status(code, b"")
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn classify_statuses() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify(&status(StatusCode::TOO_MANY_REQUESTS)),
            Verdict::Backoff
        );
        assert_eq!(
            policy.classify(&status(StatusCode::SERVICE_UNAVAILABLE)),
            Verdict::RetryNow
        );
        assert_eq!(
            policy.classify(&status(StatusCode::REQUEST_TIMEOUT)),
            Verdict::RetryNow
        );
        assert_eq!(
            policy.classify(&status(StatusCode::UNAUTHORIZED)),
            Verdict::Fail
        );
        assert_eq!(
            policy.classify(&FetchError::Malformed("no json".into())),
            Verdict::RetryNow
        );
        assert_eq!(
            policy.classify(&FetchError::Io(std::io::Error::other("disk"))),
            Verdict::Fail
        );
    }

    #[test]
    fn custom_rate_limit_status() {
        let policy = RetryPolicy {
            rate_limit_statuses: vec![StatusCode::SERVICE_UNAVAILABLE],
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.classify(&status(StatusCode::SERVICE_UNAVAILABLE)),
            Verdict::Backoff
        );
        assert_eq!(
            policy.classify(&status(StatusCode::TOO_MANY_REQUESTS)),
            Verdict::Fail
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_twice_then_succeeds() {
        let policy = RetryPolicy::default();
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::default();

        let result = retry_with_backoff(&policy, "test", || {
            let calls = calls.clone();
            async move {
                let mut calls = calls.lock().map_err(|_| FetchError::Malformed("lock".into()))?;
                calls.push(Instant::now());
                if calls.len() < 3 {
                    Err(status(StatusCode::TOO_MANY_REQUESTS))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(7));
        let calls = calls.lock().expect("lock");
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert_eq!(first_gap, Duration::from_secs(5));
        assert_eq!(second_gap, Duration::from_secs(10));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_without_sleeping() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let calls = Arc::new(Mutex::new(0u32));

        let result = retry_with_backoff(&policy, "test", || {
            let calls = calls.clone();
            async move {
                let mut calls = calls.lock().map_err(|_| FetchError::Malformed("lock".into()))?;
                *calls += 1;
                Err::<(), _>(status(StatusCode::BAD_GATEWAY))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().expect("lock"), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_stops_at_first_attempt() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(Mutex::new(0u32));

        let result = retry_with_backoff(&policy, "test", || {
            let calls = calls.clone();
            async move {
                let mut calls = calls.lock().map_err(|_| FetchError::Malformed("lock".into()))?;
                *calls += 1;
                Err::<(), _>(status(StatusCode::FORBIDDEN))
            }
        })
        .await;

        assert_eq!(
            result.err().and_then(|err| err.status()),
            Some(StatusCode::FORBIDDEN)
        );
        assert_eq!(*calls.lock().expect("lock"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let result = retry_with_backoff(&policy, "test", || async { Ok::<_, FetchError>(1) }).await;
        assert_eq!(result.ok(), Some(1));
    }
}
