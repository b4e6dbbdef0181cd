//! Exponential backoff with jitter for retrying requests against a broker
//! whose cached connection or cached metadata may be stale.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use tracing::info;

/// Base delay before the first retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound the exponential growth is capped at.
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Multiplier applied to the previous delay on each successive retry.
const MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
    /// `None` retries forever.
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            base: MULTIPLIER,
            deadline: None,
        }
    }
}

/// Either a hard error (the retry loop's `f` gave up) or a server-requested
/// throttle: wait the given duration, then retry without counting it as a
/// failed attempt.
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle(Duration),
}

#[derive(Debug, thiserror::Error)]
#[error("gave up retrying {request_name} after {retry_count} attempt(s): {source}")]
pub struct RetryError<E> {
    pub request_name: String,
    pub retry_count: usize,
    #[source]
    pub source: E,
}

/// Drives a `ControlFlow::Continue`/`ControlFlow::Break` closure with
/// exponentially growing, jittered delays between attempts.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a BackoffConfig,
    next_backoff: Duration,
}

impl<'a> Backoff<'a> {
    pub fn new(config: &'a BackoffConfig) -> Self {
        Self {
            config,
            next_backoff: config.init_backoff,
        }
    }

    /// Retries `f` until it returns `ControlFlow::Break`, sleeping a
    /// jittered, exponentially growing delay (or the server-requested
    /// throttle duration) between attempts.
    pub async fn retry_with_backoff<F, Fut, E, T>(
        &mut self,
        request_name: &str,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ControlFlow<Result<T, E>, ErrorOrThrottle<E>>>,
    {
        let deadline = self.config.deadline.map(|d| tokio::time::Instant::now() + d);
        let mut retry_count = 0usize;

        loop {
            match f().await {
                ControlFlow::Break(result) => {
                    return result.map_err(|source| RetryError {
                        request_name: request_name.to_string(),
                        retry_count,
                        source,
                    });
                }
                ControlFlow::Continue(ErrorOrThrottle::Throttle(d)) => {
                    tokio::time::sleep(d).await;
                }
                ControlFlow::Continue(ErrorOrThrottle::Error(_)) => {
                    retry_count += 1;

                    if let Some(deadline) = deadline {
                        if tokio::time::Instant::now() >= deadline {
                            // Let the next iteration's Break surface the
                            // real error instead of fabricating a timeout.
                            continue;
                        }
                    }

                    let sleep_for = self.next_jittered();
                    info!(
                        request_name,
                        retry_count,
                        backoff_ms = sleep_for.as_millis() as u64,
                        "retrying after backoff",
                    );
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }

    /// The jittered delay before the next attempt, for callers (like the
    /// Producer) that bound retries by count rather than by deadline and so
    /// drive their own loop instead of [`Self::retry_with_backoff`].
    pub fn next_delay(&mut self) -> Duration {
        self.next_jittered()
    }

    fn next_jittered(&mut self) -> Duration {
        let base = self.next_backoff;
        self.next_backoff = Duration::from_secs_f64(base.as_secs_f64() * self.config.base)
            .min(self.config.max_backoff);

        let jitter = rand::thread_rng().gen_range(0.0..=base.as_secs_f64());
        Duration::from_secs_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_succeeds_on_first_try_with_no_sleep() {
        let config = BackoffConfig::default();
        let mut backoff = Backoff::new(&config);

        let result: Result<i32, RetryError<&str>> = backoff
            .retry_with_backoff("test", || async { ControlFlow::Break(Ok(42)) })
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_until_break() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        let mut attempts = 0;

        let result: Result<i32, RetryError<&str>> = backoff
            .retry_with_backoff("test", || {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        ControlFlow::Continue(ErrorOrThrottle::Error("not yet"))
                    } else {
                        ControlFlow::Break(Ok(7))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_throttle_does_not_count_as_retry() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        let mut calls = 0;

        let result: Result<i32, RetryError<&str>> = backoff
            .retry_with_backoff("test", || {
                calls += 1;
                async move {
                    if calls == 1 {
                        ControlFlow::Continue(ErrorOrThrottle::Throttle(Duration::from_millis(1)))
                    } else {
                        ControlFlow::Break(Ok(1))
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_fatal_error_breaks_immediately() {
        let config = BackoffConfig::default();
        let mut backoff = Backoff::new(&config);

        let result: Result<i32, RetryError<&str>> = backoff
            .retry_with_backoff("test", || async { ControlFlow::Break(Err("fatal")) })
            .await;

        assert!(result.is_err());
    }
}
