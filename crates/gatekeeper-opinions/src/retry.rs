use std::future::Future;
use std::time::Duration;

use gatekeeper_models::config::NetworkConfig;
use thiserror::Error;
use tracing::debug;

/// Per-attempt time box plus bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    #[error("timed out on all {attempts} attempt(s)")]
    TimedOut { attempts: u32 },

    #[error("failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.request_timeout_ms),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// Backoff slept before attempt `attempt` (1-based; attempt 1 never waits).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 2);
        self.initial_backoff.mul_f64(factor)
    }

    /// Worst-case wall time of one `run`, used to bound a whole fan-out.
    pub fn budget(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|a| self.attempt_timeout + self.backoff_before(a))
            .sum()
    }

    /// Run `op` until it succeeds or the attempts are used up. `op` receives the
    /// 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error: Option<String> = None;
        for attempt in 1..=self.max_attempts {
            let wait = self.backoff_before(attempt);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!(label, attempt, error = %e, "Attempt failed");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!(label, attempt, timeout_ms = self.attempt_timeout.as_millis() as u64, "Attempt timed out");
                    last_error = None;
                }
            }
        }

        Err(match last_error {
            Some(last) => RetryError::Exhausted {
                attempts: self.max_attempts,
                last,
            },
            None => RetryError::TimedOut {
                attempts: self.max_attempts,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(50),
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_geometrically() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            ..fast_policy(4)
        };
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn config_never_yields_zero_attempts() {
        let policy = RetryPolicy::from_config(&NetworkConfig {
            max_attempts: 0,
            ..NetworkConfig::default()
        });
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("connection reset")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run("down", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("503") }
            })
            .await;
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "503".to_string()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hung_calls_are_time_boxed() {
        let started = std::time::Instant::now();
        let result: Result<(), _> = fast_policy(2)
            .run("hung", |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), String>(())
            })
            .await;
        assert_eq!(result, Err(RetryError::TimedOut { attempts: 2 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
