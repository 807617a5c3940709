//! Retry/backoff around the extraction call.
//!
//! Free-tier quotas on the generation endpoint are measured per minute, so
//! a rate-limited request usually succeeds after a short fixed cooldown.
//! Only rate-limit-class failures are retried. A malformed answer or any
//! other service error ends the attempt loop immediately: calling again
//! would cost quota without changing the result.
//!
//! The cooldown sits between attempts, never after the last one.

use super::clock::Sleeper;
use crate::error::ItemError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt budget and cooldown between rate-limited attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed, first attempt included. At least 1.
    pub max_attempts: u32,
    pub cooldown: Duration,
}

/// What the controller ended with, and how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ItemError>,
    pub attempts: u32,
}

/// Call `op` until it succeeds, fails terminally, or the budget runs out.
///
/// `op` receives the 1-based attempt number. When every attempt in the
/// budget is rate-limited the result is [`ItemError::QuotaExhausted`].
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ItemError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            warn!(
                "{}: rate limited, retry {}/{} after {}ms",
                label,
                attempt - 1,
                max_attempts - 1,
                policy.cooldown.as_millis()
            );
            sleeper.sleep(policy.cooldown).await;
        }

        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if e.is_rate_limited() => {
                warn!("{}: attempt {} rate limited: {}", label, attempt, e);
                last_err = e.to_string();
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }

    RetryOutcome {
        result: Err(ItemError::QuotaExhausted {
            attempts: max_attempts,
            last_error: last_err,
        }),
        attempts: max_attempts,
    }
}
