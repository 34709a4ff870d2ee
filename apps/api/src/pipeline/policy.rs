//! Per-stage retry and degrade policy.
//!
//! Every external call a stage makes goes through [`call_with_retry`], which
//! applies the stage's per-call timeout and exponential backoff. What happens
//! once the budget is exhausted is the stage's decision, read from
//! [`StagePolicy::degrade_on_exhaustion`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::pipeline::ports::ServiceError;
use crate::pipeline::stage::StageName;

/// Backoff never grows past this multiple of the base delay.
const MAX_BACKOFF_FACTOR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StagePolicy {
    /// Total attempts per external call, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub call_timeout: Duration,
    /// Substitute a templated result instead of failing the run.
    pub degrade_on_exhaustion: bool,
}

impl StagePolicy {
    pub fn research_default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            call_timeout: Duration::from_secs(60),
            degrade_on_exhaustion: true,
        }
    }

    pub fn experience_default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            call_timeout: Duration::from_secs(60),
            degrade_on_exhaustion: false,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `8 * base`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = 1u32
            .checked_shl(exponent)
            .unwrap_or(u32::MAX)
            .min(MAX_BACKOFF_FACTOR);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Runs `call` under the policy. Transient errors (including a timed-out
/// attempt) are retried until `max_attempts`; permanent errors return at once.
pub async fn call_with_retry<T, F, Fut>(
    policy: &StagePolicy,
    stage: StageName,
    operation: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(policy.call_timeout)),
        };

        let err = match outcome {
            Ok(value) => {
                debug!(stage = %stage, operation, attempt, "External call succeeded");
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() || attempt >= max_attempts {
            warn!(
                stage = %stage,
                operation,
                attempt,
                transient = err.is_transient(),
                error = %err,
                "External call failed, giving up"
            );
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            stage = %stage,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "External call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn policy(max_attempts: u32) -> StagePolicy {
        StagePolicy {
            max_attempts,
            backoff_base: Duration::from_millis(100),
            call_timeout: Duration::from_secs(1),
            degrade_on_exhaustion: false,
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = policy(10);
        assert_eq!(p.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(p.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(p.backoff_delay(5), Duration::from_millis(800));
        assert_eq!(p.backoff_delay(40), Duration::from_millis(800));
    }

    #[test]
    fn test_default_policies_differ_only_in_degrade_flag() {
        let research = StagePolicy::research_default();
        let experience = StagePolicy::experience_default();
        assert!(research.degrade_on_exhaustion);
        assert!(!experience.degrade_on_exhaustion);
        assert_eq!(research.max_attempts, experience.max_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result = call_with_retry(&policy(3), StageName::Research, "lookup", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::RateLimited("429".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> =
            call_with_retry(&policy(5), StageName::Experience, "generate", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::Provider {
                        message: "invalid api key".to_string(),
                        transient: false,
                    })
                }
            })
            .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_and_exhausts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> =
            call_with_retry(&policy(2), StageName::Research, "generate", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
