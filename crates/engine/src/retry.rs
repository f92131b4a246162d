use std::future::Future;
use std::time::Duration;

use tracing::warn;

use viva_core::PortError;

/// Attempts per adapter call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(300);

/// Run an adapter call with a per-attempt deadline and exponential backoff.
///
/// Transient failures and timeouts are retried up to [`MAX_ATTEMPTS`] times;
/// a permanent failure aborts immediately.  The overall turn deadline is
/// enforced by the caller, so a slow adapter cannot stretch a turn past it.
pub async fn with_retries<T, F, Fut>(
    label: &'static str,
    per_attempt: Duration,
    mut op: F,
) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut last = PortError::Transient(format!("{label}: no attempt made"));

    for attempt in 1..=MAX_ATTEMPTS {
        match tokio::time::timeout(per_attempt, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                warn!(label, attempt, %err, "adapter call failed, will retry");
                last = err;
            }
            Err(_) => {
                warn!(label, attempt, deadline = ?per_attempt, "adapter call timed out");
                last = PortError::Timeout(per_attempt);
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = with_retries("op", Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, PortError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_succeed() {
        let calls = AtomicU32::new(0);
        let result = with_retries("op", Duration::from_secs(1), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(PortError::Transient("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("op", Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PortError::Permanent("schema".to_string())) }
        })
        .await;
        assert!(matches!(result.unwrap_err(), PortError::Permanent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("op", Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PortError::Transient("still down".to_string())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(matches!(result.unwrap_err(), PortError::Transient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_become_timeouts() {
        let result: Result<(), _> = with_retries("op", Duration::from_millis(50), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result.unwrap_err(), PortError::Timeout(_)));
    }
}
