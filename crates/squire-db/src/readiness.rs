//! Retry-until-ready polling

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Sleep between failed attempts
    pub interval: Duration,

    /// Give up once this much time has passed since the first attempt
    pub deadline: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(15),
            deadline: Duration::from_secs(60),
        }
    }
}

/// Why polling stopped without success
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError<E>
where
    E: std::error::Error + 'static,
{
    #[error("not ready after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("cancelled while waiting for readiness")]
    Cancelled,
}

/// Call `attempt` until it succeeds, the deadline passes, or `cancel` fires.
///
/// The attempt always runs at least once unless the token is already
/// cancelled. Cancellation is observed during both the attempt and the sleep.
pub async fn wait_ready<T, E, F, Fut>(
    mut attempt: F,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<T, ReadinessError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ReadinessError::Cancelled);
        }

        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessError::Cancelled),
            result = attempt() => result,
        };

        let last = match result {
            Ok(value) => {
                debug!(attempts, elapsed = ?started.elapsed(), "ready");
                return Ok(value);
            }
            Err(e) => e,
        };

        if started.elapsed() + policy.interval > policy.deadline {
            debug!(attempts, error = %last, "giving up");
            return Err(ReadinessError::Exhausted { attempts, last });
        }
        trace!(attempts, error = %last, "not ready");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("refused #{0}")]
    struct Refused(u32);

    fn fast() -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_millis(1),
            deadline: Duration::from_secs(5),
        }
    }

    #[test]
    fn default_policy() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(15));
        assert_eq!(policy.deadline, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = wait_ready(
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(Refused(n))
                    } else {
                        Ok("up")
                    }
                }
            },
            fast(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(value, "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let policy = ReadinessPolicy {
            interval: Duration::from_millis(5),
            deadline: Duration::from_millis(30),
        };
        let calls = AtomicU32::new(0);

        let err = wait_ready(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(Refused(n)) }
            },
            policy,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            ReadinessError::Exhausted { attempts, last } => {
                assert!(attempts >= 1);
                assert_eq!(last.0, attempts);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_sleeping() {
        let cancel = CancellationToken::new();
        let policy = ReadinessPolicy {
            interval: Duration::from_secs(30),
            deadline: Duration::from_secs(300),
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = wait_ready(|| async { Err::<(), _>(Refused(0)) }, policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let err = wait_ready(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Refused>(()) }
            },
            fast(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReadinessError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
