//! Bounded retry with a fixed delay.
//!
//! Retries only transient failures ([`TransportError::is_transient`]). An
//! application-level answer from the authority, a SOAP fault, or an
//! unparsable body is returned at once. Every attempt and every delay races
//! the caller's cancellation token and the per-call deadline; both abort the
//! in-flight attempt and any pending retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Retry bounds for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
    /// Overall budget for all attempts and delays.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
            deadline: None,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the bounds run out.
///
/// `op` receives the 1-based attempt number. At most
/// `policy.max_retries + 1` attempts are made.
///
/// # Errors
///
/// - [`TransportError::Cancelled`] when `cancel` fires.
/// - [`TransportError::Timeout`] when `policy.deadline` elapses or every
///   attempt failed transiently. `last_cause` carries the last failure.
/// - The first permanent error from `op` otherwise.
pub async fn send_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let started = Instant::now();
    let deadline = policy.deadline.map(|d| started + d);
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 0;
    let mut last_cause: Option<String> = None;

    loop {
        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled { attempts: attempt }),
            _ = sleep_until(deadline) => {
                return Err(deadline_error(attempt, started, last_cause.take()));
            }
            outcome = op(attempt) => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => e,
            Err(e) => return Err(e.exhausted(attempt, elapsed_ms(started))),
        };

        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = %err,
            "transient transport failure, retrying"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled { attempts: attempt }),
            _ = sleep_until(deadline) => {
                return Err(deadline_error(attempt, started, Some(err.to_string())));
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
        last_cause = Some(err.to_string());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn deadline_error(attempts: u32, started: Instant, last_cause: Option<String>) -> TransportError {
    TransportError::Timeout {
        attempts,
        elapsed_ms: elapsed_ms(started),
        last_cause,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::from_millis(5),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn retries_timeouts_then_surfaces_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = send_with_retry(&policy(2), &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Timeout {
                    attempts: 1,
                    elapsed_ms: 0,
                    last_cause: Some("operation timed out".into()),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(TransportError::Timeout {
                attempts: 3,
                last_cause,
                ..
            }) => assert_eq!(last_cause.as_deref(), Some("operation timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connections_exhaust_into_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let cancel = CancellationToken::new();
        let result: Result<(), _> = send_with_retry(&policy(2), &cancel, |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::ConnectionFailure {
                    attempts: attempt,
                    reason: "refused".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(TransportError::Timeout {
                attempts: 3,
                last_cause: Some(cause),
                ..
            }) => assert!(cause.contains("refused"), "{cause}"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let cancel = CancellationToken::new();
        let result: Result<(), _> = send_with_retry(&policy(0), &cancel, |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::ServiceUnavailable {
                    status: 503,
                    attempts: attempt,
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TransportError::Timeout { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = send_with_retry(&policy(5), &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::HttpStatus {
                    status: 400,
                    body: "bad request".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TransportError::HttpStatus { status: 400, .. })));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let result = send_with_retry(&policy(2), &CancellationToken::new(), |attempt| async move {
            if attempt < 2 {
                Err(TransportError::ConnectionFailure {
                    attempts: attempt,
                    reason: "reset".into(),
                })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn cancellation_aborts_pending_retry() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let slow = RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(30),
            deadline: None,
        };
        let result: Result<(), _> = send_with_retry(&slow, &cancel, |_| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                Err(TransportError::ConnectionFailure {
                    attempts: 1,
                    reason: "refused".into(),
                })
            }
        })
        .await;

        assert_eq!(result, Err(TransportError::Cancelled { attempts: 1 }));
    }

    #[tokio::test]
    async fn deadline_bounds_all_attempts() {
        let bounded = RetryPolicy {
            max_retries: 10,
            delay: Duration::from_millis(20),
            deadline: Some(Duration::from_millis(50)),
        };
        let result: Result<(), _> = send_with_retry(&bounded, &CancellationToken::new(), |_| async {
            Err(TransportError::ServiceUnavailable {
                status: 503,
                attempts: 1,
            })
        })
        .await;

        match result {
            Err(TransportError::Timeout { attempts, .. }) => assert!(attempts < 11),
            other => panic!("expected deadline timeout, got {other:?}"),
        }
    }
}
