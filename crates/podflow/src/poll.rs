//! Bounded-timeout polling primitive shared by all blocking waits.

use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::error::OrchestrationError;

/// Fixed cadence between poll attempts.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one poll attempt.
pub(crate) enum PollOutcome {
    /// The awaited condition holds.
    Ready,
    /// Not there yet; the detail is kept and reported on timeout.
    NotReady(String),
}

/// Why a poll loop stopped without the condition becoming true.
pub(crate) enum PollError {
    /// The deadline elapsed; carries the last `NotReady` detail observed.
    DeadlineExceeded { last_observed: Option<String> },
    /// The check itself failed; surfaced immediately, never retried.
    Check(Report<OrchestrationError>),
}

/// Repeat `check` at a fixed cadence until it reports ready, fails, or the
/// deadline elapses.
///
/// A `deadline` of `None` waits indefinitely; the loop still sleeps a full
/// interval between attempts. The deadline is evaluated before each attempt,
/// so a 2s deadline with a 1s interval yields at most two attempts.
pub(crate) async fn poll_until<F, Fut>(
    deadline: Option<Duration>,
    interval: Duration,
    mut check: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome, Report<OrchestrationError>>>,
{
    let started = Instant::now();
    let mut last_observed = None;

    loop {
        if let Some(deadline) = deadline {
            if started.elapsed() >= deadline {
                return Err(PollError::DeadlineExceeded { last_observed });
            }
        }

        match check().await {
            Ok(PollOutcome::Ready) => return Ok(()),
            Ok(PollOutcome::NotReady(detail)) => last_observed = Some(detail),
            Err(report) => return Err(PollError::Check(report)),
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_once_condition_holds() {
        let attempts = AtomicUsize::new(0);

        // No deadline: the loop must still terminate the moment the
        // condition becomes true.
        let result = poll_until(None, POLL_INTERVAL, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Ok(PollOutcome::NotReady(format!("attempt {n}")))
            } else {
                Ok(PollOutcome::Ready)
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_carries_last_detail() {
        let attempts = AtomicUsize::new(0);

        let result = poll_until(Some(Duration::from_secs(2)), POLL_INTERVAL, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(PollOutcome::NotReady("0/3 replicas ready".to_string()))
        })
        .await;

        match result {
            Err(PollError::DeadlineExceeded { last_observed }) => {
                assert_eq!(last_observed.as_deref(), Some("0/3 replicas ready"));
            }
            _ => panic!("expected deadline exceeded"),
        }
        let observed = attempts.load(Ordering::SeqCst);
        assert!((1..=2).contains(&observed), "observed {observed} attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn check_failure_aborts_immediately() {
        let attempts = AtomicUsize::new(0);

        let result = poll_until(Some(Duration::from_secs(10)), POLL_INTERVAL, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Report::new(OrchestrationError::Api {
                message: "boom".to_string(),
            }))
        })
        .await;

        assert!(matches!(result, Err(PollError::Check(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_deadline_times_out_without_attempts() {
        let result = poll_until(Some(Duration::ZERO), POLL_INTERVAL, || async {
            Ok(PollOutcome::Ready)
        })
        .await;

        assert!(matches!(
            result,
            Err(PollError::DeadlineExceeded { last_observed: None })
        ));
    }
}
