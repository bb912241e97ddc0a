//! Polling a describe call until the remote object settles.
//!
//! Mutations return before the control plane has finished acting on them, so
//! every create, update and delete is followed by a wait: describe the
//! object, compare its status with the target and failure sets, and sleep
//! between polls until it converges or the timeout elapses.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// An object whose lifecycle status can be observed.
pub trait Observed {
    /// Current status as the API reports it (for example `Running`).
    fn status(&self) -> &str;
}

/// What a wait is trying to reach.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitTarget {
    /// Any of these statuses.
    States(&'static [&'static str]),
    /// The object no longer exists.
    Gone,
}

impl WaitTarget {
    fn accepts(self, status: &str) -> bool {
        match self {
            Self::States(states) => states.contains(&status),
            Self::Gone => false,
        }
    }
}

/// Outcome of a successful wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Converged<T> {
    /// The object reached a target status.
    Present(T),
    /// The object is gone.
    Gone,
}

impl<T> Converged<T> {
    /// Returns the observed object, if the wait ended with one.
    #[must_use]
    pub fn into_present(self) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Gone => None,
        }
    }
}

/// Errors surfaced by [`StateReconciler::wait_for`].
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The object entered a status from the failure set.
    #[error("{id} entered failure status {status}")]
    FailedState {
        /// Object being waited on.
        id: String,
        /// Failure status observed.
        status: String,
    },
    /// The timeout elapsed while the object was still present.
    #[error("timed out after {waited:?} waiting for {id}; last status {last_status}")]
    Timeout {
        /// Object being waited on.
        id: String,
        /// Last status observed.
        last_status: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The timeout elapsed while the object could not be found.
    #[error("timed out after {waited:?} waiting for {id} to appear")]
    NotFound {
        /// Object being waited on.
        id: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The object entered a status outside the pending, target and failure
    /// sets.
    #[error("{id} entered unexpected status {status}")]
    UnexpectedState {
        /// Object being waited on.
        id: String,
        /// Status observed.
        status: String,
    },
    /// The describe call itself failed.
    #[error("describing {id} failed: {source}")]
    Describe {
        /// Object being waited on.
        id: String,
        /// Error returned by the describe call.
        #[source]
        source: E,
    },
}

/// Polling schedule for a wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StateReconciler {
    poll_interval: Duration,
    timeout: Duration,
    delay: Duration,
    pending: &'static [&'static str],
}

impl StateReconciler {
    /// Creates a reconciler polling every `poll_interval` for at most
    /// `timeout`.
    #[must_use]
    pub const fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            delay: Duration::ZERO,
            pending: &[],
        }
    }

    /// Waits `delay` before the first poll.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Declares the statuses expected on the way to the target. Once set,
    /// any status outside pending, target and failure ends the wait.
    #[must_use]
    pub const fn with_pending(mut self, pending: &'static [&'static str]) -> Self {
        self.pending = pending;
        self
    }

    /// Replaces the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum time a wait may take.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Polls `describe` until the object reaches `target`.
    ///
    /// `describe` returns `Ok(None)` when the object does not exist. That
    /// ends a [`WaitTarget::Gone`] wait successfully; for a status target it
    /// keeps polling, since a freshly created object may not be visible yet.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::FailedState`] as soon as a status in `fail` is
    /// seen, [`WaitError::UnexpectedState`] for a status outside the declared
    /// sets, [`WaitError::Describe`] when `describe` fails, and
    /// [`WaitError::Timeout`] or [`WaitError::NotFound`] when the timeout
    /// elapses.
    pub async fn wait_for<T, E, F, Fut>(
        &self,
        id: &str,
        target: WaitTarget,
        fail: &[&str],
        mut describe: F,
    ) -> Result<Converged<T>, WaitError<E>>
    where
        T: Observed,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = Instant::now();
        let deadline = started + self.delay + self.timeout;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let mut polls = 0_u32;
        loop {
            polls = polls.saturating_add(1);
            let observed = describe().await.map_err(|source| WaitError::Describe {
                id: id.to_owned(),
                source,
            })?;

            let last_status = match observed {
                None if target == WaitTarget::Gone => {
                    debug!(id, polls, "object is gone");
                    return Ok(Converged::Gone);
                }
                None => None,
                Some(object) => {
                    let status = object.status();
                    debug!(id, polls, status, "polled object status");
                    if fail.contains(&status) {
                        return Err(WaitError::FailedState {
                            id: id.to_owned(),
                            status: status.to_owned(),
                        });
                    }
                    if target.accepts(status) {
                        return Ok(Converged::Present(object));
                    }
                    if !self.pending.is_empty() && !self.pending.contains(&status) {
                        return Err(WaitError::UnexpectedState {
                            id: id.to_owned(),
                            status: status.to_owned(),
                        });
                    }
                    Some(status.to_owned())
                }
            };

            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                return Err(match last_status {
                    Some(last_status) => WaitError::Timeout {
                        id: id.to_owned(),
                        last_status,
                        waited,
                    },
                    None => WaitError::NotFound {
                        id: id.to_owned(),
                        waited,
                    },
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::future::{Ready, ready};

    use rstest::{fixture, rstest};

    #[derive(Clone, Debug, Eq, PartialEq)]
    struct Snapshot(&'static str);

    impl Observed for Snapshot {
        fn status(&self) -> &str {
            self.0
        }
    }

    #[derive(Debug)]
    struct Script {
        answers: RefCell<VecDeque<Option<&'static str>>>,
        polls: RefCell<u32>,
    }

    impl Script {
        fn new(answers: &[Option<&'static str>]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().copied().collect()),
                polls: RefCell::new(0),
            }
        }

        fn describe(&self) -> Ready<Result<Option<Snapshot>, Infallible>> {
            *self.polls.borrow_mut() += 1;
            let answer = self
                .answers
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("script exhausted"));
            ready(Ok(answer.map(Snapshot)))
        }

        fn polls(&self) -> u32 {
            *self.polls.borrow()
        }
    }

    #[fixture]
    fn reconciler() -> StateReconciler {
        StateReconciler::new(Duration::from_secs(5), Duration::from_secs(60))
    }

    const RUNNING: WaitTarget = WaitTarget::States(&["Running"]);

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn pending_then_running_converges_on_third_poll(reconciler: StateReconciler) {
        let script = Script::new(&[Some("Pending"), Some("Pending"), Some("Running")]);
        let started = Instant::now();
        let outcome = reconciler
            .wait_for("i-1", RUNNING, &["Stopping"], || script.describe())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(outcome, Converged::Present(Snapshot("Running")));
        assert_eq!(script.polls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn fail_state_stops_after_three_polls(reconciler: StateReconciler) {
        let script = Script::new(&[Some("Pending"), Some("Starting"), Some("Stopping")]);
        let err = reconciler
            .wait_for("i-1", RUNNING, &["Stopping"], || script.describe())
            .await
            .expect_err("fail status must abort");
        assert!(
            matches!(err, WaitError::FailedState { ref status, .. } if status == "Stopping")
        );
        assert_eq!(script.polls(), 3);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn absence_satisfies_a_gone_target(reconciler: StateReconciler) {
        let script = Script::new(&[Some("Stopping"), None]);
        let outcome = reconciler
            .wait_for("i-1", WaitTarget::Gone, &[], || script.describe())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(outcome, Converged::Gone);
        assert_eq!(script.polls(), 2);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_status() {
        let reconciler = StateReconciler::new(Duration::from_secs(5), Duration::from_secs(12));
        let script = Script::new(&[Some("Pending"); 4]);
        let err = reconciler
            .wait_for("i-1", RUNNING, &[], || script.describe())
            .await
            .expect_err("must time out");
        match err {
            WaitError::Timeout {
                last_status,
                waited,
                ..
            } => {
                assert_eq!(last_status, "Pending");
                assert_eq!(waited, Duration::from_secs(12));
            }
            other => panic!("unexpected {other}"),
        }
        // polls at 0s, 5s, 10s and the clipped 12s
        assert_eq!(script.polls(), 4);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn invisible_object_times_out_as_not_found() {
        let reconciler = StateReconciler::new(Duration::from_secs(5), Duration::from_secs(5));
        let script = Script::new(&[None, None]);
        let err = reconciler
            .wait_for("i-1", RUNNING, &[], || script.describe())
            .await
            .expect_err("never appears");
        assert!(matches!(err, WaitError::NotFound { .. }));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn status_outside_declared_sets_is_unexpected(reconciler: StateReconciler) {
        let reconciler = reconciler.with_pending(&["Pending", "Starting"]);
        let script = Script::new(&[Some("Pending"), Some("Deleted")]);
        let err = reconciler
            .wait_for("i-1", RUNNING, &["Stopping"], || script.describe())
            .await
            .expect_err("Deleted is not expected");
        assert!(
            matches!(err, WaitError::UnexpectedState { ref status, .. } if status == "Deleted")
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn initial_delay_precedes_first_poll(reconciler: StateReconciler) {
        let reconciler = reconciler.with_delay(Duration::from_secs(3));
        let script = Script::new(&[Some("Running")]);
        let started = Instant::now();
        reconciler
            .wait_for("i-1", RUNNING, &[], || script.describe())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
