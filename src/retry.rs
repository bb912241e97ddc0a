//! Bounded-duration retry around a single remote call.
//!
//! The control plane answers with throttling and transient conflict codes
//! long before it answers with a real failure, so every mutating call runs
//! through [`invoke`]. A classifier decides per error whether another attempt
//! is worthwhile; the [`RetryPolicy`] bounds the total wall-clock time and
//! shapes the linear backoff between attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Verdict returned by a classifier for one failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// The error is transient; try again after the backoff.
    Retry,
    /// The error is final; give up immediately.
    Fatal,
}

/// Limits and pacing for [`invoke`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Hard ceiling on the wall-clock time spent across all attempts.
    pub max_duration: Duration,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Amount added to the delay after each further failed attempt.
    pub backoff_step: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(600),
            initial_backoff: Duration::from_secs(1),
            backoff_step: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default backoff and the given budget.
    #[must_use]
    pub fn new(max_duration: Duration) -> Self {
        Self {
            max_duration,
            ..Self::default()
        }
    }

    /// Replaces the backoff shape.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, step: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.backoff_step = step;
        self.max_backoff = max;
        self
    }

    /// Returns an iterator-like backoff sequence for this policy.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff,
            step: self.backoff_step,
            max: self.max_backoff,
        }
    }
}

/// Linear backoff sequence: `initial, initial + step, ...` capped at `max`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    next: Duration,
    step: Duration,
    max: Duration,
}

impl Backoff {
    /// Returns the next delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next.min(self.max);
        self.next = self.next.saturating_add(self.step).min(self.max);
        current
    }
}

/// Errors surfaced by [`invoke`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier marked the error as final.
    #[error("{action} failed after {attempts} attempt(s): {source}")]
    Fatal {
        /// Remote action that was attempted.
        action: String,
        /// Number of attempts made, including the failing one.
        attempts: u32,
        /// Error returned by the last attempt.
        #[source]
        source: E,
    },
    /// The duration budget ran out while the error was still retryable.
    #[error("{action} still failing after {attempts} attempt(s) over {elapsed:?}: {source}")]
    Exhausted {
        /// Remote action that was attempted.
        action: String,
        /// Number of attempts made.
        attempts: u32,
        /// Wall-clock time spent across all attempts.
        elapsed: Duration,
        /// Error returned by the last attempt.
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Returns the error from the final attempt.
    #[must_use]
    pub const fn source_error(&self) -> &E {
        match self {
            Self::Fatal { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    /// Consumes the wrapper and returns the error from the final attempt.
    #[must_use]
    pub fn into_source(self) -> E {
        match self {
            Self::Fatal { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    /// Number of attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Name of the action that failed.
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::Fatal { action, .. } | Self::Exhausted { action, .. } => action,
        }
    }
}

/// Runs `call` until it succeeds, the classifier calls an error fatal, or
/// the policy's duration budget is spent.
///
/// A backoff sleep is clipped to the remaining budget, so the function
/// returns no later than `max_duration` plus the duration of the final
/// attempt.
///
/// # Errors
///
/// Returns [`RetryError::Fatal`] for a fatal classification and
/// [`RetryError::Exhausted`] when the budget runs out.
pub async fn invoke<T, E, F, Fut, C>(
    action: &str,
    policy: &RetryPolicy,
    classify: C,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Classification,
    E: fmt::Display,
{
    let started = Instant::now();
    let deadline = started + policy.max_duration;
    let mut backoff = policy.backoff();
    let mut attempts = 0_u32;

    loop {
        attempts = attempts.saturating_add(1);
        let err = match call().await {
            Ok(value) => {
                debug!(action, attempts, "remote call succeeded");
                return Ok(value);
            }
            Err(err) => err,
        };

        if classify(&err) == Classification::Fatal {
            debug!(action, attempts, error = %err, "remote call failed with a fatal error");
            return Err(RetryError::Fatal {
                action: action.to_owned(),
                attempts,
                source: err,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(action, attempts, error = %err, "retry budget exhausted");
            return Err(RetryError::Exhausted {
                action: action.to_owned(),
                attempts,
                elapsed: now - started,
                source: err,
            });
        }

        let delay = backoff.next_delay().min(deadline - now);
        warn!(
            action,
            attempts,
            error = %err,
            delay_ms = delay.as_millis(),
            "remote call failed, retrying"
        );
        sleep(delay).await;
    }
}
