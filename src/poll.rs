//! Bounded retry-until-ready waits for asynchronous provider state.
//!
//! A [`PollWaiter`] invokes a predicate once per interval until the predicate
//! reports the resource ready, fails, or the overall timeout elapses. The
//! first poll happens one interval after the wait starts. The deadline and the
//! cancellation signal are raced against both the ticker and any in-flight
//! predicate call, so a terminal outcome ends the wait at once and no timers
//! outlive it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

use crate::cancel::CancelSignal;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of a single readiness check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness<T> {
    /// The awaited state was reached.
    Ready(T),
    /// Not there yet; poll again after the interval.
    Pending,
}

/// Errors returned by [`PollWaiter::wait`].
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The predicate reported an unrecoverable error.
    #[error(transparent)]
    Query(E),
    /// The resource did not become ready before the timeout.
    #[error("timed out after {}s waiting for {resource}", elapsed.as_secs())]
    Timeout {
        /// Resource being awaited.
        resource: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The wait was interrupted by cancellation.
    #[error("wait cancelled")]
    Cancelled,
}

/// Polls a predicate on a fixed interval until ready, error, or timeout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollWaiter {
    interval: Duration,
    timeout: Duration,
}

impl PollWaiter {
    /// Creates a waiter polling every `interval` for at most `timeout`.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Interval between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Overall time budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits for `predicate` to report [`Readiness::Ready`].
    ///
    /// `resource` names what is being awaited and appears in the timeout
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Query`] as soon as the predicate fails,
    /// [`WaitError::Timeout`] once the timeout elapses, and
    /// [`WaitError::Cancelled`] when `cancel` fires.
    pub async fn wait<T, E, F, Fut>(
        &self,
        resource: &str,
        cancel: &CancelSignal,
        mut predicate: F,
    ) -> Result<T, WaitError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Readiness<T>, E>>,
    {
        let started = Instant::now();
        let period = self.interval.max(MIN_INTERVAL);
        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);
        let mut ticker = interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                () = &mut deadline => return Err(timed_out(resource, started)),
                _ = ticker.tick() => {}
            }

            attempt += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                () = &mut deadline => return Err(timed_out(resource, started)),
                outcome = predicate() => outcome,
            };

            match outcome.map_err(WaitError::Query)? {
                Readiness::Ready(value) => {
                    tracing::debug!(resource, attempt, "resource ready");
                    return Ok(value);
                }
                Readiness::Pending => tracing::debug!(resource, attempt, "resource not ready"),
            }
        }
    }
}

fn timed_out<E>(resource: &str, started: Instant) -> WaitError<E>
where
    E: std::error::Error + 'static,
{
    WaitError::Timeout {
        resource: resource.to_owned(),
        elapsed: started.elapsed(),
    }
}
