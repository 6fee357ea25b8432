//! Await-condition polling.
//!
//! A [`Poller`] evaluates a [`Condition`] against an input value, sleeping a
//! fixed period between attempts, until the condition holds, the condition
//! fails, or the policy's maximum wait elapses. Each poller is consumed by a
//! single [`Poller::wait`] call.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

/// Future returned by [`Condition::check`].
pub type ConditionFuture<'a, E> = Pin<Box<dyn Future<Output = Result<bool, E>> + Send + 'a>>;

/// Boolean check applied to an input value on every poll attempt.
///
/// Implementations usually perform a remote read (fetch a status and compare
/// it with a target). Returning an error aborts the wait immediately.
pub trait Condition<T> {
    /// Error raised when the check itself cannot be performed.
    type Error;

    /// Evaluates the condition once.
    fn check<'a>(&'a mut self, input: &'a T) -> ConditionFuture<'a, Self::Error>;
}

/// Adapter turning a closure into a [`Condition`].
///
/// The closure receives the input by reference and returns a future that
/// must not borrow from it; clone whatever the check needs.
#[derive(Clone, Debug)]
pub struct FnCondition<F>(F);

/// Wraps `check` as a [`Condition`].
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use cloudwait::poll::condition_fn;
///
/// let _ready = condition_fn(|value: &u32| {
///     let done = *value > 2;
///     async move { Ok::<_, Infallible>(done) }
/// });
/// ```
#[must_use]
pub const fn condition_fn<F>(check: F) -> FnCondition<F> {
    FnCondition(check)
}

impl<T, F, Fut, E> Condition<T> for FnCondition<F>
where
    F: FnMut(&T) -> Fut,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
{
    type Error = E;

    fn check<'a>(&'a mut self, input: &'a T) -> ConditionFuture<'a, Self::Error> {
        Box::pin((self.0)(input))
    }
}

/// Errors raised while building a [`PollPolicy`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError {
    /// Raised when a policy parameter is out of range.
    #[error("invalid poll policy: {0}")]
    Configuration(String),
}

/// Timing configuration for a single await operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    max_wait: Duration,
    period: Duration,
    initial_delay: Duration,
}

impl PollPolicy {
    /// Creates a policy that waits at most `max_wait`, checking every
    /// `period`.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Configuration`] when `period` is zero.
    pub fn new(max_wait: Duration, period: Duration) -> Result<Self, PollError> {
        if period.is_zero() {
            return Err(PollError::Configuration(String::from(
                "period must be greater than zero",
            )));
        }
        Ok(Self {
            max_wait,
            period,
            initial_delay: Duration::ZERO,
        })
    }

    /// Delays the first check by `delay`.
    ///
    /// The delay counts toward the maximum wait and is clamped to it, so the
    /// condition is still checked at least once.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay.min(self.max_wait);
        self
    }

    /// Maximum time spent polling before giving up.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Pause between consecutive checks.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Pause before the first check.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }
}

/// Result of an await operation that did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome<T> {
    /// The condition held; carries the input back to the caller.
    Success(T),
    /// The maximum wait elapsed without the condition holding.
    TimedOut,
}

impl<T> PollOutcome<T> {
    /// Returns `true` for [`PollOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the input on success, `None` on timeout.
    #[must_use]
    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::TimedOut => None,
        }
    }

    /// Converts a timeout into the error produced by `on_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the result of `on_timeout` when the outcome is
    /// [`PollOutcome::TimedOut`].
    pub fn ok_or_else<E>(self, on_timeout: impl FnOnce() -> E) -> Result<T, E> {
        self.into_success().ok_or_else(on_timeout)
    }
}

/// Single-use poller pairing a condition with a policy.
#[derive(Clone, Debug)]
pub struct Poller<C> {
    condition: C,
    policy: PollPolicy,
}

impl<C> Poller<C> {
    /// Creates a poller for `condition` governed by `policy`.
    #[must_use]
    pub const fn new(condition: C, policy: PollPolicy) -> Self {
        Self { condition, policy }
    }

    /// Returns the policy this poller was built with.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls the condition against `input` until it holds or the maximum
    /// wait elapses.
    ///
    /// Checks run strictly one after another. Timeout is only declared after
    /// a failed check, so a zero maximum wait still performs exactly one
    /// check.
    ///
    /// # Errors
    ///
    /// Returns the condition's error as soon as a check fails; no further
    /// checks are made.
    pub async fn wait<T>(mut self, input: T) -> Result<PollOutcome<T>, C::Error>
    where
        C: Condition<T>,
    {
        let start = Instant::now();
        if !self.policy.initial_delay.is_zero() {
            sleep(self.policy.initial_delay).await;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            if self.condition.check(&input).await? {
                trace!(attempt, "condition satisfied");
                return Ok(PollOutcome::Success(input));
            }

            let elapsed = start.elapsed();
            if elapsed >= self.policy.max_wait {
                debug!(
                    attempt,
                    ?elapsed,
                    max_wait = ?self.policy.max_wait,
                    "condition not satisfied before timeout"
                );
                return Ok(PollOutcome::TimedOut);
            }

            trace!(attempt, ?elapsed, "condition not yet satisfied");
            sleep(self.policy.period).await;
        }
    }
}

#[cfg(test)]
mod tests;
