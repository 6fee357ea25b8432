//! Timing and ordering tests for the await-condition poller.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rstest::rstest;
use tokio::time::Instant;

use super::*;

fn policy(max_wait_ms: u64, period_ms: u64) -> PollPolicy {
    PollPolicy::new(
        Duration::from_millis(max_wait_ms),
        Duration::from_millis(period_ms),
    )
    .unwrap_or_else(|err| panic!("policy should be valid: {err}"))
}

/// Condition that turns true on the `succeed_on`-th call and counts calls.
fn true_on_call(
    succeed_on: u32,
    calls: Arc<AtomicU32>,
) -> impl Condition<&'static str, Error = Infallible> {
    condition_fn(move |_: &&'static str| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok::<_, Infallible>(call >= succeed_on) }
    })
}

#[test]
fn zero_period_is_rejected() {
    let err = PollPolicy::new(Duration::from_secs(1), Duration::ZERO)
        .expect_err("zero period must be rejected");
    assert!(matches!(err, PollError::Configuration(_)));
}

#[test]
fn zero_max_wait_is_accepted() {
    let policy = PollPolicy::new(Duration::ZERO, Duration::from_millis(10))
        .expect("zero max wait is valid");
    assert_eq!(policy.max_wait(), Duration::ZERO);
    assert_eq!(policy.initial_delay(), Duration::ZERO);
}

#[test]
fn initial_delay_is_clamped_to_max_wait() {
    let clamped = policy(100, 10).with_initial_delay(Duration::from_millis(500));
    assert_eq!(clamped.initial_delay(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn zero_max_wait_checks_once_without_sleeping() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let outcome = Poller::new(true_on_call(u32::MAX, Arc::clone(&calls)), policy(0, 100))
        .wait("server")
        .await
        .unwrap_or_else(|never| match never {});

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn counter_condition_succeeds_after_three_checks() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let outcome = Poller::new(true_on_call(3, Arc::clone(&calls)), policy(1000, 100))
        .wait("server")
        .await
        .unwrap_or_else(|never| match never {});

    assert_eq!(outcome, PollOutcome::Success("server"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn always_false_times_out_within_one_period() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let outcome = Poller::new(true_on_call(u32::MAX, Arc::clone(&calls)), policy(300, 100))
        .wait("server")
        .await
        .unwrap_or_else(|never| match never {});

    let elapsed = start.elapsed();
    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(
        (3..=4).contains(&calls.load(Ordering::SeqCst)),
        "unexpected number of checks: {}",
        calls.load(Ordering::SeqCst)
    );
    assert!(
        elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400),
        "timeout outside [max_wait, max_wait + period): {elapsed:?}"
    );
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
#[tokio::test(start_paused = true)]
async fn success_on_nth_call_overshoots_by_at_most_one_period(#[case] succeed_on: u32) {
    let period = Duration::from_millis(50);
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let outcome = Poller::new(
        true_on_call(succeed_on, Arc::clone(&calls)),
        policy(10_000, 50),
    )
    .wait("server")
    .await
    .unwrap_or_else(|never| match never {});

    let elapsed = start.elapsed();
    let lower = period * (succeed_on - 1);
    assert!(outcome.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), succeed_on);
    assert!(
        elapsed >= lower && elapsed <= lower + period,
        "elapsed {elapsed:?} outside [{lower:?}, {:?}]",
        lower + period
    );
}

#[tokio::test(start_paused = true)]
async fn condition_error_is_propagated_without_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let failing = condition_fn(move |_: &u8| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call == 2 {
                Err(String::from("status endpoint unavailable"))
            } else {
                Ok(false)
            }
        }
    });

    let err = Poller::new(failing, policy(10_000, 100))
        .wait(7)
        .await
        .expect_err("second check should fail");

    assert_eq!(err, "status endpoint unavailable");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn initial_delay_postpones_first_check() {
    let start = Instant::now();
    let ready = condition_fn(|_: &()| async { Ok::<_, Infallible>(true) });

    let outcome = Poller::new(
        ready,
        policy(1000, 100).with_initial_delay(Duration::from_millis(250)),
    )
    .wait(())
    .await
    .unwrap_or_else(|never| match never {});

    assert!(outcome.is_success());
    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn stateful_condition_observes_each_attempt() {
    struct Countdown {
        remaining: u32,
    }

    impl Condition<String> for Countdown {
        type Error = Infallible;

        fn check<'a>(&'a mut self, input: &'a String) -> ConditionFuture<'a, Self::Error> {
            Box::pin(async move {
                assert_eq!(input, "snapshot-1");
                self.remaining = self.remaining.saturating_sub(1);
                Ok(self.remaining == 0)
            })
        }
    }

    let outcome = Poller::new(Countdown { remaining: 4 }, policy(1000, 10))
        .wait(String::from("snapshot-1"))
        .await
        .unwrap_or_else(|never| match never {});

    assert_eq!(outcome.into_success().as_deref(), Some("snapshot-1"));
}

#[test]
fn timed_out_outcome_converts_into_error() {
    let outcome: PollOutcome<u8> = PollOutcome::TimedOut;
    assert!(!outcome.is_success());
    assert_eq!(outcome.ok_or_else(|| "timeout"), Err("timeout"));
    assert_eq!(PollOutcome::Success(3_u8).ok_or_else(|| "timeout"), Ok(3));
}
