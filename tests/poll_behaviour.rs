//! Integration coverage for the poller through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use cloudwait::poll::ConditionFuture;
use cloudwait::test_support::FakeBackend;
use cloudwait::{
    Condition, ConditionError, PollOutcome, PollPolicy, Poller, ServerStatus, ServerStatusIs,
    condition_fn,
};
use rstest::{fixture, rstest};
use tokio::time::Instant;

#[fixture]
fn policy() -> PollPolicy {
    PollPolicy::new(Duration::from_secs(60), Duration::from_secs(5))
        .unwrap_or_else(|err| panic!("policy should be valid: {err}"))
}

/// Condition implemented outside the crate: true once the input length has
/// been observed `target` times.
struct SeenTimes {
    seen: u32,
    target: u32,
}

impl Condition<Vec<u8>> for SeenTimes {
    type Error = std::convert::Infallible;

    fn check<'a>(&'a mut self, input: &'a Vec<u8>) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            if !input.is_empty() {
                self.seen += 1;
            }
            Ok(self.seen >= self.target)
        })
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn external_conditions_plug_into_the_poller(policy: PollPolicy) {
    let started = Instant::now();
    let outcome = Poller::new(SeenTimes { seen: 0, target: 3 }, policy)
        .wait(vec![1, 2, 3])
        .await
        .unwrap_or_else(|never| match never {});

    assert_eq!(outcome, PollOutcome::Success(vec![1, 2, 3]));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn closure_conditions_see_every_attempt(policy: PollPolicy) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let condition = condition_fn(move |_: &()| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, std::convert::Infallible>(false) }
    });

    let outcome = Poller::new(condition, policy)
        .wait(())
        .await
        .unwrap_or_else(|never| match never {});

    assert!(!outcome.is_success());
    // Checks at 0, 5, ..., 60 seconds.
    assert_eq!(calls.load(Ordering::SeqCst), 13);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn server_status_wait_returns_the_handle(policy: PollPolicy) {
    let backend = FakeBackend::new();
    let handle = backend.insert_server(
        "web",
        "fr-par-1",
        vec![ServerStatus::Stopped, ServerStatus::Starting, ServerStatus::Running],
    );

    let outcome = Poller::new(ServerStatusIs::new(&backend, ServerStatus::Running), policy)
        .wait(handle.clone())
        .await
        .unwrap_or_else(|err| panic!("wait should not fail: {err}"));

    assert_eq!(outcome.into_success(), Some(handle));
    assert_eq!(backend.read_count(), 3);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_server_stops_the_wait(policy: PollPolicy) {
    let backend = FakeBackend::new();
    let handle = backend.insert_server("web", "fr-par-1", vec![ServerStatus::Running]);
    let unknown = cloudwait::ServerHandle {
        id: String::from("srv-unknown"),
        zone: handle.zone,
    };

    let err = Poller::new(ServerStatusIs::new(&backend, ServerStatus::Running), policy)
        .wait(unknown)
        .await
        .expect_err("an unknown server cannot reach a status");

    assert!(matches!(err, ConditionError::ServerMissing { .. }));
    assert_eq!(backend.read_count(), 1);
}
