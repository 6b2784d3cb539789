//! Behaviour tests for the instance supervisor.

use std::time::Duration;

use crate::provider::{InstanceState, StatusKind};
use crate::runlog::RunLog;
use crate::test_support::{ScriptedFailure, ScriptedLink, ScriptedProvider};

use super::{InstanceError, InstanceSupervisor, SupervisorTimings};

fn fast_timings() -> SupervisorTimings {
    SupervisorTimings::default().with_fast_clock(Duration::from_millis(5))
}

fn supervisor(
    provider: &ScriptedProvider,
    link: &ScriptedLink,
) -> InstanceSupervisor<ScriptedProvider, ScriptedLink> {
    InstanceSupervisor::new(provider.clone(), link.clone(), RunLog::new())
        .with_timings(fast_timings())
}

#[tokio::test]
async fn start_succeeds_on_the_fifth_attempt() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    for _ in 0..4 {
        provider.push_start(Err(ScriptedFailure::new("throttled")));
    }
    provider.push_start(Ok(InstanceState::Running));

    let state = supervisor(&provider, &link)
        .ensure_running()
        .await
        .unwrap_or_else(|err| panic!("fifth attempt should succeed: {err}"));

    assert_eq!(state, InstanceState::Running);
    assert_eq!(provider.start_calls(), 5);
    assert_eq!(link.calls(), 1);
}

#[tokio::test]
async fn start_gives_up_after_five_attempts() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    for _ in 0..6 {
        provider.push_start(Err(ScriptedFailure::new("throttled")));
    }

    let err = supervisor(&provider, &link)
        .ensure_running()
        .await
        .expect_err("exhausted retries should fail");

    assert_eq!(err, InstanceError::StartTimeout);
    assert_eq!(provider.start_calls(), 5, "no sixth attempt is allowed");
    assert_eq!(link.calls(), 0);
}

#[tokio::test]
async fn running_instance_short_circuits_to_the_link_check() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Running));

    let state = supervisor(&provider, &link)
        .ensure_running()
        .await
        .unwrap_or_else(|err| panic!("running instance should short-circuit: {err}"));

    assert_eq!(state, InstanceState::Running);
    assert_eq!(provider.start_calls(), 0);
    assert_eq!(link.calls(), 1);
}

#[tokio::test]
async fn stopping_instance_is_waited_out_before_a_cold_start() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Stopping)); // exists query
    provider.push_status(Ok(InstanceState::Stopping)); // first stopped poll
    provider.push_status(Ok(InstanceState::Stopped)); // stopped

    let state = supervisor(&provider, &link)
        .ensure_running()
        .await
        .unwrap_or_else(|err| panic!("stopping instance should recover: {err}"));

    assert_eq!(state, InstanceState::Running);
    assert_eq!(provider.start_calls(), 1);
}

#[tokio::test]
async fn pending_start_waits_for_the_running_state() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Stopped)); // exists query
    provider.push_start(Ok(InstanceState::Pending));
    provider.push_status(Ok(InstanceState::Pending)); // first running poll
    provider.push_status(Ok(InstanceState::Running));
    provider.set_status_default(InstanceState::Running);

    let state = supervisor(&provider, &link)
        .ensure_running()
        .await
        .unwrap_or_else(|err| panic!("pending instance should settle: {err}"));

    assert_eq!(state, InstanceState::Running);
    let kinds = provider.status_kinds();
    assert_eq!(kinds.first().copied(), Some(StatusKind::Exists));
    assert!(kinds.contains(&StatusKind::Running));
}

#[tokio::test]
async fn running_wait_fails_at_the_hard_timeout() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Stopped)); // exists query
    provider.push_start(Ok(InstanceState::Pending));
    provider.set_status_default(InstanceState::Pending); // never reaches running

    let err = supervisor(&provider, &link)
        .ensure_running()
        .await
        .expect_err("stuck instance should time out");

    assert_eq!(err, InstanceError::RunningTimeout);
    assert_eq!(link.calls(), 0);
}

#[tokio::test]
async fn exhausted_device_link_attempts_fail_the_run() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    for _ in 0..5 {
        link.push_connect(Err(ScriptedFailure::new("bridge refused")));
    }

    let err = supervisor(&provider, &link)
        .ensure_running()
        .await
        .expect_err("unreachable bridge should fail");

    assert_eq!(err, InstanceError::DeviceLink { attempts: 5 });
    assert_eq!(link.calls(), 5);
}

#[tokio::test]
async fn exists_query_failure_surfaces_immediately() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Err(ScriptedFailure::new("denied")));

    let err = supervisor(&provider, &link)
        .ensure_running()
        .await
        .expect_err("query failure should not be retried");

    assert!(matches!(err, InstanceError::Provider { ref message } if message.contains("denied")));
    assert_eq!(provider.start_calls(), 0);
}

#[tokio::test]
async fn stopped_instance_short_circuits_ensure_stopped() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Stopped));

    let state = supervisor(&provider, &link)
        .ensure_stopped()
        .await
        .unwrap_or_else(|err| panic!("stopped instance should short-circuit: {err}"));

    assert_eq!(state, InstanceState::Stopped);
    assert_eq!(provider.stop_calls(), 0);
}

#[tokio::test]
async fn stop_retries_then_waits_for_the_stopped_state() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Running)); // exists query
    provider.push_stop(Err(ScriptedFailure::new("throttled")));
    provider.push_stop(Err(ScriptedFailure::new("throttled")));
    provider.push_stop(Ok(InstanceState::Stopping));

    let state = supervisor(&provider, &link)
        .ensure_stopped()
        .await
        .unwrap_or_else(|err| panic!("third stop attempt should succeed: {err}"));

    assert_eq!(state, InstanceState::Stopped);
    assert_eq!(provider.stop_calls(), 3);
}

#[tokio::test]
async fn stop_gives_up_after_three_attempts() {
    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    provider.push_status(Ok(InstanceState::Running));
    for _ in 0..4 {
        provider.push_stop(Err(ScriptedFailure::new("throttled")));
    }

    let err = supervisor(&provider, &link)
        .ensure_stopped()
        .await
        .expect_err("exhausted stop retries should fail");

    assert_eq!(err, InstanceError::StoppedTimeout);
    assert_eq!(provider.stop_calls(), 3, "no fourth attempt is allowed");
}
