//! Tests for provider state parsing and status kinds.

use rstest::rstest;

use super::{InstanceState, StatusKind};

#[rstest]
#[case("running", InstanceState::Running)]
#[case("RUNNING", InstanceState::Running)]
#[case(" Stopped ", InstanceState::Stopped)]
#[case("stopping", InstanceState::Stopping)]
#[case("pending", InstanceState::Pending)]
#[case("not-existing", InstanceState::NotExisting)]
#[case("terminated", InstanceState::NotExisting)]
#[case("rebooting", InstanceState::Unknown)]
#[case("", InstanceState::Unknown)]
fn provider_states_parse_case_insensitively(#[case] raw: &str, #[case] expected: InstanceState) {
    assert_eq!(InstanceState::from_provider(raw), expected);
}

#[test]
fn state_names_round_trip_through_as_str() {
    for state in [
        InstanceState::NotExisting,
        InstanceState::Pending,
        InstanceState::Running,
        InstanceState::Stopping,
        InstanceState::Stopped,
    ] {
        assert_eq!(InstanceState::from_provider(state.as_str()), state);
    }
}

#[test]
fn status_kinds_use_wire_names() {
    assert_eq!(StatusKind::Exists.as_str(), "exists");
    assert_eq!(StatusKind::Running.as_str(), "running");
    assert_eq!(StatusKind::Stopped.as_str(), "stopped");
}
