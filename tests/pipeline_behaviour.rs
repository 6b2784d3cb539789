//! End-to-end behaviour tests for the orchestration pipeline, driven
//! entirely through scripted collaborator doubles.

use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use aerolog::test_support::{
    CreateScript, RecordingSink, ScriptedCollector, ScriptedDriver, ScriptedFailure, ScriptedLink,
    ScriptedProvider, ScriptedSession, ScriptedSolver,
};
use aerolog::{
    ChallengeStore, Credentials, DeviceProfile, InstanceState, LoginLocators, Pipeline,
    PipelineTimings, RunMode, RunReport, RunState, SkipDirective, Stage, SupervisorTimings,
};

type TestPipeline =
    Pipeline<ScriptedProvider, ScriptedLink, ScriptedDriver, ScriptedSolver, ScriptedCollector>;

struct Harness {
    provider: ScriptedProvider,
    link: ScriptedLink,
    driver: ScriptedDriver,
    session: ScriptedSession,
    solver: ScriptedSolver,
    collector: ScriptedCollector,
    pipeline: TestPipeline,
    _tmp: TempDir,
}

fn profile() -> DeviceProfile {
    DeviceProfile {
        platform: String::from("android"),
        device_name: String::from("device"),
        app_package: String::from("dji.go.v4"),
        app_activity: String::from("dji.pilot.main.activity.DJILauncherActivity"),
        app_wait_activity: String::from("dji.pilot2.main.activity.DJIMainFragmentActivity"),
        app_path: String::from("/opt/aerolog/pilot.apk"),
    }
}

fn locators() -> LoginLocators {
    LoginLocators::for_package("dji.go.v4")
}

fn fast_timings() -> PipelineTimings {
    PipelineTimings {
        supervisor: SupervisorTimings::default().with_fast_clock(Duration::from_millis(5)),
        session_hang_timeout: Duration::from_millis(25),
        post_start_settle: Duration::ZERO,
        ..PipelineTimings::default()
    }
}

/// Harness with every element a successful run needs.
fn harness() -> Harness {
    let session = ScriptedSession::new();
    let set = locators();
    session.add_present(&set.records_menu);
    session.add_present(&set.records_entry);
    session.add_present(&set.login_button);
    session.add_present(&set.records_refresh);

    let provider = ScriptedProvider::new();
    let link = ScriptedLink::new();
    let driver = ScriptedDriver::new(session.clone());
    let solver = ScriptedSolver::new();
    let collector = ScriptedCollector::new();

    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 tempdir path: {}", path.display()));

    let pipeline = Pipeline::new(
        provider.clone(),
        link.clone(),
        driver.clone(),
        solver.clone(),
        collector.clone(),
        profile(),
        ChallengeStore::new(root),
    )
    .with_timings(fast_timings());

    Harness {
        provider,
        link,
        driver,
        session,
        solver,
        collector,
        pipeline,
        _tmp: tmp,
    }
}

fn run_state() -> RunState {
    RunState::new(
        Credentials {
            login: String::from("pilot@example.com"),
            password: String::from("hunter2"),
        },
        RunMode::Synchronous,
    )
}

fn error_fields(report: &RunReport) -> (&str, Option<&str>, Stage) {
    match report {
        RunReport::Error(payload) => (
            payload.error.as_str(),
            payload.secondary_error.as_deref(),
            payload.stage,
        ),
        RunReport::Ok(_) => panic!("expected an error payload, got: {report:?}"),
    }
}

#[tokio::test]
async fn successful_run_delivers_exactly_one_ok_payload() {
    let fixture = harness();
    let mut run = run_state();
    let mut sink = RecordingSink::new();

    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    assert_eq!(sink.reports().len(), 1, "exactly one final payload");
    assert!(sink.is_closed());
    assert!(run.is_completed());
    assert_eq!(run.stage(), Stage::FilesCopying);
    assert_eq!(fixture.session.quit_calls(), 1);
    assert_eq!(fixture.collector.calls(), 1);
    assert_eq!(fixture.solver.calls(), 0, "no challenge on the clean path");
    assert!(!run.log.is_empty());
}

#[tokio::test]
async fn login_failure_reports_its_stage_and_stops_the_instance_once() {
    let fixture = harness();
    fixture.session.fail_tap(&locators().records_menu);
    // Exists answers: stopped before the run, running for the teardown.
    fixture.provider.push_status(Ok(InstanceState::Stopped));
    fixture.provider.push_status(Ok(InstanceState::Running));
    fixture.provider.push_status(Ok(InstanceState::Stopped));

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    let (code, secondary, stage) = error_fields(&report);
    assert_eq!(code, "provider");
    assert_eq!(secondary, None);
    assert_eq!(stage, Stage::LogsSynchronization);
    assert_eq!(fixture.provider.stop_calls(), 1, "stop attempted exactly once");
    assert_eq!(fixture.session.quit_calls(), 1, "session torn down on failure");
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test]
async fn skip_stop_directive_suppresses_the_instance_stop() {
    let fixture = harness();
    fixture.session.fail_tap(&locators().records_menu);

    let mut run = run_state().with_skips(vec![SkipDirective::InstanceStop]);
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(report.is_error());
    assert_eq!(fixture.provider.stop_calls(), 0);
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test]
async fn skip_start_directive_suppresses_the_instance_start() {
    let fixture = harness();

    let mut run = run_state().with_skips(vec![SkipDirective::InstanceStart]);
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    assert_eq!(fixture.provider.start_calls(), 0);
    assert_eq!(fixture.link.calls(), 0);
}

#[tokio::test]
async fn challenge_is_resolved_before_credentials_are_resubmitted() {
    let fixture = harness();
    let set = locators();
    fixture.session.push_presence(&set.challenge_image, true);

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    assert_eq!(fixture.solver.calls(), 1);

    let typed = fixture.session.typed();
    let verification_entry = typed
        .iter()
        .position(|(field, _)| *field == set.verification_field.to_xpath())
        .unwrap_or_else(|| panic!("solved value should be typed: {typed:?}"));
    let first_login_entry = typed
        .iter()
        .position(|(field, _)| *field == set.email_field.to_xpath())
        .unwrap_or_else(|| panic!("login should be typed first: {typed:?}"));
    assert!(first_login_entry < verification_entry);
    assert_eq!(
        typed.get(verification_entry).map(|(_, text)| text.as_str()),
        Some("424242")
    );
}

#[tokio::test]
async fn rejection_after_challenge_resubmission_is_fatal() {
    let fixture = harness();
    let set = locators();
    fixture.session.push_presence(&set.challenge_image, true);
    // No dialog after the first submission, rejection after the retry.
    fixture.session.push_missing_text(&set.dialog_title);
    fixture.session.push_text(&set.dialog_title, "Invalid Password");

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    let (code, _secondary, stage) = error_fields(&report);
    assert_eq!(code, "incorrect-password");
    assert_eq!(stage, Stage::LogsSynchronization);
    assert_eq!(fixture.solver.calls(), 1);
    assert_eq!(fixture.collector.calls(), 0);
}

#[tokio::test]
async fn stop_failure_after_success_becomes_the_primary_error() {
    let fixture = harness();
    fixture.provider.push_status(Ok(InstanceState::Stopped));
    fixture.provider.push_status(Ok(InstanceState::Running));
    for _ in 0..3 {
        fixture
            .provider
            .push_stop(Err(ScriptedFailure::new("throttled")));
    }

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    let (code, secondary, _stage) = error_fields(&report);
    assert_eq!(code, "stopped-timeout");
    assert_eq!(secondary, None);
    assert_eq!(fixture.collector.calls(), 1, "the run itself succeeded");
}

#[tokio::test]
async fn stop_failure_after_a_failure_is_recorded_as_secondary() {
    let fixture = harness();
    fixture.session.fail_tap(&locators().records_menu);
    fixture.provider.push_status(Ok(InstanceState::Stopped));
    fixture.provider.push_status(Ok(InstanceState::Running));
    for _ in 0..3 {
        fixture
            .provider
            .push_stop(Err(ScriptedFailure::new("throttled")));
    }

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    let (code, secondary, stage) = error_fields(&report);
    assert_eq!(code, "provider");
    assert_eq!(secondary, Some("stopped-timeout"));
    assert_eq!(stage, Stage::LogsSynchronization);
}

#[tokio::test]
async fn hung_session_creation_restarts_the_endpoint_once() {
    let fixture = harness();
    fixture.driver.push_create(CreateScript::Hang);

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    assert_eq!(fixture.driver.restart_calls(), 1);
    assert_eq!(fixture.driver.create_calls(), 2);
}

#[tokio::test]
async fn second_session_failure_is_fatal() {
    let fixture = harness();
    fixture.driver.push_create(CreateScript::Fail);
    fixture.driver.push_create(CreateScript::Fail);

    let mut run = run_state();
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    let (code, _secondary, _stage) = error_fields(&report);
    assert_eq!(code, "session-fatal");
    assert_eq!(fixture.driver.create_calls(), 2, "no third attempt");
}

/// One-shot HTTP endpoint capturing a single POST body.
async fn spawn_capture_endpoint() -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind listener: {err}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener addr: {err}"));

    let handle = tokio::spawn(async move {
        let (mut stream, _peer) = listener
            .accept()
            .await
            .unwrap_or_else(|err| panic!("accept: {err}"));
        let mut request = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream
                .read(&mut chunk)
                .await
                .unwrap_or_else(|err| panic!("read: {err}"));
            if read == 0 {
                break;
            }
            request.extend_from_slice(chunk.get(..read).unwrap_or_default());
            let text = String::from_utf8_lossy(&request);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|value| value.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .await
            .unwrap_or_else(|err| panic!("write response: {err}"));
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}/callback"), handle)
}

#[tokio::test]
async fn fire_and_acknowledge_posts_the_final_payload() {
    let fixture = harness();
    let (endpoint, captured) = spawn_capture_endpoint().await;

    let mut run = RunState::new(
        Credentials {
            login: String::from("pilot@example.com"),
            password: String::from("hunter2"),
        },
        RunMode::FireAndAcknowledge {
            success_endpoint: endpoint.clone(),
            error_endpoint: endpoint,
        },
    );
    let mut sink = RecordingSink::new();
    let report = fixture.pipeline.execute(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    // The sink only ever sees the acknowledgment.
    assert_eq!(sink.reports().len(), 1);
    assert!(sink.is_closed());
    let ack = serde_json::to_string(
        sink.reports()
            .first()
            .unwrap_or_else(|| panic!("ack payload missing")),
    )
    .unwrap_or_else(|err| panic!("ack should serialise: {err}"));
    assert!(ack.contains("Your request is processing"), "ack: {ack}");

    let request = captured
        .await
        .unwrap_or_else(|err| panic!("capture task: {err}"));
    assert!(request.contains("POST /callback"), "request: {request}");
    assert!(request.contains(r#""status":"ok""#), "request: {request}");
    assert!(request.contains(r#""log""#), "request: {request}");
}

#[tokio::test]
async fn start_instance_operation_reports_the_state() {
    let fixture = harness();
    let mut run = run_state();
    let mut sink = RecordingSink::new();

    let report = fixture.pipeline.start_instance(&mut run, &mut sink).await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    let value =
        serde_json::to_value(&report).unwrap_or_else(|err| panic!("payload serialise: {err}"));
    assert_eq!(
        value.get("state").and_then(|v| v.as_str()),
        Some("running")
    );
    assert_eq!(fixture.link.calls(), 1);
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test]
async fn solve_captcha_operation_bypasses_the_device() {
    let fixture = harness();
    let mut run = run_state();
    let mut sink = RecordingSink::new();

    let report = fixture
        .pipeline
        .solve_captcha(&mut run, "ZmFrZS1pbWFnZQ==", &mut sink)
        .await;

    assert!(!report.is_error(), "unexpected payload: {report:?}");
    assert_eq!(fixture.solver.payloads(), vec![String::from("ZmFrZS1pbWFnZQ==")]);
    assert_eq!(fixture.driver.create_calls(), 0, "no session is opened");
    let value =
        serde_json::to_value(&report).unwrap_or_else(|err| panic!("payload serialise: {err}"));
    assert_eq!(
        value.get("solution").and_then(|v| v.as_str()),
        Some("424242")
    );
}

#[tokio::test]
async fn artifact_paths_operation_reports_the_store_layout() {
    let fixture = harness();
    let mut run = run_state();
    let mut sink = RecordingSink::new();

    let report = fixture.pipeline.artifact_paths(&mut run, &mut sink).await;

    let value =
        serde_json::to_value(&report).unwrap_or_else(|err| panic!("payload serialise: {err}"));
    let screenshots = value
        .get("screenshots")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(screenshots.ends_with("captchas/o"), "paths: {value}");
    let user_logs = value
        .get("userslogs")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(user_logs.ends_with("userslogs"), "paths: {value}");
}
