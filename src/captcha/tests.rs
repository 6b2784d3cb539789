//! Behaviour tests for challenge detection and resolution.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::device::ElementRegion;
use crate::login::LoginLocators;
use crate::runlog::RunLog;
use crate::test_support::{ScriptedFailure, ScriptedSession, ScriptedSolver, tiny_png};

use super::{CaptchaCoordinator, CaptchaError, ChallengeStore, crop_challenge};

fn challenge_locator() -> crate::device::Locator {
    LoginLocators::for_package("dji.go.v4").challenge_image
}

fn temp_store() -> (TempDir, ChallengeStore) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 tempdir path: {}", path.display()));
    (tmp, ChallengeStore::new(root))
}

#[test]
fn crop_matches_the_requested_region() {
    let screenshot = tiny_png(64, 64);
    let crop = crop_challenge(
        &screenshot,
        ElementRegion {
            x: 8,
            y: 8,
            width: 32,
            height: 16,
        },
    )
    .unwrap_or_else(|err| panic!("crop should succeed: {err}"));

    let decoded =
        image::load_from_memory(&crop).unwrap_or_else(|err| panic!("crop should decode: {err}"));
    assert_eq!((decoded.width(), decoded.height()), (32, 16));
}

#[test]
fn crop_clamps_to_the_screenshot_bounds() {
    let screenshot = tiny_png(64, 64);
    let crop = crop_challenge(
        &screenshot,
        ElementRegion {
            x: 60,
            y: 60,
            width: 32,
            height: 32,
        },
    )
    .unwrap_or_else(|err| panic!("clamped crop should succeed: {err}"));

    let decoded =
        image::load_from_memory(&crop).unwrap_or_else(|err| panic!("crop should decode: {err}"));
    assert_eq!((decoded.width(), decoded.height()), (4, 4));
}

#[test]
fn off_screen_region_is_rejected() {
    let screenshot = tiny_png(64, 64);
    let result = crop_challenge(
        &screenshot,
        ElementRegion {
            x: 128,
            y: 0,
            width: 16,
            height: 16,
        },
    );
    assert!(matches!(result, Err(CaptchaError::Flow { .. })));
}

#[test]
fn garbage_screenshot_is_rejected() {
    let result = crop_challenge(
        b"not a png",
        ElementRegion {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
        },
    );
    assert!(matches!(result, Err(CaptchaError::Flow { .. })));
}

#[tokio::test]
async fn detect_reports_the_challenge_element() {
    let session = ScriptedSession::new();
    let solver = ScriptedSolver::new();
    let (_tmp, store) = temp_store();
    session.push_presence(&challenge_locator(), true);

    let coordinator = CaptchaCoordinator::new(
        &session,
        &solver,
        &store,
        challenge_locator(),
        RunLog::new(),
    );

    let first = coordinator
        .detect()
        .await
        .unwrap_or_else(|err| panic!("detect: {err}"));
    let second = coordinator
        .detect()
        .await
        .unwrap_or_else(|err| panic!("detect: {err}"));
    assert!(first);
    assert!(!second, "presence queue drained, element is gone");
}

#[tokio::test]
async fn resolve_submits_the_encoded_crop() {
    let session = ScriptedSession::new();
    let solver = ScriptedSolver::new();
    let (_tmp, store) = temp_store();
    session.set_region(
        &challenge_locator(),
        ElementRegion {
            x: 4,
            y: 4,
            width: 24,
            height: 12,
        },
    );

    let coordinator = CaptchaCoordinator::new(
        &session,
        &solver,
        &store,
        challenge_locator(),
        RunLog::new(),
    );

    let solution = coordinator
        .resolve()
        .await
        .unwrap_or_else(|err| panic!("resolve should succeed: {err}"));

    assert_eq!(solution, "424242");
    let payloads = solver.payloads();
    let payload = payloads.first().unwrap_or_else(|| panic!("one submission"));
    let crop = BASE64
        .decode(payload.as_bytes())
        .unwrap_or_else(|err| panic!("payload should be base64: {err}"));
    let decoded =
        image::load_from_memory(&crop).unwrap_or_else(|err| panic!("payload should decode: {err}"));
    assert_eq!((decoded.width(), decoded.height()), (24, 12));

    let stored = std::fs::read_dir(store.challenge_dir().as_std_path())
        .unwrap_or_else(|err| panic!("store dir should exist: {err}"))
        .count();
    assert_eq!(stored, 2, "one screenshot and one crop are kept");
}

#[tokio::test]
async fn solver_failure_is_fatal() {
    let session = ScriptedSession::new();
    let solver = ScriptedSolver::new();
    let (_tmp, store) = temp_store();
    solver.push_solution(Err(ScriptedFailure::new("no credit")));

    let coordinator = CaptchaCoordinator::new(
        &session,
        &solver,
        &store,
        challenge_locator(),
        RunLog::new(),
    );

    let err = coordinator
        .resolve()
        .await
        .expect_err("solver failure should be fatal");
    assert!(matches!(err, CaptchaError::Solver { .. }), "unexpected: {err}");
}
