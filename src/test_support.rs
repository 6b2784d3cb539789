//! Test support utilities shared across unit and integration tests.
//!
//! Scripted doubles return pre-seeded outcomes in FIFO order and record
//! every invocation, so behaviour tests drive the orchestration without
//! a control plane, an automation endpoint, or a solver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use crate::artifacts::{ArtifactCollector, ArtifactSummary};
use crate::captcha::CaptchaSolver;
use crate::device::{
    AutomationDriver, AutomationSession, DeviceProfile, DriverError, DriverFuture, ElementRegion,
    Locator,
};
use crate::instance::DeviceLink;
use crate::provider::{InstanceProvider, InstanceState, ProviderFuture, StatusKind};
use crate::run::{DeliveryError, ResponseSink, RunReport};

/// Error returned by every scripted double.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted failure: {0}")]
pub struct ScriptedFailure(
    /// Description of the scripted failure.
    pub String,
);

impl ScriptedFailure {
    /// Convenience constructor.
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self(String::from(message))
    }
}

fn locked<T>(state: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    state
        .lock()
        .unwrap_or_else(|err| panic!("scripted double lock poisoned: {err}"))
}

/// Scripted compute provider.
///
/// Defaults describe a healthy stopped instance: status queries answer
/// `stopped`, start requests acknowledge `running`, stop requests
/// acknowledge `stopped`.
#[derive(Clone, Debug)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderScript>>,
}

#[derive(Debug)]
struct ProviderScript {
    start_plan: VecDeque<Result<InstanceState, ScriptedFailure>>,
    stop_plan: VecDeque<Result<InstanceState, ScriptedFailure>>,
    status_plan: VecDeque<Result<InstanceState, ScriptedFailure>>,
    status_default: InstanceState,
    start_calls: u32,
    stop_calls: u32,
    status_kinds: Vec<StatusKind>,
}

impl Default for ProviderScript {
    fn default() -> Self {
        Self {
            start_plan: VecDeque::new(),
            stop_plan: VecDeque::new(),
            status_plan: VecDeque::new(),
            status_default: InstanceState::Stopped,
            start_calls: 0,
            stop_calls: 0,
            status_kinds: Vec::new(),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderScript::default())),
        }
    }
}

impl ScriptedProvider {
    /// Creates a provider with the default healthy script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a start response.
    pub fn push_start(&self, result: Result<InstanceState, ScriptedFailure>) {
        locked(&self.state).start_plan.push_back(result);
    }

    /// Queues a stop response.
    pub fn push_stop(&self, result: Result<InstanceState, ScriptedFailure>) {
        locked(&self.state).stop_plan.push_back(result);
    }

    /// Queues a status response.
    pub fn push_status(&self, result: Result<InstanceState, ScriptedFailure>) {
        locked(&self.state).status_plan.push_back(result);
    }

    /// Sets the state reported once the status queue is drained.
    pub fn set_status_default(&self, state: InstanceState) {
        locked(&self.state).status_default = state;
    }

    /// Number of start requests made.
    #[must_use]
    pub fn start_calls(&self) -> u32 {
        locked(&self.state).start_calls
    }

    /// Number of stop requests made.
    #[must_use]
    pub fn stop_calls(&self) -> u32 {
        locked(&self.state).stop_calls
    }

    /// Status kinds queried, in order.
    #[must_use]
    pub fn status_kinds(&self) -> Vec<StatusKind> {
        locked(&self.state).status_kinds.clone()
    }
}

impl InstanceProvider for ScriptedProvider {
    type Error = ScriptedFailure;

    fn start(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.start_calls += 1;
            script
                .start_plan
                .pop_front()
                .unwrap_or(Ok(InstanceState::Running))
        })
    }

    fn stop(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.stop_calls += 1;
            script
                .stop_plan
                .pop_front()
                .unwrap_or(Ok(InstanceState::Stopped))
        })
    }

    fn status(&self, kind: StatusKind) -> ProviderFuture<'_, InstanceState, Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.status_kinds.push(kind);
            let fallback = script.status_default;
            script.status_plan.pop_front().unwrap_or(Ok(fallback))
        })
    }
}

/// Scripted device link; connects successfully by default.
#[derive(Clone, Debug, Default)]
pub struct ScriptedLink {
    state: Arc<Mutex<LinkScript>>,
}

#[derive(Debug, Default)]
struct LinkScript {
    plan: VecDeque<Result<(), ScriptedFailure>>,
    calls: u32,
}

impl ScriptedLink {
    /// Creates a link that connects on the first attempt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connect outcome.
    pub fn push_connect(&self, result: Result<(), ScriptedFailure>) {
        locked(&self.state).plan.push_back(result);
    }

    /// Number of connect attempts made.
    #[must_use]
    pub fn calls(&self) -> u32 {
        locked(&self.state).calls
    }
}

impl DeviceLink for ScriptedLink {
    type Error = ScriptedFailure;

    fn connect(&self) -> ProviderFuture<'_, (), Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.calls += 1;
            script.plan.pop_front().unwrap_or(Ok(()))
        })
    }
}

/// Scripted automation session keyed by rendered locator.
///
/// Elements listed as present can be tapped and found; `exists` answers
/// can additionally be queued per locator, as can `read_text` answers.
/// Settle calls record their duration and return immediately so tests
/// never sleep through production delays.
#[derive(Clone, Debug)]
pub struct ScriptedSession {
    state: Arc<Mutex<SessionScript>>,
}

#[derive(Debug)]
struct SessionScript {
    present: HashSet<String>,
    presence_plans: HashMap<String, VecDeque<bool>>,
    text_plans: HashMap<String, VecDeque<Option<String>>>,
    regions: HashMap<String, ElementRegion>,
    screenshot: Vec<u8>,
    fail_taps: HashSet<String>,
    taps: Vec<String>,
    typed: Vec<(String, String)>,
    settles: Vec<Duration>,
    quit_calls: u32,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            present: HashSet::new(),
            presence_plans: HashMap::new(),
            text_plans: HashMap::new(),
            regions: HashMap::new(),
            screenshot: tiny_png(64, 64),
            fail_taps: HashSet::new(),
            taps: Vec::new(),
            typed: Vec::new(),
            settles: Vec::new(),
            quit_calls: 0,
        }
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionScript::default())),
        }
    }
}

/// Renders a one-colour PNG for screenshot scripting.
#[must_use]
pub fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let buffer = image::RgbaImage::from_pixel(width, height, image::Rgba([8, 8, 8, 255]));
    let mut encoded = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut encoded, image::ImageFormat::Png)
        .unwrap_or_else(|err| panic!("test png encode: {err}"));
    encoded.into_inner()
}

impl ScriptedSession {
    /// Creates an empty session script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an element as present.
    pub fn add_present(&self, locator: &Locator) {
        locked(&self.state).present.insert(locator.to_xpath());
    }

    /// Queues one `exists` answer for the locator.
    pub fn push_presence(&self, locator: &Locator, present: bool) {
        locked(&self.state)
            .presence_plans
            .entry(locator.to_xpath())
            .or_default()
            .push_back(present);
    }

    /// Queues one `read_text` answer for the locator.
    pub fn push_text(&self, locator: &Locator, text: &str) {
        locked(&self.state)
            .text_plans
            .entry(locator.to_xpath())
            .or_default()
            .push_back(Some(String::from(text)));
    }

    /// Queues one absent-element answer for `read_text` on the locator.
    pub fn push_missing_text(&self, locator: &Locator) {
        locked(&self.state)
            .text_plans
            .entry(locator.to_xpath())
            .or_default()
            .push_back(None);
    }

    /// Sets the region reported for the locator.
    pub fn set_region(&self, locator: &Locator, region: ElementRegion) {
        locked(&self.state)
            .regions
            .insert(locator.to_xpath(), region);
    }

    /// Replaces the scripted screenshot bytes.
    pub fn set_screenshot(&self, png: Vec<u8>) {
        locked(&self.state).screenshot = png;
    }

    /// Makes taps on the locator fail with an endpoint error.
    pub fn fail_tap(&self, locator: &Locator) {
        locked(&self.state).fail_taps.insert(locator.to_xpath());
    }

    /// Rendered locators tapped, in order.
    #[must_use]
    pub fn taps(&self) -> Vec<String> {
        locked(&self.state).taps.clone()
    }

    /// Text typed per rendered locator, in order.
    #[must_use]
    pub fn typed(&self) -> Vec<(String, String)> {
        locked(&self.state).typed.clone()
    }

    /// Settle durations observed, in order.
    #[must_use]
    pub fn settles(&self) -> Vec<Duration> {
        locked(&self.state).settles.clone()
    }

    /// Number of quit calls observed.
    #[must_use]
    pub fn quit_calls(&self) -> u32 {
        locked(&self.state).quit_calls
    }

    fn is_present(script: &mut SessionScript, xpath: &str) -> bool {
        if let Some(plan) = script.presence_plans.get_mut(xpath) {
            if let Some(answer) = plan.pop_front() {
                return answer;
            }
        }
        script.present.contains(xpath)
    }
}

impl AutomationSession for ScriptedSession {
    fn exists<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            Ok(Self::is_present(&mut script, &locator.to_xpath()))
        })
    }

    fn tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let xpath = locator.to_xpath();
            let mut script = locked(&state);
            if script.fail_taps.contains(&xpath) {
                return Err(DriverError::Endpoint {
                    message: format!("scripted tap failure for {xpath}"),
                });
            }
            if !Self::is_present(&mut script, &xpath) {
                return Err(DriverError::NotFound { locator: xpath });
            }
            script.taps.push(xpath);
            Ok(())
        })
    }

    fn try_tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let xpath = locator.to_xpath();
            let mut script = locked(&state);
            if Self::is_present(&mut script, &xpath) {
                script.taps.push(xpath);
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    fn type_text<'a>(&'a self, locator: &'a Locator, text: &'a str) -> DriverFuture<'a, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            locked(&state)
                .typed
                .push((locator.to_xpath(), String::from(text)));
            Ok(())
        })
    }

    fn read_text<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, Option<String>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let xpath = locator.to_xpath();
            let mut script = locked(&state);
            if let Some(plan) = script.text_plans.get_mut(&xpath) {
                if let Some(answer) = plan.pop_front() {
                    return Ok(answer);
                }
            }
            Ok(None)
        })
    }

    fn region_of<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ElementRegion> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let xpath = locator.to_xpath();
            let script = locked(&state);
            Ok(script.regions.get(&xpath).copied().unwrap_or(ElementRegion {
                x: 8,
                y: 8,
                width: 32,
                height: 16,
            }))
        })
    }

    fn screenshot(&self) -> DriverFuture<'_, Vec<u8>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { Ok(locked(&state).screenshot.clone()) })
    }

    fn settle(&self, duration: Duration) -> DriverFuture<'_, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            locked(&state).settles.push(duration);
            Ok(())
        })
    }

    fn quit(&self) -> DriverFuture<'_, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            locked(&state).quit_calls += 1;
            Ok(())
        })
    }
}

/// Per-attempt behaviour of [`ScriptedDriver::create_session`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateScript {
    /// Hand out the scripted session.
    Succeed,
    /// Fail with an endpoint error.
    Fail,
    /// Never resolve, simulating a hung endpoint.
    Hang,
}

/// Scripted automation driver handing out clones of one session script.
#[derive(Clone, Debug)]
pub struct ScriptedDriver {
    session: ScriptedSession,
    state: Arc<Mutex<DriverScript>>,
}

#[derive(Debug, Default)]
struct DriverScript {
    create_plan: VecDeque<CreateScript>,
    create_calls: u32,
    restart_calls: u32,
}

impl ScriptedDriver {
    /// Creates a driver that hands out `session` on every attempt.
    #[must_use]
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session,
            state: Arc::new(Mutex::new(DriverScript::default())),
        }
    }

    /// Queues one create-session behaviour.
    pub fn push_create(&self, script: CreateScript) {
        locked(&self.state).create_plan.push_back(script);
    }

    /// Number of create attempts observed.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        locked(&self.state).create_calls
    }

    /// Number of endpoint restarts observed.
    #[must_use]
    pub fn restart_calls(&self) -> u32 {
        locked(&self.state).restart_calls
    }
}

impl AutomationDriver for ScriptedDriver {
    type Session = ScriptedSession;

    fn create_session<'a>(&'a self, _profile: &'a DeviceProfile) -> DriverFuture<'a, Self::Session> {
        let state = Arc::clone(&self.state);
        let session = self.session.clone();
        Box::pin(async move {
            let script = {
                let mut driver = locked(&state);
                driver.create_calls += 1;
                driver
                    .create_plan
                    .pop_front()
                    .unwrap_or(CreateScript::Succeed)
            };
            match script {
                CreateScript::Succeed => Ok(session),
                CreateScript::Fail => Err(DriverError::Endpoint {
                    message: String::from("scripted create failure"),
                }),
                CreateScript::Hang => {
                    std::future::pending::<()>().await;
                    Err(DriverError::Endpoint {
                        message: String::from("unreachable: pending resolved"),
                    })
                }
            }
        })
    }

    fn restart_endpoint(&self) -> DriverFuture<'_, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            locked(&state).restart_calls += 1;
            Ok(())
        })
    }
}

/// Scripted challenge solver; answers `424242` by default.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSolver {
    state: Arc<Mutex<SolverScript>>,
}

#[derive(Debug, Default)]
struct SolverScript {
    plan: VecDeque<Result<String, ScriptedFailure>>,
    payloads: Vec<String>,
}

impl ScriptedSolver {
    /// Creates a solver with the default answer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one solve outcome.
    pub fn push_solution(&self, result: Result<String, ScriptedFailure>) {
        locked(&self.state).plan.push_back(result);
    }

    /// Encoded payloads received, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<String> {
        locked(&self.state).payloads.clone()
    }

    /// Number of solve calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        locked(&self.state).payloads.len()
    }
}

impl CaptchaSolver for ScriptedSolver {
    type Error = ScriptedFailure;

    fn solve<'a>(&'a self, image_base64: &'a str) -> ProviderFuture<'a, String, Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.payloads.push(String::from(image_base64));
            script
                .plan
                .pop_front()
                .unwrap_or_else(|| Ok(String::from("424242")))
        })
    }
}

/// Scripted artifact collector; copies two files by default.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCollector {
    state: Arc<Mutex<CollectorScript>>,
}

#[derive(Debug, Default)]
struct CollectorScript {
    plan: VecDeque<Result<ArtifactSummary, ScriptedFailure>>,
    calls: u32,
}

impl ScriptedCollector {
    /// Creates a collector with the default summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one collection outcome.
    pub fn push_result(&self, result: Result<ArtifactSummary, ScriptedFailure>) {
        locked(&self.state).plan.push_back(result);
    }

    /// Number of collection calls observed.
    #[must_use]
    pub fn calls(&self) -> u32 {
        locked(&self.state).calls
    }
}

impl ArtifactCollector for ScriptedCollector {
    type Error = ScriptedFailure;

    fn collect<'a>(
        &'a self,
        _log: &'a crate::runlog::RunLog,
    ) -> ProviderFuture<'a, ArtifactSummary, Self::Error> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut script = locked(&state);
            script.calls += 1;
            script.plan.pop_front().unwrap_or_else(|| {
                Ok(ArtifactSummary {
                    files_copied: 2,
                    destination: camino::Utf8PathBuf::from("userslogs/pilot"),
                })
            })
        })
    }
}

/// Response sink that records every payload it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Vec<RunReport>,
    closed: bool,
    fail_writes: bool,
}

impl RecordingSink {
    /// Creates an open sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Payloads written so far.
    #[must_use]
    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    /// Whether the sink was closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ResponseSink for RecordingSink {
    fn write(&mut self, report: &RunReport) -> Result<(), DeliveryError> {
        if self.fail_writes {
            return Err(DeliveryError::Failed {
                message: String::from("scripted sink failure"),
            });
        }
        self.reports.push(report.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
