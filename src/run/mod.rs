//! End-to-end orchestration of one login-and-collect run.
//!
//! The pipeline sequences the instance supervisor, the automation
//! session, the login flow, challenge resolution, and artifact
//! collection, then tears everything down symmetrically: the session is
//! destroyed and the instance stop is attempted on both the success and
//! the failure path. The caller is notified exactly once.

use std::time::Duration;

use tokio::time::sleep;

use crate::artifacts::{ArtifactCollector, ArtifactSummary};
use crate::captcha::{CaptchaCoordinator, CaptchaSolver, ChallengeStore};
use crate::device::{AutomationDriver, DeviceProfile, SessionSupervisor, session};
use crate::instance::{DeviceLink, InstanceSupervisor, SupervisorTimings};
use crate::login::{LoginFlow, LoginLocators, LoginOutcome, LoginTimings};
use crate::provider::{InstanceProvider, StatusKind};

mod error;
mod report;
mod state;

pub use error::{ErrorRecord, RunError};
pub use report::{
    ACK_MESSAGE, CallbackDelivery, DeliveryError, ErrorReport, ResponseSink, RunReport,
    SuccessReport, WriterSink,
};
pub use state::{RunMode, RunState, SkipDirective, Stage};

/// Default settle delay after the instance reaches `running`.
pub const DEFAULT_POST_START_SETTLE: Duration = Duration::from_secs(2);

/// Timing knobs for one pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineTimings {
    /// Instance supervisor timings.
    pub supervisor: SupervisorTimings,
    /// Login flow settle delays.
    pub login: LoginTimings,
    /// Session-creation hang timeout.
    pub session_hang_timeout: Duration,
    /// Settle delay between instance start and session creation.
    pub post_start_settle: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            supervisor: SupervisorTimings::default(),
            login: LoginTimings::default(),
            session_hang_timeout: session::DEFAULT_HANG_TIMEOUT,
            post_start_settle: DEFAULT_POST_START_SETTLE,
        }
    }
}

/// Orchestrates runs over a fixed set of collaborators.
///
/// The pipeline itself is stateless between runs: every run brings its
/// own [`RunState`] and no collaborator holds per-run data.
#[derive(Debug)]
pub struct Pipeline<P, L, D, C, A> {
    provider: P,
    link: L,
    driver: D,
    solver: C,
    collector: A,
    profile: DeviceProfile,
    store: ChallengeStore,
    timings: PipelineTimings,
    delivery: CallbackDelivery,
}

impl<P, L, D, C, A> Pipeline<P, L, D, C, A>
where
    P: InstanceProvider,
    L: DeviceLink,
    D: AutomationDriver,
    C: CaptchaSolver,
    A: ArtifactCollector,
{
    /// Creates a pipeline over the given collaborators.
    #[must_use]
    pub fn new(
        provider: P,
        link: L,
        driver: D,
        solver: C,
        collector: A,
        profile: DeviceProfile,
        store: ChallengeStore,
    ) -> Self {
        Self {
            provider,
            link,
            driver,
            solver,
            collector,
            profile,
            store,
            timings: PipelineTimings::default(),
            delivery: CallbackDelivery::new(),
        }
    }

    /// Overrides the timing knobs.
    #[must_use]
    pub const fn with_timings(mut self, timings: PipelineTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Runs the full login-and-collect workflow.
    ///
    /// Returns the payload that was delivered; delivery itself happens
    /// inside and is guaranteed to occur exactly once per run.
    pub async fn execute<S: ResponseSink>(&self, run: &mut RunState, sink: &mut S) -> RunReport {
        self.acknowledge(run, sink);
        run.log.push("Starting process...");

        let report = match self.run_to_completion(run).await {
            Ok(summary) => {
                RunReport::success(serde_json::to_value(summary).ok(), run.log.entries())
            }
            Err(record) => record.report(),
        };
        self.deliver(run, sink, &report).await;
        report
    }

    /// Starts the instance without running the pipeline.
    pub async fn start_instance<S: ResponseSink>(
        &self,
        run: &mut RunState,
        sink: &mut S,
    ) -> RunReport {
        self.acknowledge(run, sink);
        run.log.push("Starting the instance");
        let report = match self.instance_supervisor(run).ensure_running().await {
            Ok(state) => RunReport::success(
                Some(serde_json::json!({ "state": state })),
                run.log.entries(),
            ),
            Err(err) => self.error_record(run, err.into(), None).report(),
        };
        self.deliver(run, sink, &report).await;
        report
    }

    /// Stops the instance without running the pipeline.
    pub async fn stop_instance<S: ResponseSink>(
        &self,
        run: &mut RunState,
        sink: &mut S,
    ) -> RunReport {
        self.acknowledge(run, sink);
        run.log.push("Stopping the instance");
        let report = match self.instance_supervisor(run).ensure_stopped().await {
            Ok(state) => RunReport::success(
                Some(serde_json::json!({ "state": state })),
                run.log.entries(),
            ),
            Err(err) => self.error_record(run, err.into(), None).report(),
        };
        self.deliver(run, sink, &report).await;
        report
    }

    /// Queries the instance state without running the pipeline.
    pub async fn instance_status<S: ResponseSink>(
        &self,
        run: &mut RunState,
        kind: StatusKind,
        sink: &mut S,
    ) -> RunReport {
        self.acknowledge(run, sink);
        run.log.push(format!("Getting the instance status: {kind}"));
        let report = match self.provider.status(kind).await {
            Ok(state) => RunReport::success(
                Some(serde_json::json!({ "data": { "state": state } })),
                run.log.entries(),
            ),
            Err(err) => {
                let wrapped = crate::instance::InstanceError::provider(&err);
                self.error_record(run, wrapped.into(), None).report()
            }
        };
        self.deliver(run, sink, &report).await;
        report
    }

    /// Reports the configured artifact storage paths.
    pub async fn artifact_paths<S: ResponseSink>(
        &self,
        run: &mut RunState,
        sink: &mut S,
    ) -> RunReport {
        self.acknowledge(run, sink);
        let report = RunReport::success(
            Some(serde_json::json!({
                "userslogs": self.store.user_logs_dir(),
                "screenshots": self.store.screenshot_prefix(),
                "captchas": self.store.crop_prefix(),
            })),
            run.log.entries(),
        );
        self.deliver(run, sink, &report).await;
        report
    }

    /// Solves an already-encoded challenge image, bypassing the device
    /// and session setup entirely.
    pub async fn solve_captcha<S: ResponseSink>(
        &self,
        run: &mut RunState,
        image_base64: &str,
        sink: &mut S,
    ) -> RunReport {
        self.acknowledge(run, sink);
        run.log.push("Solving a challenge image directly");
        let report = match self.solver.solve(image_base64).await {
            Ok(solution) => RunReport::success(
                Some(serde_json::json!({ "solution": solution })),
                run.log.entries(),
            ),
            Err(err) => {
                let wrapped = crate::captcha::CaptchaError::Solver {
                    message: err.to_string(),
                };
                self.error_record(run, wrapped.into(), None).report()
            }
        };
        self.deliver(run, sink, &report).await;
        report
    }

    async fn run_to_completion(&self, run: &mut RunState) -> Result<ArtifactSummary, ErrorRecord> {
        let log = run.log.clone();
        let instance = self.instance_supervisor(run);

        let started: Result<(), RunError> = if run.has_skip(SkipDirective::InstanceStart) {
            log.push(format!(
                "Instance start cancelled by directive: {}",
                SkipDirective::InstanceStart.as_str()
            ));
            Ok(())
        } else {
            run.set_stage(Stage::InstanceStart);
            match instance.ensure_running().await {
                Ok(_state) => {
                    log.push(format!(
                        "Wait for {} seconds",
                        self.timings.post_start_settle.as_secs()
                    ));
                    sleep(self.timings.post_start_settle).await;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        };

        let primary: Result<ArtifactSummary, RunError> = match started {
            Err(err) => Err(err),
            Ok(()) => {
                let sessions =
                    SessionSupervisor::new(&self.driver, self.profile.clone(), log.clone())
                        .with_hang_timeout(self.timings.session_hang_timeout);
                match sessions.create().await {
                    Err(err) => Err(err.into()),
                    Ok(handle) => {
                        run.set_stage(Stage::LogsSynchronization);
                        let outcome = self.login_and_collect(run, &handle).await;
                        sessions.destroy(handle).await;
                        outcome
                    }
                }
            }
        };

        let stopped: Result<(), RunError> = if run.has_skip(SkipDirective::InstanceStop) {
            log.push(format!(
                "Instance stop cancelled by directive: {}",
                SkipDirective::InstanceStop.as_str()
            ));
            Ok(())
        } else {
            instance.ensure_stopped().await.map(|_state| ()).map_err(RunError::from)
        };

        match (primary, stopped) {
            (Ok(summary), Ok(())) => Ok(summary),
            // A stop failure after a successful run is the run's error.
            (Ok(_summary), Err(stop_err)) => Err(self.error_record(run, stop_err, None)),
            (Err(primary_err), Ok(())) => Err(self.error_record(run, primary_err, None)),
            (Err(primary_err), Err(stop_err)) => {
                Err(self.error_record(run, primary_err, Some(stop_err)))
            }
        }
    }

    async fn login_and_collect(
        &self,
        run: &mut RunState,
        session: &D::Session,
    ) -> Result<ArtifactSummary, RunError> {
        let log = run.log.clone();
        log.push(format!("Started login for: {}", run.credentials.login));

        let locators = LoginLocators::for_package(&self.profile.app_package);
        let challenge_image = locators.challenge_image.clone();
        let flow = LoginFlow::new(session, run.credentials.clone(), locators, log.clone())
            .with_timings(self.timings.login);

        match flow.run().await? {
            LoginOutcome::Success => flow.synchronize_records().await?,
            LoginOutcome::ChallengePresented => {
                let coordinator = CaptchaCoordinator::new(
                    session,
                    &self.solver,
                    &self.store,
                    challenge_image,
                    log.clone(),
                );
                let solution = coordinator.resolve().await?;
                flow.complete_after_challenge(&solution).await?;
            }
        }
        flow.dismiss_residual_banner().await?;

        run.set_stage(Stage::FilesCopying);
        log.push("Log files copying started");
        self.collector
            .collect(&log)
            .await
            .map_err(|err| RunError::ArtifactCopy {
                message: err.to_string(),
            })
    }

    fn instance_supervisor(&self, run: &RunState) -> InstanceSupervisor<&P, &L> {
        InstanceSupervisor::new(&self.provider, &self.link, run.log.clone())
            .with_timings(self.timings.supervisor)
    }

    fn error_record(
        &self,
        run: &RunState,
        primary: RunError,
        secondary: Option<RunError>,
    ) -> ErrorRecord {
        ErrorRecord {
            primary,
            secondary,
            stage: run.stage(),
            log: run.log.entries(),
        }
    }

    /// Writes the immediate acknowledgment for fire-and-acknowledge runs
    /// and closes the sink so it cannot be written twice.
    fn acknowledge<S: ResponseSink>(&self, run: &RunState, sink: &mut S) {
        if matches!(run.mode(), RunMode::FireAndAcknowledge { .. }) {
            if let Err(err) = sink.write(&RunReport::ack()) {
                run.log.push(format!("Acknowledgment write failed: {err}"));
            }
            sink.close();
        }
    }

    /// Delivers the final payload exactly once.
    async fn deliver<S: ResponseSink>(&self, run: &mut RunState, sink: &mut S, report: &RunReport) {
        if !run.try_complete() {
            run.log.push("Suppressed a duplicate final payload");
            return;
        }
        match run.mode().clone() {
            RunMode::Synchronous => {
                if let Err(err) = sink.write(report) {
                    run.log.push(format!("Response write failed: {err}"));
                }
                sink.close();
            }
            RunMode::FireAndAcknowledge {
                success_endpoint,
                error_endpoint,
            } => {
                let endpoint = if report.is_error() {
                    error_endpoint
                } else {
                    success_endpoint
                };
                if let Err(err) = self.delivery.post(&endpoint, report).await {
                    run.log.push(format!("Callback delivery failed: {err}"));
                }
            }
        }
    }
}
