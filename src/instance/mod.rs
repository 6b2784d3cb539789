//! Emulator instance lifecycle supervision.
//!
//! Sequences start/stop requests against the compute provider with
//! bounded retries, waits out the provider's state transitions under
//! guarded timeouts, and confirms device-side reachability before the
//! automation session is allowed to begin.

use std::time::Duration;

use tokio::time::sleep;

use crate::provider::{InstanceProvider, InstanceState};
use crate::runlog::RunLog;

mod error;
pub mod link;
mod wait;

pub use error::InstanceError;
pub use link::{DeviceLink, TcpDeviceLink, TcpLinkError};
pub use wait::WaitGuard;

/// Default number of start request attempts.
pub const DEFAULT_START_ATTEMPTS: u32 = 5;
/// Default number of stop request attempts.
pub const DEFAULT_STOP_ATTEMPTS: u32 = 3;
/// Default backoff between failed start/stop requests.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(15);
/// Default hard timeout for the exists-state query.
pub const DEFAULT_EXISTS_TIMEOUT: Duration = Duration::from_secs(30);
/// Default soft timeout for the running-state wait.
pub const DEFAULT_RUNNING_SOFT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default hard timeout for the running-state wait.
pub const DEFAULT_RUNNING_HARD_TIMEOUT: Duration = Duration::from_secs(60);
/// Default hard timeout for the stopped-state wait.
pub const DEFAULT_STOPPED_TIMEOUT: Duration = Duration::from_secs(180);
/// Default interval between state polls while waiting.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Default number of device-link attempts.
pub const DEFAULT_LINK_ATTEMPTS: u32 = 5;
/// Default delay between device-link attempts.
pub const DEFAULT_LINK_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Default settle delay before the first device-link attempt.
pub const DEFAULT_LINK_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Timing and retry knobs for the supervisor.
///
/// Tests override these to run timeout scenarios in milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SupervisorTimings {
    /// Start request attempts before `StartTimeout`.
    pub start_attempts: u32,
    /// Stop request attempts before waiting fails.
    pub stop_attempts: u32,
    /// Backoff between failed start/stop requests.
    pub retry_backoff: Duration,
    /// Hard timeout for the exists-state query.
    pub exists_timeout: Duration,
    /// Soft timeout for the running wait; triggers one retry poll.
    pub running_soft_timeout: Duration,
    /// Hard timeout for the running wait.
    pub running_hard_timeout: Duration,
    /// Hard timeout for the stopped wait.
    pub stopped_timeout: Duration,
    /// Interval between state polls while waiting.
    pub status_poll_interval: Duration,
    /// Device-link attempts before `DeviceLink` fails the run.
    pub link_attempts: u32,
    /// Delay between device-link attempts.
    pub link_retry_delay: Duration,
    /// Settle delay before the first device-link attempt.
    pub link_settle_delay: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            start_attempts: DEFAULT_START_ATTEMPTS,
            stop_attempts: DEFAULT_STOP_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            exists_timeout: DEFAULT_EXISTS_TIMEOUT,
            running_soft_timeout: DEFAULT_RUNNING_SOFT_TIMEOUT,
            running_hard_timeout: DEFAULT_RUNNING_HARD_TIMEOUT,
            stopped_timeout: DEFAULT_STOPPED_TIMEOUT,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            link_attempts: DEFAULT_LINK_ATTEMPTS,
            link_retry_delay: DEFAULT_LINK_RETRY_DELAY,
            link_settle_delay: DEFAULT_LINK_SETTLE_DELAY,
        }
    }
}

impl SupervisorTimings {
    /// Scales every duration down for tests.
    ///
    /// Attempt counts are preserved; only waits shrink.
    #[must_use]
    pub const fn with_fast_clock(mut self, unit: Duration) -> Self {
        self.retry_backoff = unit;
        self.exists_timeout = unit;
        self.running_soft_timeout = unit;
        self.running_hard_timeout = unit.saturating_mul(2);
        self.stopped_timeout = unit;
        self.status_poll_interval = Duration::from_millis(1);
        self.link_retry_delay = unit;
        self.link_settle_delay = Duration::ZERO;
        self
    }
}

/// Supervises the emulator instance lifecycle for one run.
#[derive(Debug)]
pub struct InstanceSupervisor<P, L> {
    provider: P,
    link: L,
    timings: SupervisorTimings,
    log: RunLog,
}

impl<P, L> InstanceSupervisor<P, L>
where
    P: InstanceProvider,
    L: DeviceLink,
{
    /// Creates a supervisor with default timings.
    #[must_use]
    pub fn new(provider: P, link: L, log: RunLog) -> Self {
        Self {
            provider,
            link,
            timings: SupervisorTimings::default(),
            log,
        }
    }

    /// Overrides the timing knobs.
    #[must_use]
    pub const fn with_timings(mut self, timings: SupervisorTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Brings the instance to `running` and confirms the device link.
    ///
    /// Already-running instances short-circuit to the link check. A
    /// `stopping` instance is waited out before a cold start.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::StartTimeout`] when every start request
    /// failed, [`InstanceError::RunningTimeout`] when the state never
    /// settles, [`InstanceError::DeviceLink`] when the bridge stays
    /// unreachable, and [`InstanceError::Provider`] for unclassified
    /// collaborator failures.
    pub async fn ensure_running(&self) -> Result<InstanceState, InstanceError> {
        self.log.push("Instance start procedure begin");
        let state = self.query_exists().await?;
        match state {
            InstanceState::Running => {
                self.log
                    .push("Instance is already in running state. No need to wait it.");
                self.check_link().await?;
                Ok(InstanceState::Running)
            }
            InstanceState::Stopping => {
                self.wait_stopped().await?;
                self.start_from_cold().await
            }
            _ => self.start_from_cold().await,
        }
    }

    /// Brings the instance to `stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::StoppedTimeout`] when every stop request
    /// failed or the state never settles, and
    /// [`InstanceError::Provider`] for collaborator failures.
    pub async fn ensure_stopped(&self) -> Result<InstanceState, InstanceError> {
        self.log.push("Instance stop procedure begin");
        let state = self.query_exists().await?;
        match state {
            InstanceState::Stopped => {
                self.log
                    .push("Instance is already in stopped state. No need to wait it.");
                Ok(InstanceState::Stopped)
            }
            InstanceState::Stopping => {
                self.wait_stopped().await?;
                Ok(InstanceState::Stopped)
            }
            _ => {
                self.request_stop().await?;
                self.wait_stopped().await?;
                Ok(InstanceState::Stopped)
            }
        }
    }

    async fn start_from_cold(&self) -> Result<InstanceState, InstanceError> {
        let acked = self.request_start().await?;
        self.log.push("Start instance procedure successfully executed");
        if acked == InstanceState::Running {
            self.log
                .push("Instance is already in running state. No need to wait it.");
        } else {
            self.wait_running().await?;
        }
        self.check_link().await?;
        Ok(InstanceState::Running)
    }

    /// Issues the start request with bounded retries and fixed backoff.
    async fn request_start(&self) -> Result<InstanceState, InstanceError> {
        for attempt in 1..=self.timings.start_attempts {
            match self.provider.start().await {
                Ok(state) => {
                    self.log.push(format!(
                        "Instance returned the response for the start request. Current state: {state}"
                    ));
                    return Ok(state);
                }
                Err(err) => {
                    self.log
                        .push(format!("Instance start request failed and delayed: {err}"));
                    if attempt < self.timings.start_attempts {
                        sleep(self.timings.retry_backoff).await;
                    }
                }
            }
        }
        self.log.push("Instance start procedure timeout");
        Err(InstanceError::StartTimeout)
    }

    /// Issues the stop request with bounded retries and fixed backoff.
    async fn request_stop(&self) -> Result<(), InstanceError> {
        for attempt in 1..=self.timings.stop_attempts {
            match self.provider.stop().await {
                Ok(state) => {
                    self.log.push(format!(
                        "Instance returned the response for the stop request. Current state: {state}"
                    ));
                    return Ok(());
                }
                Err(err) => {
                    self.log
                        .push(format!("Instance stop request failed and delayed: {err}"));
                    if attempt < self.timings.stop_attempts {
                        sleep(self.timings.retry_backoff).await;
                    }
                }
            }
        }
        self.log.push("Instance stop procedure timeout");
        Err(InstanceError::StoppedTimeout)
    }

    /// Confirms the device bridge accepts connections.
    async fn check_link(&self) -> Result<(), InstanceError> {
        sleep(self.timings.link_settle_delay).await;
        for attempt in 1..=self.timings.link_attempts {
            self.log.push(format!("Device link connect attempt #{attempt}"));
            match self.link.connect().await {
                Ok(()) => {
                    self.log.push("Device link established");
                    return Ok(());
                }
                Err(err) => {
                    self.log.push(format!("Device link connect failed: {err}"));
                    if attempt < self.timings.link_attempts {
                        sleep(self.timings.link_retry_delay).await;
                    }
                }
            }
        }
        self.log.push(format!(
            "Device link failed for {} attempts",
            self.timings.link_attempts
        ));
        Err(InstanceError::DeviceLink {
            attempts: self.timings.link_attempts,
        })
    }
}

#[cfg(test)]
mod tests;
