//! Automation session supervision.
//!
//! Session creation is the step most likely to wedge: the endpoint can
//! accept the request and then never answer. The supervisor watches the
//! first attempt with a hang timeout, restarts the endpoint when it
//! fires, and reinitializes the session exactly once per run. A second
//! failure is fatal for the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::runlog::RunLog;

use super::{AutomationDriver, AutomationSession, DeviceProfile};

/// Default duration without observable progress before the session is
/// declared hung.
pub const DEFAULT_HANG_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while supervising the automation session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when session creation failed again after the one permitted
    /// reinitialization.
    #[error("session initialisation failed after reinitialization: {message}")]
    Fatal {
        /// Description of the terminal failure.
        message: String,
    },
}

/// Creates and recovers automation sessions for one run.
///
/// Holds the `has_been_reinitialized` flag so recovery can run at most
/// once per run regardless of which failure path requested it.
#[derive(Debug)]
pub struct SessionSupervisor<D> {
    driver: D,
    profile: DeviceProfile,
    hang_timeout: Duration,
    reinitialized: AtomicBool,
    destroyed: AtomicBool,
    log: RunLog,
}

impl<D> SessionSupervisor<D>
where
    D: AutomationDriver,
{
    /// Creates a supervisor for `profile` with the default hang timeout.
    #[must_use]
    pub fn new(driver: D, profile: DeviceProfile, log: RunLog) -> Self {
        Self {
            driver,
            profile,
            hang_timeout: DEFAULT_HANG_TIMEOUT,
            reinitialized: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            log,
        }
    }

    /// Overrides the hang timeout.
    #[must_use]
    pub const fn with_hang_timeout(mut self, value: Duration) -> Self {
        self.hang_timeout = value;
        self
    }

    /// Whether recovery already ran for this supervisor.
    #[must_use]
    pub fn has_been_reinitialized(&self) -> bool {
        self.reinitialized.load(Ordering::SeqCst)
    }

    /// Opens the automation session, recovering once from a hang or an
    /// unexpected rejection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Fatal`] when creation fails again after
    /// the single permitted reinitialization.
    pub async fn create(&self) -> Result<D::Session, SessionError> {
        let attempt = tokio::time::timeout(
            self.hang_timeout,
            self.driver.create_session(&self.profile),
        )
        .await;

        match attempt {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(err)) => {
                self.log.push(format!(
                    "Error has occured: {err}. Trying to re-initialize the process."
                ));
                self.reinitialize().await
            }
            Err(_elapsed) => {
                // The hung attempt is dropped before recovery starts, so a
                // late answer from the endpoint cannot race the new session.
                self.log.push(format!(
                    "No session progress for {} seconds. Executing the endpoint restart.",
                    self.hang_timeout.as_secs()
                ));
                self.recover_endpoint().await;
                self.reinitialize().await
            }
        }
    }

    /// Recreates the session once; the old handle is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Fatal`] when recovery already ran, or
    /// when the fresh attempt fails or hangs.
    pub async fn reinitialize(&self) -> Result<D::Session, SessionError> {
        if self.reinitialized.swap(true, Ordering::SeqCst) {
            self.log.push("The session was already re-initialized");
            return Err(SessionError::Fatal {
                message: String::from("session failed again after reinitialization"),
            });
        }

        self.log.push("Re-initializing the session...");
        let attempt = tokio::time::timeout(
            self.hang_timeout,
            self.driver.create_session(&self.profile),
        )
        .await;

        match attempt {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(err)) => Err(SessionError::Fatal {
                message: err.to_string(),
            }),
            Err(_elapsed) => Err(SessionError::Fatal {
                message: format!(
                    "session creation hung again after {} seconds",
                    self.hang_timeout.as_secs()
                ),
            }),
        }
    }

    /// Tears the session down, exactly once, swallowing teardown errors.
    ///
    /// Teardown runs on both the success and the failure path; a failed
    /// quit is logged and never masks the run outcome.
    pub async fn destroy(&self, session: D::Session) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = session.quit().await {
            self.log.push(format!("Session teardown failed: {err}"));
        }
    }

    async fn recover_endpoint(&self) {
        if let Err(err) = self.driver.restart_endpoint().await {
            self.log
                .push(format!("Automation endpoint restart failed: {err}"));
        }
    }
}
