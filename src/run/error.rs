//! Run-level error taxonomy.

use thiserror::Error;

use crate::captcha::CaptchaError;
use crate::device::SessionError;
use crate::instance::InstanceError;
use crate::login::LoginError;

use super::report::{DeliveryError, ErrorReport, RunReport};
use super::state::Stage;

/// Any failure that ends a run.
///
/// Component errors keep their own shape; `code` flattens them into the
/// stable identifiers shipped in error payloads.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunError {
    /// Instance lifecycle failure.
    #[error(transparent)]
    Instance(#[from] InstanceError),
    /// Automation session failure.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Login flow failure.
    #[error(transparent)]
    Login(#[from] LoginError),
    /// Challenge resolution failure.
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    /// Artifact collection failure.
    #[error("artifact copy failed: {message}")]
    ArtifactCopy {
        /// Message reported by the collector.
        message: String,
    },
    /// Final payload delivery failure.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl RunError {
    /// Stable error code shipped in payloads.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Instance(InstanceError::ExistsTimeout) => "exists-timeout",
            Self::Instance(InstanceError::StartTimeout) => "start-timeout",
            Self::Instance(InstanceError::RunningTimeout) => "running-timeout",
            Self::Instance(InstanceError::StoppedTimeout) => "stopped-timeout",
            Self::Instance(InstanceError::DeviceLink { .. }) => "device-link",
            Self::Instance(InstanceError::Provider { .. })
            | Self::Login(LoginError::Driver(_)) => "provider",
            Self::Session(_) => "session-fatal",
            Self::Login(LoginError::IncorrectPassword) => "incorrect-password",
            Self::Captcha(_) => "captcha-flow",
            Self::ArtifactCopy { .. } => "artifact-copy",
            Self::Delivery(_) => "delivery",
        }
    }
}

/// A run failure annotated for the error payload.
#[derive(Clone, Debug)]
pub struct ErrorRecord {
    /// The failure that ended the run.
    pub primary: RunError,
    /// A failure hit while cleaning up after the primary one.
    pub secondary: Option<RunError>,
    /// Stage tag active at the time of failure.
    pub stage: Stage,
    /// Log trail captured at the time of failure.
    pub log: Vec<String>,
}

impl ErrorRecord {
    /// Renders the record as the error payload.
    #[must_use]
    pub fn report(&self) -> RunReport {
        RunReport::Error(ErrorReport {
            error: String::from(self.primary.code()),
            secondary_error: self.secondary.as_ref().map(|err| String::from(err.code())),
            message: self.primary.to_string(),
            stage: self.stage,
            log: self.log.clone(),
        })
    }
}
