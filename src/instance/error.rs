//! Error types for the instance supervisor.

use thiserror::Error;

/// Errors raised while supervising the emulator instance lifecycle.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InstanceError {
    /// Raised when the exists-state query does not answer in time.
    #[error("timeout error has occured on checking the exists instance state")]
    ExistsTimeout,
    /// Raised when every start request attempt failed.
    #[error("start instance timeout")]
    StartTimeout,
    /// Raised when the instance never reaches `running` within the hard
    /// timeout.
    #[error("timeout error has occured on checking the running instance state")]
    RunningTimeout,
    /// Raised when the instance never reaches `stopped` within the hard
    /// timeout.
    #[error("timeout error has occured on checking the stopped instance state")]
    StoppedTimeout,
    /// Raised when the device-side link cannot be established.
    #[error("failed to connect the device link after {attempts} attempts")]
    DeviceLink {
        /// Number of connection attempts made before giving up.
        attempts: u32,
    },
    /// Wrapper for unclassified provider failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message reported by the provider collaborator.
        message: String,
    },
}

impl InstanceError {
    /// Wraps a collaborator failure as a generic provider error.
    pub fn provider(err: &(impl std::fmt::Display + ?Sized)) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}
