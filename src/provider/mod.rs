//! Compute-provider abstraction for the emulator instance.
//!
//! The control plane that actually starts and stops the instance lives
//! outside this crate; the supervisor only issues requests and interprets
//! the reported state through this narrow interface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

mod http;

pub use http::{HttpInstanceProvider, HttpProviderError};

/// Instance state as reported by the compute provider.
///
/// The provider is the transition source of truth; this crate only polls
/// and interprets the reported value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    /// No instance exists for the configured identifier.
    NotExisting,
    /// The instance is booting.
    Pending,
    /// The instance is up.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance is powered off.
    Stopped,
    /// The provider reported a state this crate does not recognise.
    Unknown,
}

impl InstanceState {
    /// Parses a provider state string, case-insensitively.
    ///
    /// Unrecognised values map to [`InstanceState::Unknown`] rather than an
    /// error so a provider rollout cannot wedge the supervisor.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "not-existing" | "not_existing" | "terminated" => Self::NotExisting,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Canonical kebab-case name used in payloads and log entries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotExisting => "not-existing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status query flavour accepted by [`InstanceProvider::status`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusKind {
    /// Resolve whether the instance exists at all.
    Exists,
    /// Wait for the instance to report `running`.
    Running,
    /// Wait for the instance to report `stopped`.
    Stopped,
}

impl StatusKind {
    /// Wire name for the query kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface over the compute control plane.
pub trait InstanceProvider {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Requests an instance start and returns the acknowledged state.
    fn start(&self) -> ProviderFuture<'_, InstanceState, Self::Error>;

    /// Requests an instance stop and returns the acknowledged state.
    fn stop(&self) -> ProviderFuture<'_, InstanceState, Self::Error>;

    /// Queries the current instance state.
    fn status(&self, kind: StatusKind) -> ProviderFuture<'_, InstanceState, Self::Error>;
}

impl<P: InstanceProvider> InstanceProvider for &P {
    type Error = P::Error;

    fn start(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        (**self).start()
    }

    fn stop(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        (**self).stop()
    }

    fn status(&self, kind: StatusKind) -> ProviderFuture<'_, InstanceState, Self::Error> {
        (**self).status(kind)
    }
}

#[cfg(test)]
mod tests;
