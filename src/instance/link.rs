//! Device-side connectivity link.
//!
//! After the provider reports `running`, the emulator is only usable once
//! the device bridge accepts connections. The supervisor retries this
//! check a few times because the bridge comes up noticeably later than
//! the instance itself.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::provider::ProviderFuture;

/// Default TCP connect timeout for one link attempt.
pub const DEFAULT_LINK_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborator that establishes the device-side link.
pub trait DeviceLink {
    /// Link specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Attempts to establish the link once.
    fn connect(&self) -> ProviderFuture<'_, (), Self::Error>;
}

impl<L: DeviceLink> DeviceLink for &L {
    type Error = L::Error;

    fn connect(&self) -> ProviderFuture<'_, (), Self::Error> {
        (**self).connect()
    }
}

/// Errors raised by [`TcpDeviceLink`].
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum TcpLinkError {
    /// Raised when the bridge endpoint refuses or drops the connection.
    #[error("device bridge {address} unreachable: {message}")]
    Unreachable {
        /// Bridge address that was dialled.
        address: String,
        /// OS error message.
        message: String,
    },
    /// Raised when the dial does not complete within the connect timeout.
    #[error("device bridge {address} connect timed out")]
    ConnectTimeout {
        /// Bridge address that was dialled.
        address: String,
    },
}

/// [`DeviceLink`] that dials the device bridge TCP port.
#[derive(Clone, Debug)]
pub struct TcpDeviceLink {
    address: String,
    connect_timeout: Duration,
}

impl TcpDeviceLink {
    /// Creates a link check for `host:port`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_LINK_CONNECT_TIMEOUT,
        }
    }

    /// Overrides the per-attempt connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    async fn dial(&self) -> Result<(), TcpLinkError> {
        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(err)) => Err(TcpLinkError::Unreachable {
                address: self.address.clone(),
                message: err.to_string(),
            }),
            Err(_elapsed) => Err(TcpLinkError::ConnectTimeout {
                address: self.address.clone(),
            }),
        }
    }
}

impl DeviceLink for TcpDeviceLink {
    type Error = TcpLinkError;

    fn connect(&self) -> ProviderFuture<'_, (), Self::Error> {
        Box::pin(self.dial())
    }
}
