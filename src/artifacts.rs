//! Artifact collection collaborator.
//!
//! The copy routine that pulls log files off the device lives outside
//! this crate; the pipeline invokes it once after a successful login and
//! ships its summary in the success payload.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderFuture;
use crate::runlog::RunLog;

/// Result of one artifact collection pass.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArtifactSummary {
    /// Number of log files copied.
    pub files_copied: usize,
    /// Directory the files were copied into.
    pub destination: Utf8PathBuf,
}

/// Collaborator that copies log artifacts off the device.
pub trait ArtifactCollector {
    /// Collector specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Copies the artifacts, logging progress into the run trail.
    fn collect<'a>(&'a self, log: &'a RunLog) -> ProviderFuture<'a, ArtifactSummary, Self::Error>;
}

impl<A: ArtifactCollector> ArtifactCollector for &A {
    type Error = A::Error;

    fn collect<'a>(&'a self, log: &'a RunLog) -> ProviderFuture<'a, ArtifactSummary, Self::Error> {
        (**self).collect(log)
    }
}

/// Errors raised by the HTTP collector adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HttpCollectorError {
    /// Raised when the request fails or the service answers with an
    /// error status.
    #[error("artifact collection request failed: {message}")]
    Transport {
        /// Message produced by the HTTP client.
        message: String,
    },
}

impl From<reqwest::Error> for HttpCollectorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

/// [`ArtifactCollector`] that triggers the copy routine over HTTP.
#[derive(Clone, Debug)]
pub struct HttpArtifactCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpArtifactCollector {
    /// Creates a collector client for the copy routine at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn trigger(&self, log: &RunLog) -> Result<ArtifactSummary, HttpCollectorError> {
        log.push("Requesting the log files copy routine");
        let summary: ArtifactSummary = self
            .client
            .post(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        log.push(format!(
            "Copy routine finished: {} files into {}",
            summary.files_copied, summary.destination
        ));
        Ok(summary)
    }
}

impl ArtifactCollector for HttpArtifactCollector {
    type Error = HttpCollectorError;

    fn collect<'a>(&'a self, log: &'a RunLog) -> ProviderFuture<'a, ArtifactSummary, Self::Error> {
        Box::pin(self.trigger(log))
    }
}
