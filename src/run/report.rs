//! Final payloads and their delivery paths.
//!
//! Each run produces exactly one final payload: either an `ok` payload
//! carrying the log trail or an `error` payload carrying the error
//! codes, the stage at failure, and the trail. In fire-and-acknowledge
//! mode the sink only ever sees the acknowledgment; the final payload is
//! POSTed to the caller's endpoint.

use std::io::Write;

use serde::Serialize;
use thiserror::Error;

use super::state::Stage;

/// Acknowledgment text written before an asynchronous run begins.
pub const ACK_MESSAGE: &str = "Your request is processing";

/// Success payload fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuccessReport {
    /// Optional human-readable note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation specific fields, flattened into the payload.
    #[serde(flatten)]
    pub data: Option<serde_json::Value>,
    /// Log trail, present on full run payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<String>>,
}

/// Error payload fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Primary error code.
    pub error: String,
    /// Error code of a failure hit during teardown, if any.
    #[serde(rename = "secondaryError", skip_serializing_if = "Option::is_none")]
    pub secondary_error: Option<String>,
    /// Human-readable message for the primary error.
    pub message: String,
    /// Stage tag active when the run failed.
    pub stage: Stage,
    /// Full log trail for postmortem diagnosis.
    pub log: Vec<String>,
}

/// One final payload, tagged by status.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum RunReport {
    /// Success payload.
    #[serde(rename = "ok")]
    Ok(SuccessReport),
    /// Error payload.
    #[serde(rename = "error")]
    Error(ErrorReport),
}

impl RunReport {
    /// The acknowledgment payload for fire-and-acknowledge runs.
    #[must_use]
    pub fn ack() -> Self {
        Self::Ok(SuccessReport {
            message: Some(String::from(ACK_MESSAGE)),
            data: None,
            log: None,
        })
    }

    /// Builds a success payload carrying `data` and the log trail.
    #[must_use]
    pub fn success(data: Option<serde_json::Value>, log: Vec<String>) -> Self {
        Self::Ok(SuccessReport {
            message: None,
            data,
            log: Some(log),
        })
    }

    /// Whether this is an error payload.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Errors raised while delivering a payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeliveryError {
    /// Raised when the sink or the callback endpoint rejects the
    /// payload.
    #[error("response delivery failed: {message}")]
    Failed {
        /// Description of the delivery failure.
        message: String,
    },
}

/// Write-once response sink owned by the caller.
pub trait ResponseSink: Send {
    /// Writes one payload.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the sink is closed or the write
    /// fails.
    fn write(&mut self, report: &RunReport) -> Result<(), DeliveryError>;

    /// Closes the sink; later writes fail.
    fn close(&mut self);
}

/// [`ResponseSink`] writing JSON lines to any writer.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    closed: bool,
}

impl<W: Write + Send> WriterSink<W> {
    /// Creates an open sink over `writer`.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    /// Whether the sink was closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<W: Write + Send> ResponseSink for WriterSink<W> {
    fn write(&mut self, report: &RunReport) -> Result<(), DeliveryError> {
        if self.closed {
            return Err(DeliveryError::Failed {
                message: String::from("response sink already closed"),
            });
        }
        let body = serde_json::to_string(report).map_err(|err| DeliveryError::Failed {
            message: err.to_string(),
        })?;
        writeln!(self.writer, "{body}").map_err(|err| DeliveryError::Failed {
            message: err.to_string(),
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// POSTs final payloads to caller-supplied callback endpoints.
#[derive(Clone, Debug, Default)]
pub struct CallbackDelivery {
    client: reqwest::Client,
}

impl CallbackDelivery {
    /// Creates a delivery client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// POSTs `report` to `endpoint` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the request fails or the endpoint
    /// answers with an error status.
    pub async fn post(&self, endpoint: &str, report: &RunReport) -> Result<(), DeliveryError> {
        self.client
            .post(endpoint)
            .json(report)
            .send()
            .await
            .map_err(|err| DeliveryError::Failed {
                message: err.to_string(),
            })?
            .error_for_status()
            .map_err(|err| DeliveryError::Failed {
                message: err.to_string(),
            })?;
        Ok(())
    }
}
