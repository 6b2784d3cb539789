//! HTTP client for the external challenge-solving service.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::provider::ProviderFuture;

use super::CaptchaSolver;

/// Errors raised by the HTTP solver client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HttpSolverError {
    /// Raised when the request fails or the service answers with an
    /// error status.
    #[error("solver request failed: {message}")]
    Transport {
        /// Message produced by the HTTP client.
        message: String,
    },
}

impl From<reqwest::Error> for HttpSolverError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SolutionPayload {
    solution: String,
}

/// [`CaptchaSolver`] that POSTs the encoded image to a solving service.
#[derive(Clone, Debug)]
pub struct HttpCaptchaSolver {
    client: reqwest::Client,
    url: String,
}

impl HttpCaptchaSolver {
    /// Creates a client for the solver at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn submit(&self, image_base64: &str) -> Result<String, HttpSolverError> {
        let payload: SolutionPayload = self
            .client
            .post(&self.url)
            .json(&json!({ "image": image_base64 }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(payload.solution)
    }
}

impl CaptchaSolver for HttpCaptchaSolver {
    type Error = HttpSolverError;

    fn solve<'a>(&'a self, image_base64: &'a str) -> ProviderFuture<'a, String, Self::Error> {
        Box::pin(self.submit(image_base64))
    }
}
