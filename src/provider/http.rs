//! REST adapter for the compute control plane.
//!
//! The control plane exposes start/stop/status for a single emulator
//! instance; this adapter is the thin invocation glue and deliberately
//! knows nothing about the provider beyond three endpoints.

use serde::Deserialize;
use thiserror::Error;

use super::{InstanceProvider, InstanceState, ProviderFuture, StatusKind};

/// Errors raised by the HTTP control-plane adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HttpProviderError {
    /// Raised when the adapter is constructed with incomplete settings.
    #[error("invalid control plane configuration: {0}")]
    Config(String),
    /// Raised when the request fails or the control plane answers with an
    /// error status.
    #[error("control plane request failed: {message}")]
    Transport {
        /// Message produced by the HTTP client.
        message: String,
    },
    /// Raised when the response body cannot be decoded.
    #[error("control plane returned an unreadable payload: {message}")]
    Payload {
        /// Decoder error message.
        message: String,
    },
}

impl From<reqwest::Error> for HttpProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Payload {
                message: value.to_string(),
            }
        } else {
            Self::Transport {
                message: value.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatePayload {
    state: String,
}

/// [`InstanceProvider`] implementation speaking plain JSON over HTTP.
#[derive(Clone, Debug)]
pub struct HttpInstanceProvider {
    client: reqwest::Client,
    base_url: String,
    instance_id: String,
}

impl HttpInstanceProvider {
    /// Creates an adapter for one instance on the given control plane.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProviderError::Config`] when the base URL or instance
    /// identifier is blank.
    pub fn new(
        base_url: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Result<Self, HttpProviderError> {
        let trimmed_base = base_url.into().trim().trim_end_matches('/').to_owned();
        let trimmed_id = instance_id.into().trim().to_owned();
        if trimmed_base.is_empty() {
            return Err(HttpProviderError::Config(String::from("base_url")));
        }
        if trimmed_id.is_empty() {
            return Err(HttpProviderError::Config(String::from("instance_id")));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: trimmed_base,
            instance_id: trimmed_id,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/instances/{}/{suffix}", self.base_url, self.instance_id)
    }

    async fn post_action(&self, action: &str) -> Result<InstanceState, HttpProviderError> {
        let payload: StatePayload = self
            .client
            .post(self.endpoint(action))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(InstanceState::from_provider(&payload.state))
    }

    async fn query_status(&self, kind: StatusKind) -> Result<InstanceState, HttpProviderError> {
        let payload: StatePayload = self
            .client
            .get(self.endpoint("status"))
            .query(&[("kind", kind.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(InstanceState::from_provider(&payload.state))
    }
}

impl InstanceProvider for HttpInstanceProvider {
    type Error = HttpProviderError;

    fn start(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        Box::pin(self.post_action("start"))
    }

    fn stop(&self) -> ProviderFuture<'_, InstanceState, Self::Error> {
        Box::pin(self.post_action("stop"))
    }

    fn status(&self, kind: StatusKind) -> ProviderFuture<'_, InstanceState, Self::Error> {
        Box::pin(self.query_status(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_instance() {
        let provider = HttpInstanceProvider::new("http://cp.local/", "i-0acf")
            .unwrap_or_else(|err| panic!("adapter should build: {err}"));
        assert_eq!(
            provider.endpoint("start"),
            "http://cp.local/instances/i-0acf/start"
        );
    }

    #[test]
    fn blank_settings_are_rejected() {
        let base_err = HttpInstanceProvider::new("  ", "i-0acf").expect_err("blank base url");
        assert!(matches!(base_err, HttpProviderError::Config(ref field) if field == "base_url"));

        let id_err = HttpInstanceProvider::new("http://cp.local", " ").expect_err("blank id");
        assert!(matches!(id_err, HttpProviderError::Config(ref field) if field == "instance_id"));
    }
}
