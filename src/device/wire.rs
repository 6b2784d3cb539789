//! JSON-wire adapter for the automation endpoint.
//!
//! Speaks the WebDriver-style protocol the automation endpoint exposes.
//! Element location happens on the endpoint side; this adapter only
//! ships rendered XPath strings and interprets the JSON envelopes.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;

use super::{
    AutomationDriver, AutomationSession, DeviceProfile, DriverError, DriverFuture, ElementRegion,
    Locator,
};

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ValueEnvelope<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct ElementRef {
    #[serde(rename = "ELEMENT")]
    element: String,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct SizePayload {
    width: u32,
    height: u32,
}

fn endpoint_error(err: &reqwest::Error) -> DriverError {
    DriverError::Endpoint {
        message: err.to_string(),
    }
}

/// Driver handle for one automation endpoint.
#[derive(Clone, Debug)]
pub struct WireDriver {
    client: reqwest::Client,
    base_url: String,
    restart_url: Option<String>,
}

impl WireDriver {
    /// Creates a driver for the endpoint at `base_url`.
    ///
    /// `restart_url`, when set, names the control hook used as the hang
    /// recovery action; without it the recovery action degrades to a
    /// logged no-op.
    #[must_use]
    pub fn new(base_url: impl Into<String>, restart_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            restart_url,
        }
    }

    async fn open_session(&self, profile: &DeviceProfile) -> Result<WireSession, DriverError> {
        profile.validate()?;
        let envelope: SessionEnvelope = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&json!({ "desiredCapabilities": profile }))
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?
            .json()
            .await
            .map_err(|err| endpoint_error(&err))?;

        Ok(WireSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, envelope.session_id),
        })
    }

    async fn restart(&self) -> Result<(), DriverError> {
        let Some(url) = &self.restart_url else {
            return Ok(());
        };
        self.client
            .post(url)
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?;
        Ok(())
    }
}

impl AutomationDriver for WireDriver {
    type Session = WireSession;

    fn create_session<'a>(&'a self, profile: &'a DeviceProfile) -> DriverFuture<'a, Self::Session> {
        Box::pin(self.open_session(profile))
    }

    fn restart_endpoint(&self) -> DriverFuture<'_, ()> {
        Box::pin(self.restart())
    }
}

/// One live session on the automation endpoint.
#[derive(Clone, Debug)]
pub struct WireSession {
    client: reqwest::Client,
    session_url: String,
}

impl WireSession {
    async fn find(&self, locator: &Locator) -> Result<String, DriverError> {
        let response = self
            .client
            .post(format!("{}/element", self.session_url))
            .json(&json!({ "using": "xpath", "value": locator.to_xpath() }))
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DriverError::NotFound {
                locator: locator.to_xpath(),
            });
        }
        let envelope: ValueEnvelope<ElementRef> = response
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?
            .json()
            .await
            .map_err(|err| endpoint_error(&err))?;
        Ok(envelope.value.element)
    }

    async fn element_get<T>(&self, element: &str, leaf: &str) -> Result<T, DriverError>
    where
        T: serde::de::DeserializeOwned,
    {
        let envelope: ValueEnvelope<T> = self
            .client
            .get(format!("{}/element/{element}/{leaf}", self.session_url))
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?
            .json()
            .await
            .map_err(|err| endpoint_error(&err))?;
        Ok(envelope.value)
    }

    async fn element_post(
        &self,
        element: &str,
        leaf: &str,
        body: serde_json::Value,
    ) -> Result<(), DriverError> {
        self.client
            .post(format!("{}/element/{element}/{leaf}", self.session_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?;
        Ok(())
    }

    async fn tap_found(&self, locator: &Locator) -> Result<(), DriverError> {
        let element = self.find(locator).await?;
        self.element_post(&element, "click", json!({})).await
    }

    async fn tap_if_present(&self, locator: &Locator) -> Result<bool, DriverError> {
        match self.tap_found(locator).await {
            Ok(()) => Ok(true),
            Err(DriverError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn type_into(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let element = self.find(locator).await?;
        self.element_post(&element, "value", json!({ "value": [text] }))
            .await
    }

    async fn text_of(&self, locator: &Locator) -> Result<Option<String>, DriverError> {
        match self.find(locator).await {
            Ok(element) => Ok(Some(self.element_get::<String>(&element, "text").await?)),
            Err(DriverError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn locate_region(&self, locator: &Locator) -> Result<ElementRegion, DriverError> {
        let element = self.find(locator).await?;
        let location: LocationPayload = self.element_get(&element, "location").await?;
        let size: SizePayload = self.element_get(&element, "size").await?;
        Ok(ElementRegion {
            x: location.x,
            y: location.y,
            width: size.width,
            height: size.height,
        })
    }

    async fn capture_screen(&self) -> Result<Vec<u8>, DriverError> {
        let encoded: ValueEnvelope<String> = self
            .client
            .get(format!("{}/screenshot", self.session_url))
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?
            .json()
            .await
            .map_err(|err| endpoint_error(&err))?;
        BASE64
            .decode(encoded.value.as_bytes())
            .map_err(|err| DriverError::Endpoint {
                message: format!("screenshot payload was not base64: {err}"),
            })
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.client
            .delete(&self.session_url)
            .send()
            .await
            .map_err(|err| endpoint_error(&err))?
            .error_for_status()
            .map_err(|err| endpoint_error(&err))?;
        Ok(())
    }
}

impl AutomationSession for WireSession {
    fn exists<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool> {
        Box::pin(async move {
            match self.find(locator).await {
                Ok(_element) => Ok(true),
                Err(DriverError::NotFound { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    fn tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ()> {
        Box::pin(self.tap_found(locator))
    }

    fn try_tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool> {
        Box::pin(self.tap_if_present(locator))
    }

    fn type_text<'a>(&'a self, locator: &'a Locator, text: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(self.type_into(locator, text))
    }

    fn read_text<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, Option<String>> {
        Box::pin(self.text_of(locator))
    }

    fn region_of<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ElementRegion> {
        Box::pin(self.locate_region(locator))
    }

    fn screenshot(&self) -> DriverFuture<'_, Vec<u8>> {
        Box::pin(self.capture_screen())
    }

    fn settle(&self, duration: Duration) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    fn quit(&self) -> DriverFuture<'_, ()> {
        Box::pin(self.close())
    }
}
