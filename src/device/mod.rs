//! Automation-driver abstraction for the emulator-hosted pilot app.
//!
//! The element-location engine itself lives in the automation endpoint;
//! this crate only addresses elements through typed [`Locator`]s and the
//! narrow [`AutomationSession`] primitives, mirroring how it talks to the
//! compute provider.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod session;
mod wire;

pub use session::{SessionError, SessionSupervisor};
pub use wire::{WireDriver, WireSession};

/// Widget classes the pilot app's login surface is built from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Widget {
    /// `android.widget.Button`
    Button,
    /// `android.widget.EditText`
    EditText,
    /// `android.widget.ImageView`
    ImageView,
    /// `android.widget.TextView`
    TextView,
}

impl Widget {
    /// Fully qualified widget class name.
    #[must_use]
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Button => "android.widget.Button",
            Self::EditText => "android.widget.EditText",
            Self::ImageView => "android.widget.ImageView",
            Self::TextView => "android.widget.TextView",
        }
    }
}

/// How a locator narrows down elements of its widget class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MatchRule {
    /// Element text equals the value exactly.
    TextEquals(String),
    /// Element text contains the value.
    TextContains(String),
    /// Element resource id equals the value exactly.
    ResourceIdEquals(String),
    /// Element resource id contains the value.
    ResourceIdContains(String),
}

/// Typed element address rendered to XPath for the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Locator {
    widget: Widget,
    rule: MatchRule,
}

impl Locator {
    /// Creates a locator for `widget` narrowed by `rule`.
    #[must_use]
    pub const fn new(widget: Widget, rule: MatchRule) -> Self {
        Self { widget, rule }
    }

    /// Renders the locator as the XPath string sent to the endpoint.
    #[must_use]
    pub fn to_xpath(&self) -> String {
        let class = self.widget.class_name();
        match &self.rule {
            MatchRule::TextEquals(value) => format!("//{class}[@text='{value}']"),
            MatchRule::TextContains(value) => {
                format!("//{class}[contains(@text, '{value}')]")
            }
            MatchRule::ResourceIdEquals(value) => format!("//{class}[@resource-id='{value}']"),
            MatchRule::ResourceIdContains(value) => {
                format!("//{class}[contains(@resource-id, '{value}')]")
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xpath())
    }
}

/// App and device identity used to open an automation session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeviceProfile {
    /// Automation platform name, normally `android`.
    #[serde(rename = "platformName")]
    pub platform: String,
    /// Device name advertised to the endpoint.
    #[serde(rename = "deviceName")]
    pub device_name: String,
    /// Package of the pilot app.
    #[serde(rename = "appPackage")]
    pub app_package: String,
    /// Activity launched when the session opens.
    #[serde(rename = "appActivity")]
    pub app_activity: String,
    /// Activity the endpoint waits for before handing over control.
    #[serde(rename = "appWaitActivity")]
    pub app_wait_activity: String,
    /// Path to the app binary on the automation host.
    #[serde(rename = "app")]
    pub app_path: String,
}

impl DeviceProfile {
    /// Validates that no field is blank.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Profile`] naming the first blank field.
    pub fn validate(&self) -> Result<(), DriverError> {
        let fields = [
            ("platform", &self.platform),
            ("device_name", &self.device_name),
            ("app_package", &self.app_package),
            ("app_activity", &self.app_activity),
            ("app_wait_activity", &self.app_wait_activity),
            ("app_path", &self.app_path),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(DriverError::Profile {
                    field: String::from(name),
                });
            }
        }
        Ok(())
    }
}

/// On-screen position and extent of an element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ElementRegion {
    /// Left edge, device pixels.
    pub x: i32,
    /// Top edge, device pixels.
    pub y: i32,
    /// Width, device pixels.
    pub width: u32,
    /// Height, device pixels.
    pub height: u32,
}

/// Errors raised by the automation collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised when a device profile field is blank.
    #[error("invalid device profile: missing {field}")]
    Profile {
        /// Name of the blank field.
        field: String,
    },
    /// Raised when a required element cannot be located.
    #[error("element not found: {locator}")]
    NotFound {
        /// Rendered locator that failed to match.
        locator: String,
    },
    /// Raised for any other endpoint failure.
    #[error("automation endpoint error: {message}")]
    Endpoint {
        /// Message reported by the endpoint or the HTTP client.
        message: String,
    },
}

/// Future returned by automation operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Collaborator that opens automation sessions and restarts the endpoint.
pub trait AutomationDriver {
    /// Session handle type issued by this driver.
    type Session: AutomationSession + Send + Sync;

    /// Opens a fresh session for the given profile.
    ///
    /// Handles are never reused: recovery always discards the old handle
    /// and asks for a new one.
    fn create_session<'a>(&'a self, profile: &'a DeviceProfile) -> DriverFuture<'a, Self::Session>;

    /// Restarts the remote automation endpoint (the hang recovery action).
    fn restart_endpoint(&self) -> DriverFuture<'_, ()>;
}

/// Narrow interface over one live automation session.
pub trait AutomationSession {
    /// Whether an element matching `locator` is currently present.
    fn exists<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool>;

    /// Taps the element; absence is an error.
    fn tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ()>;

    /// Taps the element if present; returns whether it was.
    fn try_tap<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, bool>;

    /// Types `text` into the element.
    fn type_text<'a>(&'a self, locator: &'a Locator, text: &'a str) -> DriverFuture<'a, ()>;

    /// Reads the element's text, or `None` when it is absent.
    fn read_text<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, Option<String>>;

    /// Resolves the element's on-screen region.
    fn region_of<'a>(&'a self, locator: &'a Locator) -> DriverFuture<'a, ElementRegion>;

    /// Captures a full-screen PNG.
    fn screenshot(&self) -> DriverFuture<'_, Vec<u8>>;

    /// Lets the UI settle for `duration` before the next step.
    fn settle(&self, duration: Duration) -> DriverFuture<'_, ()>;

    /// Tears the session down.
    fn quit(&self) -> DriverFuture<'_, ()>;
}

impl<D: AutomationDriver> AutomationDriver for &D {
    type Session = D::Session;

    fn create_session<'a>(&'a self, profile: &'a DeviceProfile) -> DriverFuture<'a, Self::Session> {
        (**self).create_session(profile)
    }

    fn restart_endpoint(&self) -> DriverFuture<'_, ()> {
        (**self).restart_endpoint()
    }
}

#[cfg(test)]
mod tests;
