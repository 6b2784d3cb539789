//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::device::DeviceProfile;

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in aerolog.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

/// Compute control-plane settings for the emulator instance.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AEROLOG_INSTANCE")]
pub struct InstanceConfig {
    /// Base URL of the control plane. This value is required.
    pub control_plane_url: String,
    /// Provider identifier of the emulator instance. This value is
    /// required.
    pub instance_id: String,
    /// Address of the device bridge dialled by the link check.
    #[ortho_config(default = "localhost:5555".to_owned())]
    pub device_bridge_address: String,
}

impl InstanceConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("aerolog")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.control_plane_url,
            &FieldMetadata::new(
                "control plane URL",
                "AEROLOG_INSTANCE_CONTROL_PLANE_URL",
                "control_plane_url",
                "instance",
            ),
        )?;
        require_field(
            &self.instance_id,
            &FieldMetadata::new(
                "instance ID",
                "AEROLOG_INSTANCE_INSTANCE_ID",
                "instance_id",
                "instance",
            ),
        )?;
        require_field(
            &self.device_bridge_address,
            &FieldMetadata::new(
                "device bridge address",
                "AEROLOG_INSTANCE_DEVICE_BRIDGE_ADDRESS",
                "device_bridge_address",
                "instance",
            ),
        )?;
        Ok(())
    }
}

/// Automation endpoint and app profile settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AEROLOG_DEVICE")]
pub struct DeviceConfig {
    /// Base URL of the automation endpoint.
    #[ortho_config(default = "http://localhost:4725/wd/hub".to_owned())]
    pub automation_url: String,
    /// Control hook restarting the automation endpoint, if available.
    pub automation_restart_url: Option<String>,
    /// Automation platform name.
    #[ortho_config(default = "android".to_owned())]
    pub platform: String,
    /// Device name advertised to the endpoint.
    #[ortho_config(default = "device".to_owned())]
    pub device_name: String,
    /// Package of the pilot app.
    #[ortho_config(default = "dji.go.v4".to_owned())]
    pub app_package: String,
    /// Activity launched when the session opens.
    #[ortho_config(default = "dji.pilot.main.activity.DJILauncherActivity".to_owned())]
    pub app_activity: String,
    /// Activity the endpoint waits for before handing over control.
    #[ortho_config(default = "dji.pilot2.main.activity.DJIMainFragmentActivity".to_owned())]
    pub app_wait_activity: String,
    /// Path to the app binary on the automation host.
    #[ortho_config(default = "/opt/aerolog/pilot.apk".to_owned())]
    pub app_path: String,
}

impl DeviceConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("aerolog")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds the [`DeviceProfile`] used to open automation sessions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a profile field is
    /// blank.
    pub fn as_profile(&self) -> Result<DeviceProfile, ConfigError> {
        let profile = DeviceProfile {
            platform: self.platform.trim().to_owned(),
            device_name: self.device_name.trim().to_owned(),
            app_package: self.app_package.trim().to_owned(),
            app_activity: self.app_activity.trim().to_owned(),
            app_wait_activity: self.app_wait_activity.trim().to_owned(),
            app_path: self.app_path.trim().to_owned(),
        };
        profile
            .validate()
            .map_err(|err| ConfigError::MissingField(err.to_string()))?;
        Ok(profile)
    }
}

/// Challenge solver and image store settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AEROLOG_CAPTCHA")]
pub struct CaptchaConfig {
    /// URL of the external solving service. This value is required.
    pub solver_url: String,
    /// Root directory for stored screenshots, crops, and user logs.
    #[ortho_config(default = "./data".to_owned())]
    pub storage_root: String,
}

impl CaptchaConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("aerolog")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.solver_url,
            &FieldMetadata::new(
                "challenge solver URL",
                "AEROLOG_CAPTCHA_SOLVER_URL",
                "solver_url",
                "captcha",
            ),
        )?;
        require_field(
            &self.storage_root,
            &FieldMetadata::new(
                "storage root",
                "AEROLOG_CAPTCHA_STORAGE_ROOT",
                "storage_root",
                "captcha",
            ),
        )?;
        Ok(())
    }

    /// Root directory as a UTF-8 path.
    #[must_use]
    pub fn storage_root_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.storage_root.trim())
    }
}

/// Artifact copy routine settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AEROLOG_ARTIFACTS")]
pub struct ArtifactConfig {
    /// URL of the copy routine trigger. This value is required.
    pub collector_url: String,
}

impl ArtifactConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("aerolog")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.collector_url,
            &FieldMetadata::new(
                "artifact collector URL",
                "AEROLOG_ARTIFACTS_COLLECTOR_URL",
                "collector_url",
                "artifacts",
            ),
        )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_config() -> InstanceConfig {
        InstanceConfig {
            control_plane_url: String::from("http://cp.local"),
            instance_id: String::from("i-0acf8e9e"),
            device_bridge_address: String::from("localhost:5555"),
        }
    }

    #[test]
    fn valid_instance_config_passes() {
        assert!(instance_config().validate().is_ok());
    }

    #[test]
    fn missing_instance_id_names_the_env_var() {
        let mut config = instance_config();
        config.instance_id = String::from("  ");
        let err = config.validate().expect_err("blank id should fail");
        assert!(
            matches!(err, ConfigError::MissingField(ref message)
                if message.contains("AEROLOG_INSTANCE_INSTANCE_ID")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn device_config_builds_a_trimmed_profile() {
        let config = DeviceConfig {
            automation_url: String::from("http://localhost:4725/wd/hub"),
            automation_restart_url: None,
            platform: String::from(" android "),
            device_name: String::from("device"),
            app_package: String::from("dji.go.v4"),
            app_activity: String::from("dji.pilot.main.activity.DJILauncherActivity"),
            app_wait_activity: String::from("dji.pilot2.main.activity.DJIMainFragmentActivity"),
            app_path: String::from("/opt/aerolog/pilot.apk"),
        };
        let profile = config
            .as_profile()
            .unwrap_or_else(|err| panic!("profile should build: {err}"));
        assert_eq!(profile.platform, "android");
    }

    #[test]
    fn blank_solver_url_is_rejected() {
        let config = CaptchaConfig {
            solver_url: String::new(),
            storage_root: String::from("./data"),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }
}
