//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::{PollError, PollPolicy};

/// Scaleway specific configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Only object storage
    /// listing needs it; the Instance API authenticates with the secret key.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Preferred availability zone. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Preferred commercial type. Falls back to the first offered type when
    /// the zone does not offer it.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Human-friendly image label (for example `Ubuntu 24.04 Noble Numbat`).
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
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

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in cloudwait.toml",
            self.description, self.env_var, self.toml_key, self.section
        ))
    }
}

impl ScalewayConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cloudwait")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the access key and secret key needed to sign object storage
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when either key is empty.
    pub fn storage_keys(&self) -> Result<(&str, &str), ConfigError> {
        let access_key = self.access_key.as_deref().unwrap_or_default();
        Self::require_field(
            access_key,
            &FieldMetadata::new(
                "Scaleway access key",
                "SCW_ACCESS_KEY",
                "access_key",
                "scaleway",
            ),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        Ok((access_key.trim(), self.secret_key.trim()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.secret_key,
                FieldMetadata::new(
                    "Scaleway API secret key",
                    "SCW_SECRET_KEY",
                    "secret_key",
                    "scaleway",
                ),
            ),
            (
                &self.default_project_id,
                FieldMetadata::new(
                    "Scaleway project ID",
                    "SCW_DEFAULT_PROJECT_ID",
                    "default_project_id",
                    "scaleway",
                ),
            ),
            (
                &self.default_image,
                FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image", "scaleway"),
            ),
            (
                &self.default_instance_type,
                FieldMetadata::new(
                    "instance type",
                    "SCW_DEFAULT_INSTANCE_TYPE",
                    "default_instance_type",
                    "scaleway",
                ),
            ),
            (
                &self.default_zone,
                FieldMetadata::new(
                    "availability zone",
                    "SCW_DEFAULT_ZONE",
                    "default_zone",
                    "scaleway",
                ),
            ),
            (
                &self.default_architecture,
                FieldMetadata::new(
                    "CPU architecture",
                    "SCW_DEFAULT_ARCHITECTURE",
                    "default_architecture",
                    "scaleway",
                ),
            ),
        ];
        for (value, metadata) in &required {
            Self::require_field(value, metadata)?;
        }
        Ok(())
    }
}

/// Poll timings, in seconds, for each kind of wait the workflows perform.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLOUDWAIT_WAIT",
    discovery(
        app_name = "cloudwait",
        env_var = "CLOUDWAIT_CONFIG_PATH",
        config_file_name = "cloudwait.toml",
        dotfile_name = ".cloudwait.toml",
        project_file_name = "cloudwait.toml"
    )
)]
pub struct WaitConfig {
    /// Longest wait for servers to report running.
    #[ortho_config(default = 600)]
    pub active_max_wait_secs: u64,
    /// Pause between server status checks.
    #[ortho_config(default = 10)]
    pub active_period_secs: u64,
    /// Longest wait for a TCP port to accept connections.
    #[ortho_config(default = 300)]
    pub port_max_wait_secs: u64,
    /// Pause between connection attempts.
    #[ortho_config(default = 1)]
    pub port_period_secs: u64,
    /// Longest wait for a snapshot to become available.
    #[ortho_config(default = 600)]
    pub snapshot_max_wait_secs: u64,
    /// Pause between snapshot status checks.
    #[ortho_config(default = 5)]
    pub snapshot_period_secs: u64,
    /// Longest wait for deleted servers to disappear.
    #[ortho_config(default = 600)]
    pub teardown_max_wait_secs: u64,
    /// Pause between teardown checks.
    #[ortho_config(default = 20)]
    pub teardown_period_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            active_max_wait_secs: 600,
            active_period_secs: 10,
            port_max_wait_secs: 300,
            port_period_secs: 1,
            snapshot_max_wait_secs: 600,
            snapshot_period_secs: 5,
            teardown_max_wait_secs: 600,
            teardown_period_secs: 20,
        }
    }
}

/// Validated poll policies for every wait a workflow performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicies {
    /// Servers reaching the running state.
    pub server_active: PollPolicy,
    /// TCP ports accepting connections.
    pub port_open: PollPolicy,
    /// Snapshots becoming available.
    pub snapshot_available: PollPolicy,
    /// Deleted servers disappearing.
    pub teardown: PollPolicy,
}

impl WaitPolicies {
    /// Uses the same policy for every wait.
    #[must_use]
    pub const fn uniform(policy: PollPolicy) -> Self {
        Self {
            server_active: policy,
            port_open: policy,
            snapshot_available: policy,
            teardown: policy,
        }
    }
}

impl WaitConfig {
    /// Loads wait timings from defaults, configuration files, and environment
    /// variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cloudwait")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Converts the timings into poll policies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWait`] when any period is zero.
    pub fn to_policies(&self) -> Result<WaitPolicies, ConfigError> {
        let policy = |name: &'static str, max_wait: u64, period: u64| {
            PollPolicy::new(Duration::from_secs(max_wait), Duration::from_secs(period)).map_err(
                |source| ConfigError::InvalidWait {
                    field: name,
                    source,
                },
            )
        };
        Ok(WaitPolicies {
            server_active: policy(
                "active_period_secs",
                self.active_max_wait_secs,
                self.active_period_secs,
            )?,
            port_open: policy(
                "port_period_secs",
                self.port_max_wait_secs,
                self.port_period_secs,
            )?,
            snapshot_available: policy(
                "snapshot_period_secs",
                self.snapshot_max_wait_secs,
                self.snapshot_period_secs,
            )?,
            teardown: policy(
                "teardown_period_secs",
                self.teardown_max_wait_secs,
                self.teardown_period_secs,
            )?,
        })
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
    /// Raised when a wait timing cannot form a poll policy.
    #[error("invalid wait setting {field}: {source}")]
    InvalidWait {
        /// Offending configuration key.
        field: &'static str,
        /// Underlying policy error.
        #[source]
        source: PollError,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
