//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::client::{Credentials, RpcClient};
use crate::lifecycle::Timeouts;
use crate::retry::RetryPolicy;

/// Default region when none is configured.
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// Provider settings merged from defaults, `converge.toml`, `ALICLOUD_*`
/// environment variables and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ALICLOUD",
    discovery(
        app_name = "converge",
        env_var = "CONVERGE_CONFIG_PATH",
        config_file_name = "converge.toml",
        dotfile_name = ".converge.toml",
        project_file_name = "converge.toml"
    )
)]
pub struct ProviderConfig {
    /// Access key id used to sign requests.
    #[ortho_config(default = String::new())]
    pub access_key: String,
    /// Access key secret used to sign requests.
    #[ortho_config(default = String::new())]
    pub secret_key: String,
    /// Region every call is bound to. Defaults to `cn-hangzhou`.
    #[ortho_config(default = "cn-hangzhou".to_owned())]
    pub region: String,
    /// Host or URL replacing the per-product regional endpoint.
    pub endpoint: Option<String>,
    /// Page size for list APIs. Defaults to 50, the ECS maximum for most
    /// describe calls.
    #[ortho_config(default = 50)]
    pub page_size: u32,
    /// Seconds between status polls while waiting.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Overrides every resource's create timeout, in seconds.
    pub create_timeout_secs: Option<u64>,
    /// Overrides every resource's update timeout, in seconds.
    pub update_timeout_secs: Option<u64>,
    /// Overrides every resource's delete timeout, in seconds.
    pub delete_timeout_secs: Option<u64>,
    /// Wall-clock budget for retrying a single remote call, in seconds.
    #[ortho_config(default = 600)]
    pub retry_max_secs: u64,
    /// Per-request HTTP timeout, in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!(
            "set {} or add {} to converge.toml",
            self.env_var, self.toml_key
        )
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("converge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a numeric setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.access_key,
            &FieldMetadata::new("access key id", "ALICLOUD_ACCESS_KEY", "access_key"),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("access key secret", "ALICLOUD_SECRET_KEY", "secret_key"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("region", "ALICLOUD_REGION", "region"),
        )?;
        Self::require_positive(
            u64::from(self.page_size),
            &FieldMetadata::new("page size", "ALICLOUD_PAGE_SIZE", "page_size"),
        )?;
        Self::require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "ALICLOUD_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Self::require_positive(
            self.http_timeout_secs,
            &FieldMetadata::new(
                "HTTP timeout",
                "ALICLOUD_HTTP_TIMEOUT_SECS",
                "http_timeout_secs",
            ),
        )?;
        Ok(())
    }

    /// Builds a signed API client from the validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the HTTP client
    /// cannot be constructed.
    pub fn client(&self) -> Result<RpcClient, ConfigError> {
        self.validate()?;
        RpcClient::new(
            Credentials::new(&self.access_key, &self.secret_key),
            self.region.trim(),
            self.endpoint.clone(),
            Duration::from_secs(self.http_timeout_secs),
        )
        .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Pacing shared by every service built from this configuration.
    #[must_use]
    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            page_size: self.page_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            retry: RetryPolicy::new(Duration::from_secs(self.retry_max_secs)),
        }
    }

    /// Applies the configured timeout overrides to a resource's defaults.
    #[must_use]
    pub fn timeouts(&self, defaults: Timeouts) -> Timeouts {
        Timeouts {
            create: self
                .create_timeout_secs
                .map_or(defaults.create, Duration::from_secs),
            update: self
                .update_timeout_secs
                .map_or(defaults.update, Duration::from_secs),
            delete: self
                .delete_timeout_secs
                .map_or(defaults.delete, Duration::from_secs),
        }
    }
}

/// Paging, polling and retry pacing for remote calls.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServiceSettings {
    /// Page size for list APIs.
    pub page_size: u32,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Retry policy for individual calls.
    pub retry: RetryPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
