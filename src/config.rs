//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Console session configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "PERCH")]
pub struct ConsoleConfig {
    /// Base URL of the fleet API, for example `https://fleet.example.com`.
    pub api_base_url: String,
    /// Bearer token used to authenticate against the fleet API.
    pub api_token: String,
    /// Application whose machines host the console session.
    pub app: String,
    /// Unix username to connect as. Defaults to `root`.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Console invocation template rendered into the remote command and the
    /// ephemeral machine configuration.
    #[ortho_config(default = "/bin/sh".to_owned())]
    pub console_command: String,
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
}

impl ConsoleConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{}] in perch.toml",
                metadata.description, metadata.env_var, metadata.toml_key, metadata.section
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
        Self::load_from_iter([std::ffi::OsString::from("perch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_base_url,
            &FieldMetadata::new(
                "fleet API base URL",
                "PERCH_API_BASE_URL",
                "api_base_url",
                "console",
            ),
        )?;
        Self::require_field(
            &self.api_token,
            &FieldMetadata::new(
                "fleet API token",
                "PERCH_API_TOKEN",
                "api_token",
                "console",
            ),
        )?;
        Self::require_field(
            &self.app,
            &FieldMetadata::new("application name", "PERCH_APP", "app", "console"),
        )?;
        Self::require_field(
            &self.ssh_user,
            &FieldMetadata::new("SSH username", "PERCH_SSH_USER", "ssh_user", "console"),
        )?;
        Self::require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh executable", "PERCH_SSH_BIN", "ssh_bin", "console"),
        )?;
        Self::require_field(
            &self.console_command,
            &FieldMetadata::new(
                "console command",
                "PERCH_CONSOLE_COMMAND",
                "console_command",
                "console",
            ),
        )?;
        Ok(())
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
