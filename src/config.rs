//! Configuration Management
//!
//! Loads the optional JSON configuration file and resolves it, together with
//! command-line overrides, into a [`ConnectionDescriptor`].
//!
//! # File format
//! ```json
//! {
//!   "connectTimeout": 10000,
//!   "connectionParams": {
//!     "host": "localhost",
//!     "user": "user1",
//!     "password": "password1"
//!   }
//! }
//! ```
//! `connectTimeout` is in milliseconds and optional; `user` and `password`
//! are optional (the CLI prompts for them when the server requires them).
//! Command-line flags take precedence over file values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::gateway::ConnectionDescriptor;

/// Server connection parameters as stored in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    /// Database server host name
    pub host: Option<String>,

    /// User name; must have database creation privileges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Database connection timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Server connection parameters
    #[serde(default)]
    pub connection_params: ConnectionParams,
}

impl FileConfig {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!("could not read config file {}: {e}", path.display()))
        })?;

        serde_json::from_str(&contents)
            .map_err(|e| ProvisionError::config(format!("invalid config file format: {e}")))
    }

    /// Validate the configuration, collecting every problem into one error
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        match &self.connection_params.host {
            Some(host) if !host.trim().is_empty() => {}
            _ => errors.push("connectionParams.host is missing or invalid".to_string()),
        }
        if self.connect_timeout == Some(0) {
            errors.push(format!(
                "connectTimeout is invalid: \"{}\", must be a positive integer",
                self.connect_timeout.unwrap_or(0)
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::config(errors.join("\n")))
        }
    }

    /// Resolve into a descriptor pointed at `database`, applying overrides
    ///
    /// Any `Some` override wins over the file value.
    pub fn resolve(&self, overrides: &ConnectionParams, timeout_override: Option<u64>, database: &str) -> Result<ConnectionDescriptor> {
        let host = overrides
            .host
            .clone()
            .or_else(|| self.connection_params.host.clone())
            .ok_or_else(|| {
                ProvisionError::config("host is required, pass --host or set connectionParams.host")
            })?;

        let mut descriptor = ConnectionDescriptor::new(host, database);
        descriptor.user =
            overrides.user.clone().or_else(|| self.connection_params.user.clone());
        descriptor.password =
            overrides.password.clone().or_else(|| self.connection_params.password.clone());
        descriptor.connect_timeout =
            timeout_override.or(self.connect_timeout).map(Duration::from_millis);

        descriptor.validate()?;
        Ok(descriptor)
    }
}
