//! Ambient broker configuration.
//!
//! [`BrokerConfig`] is the serde-facing shape of a [`BrokerUri`] plus
//! credentials. It loads in layers (built-in defaults, then an optional
//! configuration file, then environment variables), so an entirely
//! unconfigured environment still produces a valid local-broker config,
//! while malformed operator input is a hard error.

use crate::error::ConfigurationError;
use crate::uri::{BrokerUri, Endpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Broker credentials. `Debug` redacts the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for opening a broker facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker endpoints as `scheme://host:port` strings
    pub endpoints: Vec<String>,
    /// Allow transparent reconnection across the endpoint list
    pub failover: bool,
    /// Pick reconnect endpoints in random order
    pub randomize: bool,
    /// Reconnect-attempt limit at startup; -1 leaves it unset
    pub startup_max_reconnect_attempts: i32,
    /// Steady-state reconnect-attempt limit; -1 leaves it unset
    pub max_reconnect_attempts: i32,
    /// Default credentials, if the broker requires authentication
    pub credentials: Option<Credentials>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["tcp://localhost:61616".to_string()],
            failover: false,
            randomize: false,
            startup_max_reconnect_attempts: -1,
            max_reconnect_attempts: -1,
            credentials: None,
        }
    }
}

impl BrokerConfig {
    /// Build the address specification described by this configuration
    pub fn uri(&self) -> Result<BrokerUri, ConfigurationError> {
        let mut endpoints = Vec::with_capacity(self.endpoints.len());
        for address in &self.endpoints {
            endpoints.push(address.parse::<Endpoint>()?);
        }

        let mut uri = BrokerUri::new(endpoints);
        uri.set_failover(self.failover);
        uri.set_randomize(self.randomize);
        uri.set_startup_max_reconnect_attempts(self.startup_max_reconnect_attempts);
        uri.set_max_reconnect_attempts(self.max_reconnect_attempts);
        Ok(uri)
    }

    /// Load configuration in layers.
    ///
    /// Sources (applied in order — later sources override earlier ones):
    ///  1. Built-in defaults
    ///  2. ./broker.{toml,yaml,json}        — deployment-local file
    ///  3. Path given by BROKER_CONFIG_FILE — operator-specified file
    ///  4. Environment variables prefixed BROKER__ (double-underscore
    ///     separator), e.g. BROKER__FAILOVER=true
    pub fn load() -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(Self::loading_error)?)
            .add_source(config::File::with_name("broker").required(false));

        if let Ok(explicit_path) = std::env::var("BROKER_CONFIG_FILE") {
            if !explicit_path.is_empty() {
                builder =
                    builder.add_source(config::File::with_name(&explicit_path).required(true));
                info!(path = %explicit_path, "Loading broker configuration from explicit path");
            }
        }

        builder
            .add_source(config::Environment::with_prefix("BROKER").separator("__"))
            .build()
            .map_err(Self::loading_error)?
            .try_deserialize()
            .map_err(Self::loading_error)
    }

    /// Load configuration from one required file, with defaults for absent
    /// fields.
    pub fn from_file(path: &str) -> Result<Self, ConfigurationError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(Self::loading_error)?)
            .add_source(config::File::with_name(path).required(true))
            .build()
            .map_err(Self::loading_error)?
            .try_deserialize()
            .map_err(Self::loading_error)
    }

    fn loading_error(error: config::ConfigError) -> ConfigurationError {
        ConfigurationError::Loading {
            message: error.to_string(),
        }
    }
}
