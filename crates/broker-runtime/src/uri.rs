//! Broker address specification and connection-string compilation.
//!
//! [`BrokerUri`] describes one or more broker endpoints together with the
//! failover policy, and compiles them into the wire-format connection string
//! the transport consumes, without callers having to know the failover
//! transport syntax.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[cfg(test)]
#[path = "uri_tests.rs"]
mod tests;

// Default values
const DEFAULT_FAILOVER: bool = false;
const DEFAULT_RANDOMIZE: bool = false;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: i32 = -1;
const DEFAULT_STARTUP_MAX_RECONNECT_ATTEMPTS: i32 = -1;

/// One broker network address: scheme, host, and port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Get the endpoint scheme (e.g. `tcp`)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the endpoint host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the endpoint port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| ConfigurationError::InvalidEndpoint {
            address: s.to_string(),
            message: e.to_string(),
        })?;

        let host = url
            .host_str()
            .ok_or_else(|| ConfigurationError::InvalidEndpoint {
                address: s.to_string(),
                message: "missing host".to_string(),
            })?;

        // The url crate only knows default ports for web schemes, so broker
        // addresses must carry an explicit port.
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigurationError::InvalidEndpoint {
                address: s.to_string(),
                message: "missing port".to_string(),
            })?;

        Ok(Self::new(url.scheme(), host, port))
    }
}

/// Broker address specification: ordered endpoints plus failover policy.
///
/// Defaults mirror a plain single-endpoint connection: failover disabled,
/// no randomization, and both reconnect-attempt limits unset (sentinel -1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerUri {
    endpoints: Vec<Endpoint>,
    failover: bool,
    randomize: bool,
    max_reconnect_attempts: i32,
    startup_max_reconnect_attempts: i32,
}

impl BrokerUri {
    /// Create a specification with default settings and the given endpoints
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            failover: DEFAULT_FAILOVER,
            randomize: DEFAULT_RANDOMIZE,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            startup_max_reconnect_attempts: DEFAULT_STARTUP_MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Create a single-endpoint specification
    pub fn single(endpoint: Endpoint) -> Self {
        Self::new(vec![endpoint])
    }

    /// Append an endpoint to the address list
    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.push(endpoint);
    }

    /// Get the ordered endpoint list
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Check whether failover is enabled
    pub fn is_failover(&self) -> bool {
        self.failover
    }

    /// Enable or disable failover
    pub fn set_failover(&mut self, failover: bool) {
        self.failover = failover;
    }

    /// Enable failover (builder style)
    pub fn with_failover(mut self, failover: bool) -> Self {
        self.set_failover(failover);
        self
    }

    /// Check whether reconnects pick endpoints in random order
    pub fn is_randomize(&self) -> bool {
        self.randomize
    }

    /// Enable or disable endpoint randomization on reconnect
    pub fn set_randomize(&mut self, randomize: bool) {
        self.randomize = randomize;
    }

    /// Enable endpoint randomization (builder style)
    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.set_randomize(randomize);
        self
    }

    /// Get the reconnect-attempt limit; -1 means unset
    pub fn max_reconnect_attempts(&self) -> i32 {
        self.max_reconnect_attempts
    }

    /// Set the reconnect-attempt limit. Values below -1 are clamped to -1.
    pub fn set_max_reconnect_attempts(&mut self, attempts: i32) {
        self.max_reconnect_attempts = attempts.max(-1);
    }

    /// Set the reconnect-attempt limit (builder style)
    pub fn with_max_reconnect_attempts(mut self, attempts: i32) -> Self {
        self.set_max_reconnect_attempts(attempts);
        self
    }

    /// Get the startup reconnect-attempt limit; -1 means unset
    pub fn startup_max_reconnect_attempts(&self) -> i32 {
        self.startup_max_reconnect_attempts
    }

    /// Set the startup reconnect-attempt limit. Values below -1 are clamped to -1.
    pub fn set_startup_max_reconnect_attempts(&mut self, attempts: i32) {
        self.startup_max_reconnect_attempts = attempts.max(-1);
    }

    /// Set the startup reconnect-attempt limit (builder style)
    pub fn with_startup_max_reconnect_attempts(mut self, attempts: i32) -> Self {
        self.set_startup_max_reconnect_attempts(attempts);
        self
    }

    /// Compile the specification into the transport connection string.
    ///
    /// A single endpoint without failover compiles to `scheme://host:port`.
    /// With failover enabled the endpoint list is wrapped in a failover
    /// group and followed by the `randomize` parameter and, when set (>= 0),
    /// the startup and steady-state reconnect limits in that order.
    ///
    /// Multiple endpoints without failover are an invalid configuration.
    pub fn compile(&self) -> Result<String, ConfigurationError> {
        if !self.failover && self.endpoints.len() > 1 {
            return Err(ConfigurationError::MultipleEndpointsWithoutFailover {
                count: self.endpoints.len(),
            });
        }

        let mut uri = String::new();

        if self.failover {
            uri.push_str("failover:(");
        }

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if i > 0 {
                uri.push(',');
            }
            uri.push_str(&endpoint.to_string());
        }

        if self.failover {
            uri.push(')');
            uri.push_str(&format!("?randomize={}", self.randomize));
            if self.startup_max_reconnect_attempts >= 0 {
                uri.push_str(&format!(
                    "&startupMaxReconnectAttempts={}",
                    self.startup_max_reconnect_attempts
                ));
            }
            if self.max_reconnect_attempts >= 0 {
                uri.push_str(&format!(
                    "&maxReconnectAttempts={}",
                    self.max_reconnect_attempts
                ));
            }
        }

        Ok(uri)
    }
}
