//! Error types for broker client operations.

use crate::message::MessageKind;
use thiserror::Error;

/// Comprehensive error type for all broker client operations.
///
/// Every variant that wraps a transport failure carries the stage-specific
/// reason in its display text and the underlying cause as `source`, so
/// callers can branch on the failing stage without parsing strings.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection creation failed: {source}")]
    ConnectionCreation {
        #[source]
        source: TransportError,
    },

    #[error("session creation failed: {source}")]
    SessionCreation {
        #[source]
        source: TransportError,
    },

    #[error("starting connection failed: {source}")]
    ConnectionStart {
        #[source]
        source: TransportError,
    },

    #[error("destination creation failed for '{name}': {source}")]
    DestinationCreation {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("producer creation failed: {source}")]
    ProducerCreation {
        #[source]
        source: TransportError,
    },

    #[error("consumer creation failed: {source}")]
    ConsumerCreation {
        #[source]
        source: TransportError,
    },

    #[error("{kind} message creation failed: {source}")]
    MessageCreation {
        kind: MessageKind,
        #[source]
        source: TransportError,
    },

    #[error("producer closing failed for '{name}': {source}")]
    ProducerClose {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("consumer closing failed for '{name}': {source}")]
    ConsumerClose {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("session closing failed: {source}")]
    SessionClose {
        #[source]
        source: TransportError,
    },

    #[error("connection closing failed: {source}")]
    ConnectionClose {
        #[source]
        source: TransportError,
    },

    #[error("unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    #[error("strategy is not bound to a broker")]
    NotBound,

    #[error("strategy is already bound to a broker")]
    AlreadyBound,

    #[error("strategy is already initialized")]
    AlreadyInitialized,

    #[error("broker is not initialized")]
    NotInitialized,

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl BrokerError {
    /// Check if error represents an operation the active policy does not support
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }

    /// Check if error originated in configuration rather than broker I/O
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Configuration errors: invalid address specifications and config loading
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to compile broker URI: {count} addresses were specified without failover")]
    MultipleEndpointsWithoutFailover { count: usize },

    #[error("invalid endpoint '{address}': {message}")]
    InvalidEndpoint { address: String, message: String },

    #[error("configuration loading failed: {message}")]
    Loading { message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors surfaced by the transport layer beneath the strategy seam
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{resource} is closed")]
    Closed { resource: &'static str },

    #[error("connection refused: {message}")]
    ConnectionRefused { message: String },

    #[error("connection has not been started")]
    NotStarted,

    #[error("unknown destination: {name}")]
    UnknownDestination { name: String },

    #[error("send failed: {message}")]
    SendFailed { message: String },

    #[error("receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
