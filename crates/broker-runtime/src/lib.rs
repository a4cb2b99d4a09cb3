//! # Broker Runtime
//!
//! Strategy-driven client runtime for message-broker connections,
//! sessions, producers, consumers, and typed messages.
//!
//! This library provides:
//! - A pluggable resource-provisioning policy (one connection shared by
//!   everything, one per operation, ...) behind a single facade
//! - A default single-connection/single-session strategy with a
//!   monotonically growing destination cache
//! - Asynchronous dispatch of push-delivered messages off the transport's
//!   delivery task
//! - A failover-aware connection-string compiler
//! - An in-memory reference transport for development and testing
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all broker operations
//! - [`uri`] - Endpoints and connection-string compilation
//! - [`message`] - Typed message representations
//! - [`transport`] - The transport trait seam
//! - [`registry`] - Named collections of live resources
//! - [`dispatch`] - The handler dispatch pool
//! - [`strategy`] - The provisioning strategy contract
//! - [`strategies`] - Shipped strategy implementations
//! - [`client`] - Facade traits, the standard facade, and the factory
//! - [`config`] - Layered ambient configuration

// Module declarations
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod registry;
pub mod strategies;
pub mod strategy;
pub mod transport;
pub mod transports;
pub mod uri;

// Re-export commonly used types at crate root for convenience
pub use client::{
    AdvancedBroker, Broker, BrokerFactory, MessageDecoder, MessageEncoder, PlainTextCodec,
    StandardBroker,
};
pub use config::{BrokerConfig, Credentials};
pub use dispatch::{DispatchPool, MessageHandler};
pub use error::{BrokerError, ConfigurationError, TransportError};
pub use message::{FieldValue, Message, MessageBody, MessageId, MessageKind};
pub use registry::{NamedResource, RegistryCounts, ResourceRegistry};
pub use strategies::SingleChannelStrategy;
pub use strategy::ClientStrategy;
pub use transport::{
    AcknowledgeMode, Connection, ConnectionFactory, ConnectionHandle, Consumer, ConsumerHandle,
    DeliveryCallback, Destination, FactoryOptions, Producer, ProducerHandle, Session,
    SessionHandle,
};
pub use transports::MemoryConnectionFactory;
pub use uri::{BrokerUri, Endpoint};
