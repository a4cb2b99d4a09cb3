//! Transport seam: the traits a broker transport must implement.
//!
//! Everything above this seam (strategies, the facade, the registry) is
//! transport-agnostic. A transport supplies connections from a compiled
//! connection string; connections open sessions; sessions mint
//! destinations, producers, consumers, and empty messages. The in-memory
//! reference transport lives in [`crate::transports::memory`].

use crate::error::TransportError;
use crate::message::Message;
use async_trait::async_trait;
use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Shared handle to a live connection
pub type ConnectionHandle = Arc<dyn Connection>;
/// Shared handle to a live session
pub type SessionHandle = Arc<dyn Session>;
/// Shared handle to a producer
pub type ProducerHandle = Arc<dyn Producer>;
/// Shared handle to a consumer
pub type ConsumerHandle = Arc<dyn Consumer>;

/// Callback invoked by the transport's delivery task for every pushed
/// message. Implementations must return promptly; anything slow belongs on
/// the dispatch pool.
pub type DeliveryCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// How a session acknowledges delivered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeMode {
    /// The session acknowledges on behalf of the consumer as messages are
    /// delivered.
    Auto,
    /// The application acknowledges explicitly.
    Client,
}

/// Settings a strategy applies to the factory before opening connections
#[derive(Debug, Clone, Default)]
pub struct FactoryOptions {
    /// Prefix for generated connection client identifiers
    pub client_id_prefix: Option<String>,
    /// When set, sends block until the transport has accepted the message
    /// instead of being handed to an internal dispatch thread.
    pub synchronous_send: bool,
}

/// A named addressable target messages are sent to or received from.
///
/// Two `Destination` values compare equal exactly when they refer to the
/// same underlying transport resource.
#[derive(Debug, Clone, Eq)]
pub struct Destination {
    name: String,
    id: Uuid,
}

impl Destination {
    /// Create a destination handle. Transports call this when resolving a
    /// name to an underlying resource; `id` identifies that resource.
    pub fn new(name: impl Into<String>, id: Uuid) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    /// Get the logical destination name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the transport resource identifier
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Mints connections for one broker instance from a compiled connection
/// string and optional default credentials.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The connection string this factory opens connections against
    fn broker_uri(&self) -> &str;

    /// The default username, if credentials were supplied
    fn username(&self) -> Option<&str>;

    /// Apply connection settings; affects connections opened afterwards
    fn configure(&self, options: FactoryOptions);

    /// Snapshot of the currently applied settings
    fn options(&self) -> FactoryOptions;

    /// Open a new connection using the default credentials
    async fn create_connection(&self) -> Result<ConnectionHandle, TransportError>;
}

/// A live connection to the broker
#[async_trait]
pub trait Connection: Send + Sync {
    /// The transport-assigned client identifier for this connection
    fn client_id(&self) -> &str;

    /// Open a session on this connection
    async fn create_session(&self, mode: AcknowledgeMode)
        -> Result<SessionHandle, TransportError>;

    /// Enable inbound delivery. Consumers created before `start` see no
    /// messages until it is called.
    async fn start(&self) -> Result<(), TransportError>;

    /// Check whether delivery has been enabled
    fn is_started(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<(), TransportError>;
}

/// A stateful context under a connection used to create producers,
/// consumers, destinations, and messages.
#[async_trait]
pub trait Session: Send + Sync {
    /// Resolve a logical name to a destination, creating it if needed
    async fn create_destination(&self, name: &str) -> Result<Destination, TransportError>;

    /// Create a send handle bound to a destination
    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<ProducerHandle, TransportError>;

    /// Create a receive handle bound to a destination
    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> Result<ConsumerHandle, TransportError>;

    /// Construct an empty bytes message
    fn create_bytes_message(&self) -> Result<Message, TransportError>;

    /// Construct an empty text message
    fn create_text_message(&self) -> Result<Message, TransportError>;

    /// Construct an empty map message
    fn create_map_message(&self) -> Result<Message, TransportError>;

    /// Construct an empty object message
    fn create_object_message(&self) -> Result<Message, TransportError>;

    /// Construct an empty stream message
    fn create_stream_message(&self) -> Result<Message, TransportError>;

    /// Construct a blob message with its payload streamed from `reader`
    async fn create_blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, TransportError>;

    /// Close the session
    async fn close(&self) -> Result<(), TransportError>;
}

/// Send-side handle bound to one destination
#[async_trait]
pub trait Producer: Send + Sync {
    /// The destination this producer sends to
    fn destination(&self) -> &Destination;

    /// Default time-to-live applied to messages that carry none
    fn time_to_live(&self) -> Option<Duration>;

    /// Set the default time-to-live for produced messages
    fn set_time_to_live(&self, ttl: Duration);

    /// Send a message. Resolves once the transport has accepted the
    /// message for delivery.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Close the producer
    async fn close(&self) -> Result<(), TransportError>;
}

/// Receive-side handle bound to one destination
#[async_trait]
pub trait Consumer: Send + Sync {
    /// The destination this consumer receives from
    fn destination(&self) -> &Destination;

    /// Receive the next message, waiting up to `timeout`. Expiry resolves
    /// to `Ok(None)`, not an error.
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, TransportError>;

    /// Install a push-delivery callback. The transport invokes it from its
    /// delivery task for every arriving message, in delivery order.
    fn set_listener(&self, listener: DeliveryCallback) -> Result<(), TransportError>;

    /// Close the consumer and stop its deliveries
    async fn close(&self) -> Result<(), TransportError>;
}
