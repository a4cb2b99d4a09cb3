//! The pluggable resource-provisioning contract.
//!
//! A [`ClientStrategy`] decides how connections, sessions, destinations,
//! producers, and consumers are created, cached, and reused on behalf of a
//! broker facade. The facade delegates every operation here; the strategy
//! reads and writes the facade's [`ResourceRegistry`](crate::registry::ResourceRegistry).
//!
//! The shipped implementation is
//! [`SingleChannelStrategy`](crate::strategies::SingleChannelStrategy)
//! (one connection, one session). Other policies, such as one session per
//! task or a pooled-connection variant, implement this same trait and plug
//! into the facade unchanged.

use crate::dispatch::MessageHandler;
use crate::error::BrokerError;
use crate::message::Message;
use crate::registry::ResourceRegistry;
use crate::transport::{
    ConnectionFactory, ConnectionHandle, ConsumerHandle, Destination, ProducerHandle,
    SessionHandle,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Resource-provisioning policy for one broker facade.
///
/// Lifecycle: [`bind`](Self::bind) exactly once, then
/// [`initialize`](Self::initialize) exactly once, then accessor calls for
/// the facade's lifetime, then [`close`](Self::close).
#[async_trait]
pub trait ClientStrategy: Send + Sync {
    /// One-time association with the owning facade's registry. Must precede
    /// every other call; binding twice is an error.
    fn bind(&self, registry: Arc<ResourceRegistry>) -> Result<(), BrokerError>;

    /// Open whatever connections and sessions the policy requires and
    /// populate the registry. Called exactly once per facade lifetime.
    async fn initialize(&self, factory: Arc<dyn ConnectionFactory>) -> Result<(), BrokerError>;

    /// The active connection under this policy
    fn connection(&self) -> Result<ConnectionHandle, BrokerError>;

    /// A connection authenticated with the given credentials.
    ///
    /// Policies without per-call credentials return
    /// [`BrokerError::UnsupportedOperation`].
    async fn connection_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ConnectionHandle, BrokerError>;

    /// The active session under this policy
    fn session(&self) -> Result<SessionHandle, BrokerError>;

    /// Resolve-or-create a destination handle for a logical name
    async fn destination(&self, name: &str) -> Result<Destination, BrokerError>;

    /// Create a send handle bound to a destination
    async fn producer(&self, destination: &Destination) -> Result<ProducerHandle, BrokerError>;

    /// Create a receive handle bound to a destination
    async fn consumer(&self, destination: &Destination) -> Result<ConsumerHandle, BrokerError>;

    /// Create a receive handle that invokes `handler` asynchronously for
    /// every delivered message.
    async fn listening_consumer(
        &self,
        destination: &Destination,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BrokerError>;

    /// Construct an empty bytes message
    fn bytes_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty text message
    fn text_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty map message
    fn map_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty object message
    fn object_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty stream message
    fn stream_message(&self) -> Result<Message, BrokerError>;

    /// Construct a blob message with its payload streamed from `reader`
    async fn blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, BrokerError>;

    /// Release every resource this policy owns. Implementations should
    /// attempt to close all owned resources and must report an error if
    /// any close failed.
    async fn close(&self) -> Result<(), BrokerError>;
}
