//! Broker facade traits, the standard facade, and the broker factory.
//!
//! Callers hold a [`StandardBroker`] (usually behind the [`Broker`] or
//! [`AdvancedBroker`] trait) and never touch the provisioning policy
//! directly: every operation is delegated to the active
//! [`ClientStrategy`], which reads and writes the facade's
//! [`ResourceRegistry`].

use crate::config::{BrokerConfig, Credentials};
use crate::dispatch::MessageHandler;
use crate::error::BrokerError;
use crate::message::Message;
use crate::registry::ResourceRegistry;
use crate::strategies::SingleChannelStrategy;
use crate::strategy::ClientStrategy;
use crate::transport::{
    ConnectionFactory, ConnectionHandle, ConsumerHandle, Destination, ProducerHandle,
    SessionHandle,
};
use crate::transports::MemoryConnectionFactory;
use crate::uri::BrokerUri;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::info;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// ============================================================================
// Facade traits
// ============================================================================

/// Basic broker client surface: destinations, producers, consumers, and the
/// common message representations.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Resolve-or-create a destination for a logical name
    async fn destination(&self, name: &str) -> Result<Destination, BrokerError>;

    /// Create a producer on the given destination
    async fn producer(&self, destination: &Destination) -> Result<ProducerHandle, BrokerError>;

    /// Create a consumer on the given destination
    async fn consumer(&self, destination: &Destination) -> Result<ConsumerHandle, BrokerError>;

    /// Create a consumer that delegates every delivered message to
    /// `handler` asynchronously.
    async fn listening_consumer(
        &self,
        destination: &Destination,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BrokerError>;

    /// Construct an empty bytes message
    fn bytes_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty text message
    fn text_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty object message
    fn object_message(&self) -> Result<Message, BrokerError>;

    /// Release every resource held for this broker
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Advanced surface: transport internals and the less common message
/// representations.
#[async_trait]
pub trait AdvancedBroker: Broker {
    /// The compiled connection string this broker was opened with
    fn uri(&self) -> &str;

    /// The registry of live resources for this broker
    fn registry(&self) -> Arc<ResourceRegistry>;

    /// The active connection
    fn connection(&self) -> Result<ConnectionHandle, BrokerError>;

    /// A connection authenticated with the given credentials, if the
    /// active policy supports per-call credentials.
    async fn connection_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ConnectionHandle, BrokerError>;

    /// The active session
    fn session(&self) -> Result<SessionHandle, BrokerError>;

    /// Construct an empty map message
    fn map_message(&self) -> Result<Message, BrokerError>;

    /// Construct an empty stream message
    fn stream_message(&self) -> Result<Message, BrokerError>;

    /// Construct a blob message with its payload streamed from `reader`
    async fn blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, BrokerError>;
}

// ============================================================================
// Codec extension points
// ============================================================================

/// Encodes a plain-text payload into a constructed message. Needs the
/// broker for instantiating empty messages. Supplied by the caller at the
/// send call site; the runtime performs no codec discovery of its own.
pub trait MessageEncoder: Send + Sync {
    fn encode(&self, text: &str, broker: &dyn AdvancedBroker) -> Result<Message, BrokerError>;
}

/// Decodes a received message into a plain-text representation. Supplied by
/// the caller at the receive call site.
pub trait MessageDecoder: Send + Sync {
    fn decode(&self, message: &Message) -> Result<String, BrokerError>;
}

/// Text-body codec: encodes into a text message and decodes text bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextCodec;

impl MessageEncoder for PlainTextCodec {
    fn encode(&self, text: &str, broker: &dyn AdvancedBroker) -> Result<Message, BrokerError> {
        Ok(broker.text_message()?.with_text(text))
    }
}

impl MessageDecoder for PlainTextCodec {
    fn decode(&self, message: &Message) -> Result<String, BrokerError> {
        message
            .text()
            .map(str::to_string)
            .ok_or_else(|| BrokerError::UnsupportedOperation {
                message: format!("cannot decode a {} message as text", message.kind()),
            })
    }
}

// ============================================================================
// Standard facade
// ============================================================================

/// The standard broker facade: owns the registry, delegates every
/// operation to the active strategy, and keeps advisory bookkeeping of the
/// producers and consumers it hands out so close can reach them.
pub struct StandardBroker {
    strategy: Box<dyn ClientStrategy>,
    registry: Arc<ResourceRegistry>,
    uri: String,
}

impl StandardBroker {
    /// Bind `strategy` to a fresh registry, initialize it against
    /// `factory`, and return the ready facade.
    pub async fn connect(
        strategy: Box<dyn ClientStrategy>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self, BrokerError> {
        let registry = Arc::new(ResourceRegistry::new());
        strategy.bind(registry.clone())?;
        strategy.initialize(factory.clone()).await?;
        Ok(Self {
            strategy,
            registry,
            uri: factory.broker_uri().to_string(),
        })
    }
}

#[async_trait]
impl Broker for StandardBroker {
    async fn destination(&self, name: &str) -> Result<Destination, BrokerError> {
        self.strategy.destination(name).await
    }

    async fn producer(&self, destination: &Destination) -> Result<ProducerHandle, BrokerError> {
        let producer = self.strategy.producer(destination).await?;
        self.registry
            .add_producer(destination.name(), producer.clone());
        Ok(producer)
    }

    async fn consumer(&self, destination: &Destination) -> Result<ConsumerHandle, BrokerError> {
        let consumer = self.strategy.consumer(destination).await?;
        self.registry
            .add_consumer(destination.name(), consumer.clone());
        Ok(consumer)
    }

    async fn listening_consumer(
        &self,
        destination: &Destination,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BrokerError> {
        let consumer = self.strategy.listening_consumer(destination, handler).await?;
        self.registry
            .add_consumer(destination.name(), consumer.clone());
        Ok(consumer)
    }

    fn bytes_message(&self) -> Result<Message, BrokerError> {
        self.strategy.bytes_message()
    }

    fn text_message(&self) -> Result<Message, BrokerError> {
        self.strategy.text_message()
    }

    fn object_message(&self) -> Result<Message, BrokerError> {
        self.strategy.object_message()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.strategy.close().await
    }
}

#[async_trait]
impl AdvancedBroker for StandardBroker {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn registry(&self) -> Arc<ResourceRegistry> {
        self.registry.clone()
    }

    fn connection(&self) -> Result<ConnectionHandle, BrokerError> {
        self.strategy.connection()
    }

    async fn connection_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ConnectionHandle, BrokerError> {
        self.strategy.connection_as(username, password).await
    }

    fn session(&self) -> Result<SessionHandle, BrokerError> {
        self.strategy.session()
    }

    fn map_message(&self) -> Result<Message, BrokerError> {
        self.strategy.map_message()
    }

    fn stream_message(&self) -> Result<Message, BrokerError> {
        self.strategy.stream_message()
    }

    async fn blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, BrokerError> {
        self.strategy.blob_message(reader).await
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds ready-to-use broker facades.
///
/// The convenience constructors compile the address specification, back the
/// facade with the in-memory transport, and default the policy to
/// [`SingleChannelStrategy`]; [`connect_with`](Self::connect_with) accepts
/// any strategy/transport pairing.
pub struct BrokerFactory;

impl BrokerFactory {
    /// Connect with the default strategy and the in-memory transport
    pub async fn connect(
        uri: &BrokerUri,
        credentials: Option<Credentials>,
    ) -> Result<StandardBroker, BrokerError> {
        let compiled = uri.compile()?;
        info!(uri = %compiled, "Creating broker");
        let factory = Arc::new(MemoryConnectionFactory::new(compiled, credentials));
        Self::connect_with(Box::new(SingleChannelStrategy::new()), factory).await
    }

    /// Connect from an ambient configuration
    pub async fn connect_with_config(config: &BrokerConfig) -> Result<StandardBroker, BrokerError> {
        Self::connect(&config.uri()?, config.credentials.clone()).await
    }

    /// Connect with an explicit strategy and transport factory
    pub async fn connect_with(
        strategy: Box<dyn ClientStrategy>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<StandardBroker, BrokerError> {
        StandardBroker::connect(strategy, factory).await
    }
}
