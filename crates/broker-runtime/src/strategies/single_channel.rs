//! Single-connection, single-session provisioning strategy.
//!
//! The default policy: one connection and one session exist for the
//! facade's lifetime. The session auto-acknowledges and the connection is
//! configured for synchronous sends, so a `send` blocks its caller until
//! the transport has accepted the message. Destinations are cached by name
//! and never evicted; producers and consumers are created fresh on every
//! request.

use crate::dispatch::{DispatchPool, MessageHandler};
use crate::error::BrokerError;
use crate::message::{Message, MessageKind};
use crate::registry::ResourceRegistry;
use crate::strategy::ClientStrategy;
use crate::transport::{
    AcknowledgeMode, Connection, ConnectionFactory, ConnectionHandle, Consumer, ConsumerHandle,
    DeliveryCallback, Destination, FactoryOptions, Producer, ProducerHandle, Session,
    SessionHandle,
};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncRead;
use tracing::{debug, info};

#[cfg(test)]
#[path = "single_channel_tests.rs"]
mod tests;

/// Default time-to-live for produced messages, in milliseconds
const DEFAULT_MESSAGE_TTL_MS: i64 = 60_000;

/// Single-connection, single-session [`ClientStrategy`].
pub struct SingleChannelStrategy {
    registry: OnceLock<Arc<ResourceRegistry>>,
    pool: OnceLock<DispatchPool>,
    initialized: AtomicBool,
    closed: AtomicBool,
    destinations: tokio::sync::Mutex<HashMap<String, Destination>>,
}

impl SingleChannelStrategy {
    /// Create an unbound strategy
    pub fn new() -> Self {
        Self {
            registry: OnceLock::new(),
            pool: OnceLock::new(),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            destinations: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> Result<&Arc<ResourceRegistry>, BrokerError> {
        self.registry.get().ok_or(BrokerError::NotBound)
    }

    fn pool(&self) -> Result<&DispatchPool, BrokerError> {
        self.pool.get().ok_or(BrokerError::NotInitialized)
    }
}

impl Default for SingleChannelStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientStrategy for SingleChannelStrategy {
    fn bind(&self, registry: Arc<ResourceRegistry>) -> Result<(), BrokerError> {
        self.registry
            .set(registry)
            .map_err(|_| BrokerError::AlreadyBound)
    }

    async fn initialize(&self, factory: Arc<dyn ConnectionFactory>) -> Result<(), BrokerError> {
        let registry = self.registry()?;
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyInitialized);
        }

        registry.reset();

        // One connection, one session, auto-acknowledge, synchronous sends.
        factory.configure(FactoryOptions {
            client_id_prefix: factory.username().map(|username| format!("{}.", username)),
            synchronous_send: true,
        });

        self.pool.get_or_init(DispatchPool::new);

        let connection = factory
            .create_connection()
            .await
            .map_err(|source| BrokerError::ConnectionCreation { source })?;
        registry.add_connection("", connection.clone());

        let session = connection
            .create_session(AcknowledgeMode::Auto)
            .await
            .map_err(|source| BrokerError::SessionCreation { source })?;
        registry.add_session("", session);

        connection
            .start()
            .await
            .map_err(|source| BrokerError::ConnectionStart { source })?;

        info!(uri = %factory.broker_uri(), "Broker connection initialized");
        Ok(())
    }

    /// Always returns the single connection used with this strategy.
    fn connection(&self) -> Result<ConnectionHandle, BrokerError> {
        self.registry()?
            .connection()
            .ok_or(BrokerError::NotInitialized)
    }

    /// Not supported: this policy has no way to authenticate a second
    /// identity without opening a second connection, which it deliberately
    /// does not do.
    async fn connection_as(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<ConnectionHandle, BrokerError> {
        Err(BrokerError::UnsupportedOperation {
            message: "cannot get connection with specific username and password using this strategy"
                .to_string(),
        })
    }

    /// Always returns the single session used with this strategy.
    fn session(&self) -> Result<SessionHandle, BrokerError> {
        self.registry()?
            .session()
            .ok_or(BrokerError::NotInitialized)
    }

    /// Returns the cached destination for `name`, or creates one via the
    /// session on first use. The cache only ever grows.
    async fn destination(&self, name: &str) -> Result<Destination, BrokerError> {
        let mut destinations = self.destinations.lock().await;
        if let Some(destination) = destinations.get(name) {
            return Ok(destination.clone());
        }

        let session = self.session()?;
        let destination = session
            .create_destination(name)
            .await
            .map_err(|source| BrokerError::DestinationCreation {
                name: name.to_string(),
                source,
            })?;

        destinations.insert(name.to_string(), destination.clone());
        self.registry()?.add_destination(name, destination.clone());
        debug!(destination = %name, "Destination resolved");
        Ok(destination)
    }

    /// Always creates a new producer, with the default time-to-live applied.
    async fn producer(&self, destination: &Destination) -> Result<ProducerHandle, BrokerError> {
        let session = self.session()?;
        let producer = session
            .create_producer(destination)
            .await
            .map_err(|source| BrokerError::ProducerCreation { source })?;
        producer.set_time_to_live(Duration::milliseconds(DEFAULT_MESSAGE_TTL_MS));
        Ok(producer)
    }

    /// Always creates a new consumer.
    async fn consumer(&self, destination: &Destination) -> Result<ConsumerHandle, BrokerError> {
        let session = self.session()?;
        session
            .create_consumer(destination)
            .await
            .map_err(|source| BrokerError::ConsumerCreation { source })
    }

    /// Creates a new consumer whose deliveries are handed to the dispatch
    /// pool; the delivery callback returns as soon as the work is
    /// submitted.
    async fn listening_consumer(
        &self,
        destination: &Destination,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BrokerError> {
        let consumer = self.consumer(destination).await?;
        let pool = self.pool()?.clone();

        let listener: DeliveryCallback = Arc::new(move |message: Message| {
            pool.submit(message, handler.clone());
        });
        consumer
            .set_listener(listener)
            .map_err(|source| BrokerError::ConsumerCreation { source })?;

        Ok(consumer)
    }

    fn bytes_message(&self) -> Result<Message, BrokerError> {
        self.session()?
            .create_bytes_message()
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Bytes,
                source,
            })
    }

    fn text_message(&self) -> Result<Message, BrokerError> {
        self.session()?
            .create_text_message()
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Text,
                source,
            })
    }

    fn map_message(&self) -> Result<Message, BrokerError> {
        self.session()?
            .create_map_message()
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Map,
                source,
            })
    }

    fn object_message(&self) -> Result<Message, BrokerError> {
        self.session()?
            .create_object_message()
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Object,
                source,
            })
    }

    fn stream_message(&self) -> Result<Message, BrokerError> {
        self.session()?
            .create_stream_message()
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Stream,
                source,
            })
    }

    async fn blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, BrokerError> {
        let session = self.session()?;
        session
            .create_blob_message(reader)
            .await
            .map_err(|source| BrokerError::MessageCreation {
                kind: MessageKind::Blob,
                source,
            })
    }

    /// Closes every producer, then every consumer, then the session, then
    /// the connection, then shuts down the dispatch pool.
    ///
    /// The first close failure aborts the remaining sequence, so a failing
    /// producer close leaves later resources open. Callers that need
    /// best-effort teardown must retry close after handling the error.
    async fn close(&self) -> Result<(), BrokerError> {
        let registry = self.registry()?;
        if self.closed.load(Ordering::SeqCst) {
            debug!("Strategy already closed");
            return Ok(());
        }

        for entry in registry.producers() {
            entry
                .handle
                .close()
                .await
                .map_err(|source| BrokerError::ProducerClose {
                    name: entry.name.clone(),
                    source,
                })?;
        }

        for entry in registry.consumers() {
            entry
                .handle
                .close()
                .await
                .map_err(|source| BrokerError::ConsumerClose {
                    name: entry.name.clone(),
                    source,
                })?;
        }

        if let Some(session) = registry.session() {
            session
                .close()
                .await
                .map_err(|source| BrokerError::SessionClose { source })?;
        }

        if let Some(connection) = registry.connection() {
            connection
                .close()
                .await
                .map_err(|source| BrokerError::ConnectionClose { source })?;
        }

        if let Some(pool) = self.pool.get() {
            pool.shutdown().await;
        }

        self.closed.store(true, Ordering::SeqCst);
        info!("Broker connection closed");
        Ok(())
    }
}
