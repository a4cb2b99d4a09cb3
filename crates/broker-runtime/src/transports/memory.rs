//! In-memory transport implementation.
//!
//! A fully functional transport backed by per-destination in-process
//! queues. It is the reference implementation of the transport seam, the
//! development backend, and the test double for everything above the seam:
//! - blocking receive with timeout, push delivery in arrival order
//! - connection-start gating: nothing is delivered before `start()`
//! - message TTL expiry on delivery
//! - closed-handle errors on every operation after `close()`

use crate::config::Credentials;
use crate::error::TransportError;
use crate::message::{Message, MessageKind};
use crate::transport::{
    AcknowledgeMode, Connection, ConnectionFactory, ConnectionHandle, Consumer, ConsumerHandle,
    DeliveryCallback, Destination, FactoryOptions, Producer, ProducerHandle, Session,
    SessionHandle,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal storage
// ============================================================================

/// One broker instance's destination stores, shared by every connection the
/// factory opens.
#[derive(Default)]
struct MemoryCore {
    destinations: RwLock<HashMap<String, Arc<DestinationStore>>>,
}

impl MemoryCore {
    fn get_or_create(&self, name: &str) -> Arc<DestinationStore> {
        if let Some(store) = self.destinations.read().unwrap().get(name) {
            return store.clone();
        }
        let mut destinations = self.destinations.write().unwrap();
        destinations
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DestinationStore::new(name)))
            .clone()
    }
}

/// Message store for a single destination
struct DestinationStore {
    name: String,
    id: Uuid,
    queue: Mutex<VecDeque<StoredMessage>>,
    arrivals: Notify,
}

impl DestinationStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: Uuid::new_v4(),
            queue: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
        }
    }

    fn push(&self, stored: StoredMessage) {
        self.queue.lock().unwrap().push_back(stored);
        self.arrivals.notify_one();
    }

    /// Pop the next unexpired message, discarding expired ones on the way
    fn pop_available(&self) -> Option<Message> {
        let mut queue = self.queue.lock().unwrap();
        while let Some(stored) = queue.pop_front() {
            if stored.is_expired() {
                debug!(
                    destination = %self.name,
                    message_id = %stored.message.message_id,
                    "Discarding expired message"
                );
                continue;
            }
            return Some(stored.message);
        }
        None
    }
}

/// A message queued on a destination, with its expiry computed at send time
struct StoredMessage {
    message: Message,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredMessage {
    fn new(message: Message, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| Utc::now() + ttl);
        Self {
            message,
            expires_at,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() >= expires_at)
    }
}

/// Start/close state shared by a connection and everything under it
struct ConnectionState {
    started_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl ConnectionState {
    fn new() -> Self {
        let (started_tx, _) = watch::channel(false);
        Self {
            started_tx,
            closed: AtomicBool::new(false),
        }
    }

    fn is_started(&self) -> bool {
        *self.started_tx.borrow()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn wait_until_started(&self) {
        let mut rx = self.started_tx.subscribe();
        // Closed senders only occur when the connection itself is gone.
        let _ = rx.wait_for(|started| *started).await;
    }
}

// ============================================================================
// Factory
// ============================================================================

/// [`ConnectionFactory`] for the in-memory transport.
///
/// Every connection opened by one factory shares the same destination
/// stores, so producers and consumers opened on different connections of
/// the same factory see each other's messages.
pub struct MemoryConnectionFactory {
    uri: String,
    credentials: Option<Credentials>,
    options: RwLock<FactoryOptions>,
    core: Arc<MemoryCore>,
}

impl MemoryConnectionFactory {
    /// Create a factory for the given compiled connection string
    pub fn new(uri: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            uri: uri.into(),
            credentials,
            options: RwLock::new(FactoryOptions::default()),
            core: Arc::new(MemoryCore::default()),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    fn broker_uri(&self) -> &str {
        &self.uri
    }

    fn username(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .map(|credentials| credentials.username.as_str())
    }

    fn configure(&self, options: FactoryOptions) {
        *self.options.write().unwrap() = options;
    }

    fn options(&self) -> FactoryOptions {
        self.options.read().unwrap().clone()
    }

    async fn create_connection(&self) -> Result<ConnectionHandle, TransportError> {
        if self.uri.is_empty() {
            return Err(TransportError::ConnectionRefused {
                message: "empty connection string".to_string(),
            });
        }

        let prefix = self
            .options
            .read()
            .unwrap()
            .client_id_prefix
            .clone()
            .unwrap_or_default();
        let client_id = format!("{}{}", prefix, Uuid::new_v4());

        debug!(uri = %self.uri, client_id = %client_id, "Opening in-memory connection");
        Ok(Arc::new(MemoryConnection {
            client_id,
            core: self.core.clone(),
            state: Arc::new(ConnectionState::new()),
        }))
    }
}

// ============================================================================
// Connection
// ============================================================================

struct MemoryConnection {
    client_id: String,
    core: Arc<MemoryCore>,
    state: Arc<ConnectionState>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn create_session(
        &self,
        mode: AcknowledgeMode,
    ) -> Result<SessionHandle, TransportError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed {
                resource: "connection",
            });
        }
        Ok(Arc::new(MemorySession {
            core: self.core.clone(),
            state: self.state.clone(),
            _mode: mode,
            closed: AtomicBool::new(false),
        }))
    }

    async fn start(&self) -> Result<(), TransportError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed {
                resource: "connection",
            });
        }
        self.state.started_tx.send_replace(true);
        debug!(client_id = %self.client_id, "Connection started");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.closed.store(true, Ordering::SeqCst);
        debug!(client_id = %self.client_id, "Connection closed");
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

struct MemorySession {
    core: Arc<MemoryCore>,
    state: Arc<ConnectionState>,
    _mode: AcknowledgeMode,
    closed: AtomicBool,
}

impl MemorySession {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed { resource: "session" });
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn create_destination(&self, name: &str) -> Result<Destination, TransportError> {
        self.check_open()?;
        let store = self.core.get_or_create(name);
        Ok(Destination::new(name, store.id))
    }

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<ProducerHandle, TransportError> {
        self.check_open()?;
        let store = self.core.get_or_create(destination.name());
        Ok(Arc::new(MemoryProducer {
            destination: destination.clone(),
            store,
            ttl: RwLock::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> Result<ConsumerHandle, TransportError> {
        self.check_open()?;
        let store = self.core.get_or_create(destination.name());
        Ok(Arc::new(MemoryConsumer {
            destination: destination.clone(),
            store,
            state: self.state.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            listener_task: Mutex::new(None),
        }))
    }

    fn create_bytes_message(&self) -> Result<Message, TransportError> {
        self.check_open()?;
        Ok(Message::empty(MessageKind::Bytes))
    }

    fn create_text_message(&self) -> Result<Message, TransportError> {
        self.check_open()?;
        Ok(Message::empty(MessageKind::Text))
    }

    fn create_map_message(&self) -> Result<Message, TransportError> {
        self.check_open()?;
        Ok(Message::empty(MessageKind::Map))
    }

    fn create_object_message(&self) -> Result<Message, TransportError> {
        self.check_open()?;
        Ok(Message::empty(MessageKind::Object))
    }

    fn create_stream_message(&self) -> Result<Message, TransportError> {
        self.check_open()?;
        Ok(Message::empty(MessageKind::Stream))
    }

    async fn create_blob_message(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, TransportError> {
        self.check_open()?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).await?;
        let mut message = Message::empty(MessageKind::Blob);
        message.body = crate::message::MessageBody::Blob(Bytes::from(payload));
        Ok(message)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Producer
// ============================================================================

struct MemoryProducer {
    destination: Destination,
    store: Arc<DestinationStore>,
    ttl: RwLock<Option<Duration>>,
    closed: AtomicBool,
}

#[async_trait]
impl Producer for MemoryProducer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn time_to_live(&self) -> Option<Duration> {
        *self.ttl.read().unwrap()
    }

    fn set_time_to_live(&self, ttl: Duration) {
        *self.ttl.write().unwrap() = Some(ttl);
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                resource: "producer",
            });
        }

        // Message TTL wins over the producer default.
        let ttl = message.time_to_live.or(*self.ttl.read().unwrap());
        self.store.push(StoredMessage::new(message, ttl));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Consumer
// ============================================================================

struct MemoryConsumer {
    destination: Destination,
    store: Arc<DestinationStore>,
    state: Arc<ConnectionState>,
    closed: Arc<AtomicBool>,
    listener_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                resource: "consumer",
            });
        }

        let wait = timeout.to_std().unwrap_or_default();
        let state = self.state.clone();
        let store = self.store.clone();
        let closed = self.closed.clone();

        let outcome = tokio::time::timeout(wait, async move {
            state.wait_until_started().await;
            loop {
                if closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed {
                        resource: "consumer",
                    });
                }
                if let Some(message) = store.pop_available() {
                    return Ok(message);
                }
                let arrival = store.arrivals.notified();
                // A message may have landed between the pop and the wait.
                if let Some(message) = store.pop_available() {
                    return Ok(message);
                }
                arrival.await;
            }
        })
        .await;

        match outcome {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(None),
        }
    }

    fn set_listener(&self, listener: DeliveryCallback) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                resource: "consumer",
            });
        }

        let state = self.state.clone();
        let store = self.store.clone();
        let closed = self.closed.clone();

        let task = tokio::spawn(async move {
            state.wait_until_started().await;
            loop {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                match store.pop_available() {
                    Some(message) => listener(message),
                    None => {
                        let arrival = store.arrivals.notified();
                        if closed.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Some(message) = store.pop_available() {
                            listener(message);
                            continue;
                        }
                        arrival.await;
                    }
                }
            }
            debug!(destination = %store.name, "Delivery task stopped");
        });

        let mut slot = self.listener_task.lock().unwrap();
        if let Some(previous) = slot.replace(task) {
            warn!(destination = %self.destination.name(), "Replacing message listener");
            previous.abort();
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        // Wake anything blocked on this destination so it observes the close.
        self.store.arrivals.notify_waiters();
        if let Some(task) = self.listener_task.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }
}
