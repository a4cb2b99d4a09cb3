//! Tests for the single-connection/single-session strategy, driven by a
//! recording fake transport that logs every lifecycle call and can be told
//! to fail at any stage.

use super::*;
use crate::error::TransportError;
use crate::transport::{Connection, ConnectionFactory, Consumer, Producer, Session};
use std::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Recording fake transport
// ============================================================================

type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Default, Clone)]
struct Failures {
    connection_create: bool,
    session_create: bool,
    connection_start: bool,
    producer_close: bool,
    consumer_close: bool,
    session_close: bool,
    connection_close: bool,
}

type ConsumerTrack = Arc<Mutex<Vec<Arc<RecordingConsumer>>>>;

struct RecordingFactory {
    username: Option<String>,
    options: std::sync::RwLock<FactoryOptions>,
    log: EventLog,
    consumers: ConsumerTrack,
    failures: Failures,
}

impl RecordingFactory {
    fn new() -> Arc<Self> {
        Self::with_failures(Failures::default())
    }

    fn with_failures(failures: Failures) -> Arc<Self> {
        Arc::new(Self {
            username: Some("user".to_string()),
            options: std::sync::RwLock::new(FactoryOptions::default()),
            log: Arc::new(Mutex::new(Vec::new())),
            consumers: Arc::new(Mutex::new(Vec::new())),
            failures,
        })
    }

    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn last_consumer(&self) -> Arc<RecordingConsumer> {
        self.consumers
            .lock()
            .unwrap()
            .last()
            .expect("a consumer was created")
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for RecordingFactory {
    fn broker_uri(&self) -> &str {
        "fake://broker:1"
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn configure(&self, options: FactoryOptions) {
        *self.options.write().unwrap() = options;
    }

    fn options(&self) -> FactoryOptions {
        self.options.read().unwrap().clone()
    }

    async fn create_connection(&self) -> Result<ConnectionHandle, TransportError> {
        if self.failures.connection_create {
            return Err(TransportError::ConnectionRefused {
                message: "induced failure".to_string(),
            });
        }
        self.log.lock().unwrap().push("connection:create".to_string());
        Ok(Arc::new(RecordingConnection {
            log: self.log.clone(),
            consumers: self.consumers.clone(),
            failures: self.failures.clone(),
        }))
    }
}

struct RecordingConnection {
    log: EventLog,
    consumers: ConsumerTrack,
    failures: Failures,
}

#[async_trait]
impl Connection for RecordingConnection {
    fn client_id(&self) -> &str {
        "fake-client"
    }

    async fn create_session(
        &self,
        _mode: AcknowledgeMode,
    ) -> Result<SessionHandle, TransportError> {
        if self.failures.session_create {
            return Err(TransportError::Closed {
                resource: "connection",
            });
        }
        self.log.lock().unwrap().push("session:create".to_string());
        Ok(Arc::new(RecordingSession {
            log: self.log.clone(),
            consumers: self.consumers.clone(),
            failures: self.failures.clone(),
        }))
    }

    async fn start(&self) -> Result<(), TransportError> {
        if self.failures.connection_start {
            return Err(TransportError::NotStarted);
        }
        self.log.lock().unwrap().push("connection:start".to_string());
        Ok(())
    }

    fn is_started(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.failures.connection_close {
            return Err(TransportError::Closed {
                resource: "connection",
            });
        }
        self.log.lock().unwrap().push("connection:close".to_string());
        Ok(())
    }
}

struct RecordingSession {
    log: EventLog,
    consumers: ConsumerTrack,
    failures: Failures,
}

#[async_trait]
impl Session for RecordingSession {
    async fn create_destination(&self, name: &str) -> Result<Destination, TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("destination:create:{}", name));
        Ok(Destination::new(name, Uuid::new_v4()))
    }

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<ProducerHandle, TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("producer:create:{}", destination.name()));
        Ok(Arc::new(RecordingProducer {
            destination: destination.clone(),
            ttl: std::sync::RwLock::new(None),
            log: self.log.clone(),
            fail_close: self.failures.producer_close,
        }))
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> Result<ConsumerHandle, TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("consumer:create:{}", destination.name()));
        let consumer = Arc::new(RecordingConsumer {
            destination: destination.clone(),
            listener: Mutex::new(None),
            log: self.log.clone(),
            fail_close: self.failures.consumer_close,
        });
        self.consumers.lock().unwrap().push(consumer.clone());
        Ok(consumer)
    }

    fn create_bytes_message(&self) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Bytes))
    }

    fn create_text_message(&self) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Text))
    }

    fn create_map_message(&self) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Map))
    }

    fn create_object_message(&self) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Object))
    }

    fn create_stream_message(&self) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Stream))
    }

    async fn create_blob_message(
        &self,
        _reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Message, TransportError> {
        Ok(Message::empty(MessageKind::Blob))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.failures.session_close {
            return Err(TransportError::Closed { resource: "session" });
        }
        self.log.lock().unwrap().push("session:close".to_string());
        Ok(())
    }
}

struct RecordingProducer {
    destination: Destination,
    ttl: std::sync::RwLock<Option<Duration>>,
    log: EventLog,
    fail_close: bool,
}

#[async_trait]
impl Producer for RecordingProducer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn time_to_live(&self) -> Option<Duration> {
        *self.ttl.read().unwrap()
    }

    fn set_time_to_live(&self, ttl: Duration) {
        *self.ttl.write().unwrap() = Some(ttl);
    }

    async fn send(&self, _message: Message) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.fail_close {
            return Err(TransportError::Closed {
                resource: "producer",
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("producer:close:{}", self.destination.name()));
        Ok(())
    }
}

struct RecordingConsumer {
    destination: Destination,
    listener: Mutex<Option<DeliveryCallback>>,
    log: EventLog,
    fail_close: bool,
}

impl RecordingConsumer {
    /// Simulate the transport's delivery task pushing one message
    fn deliver(&self, message: Message) {
        let listener = self.listener.lock().unwrap();
        let listener = listener.as_ref().expect("listener installed");
        listener(message);
    }
}

#[async_trait]
impl Consumer for RecordingConsumer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn receive(&self, _timeout: Duration) -> Result<Option<Message>, TransportError> {
        Ok(None)
    }

    fn set_listener(&self, listener: DeliveryCallback) -> Result<(), TransportError> {
        *self.listener.lock().unwrap() = Some(listener);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.fail_close {
            return Err(TransportError::Closed {
                resource: "consumer",
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("consumer:close:{}", self.destination.name()));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn initialized_strategy(
    factory: &Arc<RecordingFactory>,
) -> (SingleChannelStrategy, Arc<ResourceRegistry>) {
    let strategy = SingleChannelStrategy::new();
    let registry = Arc::new(ResourceRegistry::new());
    strategy.bind(registry.clone()).unwrap();
    strategy
        .initialize(factory.clone() as Arc<dyn ConnectionFactory>)
        .await
        .unwrap();
    (strategy, registry)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_bind_twice_is_rejected() {
    let strategy = SingleChannelStrategy::new();
    strategy.bind(Arc::new(ResourceRegistry::new())).unwrap();

    let result = strategy.bind(Arc::new(ResourceRegistry::new()));

    assert!(matches!(result, Err(BrokerError::AlreadyBound)));
}

#[tokio::test]
async fn test_initialize_requires_bind() {
    let strategy = SingleChannelStrategy::new();
    let factory = RecordingFactory::new();

    let result = strategy
        .initialize(factory as Arc<dyn ConnectionFactory>)
        .await;

    assert!(matches!(result, Err(BrokerError::NotBound)));
}

#[tokio::test]
async fn test_initialize_twice_is_rejected() {
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;

    let result = strategy
        .initialize(factory as Arc<dyn ConnectionFactory>)
        .await;

    assert!(matches!(result, Err(BrokerError::AlreadyInitialized)));
}

#[tokio::test]
async fn test_initialize_populates_singleton_entries() {
    // Act
    let factory = RecordingFactory::new();
    let (_strategy, registry) = initialized_strategy(&factory).await;

    // Assert - one connection and one session, both under the empty name
    let connections = registry.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].name, "");
    let sessions = registry.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "");

    // Open, create session, then start - in that order
    assert_eq!(
        factory.events(),
        vec!["connection:create", "session:create", "connection:start"]
    );
}

#[tokio::test]
async fn test_initialize_applies_factory_settings() {
    // Act
    let factory = RecordingFactory::new();
    let (_strategy, _registry) = initialized_strategy(&factory).await;

    // Assert - synchronous sends and the username-derived client id prefix
    let options = factory.options();
    assert!(options.synchronous_send);
    assert_eq!(options.client_id_prefix.as_deref(), Some("user."));
}

#[tokio::test]
async fn test_initialize_connection_failure_leaves_registry_empty() {
    // Arrange
    let factory = RecordingFactory::with_failures(Failures {
        connection_create: true,
        ..Failures::default()
    });
    let strategy = SingleChannelStrategy::new();
    let registry = Arc::new(ResourceRegistry::new());
    strategy.bind(registry.clone()).unwrap();

    // Act
    let result = strategy
        .initialize(factory as Arc<dyn ConnectionFactory>)
        .await;

    // Assert
    assert!(matches!(result, Err(BrokerError::ConnectionCreation { .. })));
    assert_eq!(registry.counts().connections, 0);
    assert_eq!(registry.counts().sessions, 0);
}

#[tokio::test]
async fn test_initialize_session_failure_keeps_connection_entry() {
    // Arrange
    let factory = RecordingFactory::with_failures(Failures {
        session_create: true,
        ..Failures::default()
    });
    let strategy = SingleChannelStrategy::new();
    let registry = Arc::new(ResourceRegistry::new());
    strategy.bind(registry.clone()).unwrap();

    // Act
    let result = strategy
        .initialize(factory as Arc<dyn ConnectionFactory>)
        .await;

    // Assert - the failing stage is the session, the connection stays
    assert!(matches!(result, Err(BrokerError::SessionCreation { .. })));
    assert_eq!(registry.counts().connections, 1);
    assert_eq!(registry.counts().sessions, 0);
}

#[tokio::test]
async fn test_initialize_start_failure_is_its_own_stage() {
    let factory = RecordingFactory::with_failures(Failures {
        connection_start: true,
        ..Failures::default()
    });
    let strategy = SingleChannelStrategy::new();
    let registry = Arc::new(ResourceRegistry::new());
    strategy.bind(registry.clone()).unwrap();

    let result = strategy
        .initialize(factory as Arc<dyn ConnectionFactory>)
        .await;

    assert!(matches!(result, Err(BrokerError::ConnectionStart { .. })));
    assert_eq!(registry.counts().connections, 1);
    assert_eq!(registry.counts().sessions, 1);
}

// ============================================================================
// Accessors
// ============================================================================

#[tokio::test]
async fn test_connection_before_initialize_is_an_error() {
    let strategy = SingleChannelStrategy::new();
    strategy.bind(Arc::new(ResourceRegistry::new())).unwrap();

    assert!(matches!(
        strategy.connection(),
        Err(BrokerError::NotInitialized)
    ));
    assert!(matches!(
        strategy.session(),
        Err(BrokerError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_credentialed_connection_is_always_unsupported() {
    // Arrange
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;

    // Act & Assert - any inputs, empty strings included
    for (username, password) in [("alice", "secret"), ("", ""), ("user", "")] {
        let result = strategy.connection_as(username, password).await;
        assert!(
            matches!(result, Err(BrokerError::UnsupportedOperation { .. })),
            "expected UnsupportedOperation for ({:?}, {:?})",
            username,
            password
        );
    }
}

#[tokio::test]
async fn test_destination_cache_returns_identical_handle() {
    // Arrange
    let factory = RecordingFactory::new();
    let (strategy, registry) = initialized_strategy(&factory).await;

    // Act
    let first = strategy.destination("orders").await.unwrap();
    let second = strategy.destination("orders").await.unwrap();
    let quotes = strategy.destination("quotes").await.unwrap();

    // Assert - same handle for the same name, distinct otherwise
    assert_eq!(first, second);
    assert_ne!(first, quotes);
    assert_eq!(registry.counts().destinations, 2);

    // The transport saw exactly one create per name.
    let creates: Vec<String> = factory
        .events()
        .into_iter()
        .filter(|event| event.starts_with("destination:create"))
        .collect();
    assert_eq!(
        creates,
        vec!["destination:create:orders", "destination:create:quotes"]
    );
}

#[tokio::test]
async fn test_producer_is_fresh_and_carries_default_ttl() {
    // Arrange
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;
    let orders = strategy.destination("orders").await.unwrap();

    // Act
    let first = strategy.producer(&orders).await.unwrap();
    let second = strategy.producer(&orders).await.unwrap();

    // Assert - never cached, and the default TTL is applied on creation
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.time_to_live(), Some(Duration::milliseconds(60_000)));
    assert_eq!(second.time_to_live(), Some(Duration::milliseconds(60_000)));
}

#[tokio::test]
async fn test_consumer_is_fresh_every_time() {
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;
    let orders = strategy.destination("orders").await.unwrap();

    let first = strategy.consumer(&orders).await.unwrap();
    let second = strategy.consumer(&orders).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_message_construction_per_kind() {
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;

    assert_eq!(strategy.bytes_message().unwrap().kind(), MessageKind::Bytes);
    assert_eq!(strategy.text_message().unwrap().kind(), MessageKind::Text);
    assert_eq!(strategy.map_message().unwrap().kind(), MessageKind::Map);
    assert_eq!(
        strategy.object_message().unwrap().kind(),
        MessageKind::Object
    );
    assert_eq!(
        strategy.stream_message().unwrap().kind(),
        MessageKind::Stream
    );
}

// ============================================================================
// Listening consumers
// ============================================================================

#[tokio::test]
async fn test_listening_consumer_dispatches_without_blocking_delivery() {
    // Arrange
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;
    let orders = strategy.destination("orders").await.unwrap();

    let handled = Arc::new(Mutex::new(Vec::new()));
    let handler: Arc<dyn MessageHandler> = {
        let handled = handled.clone();
        Arc::new(move |message: Message| {
            // Simulated slow handler; must not stall the delivery callback.
            std::thread::sleep(std::time::Duration::from_millis(100));
            handled.lock().unwrap().push(message.message_id.to_string());
        })
    };

    let _consumer = strategy
        .listening_consumer(&orders, handler)
        .await
        .unwrap();
    let recording = factory.last_consumer();

    // Act - deliver from the "transport" and measure the callback latency
    let started = std::time::Instant::now();
    for _ in 0..3 {
        recording.deliver(Message::empty(MessageKind::Text));
    }
    let callback_latency = started.elapsed();

    // Assert - delivery returned immediately; handlers finish later
    assert!(
        callback_latency < std::time::Duration::from_millis(50),
        "delivery callback blocked for {:?}",
        callback_latency
    );
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if handled.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all handlers should complete");
}

// ============================================================================
// Close sequence
// ============================================================================

#[tokio::test]
async fn test_close_order_is_producers_consumers_session_connection() {
    // Arrange - 2 producers and 1 consumer, registered the way the facade
    // does its bookkeeping
    let factory = RecordingFactory::new();
    let (strategy, registry) = initialized_strategy(&factory).await;
    let orders = strategy.destination("orders").await.unwrap();
    let quotes = strategy.destination("quotes").await.unwrap();

    registry.add_producer("orders", strategy.producer(&orders).await.unwrap());
    registry.add_producer("quotes", strategy.producer(&quotes).await.unwrap());
    registry.add_consumer("orders", strategy.consumer(&orders).await.unwrap());

    // Act
    strategy.close().await.unwrap();

    // Assert
    let closes: Vec<String> = factory
        .events()
        .into_iter()
        .filter(|event| event.contains(":close"))
        .collect();
    assert_eq!(
        closes,
        vec![
            "producer:close:orders",
            "producer:close:quotes",
            "consumer:close:orders",
            "session:close",
            "connection:close",
        ]
    );
}

#[tokio::test]
async fn test_close_aborts_on_first_failure() {
    // Arrange - producer closes fail
    let factory = RecordingFactory::with_failures(Failures {
        producer_close: true,
        ..Failures::default()
    });
    let (strategy, registry) = initialized_strategy(&factory).await;
    let orders = strategy.destination("orders").await.unwrap();
    registry.add_producer("orders", strategy.producer(&orders).await.unwrap());
    registry.add_consumer("orders", strategy.consumer(&orders).await.unwrap());

    // Act
    let result = strategy.close().await;

    // Assert - fail-fast: nothing after the failing producer was closed
    match result {
        Err(BrokerError::ProducerClose { name, .. }) => assert_eq!(name, "orders"),
        other => panic!("Expected ProducerClose error, got: {:?}", other),
    }
    let closes: Vec<String> = factory
        .events()
        .into_iter()
        .filter(|event| event.contains(":close"))
        .collect();
    assert!(closes.is_empty(), "unexpected closes: {:?}", closes);
}

#[tokio::test]
async fn test_close_twice_is_a_no_op() {
    let factory = RecordingFactory::new();
    let (strategy, _registry) = initialized_strategy(&factory).await;

    strategy.close().await.unwrap();
    strategy.close().await.unwrap();

    // The transport saw exactly one close pass.
    let closes = factory
        .events()
        .into_iter()
        .filter(|event| event.contains(":close"))
        .count();
    assert_eq!(closes, 2); // session + connection
}
