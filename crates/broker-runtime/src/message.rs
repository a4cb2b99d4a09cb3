//! Typed broker messages.
//!
//! A [`Message`] pairs one body representation ([`MessageBody`]) with string
//! attributes and delivery metadata. Empty messages of each representation
//! are constructed through the session (see the transport seam); the body
//! enum is what travels between producers and consumers.

use bytes::Bytes;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier assigned to every constructed message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Body representations
// ============================================================================

/// The message representations a session can construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Bytes,
    Text,
    Map,
    Object,
    Stream,
    Blob,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::Map => "map",
            Self::Object => "object",
            Self::Stream => "stream",
            Self::Blob => "blob",
        };
        write!(f, "{}", name)
    }
}

/// A single value inside a map or stream body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "bytes_serde")] Bytes),
}

/// Message payload in one of the supported representations.
///
/// `Object` bodies hold an arbitrary serde-serialized value; `Blob` bodies
/// are filled by streaming from a caller-supplied input source at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    Bytes(#[serde(with = "bytes_serde")] Bytes),
    Text(String),
    Map(HashMap<String, FieldValue>),
    Object(Option<serde_json::Value>),
    Stream(Vec<FieldValue>),
    Blob(#[serde(with = "bytes_serde")] Bytes),
}

impl MessageBody {
    /// Construct the empty body for a representation.
    ///
    /// Blob bodies start empty too; the session fills them from the input
    /// source during creation.
    pub fn empty(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Bytes => Self::Bytes(Bytes::new()),
            MessageKind::Text => Self::Text(String::new()),
            MessageKind::Map => Self::Map(HashMap::new()),
            MessageKind::Object => Self::Object(None),
            MessageKind::Stream => Self::Stream(Vec::new()),
            MessageKind::Blob => Self::Blob(Bytes::new()),
        }
    }

    /// Get the representation of this body
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Bytes(_) => MessageKind::Bytes,
            Self::Text(_) => MessageKind::Text,
            Self::Map(_) => MessageKind::Map,
            Self::Object(_) => MessageKind::Object,
            Self::Stream(_) => MessageKind::Stream,
            Self::Blob(_) => MessageKind::Blob,
        }
    }
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

/// Millisecond representation for optional durations
mod ttl_serde {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ttl.map(|d| d.num_milliseconds()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<i64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::milliseconds))
    }
}

// ============================================================================
// Message
// ============================================================================

/// A message flowing through the broker client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub body: MessageBody,
    pub attributes: HashMap<String, String>,
    pub correlation_id: Option<String>,
    #[serde(with = "ttl_serde")]
    pub time_to_live: Option<Duration>,
}

impl Message {
    /// Construct an empty message of the given representation
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            message_id: MessageId::new(),
            body: MessageBody::empty(kind),
            attributes: HashMap::new(),
            correlation_id: None,
            time_to_live: None,
        }
    }

    /// Get the representation of this message's body
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Replace the body (builder style)
    pub fn with_body(mut self, body: MessageBody) -> Self {
        self.body = body;
        self
    }

    /// Set a text body (builder style)
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = MessageBody::Text(text.into());
        self
    }

    /// Add a message attribute (builder style)
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a correlation ID for tracking (builder style)
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add a time-to-live for message expiration (builder style)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Serialize `value` into an object body.
    ///
    /// Fails only when `value` cannot be represented as a serde value
    /// (e.g. a map with non-string keys).
    pub fn set_object<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        self.body = MessageBody::Object(Some(serde_json::to_value(value)?));
        Ok(())
    }

    /// Deserialize an object body into `T`; `None` for other representations
    /// or an empty object body.
    pub fn object<T: for<'de> Deserialize<'de>>(&self) -> Option<Result<T, serde_json::Error>> {
        match &self.body {
            MessageBody::Object(Some(value)) => Some(serde_json::from_value(value.clone())),
            _ => None,
        }
    }

    /// Get the text of a text body; `None` for other representations
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }
}
