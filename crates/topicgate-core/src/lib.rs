//! topicgate core types
//!
//! Defines the message that callers hand to the publisher, the broker-level
//! message the publisher hands to a transport, the error taxonomy, and the
//! encoder/transport contracts that the other crates implement.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod encoding;
pub mod errors;

pub use encoding::{
    ArcDynEncoder, ContentType, Encoder, EncodingError, Json, MarshalRegistry,
};
pub use errors::{PublishError, TransportError};

/// Reserved broker header carrying the resolved content type.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

// ============================================================================
// Message
// ============================================================================

/// Unit of publication.
///
/// One flat type serves every content type; `subject` is only consulted by
/// schema-governed encoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Destination topic; must be non-empty.
    pub topic: String,

    /// Partition key. Empty or absent means broker-default partitioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Arbitrary structured payload.
    pub payload: Value,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Schema registry subject used to look up the schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            id: None,
            payload,
            headers: HashMap::new(),
            subject: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Partition key, if the identifier is present and non-empty.
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Checks that hold for every content type.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.topic.trim().is_empty() {
            return Err(PublishError::validation("topic must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Broker Message
// ============================================================================

/// Wire-level unit handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: Option<Bytes>,
    /// Ordered; always contains exactly one [`CONTENT_TYPE_HEADER`] entry.
    pub headers: Vec<(String, Bytes)>,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl BrokerMessage {
    /// Assemble the broker message for `message` encoded as `value`.
    ///
    /// Caller headers are emitted sorted by key, followed by the reserved
    /// content-type header. A caller header with the reserved key (compared
    /// case-insensitively) is dropped in favour of the resolved value.
    pub fn assemble(
        message: &Message,
        content_type: ContentType,
        value: Bytes,
    ) -> Self {
        let mut headers: Vec<(String, Bytes)> = message
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(CONTENT_TYPE_HEADER))
            .map(|(k, v)| (k.clone(), Bytes::copy_from_slice(v.as_bytes())))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        headers.push((
            CONTENT_TYPE_HEADER.to_string(),
            Bytes::from_static(content_type.mime().as_bytes()),
        ));

        Self {
            topic: message.topic.clone(),
            key: message
                .key()
                .map(|k| Bytes::copy_from_slice(k.as_bytes())),
            headers,
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Lifecycle of the shared broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical delivery of broker messages.
///
/// Implementations must be safe to call concurrently from many tasks;
/// `deliver` resolves only once the broker acknowledged or rejected the
/// message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: BrokerMessage)
    -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    fn state(&self) -> ConnectionState;
}
