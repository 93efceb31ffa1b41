//! Payload encodings for the broker wire.
//!
//! An [`Encoder`] turns a [`Message`] into the exact bytes consumers expect
//! for one [`ContentType`]. The [`MarshalRegistry`] picks the encoder for a
//! request at send time.
//!
//! # Available Encodings
//!
//! - [`Json`]: canonical JSON text of the payload
//! - Avro with Confluent Schema Registry framing lives in the
//!   `schema-registry` crate and is registered at startup.

mod json;
mod registry;
pub mod wire;

pub use json::Json;
pub use registry::MarshalRegistry;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Message;

/// Encoding error.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("schema subject is required for avro messages")]
    MissingSubject,

    #[error("could not resolve schema for subject {subject}: {details}")]
    SchemaResolution {
        subject: String,
        details: Cow<'static, str>,
    },

    #[error("payload does not match schema: {details}")]
    SchemaViolation { details: Cow<'static, str> },

    #[error("codec failure: {details}")]
    Codec { details: Cow<'static, str> },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported message content-type, value was: {0}")]
    UnsupportedContentType(String),
}

impl EncodingError {
    pub fn kind(&self) -> &'static str {
        match self {
            EncodingError::MissingSubject => "missing_subject",
            EncodingError::SchemaResolution { .. } => "schema_resolution",
            EncodingError::SchemaViolation { .. } => "schema_violation",
            EncodingError::Codec { .. } => "encoding",
            EncodingError::Json(_) => "encoding",
            EncodingError::UnsupportedContentType(_) => {
                "unsupported_content_type"
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EncodingError::MissingSubject
                | EncodingError::SchemaViolation { .. }
        )
    }
}

/// Serialization strategy requested for a message.
///
/// The MIME string doubles as the value of the reserved `content-type`
/// broker header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    Avro,
}

impl ContentType {
    /// Short identifier for logging/metrics.
    pub const fn name(&self) -> &'static str {
        match self {
            ContentType::Json => "json",
            ContentType::Avro => "avro",
        }
    }

    /// MIME content type for this encoding.
    pub const fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Avro => "application/*+avro",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for ContentType {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "application/json" => Ok(ContentType::Json),
            "avro" | "avro-binary" | "application/*+avro"
            | "application/avro" => Ok(ContentType::Avro),
            _ => Err(EncodingError::UnsupportedContentType(s.to_string())),
        }
    }
}

/// A serializer bound to exactly one [`ContentType`].
#[async_trait]
pub trait Encoder: Send + Sync {
    fn content_type(&self) -> ContentType;

    async fn encode(&self, message: &Message) -> Result<Bytes, EncodingError>;
}

pub type ArcDynEncoder = Arc<dyn Encoder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_tags_and_mime_strings() {
        assert_eq!("json".parse::<ContentType>().unwrap(), ContentType::Json);
        assert_eq!(
            "application/json".parse::<ContentType>().unwrap(),
            ContentType::Json
        );
        assert_eq!(
            "avro-binary".parse::<ContentType>().unwrap(),
            ContentType::Avro
        );
        assert_eq!(
            "application/*+avro".parse::<ContentType>().unwrap(),
            ContentType::Avro
        );
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = "application/xml".parse::<ContentType>().unwrap_err();
        assert!(matches!(
            err,
            EncodingError::UnsupportedContentType(ref tag) if tag == "application/xml"
        ));
    }

    #[test]
    fn display_is_the_header_value() {
        assert_eq!(ContentType::Avro.to_string(), "application/*+avro");
        assert_eq!(ContentType::Json.to_string(), "application/json");
    }
}
