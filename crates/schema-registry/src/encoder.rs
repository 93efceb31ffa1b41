use async_trait::async_trait;
use bytes::Bytes;
use topicgate_core::encoding::wire;
use topicgate_core::{ContentType, Encoder, EncodingError, Message};
use tracing::error;

use crate::ArcDynSchemaResolver;

/// Avro binary with Confluent framing (`0x00`, schema id, datum).
///
/// Requires `message.subject`; a message without one fails before the
/// resolver is consulted.
pub struct AvroEncoder {
    resolver: ArcDynSchemaResolver,
}

impl AvroEncoder {
    pub fn new(resolver: ArcDynSchemaResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Encoder for AvroEncoder {
    fn content_type(&self) -> ContentType {
        ContentType::Avro
    }

    async fn encode(&self, message: &Message) -> Result<Bytes, EncodingError> {
        let subject = message
            .subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(EncodingError::MissingSubject)?;

        let entry = self.resolver.resolve(subject).await.map_err(|e| {
            EncodingError::SchemaResolution {
                subject: subject.to_string(),
                details: e.to_string().into(),
            }
        })?;

        let text = serde_json::to_vec(&message.payload)?;
        let native = entry.codec.native_from_text(&text)?;
        let binary = entry.codec.binary_from_native(native).map_err(|e| {
            error!(%subject, schema_id = entry.id, error = %e, "avro encoding failed after validation");
            e
        })?;

        Ok(wire::frame(entry.id, &binary))
    }
}
