//! JSON encoding - standard JSON serialization.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use super::{ContentType, Encoder, EncodingError};
use crate::Message;

/// JSON encoding - serializes to UTF-8 JSON bytes. No schema checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    #[inline]
    pub fn to_bytes<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Bytes, EncodingError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Bytes::from(bytes))
    }
}

#[async_trait]
impl Encoder for Json {
    fn content_type(&self) -> ContentType {
        ContentType::Json
    }

    async fn encode(&self, message: &Message) -> Result<Bytes, EncodingError> {
        self.to_bytes(&message.payload)
    }
}
