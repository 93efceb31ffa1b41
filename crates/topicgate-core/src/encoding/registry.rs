use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{ArcDynEncoder, ContentType, EncodingError};
use crate::Message;

/// Lookup table from [`ContentType`] to the encoder that serves it.
///
/// Built at startup; registration stays possible afterwards and is guarded
/// by a lock so it can race with in-flight sends. The lock is only held for
/// the lookup, never across an `encode` call.
#[derive(Default)]
pub struct MarshalRegistry {
    encoders: RwLock<HashMap<ContentType, ArcDynEncoder>>,
}

impl MarshalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from encoders keyed by their own content type.
    pub fn with_encoders(
        encoders: impl IntoIterator<Item = ArcDynEncoder>,
    ) -> Self {
        let registry = Self::new();
        for encoder in encoders {
            registry.register(encoder.content_type(), encoder);
        }
        registry
    }

    /// Register `encoder` for `content_type`; the last registration wins.
    pub fn register(
        &self,
        content_type: ContentType,
        encoder: ArcDynEncoder,
    ) -> Option<ArcDynEncoder> {
        let previous = self.encoders.write().insert(content_type, encoder);
        if previous.is_some() {
            info!(content_type = %content_type, "encoder replaced");
        } else {
            debug!(content_type = %content_type, "encoder registered");
        }
        previous
    }

    pub fn content_types(&self) -> Vec<ContentType> {
        self.encoders.read().keys().copied().collect()
    }

    /// Encode `message` with the encoder registered for `content_type`.
    ///
    /// Encoder errors are returned as-is.
    pub async fn marshal(
        &self,
        message: &Message,
        content_type: ContentType,
    ) -> Result<Bytes, EncodingError> {
        let encoder = self
            .encoders
            .read()
            .get(&content_type)
            .cloned()
            .ok_or_else(|| {
                EncodingError::UnsupportedContentType(
                    content_type.mime().to_string(),
                )
            })?;

        encoder.encode(message).await
    }
}

impl std::fmt::Debug for MarshalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarshalRegistry")
            .field("content_types", &self.content_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{Encoder, Json};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        tag: &'static [u8],
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(tag: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                tag,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Encoder for Fixed {
        fn content_type(&self) -> ContentType {
            ContentType::Avro
        }

        async fn encode(&self, _: &Message) -> Result<Bytes, EncodingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(self.tag))
        }
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = MarshalRegistry::new();
        let first = Fixed::new(b"first");
        let second = Fixed::new(b"second");

        assert!(registry.register(ContentType::Avro, first.clone()).is_none());
        assert!(
            registry.register(ContentType::Avro, second.clone()).is_some()
        );

        let msg = Message::new("t", json!({}));
        let out = registry.marshal(&msg, ContentType::Avro).await.unwrap();

        assert_eq!(&out[..], b"second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_content_type_fails_without_encoding() {
        let json_only = MarshalRegistry::with_encoders([
            Arc::new(Json) as ArcDynEncoder
        ]);

        let msg = Message::new("t", json!({"id": 1})).with_subject("s");
        let err = json_only
            .marshal(&msg, ContentType::Avro)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EncodingError::UnsupportedContentType(ref tag) if tag == "application/*+avro"
        ));
        assert_eq!(json_only.content_types(), vec![ContentType::Json]);
    }

    #[tokio::test]
    async fn dispatches_by_content_type() {
        let avro = Fixed::new(b"avro");
        let registry = MarshalRegistry::with_encoders([
            Arc::new(Json) as ArcDynEncoder,
            avro.clone() as ArcDynEncoder,
        ]);
        let msg = Message::new("t", json!({"id": 1}));

        let json_bytes =
            registry.marshal(&msg, ContentType::Json).await.unwrap();
        let avro_bytes =
            registry.marshal(&msg, ContentType::Avro).await.unwrap();

        assert_eq!(&json_bytes[..], br#"{"id":1}"#);
        assert_eq!(&avro_bytes[..], b"avro");
        assert_eq!(avro.calls.load(Ordering::SeqCst), 1);
    }
}
