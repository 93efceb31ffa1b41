//! Schema-governed encoding.
//!
//! A [`SchemaResolver`] maps a subject name to the latest registered schema
//! ([`SchemaEntry`]): its numeric id plus a compiled [`SchemaCodec`]. The
//! [`AvroEncoder`] uses the resolver to validate a payload, encode it as
//! Avro binary, and frame it in the Confluent wire format.
//!
//! - [`ConfluentClient`] talks to a Confluent-compatible registry over HTTP.
//! - [`CachedResolver`] keeps entries for the process lifetime and makes
//!   sure concurrent first lookups of a subject share one registry call.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use async_trait::async_trait;
use thiserror::Error;
use topicgate_core::EncodingError;

mod avro;
mod cache;
mod confluent;
mod encoder;

pub use avro::AvroCodec;
pub use cache::CachedResolver;
pub use confluent::{ConfluentClient, DEFAULT_REGISTRY_URL};
pub use encoder::AvroEncoder;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("subject {0} not found in schema registry")]
    UnknownSubject(String),

    #[error("schema registry unavailable: {details}")]
    Unavailable { details: Cow<'static, str> },

    #[error("invalid schema for subject {subject}: {details}")]
    InvalidSchema {
        subject: String,
        details: Cow<'static, str>,
    },
}

/// Compiled schema able to validate and encode payloads.
pub trait SchemaCodec: Send + Sync {
    /// Validate JSON text against the schema and convert it to native form.
    ///
    /// Fails with [`EncodingError::SchemaViolation`].
    fn native_from_text(&self, text: &[u8]) -> Result<AvroValue, EncodingError>;

    /// Encode a validated native value in the schema's binary form.
    ///
    /// Fails with [`EncodingError::Codec`].
    fn binary_from_native(
        &self,
        native: AvroValue,
    ) -> Result<Vec<u8>, EncodingError>;
}

/// Latest schema registered under a subject.
#[derive(Clone)]
pub struct SchemaEntry {
    pub id: u32,
    pub codec: Arc<dyn SchemaCodec>,
}

impl fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEntry").field("id", &self.id).finish()
    }
}

#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Arc<SchemaEntry>, ResolveError>;
}

pub type ArcDynSchemaResolver = Arc<dyn SchemaResolver>;
