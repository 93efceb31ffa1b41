use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use topicgate_core::{ContentType, Message};
use tracing::debug;

use crate::{AppState, errors::ApiError};

/// Body of `POST /json`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRequest {
    /// Partition key.
    #[serde(default)]
    pub id: Option<String>,
    pub topic: String,
    pub payload: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Body of `POST /avro`: a [`JsonRequest`] plus the schema subject.
#[derive(Debug, Clone, Deserialize)]
pub struct AvroRequest {
    #[serde(flatten)]
    pub base: JsonRequest,
    #[serde(rename = "avroSource")]
    pub avro_source: String,
}

/// Body of `POST /publish/{content_type}`; `avroSource` is only needed
/// for schema-backed content types.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    #[serde(flatten)]
    pub base: JsonRequest,
    #[serde(rename = "avroSource", default)]
    pub avro_source: Option<String>,
}

impl From<JsonRequest> for Message {
    fn from(req: JsonRequest) -> Self {
        Message {
            topic: req.topic,
            id: req.id,
            payload: req.payload,
            headers: req.headers,
            subject: None,
        }
    }
}

impl From<AvroRequest> for Message {
    fn from(req: AvroRequest) -> Self {
        Message {
            subject: Some(req.avro_source),
            ..Message::from(req.base)
        }
    }
}

impl From<PublishRequest> for Message {
    fn from(req: PublishRequest) -> Self {
        Message {
            subject: req.avro_source,
            ..Message::from(req.base)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/json", post(post_json))
        .route("/avro", post(post_avro))
        .route("/publish/{content_type}", post(post_tagged))
        .with_state(state)
}

async fn post_json(
    State(st): State<AppState>,
    body: Result<Json<JsonRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    publish(&st, ContentType::Json, req.into()).await
}

async fn post_avro(
    State(st): State<AppState>,
    body: Result<Json<AvroRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    publish(&st, ContentType::Avro, req.into()).await
}

async fn post_tagged(
    State(st): State<AppState>,
    Path(tag): Path<String>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let content_type = tag
        .parse::<ContentType>()
        .map_err(|_| ApiError::UnsupportedMediaType(tag))?;
    let Json(req) = body?;
    publish(&st, content_type, req.into()).await
}

async fn publish(
    st: &AppState,
    content_type: ContentType,
    message: Message,
) -> Result<StatusCode, ApiError> {
    st.publisher.send(content_type, &message).await?;
    debug!(topic = %message.topic, content_type = content_type.name(), "request published");
    Ok(StatusCode::NO_CONTENT)
}
