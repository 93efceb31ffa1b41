use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use topicgate_core::PublishError;

/// Error body returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Body could not be decoded into a request.
    BadRequest(String),
    /// Content type named in the path has no encoder.
    UnsupportedMediaType(String),
    Publish(PublishError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        ApiError::Publish(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Publish(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(details) => details,
            ApiError::UnsupportedMediaType(tag) => {
                format!("unsupported content type: {tag}")
            }
            ApiError::Publish(e) => e.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                status: status.as_u16(),
                error,
            }),
        )
            .into_response()
    }
}
