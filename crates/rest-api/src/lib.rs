use std::sync::Arc;

use axum::Router;
use publisher::Publisher;

mod errors;
mod health;
mod publish;

pub use errors::{ApiError, ErrorBody};
pub use publish::{AvroRequest, JsonRequest};

/// Shared handler state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
}

/// Health probes plus the publish routes.
pub fn router(state: AppState) -> Router {
    health::router(state.clone()).merge(publish::router(state))
}
