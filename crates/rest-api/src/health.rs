use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ReadyStatus {
    status: &'static str,
    connection: &'static str,
}

async fn readyz(State(st): State<AppState>) -> (StatusCode, Json<ReadyStatus>) {
    let state = st.publisher.state();
    if st.publisher.is_connected() {
        (
            StatusCode::OK,
            Json(ReadyStatus {
                status: "ready",
                connection: state.as_str(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyStatus {
                status: "not_ready",
                connection: state.as_str(),
            }),
        )
    }
}
