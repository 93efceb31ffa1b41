//! Registry client against a local stand-in for the Confluent REST API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use schema_registry::{
    CachedResolver, ConfluentClient, ResolveError, SchemaResolver,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const ORDER_SCHEMA: &str = r#"{"type":"record","name":"Order","fields":[{"name":"id","type":"int"}]}"#;

#[derive(Clone, Default)]
struct Registry {
    hits: Arc<AtomicUsize>,
}

async fn latest(
    State(reg): State<Registry>,
    Path(subject): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    reg.hits.fetch_add(1, Ordering::SeqCst);
    match subject.as_str() {
        "orders-value" | "orders value" => Ok(Json(json!({
            "subject": subject,
            "version": 3,
            "id": 7,
            "schema": ORDER_SCHEMA,
        }))),
        "protobuf-subject" => Ok(Json(json!({
            "subject": subject,
            "version": 1,
            "id": 9,
            "schemaType": "PROTOBUF",
            "schema": "syntax = \"proto3\";",
        }))),
        "broken" => Ok(Json(json!({
            "subject": subject,
            "version": 1,
            "id": 11,
            "schema": "{not avro",
        }))),
        "flaky" => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error_code": 50001, "message": "store error"})),
        )),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error_code": 40401, "message": "Subject not found"})),
        )),
    }
}

async fn start_registry() -> (String, Registry) {
    let reg = Registry::default();
    let app = Router::new()
        .route("/subjects/{subject}/versions/latest", get(latest))
        .with_state(reg.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (format!("http://{addr}"), reg)
}

/// An address nothing listens on.
async fn dead_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn client(hosts: Vec<String>) -> ConfluentClient {
    ConfluentClient::new(&hosts, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn resolves_latest_schema() {
    let (url, _) = start_registry().await;
    let entry = client(vec![url]).resolve("orders-value").await.unwrap();

    assert_eq!(entry.id, 7);
    let native = entry.codec.native_from_text(br#"{"id": 1}"#).unwrap();
    assert_eq!(entry.codec.binary_from_native(native).unwrap(), vec![0x02]);
}

#[tokio::test]
async fn subject_is_percent_encoded() {
    let (url, _) = start_registry().await;
    let entry = client(vec![url]).resolve("orders value").await.unwrap();
    assert_eq!(entry.id, 7);
}

#[tokio::test]
async fn unknown_subject_is_reported() {
    let (url, _) = start_registry().await;
    let err = client(vec![url]).resolve("nope").await.unwrap_err();
    assert!(matches!(err, ResolveError::UnknownSubject(ref s) if s == "nope"));
}

#[tokio::test]
async fn server_error_is_unavailable_and_not_retried() {
    let (url, reg) = start_registry().await;
    let err = client(vec![url.clone(), url]).resolve("flaky").await.unwrap_err();

    assert!(matches!(err, ResolveError::Unavailable { .. }));
    assert_eq!(reg.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_avro_and_unparseable_schemas_are_invalid() {
    let (url, _) = start_registry().await;
    let c = client(vec![url]);

    let err = c.resolve("protobuf-subject").await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidSchema { .. }));

    let err = c.resolve("broken").await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidSchema { .. }));
}

#[tokio::test]
async fn unreachable_host_fails_over_to_next() {
    let dead = dead_host().await;
    let (url, reg) = start_registry().await;

    let entry = client(vec![dead, url]).resolve("orders-value").await.unwrap();

    assert_eq!(entry.id, 7);
    assert_eq!(reg.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn all_hosts_unreachable_is_unavailable() {
    let dead = dead_host().await;
    let err = client(vec![dead]).resolve("orders-value").await.unwrap_err();
    assert!(matches!(err, ResolveError::Unavailable { .. }));
}

#[tokio::test]
async fn cached_client_hits_registry_once() {
    let (url, reg) = start_registry().await;
    let cached = Arc::new(CachedResolver::new(client(vec![url])));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cached = cached.clone();
            tokio::spawn(async move { cached.resolve("orders-value").await })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap().id, 7);
    }

    assert_eq!(reg.hits.load(Ordering::SeqCst), 1);
}
