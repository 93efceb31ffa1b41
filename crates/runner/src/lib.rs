//! Wiring between configuration and the running server.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use publisher::{KafkaTransport, Publisher};
use rest_api::{AppState, router};
use schema_registry::{AvroEncoder, CachedResolver, ConfluentClient};
use topicgate_config::{Config, SchemaRegistryCfg};
use topicgate_core::{ArcDynEncoder, Json, MarshalRegistry};
use tracing::{info, instrument};

/// Encoders for every supported content type.
#[instrument(skip_all)]
pub fn build_registry(cfg: &SchemaRegistryCfg) -> Result<MarshalRegistry> {
    let client = ConfluentClient::new(&cfg.hosts, cfg.request_timeout())
        .context("building schema registry client")?;
    info!(hosts = ?client.hosts().iter().map(|h| h.as_str()).collect::<Vec<_>>(), "schema registry configured");

    let avro = AvroEncoder::new(Arc::new(CachedResolver::new(client)));
    let encoders: [ArcDynEncoder; 2] = [Arc::new(Json), Arc::new(avro)];
    Ok(MarshalRegistry::with_encoders(encoders))
}

/// Connect to Kafka and assemble the publisher. Connection failure is
/// returned to the caller, which treats it as fatal.
#[instrument(skip_all)]
pub async fn build_publisher(cfg: &Config) -> Result<Arc<Publisher>> {
    let registry = Arc::new(build_registry(&cfg.schema_registry)?);
    let transport = KafkaTransport::connect(&cfg.kafka)
        .await
        .context("connecting to kafka")?;
    Ok(Arc::new(Publisher::new(registry, Arc::new(transport))))
}

/// Publish and health routes plus `/metrics`.
pub fn app(publisher: Arc<Publisher>) -> Router {
    router(AppState { publisher }).merge(o11y::prom::router_with_metrics())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
