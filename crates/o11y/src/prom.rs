//! Prometheus recorder and the `/metrics` route.

use std::net::SocketAddr;

use axum::{Router, routing::get};
use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::InitError;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Serve `/metrics` on a dedicated listener. When `None` the caller
    /// mounts [`router_with_metrics`] on its own server.
    pub http_listener: Option<SocketAddr>,
}

pub fn init(cfg: &Config) -> Result<(), InitError> {
    HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| InitError::Recorder(e.to_string()))
    })?;
    describe_metrics();

    if let Some(addr) = cfg.http_listener {
        tokio::spawn(async move {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!(%addr, "serving metrics");
                    if let Err(e) = axum::serve(listener, router_with_metrics()).await {
                        error!(error = %e, "metrics listener stopped");
                    }
                }
                Err(e) => error!(error = %e, %addr, "metrics listener bind failed"),
            }
        });
    }

    Ok(())
}

/// Current metrics snapshot in the Prometheus text format.
pub async fn metrics_handler() -> String {
    HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# recorder not installed\n".into())
}

pub fn router_with_metrics() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub fn describe_metrics() {
    describe_counter!(
        "topicgate_messages_sent_total",
        Unit::Count,
        "Messages acknowledged by the broker"
    );
    describe_counter!(
        "topicgate_send_failures_total",
        Unit::Count,
        "Failed sends by content type and failure kind"
    );
    describe_histogram!(
        "topicgate_send_latency_seconds",
        Unit::Seconds,
        "Time from send call to broker acknowledgement"
    );
    describe_counter!(
        "topicgate_schema_cache_misses_total",
        Unit::Count,
        "Schema lookups that went to the registry"
    );
    describe_counter!(
        "topicgate_panics_total",
        Unit::Count,
        "Panics captured by the process hook"
    );
    describe_gauge!(
        "topicgate_producer_queue_messages",
        Unit::Count,
        "Messages waiting in the producer queue"
    );
    describe_gauge!(
        "topicgate_producer_tx_messages",
        Unit::Count,
        "Messages transmitted to brokers since start"
    );
    describe_gauge!(
        "topicgate_producer_tx_bytes",
        Unit::Bytes,
        "Message bytes transmitted to brokers since start"
    );
    describe_gauge!(
        "topicgate_producer_brokers_up",
        Unit::Count,
        "Brokers the producer currently holds a connection to"
    );
}
