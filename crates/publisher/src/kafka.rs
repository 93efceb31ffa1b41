use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use topicgate_config::KafkaCfg;
use topicgate_core::{BrokerMessage, ConnectionState, Transport, TransportError};
use tracing::{debug, info, instrument};

use crate::context::{ProducerContext, StateCell};
use crate::tls::{self, TlsOutcome};

/// Shared Kafka producer.
///
/// One librdkafka producer is created at bootstrap and reused by every
/// send. librdkafka handles batching, retries within `message.timeout.ms`
/// and reconnects internally.
pub struct KafkaTransport {
    producer: FutureProducer<ProducerContext>,
    state: Arc<StateCell>,
    send_timeout: Duration,
}

impl KafkaTransport {
    /// Create the producer and verify the cluster is reachable.
    ///
    /// Fails when the TLS policy forbids the configured material or when no
    /// broker answers a metadata request within `connect_timeout_ms`.
    #[instrument(skip_all)]
    pub async fn connect(cfg: &KafkaCfg) -> anyhow::Result<Self> {
        let state = Arc::new(StateCell::default());
        state.set(ConnectionState::Connecting);

        let tls = tls::configure(cfg.tls.as_ref())
            .context("configuring broker tls")?;
        let client_cfg = client_config(cfg, &tls);

        let producer: FutureProducer<ProducerContext> = client_cfg
            .create_with_context(ProducerContext::new(state.clone()))
            .with_context(|| "creating kafka producer")?;

        let probe = producer.clone();
        let timeout = cfg.connect_timeout();
        let brokers = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|md| md.brokers().len())
        })
        .await
        .context("metadata probe task")?;

        let brokers = match brokers {
            Ok(n) => n,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                bail!(
                    "kafka brokers {} unreachable within {timeout:?}: {e}",
                    cfg.bootstrap_servers()
                );
            }
        };

        state.set(ConnectionState::Connected);
        info!(
            brokers = %cfg.bootstrap_servers(),
            cluster_brokers = brokers,
            tls = tls.is_enabled(),
            "kafka producer connected"
        );

        Ok(Self {
            producer,
            state,
            send_timeout: cfg.send_timeout(),
        })
    }
}

/// librdkafka settings for `cfg`; user `client_conf` entries are applied
/// last and win.
pub fn client_config(cfg: &KafkaCfg, tls: &TlsOutcome) -> ClientConfig {
    let mut cc = ClientConfig::new();
    cc.set("bootstrap.servers", cfg.bootstrap_servers())
        .set("client.id", &cfg.client_id)
        .set("message.timeout.ms", cfg.send_timeout_ms.to_string())
        .set("socket.keepalive.enable", "true")
        .set("linger.ms", "5")
        .set("retry.backoff.ms", "100")
        .set("enable.idempotence", "true")
        .set("acks", "all")
        .set(
            "allow.auto.create.topics",
            if cfg.allow_create_new { "true" } else { "false" },
        )
        .set(
            "statistics.interval.ms",
            cfg.statistics_interval_ms.to_string(),
        );

    if let TlsOutcome::Enabled(material) = tls {
        cc.set("security.protocol", "ssl")
            .set("ssl.ca.pem", &material.ca_pem)
            .set("ssl.certificate.pem", &material.certificate_pem)
            .set("ssl.key.pem", &material.key_pem);
    }

    for (k, v) in &cfg.client_conf {
        cc.set(k, v);
    }

    cc
}

fn delivery_error(err: KafkaError, send_timeout: Duration) -> TransportError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => {
            TransportError::Timeout(send_timeout)
        }
        _ => TransportError::Delivery {
            details: err.to_string().into(),
        },
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn deliver(&self, message: BrokerMessage) -> Result<(), TransportError> {
        if self.state.get() == ConnectionState::Disconnected {
            return Err(TransportError::Delivery {
                details: "producer is closed".into(),
            });
        }

        let mut headers = OwnedHeaders::new_with_capacity(message.headers.len());
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_ref()),
            });
        }

        let mut record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(&message.topic)
                .payload(message.value.as_ref())
                .headers(headers)
                .timestamp(message.timestamp.timestamp_millis());
        if let Some(key) = &message.key {
            record = record.key(key.as_ref());
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _msg)| delivery_error(e, self.send_timeout))?;

        debug!(topic = %message.topic, partition, offset, "message delivered");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.set(ConnectionState::Disconnected);

        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| TransportError::Close {
                details: e.to_string().into(),
            })?
            .map_err(|e| TransportError::Close {
                details: format!("flushing producer: {e}").into(),
            })?;

        info!("kafka producer flushed and closed");
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}
