//! Publishing pipeline: marshal a [`Message`] with the encoder registered
//! for its content type, assemble the broker message, and hand it to the
//! shared [`Transport`].
//!
//! A [`Publisher`] is built once at startup and shared behind an `Arc`.
//! Sends are independent; the transport is the only shared resource and
//! is safe for concurrent use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use topicgate_core::{
    BrokerMessage, ConnectionState, ContentType, MarshalRegistry, Message,
    PublishError, Transport, TransportError,
};
use tracing::{debug, error, info, instrument, warn};

mod context;
pub mod kafka;
pub mod tls;

pub use kafka::KafkaTransport;

pub struct Publisher {
    registry: Arc<MarshalRegistry>,
    transport: Arc<dyn Transport>,
    closed: AtomicBool,
}

impl Publisher {
    pub fn new(
        registry: Arc<MarshalRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            transport,
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &MarshalRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            return ConnectionState::Disconnected;
        }
        self.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Encode `message` as `content_type` and wait for the broker to
    /// acknowledge it.
    ///
    /// Nothing reaches the transport when validation or encoding fails.
    /// Transport failures are not retried here.
    #[instrument(skip_all, fields(topic = %message.topic, content_type = content_type.name()))]
    pub async fn send(
        &self,
        content_type: ContentType,
        message: &Message,
    ) -> Result<(), PublishError> {
        let started = Instant::now();
        let result = self.try_send(content_type, message).await;
        self.record(content_type, started, &result);
        result
    }

    /// Like [`send`](Self::send) but gives up after `deadline`.
    ///
    /// On expiry the message may still be delivered by the transport; the
    /// caller only learns that no acknowledgement arrived in time.
    #[instrument(skip_all, fields(topic = %message.topic, content_type = content_type.name()))]
    pub async fn send_within(
        &self,
        content_type: ContentType,
        message: &Message,
        deadline: Duration,
    ) -> Result<(), PublishError> {
        let started = Instant::now();
        let result =
            match tokio::time::timeout(deadline, self.try_send(content_type, message))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(PublishError::Send(TransportError::Timeout(deadline))),
            };
        self.record(content_type, started, &result);
        result
    }

    async fn try_send(
        &self,
        content_type: ContentType,
        message: &Message,
    ) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }
        message.validate()?;

        let value = self.registry.marshal(message, content_type).await?;
        let broker_message = BrokerMessage::assemble(message, content_type, value);

        self.transport
            .deliver(broker_message)
            .await
            .map_err(PublishError::Send)
    }

    fn record(
        &self,
        content_type: ContentType,
        started: Instant,
        result: &Result<(), PublishError>,
    ) {
        let ct = content_type.name();
        match result {
            Ok(()) => {
                counter!("topicgate_messages_sent_total", "content_type" => ct)
                    .increment(1);
                histogram!("topicgate_send_latency_seconds", "content_type" => ct)
                    .record(started.elapsed().as_secs_f64());
                debug!("message published");
            }
            Err(e) => {
                counter!(
                    "topicgate_send_failures_total",
                    "content_type" => ct,
                    "kind" => e.kind()
                )
                .increment(1);
                if e.is_client_error() {
                    warn!(error = %e, kind = e.kind(), "message rejected");
                } else {
                    error!(error = %e, kind = e.kind(), "failed to publish message");
                }
            }
        }
    }

    /// Flush and close the transport.
    ///
    /// Only the first call closes; later calls return
    /// [`PublishError::Closed`].
    pub async fn disconnect(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(PublishError::Closed);
        }
        info!("disconnecting publisher");
        self.transport.close().await.map_err(PublishError::Close)
    }
}
