//! librdkafka client context: connection state tracking and producer
//! statistics.
//!
//! librdkafka invokes [`ClientContext::stats`] every
//! `statistics.interval.ms` on its own thread, for as long as the producer
//! lives. That single periodic callback feeds the producer gauges.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use metrics::gauge;
use rdkafka::ClientContext;
use rdkafka::error::KafkaError;
use rdkafka::statistics::Statistics;
use rdkafka::types::RDKafkaErrorCode;
use topicgate_core::ConnectionState;
use tracing::{debug, info, warn};

const DISCONNECTED: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;

/// Connection state shared between the transport and its client context.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            CONNECTING => ConnectionState::Connecting,
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(encode(state), Ordering::Release);
    }

    /// Move `from -> to` only if the current state is `from`.
    ///
    /// Keeps callbacks from resurrecting a connection that was closed.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(
                encode(from),
                encode(to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Disconnected => DISCONNECTED,
        ConnectionState::Connecting => CONNECTING,
        ConnectionState::Connected => CONNECTED,
    }
}

pub struct ProducerContext {
    state: Arc<StateCell>,
}

impl ProducerContext {
    pub fn new(state: Arc<StateCell>) -> Self {
        Self { state }
    }
}

impl ClientContext for ProducerContext {
    fn stats(&self, stats: Statistics) {
        let brokers_up = stats
            .brokers
            .values()
            .filter(|b| b.state == "UP")
            .count();

        gauge!("topicgate_producer_queue_messages").set(stats.msg_cnt as f64);
        gauge!("topicgate_producer_tx_messages").set(stats.txmsgs as f64);
        gauge!("topicgate_producer_tx_bytes").set(stats.txmsg_bytes as f64);
        gauge!("topicgate_producer_brokers_up").set(brokers_up as f64);

        if brokers_up > 0
            && self
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            info!(brokers_up, "broker connection restored");
        }
        debug!(
            queued = stats.msg_cnt,
            brokers_up, "producer statistics"
        );
    }

    fn error(&self, error: KafkaError, reason: &str) {
        if error.rdkafka_error_code() == Some(RDKafkaErrorCode::AllBrokersDown)
            && self
                .state
                .transition(ConnectionState::Connected, ConnectionState::Connecting)
        {
            warn!(%reason, "all brokers down, librdkafka is reconnecting");
            return;
        }
        warn!(error = %error, %reason, "kafka client error");
    }
}
