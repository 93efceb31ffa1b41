use std::sync::{Mutex, Once};

use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

use crate::InitError;

static INIT: Once = Once::new();

#[derive(Clone, Debug)]
pub struct Config {
    /// A level like "info" or a full filter such as
    /// "info,publisher=debug,rdkafka=warn". `RUST_LOG` wins when set.
    pub level: String,
    /// JSON lines when true, human readable text otherwise.
    pub json: bool,
    pub with_targets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: true,
            with_targets: false,
        }
    }
}

fn filter(level: &str) -> Result<EnvFilter, InitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| InitError::Filter {
        filter: level.to_string(),
        details: e.to_string(),
    })
}

/// Install the global subscriber and bridge `log` records (librdkafka,
/// reqwest) into it. Later calls are no-ops.
pub fn init(cfg: &Config) -> Result<(), InitError> {
    let outcome: Mutex<Result<(), InitError>> = Mutex::new(Ok(()));

    INIT.call_once(|| {
        let result = (|| {
            let filter = filter(&cfg.level)?;

            let fmt_layer = if cfg.json {
                fmt::layer()
                    .with_target(cfg.with_targets)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_target(cfg.with_targets)
                    .with_ansi(true)
                    .boxed()
            };

            let subscriber = Registry::default().with(filter).with(fmt_layer);
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| InitError::Subscriber(e.to_string()))?;

            // a logger may already be installed by the embedding process
            let _ = LogTracer::init();
            Ok(())
        })();

        if let Ok(mut slot) = outcome.lock() {
            *slot = result;
        }
    });

    outcome
        .into_inner()
        .unwrap_or_else(|e| Err(InitError::Subscriber(e.to_string())))
}
