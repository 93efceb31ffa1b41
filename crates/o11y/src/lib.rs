//! Process-wide observability: structured logging, Prometheus metrics and
//! a panic hook. Every initialiser is idempotent.

pub mod logging;
pub mod panic;
pub mod prom;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid log filter {filter:?}: {details}")]
    Filter { filter: String, details: String },

    #[error("installing tracing subscriber: {0}")]
    Subscriber(String),

    #[error("installing metrics recorder: {0}")]
    Recorder(String),
}

/// Logging first so the other initialisers can report through it.
pub fn init_all(log: &logging::Config, prom: &prom::Config) -> Result<(), InitError> {
    logging::init(log)?;
    prom::init(prom)?;
    panic::install_hook();
    Ok(())
}
