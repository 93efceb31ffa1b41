use std::{any::Any, panic, thread};

use metrics::counter;
use once_cell::sync::OnceCell;
use tracing::{Span, error, info};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Log panics with thread, location and the active span, count them per
/// span, then defer to the previous hook.
///
/// A panic inside a request handler is reported under that handler's span
/// so the counter says which part of the gateway is failing.
pub fn install_hook() {
    if INSTALLED.set(()).is_err() {
        return;
    }

    let prev = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        let payload = payload_text(info.payload());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown>".into());
        let span = span_name(&Span::current());

        error!(%name, %location, %payload, span, "panic captured");
        counter!("topicgate_panics_total", "span" => span).increment(1);

        prev(info);
    }));

    info!("panic hook installed");
}

/// Message carried by a panic payload, for the two payload types
/// `panic!` produces.
pub fn payload_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

fn span_name(span: &Span) -> &'static str {
    span.metadata().map(|m| m.name()).unwrap_or("none")
}
