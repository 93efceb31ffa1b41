use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use runner::{app, build_publisher, shutdown_signal};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "topicgate", version, about = "HTTP to Kafka publishing gateway")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long, env = "TOPICGATE_CONFIG", default_value = "topicgate.yaml")]
    config: String,

    /// Overrides `app.listen` from the config file.
    #[arg(long, env = "TOPICGATE_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = topicgate_config::load_from_path(&args.config)
        .with_context(|| format!("loading config {}", args.config))?;
    if let Some(listen) = args.listen {
        cfg.app.listen = listen;
    }

    o11y::init_all(
        &o11y::logging::Config {
            level: cfg.log.level.clone(),
            json: cfg.log.json,
            with_targets: cfg.app.debug,
        },
        &o11y::prom::Config::default(),
    )
    .context("initialising observability")?;

    info!(name = %cfg.app.name, version = env!("CARGO_PKG_VERSION"), "starting");

    let publisher = build_publisher(&cfg).await?;

    let addr: SocketAddr = cfg
        .app
        .listen
        .parse()
        .with_context(|| format!("app.listen {} must be host:port", cfg.app.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "api listening");

    axum::serve(listener, app(publisher.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving api")?;

    info!("api stopped, draining publisher");
    if let Err(e) = publisher.disconnect().await {
        error!(error = %e, "publisher did not close cleanly");
        return Err(e.into());
    }

    info!("shutdown complete");
    Ok(())
}
