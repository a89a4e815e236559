//! `pokegate-server [CONFIG.json]`
//!
//! Serves the aggregation gateway over HTTP. Without a config path every setting takes its
//! default. Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use pokegate::config::TelemetryConfig;
use pokegate::telemetry::{LogSink, MulticastSink, NonBlockingSink, Telemetry};
use pokegate::{http, Gateway, GatewayConfig};
use pokegate_jsonl::JsonlSink;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => GatewayConfig::from_path(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => GatewayConfig::default(),
    };

    let telemetry = telemetry(&config.telemetry);
    let gateway = Gateway::from_config(&config, telemetry).context("building gateway")?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, provider = %config.metadata.base_url, "pokegate listening");

    axum::serve(listener, http::router(Arc::new(gateway)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    tracing::info!("pokegate stopped");
    Ok(())
}

/// Records always reach the log; with a JSONL path they are also appended off the request path.
fn telemetry(config: &TelemetryConfig) -> Telemetry {
    match &config.jsonl_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing telemetry records as JSON lines");
            let file = NonBlockingSink::with_capacity(JsonlSink::new(path.clone()), config.buffer);
            Telemetry::new(MulticastSink::new(LogSink, file))
        }
        None => Telemetry::new(LogSink),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
