use anyhow::{Context, Result};
use facematch_gemini::GeminiComparator;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{FacematchService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facematchd starting");

    // Fail fast: no API key means no session.
    let config = config::Config::load().context("failed to load configuration")?;
    let comparator =
        GeminiComparator::new(&config.gemini).context("failed to set up comparator")?;
    let model = comparator.model().to_string();

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let engine = engine::spawn_engine(comparator, progress_tx);
    let service = FacematchService::new(engine, model, config.daemon.max_image_bytes);

    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    let relay = tokio::spawn(dbus_interface::forward_progress(
        connection.clone(),
        progress_rx,
    ));

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "facematchd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facematchd shutting down");

    relay.abort();
    Ok(())
}
