//! Light Show Client
//!
//! Receives channel levels and override messages from a server and drives
//! the local lights.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightshow_sync::{
    config::{AppConfig, NetworkMode},
    output::TracingOutput,
    show::ClientShow,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting light show client");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    config.require_mode(NetworkMode::Client);

    let output = TracingOutput::new(config.hardware.gpio_len, 20);
    let show = ClientShow::new(&config, Box::new(output)).context("Failed to set up the client")?;

    let running = Arc::new(AtomicBool::new(true));
    let ctrl_c_running = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, stopping");
            ctrl_c_running.store(false, Ordering::Relaxed);
        }
    });

    tracing::info!("Waiting for lighting data - press Ctrl+C to stop");

    let tick_running = running.clone();
    let mut show = tokio::task::spawn_blocking(move || run_ticks(show, tick_running)).await?;

    show.shutdown();
    Ok(())
}

/// Tick until `running` is cleared; each tick waits at most for the
/// receive timeout
fn run_ticks(mut show: ClientShow, running: Arc<AtomicBool>) -> ClientShow {
    show.transport_mut().set_playing();
    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        show.tick();

        if last_stats.elapsed() >= STATS_INTERVAL {
            let stats = show.transport().stats();
            tracing::info!(
                "Stats: {} frames, {} packets received, {} invalid, {} out of order, {} control messages",
                show.frames(),
                stats.packets_received,
                stats.invalid_packets,
                stats.out_of_order,
                stats.control_received
            );
            last_stats = Instant::now();
        }
    }

    show
}
