//! Light Show Server
//!
//! Reads raw PCM from stdin, turns every block into channel levels and
//! distributes them over sACN, e.g.
//!
//! ```text
//! ffmpeg -i song.mp3 -f s16le -ac 2 -ar 44100 - | server show.toml
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightshow_sync::{
    audio::{create_shared_queue, PcmSource, SharedBlockQueue},
    config::{AppConfig, NetworkMode},
    constants::*,
    output::TracingOutput,
    show::ServerShow,
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

    tracing::info!("Starting light show server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    config.require_mode(NetworkMode::Server);

    tracing::info!(
        "Audio: {} Hz, {} channel(s), {} samples per block ({:.1} ms)",
        config.audio.sample_rate,
        config.audio.input_channels,
        config.audio.chunk_size,
        config.audio.block_duration().as_secs_f64() * 1000.0
    );

    let show = ServerShow::new(&config)
        .context("Failed to set up the show")?
        .with_output(Box::new(TracingOutput::new(config.hardware.gpio_len, 20)));

    // PCM reader thread feeding the tick loop
    let queue = create_shared_queue(BLOCK_QUEUE_CAPACITY);
    let source = PcmSource::spawn(
        std::io::stdin(),
        config.audio.input_channels,
        config.audio.chunk_size,
        queue.clone(),
    )
    .context("Failed to start the PCM reader")?;

    let running = Arc::new(AtomicBool::new(true));
    let ctrl_c_running = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, stopping");
            ctrl_c_running.store(false, Ordering::Relaxed);
        }
    });

    let pacing = config.audio.realtime_pacing.then(|| config.audio.block_duration());
    let tick_running = running.clone();
    let tick_queue = queue.clone();

    tracing::info!("Starting tick loop - press Ctrl+C to stop");

    let mut show =
        tokio::task::spawn_blocking(move || run_ticks(show, tick_queue, pacing, tick_running))
            .await?;

    running.store(false, Ordering::Relaxed);
    source.stop();
    show.shutdown();

    if source.is_running() {
        tracing::debug!("PCM reader still blocked on stdin, leaving it to exit with the process");
    } else {
        source.join();
    }

    tracing::info!(
        "Input queue: {} overflows, {} underruns",
        queue.overflow_count(),
        queue.underrun_count()
    );
    Ok(())
}

/// Tick once per PCM block until input ends or `running` is cleared
fn run_ticks(
    mut show: ServerShow,
    queue: SharedBlockQueue,
    pacing: Option<Duration>,
    running: Arc<AtomicBool>,
) -> ServerShow {
    if let Some(transport) = show.transport_mut() {
        transport.set_playing();
    }

    let mut next_tick = Instant::now();
    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        let Some(block) = queue.pop() else {
            if queue.is_drained() {
                tracing::info!("Input finished");
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
            continue;
        };

        show.tick(&block.samples);

        // Hold each frame for the duration of its audio block
        if let Some(period) = pacing {
            next_tick += period;
            let now = Instant::now();
            if next_tick > now {
                std::thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            log_stats(&show, &queue);
            last_stats = Instant::now();
        }
    }

    show
}

fn log_stats(show: &ServerShow, queue: &SharedBlockQueue) {
    match show.transport() {
        Some(transport) => {
            let stats = transport.stats();
            tracing::info!(
                "Stats: {} frames, {} packets sent, {:.1} KB sent, {} send errors, {} override messages, queue {}/{}",
                show.frames(),
                stats.packets_sent,
                stats.bytes_sent as f64 / 1024.0,
                stats.send_errors,
                stats.control_sent,
                queue.len(),
                queue.capacity()
            );
        }
        None => {
            tracing::info!(
                "Stats: {} frames, queue {}/{}",
                show.frames(),
                queue.len(),
                queue.capacity()
            );
        }
    }
}
