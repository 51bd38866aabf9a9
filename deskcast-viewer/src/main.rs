//! deskcast-viewer: entry point.
//!
//! ```text
//! deskcast-viewer                       Connect to the configured host
//! deskcast-viewer 10.0.0.5 5900         Connect to an explicit host/port
//! deskcast-viewer --snapshot last.jpg   Save the last frame on exit
//! deskcast-viewer --gen-config          Print the default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::time::Interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deskcast_core::{Session, WatchSink};
use deskcast_viewer::config::ViewerConfig;
use deskcast_viewer::headless;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "deskcast-viewer", about = "Watch a deskcast broadcaster")]
struct Cli {
    /// Broadcaster host (overrides the config file).
    host: Option<String>,

    /// Broadcaster port (overrides the config file).
    port: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskcast-viewer.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    write_config: bool,

    /// Save the last received frame as a JPEG when the viewer exits.
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

enum Event {
    Tick,
    Interrupted,
    Ended,
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.write_config {
        ViewerConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = ViewerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("deskcast-viewer v{}", env!("CARGO_PKG_VERSION"));

    let host = cli.host.unwrap_or_else(|| config.network.host.clone());
    let port = cli.port.unwrap_or_else(|| config.network.port.to_string());

    let (sink, frames) = WatchSink::new();
    let mut session = Session::new(config.to_session_config(), sink);
    session.connect(&host, &port).await?;

    let mut ticker = config.stats_interval().map(tokio::time::interval);
    let stats = session.stats();

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => Event::Interrupted,
            _ = session.wait_disconnected() => Event::Ended,
            _ = next_tick(ticker.as_mut()) => Event::Tick,
        };
        match event {
            Event::Tick => headless::log_stats(&stats.borrow()),
            Event::Interrupted => {
                info!("Ctrl-C received; disconnecting");
                session.shutdown().await?;
                break;
            }
            Event::Ended => {
                if let Some(reason) = session.status().last_disconnect {
                    warn!(%reason, "stream ended");
                }
                break;
            }
        }
    }

    headless::log_stats(&stats.borrow());

    if let Some(path) = cli.snapshot {
        match frames.borrow().clone() {
            Some(frame) => headless::save_snapshot(&frame, &path)?,
            None => warn!("no frame received; snapshot not written"),
        }
    }

    Ok(())
}
