//! deskcast-server: entry point.
//!
//! ```text
//! deskcast-server                    Stream on the configured port
//! deskcast-server --config <path>    Load a custom config TOML
//! deskcast-server --gen-config       Print the default config and exit
//! deskcast-server --write-config     Write the default config to --config
//! deskcast-server --port 6000 --fps 15 --quality 80
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskcast_server::config::ServerConfig;
use deskcast_server::service::CastService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "deskcast-server", about = "Stream this machine's display to viewers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskcast-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    write_config: bool,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the target frames per second (1-60).
    #[arg(long)]
    fps: Option<u8>,

    /// Override the JPEG quality (0-100).
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: Option<u8>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.write_config {
        ServerConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(fps) = cli.fps {
        config.stream.fps = fps;
    }
    if let Some(quality) = cli.quality {
        config.stream.quality = quality;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("deskcast-server v{}", env!("CARGO_PKG_VERSION"));
    info!("port: {}", config.network.port);
    info!("target FPS: {}", config.stream.fps.clamp(1, 60));
    info!("quality: {}", config.stream.quality);

    let service = CastService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.cancel();
    });

    service.run().await?;
    Ok(())
}
