use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use etherflood::config::{parse_ether_type, EtherfloodConfig, FloodConfig, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "etherflood",
    about = "Flood a network interface with raw Ethernet frames",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (falls back to $ETHERFLOOD_CONFIG, then /etc/etherflood/etherflood.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send broadcast frames as fast as possible and report throughput
    Send {
        /// Number of frames to send
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Number of concurrent sender workers
        #[arg(short = 't', long = "threads")]
        workers: Option<usize>,

        /// Interface index or name (see `etherflood list`)
        #[arg(short = 'i', long)]
        interface: Option<String>,

        /// Source address seed (0-255); random if omitted
        #[arg(short = 's', long)]
        seed: Option<u32>,

        /// EtherType of generated frames, hex (0xbeef) or decimal
        #[arg(long, value_parser = ether_type_arg)]
        ether_type: Option<u16>,

        /// Payload bytes per frame before minimum-size padding
        #[arg(long)]
        payload_len: Option<usize>,

        /// Capacity of the work queue feeding the workers
        #[arg(long)]
        queue_depth: Option<usize>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List available network interfaces
    List {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn ether_type_arg(s: &str) -> Result<u16, String> {
    parse_ether_type(s).map_err(|e| e.to_string())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Apply command-line overrides on top of the file configuration.
#[allow(clippy::too_many_arguments)]
fn merge_flags(
    mut flood: FloodConfig,
    frames: Option<u64>,
    workers: Option<usize>,
    interface: Option<String>,
    seed: Option<u32>,
    ether_type: Option<u16>,
    payload_len: Option<usize>,
    queue_depth: Option<usize>,
) -> FloodConfig {
    if let Some(v) = frames {
        flood.frames = v;
    }
    if let Some(v) = workers {
        flood.workers = v;
    }
    if let Some(v) = interface {
        flood.interface = v;
    }
    if seed.is_some() {
        flood.seed = seed;
    }
    if let Some(v) = ether_type {
        flood.ether_type = v;
    }
    if let Some(v) = payload_len {
        flood.payload_len = v;
    }
    if let Some(v) = queue_depth {
        flood.queue_depth = v;
    }
    flood
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // An explicit --config must load; discovered files only warn.
    let loaded = match &cli.config {
        Some(path) => EtherfloodConfig::load_explicit(path)?,
        None => EtherfloodConfig::load_or_default(),
    };

    init_tracing(&loaded.config.logging);
    loaded.log();
    let config = loaded.config;

    match cli.command {
        Commands::Send {
            frames,
            workers,
            interface,
            seed,
            ether_type,
            payload_len,
            queue_depth,
            json,
        } => {
            let flood = merge_flags(
                config.flood,
                frames,
                workers,
                interface,
                seed,
                ether_type,
                payload_len,
                queue_depth,
            );
            tracing::info!(
                frames = flood.frames,
                workers = flood.workers,
                interface = flood.interface.as_str(),
                "Running flood"
            );

            let summary = etherflood::send(&flood, interrupt())
                .await
                .context("flood could not start")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", etherflood::flood::report::format_summary(&summary));
            }
        }
        Commands::List { json } => {
            let ifaces = etherflood::link::iface::list().context("cannot list interfaces")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ifaces)?);
            } else {
                println!("{:<6} | {:<16} | Address", "Index", "Name");
                println!("{:-<6}-|-{:-<16}-|-{:-<17}", "", "", "");
                for iface in ifaces {
                    let addr = iface
                        .hardware_addr
                        .map(|a| a.to_string())
                        .unwrap_or_default();
                    println!("{:<6} | {:<16} | {}", iface.index, iface.name, addr);
                }
            }
        }
    }

    Ok(())
}
