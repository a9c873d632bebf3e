//! hapbridge - HomeKit Accessory Protocol bridge.

use std::path::PathBuf;

use anyhow::{Context, Result};
use hap_server::{BridgeConfig, BridgeServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "HAPBRIDGE_CONFIG";

/// Command-line arguments
struct Args {
    /// JSON configuration file
    config: PathBuf,
    /// Log at debug level unless RUST_LOG says otherwise
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("hapbridge.json")),
            verbose: false,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = iter.next() {
                    args.config = PathBuf::from(path);
                }
            }
            "--verbose" | "-v" => {
                args.verbose = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    println!("hapbridge - HomeKit Accessory Protocol bridge");
    println!();
    println!("Usage: hapbridge [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH  Configuration file");
    println!("                     (default: $HAPBRIDGE_CONFIG or hapbridge.json)");
    println!("  -v, --verbose      Log at debug level");
    println!("  -h, --help         Show this help message");
}

fn setup_logging(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    setup_logging(&args);

    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    info!(name = %config.name, port = config.port, "Starting bridge");

    let server = BridgeServer::new(config).context("initializing bridge")?;
    server.run().await?;

    info!("Bridge stopped");
    Ok(())
}
