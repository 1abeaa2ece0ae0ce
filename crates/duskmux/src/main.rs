//! CLI entry point: `client`, `server` and `genSecret` sub-commands, per
//! spec.md §6.

mod client;
mod config;
mod pprof;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{ClientConfig, ServerConfig};

#[derive(Parser)]
#[command(name = "duskmux", about = "A SOCKS5-over-WebSocket/QUIC tunnel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local SOCKS5 front-end and dial out to a duskmux server.
    Client {
        #[arg(long = "file")]
        file: PathBuf,
    },
    /// Run the remote endpoint: HTTP router, auth gate and dispatcher.
    Server {
        #[arg(long = "file")]
        file: PathBuf,
    },
    /// Generate a fresh TOTP secret for a new client/server pair.
    #[command(name = "genSecret")]
    GenSecret {
        #[arg(long, default_value_t = duskmux_totp::DEFAULT_PERIOD)]
        period: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Client { file } => {
            let config = ClientConfig::load(&file).with_context(|| format!("failed to load client config from {}", file.display()))?;
            client::run(config).await
        }
        Command::Server { file } => {
            let config = ServerConfig::load(&file).with_context(|| format!("failed to load server config from {}", file.display()))?;
            serve::run(config).await
        }
        Command::GenSecret { period } => {
            let secret = duskmux_totp::generate_secret();
            println!("secret = \"{secret}\"");
            println!("period = {period}");
            Ok(())
        }
    }
}
