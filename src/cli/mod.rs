//! Command-line interface for voucherd.

mod config_cmd;
mod generate;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use voucherd::config::Config;
use voucherd::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "voucherd", version, about = "AI-assisted accounting voucher generation")]
pub(crate) struct Cli {
    /// Config file (default: ~/.voucherd/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
        /// Override the port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generate vouchers for an invoice batch file and wait for the result
    Generate {
        /// JSON file: `{"invoices": [...]}` or a bare array of invoices
        #[arg(short, long)]
        input: PathBuf,
        /// Write the voucher here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 300)]
        wait_secs: u64,
    },
    /// Print the effective configuration as JSON
    Config,
}

/// Parse arguments, load configuration and dispatch.
pub(crate) async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_with_env(path),
        None => Config::load(),
    }
    .with_context(|| {
        let path = cli.config.clone().unwrap_or_else(Config::path);
        format!("Failed to load configuration from {}", path.display())
    })?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, port } => serve::cmd_serve(config, bind, port).await,
        Commands::Generate {
            input,
            output,
            wait_secs,
        } => generate::cmd_generate(config, input, output, wait_secs).await,
        Commands::Config => config_cmd::cmd_config(&config),
    }
}
