//! Bundle Relayer - private token launch bundles and public batch payouts
//!
//! `bundle` opens trading and swaps in the same block through a Flashbots
//! style relay. `send` pays every registered recipient in one public
//! transaction.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{debug, error, info, warn};

mod bundle;
mod chain;
mod commands;
mod config;
mod context;
mod dispatch;
mod error;
mod identity;
mod metrics;
mod relay;
mod tx;

use config::Settings;
use context::AppContext;
use error::BundlerError;
use relay::BundleOutcome;

#[derive(Parser)]
#[command(name = "bundle-relayer", version)]
#[command(about = "Submit launch bundles to a private relay and send batch payouts", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "BUNDLER_CONFIG")]
    config: Option<PathBuf>,

    /// Network preset loaded from config/<NETWORK>.toml; overrides --config
    #[arg(short, long, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open trading and swap-and-distribute in one bundle
    Bundle {
        /// Max transaction amount, in token units
        #[arg(short, long)]
        maxtx: String,
        /// Ether forwarded to the swap
        #[arg(short, long)]
        eth: String,
    },
    /// Pay the same amount to every registered recipient
    Send {
        /// Ether per recipient
        #[arg(short, long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    info!("Starting Bundle Relayer v{}", env!("CARGO_PKG_VERSION"));

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    let code = tokio::select! {
        result = run(settings, cli.command) => match result {
            Ok(()) => 0,
            Err(e) if e.is_fatal() => {
                error!("{}", e);
                e.exit_code()
            }
            Err(e) => {
                warn!("{}", e);
                e.exit_code()
            }
        },
        _ = signal::ctrl_c() => {
            warn!("Interrupted, abandoning the current operation");
            1
        }
    };

    debug!("Metrics at exit:\n{}", metrics::render());
    ExitCode::from(code as u8)
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.network {
        Some(network) => Settings::load_network(network)?,
        None => Settings::load(cli.config.as_deref())?,
    };
    info!(
        "Loaded configuration for {} (chain {})",
        settings.network.name, settings.network.chain_id
    );
    Ok(settings)
}

async fn run(settings: Settings, command: Commands) -> Result<(), BundlerError> {
    let ctx = AppContext::connect(settings).await?;

    match command {
        Commands::Bundle { maxtx, eth } => {
            if let BundleOutcome::Included {
                block,
                attempts,
                bundle_hash,
                submitted_at,
            } = commands::run_bundle(&ctx, &maxtx, &eth).await?
            {
                info!(
                    block,
                    attempts,
                    bundle_hash = bundle_hash.as_deref().unwrap_or("-"),
                    elapsed_secs = (chrono::Utc::now() - submitted_at).num_seconds(),
                    "Bundle landed"
                );
            }
        }
        Commands::Send { amount } => {
            let receipt = commands::run_batch(&ctx, &amount).await?;
            info!(
                tx_hash = ?receipt.tx_hash,
                block = ?receipt.block_number,
                recipients = %receipt.recipients,
                total_wei = %receipt.total,
                "Batch confirmed"
            );
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bundle_relayer=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
