/**
 * Car Manager
 *
 * Usage:
 *   manage drive [--model=PATH] [--js] [--chaos] [--config=PATH]
 *   manage train [--tub=PATHS] --model=PATH [--base_model=PATH] [--no_cache] [--config=PATH]
 *
 * RUST_LOG sets the log filter (default: info).
 */

use std::path::PathBuf;

use anyhow::{Context, Result};
use bibi_drive::config::Config;
use bibi_drive::manage::{self, DriveOptions};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "manage", version, about = "Drive the car and train its pilot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the vehicle loop.
    Drive {
        /// Pilot checkpoint to drive with.
        #[arg(long)]
        model: Option<PathBuf>,
        /// Use the joystick instead of the web controller.
        #[arg(long)]
        js: bool,
        /// Periodic random steering while driving manually.
        #[arg(long)]
        chaos: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Trains a pilot on recorded tubs.
    Train {
        /// Comma separated tub paths, globs allowed. Defaults to DATA_PATH/*.
        #[arg(long)]
        tub: Option<String>,
        /// Where the trained checkpoint is written.
        #[arg(long)]
        model: PathBuf,
        /// Checkpoint to continue training from.
        #[arg(long = "base_model")]
        base_model: Option<PathBuf>,
        /// Decode images per batch instead of caching every sample.
        #[arg(long = "no_cache")]
        no_cache: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Drive { model, js, chaos, config } => {
            let cfg = Config::load(config.as_deref()).context("loading config")?;
            let opts = DriveOptions {
                model_path: model,
                use_joystick: js,
                use_chaos: chaos,
            };
            let stats = manage::drive(&cfg, &opts)?;
            info!(loops = stats.loops, overruns = stats.overruns, "drive finished");
        }
        Commands::Train { tub, model, base_model, no_cache, config } => {
            let cfg = Config::load(config.as_deref()).context("loading config")?;
            let report = manage::train(&cfg, tub.as_deref(), &model, base_model.as_deref(), !no_cache)?;
            info!(epochs = report.epochs_run(), best_val_loss = report.best_val_loss, "training finished");
        }
    }
    Ok(())
}
