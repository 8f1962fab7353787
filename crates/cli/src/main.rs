//! Sleep Disorder Classifier CLI
//!
//! Trains the model offline and talks to a running prediction service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{predict, status, train};
use sleep_lib::SelectionPolicy;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sleep Disorder Classifier CLI
#[derive(Parser)]
#[command(name = "sleepctl")]
#[command(author, version, about = "CLI for the Sleep Disorder Classifier", long_about = None)]
pub struct Cli {
    /// Prediction service URL (can also be set via SLEEP_API_URL env var)
    #[arg(long, env = "SLEEP_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train every candidate model and write the artifact set
    ///
    /// Settings come from SLEEP_TRAIN_* environment variables; flags override them.
    Train {
        /// Labeled CSV file
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Output directory for the artifact set
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Random seed for splitting and fitting
        #[arg(long)]
        seed: Option<u64>,

        /// Deployed variant: gradient_boosting, random_forest, logistic_regression or best_validation
        #[arg(long)]
        selection: Option<SelectionPolicy>,
    },

    /// Send an observation to the service and show the prediction
    Predict {
        /// JSON file with one observation (sends a sample observation if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Show service liveness and readiness
    Health,

    /// Show the served model and its metrics
    Model,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(api_url = %cli.api_url, "Using prediction service");

    let result = match cli.command {
        Commands::Train {
            data_path,
            model_dir,
            seed,
            selection,
        } => {
            let overrides = train::TrainOverrides {
                data_path,
                model_dir,
                seed,
                selection,
            };
            train::run_training(overrides, cli.format)
        }
        Commands::Predict { input } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            predict::predict(&client, input.as_deref(), cli.format).await
        }
        Commands::Health => {
            let client = client::ApiClient::new(&cli.api_url)?;
            status::show_health(&client, cli.format).await
        }
        Commands::Model => {
            let client = client::ApiClient::new(&cli.api_url)?;
            status::show_model(&client, cli.format).await
        }
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
