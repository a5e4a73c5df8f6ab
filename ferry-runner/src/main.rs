//! Ferry
//!
//! Moves log records from a search service into an ingestion endpoint, one
//! incremental run at a time.
//!
//! Architecture:
//! - Configuration: Load settings from the environment (and an optional `.env`)
//! - Checkpoint: Persist the time window of the next incremental query
//! - Repositories: HTTP communication with the search and ingestion services
//! - Scheduler: Search job submission, polling and cleanup
//! - Services: Record validation, batch assembly and delivery
//! - Pipeline: One run from checkpoint to delivered batch
//!
//! Logs go to stderr; stdout only carries the envelope when delivery is off.

mod checkpoint;
mod config;
mod error;
mod pipeline;
mod repository;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use ferry_core::domain::envelope::SourceMode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::pipeline::{Delivery, Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Incremental search-to-ingestion log pipeline", long_about = None)]
struct Cli {
    /// Where the records come from
    #[arg(value_enum)]
    source: Source,

    /// Resume from and advance the checkpoint window
    #[arg(long, value_enum, default_value_t = Switch::No)]
    checkpoint: Switch,

    /// JSON record to send (json source only)
    #[arg(long, required_if_eq("source", "json"))]
    payload: Option<String>,

    /// Deliver the envelope; `no` prints it instead
    #[arg(long, value_enum, default_value_t = Switch::Yes)]
    dataset: Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Run a search job over the checkpoint window
    Sumo,
    /// Send the `--payload` record
    Json,
}

impl From<Source> for SourceMode {
    fn from(source: Source) -> Self {
        match source {
            Source::Sumo => SourceMode::Sumo,
            Source::Json => SourceMode::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    Yes,
    No,
}

impl Switch {
    fn is_on(self) -> bool {
        self == Switch::Yes
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Optional .env next to the working directory
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_runner=info,ferry_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = RunOptions {
        source: cli.source.into(),
        checkpoint: cli.checkpoint.is_on(),
        deliver: cli.dataset.is_on(),
        payload: cli.payload,
    };

    let config = load_config(&options)?;
    info!(
        source = %options.source,
        checkpoint = options.checkpoint,
        deliver = options.deliver,
        checkpoint_path = %config.checkpoint_path.display(),
        "Starting run"
    );

    let pipeline =
        Pipeline::from_config(&config).context("Failed to initialize service clients")?;

    let report = match pipeline.run(&options).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Run failed");
            return Err(e).context("Run failed");
        }
    };

    match &report.delivery {
        Delivery::Sent { response } => {
            info!(%response, "Ingestion response");
            println!(
                "{}",
                format!("Successfully sent {} event(s) to DataSet", report.envelope.len()).green()
            );
        }
        Delivery::Disabled => {
            let body = serde_json::to_string(&report.envelope)
                .context("Failed to serialize envelope")?;
            println!("{}", body);
        }
        Delivery::NothingToSend => {
            println!("{}", "No events to send.".yellow());
        }
    }

    if report.skipped > 0 {
        eprintln!(
            "{}",
            format!("Skipped {} malformed search message(s)", report.skipped).yellow()
        );
    }

    if let Some(window) = report.checkpoint {
        info!(start = window.start, end = window.end, "Run complete");
    } else {
        info!("Run complete");
    }

    Ok(())
}

/// Loads configuration from environment variables and checks it for this run
fn load_config(options: &RunOptions) -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate_for(options.source, options.deliver)
        .context("Invalid configuration")?;
    Ok(config)
}
