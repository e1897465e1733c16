//! Power Model CLI
//!
//! Trains power attribution models from exporter telemetry, inspects
//! telemetry inputs against benchmark runs and runs saved models against
//! feature requests.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{estimate, inspect, train, validate};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Power Model CLI
#[derive(Parser)]
#[command(name = "power-model")]
#[command(author, version, about = "Train and run power attribution models", long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (JSON, TOML or YAML)
    #[arg(long, short, env = "POWER_MODEL_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Train models for every usable feature group of an input
    Train {
        /// Query results of the workload run
        #[arg(long, short)]
        input: PathBuf,

        /// Query results of an idle run (required by the profile and trainer isolators)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Isolator: none, min, profile or trainer
        #[arg(long)]
        isolator: Option<String>,

        /// Energy source, e.g. rapl or acpi
        #[arg(long)]
        energy_source: Option<String>,

        /// Trainers fitted on node-level power, comma separated
        #[arg(long, value_delimiter = ',')]
        abs_trainers: Option<Vec<String>>,

        /// Trainers fitted on container-level power, comma separated
        #[arg(long, value_delimiter = ',')]
        dyn_trainers: Option<Vec<String>>,

        /// Directory under which artifacts are written
        #[arg(long)]
        model_root: Option<PathBuf>,

        /// Pipeline name used in the artifact path
        #[arg(long)]
        pipeline_name: Option<String>,

        /// Fit trainers in parallel on the blocking pool
        #[arg(long)]
        concurrent: bool,
    },

    /// Run a saved model against a feature request
    Estimate {
        /// Artifact directory (a composite node-type directory or a single component)
        #[arg(long, short)]
        model: PathBuf,

        /// JSON object mapping feature names to value lists
        #[arg(long, short)]
        request: PathBuf,
    },

    /// Show which feature groups an input supports
    Inspect {
        /// Query results to inspect
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Count usable samples per pod and query, grouped by benchmark scenario
    Validate {
        /// Query results of the benchmark run
        #[arg(long, short)]
        input: PathBuf,

        /// Benchmark status document naming the pod of each repetition
        #[arg(long, short)]
        benchmark: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let pipeline_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Train {
            input,
            profile,
            isolator,
            energy_source,
            abs_trainers,
            dyn_trainers,
            model_root,
            pipeline_name,
            concurrent,
        } => {
            let overrides = train::TrainOverrides {
                isolator,
                energy_source,
                abs_trainers,
                dyn_trainers,
                model_root,
                pipeline_name,
            };
            let pipeline_config = overrides.apply(pipeline_config)?;
            train::run(pipeline_config, &input, profile.as_deref(), concurrent, cli.format).await?;
        }
        Commands::Estimate { model, request } => {
            estimate::run(&pipeline_config.pipeline_name, &model, &request, cli.format)?;
        }
        Commands::Inspect { input } => {
            inspect::run(&input, cli.format)?;
        }
        Commands::Validate { input, benchmark } => {
            validate::run(&input, benchmark.as_deref(), cli.format)?;
        }
    }

    Ok(())
}
