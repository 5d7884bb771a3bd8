//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises logging (stderr; stdout is reserved for the CSV)
//! - runs the pipeline
//! - writes the combined table to stdout

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::domain::PipelineConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `fundperf` binary.
pub fn run() -> Result<(), AppError> {
    // Usage errors exit here (clap prints usage and exits non-zero).
    let cli = Cli::parse();
    init_logging();

    let config = pipeline_config_from_args(&cli);
    let run = pipeline::run_pipeline(&config)?;

    let stdout = std::io::stdout();
    crate::io::export::write_records_csv(stdout.lock(), &run.records)
}

pub fn pipeline_config_from_args(cli: &Cli) -> PipelineConfig {
    PipelineConfig::new(cli.weekly.clone())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
