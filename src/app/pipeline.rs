//! The batch pipeline shared by the binary and the integration tests.
//!
//! weekly parse -> historical parse -> merge/pivot -> metadata explode ->
//! outer join -> required-field filter
//!
//! Every stage is a whole-table transform; the first error aborts the run.

use tracing::info;

use crate::domain::{CombinedRecord, Observation, PipelineConfig, RoleRow, WideObservation};
use crate::error::AppError;
use crate::ingest::{load_historical, parse_metadata, parse_weekly};
use crate::io::sheet::{Sheet, load_sheet};
use crate::merge::{join_and_filter, merge_datasets};

/// Delimiter used when a spreadsheet-shaped source is supplied as text.
const SHEET_TEXT_DELIMITER: u8 = b',';

/// All computed tables of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub observations: Vec<WideObservation>,
    pub roles: Vec<RoleRow>,
    pub records: Vec<CombinedRecord>,
}

/// Read every source named by `config` and run the full pipeline.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunOutput, AppError> {
    // The weekly header is validated before the other sources are touched.
    let weekly_sheet = load_sheet(&config.weekly_path, &config.weekly_layout.sheet, SHEET_TEXT_DELIMITER)?;
    let weekly = parse_weekly(&weekly_sheet, &config.weekly_layout)?;

    let historical = load_historical(&config.historical_path, config.historical_delimiter)?;

    let metadata_sheet = load_sheet(&config.metadata_path, &config.metadata_sheet, SHEET_TEXT_DELIMITER)?;

    run_with_parsed(&weekly, &historical, &metadata_sheet, config)
}

/// Run the pipeline over sources that are already in memory.
pub fn run_with_sources(
    weekly_sheet: &Sheet,
    historical: &[Observation],
    metadata_sheet: &Sheet,
    config: &PipelineConfig,
) -> Result<RunOutput, AppError> {
    let weekly = parse_weekly(weekly_sheet, &config.weekly_layout)?;
    run_with_parsed(&weekly, historical, metadata_sheet, config)
}

fn run_with_parsed(
    weekly: &[Observation],
    historical: &[Observation],
    metadata_sheet: &Sheet,
    config: &PipelineConfig,
) -> Result<RunOutput, AppError> {
    let observations = merge_datasets(weekly, historical)?;
    let roles = parse_metadata(metadata_sheet, &config.null_rules)?;
    let records = join_and_filter(&roles, &observations)?;

    info!(records = records.len(), "pipeline finished");
    Ok(RunOutput {
        observations,
        roles,
        records,
    })
}
