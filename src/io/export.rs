//! Export the combined table as tidy CSV.
//!
//! One row per `(grouping, role, fund, window)` observation, header always
//! present (even for an empty table), nulls as empty fields.

use std::io::Write;

use crate::domain::CombinedRecord;
use crate::error::AppError;

pub const OUTPUT_COLUMNS: [&str; 10] = [
    "grouping_id",
    "role",
    "fund_code",
    "name",
    "asset_type",
    "period_length_yrs",
    "start_date",
    "end_date",
    "performance",
    "volatility",
];

/// Write the combined records as comma-delimited CSV.
pub fn write_records_csv<W: Write>(writer: W, records: &[CombinedRecord]) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    writer
        .write_record(OUTPUT_COLUMNS)
        .map_err(|e| AppError::input(format!("Failed to write CSV header: {e}")))?;

    for record in records {
        writer
            .serialize(record)
            .map_err(|e| AppError::input(format!("Failed to write CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush CSV output: {e}")))?;

    Ok(())
}
