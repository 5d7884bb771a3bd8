//! Historical performance export (flat, semicolon-delimited).
//!
//! One row per fund and reporting date, with the six metrics spread across
//! `perf_y{1,3,5}` / `vol_y{1,3,5}` columns. Values may carry a trailing `%`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{info, warn};

use crate::domain::{Observation, PeriodLength, Variable, WeeklyDescriptor};
use crate::error::AppError;
use crate::ingest::header::{build_header_map, parse_date_label};
use crate::io::sheet::parse_percent;

/// Metric columns in melt order.
const METRIC_COLUMNS: [&str; 6] = ["perf_y1", "perf_y3", "perf_y5", "vol_y1", "vol_y3", "vol_y5"];

/// Decode a metric column name such as `vol_y3`.
pub fn parse_metric_column(name: &str) -> Option<(PeriodLength, Variable)> {
    let (variable, period) = name.split_once('_')?;
    let variable = match variable {
        "perf" => Variable::Performance,
        "vol" => Variable::Volatility,
        _ => return None,
    };
    let years = period.strip_prefix('y')?.parse::<u32>().ok()?;
    Some((PeriodLength::from_years(years)?, variable))
}

/// Load and melt the historical export at `path`.
pub fn load_historical(path: &Path, delimiter: u8) -> Result<Vec<Observation>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open historical CSV '{}': {e}", path.display())))?;
    let observations = read_historical(file, delimiter)?;
    info!(
        path = %path.display(),
        observations = observations.len(),
        "parsed historical export"
    );
    Ok(observations)
}

/// One historical row before melting.
struct HistoricalRow {
    fund_code: String,
    end_date: NaiveDate,
    metrics: [Option<f64>; 6],
}

/// Read and melt a historical export from any reader.
pub fn read_historical<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Observation>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read historical CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(headers.iter().map(|h| h.trim_start_matches('\u{feff}')));
    ensure_required_columns_exist(&header_map)?;

    let mut rows = Vec::new();
    let mut missing_code = 0usize;
    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header, lines are 1-based.
        let line = idx + 2;
        let record = result
            .map_err(|e| AppError::input(format!("Historical CSV parse error on line {line}: {e}")))?;

        match parse_row(&record, &header_map)
            .map_err(|e| AppError::structure(format!("Historical CSV line {line}: {e}")))?
        {
            Some(row) => rows.push(row),
            None => missing_code += 1,
        }
    }
    if missing_code > 0 {
        warn!(rows = missing_code, "historical rows without a fund code skipped");
    }

    Ok(melt(&rows))
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    let missing: Vec<&str> = ["code", "end_date"]
        .into_iter()
        .chain(METRIC_COLUMNS)
        .filter(|name| !header_map.contains_key(*name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::structure(format!(
            "Historical CSV is missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

/// `Ok(None)` for rows without a fund code: they cannot join anything.
fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Option<HistoricalRow>, String> {
    let Some(code) = get_optional(record, header_map, "code") else {
        return Ok(None);
    };
    let end_date = get_optional(record, header_map, "end_date")
        .ok_or_else(|| "Missing required value: `end_date`".to_string())
        .and_then(parse_date)?;

    let mut metrics = [None; 6];
    for (slot, name) in metrics.iter_mut().zip(METRIC_COLUMNS) {
        *slot = match get_optional(record, header_map, name) {
            None => None,
            Some(raw) => Some(parse_percent(raw).ok_or_else(|| format!("Invalid `{name}` value '{raw}'."))?),
        };
    }

    Ok(Some(HistoricalRow {
        fund_code: code.to_string(),
        end_date,
        metrics,
    }))
}

fn melt(rows: &[HistoricalRow]) -> Vec<Observation> {
    let mut out = Vec::with_capacity(rows.len() * METRIC_COLUMNS.len());
    for (slot, name) in METRIC_COLUMNS.iter().enumerate() {
        // Column names are fixed above; they always decode.
        let Some((period, variable)) = parse_metric_column(name) else {
            continue;
        };
        for row in rows {
            out.push(Observation {
                fund_code: row.fund_code.clone(),
                variable,
                period_length: period,
                start_date: row.end_date - period.approx_days(),
                end_date: row.end_date,
                value: row.metrics[slot],
                descriptor: WeeklyDescriptor::default(),
            });
        }
    }
    out
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_date_label(s).ok_or_else(|| format!("Invalid date '{s}'. Expected YYYY-MM-DD, MM/DD/YYYY or DD/MM/YYYY."))
}
