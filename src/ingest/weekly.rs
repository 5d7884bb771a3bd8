//! Weekly performance export (multi-level header, block-structured body).
//!
//! Layout of the sheet:
//!
//! - four header rows: period length / start date / end date / variable
//! - data rows grouped into blocks separated by fully blank rows
//! - the first row of every block repeats a classification label and is not data
//!
//! Output is long format: one [`Observation`] per fund, window and metric.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::domain::{Observation, PeriodLength, Variable, WeeklyDescriptor, WeeklyLayout};
use crate::error::AppError;
use crate::ingest::header::{HEADER_DEPTH, HeaderSchema, LEVEL_SEPARATOR, ReportingWindow, build_header_map};
use crate::io::sheet::{Cell, Sheet};

/// Column holding the fund code in the weekly export.
pub const FUND_CODE_SOURCE_COLUMN: &str = "secid";

/// Label prefix the export puts in front of benchmark names.
pub const BENCHMARK_PREFIX: &str = "Benchmark 1: ";

const ID_COLUMNS: [&str; 4] = ["group_investment", "isin", "fund_code", "base_currency"];

/// Metric columns in melt order.
const METRIC_COLUMNS: [&str; 6] = [
    "1_year.return",
    "3_year.return",
    "5_year.return",
    "1_year.std_dev",
    "3_year.std_dev",
    "5_year.std_dev",
];

/// Decode a flattened metric column name such as `3_year.std_dev`.
pub fn parse_metric_column(name: &str) -> Option<(PeriodLength, Variable)> {
    let (period, variable) = name.split_once(LEVEL_SEPARATOR)?;
    let years = period.split('_').next()?.parse::<u32>().ok()?;
    let period = PeriodLength::from_years(years)?;
    let variable = match variable {
        "return" => Variable::Performance,
        "std_dev" => Variable::Volatility,
        _ => return None,
    };
    Some((period, variable))
}

/// Parse the weekly export into long-format observations.
pub fn parse_weekly(sheet: &Sheet, layout: &WeeklyLayout) -> Result<Vec<Observation>, AppError> {
    let data_start = layout.header_row + HEADER_DEPTH;
    let data_rows = sheet.rows().get(data_start..).unwrap_or(&[]);

    // 1) Drop columns without any data, normalize labels.
    let kept: Vec<usize> = (0..sheet.width())
        .filter(|&col| data_rows.iter().any(|row| row.get(col).is_some_and(|c| !c.is_empty())))
        .collect();
    let schema = HeaderSchema::from_sheet(sheet, layout.header_row).select(&kept);
    let rows: Vec<Vec<Cell>> = data_rows
        .iter()
        .map(|row| {
            kept.iter()
                .map(|&col| row.get(col).cloned().unwrap_or(Cell::Empty))
                .collect()
        })
        .collect();

    // 2) One reporting date, three lookback starts.
    let window = schema.reporting_window()?;

    // 3) Blocks, minus their classification rows.
    let body = strip_classification_rows(&rows);
    debug!(
        data_rows = rows.len(),
        body_rows = body.len(),
        columns = kept.len(),
        "weekly blocks split"
    );

    // 4-5) Flat column names; the fund code column becomes `fund_code`.
    let names: Vec<String> = schema
        .columns
        .iter()
        .map(|c| {
            let name = c.flat_name();
            if name == FUND_CODE_SOURCE_COLUMN { "fund_code".to_string() } else { name }
        })
        .collect();
    let header_map = build_header_map(names.iter().map(String::as_str));
    let ids = IdColumns::resolve(&header_map)?;
    let metrics = resolve_metric_columns(&header_map)?;

    // 6-8) Melt.
    let observations = melt(&body, &ids, &metrics, &window);
    info!(
        rows = body.len(),
        observations = observations.len(),
        end_date = %window.end_date,
        "parsed weekly export"
    );
    Ok(observations)
}

/// Split rows into blocks at fully blank rows and drop each block's first row.
fn strip_classification_rows(rows: &[Vec<Cell>]) -> Vec<&[Cell]> {
    rows.split(|row| row.iter().all(Cell::is_empty))
        .filter(|block| !block.is_empty())
        .flat_map(|block| block.iter().skip(1).map(Vec::as_slice))
        .collect()
}

struct IdColumns {
    group_investment: usize,
    isin: usize,
    fund_code: usize,
    base_currency: usize,
}

impl IdColumns {
    fn resolve(header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        let [group_investment, isin, fund_code, base_currency] = ID_COLUMNS.map(|name| header_map.get(name).copied());
        match (group_investment, isin, fund_code, base_currency) {
            (Some(group_investment), Some(isin), Some(fund_code), Some(base_currency)) => Ok(Self {
                group_investment,
                isin,
                fund_code,
                base_currency,
            }),
            _ => {
                let missing: Vec<&str> = ID_COLUMNS
                    .iter()
                    .copied()
                    .filter(|name| !header_map.contains_key(*name))
                    .collect();
                Err(AppError::structure(format!(
                    "Weekly export is missing identifier column(s): {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

struct MetricColumn {
    index: usize,
    period: PeriodLength,
    variable: Variable,
}

fn resolve_metric_columns(header_map: &HashMap<String, usize>) -> Result<Vec<MetricColumn>, AppError> {
    METRIC_COLUMNS
        .iter()
        .map(|&name| {
            let index = *header_map.get(name).ok_or_else(|| {
                AppError::structure(format!("Weekly export is missing metric column `{name}`."))
            })?;
            let (period, variable) = parse_metric_column(name)
                .ok_or_else(|| AppError::structure(format!("Unrecognised metric column `{name}`.")))?;
            Ok(MetricColumn {
                index,
                period,
                variable,
            })
        })
        .collect()
}

fn melt(body: &[&[Cell]], ids: &IdColumns, metrics: &[MetricColumn], window: &ReportingWindow) -> Vec<Observation> {
    let text = |row: &[Cell], idx: usize| row.get(idx).and_then(Cell::as_text);

    let mut keyed = Vec::with_capacity(body.len());
    let mut missing_code = 0usize;
    for &row in body {
        let Some(fund_code) = text(row, ids.fund_code) else {
            missing_code += 1;
            continue;
        };
        let descriptor = WeeklyDescriptor {
            group_investment: text(row, ids.group_investment).map(|name| strip_benchmark_prefix(&name)),
            isin: text(row, ids.isin),
            base_currency: text(row, ids.base_currency),
        };
        keyed.push((row, fund_code, descriptor));
    }
    if missing_code > 0 {
        warn!(rows = missing_code, "weekly rows without a fund code skipped");
    }

    let mut out = Vec::with_capacity(keyed.len() * metrics.len());
    for metric in metrics {
        for (row, fund_code, descriptor) in &keyed {
            out.push(Observation {
                fund_code: fund_code.clone(),
                variable: metric.variable,
                period_length: metric.period,
                start_date: window.start_date(metric.period),
                end_date: window.end_date,
                value: row.get(metric.index).and_then(Cell::as_f64),
                descriptor: descriptor.clone(),
            });
        }
    }
    out
}

fn strip_benchmark_prefix(name: &str) -> String {
    name.strip_prefix(BENCHMARK_PREFIX).unwrap_or(name).to_string()
}
