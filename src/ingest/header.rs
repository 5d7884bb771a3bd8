//! Column-label normalization and the weekly export's four-level header.
//!
//! Every label from every source goes through [`tidy_name`] before it is
//! looked up, so references like `fund_code` or `1_year.return` stay stable
//! when the export's capitalisation or spacing drifts.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::domain::PeriodLength;
use crate::error::AppError;
use crate::io::sheet::Sheet;

/// Separator used when flattening the period and variable levels.
pub const LEVEL_SEPARATOR: &str = ".";

/// Number of header rows in the weekly export.
pub const HEADER_DEPTH: usize = 4;

/// Canonical form of a column label: trimmed, lowercase, with spaces and
/// slashes replaced by `_`.
pub fn tidy_name(label: &str) -> String {
    label.trim().to_lowercase().replace([' ', '/'], "_")
}

/// Whether a normalized label is a placeholder for a blank/merged cell.
pub fn is_unnamed(label: &str) -> bool {
    label.is_empty() || label.contains("unnamed")
}

/// Map normalized header names to their column index (first occurrence wins).
pub fn build_header_map<'a, I>(labels: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = HashMap::new();
    for (idx, label) in labels.into_iter().enumerate() {
        map.entry(tidy_name(label)).or_insert(idx);
    }
    map
}

/// One column's labels across the four header levels. `None` is unnamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnHeader {
    pub period_length: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub variable: Option<String>,
}

impl ColumnHeader {
    /// Build from raw labels ordered period / start / end / variable.
    pub fn from_raw(levels: [Option<String>; HEADER_DEPTH]) -> Self {
        let [period_length, start_date, end_date, variable] = levels.map(|label| {
            label
                .as_deref()
                .map(tidy_name)
                .filter(|label| !is_unnamed(label))
        });
        Self {
            period_length,
            start_date,
            end_date,
            variable,
        }
    }

    /// Period and variable levels joined with `.`, skipping unnamed levels.
    pub fn flat_name(&self) -> String {
        [self.period_length.as_deref(), self.variable.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(LEVEL_SEPARATOR)
    }
}

/// The weekly export's header, one entry per sheet column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSchema {
    pub columns: Vec<ColumnHeader>,
}

/// The reporting date and the three lookback start dates of a weekly sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingWindow {
    pub end_date: NaiveDate,
    pub five_year_start: NaiveDate,
    pub three_year_start: NaiveDate,
    pub one_year_start: NaiveDate,
}

impl ReportingWindow {
    pub fn start_date(&self, period: PeriodLength) -> NaiveDate {
        match period {
            PeriodLength::One => self.one_year_start,
            PeriodLength::Three => self.three_year_start,
            PeriodLength::Five => self.five_year_start,
        }
    }
}

impl HeaderSchema {
    /// Read the header rows starting at `first_row`, filling merged cells.
    pub fn from_sheet(sheet: &Sheet, first_row: usize) -> Self {
        let width = sheet.width();
        let mut levels: Vec<Vec<Option<String>>> = (first_row..first_row + HEADER_DEPTH)
            .map(|row| (0..width).map(|col| sheet.cell(row, col).as_text()).collect())
            .collect();

        fill_merged_labels(&mut levels);

        let columns = (0..width)
            .map(|col| {
                ColumnHeader::from_raw([
                    levels[0][col].clone(),
                    levels[1][col].clone(),
                    levels[2][col].clone(),
                    levels[3][col].clone(),
                ])
            })
            .collect();

        Self { columns }
    }

    /// Keep only the columns at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            columns: indices
                .iter()
                .filter_map(|&idx| self.columns.get(idx).cloned())
                .collect(),
        }
    }

    /// Validate the date levels and resolve the reporting window.
    ///
    /// The sheet must report a single end date and exactly three distinct
    /// start dates; the earliest start belongs to the longest window.
    pub fn reporting_window(&self) -> Result<ReportingWindow, AppError> {
        let end_labels: BTreeSet<&str> = self
            .columns
            .iter()
            .filter_map(|c| c.end_date.as_deref())
            .collect();
        let (Some(&end_label), 1) = (end_labels.first(), end_labels.len()) else {
            return Err(AppError::structure(format!(
                "Weekly header must carry exactly one end date, found {}: {:?}",
                end_labels.len(),
                end_labels
            )));
        };

        let start_labels: BTreeSet<&str> = self
            .columns
            .iter()
            .filter_map(|c| c.start_date.as_deref())
            .collect();
        if start_labels.len() != 3 {
            return Err(AppError::structure(format!(
                "Weekly header must carry exactly three start dates, found {}: {:?}",
                start_labels.len(),
                start_labels
            )));
        }

        let end_date = parse_header_date(end_label)?;

        let mut starts = start_labels
            .into_iter()
            .map(parse_header_date)
            .collect::<Result<Vec<_>, _>>()?;
        starts.sort();
        starts.dedup();
        if let Some(start) = starts.iter().find(|&&start| start >= end_date) {
            return Err(AppError::structure(format!(
                "Weekly header start date {start} is not before the end date {end_date}."
            )));
        }

        let [five_year_start, three_year_start, one_year_start] = starts[..] else {
            return Err(AppError::structure(format!(
                "Weekly header start dates collapse to {} distinct dates after parsing.",
                starts.len()
            )));
        };

        Ok(ReportingWindow {
            end_date,
            five_year_start,
            three_year_start,
            one_year_start,
        })
    }
}

/// Forward-fill blank labels across merged header cells.
///
/// Every level except the last is filled left to right; a column whose level
/// above starts a new label resets the fill, so a blank under a fresh parent
/// stays blank.
fn fill_merged_labels(levels: &mut [Vec<Option<String>>]) {
    let width = levels.first().map_or(0, Vec::len);
    let mut continues_parent = vec![true; width];
    let fill_depth = levels.len().saturating_sub(1);

    for row in levels.iter_mut().take(fill_depth) {
        let mut last = row.first().cloned().flatten();
        for i in 1..width {
            if !continues_parent[i] {
                last = row[i].clone();
            }
            if row[i].is_none() {
                row[i] = last.clone();
            } else {
                continues_parent[i] = false;
                last = row[i].clone();
            }
        }
    }
}

/// Accepted date layouts, tried in order. Ambiguous numeric dates resolve
/// month-first; day-first only matches when the day is above 12.
const DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%m-%d-%Y", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"];

/// Parse a date as written in the exports (`2023-12-31`, `12/31/2023`,
/// `2023-12-31 00:00:00`, ...).
pub fn parse_date_label(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        // Timestamps: keep the date part.
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Parse a normalized header date such as `2023_12_31`.
pub fn parse_header_date(label: &str) -> Result<NaiveDate, AppError> {
    parse_date_label(&label.replace('_', "-")).ok_or_else(|| {
        AppError::structure(format!(
            "Invalid header date '{label}'. Expected YYYY-MM-DD, MM-DD-YYYY or DD-MM-YYYY."
        ))
    })
}
