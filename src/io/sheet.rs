//! In-memory cell grid shared by the spreadsheet-shaped sources.
//!
//! The weekly and metadata exports are addressed by absolute row position
//! (the weekly header lives on fixed spreadsheet rows), so loaders keep
//! leading blank rows/columns instead of trimming to the used range.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveDate;
use tracing::debug;

use crate::error::AppError;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    /// Build a text cell; whitespace-only input is `Empty`.
    pub fn text(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() { Cell::Empty } else { Cell::Text(s.to_string()) }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Render the cell as a label/value string.
    ///
    /// Whole numbers print without a fractional part (`5`, not `5.0`), so
    /// numeric codes typed into a spreadsheet keep their textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) => Some(format!("{v}")),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric value of the cell. Text is accepted with an optional trailing
    /// `%`; anything else that does not parse to a finite number is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => parse_percent(s),
            _ => None,
        }
    }
}

/// Parse a percentage figure such as `"5.2"` or `"5.2%"`.
pub fn parse_percent(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// A rectangular-ish grid of cells, addressed by absolute position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at `(row, col)`; positions outside the grid read as `Empty`.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(EMPTY)
    }
}

/// Load one sheet from `path`.
///
/// Workbook formats go through calamine and select `sheet` by name; any other
/// extension is read as delimited text (the sheet name is then irrelevant).
pub fn load_sheet(path: &Path, sheet: &str, delimiter: u8) -> Result<Sheet, AppError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let loaded = if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        load_workbook_sheet(path, sheet)?
    } else {
        let file = File::open(path)
            .map_err(|e| AppError::input(format!("Failed to open '{}': {e}", path.display())))?;
        read_delimited(file, delimiter)
            .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display())))?
    };

    debug!(
        path = %path.display(),
        rows = loaded.height(),
        cols = loaded.width(),
        "loaded sheet"
    );
    Ok(loaded)
}

fn load_workbook_sheet(path: &Path, sheet: &str) -> Result<Sheet, AppError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::input(format!("Failed to open workbook '{}': {e}", path.display())))?;

    let range = workbook.worksheet_range(sheet).map_err(|e| {
        AppError::input(format!(
            "Failed to read sheet '{sheet}' from '{}': {e}",
            path.display()
        ))
    })?;

    // `Range` only spans the used area; pad back to absolute positions.
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = vec![Vec::new(); row_offset];
    for source_row in range.rows() {
        let mut row = vec![Cell::Empty; col_offset];
        row.extend(source_row.iter().map(convert_cell));
        rows.push(row);
    }

    Ok(Sheet::new(rows))
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Cell::Date(ts.date()),
            None => Cell::Number(dt.as_f64()),
        },
    }
}

/// Read delimited text into a sheet without treating any row as a header.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Sheet, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Cell> = record
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                // Excel's UTF-8 CSV export prefixes the first cell with a BOM.
                if rows.is_empty() && idx == 0 {
                    Cell::text(field.trim_start_matches('\u{feff}'))
                } else {
                    Cell::text(field)
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(Sheet::new(rows))
}
