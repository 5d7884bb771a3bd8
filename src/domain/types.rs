//! Shared domain types.
//!
//! Every stage of the pipeline consumes one of these tables and produces a
//! new one; nothing here is mutated after construction.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};

use crate::ingest::null_rules::NullRules;

/// Which metric an observation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Performance,
    Volatility,
}

impl Variable {
    pub const ALL: [Variable; 2] = [Variable::Performance, Variable::Volatility];

    pub fn as_str(self) -> &'static str {
        match self {
            Variable::Performance => "performance",
            Variable::Volatility => "volatility",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == name)
    }
}

/// Lookback window over which a metric is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodLength {
    One,
    Three,
    Five,
}

impl PeriodLength {
    pub const ALL: [PeriodLength; 3] = [PeriodLength::One, PeriodLength::Three, PeriodLength::Five];

    pub fn years(self) -> u32 {
        match self {
            PeriodLength::One => 1,
            PeriodLength::Three => 3,
            PeriodLength::Five => 5,
        }
    }

    pub fn from_years(years: u32) -> Option<Self> {
        match years {
            1 => Some(PeriodLength::One),
            3 => Some(PeriodLength::Three),
            5 => Some(PeriodLength::Five),
            _ => None,
        }
    }

    /// Fixed 365-day years; leap days are ignored.
    pub fn approx_days(self) -> Duration {
        Duration::days(365 * i64::from(self.years()))
    }
}

impl Serialize for PeriodLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.years())
    }
}

/// Descriptive attributes only the weekly export carries.
///
/// Historical rows leave all of them `None`, which is what keeps the two
/// sources apart when they share a `(fund_code, period, dates)` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeeklyDescriptor {
    pub group_investment: Option<String>,
    pub isin: Option<String>,
    pub base_currency: Option<String>,
}

/// One long-format `(key, variable, value)` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub fund_code: String,
    pub variable: Variable,
    pub period_length: PeriodLength,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Percentage units. `None` when the source cell was blank or not numeric.
    pub value: Option<f64>,
    pub descriptor: WeeklyDescriptor,
}

impl Observation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            group_investment: self.descriptor.group_investment.clone(),
            isin: self.descriptor.isin.clone(),
            fund_code: self.fund_code.clone(),
            base_currency: self.descriptor.base_currency.clone(),
            period_length: self.period_length,
            end_date: self.end_date,
            start_date: self.start_date,
        }
    }
}

/// Composite pivot key. Field order is the sort order of the wide table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationKey {
    pub group_investment: Option<String>,
    pub isin: Option<String>,
    pub fund_code: String,
    pub base_currency: Option<String>,
    pub period_length: PeriodLength,
    pub end_date: NaiveDate,
    pub start_date: NaiveDate,
}

impl ObservationKey {
    pub fn descriptor(&self) -> WeeklyDescriptor {
        WeeklyDescriptor {
            group_investment: self.group_investment.clone(),
            isin: self.isin.clone(),
            base_currency: self.base_currency.clone(),
        }
    }
}

/// A pivoted row that still carries the full key (before projection).
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedObservation {
    pub key: ObservationKey,
    pub performance: Option<f64>,
    pub volatility: Option<f64>,
}

impl PivotedObservation {
    pub fn get(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Performance => self.performance,
            Variable::Volatility => self.volatility,
        }
    }
}

/// The merged wide table: one row per fund, window and source.
#[derive(Debug, Clone, PartialEq)]
pub struct WideObservation {
    pub fund_code: String,
    pub period_length: PeriodLength,
    pub end_date: NaiveDate,
    pub start_date: NaiveDate,
    pub performance: Option<f64>,
    pub volatility: Option<f64>,
}

/// Which member of a fund grouping a metadata row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Fund,
    Bench,
    Category,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Fund, Role::Bench, Role::Category];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Fund => "fund",
            Role::Bench => "bench",
            Role::Category => "category",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// Benchmarks and categories are indices: no share ISIN, no asset type.
    pub fn carries_share_attributes(self) -> bool {
        matches!(self, Role::Fund)
    }
}

/// One exploded metadata row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub grouping_id: usize,
    pub role: Role,
    pub isin: Option<String>,
    pub fund_code: String,
    pub name: Option<String>,
    pub asset_type: Option<String>,
}

/// Final output row. The three required fields are not optional here, so a
/// value of this type is already past the required-field filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRecord {
    pub grouping_id: Option<usize>,
    pub role: Option<Role>,
    pub fund_code: String,
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub period_length_yrs: PeriodLength,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub performance: f64,
    pub volatility: f64,
}

/// Where the weekly export's header sits and which sheet holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyLayout {
    pub sheet: String,
    /// Zero-based row index of the first of the four header rows.
    pub header_row: usize,
}

impl Default for WeeklyLayout {
    fn default() -> Self {
        Self {
            sheet: "Sheet1".to_string(),
            header_row: 6,
        }
    }
}

pub const DEFAULT_HISTORICAL_PATH: &str = "./raw_data/historical_data.csv";
pub const DEFAULT_METADATA_PATH: &str = "./raw_data/ptf_metadata.xlsx";

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub weekly_path: PathBuf,
    pub historical_path: PathBuf,
    pub metadata_path: PathBuf,
    pub weekly_layout: WeeklyLayout,
    pub metadata_sheet: String,
    pub historical_delimiter: u8,
    /// Literal metadata values that stand for "no value".
    pub null_rules: NullRules,
}

impl PipelineConfig {
    pub fn new(weekly_path: impl Into<PathBuf>) -> Self {
        Self {
            weekly_path: weekly_path.into(),
            historical_path: PathBuf::from(DEFAULT_HISTORICAL_PATH),
            metadata_path: PathBuf::from(DEFAULT_METADATA_PATH),
            weekly_layout: WeeklyLayout::default(),
            metadata_sheet: "Sheet1".to_string(),
            historical_delimiter: b';',
            null_rules: NullRules::metadata_default(),
        }
    }

    pub fn with_historical_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.historical_path = path.into();
        self
    }

    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = path.into();
        self
    }

    pub fn with_historical_delimiter(mut self, delimiter: u8) -> Self {
        self.historical_delimiter = delimiter;
        self
    }

    pub fn with_weekly_layout(mut self, layout: WeeklyLayout) -> Self {
        self.weekly_layout = layout;
        self
    }

    pub fn with_metadata_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.metadata_sheet = sheet.into();
        self
    }

    pub fn with_null_rules(mut self, rules: NullRules) -> Self {
        self.null_rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_days_ignores_leap_years() {
        let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let start = end - PeriodLength::Three.approx_days();
        assert_eq!((end - start).num_days(), 1095);
        assert_eq!(start, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());

        // Crossing 29 Feb 2024 lands one day after the calendar answer.
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let start = end - PeriodLength::Three.approx_days();
        assert_eq!(start, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
    }

    #[test]
    fn period_length_only_accepts_known_windows() {
        assert_eq!(PeriodLength::from_years(5), Some(PeriodLength::Five));
        assert_eq!(PeriodLength::from_years(2), None);
    }

    #[test]
    fn only_fund_role_carries_share_attributes() {
        assert!(Role::Fund.carries_share_attributes());
        assert!(!Role::Bench.carries_share_attributes());
        assert!(!Role::Category.carries_share_attributes());
    }
}
