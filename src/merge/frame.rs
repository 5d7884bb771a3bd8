//! Conversions between the domain tables and polars frames.
//!
//! Dates travel as polars `Date` columns (days since 1970-01-01); every
//! other value keeps its natural column type.

use chrono::{Duration, NaiveDate};
use polars::prelude::*;

use crate::error::AppError;

/// `NaiveDate`'s default is the Unix epoch.
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn to_days(date: NaiveDate) -> i32 {
    // Export dates are far inside the i32 day range.
    (date - epoch()).num_days() as i32
}

/// Map a polars failure in `stage` onto a structural error.
pub(crate) fn frame_error(stage: &'static str) -> impl Fn(PolarsError) -> AppError {
    move |e| AppError::structure(format!("Failed to {stage}: {e}"))
}

pub(crate) fn date_column<I>(name: &str, dates: I) -> PolarsResult<Column>
where
    I: IntoIterator<Item = Option<NaiveDate>>,
{
    let days: Vec<Option<i32>> = dates.into_iter().map(|d| d.map(to_days)).collect();
    Column::new(name.into(), days).cast(&DataType::Date)
}

pub(crate) fn read_dates(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let days = df.column(name)?.cast(&DataType::Int32)?;
    Ok(days
        .i32()?
        .into_iter()
        .map(|d| d.map(|d| epoch() + Duration::days(i64::from(d))))
        .collect())
}

pub(crate) fn read_strings(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

pub(crate) fn read_floats(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    Ok(df.column(name)?.f64()?.into_iter().collect())
}

pub(crate) fn read_u32s(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<u32>>> {
    Ok(df.column(name)?.u32()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_survive_a_frame() {
        let dates = [
            NaiveDate::from_ymd_opt(1969, 12, 31),
            None,
            NaiveDate::from_ymd_opt(2023, 12, 29),
        ];
        let df = DataFrame::new(vec![date_column("end_date", dates).unwrap()]).unwrap();
        assert_eq!(df.column("end_date").unwrap().dtype(), &DataType::Date);
        assert_eq!(read_dates(&df, "end_date").unwrap(), dates);
    }
}
