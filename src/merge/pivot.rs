//! Union of the two long tables and the `variable` pivot.
//!
//! Long rows are keyed by `(group_investment, isin, fund_code, base_currency,
//! period, end_date, start_date)`; pivoting spreads `variable` into the
//! `performance` / `volatility` columns. Rows from the two sources never
//! collapse into each other: historical rows have no weekly descriptor, so
//! their keys differ even for the same fund and window.

use std::collections::HashSet;

use polars::prelude::*;
use polars_ops::pivot::{PivotAgg, UnpivotDF, pivot as pivot_frame};
use tracing::info;

use crate::domain::{Observation, ObservationKey, PeriodLength, PivotedObservation, Variable, WideObservation};
use crate::error::AppError;
use crate::merge::frame::{date_column, frame_error, read_dates, read_floats, read_strings, read_u32s};

/// Pivot index, in sort order.
const KEY_COLUMNS: [&str; 7] = [
    "group_investment",
    "isin",
    "fund_code",
    "base_currency",
    "period_length",
    "end_date",
    "start_date",
];

const VARIABLE_COLUMN: &str = "variable";
const VALUE_COLUMN: &str = "value";

fn key_columns<'a, I>(keys: I) -> PolarsResult<Vec<Column>>
where
    I: IntoIterator<Item = &'a ObservationKey>,
    I::IntoIter: Clone,
{
    let keys = keys.into_iter();
    let strings = |f: fn(&ObservationKey) -> Option<String>| keys.clone().map(f).collect::<Vec<_>>();
    Ok(vec![
        Column::new(KEY_COLUMNS[0].into(), strings(|k| k.group_investment.clone())),
        Column::new(KEY_COLUMNS[1].into(), strings(|k| k.isin.clone())),
        Column::new(KEY_COLUMNS[2].into(), strings(|k| Some(k.fund_code.clone()))),
        Column::new(KEY_COLUMNS[3].into(), strings(|k| k.base_currency.clone())),
        Column::new(
            KEY_COLUMNS[4].into(),
            keys.clone().map(|k| k.period_length.years()).collect::<Vec<u32>>(),
        ),
        date_column(KEY_COLUMNS[5], keys.clone().map(|k| Some(k.end_date)))?,
        date_column(KEY_COLUMNS[6], keys.map(|k| Some(k.start_date)))?,
    ])
}

/// Key columns of `df`, decoded row by row.
fn read_keys(df: &DataFrame) -> Result<Vec<ObservationKey>, AppError> {
    let decode = || -> PolarsResult<_> {
        Ok((
            read_strings(df, KEY_COLUMNS[0])?,
            read_strings(df, KEY_COLUMNS[1])?,
            read_strings(df, KEY_COLUMNS[2])?,
            read_strings(df, KEY_COLUMNS[3])?,
            read_u32s(df, KEY_COLUMNS[4])?,
            read_dates(df, KEY_COLUMNS[5])?,
            read_dates(df, KEY_COLUMNS[6])?,
        ))
    };
    let (group_investment, isin, fund_code, base_currency, period, end, start) =
        decode().map_err(frame_error("read the pivot key"))?;

    (0..df.height())
        .map(|i| {
            let (Some(fund_code), Some(period_length), Some(end_date), Some(start_date)) = (
                fund_code[i].clone(),
                period[i].and_then(PeriodLength::from_years),
                end[i],
                start[i],
            ) else {
                return Err(AppError::structure(format!("Pivot row {i} has an incomplete key.")));
            };
            Ok(ObservationKey {
                group_investment: group_investment[i].clone(),
                isin: isin[i].clone(),
                fund_code,
                base_currency: base_currency[i].clone(),
                period_length,
                end_date,
                start_date,
            })
        })
        .collect()
}

/// A `(key, variable)` pair appearing twice is ambiguous and fails the run.
fn ensure_unique(observations: &[Observation]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(observations.len());
    for obs in observations {
        if !seen.insert((obs.key(), obs.variable)) {
            return Err(AppError::structure(format!(
                "Duplicate {} observation for fund `{}` ({}y, {} to {}).",
                obs.variable.as_str(),
                obs.fund_code,
                obs.period_length.years(),
                obs.start_date,
                obs.end_date
            )));
        }
    }
    Ok(())
}

fn long_frame(observations: &[Observation]) -> PolarsResult<DataFrame> {
    let keys: Vec<ObservationKey> = observations.iter().map(Observation::key).collect();
    let mut columns = key_columns(&keys)?;
    columns.push(Column::new(
        VARIABLE_COLUMN.into(),
        observations.iter().map(|o| o.variable.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        VALUE_COLUMN.into(),
        observations.iter().map(|o| o.value).collect::<Vec<_>>(),
    ));
    DataFrame::new(columns)
}

fn wide_frame(rows: &[PivotedObservation]) -> PolarsResult<DataFrame> {
    let mut columns = key_columns(rows.iter().map(|r| &r.key))?;
    for variable in Variable::ALL {
        columns.push(Column::new(
            variable.as_str().into(),
            rows.iter().map(|r| r.get(variable)).collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns)
}

/// A metric column of the pivoted frame; absent when no row carried it.
fn metric_values(df: &DataFrame, variable: Variable) -> PolarsResult<Vec<Option<f64>>> {
    if df.get_column_index(variable.as_str()).is_none() {
        return Ok(vec![None; df.height()]);
    }
    read_floats(df, variable.as_str())
}

/// Pivot long observations to one row per key, sorted by key.
pub fn pivot(observations: &[Observation]) -> Result<Vec<PivotedObservation>, AppError> {
    ensure_unique(observations)?;
    if observations.is_empty() {
        return Ok(Vec::new());
    }

    let wide = long_frame(observations)
        .and_then(|long| {
            pivot_frame(
                &long,
                [VARIABLE_COLUMN],
                Some(KEY_COLUMNS),
                Some([VALUE_COLUMN]),
                true,
                Some(PivotAgg::First),
                None,
            )
        })
        .and_then(|df| df.sort(KEY_COLUMNS, SortMultipleOptions::default()))
        .map_err(frame_error("pivot observations"))?;

    let keys = read_keys(&wide)?;
    let performance = metric_values(&wide, Variable::Performance).map_err(frame_error("read performance"))?;
    let volatility = metric_values(&wide, Variable::Volatility).map_err(frame_error("read volatility"))?;

    Ok(keys
        .into_iter()
        .zip(performance.into_iter().zip(volatility))
        .map(|(key, (performance, volatility))| PivotedObservation {
            key,
            performance,
            volatility,
        })
        .collect())
}

/// Inverse of [`pivot`]: one observation per non-null cell.
pub fn melt(rows: &[PivotedObservation]) -> Result<Vec<Observation>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let long = wide_frame(rows)
        .and_then(|wide| wide.unpivot(Variable::ALL.map(Variable::as_str), KEY_COLUMNS))
        .map_err(frame_error("unpivot observations"))?;

    let keys = read_keys(&long)?;
    let (variables, values) = read_strings(&long, VARIABLE_COLUMN)
        .and_then(|variables| Ok((variables, read_floats(&long, VALUE_COLUMN)?)))
        .map_err(frame_error("read unpivoted values"))?;

    let mut out = Vec::with_capacity(keys.len());
    for ((key, variable), value) in keys.into_iter().zip(variables).zip(values) {
        let Some(value) = value else {
            continue;
        };
        let variable = variable
            .as_deref()
            .and_then(Variable::from_name)
            .ok_or_else(|| AppError::structure(format!("Unknown variable {variable:?} after unpivot.")))?;
        out.push(Observation {
            fund_code: key.fund_code.clone(),
            variable,
            period_length: key.period_length,
            start_date: key.start_date,
            end_date: key.end_date,
            value: Some(value),
            descriptor: key.descriptor(),
        });
    }
    Ok(out)
}

/// Drop the weekly-only descriptor once it has served as part of the key.
pub fn project(rows: Vec<PivotedObservation>) -> Vec<WideObservation> {
    rows.into_iter()
        .map(|row| WideObservation {
            fund_code: row.key.fund_code,
            period_length: row.key.period_length,
            end_date: row.key.end_date,
            start_date: row.key.start_date,
            performance: row.performance,
            volatility: row.volatility,
        })
        .collect()
}

/// Concatenate both sources, pivot, and project to the wide table.
pub fn merge_datasets(weekly: &[Observation], historical: &[Observation]) -> Result<Vec<WideObservation>, AppError> {
    let combined: Vec<Observation> = weekly.iter().chain(historical).cloned().collect();
    let pivoted = pivot(&combined)?;
    info!(
        weekly = weekly.len(),
        historical = historical.len(),
        wide_rows = pivoted.len(),
        "merged observation tables"
    );
    Ok(project(pivoted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::domain::{PeriodLength, WeeklyDescriptor};

    fn obs(code: &str, variable: Variable, value: f64, weekly: bool) -> Observation {
        let end = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
        Observation {
            fund_code: code.to_string(),
            variable,
            period_length: PeriodLength::One,
            start_date: end - PeriodLength::One.approx_days(),
            end_date: end,
            value: Some(value),
            descriptor: if weekly {
                WeeklyDescriptor {
                    group_investment: Some("Fund".to_string()),
                    isin: Some("LU0001".to_string()),
                    base_currency: Some("EUR".to_string()),
                }
            } else {
                WeeklyDescriptor::default()
            },
        }
    }

    #[test]
    fn pivot_pairs_performance_with_volatility() {
        let rows = pivot(&[
            obs("F1", Variable::Performance, 5.2, true),
            obs("F1", Variable::Volatility, 3.1, true),
            obs("F2", Variable::Volatility, 1.0, true),
        ])
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].performance, rows[0].volatility), (Some(5.2), Some(3.1)));
        assert_eq!((rows[1].performance, rows[1].volatility), (None, Some(1.0)));
    }

    #[test]
    fn sources_with_the_same_window_stay_separate() {
        let wide = merge_datasets(
            &[
                obs("F1", Variable::Performance, 5.2, true),
                obs("F1", Variable::Volatility, 3.1, true),
            ],
            &[
                obs("F1", Variable::Performance, 5.0, false),
                obs("F1", Variable::Volatility, 3.0, false),
            ],
        )
        .unwrap();
        assert_eq!(wide.len(), 2);
        assert!(wide.iter().all(|w| w.fund_code == "F1"));
        // Historical keys (no descriptor) sort first.
        assert_eq!(wide[0].performance, Some(5.0));
        assert_eq!(wide[1].performance, Some(5.2));
    }

    #[test]
    fn duplicate_key_is_structural() {
        let err = pivot(&[
            obs("F1", Variable::Performance, 5.2, true),
            obs("F1", Variable::Performance, 5.3, true),
        ])
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_STRUCTURE);
    }

    #[test]
    fn null_descriptors_form_their_own_key() {
        let rows = pivot(&[
            obs("F1", Variable::Volatility, 3.0, false),
            obs("F1", Variable::Volatility, 3.1, true),
            obs("F1", Variable::Performance, 5.0, false),
        ])
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.isin, None);
        assert_eq!((rows[0].performance, rows[0].volatility), (Some(5.0), Some(3.0)));
        assert_eq!((rows[1].performance, rows[1].volatility), (None, Some(3.1)));
    }

    #[test]
    fn empty_input_pivots_to_nothing() {
        assert!(pivot(&[]).unwrap().is_empty());
        assert!(melt(&[]).unwrap().is_empty());
    }

    #[test]
    fn melt_skips_null_cells() {
        let rows = pivot(&[obs("F2", Variable::Volatility, 1.0, false)]).unwrap();
        let long = melt(&rows).unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].variable, Variable::Volatility);
    }
}
