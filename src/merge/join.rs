//! Outer join of metadata role rows with the wide observation table, then
//! the required-field filter that produces the final records.

use polars::prelude::*;
use tracing::info;

use crate::domain::{CombinedRecord, PeriodLength, Role, RoleRow, WideObservation};
use crate::error::AppError;
use crate::merge::frame::{date_column, frame_error, read_dates, read_floats, read_strings, read_u32s};

const FUND_CODE: &str = "fund_code";
/// Source positions, used to keep metadata order x observation order per key.
const ROLE_ROW: &str = "role_row";
const OBSERVATION_ROW: &str = "observation_row";
/// Fields every emitted record needs.
const REQUIRED: [&str; 3] = ["period_length", "performance", "volatility"];

fn role_frame(roles: &[RoleRow]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(ROLE_ROW.into(), (0..roles.len() as u32).collect::<Vec<_>>()),
        Column::new(
            "grouping_id".into(),
            roles.iter().map(|r| r.grouping_id as u32).collect::<Vec<_>>(),
        ),
        Column::new("role".into(), roles.iter().map(|r| r.role.as_str()).collect::<Vec<_>>()),
        Column::new(FUND_CODE.into(), roles.iter().map(|r| r.fund_code.as_str()).collect::<Vec<_>>()),
        Column::new("name".into(), roles.iter().map(|r| r.name.clone()).collect::<Vec<_>>()),
        Column::new(
            "asset_type".into(),
            roles.iter().map(|r| r.asset_type.clone()).collect::<Vec<_>>(),
        ),
    ])
}

fn observation_frame(observations: &[WideObservation]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            OBSERVATION_ROW.into(),
            (0..observations.len() as u32).collect::<Vec<_>>(),
        ),
        Column::new(
            FUND_CODE.into(),
            observations.iter().map(|o| o.fund_code.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "period_length".into(),
            observations.iter().map(|o| o.period_length.years()).collect::<Vec<_>>(),
        ),
        date_column("start_date", observations.iter().map(|o| Some(o.start_date)))?,
        date_column("end_date", observations.iter().map(|o| Some(o.end_date)))?,
        Column::new(
            "performance".into(),
            observations.iter().map(|o| o.performance).collect::<Vec<_>>(),
        ),
        Column::new(
            "volatility".into(),
            observations.iter().map(|o| o.volatility).collect::<Vec<_>>(),
        ),
    ])
}

/// Full outer join on `fund_code`.
///
/// Keys come out in ascending order. Within a key every role row pairs with
/// every observation (metadata order first); unmatched rows from either side
/// are kept with the other side null.
pub fn outer_join(roles: &[RoleRow], observations: &[WideObservation]) -> Result<DataFrame, AppError> {
    let left = role_frame(roles).map_err(frame_error("build the metadata frame"))?;
    let right = observation_frame(observations).map_err(frame_error("build the observation frame"))?;

    left.lazy()
        .join(
            right.lazy(),
            [col(FUND_CODE)],
            [col(FUND_CODE)],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .sort([FUND_CODE, ROLE_ROW, OBSERVATION_ROW], SortMultipleOptions::default())
        .collect()
        .map_err(frame_error("join metadata with observations"))
}

/// Keep only joined rows carrying period, performance and volatility.
pub fn filter_required(joined: DataFrame) -> Result<DataFrame, AppError> {
    let complete = REQUIRED
        .into_iter()
        .map(|name| col(name).is_not_null())
        .reduce(|all, next| all.and(next))
        .unwrap_or(lit(true));
    joined
        .lazy()
        .filter(complete)
        .collect()
        .map_err(frame_error("filter incomplete rows"))
}

/// Decode a filtered join back into output records.
fn read_records(df: &DataFrame) -> Result<Vec<CombinedRecord>, AppError> {
    let decode = || -> PolarsResult<_> {
        Ok((
            read_u32s(df, "grouping_id")?,
            read_strings(df, "role")?,
            read_strings(df, FUND_CODE)?,
            read_strings(df, "name")?,
            read_strings(df, "asset_type")?,
            read_u32s(df, "period_length")?,
            read_dates(df, "start_date")?,
            read_dates(df, "end_date")?,
            read_floats(df, "performance")?,
            read_floats(df, "volatility")?,
        ))
    };
    let (grouping_id, role, fund_code, name, asset_type, period, start, end, performance, volatility) =
        decode().map_err(frame_error("read joined records"))?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(fund_code), Some(period_length_yrs), Some(start_date), Some(end_date), Some(performance), Some(volatility)) = (
            fund_code[i].clone(),
            period[i].and_then(PeriodLength::from_years),
            start[i],
            end[i],
            performance[i],
            volatility[i],
        ) else {
            return Err(AppError::structure(format!("Joined row {i} is missing a required field.")));
        };
        out.push(CombinedRecord {
            grouping_id: grouping_id[i].map(|id| id as usize),
            role: role[i].as_deref().and_then(Role::from_name),
            fund_code,
            name: name[i].clone(),
            asset_type: asset_type[i].clone(),
            period_length_yrs,
            start_date,
            end_date,
            performance,
            volatility,
        });
    }
    Ok(out)
}

/// Outer join followed by the required-field filter.
pub fn join_and_filter(roles: &[RoleRow], observations: &[WideObservation]) -> Result<Vec<CombinedRecord>, AppError> {
    let joined = outer_join(roles, observations)?;
    let joined_rows = joined.height();
    let records = read_records(&filter_required(joined)?)?;
    info!(
        joined = joined_rows,
        emitted = records.len(),
        "joined metadata with observations"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn role(grouping_id: usize, role: Role, code: &str) -> RoleRow {
        RoleRow {
            grouping_id,
            role,
            isin: None,
            fund_code: code.to_string(),
            name: Some(format!("{code} name")),
            asset_type: None,
        }
    }

    fn wide(code: &str, performance: Option<f64>, volatility: Option<f64>) -> WideObservation {
        WideObservation {
            fund_code: code.to_string(),
            period_length: PeriodLength::One,
            end_date: NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(),
            start_date: NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
            performance,
            volatility,
        }
    }

    #[test]
    fn outer_join_keeps_both_unmatched_sides() {
        let roles = [role(0, Role::Fund, "F1"), role(0, Role::Bench, "B1")];
        let data = [wide("F1", Some(1.0), Some(2.0)), wide("Z9", Some(3.0), Some(4.0))];
        let joined = outer_join(&roles, &data).unwrap();

        assert_eq!(joined.height(), 3);
        assert_eq!(
            read_strings(&joined, FUND_CODE).unwrap(),
            [Some("B1".to_string()), Some("F1".to_string()), Some("Z9".to_string())]
        );
        assert_eq!(
            read_strings(&joined, "role").unwrap(),
            [Some("bench".to_string()), Some("fund".to_string()), None]
        );
        assert_eq!(read_floats(&joined, "performance").unwrap(), [None, Some(1.0), Some(3.0)]);
    }

    #[test]
    fn shared_benchmark_joins_every_grouping() {
        let roles = [role(0, Role::Bench, "B1"), role(1, Role::Bench, "B1")];
        let data = [wide("B1", Some(1.0), Some(2.0))];
        let records = join_and_filter(&roles, &data).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].grouping_id, Some(0));
        assert_eq!(records[1].grouping_id, Some(1));
    }

    #[test]
    fn incomplete_rows_are_filtered() {
        let roles = [role(0, Role::Fund, "F1"), role(0, Role::Category, "C1")];
        let data = [
            wide("F1", Some(1.0), None),
            wide("F1", Some(1.5), Some(2.5)),
            wide("X1", None, Some(2.0)),
            wide("X2", Some(0.5), Some(0.7)),
        ];
        let records = join_and_filter(&roles, &data).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fund_code, "F1");
        assert_eq!(records[0].role, Some(Role::Fund));
        assert_eq!(records[0].performance, 1.5);
        assert_eq!(records[0].start_date, NaiveDate::from_ymd_opt(2022, 12, 30).unwrap());
        assert_eq!(records[1].fund_code, "X2");
        assert_eq!(records[1].grouping_id, None);
        assert_eq!(records[1].name, None);
    }

    #[test]
    fn empty_sides_join_cleanly() {
        assert!(join_and_filter(&[], &[]).unwrap().is_empty());
        let records = join_and_filter(&[], &[wide("F1", Some(1.0), Some(2.0))]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, None);
    }
}
