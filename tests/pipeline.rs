//! End-to-end runs of the pipeline.
//!
//! The first test drives the in-memory entry point with a minimal weekly
//! sheet; the rest write CSV sources into a temporary directory and go
//! through `run_pipeline` exactly as the binary does.

use std::fs;
use std::path::Path;

use fundperf::app::pipeline::{run_pipeline, run_with_sources};
use fundperf::domain::{PeriodLength, PipelineConfig, Role, WeeklyLayout};
use fundperf::error::{EXIT_INPUT, EXIT_STRUCTURE};
use fundperf::io::export::write_records_csv;
use fundperf::io::sheet::{Cell, Sheet};

fn row(cells: &[&str]) -> Vec<Cell> {
    cells.iter().map(|s| Cell::text(s)).collect()
}

#[test]
fn single_fund_scenario_yields_one_fund_row() {
    let weekly = Sheet::new(vec![
        row(&["", "", "", "", "1 Year", "", "3 Year", "", "5 Year", ""]),
        row(&["", "", "", "", "2022/12/30", "", "2020/12/31", "", "2018/12/31", ""]),
        row(&["", "", "", "", "2023/12/29", "", "2023/12/29", "", "2023/12/29", ""]),
        row(&["Group/Investment", "ISIN", "SecId", "Base Currency", "Return", "Std Dev", "Return", "Std Dev", "Return", "Std Dev"]),
        row(&["Equity", "", "", "", "", "", "", "", "", ""]),
        row(&["Fund One", "LU0001", "F1", "EUR", "5.2", "3.1", "", "", "", ""]),
        // Keeps the 3y/5y columns populated; not part of any grouping.
        row(&["Other Fund", "LU0002", "F2", "EUR", "1.0", "0.5", "2.0", "1.5", "3.0", "2.5"]),
    ]);
    let metadata = Sheet::new(vec![
        row(&["fund_type", "fund_isin", "fund_mstarcode", "bench_mstarcode", "category_mstarcode", "fund_name", "bench_name", "category_name"]),
        row(&["Equity", "LU0001", "F1", "B1", "C1", "Fund One", "Bench One", "Peers One"]),
    ]);
    let config = PipelineConfig::new("unused.xlsx").with_weekly_layout(WeeklyLayout {
        sheet: "Sheet1".to_string(),
        header_row: 0,
    });

    let run = run_with_sources(&weekly, &[], &metadata, &config).unwrap();

    assert_eq!(run.roles.len(), 3);
    let f1: Vec<_> = run.records.iter().filter(|r| r.fund_code == "F1").collect();
    assert_eq!(f1.len(), 1);
    let record = f1[0];
    assert_eq!(record.role, Some(Role::Fund));
    assert_eq!(record.grouping_id, Some(0));
    assert_eq!(record.fund_code, "F1");
    assert_eq!(record.period_length_yrs, PeriodLength::One);
    assert_eq!(record.performance, 5.2);
    assert_eq!(record.volatility, 3.1);
    assert!(run.records.iter().all(|r| r.fund_code != "B1" && r.fund_code != "C1"));

    // Unmatched observations survive the outer join without metadata.
    let f2: Vec<_> = run.records.iter().filter(|r| r.fund_code == "F2").collect();
    assert_eq!(f2.len(), 3);
    assert!(f2.iter().all(|r| r.role.is_none() && r.grouping_id.is_none()));
}

const WEEKLY_CSV: &str = "\
Weekly report
,
,
,
,
,
,,,,1 Year,,3 Year,,5 Year,
,,,,2022/12/30,,2020/12/31,,2018/12/31,
,,,,2023/12/29,,2023/12/29,,2023/12/29,
Group/Investment,ISIN,SecId,Base Currency,Return,Std Dev,Return,Std Dev,Return,Std Dev
Equity,,,,,,,,,
Fund One,LU0001,F1,EUR,5.2,3.1,4.0,2.9,6.5,3.3
Benchmark 1: Index One,,B1,EUR,4.8,2.5,3.5,2.0,6.1,3.0
";

const HISTORICAL_CSV: &str = "\
code;name;end_date;perf_y1;perf_y3;perf_y5;vol_y1;vol_y3;vol_y5
F1;Fund One;2022-12-30;1.0%;2.0%;3.0%;4.0%;5.0%;6.0%
C1;Peers;2023-12-29;0.5%;;0.7%;0.4%;0.6%;0.8%
";

const METADATA_CSV: &str = "\
fund_type,share_isin,share_mstarcode,bench_mstarcode,category_mstarcode,share_name,bench_name,category_name
Equity Fund,LU0001,F1,B1,C1;C2,Fund One,Index One,Peers One
Money Market,LU0009,F9,MIL,MIL,Fund Nine,MIL,MIL
";

fn write_sources(dir: &Path, weekly: &str) -> PipelineConfig {
    fs::write(dir.join("weekly.csv"), weekly).unwrap();
    fs::write(dir.join("historical.csv"), HISTORICAL_CSV).unwrap();
    fs::write(dir.join("metadata.csv"), METADATA_CSV).unwrap();
    PipelineConfig::new(dir.join("weekly.csv"))
        .with_historical_path(dir.join("historical.csv"))
        .with_metadata_path(dir.join("metadata.csv"))
}

#[test]
fn csv_sources_merge_into_tidy_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_sources(dir.path(), WEEKLY_CSV);

    let run = run_pipeline(&config).unwrap();

    // B1: 3 weekly windows; C1: 2 complete historical windows;
    // F1: 3 weekly + 3 historical windows; F9 has no data.
    assert_eq!(run.records.len(), 11);

    let bench: Vec<_> = run.records.iter().filter(|r| r.fund_code == "B1").collect();
    assert_eq!(bench.len(), 3);
    assert!(bench.iter().all(|r| r.role == Some(Role::Bench) && r.asset_type.is_none()));
    assert!(bench.iter().all(|r| r.name.as_deref() == Some("Index One")));

    assert!(
        !run.records
            .iter()
            .any(|r| r.fund_code == "C1" && r.period_length_yrs == PeriodLength::Three)
    );

    let fund: Vec<_> = run.records.iter().filter(|r| r.fund_code == "F1").collect();
    assert_eq!(fund.len(), 6);
    assert!(fund.iter().all(|r| r.asset_type.as_deref() == Some("equity_fund")));

    // Historical windows use 365-day years.
    let hist_5y = fund
        .iter()
        .find(|r| r.period_length_yrs == PeriodLength::Five && r.performance == 3.0)
        .unwrap();
    assert_eq!((hist_5y.end_date - hist_5y.start_date).num_days(), 5 * 365);

    assert!(run.records.iter().all(|r| r.fund_code != "F9"));
}

#[test]
fn output_csv_has_header_and_one_line_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_sources(dir.path(), WEEKLY_CSV);
    let run = run_pipeline(&config).unwrap();

    let mut out = Vec::new();
    write_records_csv(&mut out, &run.records).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), run.records.len() + 1);
    assert!(lines[0].starts_with("grouping_id,role,fund_code,name,asset_type,period_length_yrs"));
    assert!(lines.iter().any(|l| l.starts_with("0,bench,B1,Index One,,1,2022-12-30,2023-12-29,4.8,2.5")));
}

#[test]
fn bad_weekly_header_fails_before_other_sources_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let weekly = WEEKLY_CSV.replace(",,,,2023/12/29,,2023/12/29,", ",,,,2023/12/22,,2023/12/29,");
    fs::write(dir.path().join("weekly.csv"), weekly).unwrap();
    let config = PipelineConfig::new(dir.path().join("weekly.csv"))
        .with_historical_path(dir.path().join("missing.csv"))
        .with_metadata_path(dir.path().join("missing.xlsx"));

    let err = run_pipeline(&config).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_STRUCTURE);
}

#[test]
fn missing_historical_file_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_sources(dir.path(), WEEKLY_CSV).with_historical_path(dir.path().join("nope.csv"));

    let err = run_pipeline(&config).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_INPUT);
    assert!(err.message().contains("nope.csv"));
}
