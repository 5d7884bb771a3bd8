//! Command-line parsing.
//!
//! The only input is the weekly export; the historical and metadata sources
//! are read from their default locations (see `PipelineConfig`).

use std::path::PathBuf;

use clap::Parser;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "fundperf",
    version,
    about = "Merge weekly and historical fund performance exports into one tidy CSV"
)]
pub struct Cli {
    /// Weekly performance export (.xlsx, or delimited text with the same layout).
    #[arg(value_name = "WEEKLY")]
    pub weekly: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_path_is_positional() {
        let cli = Cli::try_parse_from(["fundperf", "weekly.xlsx"]).unwrap();
        assert_eq!(cli.weekly, PathBuf::from("weekly.xlsx"));
    }

    #[test]
    fn missing_weekly_path_is_a_usage_error() {
        let err = Cli::try_parse_from(["fundperf"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn no_other_flags_are_accepted() {
        assert!(Cli::try_parse_from(["fundperf", "weekly.xlsx", "--metadata", "m.xlsx"]).is_err());
    }
}
