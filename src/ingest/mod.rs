//! Source parsers.
//!
//! Each parser turns one export into the shared long/role representation:
//!
//! - `weekly`: multi-header spreadsheet -> long `Observation`s
//! - `historical`: flat CSV -> long `Observation`s
//! - `metadata`: grouping sheet -> `RoleRow`s
//!
//! `header` and `null_rules` hold the normalization applied at ingestion.

pub mod header;
pub mod historical;
pub mod metadata;
pub mod null_rules;
pub mod weekly;

pub use historical::{load_historical, read_historical};
pub use metadata::parse_metadata;
pub use null_rules::NullRules;
pub use weekly::parse_weekly;
