//! Reshape and merge, on polars frames.
//!
//! - `pivot`: union of the long tables, pivot to wide, projection
//! - `join`: outer join with metadata + required-field filter
//! - `frame`: domain table <-> frame conversions

pub mod frame;
pub mod join;
pub mod pivot;

pub use join::{filter_required, join_and_filter, outer_join};
pub use pivot::{melt, merge_datasets, pivot, project};
