//! Input/output helpers.
//!
//! - spreadsheet / delimited-text loading into a cell grid (`sheet`)
//! - the final tidy CSV (`export`)

pub mod export;
pub mod sheet;

pub use export::*;
pub use sheet::*;
