//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the long-format `Observation` produced by both parsers
//! - the pivoted/wide tables built by the merger
//! - exploded metadata rows (`RoleRow`) and the final `CombinedRecord`
//! - run configuration (`PipelineConfig`)

pub mod types;

pub use types::*;
