//! `fundperf` library crate.
//!
//! The binary (`fundperf`) is a thin wrapper around this library so that:
//!
//! - the reshape/merge pipeline is testable without spawning processes
//! - every stage can be driven from in-memory tables

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod io;
pub mod merge;
