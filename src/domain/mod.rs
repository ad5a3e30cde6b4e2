//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sky positions, time ranges, events and instrument responses
//! - observation records as loaded from the catalog
//! - configuration enums (`ModelKind`, `SafeMaskMethod`, `FitMode`)
//! - the analysis configuration (`AnalysisConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
