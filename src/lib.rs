//! `vhe-spectra` library crate.
//!
//! The binary (`vhe`) is a thin wrapper around this library so the whole
//! pipeline (selection, reduction, stacking, fitting, flux points) is
//! testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod fit;
pub mod geom;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod reduce;
pub mod report;
pub mod select;
pub mod stats;
pub mod telemetry;
