//! Input/output helpers.
//!
//! - TOML analysis configuration (`config`)
//! - dataset JSON read/write (`dataset`)
//! - flux-point CSV read/write (`flux_points`)
//! - fit result JSON export (`fits`)
//!
//! The observation catalog lives in `data::catalog`.

pub mod config;
pub mod dataset;
pub mod fits;
pub mod flux_points;

pub use config::*;
pub use dataset::*;
pub use fits::*;
pub use flux_points::*;
