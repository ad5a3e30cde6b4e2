//! Observation data sources.
//!
//! - `catalog`: on-disk observation index and per-observation JSON files
//! - `simulate`: seeded synthetic observations in the same format

pub mod catalog;
pub mod simulate;

pub use catalog::*;
pub use simulate::*;
