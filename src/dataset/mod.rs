//! Spectrum datasets and their aggregation.
//!
//! - `spectrum`: the per-observation (or stacked) on/off dataset
//! - `stack`: stacking rules and the ordered `Datasets` collection

pub mod spectrum;
pub mod stack;

pub use spectrum::*;
pub use stack::*;

#[cfg(test)]
pub(crate) use spectrum::tests;
