//! Spectral fitting.
//!
//! - `fitter`: maximum-likelihood fit of one model, with convergence status
//! - `comparison`: nested-model likelihood-ratio tests and hypothesis choice
//! - `flux_points`: per-bin norms of the accepted model

pub mod comparison;
pub mod fitter;
pub mod flux_points;

pub use comparison::*;
pub use fitter::*;
pub use flux_points::*;
