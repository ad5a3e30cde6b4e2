//! Spectral model implementations.
//!
//! Models are plain data (kind + parameters) so that fitting code can stay
//! generic and results can be serialized as-is.

pub mod parameter;
pub mod spectral;

pub use parameter::*;
pub use spectral::*;
