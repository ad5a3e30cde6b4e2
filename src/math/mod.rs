//! Numerical utilities: minimizers, finite-difference Hessians, quadrature.

pub mod hessian;
pub mod quad;
pub mod scalar;
pub mod simplex;

pub use hessian::*;
pub use quad::*;
pub use scalar::*;
pub use simplex::*;
