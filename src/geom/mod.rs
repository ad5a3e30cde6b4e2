//! Geometry definitions: energy axes, sky regions, exclusion masks.

pub mod axis;
pub mod region;

pub use axis::*;
pub use region::*;
