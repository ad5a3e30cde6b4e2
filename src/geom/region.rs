//! Circular sky regions and exclusion masks.

use serde::{Deserialize, Serialize};

use crate::domain::SkyCoord;
use crate::geom::EnergyAxis;

/// A circle on the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleRegion {
    pub center: SkyCoord,
    pub radius_deg: f64,
}

impl CircleRegion {
    pub fn new(center: SkyCoord, radius_deg: f64) -> Self {
        Self { center, radius_deg }
    }

    pub fn contains(&self, coord: &SkyCoord) -> bool {
        self.center.separation_deg(coord) <= self.radius_deg
    }

    /// True if the two circles share any area.
    pub fn overlaps(&self, other: &CircleRegion) -> bool {
        self.center.separation_deg(&other.center) < self.radius_deg + other.radius_deg
    }

    /// Solid angle of the spherical cap in steradians.
    pub fn solid_angle_sr(&self) -> f64 {
        2.0 * std::f64::consts::PI * (1.0 - self.radius_deg.to_radians().cos())
    }
}

/// Sky areas that must not be used for background estimation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionMask {
    pub regions: Vec<CircleRegion>,
}

impl ExclusionMask {
    pub fn new(regions: Vec<CircleRegion>) -> Self {
        Self { regions }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn excludes(&self, region: &CircleRegion) -> bool {
        self.regions.iter().any(|r| r.overlaps(region))
    }

    pub fn is_excluded(&self, coord: &SkyCoord) -> bool {
        self.regions.iter().any(|r| r.contains(coord))
    }
}

/// Target geometry of a 1D spectral extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumGeom {
    pub on_region: CircleRegion,
    /// Reconstructed energy.
    pub energy_axis: EnergyAxis,
    pub energy_axis_true: EnergyAxis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_strict() {
        let a = CircleRegion::new(SkyCoord::new(10.0, 0.0), 0.5);
        let b = CircleRegion::new(SkyCoord::new(11.0, 0.0), 0.5);
        let c = CircleRegion::new(SkyCoord::new(10.9, 0.0), 0.5);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(a.contains(&SkyCoord::new(10.2, 0.2)));
    }

    #[test]
    fn small_cap_solid_angle_matches_flat_disk() {
        let r = CircleRegion::new(SkyCoord::new(0.0, 0.0), 0.1);
        let flat = std::f64::consts::PI * 0.1f64.to_radians().powi(2);
        assert!((r.solid_angle_sr() - flat).abs() / flat < 1e-5);
    }

    #[test]
    fn exclusion_mask_checks_every_region() {
        let mask = ExclusionMask::new(vec![
            CircleRegion::new(SkyCoord::new(0.0, 0.0), 0.3),
            CircleRegion::new(SkyCoord::new(5.0, 0.0), 0.3),
        ]);
        assert!(mask.is_excluded(&SkyCoord::new(5.1, 0.0)));
        assert!(!mask.is_excluded(&SkyCoord::new(2.5, 0.0)));
        assert!(mask.excludes(&CircleRegion::new(SkyCoord::new(0.5, 0.0), 0.3)));
        assert!(!ExclusionMask::default().excludes(&CircleRegion::new(SkyCoord::new(0.0, 0.0), 1.0)));
    }
}
