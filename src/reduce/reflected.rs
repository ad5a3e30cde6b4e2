//! Reflected-regions background estimation.
//!
//! Off regions are copies of the on region rotated around the pointing
//! position, so they sit at the same offset and see the same acceptance.

use std::f64::consts::TAU;

use tracing::debug;

use crate::dataset::SpectrumDataset;
use crate::domain::{BackgroundConfig, ObservationRecord, SkyCoord};
use crate::error::AppError;
use crate::geom::{CircleRegion, ExclusionMask};

/// Places off regions on the circle through the on region around the pointing.
#[derive(Debug, Clone)]
pub struct ReflectedRegionsFinder {
    /// Step (rad) after a candidate rejected by the exclusion mask.
    pub angle_increment: f64,
    /// Extra gap (rad) between neighbouring off regions.
    pub min_distance: f64,
    /// Extra gap (rad) between the on region and the first/last off region.
    pub min_distance_input: f64,
    pub max_region_number: usize,
    pub exclusion: ExclusionMask,
}

impl ReflectedRegionsFinder {
    pub fn from_config(config: &BackgroundConfig, exclusion: ExclusionMask) -> Self {
        Self {
            angle_increment: config.angle_increment_rad,
            min_distance: config.min_distance_rad,
            min_distance_input: config.min_distance_input_rad,
            max_region_number: config.max_region_number,
            exclusion,
        }
    }

    /// Off regions for `on` seen from `pointing`. Empty when none fit.
    pub fn run(&self, on: &CircleRegion, pointing: &SkyCoord) -> Vec<CircleRegion> {
        let offset = pointing.separation_deg(&on.center);
        if offset <= on.radius_deg || self.angle_increment <= 0.0 {
            return Vec::new();
        }

        // Position-angle span of the on region; neighbours at this spacing touch.
        let width = 2.0 * (on.radius_deg.to_radians().sin() / offset.to_radians().sin()).asin();
        let on_angle = pointing.position_angle_rad(&on.center);
        let mut angle = on_angle + width + self.min_distance_input;
        let end = on_angle + TAU - width - self.min_distance_input;

        let mut regions = Vec::new();
        while angle < end && regions.len() < self.max_region_number {
            let candidate = CircleRegion::new(pointing.offset_by(angle, offset), on.radius_deg);
            if self.exclusion.excludes(&candidate) {
                angle += self.angle_increment;
            } else {
                regions.push(candidate);
                angle += width + self.min_distance;
            }
        }
        regions
    }
}

/// Attaches off counts from reflected regions to a dataset.
#[derive(Debug, Clone)]
pub struct ReflectedRegionsBackgroundMaker {
    pub finder: ReflectedRegionsFinder,
}

impl ReflectedRegionsBackgroundMaker {
    pub fn new(finder: ReflectedRegionsFinder) -> Self {
        Self { finder }
    }

    pub fn run(
        &self,
        mut dataset: SpectrumDataset,
        obs: &ObservationRecord,
        on_region: &CircleRegion,
    ) -> Result<SpectrumDataset, AppError> {
        let regions = self.finder.run(on_region, &obs.pointing);
        if regions.is_empty() {
            let offset = obs.pointing.separation_deg(&on_region.center);
            let reason = if offset <= on_region.radius_deg {
                format!("pointing lies inside the on region (offset {offset:.3} deg)")
            } else {
                "no reflected region fits outside the exclusion mask".to_string()
            };
            return Err(AppError::BackgroundUnavailable {
                obs_id: obs.obs_id,
                reason,
            });
        }

        let axis = &dataset.energy_axis;
        let mut off = vec![0.0; axis.nbin()];
        for event in &obs.events {
            let coord = event.coord();
            if !regions.iter().any(|r| r.contains(&coord)) {
                continue;
            }
            if let Some(i) = axis.bin_index(event.energy_tev) {
                off[i] += 1.0;
            }
        }

        let omega_on = on_region.solid_angle_sr();
        let omega_off: f64 = regions.iter().map(|r| r.solid_angle_sr()).sum();
        let ratio = omega_off / omega_on;

        debug!(
            obs_id = obs.obs_id,
            n_regions = regions.len(),
            counts_off = off.iter().sum::<f64>(),
            "reflected regions background"
        );

        dataset.counts_off = Some(off);
        dataset.acceptance = vec![1.0; axis.nbin()];
        dataset.acceptance_off = vec![ratio; axis.nbin()];
        Ok(dataset)
    }
}
