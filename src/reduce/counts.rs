use tracing::debug;

use crate::dataset::SpectrumDataset;
use crate::domain::ObservationRecord;
use crate::error::AppError;
use crate::geom::SpectrumGeom;

/// m² → cm².
const M2_TO_CM2: f64 = 1e4;

/// Extracts on-region counts, exposure and energy dispersion.
#[derive(Debug, Clone)]
pub struct SpectrumDatasetMaker {
    pub geom: SpectrumGeom,
}

impl SpectrumDatasetMaker {
    pub fn new(geom: SpectrumGeom) -> Self {
        Self { geom }
    }

    pub fn run(&self, obs: &ObservationRecord) -> Result<SpectrumDataset, AppError> {
        let degenerate = |reason: String| AppError::DegenerateObservation {
            obs_id: obs.obs_id,
            reason,
        };

        let on = &self.geom.on_region;
        let offset = obs.pointing.separation_deg(&on.center);
        if offset > obs.irf.fov_radius_deg {
            return Err(degenerate(format!(
                "on region at {offset:.2} deg is outside the {:.2} deg field of view",
                obs.irf.fov_radius_deg
            )));
        }

        let axis = &self.geom.energy_axis;
        let axis_true = &self.geom.energy_axis_true;
        let mut dataset = SpectrumDataset::empty(
            &format!("obs-{}", obs.obs_id),
            axis.clone(),
            axis_true.clone(),
        );
        dataset.obs_ids = vec![obs.obs_id];
        dataset.livetime_s = obs.livetime_s;

        for event in obs.events.iter().filter(|e| on.contains(&e.coord())) {
            if let Some(i) = axis.bin_index(event.energy_tev) {
                dataset.counts[i] += 1.0;
            }
        }

        for (j, e_true) in axis_true.centers().into_iter().enumerate() {
            dataset.exposure[j] = obs.irf.aeff.evaluate(e_true) * M2_TO_CM2 * obs.livetime_s;
            for (i, p) in dataset.edisp[j].iter_mut().enumerate() {
                *p = obs.irf.edisp.probability(e_true, axis.lo(i), axis.hi(i));
            }
        }

        if dataset.exposure.iter().all(|e| *e <= 0.0) {
            return Err(degenerate("exposure is zero in every true energy bin".to_string()));
        }

        debug!(
            obs_id = obs.obs_id,
            offset_deg = offset,
            counts = dataset.counts.iter().sum::<f64>(),
            "extracted on-region spectrum"
        );
        Ok(dataset)
    }
}
