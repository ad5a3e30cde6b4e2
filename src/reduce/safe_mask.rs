use tracing::debug;

use crate::dataset::SpectrumDataset;
use crate::domain::{ObservationRecord, SafeMaskConfig, SafeMaskMethod};
use crate::error::AppError;
use crate::geom::CircleRegion;

/// Relative slack when comparing bin edges with thresholds.
const EDGE_RTOL: f64 = 1e-6;

/// Restricts a dataset to the energy range where the response is trusted.
#[derive(Debug, Clone)]
pub struct SafeMaskMaker {
    pub methods: Vec<SafeMaskMethod>,
    pub aeff_percent: f64,
    pub offset_max_deg: f64,
}

impl SafeMaskMaker {
    pub fn from_config(config: &SafeMaskConfig) -> Self {
        Self {
            methods: config.methods.clone(),
            aeff_percent: config.aeff_percent,
            offset_max_deg: config.offset_max_deg,
        }
    }

    /// Safe reco bins according to one policy.
    fn method_mask(
        &self,
        method: SafeMaskMethod,
        dataset: &SpectrumDataset,
        obs: &ObservationRecord,
        on_region: &CircleRegion,
    ) -> Vec<bool> {
        let axis = &dataset.energy_axis;
        let aeff = &obs.irf.aeff;
        let edges = |lo_thr: Option<f64>, hi_thr: Option<f64>| -> Vec<bool> {
            (0..axis.nbin())
                .map(|i| {
                    let lo_ok = lo_thr.is_none_or(|t| axis.lo(i) >= t * (1.0 - EDGE_RTOL));
                    let hi_ok = hi_thr.is_none_or(|t| axis.hi(i) <= t * (1.0 + EDGE_RTOL));
                    lo_ok && hi_ok
                })
                .collect()
        };

        match method {
            SafeMaskMethod::AeffDefault => edges(aeff.threshold_lo_tev, aeff.threshold_hi_tev),
            SafeMaskMethod::AeffMax => match aeff.energy_at_fraction_of_max(self.aeff_percent / 100.0) {
                Some(threshold) => edges(Some(threshold), None),
                None => vec![false; axis.nbin()],
            },
            SafeMaskMethod::OffsetMax => {
                let offset = obs.pointing.separation_deg(&on_region.center);
                vec![offset <= self.offset_max_deg; axis.nbin()]
            }
        }
    }

    pub fn run(
        &self,
        mut dataset: SpectrumDataset,
        obs: &ObservationRecord,
        on_region: &CircleRegion,
    ) -> Result<SpectrumDataset, AppError> {
        for method in &self.methods {
            let mask = self.method_mask(*method, &dataset, obs, on_region);
            for (m, keep) in dataset.mask_safe.iter_mut().zip(mask) {
                *m = *m && keep;
            }
        }

        match dataset.energy_range_safe() {
            Some((lo, hi)) => {
                debug!(obs_id = obs.obs_id, e_min_tev = lo, e_max_tev = hi, "safe energy range");
                Ok(dataset)
            }
            None => Err(AppError::DegenerateObservation {
                obs_id: obs.obs_id,
                reason: "safe energy range is empty".to_string(),
            }),
        }
    }
}
