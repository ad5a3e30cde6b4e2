//! Flux points: per-bin normalisation of a fitted spectral shape.
//!
//! The best-fit model fixes the spectral shape. In each flux-point energy bin
//! only a norm factor on the predicted signal is free, and its likelihood
//! profile gives
//!
//! - the best norm (golden-section search on `[0, norm_max]`)
//! - asymmetric errors where the statistic rises by `n_sigma²`
//! - an upper limit where it rises by `n_sigma_ul²`
//! - TS against zero norm
//!
//! Bins are independent and are estimated in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::SpectrumDataset;
use crate::domain::FluxPointsConfig;
use crate::error::AppError;
use crate::fit::fitter::FitResult;
use crate::math::{bisect, golden_section_min};
use crate::models::SpectralModel;
use crate::stats::{cash, wstat};

const NORM_TOL: f64 = 1e-8;
const MAX_ITER: usize = 200;

/// One row of the flux-point table. Field names are the CSV columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxPoint {
    pub e_ref: f64,
    pub e_min: f64,
    pub e_max: f64,
    pub norm: f64,
    pub norm_err: f64,
    pub norm_errn: f64,
    pub norm_errp: f64,
    pub norm_ul: f64,
    pub dnde: f64,
    pub dnde_err: f64,
    pub dnde_ul: f64,
    pub ts: f64,
    pub sqrt_ts: f64,
    pub is_ul: bool,
    pub counts: f64,
    pub npred: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluxPoints {
    /// Model the norms refer to.
    pub reference_model: SpectralModel,
    pub points: Vec<FluxPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluxPointsEstimator {
    pub energy_edges: Vec<f64>,
    pub n_sigma: f64,
    pub n_sigma_ul: f64,
    pub ul_sqrt_ts_threshold: f64,
    pub norm_max: f64,
}

impl FluxPointsEstimator {
    pub fn from_config(config: &FluxPointsConfig) -> Result<Self, AppError> {
        Ok(Self {
            energy_edges: config.edges()?,
            n_sigma: config.n_sigma,
            n_sigma_ul: config.n_sigma_ul,
            ul_sqrt_ts_threshold: config.ul_sqrt_ts_threshold,
            norm_max: config.norm_max,
        })
    }

    /// Estimate flux points on `dataset` from a successful fit made on it.
    pub fn run(&self, dataset: &SpectrumDataset, fit: &FitResult) -> Result<FluxPoints, AppError> {
        fit.ensure_converged()?;
        if fit.dataset_fingerprint != dataset.fingerprint() {
            return Err(AppError::invalid(format!(
                "fit was made on {}, not on {}",
                fit.dataset_name, dataset.name
            )));
        }
        if self.energy_edges.len() < 2 {
            return Err(AppError::invalid("flux points need at least two energy edges"));
        }

        let npred_ref = dataset.npred_signal(&fit.model);
        let bins: Vec<(f64, f64)> = self.energy_edges.windows(2).map(|w| (w[0], w[1])).collect();
        let points: Vec<FluxPoint> = bins
            .par_iter()
            .filter_map(|&(e_min, e_max)| self.estimate_bin(dataset, &fit.model, &npred_ref, e_min, e_max))
            .collect();

        info!(
            model = fit.model.name(),
            bins = bins.len(),
            points = points.len(),
            upper_limits = points.iter().filter(|p| p.is_ul).count(),
            "flux points estimated"
        );

        Ok(FluxPoints {
            reference_model: fit.model.clone(),
            points,
        })
    }

    fn estimate_bin(
        &self,
        dataset: &SpectrumDataset,
        model: &SpectralModel,
        npred_ref: &[f64],
        e_min: f64,
        e_max: f64,
    ) -> Option<FluxPoint> {
        let axis = &dataset.energy_axis;
        let bins: Vec<usize> = (0..dataset.nbin())
            .filter(|&i| dataset.mask_safe[i])
            .filter(|&i| {
                let c = (axis.lo(i) * axis.hi(i)).sqrt();
                c >= e_min && c < e_max
            })
            .collect();
        if bins.is_empty() {
            debug!(e_min, e_max, "no safe bins in flux point range");
            return None;
        }

        let alpha = dataset.alpha();
        let stat = |norm: f64| -> f64 {
            bins.iter()
                .map(|&i| {
                    let mu = norm * npred_ref[i];
                    match &dataset.counts_off {
                        Some(off) => wstat(dataset.counts[i], off[i], alpha[i], mu),
                        None => cash(dataset.counts[i], mu),
                    }
                })
                .sum()
        };

        let (norm, stat_best) = golden_section_min(&stat, 0.0, self.norm_max, NORM_TOL, MAX_ITER);
        let ts = (stat(0.0) - stat_best).max(0.0);
        let sqrt_ts = ts.sqrt();

        let crossing = |delta: f64, lo: f64, hi: f64| bisect(|n| stat(n) - stat_best - delta, lo, hi, NORM_TOL, MAX_ITER);
        let errp_at = crossing(self.n_sigma.powi(2), norm, self.norm_max);
        let errn_at = crossing(self.n_sigma.powi(2), 0.0, norm).unwrap_or(0.0);
        let norm_errp = errp_at.map_or(f64::NAN, |n| n - norm);
        let norm_errn = norm - errn_at;
        let norm_err = 0.5 * (norm_errp + norm_errn);
        let norm_ul = crossing(self.n_sigma_ul.powi(2), norm, self.norm_max).unwrap_or(f64::NAN);

        let e_ref = (e_min * e_max).sqrt();
        let dnde_ref = model.evaluate(e_ref);

        Some(FluxPoint {
            e_ref,
            e_min,
            e_max,
            norm,
            norm_err,
            norm_errn,
            norm_errp,
            norm_ul,
            dnde: norm * dnde_ref,
            dnde_err: norm_err * dnde_ref,
            dnde_ul: norm_ul * dnde_ref,
            ts,
            sqrt_ts,
            is_ul: sqrt_ts < self.ul_sqrt_ts_threshold,
            counts: bins.iter().map(|&i| dataset.counts[i]).sum(),
            npred: bins.iter().map(|&i| norm * npred_ref[i]).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::asimov_dataset;
    use crate::domain::ModelKind;
    use crate::fit::Fitter;

    fn estimator() -> FluxPointsEstimator {
        FluxPointsEstimator {
            energy_edges: vec![1.0, 3.0, 10.0, 30.0, 100.0],
            n_sigma: 1.0,
            n_sigma_ul: 2.0,
            ul_sqrt_ts_threshold: 2.0,
            norm_max: 100.0,
        }
    }

    fn fitted() -> (SpectrumDataset, FitResult) {
        let truth = SpectralModel::power_law(2.3, 4e-11, 1.0);
        let ds = asimov_dataset("fp", &truth);
        let fit = Fitter::default().run(&ds, &mut SpectralModel::new(ModelKind::PowerLaw));
        (ds, fit)
    }

    #[test]
    fn norms_are_one_when_data_follows_the_model() {
        let (ds, fit) = fitted();
        let fp = estimator().run(&ds, &fit).unwrap();
        assert_eq!(fp.points.len(), 4);
        for p in fp.points.iter().filter(|p| !p.is_ul) {
            assert!((p.norm - 1.0).abs() < 1e-2, "norm {} at {}", p.norm, p.e_ref);
            assert!(p.norm_errn > 0.0 && p.norm_errp > 0.0);
            assert!(p.norm_ul > p.norm);
            assert!((p.dnde / fit.model.evaluate(p.e_ref) - p.norm).abs() < 1e-9);
        }
        assert!(fp.points[0].sqrt_ts > 2.0);
    }

    #[test]
    fn estimation_is_repeatable() {
        let (ds, fit) = fitted();
        let a = estimator().run(&ds, &fit).unwrap();
        let b = estimator().run(&ds, &fit).unwrap();
        // Debug output compares NaN fields equal too.
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn masked_range_yields_no_point() {
        let (mut ds, _) = fitted();
        let n = ds.nbin();
        ds.mask_safe = (0..n).map(|i| i < n / 2).collect();
        let fit = Fitter::default().run(&ds, &mut SpectralModel::new(ModelKind::PowerLaw));
        let fp = estimator().run(&ds, &fit).unwrap();
        assert!(fp.points.iter().all(|p| p.e_max <= 10.0 + 1e-9));
    }

    #[test]
    fn empty_bin_is_an_upper_limit() {
        let (mut ds, _) = fitted();
        let last = ds.nbin() - 1;
        ds.counts[last] = ds.background()[last];
        let fit = Fitter::default().run(&ds, &mut SpectralModel::new(ModelKind::PowerLaw));
        let est = FluxPointsEstimator {
            energy_edges: vec![ds.energy_axis.lo(last), ds.energy_axis.hi(last)],
            ..estimator()
        };
        let fp = est.run(&ds, &fit).unwrap();
        assert_eq!(fp.points.len(), 1);
        assert!(fp.points[0].is_ul);
        assert!(fp.points[0].norm_ul.is_finite() && fp.points[0].norm_ul > 0.0);
    }

    #[test]
    fn refuses_a_fit_from_another_dataset() {
        let (_, fit) = fitted();
        let other = asimov_dataset("other", &SpectralModel::power_law(2.0, 1e-11, 1.0));
        assert!(matches!(estimator().run(&other, &fit), Err(AppError::InvalidInput(_))));
    }
}
