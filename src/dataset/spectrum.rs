//! 1D on/off spectrum dataset.
//!
//! Arrays along the reconstructed energy axis:
//!
//! - `counts`, `counts_off`, `acceptance`, `acceptance_off`, `mask_safe`
//!
//! Arrays along the true energy axis:
//!
//! - `exposure` (cm² s)
//! - `edisp` rows: probability of reconstructing each true bin in each reco bin

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geom::EnergyAxis;
use crate::models::SpectralModel;
use crate::stats::{WStatCountsStatistic, cash, wstat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDataset {
    pub name: String,
    pub obs_ids: Vec<u32>,
    pub energy_axis: EnergyAxis,
    pub energy_axis_true: EnergyAxis,
    pub counts: Vec<f64>,
    /// Off counts; `None` until a background estimate has been attached.
    #[serde(default)]
    pub counts_off: Option<Vec<f64>>,
    pub acceptance: Vec<f64>,
    pub acceptance_off: Vec<f64>,
    pub exposure: Vec<f64>,
    pub edisp: Vec<Vec<f64>>,
    pub mask_safe: Vec<bool>,
    pub livetime_s: f64,
    #[serde(default)]
    pub model: Option<SpectralModel>,
}

/// Summary of a dataset over its safe energy range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub n_obs: usize,
    pub counts: f64,
    pub counts_off: f64,
    pub background: f64,
    pub excess: f64,
    pub sqrt_ts: f64,
    pub alpha: f64,
    pub livetime_s: f64,
    pub n_safe_bins: usize,
}

/// Anything a spectral model can be fitted to.
pub trait FitStatistic {
    fn name(&self) -> String;
    /// Content hash; fits are only comparable on equal fingerprints.
    fn fingerprint(&self) -> u64;
    fn stat_sum(&self, model: &SpectralModel) -> f64;
}

impl SpectrumDataset {
    /// Empty dataset on the given axes, with everything safe.
    pub fn empty(name: &str, energy_axis: EnergyAxis, energy_axis_true: EnergyAxis) -> Self {
        let n = energy_axis.nbin();
        let n_true = energy_axis_true.nbin();
        Self {
            name: name.to_string(),
            obs_ids: Vec::new(),
            counts: vec![0.0; n],
            counts_off: None,
            acceptance: vec![1.0; n],
            acceptance_off: vec![1.0; n],
            exposure: vec![0.0; n_true],
            edisp: vec![vec![0.0; n]; n_true],
            mask_safe: vec![true; n],
            livetime_s: 0.0,
            model: None,
            energy_axis,
            energy_axis_true,
        }
    }

    /// Check array shapes against the axes.
    pub fn validate(&self) -> Result<(), AppError> {
        let n = self.energy_axis.nbin();
        let n_true = self.energy_axis_true.nbin();
        let reco_ok = self.counts.len() == n
            && self.acceptance.len() == n
            && self.acceptance_off.len() == n
            && self.mask_safe.len() == n
            && self.counts_off.as_ref().is_none_or(|off| off.len() == n);
        let true_ok = self.exposure.len() == n_true
            && self.edisp.len() == n_true
            && self.edisp.iter().all(|row| row.len() == n);
        if !(reco_ok && true_ok) {
            return Err(AppError::invalid(format!(
                "dataset {}: array shapes do not match its energy axes ({n} reco, {n_true} true bins)",
                self.name
            )));
        }
        Ok(())
    }

    pub fn nbin(&self) -> usize {
        self.energy_axis.nbin()
    }

    pub fn has_background(&self) -> bool {
        self.counts_off.is_some()
    }

    /// On/off exposure ratio per reco bin.
    pub fn alpha(&self) -> Vec<f64> {
        self.acceptance
            .iter()
            .zip(&self.acceptance_off)
            .map(|(a, a_off)| if *a_off > 0.0 { a / a_off } else { 0.0 })
            .collect()
    }

    /// Background estimate `alpha * counts_off`; zero without off counts.
    pub fn background(&self) -> Vec<f64> {
        match &self.counts_off {
            Some(off) => self.alpha().iter().zip(off).map(|(a, n)| a * n).collect(),
            None => vec![0.0; self.nbin()],
        }
    }

    pub fn excess(&self) -> Vec<f64> {
        self.counts
            .iter()
            .zip(self.background())
            .map(|(n, b)| n - b)
            .collect()
    }

    /// Predicted signal counts per reco bin for `model`.
    pub fn npred_signal(&self, model: &SpectralModel) -> Vec<f64> {
        let mut npred = vec![0.0; self.nbin()];
        for (j, (exposure, row)) in self.exposure.iter().zip(&self.edisp).enumerate() {
            if *exposure <= 0.0 {
                continue;
            }
            let flux = model.integral(self.energy_axis_true.lo(j), self.energy_axis_true.hi(j));
            let true_counts = flux * exposure;
            for (out, p) in npred.iter_mut().zip(row) {
                *out += true_counts * p;
            }
        }
        npred
    }

    /// Per-bin statistic, zero outside the safe mask.
    ///
    /// W statistic with off counts, Cash statistic against the predicted
    /// signal otherwise.
    pub fn stat_array(&self, model: &SpectralModel) -> Vec<f64> {
        self.stat_array_for(&self.npred_signal(model))
    }

    /// Per-bin statistic for a given predicted signal.
    pub fn stat_array_for(&self, mu_sig: &[f64]) -> Vec<f64> {
        let alpha = self.alpha();
        (0..self.nbin())
            .map(|i| {
                if !self.mask_safe[i] {
                    return 0.0;
                }
                match &self.counts_off {
                    Some(off) => wstat(self.counts[i], off[i], alpha[i], mu_sig[i]),
                    None => cash(self.counts[i], mu_sig[i]),
                }
            })
            .collect()
    }

    pub fn stat_sum(&self, model: &SpectralModel) -> f64 {
        self.stat_array(model).iter().sum()
    }

    pub fn n_safe_bins(&self) -> usize {
        self.mask_safe.iter().filter(|m| **m).count()
    }

    /// `(lo, hi)` of the safe reco energy range, if any bin is safe.
    pub fn energy_range_safe(&self) -> Option<(f64, f64)> {
        let first = self.mask_safe.iter().position(|m| *m)?;
        let last = self.mask_safe.iter().rposition(|m| *m)?;
        Some((self.energy_axis.lo(first), self.energy_axis.hi(last)))
    }

    /// Totals over the safe energy range.
    pub fn info(&self) -> DatasetInfo {
        let background = self.background();
        let off = self.counts_off.clone().unwrap_or_else(|| vec![0.0; self.nbin()]);

        let (mut n_on, mut n_off, mut bkg) = (0.0, 0.0, 0.0);
        for i in (0..self.nbin()).filter(|&i| self.mask_safe[i]) {
            n_on += self.counts[i];
            n_off += off[i];
            bkg += background[i];
        }

        let alpha = if n_off > 0.0 {
            bkg / n_off
        } else {
            mean_alpha(&self.alpha(), &self.mask_safe)
        };
        let sqrt_ts = if self.has_background() {
            WStatCountsStatistic::new(n_on, n_off, alpha).sqrt_ts()
        } else {
            0.0
        };

        DatasetInfo {
            name: self.name.clone(),
            n_obs: self.obs_ids.len(),
            counts: n_on,
            counts_off: n_off,
            background: bkg,
            excess: n_on - bkg,
            sqrt_ts,
            alpha,
            livetime_s: self.livetime_s,
            n_safe_bins: self.n_safe_bins(),
        }
    }

    /// Stable hash of everything the statistic depends on.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        let floats = |h: &mut DefaultHasher, v: &[f64]| {
            v.len().hash(h);
            for x in v {
                x.to_bits().hash(h);
            }
        };
        self.obs_ids.hash(&mut h);
        floats(&mut h, self.energy_axis.edges());
        floats(&mut h, self.energy_axis_true.edges());
        floats(&mut h, &self.counts);
        match &self.counts_off {
            Some(off) => floats(&mut h, off),
            None => 0u8.hash(&mut h),
        }
        floats(&mut h, &self.acceptance);
        floats(&mut h, &self.acceptance_off);
        floats(&mut h, &self.exposure);
        for row in &self.edisp {
            floats(&mut h, row);
        }
        self.mask_safe.hash(&mut h);
        h.finish()
    }
}

fn mean_alpha(alpha: &[f64], mask: &[bool]) -> f64 {
    let safe: Vec<f64> = alpha
        .iter()
        .zip(mask)
        .filter(|(_, m)| **m)
        .map(|(a, _)| *a)
        .collect();
    if safe.is_empty() {
        0.0
    } else {
        safe.iter().sum::<f64>() / safe.len() as f64
    }
}

impl FitStatistic for SpectrumDataset {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn fingerprint(&self) -> u64 {
        SpectrumDataset::fingerprint(self)
    }

    fn stat_sum(&self, model: &SpectralModel) -> f64 {
        SpectrumDataset::stat_sum(self, model)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two reco bins, two true bins, diagonal dispersion.
    pub(crate) fn toy_dataset(name: &str, counts: [f64; 2], off: [f64; 2], alpha: f64) -> SpectrumDataset {
        let axis = EnergyAxis::from_edges(vec![1.0, 3.0, 10.0]).unwrap();
        let mut ds = SpectrumDataset::empty(name, axis.clone(), axis);
        ds.counts = counts.to_vec();
        ds.counts_off = Some(off.to_vec());
        ds.acceptance_off = vec![1.0 / alpha; 2];
        ds.exposure = vec![1e10; 2];
        ds.edisp = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        ds.livetime_s = 1800.0;
        ds
    }

    /// Eight log bins from 1 to 100 TeV whose counts equal the prediction of
    /// `truth` on top of a flat background (off = 200, alpha = 0.2).
    pub(crate) fn asimov_dataset(name: &str, truth: &SpectralModel) -> SpectrumDataset {
        let axis = EnergyAxis::log_spaced(1.0, 100.0, 8).unwrap();
        let mut ds = SpectrumDataset::empty(name, axis.clone(), axis);
        let n = ds.nbin();
        ds.counts_off = Some(vec![200.0; n]);
        ds.acceptance_off = vec![5.0; n];
        ds.exposure = vec![1.8e12; n];
        ds.edisp = (0..n).map(|j| (0..n).map(|i| if i == j { 1.0 } else { 0.0 }).collect()).collect();
        ds.livetime_s = 1800.0;
        let npred = ds.npred_signal(truth);
        ds.counts = npred.iter().zip(ds.background()).map(|(s, b)| s + b).collect();
        ds
    }

    #[test]
    fn reflected_background_scenario() {
        let mut ds = toy_dataset("a", [100.0, 0.0], [400.0, 0.0], 0.25);
        ds.mask_safe = vec![true, false];
        let info = ds.info();
        assert!((info.background - 100.0).abs() < 1e-9);
        assert!(info.excess.abs() < 1e-9);
        assert!((info.alpha - 0.25).abs() < 1e-12);
    }

    #[test]
    fn npred_folds_flux_through_dispersion() {
        let ds = toy_dataset("a", [0.0, 0.0], [0.0, 0.0], 1.0);
        let model = SpectralModel::power_law(2.0, 1e-11, 1.0);
        let npred = ds.npred_signal(&model);
        let expected0 = model.integral(1.0, 3.0) * 1e10;
        assert!((npred[0] - expected0).abs() / expected0 < 1e-12);
        assert!(npred[1] > 0.0 && npred[1] < npred[0]);
    }

    #[test]
    fn masked_bins_do_not_contribute() {
        let mut ds = toy_dataset("a", [50.0, 20.0], [20.0, 20.0], 1.0);
        let model = SpectralModel::power_law(2.0, 1e-13, 1.0);
        let full = ds.stat_sum(&model);
        ds.mask_safe = vec![true, false];
        let stat = ds.stat_array(&model);
        assert_eq!(stat[1], 0.0);
        assert!(ds.stat_sum(&model) < full);
        assert_eq!(ds.energy_range_safe(), Some((1.0, 3.0)));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = toy_dataset("a", [5.0, 6.0], [1.0, 2.0], 0.5);
        let mut b = a.clone();
        b.name = "renamed".into();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.counts[0] += 1.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn shape_mismatch_is_invalid() {
        let mut ds = toy_dataset("a", [1.0, 1.0], [1.0, 1.0], 1.0);
        ds.validate().unwrap();
        ds.exposure.pop();
        assert!(ds.validate().is_err());
    }
}
