//! Collecting and stacking per-observation datasets.
//!
//! Stacking sums counts, off counts, background, exposure and livetime on
//! every bin (masked or not) and intersects the safe masks. With that rule
//! the result does not depend on the order or grouping of the inputs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::dataset::{DatasetInfo, FitStatistic, SpectrumDataset};
use crate::error::AppError;
use crate::models::SpectralModel;
use crate::stats::WStatCountsStatistic;

impl SpectrumDataset {
    /// Add `other` into `self`.
    pub fn stack(&mut self, other: &SpectrumDataset) -> Result<(), AppError> {
        if !self.energy_axis.is_compatible(&other.energy_axis)
            || !self.energy_axis_true.is_compatible(&other.energy_axis_true)
        {
            return Err(AppError::invalid(format!(
                "cannot stack {} onto {}: energy axes differ",
                other.name, self.name
            )));
        }
        if self.has_background() != other.has_background() {
            return Err(AppError::invalid(format!(
                "cannot stack {} onto {}: only one of them has off counts",
                other.name, self.name
            )));
        }

        let total_livetime = self.livetime_s + other.livetime_s;

        if let (Some(off_a), Some(off_b)) = (&self.counts_off, &other.counts_off) {
            let alpha_a = self.alpha();
            let alpha_b = other.alpha();
            let mut off = Vec::with_capacity(off_a.len());
            let mut acceptance_off = Vec::with_capacity(off_a.len());
            for i in 0..off_a.len() {
                let n_off = off_a[i] + off_b[i];
                let bkg = alpha_a[i] * off_a[i] + alpha_b[i] * off_b[i];
                let alpha = if n_off > 0.0 {
                    bkg / n_off
                } else if total_livetime > 0.0 {
                    (alpha_a[i] * self.livetime_s + alpha_b[i] * other.livetime_s) / total_livetime
                } else {
                    0.5 * (alpha_a[i] + alpha_b[i])
                };
                off.push(n_off);
                acceptance_off.push(if alpha > 0.0 { 1.0 / alpha } else { 0.0 });
            }
            self.counts_off = Some(off);
            self.acceptance = vec![1.0; acceptance_off.len()];
            self.acceptance_off = acceptance_off;
        }

        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }

        for j in 0..self.exposure.len() {
            let (ea, eb) = (self.exposure[j], other.exposure[j]);
            let total = ea + eb;
            if total > 0.0 {
                for (pa, pb) in self.edisp[j].iter_mut().zip(&other.edisp[j]) {
                    *pa = (*pa * ea + pb * eb) / total;
                }
            }
            self.exposure[j] = total;
        }

        for (a, b) in self.mask_safe.iter_mut().zip(&other.mask_safe) {
            *a = *a && *b;
        }

        self.livetime_s = total_livetime;
        self.obs_ids.extend_from_slice(&other.obs_ids);
        Ok(())
    }
}

/// Ordered collection of datasets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datasets {
    items: Vec<SpectrumDataset>,
}

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dataset: SpectrumDataset) {
        self.items.push(dataset);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpectrumDataset> {
        self.items.iter()
    }

    pub fn info_table(&self) -> Vec<DatasetInfo> {
        self.items.iter().map(|d| d.info()).collect()
    }

    /// Running totals: row `i` sums the safe-range info of datasets `0..=i`.
    ///
    /// Each dataset contributes over its own safe range, so a later dataset
    /// with a higher threshold never removes counts already accumulated.
    /// `n_safe_bins` counts the bins safe in every dataset so far.
    pub fn cumulative_info(&self) -> Result<Vec<DatasetInfo>, AppError> {
        let Some(first) = self.items.first() else {
            return Ok(Vec::new());
        };
        let with_background = self.items.iter().any(SpectrumDataset::has_background);
        let mut mask = vec![true; first.nbin()];
        let mut total = DatasetInfo {
            name: String::new(),
            n_obs: 0,
            counts: 0.0,
            counts_off: 0.0,
            background: 0.0,
            excess: 0.0,
            sqrt_ts: 0.0,
            alpha: 0.0,
            livetime_s: 0.0,
            n_safe_bins: 0,
        };
        let mut alpha_livetime = 0.0;

        let mut rows = Vec::with_capacity(self.items.len());
        for (i, ds) in self.items.iter().enumerate() {
            if !ds.energy_axis.is_compatible(&first.energy_axis) {
                return Err(AppError::invalid(format!(
                    "cannot accumulate {} with {}: energy axes differ",
                    ds.name, first.name
                )));
            }
            let info = ds.info();
            total.n_obs += info.n_obs;
            total.counts += info.counts;
            total.counts_off += info.counts_off;
            total.background += info.background;
            total.livetime_s += info.livetime_s;
            alpha_livetime += info.alpha * info.livetime_s;
            for (m, safe) in mask.iter_mut().zip(&ds.mask_safe) {
                *m &= *safe;
            }

            total.name = format!("stacked-{}", i + 1);
            total.excess = total.counts - total.background;
            total.alpha = if total.counts_off > 0.0 {
                total.background / total.counts_off
            } else if total.livetime_s > 0.0 {
                alpha_livetime / total.livetime_s
            } else {
                info.alpha
            };
            total.sqrt_ts = if with_background {
                WStatCountsStatistic::new(total.counts, total.counts_off, total.alpha).sqrt_ts()
            } else {
                0.0
            };
            total.n_safe_bins = mask.iter().filter(|m| **m).count();
            rows.push(total.clone());
        }
        Ok(rows)
    }

    /// Stack all members into one dataset named `name`. `None` when empty.
    pub fn stack_reduce(&self, name: &str) -> Result<Option<SpectrumDataset>, AppError> {
        let mut iter = self.items.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut stacked = first.clone();
        for ds in iter {
            stacked.stack(ds)?;
        }
        stacked.name = name.to_string();
        stacked.model = None;
        debug!(
            name,
            n_obs = stacked.obs_ids.len(),
            livetime_s = stacked.livetime_s,
            "stacked datasets"
        );
        Ok(Some(stacked))
    }

    /// Joint statistic: the sum of the member statistics.
    pub fn stat_sum(&self, model: &SpectralModel) -> f64 {
        self.items.iter().map(|d| d.stat_sum(model)).sum()
    }
}

impl FromIterator<SpectrumDataset> for Datasets {
    fn from_iter<I: IntoIterator<Item = SpectrumDataset>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Datasets {
    type Item = &'a SpectrumDataset;
    type IntoIter = std::slice::Iter<'a, SpectrumDataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FitStatistic for Datasets {
    fn name(&self) -> String {
        format!("joint ({} datasets)", self.items.len())
    }

    fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        for ds in &self.items {
            ds.fingerprint().hash(&mut h);
        }
        h.finish()
    }

    fn stat_sum(&self, model: &SpectralModel) -> f64 {
        Datasets::stat_sum(self, model)
    }
}
