//! Energy binning.
//!
//! All energies are in TeV. Bins are `[lo, hi)` and centers are geometric
//! means, which is what log-spaced spectral binning expects.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::invalid(format!(
            "invalid energy range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(AppError::invalid("energy axis needs at least one bin"));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints so axes built from the same range compare equal.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EnergyAxis {
    edges: Vec<f64>,
}

impl TryFrom<Vec<f64>> for EnergyAxis {
    type Error = AppError;

    fn try_from(edges: Vec<f64>) -> Result<Self, Self::Error> {
        EnergyAxis::from_edges(edges)
    }
}

impl From<EnergyAxis> for Vec<f64> {
    fn from(axis: EnergyAxis) -> Self {
        axis.edges
    }
}

impl EnergyAxis {
    pub fn from_edges(edges: Vec<f64>) -> Result<Self, AppError> {
        if edges.len() < 2 {
            return Err(AppError::invalid("energy axis needs at least two edges"));
        }
        let valid = edges
            .windows(2)
            .all(|w| w[0].is_finite() && w[1].is_finite() && w[0] > 0.0 && w[1] > w[0]);
        if !valid {
            return Err(AppError::invalid(
                "energy axis edges must be finite, positive and strictly increasing",
            ));
        }
        Ok(Self { edges })
    }

    /// `nbin` log-spaced bins between `min` and `max`.
    pub fn log_spaced(min: f64, max: f64, nbin: usize) -> Result<Self, AppError> {
        Self::from_edges(log_space(min, max, nbin + 1)?)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn nbin(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn lo(&self, idx: usize) -> f64 {
        self.edges[idx]
    }

    pub fn hi(&self, idx: usize) -> f64 {
        self.edges[idx + 1]
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] * w[1]).sqrt()).collect()
    }

    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Bin holding `energy`, if any.
    pub fn bin_index(&self, energy: f64) -> Option<usize> {
        if !(energy >= self.min() && energy < self.max()) {
            return None;
        }
        Some(self.edges.partition_point(|&e| e <= energy) - 1)
    }

    /// Same binning up to floating point noise.
    pub fn is_compatible(&self, other: &EnergyAxis) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[v.len() - 1], 10.0);
        assert!((v[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bin_index_is_half_open() {
        let axis = EnergyAxis::from_edges(vec![1.0, 2.0, 4.0]).unwrap();
        assert_eq!(axis.bin_index(1.0), Some(0));
        assert_eq!(axis.bin_index(1.999), Some(0));
        assert_eq!(axis.bin_index(2.0), Some(1));
        assert_eq!(axis.bin_index(4.0), None);
        assert_eq!(axis.bin_index(0.5), None);
        assert_eq!(axis.bin_index(f64::NAN), None);
    }

    #[test]
    fn rejects_unsorted_edges() {
        assert!(EnergyAxis::from_edges(vec![1.0, 1.0, 2.0]).is_err());
        assert!(EnergyAxis::from_edges(vec![1.0]).is_err());
        assert!(EnergyAxis::log_spaced(1.0, 10.0, 0).is_err());
    }

    #[test]
    fn serializes_as_plain_edges() {
        let axis = EnergyAxis::log_spaced(1.0, 100.0, 2).unwrap();
        let json = serde_json::to_string(&axis).unwrap();
        let back: EnergyAxis = serde_json::from_str(&json).unwrap();
        assert!(axis.is_compatible(&back));
        assert!(serde_json::from_str::<EnergyAxis>("[2.0, 1.0]").is_err());
    }
}
