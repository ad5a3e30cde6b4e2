//! Read/write dataset JSON files.
//!
//! A dataset file is the portable form of a reduced (usually stacked)
//! on/off spectrum: counts, off counts, acceptances, exposure, dispersion
//! matrix and safe mask, plus the model if one was fitted. It can be
//! reloaded with `vhe info` or by another analysis.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::SpectrumDataset;
use crate::error::AppError;

pub const DATASET_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub tool: String,
    pub format_version: u32,
    pub dataset: SpectrumDataset,
}

pub fn write_dataset_json(path: &Path, dataset: &SpectrumDataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create dataset JSON '{}': {e}", path.display())))?;
    let doc = DatasetFile {
        tool: "vhe".to_string(),
        format_version: DATASET_FORMAT_VERSION,
        dataset: dataset.clone(),
    };
    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::io(format!("Failed to write dataset JSON: {e}")))?;
    Ok(())
}

pub fn read_dataset_json(path: &Path) -> Result<SpectrumDataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open dataset JSON '{}': {e}", path.display())))?;
    let doc: DatasetFile =
        serde_json::from_reader(file).map_err(|e| AppError::invalid(format!("Invalid dataset JSON: {e}")))?;
    if doc.format_version != DATASET_FORMAT_VERSION {
        return Err(AppError::invalid(format!(
            "Unsupported dataset format version {} (expected {DATASET_FORMAT_VERSION})",
            doc.format_version
        )));
    }
    doc.dataset.validate()?;
    Ok(doc.dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::toy_dataset;
    use crate::models::SpectralModel;

    #[test]
    fn dataset_survives_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacked.json");
        let mut ds = toy_dataset("stacked", [50.0, 12.0], [20.0, 8.0], 0.5);
        ds.model = Some(SpectralModel::power_law(2.4, 3e-11, 1.0));

        write_dataset_json(&path, &ds).unwrap();
        let back = read_dataset_json(&path).unwrap();
        assert_eq!(back.fingerprint(), ds.fingerprint());
        assert_eq!(back.model, ds.model);
    }

    #[test]
    fn awkward_floats_reload_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("awkward.json");
        let axis = crate::geom::EnergyAxis::log_spaced(0.1, 40.0, 26).unwrap();
        let mut ds = crate::dataset::SpectrumDataset::empty("awkward", axis.clone(), axis);
        let n = ds.nbin();
        ds.exposure = (0..n).map(|i| 1.8e12 / 3.0 * (1.0 + 0.1 * i as f64).sqrt()).collect();
        ds.edisp = (0..n)
            .map(|j| (0..n).map(|i| ((i as f64 - j as f64) / 7.0).exp() / 3.0).collect())
            .collect();
        ds.counts_off = Some((0..n).map(|i| i as f64).collect());
        ds.acceptance_off = vec![1.0 / 0.3; n];

        write_dataset_json(&path, &ds).unwrap();
        let back = read_dataset_json(&path).unwrap();
        assert_eq!(back, ds);
        assert_eq!(back.fingerprint(), ds.fingerprint());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        let doc = DatasetFile {
            tool: "vhe".to_string(),
            format_version: 0,
            dataset: toy_dataset("x", [1.0, 1.0], [1.0, 1.0], 1.0),
        };
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        assert!(matches!(read_dataset_json(&path), Err(AppError::InvalidInput(_))));
    }
}
