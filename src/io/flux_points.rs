//! Flux-point tables as CSV.
//!
//! One row per energy bin; the header is the field list of
//! [`FluxPoint`](crate::fit::FluxPoint). Missing errors and limits are
//! written as `NaN`.

use std::path::Path;

use crate::error::AppError;
use crate::fit::FluxPoint;

pub fn write_flux_points_csv(path: &Path, points: &[FluxPoint]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create flux-point CSV '{}': {e}", path.display())))?;
    for p in points {
        writer
            .serialize(p)
            .map_err(|e| AppError::io(format!("Failed to write flux-point row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write flux-point CSV: {e}")))?;
    Ok(())
}

pub fn read_flux_points_csv(path: &Path) -> Result<Vec<FluxPoint>, AppError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to open flux-point CSV '{}': {e}", path.display())))?;
    let mut out = Vec::new();
    for (i, row) in reader.deserialize::<FluxPoint>().enumerate() {
        // Line 1 is the header.
        let point = row.map_err(|e| AppError::invalid(format!("flux-point CSV line {}: {e}", i + 2)))?;
        out.push(point);
    }
    if out.is_empty() {
        return Err(AppError::invalid(format!("{} holds no flux points", path.display())));
    }
    Ok(out)
}
