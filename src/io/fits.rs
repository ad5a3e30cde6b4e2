//! Fit results export.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::fit::{FitResult, HypothesisSelection};

#[derive(Debug, Serialize)]
struct FitsFile<'a> {
    tool: &'a str,
    fits: &'a [FitResult],
    selection: Option<&'a HypothesisSelection>,
}

/// Write every hypothesis fit and the selection outcome as pretty JSON.
///
/// Non-finite numbers (e.g. an infinite significance) are written as `null`.
pub fn write_fits_json(
    path: &Path,
    fits: &[FitResult],
    selection: Option<&HypothesisSelection>,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create fits JSON '{}': {e}", path.display())))?;
    let doc = FitsFile {
        tool: "vhe",
        fits,
        selection,
    };
    serde_json::to_writer_pretty(file, &doc).map_err(|e| AppError::io(format!("Failed to write fits JSON: {e}")))?;
    Ok(())
}
