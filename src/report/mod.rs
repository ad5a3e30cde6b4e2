//! Run summaries and formatted terminal output.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::SkyCoord;
use crate::select::{PointedObservation, Selection, SelectionCriteria};

/// What the selector kept out of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSummary {
    pub target: SkyCoord,
    pub radius_deg: f64,
    pub candidates: usize,
    pub selected: Vec<u32>,
    pub total_livetime_s: f64,
    /// Catalog rows skipped while reading the index.
    pub skipped_rows: usize,
}

impl SelectionSummary {
    pub fn new<T: PointedObservation>(
        criteria: &SelectionCriteria,
        candidates: usize,
        selection: &Selection<'_, T>,
        skipped_rows: usize,
    ) -> Self {
        Self {
            target: criteria.center,
            radius_deg: criteria.radius_deg,
            candidates,
            selected: selection.obs_ids(),
            total_livetime_s: selection.total_livetime_s(),
            skipped_rows,
        }
    }
}
