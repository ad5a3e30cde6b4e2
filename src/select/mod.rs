//! Observation selection.
//!
//! Selection works on anything that exposes observation metadata, so the
//! same criteria apply to catalog rows (before any event file is read) and
//! to fully loaded observations.

use tracing::info;

use crate::domain::{AnalysisConfig, ObservationRecord, SkyCoord, TimeRange};
use crate::error::AppError;

/// Metadata the selector needs from an observation.
pub trait PointedObservation {
    fn obs_id(&self) -> u32;
    fn pointing(&self) -> SkyCoord;
    fn time_range(&self) -> TimeRange;
    fn zenith_deg(&self) -> f64;
    fn livetime_s(&self) -> f64;
}

impl PointedObservation for ObservationRecord {
    fn obs_id(&self) -> u32 {
        self.obs_id
    }

    fn pointing(&self) -> SkyCoord {
        self.pointing
    }

    fn time_range(&self) -> TimeRange {
        self.time
    }

    fn zenith_deg(&self) -> f64 {
        self.zenith_deg
    }

    fn livetime_s(&self) -> f64 {
        self.livetime_s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub center: SkyCoord,
    /// Maximum pointing distance from `center` (inclusive).
    pub radius_deg: f64,
    pub time: Option<TimeRange>,
    pub max_zenith_deg: Option<f64>,
    pub min_livetime_s: Option<f64>,
}

impl SelectionCriteria {
    pub fn cone(center: SkyCoord, radius_deg: f64) -> Self {
        Self {
            center,
            radius_deg,
            time: None,
            max_zenith_deg: None,
            min_livetime_s: None,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AppError> {
        let sel = &config.selection;
        Ok(Self {
            center: sel.target,
            radius_deg: sel.radius_deg,
            time: config.time_filter()?,
            max_zenith_deg: sel.max_zenith_deg,
            min_livetime_s: sel.min_livetime_s,
        })
    }

    pub fn matches<T: PointedObservation>(&self, obs: &T) -> bool {
        if self.center.separation_deg(&obs.pointing()) > self.radius_deg {
            return false;
        }
        if let Some(window) = &self.time {
            if !window.overlaps(&obs.time_range()) {
                return false;
            }
        }
        if let Some(max_zenith) = self.max_zenith_deg {
            if obs.zenith_deg() > max_zenith {
                return false;
            }
        }
        if let Some(min_livetime) = self.min_livetime_s {
            if obs.livetime_s() < min_livetime {
                return false;
            }
        }
        true
    }
}

/// Selected observations, in catalog order.
#[derive(Debug, Clone)]
pub struct Selection<'a, T> {
    items: Vec<&'a T>,
}

impl<'a, T: PointedObservation> Selection<'a, T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.items.iter().copied()
    }

    pub fn obs_ids(&self) -> Vec<u32> {
        self.items.iter().map(|o| o.obs_id()).collect()
    }

    pub fn total_livetime_s(&self) -> f64 {
        self.items.iter().map(|o| o.livetime_s()).sum()
    }
}

/// Observations matching `criteria`. An empty result is not an error.
pub fn select_observations<'a, T: PointedObservation>(
    items: &'a [T],
    criteria: &SelectionCriteria,
) -> Selection<'a, T> {
    let selected: Vec<&T> = items.iter().filter(|o| criteria.matches(*o)).collect();
    info!(
        candidates = items.len(),
        selected = selected.len(),
        radius_deg = criteria.radius_deg,
        "observation selection"
    );
    Selection { items: selected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    struct Meta {
        id: u32,
        pointing: SkyCoord,
        start: DateTime<Utc>,
        zenith: f64,
    }

    impl PointedObservation for Meta {
        fn obs_id(&self) -> u32 {
            self.id
        }
        fn pointing(&self) -> SkyCoord {
            self.pointing
        }
        fn time_range(&self) -> TimeRange {
            TimeRange::new(self.start, self.start + chrono::Duration::minutes(28)).unwrap()
        }
        fn zenith_deg(&self) -> f64 {
            self.zenith
        }
        fn livetime_s(&self) -> f64 {
            1600.0
        }
    }

    fn catalog() -> Vec<Meta> {
        let day = |d| Utc.with_ymd_and_hms(2004, 12, d, 22, 0, 0).unwrap();
        vec![
            Meta { id: 1, pointing: SkyCoord::new(83.6, 22.5), start: day(1), zenith: 45.0 },
            Meta { id: 2, pointing: SkyCoord::new(83.6, 24.0), start: day(2), zenith: 30.0 },
            Meta { id: 3, pointing: SkyCoord::new(120.0, -10.0), start: day(3), zenith: 20.0 },
            Meta { id: 4, pointing: SkyCoord::new(84.1, 22.0), start: day(4), zenith: 60.0 },
        ]
    }

    #[test]
    fn cone_selection_preserves_catalog_order() {
        let cat = catalog();
        let crit = SelectionCriteria::cone(SkyCoord::new(83.633, 22.014), 3.0);
        assert_eq!(select_observations(&cat, &crit).obs_ids(), vec![1, 2, 4]);
    }

    #[test]
    fn time_and_quality_cuts_apply() {
        let cat = catalog();
        let mut crit = SelectionCriteria::cone(SkyCoord::new(83.633, 22.014), 3.0);
        crit.time = Some(
            TimeRange::new(
                Utc.with_ymd_and_hms(2004, 12, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2004, 12, 5, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        );
        assert_eq!(select_observations(&cat, &crit).obs_ids(), vec![2, 4]);
        crit.max_zenith_deg = Some(50.0);
        assert_eq!(select_observations(&cat, &crit).obs_ids(), vec![2]);
    }

    #[test]
    fn empty_selection_is_a_value() {
        let cat = catalog();
        let crit = SelectionCriteria::cone(SkyCoord::new(0.0, -80.0), 1.0);
        let sel = select_observations(&cat, &crit);
        assert!(sel.is_empty());
        assert_eq!(sel.total_livetime_s(), 0.0);
    }
}
