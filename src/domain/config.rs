//! Analysis configuration.
//!
//! A run is described by an [`AnalysisConfig`], normally read from a TOML
//! file and then patched with CLI overrides. Every section has defaults so a
//! config file only needs the keys that differ (the defaults describe a
//! point-source analysis of the Crab Nebula).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FitMode, ModelKind, SafeMaskMethod, SkyCoord, TimeRange};
use crate::error::AppError;
use crate::geom::{CircleRegion, EnergyAxis, ExclusionMask, SpectrumGeom};

const CRAB: SkyCoord = SkyCoord {
    ra_deg: 83.633,
    dec_deg: 22.014,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub data: DataConfig,
    pub selection: SelectionConfig,
    pub geometry: GeometryConfig,
    pub background: BackgroundConfig,
    pub safe_mask: SafeMaskConfig,
    pub fit: FitSettings,
    pub flux_points: FluxPointsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Catalog directory holding `obs-index.csv`. Falls back to `$VHE_DATA`.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    pub target: SkyCoord,
    pub radius_deg: f64,
    pub tstart: Option<DateTime<Utc>>,
    pub tstop: Option<DateTime<Utc>>,
    pub max_zenith_deg: Option<f64>,
    pub min_livetime_s: Option<f64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            target: CRAB,
            radius_deg: 5.0,
            tstart: None,
            tstop: None,
            max_zenith_deg: None,
            min_livetime_s: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub radius_deg: f64,
}

impl RegionConfig {
    pub fn to_region(self) -> CircleRegion {
        CircleRegion::new(SkyCoord::new(self.ra_deg, self.dec_deg), self.radius_deg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub min_tev: f64,
    pub max_tev: f64,
    pub nbin: usize,
}

impl AxisConfig {
    pub fn to_axis(self) -> Result<EnergyAxis, AppError> {
        EnergyAxis::log_spaced(self.min_tev, self.max_tev, self.nbin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryConfig {
    pub on_region: RegionConfig,
    /// Reconstructed energy binning.
    pub energy: AxisConfig,
    /// True energy binning (exposure and dispersion).
    pub energy_true: AxisConfig,
    pub exclusions: Vec<RegionConfig>,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            on_region: RegionConfig {
                ra_deg: CRAB.ra_deg,
                dec_deg: CRAB.dec_deg,
                radius_deg: 0.11,
            },
            energy: AxisConfig {
                min_tev: 0.1,
                max_tev: 40.0,
                nbin: 26,
            },
            energy_true: AxisConfig {
                min_tev: 0.05,
                max_tev: 100.0,
                nbin: 66,
            },
            exclusions: Vec::new(),
        }
    }
}

impl GeometryConfig {
    pub fn spectrum_geom(&self) -> Result<SpectrumGeom, AppError> {
        Ok(SpectrumGeom {
            on_region: self.on_region.to_region(),
            energy_axis: self.energy.to_axis()?,
            energy_axis_true: self.energy_true.to_axis()?,
        })
    }

    pub fn exclusion_mask(&self) -> ExclusionMask {
        ExclusionMask::new(self.exclusions.iter().map(|r| r.to_region()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundConfig {
    pub angle_increment_rad: f64,
    pub min_distance_rad: f64,
    pub min_distance_input_rad: f64,
    pub max_region_number: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            angle_increment_rad: 0.1,
            min_distance_rad: 0.0,
            min_distance_input_rad: 0.1,
            max_region_number: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafeMaskConfig {
    pub methods: Vec<SafeMaskMethod>,
    pub aeff_percent: f64,
    pub offset_max_deg: f64,
}

impl Default for SafeMaskConfig {
    fn default() -> Self {
        Self {
            methods: vec![SafeMaskMethod::AeffDefault],
            aeff_percent: 10.0,
            offset_max_deg: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitSettings {
    /// Hypotheses in order of increasing complexity.
    pub hypotheses: Vec<ModelKind>,
    pub mode: FitMode,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Significance a nested alternative must reach to replace the accepted hypothesis.
    pub min_significance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            hypotheses: vec![ModelKind::PowerLaw, ModelKind::ExpCutoffPowerLaw],
            mode: FitMode::Stacked,
            max_iterations: 5000,
            tolerance: 1e-6,
            min_significance: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FluxPointsConfig {
    pub enabled: bool,
    /// Explicit bin edges (TeV). Takes precedence over `energy`.
    pub energy_edges_tev: Option<Vec<f64>>,
    pub energy: AxisConfig,
    pub n_sigma: f64,
    pub n_sigma_ul: f64,
    pub ul_sqrt_ts_threshold: f64,
    pub norm_max: f64,
}

impl Default for FluxPointsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_edges_tev: None,
            energy: AxisConfig {
                min_tev: 1.0,
                max_tev: 40.0,
                nbin: 8,
            },
            n_sigma: 1.0,
            n_sigma_ul: 2.0,
            ul_sqrt_ts_threshold: 2.0,
            norm_max: 100.0,
        }
    }
}

impl FluxPointsConfig {
    pub fn edges(&self) -> Result<Vec<f64>, AppError> {
        match &self.energy_edges_tev {
            Some(edges) => Ok(EnergyAxis::from_edges(edges.clone())?.edges().to_vec()),
            None => Ok(self.energy.to_axis()?.edges().to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dataset: Option<PathBuf>,
    pub flux_points: Option<PathBuf>,
    pub fits: Option<PathBuf>,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            flux_points: None,
            fits: None,
            plot: true,
            plot_width: 72,
            plot_height: 18,
        }
    }
}

impl AnalysisConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let sel = &self.selection;
        if !(sel.radius_deg.is_finite() && sel.radius_deg >= 0.0) {
            return Err(AppError::config("selection.radius_deg must be >= 0"));
        }
        self.time_filter()?;

        let on = &self.geometry.on_region;
        if !(on.radius_deg.is_finite() && on.radius_deg > 0.0) {
            return Err(AppError::config("geometry.on_region.radius_deg must be > 0"));
        }
        self.geometry
            .spectrum_geom()
            .map_err(|e| AppError::config(format!("geometry: {e}")))?;

        let bkg = &self.background;
        if !(bkg.angle_increment_rad.is_finite() && bkg.angle_increment_rad > 0.0) {
            return Err(AppError::config("background.angle_increment_rad must be > 0"));
        }
        if bkg.min_distance_rad < 0.0 || bkg.min_distance_input_rad < 0.0 {
            return Err(AppError::config("background distances must be >= 0"));
        }

        let safe = &self.safe_mask;
        if !(safe.aeff_percent > 0.0 && safe.aeff_percent <= 100.0) {
            return Err(AppError::config("safe_mask.aeff_percent must be in (0, 100]"));
        }

        let fit = &self.fit;
        if fit.hypotheses.is_empty() {
            return Err(AppError::config("fit.hypotheses must list at least one model"));
        }
        if fit.max_iterations == 0 || !(fit.tolerance > 0.0) {
            return Err(AppError::config("fit.max_iterations and fit.tolerance must be > 0"));
        }

        let fp = &self.flux_points;
        if !(fp.n_sigma > 0.0 && fp.n_sigma_ul > 0.0 && fp.norm_max > 1.0) {
            return Err(AppError::config(
                "flux_points.n_sigma, n_sigma_ul must be > 0 and norm_max > 1",
            ));
        }
        fp.edges()
            .map_err(|e| AppError::config(format!("flux_points: {e}")))?;

        Ok(())
    }

    /// The optional time window of the selection.
    pub fn time_filter(&self) -> Result<Option<TimeRange>, AppError> {
        match (self.selection.tstart, self.selection.tstop) {
            (None, None) => Ok(None),
            (Some(start), Some(stop)) => TimeRange::new(start, stop)
                .map(Some)
                .map_err(|e| AppError::config(format!("selection: {e}"))),
            _ => Err(AppError::config(
                "selection.tstart and selection.tstop must be given together",
            )),
        }
    }
}
