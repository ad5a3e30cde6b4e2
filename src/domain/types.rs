//! Shared domain types.
//!
//! These types are serializable so the same structs describe:
//!
//! - observations as stored on disk (one JSON document per observation)
//! - in-memory inputs to the reduction pipeline
//! - configuration enums selected from the CLI or the TOML config

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::error::AppError;

/// Spectral hypothesis family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    /// `dN/dE = A (E/E0)^-Γ`
    #[serde(rename = "pl")]
    #[value(name = "pl")]
    PowerLaw,
    /// `dN/dE = A (E/E0)^-Γ exp(-λE)`
    #[serde(rename = "ecpl")]
    #[value(name = "ecpl")]
    ExpCutoffPowerLaw,
    /// `dN/dE = A (E/E0)^(-α - β ln(E/E0))`
    #[serde(rename = "lp")]
    #[value(name = "lp")]
    LogParabola,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::PowerLaw => "PowerLaw",
            ModelKind::ExpCutoffPowerLaw => "ExpCutoffPowerLaw",
            ModelKind::LogParabola => "LogParabola",
        }
    }
}

/// Safe energy range policy applied per observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SafeMaskMethod {
    /// Use the thresholds stored with the effective area.
    AeffDefault,
    /// Low threshold where the effective area reaches a percentage of its maximum.
    AeffMax,
    /// Mask everything when the on-region sits beyond a maximum offset.
    OffsetMax,
}

/// Whether hypotheses are fitted to the stacked dataset or jointly to all datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    Stacked,
    Joint,
}

/// Equatorial sky position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyCoord {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self { ra_deg, dec_deg }
    }

    pub fn is_finite(&self) -> bool {
        self.ra_deg.is_finite() && self.dec_deg.is_finite()
    }

    /// Great-circle distance in degrees (haversine).
    pub fn separation_deg(&self, other: &SkyCoord) -> f64 {
        let dec1 = self.dec_deg.to_radians();
        let dec2 = other.dec_deg.to_radians();
        let d_ra = (other.ra_deg - self.ra_deg).to_radians();
        let d_dec = dec2 - dec1;

        let a = (d_dec / 2.0).sin().powi(2) + dec1.cos() * dec2.cos() * (d_ra / 2.0).sin().powi(2);
        (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
    }

    /// Position angle (radians, east of north) of `other` as seen from `self`.
    pub fn position_angle_rad(&self, other: &SkyCoord) -> f64 {
        let dec1 = self.dec_deg.to_radians();
        let dec2 = other.dec_deg.to_radians();
        let d_ra = (other.ra_deg - self.ra_deg).to_radians();

        let y = d_ra.sin() * dec2.cos();
        let x = dec1.cos() * dec2.sin() - dec1.sin() * dec2.cos() * d_ra.cos();
        y.atan2(x)
    }

    /// Point reached by moving `separation_deg` along position angle `pa_rad`.
    pub fn offset_by(&self, pa_rad: f64, separation_deg: f64) -> SkyCoord {
        let dec1 = self.dec_deg.to_radians();
        let d = separation_deg.to_radians();

        let sin_dec2 = dec1.sin() * d.cos() + dec1.cos() * d.sin() * pa_rad.cos();
        let dec2 = sin_dec2.clamp(-1.0, 1.0).asin();
        let d_ra = (pa_rad.sin() * d.sin() * dec1.cos()).atan2(d.cos() - dec1.sin() * sin_dec2);

        SkyCoord {
            ra_deg: (self.ra_deg + d_ra.to_degrees()).rem_euclid(360.0),
            dec_deg: dec2.to_degrees(),
        }
    }
}

/// A closed-open time interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Result<Self, AppError> {
        if stop <= start {
            return Err(AppError::invalid(format!(
                "time range stop ({stop}) must be after start ({start})"
            )));
        }
        Ok(Self { start, stop })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

/// A reconstructed gamma-like event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub energy_tev: f64,
}

impl Event {
    pub fn coord(&self) -> SkyCoord {
        SkyCoord::new(self.ra_deg, self.dec_deg)
    }
}

/// Effective area tabulated in true energy.
///
/// Values are interpolated log-log between bin centers and held flat between
/// the outer edge and the outer center. Outside the table the area is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveArea {
    pub energy_edges_tev: Vec<f64>,
    pub area_m2: Vec<f64>,
    /// Stored safe low-energy threshold.
    #[serde(default)]
    pub threshold_lo_tev: Option<f64>,
    /// Stored safe high-energy threshold.
    #[serde(default)]
    pub threshold_hi_tev: Option<f64>,
}

impl EffectiveArea {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.energy_edges_tev.len() < 2 {
            return Err(AppError::invalid("effective area needs at least two energy edges"));
        }
        if self.area_m2.len() + 1 != self.energy_edges_tev.len() {
            return Err(AppError::invalid(format!(
                "effective area has {} values for {} edges",
                self.area_m2.len(),
                self.energy_edges_tev.len()
            )));
        }
        let increasing = self
            .energy_edges_tev
            .windows(2)
            .all(|w| w[0].is_finite() && w[0] > 0.0 && w[1] > w[0]);
        if !increasing {
            return Err(AppError::invalid("effective area energy edges must be positive and increasing"));
        }
        if self.area_m2.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(AppError::invalid("effective area values must be finite and >= 0"));
        }
        Ok(())
    }

    fn centers(&self) -> impl Iterator<Item = f64> + '_ {
        self.energy_edges_tev.windows(2).map(|w| (w[0] * w[1]).sqrt())
    }

    /// Effective area in m² at true energy `energy_tev`.
    pub fn evaluate(&self, energy_tev: f64) -> f64 {
        let (Some(&lo), Some(&hi)) = (self.energy_edges_tev.first(), self.energy_edges_tev.last()) else {
            return 0.0;
        };
        if !(energy_tev >= lo && energy_tev <= hi) {
            return 0.0;
        }

        let centers: Vec<f64> = self.centers().collect();
        if energy_tev <= centers[0] {
            return self.area_m2[0];
        }
        let last = centers.len() - 1;
        if energy_tev >= centers[last] {
            return self.area_m2[last];
        }

        let i = centers.partition_point(|&c| c <= energy_tev) - 1;
        let (e0, e1) = (centers[i], centers[i + 1]);
        let (a0, a1) = (self.area_m2[i], self.area_m2[i + 1]);
        let u = (energy_tev / e0).ln() / (e1 / e0).ln();
        if a0 > 0.0 && a1 > 0.0 {
            (a0.ln() + u * (a1.ln() - a0.ln())).exp()
        } else {
            a0 + u * (a1 - a0)
        }
    }

    pub fn max_area_m2(&self) -> f64 {
        self.area_m2.iter().copied().fold(0.0, f64::max)
    }

    /// Lowest tabulated energy where the area reaches `fraction` of its maximum.
    pub fn energy_at_fraction_of_max(&self, fraction: f64) -> Option<f64> {
        let target = self.max_area_m2() * fraction;
        if target <= 0.0 {
            return None;
        }
        self.centers()
            .zip(self.area_m2.iter())
            .find(|(_, a)| **a >= target)
            .map(|(e, _)| e)
    }
}

/// Energy dispersion: `ln(E_reco / E_true)` is Gaussian with mean `ln(1 + bias)`
/// and standard deviation `resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyDispersion {
    pub bias: f64,
    pub resolution: f64,
}

impl EnergyDispersion {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.bias.is_finite() && self.bias > -1.0) {
            return Err(AppError::invalid(format!("energy bias must be > -1, got {}", self.bias)));
        }
        if !(self.resolution.is_finite() && self.resolution >= 0.0) {
            return Err(AppError::invalid(format!(
                "energy resolution must be >= 0, got {}",
                self.resolution
            )));
        }
        Ok(())
    }

    /// Probability that an event of true energy `e_true` is reconstructed in `[lo, hi)`.
    pub fn probability(&self, e_true: f64, lo: f64, hi: f64) -> f64 {
        let mean = (1.0 + self.bias).ln();
        if self.resolution <= 1e-9 {
            let e_reco = e_true * (1.0 + self.bias);
            return if e_reco >= lo && e_reco < hi { 1.0 } else { 0.0 };
        }
        let z_hi = ((hi / e_true).ln() - mean) / self.resolution;
        let z_lo = ((lo / e_true).ln() - mean) / self.resolution;
        (std_normal_cdf(z_hi) - std_normal_cdf(z_lo)).max(0.0)
    }
}

fn std_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Characterized instrument response of one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Irf {
    pub aeff: EffectiveArea,
    pub edisp: EnergyDispersion,
    /// Offset from the pointing beyond which the response is undefined.
    pub fov_radius_deg: f64,
}

impl Irf {
    pub fn validate(&self) -> Result<(), AppError> {
        self.aeff.validate()?;
        self.edisp.validate()?;
        if !(self.fov_radius_deg.is_finite() && self.fov_radius_deg > 0.0) {
            return Err(AppError::invalid("field of view radius must be > 0"));
        }
        Ok(())
    }
}

/// One telescope exposure: metadata, events and response. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub obs_id: u32,
    pub pointing: SkyCoord,
    pub time: TimeRange,
    pub livetime_s: f64,
    pub zenith_deg: f64,
    pub irf: Irf,
    pub events: Vec<Event>,
}

impl ObservationRecord {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.pointing.is_finite() {
            return Err(AppError::invalid(format!("observation {}: non-finite pointing", self.obs_id)));
        }
        if !(self.livetime_s.is_finite() && self.livetime_s >= 0.0) {
            return Err(AppError::invalid(format!(
                "observation {}: livetime must be >= 0",
                self.obs_id
            )));
        }
        self.irf
            .validate()
            .map_err(|e| AppError::invalid(format!("observation {}: {e}", self.obs_id)))
    }
}
