//! Spectral shapes `dN/dE(E)` in cm⁻² s⁻¹ TeV⁻¹, with E in TeV.
//!
//! A `SpectralModel` is a `ModelKind` plus its parameter list. Parameters are
//! stored in a fixed order per kind so the fitter can address free parameters
//! by position:
//!
//! - power law: `index, amplitude, reference`
//! - cut-off power law: `index, amplitude, reference, lambda_`
//! - log-parabola: `amplitude, reference, alpha, beta`

use serde::{Deserialize, Serialize};

use crate::domain::ModelKind;
use crate::error::AppError;
use crate::math::integrate_log;
use crate::models::Parameter;

/// Sub-intervals used for numeric integration over one energy bin.
const INTEGRATION_STEPS: usize = 16;

const AMPLITUDE_UNIT: &str = "cm-2 s-1 TeV-1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralModel {
    pub kind: ModelKind,
    pub parameters: Vec<Parameter>,
}

impl SpectralModel {
    /// Model with default starting values for a fit.
    pub fn new(kind: ModelKind) -> Self {
        let amplitude = Parameter::new("amplitude", 1e-12, AMPLITUDE_UNIT).with_min(0.0);
        let reference = Parameter::new("reference", 1.0, "TeV").frozen();
        let parameters = match kind {
            ModelKind::PowerLaw => vec![Parameter::new("index", 2.0, ""), amplitude, reference],
            ModelKind::ExpCutoffPowerLaw => vec![
                Parameter::new("index", 2.0, ""),
                amplitude,
                reference,
                Parameter::new("lambda_", 0.1, "TeV-1").with_min(0.0),
            ],
            ModelKind::LogParabola => vec![
                amplitude,
                reference,
                Parameter::new("alpha", 2.0, ""),
                Parameter::new("beta", 0.1, ""),
            ],
        };
        Self { kind, parameters }
    }

    pub fn power_law(index: f64, amplitude: f64, reference: f64) -> Self {
        let mut model = Self::new(ModelKind::PowerLaw);
        model.set_value("index", index);
        model.set_value("amplitude", amplitude);
        model.set_value("reference", reference);
        model
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Value of a parameter; NaN for unknown names.
    pub fn value(&self, name: &str) -> f64 {
        self.parameter(name).map_or(f64::NAN, |p| p.value)
    }

    /// Set a parameter value. Unknown names are ignored.
    pub fn set_value(&mut self, name: &str, value: f64) {
        if let Some(p) = self.parameter_mut(name) {
            p.value = value;
        }
    }

    pub fn freeze(&mut self, name: &str) {
        if let Some(p) = self.parameter_mut(name) {
            p.frozen = true;
        }
    }

    pub fn free_indices(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.frozen)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn n_free(&self) -> usize {
        self.parameters.iter().filter(|p| !p.frozen).count()
    }

    pub fn free_values(&self) -> Vec<f64> {
        self.parameters.iter().filter(|p| !p.frozen).map(|p| p.value).collect()
    }

    /// Overwrite free parameter values in order.
    pub fn set_free_values(&mut self, values: &[f64]) {
        for (p, v) in self.parameters.iter_mut().filter(|p| !p.frozen).zip(values) {
            p.value = *v;
        }
    }

    /// Differential flux at `energy` (TeV).
    pub fn evaluate(&self, energy: f64) -> f64 {
        let p = |i: usize| self.parameters[i].value;
        match self.kind {
            ModelKind::PowerLaw => {
                let (index, amplitude, reference) = (p(0), p(1), p(2));
                amplitude * (energy / reference).powf(-index)
            }
            ModelKind::ExpCutoffPowerLaw => {
                let (index, amplitude, reference, lambda) = (p(0), p(1), p(2), p(3));
                amplitude * (energy / reference).powf(-index) * (-lambda * energy).exp()
            }
            ModelKind::LogParabola => {
                let (amplitude, reference, alpha, beta) = (p(0), p(1), p(2), p(3));
                let x = (energy / reference).ln();
                amplitude * (-(alpha + beta * x) * x).exp()
            }
        }
    }

    /// Integral flux between `e_min` and `e_max` (cm⁻² s⁻¹).
    pub fn integral(&self, e_min: f64, e_max: f64) -> f64 {
        if self.kind == ModelKind::PowerLaw {
            let (index, amplitude, reference) = (
                self.parameters[0].value,
                self.parameters[1].value,
                self.parameters[2].value,
            );
            let g = 1.0 - index;
            if g.abs() < 1e-9 {
                return amplitude * reference * (e_max / e_min).ln();
            }
            return amplitude * reference / g
                * ((e_max / reference).powf(g) - (e_min / reference).powf(g));
        }
        integrate_log(|e| self.evaluate(e), e_min, e_max, INTEGRATION_STEPS)
    }

    /// Energy flux between `e_min` and `e_max` (TeV cm⁻² s⁻¹).
    pub fn energy_flux(&self, e_min: f64, e_max: f64) -> f64 {
        integrate_log(|e| e * self.evaluate(e), e_min, e_max, INTEGRATION_STEPS)
    }

    /// How `self` sits inside a model of kind `other`.
    ///
    /// Returns pairs of corresponding parameter names and the extra
    /// parameters of `other` with the value that reproduces `self`.
    fn embedding(
        simple: ModelKind,
        complex: ModelKind,
    ) -> Option<(&'static [(&'static str, &'static str)], &'static [(&'static str, f64)])> {
        const PL: &[(&str, &str)] = &[
            ("index", "index"),
            ("amplitude", "amplitude"),
            ("reference", "reference"),
        ];
        const ECPL: &[(&str, &str)] = &[
            ("index", "index"),
            ("amplitude", "amplitude"),
            ("reference", "reference"),
            ("lambda_", "lambda_"),
        ];
        const LP: &[(&str, &str)] = &[
            ("amplitude", "amplitude"),
            ("reference", "reference"),
            ("alpha", "alpha"),
            ("beta", "beta"),
        ];
        const PL_IN_LP: &[(&str, &str)] = &[
            ("index", "alpha"),
            ("amplitude", "amplitude"),
            ("reference", "reference"),
        ];

        match (simple, complex) {
            (ModelKind::PowerLaw, ModelKind::PowerLaw) => Some((PL, &[])),
            (ModelKind::ExpCutoffPowerLaw, ModelKind::ExpCutoffPowerLaw) => Some((ECPL, &[])),
            (ModelKind::LogParabola, ModelKind::LogParabola) => Some((LP, &[])),
            (ModelKind::PowerLaw, ModelKind::ExpCutoffPowerLaw) => Some((PL, &[("lambda_", 0.0)])),
            (ModelKind::PowerLaw, ModelKind::LogParabola) => Some((PL_IN_LP, &[("beta", 0.0)])),
            _ => None,
        }
    }

    /// If `self` is a special case of `other`, the number of extra free
    /// parameters `other` has.
    ///
    /// Every free parameter of `self` must be free in `other`, and every
    /// parameter `other` keeps frozen must be fixed to the same value in
    /// `self` (or, for extra parameters, to the nesting value).
    pub fn nests_in(&self, other: &SpectralModel) -> Option<usize> {
        let (pairs, extras) = Self::embedding(self.kind, other.kind)?;
        let same = |a: f64, b: f64| (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-300);

        for (mine, theirs) in pairs {
            let a = self.parameter(mine)?;
            let b = other.parameter(theirs)?;
            if !a.frozen && b.frozen {
                return None;
            }
            if a.frozen && b.frozen && !same(a.value, b.value) {
                return None;
            }
        }
        for (name, nested_value) in extras {
            let b = other.parameter(name)?;
            if b.frozen && !same(b.value, *nested_value) {
                return None;
            }
        }

        other.n_free().checked_sub(self.n_free())
    }

    /// Parameters of `self` that are fixed to a nesting value when `simple`
    /// is embedded in it.
    pub fn extra_parameters(&self, simple: &SpectralModel) -> Vec<&'static str> {
        Self::embedding(simple.kind, self.kind)
            .map(|(_, extras)| extras.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Start `self` at the point of its parameter space equivalent to `simple`.
    pub fn init_from(&mut self, simple: &SpectralModel) -> Result<(), AppError> {
        let Some((pairs, extras)) = Self::embedding(simple.kind, self.kind) else {
            return Err(AppError::InvalidComparison(format!(
                "{} is not nested in {}",
                simple.name(),
                self.name()
            )));
        };
        for (mine, theirs) in pairs {
            let value = simple.value(mine);
            if let Some(p) = self.parameter_mut(theirs) {
                p.value = p.clamp(value);
            }
        }
        for (name, nested_value) in extras {
            if let Some(p) = self.parameter_mut(name) {
                p.value = p.clamp(*nested_value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_law_integral_matches_numeric() {
        let model = SpectralModel::power_law(2.3, 3e-11, 1.0);
        let exact = model.integral(1.0, 10.0);
        let numeric = integrate_log(|e| model.evaluate(e), 1.0, 10.0, 64);
        assert!((exact - numeric).abs() / exact < 1e-6);

        let flat = SpectralModel::power_law(1.0, 1.0, 1.0);
        assert!((flat.integral(1.0, std::f64::consts::E) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn extra_parameters_are_the_nesting_ones() {
        let pl = SpectralModel::new(ModelKind::PowerLaw);
        assert_eq!(SpectralModel::new(ModelKind::ExpCutoffPowerLaw).extra_parameters(&pl), vec!["lambda_"]);
        assert_eq!(SpectralModel::new(ModelKind::LogParabola).extra_parameters(&pl), vec!["beta"]);
        assert!(pl.extra_parameters(&SpectralModel::new(ModelKind::LogParabola)).is_empty());
    }

    #[test]
    fn energy_flux_of_index_two_is_logarithmic() {
        let model = SpectralModel::power_law(2.0, 1.0, 1.0);
        let flux = model.energy_flux(1.0, 10.0);
        assert!((flux - 10f64.ln()).abs() < 1e-9, "{flux}");
    }

    #[test]
    fn nested_models_agree_at_the_nesting_point() {
        let pl = SpectralModel::power_law(2.5, 2e-11, 1.0);
        for kind in [ModelKind::ExpCutoffPowerLaw, ModelKind::LogParabola] {
            let mut complex = SpectralModel::new(kind);
            assert_eq!(pl.nests_in(&complex), Some(1));
            complex.init_from(&pl).unwrap();
            for e in [0.3, 1.0, 7.0, 30.0] {
                let (a, b) = (pl.evaluate(e), complex.evaluate(e));
                assert!((a - b).abs() <= 1e-12 * a, "{kind:?} at {e}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn unrelated_kinds_are_not_nested() {
        let ecpl = SpectralModel::new(ModelKind::ExpCutoffPowerLaw);
        let lp = SpectralModel::new(ModelKind::LogParabola);
        assert_eq!(ecpl.nests_in(&lp), None);
        assert_eq!(lp.nests_in(&SpectralModel::new(ModelKind::PowerLaw)), None);
        assert!(SpectralModel::new(ModelKind::PowerLaw).init_from(&ecpl).is_err());
    }

    #[test]
    fn same_kind_nests_when_freeing_parameters() {
        let mut simple = SpectralModel::new(ModelKind::ExpCutoffPowerLaw);
        simple.set_value("lambda_", 0.0);
        simple.freeze("lambda_");
        let complex = SpectralModel::new(ModelKind::ExpCutoffPowerLaw);
        assert_eq!(simple.nests_in(&complex), Some(1));
        assert_eq!(complex.nests_in(&simple), None);
        assert_eq!(complex.nests_in(&complex), Some(0));
    }

    #[test]
    fn free_values_round_trip_in_order() {
        let mut model = SpectralModel::new(ModelKind::LogParabola);
        assert_eq!(model.n_free(), 3);
        model.set_free_values(&[4e-12, 2.2, 0.3]);
        assert_eq!(model.value("amplitude"), 4e-12);
        assert_eq!(model.value("reference"), 1.0);
        assert_eq!(model.value("beta"), 0.3);
        assert_eq!(model.free_values(), vec![4e-12, 2.2, 0.3]);
    }
}
