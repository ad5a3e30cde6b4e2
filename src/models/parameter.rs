use serde::{Deserialize, Serialize};

/// A named model parameter with optional bounds.
///
/// `error` is filled in by the fitter from the covariance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub error: Option<f64>,
}

impl Parameter {
    pub fn new(name: &str, value: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            min: None,
            max: None,
            frozen: false,
            error: None,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// Clamp `v` into the parameter bounds.
    pub fn clamp(&self, v: f64) -> f64 {
        let v = match self.min {
            Some(lo) if v < lo => lo,
            _ => v,
        };
        match self.max {
            Some(hi) if v > hi => hi,
            _ => v,
        }
    }

    /// True when `v` is within `atol` of a bound.
    pub fn at_bound(&self, v: f64, atol: f64) -> bool {
        let near = |b: f64| (v - b).abs() <= atol;
        self.min.is_some_and(near) || self.max.is_some_and(near)
    }
}
