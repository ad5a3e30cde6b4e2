//! Nested-model comparison and hypothesis selection.
//!
//! Two fits are comparable only when they were made on the same dataset
//! (equal fingerprints) and the simpler model is a special case of the more
//! complex one. Wilks' theorem then gives
//!
//! - `ΔTS = stat(simple) - stat(complex)`
//! - `p = P(χ²_k > ΔTS)`, `k` = number of extra free parameters
//! - significance = the two-sided Gaussian equivalent of `p`
//!
//! Hypotheses are fitted in configuration order. A complex hypothesis starts
//! from the best fit of the nearest preceding hypothesis nested in it, so its
//! statistic can only improve on that fit.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::FitStatistic;
use crate::domain::ModelKind;
use crate::error::AppError;
use crate::fit::fitter::{FitResult, FitStatus, Fitter};
use crate::models::SpectralModel;
use crate::stats::{chi2_sf, significance_from_p};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub simple: ModelKind,
    pub complex: ModelKind,
    pub stat_simple: f64,
    pub stat_complex: f64,
    pub delta_ts: f64,
    pub dof: usize,
    pub p_value: f64,
    pub significance: f64,
}

/// Likelihood-ratio test of `simple` against `complex`.
pub fn compare_nested(simple: &FitResult, complex: &FitResult) -> Result<ModelComparison, AppError> {
    if simple.dataset_fingerprint != complex.dataset_fingerprint {
        return Err(AppError::InvalidComparison(format!(
            "fits were made on different datasets ({} vs {})",
            simple.dataset_name, complex.dataset_name
        )));
    }
    let dof = match simple.model.nests_in(&complex.model) {
        Some(k) if k > 0 => k,
        Some(_) => {
            return Err(AppError::InvalidComparison(format!(
                "{} has no extra free parameters over {}",
                complex.model.name(),
                simple.model.name()
            )));
        }
        None => {
            return Err(AppError::InvalidComparison(format!(
                "{} is not nested in {}",
                simple.model.name(),
                complex.model.name()
            )));
        }
    };
    simple.ensure_converged()?;
    complex.ensure_converged()?;

    let delta_ts = simple.total_stat - complex.total_stat;
    let p_value = chi2_sf(delta_ts.max(0.0), dof)?;
    // p underflows for very large ΔTS; fall back to the asymptotic √ΔTS.
    let significance = match significance_from_p(p_value) {
        s if s.is_finite() => s,
        _ => delta_ts.max(0.0).sqrt(),
    };

    info!(
        simple = simple.model.name(),
        complex = complex.model.name(),
        delta_ts,
        dof,
        p_value,
        significance,
        "model comparison"
    );

    Ok(ModelComparison {
        simple: simple.model.kind,
        complex: complex.model.kind,
        stat_simple: simple.total_stat,
        stat_complex: complex.total_stat,
        delta_ts,
        dof,
        p_value,
        significance,
    })
}

/// Index of the nearest hypothesis before `i` nested in hypothesis `i`.
fn nearest_nested(models: &[&SpectralModel], i: usize) -> Option<usize> {
    (0..i)
        .rev()
        .find(|&j| models[j].nests_in(models[i]).is_some_and(|k| k > 0))
}

/// Fit every hypothesis in order.
///
/// Hypothesis `i` is fitted from its default start and, when its nearest
/// nested predecessor succeeded, also from that best fit (the nested point)
/// and from the best fit with the extra parameters moved back to their
/// defaults. The nested point sits on a bound for cut-off models, where the
/// simplex can stall, so the lowest successful statistic of all starts wins.
pub fn fit_hypotheses<D: FitStatistic + ?Sized>(
    data: &D,
    hypotheses: &[ModelKind],
    fitter: &Fitter,
) -> Vec<FitResult> {
    let mut fits: Vec<FitResult> = Vec::with_capacity(hypotheses.len());
    for &kind in hypotheses {
        let default = SpectralModel::new(kind);
        let start = {
            let mut previous: Vec<&SpectralModel> = fits.iter().map(|f| &f.model).collect();
            previous.push(&default);
            nearest_nested(&previous, fits.len())
        };

        let mut starts = Vec::with_capacity(3);
        if let Some(j) = start.filter(|&j| fits[j].is_success()) {
            let simple = &fits[j].model;
            let mut nested = default.clone();
            if nested.init_from(simple).is_ok() {
                info!(model = nested.name(), from = simple.name(), "starting from nested best fit");
                let mut shifted = nested.clone();
                for name in shifted.extra_parameters(simple) {
                    shifted.set_value(name, default.value(name));
                }
                starts.push(nested);
                starts.push(shifted);
            }
        }
        starts.push(default);

        let mut best: Option<FitResult> = None;
        for mut model in starts {
            let fit = fitter.run(data, &mut model);
            best = Some(match best {
                Some(current) if !better_fit(&fit, &current) => current,
                _ => fit,
            });
        }
        if let Some(fit) = best {
            fits.push(fit);
        }
    }
    fits
}

/// Success beats failure; among equals the lower statistic wins.
fn better_fit(candidate: &FitResult, current: &FitResult) -> bool {
    match (candidate.is_success(), current.is_success()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.total_stat < current.total_stat,
    }
}

/// Outcome of comparing the fitted hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSelection {
    /// Index into the fits of the accepted hypothesis.
    pub accepted: usize,
    pub accepted_kind: ModelKind,
    pub comparisons: Vec<ModelComparison>,
    /// Hypotheses that could not be tested, with the reason.
    pub skipped: Vec<(ModelKind, String)>,
}

/// Accept the simplest hypothesis that is not significantly improved on.
///
/// The baseline is the first successful fit. A later hypothesis replaces the
/// accepted one only when it is compared against exactly that hypothesis and
/// the improvement reaches `min_significance`.
pub fn select_hypothesis(fits: &[FitResult], min_significance: f64) -> Result<HypothesisSelection, AppError> {
    let Some(mut accepted) = fits.iter().position(FitResult::is_success) else {
        let reason = fits
            .first()
            .map(|f| match &f.status {
                FitStatus::NotConverged { reason } => reason.clone(),
                _ => String::new(),
            })
            .unwrap_or_else(|| "no hypotheses configured".to_string());
        return Err(AppError::FitNonConvergent {
            model: "all hypotheses".to_string(),
            reason,
        });
    };

    let models: Vec<&SpectralModel> = fits.iter().map(|f| &f.model).collect();
    let mut comparisons = Vec::new();
    let mut skipped = Vec::new();

    for i in (accepted + 1)..fits.len() {
        let kind = fits[i].model.kind;
        let Some(j) = nearest_nested(&models, i) else {
            skipped.push((kind, "no simpler hypothesis is nested in it".to_string()));
            continue;
        };
        match compare_nested(&fits[j], &fits[i]) {
            Ok(cmp) => {
                if j == accepted && cmp.significance >= min_significance {
                    info!(
                        from = fits[j].model.name(),
                        to = fits[i].model.name(),
                        significance = cmp.significance,
                        "accepting more complex hypothesis"
                    );
                    accepted = i;
                }
                comparisons.push(cmp);
            }
            Err(err) => {
                warn!(model = fits[i].model.name(), error = %err, "hypothesis not tested");
                skipped.push((kind, err.to_string()));
            }
        }
    }

    Ok(HypothesisSelection {
        accepted,
        accepted_kind: fits[accepted].model.kind,
        comparisons,
        skipped,
    })
}
