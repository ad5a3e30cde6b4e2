//! The analysis pipeline shared by the CLI and the integration tests.
//!
//! catalog -> selection -> load -> reduce -> cumulative stats -> stack ->
//! hypothesis fits -> comparison -> flux points
//!
//! Stages run sequentially. Per-observation failures (unreadable files,
//! missing background, degenerate datasets) drop that observation only. An
//! empty selection or a failed fit is reported in `RunOutput::warnings`
//! rather than aborting the run.

use std::path::Path;

use tracing::{info, warn};

use crate::data::{Catalog, load_catalog};
use crate::dataset::{DatasetInfo, Datasets, SpectrumDataset};
use crate::domain::{AnalysisConfig, FitMode};
use crate::error::AppError;
use crate::fit::{
    FitOptions, FitResult, Fitter, FluxPoints, FluxPointsEstimator, HypothesisSelection, fit_hypotheses,
    select_hypothesis,
};
use crate::reduce::SpectrumReducer;
use crate::report::SelectionSummary;
use crate::select::{SelectionCriteria, select_observations};

pub const STACKED_NAME: &str = "stacked";

/// All computed outputs of a single `vhe analyze` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: SelectionSummary,
    /// Observations removed while loading or reducing.
    pub dropped: Vec<(u32, AppError)>,
    pub datasets: Datasets,
    pub per_observation: Vec<DatasetInfo>,
    pub cumulative: Vec<DatasetInfo>,
    /// Stacked dataset, carrying the accepted model when a fit succeeded.
    pub stacked: Option<SpectrumDataset>,
    pub fits: Vec<FitResult>,
    pub selection: Option<HypothesisSelection>,
    pub flux_points: Option<FluxPoints>,
    /// Non-fatal conditions worth showing to the user.
    pub warnings: Vec<AppError>,
}

impl RunOutput {
    fn empty(summary: SelectionSummary) -> Self {
        Self {
            summary,
            dropped: Vec::new(),
            datasets: Datasets::new(),
            per_observation: Vec::new(),
            cumulative: Vec::new(),
            stacked: None,
            fits: Vec::new(),
            selection: None,
            flux_points: None,
            warnings: Vec::new(),
        }
    }

    /// The accepted hypothesis fit, if any.
    pub fn best_fit(&self) -> Option<&FitResult> {
        self.selection.as_ref().map(|s| &self.fits[s.accepted])
    }
}

/// Run the analysis on the catalog in `data_dir`.
pub fn run_analysis(config: &AnalysisConfig, data_dir: &Path) -> Result<RunOutput, AppError> {
    let catalog = load_catalog(data_dir)?;
    run_analysis_with_catalog(config, &catalog)
}

/// Run the analysis on an already loaded catalog.
pub fn run_analysis_with_catalog(config: &AnalysisConfig, catalog: &Catalog) -> Result<RunOutput, AppError> {
    config.validate()?;

    // 1) Select on index metadata.
    let criteria = SelectionCriteria::from_config(config)?;
    let selection = select_observations(&catalog.entries, &criteria);
    let summary = SelectionSummary::new(&criteria, catalog.entries.len(), &selection, catalog.row_errors.len());
    let mut out = RunOutput::empty(summary);
    if selection.is_empty() {
        warn!(radius_deg = criteria.radius_deg, "no observations selected");
        out.warnings.push(AppError::SelectionEmpty);
        return Ok(out);
    }

    // 2) Load and reduce, one observation at a time.
    let reducer = SpectrumReducer::from_config(config)?;
    let mut observations = Vec::with_capacity(selection.len());
    for entry in selection.iter() {
        match catalog.load_observation(entry) {
            Ok(obs) => observations.push(obs),
            Err(err) => {
                warn!(obs_id = entry.obs_id, error = %err, "cannot load observation");
                out.dropped.push((entry.obs_id, err));
            }
        }
    }
    let reduced = reducer.reduce_all(&observations);
    out.dropped.extend(reduced.dropped);
    out.datasets = reduced.datasets;

    if out.datasets.is_empty() {
        warn!(dropped = out.dropped.len(), "every selected observation was dropped");
        out.warnings.push(AppError::invalid("no usable observations left after reduction"));
        return Ok(out);
    }

    // 3) Aggregate.
    out.per_observation = out.datasets.info_table();
    out.cumulative = out.datasets.cumulative_info()?;
    let Some(mut stacked) = out.datasets.stack_reduce(STACKED_NAME)? else {
        return Ok(out);
    };
    let info = stacked.info();
    info!(
        n_obs = info.n_obs,
        excess = info.excess,
        sqrt_ts = info.sqrt_ts,
        livetime_s = info.livetime_s,
        "stacked dataset"
    );

    // 4) Fit every hypothesis and compare.
    let fitter = Fitter::new(FitOptions::from(&config.fit));
    let fits = match config.fit.mode {
        FitMode::Stacked => fit_hypotheses(&stacked, &config.fit.hypotheses, &fitter),
        FitMode::Joint => fit_hypotheses(&out.datasets, &config.fit.hypotheses, &fitter),
    };
    out.fits = fits;

    match select_hypothesis(&out.fits, config.fit.min_significance) {
        Ok(sel) => out.selection = Some(sel),
        Err(err) => {
            warn!(error = %err, "no hypothesis could be accepted");
            out.warnings.push(err);
            out.stacked = Some(stacked);
            return Ok(out);
        }
    }

    // 5) Flux points of the accepted model on the stacked dataset.
    let best = out.best_fit().cloned();
    if let Some(best) = best {
        let stacked_fit = match config.fit.mode {
            FitMode::Stacked => Some(best),
            FitMode::Joint => refit_on_stacked(&fitter, &stacked, &best),
        };
        if let Some(fit) = stacked_fit {
            stacked.model = Some(fit.model.clone());
            if config.flux_points.enabled {
                let estimator = FluxPointsEstimator::from_config(&config.flux_points)?;
                match estimator.run(&stacked, &fit) {
                    Ok(points) => out.flux_points = Some(points),
                    Err(err) => {
                        warn!(error = %err, "flux points not estimated");
                        out.warnings.push(err);
                    }
                }
            }
        }
    }

    out.stacked = Some(stacked);
    Ok(out)
}

/// Fit the accepted joint model on the stacked dataset, starting at the joint optimum.
fn refit_on_stacked(fitter: &Fitter, stacked: &SpectrumDataset, joint: &FitResult) -> Option<FitResult> {
    let mut model = joint.model.clone();
    let fit = fitter.run(stacked, &mut model);
    if fit.is_success() {
        Some(fit)
    } else {
        warn!(dataset = %stacked.name, "stacked refit of the joint model failed");
        None
    }
}
