//! End-to-end runs on simulated catalogs.

use std::path::Path;

use vhe_spectra::app::pipeline::{RunOutput, run_analysis};
use vhe_spectra::dataset::FitStatistic;
use vhe_spectra::data::{SimulationConfig, simulate_observations, write_catalog};
use vhe_spectra::domain::{AnalysisConfig, FitMode, ModelKind};
use vhe_spectra::error::AppError;
use vhe_spectra::fit::{Fitter, compare_nested};
use vhe_spectra::io::{read_dataset_json, read_flux_points_csv, write_dataset_json, write_fits_json, write_flux_points_csv};
use vhe_spectra::models::SpectralModel;

fn simulate(dir: &Path, config: &SimulationConfig) {
    let observations = simulate_observations(config).unwrap();
    write_catalog(dir, &observations).unwrap();
}

fn crab_catalog(dir: &Path) {
    simulate(dir, &SimulationConfig::default());
}

fn analyze(dir: &Path, config: &AnalysisConfig) -> RunOutput {
    run_analysis(config, dir).unwrap()
}

#[test]
fn stacked_analysis_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    crab_catalog(dir.path());

    let config = AnalysisConfig::default();
    let out = analyze(dir.path(), &config);

    assert!(out.warnings.is_empty(), "warnings: {:?}", out.warnings);
    assert_eq!(out.summary.selected.len(), 4);
    assert_eq!(out.datasets.len(), 4);
    assert_eq!(out.per_observation.len(), 4);
    assert_eq!(out.cumulative.len(), 4);

    // Cumulative livetime and significance grow with each observation.
    for pair in out.cumulative.windows(2) {
        assert!(pair[1].livetime_s > pair[0].livetime_s);
        assert!(pair[1].counts >= pair[0].counts);
    }
    let stacked = out.stacked.as_ref().unwrap();
    assert_eq!(stacked.obs_ids.len(), 4);
    assert!(stacked.info().sqrt_ts > 5.0);

    assert_eq!(out.fits.len(), 2);
    assert!(out.fits[0].is_success());
    let selection = out.selection.as_ref().unwrap();
    assert_eq!(selection.comparisons.len(), 1);
    assert!(selection.comparisons[0].delta_ts >= -1e-6);

    let best = out.best_fit().unwrap();
    assert_eq!(stacked.model.as_ref(), Some(&best.model));
    let index = best.model.value("index");
    assert!((2.0..3.2).contains(&index), "index {index}");

    let fp = out.flux_points.as_ref().unwrap();
    assert!(!fp.points.is_empty());
    assert!(fp.points.iter().any(|p| !p.is_ul));
    for p in &fp.points {
        assert!(p.e_min < p.e_ref && p.e_ref < p.e_max);
        assert!(p.norm >= 0.0);
    }
}

#[test]
fn cutoff_source_prefers_the_curved_hypothesis() {
    let dir = tempfile::tempdir().unwrap();
    simulate(
        dir.path(),
        &SimulationConfig {
            n_obs: 8,
            amplitude: 1e-10,
            index: 2.0,
            lambda: 0.3,
            ..SimulationConfig::default()
        },
    );

    let mut config = AnalysisConfig::default();
    config.fit.hypotheses = vec![ModelKind::PowerLaw, ModelKind::ExpCutoffPowerLaw];
    config.flux_points.enabled = false;
    let out = analyze(dir.path(), &config);

    let selection = out.selection.as_ref().unwrap();
    assert_eq!(selection.accepted_kind, ModelKind::ExpCutoffPowerLaw);
    assert!(selection.comparisons[0].significance >= config.fit.min_significance);
    assert!(out.flux_points.is_none());
}

#[test]
fn joint_mode_fits_every_dataset_and_still_gives_flux_points() {
    let dir = tempfile::tempdir().unwrap();
    crab_catalog(dir.path());

    let mut config = AnalysisConfig::default();
    config.fit.mode = FitMode::Joint;
    config.fit.hypotheses = vec![ModelKind::PowerLaw];
    let out = analyze(dir.path(), &config);

    assert_eq!(out.fits.len(), 1);
    let joint = &out.fits[0];
    assert!(joint.is_success());
    assert_eq!(joint.dataset_fingerprint, out.datasets.fingerprint());

    let stacked = out.stacked.as_ref().unwrap();
    let fp = out.flux_points.as_ref().unwrap();
    // Flux points refer to the stacked refit, which starts at the joint optimum.
    assert!((fp.reference_model.value("index") - joint.model.value("index")).abs() < 0.2);
    assert_eq!(stacked.model.as_ref(), Some(&fp.reference_model));
}

#[test]
fn exports_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    crab_catalog(dir.path());
    let out = analyze(dir.path(), &AnalysisConfig::default());

    let stacked = out.stacked.as_ref().unwrap();
    let dataset_path = dir.path().join("stacked.json");
    write_dataset_json(&dataset_path, stacked).unwrap();
    let back = read_dataset_json(&dataset_path).unwrap();
    assert_eq!(back.fingerprint(), stacked.fingerprint());
    assert_eq!(back.model, stacked.model);

    let fp = out.flux_points.as_ref().unwrap();
    let csv_path = dir.path().join("flux_points.csv");
    write_flux_points_csv(&csv_path, &fp.points).unwrap();
    let points = read_flux_points_csv(&csv_path).unwrap();
    assert_eq!(points.len(), fp.points.len());
    for (a, b) in points.iter().zip(&fp.points) {
        assert_eq!(a.is_ul, b.is_ul);
        assert!((a.e_ref - b.e_ref).abs() <= 1e-12 * b.e_ref);
        assert!((a.norm - b.norm).abs() <= 1e-9 * (1.0 + b.norm.abs()));
    }

    let fits_path = dir.path().join("fits.json");
    write_fits_json(&fits_path, &out.fits, out.selection.as_ref()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&fits_path).unwrap()).unwrap();
    assert_eq!(doc["fits"].as_array().unwrap().len(), out.fits.len());
    assert!(doc["selection"]["accepted_kind"].is_string());
}

#[test]
fn fits_on_two_different_stacked_datasets_cannot_be_compared() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    crab_catalog(dir_a.path());
    simulate(
        dir_b.path(),
        &SimulationConfig {
            seed: 7,
            ..SimulationConfig::default()
        },
    );

    let mut config = AnalysisConfig::default();
    config.flux_points.enabled = false;
    let a = analyze(dir_a.path(), &config).stacked.unwrap();
    let b = analyze(dir_b.path(), &config).stacked.unwrap();

    let fitter = Fitter::default();
    let simple = fitter.run(&a, &mut SpectralModel::new(ModelKind::PowerLaw));
    let complex = fitter.run(&b, &mut SpectralModel::new(ModelKind::ExpCutoffPowerLaw));
    assert!(matches!(
        compare_nested(&simple, &complex),
        Err(AppError::InvalidComparison(_))
    ));
}

#[test]
fn missing_catalog_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_analysis(&AnalysisConfig::default(), &dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, AppError::Io(_)), "{err:?}");
}
