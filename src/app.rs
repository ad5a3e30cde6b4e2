//! Top-level application orchestration.
//!
//! `src/main.rs` is a thin wrapper; this module is the real main that
//! parses arguments, installs logging, runs the requested command, prints
//! reports and plots, and writes optional exports.

use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{AnalyzeArgs, Cli, Command, InfoArgs, PlotArgs, SimulateArgs};
use crate::data::{SimulationConfig, simulate_observations, write_catalog};
use crate::domain::{AnalysisConfig, SkyCoord};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `vhe` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Info(args) => handle_info(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args)?;
    let data_dir = crate::io::resolve_data_dir(args.data_dir.as_deref(), &config)?;
    info!(data_dir = %data_dir.display(), "starting analysis");

    let run = pipeline::run_analysis(&config, &data_dir)?;
    println!("{}", render_report(&run, &config));

    let out = &config.output;
    if let (Some(path), Some(stacked)) = (&out.dataset, &run.stacked) {
        crate::io::write_dataset_json(path, stacked)?;
    }
    if let (Some(path), Some(fp)) = (&out.flux_points, &run.flux_points) {
        crate::io::write_flux_points_csv(path, &fp.points)?;
    }
    if let Some(path) = &out.fits {
        crate::io::write_fits_json(path, &run.fits, run.selection.as_ref())?;
    }

    Ok(())
}

/// Full terminal report of an analysis run.
pub fn render_report(run: &pipeline::RunOutput, config: &AnalysisConfig) -> String {
    use crate::report::*;

    let mut out = format_selection(&run.summary);
    out.push_str(&format_dropped(&run.dropped));
    for warning in &run.warnings {
        out.push_str(&format!("\nwarning: {warning}\n"));
    }
    if run.datasets.is_empty() {
        return out;
    }

    out.push_str(&format_info_table("Per observation", &run.per_observation));
    out.push_str(&format_info_table("Cumulative", &run.cumulative));
    if config.output.plot {
        out.push('\n');
        out.push_str(&crate::plot::render_cumulative_plot(
            &run.cumulative,
            config.output.plot_width,
            config.output.plot_height,
        ));
    }

    if !run.fits.is_empty() {
        out.push_str(&format_fit_table(&run.fits, run.selection.as_ref().map(|s| s.accepted)));
    }
    if let Some(selection) = &run.selection {
        out.push_str(&format_comparisons(selection));
    }
    if let Some(fp) = &run.flux_points {
        out.push_str(&format_flux_points(&fp.points));
        if config.output.plot {
            out.push('\n');
            out.push_str(&crate::plot::render_sed_plot(
                &fp.points,
                Some(&fp.reference_model),
                config.output.plot_width,
                config.output.plot_height,
            ));
        }
    }
    out
}

/// Config file (or defaults) patched with the command-line overrides.
pub fn analysis_config_from_args(args: &AnalyzeArgs) -> Result<AnalysisConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => crate::io::load_config(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(hypotheses) = &args.hypotheses {
        config.fit.hypotheses = hypotheses.clone();
    }
    if let Some(mode) = args.mode {
        config.fit.mode = mode;
    }
    if let Some(radius) = args.radius {
        config.selection.radius_deg = radius;
    }
    if let Some(path) = &args.export_dataset {
        config.output.dataset = Some(path.clone());
    }
    if let Some(path) = &args.export_flux_points {
        config.output.flux_points = Some(path.clone());
    }
    if let Some(path) = &args.export_fits {
        config.output.fits = Some(path.clone());
    }
    if args.no_plot {
        config.output.plot = false;
    }
    if let Some(width) = args.width {
        config.output.plot_width = width;
    }
    if let Some(height) = args.height {
        config.output.plot_height = height;
    }

    config.validate()?;
    Ok(config)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulation_config_from_args(&args);
    let observations = simulate_observations(&config)?;
    write_catalog(&args.out, &observations)?;
    println!(
        "Wrote {} observations to {}",
        observations.len(),
        args.out.display()
    );
    Ok(())
}

pub fn simulation_config_from_args(args: &SimulateArgs) -> SimulationConfig {
    SimulationConfig {
        n_obs: args.n_obs,
        seed: args.seed,
        livetime_s: args.livetime,
        source: SkyCoord::new(args.source_ra, args.source_dec),
        amplitude: args.amplitude,
        index: args.index,
        lambda: args.lambda,
        offset_deg: args.offset,
        background_rate: args.background_rate,
        ..SimulationConfig::default()
    }
}

fn handle_info(args: InfoArgs) -> Result<(), AppError> {
    let dataset = crate::io::read_dataset_json(&args.dataset)?;
    let mut out = crate::report::format_info_table(&display_name(&args.dataset), &[dataset.info()]);
    if let Some((lo, hi)) = dataset.energy_range_safe() {
        out.push_str(&format!("Safe energy range: {lo:.3} - {hi:.3} TeV\n"));
    }
    if let Some(model) = &dataset.model {
        out.push_str(&format!("Model: {}\n", model.kind.display_name()));
        for p in &model.parameters {
            out.push_str(&format!("  {:<10} {:.4e} {}\n", p.name, p.value, p.unit));
        }
    }
    println!("{out}");
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let points = crate::io::read_flux_points_csv(&args.flux_points)?;
    let plot = crate::plot::render_sed_plot(&points, None, args.width, args.height);
    println!("{plot}");
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitMode;

    #[test]
    fn cli_overrides_win_over_defaults() {
        let args = AnalyzeArgs {
            mode: Some(FitMode::Joint),
            radius: Some(1.5),
            no_plot: true,
            width: Some(50),
            ..AnalyzeArgs::default()
        };
        let config = analysis_config_from_args(&args).unwrap();
        assert_eq!(config.fit.mode, FitMode::Joint);
        assert_eq!(config.selection.radius_deg, 1.5);
        assert!(!config.output.plot);
        assert_eq!(config.output.plot_width, 50);
    }

    #[test]
    fn invalid_override_is_a_config_error() {
        let args = AnalyzeArgs {
            radius: Some(-1.0),
            ..AnalyzeArgs::default()
        };
        assert!(matches!(analysis_config_from_args(&args), Err(AppError::Config(_))));
    }
}
