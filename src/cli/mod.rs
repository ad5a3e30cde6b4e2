//! Command-line parsing for the `vhe` spectral analysis tool.
//!
//! Argument parsing and command dispatch stay separate from the analysis
//! code; flags only override values of the analysis configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{FitMode, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "vhe", version, about = "On/off spectral analysis of very-high-energy gamma-ray observations")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log as newline-delimited JSON on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select, reduce, stack, fit and compare hypotheses, estimate flux points.
    Analyze(AnalyzeArgs),
    /// Write a synthetic observation catalog.
    Simulate(SimulateArgs),
    /// Print the summary of a saved dataset.
    Info(InfoArgs),
    /// Plot a saved flux-point table.
    Plot(PlotArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct AnalyzeArgs {
    /// TOML analysis configuration. Defaults describe a Crab point-source analysis.
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Catalog directory holding obs-index.csv (overrides data.dir and $VHE_DATA).
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Hypotheses to fit, simplest first.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub hypotheses: Option<Vec<ModelKind>>,

    /// Fit the stacked dataset or all datasets jointly.
    #[arg(long, value_enum)]
    pub mode: Option<FitMode>,

    /// Pointing selection radius around the target (deg).
    #[arg(long)]
    pub radius: Option<f64>,

    /// Write the stacked dataset as JSON.
    #[arg(long, value_name = "JSON")]
    pub export_dataset: Option<PathBuf>,

    /// Write the flux points as CSV.
    #[arg(long, value_name = "CSV")]
    pub export_flux_points: Option<PathBuf>,

    /// Write all hypothesis fits and the comparison as JSON.
    #[arg(long, value_name = "JSON")]
    pub export_fits: Option<PathBuf>,

    /// Skip the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long)]
    pub width: Option<usize>,

    /// Plot height (rows).
    #[arg(long)]
    pub height: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output catalog directory (created if missing).
    #[arg(short, long, value_name = "DIR")]
    pub out: PathBuf,

    #[arg(short = 'n', long, default_value_t = 4)]
    pub n_obs: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Livetime per observation (s).
    #[arg(long, default_value_t = 1800.0)]
    pub livetime: f64,

    #[arg(long, default_value_t = 83.633, allow_negative_numbers = true)]
    pub source_ra: f64,

    #[arg(long, default_value_t = 22.014, allow_negative_numbers = true)]
    pub source_dec: f64,

    /// Differential flux at 1 TeV (cm-2 s-1 TeV-1).
    #[arg(long, default_value_t = 4e-11)]
    pub amplitude: f64,

    #[arg(long, default_value_t = 2.6)]
    pub index: f64,

    /// Exponential cut-off (TeV-1); 0 for a pure power law.
    #[arg(long, default_value_t = 0.0)]
    pub lambda: f64,

    /// Wobble offset (deg).
    #[arg(long, default_value_t = 0.5)]
    pub offset: f64,

    /// Background rate (events s-1 sr-1).
    #[arg(long, default_value_t = 1000.0)]
    pub background_rate: f64,
}

#[derive(Debug, Args, Clone)]
pub struct InfoArgs {
    /// Dataset JSON written by `vhe analyze --export-dataset`.
    #[arg(long, value_name = "JSON")]
    pub dataset: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Flux-point CSV written by `vhe analyze --export-flux-points`.
    #[arg(long, value_name = "CSV")]
    pub flux_points: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 18)]
    pub height: usize,
}
