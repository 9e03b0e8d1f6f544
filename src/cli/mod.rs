//! Command-line parsing for the reimbursement estimator.
//!
//! Argument parsing and command dispatch stay separate from the estimator
//! and evaluation code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{DistanceMetric, Interpolation, Preset};
use crate::regression::RobustKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "reimburse",
    version,
    about = "Travel-expense reimbursement estimator (lookup, nearest neighbours, fallback formula)"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate one trip and print the amount.
    #[command(allow_negative_numbers = true)]
    Predict(PredictArgs),
    /// Score the estimator over the dataset and print error metrics.
    Evaluate(EvaluateArgs),
    /// k-fold cross-validation of the configured estimator.
    CrossValidate(CrossValidateArgs),
    /// Grid-search the fallback formula coefficients.
    Calibrate(CalibrateArgs),
    /// Fit a linear baseline (output ~ days + miles + receipts).
    Fit(FitArgs),
    /// Dataset statistics, per-duration breakdown and correlations.
    Analyze(DataArgs),
    /// Measure how much predictions move under small input noise.
    Robustness(RobustnessArgs),
    /// Print preset configurations as JSON.
    Presets(PresetsArgs),
}

/// Where the reference dataset comes from.
#[derive(Debug, Args, Clone, Default)]
pub struct DataArgs {
    /// Reference dataset (JSON). Defaults to `$REIMBURSE_CASES`, then `public_cases.json`.
    #[arg(long, value_name = "JSON")]
    pub cases: Option<PathBuf>,
}

/// Estimator configuration: preset, optional file, then individual overrides.
#[derive(Debug, Args, Clone)]
pub struct EstimatorArgs {
    /// Named starting configuration.
    #[arg(long, value_enum, default_value_t = Preset::Hybrid)]
    pub preset: Preset,

    /// Estimator config or calibration file (JSON); replaces the preset.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Number of neighbours to interpolate.
    #[arg(long)]
    pub k: Option<usize>,

    /// Largest nearest-record distance at which the neighbour stage is used.
    #[arg(long)]
    pub max_distance: Option<f64>,

    /// Distance metric for the neighbour stage.
    #[arg(long, value_enum)]
    pub metric: Option<DistanceMetric>,

    /// How neighbour outputs are combined.
    #[arg(long, value_enum)]
    pub interpolation: Option<Interpolation>,

    /// Disable the exact-match stage.
    #[arg(long)]
    pub no_lookup: bool,

    /// Disable the neighbour stage.
    #[arg(long)]
    pub no_neighbors: bool,
}

impl Default for EstimatorArgs {
    fn default() -> Self {
        Self {
            preset: Preset::Hybrid,
            config: None,
            k: None,
            max_distance: None,
            metric: None,
            interpolation: None,
            no_lookup: false,
            no_neighbors: false,
        }
    }
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    /// Trip duration in days (integer, at least 1).
    pub days: u32,
    /// Miles traveled.
    pub miles: f64,
    /// Total receipts amount.
    pub receipts: f64,

    /// Also print the resolving stage, confidence, neighbours and bounds.
    #[arg(long)]
    pub explain: bool,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,
}

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Query each record against an index that excludes it.
    #[arg(long)]
    pub leave_one_out: bool,

    /// Show the N largest errors.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Render an ASCII expected-vs-predicted plot.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 60)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export per-case results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CrossValidateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    #[arg(long, default_value_t = 5)]
    pub folds: usize,

    /// Shuffle seed for fold assignment.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Per-trip values to search (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub per_trip: Vec<f64>,

    /// Per-day values to search.
    #[arg(long, value_delimiter = ',')]
    pub per_day: Vec<f64>,

    /// Per-mile values to search.
    #[arg(long, value_delimiter = ',')]
    pub per_mile: Vec<f64>,

    /// First receipt tier rates to search.
    #[arg(long, value_delimiter = ',')]
    pub rate1: Vec<f64>,

    /// Second receipt tier rates to search.
    #[arg(long, value_delimiter = ',')]
    pub rate2: Vec<f64>,

    /// Rates above the last tier to search.
    #[arg(long, value_delimiter = ',')]
    pub rate3: Vec<f64>,

    /// Folds for nested cross-validation (0 disables).
    #[arg(long, default_value_t = 5)]
    pub folds: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of ranked candidates to print.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Write the calibrated configuration to a JSON file usable with `--config`.
    #[arg(long, value_name = "JSON")]
    pub export_config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FitArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Robust reweighting.
    #[arg(long, value_enum, default_value_t = RobustKind::None)]
    pub robust: RobustKind,

    /// Huber tuning constant.
    #[arg(long, default_value_t = 1.345)]
    pub robust_k: f64,

    /// Maximum reweighting passes.
    #[arg(long, default_value_t = 10)]
    pub max_iter: usize,

    /// Write the configured estimator with the fit as its shrinkage baseline.
    #[arg(long, value_name = "JSON")]
    pub export_config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RobustnessArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Records probed, spread evenly over the dataset.
    #[arg(long, default_value_t = 10)]
    pub samples: usize,

    /// Perturbations per record.
    #[arg(long, default_value_t = 10)]
    pub trials: usize,

    /// Standard deviation of the miles noise.
    #[arg(long, default_value_t = 0.25)]
    pub miles_sd: f64,

    /// Standard deviation of the receipts noise.
    #[arg(long, default_value_t = 0.25)]
    pub receipts_sd: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args)]
pub struct PresetsArgs {
    /// Print only this preset.
    #[arg(long, value_enum)]
    pub name: Option<Preset>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_predict_with_overrides() {
        let cli = Cli::try_parse_from([
            "reimburse", "-vv", "predict", "3", "93", "1.42", "--preset", "conservative", "--k", "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Predict(a) => {
                assert_eq!(a.days, 3);
                assert_eq!(a.miles, 93.0);
                assert_eq!(a.estimator.preset, Preset::Conservative);
                assert_eq!(a.estimator.k, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn calibrate_lists_are_comma_separated() {
        let cli = Cli::try_parse_from(["reimburse", "calibrate", "--per-trip", "300,400", "--folds", "0"]).unwrap();
        match cli.command {
            Command::Calibrate(a) => {
                assert_eq!(a.per_trip, vec![300.0, 400.0]);
                assert!(a.per_day.is_empty());
                assert_eq!(a.folds, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
