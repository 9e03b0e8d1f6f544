//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads the dataset and resolves the estimator configuration
//! - runs the requested subcommand
//! - prints reports/plots and writes optional exports

use clap::Parser;
use tracing::info;

use crate::calibrate::{CalibrateOptions, GridSpec, calibrate};
use crate::cli::{
    CalibrateArgs, Command, CrossValidateArgs, DataArgs, EvaluateArgs, FitArgs, PredictArgs, PresetsArgs,
    RobustnessArgs,
};
use crate::domain::{Preset, Shrinkage, TripInput};
use crate::error::AppError;
use crate::estimator::{Estimator, ReferenceIndex};
use crate::evaluate::{EvalMode, Metrics, RobustnessOptions, cross_validate, evaluate, robustness_probe};
use crate::io::{CalibrationFile, config_to_json, write_calibration_file, write_results_csv};
use crate::regression::{FitOptions, fit_linear_baseline};
use crate::report;

pub mod pipeline;

/// Entry point for the `reimburse` binary.
pub fn run() -> Result<(), AppError> {
    // `reimburse` alone evaluates, `reimburse D M R` predicts. Clap requires a
    // subcommand name, so argv is rewritten before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    crate::logging::init(cli.verbose);

    match cli.command {
        Command::Predict(args) => handle_predict(args),
        Command::Evaluate(args) => handle_evaluate(args),
        Command::CrossValidate(args) => handle_cross_validate(args),
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Robustness(args) => handle_robustness(args),
        Command::Presets(args) => handle_presets(args),
    }
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let input = TripInput::new(args.days, args.miles, args.receipts)?;
    let config = pipeline::resolve_config(&args.estimator)?;

    let index = if pipeline::needs_reference_data(&config) {
        ReferenceIndex::new(pipeline::load_dataset(&args.data)?.records)
    } else {
        ReferenceIndex::default()
    };
    let est = Estimator::new(&index, &config)?;
    let estimate = est.estimate(&input);

    if args.explain {
        print!("{}", report::format_explanation(&input, &estimate, &index, &config));
    } else {
        println!("{}", report::format_amount(estimate.amount));
    }
    Ok(())
}

fn handle_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let session = pipeline::load_session(&args.data, &args.estimator)?;
    let mode = if args.leave_one_out {
        EvalMode::LeaveOneOut
    } else {
        EvalMode::InSample
    };

    let results = evaluate(&session.cases.records, &session.config, mode)?;
    let metrics = Metrics::from_results(&results)
        .ok_or_else(|| AppError::data("No cases were evaluated."))?;

    println!(
        "{}",
        report::format_dataset_summary(&session.cases, Some(session.index.stats()))
    );
    println!(
        "Mode: {}",
        match mode {
            EvalMode::InSample => "in-sample",
            EvalMode::LeaveOneOut => "leave-one-out",
        }
    );
    println!("{}", report::format_metrics(&metrics));
    if args.top > 0 {
        println!("{}", report::format_worst_cases(&results, args.top));
    }

    if args.plot {
        println!("{}", crate::plot::render_scatter(&results, args.width, args.height));
    }
    if let Some(path) = &args.export {
        write_results_csv(path, &results)?;
        info!(path = %path.display(), "wrote per-case results");
    }
    Ok(())
}

fn handle_cross_validate(args: CrossValidateArgs) -> Result<(), AppError> {
    let session = pipeline::load_session(&args.data, &args.estimator)?;
    let cv = cross_validate(&session.cases.records, &session.config, args.folds, args.seed)?;

    println!("{}", report::format_dataset_summary(&session.cases, None));
    println!("{}", report::format_cross_validation(&cv, args.seed));
    Ok(())
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let session = pipeline::load_session(&args.data, &args.estimator)?;

    let defaults = GridSpec::default();
    let pick = |given: &Vec<f64>, fallback: Vec<f64>| if given.is_empty() { fallback } else { given.clone() };
    let grid = GridSpec {
        per_trip: pick(&args.per_trip, defaults.per_trip),
        per_day: pick(&args.per_day, defaults.per_day),
        per_mile: pick(&args.per_mile, defaults.per_mile),
        receipt_rate_1: pick(&args.rate1, defaults.receipt_rate_1),
        receipt_rate_2: pick(&args.rate2, defaults.receipt_rate_2),
        receipt_rate_beyond: pick(&args.rate3, defaults.receipt_rate_beyond),
    };
    let opts = CalibrateOptions {
        folds: args.folds,
        seed: args.seed,
        top: args.top,
    };

    let outcome = calibrate(&session.cases.records, &session.config, &grid, &opts)?;

    println!("{}", report::format_dataset_summary(&session.cases, None));
    println!("{}", report::format_calibration(&outcome));

    if let Some(path) = &args.export_config {
        let mut file = CalibrationFile::new(
            "calibrate",
            session.cases.rows_used(),
            outcome.best.mae,
            outcome.config.clone(),
        );
        if opts.folds >= 2 {
            file.folds = Some(opts.folds);
            file.seed = Some(opts.seed);
        }
        file.cv_mae = outcome.cv_mae;
        write_calibration_file(path, &file)?;
        println!("Wrote calibrated config to {}", path.display());
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let session = pipeline::load_session(&args.data, &args.estimator)?;
    let opts = FitOptions {
        robust: args.robust,
        robust_k: args.robust_k,
        max_iter: args.max_iter,
    };
    let fit = fit_linear_baseline(&session.cases.records, &opts)?;

    println!("{}", report::format_dataset_summary(&session.cases, None));
    println!("{}", report::format_linear_fit(&fit));

    if let Some(path) = &args.export_config {
        let mut config = session.config.clone();
        config.shrinkage = Some(match config.shrinkage.take() {
            Some(s) => Shrinkage {
                baseline: fit.baseline,
                ..s
            },
            None => Shrinkage::graded(fit.baseline),
        });
        let file = CalibrationFile::new("fit", fit.n, fit.mae, config);
        write_calibration_file(path, &file)?;
        println!("Wrote config with fitted baseline to {}", path.display());
    }
    Ok(())
}

fn handle_analyze(args: DataArgs) -> Result<(), AppError> {
    let cases = pipeline::load_dataset(&args)?;
    let analysis = crate::analyze::analyze(&cases.records)?;

    println!("{}", report::format_dataset_summary(&cases, None));
    print!("{}", report::format_analysis(&analysis));
    Ok(())
}

fn handle_robustness(args: RobustnessArgs) -> Result<(), AppError> {
    let session = pipeline::load_session(&args.data, &args.estimator)?;
    let est = session.estimator()?;
    let opts = RobustnessOptions {
        samples: args.samples,
        trials: args.trials,
        miles_sd: args.miles_sd,
        receipts_sd: args.receipts_sd,
        seed: args.seed,
    };
    let probe = robustness_probe(&est, &session.cases.records, &opts)?;

    print!("{}", report::format_robustness(&probe));
    Ok(())
}

fn handle_presets(args: PresetsArgs) -> Result<(), AppError> {
    let presets: Vec<Preset> = match args.name {
        Some(p) => vec![p],
        None => Preset::ALL.to_vec(),
    };
    for p in presets {
        println!("# {}", p.name());
        println!("{}", config_to_json(&p.config())?);
    }
    Ok(())
}

/// Rewrite argv so the bare positional form keeps working.
///
/// Rules (after any leading `-v`/`--verbose` flags):
/// - `reimburse`                    -> `reimburse evaluate`
/// - `reimburse <days> <miles> <r>` -> `reimburse predict <days> <miles> <r>`
/// - `reimburse --preset formula <days> <miles> <r>` -> `reimburse predict ...`
/// - `reimburse --cases x.json`     -> `reimburse evaluate --cases x.json`
/// - `--help/--version/-h`, subcommands -> unchanged
pub fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let first = argv
        .iter()
        .skip(1)
        .position(|a| !is_verbosity_flag(a))
        .map(|p| p + 1);

    let Some(pos) = first else {
        argv.push("evaluate".to_string());
        return argv;
    };
    let arg = argv[pos].as_str();

    let is_help_or_version = matches!(arg, "-h" | "--help" | "-V" | "--version" | "help");
    let is_subcommand = matches!(
        arg,
        "predict" | "evaluate" | "cross-validate" | "calibrate" | "fit" | "analyze" | "robustness" | "presets"
    );
    if is_help_or_version || is_subcommand {
        return argv;
    }

    if arg.parse::<f64>().is_ok() || has_trip_triple(&argv[pos..]) {
        argv.insert(pos, "predict".to_string());
    } else if arg.starts_with('-') {
        argv.insert(pos, "evaluate".to_string());
    }
    argv
}

/// Three consecutive numeric tokens: the positional trip after leading flags.
fn has_trip_triple(args: &[String]) -> bool {
    args.windows(3)
        .any(|w| w.iter().all(|a| a.parse::<f64>().is_ok()))
}

fn is_verbosity_flag(arg: &str) -> bool {
    arg == "--verbose" || (arg.len() > 1 && arg.starts_with('-') && arg[1..].chars().all(|c| c == 'v'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_evaluates() {
        assert_eq!(rewrite_args(argv(&["reimburse"])), argv(&["reimburse", "evaluate"]));
        assert_eq!(rewrite_args(argv(&["reimburse", "-vv"])), argv(&["reimburse", "-vv", "evaluate"]));
    }

    #[test]
    fn positional_numbers_predict() {
        assert_eq!(
            rewrite_args(argv(&["reimburse", "3", "93", "1.42"])),
            argv(&["reimburse", "predict", "3", "93", "1.42"])
        );
        assert_eq!(
            rewrite_args(argv(&["reimburse", "-v", "5", "100", "20"])),
            argv(&["reimburse", "-v", "predict", "5", "100", "20"])
        );
    }

    #[test]
    fn flags_before_positional_numbers_still_predict() {
        assert_eq!(
            rewrite_args(argv(&["reimburse", "--preset", "formula", "3", "93", "1.42"])),
            argv(&["reimburse", "predict", "--preset", "formula", "3", "93", "1.42"])
        );
        // A lone numeric flag value is not a trip.
        assert_eq!(
            rewrite_args(argv(&["reimburse", "--top", "10", "--plot"])),
            argv(&["reimburse", "evaluate", "--top", "10", "--plot"])
        );

        let cli = crate::cli::Cli::try_parse_from(rewrite_args(argv(&[
            "reimburse", "--preset", "formula", "3", "93", "1.42",
        ])))
        .unwrap();
        match cli.command {
            Command::Predict(a) => {
                assert_eq!(a.days, 3);
                assert_eq!(a.estimator.preset, Preset::Formula);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_and_subcommands() {
        assert_eq!(
            rewrite_args(argv(&["reimburse", "--cases", "x.json"])),
            argv(&["reimburse", "evaluate", "--cases", "x.json"])
        );
        assert_eq!(rewrite_args(argv(&["reimburse", "analyze"])), argv(&["reimburse", "analyze"]));
        assert_eq!(rewrite_args(argv(&["reimburse", "--help"])), argv(&["reimburse", "--help"]));
    }

    #[test]
    fn rewritten_args_parse() {
        let cli = crate::cli::Cli::try_parse_from(rewrite_args(argv(&["reimburse", "3", "93", "1.42"]))).unwrap();
        assert!(matches!(cli.command, Command::Predict(_)));
        let cli = crate::cli::Cli::try_parse_from(rewrite_args(argv(&["reimburse"]))).unwrap();
        assert!(matches!(cli.command, Command::Evaluate(_)));
    }
}
