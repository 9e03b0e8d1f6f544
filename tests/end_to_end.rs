use std::fs;
use std::path::Path;

use reimbursement_estimator::calibrate::{CalibrateOptions, GridSpec, calibrate};
use reimbursement_estimator::domain::{Preset, ResolutionPath, TripInput, TripRecord};
use reimbursement_estimator::estimator::{Estimator, ReferenceIndex, formula_amount};
use reimbursement_estimator::evaluate::{EvalMode, Metrics, cross_validate, evaluate};
use reimbursement_estimator::io::{
    CalibrationFile, LoadedConfig, load_cases, read_config_file, write_calibration_file, write_results_csv,
};
use serde_json::json;

/// Twelve distinct trips whose outputs follow a known formula.
fn target_records() -> Vec<TripRecord> {
    let mut config = Preset::Formula.config();
    config.formula.per_trip = 300.0;
    config.formula.per_day = 40.0;

    (1..=12u32)
        .map(|d| {
            let input = TripInput::new(d, 40.0 * f64::from(d) + 17.0, 55.5 * f64::from(d)).unwrap();
            TripRecord {
                input,
                expected: formula_amount(&config.formula, &config.bounds, &input),
            }
        })
        .collect()
}

fn write_dataset(path: &Path, records: &[TripRecord]) {
    let mut entries: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            json!({
                "input": {
                    "trip_duration_days": r.input.days,
                    "miles_traveled": r.input.miles,
                    "total_receipts_amount": r.input.receipts,
                },
                "expected_output": r.expected,
            })
        })
        .collect();
    // Zero-day trip is rejected at ingest.
    entries.push(json!({
        "input": { "trip_duration_days": 0, "miles_traveled": 10.0, "total_receipts_amount": 5.0 },
        "expected_output": 100.0,
    }));
    fs::write(path, serde_json::to_string_pretty(&entries).unwrap()).unwrap();
}

#[test]
fn dataset_file_drives_in_sample_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cases.json");
    let records = target_records();
    write_dataset(&path, &records);

    let cases = load_cases(&path).unwrap();
    assert_eq!(cases.rows_read, 13);
    assert_eq!(cases.rows_used(), 12);
    assert_eq!(cases.row_errors.len(), 1);
    assert_eq!(cases.row_errors[0].entry, 13);

    let results = evaluate(&cases.records, &Preset::Hybrid.config(), EvalMode::InSample).unwrap();
    let metrics = Metrics::from_results(&results).unwrap();
    assert_eq!(metrics.n, 12);
    assert_eq!(metrics.exact, 12);
    assert_eq!(metrics.paths.get(ResolutionPath::Exact), 12);
    assert_eq!(metrics.mae, 0.0);
}

#[test]
fn leave_one_out_never_answers_from_the_held_out_record() {
    let records = target_records();
    let results = evaluate(&records, &Preset::Hybrid.config(), EvalMode::LeaveOneOut).unwrap();
    let metrics = Metrics::from_results(&results).unwrap();
    assert_eq!(metrics.paths.get(ResolutionPath::Exact), 0);
    assert_eq!(results.len(), records.len());
}

#[test]
fn calibration_file_round_trips_into_the_estimator() {
    let dir = tempfile::tempdir().unwrap();
    let records = target_records();
    let grid = GridSpec {
        per_trip: vec![300.0, 400.0],
        per_day: vec![40.0, 50.0],
        per_mile: vec![Preset::Formula.config().formula.per_mile],
        receipt_rate_1: vec![Preset::Formula.config().formula.receipt_tiers[0].rate],
        receipt_rate_2: vec![Preset::Formula.config().formula.receipt_tiers[1].rate],
        receipt_rate_beyond: vec![Preset::Formula.config().formula.receipt_rate_beyond],
    };
    let opts = CalibrateOptions {
        folds: 3,
        seed: 11,
        top: 2,
    };

    let outcome = calibrate(&records, &Preset::Formula.config(), &grid, &opts).unwrap();
    assert_eq!(outcome.candidates_evaluated, 4);
    assert!(outcome.best.mae < 1e-9);
    assert_eq!(outcome.best.candidate.per_trip, 300.0);
    assert_eq!(outcome.best.candidate.per_day, 40.0);
    assert_eq!(outcome.folds.len(), 3);
    assert!(outcome.cv_mae.is_some());

    let path = dir.path().join("calibrated.json");
    let mut file = CalibrationFile::new("calibrate", records.len(), outcome.best.mae, outcome.config.clone());
    file.cv_mae = outcome.cv_mae;
    write_calibration_file(&path, &file).unwrap();

    let loaded = read_config_file(&path).unwrap();
    assert!(matches!(loaded, LoadedConfig::Calibration(_)));
    let config = loaded.into_config();
    assert_eq!(config, outcome.config);

    let results = evaluate(&records, &config, EvalMode::InSample).unwrap();
    let metrics = Metrics::from_results(&results).unwrap();
    assert_eq!(metrics.exact, 12);
    assert_eq!(metrics.paths.get(ResolutionPath::Formula), 12);
}

#[test]
fn cross_validation_is_reproducible() {
    let records = target_records();
    let config = Preset::Hybrid.config();

    let a = cross_validate(&records, &config, 4, 7).unwrap();
    let b = cross_validate(&records, &config, 4, 7).unwrap();
    assert_eq!(a.folds.len(), 4);
    assert_eq!(a.pooled.n, 12);
    assert_eq!(a.results, b.results);
    for (r, rec) in a.results.iter().zip(&records) {
        assert_eq!(r.record, *rec);
    }
}

#[test]
fn export_writes_one_row_per_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    let records = target_records();

    let results = evaluate(&records, &Preset::Formula.config(), EvalMode::InSample).unwrap();
    write_results_csv(&path, &results).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 13);
    assert!(lines[0].starts_with("case,trip_duration_days,miles_traveled"));
    assert!(lines[1].starts_with("1,1,57"));
}

#[test]
fn predictions_stay_in_bounds_for_unseen_trips() {
    let records = target_records();
    let index = ReferenceIndex::new(records);
    for preset in Preset::ALL {
        let config = preset.config();
        let est = Estimator::new(&index, &config).unwrap();
        for (d, m, r) in [(1, 0.0, 0.0), (7, 1200.0, 2400.0), (14, 90.0, 5.25)] {
            let input = TripInput::new(d, m, r).unwrap();
            let amount = est.amount(&input);
            let (lo, hi) = config.bounds.range(&input);
            assert!(amount >= lo - 1e-9 && amount <= hi + 1e-9, "{preset:?} {d} {m} {r} -> {amount}");
        }
    }
}
