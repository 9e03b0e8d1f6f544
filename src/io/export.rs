//! Export per-case evaluation results to CSV.
//!
//! One row per evaluated record, in dataset order, so the file lines up with
//! the input for spreadsheet work.

use std::path::Path;

use serde::Serialize;

use crate::domain::CaseResult;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    case: usize,
    trip_duration_days: u32,
    miles_traveled: f64,
    total_receipts_amount: f64,
    expected_output: f64,
    predicted: String,
    error: String,
    abs_error: String,
    path: &'a str,
    confidence: String,
}

/// Write per-case results to a CSV file.
pub fn write_results_csv(path: &Path, results: &[CaseResult]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::usage(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for (i, r) in results.iter().enumerate() {
        let input = &r.record.input;
        writer
            .serialize(ResultRow {
                case: i + 1,
                trip_duration_days: input.days,
                miles_traveled: input.miles,
                total_receipts_amount: input.receipts,
                expected_output: r.record.expected,
                predicted: format!("{:.2}", r.predicted),
                error: format!("{:.2}", r.error()),
                abs_error: format!("{:.2}", r.abs_error()),
                path: r.path.label(),
                confidence: format!("{:.4}", r.confidence),
            })
            .map_err(|e| AppError::usage(format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::usage(format!("Failed to flush export CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResolutionPath, TripInput, TripRecord};

    #[test]
    fn writes_header_and_one_row_per_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let results = vec![
            CaseResult {
                record: TripRecord {
                    input: TripInput::new(3, 93.0, 1.42).unwrap(),
                    expected: 364.51,
                },
                predicted: 364.51,
                path: ResolutionPath::Exact,
                confidence: 1.0,
            },
            CaseResult {
                record: TripRecord {
                    input: TripInput::new(5, 250.0, 800.0).unwrap(),
                    expected: 1000.0,
                },
                predicted: 987.654,
                path: ResolutionPath::Formula,
                confidence: 0.1,
            },
        ];
        write_results_csv(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("case,trip_duration_days,miles_traveled"));
        assert!(lines[1].contains(",exact,"));
        assert!(lines[2].contains("987.65,-12.35,12.35,formula,0.1000"));
    }
}
