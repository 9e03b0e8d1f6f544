//! Reference dataset ingest.
//!
//! Turns a JSON array of
//! `{ "input": { "trip_duration_days", "miles_traveled", "total_receipts_amount" }, "expected_output" }`
//! into validated `TripRecord`s.
//!
//! Malformed entries are skipped and reported as row errors rather than
//! failing the whole load; only a file that is unreadable, not a JSON array,
//! or has no usable entries at all is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::{TripInput, TripRecord};
use crate::error::AppError;
use crate::math::Summary;

/// Environment variable naming the dataset when `--cases` is not given.
pub const CASES_ENV: &str = "REIMBURSE_CASES";

/// Dataset used when neither `--cases` nor `REIMBURSE_CASES` is set.
pub const DEFAULT_CASES_PATH: &str = "public_cases.json";

#[derive(Debug, Deserialize)]
struct RawCase {
    input: RawInput,
    expected_output: f64,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    trip_duration_days: f64,
    miles_traveled: f64,
    total_receipts_amount: f64,
}

/// Column summaries over the records actually used.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_records: usize,
    pub days: Summary,
    pub miles: Summary,
    pub receipts: Summary,
    pub expected: Summary,
}

/// A dataset entry that could not be used.
#[derive(Debug, Clone)]
pub struct RowError {
    /// 1-based position in the JSON array.
    pub entry: usize,
    pub message: String,
}

/// Ingest output: validated records, stats and row errors.
#[derive(Debug, Clone)]
pub struct IngestedCases {
    pub source: PathBuf,
    pub records: Vec<TripRecord>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedCases {
    pub fn rows_used(&self) -> usize {
        self.records.len()
    }
}

/// `--cases` if given, else `REIMBURSE_CASES` (a `.env` file is honoured),
/// else `public_cases.json`.
pub fn resolve_cases_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    dotenvy::dotenv().ok();
    match std::env::var(CASES_ENV) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from(DEFAULT_CASES_PATH),
    }
}

/// Read and validate a dataset file.
pub fn load_cases(path: &Path) -> Result<IngestedCases, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::usage(format!("Failed to read dataset '{}': {e}", path.display())))?;
    let mut ingested = parse_cases(&text)?;
    ingested.source = path.to_path_buf();

    info!(
        path = %path.display(),
        rows_read = ingested.rows_read,
        rows_used = ingested.rows_used(),
        "loaded reference dataset"
    );
    Ok(ingested)
}

/// Parse dataset JSON text.
pub fn parse_cases(text: &str) -> Result<IngestedCases, AppError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| AppError::usage(format!("Dataset is not a JSON array of cases: {e}")))?;

    let rows_read = entries.len();
    let mut records = Vec::with_capacity(rows_read);
    let mut row_errors = Vec::new();

    for (idx, value) in entries.into_iter().enumerate() {
        let entry = idx + 1;
        match parse_entry(value) {
            Ok(record) => records.push(record),
            Err(message) => {
                debug!(entry, %message, "skipping dataset entry");
                row_errors.push(RowError { entry, message });
            }
        }
    }

    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), "some dataset entries were skipped");
    }

    let stats = compute_stats(&records)
        .ok_or_else(|| AppError::data("Dataset contains no usable cases."))?;

    Ok(IngestedCases {
        source: PathBuf::new(),
        records,
        stats,
        row_errors,
        rows_read,
    })
}

fn parse_entry(value: serde_json::Value) -> Result<TripRecord, String> {
    let raw: RawCase = serde_json::from_value(value).map_err(|e| format!("Malformed case: {e}"))?;
    let days = parse_days(raw.input.trip_duration_days)?;
    let input = TripInput::new(days, raw.input.miles_traveled, raw.input.total_receipts_amount)
        .map_err(|e| e.message().to_string())?;
    if !raw.expected_output.is_finite() {
        return Err("expected_output must be finite.".to_string());
    }
    Ok(TripRecord {
        input,
        expected: raw.expected_output,
    })
}

fn parse_days(v: f64) -> Result<u32, String> {
    if !(v.is_finite() && v.fract() == 0.0 && v >= 1.0 && v <= f64::from(u32::MAX)) {
        return Err(format!("trip_duration_days must be a positive integer (got {v})."));
    }
    Ok(v as u32)
}

fn compute_stats(records: &[TripRecord]) -> Option<DatasetStats> {
    let column = |f: fn(&TripRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };
    Some(DatasetStats {
        n_records: records.len(),
        days: Summary::of(&column(|r| r.input.days_f64()))?,
        miles: Summary::of(&column(|r| r.input.miles))?,
        receipts: Summary::of(&column(|r| r.input.receipts))?,
        expected: Summary::of(&column(|r| r.expected))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_DATA, EXIT_USAGE};

    const SAMPLE: &str = r#"[
        { "input": { "trip_duration_days": 3, "miles_traveled": 93, "total_receipts_amount": 1.42 }, "expected_output": 364.51 },
        { "input": { "trip_duration_days": 1, "miles_traveled": 55, "total_receipts_amount": 3.6 }, "expected_output": 126.06 },
        { "input": { "trip_duration_days": 0, "miles_traveled": 10, "total_receipts_amount": 1.0 }, "expected_output": 50.0 },
        { "input": { "trip_duration_days": 2.5, "miles_traveled": 10, "total_receipts_amount": 1.0 }, "expected_output": 50.0 },
        { "input": { "trip_duration_days": 2, "miles_traveled": -4, "total_receipts_amount": 1.0 }, "expected_output": 50.0 },
        { "input": { "trip_duration_days": 2 }, "expected_output": 50.0 },
        "not a case"
    ]"#;

    #[test]
    fn bad_entries_are_skipped_and_reported() {
        let got = parse_cases(SAMPLE).unwrap();
        assert_eq!(got.rows_read, 7);
        assert_eq!(got.rows_used(), 2);
        let skipped: Vec<usize> = got.row_errors.iter().map(|e| e.entry).collect();
        assert_eq!(skipped, vec![3, 4, 5, 6, 7]);

        assert_eq!(got.records[0].input.days, 3);
        assert_eq!(got.records[0].expected, 364.51);
        assert_eq!(got.stats.days.min, 1.0);
        assert_eq!(got.stats.days.max, 3.0);
        assert_eq!(got.stats.expected.max, 364.51);
    }

    #[test]
    fn empty_or_invalid_dataset_is_an_error() {
        assert_eq!(parse_cases("[]").unwrap_err().exit_code(), EXIT_DATA);
        assert_eq!(parse_cases(r#"[{"bogus": 1}]"#).unwrap_err().exit_code(), EXIT_DATA);
        assert_eq!(parse_cases("{}").unwrap_err().exit_code(), EXIT_USAGE);
    }

    #[test]
    fn missing_file_is_a_usage_error() {
        let err = load_cases(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            resolve_cases_path(Some(Path::new("mine.json"))),
            PathBuf::from("mine.json")
        );
    }
}
