//! Exploratory statistics over the reference dataset.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::TripRecord;
use crate::error::AppError;
use crate::math::{Summary, correlation, mean};

/// Width of a miles-per-day bucket.
pub const EFFICIENCY_BUCKET: f64 = 25.0;
/// Receipt-total ranges; the last is open-ended.
pub const RECEIPT_EDGES: [f64; 6] = [0.0, 50.0, 200.0, 500.0, 1000.0, 2000.0];

#[derive(Debug, Clone, Serialize)]
pub struct DurationGroup {
    pub days: u32,
    pub n: usize,
    pub mean_output: f64,
    pub mean_per_day: f64,
    pub mean_miles_per_day: f64,
    pub mean_receipts_per_day: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeGroup {
    pub lo: f64,
    /// `None` for the open last range.
    pub hi: Option<f64>,
    pub n: usize,
    pub mean_output: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCorrelation {
    pub feature: &'static str,
    pub r: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub n: usize,
    pub days: Summary,
    pub miles: Summary,
    pub receipts: Summary,
    pub output: Summary,
    pub by_duration: Vec<DurationGroup>,
    pub by_efficiency: Vec<RangeGroup>,
    pub by_receipts: Vec<RangeGroup>,
    pub correlations: Vec<FeatureCorrelation>,
}

pub fn analyze(records: &[TripRecord]) -> Result<Analysis, AppError> {
    let col = |f: fn(&TripRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };
    let days = col(|r| r.input.days_f64());
    let miles = col(|r| r.input.miles);
    let receipts = col(|r| r.input.receipts);
    let output = col(|r| r.expected);
    let miles_per_day = col(|r| r.input.miles_per_day());
    let receipts_per_day = col(|r| r.input.receipts_per_day());

    let summary = |v: &[f64]| Summary::of(v).ok_or_else(|| AppError::data("No records to analyze."));

    let correlations = [
        ("days", &days),
        ("miles", &miles),
        ("receipts", &receipts),
        ("miles_per_day", &miles_per_day),
        ("receipts_per_day", &receipts_per_day),
    ]
    .into_iter()
    .map(|(feature, xs)| FeatureCorrelation {
        feature,
        r: correlation(xs, &output),
    })
    .collect();

    Ok(Analysis {
        n: records.len(),
        days: summary(&days)?,
        miles: summary(&miles)?,
        receipts: summary(&receipts)?,
        output: summary(&output)?,
        by_duration: by_duration(records),
        by_efficiency: by_efficiency(records),
        by_receipts: by_receipts(records),
        correlations,
    })
}

fn by_duration(records: &[TripRecord]) -> Vec<DurationGroup> {
    let mut groups: BTreeMap<u32, Vec<&TripRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(r.input.days).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(days, rs)| {
            let avg = |f: &dyn Fn(&TripRecord) -> f64| {
                mean(&rs.iter().map(|r| f(r)).collect::<Vec<_>>()).unwrap_or(0.0)
            };
            DurationGroup {
                days,
                n: rs.len(),
                mean_output: avg(&|r| r.expected),
                mean_per_day: avg(&|r| r.expected / r.input.days_f64()),
                mean_miles_per_day: avg(&|r| r.input.miles_per_day()),
                mean_receipts_per_day: avg(&|r| r.input.receipts_per_day()),
            }
        })
        .collect()
}

fn by_efficiency(records: &[TripRecord]) -> Vec<RangeGroup> {
    let mut buckets: BTreeMap<u64, Vec<f64>> = BTreeMap::new();
    for r in records {
        let b = (r.input.miles_per_day() / EFFICIENCY_BUCKET).floor() as u64;
        buckets.entry(b).or_default().push(r.expected);
    }
    buckets
        .into_iter()
        .map(|(b, outs)| RangeGroup {
            lo: b as f64 * EFFICIENCY_BUCKET,
            hi: Some((b + 1) as f64 * EFFICIENCY_BUCKET),
            n: outs.len(),
            mean_output: mean(&outs).unwrap_or(0.0),
        })
        .collect()
}

fn by_receipts(records: &[TripRecord]) -> Vec<RangeGroup> {
    let mut out = Vec::with_capacity(RECEIPT_EDGES.len());
    for (i, &lo) in RECEIPT_EDGES.iter().enumerate() {
        let hi = RECEIPT_EDGES.get(i + 1).copied();
        let outs: Vec<f64> = records
            .iter()
            .filter(|r| r.input.receipts >= lo && hi.is_none_or(|h| r.input.receipts < h))
            .map(|r| r.expected)
            .collect();
        if outs.is_empty() {
            continue;
        }
        out.push(RangeGroup {
            lo,
            hi,
            n: outs.len(),
            mean_output: mean(&outs).unwrap_or(0.0),
        });
    }
    out
}
