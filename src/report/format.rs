//! Terminal formatting for every subcommand.
//!
//! Formatting stays here so the estimator and evaluation code return plain
//! data and output changes are localized.

use crate::analyze::{Analysis, RangeGroup};
use crate::calibrate::{CalibrationOutcome, Candidate};
use crate::domain::{CaseResult, Estimate, EstimatorConfig, TripInput};
use crate::estimator::{IndexStats, ReferenceIndex};
use crate::evaluate::{CrossValidation, Metrics, RobustnessReport, worst_cases};
use crate::io::IngestedCases;
use crate::math::Summary;
use crate::regression::LinearFit;

/// The one-shot prediction line.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Dataset header shared by the dataset-driven subcommands.
pub fn format_dataset_summary(cases: &IngestedCases, index: Option<IndexStats>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Dataset: {}\n", cases.source.display()));
    out.push_str(&format!(
        "Records: used={} read={} skipped={}\n",
        cases.rows_used(),
        cases.rows_read,
        cases.row_errors.len()
    ));
    for e in cases.row_errors.iter().take(5) {
        out.push_str(&format!("  entry {}: {}\n", e.entry, e.message));
    }
    if cases.row_errors.len() > 5 {
        out.push_str(&format!("  ... {} more\n", cases.row_errors.len() - 5));
    }
    if let Some(s) = index {
        out.push_str(&format!(
            "Index: distinct keys={} collisions={}\n",
            s.distinct_keys, s.collisions
        ));
    }
    out
}

/// `predict --explain`.
pub fn format_explanation(input: &TripInput, estimate: &Estimate, index: &ReferenceIndex, config: &EstimatorConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Query: days={} miles={} receipts={:.2}\n",
        input.days, input.miles, input.receipts
    ));
    out.push_str(&format!(
        "Resolved by: {} (confidence {:.4})\n",
        estimate.path.label(),
        estimate.confidence
    ));

    if !estimate.neighbors.is_empty() {
        out.push_str("Neighbours:\n");
        out.push_str(&format!(
            "  {:>5} {:>5} {:>9} {:>10} {:>10} {:>9} {:>8} {:>10}\n",
            "#", "days", "miles", "receipts", "output", "distance", "weight", "adjusted"
        ));
        for m in &estimate.neighbors {
            if let Some(r) = index.records().get(m.index) {
                out.push_str(&format!(
                    "  {:>5} {:>5} {:>9.2} {:>10.2} {:>10.2} {:>9.4} {:>8.4} {:>10.2}\n",
                    m.index + 1,
                    r.input.days,
                    r.input.miles,
                    r.input.receipts,
                    r.expected,
                    m.distance,
                    m.weight,
                    m.adjusted
                ));
            }
        }
    }

    let (lo, hi) = config.bounds.range(input);
    out.push_str(&format!("Bounds: [{lo:.2}, {hi:.2}]\n"));
    if let Some(s) = &config.shrinkage {
        out.push_str(&format!(
            "Shrinkage: strength {:.2} toward baseline {:.2}\n",
            s.strength_for(estimate.confidence),
            s.baseline.predict(input.days_f64(), input.miles, input.receipts)
        ));
    }
    out.push_str(&format!("Amount: {}\n", format_amount(estimate.amount)));
    out
}

pub fn format_metrics(m: &Metrics) -> String {
    let pct = |k: usize| 100.0 * k as f64 / m.n as f64;
    let mut out = String::new();
    out.push_str(&format!("Cases: {}\n", m.n));
    out.push_str(&format!("Exact (<$0.01):      {:>5} ({:.1}%)\n", m.exact, 100.0 * m.exact_rate()));
    out.push_str(&format!("Close (<$1.00):      {:>5} ({:.1}%)\n", m.close, pct(m.close)));
    out.push_str(&format!("Very close (<$10):   {:>5} ({:.1}%)\n", m.very_close, pct(m.very_close)));
    out.push_str(&format!("Mean abs error: ${:.2}\n", m.mae));
    out.push_str(&format!("RMSE:           ${:.2}\n", m.rmse));
    out.push_str(&format!("Max error:      ${:.2}\n", m.max_error));
    out.push_str(&format!(
        "Paths: exact={} neighbors={} formula={}\n",
        m.paths.exact, m.paths.neighbors, m.paths.formula
    ));
    out.push_str(&format!("Score: {:.2} (lower is better)\n", m.score));
    out
}

/// Largest-error cases table.
pub fn format_worst_cases(results: &[CaseResult], top: usize) -> String {
    let worst = worst_cases(results, top);
    if worst.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push_str(&format!("Top {} errors:\n", worst.len()));
    out.push_str(&format!(
        "{:>5} {:>5} {:>9} {:>10} {:>10} {:>10} {:>9} {:<9}\n",
        "case", "days", "miles", "receipts", "expected", "predicted", "error", "path"
    ));
    for (i, r) in worst {
        let input = &r.record.input;
        out.push_str(
            format!(
                "{:>5} {:>5} {:>9.2} {:>10.2} {:>10.2} {:>10.2} {:>9.2} {:<9}\n",
                i + 1,
                input.days,
                input.miles,
                input.receipts,
                r.record.expected,
                r.predicted,
                r.error(),
                r.path.label()
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

pub fn format_cross_validation(cv: &CrossValidation, seed: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("Cross-validation: {} folds, seed {seed}\n", cv.folds.len()));
    out.push_str(&format!(
        "{:>4} {:>7} {:>6} {:>7} {:>9} {:>9}\n",
        "fold", "train", "test", "exact", "mae", "max"
    ));
    for f in &cv.folds {
        out.push_str(&format!(
            "{:>4} {:>7} {:>6} {:>7} {:>9.2} {:>9.2}\n",
            f.fold + 1,
            f.n_train,
            f.metrics.n,
            f.metrics.exact,
            f.metrics.mae,
            f.metrics.max_error
        ));
    }
    out.push_str("\nPooled held-out metrics:\n");
    out.push_str(&format_metrics(&cv.pooled));
    out
}

pub fn format_calibration(outcome: &CalibrationOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!("Candidates evaluated: {}\n", outcome.candidates_evaluated));
    out.push_str(&format!(
        "{:>6} {:>9} {:>8} {:>8} {:>6} {:>6} {:>6} {:>9}\n",
        "index", "per_trip", "per_day", "per_mile", "r1", "r2", "r3", "mae"
    ));
    for rc in &outcome.ranked {
        out.push_str(&format_candidate_row(&rc.candidate, rc.mae));
    }

    if !outcome.folds.is_empty() {
        out.push_str("\nNested CV:\n");
        for f in &outcome.folds {
            out.push_str(&format!(
                "  fold {}: candidate {} train_mae={:.2} test_mae={:.2}\n",
                f.fold + 1,
                f.candidate_index,
                f.train_mae,
                f.test_mae
            ));
        }
    }
    if let Some(cv) = outcome.cv_mae {
        out.push_str(&format!("Out-of-fold MAE: ${cv:.2}\n"));
    }
    out.push_str(&format!(
        "Best (all records): candidate {} mae=${:.2}\n",
        outcome.best.candidate.index, outcome.best.mae
    ));
    out
}

fn format_candidate_row(c: &Candidate, mae: f64) -> String {
    format!(
        "{:>6} {:>9.2} {:>8.2} {:>8.3} {:>6.3} {:>6.3} {:>6.3} {:>9.2}\n",
        c.index, c.per_trip, c.per_day, c.per_mile, c.rates[0], c.rates[1], c.rates[2], mae
    )
}

pub fn format_linear_fit(fit: &LinearFit) -> String {
    let b = &fit.baseline;
    let mut out = String::new();
    out.push_str(&format!(
        "output ≈ {:.4} + {:.4}*days + {:.4}*miles + {:.4}*receipts\n",
        b.intercept, b.per_day, b.per_mile, b.per_receipt
    ));
    out.push_str(&format!(
        "n={} MAE=${:.2} RMSE=${:.2} R²={:.4} iterations={}\n",
        fit.n, fit.mae, fit.rmse, fit.r_squared, fit.iterations
    ));
    out
}

pub fn format_analysis(a: &Analysis) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total cases: {}\n\n", a.n));

    out.push_str(&format!(
        "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
        "field", "min", "max", "mean", "median", "std"
    ));
    for (name, s) in [
        ("days", &a.days),
        ("miles", &a.miles),
        ("receipts", &a.receipts),
        ("output", &a.output),
    ] {
        out.push_str(&format_summary_row(name, s));
    }

    out.push_str("\nBy trip duration:\n");
    out.push_str(&format!(
        "{:>5} {:>6} {:>11} {:>10} {:>10} {:>13}\n",
        "days", "n", "avg output", "avg/day", "miles/day", "receipts/day"
    ));
    for g in &a.by_duration {
        out.push_str(&format!(
            "{:>5} {:>6} {:>11.2} {:>10.2} {:>10.2} {:>13.2}\n",
            g.days, g.n, g.mean_output, g.mean_per_day, g.mean_miles_per_day, g.mean_receipts_per_day
        ));
    }

    out.push_str("\nBy miles per day:\n");
    out.push_str(&format_ranges(&a.by_efficiency));
    out.push_str("\nBy receipt total:\n");
    out.push_str(&format_ranges(&a.by_receipts));

    out.push_str("\nCorrelation with output:\n");
    for c in &a.correlations {
        match c.r {
            Some(r) => out.push_str(&format!("  {:<17} {r:>7.4}\n", c.feature)),
            None => out.push_str(&format!("  {:<17} {:>7}\n", c.feature, "n/a")),
        }
    }
    out
}

fn format_summary_row(name: &str, s: &Summary) -> String {
    format!(
        "{:<16} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}\n",
        name, s.min, s.max, s.mean, s.median, s.std_dev
    )
}

fn format_ranges(groups: &[RangeGroup]) -> String {
    let mut out = String::new();
    for g in groups {
        let label = match g.hi {
            Some(hi) => format!("{:.0}-{:.0}", g.lo, hi),
            None => format!("{:.0}+", g.lo),
        };
        out.push_str(&format!(
            "  {:<12} n={:<5} avg output ${:.2}\n",
            label, g.n, g.mean_output
        ));
    }
    out
}

pub fn format_robustness(r: &RobustnessReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Probed {} records x {} perturbations\n",
        r.samples,
        r.perturbations / r.samples.max(1)
    ));
    out.push_str(&format!("Mean prediction change: ${:.4}\n", r.mean_abs_change));
    out.push_str(&format!("Max prediction change:  ${:.4}\n", r.max_abs_change));
    out.push_str(&format!("Stage changes: {}\n", r.path_changes));
    out.push_str(&format!("Noise resistance: {:.4}\n", r.resistance));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResolutionPath, TripRecord};

    fn case(expected: f64, predicted: f64) -> CaseResult {
        CaseResult {
            record: TripRecord {
                input: TripInput::new(2, 10.0, 5.0).unwrap(),
                expected,
            },
            predicted,
            path: ResolutionPath::Formula,
            confidence: 0.0,
        }
    }

    #[test]
    fn amount_has_two_decimals() {
        assert_eq!(format_amount(494.63), "494.63");
        assert_eq!(format_amount(100.0), "100.00");
    }

    #[test]
    fn worst_cases_table_lists_largest_first() {
        let results = vec![case(100.0, 101.0), case(100.0, 150.0)];
        let txt = format_worst_cases(&results, 5);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "Top 2 errors:");
        assert!(lines[2].trim_start().starts_with("2 "));
        assert!(lines[2].contains("50.00"));
        assert!(lines[3].trim_start().starts_with("1 "));
    }

    #[test]
    fn metrics_block_mentions_score() {
        let m = Metrics::from_results(&[case(100.0, 100.0), case(100.0, 110.0)]).unwrap();
        let txt = format_metrics(&m);
        assert!(txt.contains("Exact (<$0.01):          1 (50.0%)"));
        assert!(txt.contains("Score: 15.00"));
    }
}
