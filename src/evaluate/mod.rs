//! Scoring the estimator against labeled records.
//!
//! - in-sample: every record is queried against an index that contains it
//!   (so the exact stage answers most of them)
//! - leave-one-out: each record is queried against an index without it
//! - k-fold cross-validation over a seeded shuffle
//! - a noise probe (`robustness`)

pub mod metrics;
pub mod robustness;

pub use metrics::*;
pub use robustness::*;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{CaseResult, EstimatorConfig, TripRecord};
use crate::error::AppError;
use crate::estimator::{Estimator, ReferenceIndex};

/// How each record's reference set is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    InSample,
    LeaveOneOut,
}

/// Score `records` and return one result per record, in input order.
pub fn evaluate(records: &[TripRecord], config: &EstimatorConfig, mode: EvalMode) -> Result<Vec<CaseResult>, AppError> {
    config.validate()?;
    let results = match mode {
        EvalMode::InSample => {
            let index = ReferenceIndex::new(records.to_vec());
            let est = Estimator::new(&index, config)?;
            records.iter().map(|r| score(&est, r)).collect()
        }
        EvalMode::LeaveOneOut => leave_one_out(records, config)?,
    };
    info!(n = records.len(), ?mode, "evaluation finished");
    Ok(results)
}

fn leave_one_out(records: &[TripRecord], config: &EstimatorConfig) -> Result<Vec<CaseResult>, AppError> {
    (0..records.len())
        .into_par_iter()
        .map(|i| {
            let index = ReferenceIndex::without(records, i);
            let est = Estimator::new(&index, config)?;
            Ok(score(&est, &records[i]))
        })
        .collect()
}

fn score(est: &Estimator<'_>, record: &TripRecord) -> CaseResult {
    let e = est.estimate(&record.input);
    CaseResult {
        record: *record,
        predicted: e.amount,
        path: e.path,
        confidence: e.confidence,
    }
}

/// Split `0..n` into `folds` disjoint test sets after a seeded shuffle.
///
/// Fold sizes differ by at most one. The same `(n, folds, seed)` always gives
/// the same split.
pub fn fold_assignments(n: usize, folds: usize, seed: u64) -> Result<Vec<Vec<usize>>, AppError> {
    if folds < 2 {
        return Err(AppError::usage("Cross-validation needs at least 2 folds."));
    }
    if n < folds {
        return Err(AppError::data(format!(
            "Cannot split {n} records into {folds} folds."
        )));
    }
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut out = vec![Vec::with_capacity(n / folds + 1); folds];
    for (pos, idx) in order.into_iter().enumerate() {
        out[pos % folds].push(idx);
    }
    for fold in &mut out {
        fold.sort_unstable();
    }
    Ok(out)
}

/// Training indices for a fold: everything not in `test`, ascending.
pub fn complement(n: usize, test: &[usize]) -> Vec<usize> {
    let mut held = vec![false; n];
    for &i in test {
        held[i] = true;
    }
    (0..n).filter(|&i| !held[i]).collect()
}

#[derive(Debug, Clone)]
pub struct FoldReport {
    pub fold: usize,
    pub n_train: usize,
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
pub struct CrossValidation {
    pub folds: Vec<FoldReport>,
    /// Metrics over all held-out predictions together.
    pub pooled: Metrics,
    /// Held-out prediction for every record, in input order.
    pub results: Vec<CaseResult>,
}

/// k-fold cross-validation of one configuration.
pub fn cross_validate(
    records: &[TripRecord],
    config: &EstimatorConfig,
    folds: usize,
    seed: u64,
) -> Result<CrossValidation, AppError> {
    config.validate()?;
    let assignments = fold_assignments(records.len(), folds, seed)?;

    let mut slots: Vec<Option<CaseResult>> = vec![None; records.len()];
    let mut reports = Vec::with_capacity(folds);
    for (fold, test) in assignments.iter().enumerate() {
        let train = complement(records.len(), test);
        let index = ReferenceIndex::from_subset(records, &train);
        let est = Estimator::new(&index, config)?;

        let fold_results: Vec<CaseResult> = test.iter().map(|&i| score(&est, &records[i])).collect();
        let metrics = Metrics::from_results(&fold_results)
            .ok_or_else(|| AppError::internal(format!("Fold {fold} has no test records.")))?;
        debug!(fold, n_train = train.len(), mae = metrics.mae, "fold scored");

        for (&i, r) in test.iter().zip(fold_results) {
            slots[i] = Some(r);
        }
        reports.push(FoldReport {
            fold,
            n_train: train.len(),
            metrics,
        });
    }

    let results: Vec<CaseResult> = slots.into_iter().flatten().collect();
    let pooled = Metrics::from_results(&results)
        .ok_or_else(|| AppError::data("Cross-validation produced no predictions."))?;

    info!(folds, seed, mae = pooled.mae, "cross-validation finished");
    Ok(CrossValidation {
        folds: reports,
        pooled,
        results,
    })
}
