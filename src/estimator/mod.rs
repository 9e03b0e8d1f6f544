//! The three-stage reimbursement estimator.
//!
//! 1. exact match on the quantized `(days, miles, round(receipts))` key
//! 2. interpolation over the nearest reference records, when the closest one
//!    is within `max_distance` (a blend also mixes in the formula)
//! 3. the closed-form fallback formula
//!
//! Non-exact results are optionally shrunk toward a linear baseline, then
//! clamped to the configured bounds and quantized to cents. Exact matches are
//! returned verbatim.

pub mod formula;
pub mod index;
pub mod neighbors;

pub use formula::*;
pub use index::*;
pub use neighbors::*;

use crate::domain::{Estimate, EstimatorConfig, Interpolation, ResolutionPath, TripInput};
use crate::error::AppError;

/// Borrowing view over an index and a configuration.
///
/// Cheap to construct; build one per reference set (e.g. per CV fold).
#[derive(Debug, Clone, Copy)]
pub struct Estimator<'a> {
    index: &'a ReferenceIndex,
    config: &'a EstimatorConfig,
}

impl<'a> Estimator<'a> {
    pub fn new(index: &'a ReferenceIndex, config: &'a EstimatorConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self { index, config })
    }

    /// Amount only.
    pub fn amount(&self, input: &TripInput) -> f64 {
        self.estimate(input).amount
    }

    pub fn estimate(&self, input: &TripInput) -> Estimate {
        let cfg = self.config;

        if cfg.lookup.enabled {
            if let Some(record) = self.index.exact(input) {
                return Estimate {
                    amount: record.expected,
                    path: ResolutionPath::Exact,
                    confidence: 1.0,
                    neighbors: Vec::new(),
                };
            }
        }

        let mut confidence = 0.0;
        if cfg.neighbors.enabled && !self.index.is_empty() {
            let records = self.index.records();
            let near = nearest(&cfg.neighbors, input, records);
            if let Some(&(_, closest)) = near.first() {
                confidence = similarity(closest);
                if closest <= cfg.neighbors.max_distance {
                    if let Some((value, matches)) = interpolate(&cfg.neighbors, input, records, &near) {
                        let value = match cfg.neighbors.interpolation {
                            Interpolation::Blend => cfg.neighbors.blend.with_formula(value, self.formula_value(input)),
                            _ => value,
                        };
                        return Estimate {
                            amount: self.finish(input, value, confidence),
                            path: ResolutionPath::Neighbors,
                            confidence,
                            neighbors: matches,
                        };
                    }
                }
            }
        }

        Estimate {
            amount: self.finish(input, self.formula_value(input), confidence),
            path: ResolutionPath::Formula,
            confidence,
            neighbors: Vec::new(),
        }
    }

    /// Scaled formula total, before shrinkage and clamping.
    fn formula_value(&self, input: &TripInput) -> f64 {
        raw_total(&self.config.formula, input) * self.config.formula.scale
    }

    fn finish(&self, input: &TripInput, value: f64, confidence: f64) -> f64 {
        let value = match &self.config.shrinkage {
            Some(s) => {
                let strength = s.strength_for(confidence);
                let baseline = s
                    .baseline
                    .predict(input.days_f64(), input.miles, input.receipts);
                value * (1.0 - strength) + baseline * strength
            }
            None => value,
        };
        self.config.bounds.apply(input, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Preset, TripRecord};
    use crate::math::is_cents;

    fn rec(days: u32, miles: f64, receipts: f64, expected: f64) -> TripRecord {
        TripRecord {
            input: TripInput::new(days, miles, receipts).unwrap(),
            expected,
        }
    }

    fn q(days: u32, miles: f64, receipts: f64) -> TripInput {
        TripInput::new(days, miles, receipts).unwrap()
    }

    fn reference() -> ReferenceIndex {
        ReferenceIndex::new(vec![
            rec(3, 93.0, 1.42, 494.63),
            rec(5, 250.0, 800.0, 1120.45),
            rec(5, 260.0, 810.0, 1131.10),
            rec(1, 55.0, 3.6, 126.06),
            rec(8, 800.0, 1500.0, 1800.32),
        ])
    }

    #[test]
    fn exact_match_returns_reference_output() {
        let index = reference();
        let cfg = Preset::Hybrid.config();
        let est = Estimator::new(&index, &cfg).unwrap();
        let e = est.estimate(&q(3, 93.0, 1.42));
        assert_eq!(e.amount, 494.63);
        assert_eq!(e.path, ResolutionPath::Exact);
        assert_eq!(e.confidence, 1.0);
    }

    #[test]
    fn close_query_uses_neighbors_far_query_uses_formula() {
        let index = reference();
        let cfg = Preset::Hybrid.config();
        let est = Estimator::new(&index, &cfg).unwrap();

        let near = est.estimate(&q(5, 255.0, 805.0));
        assert_eq!(near.path, ResolutionPath::Neighbors);
        assert!(!near.neighbors.is_empty());
        assert!(near.amount > 1100.0 && near.amount < 1150.0, "{}", near.amount);

        let far = est.estimate(&q(12, 100.0, 100.0));
        assert_eq!(far.path, ResolutionPath::Formula);
        assert!(far.confidence < 0.5);
    }

    #[test]
    fn blend_mixes_both_neighbor_modes_with_formula() {
        let index = reference();
        let query = q(5, 255.0, 805.0);
        let with = |interpolation| {
            let mut cfg = Preset::Hybrid.config();
            cfg.neighbors.interpolation = interpolation;
            cfg
        };

        let blend_cfg = with(Interpolation::Blend);
        let e = Estimator::new(&index, &blend_cfg).unwrap().estimate(&query);
        assert_eq!(e.path, ResolutionPath::Neighbors);

        let raw = |cfg: &EstimatorConfig| {
            let near = nearest(&cfg.neighbors, &query, index.records());
            interpolate(&cfg.neighbors, &query, index.records(), &near).unwrap().0
        };
        let plain = raw(&with(Interpolation::InverseDistance));
        let moved = raw(&with(Interpolation::LocalExtrapolation));
        let formula = raw_total(&blend_cfg.formula, &query) * blend_cfg.formula.scale;
        let expected = blend_cfg
            .bounds
            .apply(&query, 0.4 * plain + 0.4 * moved + 0.2 * formula);
        assert!((e.amount - expected).abs() <= 0.011, "{} vs {expected}", e.amount);
    }

    #[test]
    fn formula_preset_ignores_reference_data() {
        let index = reference();
        let cfg = Preset::Formula.config();
        let est = Estimator::new(&index, &cfg).unwrap();
        let e = est.estimate(&q(3, 93.0, 1.42));
        assert_eq!(e.path, ResolutionPath::Formula);
        assert_eq!(e.amount, formula_amount(&cfg.formula, &cfg.bounds, &q(3, 93.0, 1.42)));
    }

    #[test]
    fn neighbors_preset_never_falls_back_with_data() {
        let index = reference();
        let cfg = Preset::Neighbors.config();
        let est = Estimator::new(&index, &cfg).unwrap();
        assert_eq!(est.estimate(&q(14, 2000.0, 100.0)).path, ResolutionPath::Neighbors);

        let empty = ReferenceIndex::default();
        let est = Estimator::new(&empty, &cfg).unwrap();
        assert_eq!(est.estimate(&q(14, 2000.0, 100.0)).path, ResolutionPath::Formula);
    }

    #[test]
    fn estimates_are_idempotent_bounded_and_quantized() {
        let index = reference();
        for preset in Preset::ALL {
            let cfg = preset.config();
            let est = Estimator::new(&index, &cfg).unwrap();
            for days in [1, 2, 4, 6, 10, 14] {
                for miles in [0.0, 47.5, 300.0, 1200.0] {
                    for receipts in [0.0, 12.34, 900.0, 2400.0] {
                        let query = q(days, miles, receipts);
                        let a = est.estimate(&query);
                        let b = est.estimate(&query);
                        assert_eq!(a, b);
                        assert!(is_cents(a.amount));
                        if a.path != ResolutionPath::Exact {
                            let (lo, hi) = cfg.bounds.range(&query);
                            assert!(a.amount >= lo && a.amount <= hi);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn unseen_four_day_trip_stays_within_bounds() {
        let index = reference();
        let cfg = Preset::Hybrid.config();
        let est = Estimator::new(&index, &cfg).unwrap();
        let query = q(4, 862.0, 2335.55);
        let e = est.estimate(&query);
        assert_eq!(e.path, ResolutionPath::Formula);
        // Mileage past the 800-mile knee earns the efficiency rate.
        assert!(mileage_contribution(&cfg.formula, 4, 862.0) > 862.0 * cfg.formula.per_mile);
        let (lo, hi) = cfg.bounds.range(&query);
        assert!(e.amount >= lo && e.amount <= hi);
    }

    #[test]
    fn shrinkage_pulls_toward_baseline() {
        let index = ReferenceIndex::default();
        let plain = Preset::Formula.config();
        let mut shrunk = plain.clone();
        shrunk.shrinkage = Some(crate::domain::Shrinkage::graded(
            crate::domain::LinearBaseline::conservative(),
        ));
        let query = q(3, 100.0, 100.0);
        let a = Estimator::new(&index, &plain).unwrap().amount(&query);
        let b = Estimator::new(&index, &shrunk).unwrap().amount(&query);
        let baseline = 280.0 * 3.0 + 33.0 + 38.0;
        // Zero confidence -> the 0.20 step.
        let expected = crate::math::round_cents(a * 0.8 + baseline * 0.2);
        assert!((b - expected).abs() <= 0.011, "{b} vs {expected}");
    }
}
