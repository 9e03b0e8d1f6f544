//! Estimator configuration and named presets.
//!
//! Every knob of the three-stage estimator lives here so that a variant is a
//! value, not a program. Configs are serializable so calibrated settings can
//! be written to JSON and loaded back with `--config`.
//!
//! Coefficients in the presets are starting points observed to behave
//! reasonably on the reference dataset. They are not a claim about the true
//! reimbursement rules.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Full estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub lookup: LookupConfig,
    pub neighbors: NeighborConfig,
    pub formula: FormulaConfig,
    pub bounds: Bounds,
    /// Deterministic blending toward a conservative baseline for non-exact
    /// predictions. `None` disables it.
    pub shrinkage: Option<Shrinkage>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Preset::Hybrid.config()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub enabled: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// How per-dimension differences are combined into one distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Weighted sum of absolute differences.
    Manhattan,
    /// Square root of the weighted sum of squared differences.
    Euclidean,
}

/// How the k nearest records are turned into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Interpolation {
    /// Weighted mean of neighbour outputs, weights `1 / (1 + d)`.
    InverseDistance,
    /// Move each neighbour's output to the query using local per-unit rates,
    /// then take the inverse-distance weighted mean.
    LocalExtrapolation,
    /// Weighted ensemble of both of the above and the fallback formula
    /// (see [`BlendWeights`]).
    Blend,
}

/// Member weights for [`Interpolation::Blend`]. Normalized by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub inverse_distance: f64,
    pub extrapolation: f64,
    pub formula: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            inverse_distance: 0.4,
            extrapolation: 0.4,
            formula: 0.2,
        }
    }
}

impl BlendWeights {
    fn neighbor_share(&self) -> f64 {
        self.inverse_distance + self.extrapolation
    }

    /// One neighbour's contribution: its own output and its extrapolated
    /// output, mixed by the two neighbour weights.
    pub fn mix_neighbor(&self, expected: f64, extrapolated: f64) -> f64 {
        let share = self.neighbor_share();
        if share > 0.0 {
            (self.inverse_distance * expected + self.extrapolation * extrapolated) / share
        } else {
            expected
        }
    }

    /// Fold the fallback formula into an already mixed neighbour value.
    pub fn with_formula(&self, neighbors: f64, formula: f64) -> f64 {
        let share = self.neighbor_share();
        (share * neighbors + self.formula * formula) / (share + self.formula)
    }
}

/// Similarity-search stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborConfig {
    pub enabled: bool,
    pub k: usize,
    pub metric: DistanceMetric,
    pub weight_days: f64,
    pub weight_miles: f64,
    pub weight_receipts: f64,
    /// The stage only runs when the nearest record is at most this far away.
    pub max_distance: f64,
    pub interpolation: Interpolation,
    /// Fraction of a neighbour's output-per-day applied per day of difference.
    pub day_rate_factor: f64,
    /// Dollars per mile of difference.
    pub mile_rate: f64,
    pub receipt_rates: ReceiptRateBands,
    /// Only read by [`Interpolation::Blend`].
    pub blend: BlendWeights,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k: 3,
            metric: DistanceMetric::Manhattan,
            weight_days: 1.0,
            weight_miles: 0.01,
            weight_receipts: 0.001,
            max_distance: 0.25,
            interpolation: Interpolation::LocalExtrapolation,
            day_rate_factor: 0.8,
            mile_rate: 0.30,
            receipt_rates: ReceiptRateBands::default(),
            blend: BlendWeights::default(),
        }
    }
}

/// Receipt-dollar rate used by local extrapolation, selected by the query's
/// receipt total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptRateBands {
    pub low_below: f64,
    pub low_rate: f64,
    pub mid_rate: f64,
    pub high_above: f64,
    pub high_rate: f64,
}

impl Default for ReceiptRateBands {
    fn default() -> Self {
        Self {
            low_below: 500.0,
            low_rate: 0.5,
            mid_rate: 0.4,
            high_above: 1500.0,
            high_rate: 0.2,
        }
    }
}

impl ReceiptRateBands {
    pub fn rate_for(&self, receipts: f64) -> f64 {
        if receipts < self.low_below {
            self.low_rate
        } else if receipts > self.high_above {
            self.high_rate
        } else {
            self.mid_rate
        }
    }
}

/// One receipt tier: receipts up to `upper` earn `rate` per dollar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiptTier {
    pub upper: f64,
    pub rate: f64,
}

/// Replaces the marginal rate of a component past a threshold with
/// `rate + delta`, for trips of at most `max_days`. A negative `delta` lowers
/// the rate, a positive one raises it; the result is floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginalAdjustment {
    pub max_days: u32,
    pub threshold: f64,
    pub delta: f64,
}

/// Closed-form fallback:
/// `(per_trip / days + per_day) * days + mileage(miles) + receipts(receipts)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulaConfig {
    pub per_trip: f64,
    pub per_day: f64,
    pub per_mile: f64,
    /// Ascending by `upper`.
    pub receipt_tiers: Vec<ReceiptTier>,
    /// Rate for receipts above the last tier.
    pub receipt_rate_beyond: f64,
    /// Receipts above `threshold` on short trips (usually a lower rate).
    pub short_trip_receipts: Option<MarginalAdjustment>,
    /// Miles above `threshold * days` (a miles-per-day knee) on short trips
    /// (usually a higher rate).
    pub high_efficiency: Option<MarginalAdjustment>,
    /// Multiplier applied before clamping.
    pub scale: f64,
}

impl Default for FormulaConfig {
    fn default() -> Self {
        Self {
            per_trip: 400.0,
            per_day: 50.0,
            per_mile: 0.30,
            receipt_tiers: vec![
                ReceiptTier {
                    upper: 800.0,
                    rate: 0.50,
                },
                ReceiptTier {
                    upper: 1500.0,
                    rate: 0.35,
                },
            ],
            receipt_rate_beyond: 0.10,
            short_trip_receipts: Some(MarginalAdjustment {
                max_days: 3,
                threshold: 1800.0,
                delta: -0.2,
            }),
            // Trips of up to four days covering 200+ miles a day earn a
            // mileage bonus past the knee.
            high_efficiency: Some(MarginalAdjustment {
                max_days: 4,
                threshold: 200.0,
                delta: 1.0,
            }),
            scale: 1.0,
        }
    }
}

/// Output clamp: `[days * min_per_day, days * max_per_day + min(receipts * receipt_cap_rate, receipt_cap)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    pub min_per_day: f64,
    pub max_per_day: f64,
    pub receipt_cap_rate: f64,
    pub receipt_cap: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_per_day: 35.0,
            max_per_day: 600.0,
            receipt_cap_rate: 0.2,
            receipt_cap: 400.0,
        }
    }
}

/// `intercept + per_day * days + per_mile * miles + per_receipt * receipts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearBaseline {
    pub intercept: f64,
    pub per_day: f64,
    pub per_mile: f64,
    pub per_receipt: f64,
}

impl LinearBaseline {
    pub fn conservative() -> Self {
        Self {
            intercept: 0.0,
            per_day: 280.0,
            per_mile: 0.33,
            per_receipt: 0.38,
        }
    }

    pub fn predict(&self, days: f64, miles: f64, receipts: f64) -> f64 {
        self.intercept + self.per_day * days + self.per_mile * miles + self.per_receipt * receipts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShrinkStep {
    pub min_confidence: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shrinkage {
    pub baseline: LinearBaseline,
    /// Sorted by descending `min_confidence`; the first step whose threshold
    /// the confidence reaches decides the strength.
    pub schedule: Vec<ShrinkStep>,
}

impl Shrinkage {
    pub fn graded(baseline: LinearBaseline) -> Self {
        Self {
            baseline,
            schedule: vec![
                ShrinkStep {
                    min_confidence: 0.95,
                    strength: 0.02,
                },
                ShrinkStep {
                    min_confidence: 0.90,
                    strength: 0.05,
                },
                ShrinkStep {
                    min_confidence: 0.80,
                    strength: 0.10,
                },
                ShrinkStep {
                    min_confidence: 0.0,
                    strength: 0.20,
                },
            ],
        }
    }

    pub fn strength_for(&self, confidence: f64) -> f64 {
        self.schedule
            .iter()
            .find(|s| confidence >= s.min_confidence)
            .map(|s| s.strength)
            .unwrap_or(0.0)
    }
}

/// Named configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Exact lookup, then neighbours, then formula.
    Hybrid,
    /// Formula only; no reference data is consulted.
    Formula,
    /// Exact lookup, then neighbours at any distance.
    Neighbors,
    /// Hybrid with a 0.9 formula scale and graded shrinkage.
    Conservative,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Hybrid,
        Preset::Formula,
        Preset::Neighbors,
        Preset::Conservative,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Hybrid => "hybrid",
            Preset::Formula => "formula",
            Preset::Neighbors => "neighbors",
            Preset::Conservative => "conservative",
        }
    }

    pub fn config(self) -> EstimatorConfig {
        let hybrid = EstimatorConfig {
            lookup: LookupConfig::default(),
            neighbors: NeighborConfig::default(),
            formula: FormulaConfig::default(),
            bounds: Bounds::default(),
            shrinkage: None,
        };
        match self {
            Preset::Hybrid => hybrid,
            Preset::Formula => EstimatorConfig {
                lookup: LookupConfig { enabled: false },
                neighbors: NeighborConfig {
                    enabled: false,
                    ..hybrid.neighbors
                },
                ..hybrid
            },
            Preset::Neighbors => EstimatorConfig {
                neighbors: NeighborConfig {
                    max_distance: f64::MAX,
                    ..hybrid.neighbors
                },
                ..hybrid
            },
            Preset::Conservative => EstimatorConfig {
                formula: FormulaConfig {
                    scale: 0.9,
                    ..hybrid.formula
                },
                shrinkage: Some(Shrinkage::graded(LinearBaseline::conservative())),
                ..hybrid
            },
        }
    }
}

impl EstimatorConfig {
    /// Reject configurations the estimator cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), AppError> {
        let n = &self.neighbors;
        if n.enabled && n.k == 0 {
            return Err(AppError::usage("neighbors.k must be at least 1."));
        }
        for (name, v) in [
            ("neighbors.weight_days", n.weight_days),
            ("neighbors.weight_miles", n.weight_miles),
            ("neighbors.weight_receipts", n.weight_receipts),
            ("neighbors.max_distance", n.max_distance),
            ("neighbors.day_rate_factor", n.day_rate_factor),
            ("neighbors.mile_rate", n.mile_rate),
            ("neighbors.receipt_rates.low_rate", n.receipt_rates.low_rate),
            ("neighbors.receipt_rates.mid_rate", n.receipt_rates.mid_rate),
            ("neighbors.receipt_rates.high_rate", n.receipt_rates.high_rate),
            ("neighbors.blend.inverse_distance", n.blend.inverse_distance),
            ("neighbors.blend.extrapolation", n.blend.extrapolation),
            ("neighbors.blend.formula", n.blend.formula),
        ] {
            ensure_non_negative(name, v)?;
        }
        let blend_total = n.blend.inverse_distance + n.blend.extrapolation + n.blend.formula;
        if n.interpolation == Interpolation::Blend && blend_total <= 0.0 {
            return Err(AppError::usage("neighbors.blend weights must not all be zero."));
        }

        let f = &self.formula;
        ensure_finite("formula.per_trip", f.per_trip)?;
        ensure_finite("formula.per_day", f.per_day)?;
        ensure_non_negative("formula.per_mile", f.per_mile)?;
        ensure_non_negative("formula.receipt_rate_beyond", f.receipt_rate_beyond)?;
        ensure_non_negative("formula.scale", f.scale)?;
        let mut prev_upper = 0.0;
        for (i, tier) in f.receipt_tiers.iter().enumerate() {
            ensure_non_negative(&format!("formula.receipt_tiers[{i}].rate"), tier.rate)?;
            if !(tier.upper.is_finite() && tier.upper > prev_upper) {
                return Err(AppError::usage(format!(
                    "formula.receipt_tiers[{i}].upper must be finite and strictly increasing."
                )));
            }
            prev_upper = tier.upper;
        }
        for (name, adj) in [
            ("formula.short_trip_receipts", f.short_trip_receipts),
            ("formula.high_efficiency", f.high_efficiency),
        ] {
            if let Some(adj) = adj {
                ensure_non_negative(&format!("{name}.threshold"), adj.threshold)?;
                ensure_finite(&format!("{name}.delta"), adj.delta)?;
            }
        }

        let b = &self.bounds;
        ensure_non_negative("bounds.min_per_day", b.min_per_day)?;
        ensure_non_negative("bounds.max_per_day", b.max_per_day)?;
        ensure_non_negative("bounds.receipt_cap_rate", b.receipt_cap_rate)?;
        ensure_non_negative("bounds.receipt_cap", b.receipt_cap)?;
        if b.min_per_day > b.max_per_day {
            return Err(AppError::usage(
                "bounds.min_per_day must not exceed bounds.max_per_day.",
            ));
        }

        if let Some(s) = &self.shrinkage {
            let base = s.baseline;
            for (name, v) in [
                ("shrinkage.baseline.intercept", base.intercept),
                ("shrinkage.baseline.per_day", base.per_day),
                ("shrinkage.baseline.per_mile", base.per_mile),
                ("shrinkage.baseline.per_receipt", base.per_receipt),
            ] {
                ensure_finite(name, v)?;
            }
            let mut prev = f64::INFINITY;
            for step in &s.schedule {
                if !(0.0..=1.0).contains(&step.strength) {
                    return Err(AppError::usage("shrinkage strengths must lie in [0, 1]."));
                }
                if !(step.min_confidence.is_finite() && step.min_confidence <= prev) {
                    return Err(AppError::usage(
                        "shrinkage.schedule must be sorted by descending min_confidence.",
                    ));
                }
                prev = step.min_confidence;
            }
        }

        Ok(())
    }
}

fn ensure_finite(name: &str, v: f64) -> Result<(), AppError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(AppError::usage(format!("{name} must be finite (got {v}).")))
    }
}

fn ensure_non_negative(name: &str, v: f64) -> Result<(), AppError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(AppError::usage(format!(
            "{name} must be finite and non-negative (got {v})."
        )))
    }
}
