//! Closed-form fallback formula.
//!
//! ```text
//! total = (per_trip / days + per_day) * days + mileage(miles) + receipts(receipts)
//! ```
//!
//! `mileage` and `receipts` are piecewise linear with non-negative marginal
//! rates, so the total is continuous and non-decreasing in both for a fixed
//! trip length. Adjustments replace a marginal rate past a threshold with
//! `rate + delta`, floored at zero; they never add or subtract a lump sum.
//! The result is scaled, clamped to [`Bounds`] and quantized to cents.

use crate::domain::{Bounds, FormulaConfig, MarginalAdjustment, TripInput};
use crate::math::{ceil_cents, floor_cents, round_cents};

/// Evaluate the fallback formula and return a cent-quantized, clamped amount.
pub fn formula_amount(cfg: &FormulaConfig, bounds: &Bounds, input: &TripInput) -> f64 {
    let raw = raw_total(cfg, input) * cfg.scale;
    bounds.apply(input, raw)
}

/// Unscaled, unclamped total.
pub fn raw_total(cfg: &FormulaConfig, input: &TripInput) -> f64 {
    let days = input.days_f64();
    let base = (cfg.per_trip / days + cfg.per_day) * days;
    base + mileage_contribution(cfg, input.days, input.miles)
        + receipt_contribution(cfg, input.days, input.receipts)
}

/// Mileage term; miles past `threshold * days` earn the adjusted rate on short
/// trips when a high-efficiency adjustment is configured.
pub fn mileage_contribution(cfg: &FormulaConfig, days: u32, miles: f64) -> f64 {
    let rate = cfg.per_mile;
    match active(cfg.high_efficiency, days) {
        Some(adj) => {
            let knee = adj.threshold * f64::from(days);
            if miles > knee {
                knee * rate + (miles - knee) * adjusted(rate, adj)
            } else {
                miles * rate
            }
        }
        None => miles * rate,
    }
}

/// Tiered receipt term.
pub fn receipt_contribution(cfg: &FormulaConfig, days: u32, receipts: f64) -> f64 {
    if receipts <= 0.0 {
        return 0.0;
    }
    let adj = active(cfg.short_trip_receipts, days);

    let mut total = 0.0;
    let mut lower = 0.0;
    let segments = cfg
        .receipt_tiers
        .iter()
        .map(|t| (t.upper, t.rate))
        .chain(std::iter::once((f64::INFINITY, cfg.receipt_rate_beyond)));

    for (upper, rate) in segments {
        if receipts <= lower {
            break;
        }
        let hi = receipts.min(upper);
        total += segment_value(lower, hi, rate, adj);
        lower = upper;
    }
    total
}

fn segment_value(lo: f64, hi: f64, rate: f64, adj: Option<MarginalAdjustment>) -> f64 {
    match adj {
        Some(a) if hi > a.threshold => {
            let split = a.threshold.max(lo);
            (split - lo) * rate + (hi - split) * adjusted(rate, a)
        }
        _ => (hi - lo) * rate,
    }
}

fn active(adj: Option<MarginalAdjustment>, days: u32) -> Option<MarginalAdjustment> {
    adj.filter(|a| days <= a.max_days)
}

fn adjusted(rate: f64, adj: MarginalAdjustment) -> f64 {
    (rate + adj.delta).max(0.0)
}

impl Bounds {
    /// `(low, high)` for this query, before cent alignment.
    pub fn range(&self, input: &TripInput) -> (f64, f64) {
        let days = input.days_f64();
        let capped = (input.receipts * self.receipt_cap_rate).min(self.receipt_cap);
        (days * self.min_per_day, days * self.max_per_day + capped)
    }

    /// Quantize to cents and clamp into the cent-aligned range.
    ///
    /// The lower bound is rounded up and the upper bound down so the result
    /// is both on a cent and inside the unrounded range.
    pub fn apply(&self, input: &TripInput, value: f64) -> f64 {
        let (lo, hi) = self.range(input);
        let lo_c = ceil_cents(lo);
        let hi_c = floor_cents(hi);
        let v = if value.is_finite() { round_cents(value) } else { lo_c };
        if lo_c > hi_c {
            return lo_c;
        }
        v.clamp(lo_c, hi_c)
    }
}
