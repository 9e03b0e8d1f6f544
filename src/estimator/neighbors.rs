//! Similarity search over the reference records.
//!
//! Given a query we:
//! - score every record with a weighted per-dimension distance
//! - keep the `k` closest (ties broken by record order, so results are
//!   deterministic)
//! - turn them into one value, either by plain inverse-distance weighting,
//!   by first moving each neighbour's output to the query along each
//!   dimension with local per-unit rates, or by a weighted blend of the two
//!   (the estimator folds in the formula share of a blend)
//!
//! A linear scan is fine at this scale (a few thousand records at most).

use crate::domain::{DistanceMetric, Interpolation, NeighborConfig, NeighborMatch, TripInput, TripRecord};

/// Distance between a query and a record under the configured weights.
pub fn distance(cfg: &NeighborConfig, query: &TripInput, record: &TripInput) -> f64 {
    let dd = cfg.weight_days * (f64::from(query.days) - f64::from(record.days)).abs();
    let dm = cfg.weight_miles * (query.miles - record.miles).abs();
    let dr = cfg.weight_receipts * (query.receipts - record.receipts).abs();
    match cfg.metric {
        DistanceMetric::Manhattan => dd + dm + dr,
        DistanceMetric::Euclidean => (dd * dd + dm * dm + dr * dr).sqrt(),
    }
}

/// Indices and distances of the `k` nearest records, ascending.
pub fn nearest(cfg: &NeighborConfig, query: &TripInput, records: &[TripRecord]) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, distance(cfg, query, &r.input)))
        .filter(|(_, d)| d.is_finite())
        .collect();

    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(cfg.k);
    scored
}

/// `1 / (1 + d)`: 1 for an identical point, decaying with distance.
pub fn similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// A neighbour's output moved to the query point.
pub fn extrapolate(cfg: &NeighborConfig, query: &TripInput, record: &TripRecord) -> f64 {
    let mut value = record.expected;

    if query.days != record.input.days {
        let per_day = record.expected / record.input.days_f64();
        value += (query.days_f64() - record.input.days_f64()) * per_day * cfg.day_rate_factor;
    }
    value += (query.miles - record.input.miles) * cfg.mile_rate;
    value += (query.receipts - record.input.receipts) * cfg.receipt_rates.rate_for(query.receipts);

    value
}

/// Interpolated value from the `k` nearest records.
///
/// Returns `None` when `records` is empty.
pub fn interpolate(
    cfg: &NeighborConfig,
    query: &TripInput,
    records: &[TripRecord],
    nearest: &[(usize, f64)],
) -> Option<(f64, Vec<NeighborMatch>)> {
    if nearest.is_empty() {
        return None;
    }

    let mut matches = Vec::with_capacity(nearest.len());
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for &(index, d) in nearest {
        let record = &records[index];
        let adjusted = match cfg.interpolation {
            Interpolation::InverseDistance => record.expected,
            Interpolation::LocalExtrapolation => extrapolate(cfg, query, record),
            Interpolation::Blend => cfg.blend.mix_neighbor(record.expected, extrapolate(cfg, query, record)),
        };
        let weight = similarity(d);
        weighted += adjusted * weight;
        total_weight += weight;
        matches.push(NeighborMatch {
            index,
            distance: d,
            weight,
            adjusted,
        });
    }

    if total_weight > 0.0 {
        Some((weighted / total_weight, matches))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(days: u32, miles: f64, receipts: f64, expected: f64) -> TripRecord {
        TripRecord {
            input: TripInput::new(days, miles, receipts).unwrap(),
            expected,
        }
    }

    fn q(days: u32, miles: f64, receipts: f64) -> TripInput {
        TripInput::new(days, miles, receipts).unwrap()
    }

    #[test]
    fn distance_weights_days_heaviest() {
        let cfg = NeighborConfig::default();
        let base = q(5, 100.0, 100.0);
        let one_day = distance(&cfg, &base, &q(6, 100.0, 100.0));
        let fifty_miles = distance(&cfg, &base, &q(5, 150.0, 100.0));
        let fifty_dollars = distance(&cfg, &base, &q(5, 100.0, 150.0));
        assert!(one_day > fifty_miles);
        assert!(fifty_miles > fifty_dollars);

        let euclid = NeighborConfig {
            metric: DistanceMetric::Euclidean,
            ..NeighborConfig::default()
        };
        let d = distance(&euclid, &base, &q(8, 500.0, 100.0));
        assert!((d - (9.0_f64 + 16.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn nearest_is_sorted_and_breaks_ties_by_order() {
        let cfg = NeighborConfig {
            k: 2,
            ..NeighborConfig::default()
        };
        let records = vec![
            rec(3, 110.0, 50.0, 1.0),
            rec(3, 90.0, 50.0, 2.0),
            rec(3, 100.0, 50.0, 3.0),
            rec(9, 100.0, 50.0, 4.0),
        ];
        let got = nearest(&cfg, &q(3, 100.0, 50.0), &records);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, 2);
        // Records 0 and 1 are equidistant; the earlier one wins.
        assert_eq!(got[1].0, 0);
    }

    #[test]
    fn inverse_distance_of_identical_point_is_its_output() {
        let cfg = NeighborConfig {
            k: 1,
            interpolation: Interpolation::InverseDistance,
            ..NeighborConfig::default()
        };
        let records = vec![rec(2, 50.0, 20.0, 321.0)];
        let query = q(2, 50.0, 20.0);
        let near = nearest(&cfg, &query, &records);
        let (v, matches) = interpolate(&cfg, &query, &records, &near).unwrap();
        assert_eq!(v, 321.0);
        assert_eq!(matches[0].weight, 1.0);
    }

    #[test]
    fn extrapolation_moves_along_each_dimension() {
        let cfg = NeighborConfig::default();
        let record = rec(4, 100.0, 200.0, 800.0);
        // +1 day at 0.8 * 200/day, +10 miles at 0.30, +20 receipts at 0.5.
        let v = extrapolate(&cfg, &q(5, 110.0, 220.0), &record);
        assert!((v - (800.0 + 160.0 + 3.0 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn blend_equals_weighted_mix_of_both_modes() {
        let records = vec![
            rec(4, 100.0, 200.0, 800.0),
            rec(5, 120.0, 260.0, 990.0),
            rec(3, 80.0, 150.0, 610.0),
        ];
        let query = q(4, 110.0, 230.0);
        let run = |interpolation| {
            let cfg = NeighborConfig {
                interpolation,
                ..NeighborConfig::default()
            };
            let near = nearest(&cfg, &query, &records);
            interpolate(&cfg, &query, &records, &near).unwrap().0
        };
        let plain = run(Interpolation::InverseDistance);
        let moved = run(Interpolation::LocalExtrapolation);
        let blended = run(Interpolation::Blend);
        // Equal neighbour weights by default.
        assert!((blended - (plain + moved) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_reference_set_interpolates_to_none() {
        let cfg = NeighborConfig::default();
        let query = q(1, 1.0, 1.0);
        assert!(nearest(&cfg, &query, &[]).is_empty());
        assert!(interpolate(&cfg, &query, &[], &[]).is_none());
    }
}
