//! Reference index: exact-match map plus the flat record list used by the
//! similarity search.
//!
//! The index is built once from a slice of records and then only read. Callers
//! that need a record held out (leave-one-out, k-fold) build a separate index
//! from a subset instead of mutating a shared one.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::domain::{TripInput, TripRecord};

/// Quantized lookup key: `(days, miles in cents, receipts in whole dollars)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupKey {
    days: u32,
    miles_cents: i64,
    receipts_dollars: i64,
}

impl LookupKey {
    pub fn of(input: &TripInput) -> Self {
        Self {
            days: input.days,
            miles_cents: (input.miles * 100.0).round() as i64,
            receipts_dollars: input.receipts.round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records: usize,
    pub distinct_keys: usize,
    /// Records whose key was already taken by an earlier record.
    pub collisions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    records: Vec<TripRecord>,
    exact: HashMap<LookupKey, usize>,
    stats: IndexStats,
}

impl ReferenceIndex {
    pub fn new(records: Vec<TripRecord>) -> Self {
        let mut exact = HashMap::with_capacity(records.len());
        let mut collisions = 0usize;
        for (i, r) in records.iter().enumerate() {
            // First record wins on collision.
            match exact.entry(LookupKey::of(&r.input)) {
                Entry::Occupied(_) => collisions += 1,
                Entry::Vacant(slot) => {
                    slot.insert(i);
                }
            }
        }
        let stats = IndexStats {
            records: records.len(),
            distinct_keys: exact.len(),
            collisions,
        };
        if collisions > 0 {
            debug!(collisions, "reference index has colliding lookup keys");
        }
        Self {
            records,
            exact,
            stats,
        }
    }

    /// Index over `records[i]` for each `i` in `indices`, in that order.
    pub fn from_subset(records: &[TripRecord], indices: &[usize]) -> Self {
        Self::new(indices.iter().map(|&i| records[i]).collect())
    }

    /// Index over every record except `records[skip]`.
    pub fn without(records: &[TripRecord], skip: usize) -> Self {
        Self::new(
            records
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, r)| *r)
                .collect(),
        )
    }

    pub fn records(&self) -> &[TripRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// The record whose quantized key equals the query's, if any.
    pub fn exact(&self, input: &TripInput) -> Option<&TripRecord> {
        self.exact
            .get(&LookupKey::of(input))
            .map(|&i| &self.records[i])
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

    #[test]
    fn exact_lookup_rounds_receipts_to_dollars() {
        let idx = ReferenceIndex::new(vec![rec(3, 93.0, 1.42, 494.63), rec(5, 200.0, 800.0, 1000.0)]);
        let hit = idx.exact(&TripInput::new(3, 93.0, 1.0).unwrap()).unwrap();
        assert_eq!(hit.expected, 494.63);
        assert!(idx.exact(&TripInput::new(3, 93.0, 2.0).unwrap()).is_none());
        assert!(idx.exact(&TripInput::new(3, 93.5, 1.42).unwrap()).is_none());
        assert!(idx.exact(&TripInput::new(4, 93.0, 1.42).unwrap()).is_none());
    }

    #[test]
    fn first_record_wins_on_collision() {
        let idx = ReferenceIndex::new(vec![rec(1, 10.0, 5.2, 100.0), rec(1, 10.0, 4.8, 200.0)]);
        assert_eq!(idx.stats().collisions, 1);
        assert_eq!(idx.stats().distinct_keys, 1);
        assert_eq!(idx.exact(&TripInput::new(1, 10.0, 5.0).unwrap()).unwrap().expected, 100.0);
    }

    #[test]
    fn held_out_indexes_drop_the_record() {
        let records = vec![rec(1, 10.0, 5.0, 100.0), rec(2, 20.0, 6.0, 200.0), rec(3, 30.0, 7.0, 300.0)];
        let loo = ReferenceIndex::without(&records, 1);
        assert_eq!(loo.len(), 2);
        assert!(loo.exact(&records[1].input).is_none());

        let subset = ReferenceIndex::from_subset(&records, &[2, 0]);
        assert_eq!(subset.records()[0].expected, 300.0);
        assert!(subset.exact(&records[0].input).is_some());
    }
}
