//! The immutable result of one build: detailed records plus aggregates.
//!
//! A snapshot is never mutated after construction. Readers share it
//! through an `Arc`; a new build produces a new snapshot.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use immostat_types::record::{PropertyType, TransactionRecord};

use crate::aggregate::SnapshotAggregates;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    records: Vec<TransactionRecord>,
    aggregates: SnapshotAggregates,
    date_range: Option<(NaiveDate, NaiveDate)>,
    price_range: Option<(f64, f64)>,
}

impl Snapshot {
    pub fn new(generation: u64, records: Vec<TransactionRecord>, aggregates: SnapshotAggregates) -> Self {
        let date_range = records.iter().map(|r| r.date).fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        });
        let price_range = records.iter().map(|r| r.price_per_m2).fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((f64::min(lo, p), f64::max(hi, p))),
        });
        Snapshot {
            generation,
            records,
            aggregates,
            date_range,
            price_range,
        }
    }

    /// Build a snapshot whose aggregates are folded from `records`.
    pub fn from_records(generation: u64, records: Vec<TransactionRecord>) -> Self {
        let aggregates = SnapshotAggregates::from_records(&records);
        Self::new(generation, records, aggregates)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn aggregates(&self) -> &SnapshotAggregates {
        &self.aggregates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest and latest transaction dates.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.date_range
    }

    /// Lowest and highest price per m².
    pub fn price_range(&self) -> Option<(f64, f64)> {
        self.price_range
    }

    /// Departments present, sorted.
    pub fn departments(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.records.iter().map(|r| r.department.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn property_types(&self) -> Vec<PropertyType> {
        let set: BTreeSet<PropertyType> = self.records.iter().map(|r| r.property_type).collect();
        set.into_iter().collect()
    }
}
