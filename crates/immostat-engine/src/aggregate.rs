//! Aggregator: keyed `(count, sum)` buckets with an associative,
//! commutative merge.
//!
//! Buckets are created lazily from their first contributing row, so an
//! `AggregateSet` never holds an empty bucket. Keys are kept ordered so
//! that iteration and persisted output are deterministic.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use immostat_types::bucket::AggregateBucket;
use immostat_types::date::Period;
use immostat_types::record::{PropertyType, TransactionRecord};

/// Grouping key for per-municipality statistics. Ordered by code first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MunicipalityKey {
    pub code: String,
    pub name: String,
    pub department: String,
}

impl MunicipalityKey {
    pub fn of(rec: &TransactionRecord) -> Self {
        MunicipalityKey {
            code: rec.municipality_code.clone(),
            name: rec.municipality_name.clone(),
            department: rec.department.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSet<K: Ord> {
    buckets: BTreeMap<K, AggregateBucket>,
}

impl<K: Ord> Default for AggregateSet<K> {
    fn default() -> Self {
        AggregateSet {
            buckets: BTreeMap::new(),
        }
    }
}

impl<K: Ord> AggregateSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One bucket per distinct key among `rows`.
    pub fn fold<'a, T: 'a, I, KF, VF>(rows: I, key_fn: KF, value_fn: VF) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        KF: Fn(&T) -> K,
        VF: Fn(&T) -> f64,
    {
        let mut set = Self::new();
        for row in rows {
            set.observe(key_fn(row), value_fn(row));
        }
        set
    }

    pub fn observe(&mut self, key: K, value: f64) {
        match self.buckets.entry(key) {
            Entry::Occupied(mut e) => e.get_mut().observe(value),
            Entry::Vacant(e) => {
                e.insert(AggregateBucket::of(value));
            }
        }
    }

    /// Add a whole bucket under `key`.
    pub fn insert_bucket(&mut self, key: K, bucket: AggregateBucket) {
        match self.buckets.entry(key) {
            Entry::Occupied(mut e) => e.get_mut().merge(&bucket),
            Entry::Vacant(e) => {
                e.insert(bucket);
            }
        }
    }

    /// Merge `other` into `self`: shared keys sum, the rest is the union.
    pub fn merge_from(&mut self, other: AggregateSet<K>) {
        for (key, bucket) in other.buckets {
            self.insert_bucket(key, bucket);
        }
    }

    pub fn merge(mut self, other: AggregateSet<K>) -> Self {
        // fold the smaller side into the larger one
        if self.buckets.len() < other.buckets.len() {
            let mut other = other;
            other.merge_from(self);
            return other;
        }
        self.merge_from(other);
        self
    }

    pub fn get(&self, key: &K) -> Option<&AggregateBucket> {
        self.buckets.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &AggregateBucket)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Count across all buckets.
    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(|b| b.count()).sum()
    }
}

impl<K: Ord> FromIterator<(K, AggregateBucket)> for AggregateSet<K> {
    fn from_iter<I: IntoIterator<Item = (K, AggregateBucket)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, bucket) in iter {
            set.insert_bucket(key, bucket);
        }
        set
    }
}

impl<K: Ord> IntoIterator for AggregateSet<K> {
    type Item = (K, AggregateBucket);
    type IntoIter = std::collections::btree_map::IntoIter<K, AggregateBucket>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// The four aggregate sets published with a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotAggregates {
    /// Price per m² by municipality.
    pub municipalities: AggregateSet<MunicipalityKey>,
    /// Price per m² by year-month.
    pub periods: AggregateSet<Period>,
    /// Price per m² by property type.
    pub type_prices: AggregateSet<PropertyType>,
    /// Transaction value by property type.
    pub type_values: AggregateSet<PropertyType>,
}

impl SnapshotAggregates {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        let mut aggs = Self::default();
        for rec in records {
            aggs.observe(rec);
        }
        aggs
    }

    pub fn observe(&mut self, rec: &TransactionRecord) {
        self.municipalities.observe(MunicipalityKey::of(rec), rec.price_per_m2);
        self.periods.observe(rec.period, rec.price_per_m2);
        self.type_prices.observe(rec.property_type, rec.price_per_m2);
        self.type_values.observe(rec.property_type, rec.value);
    }

    pub fn merge_from(&mut self, other: SnapshotAggregates) {
        self.municipalities.merge_from(other.municipalities);
        self.periods.merge_from(other.periods);
        self.type_prices.merge_from(other.type_prices);
        self.type_values.merge_from(other.type_values);
    }

    pub fn merge(mut self, other: SnapshotAggregates) -> Self {
        self.merge_from(other);
        self
    }

    /// Number of records folded in.
    pub fn record_count(&self) -> u64 {
        self.type_prices.total_count()
    }
}
