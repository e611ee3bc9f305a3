//! Running `(count, sum)` accumulator.
//!
//! A bucket always holds at least one observation: it is created from its
//! first contributing value and can only grow, so `mean()` is always
//! defined. Merging sums both components, which makes the merge
//! associative and commutative (exactly so for the count, and for the sum
//! up to floating-point rounding).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    count: u64,
    sum: f64,
}

impl AggregateBucket {
    /// Start a bucket from its first value.
    pub fn of(value: f64) -> Self {
        AggregateBucket { count: 1, sum: value }
    }

    /// Rebuild a bucket from persisted components. A zero count is not a
    /// valid bucket.
    pub fn from_parts(count: u64, sum: f64) -> Option<Self> {
        if count == 0 {
            None
        } else {
            Some(AggregateBucket { count, sum })
        }
    }

    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    pub fn merge(&mut self, other: &AggregateBucket) {
        self.count += other.count;
        self.sum += other.sum;
    }

    pub fn merged(mut self, other: &AggregateBucket) -> Self {
        self.merge(other);
        self
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}
