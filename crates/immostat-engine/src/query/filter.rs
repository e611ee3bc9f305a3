//! Interactive filter specification and its resolution against a snapshot.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use immostat_types::date::parse_clamped_date;
use immostat_types::record::{PropertyType, TransactionRecord};

use crate::snapshot::Snapshot;

pub const DEFAULT_MIN_SALES: u64 = 2;
pub const DEFAULT_RANKING_MIN_SALES: u64 = 10;
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_BINS: usize = 50;
/// Histogram bin counts above this are clamped down to it.
pub const MAX_BINS: usize = 1_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentSelector {
    #[default]
    All,
    Code(String),
}

impl DepartmentSelector {
    /// `"all"` (any case) or an empty string selects every department.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            DepartmentSelector::All
        } else {
            DepartmentSelector::Code(s.to_string())
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DepartmentSelector::All => None,
            DepartmentSelector::Code(code) => Some(code),
        }
    }

    pub fn matches(&self, department: &str) -> bool {
        match self {
            DepartmentSelector::All => true,
            DepartmentSelector::Code(code) => code == department,
        }
    }
}

/// A query as a front-end submits it. Dates are raw text; they are
/// clamped or defaulted when the filter is resolved, never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub department: DepartmentSelector,
    /// Included categories. An empty set matches nothing.
    pub property_types: BTreeSet<PropertyType>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// Inclusive price-per-m² bounds; `None` leaves that side open.
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    /// Municipalities need at least this many sales to be listed.
    pub min_sales: u64,
    /// Municipalities need strictly more than this many sales to be ranked.
    pub ranking_min_sales: u64,
    /// Sales needed (inclusive) for a municipality to be the top-price KPI.
    /// `None` takes the first ranked municipality.
    pub kpi_min_sales: Option<u64>,
    pub top_n: usize,
    /// Histogram bins, clamped into `1..=MAX_BINS`.
    pub bins: usize,
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter {
            department: DepartmentSelector::All,
            property_types: PropertyType::ALL.into_iter().collect(),
            start: None,
            end: None,
            price_min: None,
            price_max: None,
            min_sales: DEFAULT_MIN_SALES,
            ranking_min_sales: DEFAULT_RANKING_MIN_SALES,
            kpi_min_sales: None,
            top_n: DEFAULT_TOP_N,
            bins: DEFAULT_BINS,
        }
    }
}

impl QueryFilter {
    /// Resolve dates and bounds against `snapshot`.
    ///
    /// Each date bound is parsed with day clamping; a bound that still does
    /// not parse falls back to the dataset's earliest (start) or latest
    /// (end) date.
    pub fn resolve(&self, snapshot: &Snapshot) -> ResolvedFilter {
        let range = snapshot.date_range();
        let start = self
            .start
            .as_deref()
            .and_then(parse_clamped_date)
            .or(range.map(|r| r.0));
        let end = self
            .end
            .as_deref()
            .and_then(parse_clamped_date)
            .or(range.map(|r| r.1));
        let price_min = self.price_min.filter(|p| !p.is_nan()).unwrap_or(f64::NEG_INFINITY);
        let price_max = self.price_max.filter(|p| !p.is_nan()).unwrap_or(f64::INFINITY);

        ResolvedFilter {
            department: self.department.clone(),
            property_types: self.property_types.clone(),
            start,
            end,
            price_min,
            price_max,
            min_sales: self.min_sales,
            ranking_min_sales: self.ranking_min_sales,
            kpi_min_sales: self.kpi_min_sales,
            top_n: self.top_n,
            bins: self.bins.clamp(1, MAX_BINS),
        }
    }
}

/// A filter with every bound made concrete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFilter {
    pub department: DepartmentSelector,
    pub property_types: BTreeSet<PropertyType>,
    /// `None` only when the snapshot is empty.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub price_min: f64,
    pub price_max: f64,
    pub min_sales: u64,
    pub ranking_min_sales: u64,
    pub kpi_min_sales: Option<u64>,
    pub top_n: usize,
    pub bins: usize,
}

impl ResolvedFilter {
    pub fn matches(&self, rec: &TransactionRecord) -> bool {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return false;
        };
        self.department.matches(&rec.department)
            && self.property_types.contains(&rec.property_type)
            && rec.date >= start
            && rec.date <= end
            && rec.price_per_m2 >= self.price_min
            && rec.price_per_m2 <= self.price_max
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            department: self.department.clone(),
            property_types: self.property_types.clone(),
            start: self.start,
            end: self.end,
            price_min: self.price_min.to_bits(),
            price_max: self.price_max.to_bits(),
            min_sales: self.min_sales,
            ranking_min_sales: self.ranking_min_sales,
            kpi_min_sales: self.kpi_min_sales,
            top_n: self.top_n,
            bins: self.bins,
        }
    }
}

/// Hashable identity of a resolved filter. Float bounds compare by bit
/// pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    department: DepartmentSelector,
    property_types: BTreeSet<PropertyType>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    price_min: u64,
    price_max: u64,
    min_sales: u64,
    ranking_min_sales: u64,
    kpi_min_sales: Option<u64>,
    top_n: usize,
    bins: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use immostat_types::date::Period;

    fn rec(y: i32, m: u32, d: u32) -> TransactionRecord {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        TransactionRecord {
            date,
            value: 300_000.0,
            department: "75".into(),
            municipality_code: "75056".into(),
            municipality_name: "Paris".into(),
            property_type: PropertyType::Apartment,
            surface: 30.0,
            price_per_m2: 10_000.0,
            period: Period::of(date),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(DepartmentSelector::parse("all"), DepartmentSelector::All);
        assert_eq!(DepartmentSelector::parse(" ALL "), DepartmentSelector::All);
        assert_eq!(DepartmentSelector::parse("971"), DepartmentSelector::Code("971".into()));
        assert!(DepartmentSelector::parse("2A").matches("2A"));
        assert!(!DepartmentSelector::parse("2A").matches("2B"));
    }

    #[test]
    fn test_end_day_clamped_in_february() {
        let snap = Snapshot::from_records(0, vec![rec(2023, 1, 10), rec(2023, 6, 1)]);
        let filter = QueryFilter {
            start: Some("2023-02-01".into()),
            end: Some("2023-02-30".into()),
            ..Default::default()
        };
        let resolved = filter.resolve(&snap);
        assert_eq!(resolved.start, ymd(2023, 2, 1));
        assert_eq!(resolved.end, ymd(2023, 2, 28));

        let leap = QueryFilter {
            end: Some("2024-02-31".into()),
            ..Default::default()
        };
        assert_eq!(leap.resolve(&snap).end, ymd(2024, 2, 29));
    }

    #[test]
    fn test_unparseable_dates_fall_back_to_dataset_range() {
        let snap = Snapshot::from_records(0, vec![rec(2022, 12, 31), rec(2023, 1, 1)]);
        let filter = QueryFilter {
            start: Some("not a date".into()),
            end: Some("2023-13-01".into()),
            ..Default::default()
        };
        let resolved = filter.resolve(&snap);
        assert_eq!(resolved.start, ymd(2022, 12, 31));
        assert_eq!(resolved.end, ymd(2023, 1, 1));
        assert!(snap.records().iter().all(|r| resolved.matches(r)));

        // only one side unparseable: the other is kept
        let half = QueryFilter {
            start: Some("2023-01-01".into()),
            end: Some("??".into()),
            ..Default::default()
        };
        let resolved = half.resolve(&snap);
        assert_eq!(resolved.start, ymd(2023, 1, 1));
        assert_eq!(resolved.end, ymd(2023, 1, 1));
    }

    #[test]
    fn test_price_bounds_inclusive() {
        let snap = Snapshot::from_records(0, vec![rec(2023, 1, 1)]);
        let filter = QueryFilter {
            price_min: Some(10_000.0),
            price_max: Some(10_000.0),
            ..Default::default()
        };
        assert!(filter.resolve(&snap).matches(&snap.records()[0]));
        let filter = QueryFilter {
            price_min: Some(10_000.01),
            ..Default::default()
        };
        assert!(!filter.resolve(&snap).matches(&snap.records()[0]));
    }

    #[test]
    fn test_cache_key_equality() {
        let snap = Snapshot::from_records(0, vec![rec(2023, 1, 1)]);
        let a = QueryFilter {
            end: Some("2023-02-30".into()),
            ..Default::default()
        };
        let b = QueryFilter {
            end: Some("2023-02-28".into()),
            ..Default::default()
        };
        assert_eq!(a.resolve(&snap).cache_key(), b.resolve(&snap).cache_key());

        let c = QueryFilter {
            price_min: Some(1.0),
            ..Default::default()
        };
        assert_ne!(a.resolve(&snap).cache_key(), c.resolve(&snap).cache_key());
    }

    #[test]
    fn test_bins_are_clamped() {
        let snap = Snapshot::from_records(0, vec![rec(2023, 1, 1)]);
        let huge = QueryFilter {
            bins: usize::MAX,
            ..Default::default()
        };
        assert_eq!(huge.resolve(&snap).bins, MAX_BINS);
        let zero = QueryFilter {
            bins: 0,
            ..Default::default()
        };
        assert_eq!(zero.resolve(&snap).bins, 1);
    }
}
