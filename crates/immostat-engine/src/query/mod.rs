//! QueryEngine: parameterized re-aggregation over a snapshot.
//!
//! Every request filters the snapshot's detailed records and folds the
//! matching subset with the same aggregator the build uses. An empty
//! subset yields empty aggregates and `NoData` indicators. Responses are
//! cached per resolved filter.

pub mod filter;
pub mod response;

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use immostat_geo::centroid::DepartmentCentroids;
use immostat_types::bucket::AggregateBucket;
use immostat_types::record::TransactionRecord;

use crate::aggregate::{AggregateSet, MunicipalityKey, SnapshotAggregates};
use crate::snapshot::Snapshot;

pub use filter::{CacheKey, DepartmentSelector, QueryFilter, ResolvedFilter};
pub use response::{
    CategoryShare, Histogram, Kpi, Kpis, MunicipalityStat, PeriodStat, QueryOptions, QueryResponse,
};

pub struct QueryEngine {
    snapshot: Arc<Snapshot>,
    centroids: Arc<DepartmentCentroids>,
    cache: DashMap<CacheKey, Arc<QueryResponse>>,
    cache_capacity: usize,
}

impl QueryEngine {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        QueryEngine {
            snapshot,
            centroids: Arc::new(DepartmentCentroids::default()),
            cache: DashMap::new(),
            cache_capacity: immostat_config::get_query_cache_capacity(),
        }
    }

    /// Seed map viewpoints from department centroids.
    pub fn with_centroids(mut self, centroids: DepartmentCentroids) -> Self {
        self.centroids = Arc::new(centroids);
        self
    }

    /// Maximum number of cached responses; `0` disables caching.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    pub fn options(&self) -> QueryOptions {
        QueryOptions {
            departments: self.snapshot.departments(),
            property_types: self.snapshot.property_types(),
            date_range: self.snapshot.date_range(),
            price_range: self.snapshot.price_range(),
        }
    }

    pub fn run(&self, filter: &QueryFilter) -> Arc<QueryResponse> {
        let resolved = filter.resolve(&self.snapshot);
        if self.cache_capacity == 0 {
            return Arc::new(compute(&self.snapshot, &resolved, &self.centroids));
        }

        let key = resolved.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!("query cache hit");
            return Arc::clone(hit.value());
        }
        let response = Arc::new(compute(&self.snapshot, &resolved, &self.centroids));
        if self.cache.len() >= self.cache_capacity {
            self.cache.clear();
        }
        self.cache.insert(key, response.clone());
        response
    }
}

/// Answer `filter` over `snapshot`.
pub fn compute(snapshot: &Snapshot, filter: &ResolvedFilter, centroids: &DepartmentCentroids) -> QueryResponse {
    let subset: Vec<&TransactionRecord> = snapshot.records().iter().filter(|r| filter.matches(r)).collect();
    let aggs = SnapshotAggregates::from_records(subset.iter().copied());

    let municipalities: Vec<MunicipalityStat> = aggs
        .municipalities
        .iter()
        .filter(|(_, b)| b.count() >= filter.min_sales)
        .map(|(k, b)| municipality_stat(k, b))
        .collect();
    let top = top_municipalities(&aggs.municipalities, filter.ranking_min_sales, filter.top_n);

    let time_series = aggs
        .periods
        .iter()
        .map(|(period, b)| PeriodStat {
            period: *period,
            mean_price: b.mean(),
            count: b.count(),
        })
        .collect();

    let prices: Vec<f64> = subset.iter().map(|r| r.price_per_m2).collect();
    let histogram = histogram(&prices, filter.bins);
    let leader = match filter.kpi_min_sales {
        None => top.first().cloned(),
        Some(min) => rank_by_price(&aggs.municipalities, |count| count >= min).into_iter().next(),
    };
    let kpis = kpis(&subset, leader.as_ref());

    debug!(
        rows = subset.len(),
        municipalities = municipalities.len(),
        "computed query response"
    );
    QueryResponse {
        filter: filter.clone(),
        municipalities,
        time_series,
        category_shares: category_shares(&aggs),
        top,
        histogram,
        kpis,
        view: centroids.view_for(filter.department.code()),
    }
}

fn municipality_stat(key: &MunicipalityKey, bucket: &AggregateBucket) -> MunicipalityStat {
    MunicipalityStat {
        code: key.code.clone(),
        name: key.name.clone(),
        department: key.department.clone(),
        mean_price: bucket.mean(),
        count: bucket.count(),
    }
}

/// Municipalities with strictly more than `min_sales` sales, by mean price
/// descending, ties by code ascending.
pub fn top_municipalities(
    municipalities: &AggregateSet<MunicipalityKey>,
    min_sales: u64,
    n: usize,
) -> Vec<MunicipalityStat> {
    let mut ranked = rank_by_price(municipalities, |count| count > min_sales);
    ranked.truncate(n);
    ranked
}

fn rank_by_price<F>(municipalities: &AggregateSet<MunicipalityKey>, keep: F) -> Vec<MunicipalityStat>
where
    F: Fn(u64) -> bool,
{
    let mut ranked: Vec<MunicipalityStat> = municipalities
        .iter()
        .filter(|(_, b)| keep(b.count()))
        .map(|(k, b)| municipality_stat(k, b))
        .collect();
    ranked.sort_by(|a, b| {
        b.mean_price
            .partial_cmp(&a.mean_price)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
    ranked
}

/// Share of summed transaction value per property type.
pub fn category_shares(aggs: &SnapshotAggregates) -> Vec<CategoryShare> {
    let total: f64 = aggs.type_values.iter().map(|(_, b)| b.sum()).sum();
    aggs.type_values
        .iter()
        .map(|(ty, b)| CategoryShare {
            property_type: *ty,
            count: b.count(),
            total_value: b.sum(),
            share: if total > 0.0 { b.sum() / total } else { 0.0 },
        })
        .collect()
}

/// Equal-width histogram over `[min, max]` of `values`. A single distinct
/// value is centred in a unit-wide range.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let Some((mut lo, mut hi)) = values.iter().fold(None, |acc: Option<(f64, f64)>, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    }) else {
        return Histogram::default();
    };
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| lo + width * i as f64).collect();
    edges.push(hi);

    let mut counts = vec![0u64; bins];
    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

fn mean_of<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    values
        .fold(None, |acc: Option<AggregateBucket>, v| match acc {
            None => Some(AggregateBucket::of(v)),
            Some(b) => Some(b.merged(&AggregateBucket::of(v))),
        })
        .map(|b| b.mean())
}

fn kpis(subset: &[&TransactionRecord], leader: Option<&MunicipalityStat>) -> Kpis {
    if subset.is_empty() {
        return Kpis::no_data();
    }
    Kpis {
        mean_price: mean_of(subset.iter().map(|r| r.price_per_m2)).into(),
        total_sales: subset.len() as u64,
        top_municipality: leader.map(|m| m.name.clone()).into(),
        top_price: leader.map(|m| m.mean_price).into(),
        mean_surface: mean_of(subset.iter().map(|r| r.surface)).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use immostat_types::date::Period;
    use immostat_types::record::PropertyType;

    fn rec(code: &str, name: &str, price: f64, ty: PropertyType, day: u32) -> TransactionRecord {
        let date = NaiveDate::from_ymd_opt(2023, 3, day).unwrap();
        TransactionRecord {
            date,
            value: price * 50.0,
            department: code[..2].to_string(),
            municipality_code: code.to_string(),
            municipality_name: name.to_string(),
            property_type: ty,
            surface: 50.0,
            price_per_m2: price,
            period: Period::of(date),
        }
    }

    fn scenario() -> Arc<Snapshot> {
        Arc::new(Snapshot::from_records(
            1,
            vec![
                rec("33001", "A", 2000.0, PropertyType::House, 1),
                rec("33001", "A", 3000.0, PropertyType::Apartment, 2),
                rec("33001", "A", 4000.0, PropertyType::House, 3),
                rec("33002", "B", 9000.0, PropertyType::Apartment, 4),
            ],
        ))
    }

    #[test]
    fn test_threshold_scenario() {
        let engine = QueryEngine::new(scenario());
        let filter = QueryFilter {
            min_sales: 2,
            ranking_min_sales: 2,
            ..Default::default()
        };
        let resp = engine.run(&filter);

        assert_eq!(resp.municipalities.len(), 1);
        assert_eq!(resp.municipalities[0].name, "A");
        assert_eq!(resp.municipalities[0].mean_price, 3000.0);
        assert_eq!(resp.municipalities[0].count, 3);

        assert_eq!(resp.top.len(), 1);
        assert_eq!(resp.top[0].code, "33001");

        assert_eq!(resp.kpis.mean_price, Kpi::Value(4500.0));
        assert_eq!(resp.kpis.total_sales, 4);
        assert_eq!(resp.kpis.top_municipality, Kpi::Value("A".to_string()));
        assert_eq!(resp.kpis.top_price, Kpi::Value(3000.0));
        assert_eq!(resp.kpis.mean_surface, Kpi::Value(50.0));
        assert_eq!(resp.histogram.total(), 4);
    }

    #[test]
    fn test_default_ranking_threshold_is_strict() {
        let records: Vec<TransactionRecord> = (1..=10)
            .map(|d| rec("33001", "A", 2000.0, PropertyType::House, d))
            .chain((1..=11).map(|d| rec("33002", "B", 1000.0, PropertyType::House, d)))
            .collect();
        let engine = QueryEngine::new(Arc::new(Snapshot::from_records(1, records)));
        let resp = engine.run(&QueryFilter::default());
        // A has exactly 10 sales: listed but not ranked
        assert_eq!(resp.municipalities.len(), 2);
        assert_eq!(resp.top.len(), 1);
        assert_eq!(resp.top[0].name, "B");
    }

    #[test]
    fn test_empty_selection() {
        let engine = QueryEngine::new(scenario());
        let filter = QueryFilter {
            department: DepartmentSelector::Code("75".into()),
            ..Default::default()
        };
        let resp = engine.run(&filter);
        assert!(resp.municipalities.is_empty());
        assert!(resp.time_series.is_empty());
        assert!(resp.category_shares.is_empty());
        assert!(resp.top.is_empty());
        assert!(resp.histogram.is_empty());
        assert_eq!(resp.kpis, Kpis::no_data());
        assert!(resp.kpis.top_municipality.is_no_data());
    }

    #[test]
    fn test_inverted_date_range_is_empty() {
        let engine = QueryEngine::new(scenario());
        let filter = QueryFilter {
            start: Some("2023-03-04".into()),
            end: Some("2023-03-01".into()),
            ..Default::default()
        };
        assert_eq!(engine.run(&filter).kpis.total_sales, 0);
    }

    #[test]
    fn test_empty_snapshot() {
        let engine = QueryEngine::new(Arc::new(Snapshot::default()));
        let resp = engine.run(&QueryFilter::default());
        assert_eq!(resp.kpis, Kpis::no_data());
        assert_eq!(resp.filter.start, None);
        assert!(engine.options().date_range.is_none());
    }

    #[test]
    fn test_ties_broken_by_code() {
        let mut set = AggregateSet::new();
        for code in ["002", "001", "003"] {
            let key = MunicipalityKey {
                code: code.into(),
                name: code.into(),
                department: "00".into(),
            };
            set.observe(key, if code == "003" { 10.0 } else { 20.0 });
        }
        let top = top_municipalities(&set, 0, 10);
        let codes: Vec<&str> = top.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["001", "002", "003"]);
        assert_eq!(top_municipalities(&set, 0, 2).len(), 2);
    }

    #[test]
    fn test_category_shares_by_value() {
        let aggs = SnapshotAggregates::from_records(scenario().records());
        let shares = category_shares(&aggs);
        assert_eq!(shares.len(), 2);
        // house: (2000 + 4000) * 50, apartment: (3000 + 9000) * 50
        assert_eq!(shares[0].property_type, PropertyType::House);
        assert_eq!(shares[0].count, 2);
        assert!((shares[0].share - 1.0 / 3.0).abs() < 1e-12);
        assert!((shares[1].share - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_histogram() {
        let h = histogram(&[0.0, 1.0, 2.0, 10.0], 5);
        assert_eq!(h.edges, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(h.counts, vec![2, 1, 0, 0, 1]);

        let single = histogram(&[3000.0, 3000.0], 50);
        assert_eq!(single.counts.len(), 50);
        assert_eq!(single.total(), 2);
        assert_eq!(single.edges[0], 2999.5);
        assert_eq!(single.edges[50], 3000.5);

        assert!(histogram(&[], 50).is_empty());
    }

    #[test]
    fn test_time_series_ascending() {
        let mut records = scenario().records().to_vec();
        let date = NaiveDate::from_ymd_opt(2022, 7, 14).unwrap();
        records.push(TransactionRecord {
            date,
            period: Period::of(date),
            ..records[0].clone()
        });
        let engine = QueryEngine::new(Arc::new(Snapshot::from_records(1, records)));
        let resp = engine.run(&QueryFilter::default());
        let periods: Vec<String> = resp.time_series.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(periods, vec!["2022-07", "2023-03"]);
    }

    #[test]
    fn test_cache() {
        let engine = QueryEngine::new(scenario()).with_cache_capacity(2);
        let a = engine.run(&QueryFilter::default());
        let b = engine.run(&QueryFilter::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cached_responses(), 1);

        for n in 1..=3 {
            engine.run(&QueryFilter {
                top_n: n,
                ..Default::default()
            });
        }
        assert!(engine.cached_responses() <= 2);

        let uncached = QueryEngine::new(scenario()).with_cache_capacity(0);
        let a = uncached.run(&QueryFilter::default());
        let b = uncached.run(&QueryFilter::default());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_view_follows_department() {
        let engine = QueryEngine::new(scenario());
        let all = engine.run(&QueryFilter::default());
        assert_eq!(all.view.zoom, 5.0);
        let unknown = engine.run(&QueryFilter {
            department: DepartmentSelector::Code("33".into()),
            ..Default::default()
        });
        assert_eq!(unknown.view.zoom, 6.0);
    }

    #[test]
    fn test_oversized_bin_count_is_clamped() {
        let engine = QueryEngine::new(scenario());
        let resp = engine.run(&QueryFilter {
            bins: usize::MAX,
            ..Default::default()
        });
        assert_eq!(resp.histogram.counts.len(), filter::MAX_BINS);
        assert_eq!(resp.histogram.total(), 4);
    }

    #[test]
    fn test_kpi_threshold_independent_of_ranking() {
        let engine = QueryEngine::new(scenario());
        let ranked_only = engine.run(&QueryFilter::default());
        assert!(ranked_only.top.is_empty());
        assert!(ranked_only.kpis.top_municipality.is_no_data());

        let any = engine.run(&QueryFilter {
            kpi_min_sales: Some(1),
            ..Default::default()
        });
        assert_eq!(any.kpis.top_municipality, Kpi::Value("B".to_string()));
        assert_eq!(any.kpis.top_price, Kpi::Value(9000.0));

        let three = engine.run(&QueryFilter {
            kpi_min_sales: Some(3),
            ..Default::default()
        });
        assert_eq!(three.kpis.top_municipality, Kpi::Value("A".to_string()));
        assert_eq!(three.kpis.top_price, Kpi::Value(3000.0));
    }
}
