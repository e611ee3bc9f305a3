//! Query response types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use immostat_geo::view::MapView;
use immostat_types::date::Period;
use immostat_types::record::PropertyType;

use super::filter::ResolvedFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityStat {
    pub code: String,
    pub name: String,
    pub department: String,
    pub mean_price: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStat {
    pub period: Period,
    pub mean_price: f64,
    pub count: u64,
}

/// Share of total transaction value held by one property type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub property_type: PropertyType,
    pub count: u64,
    pub total_value: f64,
    pub share: f64,
}

/// Equal-width histogram. `edges` has one more element than `counts`;
/// both are empty when there is nothing to bin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// A scalar indicator, or the sentinel for an empty selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kpi<T> {
    Value(T),
    NoData,
}

impl<T> Kpi<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Kpi::Value(v) => Some(v),
            Kpi::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Kpi::NoData)
    }
}

impl<T> From<Option<T>> for Kpi<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Kpi::Value(v),
            None => Kpi::NoData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub mean_price: Kpi<f64>,
    pub total_sales: u64,
    pub top_municipality: Kpi<String>,
    pub top_price: Kpi<f64>,
    pub mean_surface: Kpi<f64>,
}

impl Kpis {
    pub fn no_data() -> Self {
        Kpis {
            mean_price: Kpi::NoData,
            total_sales: 0,
            top_municipality: Kpi::NoData,
            top_price: Kpi::NoData,
            mean_surface: Kpi::NoData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub filter: ResolvedFilter,
    /// Municipalities meeting `min_sales`, by code.
    pub municipalities: Vec<MunicipalityStat>,
    pub time_series: Vec<PeriodStat>,
    pub category_shares: Vec<CategoryShare>,
    /// Highest mean prices among municipalities above `ranking_min_sales`.
    pub top: Vec<MunicipalityStat>,
    pub histogram: Histogram,
    pub kpis: Kpis,
    pub view: MapView,
}

/// What a front-end needs to populate its filter controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOptions {
    pub departments: Vec<String>,
    pub property_types: Vec<PropertyType>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub price_range: Option<(f64, f64)>,
}
