//! Approximate centroids.
//!
//! A feature's centroid is the unweighted mean of its outer-ring vertices
//! (the closing vertex counts like any other). A department's centroid is
//! the unweighted mean of its features' centroids. This is a cheap
//! approximation for choosing a map viewpoint, not an area centroid.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use immostat_types::bucket::AggregateBucket;

use crate::feature::GeoFeature;

/// Prefix shared by overseas-territory codes, whose departments have three
/// digits.
const OVERSEAS_PREFIX: &str = "97";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

/// Running mean of points.
#[derive(Debug, Clone, Copy)]
struct PointMean {
    lon: AggregateBucket,
    lat: AggregateBucket,
}

impl PointMean {
    fn of(lon: f64, lat: f64) -> Self {
        PointMean {
            lon: AggregateBucket::of(lon),
            lat: AggregateBucket::of(lat),
        }
    }

    fn observe(&mut self, lon: f64, lat: f64) {
        self.lon.observe(lon);
        self.lat.observe(lat);
    }

    fn point(&self) -> Point {
        Point {
            lat: self.lat.mean(),
            lon: self.lon.mean(),
        }
    }
}

/// Department code of an area code: three characters for overseas codes,
/// two otherwise. `None` if the code is too short.
pub fn department_code(code: &str) -> Option<&str> {
    let len = if code.starts_with(OVERSEAS_PREFIX) { 3 } else { 2 };
    code.get(..len)
}

/// Vertex mean of the outer ring, or `None` for empty or non-finite
/// geometry.
pub fn feature_centroid(feature: &GeoFeature) -> Option<Point> {
    let ring = feature.geometry.outer_ring()?;
    let mut mean: Option<PointMean> = None;
    for &[lon, lat] in ring {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        match &mut mean {
            None => mean = Some(PointMean::of(lon, lat)),
            Some(m) => m.observe(lon, lat),
        }
    }
    mean.map(|m| m.point())
}

/// One representative point per department.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DepartmentCentroids {
    centers: BTreeMap<String, Point>,
}

impl DepartmentCentroids {
    /// Group features by department and average their centroids. Features
    /// with degenerate geometry are left out; a department with no valid
    /// feature is absent.
    pub fn resolve(features: &[GeoFeature]) -> Self {
        let mut groups: BTreeMap<String, PointMean> = BTreeMap::new();
        let mut degenerate = 0usize;

        for feature in features {
            let (Some(dept), Some(c)) = (department_code(&feature.code), feature_centroid(feature))
            else {
                degenerate += 1;
                continue;
            };
            match groups.get_mut(dept) {
                Some(m) => m.observe(c.lon, c.lat),
                None => {
                    groups.insert(dept.to_string(), PointMean::of(c.lon, c.lat));
                }
            }
        }

        debug!(
            departments = groups.len(),
            degenerate, "resolved department centroids"
        );
        DepartmentCentroids {
            centers: groups.into_iter().map(|(k, m)| (k, m.point())).collect(),
        }
    }

    pub fn get(&self, department: &str) -> Option<Point> {
        self.centers.get(department).copied()
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Point)> {
        self.centers.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
