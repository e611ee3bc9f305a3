//! Default map viewpoint for a department selection.

use serde::Serialize;

use crate::centroid::{DepartmentCentroids, Point};

/// Centre of metropolitan France.
pub const DEFAULT_CENTER: Point = Point { lat: 46.5, lon: 2.5 };

const NATIONAL_ZOOM: f64 = 5.0;
const UNKNOWN_DEPARTMENT_ZOOM: f64 = 6.0;
const DEPARTMENT_ZOOM: f64 = 8.5;
const PARIS_ZOOM: f64 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: Point,
    pub zoom: f64,
}

impl MapView {
    pub fn national() -> Self {
        MapView {
            center: DEFAULT_CENTER,
            zoom: NATIONAL_ZOOM,
        }
    }
}

impl DepartmentCentroids {
    /// Viewpoint for `department` (`None` means every department). A
    /// department missing from the centroids falls back to the national
    /// centre, slightly zoomed in.
    pub fn view_for(&self, department: Option<&str>) -> MapView {
        let Some(dept) = department else {
            return MapView::national();
        };
        match self.get(dept) {
            Some(center) => MapView {
                center,
                zoom: if dept == "75" { PARIS_ZOOM } else { DEPARTMENT_ZOOM },
            },
            None => MapView {
                center: DEFAULT_CENTER,
                zoom: UNKNOWN_DEPARTMENT_ZOOM,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{GeoFeature, Geometry};

    fn centroids() -> DepartmentCentroids {
        let features: Vec<GeoFeature> = [("75056", [2.35, 48.86]), ("13055", [5.37, 43.3]), ("97411", [55.45, -20.9])]
            .iter()
            .map(|(code, p)| GeoFeature {
                code: code.to_string(),
                name: None,
                geometry: Geometry::Polygon(vec![vec![*p]]),
            })
            .collect();
        DepartmentCentroids::resolve(&features)
    }

    #[test]
    fn test_all_departments() {
        assert_eq!(centroids().view_for(None), MapView::national());
    }

    #[test]
    fn test_known_departments() {
        let c = centroids();
        let paris = c.view_for(Some("75"));
        assert_eq!(paris.zoom, 11.0);
        assert_eq!(paris.center, Point { lat: 48.86, lon: 2.35 });
        assert_eq!(c.view_for(Some("13")).zoom, 8.5);
        assert_eq!(c.view_for(Some("974")).zoom, 8.5);
    }

    #[test]
    fn test_unknown_department_falls_back() {
        let view = centroids().view_for(Some("2A"));
        assert_eq!(view.center, DEFAULT_CENTER);
        assert_eq!(view.zoom, 6.0);
    }
}
