//! GeoJSON feature reader.
//!
//! Only what the centroid resolver needs is kept: the area code, its name
//! and the polygon rings. Features that cannot be interpreted are skipped
//! with a warning; only a document that is not a feature collection at all
//! is an error.

use std::io::Read;

use serde_json::Value as JsonValue;
use tracing::warn;

use immostat_types::error::{ImmoError, Result};

/// `[longitude, latitude]`.
pub type Position = [f64; 2];

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
    /// Null, unsupported or malformed geometry.
    Unsupported,
}

impl Geometry {
    /// The outer boundary ring: first ring of a polygon, or first ring of
    /// the first polygon of a multi-polygon.
    pub fn outer_ring(&self) -> Option<&[Position]> {
        match self {
            Geometry::Polygon(rings) => rings.first().map(|r| r.as_slice()),
            Geometry::MultiPolygon(polys) => polys
                .first()
                .and_then(|rings| rings.first())
                .map(|r| r.as_slice()),
            Geometry::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub code: String,
    pub name: Option<String>,
    pub geometry: Geometry,
}

/// Read a GeoJSON `FeatureCollection` whose features carry a `code`
/// property (and optionally `nom`).
pub fn read_feature_collection<R: Read>(reader: R) -> Result<Vec<GeoFeature>> {
    let doc: JsonValue = serde_json::from_reader(reader)
        .map_err(|e| ImmoError::Format(format!("Invalid GeoJSON: {}", e)))?;
    parse_feature_collection(&doc)
}

pub fn parse_feature_collection(doc: &JsonValue) -> Result<Vec<GeoFeature>> {
    let features = doc
        .get("features")
        .and_then(|f| f.as_array())
        .ok_or_else(|| ImmoError::Format("GeoJSON document has no 'features' array".to_string()))?;

    let mut out = Vec::with_capacity(features.len());
    let mut skipped = 0usize;
    for feature in features {
        match parse_feature(feature) {
            Some(f) => out.push(f),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "GeoJSON features without a usable code were skipped");
    }
    Ok(out)
}

fn parse_feature(feature: &JsonValue) -> Option<GeoFeature> {
    let props = feature.get("properties")?;
    let code = match props.get("code")? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    if code.is_empty() {
        return None;
    }
    let name = props.get("nom").and_then(|n| n.as_str()).map(str::to_string);
    let geometry = feature
        .get("geometry")
        .map(parse_geometry)
        .unwrap_or(Geometry::Unsupported);
    Some(GeoFeature { code, name, geometry })
}

fn parse_geometry(geom: &JsonValue) -> Geometry {
    let coords = geom.get("coordinates");
    let parsed = match (geom.get("type").and_then(|t| t.as_str()), coords) {
        (Some("Polygon"), Some(c)) => parse_polygon(c).map(Geometry::Polygon),
        (Some("MultiPolygon"), Some(c)) => c
            .as_array()
            .and_then(|polys| polys.iter().map(parse_polygon).collect::<Option<Vec<_>>>())
            .map(Geometry::MultiPolygon),
        _ => None,
    };
    parsed.unwrap_or(Geometry::Unsupported)
}

fn parse_polygon(value: &JsonValue) -> Option<Vec<Vec<Position>>> {
    value.as_array()?.iter().map(parse_ring).collect()
}

fn parse_ring(value: &JsonValue) -> Option<Vec<Position>> {
    value
        .as_array()?
        .iter()
        .map(|p| {
            let p = p.as_array()?;
            let lon = p.first()?.as_f64()?;
            let lat = p.get(1)?.as_f64()?;
            Some([lon, lat])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_polygon_and_multipolygon() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"code": "75101", "nom": "Paris 1er Arrondissement"},
                    "geometry": {"type": "Polygon", "coordinates": [[[2.3, 48.8], [2.4, 48.9]], [[0.0, 0.0]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"code": "97411"},
                    "geometry": {"type": "MultiPolygon", "coordinates": [[[[55.4, -21.0]]], [[[0.0, 0.0]]]]}
                }
            ]
        });
        let features = parse_feature_collection(&doc).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].name.as_deref(), Some("Paris 1er Arrondissement"));
        assert_eq!(
            features[0].geometry.outer_ring().unwrap(),
            &[[2.3, 48.8], [2.4, 48.9]]
        );
        assert_eq!(features[1].geometry.outer_ring().unwrap(), &[[55.4, -21.0]]);
    }

    #[test]
    fn test_bad_geometry_is_unsupported() {
        let doc = json!({"features": [
            {"properties": {"code": "01001"}, "geometry": null},
            {"properties": {"code": "01002"}, "geometry": {"type": "Point", "coordinates": [5.0, 46.0]}},
            {"properties": {"code": "01003"}, "geometry": {"type": "Polygon", "coordinates": [[["x", 1.0]]]}}
        ]});
        let features = parse_feature_collection(&doc).unwrap();
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f.geometry == Geometry::Unsupported));
    }

    #[test]
    fn test_features_without_code_are_skipped() {
        let doc = json!({"features": [
            {"properties": {"nom": "nowhere"}, "geometry": null},
            {"properties": {"code": ""}, "geometry": null},
            {"geometry": null}
        ]});
        assert!(parse_feature_collection(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_not_a_collection() {
        assert!(matches!(
            parse_feature_collection(&json!({"type": "Feature"})),
            Err(ImmoError::Format(_))
        ));
        assert!(read_feature_collection("not json".as_bytes()).is_err());
    }
}
