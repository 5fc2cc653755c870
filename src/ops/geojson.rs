//! Conversions between GeoJSON features and the segmentation primitives

use crate::segment::geometry::ring_area;
use crate::segment::{BBox, LineFeature, Point, Polyline, Segment};
use serde_json::{json, Map, Value};

fn point(value: &Value) -> Option<Point> {
    let coords = value.as_array()?;
    Some(Point::new(coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
}

fn points(value: &Value) -> Vec<Point> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(point).collect())
        .unwrap_or_default()
}

fn geometry(feature: &Value) -> Option<(&str, &Value)> {
    let geom = feature.get("geometry")?;
    Some((geom.get("type")?.as_str()?, geom.get("coordinates")?))
}

/// Polygons of a feature as lists of rings (exterior first)
fn polygons(feature: &Value) -> Vec<Vec<Vec<Point>>> {
    let Some((kind, coords)) = geometry(feature) else {
        return vec![];
    };
    let rings = |poly: &Value| -> Vec<Vec<Point>> {
        poly.as_array()
            .map(|r| r.iter().map(points).collect())
            .unwrap_or_default()
    };
    match kind {
        "Polygon" => vec![rings(coords)],
        "MultiPolygon" => coords
            .as_array()
            .map(|polys| polys.iter().map(rings).collect())
            .unwrap_or_default(),
        _ => vec![],
    }
}

/// Line parts of a feature; polygon rings count as lines
fn line_parts(feature: &Value) -> Vec<Vec<Point>> {
    let Some((kind, coords)) = geometry(feature) else {
        return vec![];
    };
    match kind {
        "LineString" => vec![points(coords)],
        "MultiLineString" => coords
            .as_array()
            .map(|parts| parts.iter().map(points).collect())
            .unwrap_or_default(),
        "Polygon" | "MultiPolygon" => polygons(feature).into_iter().flatten().collect(),
        _ => vec![],
    }
}

/// String form of a property, whatever its JSON type
pub fn property_str(feature: &Value, key: &str) -> Option<String> {
    match feature.get("properties")?.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Network lines for segmentation
///
/// Ids come from `id_field`, falling back to the feature index. A
/// multi-part feature yields one line per part, suffixed `.1`, `.2`, ...
pub fn line_features(features: &[Value], id_field: &str) -> Vec<LineFeature> {
    let mut out = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        let id = property_str(feature, id_field).unwrap_or_else(|| index.to_string());
        let attributes = feature
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let parts: Vec<_> = line_parts(feature)
            .into_iter()
            .filter(|p| p.len() >= 2)
            .collect();
        let multi = parts.len() > 1;
        for (n, part) in parts.into_iter().enumerate() {
            out.push(LineFeature {
                id: if multi { format!("{}.{}", id, n + 1) } else { id.clone() },
                geometry: Polyline::new(part),
                attributes: attributes.clone(),
            });
        }
    }
    out
}

/// Every line and polygon boundary in a layer, for splitting
pub fn split_lines(features: &[Value]) -> Vec<Polyline> {
    features
        .iter()
        .flat_map(line_parts)
        .filter(|p| p.len() >= 2)
        .map(Polyline::new)
        .collect()
}

/// Polygon area (exterior minus holes), in coordinate units squared
pub fn polygon_area(features: &[Value]) -> f64 {
    features
        .iter()
        .flat_map(polygons)
        .map(|rings| {
            let mut iter = rings.iter();
            let outer = iter.next().map(|r| ring_area(r)).unwrap_or(0.0);
            outer - iter.map(|r| ring_area(r)).sum::<f64>()
        })
        .sum()
}

/// Bounding box of every coordinate in the layer
pub fn extent(features: &[Value]) -> Option<BBox> {
    features
        .iter()
        .flat_map(line_parts)
        .filter_map(|p| Polyline::new(p).bbox())
        .reduce(|a, b| a.union(&b))
}

/// Copy of a polygon feature with interior rings removed
pub fn without_holes(feature: &Value) -> Value {
    let mut out = feature.clone();
    let Some((kind, coords)) = geometry(feature) else {
        return out;
    };
    let exterior_only = |poly: &Value| -> Value {
        match poly.as_array().and_then(|r| r.first()) {
            Some(outer) => Value::Array(vec![outer.clone()]),
            None => poly.clone(),
        }
    };
    let coords = match kind {
        "Polygon" => exterior_only(coords),
        "MultiPolygon" => Value::Array(
            coords
                .as_array()
                .map(|polys| polys.iter().map(exterior_only).collect())
                .unwrap_or_default(),
        ),
        _ => return out,
    };
    out["geometry"]["coordinates"] = coords;
    out
}

fn coords_json(line: &Polyline) -> Value {
    Value::Array(line.points.iter().map(|p| json!([p.x, p.y])).collect())
}

/// GeoJSON feature for an output segment
pub fn segment_feature(segment: &Segment) -> Value {
    json!({
        "type": "Feature",
        "properties": Value::Object(segment.output_attributes()),
        "geometry": {
            "type": "LineString",
            "coordinates": coords_json(&segment.geometry),
        }
    })
}

/// Rectangle polygon feature for a bounding box
pub fn bbox_feature(bbox: &BBox, properties: Map<String, Value>) -> Value {
    json!({
        "type": "Feature",
        "properties": Value::Object(properties),
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [bbox.min_x, bbox.min_y],
                [bbox.max_x, bbox.min_y],
                [bbox.max_x, bbox.max_y],
                [bbox.min_x, bbox.max_y],
                [bbox.min_x, bbox.min_y],
            ]]
        }
    })
}
