//! Network resegmentation
//!
//! Splits a line network so that every crossing with another layer (roads,
//! rail, ownership boundaries) falls on a segment boundary, then cuts long
//! pieces into near-equal parts no longer than the maximum length.
//!
//! Pieces shorter than the minimum are kept: dropping them would lose
//! network length.

pub mod geometry;

pub use geometry::{BBox, LineFeature, Point, Polyline};

use crate::error::{BasinError, BasinResult};
use geometry::EPSILON;
use serde_json::{Map, Value};
use tracing::debug;

/// Segment length bounds in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationParams {
    pub max_length: f64,
    pub min_length: f64,
}

impl SegmentationParams {
    pub fn new(max_length: f64, min_length: f64) -> BasinResult<Self> {
        if !(min_length > 0.0 && max_length > 0.0) {
            return Err(BasinError::InvalidInput(
                "Segment lengths must be positive".to_string(),
            ));
        }
        if min_length > max_length {
            return Err(BasinError::InvalidInput(format!(
                "Minimum segment length {} exceeds maximum {}",
                min_length, max_length
            )));
        }
        Ok(Self {
            max_length,
            min_length,
        })
    }

    /// Split at crossings only, never by length
    pub fn crossings_only(&self) -> Self {
        Self {
            max_length: f64::INFINITY,
            min_length: self.min_length,
        }
    }
}

/// One output piece of the network
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Stable id: `{source}:{start distance}:{ordinal}`
    pub id: String,
    pub source_id: String,
    /// Distance of the segment start from the start of its source line
    pub start: f64,
    pub geometry: Polyline,
    pub attributes: Map<String, Value>,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.geometry.length()
    }

    /// Attributes plus the segmentation fields, for writing out
    pub fn output_attributes(&self) -> Map<String, Value> {
        let mut attrs = self.attributes.clone();
        attrs.insert("seg_id".to_string(), Value::from(self.id.clone()));
        attrs.insert("source_id".to_string(), Value::from(self.source_id.clone()));
        attrs.insert("seg_distance".to_string(), Value::from(round_cm(self.start)));
        attrs.insert("length_m".to_string(), Value::from(round_cm(self.length())));
        attrs
    }
}

fn round_cm(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Resegment `network`, splitting first at every crossing with `split_layers`
///
/// Output order follows input order, then position along each line, so
/// unchanged input yields identical ids on every run.
pub fn segment(
    network: &[LineFeature],
    params: SegmentationParams,
    split_layers: &[Vec<Polyline>],
) -> Vec<Segment> {
    let mut out = Vec::new();

    for feature in network {
        let total = feature.geometry.length();
        let cuts = crossing_distances(&feature.geometry, total, split_layers);

        let mut bounds = Vec::with_capacity(cuts.len() + 2);
        bounds.push(0.0);
        bounds.extend(cuts);
        bounds.push(total);

        let mut ordinal = 0u32;
        for w in bounds.windows(2) {
            for (start, end) in length_split(w[0], w[1], params) {
                ordinal += 1;
                out.push(Segment {
                    id: format!("{}:{:.1}:{}", feature.id, start, ordinal),
                    source_id: feature.id.clone(),
                    start,
                    geometry: feature.geometry.slice(start, end),
                    attributes: feature.attributes.clone(),
                });
            }
        }
    }

    debug!("Segmented {} lines into {} segments", network.len(), out.len());
    out
}

/// Sorted, deduplicated interior crossing positions
fn crossing_distances(line: &Polyline, total: f64, split_layers: &[Vec<Polyline>]) -> Vec<f64> {
    let mut cuts: Vec<f64> = split_layers
        .iter()
        .flatten()
        .flat_map(|other| line.crossings(other))
        .filter(|d| *d > EPSILON && *d < total - EPSILON)
        .collect();

    cuts.sort_by(|a, b| a.total_cmp(b));
    cuts.dedup_by(|a, b| (*a - *b).abs() < EPSILON);
    cuts
}

/// Split [start, end] into near-equal pieces no longer than max_length
///
/// A piece that is already short (even below min_length) is returned as-is.
fn length_split(start: f64, end: f64, params: SegmentationParams) -> Vec<(f64, f64)> {
    let len = end - start;
    if len <= params.max_length {
        return vec![(start, end)];
    }

    let pieces = (len / params.max_length).ceil() as usize;
    let step = len / pieces as f64;
    (0..pieces)
        .map(|i| {
            let a = start + step * i as f64;
            let b = if i + 1 == pieces { end } else { a + step };
            (a, b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(id: &str, coords: &[(f64, f64)]) -> LineFeature {
        LineFeature {
            id: id.to_string(),
            geometry: Polyline::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect()),
            attributes: Map::new(),
        }
    }

    fn params() -> SegmentationParams {
        SegmentationParams::new(300.0, 50.0).unwrap()
    }

    #[test]
    fn rejects_min_above_max() {
        assert!(SegmentationParams::new(50.0, 300.0).is_err());
        assert!(SegmentationParams::new(0.0, 0.0).is_err());
    }

    #[test]
    fn long_line_split_into_equal_pieces() {
        let network = vec![feature("f1", &[(0.0, 0.0), (1000.0, 0.0)])];
        let segs = segment(&network, params(), &[]);

        assert_eq!(segs.len(), 4);
        for s in &segs {
            assert!((s.length() - 250.0).abs() < 1e-6);
        }
    }

    #[test]
    fn total_length_preserved() {
        let network = vec![
            feature("a", &[(0.0, 0.0), (420.0, 0.0), (420.0, 615.5)]),
            feature("b", &[(0.0, 0.0), (12.0, 9.0)]),
            feature("c", &[(5.0, 5.0), (905.0, 305.0), (1200.0, -40.0)]),
        ];
        let roads = vec![
            Polyline::new(vec![Point::new(100.0, -10.0), Point::new(100.0, 10.0)]),
            Polyline::new(vec![Point::new(400.0, 300.0), Point::new(440.0, 300.0)]),
        ];

        for (max, min) in [(300.0, 50.0), (100.0, 100.0), (75.0, 10.0), (10_000.0, 1.0)] {
            let p = SegmentationParams::new(max, min).unwrap();
            let segs = segment(&network, p, &[roads.clone()]);
            let expected: f64 = network.iter().map(|f| f.geometry.length()).sum();
            let actual: f64 = segs.iter().map(|s| s.length()).sum();
            assert!((expected - actual).abs() < 1e-6, "max={} min={}", max, min);
        }
    }

    #[test]
    fn no_segment_exceeds_max() {
        let network = vec![feature("f", &[(0.0, 0.0), (777.0, 0.0), (777.0, 333.0)])];
        let roads = vec![Polyline::new(vec![Point::new(500.0, -1.0), Point::new(500.0, 1.0)])];
        let segs = segment(&network, params(), &[roads]);
        assert!(segs.iter().all(|s| s.length() <= 300.0 + 1e-6));
    }

    #[test]
    fn splits_at_crossings() {
        let network = vec![feature("f", &[(0.0, 0.0), (200.0, 0.0)])];
        let road = vec![Polyline::new(vec![Point::new(120.0, -5.0), Point::new(120.0, 5.0)])];
        let segs = segment(&network, params(), &[road]);

        assert_eq!(segs.len(), 2);
        assert!((segs[0].length() - 120.0).abs() < 1e-6);
        assert!((segs[1].start - 120.0).abs() < 1e-6);
    }

    #[test]
    fn short_pieces_kept() {
        let network = vec![feature("tiny", &[(0.0, 0.0), (20.0, 0.0)])];
        let road = vec![Polyline::new(vec![Point::new(5.0, -1.0), Point::new(5.0, 1.0)])];
        let segs = segment(&network, params(), &[road]);

        // Both pieces are under min_length and still present
        assert_eq!(segs.len(), 2);
        assert!(segs.iter().all(|s| s.length() < 50.0));
    }

    #[test]
    fn max_length_wins_over_min_length() {
        let network = vec![feature("f", &[(0.0, 0.0), (110.0, 0.0)])];
        let p = SegmentationParams::new(100.0, 90.0).unwrap();
        let segs = segment(&network, p, &[]);

        assert_eq!(segs.len(), 2);
        for s in &segs {
            assert!((s.length() - 55.0).abs() < 1e-6);
        }
    }

    #[test]
    fn crossings_only_keeps_long_pieces_whole() {
        let network = vec![feature("f", &[(0.0, 0.0), (1000.0, 0.0)])];
        let road = vec![Polyline::new(vec![Point::new(450.0, -5.0), Point::new(450.0, 5.0)])];
        let segs = segment(&network, params().crossings_only(), &[road]);

        assert_eq!(segs.len(), 2);
        assert!((segs[0].length() - 450.0).abs() < 1e-6);
        assert!((segs[1].length() - 550.0).abs() < 1e-6);
        assert_eq!(segment(&network, params().crossings_only(), &[]).len(), 1);
    }

    #[test]
    fn crossings_from_several_layers_deduplicated() {
        let network = vec![feature("f", &[(0.0, 0.0), (200.0, 0.0)])];
        let road = vec![Polyline::new(vec![Point::new(80.0, -5.0), Point::new(80.0, 5.0)])];
        let ownership = vec![Polyline::new(vec![Point::new(80.0, 5.0), Point::new(80.0, -5.0)])];
        let segs = segment(&network, params(), &[road, ownership]);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        let network = vec![feature("f9", &[(0.0, 0.0), (700.0, 0.0)])];
        let first = segment(&network, params(), &[]);
        let second = segment(&network, params(), &[]);

        let ids: Vec<_> = first.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, second.iter().map(|s| s.id.clone()).collect::<Vec<_>>());
        assert_eq!(ids[0], "f9:0.0:1");
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn output_attributes_include_segment_fields() {
        let network = vec![feature("f", &[(0.0, 0.0), (10.0, 0.0)])];
        let segs = segment(&network, params(), &[]);
        let attrs = segs[0].output_attributes();
        assert_eq!(attrs["seg_id"], "f:0.0:1");
        assert_eq!(attrs["length_m"], 10.0);
    }
}
