//! Planar polyline math used by segmentation
//!
//! Coordinates are assumed to be in a projected reference system so that
//! Euclidean distance is meaningful in meters.

use serde_json::{Map, Value};

/// Distances closer than this are treated as the same position (meters)
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    fn lerp(&self, other: &Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn centroid(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Expand on every side by `margin`
    pub fn buffered(&self, margin: f64) -> BBox {
        BBox {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// An ordered sequence of vertices
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polyline {
    pub points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    pub fn bbox(&self) -> Option<BBox> {
        let first = self.points.first()?;
        let mut bbox = BBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &self.points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    /// Sub-line between two distances measured from the start
    pub fn slice(&self, start: f64, end: f64) -> Polyline {
        let mut out = Vec::new();
        let mut walked = 0.0;

        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let seg_len = a.distance(&b);
            let seg_end = walked + seg_len;

            if seg_end >= start && walked <= end && seg_len > 0.0 {
                let t0 = ((start - walked) / seg_len).clamp(0.0, 1.0);
                let t1 = ((end - walked) / seg_len).clamp(0.0, 1.0);
                let p0 = a.lerp(&b, t0);
                let p1 = a.lerp(&b, t1);
                if out.last() != Some(&p0) {
                    out.push(p0);
                }
                if p1 != p0 {
                    out.push(p1);
                }
            }

            walked = seg_end;
            if walked > end {
                break;
            }
        }

        Polyline::new(out)
    }

    /// Distances along `self` where it crosses `other`
    ///
    /// Collinear overlaps are not reported.
    pub fn crossings(&self, other: &Polyline) -> Vec<f64> {
        let mut hits = Vec::new();
        let (Some(a_box), Some(b_box)) = (self.bbox(), other.bbox()) else {
            return hits;
        };
        if !a_box.intersects(&b_box) {
            return hits;
        }

        let mut walked = 0.0;
        for w in self.points.windows(2) {
            let (p, p2) = (w[0], w[1]);
            let seg_len = p.distance(&p2);
            for v in other.points.windows(2) {
                if let Some(t) = segment_intersection(p, p2, v[0], v[1]) {
                    hits.push(walked + t * seg_len);
                }
            }
            walked += seg_len;
        }
        hits
    }
}

/// Parameter `t` along p->p2 where it meets q->q2, if the segments cross
fn segment_intersection(p: Point, p2: Point, q: Point, q2: Point) -> Option<f64> {
    let r = (p2.x - p.x, p2.y - p.y);
    let s = (q2.x - q.x, q2.y - q.y);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let qp = (q.x - p.x, q.y - p.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Signed-area magnitude of a closed ring (shoelace)
pub fn ring_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum / 2.0).abs()
}

/// One line of a vector network with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    pub id: String,
    pub geometry: Polyline,
    pub attributes: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> Polyline {
        Polyline::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn length_sums_segments() {
        let l = line(&[(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]);
        assert!((l.length() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn slice_interpolates_ends() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let part = l.slice(5.0, 15.0);
        assert_eq!(part.points.first(), Some(&Point::new(5.0, 0.0)));
        assert_eq!(part.points.last(), Some(&Point::new(10.0, 5.0)));
        assert!((part.length() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn crossings_reports_distance() {
        let river = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let road = line(&[(40.0, -5.0), (40.0, 5.0)]);
        let hits = river.crossings(&road);
        assert_eq!(hits.len(), 1);
        assert!((hits[0] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn parallel_lines_do_not_cross() {
        let a = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let b = line(&[(0.0, 1.0), (10.0, 1.0)]);
        assert!(a.crossings(&b).is_empty());
    }

    #[test]
    fn ring_area_of_square() {
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        assert!((ring_area(&ring) - 4.0).abs() < 1e-9);
    }
}
