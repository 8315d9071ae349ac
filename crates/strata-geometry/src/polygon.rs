//! Closed rings in scaled coordinates.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::line::Line;
use crate::point::{Point, Points};
use crate::polyline::{douglas_peucker, Polyline};

/// A closed ring of scaled points, without a duplicated closing vertex.
///
/// Winding is significant: a counter-clockwise ring is a contour, a
/// clockwise ring is a hole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    /// Ring vertices, in order.
    pub points: Points,
}

/// A list of polygons.
pub type Polygons = Vec<Polygon>;

impl Polygon {
    /// Create a polygon from ring vertices.
    pub fn new(points: Points) -> Self {
        Self { points }
    }

    /// True if the ring has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A ring is valid when it has at least three vertices.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3
    }

    /// Signed area in scaled units squared; positive for counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc: i128 = 0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            acc += p.x as i128 * q.y as i128 - q.x as i128 * p.y as i128;
        }
        acc as f64 / 2.0
    }

    /// Absolute area in scaled units squared.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// True when the ring winds counter-clockwise.
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// True when the ring winds clockwise.
    pub fn is_clockwise(&self) -> bool {
        self.signed_area() < 0.0
    }

    /// Reverse the winding in place.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Force counter-clockwise winding; returns true if reversed.
    pub fn make_counter_clockwise(&mut self) -> bool {
        if self.is_clockwise() {
            self.reverse();
            return true;
        }
        false
    }

    /// Force clockwise winding; returns true if reversed.
    pub fn make_clockwise(&mut self) -> bool {
        if self.is_counter_clockwise() {
            self.reverse();
            return true;
        }
        false
    }

    /// Ring perimeter length in scaled units.
    pub fn length(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.points[i].distance_to(self.points[(i + 1) % n]))
            .sum()
    }

    /// Area centroid of the ring.
    pub fn centroid(&self) -> Point {
        let n = self.points.len();
        if n == 0 {
            return Point::default();
        }
        let a = self.signed_area();
        if a.abs() < 1.0 {
            // degenerate ring, fall back to the vertex average
            let (sx, sy) = self
                .points
                .iter()
                .fold((0i128, 0i128), |(sx, sy), p| (sx + p.x as i128, sy + p.y as i128));
            return Point::new((sx / n as i128) as i64, (sy / n as i128) as i64);
        }
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
            cx += (p.x as f64 + q.x as f64) * cross;
            cy += (p.y as f64 + q.y as f64) * cross;
        }
        Point::new((cx / (6.0 * a)).round() as i64, (cy / (6.0 * a)).round() as i64)
    }

    /// Ray-cast point-in-polygon test; boundary points are unspecified.
    pub fn contains_point(&self, point: Point) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let pi = self.points[i];
            let pj = self.points[j];
            if ((pi.y > point.y) != (pj.y > point.y))
                && ((point.x as f64)
                    < (pj.x - pi.x) as f64 * (point.y - pi.y) as f64 / (pj.y - pi.y) as f64
                        + pi.x as f64)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Axis-aligned bounding box of the ring.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Ring segments, including the closing one.
    pub fn lines(&self) -> Vec<Line> {
        let n = self.points.len();
        (0..n)
            .map(|i| Line::new(self.points[i], self.points[(i + 1) % n]))
            .collect()
    }

    /// Translate all vertices in place.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        for p in &mut self.points {
            p.translate(dx, dy);
        }
    }

    /// Rotate all vertices around the origin.
    pub fn rotate(&mut self, angle: f64) {
        for p in &mut self.points {
            p.rotate(angle);
        }
    }

    /// Open the ring into a polyline starting (and ending) at vertex `index`.
    pub fn split_at_index(&self, index: usize) -> Polyline {
        let n = self.points.len();
        let mut points = Points::with_capacity(n + 1);
        points.extend_from_slice(&self.points[index..]);
        points.extend_from_slice(&self.points[..index]);
        points.push(self.points[index]);
        Polyline::new(points)
    }

    /// Open the ring at its first vertex.
    pub fn split_at_first_point(&self) -> Polyline {
        self.split_at_index(0)
    }

    /// Open the ring at the vertex nearest to `point`.
    pub fn split_at_nearest(&self, point: Point) -> Polyline {
        match point.nearest_point_index(&self.points) {
            Some(i) => self.split_at_index(i),
            None => Polyline::default(),
        }
    }

    /// First vertex, if any.
    pub fn first_point(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Simplify the ring with Douglas-Peucker; returns an empty vector when
    /// the result degenerates below three vertices.
    pub fn simplify(&self, tolerance: f64) -> Polygons {
        let mut closed = self.points.clone();
        if let Some(first) = self.points.first() {
            closed.push(*first);
        }
        let mut simplified = douglas_peucker(&closed, tolerance);
        simplified.pop();
        if simplified.len() < 3 {
            return Vec::new();
        }
        vec![Polygon::new(simplified)]
    }

    /// Vertices whose interior corner is sharper than `angle` radians.
    ///
    /// Operates on the solid side: for a clockwise ring the test is
    /// reversed. Used to place brim ears at sharp convex corners.
    pub fn convex_points(&self, angle: f64) -> Points {
        let n = self.points.len();
        if n < 3 {
            return Vec::new();
        }
        let ccw = self.is_counter_clockwise();
        let mut out = Points::new();
        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let here = self.points[i];
            let next = self.points[(i + 1) % n];
            let cross = here.ccw(prev, next);
            let convex = if ccw { cross > 0.0 } else { cross < 0.0 };
            if convex && here.angle(prev, next) < angle {
                out.push(here);
            }
        }
        out
    }
}

impl From<Polygon> for Polyline {
    fn from(polygon: Polygon) -> Self {
        polygon.split_at_first_point()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(side: i64) -> Polygon {
        Polygon::new(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ])
    }

    #[test]
    fn test_area_and_winding() {
        let sq = square(100);
        assert_relative_eq!(sq.signed_area(), 10_000.0);
        assert!(sq.is_counter_clockwise());
        let mut cw = sq.clone();
        cw.reverse();
        assert!(cw.is_clockwise());
        assert_relative_eq!(cw.area(), 10_000.0);
    }

    #[test]
    fn test_contains_point() {
        let sq = square(100);
        assert!(sq.contains_point(Point::new(50, 50)));
        assert!(!sq.contains_point(Point::new(150, 50)));
    }

    #[test]
    fn test_centroid() {
        assert_eq!(square(100).centroid(), Point::new(50, 50));
    }

    #[test]
    fn test_split_at_index() {
        let pl = square(100).split_at_index(2);
        assert_eq!(pl.len(), 5);
        assert_eq!(pl.first_point(), Some(Point::new(100, 100)));
        assert_eq!(pl.last_point(), Some(Point::new(100, 100)));
    }

    #[test]
    fn test_convex_points() {
        // an L-shape has five convex right angles and one reflex corner
        let l = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(200, 0),
            Point::new(200, 100),
            Point::new(100, 100),
            Point::new(100, 200),
            Point::new(0, 200),
        ]);
        let sharp = l.convex_points(2.0);
        assert_eq!(sharp.len(), 5);
        assert!(!sharp.contains(&Point::new(100, 100)));
    }
}
