//! Open paths in scaled coordinates.

use serde::{Deserialize, Serialize};

use crate::line::Line;
use crate::point::{Point, Points};

/// An open path through scaled points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polyline {
    /// Points along the path.
    pub points: Points,
}

/// A list of polylines.
pub type Polylines = Vec<Polyline>;

impl Polyline {
    /// Create a polyline from points.
    pub fn new(points: Points) -> Self {
        Self { points }
    }

    /// True if the polyline has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A polyline is printable when it has at least two points.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 2
    }

    /// First point, if any.
    pub fn first_point(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Last point, if any.
    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Total length in scaled units.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(w[1]))
            .sum()
    }

    /// Segments of the path.
    pub fn lines(&self) -> Vec<Line> {
        self.points
            .windows(2)
            .map(|w| Line::new(w[0], w[1]))
            .collect()
    }

    /// Reverse the direction in place.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Translate all points in place.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        for p in &mut self.points {
            p.translate(dx, dy);
        }
    }

    /// Rotate all points around the origin.
    pub fn rotate(&mut self, angle: f64) {
        for p in &mut self.points {
            p.rotate(angle);
        }
    }

    /// Append another polyline's points to this one.
    pub fn append(&mut self, other: &Polyline) {
        self.points.extend_from_slice(&other.points);
    }

    /// Remove the tail of the path so its length shrinks by `distance`.
    ///
    /// Used to leave a gap between an extrusion end and its start.
    pub fn clip_end(&mut self, distance: f64) {
        let mut remaining = distance;
        while remaining > 0.0 && self.points.len() >= 2 {
            let last = self.points[self.points.len() - 1];
            let prev = self.points[self.points.len() - 2];
            let seg = prev.distance_to(last);
            if seg <= remaining {
                self.points.pop();
                remaining -= seg;
            } else {
                let t = (seg - remaining) / seg;
                let n = self.points.len();
                self.points[n - 1] = Point::new(
                    prev.x + (((last.x - prev.x) as f64) * t).round() as i64,
                    prev.y + (((last.y - prev.y) as f64) * t).round() as i64,
                );
                remaining = 0.0;
            }
        }
    }

    /// Simplify with the Douglas-Peucker algorithm.
    ///
    /// Idempotent only above the tolerance threshold.
    pub fn simplify(&self, tolerance: f64) -> Polyline {
        Polyline::new(douglas_peucker(&self.points, tolerance))
    }
}

/// Douglas-Peucker simplification of an open point sequence.
pub(crate) fn douglas_peucker(points: &[Point], tolerance: f64) -> Points {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        let mut max_dist = 0.0;
        let mut index = first;
        for (i, p) in points.iter().enumerate().take(last).skip(first + 1) {
            let d = Line::new(points[first], points[last]).distance_to(*p);
            if d > max_dist {
                max_dist = d;
                index = i;
            }
        }
        if max_dist > tolerance {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, last));
        }
    }
    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Polyline {
        Polyline::new(vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(20, 0),
            Point::new(20, 10),
        ])
    }

    #[test]
    fn test_length() {
        assert_relative_eq!(sample().length(), 30.0);
    }

    #[test]
    fn test_clip_end() {
        let mut pl = sample();
        pl.clip_end(5.0);
        assert_relative_eq!(pl.length(), 25.0);
        assert_eq!(pl.last_point(), Some(Point::new(20, 5)));
    }

    #[test]
    fn test_simplify_collinear() {
        let simplified = sample().simplify(1.0);
        assert_eq!(simplified.len(), 3);
        assert_relative_eq!(simplified.length(), 30.0);
    }
}
