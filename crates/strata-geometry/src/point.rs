//! Point types in scaled-integer and floating-point coordinates.

use serde::{Deserialize, Serialize};

use crate::{scale, unscale};

/// A 2D point in floating-point millimeters.
pub type Pointf = nalgebra::Point2<f64>;

/// A 3D point in floating-point millimeters.
pub type Pointf3 = nalgebra::Point3<f64>;

/// A 2D point in scaled-integer coordinates.
///
/// This is the only point type that flows through the polygon booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate, scaled units.
    pub x: i64,
    /// Y coordinate, scaled units.
    pub y: i64,
}

/// A list of scaled points.
pub type Points = Vec<Point>;

impl Point {
    /// Create a point from scaled coordinates.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Create a point by scaling millimeter coordinates.
    pub fn new_scale(x: f64, y: f64) -> Self {
        Self {
            x: scale(x),
            y: scale(y),
        }
    }

    /// Convert to floating-point millimeters.
    pub fn to_pointf(self) -> Pointf {
        Pointf::new(unscale(self.x), unscale(self.y))
    }

    /// Translate in place.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.x += dx;
        self.y += dy;
    }

    /// Return the point translated by `(dx, dy)`.
    pub fn translated(self, dx: i64, dy: i64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Rotate around the origin by `angle` radians.
    pub fn rotate(&mut self, angle: f64) {
        let (s, c) = angle.sin_cos();
        let (x, y) = (self.x as f64, self.y as f64);
        self.x = (c * x - s * y).round() as i64;
        self.y = (s * x + c * y).round() as i64;
    }

    /// Rotate around `center` by `angle` radians.
    pub fn rotate_around(&mut self, angle: f64, center: Point) {
        let mut p = Point::new(self.x - center.x, self.y - center.y);
        p.rotate(angle);
        self.x = center.x + p.x;
        self.y = center.y + p.y;
    }

    /// Euclidean distance to another point, in scaled units.
    pub fn distance_to(self, other: Point) -> f64 {
        self.distance_to_sq(other).sqrt()
    }

    /// Squared euclidean distance to another point.
    pub fn distance_to_sq(self, other: Point) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        dx * dx + dy * dy
    }

    /// Cross product of vectors `self→p1` and `self→p2`.
    pub fn ccw(self, p1: Point, p2: Point) -> f64 {
        let v1 = ((p1.x - self.x) as f64, (p1.y - self.y) as f64);
        let v2 = ((p2.x - self.x) as f64, (p2.y - self.y) as f64);
        v1.0 * v2.1 - v1.1 * v2.0
    }

    /// Angle of the corner `p1, self, p2` in `[0, π]`.
    pub fn angle(self, p1: Point, p2: Point) -> f64 {
        let v1 = ((p1.x - self.x) as f64, (p1.y - self.y) as f64);
        let v2 = ((p2.x - self.x) as f64, (p2.y - self.y) as f64);
        let dot = v1.0 * v2.0 + v1.1 * v2.1;
        let cross = v1.0 * v2.1 - v1.1 * v2.0;
        cross.atan2(dot).abs()
    }

    /// Index of the point in `points` nearest to `self`, if any.
    pub fn nearest_point_index(self, points: &[Point]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in points.iter().enumerate() {
            let d = self.distance_to_sq(*p);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// The point in `points` nearest to `self`, if any.
    pub fn nearest_point(self, points: &[Point]) -> Option<Point> {
        self.nearest_point_index(points).map(|i| points[i])
    }

    /// Project `self` onto the segment `a..b`.
    pub fn project_onto_segment(self, a: Point, b: Point) -> Point {
        let vx = (b.x - a.x) as f64;
        let vy = (b.y - a.y) as f64;
        let len_sq = vx * vx + vy * vy;
        if len_sq == 0.0 {
            return a;
        }
        let t = (((self.x - a.x) as f64 * vx + (self.y - a.y) as f64 * vy) / len_sq).clamp(0.0, 1.0);
        Point::new(
            a.x + (vx * t).round() as i64,
            a.y + (vy * t).round() as i64,
        )
    }

    /// Convert from floating-point millimeters.
    pub fn from_pointf(p: Pointf) -> Self {
        Self::new_scale(p.x, p.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A 3D point in scaled-integer coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3 {
    /// X coordinate, scaled units.
    pub x: i64,
    /// Y coordinate, scaled units.
    pub y: i64,
    /// Z coordinate, scaled units.
    pub z: i64,
}

impl Point3 {
    /// Create a point from scaled coordinates.
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Create a point by scaling millimeter coordinates.
    pub fn new_scale(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: scale(x),
            y: scale(y),
            z: scale(z),
        }
    }

    /// Drop the Z coordinate.
    pub fn xy(self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotate() {
        let mut p = Point::new(1_000_000, 0);
        p.rotate(std::f64::consts::FRAC_PI_2);
        assert_eq!(p, Point::new(0, 1_000_000));
    }

    #[test]
    fn test_distance() {
        let a = Point::new_scale(0.0, 0.0);
        let b = Point::new_scale(3.0, 4.0);
        assert_relative_eq!(a.distance_to(b), crate::scale(5.0) as f64, epsilon = 1.0);
    }

    #[test]
    fn test_nearest_point() {
        let points = vec![
            Point::new(0, 0),
            Point::new(100, 100),
            Point::new(5, 5),
        ];
        assert_eq!(Point::new(4, 4).nearest_point_index(&points), Some(2));
    }

    #[test]
    fn test_project_onto_segment() {
        let p = Point::new(5, 10).project_onto_segment(Point::new(0, 0), Point::new(10, 0));
        assert_eq!(p, Point::new(5, 0));
    }
}
