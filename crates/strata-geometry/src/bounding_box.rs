//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

use crate::point::{Point, Pointf3};
use crate::polygon::Polygon;

/// Axis-aligned 2D bounding box in scaled coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Point,
    /// Maximum corner.
    pub max: Point,
    /// False until at least one point has been merged.
    pub defined: bool,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Point::new(i64::MAX, i64::MAX),
            max: Point::new(i64::MIN, i64::MIN),
            defined: false,
        }
    }
}

impl BoundingBox {
    /// Bounding box of a point set.
    pub fn from_points(points: &[Point]) -> Self {
        let mut bbox = Self::default();
        for p in points {
            bbox.merge_point(*p);
        }
        bbox
    }

    /// Extend to contain `p`.
    pub fn merge_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.defined = true;
    }

    /// Extend to contain another box.
    pub fn merge(&mut self, other: &BoundingBox) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Grow (or shrink, when negative) by `delta` on every side.
    pub fn inflate(&mut self, delta: i64) {
        if self.defined {
            self.min.x -= delta;
            self.min.y -= delta;
            self.max.x += delta;
            self.max.y += delta;
        }
    }

    /// Box size as a point.
    pub fn size(&self) -> Point {
        Point::new(self.max.x - self.min.x, self.max.y - self.min.y)
    }

    /// Box center.
    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2,
            (self.min.y + self.max.y) / 2,
        )
    }

    /// The box as a counter-clockwise polygon.
    pub fn polygon(&self) -> Polygon {
        Polygon::new(vec![
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ])
    }

    /// True when `p` lies inside or on the boundary.
    pub fn contains_point(&self, p: Point) -> bool {
        self.defined
            && p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
    }

    /// True when the two boxes overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.defined
            && other.defined
            && self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// Axis-aligned 3D bounding box in floating-point millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxf3 {
    /// Minimum corner.
    pub min: Pointf3,
    /// Maximum corner.
    pub max: Pointf3,
    /// False until at least one point has been merged.
    pub defined: bool,
}

impl Default for BoundingBoxf3 {
    fn default() -> Self {
        Self {
            min: Pointf3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Pointf3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            defined: false,
        }
    }
}

impl BoundingBoxf3 {
    /// Extend to contain `p`.
    pub fn merge_point(&mut self, p: Pointf3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
        self.defined = true;
    }

    /// Extend to contain another box.
    pub fn merge(&mut self, other: &BoundingBoxf3) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Box size along each axis.
    pub fn size(&self) -> Pointf3 {
        Pointf3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_size() {
        let bbox = BoundingBox::from_points(&[Point::new(-5, 3), Point::new(10, -2)]);
        assert_eq!(bbox.min, Point::new(-5, -2));
        assert_eq!(bbox.max, Point::new(10, 3));
        assert_eq!(bbox.size(), Point::new(15, 5));
    }

    #[test]
    fn test_undefined_does_not_merge() {
        let mut a = BoundingBox::default();
        a.merge(&BoundingBox::default());
        assert!(!a.defined);
    }

    #[test]
    fn test_overlaps() {
        let a = BoundingBox::from_points(&[Point::new(0, 0), Point::new(10, 10)]);
        let b = BoundingBox::from_points(&[Point::new(5, 5), Point::new(20, 20)]);
        let c = BoundingBox::from_points(&[Point::new(11, 11), Point::new(20, 20)]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
