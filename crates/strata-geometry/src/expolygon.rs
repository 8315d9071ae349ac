//! Simple polygons with holes.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::point::Point;
use crate::polygon::{Polygon, Polygons};

/// One outer contour plus zero or more holes, all holes inside the contour
/// and pairwise disjoint.
///
/// Invariant: the contour is counter-clockwise and every hole is clockwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExPolygon {
    /// Outer boundary, counter-clockwise.
    pub contour: Polygon,
    /// Holes, clockwise.
    pub holes: Polygons,
}

/// A list of expolygons.
pub type ExPolygons = Vec<ExPolygon>;

impl ExPolygon {
    /// An expolygon with no holes.
    pub fn from_contour(contour: Polygon) -> Self {
        Self {
            contour,
            holes: Vec::new(),
        }
    }

    /// True when the contour is empty.
    pub fn is_empty(&self) -> bool {
        self.contour.is_empty()
    }

    /// Contour and hole windings are consistent with the invariant.
    pub fn is_valid(&self) -> bool {
        self.contour.is_valid()
            && self.contour.is_counter_clockwise()
            && self.holes.iter().all(|h| h.is_valid() && h.is_clockwise())
    }

    /// Net area (contour minus holes) in scaled units squared.
    pub fn area(&self) -> f64 {
        let mut area = self.contour.area();
        for hole in &self.holes {
            area -= hole.area();
        }
        area
    }

    /// True when `p` lies inside the contour and outside every hole.
    pub fn contains_point(&self, p: Point) -> bool {
        self.contour.contains_point(p) && !self.holes.iter().any(|h| h.contains_point(p))
    }

    /// All rings, contour first.
    pub fn to_polygons(&self) -> Polygons {
        let mut out = Polygons::with_capacity(1 + self.holes.len());
        out.push(self.contour.clone());
        out.extend(self.holes.iter().cloned());
        out
    }

    /// Bounding box of the contour.
    pub fn bounding_box(&self) -> BoundingBox {
        self.contour.bounding_box()
    }

    /// Translate contour and holes in place.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.contour.translate(dx, dy);
        for hole in &mut self.holes {
            hole.translate(dx, dy);
        }
    }

    /// Rotate contour and holes around the origin.
    pub fn rotate(&mut self, angle: f64) {
        self.contour.rotate(angle);
        for hole in &mut self.holes {
            hole.rotate(angle);
        }
    }

    /// Simplify all rings with Douglas-Peucker, dropping degenerate holes.
    pub fn simplify(&self, tolerance: f64) -> ExPolygons {
        let contours = self.contour.simplify(tolerance);
        contours
            .into_iter()
            .map(|contour| ExPolygon {
                contour,
                holes: self
                    .holes
                    .iter()
                    .flat_map(|h| h.simplify(tolerance))
                    .collect(),
            })
            .collect()
    }
}

impl From<Polygon> for ExPolygon {
    fn from(mut contour: Polygon) -> Self {
        contour.make_counter_clockwise();
        ExPolygon::from_contour(contour)
    }
}

/// Flatten expolygons into their rings.
pub fn expolygons_to_polygons(expolygons: &[ExPolygon]) -> Polygons {
    expolygons.iter().flat_map(|ex| ex.to_polygons()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donut() -> ExPolygon {
        let contour = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ]);
        let hole = Polygon::new(vec![
            Point::new(25, 25),
            Point::new(25, 75),
            Point::new(75, 75),
            Point::new(75, 25),
        ]);
        ExPolygon {
            contour,
            holes: vec![hole],
        }
    }

    #[test]
    fn test_validity_and_area() {
        let ex = donut();
        assert!(ex.is_valid());
        assert_eq!(ex.area(), 10_000.0 - 2_500.0);
    }

    #[test]
    fn test_contains_point() {
        let ex = donut();
        assert!(ex.contains_point(Point::new(10, 10)));
        assert!(!ex.contains_point(Point::new(50, 50)));
        assert!(!ex.contains_point(Point::new(150, 50)));
    }
}
