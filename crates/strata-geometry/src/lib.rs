#![warn(missing_docs)]

//! Scaled-integer 2D geometry kernel for the strata slicer.
//!
//! All planar coordinates that participate in boolean operations are signed
//! 64-bit integers in a fixed scaled unit (one unit = [`SCALING_FACTOR`]
//! millimeters). Floating-point types are used only at the user boundary and
//! for 3D mesh coordinates.
//!
//! Polygon booleans delegate to the `geo` crate through a lossless
//! integer-to-float coordinate mapping; offsetting is a miter offset per ring
//! followed by a safety union.

pub mod bounding_box;
pub mod chain;
pub mod clip;
pub mod expolygon;
pub mod line;
pub mod medial_axis;
pub mod point;
pub mod polygon;
pub mod polyline;

pub use bounding_box::{BoundingBox, BoundingBoxf3};
pub use chain::{chained_path, chained_path_from};
pub use clip::{
    diff, diff_ex, diff_pl, intersection, intersection_ex, intersection_pl, offset, offset2,
    offset2_ex, offset_ex, offset_expolygons, to_polygons, union, union_ex, union_expolygons,
};
pub use expolygon::{ExPolygon, ExPolygons};
pub use line::Line;
pub use medial_axis::medial_axis;
pub use point::{Point, Point3, Pointf, Pointf3, Points};
pub use polygon::{Polygon, Polygons};
pub use polyline::{Polyline, Polylines};

/// Millimeters represented by one scaled coordinate unit.
pub const SCALING_FACTOR: f64 = 0.000001;

/// Geometric tolerance in millimeters.
pub const EPSILON: f64 = 1e-4;

/// Geometric tolerance in scaled units (`EPSILON / SCALING_FACTOR`).
pub const SCALED_EPSILON: i64 = 100;

/// Minimum length of a printable extrusion segment, in scaled units.
pub const SCALED_RESOLUTION: i64 = 10_000;

/// Convert a millimeter value to scaled units.
#[inline]
pub fn scale(v: f64) -> i64 {
    (v / SCALING_FACTOR).round() as i64
}

/// Convert a scaled value to millimeters.
#[inline]
pub fn unscale(v: i64) -> f64 {
    v as f64 * SCALING_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_round_trip() {
        assert_eq!(scale(1.0), 1_000_000);
        assert_eq!(unscale(scale(20.0)), 20.0);
        assert_eq!(scale(EPSILON), SCALED_EPSILON);
    }
}
