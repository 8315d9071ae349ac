//! Concentric fill: inward offsets of the boundary.

use strata_geometry::{offset_expolygons, scale, ExPolygon, Point, Polylines};

use crate::fill::{Fill, FillParams};

/// Fills a region with successively inset copies of its boundary.
///
/// The loops must be printed outside-in, so the produced collection is
/// order-preserving.
#[derive(Debug, Default)]
pub struct FillConcentric;

impl Fill for FillConcentric {
    fn no_sort(&self) -> bool {
        true
    }

    fn layer_angle(&self, _layer_id: usize) -> f64 {
        0.0
    }

    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        _direction: (f64, Point),
        params: &FillParams,
    ) -> Polylines {
        if params.density <= 0.0 {
            return Polylines::new();
        }
        let min_spacing = scale(params.spacing) as f64;
        let distance = min_spacing / params.density;

        let mut out = Polylines::new();
        let mut current = vec![expolygon.clone()];
        while !current.is_empty() {
            for ex in &current {
                out.push(ex.contour.split_at_first_point());
                for hole in &ex.holes {
                    out.push(hole.split_at_first_point());
                }
            }
            current = offset_expolygons(&current, -distance);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_geometry::Polygon;

    #[test]
    fn test_concentric_loop_count() {
        let side = scale(10.0);
        let square = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]));
        let fill = FillConcentric;
        let params = FillParams {
            density: 1.0,
            spacing: 1.0,
            ..FillParams::default()
        };
        let loops = fill.fill_expolygon(&square, (0.0, Point::new(0, 0)), &params);
        // a 10mm square at 1mm spacing nests five loops
        assert_eq!(loops.len(), 5);
        // loops shrink monotonically
        for pair in loops.windows(2) {
            assert!(pair[0].length() > pair[1].length());
        }
    }
}
