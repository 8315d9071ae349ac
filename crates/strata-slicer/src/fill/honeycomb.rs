//! Honeycomb fill: hexagonal cells built from two mirrored zigzag columns.

use strata_geometry::{intersection_pl, scale, ExPolygon, Point, Polyline, Polylines};

use crate::fill::{Fill, FillParams};

/// Hexagonal fill; the direction rotates by 60° every layer so three
/// consecutive layers complete the cell walls.
#[derive(Debug, Default)]
pub struct FillHoneycomb;

struct HexGrid {
    hex_side: f64,
    hex_width: f64,
    y_short: f64,
    x_offset: f64,
    y_offset: f64,
}

impl HexGrid {
    fn new(min_spacing: f64, density: f64) -> Self {
        let distance = min_spacing / density;
        let hex_side = distance / (3f64.sqrt() / 3.0);
        Self {
            hex_side,
            hex_width: distance * 2.0,
            y_short: distance * 3f64.sqrt() / 3.0,
            x_offset: min_spacing / 2.0,
            y_offset: min_spacing / 2.0 * 3f64.sqrt() / 3.0,
        }
    }
}

impl Fill for FillHoneycomb {
    fn layer_angle(&self, layer_id: usize) -> f64 {
        std::f64::consts::FRAC_PI_3 * (layer_id % 3) as f64
    }

    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        (angle, shift): (f64, Point),
        params: &FillParams,
    ) -> Polylines {
        if params.density <= 0.0 {
            return Polylines::new();
        }
        let grid = HexGrid::new(scale(params.spacing) as f64, params.density);

        let mut rotated = expolygon.clone();
        rotated.rotate(-angle);
        let mut reference = shift;
        reference.rotate(-angle);

        let mut bbox = rotated.bounding_box();
        if !bbox.defined {
            return Polylines::new();
        }
        bbox.inflate(grid.hex_width as i64);

        // snap the grid origin to the reference frame
        let origin_x = reference.x as f64
            + ((bbox.min.x as f64 - reference.x as f64) / grid.hex_width).floor() * grid.hex_width;
        let origin_y = reference.y as f64
            + ((bbox.min.y as f64 - reference.y as f64) / (grid.y_short + grid.hex_side)).floor()
                * (grid.y_short + grid.hex_side);

        let mut columns = Polylines::new();
        let mut x = origin_x;
        while x <= bbox.max.x as f64 {
            // each column is one zigzag wall of the hexagon row
            for (x_near, x_far) in [
                (x + grid.x_offset, x + grid.hex_width - grid.x_offset),
                (x + grid.hex_width - grid.x_offset, x + grid.x_offset),
            ] {
                let mut points = Vec::new();
                let mut y = origin_y;
                while y <= bbox.max.y as f64 {
                    points.push(Point::new(x_near.round() as i64, (y + grid.y_offset).round() as i64));
                    let y2 = y + grid.y_short;
                    points.push(Point::new(x_near.round() as i64, (y2 + grid.hex_side - grid.y_offset).round() as i64));
                    let y3 = y2 + grid.hex_side;
                    points.push(Point::new(x_far.round() as i64, (y3 + grid.y_offset).round() as i64));
                    let y4 = y3 + grid.y_short;
                    points.push(Point::new(x_far.round() as i64, (y4 + grid.hex_side - grid.y_offset).round() as i64));
                    y = y4 + grid.hex_side;
                }
                if points.len() >= 2 {
                    columns.push(Polyline::new(points));
                }
            }
            x += grid.hex_width;
        }

        let mut clipped = intersection_pl(&columns, &rotated.to_polygons());
        for pl in &mut clipped {
            pl.rotate(angle);
        }
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_geometry::Polygon;

    #[test]
    fn test_honeycomb_fills_square() {
        let side = scale(40.0);
        let square = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]));
        let fill = FillHoneycomb;
        let params = FillParams {
            density: 0.2,
            spacing: 0.5,
            ..FillParams::default()
        };
        let paths = fill.fill_expolygon(&square, (0.0, Point::new(0, 0)), &params);
        assert!(!paths.is_empty());
        // all paths stay inside the square
        for pl in &paths {
            for p in &pl.points {
                assert!(p.x >= -1 && p.x <= side + 1 && p.y >= -1 && p.y <= side + 1);
            }
        }
    }

    #[test]
    fn test_layer_angle_cycles_three_layers() {
        let fill = FillHoneycomb;
        assert_eq!(fill.layer_angle(0), 0.0);
        assert!(fill.layer_angle(1) > 0.0);
        assert_eq!(fill.layer_angle(3), 0.0);
    }
}
