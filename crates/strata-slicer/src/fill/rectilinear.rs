//! Rectilinear fill and its fixed-direction variants.

use strata_geometry::{intersection_pl, scale, ExPolygon, Point, Polyline, Polylines, SCALED_EPSILON};

use crate::fill::{Fill, FillParams};
use crate::flow::solid_spacing;

/// Parallel lines, connected into zigzags where the boundary allows;
/// direction alternates by 90° between layers.
#[derive(Debug, Default)]
pub struct FillRectilinear {
    /// Keep the same direction in every layer.
    pub aligned: bool,
}

impl Fill for FillRectilinear {
    fn layer_angle(&self, layer_id: usize) -> f64 {
        if self.aligned || layer_id % 2 == 0 {
            0.0
        } else {
            std::f64::consts::FRAC_PI_2
        }
    }

    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        direction: (f64, Point),
        params: &FillParams,
    ) -> Polylines {
        fill_single_direction(expolygon, direction, 1.0, params)
    }
}

/// Two perpendicular passes per layer, constant direction.
#[derive(Debug, Default)]
pub struct FillGrid;

impl Fill for FillGrid {
    fn layer_angle(&self, _layer_id: usize) -> f64 {
        0.0
    }

    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        direction: (f64, Point),
        params: &FillParams,
    ) -> Polylines {
        let mut out = fill_single_direction(expolygon, direction, 2.0, params);
        let crossed = (direction.0 + std::f64::consts::FRAC_PI_2, direction.1);
        out.extend(fill_single_direction(expolygon, crossed, 2.0, params));
        out
    }
}

/// Three passes at 60° to each other, constant direction.
#[derive(Debug, Default)]
pub struct FillTriangles;

impl Fill for FillTriangles {
    fn layer_angle(&self, _layer_id: usize) -> f64 {
        0.0
    }

    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        direction: (f64, Point),
        params: &FillParams,
    ) -> Polylines {
        let mut out = Polylines::new();
        for i in 0..3 {
            let angle = direction.0 + i as f64 * std::f64::consts::FRAC_PI_3;
            out.extend(fill_single_direction(
                expolygon,
                (angle, direction.1),
                3.0,
                params,
            ));
        }
        out
    }
}

/// Scanline fill of one expolygon in one direction.
///
/// `distance_factor` spreads the lines of multi-pass patterns so the
/// combined density matches the request.
pub(crate) fn fill_single_direction(
    expolygon: &ExPolygon,
    (angle, shift): (f64, Point),
    distance_factor: f64,
    params: &FillParams,
) -> Polylines {
    if params.density <= 0.0 {
        return Polylines::new();
    }

    // rotate so fill lines run along the X axis
    let mut rotated = expolygon.clone();
    rotated.rotate(-angle);
    let mut reference = shift;
    reference.rotate(-angle);

    let bbox = rotated.bounding_box();
    if !bbox.defined {
        return Polylines::new();
    }

    let min_spacing = scale(params.spacing);
    let mut line_distance = ((min_spacing as f64 / params.density) * distance_factor) as i64;
    if line_distance <= 0 {
        return Polylines::new();
    }
    let full_density = params.density > 0.9999 && distance_factor == 1.0;
    if full_density && !params.dont_adjust {
        let height = bbox.size().y;
        if height > 0 {
            line_distance = solid_spacing(height, line_distance);
        }
    }

    // align scanlines to the reference point so the pattern continues
    // seamlessly across islands and layers
    let offset_from_reference = (bbox.min.y - reference.y).rem_euclid(line_distance);
    let mut y = bbox.min.y + (line_distance - offset_from_reference) % line_distance;
    if full_density && !params.dont_adjust {
        // center the integer number of lines inside the span instead
        let height = bbox.size().y;
        let lines = (height / line_distance).max(1);
        y = bbox.min.y + (height - (lines - 1) * line_distance) / 2;
    }

    let margin = line_distance;
    let mut scanlines = Polylines::new();
    while y <= bbox.max.y {
        scanlines.push(Polyline::new(vec![
            Point::new(bbox.min.x - margin, y),
            Point::new(bbox.max.x + margin, y),
        ]));
        y += line_distance;
    }

    let mut segments = intersection_pl(&scanlines, &rotated.to_polygons());
    // sort by scanline, then by X, so chaining is deterministic
    segments.retain(|s| s.is_valid());
    for segment in &mut segments {
        if segment.first_point().map(|p| p.x) > segment.last_point().map(|p| p.x) {
            segment.reverse();
        }
    }
    segments.sort_by_key(|s| {
        let p = s.first_point().unwrap_or_default();
        (p.y, p.x)
    });

    let polylines = connect_zigzag(segments, &rotated, line_distance);

    polylines
        .into_iter()
        .map(|mut pl| {
            pl.rotate(angle);
            pl
        })
        .collect()
}

/// Connect scanline segments into continuous zigzag paths.
///
/// A connection is taken when it is short relative to the line distance and
/// stays inside the region.
fn connect_zigzag(segments: Polylines, region: &ExPolygon, line_distance: i64) -> Polylines {
    let mut out = Polylines::new();
    let mut used = vec![false; segments.len()];

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut chain = segments[start].clone();
        loop {
            let end = match chain.last_point() {
                Some(p) => p,
                None => break,
            };
            // candidate: an unused segment on the next scanline whose nearer
            // endpoint connects without leaving the region
            let mut best: Option<(usize, bool, f64)> = None;
            for (idx, segment) in segments.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                let first = segment.first_point().unwrap_or_default();
                if first.y != end.y + line_distance {
                    continue;
                }
                for (at_start, candidate) in [
                    (true, first),
                    (false, segment.last_point().unwrap_or_default()),
                ] {
                    let connection = end.distance_to(candidate);
                    if connection > 2.0 * line_distance as f64 {
                        continue;
                    }
                    let mid = Point::new((end.x + candidate.x) / 2, (end.y + candidate.y) / 2);
                    let straight = (end.x - candidate.x).abs() <= SCALED_EPSILON;
                    if !straight && !region.contains_point(mid) {
                        continue;
                    }
                    if best.map_or(true, |(_, _, d)| connection < d) {
                        best = Some((idx, at_start, connection));
                    }
                }
            }
            match best {
                Some((idx, at_start, _)) => {
                    used[idx] = true;
                    let mut next = segments[idx].clone();
                    if !at_start {
                        next.reverse();
                    }
                    chain.append(&next);
                }
                None => break,
            }
        }
        out.push(chain);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::FillParams;
    use strata_geometry::Polygon;

    fn square(side_mm: f64) -> ExPolygon {
        let side = scale(side_mm);
        ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]))
    }

    #[test]
    fn test_square_fills_into_single_zigzag() {
        // the classic rectilinear acceptance check: a 100-wide region at
        // min_spacing 5 and density 0.1 yields one continuous polyline at
        // least as long as three passes plus two connectors
        let region = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, scale(-1.0)),
            Point::new(scale(100.0), scale(-1.0)),
            Point::new(scale(100.0), scale(101.0)),
            Point::new(0, scale(101.0)),
        ]));
        let params = FillParams {
            density: 0.1,
            dont_adjust: true,
            spacing: 5.0,
            angle: -std::f64::consts::FRAC_PI_2,
            layer_id: None,
            bounding_box: None,
        };
        let polylines = fill_single_direction(
            &region,
            (params.angle + std::f64::consts::FRAC_PI_2, Point::new(0, 0)),
            1.0,
            &params,
        );
        assert_eq!(polylines.len(), 1);
        let min_length = scale(3.0 * 100.0 + 2.0 * 50.0) as f64 - SCALED_EPSILON as f64;
        assert!(polylines[0].length() >= min_length);
    }

    #[test]
    fn test_solid_surface_fully_covered() {
        // dilate every path by half the effective spacing; what the paths
        // miss of the region must be at most dust
        let w = scale(9.0);
        let h = scale(4.0);
        let region = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(w, 0),
            Point::new(w, h),
            Point::new(0, h),
        ]));
        let spacing_mm = 0.55;
        let angle = std::f64::consts::FRAC_PI_4;
        let params = FillParams {
            density: 1.0,
            dont_adjust: false,
            spacing: spacing_mm,
            ..FillParams::default()
        };
        let polylines = fill_single_direction(&region, (angle, Point::new(0, 0)), 1.0, &params);
        assert!(!polylines.is_empty());

        // the fill stretched its spacing to an integer line count; the
        // printed bead covers half of that on each side
        let mut rotated = region.clone();
        rotated.rotate(-angle);
        let adjusted = solid_spacing(rotated.bounding_box().size().y, scale(spacing_mm));
        let half = adjusted / 2 + 2 * SCALED_EPSILON;
        let mut covered: Vec<Polygon> = Vec::new();
        for pl in &polylines {
            for line in pl.lines() {
                let d = line.vector();
                let len = (d.x * d.x + d.y * d.y).sqrt();
                if len == 0.0 {
                    continue;
                }
                let (nx, ny) = (
                    (-d.y / len * half as f64) as i64,
                    (d.x / len * half as f64) as i64,
                );
                covered.push(Polygon::new(vec![
                    Point::new(line.a.x + nx, line.a.y + ny),
                    Point::new(line.b.x + nx, line.b.y + ny),
                    Point::new(line.b.x - nx, line.b.y - ny),
                    Point::new(line.a.x - nx, line.a.y - ny),
                ]));
            }
            for p in &pl.points {
                covered.push(Polygon::new(vec![
                    Point::new(p.x - half, p.y - half),
                    Point::new(p.x + half, p.y - half),
                    Point::new(p.x + half, p.y + half),
                    Point::new(p.x - half, p.y + half),
                ]));
            }
        }
        let uncovered = strata_geometry::diff_ex(&region.to_polygons(), &covered);
        let missing: f64 = uncovered.iter().map(|ex| ex.area()).sum();
        let tolerance = (scale(spacing_mm) as f64).powi(2);
        assert!(
            missing <= tolerance,
            "uncovered area {missing} exceeds {tolerance}"
        );
    }

    #[test]
    fn test_solid_fill_covers_region() {
        // a solid fill of a small square leaves no scanline behind
        let params = FillParams {
            density: 1.0,
            spacing: 0.5,
            ..FillParams::default()
        };
        let polylines =
            fill_single_direction(&square(10.0), (0.0, Point::new(0, 0)), 1.0, &params);
        let total: f64 = polylines.iter().map(Polyline::length).sum();
        // about 20 lines of 10mm each, connectors included
        assert!(total > scale(10.0 * 18.0) as f64);
    }

    #[test]
    fn test_hole_splits_paths() {
        let mut region = square(20.0);
        let mut hole = Polygon::new(vec![
            Point::new(scale(8.0), scale(2.0)),
            Point::new(scale(12.0), scale(2.0)),
            Point::new(scale(12.0), scale(18.0)),
            Point::new(scale(8.0), scale(18.0)),
        ]);
        hole.make_clockwise();
        region.holes.push(hole);
        let params = FillParams {
            density: 0.5,
            spacing: 1.0,
            ..FillParams::default()
        };
        let polylines =
            fill_single_direction(&region, (0.0, Point::new(0, 0)), 1.0, &params);
        // no segment may cross the hole
        for pl in &polylines {
            for line in pl.lines() {
                let mid = line.midpoint();
                assert!(
                    !(mid.x > scale(8.5) && mid.x < scale(11.5) && mid.y > scale(2.5) && mid.y < scale(17.5)),
                    "fill crosses the hole at {mid}"
                );
            }
        }
    }
}
