//! Polygon booleans and offsets.
//!
//! Booleans delegate to the `geo` crate. Scaled integer coordinates are
//! mapped to `f64` losslessly (well within the 2^53 mantissa), operated on,
//! and rounded back. Offsetting is a miter offset per ring followed by a
//! winding-aware union that restores disjointness.

use geo::{coord, BooleanOps, LineString as GeoLineString, MultiLineString, MultiPolygon as GeoMultiPolygon, Polygon as GeoPolygon};

use crate::expolygon::{expolygons_to_polygons, ExPolygon, ExPolygons};
use crate::point::Point;
use crate::polygon::{Polygon, Polygons};
use crate::polyline::{Polyline, Polylines};

fn ring_to_linestring(ring: &Polygon) -> GeoLineString<f64> {
    GeoLineString::new(
        ring.points
            .iter()
            .map(|p| coord! { x: p.x as f64, y: p.y as f64 })
            .collect(),
    )
}

fn linestring_to_ring(ls: &GeoLineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ls
        .coords()
        .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::new(points)
}

/// Build a normalized multipolygon from loose rings; winding decides whether
/// a ring adds (counter-clockwise) or subtracts (clockwise) area.
fn rings_to_multi(polygons: &[Polygon]) -> GeoMultiPolygon<f64> {
    let mut contours = Vec::new();
    let mut holes = Vec::new();
    for ring in polygons {
        if !ring.is_valid() {
            continue;
        }
        let mut ccw = ring.clone();
        let is_hole = ccw.make_counter_clockwise();
        let poly = GeoPolygon::new(ring_to_linestring(&ccw), Vec::new());
        if is_hole {
            holes.push(poly);
        } else {
            contours.push(poly);
        }
    }
    let subject = GeoMultiPolygon::new(contours);
    if holes.is_empty() {
        // a self-union normalizes overlapping rings
        subject.union(&GeoMultiPolygon::new(Vec::new()))
    } else {
        subject.difference(&GeoMultiPolygon::new(holes))
    }
}

fn expolygons_to_multi(expolygons: &[ExPolygon]) -> GeoMultiPolygon<f64> {
    let polys: Vec<GeoPolygon<f64>> = expolygons
        .iter()
        .filter(|ex| ex.contour.is_valid())
        .map(|ex| {
            GeoPolygon::new(
                ring_to_linestring(&ex.contour),
                ex.holes.iter().map(ring_to_linestring).collect(),
            )
        })
        .collect();
    GeoMultiPolygon::new(polys).union(&GeoMultiPolygon::new(Vec::new()))
}

fn multi_to_expolygons(multi: GeoMultiPolygon<f64>) -> ExPolygons {
    let mut out = ExPolygons::with_capacity(multi.0.len());
    for poly in multi {
        let mut contour = linestring_to_ring(poly.exterior());
        if !contour.is_valid() {
            continue;
        }
        contour.make_counter_clockwise();
        let mut holes = Polygons::new();
        for interior in poly.interiors() {
            let mut hole = linestring_to_ring(interior);
            if hole.is_valid() {
                hole.make_clockwise();
                holes.push(hole);
            }
        }
        out.push(ExPolygon { contour, holes });
    }
    out
}

fn multi_to_polygons(multi: GeoMultiPolygon<f64>) -> Polygons {
    expolygons_to_polygons(&multi_to_expolygons(multi))
}

/// Union of loose rings into disjoint rings.
pub fn union(polygons: &[Polygon]) -> Polygons {
    multi_to_polygons(rings_to_multi(polygons))
}

/// Union of loose rings into disjoint expolygons.
pub fn union_ex(polygons: &[Polygon]) -> ExPolygons {
    multi_to_expolygons(rings_to_multi(polygons))
}

/// Union of expolygons into disjoint expolygons.
pub fn union_expolygons(expolygons: &[ExPolygon]) -> ExPolygons {
    multi_to_expolygons(expolygons_to_multi(expolygons))
}

/// `subject ∩ clip` as loose rings.
pub fn intersection(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    multi_to_polygons(rings_to_multi(subject).intersection(&rings_to_multi(clip)))
}

/// `subject ∩ clip` as expolygons.
pub fn intersection_ex(subject: &[Polygon], clip: &[Polygon]) -> ExPolygons {
    multi_to_expolygons(rings_to_multi(subject).intersection(&rings_to_multi(clip)))
}

/// `subject ∖ clip` as loose rings.
pub fn diff(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    multi_to_polygons(rings_to_multi(subject).difference(&rings_to_multi(clip)))
}

/// `subject ∖ clip` as expolygons.
pub fn diff_ex(subject: &[Polygon], clip: &[Polygon]) -> ExPolygons {
    multi_to_expolygons(rings_to_multi(subject).difference(&rings_to_multi(clip)))
}

fn clip_polylines(polylines: &[Polyline], clip: &[Polygon], invert: bool) -> Polylines {
    let mls = MultiLineString::new(
        polylines
            .iter()
            .filter(|pl| pl.is_valid())
            .map(|pl| {
                GeoLineString::new(
                    pl.points
                        .iter()
                        .map(|p| coord! { x: p.x as f64, y: p.y as f64 })
                        .collect(),
                )
            })
            .collect(),
    );
    let clipped = rings_to_multi(clip).clip(&mls, invert);
    clipped
        .into_iter()
        .map(|ls| {
            Polyline::new(
                ls.coords()
                    .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
                    .collect(),
            )
        })
        .filter(Polyline::is_valid)
        .collect()
}

/// Portions of `polylines` inside `clip`.
pub fn intersection_pl(polylines: &[Polyline], clip: &[Polygon]) -> Polylines {
    clip_polylines(polylines, clip, false)
}

/// Portions of `polylines` outside `clip`.
pub fn diff_pl(polylines: &[Polyline], clip: &[Polygon]) -> Polylines {
    clip_polylines(polylines, clip, true)
}

/// Miter offset of a single ring along the solid-outward normal.
///
/// Returns `None` when the ring collapses (winding flip or vanishing area).
fn offset_ring(ring: &Polygon, delta: f64) -> Option<Polygon> {
    let n = ring.points.len();
    if n < 3 {
        return None;
    }
    let was_ccw = ring.is_counter_clockwise();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring.points[(i + n - 1) % n];
        let here = ring.points[i];
        let next = ring.points[(i + 1) % n];

        let e0 = ((here.x - prev.x) as f64, (here.y - prev.y) as f64);
        let e1 = ((next.x - here.x) as f64, (next.y - here.y) as f64);
        let l0 = (e0.0 * e0.0 + e0.1 * e0.1).sqrt();
        let l1 = (e1.0 * e1.0 + e1.1 * e1.1).sqrt();
        if l0 == 0.0 && l1 == 0.0 {
            continue;
        }
        // right-hand edge normals point away from the solid for both windings
        let n0 = if l0 > 0.0 { (e0.1 / l0, -e0.0 / l0) } else { (e1.1 / l1, -e1.0 / l1) };
        let n1 = if l1 > 0.0 { (e1.1 / l1, -e1.0 / l1) } else { n0 };

        let mut bis = (n0.0 + n1.0, n0.1 + n1.1);
        let bis_len = (bis.0 * bis.0 + bis.1 * bis.1).sqrt();
        if bis_len < 1e-12 {
            bis = n0;
        } else {
            bis = (bis.0 / bis_len, bis.1 / bis_len);
        }
        // miter length, limited at sharp corners
        let cos_half = (n0.0 * bis.0 + n0.1 * bis.1).max(0.25);
        let d = delta / cos_half;
        out.push(Point::new(
            here.x + (bis.0 * d).round() as i64,
            here.y + (bis.1 * d).round() as i64,
        ));
    }
    let result = Polygon::new(out);
    if !result.is_valid() || result.is_counter_clockwise() != was_ccw || result.area() < 1.0 {
        return None;
    }
    Some(result)
}

/// Offset loose rings by `delta` scaled units (positive grows the solid).
pub fn offset(polygons: &[Polygon], delta: f64) -> Polygons {
    if delta == 0.0 {
        return union(polygons);
    }
    let moved: Polygons = polygons
        .iter()
        .filter_map(|p| offset_ring(p, delta))
        .collect();
    union(&moved)
}

/// Offset loose rings, returning expolygons.
pub fn offset_ex(polygons: &[Polygon], delta: f64) -> ExPolygons {
    if delta == 0.0 {
        return union_ex(polygons);
    }
    let moved: Polygons = polygons
        .iter()
        .filter_map(|p| offset_ring(p, delta))
        .collect();
    union_ex(&moved)
}

/// Offset by `delta1` then by `delta2`; the usual erode-dilate sliver filter.
pub fn offset2(polygons: &[Polygon], delta1: f64, delta2: f64) -> Polygons {
    offset(&offset(polygons, delta1), delta2)
}

/// Offset by `delta1` then by `delta2`, returning expolygons.
pub fn offset2_ex(polygons: &[Polygon], delta1: f64, delta2: f64) -> ExPolygons {
    offset_ex(&offset(polygons, delta1), delta2)
}

/// Offset expolygons (holes shrink when the solid grows).
pub fn offset_expolygons(expolygons: &[ExPolygon], delta: f64) -> ExPolygons {
    offset_ex(&expolygons_to_polygons(expolygons), delta)
}

/// Flatten expolygons into their rings.
pub fn to_polygons(expolygons: &[ExPolygon]) -> Polygons {
    expolygons_to_polygons(expolygons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(origin: Point, side: i64) -> Polygon {
        Polygon::new(vec![
            origin,
            Point::new(origin.x + side, origin.y),
            Point::new(origin.x + side, origin.y + side),
            Point::new(origin.x, origin.y + side),
        ])
    }

    #[test]
    fn test_union_merges_overlap() {
        let result = union_ex(&[square(Point::new(0, 0), 100), square(Point::new(50, 0), 100)]);
        assert_eq!(result.len(), 1);
        assert_relative_eq!(result[0].area(), 15_000.0, epsilon = 10.0);
    }

    #[test]
    fn test_union_with_hole_ring() {
        let mut hole = square(Point::new(25, 25), 50);
        hole.make_clockwise();
        let result = union_ex(&[square(Point::new(0, 0), 100), hole]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].holes.len(), 1);
        assert_relative_eq!(result[0].area(), 10_000.0 - 2_500.0, epsilon = 10.0);
    }

    #[test]
    fn test_diff_and_intersection() {
        let a = [square(Point::new(0, 0), 100)];
        let b = [square(Point::new(50, 0), 100)];
        let inter = intersection_ex(&a, &b);
        assert_eq!(inter.len(), 1);
        assert_relative_eq!(inter[0].area(), 5_000.0, epsilon = 10.0);
        let d = diff_ex(&a, &b);
        assert_eq!(d.len(), 1);
        assert_relative_eq!(d[0].area(), 5_000.0, epsilon = 10.0);
    }

    #[test]
    fn test_offset_grow_shrink() {
        let grown = offset_ex(&[square(Point::new(0, 0), 1000)], 100.0);
        assert_eq!(grown.len(), 1);
        assert_relative_eq!(grown[0].area(), 1200.0 * 1200.0, epsilon = 2_000.0);

        let shrunk = offset_ex(&[square(Point::new(0, 0), 1000)], -100.0);
        assert_eq!(shrunk.len(), 1);
        assert_relative_eq!(shrunk[0].area(), 800.0 * 800.0, epsilon = 2_000.0);
    }

    #[test]
    fn test_offset_collapses_small_ring() {
        assert!(offset(&[square(Point::new(0, 0), 100)], -60.0).is_empty());
    }

    #[test]
    fn test_intersection_pl() {
        let clip = [square(Point::new(0, 0), 100)];
        let pl = Polyline::new(vec![Point::new(-50, 50), Point::new(150, 50)]);
        let clipped = intersection_pl(&[pl], &clip);
        assert_eq!(clipped.len(), 1);
        assert_relative_eq!(clipped[0].length(), 100.0, epsilon = 1.0);
    }
}
