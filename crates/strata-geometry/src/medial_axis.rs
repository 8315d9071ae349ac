//! Medial-axis approximation for thin-wall detection.
//!
//! The skeleton is derived from the Voronoi diagram of points sampled along
//! the expolygon boundary: a Voronoi edge belongs to the medial axis when its
//! defining sites are non-consecutive boundary samples and both its vertices
//! lie inside the region. Edges are kept where the local width (twice the
//! clearance radius) falls within `[min_width, max_width]`, chained into
//! polylines, and short stubs (corner branches) are pruned.

use std::collections::HashMap;

use voronoice::{BoundingBox as VoronoiBox, Point as SitePoint, VoronoiBuilder};

use crate::expolygon::ExPolygon;
use crate::point::Point;
use crate::polygon::Polygon;
use crate::polyline::{Polyline, Polylines};
use crate::SCALED_EPSILON;

#[derive(Clone, Copy)]
struct Sample {
    ring: usize,
    index: usize,
    ring_len: usize,
}

fn sample_ring(ring: &Polygon, ring_id: usize, step: f64, sites: &mut Vec<SitePoint>, meta: &mut Vec<Sample>) -> usize {
    let n = ring.points.len();
    let mut count = 0;
    for i in 0..n {
        let a = ring.points[i];
        let b = ring.points[(i + 1) % n];
        let len = a.distance_to(b);
        let subdivisions = (len / step).ceil().max(1.0) as usize;
        for s in 0..subdivisions {
            let t = s as f64 / subdivisions as f64;
            sites.push(SitePoint {
                x: a.x as f64 + (b.x - a.x) as f64 * t,
                y: a.y as f64 + (b.y - a.y) as f64 * t,
            });
            count += 1;
        }
    }
    for index in 0..count {
        meta.push(Sample {
            ring: ring_id,
            index,
            ring_len: count,
        });
    }
    count
}

fn consecutive(a: Sample, b: Sample) -> bool {
    if a.ring != b.ring {
        return false;
    }
    let d = a.index.abs_diff(b.index);
    d <= 1 || d == a.ring_len - 1
}

/// Extract the skeleton of the parts of `ex` narrower than `max_width`,
/// discarding features narrower than `min_width`. Widths are scaled units.
pub fn medial_axis(ex: &ExPolygon, max_width: f64, min_width: f64) -> Polylines {
    if ex.contour.len() < 3 {
        return Vec::new();
    }

    // sample all rings
    let step = (max_width / 4.0).max(SCALED_EPSILON as f64);
    let mut sites = Vec::new();
    let mut meta = Vec::new();
    sample_ring(&ex.contour, 0, step, &mut sites, &mut meta);
    for (i, hole) in ex.holes.iter().enumerate() {
        sample_ring(hole, i + 1, step, &mut sites, &mut meta);
    }
    if sites.len() < 3 {
        return Vec::new();
    }

    let bbox = ex.bounding_box();
    let size = bbox.size();
    let center = bbox.center();
    let voronoi = VoronoiBuilder::default()
        .set_sites(sites)
        .set_bounding_box(VoronoiBox::new(
            SitePoint {
                x: center.x as f64,
                y: center.y as f64,
            },
            size.x as f64 + 4.0 * max_width,
            size.y as f64 + 4.0 * max_width,
        ))
        .build();
    let voronoi = match voronoi {
        Some(v) => v,
        None => {
            log::warn!(target: "geometry::medial_axis", "voronoi construction failed, skipping thin-wall detection");
            return Vec::new();
        }
    };

    let triangulation = voronoi.triangulation();
    let vertices = voronoi.vertices();
    let sites = voronoi.sites();
    let triangle_count = triangulation.triangles.len() / 3;

    // collect interior voronoi edges within the width band
    let mut segments: Vec<(Point, Point)> = Vec::new();
    for e in 0..triangulation.triangles.len() {
        let twin = triangulation.halfedges[e];
        if twin == usize::MAX || twin < e {
            continue;
        }
        let t1 = e / 3;
        let t2 = twin / 3;
        if t1 >= triangle_count || t2 >= triangle_count {
            continue;
        }
        let next = if e % 3 == 2 { e - 2 } else { e + 1 };
        let sa = triangulation.triangles[e];
        let sb = triangulation.triangles[next];
        if consecutive(meta[sa], meta[sb]) {
            continue;
        }
        let c1 = &vertices[t1];
        let c2 = &vertices[t2];
        let p1 = Point::new(c1.x.round() as i64, c1.y.round() as i64);
        let p2 = Point::new(c2.x.round() as i64, c2.y.round() as i64);
        if p1 == p2 || !ex.contains_point(p1) || !ex.contains_point(p2) {
            continue;
        }
        let site = &sites[sa];
        let sp = Point::new(site.x.round() as i64, site.y.round() as i64);
        let w1 = 2.0 * p1.distance_to(sp);
        let w2 = 2.0 * p2.distance_to(sp);
        // the tolerance absorbs the chordal error of boundary sampling:
        // between two samples the measured radius exceeds the true
        // clearance by up to (step/2)^2 / (2 r)
        let tol = step * 0.25 + SCALED_EPSILON as f64;
        if w1 > max_width + tol || w2 > max_width + tol || w1 < min_width || w2 < min_width {
            continue;
        }
        segments.push((p1, p2));
    }

    let mut polylines = chain_skeleton(segments);
    // corner branches are shorter than the local width; prune them
    polylines.retain(|pl| pl.length() >= max_width);
    for pl in &mut polylines {
        *pl = pl.simplify(SCALED_EPSILON as f64);
    }
    polylines
}

/// Chain skeleton segments into maximal paths, stopping at junctions.
fn chain_skeleton(segments: Vec<(Point, Point)>) -> Polylines {
    let mut adjacency: HashMap<Point, Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        adjacency.entry(*a).or_default().push(i);
        adjacency.entry(*b).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut out = Polylines::new();

    // start walks at endpoints and junctions first, then pick up loops
    let mut starts: Vec<Point> = adjacency
        .iter()
        .filter(|(_, edges)| edges.len() != 2)
        .map(|(p, _)| *p)
        .collect();
    starts.sort();
    starts.extend(adjacency.keys().copied());

    for start in starts {
        loop {
            let Some(&edge) = adjacency
                .get(&start)
                .and_then(|edges| edges.iter().find(|&&e| !used[e]))
            else {
                break;
            };
            let mut path = vec![start];
            let mut current = edge;
            let mut here = start;
            loop {
                used[current] = true;
                let (a, b) = segments[current];
                here = if a == here { b } else { a };
                path.push(here);
                let edges = &adjacency[&here];
                if edges.len() != 2 {
                    break;
                }
                match edges.iter().find(|&&e| !used[e]) {
                    Some(&e) => current = e,
                    None => break,
                }
            }
            out.push(Polyline::new(path));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale;

    #[test]
    fn test_medial_axis_narrow_rectangle() {
        // a 20x100 rectangle with threshold 20 yields a single spine
        let ex = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(scale(100.0), 0),
            Point::new(scale(100.0), scale(20.0)),
            Point::new(0, scale(20.0)),
        ]));
        let polylines = medial_axis(&ex, scale(20.0) as f64, scale(0.5) as f64);
        assert_eq!(polylines.len(), 1);
        assert!(polylines[0].length() >= scale(100.0 - 20.0) as f64 - SCALED_EPSILON as f64);
    }

    #[test]
    fn test_medial_axis_wide_region_is_empty() {
        // nothing is narrower than the threshold
        let ex = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(scale(100.0), 0),
            Point::new(scale(100.0), scale(100.0)),
            Point::new(0, scale(100.0)),
        ]));
        let polylines = medial_axis(&ex, scale(5.0) as f64, scale(0.5) as f64);
        assert!(polylines.is_empty());
    }
}
