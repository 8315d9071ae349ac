//! Plane cut: partition a mesh into the parts above and below a plane and
//! close both halves with a triangulated cross-section.

use strata_geometry::{unscale, ExPolygon, ExPolygons, Point, Polygon};

use crate::error::Result;
use crate::slice::{FacetEdgeType, IntersectionLine, MeshSlicer, SliceAxis};
use crate::{AxisZ, Facet, TriangleMesh, Vertex};

impl<A: SliceAxis> MeshSlicer<'_, A> {
    /// Cut the mesh at depth `z` (millimeters).
    ///
    /// Facets wholly on one side are copied as-is; facets crossing the plane
    /// are split into a triangle (the side holding the isolated vertex) and a
    /// retriangulated quadrilateral. The cross-section is triangulated and
    /// added to both halves with opposite normals so each half stays closed.
    /// Returns `(upper, lower)`, both unrepaired.
    pub fn cut(&self, z: f32) -> (TriangleMesh, TriangleMesh) {
        let mesh = self.mesh();
        let scaled_z = z / strata_geometry::SCALING_FACTOR as f32;
        let mut upper = TriangleMesh::default();
        let mut lower = TriangleMesh::default();
        let mut upper_lines: Vec<IntersectionLine> = Vec::new();
        let mut lower_lines: Vec<IntersectionLine> = Vec::new();

        for facet_idx in 0..mesh.facets_count() {
            let facet = mesh.facets()[facet_idx];
            let min_z = facet
                .vertices
                .iter()
                .map(A::depth)
                .fold(f32::INFINITY, f32::min);
            let max_z = facet
                .vertices
                .iter()
                .map(A::depth)
                .fold(f32::NEG_INFINITY, f32::max);

            // intersection lines feed the cap triangulation
            let (scaled_min, scaled_max) = self.scaled_span(facet_idx);
            for line in self.slice_facet(scaled_z, facet_idx, scaled_min, scaled_max) {
                match line.edge_type {
                    FacetEdgeType::Top => lower_lines.push(line),
                    FacetEdgeType::Bottom => upper_lines.push(line),
                    FacetEdgeType::Horizontal => {}
                    FacetEdgeType::General => {
                        lower_lines.push(line.clone());
                        upper_lines.push(line);
                    }
                }
            }

            if min_z > z || (min_z == z && max_z > min_z) {
                upper.facets.push(facet);
            } else if max_z < z || (max_z == z && max_z > min_z) {
                lower.facets.push(facet);
            } else if min_z < z && max_z > z {
                // the facet straddles the plane: find the vertex alone on its
                // side of the cut
                let above = |v: &Vertex| A::depth(v) > z;
                let isolated = if above(&facet.vertices[0]) == above(&facet.vertices[1]) {
                    2
                } else if above(&facet.vertices[1]) == above(&facet.vertices[2]) {
                    0
                } else {
                    1
                };
                let v0 = facet.vertices[isolated];
                let v1 = facet.vertices[(isolated + 1) % 3];
                let v2 = facet.vertices[(isolated + 2) % 3];

                let cut_point = |from: &Vertex, to: &Vertex| -> Vertex {
                    let t = (z - A::depth(from)) / (A::depth(to) - A::depth(from));
                    let p = *from + (*to - *from) * t;
                    // pin the depth exactly onto the plane
                    let (u, v) = A::plane(&p);
                    A::make_vertex(u, v, z)
                };
                let v0v1 = cut_point(&v1, &v0);
                let v2v0 = cut_point(&v2, &v0);

                let triangle = Facet {
                    normal: facet.normal,
                    vertices: [v0, v0v1, v2v0],
                };
                let quad = [
                    Facet {
                        normal: facet.normal,
                        vertices: [v1, v2, v0v1],
                    },
                    Facet {
                        normal: facet.normal,
                        vertices: [v2, v2v0, v0v1],
                    },
                ];

                if A::depth(&v0) > z {
                    upper.facets.push(triangle);
                    lower.facets.extend_from_slice(&quad);
                } else {
                    lower.facets.push(triangle);
                    upper.facets.extend_from_slice(&quad);
                }
            }
        }

        // close both halves with the triangulated cross-section
        for (half, lines, flip) in [
            (&mut upper, upper_lines, true),
            (&mut lower, lower_lines, false),
        ] {
            let section = self.make_expolygons_simple(lines);
            for expolygon in &section {
                for tri in triangulate(expolygon) {
                    let mut points = tri;
                    if flip {
                        points.reverse();
                    }
                    let vertices = points.map(|p| {
                        A::make_vertex(unscale(p.x) as f32, unscale(p.y) as f32, z)
                    });
                    let d = if flip { -1.0 } else { 1.0 };
                    half.facets.push(Facet {
                        normal: A::make_vertex(0.0, 0.0, d).coords,
                        vertices,
                    });
                }
            }
        }

        (upper, lower)
    }

    /// Assemble intersection lines into expolygons without boolean calls:
    /// counter-clockwise loops become contours, clockwise loops are assigned
    /// as holes of the smallest containing contour; unplaceable holes are
    /// dropped as probable self-intersections.
    fn make_expolygons_simple(&self, lines: Vec<IntersectionLine>) -> ExPolygons {
        let loops = self.make_loops(lines, 0);
        let mut slices = ExPolygons::new();
        let mut cw: Vec<Polygon> = Vec::new();
        for polygon in loops {
            if polygon.signed_area() >= 0.0 {
                slices.push(ExPolygon::from_contour(polygon));
            } else {
                cw.push(polygon);
            }
        }
        for hole in cw {
            let Some(first) = hole.first_point() else {
                continue;
            };
            let best = slices
                .iter_mut()
                .filter(|s| s.contour.contains_point(first))
                .min_by(|a, b| {
                    a.contour
                        .area()
                        .partial_cmp(&b.contour.area())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            if let Some(slice) = best {
                slice.holes.push(hole);
            }
        }
        slices
    }
}

/// Cut along the Z axis; repairs the mesh first.
pub fn cut(mesh: &mut TriangleMesh, z: f32) -> Result<(TriangleMesh, TriangleMesh)> {
    mesh.repair();
    let slicer = MeshSlicer::<AxisZ>::new(mesh)?;
    Ok(slicer.cut(z))
}

/// Ear-clipping triangulation of an expolygon.
///
/// Holes are first spliced into the contour through a bridge from each
/// hole's rightmost vertex to a nearby contour vertex.
fn triangulate(expolygon: &ExPolygon) -> Vec<[Point; 3]> {
    let mut ring = expolygon.contour.clone();
    ring.make_counter_clockwise();
    let mut points = ring.points;

    // splice holes, rightmost first
    let mut holes: Vec<Polygon> = expolygon
        .holes
        .iter()
        .cloned()
        .map(|mut h| {
            h.make_clockwise();
            h
        })
        .collect();
    holes.sort_by_key(|h| {
        std::cmp::Reverse(h.points.iter().map(|p| p.x).max().unwrap_or(i64::MIN))
    });
    for hole in holes {
        let Some(hole_start) = hole
            .points
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| (p.x, p.y))
            .map(|(i, _)| i)
        else {
            continue;
        };
        let anchor = hole.points[hole_start];
        // bridge to the nearest contour vertex not left of the anchor
        let bridge = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.x >= anchor.x)
            .min_by(|(_, a), (_, b)| {
                anchor
                    .distance_to_sq(**a)
                    .partial_cmp(&anchor.distance_to_sq(**b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .or_else(|| anchor.nearest_point_index(&points));
        let Some(bridge) = bridge else { continue };

        let mut merged = Vec::with_capacity(points.len() + hole.points.len() + 2);
        merged.extend_from_slice(&points[..=bridge]);
        for k in 0..=hole.points.len() {
            merged.push(hole.points[(hole_start + k) % hole.points.len()]);
        }
        merged.extend_from_slice(&points[bridge..]);
        points = merged;
    }

    ear_clip(points)
}

fn ear_clip(mut points: Vec<Point>) -> Vec<[Point; 3]> {
    let mut triangles = Vec::new();
    while points.len() > 3 {
        let n = points.len();
        let mut clipped = false;
        for i in 0..n {
            let prev = points[(i + n - 1) % n];
            let here = points[i];
            let next = points[(i + 1) % n];
            if here.ccw(next, prev) <= 0.0 {
                continue; // reflex corner
            }
            let blocked = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != (i + n - 1) % n && j != i && j != (i + 1) % n)
                .any(|(_, p)| {
                    *p != prev && *p != here && *p != next && point_in_triangle(*p, prev, here, next)
                });
            if blocked {
                continue;
            }
            triangles.push([prev, here, next]);
            points.remove(i);
            clipped = true;
            break;
        }
        if !clipped {
            log::warn!(
                target: "mesh::cut",
                "ear clipping stalled with {} vertices left, cross-section cap is incomplete",
                points.len()
            );
            break;
        }
    }
    if points.len() == 3 {
        triangles.push([points[0], points[1], points[2]]);
    }
    triangles
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let d1 = p.ccw(a, b);
    let d2 = p.ccw(b, c);
    let d3 = p.ccw(c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cut_cube_round_trip() {
        let mut cube = TriangleMesh::make_cube(20.0, 20.0, 20.0);
        let original_facets = cube.facets_count();
        let original_bbox = cube.bounding_box();
        let (mut upper, mut lower) = cut(&mut cube, 7.3).unwrap();

        assert!(upper.facets_count() + lower.facets_count() >= original_facets);

        upper.repair();
        lower.repair();
        assert!(upper.is_manifold());
        assert!(lower.is_manifold());
        assert_relative_eq!(lower.bounding_box().max.z, 7.3, epsilon = 1e-4);
        assert_relative_eq!(upper.bounding_box().min.z, 7.3, epsilon = 1e-4);

        let mut merged = lower.bounding_box();
        merged.merge(&upper.bounding_box());
        assert_relative_eq!(merged.min.z, original_bbox.min.z, epsilon = 1e-4);
        assert_relative_eq!(merged.max.z, original_bbox.max.z, epsilon = 1e-4);

        // the halves preserve the total volume
        assert_relative_eq!(
            upper.volume() + lower.volume(),
            8000.0,
            epsilon = 1.0
        );
    }

    #[test]
    fn test_triangulate_square() {
        let square = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ]));
        let triangles = triangulate(&square);
        assert_eq!(triangles.len(), 2);
        let area: f64 = triangles
            .iter()
            .map(|t| Polygon::new(t.to_vec()).area())
            .sum();
        assert_relative_eq!(area, 10_000.0);
    }

    #[test]
    fn test_triangulate_with_hole() {
        let mut hole = Polygon::new(vec![
            Point::new(40, 40),
            Point::new(60, 40),
            Point::new(60, 60),
            Point::new(40, 60),
        ]);
        hole.make_clockwise();
        let donut = ExPolygon {
            contour: Polygon::new(vec![
                Point::new(0, 0),
                Point::new(100, 0),
                Point::new(100, 100),
                Point::new(0, 100),
            ]),
            holes: vec![hole],
        };
        let triangles = triangulate(&donut);
        let area: f64 = triangles
            .iter()
            .map(|t| Polygon::new(t.to_vec()).area())
            .sum();
        assert_relative_eq!(area, 10_000.0 - 400.0, epsilon = 1.0);
    }
}
