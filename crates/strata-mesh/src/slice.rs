//! Planar slicing: intersect a repaired mesh with horizontal planes and
//! assemble the intersection lines into expolygons.
//!
//! The slicer is parameterized over the slicing axis; the algorithm only ever
//! sees a "depth" component and two "plane" components, so the same code
//! slices along X, Y or Z.

use std::marker::PhantomData;

use rayon::prelude::*;

use strata_geometry::{diff, offset2_ex, scale, ExPolygons, Point, Polygon, Polygons};

use crate::error::{MeshError, Result};
use crate::{Normal, TriangleMesh, Vertex};

/// Selects which mesh component is the slicing depth.
pub trait SliceAxis: Copy + Send + Sync + 'static {
    /// Depth component of a vertex.
    fn depth(v: &Vertex) -> f32;
    /// In-plane components of a vertex.
    fn plane(v: &Vertex) -> (f32, f32);
    /// Depth component of a normal.
    fn normal_depth(n: &Normal) -> f32;
    /// Rebuild a vertex from plane components and a depth.
    fn make_vertex(u: f32, v: f32, d: f32) -> Vertex;
}

/// Slice along the X axis; plane coordinates are (y, z).
#[derive(Debug, Clone, Copy)]
pub struct AxisX;

/// Slice along the Y axis; plane coordinates are (z, x).
#[derive(Debug, Clone, Copy)]
pub struct AxisY;

/// Slice along the Z axis; plane coordinates are (x, y).
#[derive(Debug, Clone, Copy)]
pub struct AxisZ;

impl SliceAxis for AxisX {
    fn depth(v: &Vertex) -> f32 {
        v.x
    }
    fn plane(v: &Vertex) -> (f32, f32) {
        (v.y, v.z)
    }
    fn normal_depth(n: &Normal) -> f32 {
        n.x
    }
    fn make_vertex(u: f32, v: f32, d: f32) -> Vertex {
        Vertex::new(d, u, v)
    }
}

impl SliceAxis for AxisY {
    fn depth(v: &Vertex) -> f32 {
        v.y
    }
    fn plane(v: &Vertex) -> (f32, f32) {
        (v.z, v.x)
    }
    fn normal_depth(n: &Normal) -> f32 {
        n.y
    }
    fn make_vertex(u: f32, v: f32, d: f32) -> Vertex {
        Vertex::new(v, d, u)
    }
}

impl SliceAxis for AxisZ {
    fn depth(v: &Vertex) -> f32 {
        v.z
    }
    fn plane(v: &Vertex) -> (f32, f32) {
        (v.x, v.y)
    }
    fn normal_depth(n: &Normal) -> f32 {
        n.z
    }
    fn make_vertex(u: f32, v: f32, d: f32) -> Vertex {
        Vertex::new(u, v, d)
    }
}

/// How an intersection line relates to the facet it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FacetEdgeType {
    /// A line crossing the facet interior.
    General,
    /// A facet edge lying on the plane, solid below.
    Top,
    /// A facet edge lying on the plane, solid above.
    Bottom,
    /// An edge of a fully horizontal facet.
    Horizontal,
}

/// One intersection segment, keyed by the mesh edge and vertex ids of its
/// endpoints so that loop assembly can follow the mesh topology.
#[derive(Debug, Clone)]
pub(crate) struct IntersectionLine {
    pub a: Point,
    pub b: Point,
    pub a_id: Option<usize>,
    pub b_id: Option<usize>,
    pub edge_a_id: Option<usize>,
    pub edge_b_id: Option<usize>,
    pub edge_type: FacetEdgeType,
    pub skip: bool,
}

#[derive(Clone, Copy)]
struct ScaledVertex {
    u: f32,
    v: f32,
    d: f32,
}

struct IntersectionPoint {
    u: f32,
    v: f32,
    point_id: Option<usize>,
    edge_id: Option<usize>,
}

/// Axis-parameterized planar slicer over a repaired mesh.
pub struct MeshSlicer<'m, A: SliceAxis> {
    mesh: &'m TriangleMesh,
    /// Stable edge ids, three per facet.
    facet_edges: Vec<[usize; 3]>,
    edge_count: usize,
    /// Shared vertices in scaled units.
    scaled: Vec<ScaledVertex>,
    _axis: PhantomData<A>,
}

impl<'m, A: SliceAxis> MeshSlicer<'m, A> {
    /// Build the edge index for a repaired mesh.
    pub fn new(mesh: &'m TriangleMesh) -> Result<Self> {
        if mesh.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        if !mesh.is_repaired() {
            return Err(MeshError::ReadError(
                "mesh must be repaired before slicing".into(),
            ));
        }

        // Two facets share an edge iff they walk a shared-vertex pair in
        // opposite directions; a same-direction second chance tolerates
        // non-oriented manifolds.
        let mut edges: std::collections::HashMap<(usize, usize), usize> =
            std::collections::HashMap::new();
        let mut facet_edges = Vec::with_capacity(mesh.facets.len());
        for indices in &mesh.vertex_indices {
            let mut ids = [0usize; 3];
            for (i, id) in ids.iter_mut().enumerate() {
                let a = indices[i];
                let b = indices[(i + 1) % 3];
                *id = match edges.get(&(b, a)).or_else(|| edges.get(&(a, b))) {
                    Some(&edge_idx) => edge_idx,
                    None => {
                        let edge_idx = edges.len();
                        edges.insert((a, b), edge_idx);
                        edge_idx
                    }
                };
            }
            facet_edges.push(ids);
        }

        let scaled = mesh
            .shared_vertices
            .iter()
            .map(|v| {
                let (u, vv) = A::plane(v);
                ScaledVertex {
                    u: u / strata_geometry::SCALING_FACTOR as f32,
                    v: vv / strata_geometry::SCALING_FACTOR as f32,
                    d: A::depth(v) / strata_geometry::SCALING_FACTOR as f32,
                }
            })
            .collect();

        Ok(Self {
            edge_count: edges.len(),
            mesh,
            facet_edges,
            scaled,
            _axis: PhantomData,
        })
    }

    /// The mesh being sliced.
    pub(crate) fn mesh(&self) -> &'m TriangleMesh {
        self.mesh
    }

    /// Min and max scaled depth of a facet's shared vertices.
    pub(crate) fn scaled_span(&self, facet_idx: usize) -> (f32, f32) {
        let indices = &self.mesh.vertex_indices[facet_idx];
        let min = indices
            .iter()
            .map(|&i| self.scaled[i].d)
            .fold(f32::INFINITY, f32::min);
        let max = indices
            .iter()
            .map(|&i| self.scaled[i].d)
            .fold(f32::NEG_INFINITY, f32::max);
        (min, max)
    }

    /// Slice at each depth in `z` (millimeters, sorted ascending); returns
    /// one set of expolygons per plane.
    pub fn slice(&self, z: &[f32]) -> Vec<ExPolygons> {
        let loops = self.slice_to_polygons(z);
        loops
            .into_par_iter()
            .map(|polygons| make_expolygons(polygons))
            .collect()
    }

    /// Slice at each depth in `z`, returning the raw closed loops.
    pub fn slice_to_polygons(&self, z: &[f32]) -> Vec<Polygons> {
        // enumerate intersection lines facet-parallel, then merge in facet
        // order so downstream loop assembly is deterministic
        let per_facet: Vec<Vec<(usize, IntersectionLine)>> = (0..self.mesh.facets.len())
            .into_par_iter()
            .map(|facet_idx| self.slice_facet_planes(facet_idx, z))
            .collect();

        let mut lines: Vec<Vec<IntersectionLine>> = vec![Vec::new(); z.len()];
        for facet_lines in per_facet {
            for (layer_idx, line) in facet_lines {
                lines[layer_idx].push(line);
            }
        }

        lines
            .into_par_iter()
            .enumerate()
            .map(|(layer_idx, layer_lines)| self.make_loops(layer_lines, layer_idx))
            .collect()
    }

    /// Slice at a single depth.
    pub fn slice_at(&self, z: f32) -> ExPolygons {
        self.slice(&[z]).pop().unwrap_or_default()
    }

    /// Enumerate the planes a facet spans and intersect it with each.
    fn slice_facet_planes(&self, facet_idx: usize, z: &[f32]) -> Vec<(usize, IntersectionLine)> {
        let indices = &self.mesh.vertex_indices[facet_idx];
        let min_d = indices
            .iter()
            .map(|&i| self.scaled[i].d)
            .fold(f32::INFINITY, f32::min);
        let max_d = indices
            .iter()
            .map(|&i| self.scaled[i].d)
            .fold(f32::NEG_INFINITY, f32::max);
        let scale_f = strata_geometry::SCALING_FACTOR as f32;

        // binary search for the layer range the facet crosses; the bounds are
        // taken from the unscaled vertices so they compare exactly with the
        // requested plane depths
        let facet = &self.mesh.facets[facet_idx];
        let min_mm = facet
            .vertices
            .iter()
            .map(A::depth)
            .fold(f32::INFINITY, f32::min);
        let max_mm = facet
            .vertices
            .iter()
            .map(A::depth)
            .fold(f32::NEG_INFINITY, f32::max);
        let lo = z.partition_point(|&v| v < min_mm);
        let hi = z.partition_point(|&v| v <= max_mm);

        let mut out = Vec::new();
        for layer_idx in lo..hi {
            let slice_d = z[layer_idx] / scale_f;
            for line in self.slice_facet(slice_d, facet_idx, min_d, max_d) {
                out.push((layer_idx, line));
            }
        }
        out
    }

    /// Intersect one facet with one plane at scaled depth `slice_d`.
    pub(crate) fn slice_facet(
        &self,
        slice_d: f32,
        facet_idx: usize,
        min_d: f32,
        max_d: f32,
    ) -> Vec<IntersectionLine> {
        let indices = &self.mesh.vertex_indices[facet_idx];
        let edges = &self.facet_edges[facet_idx];
        let mut lines = Vec::new();
        let mut points: Vec<IntersectionPoint> = Vec::new();
        let mut points_on_layer: Vec<usize> = Vec::new();
        let mut found_horizontal_edge = false;

        // start from the lowest vertex so all intersection lines share a
        // consistent orientation (solid on the right of the line)
        let start = if self.scaled[indices[1]].d == min_d {
            1
        } else if self.scaled[indices[2]].d == min_d {
            2
        } else {
            0
        };

        for j in start..start + 3 {
            let edge_id = edges[j % 3];
            let mut a_id = indices[j % 3];
            let mut b_id = indices[(j + 1) % 3];
            let mut a = self.scaled[a_id];
            let mut b = self.scaled[b_id];

            if a.d == b.d && a.d == slice_d {
                // the edge is horizontal and lies on the plane
                let edge_type = if min_d == max_d {
                    // fully horizontal facet; direction encodes top or bottom
                    if A::normal_depth(&self.mesh.facets[facet_idx].normal) < 0.0 {
                        std::mem::swap(&mut a, &mut b);
                        std::mem::swap(&mut a_id, &mut b_id);
                    }
                    FacetEdgeType::Horizontal
                } else if indices.iter().any(|&i| self.scaled[i].d < slice_d) {
                    std::mem::swap(&mut a, &mut b);
                    std::mem::swap(&mut a_id, &mut b_id);
                    FacetEdgeType::Top
                } else {
                    FacetEdgeType::Bottom
                };
                lines.push(IntersectionLine {
                    a: Point::new(a.u.round() as i64, a.v.round() as i64),
                    b: Point::new(b.u.round() as i64, b.v.round() as i64),
                    a_id: Some(a_id),
                    b_id: Some(b_id),
                    edge_a_id: None,
                    edge_b_id: None,
                    edge_type,
                    skip: false,
                });
                found_horizontal_edge = true;
                if edge_type != FacetEdgeType::Horizontal {
                    return lines;
                }
            } else if a.d == slice_d {
                points_on_layer.push(points.len());
                points.push(IntersectionPoint {
                    u: a.u,
                    v: a.v,
                    point_id: Some(a_id),
                    edge_id: None,
                });
            } else if b.d == slice_d {
                points_on_layer.push(points.len());
                points.push(IntersectionPoint {
                    u: b.u,
                    v: b.v,
                    point_id: Some(b_id),
                    edge_id: None,
                });
            } else if (a.d < slice_d && b.d > slice_d) || (b.d < slice_d && a.d > slice_d) {
                // the edge crosses the plane
                let t = (slice_d - b.d) / (a.d - b.d);
                points.push(IntersectionPoint {
                    u: b.u + (a.u - b.u) * t,
                    v: b.v + (a.v - b.v) * t,
                    point_id: None,
                    edge_id: Some(edge_id),
                });
            }
        }

        if found_horizontal_edge {
            return lines;
        }

        if !points_on_layer.is_empty() {
            // an on-plane vertex is seen once per adjacent edge; drop the
            // duplicate. A lone on-plane vertex (V-shaped touch) produces no
            // line at all.
            if points.len() < 3 {
                return lines;
            }
            if points_on_layer.len() >= 2 {
                points.remove(points_on_layer[1]);
            }
        }

        if points.len() == 2 {
            lines.push(IntersectionLine {
                a: Point::new(points[1].u.round() as i64, points[1].v.round() as i64),
                b: Point::new(points[0].u.round() as i64, points[0].v.round() as i64),
                a_id: points[1].point_id,
                b_id: points[0].point_id,
                edge_a_id: points[1].edge_id,
                edge_b_id: points[0].edge_id,
                edge_type: FacetEdgeType::General,
                skip: false,
            });
        } else if !points.is_empty() {
            log::debug!(
                target: "mesh::slice",
                "facet {} produced {} intersection points, expected 2",
                facet_idx,
                points.len()
            );
        }
        lines
    }

    /// Assemble intersection lines into closed loops.
    pub(crate) fn make_loops(
        &self,
        mut lines: Vec<IntersectionLine>,
        layer_idx: usize,
    ) -> Polygons {
        // remove tangent duplicate edges: two facet edges with identical
        // endpoints in the same direction cancel to one, coincident
        // horizontal edges cancel pairwise
        for i in 0..lines.len() {
            if lines[i].skip || lines[i].edge_type == FacetEdgeType::General {
                continue;
            }
            for j in i + 1..lines.len() {
                if lines[j].skip || lines[j].edge_type == FacetEdgeType::General {
                    continue;
                }
                if lines[i].a_id == lines[j].a_id && lines[i].b_id == lines[j].b_id {
                    lines[j].skip = true;
                    if lines[i].edge_type == lines[j].edge_type {
                        lines[i].skip = true;
                        break;
                    }
                } else if lines[i].a_id == lines[j].b_id && lines[i].b_id == lines[j].a_id {
                    if lines[i].edge_type == FacetEdgeType::Horizontal
                        && lines[j].edge_type == FacetEdgeType::Horizontal
                    {
                        lines[i].skip = true;
                        lines[j].skip = true;
                        break;
                    }
                }
            }
        }

        // key spare lines by their outgoing edge id and vertex id
        let mut by_edge_a: Vec<Vec<usize>> = vec![Vec::new(); self.edge_count];
        let mut by_a: Vec<Vec<usize>> = vec![Vec::new(); self.scaled.len()];
        for (idx, line) in lines.iter().enumerate() {
            if line.skip {
                continue;
            }
            if let Some(edge_a) = line.edge_a_id {
                by_edge_a[edge_a].push(idx);
            }
            if let Some(a) = line.a_id {
                by_a[a].push(idx);
            }
        }

        let mut loops = Polygons::new();
        loop {
            // take the first spare line and start a new loop
            let Some(first) = lines.iter().position(|l| !l.skip) else {
                break;
            };
            lines[first].skip = true;
            let mut walk = vec![first];

            loop {
                // find a line starting where the last one finishes
                let last = *walk.last().expect("walk is non-empty");
                let next = lines[last]
                    .edge_b_id
                    .and_then(|edge_b| by_edge_a[edge_b].iter().find(|&&c| !lines[c].skip))
                    .or_else(|| {
                        lines[last]
                            .b_id
                            .and_then(|b| by_a[b].iter().find(|&&c| !lines[c].skip))
                    })
                    .copied();

                match next {
                    Some(next) => {
                        lines[next].skip = true;
                        walk.push(next);
                    }
                    None => {
                        let first_line = &lines[walk[0]];
                        let last_line = &lines[last];
                        let closed = (first_line.edge_a_id.is_some()
                            && first_line.edge_a_id == last_line.edge_b_id)
                            || (first_line.a_id.is_some() && first_line.a_id == last_line.b_id);
                        if closed {
                            loops.push(Polygon::new(
                                walk.iter().map(|&idx| lines[idx].a).collect(),
                            ));
                        } else {
                            log::warn!(
                                target: "mesh::slice",
                                "layer {}: unable to close a loop of {} segments",
                                layer_idx,
                                walk.len()
                            );
                        }
                        break;
                    }
                }
            }
        }
        loops
    }
}

/// Assemble loose loops into expolygons.
///
/// Loops are applied largest-area first: a counter-clockwise loop opens a new
/// contour, a clockwise one is subtracted from the running union. A safety
/// offset then merges numerical near-touches without reversing winding.
pub fn make_expolygons(loops: Polygons) -> ExPolygons {
    let mut order: Vec<usize> = (0..loops.len()).collect();
    let areas: Vec<f64> = loops.iter().map(|l| l.signed_area()).collect();
    order.sort_by(|&a, &b| {
        areas[b]
            .abs()
            .partial_cmp(&areas[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut slices = Polygons::new();
    for idx in order {
        if areas[idx] > f64::EPSILON {
            slices.push(loops[idx].clone());
        } else if areas[idx] < -f64::EPSILON {
            // the clip must be a plain area, not a hole ring
            let mut clip = loops[idx].clone();
            clip.make_counter_clockwise();
            slices = diff(&slices, &[clip]);
        }
    }

    let safety = scale(0.0499) as f64;
    offset2_ex(&slices, safety, -safety)
}

/// Convenience entry point: repair if needed, then slice along Z.
pub fn slice_mesh(mesh: &mut TriangleMesh, z: &[f32]) -> Result<Vec<ExPolygons>> {
    mesh.repair();
    let slicer = MeshSlicer::<AxisZ>::new(mesh)?;
    Ok(slicer.slice(z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sliced_cube(z: &[f32]) -> Vec<ExPolygons> {
        let mut cube = TriangleMesh::make_cube(20.0, 20.0, 20.0);
        slice_mesh(&mut cube, z).unwrap()
    }

    #[test]
    fn test_slice_cube_cross_sections() {
        let layers = sliced_cube(&[0.5, 5.0, 10.0, 19.5]);
        assert_eq!(layers.len(), 4);
        for layer in &layers {
            assert_eq!(layer.len(), 1);
            assert!(layer[0].holes.is_empty());
            let area_mm2 = layer[0].area() * strata_geometry::SCALING_FACTOR
                * strata_geometry::SCALING_FACTOR;
            assert_relative_eq!(area_mm2, 400.0, epsilon = 1.0);
        }
    }

    #[test]
    fn test_slice_outside_mesh_is_empty() {
        let layers = sliced_cube(&[25.0]);
        assert_eq!(layers.len(), 1);
        assert!(layers[0].is_empty());
    }

    #[test]
    fn test_slice_axis_x() {
        let mut cube = TriangleMesh::make_cube(20.0, 10.0, 5.0);
        cube.repair();
        let slicer = MeshSlicer::<AxisX>::new(&cube).unwrap();
        let layers = slicer.slice(&[10.0]);
        assert_eq!(layers[0].len(), 1);
        let area_mm2 = layers[0][0].area() * strata_geometry::SCALING_FACTOR
            * strata_geometry::SCALING_FACTOR;
        // cross-section perpendicular to X is y*z
        assert_relative_eq!(area_mm2, 50.0, epsilon = 1.0);
    }

    #[test]
    fn test_slice_hollow_cube_has_hole() {
        // a cube with a smaller inverted cube inside forms a cavity
        let mut outer = TriangleMesh::make_cube(20.0, 20.0, 20.0);
        let mut inner = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        inner.translate(5.0, 5.0, 5.0);
        inner.reverse_normals();
        outer.merge(&inner);
        let layers = slice_mesh(&mut outer, &[10.0]).unwrap();
        assert_eq!(layers[0].len(), 1);
        assert_eq!(layers[0][0].holes.len(), 1);
        let area_mm2 = layers[0][0].area() * strata_geometry::SCALING_FACTOR
            * strata_geometry::SCALING_FACTOR;
        assert_relative_eq!(area_mm2, 300.0, epsilon = 1.0);
    }

    #[test]
    fn test_empty_mesh_slicing_fails() {
        let mut mesh = TriangleMesh::default();
        assert!(matches!(
            slice_mesh(&mut mesh, &[1.0]),
            Err(MeshError::EmptyMesh)
        ));
    }
}
