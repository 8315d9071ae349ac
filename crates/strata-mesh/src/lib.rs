#![warn(missing_docs)]

//! Triangle mesh storage, repair and planar slicing for the strata slicer.
//!
//! The mesh keeps an STL-like structure: an array of facets (three `f32`
//! vertices plus a normal), a neighbor table, and a shared-vertex table
//! rebuilt by [`TriangleMesh::repair`]. Slicing intersects the repaired mesh
//! with a sorted list of planes and assembles the intersection lines into
//! [`strata_geometry::ExPolygon`]s; see the [`slice`] module.

pub mod cut;
pub mod error;
pub mod repair;
pub mod slice;
pub mod stl;

pub use cut::cut;
pub use error::{MeshError, Result};
pub use slice::{make_expolygons, slice_mesh, AxisX, AxisY, AxisZ, MeshSlicer, SliceAxis};
pub use stl::read_stl;

use serde::{Deserialize, Serialize};
use strata_geometry::BoundingBoxf3;

/// A mesh vertex in millimeters.
pub type Vertex = nalgebra::Point3<f32>;

/// A facet normal.
pub type Normal = nalgebra::Vector3<f32>;

/// One triangle of the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facet {
    /// Outward normal; rebuilt from the vertex winding on repair.
    pub normal: Normal,
    /// Corner vertices, counter-clockwise seen from outside.
    pub vertices: [Vertex; 3],
}

impl Facet {
    /// Create a facet, computing the normal from the vertex winding.
    pub fn new(vertices: [Vertex; 3]) -> Self {
        let mut facet = Self {
            normal: Normal::zeros(),
            vertices,
        };
        facet.normal = facet.computed_normal();
        facet
    }

    /// Normal computed from the vertex winding (right-hand rule), not
    /// normalized when the facet is degenerate.
    pub fn computed_normal(&self) -> Normal {
        let e1 = self.vertices[1] - self.vertices[0];
        let e2 = self.vertices[2] - self.vertices[0];
        let n = e1.cross(&e2);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            Normal::zeros()
        }
    }

    /// Lowest vertex coordinate along `axis` (0 = x, 1 = y, 2 = z).
    pub fn min_along(&self, axis: usize) -> f32 {
        self.vertices
            .iter()
            .map(|v| v[axis])
            .fold(f32::INFINITY, f32::min)
    }

    /// Highest vertex coordinate along `axis`.
    pub fn max_along(&self, axis: usize) -> f32 {
        self.vertices
            .iter()
            .map(|v| v[axis])
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Swap the winding, reversing the facet orientation.
    pub fn reverse(&mut self) {
        self.vertices.swap(1, 2);
        self.normal = self.computed_normal();
    }
}

/// Diagnostics produced by [`TriangleMesh::repair`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStats {
    /// Degenerate facets removed.
    pub degenerate_facets: usize,
    /// Open edges closed by tolerance stitching.
    pub edges_fixed: usize,
    /// Facets flipped to restore a consistent orientation.
    pub facets_reversed: usize,
    /// Normals recomputed because they disagreed with the winding.
    pub normals_fixed: usize,
    /// Edges that remain open after repair.
    pub open_edges: usize,
}

/// An STL-like triangle mesh.
///
/// Slicing requires a repaired mesh; repair rebuilds the shared-vertex and
/// neighbor tables that the slicer's edge index is derived from.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Triangles of the mesh.
    pub(crate) facets: Vec<Facet>,
    /// Shared-vertex ids per facet; valid after repair.
    pub(crate) vertex_indices: Vec<[usize; 3]>,
    /// Shared-vertex coordinates; valid after repair.
    pub(crate) shared_vertices: Vec<Vertex>,
    /// Per-facet neighbor across each edge; `None` on open edges.
    pub(crate) neighbors: Vec<[Option<usize>; 3]>,
    pub(crate) repaired: bool,
    pub(crate) stats: RepairStats,
}

impl TriangleMesh {
    /// Create a mesh from raw facets.
    pub fn from_facets(facets: Vec<Facet>) -> Self {
        Self {
            facets,
            ..Self::default()
        }
    }

    /// Number of facets.
    pub fn facets_count(&self) -> usize {
        self.facets.len()
    }

    /// True when the mesh has no facets.
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// The facets of the mesh.
    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// True once [`repair`](Self::repair) has run.
    pub fn is_repaired(&self) -> bool {
        self.repaired
    }

    /// Repair diagnostics; meaningful after repair.
    pub fn stats(&self) -> &RepairStats {
        &self.stats
    }

    /// Shared-vertex count; zero before repair.
    pub fn shared_vertex_count(&self) -> usize {
        self.shared_vertices.len()
    }

    /// Axis-aligned bounding box in millimeters.
    pub fn bounding_box(&self) -> BoundingBoxf3 {
        let mut bbox = BoundingBoxf3::default();
        for facet in &self.facets {
            for v in &facet.vertices {
                bbox.merge_point(strata_geometry::Pointf3::new(
                    v.x as f64,
                    v.y as f64,
                    v.z as f64,
                ));
            }
        }
        bbox
    }

    /// Mesh size along each axis.
    pub fn size(&self) -> strata_geometry::Pointf3 {
        self.bounding_box().size()
    }

    /// Signed volume in mm³; positive for an outward-oriented mesh.
    pub fn volume(&self) -> f64 {
        // sum of signed tetrahedra spanned with the origin
        let mut volume = 0.0f64;
        for facet in &self.facets {
            let [a, b, c] = facet.vertices;
            let a = nalgebra::Vector3::new(a.x as f64, a.y as f64, a.z as f64);
            let b = nalgebra::Vector3::new(b.x as f64, b.y as f64, b.z as f64);
            let c = nalgebra::Vector3::new(c.x as f64, c.y as f64, c.z as f64);
            volume += a.dot(&b.cross(&c)) / 6.0;
        }
        volume
    }

    /// Translate all vertices.
    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        let v = Normal::new(x, y, z);
        for facet in &mut self.facets {
            for vertex in &mut facet.vertices {
                *vertex += v;
            }
        }
        for vertex in &mut self.shared_vertices {
            *vertex += v;
        }
    }

    /// Uniform scale around the origin.
    pub fn scale(&mut self, factor: f32) {
        self.scale_xyz(factor, factor, factor);
    }

    /// Non-uniform scale around the origin.
    pub fn scale_xyz(&mut self, sx: f32, sy: f32, sz: f32) {
        for facet in &mut self.facets {
            for vertex in &mut facet.vertices {
                vertex.x *= sx;
                vertex.y *= sy;
                vertex.z *= sz;
            }
            facet.normal = facet.computed_normal();
        }
        for vertex in &mut self.shared_vertices {
            vertex.x *= sx;
            vertex.y *= sy;
            vertex.z *= sz;
        }
    }

    /// Rotate around the vertical axis by `angle` radians.
    pub fn rotate_z(&mut self, angle: f64) {
        let (s, c) = (angle.sin() as f32, angle.cos() as f32);
        let rot = |v: &mut Vertex| {
            let (x, y) = (v.x, v.y);
            v.x = c * x - s * y;
            v.y = s * x + c * y;
        };
        for facet in &mut self.facets {
            for vertex in &mut facet.vertices {
                rot(vertex);
            }
            facet.normal = facet.computed_normal();
        }
        for vertex in &mut self.shared_vertices {
            rot(vertex);
        }
    }

    /// Move the minimum corner to the origin.
    pub fn align_to_origin(&mut self) {
        let bbox = self.bounding_box();
        if bbox.defined {
            self.translate(-bbox.min.x as f32, -bbox.min.y as f32, -bbox.min.z as f32);
        }
    }

    /// Append another mesh's facets; invalidates the repair state.
    pub fn merge(&mut self, other: &TriangleMesh) {
        self.facets.extend_from_slice(&other.facets);
        self.invalidate_topology();
    }

    /// Reverse the orientation of every facet.
    pub fn reverse_normals(&mut self) {
        for facet in &mut self.facets {
            facet.reverse();
        }
        for indices in &mut self.vertex_indices {
            indices.swap(1, 2);
        }
    }

    pub(crate) fn invalidate_topology(&mut self) {
        self.repaired = false;
        self.vertex_indices.clear();
        self.shared_vertices.clear();
        self.neighbors.clear();
    }

    /// Axis-aligned cuboid spanning `[0, x] × [0, y] × [0, z]`.
    pub fn make_cube(x: f64, y: f64, z: f64) -> Self {
        let (x, y, z) = (x as f32, y as f32, z as f32);
        let v = [
            Vertex::new(x, y, 0.0),
            Vertex::new(x, 0.0, 0.0),
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(0.0, y, 0.0),
            Vertex::new(x, y, z),
            Vertex::new(0.0, y, z),
            Vertex::new(0.0, 0.0, z),
            Vertex::new(x, 0.0, z),
        ];
        let faces = [
            [0, 1, 2],
            [0, 2, 3],
            [4, 5, 6],
            [4, 6, 7],
            [0, 4, 7],
            [0, 7, 1],
            [1, 7, 6],
            [1, 6, 2],
            [2, 6, 5],
            [2, 5, 3],
            [3, 5, 4],
            [3, 4, 0],
        ];
        Self::from_facets(
            faces
                .iter()
                .map(|f| Facet::new([v[f[0]], v[f[1]], v[f[2]]]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_volume() {
        let cube = TriangleMesh::make_cube(20.0, 20.0, 20.0);
        assert_eq!(cube.facets_count(), 12);
        assert_relative_eq!(cube.volume(), 8000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_translate_and_bounds() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        cube.translate(5.0, -5.0, 1.0);
        let bbox = cube.bounding_box();
        assert_relative_eq!(bbox.min.x, 5.0, epsilon = 1e-6);
        assert_relative_eq!(bbox.min.y, -5.0, epsilon = 1e-6);
        assert_relative_eq!(bbox.max.z, 11.0, epsilon = 1e-6);
        cube.align_to_origin();
        assert_relative_eq!(cube.bounding_box().min.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_merge() {
        let mut mesh = TriangleMesh::make_cube(5.0, 5.0, 5.0);
        let mut other = TriangleMesh::make_cube(5.0, 5.0, 5.0);
        other.translate(10.0, 0.0, 0.0);
        mesh.merge(&other);
        assert_eq!(mesh.facets_count(), 24);
        assert_relative_eq!(mesh.bounding_box().max.x, 15.0, epsilon = 1e-6);
    }
}
