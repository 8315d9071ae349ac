//! Mesh repair: degenerate-facet removal, edge stitching, orientation fixing
//! and shared-vertex table construction.

use std::collections::HashMap;

use crate::{RepairStats, TriangleMesh, Vertex};

/// Stitching tolerance in millimeters; vertices closer than this are welded
/// when exact matching leaves open edges.
const STITCH_TOLERANCE: f32 = 1e-3;

impl TriangleMesh {
    /// Repair the mesh in place.
    ///
    /// Removes degenerate facets, builds the shared-vertex table (stitching
    /// within tolerance when exact matching leaves open edges), makes facet
    /// orientation consistent, recomputes normals from the winding, and
    /// reverses the whole mesh when its signed volume is negative. Repair is
    /// idempotent; running it on an already repaired mesh is a no-op.
    pub fn repair(&mut self) -> &RepairStats {
        if self.repaired {
            return &self.stats;
        }
        let mut stats = RepairStats::default();

        // drop facets with coincident vertices or vanishing area
        let before = self.facets.len();
        self.facets.retain(|f| {
            f.vertices[0] != f.vertices[1]
                && f.vertices[1] != f.vertices[2]
                && f.vertices[2] != f.vertices[0]
                && f.computed_normal().norm() > 0.0
        });
        stats.degenerate_facets = before - self.facets.len();

        if self.facets.is_empty() {
            self.vertex_indices.clear();
            self.shared_vertices.clear();
            self.neighbors.clear();
            self.stats = stats;
            self.repaired = true;
            return &self.stats;
        }

        // exact shared-vertex pass
        self.build_shared_vertices(None);
        let open_before = self.count_open_edges();
        if open_before > 0 {
            // stitch within tolerance
            self.build_shared_vertices(Some(STITCH_TOLERANCE));
            let open_after = self.count_open_edges();
            stats.edges_fixed = open_before.saturating_sub(open_after);
            stats.open_edges = open_after;
            if open_after > 0 {
                log::warn!(
                    target: "mesh::repair",
                    "{} open edges remain after stitching",
                    open_after
                );
            }
        }

        stats.facets_reversed = self.fix_orientation();

        // recompute normal values from the (now consistent) winding
        for facet in &mut self.facets {
            let computed = facet.computed_normal();
            if (computed - facet.normal).norm() > 1e-4 {
                stats.normals_fixed += 1;
            }
            facet.normal = computed;
        }

        // an inside-out mesh has negative volume
        if self.volume() < 0.0 {
            self.reverse_normals();
            stats.facets_reversed += self.facets.len();
        }

        self.build_neighbors();
        self.stats = stats;
        self.repaired = true;
        &self.stats
    }

    /// True when every edge is shared by exactly two facets.
    pub fn is_manifold(&self) -> bool {
        if !self.repaired || self.facets.is_empty() {
            return false;
        }
        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for indices in &self.vertex_indices {
            for i in 0..3 {
                let a = indices[i];
                let b = indices[(i + 1) % 3];
                let key = (a.min(b), a.max(b));
                *edge_count.entry(key).or_insert(0) += 1;
            }
        }
        edge_count.values().all(|&c| c == 2)
    }

    fn build_shared_vertices(&mut self, tolerance: Option<f32>) {
        let mut map: HashMap<(i64, i64, i64), usize> = HashMap::new();
        let mut shared: Vec<Vertex> = Vec::new();
        let mut indices = Vec::with_capacity(self.facets.len());
        let key = |v: &Vertex| -> (i64, i64, i64) {
            match tolerance {
                Some(tol) => (
                    (v.x / tol).round() as i64,
                    (v.y / tol).round() as i64,
                    (v.z / tol).round() as i64,
                ),
                None => (
                    v.x.to_bits() as i64,
                    v.y.to_bits() as i64,
                    v.z.to_bits() as i64,
                ),
            }
        };
        for facet in &self.facets {
            let mut ids = [0usize; 3];
            for (slot, v) in facet.vertices.iter().enumerate() {
                let id = *map.entry(key(v)).or_insert_with(|| {
                    shared.push(*v);
                    shared.len() - 1
                });
                ids[slot] = id;
            }
            indices.push(ids);
        }
        self.shared_vertices = shared;
        self.vertex_indices = indices;
    }

    fn edge_facets(&self) -> HashMap<(usize, usize), Vec<usize>> {
        let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (facet_idx, indices) in self.vertex_indices.iter().enumerate() {
            for i in 0..3 {
                let a = indices[i];
                let b = indices[(i + 1) % 3];
                edges
                    .entry((a.min(b), a.max(b)))
                    .or_default()
                    .push(facet_idx);
            }
        }
        edges
    }

    fn count_open_edges(&self) -> usize {
        self.edge_facets().values().filter(|f| f.len() < 2).count()
    }

    /// Flood-fill orientation consistency over edge adjacency. Two facets
    /// sharing an edge are consistent when they traverse it in opposite
    /// directions. Returns the number of facets flipped.
    fn fix_orientation(&mut self) -> usize {
        let edges = self.edge_facets();
        let n = self.facets.len();
        let mut visited = vec![false; n];
        let mut flipped = 0;
        let mut stack = Vec::new();

        let edge_dir = |indices: &[usize; 3], a: usize, b: usize| -> bool {
            // true when the facet traverses a->b in this order
            (0..3).any(|i| indices[i] == a && indices[(i + 1) % 3] == b)
        };

        for seed in 0..n {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            stack.push(seed);
            while let Some(facet_idx) = stack.pop() {
                let indices = self.vertex_indices[facet_idx];
                for i in 0..3 {
                    let a = indices[i];
                    let b = indices[(i + 1) % 3];
                    let key = (a.min(b), a.max(b));
                    let Some(adjacent) = edges.get(&key) else {
                        continue;
                    };
                    for &other in adjacent {
                        if other == facet_idx || visited[other] {
                            continue;
                        }
                        let other_indices = self.vertex_indices[other];
                        if edge_dir(&other_indices, a, b) {
                            // same direction on a shared edge: inconsistent
                            self.facets[other].reverse();
                            self.vertex_indices[other].swap(1, 2);
                            flipped += 1;
                        }
                        visited[other] = true;
                        stack.push(other);
                    }
                }
            }
        }
        flipped
    }

    fn build_neighbors(&mut self) {
        let edges = self.edge_facets();
        self.neighbors = self
            .vertex_indices
            .iter()
            .enumerate()
            .map(|(facet_idx, indices)| {
                let mut row = [None; 3];
                for (i, slot) in row.iter_mut().enumerate() {
                    let a = indices[i];
                    let b = indices[(i + 1) % 3];
                    *slot = edges
                        .get(&(a.min(b), a.max(b)))
                        .and_then(|facets| facets.iter().find(|&&f| f != facet_idx))
                        .copied();
                }
                row
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Facet;
    use approx::assert_relative_eq;

    #[test]
    fn test_repair_cube() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        let stats = *cube.repair();
        assert_eq!(stats.degenerate_facets, 0);
        assert_eq!(stats.facets_reversed, 0);
        assert_eq!(stats.open_edges, 0);
        assert_eq!(cube.shared_vertex_count(), 8);
        assert!(cube.is_manifold());
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        cube.repair();
        let first = (*cube.stats(), cube.shared_vertex_count(), cube.facets().to_vec());
        cube.repair();
        assert_eq!(*cube.stats(), first.0);
        assert_eq!(cube.shared_vertex_count(), first.1);
        assert_eq!(cube.facets(), first.2.as_slice());
    }

    #[test]
    fn test_repair_fixes_inverted_mesh() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        cube.reverse_normals();
        assert!(cube.volume() < 0.0);
        cube.repair();
        assert!(cube.volume() > 0.0);
        assert_relative_eq!(cube.volume(), 1000.0, epsilon = 1e-3);
        assert!(cube.stats().facets_reversed > 0);
    }

    #[test]
    fn test_repair_drops_degenerate_facet() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        let v = Vertex::new(1.0, 1.0, 1.0);
        cube.facets.push(Facet::new([v, v, Vertex::new(2.0, 2.0, 2.0)]));
        cube.repair();
        assert_eq!(cube.stats().degenerate_facets, 1);
        assert_eq!(cube.facets_count(), 12);
    }

    #[test]
    fn test_repair_stitches_tolerant_gap() {
        let mut cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        // nudge one corner of a single facet by less than the tolerance
        cube.facets[0].vertices[0].x += 2e-4;
        cube.repair();
        assert!(cube.stats().edges_fixed > 0);
        assert_eq!(cube.stats().open_edges, 0);
    }

    #[test]
    fn test_empty_mesh_repair_is_noop() {
        let mut mesh = TriangleMesh::default();
        mesh.repair();
        assert!(mesh.is_repaired());
        assert_eq!(*mesh.stats(), RepairStats::default());
    }
}
