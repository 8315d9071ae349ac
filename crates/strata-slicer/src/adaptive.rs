//! Adaptive layer-height selection from facet slopes.
//!
//! The permissible layer height above a sloped facet follows from the
//! stair-stepping error of stacked elliptic extrusion threads; the
//! empirically fitted constant relates surface waviness to layer height.

use strata_mesh::TriangleMesh;

/// Empirical surface-quality constant.
pub const SURFACE_CONST: f64 = 0.18403;

/// A facet's Z span and normal, pre-sorted for the forward scan.
#[derive(Debug, Clone, Copy)]
struct FaceSpan {
    min_z: f32,
    max_z: f32,
    normal_z: f32,
}

/// Stateful adaptive layer-height generator.
#[derive(Debug, Default)]
pub struct SlicingAdaptive {
    faces: Vec<FaceSpan>,
    /// First facet that can still intersect the current layer; advanced as
    /// the Z cursor moves up.
    current_facet: usize,
    object_size: f64,
}

impl SlicingAdaptive {
    /// An empty generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect facets of a mesh.
    pub fn add_mesh(&mut self, mesh: &TriangleMesh) {
        for facet in mesh.facets() {
            self.faces.push(FaceSpan {
                min_z: facet.min_along(2),
                max_z: facet.max_along(2),
                normal_z: facet.computed_normal().z,
            });
        }
    }

    /// Sort facets by ascending Z span and reset the cursor.
    pub fn prepare(&mut self, object_size: f64) {
        self.object_size = object_size;
        self.faces.sort_by(|a, b| {
            (a.min_z, a.max_z)
                .partial_cmp(&(b.min_z, b.max_z))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.current_facet = 0;
    }

    /// Choose the next layer height at bottom Z `z`.
    ///
    /// `quality` is the user percentage (100 = highest quality); it is
    /// inverted and scaled into the permissible surface error between the
    /// extremes allowed by `min` and `max` layer height.
    pub fn next_layer_height(
        &mut self,
        z: f64,
        quality: f64,
        min_layer_height: f64,
        max_layer_height: f64,
    ) -> f64 {
        let mut height = max_layer_height;

        let quality_factor = (1.0 - quality / 100.0).clamp(0.0, 1.0);
        let delta_min = SURFACE_CONST * min_layer_height;
        let delta_max = SURFACE_CONST * max_layer_height + 0.5 * max_layer_height;
        let scaled_quality = quality_factor * (delta_max - delta_min) + delta_min;

        let eps = 1e-4;
        let z = z as f32;

        // facets intersecting the layer bottom
        let mut first_hit = false;
        let mut idx = self.current_facet;
        while idx < self.faces.len() {
            let face = self.faces[idx];
            if face.min_z >= z {
                break;
            }
            if face.max_z > z {
                if !first_hit {
                    first_hit = true;
                    self.current_facet = idx;
                }
                // skip touching facets which would force tiny heights
                if face.max_z > z + eps {
                    height = height.min(layer_height_from_facet(face.normal_z, scaled_quality));
                }
            }
            idx += 1;
        }
        height = height.max(min_layer_height);

        // check for sloped facets starting inside the chosen layer
        if height > min_layer_height {
            while idx < self.faces.len() {
                let face = self.faces[idx];
                if f64::from(face.min_z) >= f64::from(z) + height {
                    break;
                }
                if face.max_z > z + eps {
                    let reduced = layer_height_from_facet(face.normal_z, scaled_quality);
                    let z_diff = f64::from(face.min_z - z);
                    if reduced > z_diff {
                        if reduced < height {
                            height = reduced;
                        }
                    } else {
                        // cut the layer just below the facet start
                        height = z_diff;
                    }
                }
                idx += 1;
            }
            height = height.max(min_layer_height);
        }

        height
    }

    /// Distance to the next purely horizontal facet above `z`, up to
    /// `max_layer_height`; used to land layers exactly on flat features.
    pub fn horizontal_facet_distance(&self, z: f64, max_layer_height: f64) -> f64 {
        let zf = z as f32;
        for face in &self.faces {
            if f64::from(face.min_z) > z + max_layer_height {
                break;
            }
            if face.min_z > zf && face.min_z == face.max_z {
                return f64::from(face.min_z) - z;
            }
        }
        if z + max_layer_height > self.object_size {
            (self.object_size - z).max(0.0)
        } else {
            max_layer_height
        }
    }

    /// Signed offset from `top` to the nearest purely horizontal facet
    /// within `window`, or `None`. Positive means the facet is above.
    pub fn nearest_horizontal_offset(&self, top: f64, window: f64) -> Option<f64> {
        let mut best: Option<f64> = None;
        for face in &self.faces {
            if f64::from(face.min_z) > top + window {
                break;
            }
            if face.min_z != face.max_z {
                continue;
            }
            let offset = f64::from(face.min_z) - top;
            if offset.abs() < window
                && offset != 0.0
                && best.map_or(true, |b: f64| offset.abs() < b.abs())
            {
                best = Some(offset);
            }
        }
        best
    }
}

/// Maximum height above a facet within the allowed stair-step deviation.
fn layer_height_from_facet(normal_z: f32, scaled_quality: f64) -> f64 {
    scaled_quality / (SURFACE_CONST + f64::from(normal_z.abs()) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertical_walls_allow_max_height() {
        let mut adaptive = SlicingAdaptive::new();
        adaptive.add_mesh(&TriangleMesh::make_cube(10.0, 10.0, 10.0));
        adaptive.prepare(10.0);
        // inside the cube all side facets are vertical (normal_z = 0);
        // at the lowest quality the max height wins
        let h = adaptive.next_layer_height(5.0, 0.0, 0.1, 0.4);
        assert_relative_eq!(h, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_higher_quality_thins_layers() {
        let mut mesh = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        // tilt the cube so facets get a sloped normal
        mesh.rotate_z(0.0);
        let mut adaptive = SlicingAdaptive::new();
        adaptive.add_mesh(&mesh);
        adaptive.prepare(10.0);
        let fast = adaptive.next_layer_height(5.0, 0.0, 0.1, 0.4);
        adaptive.prepare(10.0);
        let fine = adaptive.next_layer_height(5.0, 100.0, 0.1, 0.4);
        assert!(fine <= fast);
    }

    #[test]
    fn test_horizontal_facet_distance() {
        let mut adaptive = SlicingAdaptive::new();
        adaptive.add_mesh(&TriangleMesh::make_cube(10.0, 10.0, 10.0));
        adaptive.prepare(10.0);
        // the cube top at z=10 is the next horizontal feature above z=9.8
        let d = adaptive.horizontal_facet_distance(9.8, 0.5);
        assert_relative_eq!(d, 0.2, epsilon = 1e-5);
    }
}
