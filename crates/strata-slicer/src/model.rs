//! Input model: what the file-import collaborator hands the pipeline.

use std::collections::BTreeMap;

use strata_config::DynamicConfig;
use strata_geometry::{BoundingBoxf3, Pointf};
use strata_mesh::TriangleMesh;

use crate::spline::LayerHeightSpline;

/// A loaded scene: objects plus shared materials.
#[derive(Debug, Default)]
pub struct Model {
    /// The printable objects.
    pub objects: Vec<ModelObject>,
    /// Materials by id, referenced from volumes.
    pub materials: BTreeMap<String, ModelMaterial>,
}

/// A material and its per-material option overrides.
#[derive(Debug, Default)]
pub struct ModelMaterial {
    /// Display name.
    pub name: String,
    /// Option overrides applied to volumes using this material.
    pub config: DynamicConfig,
}

/// One object: volumes in object-local coordinates plus placement instances.
#[derive(Debug, Default)]
pub struct ModelObject {
    /// Display name.
    pub name: String,
    /// The triangle meshes making up the object.
    pub volumes: Vec<ModelVolume>,
    /// Placements of the object on the bed.
    pub instances: Vec<ModelInstance>,
    /// Per-object option overrides.
    pub config: DynamicConfig,
    /// Forced layer heights inside Z bands: `((lo, hi), height)`.
    pub layer_height_ranges: Vec<((f64, f64), f64)>,
    /// Editable layer-height profile.
    pub layer_height_spline: LayerHeightSpline,
}

impl ModelObject {
    /// Bounding box of the untranslated object: volume meshes with the
    /// first instance's rotation and scaling applied.
    pub fn raw_bounding_box(&self) -> BoundingBoxf3 {
        let mut bbox = BoundingBoxf3::default();
        for volume in &self.volumes {
            if volume.modifier {
                continue;
            }
            let mut mesh = volume.mesh.clone();
            if let Some(instance) = self.instances.first() {
                instance.transform_mesh(&mut mesh, true);
            }
            bbox.merge(&mesh.bounding_box());
        }
        bbox
    }

    /// Merged mesh of all printable volumes, untransformed.
    pub fn raw_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::default();
        for volume in &self.volumes {
            if !volume.modifier {
                mesh.merge(&volume.mesh);
            }
        }
        mesh
    }
}

/// One mesh of an object.
#[derive(Debug, Default)]
pub struct ModelVolume {
    /// The triangle soup, object-local coordinates.
    pub mesh: TriangleMesh,
    /// Modifier volumes reclassify the regions they overlap instead of
    /// adding material.
    pub modifier: bool,
    /// Material reference, if any.
    pub material_id: Option<String>,
    /// Per-volume option overrides.
    pub config: DynamicConfig,
}

/// A placement of an object.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    /// XY offset on the bed, millimeters.
    pub offset: Pointf,
    /// Rotation around Z, radians.
    pub rotation: f64,
    /// Uniform scale factor.
    pub scaling_factor: f64,
}

impl Default for ModelInstance {
    fn default() -> Self {
        Self {
            offset: Pointf::new(0.0, 0.0),
            rotation: 0.0,
            scaling_factor: 1.0,
        }
    }
}

impl ModelInstance {
    /// Apply rotation and scale (and, unless `dont_translate`, the offset)
    /// to a mesh.
    pub fn transform_mesh(&self, mesh: &mut TriangleMesh, dont_translate: bool) {
        if self.rotation != 0.0 {
            mesh.rotate_z(self.rotation);
        }
        if self.scaling_factor != 1.0 {
            mesh.scale(self.scaling_factor as f32);
        }
        if !dont_translate {
            mesh.translate(self.offset.x as f32, self.offset.y as f32, 0.0);
        }
    }
}

/// Build a single-object model around one mesh; the common entry point for
/// tests and simple callers.
pub fn model_from_mesh(mesh: TriangleMesh) -> Model {
    Model {
        objects: vec![ModelObject {
            name: "object".into(),
            volumes: vec![ModelVolume {
                mesh,
                ..ModelVolume::default()
            }],
            instances: vec![ModelInstance::default()],
            ..ModelObject::default()
        }],
        materials: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_raw_bounding_box_applies_scale() {
        let mut model = model_from_mesh(TriangleMesh::make_cube(10.0, 10.0, 10.0));
        model.objects[0].instances[0].scaling_factor = 2.0;
        let bbox = model.objects[0].raw_bounding_box();
        assert_relative_eq!(bbox.size().z, 20.0, epsilon = 1e-5);
    }

    #[test]
    fn test_modifiers_excluded_from_bbox() {
        let mut model = model_from_mesh(TriangleMesh::make_cube(10.0, 10.0, 10.0));
        let mut tall = TriangleMesh::make_cube(5.0, 5.0, 50.0);
        tall.translate(2.0, 2.0, 0.0);
        model.objects[0].volumes.push(ModelVolume {
            mesh: tall,
            modifier: true,
            ..ModelVolume::default()
        });
        assert_relative_eq!(
            model.objects[0].raw_bounding_box().size().z,
            10.0,
            epsilon = 1e-5
        );
    }
}
