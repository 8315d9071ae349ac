//! Per-object state and the slicing step.

use std::collections::BTreeMap;

use strata_config::PrintObjectConfig;
use strata_geometry::{
    diff_ex, intersection_ex, offset_ex, scale, unscale, BoundingBox, ExPolygons, Point, Point3,
    Polygons,
};
use strata_mesh::{AxisZ, MeshSlicer, TriangleMesh};

use crate::adaptive::SlicingAdaptive;
use crate::error::{Result, SlicerError};
use crate::layer::{Layer, LayerRegion, SupportLayer};
use crate::layer_height::{generate_object_layers, LayerHeightParams};
use crate::model::ModelObject;
use crate::print::{order_copies, Print, RegionKey};
use crate::spline::LayerHeightSpline;
use crate::steps::{ObjectStep, PrintState};
use crate::surface::SurfaceType;

/// One object being printed: configuration, volume-to-region mapping,
/// layers and support layers.
#[derive(Debug)]
pub struct PrintObject {
    /// Index of the model object this was built from.
    pub model_index: usize,
    /// Stable object id; part of seam randomization seeds.
    pub id: usize,
    /// Resolved per-object configuration.
    pub config: PrintObjectConfig,
    /// Volumes contributing to each region.
    pub region_volumes: BTreeMap<RegionKey, Vec<usize>>,
    /// Object layers, ascending Z.
    pub layers: Vec<Layer>,
    /// Support layers, ascending Z.
    pub support_layers: Vec<SupportLayer>,
    /// Copy translations in scaled coordinates, chained order.
    pub copies: Vec<Point>,
    /// Scaled object size.
    pub size: Point3,
    /// Step state of this object.
    pub state: PrintState<ObjectStep>,
    /// Forced layer heights inside Z bands.
    pub layer_height_ranges: Vec<((f64, f64), f64)>,
    /// Editable layer-height profile.
    pub layer_height_spline: LayerHeightSpline,
    /// True once slices have been retyped by the surface detector.
    pub typed_slices: bool,
    /// XY shift applied so toolpath coordinates stay small.
    pub copies_shift: Point,
}

impl PrintObject {
    /// Build the object from its model counterpart.
    pub fn new(model_index: usize, model_object: &ModelObject, config: PrintObjectConfig) -> Self {
        let bbox = model_object.raw_bounding_box();
        let (copies_shift, size) = if bbox.defined {
            (
                Point::new_scale(bbox.min.x, bbox.min.y),
                Point3::new_scale(bbox.size().x, bbox.size().y, bbox.size().z),
            )
        } else {
            (Point::default(), Point3::default())
        };

        let raw_copies: Vec<Point> = model_object
            .instances
            .iter()
            .map(|instance| Point::new_scale(instance.offset.x, instance.offset.y))
            .collect();
        let order = order_copies(&raw_copies);
        let copies = order
            .into_iter()
            .map(|i| raw_copies[i].translated(copies_shift.x, copies_shift.y))
            .collect();

        Self {
            model_index,
            id: 0,
            config,
            region_volumes: BTreeMap::new(),
            layers: Vec::new(),
            support_layers: Vec::new(),
            copies,
            size,
            state: PrintState::new(),
            layer_height_ranges: model_object.layer_height_ranges.clone(),
            layer_height_spline: model_object.layer_height_spline.clone(),
            typed_slices: false,
            copies_shift,
        }
    }

    /// Number of object layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Number of support layers.
    pub fn support_layer_count(&self) -> usize {
        self.support_layers.len()
    }

    /// Both layer kinds together.
    pub fn total_layer_count(&self) -> usize {
        self.layer_count() + self.support_layer_count()
    }

    /// Resolved first layer height in millimeters.
    pub fn first_layer_height(&self) -> f64 {
        self.config
            .first_layer_height
            .get_abs_value(self.config.layer_height)
    }

    /// The object's scaled 2D bounding box; the object is aligned to the
    /// origin so this is just its size.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&[Point::new(0, 0), Point::new(self.size.x, self.size.y)])
    }

    /// Drop all layers.
    pub fn clear_layers(&mut self) {
        self.layers.clear();
    }

    /// Drop all support layers.
    pub fn clear_support_layers(&mut self) {
        self.support_layers.clear();
    }
}

/// Extruders used by the object's regions (zero-based).
fn object_extruders(print: &Print, index: usize) -> Vec<usize> {
    let mut extruders = Vec::new();
    for key in print.objects[index].region_volumes.keys() {
        if let Some(region) = print.regions.get(*key) {
            for extruder in [
                region.config.perimeter_extruder,
                region.config.infill_extruder,
                region.config.solid_infill_extruder,
            ] {
                let e = extruder.saturating_sub(1) as usize;
                if !extruders.contains(&e) {
                    extruders.push(e);
                }
            }
        }
    }
    if extruders.is_empty() {
        extruders.push(0);
    }
    extruders
}

/// Extruders used for support material (zero-based).
pub(crate) fn support_extruders(print: &Print, index: usize) -> Vec<usize> {
    let config = &print.objects[index].config;
    if config.has_support_material() {
        vec![
            config.support_material_extruder.saturating_sub(1) as usize,
            config.support_material_interface_extruder.saturating_sub(1) as usize,
        ]
    } else {
        vec![0]
    }
}

/// Decide layer Zs, initialize layers and their regions, slice every volume
/// and post-process the slices. Idempotent via the step state.
pub fn slice_object(print: &mut Print, index: usize) -> Result<()> {
    if print.objects[index].state.is_done(ObjectStep::Slice) {
        return Ok(());
    }
    print.objects[index].state.set_started(ObjectStep::Slice);

    // a failed or cancelled run leaves the step not-started
    match slice_object_inner(print, index) {
        Ok(()) => {
            print.objects[index].state.set_done(ObjectStep::Slice);
            Ok(())
        }
        Err(err) => {
            print.invalidate_object_step(index, ObjectStep::Slice);
            Err(err)
        }
    }
}

fn slice_object_inner(print: &mut Print, index: usize) -> Result<()> {
    // resolve heights and raft geometry
    let config = print.objects[index].config.clone();
    let mut first_layer_height = print.objects[index].first_layer_height();
    let mut raft_height = 0.0;
    let mut id_offset = 0usize;
    if config.raft_layers > 0 {
        id_offset = config.raft_layers as usize;
        let min_support_nozzle = support_extruders(print, index)
            .iter()
            .map(|&e| print.config.nozzle_diameter_at(e))
            .fold(f64::INFINITY, f64::min)
            .min(1.0);
        let support_layer_height = 0.75 * min_support_nozzle;
        raft_height += first_layer_height + support_layer_height * (config.raft_layers as f64 - 1.0);
        first_layer_height = 0.0;
        // detachable support: lift the object by the contact gap
        if config.support_material_contact_distance > 0.0 {
            first_layer_height = min_support_nozzle;
            raft_height += config.support_material_contact_distance;
        }
    }

    let extruders = object_extruders(print, index);
    let min_nozzle_diameter = extruders
        .iter()
        .map(|&e| print.config.nozzle_diameter_at(e))
        .fold(1.0f64, f64::min);
    let min_layer_height = extruders
        .iter()
        .map(|&e| print.config.min_layer_height_at(e))
        .fold(0.0f64, f64::max);
    let max_layer_height = extruders
        .iter()
        .map(|&e| print.config.max_layer_height_at(e))
        .fold(10.0f64, f64::min);

    let params = LayerHeightParams {
        layer_height: config.layer_height,
        first_layer_height,
        min_layer_height,
        max_layer_height,
        min_nozzle_diameter,
        z_steps_per_mm: print.config.z_steps_per_mm,
        adaptive: config.adaptive_slicing,
        adaptive_quality: config.adaptive_slicing_quality,
        match_horizontal_surfaces: config.match_horizontal_surfaces,
        layer_height_ranges: print.objects[index].layer_height_ranges.clone(),
        object_height: unscale(print.objects[index].size.z),
    };

    let mut adaptive = SlicingAdaptive::new();
    if config.adaptive_slicing {
        let model_index = print.objects[index].model_index;
        for volume in &print.model.objects[model_index].volumes {
            if !volume.modifier {
                adaptive.add_mesh(&volume.mesh);
            }
        }
    }

    let layers_done = print.objects[index].state.is_done(ObjectStep::Layers);
    let mut spline = print.objects[index].layer_height_spline.clone();
    let object_layers = generate_object_layers(&params, &mut adaptive, &mut spline, layers_done);
    print.objects[index].layer_height_spline = spline.clone();
    print.model.objects[print.objects[index].model_index].layer_height_spline = spline;
    print.objects[index].state.set_done(ObjectStep::Layers);

    // initialize layers and their regions
    let region_keys: Vec<RegionKey> = print.regions.keys().collect();
    {
        let object = &mut print.objects[index];
        object.clear_layers();
        let mut lo = raft_height;
        for (i, &object_z) in object_layers.iter().enumerate() {
            let hi = object_z + raft_height;
            let slice_z = 0.5 * (lo + hi) - raft_height;
            let mut layer = Layer::new(id_offset + i, hi - lo, hi, slice_z);
            for &key in &region_keys {
                layer.regions.push(LayerRegion::new(key));
            }
            object.layers.push(layer);
            lo = hi;
        }
        object.typed_slices = false;
    }

    let slice_zs: Vec<f32> = print.objects[index]
        .layers
        .iter()
        .map(|l| l.slice_z as f32)
        .collect();

    // slice plain volumes of each region
    for &key in &region_keys {
        let expolygons_by_layer = slice_region_volumes(print, index, key, &slice_zs, false)?;
        let object = &mut print.objects[index];
        for (layer_idx, expolygons) in expolygons_by_layer.into_iter().enumerate() {
            if let Some(region) = object.layers[layer_idx].region_mut(key) {
                region.slices.append(expolygons, SurfaceType::INTERNAL);
            }
        }
    }

    // modifier volumes steal the area they overlap from other regions
    for &key in &region_keys {
        let expolygons_by_layer = slice_region_volumes(print, index, key, &slice_zs, true)?;
        if expolygons_by_layer.iter().all(ExPolygons::is_empty) {
            continue;
        }
        for &other_key in &region_keys {
            if other_key == key {
                continue;
            }
            let object = &mut print.objects[index];
            for (layer_idx, modifier_shapes) in expolygons_by_layer.iter().enumerate() {
                let layer = &mut object.layers[layer_idx];
                let other_polygons: Polygons = match layer.region(other_key) {
                    Some(r) => r.slices.to_polygons(),
                    None => continue,
                };
                let stolen =
                    intersection_ex(&other_polygons, &to_rings(modifier_shapes));
                if stolen.is_empty() {
                    continue;
                }
                let remaining = diff_ex(&other_polygons, &to_rings(&stolen));
                if let Some(other_region) = layer.region_mut(other_key) {
                    other_region.slices.set(remaining, SurfaceType::INTERNAL);
                }
                if let Some(region) = layer.region_mut(key) {
                    region.slices.append(stolen, SurfaceType::INTERNAL);
                }
            }
        }
    }

    // drop trailing empty layers
    {
        let object = &mut print.objects[index];
        while let Some(layer) = object.layers.last() {
            if layer.regions.iter().any(|r| !r.slices.is_empty()) {
                break;
            }
            object.layers.pop();
        }
        if object.layers.is_empty() {
            return Err(SlicerError::SliceError);
        }
    }

    // XY compensation, island merging and the optional regions overlap
    let xy_compensation = scale(config.xy_size_compensation);
    let regions_overlap = scale(config.regions_overlap);
    let object = &mut print.objects[index];
    for layer in &mut object.layers {
        if xy_compensation != 0 {
            if layer.regions.len() == 1 {
                let region = &mut layer.regions[0];
                let grown = offset_ex(&region.slices.to_polygons(), xy_compensation as f64);
                region.slices.set(grown, SurfaceType::INTERNAL);
            } else {
                // multiple regions: grow or shrink each, giving priority to
                // earlier regions when they collide
                let mut processed: Polygons = Polygons::new();
                for region_idx in 0..layer.regions.len() {
                    let polygons = layer.regions[region_idx].slices.to_polygons();
                    let mut shifted: Polygons =
                        strata_geometry::offset(&polygons, xy_compensation as f64);
                    if region_idx > 0 {
                        shifted = strata_geometry::diff(&shifted, &processed);
                    }
                    if region_idx + 1 < layer.regions.len() {
                        processed.extend(shifted.clone());
                    }
                    let merged = strata_geometry::union_ex(&shifted);
                    layer.regions[region_idx]
                        .slices
                        .set(merged, SurfaceType::INTERNAL);
                }
            }
        }

        layer.make_slices();

        if regions_overlap > 0 {
            let islands: Polygons = layer
                .lslices
                .iter()
                .flat_map(|ex| ex.to_polygons())
                .collect();
            let delta = regions_overlap / 2;
            for region in &mut layer.regions {
                let grown = strata_geometry::offset(&region.slices.to_polygons(), delta as f64);
                let clipped = intersection_ex(&grown, &islands);
                region.slices.set(clipped, SurfaceType::INTERNAL);
            }
        }
    }

    Ok(())
}

fn to_rings(expolygons: &ExPolygons) -> Polygons {
    expolygons.iter().flat_map(|ex| ex.to_polygons()).collect()
}

/// Slice the composed mesh of one region's volumes at the given Zs.
fn slice_region_volumes(
    print: &Print,
    index: usize,
    key: RegionKey,
    slice_zs: &[f32],
    modifier: bool,
) -> Result<Vec<ExPolygons>> {
    let object = &print.objects[index];
    let model_object = &print.model.objects[object.model_index];
    let Some(volume_ids) = object.region_volumes.get(&key) else {
        return Ok(vec![ExPolygons::new(); slice_zs.len()]);
    };

    let mut mesh = TriangleMesh::default();
    for &volume_id in volume_ids {
        let volume = &model_object.volumes[volume_id];
        if volume.modifier == modifier {
            mesh.merge(&volume.mesh);
        }
    }
    if mesh.is_empty() {
        return Ok(vec![ExPolygons::new(); slice_zs.len()]);
    }

    // only the first instance's rotation and scaling are applied; copies are
    // pure translations handled downstream
    if let Some(instance) = model_object.instances.first() {
        instance.transform_mesh(&mut mesh, true);
    }

    // align to Z = 0 and undo the XY shift
    let bbox = model_object.raw_bounding_box();
    mesh.translate(
        -unscale(object.copies_shift.x) as f32,
        -unscale(object.copies_shift.y) as f32,
        -bbox.min.z as f32,
    );

    mesh.repair();
    let slicer = MeshSlicer::<AxisZ>::new(&mesh)?;
    Ok(slicer.slice(slice_zs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_from_mesh;
    use approx::assert_relative_eq;
    use strata_config::DynamicConfig;

    fn sliced_cube(edits: &[(&str, &str)]) -> Print {
        let mut config = DynamicConfig::new();
        for (k, v) in edits {
            config.set_deserialize(k, v).unwrap();
        }
        let mut print = Print::new();
        print.apply_config(config).unwrap();
        print.set_model(model_from_mesh(TriangleMesh::make_cube(20.0, 20.0, 20.0)));
        slice_object(&mut print, 0).unwrap();
        print
    }

    #[test]
    fn test_slice_cube_static_heights() {
        let print = sliced_cube(&[
            ("first_layer_height", "2"),
            ("layer_height", "2"),
            ("nozzle_diameter", "3"),
        ]);
        let object = &print.objects[0];
        assert_eq!(object.layer_count(), 10);
        for (i, layer) in object.layers.iter().enumerate() {
            assert_relative_eq!(layer.print_z, 2.0 * (i as f64 + 1.0), epsilon = 1e-9);
            assert_eq!(layer.lslices.len(), 1);
        }
        assert_relative_eq!(object.layers.last().unwrap().print_z, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slice_cube_thick_layers_capped() {
        let print = sliced_cube(&[
            ("first_layer_height", "2"),
            ("layer_height", "10"),
            ("nozzle_diameter", "11"),
        ]);
        let zs: Vec<f64> = print.objects[0].layers.iter().map(|l| l.print_z).collect();
        assert_eq!(zs.len(), 3);
        assert_relative_eq!(zs[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(zs[1], 12.0, epsilon = 1e-9);
        assert_relative_eq!(zs[2], 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slice_monotonic_and_bounded() {
        let print = sliced_cube(&[("layer_height", "0.3"), ("first_layer_height", "0.35")]);
        let object = &print.objects[0];
        let mut last = 0.0;
        for layer in &object.layers {
            assert!(layer.print_z > last);
            assert!(layer.height > 0.0);
            last = layer.print_z;
        }
    }

    #[test]
    fn test_raft_lifts_layer_ids() {
        let print = sliced_cube(&[
            ("raft_layers", "3"),
            ("support_material", "1"),
            ("layer_height", "0.4"),
            ("nozzle_diameter", "0.5"),
        ]);
        let object = &print.objects[0];
        assert_eq!(object.layers[0].id, 3);
        // the object itself starts above the raft
        assert!(object.layers[0].print_z > object.first_layer_height());
        // slice probes stay in object coordinates
        assert!(object.layers[0].slice_z < object.layers[0].print_z);
        assert!(object.layers[0].slice_z > 0.0);
    }

    #[test]
    fn test_slice_open_sheet_fails() {
        // a lone vertical sheet produces no closed loop on any layer
        use strata_mesh::{Facet, Vertex};
        let sheet = TriangleMesh::from_facets(vec![
            Facet::new([
                Vertex::new(0.0, 0.0, 0.0),
                Vertex::new(10.0, 0.0, 0.0),
                Vertex::new(10.0, 0.0, 10.0),
            ]),
            Facet::new([
                Vertex::new(0.0, 0.0, 0.0),
                Vertex::new(10.0, 0.0, 10.0),
                Vertex::new(0.0, 0.0, 10.0),
            ]),
        ]);
        let mut print = Print::new();
        print.apply_config(DynamicConfig::new()).unwrap();
        print.set_model(model_from_mesh(sheet));
        assert!(matches!(
            slice_object(&mut print, 0),
            Err(SlicerError::SliceError)
        ));
        assert!(!print.objects[0].state.is_started(ObjectStep::Slice));
    }
}
