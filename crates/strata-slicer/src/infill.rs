//! Fill composition: turn classified fill surfaces into extrusions.

use std::collections::BTreeMap;

use strata_config::{InfillPattern, PrintRegionConfig};
use strata_geometry::{offset2_ex, scale, BoundingBox, Point, Polyline};

use crate::error::Result;
use crate::extrusion::{ExtrusionEntity, ExtrusionEntityCollection, ExtrusionRole};
use crate::fill::{make_fill, FillParams};
use crate::flow::FlowRole;
use crate::parallel::Executor;
use crate::print::{Print, PrintRegion, RegionKey};
use crate::steps::ObjectStep;
use crate::surface::{Surface, SurfaceType};

/// Pattern and role derived from a surface classification.
fn pattern_for(config: &PrintRegionConfig, surface: &SurfaceType) -> Option<(InfillPattern, ExtrusionRole, f64)> {
    use strata_config::InfillPattern as P;
    if surface.density == crate::surface::SurfaceDensity::Void {
        return None;
    }
    if surface.is_bridge() {
        // bridges and over-bridges are always rectilinear along the bridge
        return Some((P::Rectilinear, ExtrusionRole::BridgeInfill, 1.0));
    }
    Some(match (surface.position, surface.is_solid()) {
        (crate::surface::SurfacePosition::Top, true) => {
            (config.top_infill_pattern, ExtrusionRole::TopSolidInfill, 1.0)
        }
        (crate::surface::SurfacePosition::Bottom, true) => {
            (config.bottom_infill_pattern, ExtrusionRole::SolidInfill, 1.0)
        }
        // internal solid is always rectilinear for shell strength
        (_, true) => (P::Rectilinear, ExtrusionRole::SolidInfill, 1.0),
        (_, false) => (
            config.fill_pattern,
            ExtrusionRole::InternalInfill,
            config.fill_density / 100.0,
        ),
    })
}

/// Generate fill extrusions for every layer of an object.
pub fn make_object_fills(print: &mut Print, index: usize, executor: &Executor) -> Result<()> {
    if print.objects[index].state.is_done(ObjectStep::Infill) {
        return Ok(());
    }
    print.objects[index].state.set_started(ObjectStep::Infill);

    // a failed or cancelled run leaves the step not-started
    match make_object_fills_inner(print, index, executor) {
        Ok(()) => {
            print.objects[index].state.set_done(ObjectStep::Infill);
            Ok(())
        }
        Err(err) => {
            print.invalidate_object_step(index, ObjectStep::Infill);
            Err(err)
        }
    }
}

fn make_object_fills_inner(print: &mut Print, index: usize, executor: &Executor) -> Result<()> {
    let print_config = print.config.clone();
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();
    let object_bbox = {
        let object = &print.objects[index];
        let mut bbox = BoundingBox::default();
        bbox.merge_point(Point::new(0, 0));
        bbox.merge_point(Point::new(object.size.x, object.size.y));
        bbox
    };

    struct LayerInput {
        layer_id: usize,
        height: f64,
        regions: Vec<(RegionKey, Vec<Surface>)>,
    }
    let inputs: Vec<LayerInput> = print.objects[index]
        .layers
        .iter()
        .map(|layer| LayerInput {
            layer_id: layer.id,
            height: layer.height,
            regions: layer
                .regions
                .iter()
                .map(|r| (r.region, r.fill_surfaces.surfaces.clone()))
                .collect(),
        })
        .collect();

    let outputs = executor.map(inputs, |input| -> Result<Vec<(RegionKey, ExtrusionEntityCollection)>> {
        let mut out = Vec::new();
        for (key, surfaces) in input.regions {
            let config = &region_configs[&key];
            let mut fills = ExtrusionEntityCollection::new();
            for surface in &surfaces {
                if let Some(entity) = fill_one_surface(
                    surface,
                    config,
                    &print_config,
                    input.layer_id,
                    input.height,
                    object_bbox,
                )? {
                    fills.append(entity);
                }
            }
            out.push((key, fills));
        }
        Ok(out)
    })?;

    let object = &mut print.objects[index];
    for (layer, output) in object.layers.iter_mut().zip(outputs) {
        for (key, fills) in output? {
            if let Some(region) = layer.region_mut(key) {
                region.fills = fills;
            }
        }
    }

    Ok(())
}

fn fill_one_surface(
    surface: &Surface,
    config: &PrintRegionConfig,
    print_config: &strata_config::PrintConfig,
    layer_id: usize,
    layer_height: f64,
    bounding_box: BoundingBox,
) -> Result<Option<ExtrusionEntity>> {
    let Some((pattern, role, density)) = pattern_for(config, &surface.surface_type) else {
        return Ok(None);
    };
    if density <= 0.0 {
        return Ok(None);
    }

    let region = PrintRegion {
        config: config.clone(),
    };
    let flow_role = match role {
        ExtrusionRole::TopSolidInfill => FlowRole::TopSolidInfill,
        ExtrusionRole::SolidInfill | ExtrusionRole::BridgeInfill => FlowRole::SolidInfill,
        _ => FlowRole::Infill,
    };
    let bridge = surface.surface_type.is_bridge();
    // combined sparse layers extrude at their full stacked thickness
    let height = layer_height * surface.thickness_layers.max(1) as f64;
    let flow = region.flow(
        flow_role,
        height,
        bridge,
        layer_id == 0,
        None,
        print_config,
    )?;
    let spacing = flow.spacing()?;
    let mut mm3_per_mm = flow.mm3_per_mm()?;

    // over-bridges push extra flow to fill the sag of the bridge below
    if surface.surface_type.modifier == crate::surface::SurfaceModifier::OverBridge {
        mm3_per_mm *= config.over_bridge_flow_ratio.max(1.0);
    }

    let filler = make_fill(pattern);
    let params = FillParams {
        density,
        dont_adjust: bridge,
        layer_id: Some(layer_id),
        angle: config.fill_angle.to_radians(),
        spacing,
        bounding_box: Some(bounding_box),
    };
    let polylines = filler.fill_surface(surface, &params);
    if polylines.is_empty() {
        return Ok(None);
    }

    // scale bulk flow so the extruded volume matches the ideal region volume
    if config.fill_exactly && density >= 1.0 && !bridge {
        let length_mm: f64 = polylines
            .iter()
            .map(|pl: &Polyline| pl.length() * strata_geometry::SCALING_FACTOR)
            .sum();
        let extruded = mm3_per_mm * length_mm;
        if extruded > 0.0 {
            // undo the overlap growth the perimeter generator applied
            let overlap = scale(config.infill_overlap.get_abs_value(flow.width)) as f64;
            let scaling = strata_geometry::SCALING_FACTOR;
            let ideal_area_mm2: f64 = offset2_ex(&surface.to_polygons(), -overlap, 0.0)
                .iter()
                .map(|ex| ex.area() * scaling * scaling)
                .sum();
            let ideal = ideal_area_mm2 * flow.height;
            let ratio = ideal / extruded;
            if ratio.is_finite() && ratio > 0.0 {
                mm3_per_mm *= ratio;
            }
        }
    }

    let mut collection = if filler.no_sort() {
        ExtrusionEntityCollection::no_sort()
    } else {
        ExtrusionEntityCollection::new()
    };
    collection.append_paths(polylines, role, mm3_per_mm, flow.width, flow.height);
    Ok(Some(ExtrusionEntity::Collection(collection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_from_mesh;
    use crate::print_object::slice_object;
    use strata_config::DynamicConfig;
    use strata_mesh::TriangleMesh;

    fn filled_cube(edits: &[(&str, &str)]) -> Print {
        let mut config = DynamicConfig::new();
        for (k, v) in edits {
            config.set_deserialize(k, v).unwrap();
        }
        let mut print = Print::new();
        print.apply_config(config).unwrap();
        print.set_model(model_from_mesh(TriangleMesh::make_cube(20.0, 20.0, 20.0)));
        let executor = print.executor();
        slice_object(&mut print, 0).unwrap();
        crate::perimeter::make_object_perimeters(&mut print, 0, &executor).unwrap();
        crate::classify::prepare_infill(&mut print, 0, &executor).unwrap();
        make_object_fills(&mut print, 0, &executor).unwrap();
        print
    }

    fn all_paths(collection: &ExtrusionEntityCollection) -> Vec<crate::extrusion::ExtrusionPath> {
        fn collect(entity: &ExtrusionEntity, out: &mut Vec<crate::extrusion::ExtrusionPath>) {
            match entity {
                ExtrusionEntity::Path(p) => out.push(p.clone()),
                ExtrusionEntity::Loop(_) => {}
                ExtrusionEntity::Collection(c) => {
                    for e in &c.entities {
                        collect(e, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        for e in &collection.entities {
            collect(e, &mut out);
        }
        out
    }

    #[test]
    fn test_fills_generated_with_positive_flow() {
        let print = filled_cube(&[
            ("layer_height", "0.5"),
            ("first_layer_height", "0.5"),
            ("fill_density", "20%"),
        ]);
        let mut any = false;
        for layer in &print.objects[0].layers {
            for region in &layer.regions {
                for path in all_paths(&region.fills) {
                    any = true;
                    assert!(path.mm3_per_mm > 0.0);
                    assert!(path.width > 0.0);
                    assert!(path.height > 0.0);
                }
            }
        }
        assert!(any, "no fill paths were generated");
    }

    #[test]
    fn test_zero_density_leaves_middle_layers_empty() {
        let print = filled_cube(&[
            ("layer_height", "0.5"),
            ("first_layer_height", "0.5"),
            ("fill_density", "0"),
            ("top_solid_layers", "0"),
            ("bottom_solid_layers", "0"),
        ]);
        let object = &print.objects[0];
        let middle = &object.layers[object.layers.len() / 2];
        for region in &middle.regions {
            assert!(region.fills.is_empty());
        }
    }

    #[test]
    fn test_solid_roles_on_shells() {
        let print = filled_cube(&[
            ("layer_height", "0.5"),
            ("first_layer_height", "0.5"),
            ("top_solid_layers", "2"),
            ("bottom_solid_layers", "2"),
        ]);
        let object = &print.objects[0];
        let top = object.layers.last().unwrap();
        let roles: Vec<ExtrusionRole> = all_paths(&top.regions[0].fills)
            .iter()
            .map(|p| p.role)
            .collect();
        assert!(roles.contains(&ExtrusionRole::TopSolidInfill));
    }
}
