//! Surface classification and infill preparation.
//!
//! `detect_surfaces` labels every slice region by its vertical neighborhood;
//! `prepare_infill` expands external surfaces, promotes horizontal shells,
//! detects bridges, clips unneeded infill and combines sparse infill across
//! layers.

use std::collections::BTreeMap;

use strata_config::PrintRegionConfig;
use strata_geometry::{
    diff, diff_ex, intersection, intersection_ex, intersection_pl, offset, offset2_ex, scale,
    union, union_ex, ExPolygon, Point, Polygon, Polygons, Polyline, SCALED_EPSILON,
};

use crate::error::Result;
use crate::flow::FlowRole;
use crate::parallel::Executor;
use crate::print::{Print, PrintRegion, RegionKey};
use crate::steps::ObjectStep;
use crate::surface::{Surface, SurfaceDensity, SurfaceModifier, SurfacePosition, SurfaceType};
use crate::surface_collection::SurfaceCollection;

/// Margin by which external (top/bottom) surfaces are expanded into the
/// internal fill, in millimeters.
const EXTERNAL_INFILL_MARGIN: f64 = 3.0;

fn region_flow_width(
    config: &PrintRegionConfig,
    print_config: &strata_config::PrintConfig,
    role: FlowRole,
    layer_height: f64,
) -> Result<f64> {
    let region = PrintRegion {
        config: config.clone(),
    };
    Ok(region
        .flow(role, layer_height, false, false, None, print_config)?
        .width)
}

/// Classify every slice surface as top, bottom or internal.
pub fn detect_surfaces(print: &mut Print, index: usize, executor: &Executor) -> Result<()> {
    if print.objects[index].state.is_done(ObjectStep::DetectSurfaces) {
        return Ok(());
    }
    print.objects[index]
        .state
        .set_started(ObjectStep::DetectSurfaces);

    // a failed or cancelled classification leaves the step not-started
    match detect_surfaces_inner(print, index, executor) {
        Ok(()) => {
            print.objects[index].state.set_done(ObjectStep::DetectSurfaces);
            Ok(())
        }
        Err(err) => {
            print.invalidate_object_step(index, ObjectStep::DetectSurfaces);
            Err(err)
        }
    }
}

fn detect_surfaces_inner(print: &mut Print, index: usize, executor: &Executor) -> Result<()> {
    let object_config = print.objects[index].config.clone();
    let print_config = print.config.clone();
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();

    // snapshot neighbor data so layers can be processed independently
    struct LayerSnapshot {
        all_slices: Polygons,
        per_region: BTreeMap<RegionKey, Polygons>,
    }
    let snapshots: Vec<LayerSnapshot> = print.objects[index]
        .layers
        .iter()
        .map(|layer| LayerSnapshot {
            all_slices: layer.all_slices_polygons(),
            per_region: layer
                .regions
                .iter()
                .map(|r| (r.region, r.slices.to_polygons()))
                .collect(),
        })
        .collect();

    struct LayerInput {
        layer_idx: usize,
        slices: Vec<(RegionKey, SurfaceCollection)>,
        fill_boundaries: Vec<(RegionKey, Polygons)>,
        height: f64,
    }
    let inputs: Vec<LayerInput> = print.objects[index]
        .layers
        .iter()
        .enumerate()
        .map(|(layer_idx, layer)| LayerInput {
            layer_idx,
            slices: layer
                .regions
                .iter()
                .map(|r| (r.region, r.slices.clone()))
                .collect(),
            fill_boundaries: layer
                .regions
                .iter()
                .map(|r| (r.region, r.fill_surfaces.to_polygons()))
                .collect(),
            height: layer.height,
        })
        .collect();

    let layer_count = snapshots.len();
    let outputs = executor.map(inputs, |input| -> Result<Vec<(RegionKey, SurfaceCollection, SurfaceCollection)>> {
        let mut out = Vec::new();
        let upper = (input.layer_idx + 1 < layer_count).then(|| input.layer_idx + 1);
        let lower = input.layer_idx.checked_sub(1);

        for (key, slices) in &input.slices {
            let config = &region_configs[key];
            // collapse slivers with a tenth of the external perimeter width
            let offs = scale(region_flow_width(
                config,
                &print_config,
                FlowRole::ExternalPerimeter,
                input.height,
            )?) as f64
                / 10.0;
            let slices_polygons = slices.to_polygons();

            // top: whatever the upper layer does not cover
            let mut top = SurfaceCollection::new();
            match upper {
                Some(upper_idx) => {
                    let upper_slices = if object_config.interface_shells {
                        snapshots[upper_idx]
                            .per_region
                            .get(key)
                            .cloned()
                            .unwrap_or_default()
                    } else {
                        snapshots[upper_idx].all_slices.clone()
                    };
                    top.append(
                        offset2_ex(&diff(&slices_polygons, &upper_slices), -offs, offs),
                        SurfaceType::TOP,
                    );
                }
                None => {
                    for s in &slices.surfaces {
                        let mut t = s.clone();
                        t.surface_type = SurfaceType::TOP;
                        top.surfaces.push(t);
                    }
                }
            }

            // bottom: whatever the lower layer does not support
            let mut bottom = SurfaceCollection::new();
            match lower {
                Some(lower_idx) => {
                    // with soluble support squished against the object there
                    // is no reason to bridge
                    let bottom_type = if object_config.support_material
                        && object_config.support_material_contact_distance == 0.0
                    {
                        SurfaceType::BOTTOM
                    } else {
                        SurfaceType::BOTTOM_BRIDGE
                    };
                    bottom.append(
                        offset2_ex(
                            &diff(&slices_polygons, &snapshots[lower_idx].all_slices),
                            -offs,
                            offs,
                        ),
                        bottom_type,
                    );

                    if object_config.interface_shells {
                        // the part resting on a different region is a plain
                        // bottom, not a bridge
                        let lower_region = snapshots[lower_idx]
                            .per_region
                            .get(key)
                            .cloned()
                            .unwrap_or_default();
                        let supported =
                            intersection(&slices_polygons, &snapshots[lower_idx].all_slices);
                        bottom.append(
                            offset2_ex(&diff(&supported, &lower_region), -offs, offs),
                            SurfaceType::BOTTOM,
                        );
                    }
                }
                None => {
                    // a raft with a contact gap makes the first layer hang
                    // like any other bridge
                    let bottom_type = if object_config.raft_layers > 0
                        && object_config.support_material_contact_distance > 0.0
                    {
                        SurfaceType::BOTTOM_BRIDGE
                    } else {
                        SurfaceType::BOTTOM
                    };
                    for s in &slices.surfaces {
                        let mut b = s.clone();
                        b.surface_type = bottom_type;
                        bottom.surfaces.push(b);
                    }
                }
            }

            // a thin membrane can be top and bottom at once; bottom wins so
            // bridge detection can see it
            if !top.is_empty() && !bottom.is_empty() {
                let top_polygons = top.to_polygons();
                let bottom_polygons = bottom.to_polygons();
                top.clear();
                top.append(
                    offset2_ex(&diff(&top_polygons, &bottom_polygons), -offs, offs),
                    SurfaceType::TOP,
                );
            }

            // the rest is internal
            let mut new_slices = SurfaceCollection::new();
            new_slices.append_surfaces(top.surfaces.clone());
            new_slices.append_surfaces(bottom.surfaces.clone());
            {
                let mut covered = top.to_polygons();
                covered.extend(bottom.to_polygons());
                new_slices.append(
                    offset2_ex(&diff(&slices_polygons, &covered), -offs, offs),
                    SurfaceType::INTERNAL,
                );
            }

            // rebuild fill_surfaces from the new types, clipped by the
            // previous fill boundaries so the step stays idempotent
            let boundaries = input
                .fill_boundaries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, b)| b.clone())
                .unwrap_or_default();
            let mut fill = SurfaceCollection::new();
            for surface in &new_slices.surfaces {
                let clipped = intersection_ex(&surface.to_polygons(), &boundaries);
                for ex in clipped {
                    fill.surfaces.push(surface.clone_with_shape(ex));
                }
            }

            out.push((*key, new_slices, fill));
        }
        Ok(out)
    })?;

    let object = &mut print.objects[index];
    for (layer, output) in object.layers.iter_mut().zip(outputs) {
        for (key, slices, fill) in output? {
            if let Some(region) = layer.region_mut(key) {
                region.slices = slices;
                region.fill_surfaces = fill;
            }
        }
    }
    object.typed_slices = true;
    Ok(())
}

/// Everything between surface detection and fill generation.
pub fn prepare_infill(print: &mut Print, index: usize, executor: &Executor) -> Result<()> {
    if print.objects[index].state.is_done(ObjectStep::PrepareInfill) {
        return Ok(());
    }
    // classification must be current; it protects its own step state
    detect_surfaces(print, index, executor)?;
    print.objects[index]
        .state
        .set_started(ObjectStep::PrepareInfill);

    // a failed or cancelled pass leaves the step not-started
    match prepare_infill_inner(print, index) {
        Ok(()) => {
            print.objects[index].state.set_done(ObjectStep::PrepareInfill);
            Ok(())
        }
        Err(err) => {
            print.invalidate_object_step(index, ObjectStep::PrepareInfill);
            Err(err)
        }
    }
}

fn prepare_infill_inner(print: &mut Print, index: usize) -> Result<()> {
    prepare_fill_surfaces(print, index);
    process_external_surfaces(print, index)?;
    discover_horizontal_shells(print, index);
    bridge_over_infill(print, index)?;
    if print.objects[index].config.infill_only_where_needed {
        clip_fill_surfaces(print, index);
    }
    combine_infill(print, index)
}

/// Small config-driven retypes before the heavy passes.
fn prepare_fill_surfaces(print: &mut Print, index: usize) {
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();
    let object = &mut print.objects[index];
    for layer in &mut object.layers {
        for region in &mut layer.regions {
            let config = &region_configs[&region.region];

            // without solid shell layers, external surfaces fill like the
            // interior
            let no_top = config.top_solid_layers == 0 && config.top_solid_min_thickness == 0.0;
            let no_bottom =
                config.bottom_solid_layers == 0 && config.bottom_solid_min_thickness == 0.0;
            for surface in &mut region.fill_surfaces.surfaces {
                if no_top && surface.surface_type.is_top() {
                    surface.surface_type = SurfaceType::INTERNAL;
                }
                if no_bottom && surface.surface_type.is_bottom() {
                    surface.surface_type = SurfaceType::INTERNAL;
                }
            }

            // tiny sparse islands are stronger printed solid
            if config.solid_infill_below_area > 0.0 {
                let threshold =
                    config.solid_infill_below_area / strata_geometry::SCALING_FACTOR
                        / strata_geometry::SCALING_FACTOR;
                for surface in &mut region.fill_surfaces.surfaces {
                    if surface.surface_type == SurfaceType::INTERNAL && surface.area() <= threshold
                    {
                        surface.surface_type = SurfaceType::INTERNAL_SOLID;
                    }
                }
            }
        }
    }
}

/// Expand external surfaces into the interior and find bridge directions.
fn process_external_surfaces(print: &mut Print, index: usize) -> Result<()> {
    let margin = scale(EXTERNAL_INFILL_MARGIN) as f64;
    let object = &mut print.objects[index];
    let layer_count = object.layers.len();

    // lower layer islands for anchoring bridges
    let lower_rings: Vec<Option<Polygons>> = (0..layer_count)
        .map(|i| {
            i.checked_sub(1).map(|below| {
                object.layers[below]
                    .lslices
                    .iter()
                    .flat_map(|ex| ex.to_polygons())
                    .collect()
            })
        })
        .collect();

    for (layer_idx, layer) in object.layers.iter_mut().enumerate() {
        for region in &mut layer.regions {
            let slices_rings = region.slices.to_polygons();
            let mut externals: Vec<Surface> = Vec::new();
            let mut internals: Vec<Surface> = Vec::new();
            for surface in region.fill_surfaces.surfaces.drain(..) {
                if surface.surface_type.is_external() {
                    externals.push(surface);
                } else {
                    internals.push(surface);
                }
            }

            // expand externals into the internal area, clipped to the slices
            let mut grown_externals: Vec<Surface> = Vec::new();
            for surface in externals {
                let grown = intersection_ex(
                    &offset(&surface.to_polygons(), margin),
                    &slices_rings,
                );
                for ex in grown {
                    let mut s = surface.clone_with_shape(ex);
                    if s.surface_type.is_bridge() && s.bridge_angle.is_none() {
                        if let Some(lower) = lower_rings[layer_idx].as_ref() {
                            match detect_bridge_angle(&s.expolygon, lower) {
                                Some(angle) => s.bridge_angle = Some(angle),
                                None => {
                                    log::warn!(
                                        target: "slicer::classify",
                                        "layer {}: bridge with no anchors, keeping default direction",
                                        layer_idx
                                    );
                                    region
                                        .unsupported_bridge_edges
                                        .push(s.expolygon.contour.split_at_first_point());
                                }
                            }
                        }
                    }
                    grown_externals.push(s);
                }
            }

            // trim the expansion out of the internal surfaces
            let external_rings: Polygons = grown_externals
                .iter()
                .flat_map(Surface::to_polygons)
                .collect();
            let mut new_surfaces: Vec<Surface> = Vec::new();
            for surface in internals {
                for ex in diff_ex(&surface.to_polygons(), &external_rings) {
                    new_surfaces.push(surface.clone_with_shape(ex));
                }
            }
            new_surfaces.extend(grown_externals);
            region.fill_surfaces.surfaces = new_surfaces;
        }
    }
    Ok(())
}

/// Pick the direction that anchors a bridge best.
///
/// Candidate directions are tested with coverage lines across the bridge;
/// a line counts when both ends land on the lower layer. Returns `None`
/// when no direction anchors at all.
pub(crate) fn detect_bridge_angle(bridge: &ExPolygon, lower: &Polygons) -> Option<f64> {
    let anchors = intersection(
        &offset(&bridge.to_polygons(), scale(EXTERNAL_INFILL_MARGIN) as f64),
        lower,
    );
    if anchors.is_empty() {
        return None;
    }
    let anchor_test = offset(&anchors, SCALED_EPSILON as f64 * 10.0);
    let anchor_ex: Vec<ExPolygon> = union_ex(&anchor_test);

    let bbox = bridge.bounding_box();
    let diagonal = (bbox.size().x.pow(2) as f64 + bbox.size().y.pow(2) as f64).sqrt();
    let center = bbox.center();
    let line_spacing = scale(2.0);

    let mut best: Option<(f64, f64)> = None; // (score, angle)
    for step in 0..12 {
        let angle = step as f64 * std::f64::consts::PI / 12.0;
        let (dir_x, dir_y) = (angle.cos(), angle.sin());
        let (perp_x, perp_y) = (-dir_y, dir_x);

        let count = ((diagonal / line_spacing as f64) as i64).max(1);
        let mut lines = Vec::new();
        for i in -count..=count {
            let ox = center.x as f64 + perp_x * (i * line_spacing) as f64;
            let oy = center.y as f64 + perp_y * (i * line_spacing) as f64;
            lines.push(Polyline::new(vec![
                Point::new(
                    (ox - dir_x * diagonal) as i64,
                    (oy - dir_y * diagonal) as i64,
                ),
                Point::new(
                    (ox + dir_x * diagonal) as i64,
                    (oy + dir_y * diagonal) as i64,
                ),
            ]));
        }

        let clipped = intersection_pl(&lines, &bridge.to_polygons());
        let mut anchored_length = 0.0;
        for pl in &clipped {
            let (Some(a), Some(b)) = (pl.first_point(), pl.last_point()) else {
                continue;
            };
            let anchored = |p: Point| anchor_ex.iter().any(|ex| ex.contains_point(p))
                || anchor_test.iter().any(|ring| {
                    ring.lines()
                        .iter()
                        .any(|l| l.distance_to(p) <= SCALED_EPSILON as f64 * 20.0)
                });
            if anchored(a) && anchored(b) {
                anchored_length += pl.length();
            }
        }
        if anchored_length > 0.0
            && best.map_or(true, |(score, _)| anchored_length > score)
        {
            best = Some((anchored_length, angle));
        }
    }
    best.map(|(_, angle)| angle)
}

/// Propagate solid shells down from tops and up from bottoms.
fn discover_horizontal_shells(print: &mut Print, index: usize) {
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();
    let object = &mut print.objects[index];
    let layer_count = object.layers.len();

    for key in region_configs.keys() {
        let config = &region_configs[key];

        // forced solid layers on a cadence
        if config.solid_infill_every_layers > 0 && config.fill_density > 0.0 {
            for layer in &mut object.layers {
                if layer.id % config.solid_infill_every_layers as usize == 0 {
                    if let Some(region) = layer.region_mut(*key) {
                        for surface in &mut region.fill_surfaces.surfaces {
                            if surface.surface_type == SurfaceType::INTERNAL {
                                surface.surface_type = SurfaceType::INTERNAL_SOLID;
                            }
                        }
                    }
                }
            }
        }

        for layer_idx in 0..layer_count {
            for top in [true, false] {
                let (solid_layers, min_thickness) = if top {
                    (config.top_solid_layers, config.top_solid_min_thickness)
                } else {
                    (config.bottom_solid_layers, config.bottom_solid_min_thickness)
                };
                if solid_layers == 0 && min_thickness == 0.0 {
                    continue;
                }

                // the shell source: external surfaces of this orientation
                let solid: Polygons = object.layers[layer_idx]
                    .region(*key)
                    .map(|r| {
                        r.fill_surfaces.polygons_where(|t| {
                            if top {
                                t.is_top()
                            } else {
                                t.is_bottom()
                            }
                        })
                    })
                    .unwrap_or_default();
                if solid.is_empty() {
                    continue;
                }

                if config.fill_density == 0.0 {
                    log::warn!(
                        target: "slicer::classify",
                        "layer {}: solid shells over zero-density infill have nothing to rest on",
                        layer_idx
                    );
                }

                let mut accumulated = object.layers[layer_idx].height;
                let mut neighbor_idx = layer_idx;
                let mut remaining = solid;
                loop {
                    let deep_enough = {
                        let by_count = solid_layers > 0
                            && (layer_idx.abs_diff(neighbor_idx) as u32) < solid_layers;
                        let by_thickness = min_thickness > 0.0 && accumulated < min_thickness;
                        by_count || by_thickness
                    };
                    if !deep_enough {
                        break;
                    }
                    let next = if top {
                        neighbor_idx.checked_sub(1)
                    } else {
                        (neighbor_idx + 1 < layer_count).then_some(neighbor_idx + 1)
                    };
                    let Some(next_idx) = next else { break };
                    neighbor_idx = next_idx;
                    accumulated += object.layers[neighbor_idx].height;

                    let Some(region) = object.layers[neighbor_idx].region_mut(*key) else {
                        break;
                    };
                    // only sparse internal area can be promoted
                    let internal: Polygons = region
                        .fill_surfaces
                        .polygons_by_type(SurfaceType::INTERNAL);
                    let promote = intersection(&remaining, &internal);
                    if promote.is_empty() {
                        break;
                    }

                    let sparse_left = diff_ex(&internal, &promote);
                    let mut rebuilt: Vec<Surface> = Vec::new();
                    for surface in region.fill_surfaces.surfaces.drain(..) {
                        if surface.surface_type != SurfaceType::INTERNAL {
                            rebuilt.push(surface);
                        }
                    }
                    for ex in union_ex(&promote) {
                        rebuilt.push(Surface::new(SurfaceType::INTERNAL_SOLID, ex));
                    }
                    for ex in sparse_left {
                        rebuilt.push(Surface::new(SurfaceType::INTERNAL, ex));
                    }
                    region.fill_surfaces.surfaces = rebuilt;
                    remaining = promote;
                }
            }
        }
    }
}

/// Turn internal solid shells resting on sparse infill into bridges when
/// the void below can absorb the bridge flow.
fn bridge_over_infill(print: &mut Print, index: usize) -> Result<()> {
    let print_config = print.config.clone();
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();

    for (key, config) in &region_configs {
        if config.fill_density >= 100.0 {
            continue;
        }
        let region = PrintRegion {
            config: config.clone(),
        };
        let bridge_flow = region.flow(FlowRole::SolidInfill, 0.2, true, false, None, &print_config)?;
        let mm3_per_mm = bridge_flow.mm3_per_mm()?;
        let mm3_per_mm2 = mm3_per_mm / bridge_flow.width;
        let bridge_height = bridge_flow.height;

        // density gate: interpolate between 25% and 50% depending on how
        // weak normal solid flow would be compared to the bridge flow
        let layer_height = print.objects[index].config.layer_height;
        let normal_flow =
            region.flow(FlowRole::SolidInfill, layer_height, false, false, None, &print_config)?;
        let density_threshold = (25.0
            + 25.0 * (normal_flow.mm3_per_mm()? - mm3_per_mm) / (mm3_per_mm / 2.0 - mm3_per_mm))
            .clamp(25.0, 50.0);
        if config.fill_density > density_threshold {
            continue;
        }

        let object = &mut print.objects[index];
        let layer_count = object.layers.len();
        let mut bridged_by_layer: Vec<Polygons> = vec![Polygons::new(); layer_count];

        for layer_idx in 1..layer_count {
            let internal_solid: Polygons = match object.layers[layer_idx].region(*key) {
                Some(r) => r
                    .fill_surfaces
                    .polygons_by_type(SurfaceType::INTERNAL_SOLID),
                None => continue,
            };
            if internal_solid.is_empty() {
                continue;
            }

            // walk down until the void volume absorbs the bridge flow
            let mut to_bridge = internal_solid.clone();
            let mut excess = mm3_per_mm2;
            let bottom_z = object.layers[layer_idx].print_z - bridge_height;
            for i in (0..layer_idx).rev() {
                let lower = &object.layers[i];
                excess -= lower.height * (100.0 - config.fill_density) / 100.0;
                if lower.print_z < bottom_z && excess <= 0.0 {
                    break;
                }
                let lower_internal: Polygons = lower
                    .regions
                    .iter()
                    .flat_map(|r| r.fill_surfaces.polygons_by_type(SurfaceType::INTERNAL))
                    .collect();
                to_bridge = intersection(&to_bridge, &lower_internal);
                if to_bridge.is_empty() {
                    break;
                }
            }
            if excess > 0.0 || to_bridge.is_empty() {
                continue;
            }

            // reject slivers that cannot carry a bridge
            let min_width = bridge_flow.scaled_width() as f64 * 3.0;
            let to_bridge = offset2_ex(&to_bridge, -min_width, min_width);
            if to_bridge.is_empty() {
                continue;
            }

            let bridge_rings: Polygons = to_bridge
                .iter()
                .flat_map(|ex: &ExPolygon| ex.to_polygons())
                .collect();
            let not_to_bridge = diff_ex(&internal_solid, &bridge_rings);
            let Some(region) = object.layers[layer_idx].region_mut(*key) else {
                continue;
            };
            region
                .fill_surfaces
                .remove_where(|t| *t == SurfaceType::INTERNAL_SOLID);
            for ex in to_bridge {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL_BRIDGE, ex));
            }
            for ex in not_to_bridge {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL_SOLID, ex));
            }
            bridged_by_layer[layer_idx] = bridge_rings;
        }

        // the solid layer right above a fresh bridge compensates its sag
        for layer_idx in 1..layer_count {
            if bridged_by_layer[layer_idx - 1].is_empty() {
                continue;
            }
            let below = bridged_by_layer[layer_idx - 1].clone();
            let Some(region) = object.layers[layer_idx].region_mut(*key) else {
                continue;
            };
            let solid: Polygons = region
                .fill_surfaces
                .polygons_by_type(SurfaceType::INTERNAL_SOLID);
            if solid.is_empty() {
                continue;
            }
            let over = intersection_ex(&solid, &below);
            if over.is_empty() {
                continue;
            }
            let over_rings: Polygons = over.iter().flat_map(|ex| ex.to_polygons()).collect();
            let rest = diff_ex(&solid, &over_rings);
            region
                .fill_surfaces
                .remove_where(|t| *t == SurfaceType::INTERNAL_SOLID);
            for ex in over {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL_OVERBRIDGE, ex));
            }
            for ex in rest {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL_SOLID, ex));
            }
        }
    }
    Ok(())
}

/// With `infill_only_where_needed`, sparse infill not carrying anything
/// above becomes void.
fn clip_fill_surfaces(print: &mut Print, index: usize) {
    let object = &mut print.objects[index];
    let layer_count = object.layers.len();
    if layer_count < 2 {
        return;
    }
    // the margin anchors infill under shell boundaries
    let margin = scale(EXTERNAL_INFILL_MARGIN) as f64;

    let mut upper_needed: Polygons = Polygons::new();
    for layer_idx in (1..layer_count).rev() {
        // what the layer above needs supported: its solid surfaces
        let solid: Polygons = object.layers[layer_idx]
            .regions
            .iter()
            .flat_map(|r| {
                r.fill_surfaces
                    .polygons_where(|t| t.is_solid())
            })
            .collect();
        let mut needed = upper_needed.clone();
        needed.extend(offset(&solid, margin));
        let needed = union(&needed);

        let lower = &mut object.layers[layer_idx - 1];
        for region in &mut lower.regions {
            let internal: Polygons = region
                .fill_surfaces
                .polygons_by_type(SurfaceType::INTERNAL);
            if internal.is_empty() {
                continue;
            }
            let keep = intersection_ex(&internal, &needed);
            let void = diff_ex(&internal, &needed);
            region
                .fill_surfaces
                .remove_where(|t| *t == SurfaceType::INTERNAL);
            for ex in keep {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL, ex));
            }
            for ex in void {
                region
                    .fill_surfaces
                    .surfaces
                    .push(Surface::new(SurfaceType::INTERNAL_VOID, ex));
            }
        }

        // what survives here must itself be carried further down
        upper_needed = union(
            &[
                needed,
                object.layers[layer_idx - 1]
                    .regions
                    .iter()
                    .flat_map(|r| r.fill_surfaces.polygons_by_type(SurfaceType::INTERNAL))
                    .collect(),
            ]
            .concat(),
        );
        let lower_islands: Polygons = object.layers[layer_idx - 1]
            .lslices
            .iter()
            .flat_map(|ex| ex.to_polygons())
            .collect();
        upper_needed = intersection(&upper_needed, &lower_islands);
    }
}

/// Combine sparse infill across layers up to `infill_every_layers`, bounded
/// by the nozzle diameter.
fn combine_infill(print: &mut Print, index: usize) -> Result<()> {
    let print_config = print.config.clone();
    let region_configs: BTreeMap<RegionKey, PrintRegionConfig> = print
        .regions
        .iter()
        .map(|(k, r)| (k, r.config.clone()))
        .collect();

    for (key, config) in &region_configs {
        let every = config.infill_every_layers;
        if every <= 1 || config.fill_density == 0.0 {
            continue;
        }
        let nozzle_diameter = print_config
            .nozzle_diameter_at(config.infill_extruder.saturating_sub(1) as usize);

        let object = &mut print.objects[index];

        // partition layers into groups whose combined height fits the nozzle
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_height = 0.0;
        for (layer_idx, layer) in object.layers.iter().enumerate() {
            if !current.is_empty()
                && (current.len() as u32 >= every
                    || current_height + layer.height > nozzle_diameter)
            {
                groups.push(std::mem::take(&mut current));
                current_height = 0.0;
            }
            current.push(layer_idx);
            current_height += layer.height;
        }
        if !current.is_empty() {
            groups.push(current);
        }

        for group in groups.into_iter().filter(|g| g.len() > 1) {
            // the area every group member can spare
            let mut combinable: Option<Polygons> = None;
            for &layer_idx in &group {
                let internal: Polygons = object.layers[layer_idx]
                    .region(*key)
                    .map(|r| r.fill_surfaces.polygons_by_type(SurfaceType::INTERNAL))
                    .unwrap_or_default();
                combinable = Some(match combinable {
                    None => internal,
                    Some(prev) => intersection(&prev, &internal),
                });
            }
            let Some(combinable) = combinable else { continue };
            // keep a safety clearance from the perimeters
            let region_for_flow = PrintRegion {
                config: config.clone(),
            };
            let flow = region_for_flow.flow(
                FlowRole::Infill,
                object.layers[group[0]].height,
                false,
                false,
                None,
                &print_config,
            )?;
            let clearance = flow.scaled_width() as f64;
            let combinable: Polygons = offset2_ex(&combinable, -clearance, clearance)
                .iter()
                .flat_map(|ex| ex.to_polygons())
                .collect();
            if combinable.is_empty() {
                continue;
            }

            let top_idx = *group.last().expect("group is non-empty");
            let thickness: f64 = group.iter().map(|&i| object.layers[i].height).sum();

            for &layer_idx in &group {
                let is_top = layer_idx == top_idx;
                let Some(region) = object.layers[layer_idx].region_mut(*key) else {
                    continue;
                };
                let internal: Polygons = region
                    .fill_surfaces
                    .polygons_by_type(SurfaceType::INTERNAL);
                let carved = intersection_ex(&internal, &combinable);
                if carved.is_empty() {
                    continue;
                }
                let rest = diff_ex(&internal, &combinable);
                region
                    .fill_surfaces
                    .remove_where(|t| *t == SurfaceType::INTERNAL);
                for ex in rest {
                    region
                        .fill_surfaces
                        .surfaces
                        .push(Surface::new(SurfaceType::INTERNAL, ex));
                }
                for ex in carved {
                    if is_top {
                        let mut s = Surface::new(SurfaceType::INTERNAL, ex);
                        s.thickness_layers = group.len() as u32;
                        s.bridge_angle = None;
                        region.fill_surfaces.surfaces.push(s);
                    } else {
                        // absorbed area stays as a void so the step remains
                        // idempotent
                        region
                            .fill_surfaces
                            .surfaces
                            .push(Surface::new(SurfaceType::INTERNAL_VOID, ex));
                    }
                }
                if is_top {
                    log::debug!(
                        target: "slicer::classify",
                        "combined {} sparse layers ({}mm) at layer {}",
                        group.len(),
                        thickness,
                        layer_idx
                    );
                }
            }
        }
    }
    Ok(())
}

/// Exactly-one-position, exactly-one-density check used by tests and debug
/// assertions.
pub fn classification_is_exclusive(surface_type: &SurfaceType) -> bool {
    // the tagged representation cannot express multiple bits; verify the
    // modifier agrees with the density instead
    match surface_type.modifier {
        SurfaceModifier::None => true,
        SurfaceModifier::Bridge | SurfaceModifier::OverBridge => {
            surface_type.density == SurfaceDensity::Solid
                && surface_type.position != SurfacePosition::Perimeter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_from_mesh;
    use crate::print_object::slice_object;
    use strata_config::DynamicConfig;
    use strata_mesh::TriangleMesh;

    fn prepared_cube(edits: &[(&str, &str)]) -> Print {
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
        detect_surfaces(&mut print, 0, &executor).unwrap();
        print
    }

    #[test]
    fn test_detect_surfaces_cube() {
        let print = prepared_cube(&[("layer_height", "1"), ("first_layer_height", "1")]);
        let object = &print.objects[0];
        let first = &object.layers[0].regions[0];
        assert!(first
            .slices
            .surfaces
            .iter()
            .all(|s| s.surface_type.is_bottom()));
        let last = object.layers.last().unwrap();
        assert!(last.regions[0]
            .slices
            .surfaces
            .iter()
            .all(|s| s.surface_type.is_top()));
        let middle = &object.layers[object.layers.len() / 2].regions[0];
        assert!(middle
            .slices
            .surfaces
            .iter()
            .all(|s| s.surface_type.is_internal()));
    }

    #[test]
    fn test_fill_surfaces_contained_in_slices() {
        let mut print = prepared_cube(&[("layer_height", "1"), ("first_layer_height", "1")]);
        let executor = print.executor();
        prepare_infill(&mut print, 0, &executor).unwrap();
        for layer in &print.objects[0].layers {
            for region in &layer.regions {
                let slices = region.slices.to_polygons();
                for surface in &region.fill_surfaces.surfaces {
                    let outside = diff_ex(&surface.to_polygons(), &slices);
                    let area: f64 = outside.iter().map(|ex| ex.area()).sum();
                    assert!(
                        area < (SCALED_EPSILON * SCALED_EPSILON * 100) as f64,
                        "fill surface sticks out of the slices"
                    );
                }
            }
        }
    }

    #[test]
    fn test_classification_exclusive() {
        let mut print = prepared_cube(&[("layer_height", "0.5"), ("first_layer_height", "0.5")]);
        let executor = print.executor();
        prepare_infill(&mut print, 0, &executor).unwrap();
        for layer in &print.objects[0].layers {
            for region in &layer.regions {
                for surface in &region.fill_surfaces.surfaces {
                    assert!(classification_is_exclusive(&surface.surface_type));
                }
            }
        }
    }

    #[test]
    fn test_bottom_shell_by_min_thickness() {
        // bottom shells forced by thickness instead of layer count
        let mut print = prepared_cube(&[
            ("layer_height", "0.1"),
            ("first_layer_height", "0.1"),
            ("bottom_solid_min_thickness", "1.22"),
            ("bottom_solid_layers", "0"),
            ("top_solid_layers", "0"),
            ("fill_density", "0"),
            ("nozzle_diameter", "0.4"),
        ]);
        let executor = print.executor();
        prepare_infill(&mut print, 0, &executor).unwrap();
        let object = &print.objects[0];
        for (idx, layer) in object.layers.iter().enumerate() {
            let region = &layer.regions[0];
            let all_solid = region
                .fill_surfaces
                .surfaces
                .iter()
                .all(|s| s.surface_type.is_solid());
            if idx <= 12 {
                assert!(all_solid, "layer {idx} should be solid");
            }
            if idx > 12 && idx + 1 < object.layers.len() {
                let has_sparse = region
                    .fill_surfaces
                    .surfaces
                    .iter()
                    .any(|s| !s.surface_type.is_solid());
                assert!(has_sparse, "layer {idx} should have sparse fill");
            }
        }
    }

    #[test]
    fn test_detect_bridge_angle_rectangular_gap() {
        // a bridge across a channel anchors on both sides along X
        let bridge = ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(scale(20.0), 0),
            Point::new(scale(20.0), scale(6.0)),
            Point::new(0, scale(6.0)),
        ]));
        let left = Polygon::new(vec![
            Point::new(-scale(4.0), -scale(1.0)),
            Point::new(scale(2.0), -scale(1.0)),
            Point::new(scale(2.0), scale(7.0)),
            Point::new(-scale(4.0), scale(7.0)),
        ]);
        let right = Polygon::new(vec![
            Point::new(scale(18.0), -scale(1.0)),
            Point::new(scale(24.0), -scale(1.0)),
            Point::new(scale(24.0), scale(7.0)),
            Point::new(scale(18.0), scale(7.0)),
        ]);
        let angle = detect_bridge_angle(&bridge, &vec![left, right]).unwrap();
        // anchored spans run along X
        assert!(angle.abs() < 0.2 || (std::f64::consts::PI - angle).abs() < 0.2);
    }
}
