//! Support material: contact, interface and base layers from detected
//! overhangs.

use itertools::Itertools;
use ordered_float::OrderedFloat;

use strata_config::{FloatOrPercent, SupportMaterialPattern};
use strata_geometry::{
    diff, intersection, offset, scale, union, union_ex, Point, Polygon, Polygons,
};

use crate::error::Result;
use crate::extrusion::{ExtrusionEntity, ExtrusionLoop, ExtrusionRole};
use crate::fill::{FillGrid, FillParams, FillRectilinear, Fill, FillHoneycomb};
use crate::flow::{Flow, FlowRole};
use crate::layer::SupportLayer;
use crate::parallel::Executor;
use crate::print::Print;
use crate::print_object::support_extruders;
use crate::steps::ObjectStep;
use crate::surface::{Surface, SurfaceType};

/// How far contact area is spread beyond the overhang outline, millimeters.
const SUPPORT_MATERIAL_MARGIN: f64 = 1.5;

/// Resolved support geometry parameters.
struct SupportParams {
    contact_distance: f64,
    interface_nozzle_diameter: f64,
    first_layer_height: f64,
    max_layer_height: f64,
    flow: Flow,
    interface_flow: Flow,
    first_layer_flow: Flow,
}

impl SupportParams {
    fn new(print: &Print, index: usize) -> Result<Self> {
        let object = &print.objects[index];
        let config = &object.config;
        let extruders = support_extruders(print, index);
        let nozzle_diameter = print.config.nozzle_diameter_at(extruders[0]);
        let interface_nozzle_diameter =
            print.config.nozzle_diameter_at(*extruders.last().unwrap_or(&0));

        let width = if config.support_material_extrusion_width.value > 0.0 {
            config.support_material_extrusion_width
        } else {
            print.config.extrusion_width
        };
        let layer_height = config.layer_height;
        let flow = Flow::new_from_config_width(
            FlowRole::SupportMaterial,
            width,
            nozzle_diameter,
            layer_height,
            1.0,
            0.0,
        )?;
        let interface_flow = Flow::new_from_config_width(
            FlowRole::SupportMaterialInterface,
            width,
            interface_nozzle_diameter,
            layer_height,
            1.0,
            0.0,
        )?;
        let first_layer_height = object.first_layer_height();
        let first_layer_width = if print.config.first_layer_extrusion_width.value > 0.0 {
            print.config.first_layer_extrusion_width
        } else {
            width
        };
        let first_layer_flow = Flow::new_from_config_width(
            FlowRole::SupportMaterial,
            first_layer_width,
            nozzle_diameter,
            first_layer_height,
            1.0,
            0.0,
        )?;

        let max_object_layer_height = object
            .layers
            .iter()
            .map(|l| OrderedFloat(l.height))
            .max()
            .map(|h| h.0)
            .unwrap_or(layer_height);

        Ok(Self {
            contact_distance: config.support_material_contact_distance,
            interface_nozzle_diameter,
            first_layer_height,
            max_layer_height: max_object_layer_height.max(0.75 * nozzle_diameter),
            flow,
            interface_flow,
            first_layer_flow,
        })
    }

    /// Vertical gap between a support top and the object above it.
    fn contact_gap(&self, layer_height: f64) -> f64 {
        if self.contact_distance == 0.0 {
            // soluble interface: squish right against the object
            layer_height
        } else {
            self.interface_nozzle_diameter + self.contact_distance
        }
    }
}

/// Generate contact, interface and base support layers with toolpaths.
pub fn generate_support_material(
    print: &mut Print,
    index: usize,
    executor: &Executor,
) -> Result<()> {
    if print.objects[index].state.is_done(ObjectStep::SupportMaterial) {
        return Ok(());
    }
    print.objects[index]
        .state
        .set_started(ObjectStep::SupportMaterial);

    // a failed or cancelled run discards partial support layers and leaves
    // the step not-started
    match generate_support_material_inner(print, index, executor) {
        Ok(()) => {
            print.objects[index]
                .state
                .set_done(ObjectStep::SupportMaterial);
            Ok(())
        }
        Err(err) => {
            print.objects[index].clear_support_layers();
            print.invalidate_object_step(index, ObjectStep::SupportMaterial);
            Err(err)
        }
    }
}

fn generate_support_material_inner(
    print: &mut Print,
    index: usize,
    executor: &Executor,
) -> Result<()> {
    print.objects[index].clear_support_layers();

    if !print.objects[index].config.has_support_material() {
        return Ok(());
    }

    let params = SupportParams::new(print, index)?;
    let config = print.objects[index].config.clone();

    // 1) contact areas per object layer
    let (contact_areas, contact_zs) = detect_contact_areas(print, index, &params)?;

    // 2) top surfaces the support rests on
    let top_areas = collect_object_tops(print, index);

    // 3) the support Z ladder
    let zs = plan_support_zs(&contact_zs, &top_areas, &params, &config)?;
    if zs.is_empty() {
        return Ok(());
    }

    // 4) classify each support layer
    let layers = classify_support_layers(print, index, &zs, &contact_areas, &top_areas, &params, &config);

    // 5) pillars reshape base and interface
    let mut layers = if config.support_material_pattern == SupportMaterialPattern::Pillars {
        apply_pillars(layers, &config)
    } else {
        layers
    };

    // drop layers that ended up with no geometry at all, except the raft
    if config.raft_layers == 0 {
        layers.retain(|l| {
            !(l.contact.is_empty() && l.interface.is_empty() && l.base.is_empty())
        });
    }

    // 6) toolpaths, layer-parallel
    let brim_clip: Polygons = if print.config.brim_width > 0.0 {
        let islands: Polygons = print.objects[index]
            .layers
            .first()
            .map(|l| l.lslices.iter().map(|ex| ex.contour.clone()).collect())
            .unwrap_or_default();
        offset(&islands, scale(print.config.brim_width) as f64)
    } else {
        Polygons::new()
    };

    let angle = config.support_material_angle.to_radians();
    let interface_spacing = config.support_material_interface_spacing;
    let support_spacing = config.support_material_spacing;
    let contact_loops = config.support_material_contact_loops;
    let pattern = config.support_material_pattern;
    let params_ref = &params;
    let brim_ref = &brim_clip;

    let built: Vec<Result<SupportLayer>> = executor.map(
        layers.into_iter().enumerate().collect(),
        move |(i, layer)| {
            build_support_layer(
                i,
                layer,
                params_ref,
                angle,
                interface_spacing,
                support_spacing,
                contact_loops,
                pattern,
                brim_ref,
            )
        },
    )?;

    let mut support_layers = Vec::with_capacity(built.len());
    for layer in built {
        support_layers.push(layer?);
    }
    print.objects[index].support_layers = support_layers;
    Ok(())
}

/// Overhang and contact detection over the object layers.
fn detect_contact_areas(
    print: &Print,
    index: usize,
    params: &SupportParams,
) -> Result<(Vec<(f64, Polygons)>, Vec<f64>)> {
    let object = &print.objects[index];
    let config = &object.config;
    let threshold = config.support_material_threshold;
    let buildplate_only = config.support_material_buildplate_only;

    let mut contact_areas: Vec<(f64, Polygons)> = Vec::new();
    let mut contact_zs: Vec<f64> = Vec::new();

    // accumulated object shadow for the build-plate-only mask
    let mut shadow: Polygons = Polygons::new();

    for layer_idx in 0..object.layers.len() {
        let layer = &object.layers[layer_idx];
        if layer_idx == 0 {
            if config.raft_layers == 0 {
                shadow = layer
                    .lslices
                    .iter()
                    .flat_map(|ex| ex.to_polygons())
                    .collect();
                continue;
            }
            // with a raft, even the first layer needs contact below
        }

        let slices: Polygons = layer
            .lslices
            .iter()
            .flat_map(|ex| ex.to_polygons())
            .collect();

        let mut overhang: Polygons = if layer_idx == 0 {
            slices.clone()
        } else {
            let lower = &object.layers[layer_idx - 1];
            let lower_slices: Polygons = lower
                .lslices
                .iter()
                .flat_map(|ex| ex.to_polygons())
                .collect();
            // the slope threshold turns into a horizontal stand-off
            let d = slope_offset(threshold, layer.height, &params.flow);
            diff(&slices, &offset(&lower_slices, d))
        };

        // bridges look after themselves
        if config.dont_support_bridges && layer_idx > 0 {
            let mut bridges: Polygons = Polygons::new();
            for region in &layer.regions {
                bridges.extend(
                    region
                        .fill_surfaces
                        .polygons_where(|t| t.is_bridge()),
                );
                for edge in &region.unsupported_bridge_edges {
                    bridges.extend(offset(
                        &[Polygon::new(edge.points.clone())],
                        params.flow.scaled_width() as f64,
                    ));
                }
            }
            if !bridges.is_empty() {
                overhang = diff(&overhang, &bridges);
            }
        }

        if !overhang.is_empty() {
            // spread the contact in four increments up to the margin
            let mut contact = overhang.clone();
            let step = scale(SUPPORT_MATERIAL_MARGIN) as f64 / 4.0;
            for _ in 0..4 {
                let mut grown = offset(&contact, step);
                // stay off the object itself
                grown = diff(&grown, &slices);
                if buildplate_only {
                    grown = diff(&grown, &shadow);
                }
                contact = union(&[contact, grown].concat());
            }
            // the contact top sits below the overhang by the configured gap
            let contact_z = (layer.print_z - params.contact_gap(layer.height))
                .max(params.first_layer_height * 0.5);
            contact_areas.push((contact_z, contact));
            contact_zs.push(contact_z);
        }

        shadow = union(&[shadow, slices].concat());
    }

    contact_zs.sort_by_key(|z| OrderedFloat(*z));
    contact_zs.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    Ok((contact_areas, contact_zs))
}

/// Horizontal stand-off distance equivalent to the slope threshold.
fn slope_offset(threshold: FloatOrPercent, layer_height: f64, flow: &Flow) -> f64 {
    if threshold.percent {
        // percent thresholds scale with the external perimeter width
        flow.scaled_width() as f64 * threshold.value / 100.0
    } else if threshold.value > 0.0 {
        let theta = threshold.value.to_radians();
        scale(layer_height * theta.cos() / theta.sin().max(1e-6)) as f64
    } else {
        flow.scaled_width() as f64 / 2.0
    }
}

/// Top surfaces of the object: `(top z, area)`.
fn collect_object_tops(print: &Print, index: usize) -> Vec<(f64, Polygons)> {
    let object = &print.objects[index];
    let mut tops = Vec::new();
    for layer in &object.layers {
        let mut area = Polygons::new();
        for region in &layer.regions {
            area.extend(region.slices.polygons_where(|t| t.is_top()));
        }
        if !area.is_empty() {
            tops.push((layer.print_z, area));
        }
    }
    tops
}

/// The sorted ladder of support print_z values.
fn plan_support_zs(
    contact_zs: &[f64],
    tops: &[(f64, Polygons)],
    params: &SupportParams,
    config: &strata_config::PrintObjectConfig,
) -> Result<Vec<f64>> {
    let mut zs: Vec<f64> = contact_zs.to_vec();
    for (top_z, _) in tops {
        zs.push(*top_z);
        zs.push(*top_z + params.contact_gap(params.max_layer_height));
    }
    zs.retain(|z| *z >= params.first_layer_height - 1e-9);
    zs.push(params.first_layer_height);
    let mut zs: Vec<f64> = zs
        .into_iter()
        .sorted_by_key(|z| OrderedFloat(*z))
        .dedup_by(|a, b| (a - b).abs() < 1e-9)
        .collect();

    // cap everything below the first contact so no support pokes into the
    // object top
    if let Some(&max_z) = contact_zs.last() {
        zs.retain(|z| *z <= max_z + 1e-9);
    } else if config.raft_layers == 0 {
        return Ok(Vec::new());
    }

    // subdivide gaps so no support layer exceeds the allowed height; the
    // plate-to-first-layer gap is pinned and never subdivided
    let mut out: Vec<f64> = Vec::new();
    let mut last = 0.0;
    for &z in &zs {
        let gap = z - last;
        if last > 0.0 && gap > params.max_layer_height + 1e-9 {
            let steps = (gap / params.max_layer_height).ceil() as usize;
            for s in 1..steps {
                out.push(last + gap * s as f64 / steps as f64);
            }
        }
        out.push(z);
        last = z;
    }

    // a raft replaces the bottom ladder: first layer plus evenly spaced
    // steps up to the first contact
    if config.raft_layers > 0 {
        let first_contact = contact_zs
            .first()
            .copied()
            .unwrap_or(params.first_layer_height);
        let raft_count = config.raft_layers as usize;
        let mut raft: Vec<f64> = vec![params.first_layer_height];
        if raft_count > 1 && first_contact > params.first_layer_height {
            let step = (first_contact - params.first_layer_height) / (raft_count - 1) as f64;
            for i in 1..raft_count {
                raft.push(params.first_layer_height + step * i as f64);
            }
        }
        return Ok(raft);
    }

    Ok(out)
}

/// Intermediate per-layer classification.
struct ClassifiedLayer {
    print_z: f64,
    height: f64,
    contact: Polygons,
    interface: Polygons,
    base: Polygons,
}

fn classify_support_layers(
    print: &Print,
    index: usize,
    zs: &[f64],
    contact_areas: &[(f64, Polygons)],
    tops: &[(f64, Polygons)],
    params: &SupportParams,
    config: &strata_config::PrintObjectConfig,
) -> Vec<ClassifiedLayer> {
    let object = &print.objects[index];
    let interface_layers = config.support_material_interface_layers as usize;

    // object slices at a given z, for trimming support
    let object_at = |z: f64| -> Polygons {
        object
            .layers
            .iter()
            .find(|l| z > l.print_z - l.height - 1e-9 && z <= l.print_z + 1e-9)
            .map(|l| l.lslices.iter().flat_map(|ex| ex.to_polygons()).collect())
            .unwrap_or_default()
    };

    let contact_at = |z: f64| -> Polygons {
        contact_areas
            .iter()
            .filter(|(cz, _)| (cz - z).abs() < 1e-6)
            .flat_map(|(_, a)| a.clone())
            .collect()
    };

    let mut layers: Vec<ClassifiedLayer> = Vec::with_capacity(zs.len());
    let mut last_z = 0.0;
    for &z in zs {
        layers.push(ClassifiedLayer {
            print_z: z,
            height: z - last_z,
            contact: contact_at(z),
            interface: Polygons::new(),
            base: Polygons::new(),
        });
        last_z = z;
    }

    // propagate interface and base downward from every contact
    for i in (0..layers.len()).rev() {
        // interface: the first `interface_layers` layers below a contact
        let mut interface = Polygons::new();
        for j in (i + 1)..layers.len().min(i + 1 + interface_layers) {
            interface.extend(layers[j].contact.clone());
            interface.extend(layers[j].interface.clone());
        }
        if !interface.is_empty() {
            let clip = object_at(layers[i].print_z);
            let own_contact = layers[i].contact.clone();
            layers[i].interface = diff(&union(&interface), &[clip, own_contact].concat());
        }

        // base: everything the layers above carry, minus what this layer is
        // already doing
        let mut base = Polygons::new();
        if i + 1 < layers.len() {
            base.extend(layers[i + 1].base.clone());
            base.extend(layers[i + 1].interface.clone());
            base.extend(layers[i + 1].contact.clone());
        }
        if !base.is_empty() {
            let clip = object_at(layers[i].print_z);
            let covered = [layers[i].contact.clone(), layers[i].interface.clone(), clip].concat();
            layers[i].base = diff(&union(&base), &covered);
        }

        // support resting on an object top becomes a bottom interface
        for (top_z, top_area) in tops {
            let gap = params.contact_gap(layers[i].height);
            if (layers[i].print_z - (top_z + gap)).abs() < params.max_layer_height {
                let resting = intersection(&layers[i].base, top_area);
                if !resting.is_empty() {
                    // discard slivers
                    let min_area = (params.flow.scaled_width() * params.flow.scaled_width()) as f64;
                    let resting: Polygons = resting
                        .into_iter()
                        .filter(|p| p.area() > min_area)
                        .collect();
                    layers[i].base = diff(&layers[i].base, &resting);
                    layers[i].interface =
                        union(&[layers[i].interface.clone(), resting].concat());
                }
            }
        }
    }

    layers
}

/// Intersect base and interface with a regular pillar grid; add capitals
/// under contacts and drop uncovered contact straight to the plate.
fn apply_pillars(
    mut layers: Vec<ClassifiedLayer>,
    config: &strata_config::PrintObjectConfig,
) -> Vec<ClassifiedLayer> {
    let size = scale(config.support_material_pillar_size);
    let spacing = scale(config.support_material_pillar_spacing.max(
        config.support_material_pillar_size,
    ));

    // the grid covers everything the support will ever occupy
    let mut bbox = strata_geometry::BoundingBox::default();
    for layer in &layers {
        for p in layer.base.iter().chain(&layer.interface).chain(&layer.contact) {
            bbox.merge(&p.bounding_box());
        }
    }
    if !bbox.defined {
        return layers;
    }

    let mut grid: Polygons = Polygons::new();
    let mut x = bbox.min.x - spacing;
    while x <= bbox.max.x + spacing {
        let mut y = bbox.min.y - spacing;
        while y <= bbox.max.y + spacing {
            grid.push(Polygon::new(vec![
                Point::new(x, y),
                Point::new(x + size, y),
                Point::new(x + size, y + size),
                Point::new(x, y + size),
            ]));
            y += spacing;
        }
        x += spacing;
    }

    let mut uncovered_carry: Polygons = Polygons::new();
    for i in (0..layers.len()).rev() {
        let pillars_base = intersection(&layers[i].base, &grid);
        let pillars_interface = intersection(&layers[i].interface, &grid);

        // capitals spread from pillars towards the contact above
        let mut capitals: Polygons = Polygons::new();
        if !layers[i].contact.is_empty() {
            let caps = intersection(&offset(&grid, (spacing - size) as f64 / 2.0), &layers[i].contact);
            capitals.extend(caps);
        }

        // contact not covered by a capital keeps its own support to the
        // plate
        let covered = union(&[pillars_base.clone(), capitals.clone()].concat());
        let uncovered = diff(&layers[i].contact, &offset(&covered, size as f64));
        uncovered_carry = union(&[uncovered_carry, uncovered].concat());

        layers[i].base = union(&[pillars_base, capitals, uncovered_carry.clone()].concat());
        layers[i].interface = pillars_interface;
    }
    layers
}

/// Build one support layer's toolpaths.
#[allow(clippy::too_many_arguments)]
fn build_support_layer(
    layer_idx: usize,
    layer: ClassifiedLayer,
    params: &SupportParams,
    base_angle: f64,
    interface_spacing: f64,
    support_spacing: f64,
    contact_loops: u32,
    pattern: SupportMaterialPattern,
    brim_clip: &Polygons,
) -> Result<SupportLayer> {
    let mut out = SupportLayer::new(layer_idx, layer.print_z, layer.height);
    let flow = if layer_idx == 0 {
        params.first_layer_flow
    } else {
        params.flow
    };
    let mm3 = flow.mm3_per_mm()?;
    let interface_mm3 = params.interface_flow.mm3_per_mm()?;
    let spacing_scaled = flow.scaled_spacing()? as f64;

    // contact loops with snap-off teeth
    if !layer.contact.is_empty() && contact_loops > 0 {
        let mut boundary = layer.contact.clone();
        for _ in 0..contact_loops {
            let rings = offset(&boundary, -(flow.scaled_width() as f64) / 2.0);
            if rings.is_empty() {
                break;
            }
            for ring in &rings {
                // teeth: subtract small circles along the loop so the
                // contact snaps off cleanly
                let teeth = teeth_circles(ring, flow.scaled_width());
                let pieces = strata_geometry::diff_pl(&[ring.split_at_first_point()], &teeth);
                for pl in pieces {
                    out.support_interface_fills.append(ExtrusionEntity::Path(
                        crate::extrusion::ExtrusionPath::new(
                            pl,
                            ExtrusionRole::SupportMaterialInterface,
                            interface_mm3,
                            params.interface_flow.width,
                            params.interface_flow.height,
                        ),
                    ));
                }
            }
            boundary = offset(&boundary, -(flow.scaled_width() as f64));
        }
    }

    // interface: rectilinear, direction alternating per layer
    if !layer.interface.is_empty() {
        let density = if interface_spacing <= 0.0 {
            1.0
        } else {
            (params.interface_flow.spacing()? / interface_spacing).min(1.0)
        };
        let filler = FillRectilinear { aligned: true };
        let fill_params = FillParams {
            density,
            dont_adjust: true,
            layer_id: None,
            angle: base_angle
                + std::f64::consts::FRAC_PI_2 * (layer_idx % 2) as f64,
            spacing: params.interface_flow.spacing()?,
            bounding_box: None,
        };
        for ex in union_ex(&layer.interface) {
            let surface = Surface::new(SurfaceType::INTERNAL, ex);
            let paths = filler.fill_surface(&surface, &fill_params);
            out.support_interface_fills.append_paths(
                paths,
                ExtrusionRole::SupportMaterialInterface,
                interface_mm3,
                params.interface_flow.width,
                params.interface_flow.height,
            );
        }
    }

    // base: the configured pattern, denser and rimmed on the first layer
    if !layer.base.is_empty() {
        let mut base = layer.base.clone();
        if layer_idx == 0 && !brim_clip.is_empty() {
            // supports get their own brim; keep out of the object's
            base = diff(&base, brim_clip);
        }

        let density = if layer_idx == 0 {
            0.5
        } else if support_spacing <= 0.0 {
            1.0
        } else {
            (flow.spacing()? / support_spacing).min(1.0)
        };

        if layer_idx == 0 {
            // a perimeter keeps the loose first-layer infill together
            for ring in offset(&base, -(flow.scaled_width() as f64) / 2.0) {
                out.support_fills.append(ExtrusionEntity::Loop(ExtrusionLoop::new(
                    ring,
                    ExtrusionRole::SupportMaterial,
                    mm3,
                    flow.width,
                    flow.height,
                )));
            }
        } else {
            // shrink inward so the infill does not bulge past the island
            base = offset(&base, -spacing_scaled);
        }

        let filler: Box<dyn Fill> = match pattern {
            SupportMaterialPattern::Honeycomb => Box::new(FillHoneycomb),
            SupportMaterialPattern::RectilinearGrid => Box::new(FillGrid),
            _ => Box::new(FillRectilinear { aligned: true }),
        };
        let fill_params = FillParams {
            density,
            dont_adjust: true,
            layer_id: Some(layer_idx),
            angle: base_angle,
            spacing: flow.spacing()?,
            bounding_box: None,
        };
        for ex in union_ex(&base) {
            let surface = Surface::new(SurfaceType::INTERNAL, ex);
            let paths = filler.fill_surface(&surface, &fill_params);
            out.support_fills.append_paths(
                paths,
                ExtrusionRole::SupportMaterial,
                mm3,
                flow.width,
                flow.height,
            );
        }
    }

    let mut islands: Polygons = layer.contact;
    islands.extend(layer.interface);
    islands.extend(layer.base);
    out.support_islands = union_ex(&islands);
    Ok(out)
}

/// Small circles spaced along a ring, used to cut snap-off teeth into
/// contact loops.
fn teeth_circles(ring: &Polygon, width: i64) -> Polygons {
    let circumference = ring.length();
    let pitch = (width * 20) as f64;
    let count = (circumference / pitch).floor() as usize;
    if count < 2 {
        return Polygons::new();
    }
    let mut circles = Polygons::new();
    let step = circumference / count as f64;
    let mut travelled = 0.0;
    let mut next_at = step / 2.0;
    let points = &ring.points;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let seg = a.distance_to(b);
        while next_at <= travelled + seg && seg > 0.0 {
            let t = (next_at - travelled) / seg;
            let cx = a.x + ((b.x - a.x) as f64 * t) as i64;
            let cy = a.y + ((b.y - a.y) as f64 * t) as i64;
            let r = width as f64;
            let mut circle = Vec::with_capacity(8);
            for k in 0..8 {
                let ang = k as f64 / 8.0 * std::f64::consts::TAU;
                circle.push(Point::new(
                    cx + (r * ang.cos()) as i64,
                    cy + (r * ang.sin()) as i64,
                ));
            }
            circles.push(Polygon::new(circle));
            next_at += step;
        }
        travelled += seg;
    }
    circles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_from_mesh;
    use crate::print_object::slice_object;
    use strata_config::DynamicConfig;
    use strata_mesh::TriangleMesh;

    fn print_with(mesh: TriangleMesh, edits: &[(&str, &str)]) -> Print {
        let mut config = DynamicConfig::new();
        for (k, v) in edits {
            config.set_deserialize(k, v).unwrap();
        }
        let mut print = Print::new();
        print.apply_config(config).unwrap();
        print.set_model(model_from_mesh(mesh));
        let executor = print.executor();
        slice_object(&mut print, 0).unwrap();
        crate::perimeter::make_object_perimeters(&mut print, 0, &executor).unwrap();
        crate::classify::prepare_infill(&mut print, 0, &executor).unwrap();
        generate_support_material(&mut print, 0, &executor).unwrap();
        print
    }

    /// A 20mm cube on four 2mm legs: the deck at z=2 overhangs.
    fn table_mesh() -> TriangleMesh {
        let mut mesh = TriangleMesh::make_cube(20.0, 20.0, 18.0);
        mesh.translate(0.0, 0.0, 2.0);
        for (x, y) in [(0.0, 0.0), (18.0, 0.0), (0.0, 18.0), (18.0, 0.0)] {
            let mut leg = TriangleMesh::make_cube(2.0, 2.0, 2.0);
            leg.translate(x as f32, y as f32, 0.0);
            mesh.merge(&leg);
        }
        mesh
    }

    #[test]
    fn test_no_support_without_option() {
        let print = print_with(TriangleMesh::make_cube(10.0, 10.0, 10.0), &[]);
        assert_eq!(print.objects[0].support_layer_count(), 0);
    }

    #[test]
    fn test_support_raft_layer_count() {
        // a raft replaces the support ladder below the object
        let print = print_with(
            TriangleMesh::make_cube(20.0, 20.0, 20.0),
            &[
                ("support_material", "1"),
                ("raft_layers", "3"),
                ("layer_height", "0.4"),
                ("first_layer_height", "0.4"),
                ("nozzle_diameter", "0.5"),
            ],
        );
        assert_eq!(print.objects[0].support_layer_count(), 3);
    }

    #[test]
    fn test_overhang_gets_support() {
        let print = print_with(
            table_mesh(),
            &[
                ("support_material", "1"),
                ("layer_height", "0.4"),
                ("first_layer_height", "0.4"),
                ("nozzle_diameter", "0.5"),
            ],
        );
        let object = &print.objects[0];
        assert!(object.support_layer_count() > 0);
        // support tops out below the deck at z=2
        let top = object
            .support_layers
            .iter()
            .map(|l| OrderedFloat(l.print_z))
            .max()
            .unwrap()
            .0;
        assert!(top < 2.0);
        // every support layer carries some extrusion
        assert!(object
            .support_layers
            .iter()
            .any(|l| !l.support_fills.is_empty() || !l.support_interface_fills.is_empty()));
    }

    #[test]
    fn test_plan_support_zs_gap_and_first_layer() {
        // one contact at 1.9 above a top at 1.1: the ladder has no gap
        // wider than the nozzle allows and exactly one layer at the first
        // layer height
        let flow = Flow {
            width: 0.4,
            height: 0.2,
            nozzle_diameter: 0.4,
            spacing_ratio: 1.0,
            bridge: false,
            role: FlowRole::SupportMaterial,
        };
        let params = SupportParams {
            contact_distance: 0.2,
            interface_nozzle_diameter: 0.4,
            first_layer_height: 0.4,
            max_layer_height: 0.3,
            flow,
            interface_flow: flow,
            first_layer_flow: flow,
        };
        let config = strata_config::PrintObjectConfig::default();
        let tops = vec![(1.1, vec![Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ])])];
        let zs = plan_support_zs(&[1.9], &tops, &params, &config).unwrap();
        assert!(!zs.is_empty());
        let mut last = 0.0;
        let mut at_first_layer = 0;
        for &z in &zs {
            if last > 0.0 {
                assert!(z - last <= 0.4 + 1e-6, "gap {} too wide", z - last);
            }
            if (z - 0.4).abs() < 1e-9 {
                at_first_layer += 1;
            }
            last = z;
        }
        assert_eq!(at_first_layer, 1);
        assert!((zs.last().unwrap() - 1.9).abs() < 1e-9);
    }

    #[test]
    fn test_support_z_ladder_monotonic_and_bounded() {
        let print = print_with(
            table_mesh(),
            &[
                ("support_material", "1"),
                ("layer_height", "0.3"),
                ("first_layer_height", "0.4"),
                ("nozzle_diameter", "0.5"),
            ],
        );
        let object = &print.objects[0];
        let mut last = 0.0;
        for layer in &object.support_layers {
            assert!(layer.print_z > last);
            // no gap exceeds the nozzle-derived cap
            assert!(layer.print_z - last <= 0.5 + 1e-6 || last == 0.0);
            last = layer.print_z;
        }
        // exactly one layer lands at the first layer height
        let at_first = object
            .support_layers
            .iter()
            .filter(|l| (l.print_z - 0.4).abs() < 1e-6)
            .count();
        assert_eq!(at_first, 1);
    }
}
