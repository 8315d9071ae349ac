//! The print: root of the pipeline state.

use slotmap::SlotMap;

use strata_config::{
    DynamicConfig, FloatOrPercent, PrintConfig, PrintObjectConfig, PrintRegionConfig,
};
use strata_geometry::{
    chained_path_from, diff_pl, intersection, offset, offset2, scale, union, Line, Point, Polygon,
    Polygons, Polyline,
};

use crate::error::{Result, SlicerError};
use crate::extrusion::{ExtrusionEntity, ExtrusionEntityCollection, ExtrusionLoop, ExtrusionRole};
use crate::fill::{make_fill, FillParams};
use crate::flow::{Flow, FlowRole};
use crate::model::{Model, ModelVolume};
use crate::parallel::{CancellationToken, Executor};
use crate::print_object::PrintObject;
use crate::steps::{ObjectStep, PrintState, PrintStep};
use crate::surface::{Surface, SurfaceType};

slotmap::new_key_type! {
    /// Stable key of a print region. Keys are never reused or compacted, so
    /// volume-to-region mappings survive region deletion.
    pub struct RegionKey;
}

/// A group of volumes sharing one effective region configuration.
#[derive(Debug, Clone)]
pub struct PrintRegion {
    /// The region's resolved configuration; identity of the region.
    pub config: PrintRegionConfig,
}

impl PrintRegion {
    /// Resolve the extrusion flow for a role within this region.
    ///
    /// `width` overrides the configured width when given. Width resolution
    /// chains through the fallback keys: the role-specific width, then the
    /// default `extrusion_width`, then the automatic nozzle-based value.
    pub fn flow(
        &self,
        role: FlowRole,
        layer_height: f64,
        bridge: bool,
        first_layer: bool,
        width: Option<f64>,
        print_config: &PrintConfig,
    ) -> Result<Flow> {
        let mut config_width = match width {
            Some(w) => FloatOrPercent::absolute(w),
            None => {
                if first_layer && print_config.first_layer_extrusion_width.value > 0.0 {
                    print_config.first_layer_extrusion_width
                } else {
                    match role {
                        FlowRole::ExternalPerimeter => self.config.external_perimeter_extrusion_width,
                        FlowRole::Perimeter => self.config.perimeter_extrusion_width,
                        FlowRole::Infill => self.config.infill_extrusion_width,
                        FlowRole::SolidInfill => self.config.solid_infill_extrusion_width,
                        FlowRole::TopSolidInfill => self.config.top_infill_extrusion_width,
                        FlowRole::SupportMaterial | FlowRole::SupportMaterialInterface => {
                            self.config.perimeter_extrusion_width
                        }
                    }
                }
            }
        };
        if config_width.value == 0.0 {
            config_width = print_config.extrusion_width;
        }

        let extruder = match role {
            FlowRole::Perimeter | FlowRole::ExternalPerimeter => self.config.perimeter_extruder,
            FlowRole::Infill => self.config.infill_extruder,
            FlowRole::SolidInfill | FlowRole::TopSolidInfill => self.config.solid_infill_extruder,
            FlowRole::SupportMaterial | FlowRole::SupportMaterialInterface => {
                self.config.perimeter_extruder
            }
        };
        let nozzle_diameter = print_config.nozzle_diameter_at(extruder.saturating_sub(1) as usize);

        Flow::new_from_config_width(
            role,
            config_width,
            nozzle_diameter,
            layer_height,
            1.0,
            if bridge {
                self.config.bridge_flow_ratio
            } else {
                0.0
            },
        )
    }
}

/// The root object: model, objects, regions and print-level state.
#[derive(Debug, Default)]
pub struct Print {
    /// Print-wide configuration.
    pub config: PrintConfig,
    /// Option defaults applied to new objects.
    pub default_object_config: DynamicConfig,
    /// Option defaults applied to new regions.
    pub default_region_config: DynamicConfig,
    /// The loaded model the objects were built from.
    pub model: Model,
    /// The printable objects.
    pub objects: Vec<PrintObject>,
    /// Regions in a tombstoning slot map.
    pub regions: SlotMap<RegionKey, PrintRegion>,
    /// Skirt loops, outermost first.
    pub skirt: ExtrusionEntityCollection,
    /// Brim loops and connections.
    pub brim: ExtrusionEntityCollection,
    /// First-layer brim footprint, kept so supports can avoid it.
    pub brim_polygons: Polygons,
    /// Print-level step state.
    pub state: PrintState<PrintStep>,
    /// Placeholder variables handed to the G-code backend.
    pub placeholders: std::collections::BTreeMap<String, String>,
    token: CancellationToken,
}

impl Print {
    /// An empty print.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an external cancellation token.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.token = token;
    }

    /// The bounded executor steps run on.
    pub fn executor(&self) -> Executor {
        Executor::new(self.config.threads as usize, self.token.clone())
    }

    /// Replace the model, rebuilding every object and region.
    pub fn set_model(&mut self, model: Model) {
        self.clear_objects();
        self.model = model;
        for idx in 0..self.model.objects.len() {
            self.add_model_object(idx);
        }
    }

    /// Drop all objects and regions; invalidates everything.
    pub fn clear_objects(&mut self) {
        // layer regions die with their objects, so regions can go last
        self.objects.clear();
        self.regions.clear();
        self.invalidate_step(PrintStep::Skirt);
        self.invalidate_step(PrintStep::Brim);
    }

    /// The effective region config of a model volume: region defaults, the
    /// volume's material overrides, then the volume's own overrides.
    fn region_config_from_volume(&self, volume: &ModelVolume) -> PrintRegionConfig {
        let mut config = PrintRegionConfig::default();
        config.apply_dynamic(&self.default_region_config);
        if let Some(material_id) = &volume.material_id {
            if let Some(material) = self.model.materials.get(material_id) {
                let mut normalized = material.config.clone();
                normalized.normalize();
                config.apply_dynamic(&normalized);
            }
        }
        let mut volume_config = volume.config.clone();
        volume_config.normalize();
        config.apply_dynamic(&volume_config);
        config
    }

    /// The effective object config of a model object.
    fn object_config_from_model(&self, idx: usize) -> PrintObjectConfig {
        let mut config = PrintObjectConfig::default();
        config.apply_dynamic(&self.default_object_config);
        let mut model_config = self.model.objects[idx].config.clone();
        model_config.normalize();
        config.apply_dynamic(&model_config);
        config
    }

    /// Build a print object for one model object, deduplicating regions by
    /// config equality.
    fn add_model_object(&mut self, idx: usize) {
        let object_config = self.object_config_from_model(idx);
        let mut object = PrintObject::new(idx, &self.model.objects[idx], object_config);
        object.id = self.objects.len();

        for (volume_id, volume) in self.model.objects[idx].volumes.iter().enumerate() {
            let config = self.region_config_from_volume(volume);
            let region_key = self
                .regions
                .iter()
                .find(|(_, region)| region.config == config)
                .map(|(key, _)| key)
                .unwrap_or_else(|| self.regions.insert(PrintRegion { config }));
            object
                .region_volumes
                .entry(region_key)
                .or_default()
                .push(volume_id);
        }

        self.objects.push(object);
        self.invalidate_step(PrintStep::Skirt);
        self.invalidate_step(PrintStep::Brim);
    }

    /// Apply a user configuration; returns true when any step was
    /// invalidated.
    pub fn apply_config(&mut self, mut config: DynamicConfig) -> Result<bool> {
        config.normalize();

        let mut invalidated = self.invalidate_print_state_by_config(&config);

        // per-object effective configs
        self.default_object_config.apply(&config, true)?;
        for object_index in 0..self.objects.len() {
            let model_index = self.objects[object_index].model_index;
            let new_config = self.object_config_from_model(model_index);
            if self.invalidate_object_state_by_config(object_index, new_config) {
                invalidated = true;
            }
        }

        // per-region effective configs; a volume whose effective config no
        // longer matches its region forces a full region rebuild
        self.default_region_config.apply(&config, true)?;
        let mut rearrange = false;
        let mut region_updates: Vec<(RegionKey, PrintRegionConfig)> = Vec::new();
        'regions: for (key, _) in self.regions.iter() {
            let mut configs_here: Vec<PrintRegionConfig> = Vec::new();
            for object in &self.objects {
                for &volume_id in object.region_volumes.get(&key).into_iter().flatten() {
                    let volume = &self.model.objects[object.model_index].volumes[volume_id];
                    let new_config = self.region_config_from_volume(volume);
                    if configs_here.iter().any(|c| *c != new_config) {
                        rearrange = true;
                        break 'regions;
                    }
                    configs_here.push(new_config);
                }
            }
            if let Some(new_config) = configs_here.into_iter().next() {
                region_updates.push((key, new_config));
            }
        }

        // a volume's new config may also collide with a *different* region
        if !rearrange {
            for i in 0..region_updates.len() {
                for j in 0..region_updates.len() {
                    if i != j && region_updates[i].1 == region_updates[j].1 {
                        rearrange = true;
                    }
                }
            }
        }

        if rearrange {
            let model = std::mem::take(&mut self.model);
            self.set_model(model);
            return Ok(true);
        }

        for (key, new_config) in region_updates {
            if self.invalidate_region_state_by_config(key, new_config) {
                invalidated = true;
            }
        }

        Ok(invalidated)
    }

    /// Key-driven invalidation of print-level state.
    fn invalidate_print_state_by_config(&mut self, config: &DynamicConfig) -> bool {
        let mut new_config = self.config.clone();
        new_config.apply_dynamic(config);
        let diff = self.config.diff_keys(&new_config);

        let mut steps = Vec::new();
        let mut osteps = Vec::new();
        let mut all = false;
        for key in &diff {
            match *key {
                "skirts" | "skirt_height" | "skirt_distance" | "min_skirt_length" => {
                    steps.push(PrintStep::Skirt);
                }
                "brim_width" => {
                    steps.push(PrintStep::Skirt);
                    steps.push(PrintStep::Brim);
                    osteps.push(ObjectStep::SupportMaterial);
                }
                "interior_brim_width" | "brim_connections_width" | "brim_ears"
                | "brim_ears_max_angle" => {
                    steps.push(PrintStep::Skirt);
                    steps.push(PrintStep::Brim);
                }
                "nozzle_diameter" => osteps.push(ObjectStep::Layers),
                "z_steps_per_mm" => osteps.push(ObjectStep::Slice),
                "first_layer_extrusion_width" => {
                    osteps.push(ObjectStep::Perimeters);
                    osteps.push(ObjectStep::Infill);
                    osteps.push(ObjectStep::SupportMaterial);
                    steps.push(PrintStep::Skirt);
                    steps.push(PrintStep::Brim);
                }
                // only affect G-code export or scheduling
                "complete_objects" | "duplicate_distance" | "extruder_clearance_height"
                | "extruder_clearance_radius" | "retract_layer_change" | "spiral_vase"
                | "threads" => {}
                _ => {
                    all = true;
                    break;
                }
            }
        }

        self.config = new_config;

        let mut invalidated = false;
        if all && !diff.is_empty() {
            invalidated |= self.invalidate_all_steps();
            for idx in 0..self.objects.len() {
                invalidated |= self.invalidate_object_all_steps(idx);
            }
        } else {
            for step in steps {
                invalidated |= self.invalidate_step(step);
            }
            for ostep in osteps {
                for idx in 0..self.objects.len() {
                    invalidated |= self.invalidate_object_step(idx, ostep);
                }
            }
        }
        invalidated
    }

    /// Key-driven invalidation of one object's state.
    fn invalidate_object_state_by_config(
        &mut self,
        object_index: usize,
        new_config: PrintObjectConfig,
    ) -> bool {
        let diff = self.objects[object_index].config.diff_keys(&new_config);

        let mut steps = Vec::new();
        let mut all = false;
        for key in &diff {
            match *key {
                "layer_height" | "first_layer_height" | "adaptive_slicing"
                | "adaptive_slicing_quality" | "match_horizontal_surfaces" | "regions_overlap" => {
                    steps.push(ObjectStep::Layers);
                }
                "xy_size_compensation" | "raft_layers" => steps.push(ObjectStep::Slice),
                "support_material_contact_distance" => {
                    steps.push(ObjectStep::Slice);
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::SupportMaterial);
                }
                "support_material" => {
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::SupportMaterial);
                }
                "support_material_angle"
                | "support_material_buildplate_only"
                | "support_material_contact_loops"
                | "support_material_enforce_layers"
                | "support_material_extruder"
                | "support_material_extrusion_width"
                | "support_material_interface_extruder"
                | "support_material_interface_layers"
                | "support_material_interface_spacing"
                | "support_material_pattern"
                | "support_material_pillar_size"
                | "support_material_pillar_spacing"
                | "support_material_spacing"
                | "support_material_threshold"
                | "dont_support_bridges" => steps.push(ObjectStep::SupportMaterial),
                "interface_shells" | "infill_only_where_needed" => {
                    steps.push(ObjectStep::PrepareInfill);
                }
                // G-code level only
                "seam_position" | "support_material_speed"
                | "support_material_interface_speed" | "sequential_print_priority" => {}
                _ => {
                    all = true;
                    break;
                }
            }
        }

        self.objects[object_index].config = new_config;

        if diff.is_empty() {
            return false;
        }
        if all {
            self.invalidate_object_all_steps(object_index)
        } else {
            let mut invalidated = false;
            for step in steps {
                invalidated |= self.invalidate_object_step(object_index, step);
            }
            invalidated
        }
    }

    /// Key-driven invalidation of one region's state; affects every object.
    fn invalidate_region_state_by_config(
        &mut self,
        key: RegionKey,
        new_config: PrintRegionConfig,
    ) -> bool {
        let Some(region) = self.regions.get(key) else {
            return false;
        };
        let diff = region.config.diff_keys(&new_config);

        let mut steps = Vec::new();
        let mut all = false;
        for changed in &diff {
            match *changed {
                "perimeters" | "extra_perimeters" | "gap_fill_speed" | "overhangs"
                | "perimeter_extrusion_width" | "thin_walls" | "external_perimeters_first"
                | "external_perimeters_hole" | "external_perimeters_nothole"
                | "external_perimeters_vase" | "fill_gaps" => {
                    steps.push(ObjectStep::Perimeters);
                }
                "infill_every_layers" | "solid_infill_every_layers" | "bottom_solid_layers"
                | "top_solid_layers" | "bottom_solid_min_thickness" | "top_solid_min_thickness"
                | "infill_extruder" | "solid_infill_extruder" | "infill_extrusion_width"
                | "solid_infill_below_area" => steps.push(ObjectStep::PrepareInfill),
                "top_infill_pattern" | "bottom_infill_pattern" | "fill_angle" | "fill_pattern"
                | "top_infill_extrusion_width" | "fill_exactly" => {
                    steps.push(ObjectStep::Infill);
                }
                "infill_overlap" => {
                    // the overlap is baked into the fill boundary the
                    // perimeter generator emits, not only into the fill pass
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::Infill);
                }
                "solid_infill_extrusion_width" => {
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::PrepareInfill);
                }
                "fill_density" => {
                    // crossing 0% or 100% changes the extra-perimeter logic
                    let old = region.config.fill_density;
                    let new = new_config.fill_density;
                    if (old == 0.0) != (new == 0.0) || (old == 100.0) != (new == 100.0) {
                        steps.push(ObjectStep::Perimeters);
                    }
                    steps.push(ObjectStep::Infill);
                }
                "external_perimeter_extrusion_width" | "perimeter_extruder" => {
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::SupportMaterial);
                }
                "bridge_flow_ratio" | "over_bridge_flow_ratio" => {
                    steps.push(ObjectStep::Perimeters);
                    steps.push(ObjectStep::Infill);
                }
                "bridge_speed" | "external_perimeter_speed" | "infill_speed" | "perimeter_speed"
                | "solid_infill_speed" | "top_solid_infill_speed" => {}
                _ => {
                    all = true;
                    break;
                }
            }
        }

        if let Some(region) = self.regions.get_mut(key) {
            region.config = new_config;
        }

        if diff.is_empty() {
            return false;
        }
        let mut invalidated = false;
        if all {
            for idx in 0..self.objects.len() {
                invalidated |= self.invalidate_object_all_steps(idx);
            }
        } else {
            for step in steps {
                for idx in 0..self.objects.len() {
                    invalidated |= self.invalidate_object_step(idx, step);
                }
            }
        }
        invalidated
    }

    /// Invalidate a print step; skirt invalidation cascades to the brim.
    pub fn invalidate_step(&mut self, step: PrintStep) -> bool {
        let invalidated = self.state.invalidate(step);
        if step == PrintStep::Skirt {
            self.state.invalidate(PrintStep::Brim);
        }
        invalidated
    }

    /// Invalidate every started print step.
    pub fn invalidate_all_steps(&mut self) -> bool {
        let mut invalidated = false;
        for step in self.state.started_steps() {
            invalidated |= self.invalidate_step(step);
        }
        invalidated
    }

    /// Invalidate one object step, propagating the hard-coded dependencies.
    pub fn invalidate_object_step(&mut self, object_index: usize, step: ObjectStep) -> bool {
        let invalidated = self.objects[object_index].state.invalidate(step);
        match step {
            ObjectStep::Perimeters => {
                self.invalidate_object_step(object_index, ObjectStep::PrepareInfill);
                self.invalidate_step(PrintStep::Skirt);
                self.invalidate_step(PrintStep::Brim);
            }
            ObjectStep::DetectSurfaces => {
                self.invalidate_object_step(object_index, ObjectStep::PrepareInfill);
            }
            ObjectStep::PrepareInfill => {
                self.invalidate_object_step(object_index, ObjectStep::Infill);
            }
            ObjectStep::Infill => {
                self.invalidate_step(PrintStep::Skirt);
                self.invalidate_step(PrintStep::Brim);
            }
            ObjectStep::Slice => {
                self.invalidate_object_step(object_index, ObjectStep::Perimeters);
                self.invalidate_object_step(object_index, ObjectStep::DetectSurfaces);
                self.invalidate_object_step(object_index, ObjectStep::SupportMaterial);
            }
            ObjectStep::Layers => {
                self.invalidate_object_step(object_index, ObjectStep::Slice);
            }
            ObjectStep::SupportMaterial => {
                self.invalidate_step(PrintStep::Skirt);
                self.invalidate_step(PrintStep::Brim);
            }
        }
        invalidated
    }

    /// Invalidate every started step of one object.
    pub fn invalidate_object_all_steps(&mut self, object_index: usize) -> bool {
        let mut invalidated = false;
        for step in self.objects[object_index].state.started_steps() {
            invalidated |= self.invalidate_object_step(object_index, step);
        }
        invalidated
    }

    /// True when a step is done on every object (and there is at least one).
    pub fn object_step_done(&self, step: ObjectStep) -> bool {
        !self.objects.is_empty() && self.objects.iter().all(|o| o.state.is_done(step))
    }

    /// Cross-validate the configuration against the loaded objects.
    pub fn validate(&self) -> Result<()> {
        if self.config.complete_objects && self.objects.len() > 1 {
            // horizontal clearance: grown footprints must not collide
            let mut occupied: Polygons = Polygons::new();
            let clearance = scale(self.config.extruder_clearance_radius) / 2;
            for object in &self.objects {
                let footprint = object.bounding_box().polygon();
                let grown = offset(&[footprint], clearance as f64);
                for &copy in &object.copies {
                    for mut p in grown.clone() {
                        p.translate(copy.x, copy.y);
                        if !intersection(&occupied, &[p.clone()]).is_empty() {
                            return Err(SlicerError::InvalidPrint(
                                "some objects are too close; the extruder would collide with them"
                                    .into(),
                            ));
                        }
                        occupied = union(&[occupied, vec![p]].concat());
                    }
                }
            }

            // vertical clearance: every copy but the tallest must fit under
            // the gantry
            let mut heights: Vec<i64> = self
                .objects
                .iter()
                .flat_map(|o| std::iter::repeat(o.size.z).take(o.copies.len()))
                .collect();
            heights.sort_unstable();
            heights.pop();
            if let Some(&tallest_rest) = heights.last() {
                if tallest_rest > scale(self.config.extruder_clearance_height) {
                    return Err(SlicerError::InvalidPrint(
                        "some objects are too tall and cannot be printed without extruder collisions"
                            .into(),
                    ));
                }
            }
        }

        if self.config.spiral_vase {
            let copies: usize = self.objects.iter().map(|o| o.copies.len()).sum();
            if copies > 1 && !self.config.complete_objects {
                return Err(SlicerError::InvalidPrint(
                    "the spiral vase option can only be used when printing a single object".into(),
                ));
            }
            if self.regions.len() > 1 {
                return Err(SlicerError::InvalidPrint(
                    "the spiral vase option can only be used when printing single material objects"
                        .into(),
                ));
            }
        }

        if self.config.nozzle_diameter.is_empty() {
            return Err(SlicerError::InvalidPrint(
                "the supplied settings will cause an empty print".into(),
            ));
        }

        Ok(())
    }

    /// Legacy validation contract: a human-readable reason, or an empty
    /// string when the print is valid.
    pub fn validate_message(&self) -> String {
        match self.validate() {
            Ok(()) => String::new(),
            Err(e) => e.to_string(),
        }
    }

    /// Minimum distance between object copies.
    pub fn min_object_distance(&self) -> f64 {
        if self.config.complete_objects {
            self.config
                .duplicate_distance
                .max(self.config.extruder_clearance_radius)
        } else {
            self.config.duplicate_distance
        }
    }

    /// Objects in emission order for sequential printing: priority, then Z
    /// size, then id.
    pub fn ordered_object_indices(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.objects.len()).collect();
        order.sort_by_key(|&i| {
            let o = &self.objects[i];
            (o.config.sequential_print_priority, o.size.z, o.id)
        });
        order
    }

    /// Run every outstanding step of the pipeline.
    pub fn process(&mut self) -> Result<()> {
        self.validate()?;
        let executor = self.executor();
        for index in 0..self.objects.len() {
            executor.token().check()?;
            crate::print_object::slice_object(self, index)?;
            crate::perimeter::make_object_perimeters(self, index, &executor)?;
            crate::classify::detect_surfaces(self, index, &executor)?;
            crate::classify::prepare_infill(self, index, &executor)?;
            crate::infill::make_object_fills(self, index, &executor)?;
            crate::support::generate_support_material(self, index, &executor)?;
        }
        executor.token().check()?;
        self.make_skirt()?;
        self.make_brim()?;
        Ok(())
    }

    /// First layer height used by skirt and brim.
    fn skirt_first_layer_height(&self) -> Result<f64> {
        let object = self
            .objects
            .first()
            .ok_or_else(|| SlicerError::InvalidPrint("no objects to print".into()))?;
        Ok(object
            .config
            .first_layer_height
            .get_abs_value(object.config.layer_height))
    }

    /// Flow of the skirt loops.
    pub fn skirt_flow(&self) -> Result<Flow> {
        let mut width = self.config.first_layer_extrusion_width;
        if width.value == 0.0 {
            if let Some((_, region)) = self.regions.iter().next() {
                width = region.config.perimeter_extrusion_width;
            }
        }
        let extruder = self
            .objects
            .first()
            .map(|o| o.config.support_material_extruder)
            .unwrap_or(1);
        Flow::new_from_config_width(
            FlowRole::Perimeter,
            width,
            self.config.nozzle_diameter_at(extruder.saturating_sub(1) as usize),
            self.skirt_first_layer_height()?,
            1.0,
            0.0,
        )
    }

    /// Flow of the brim, width-aligned to the configured brim band.
    pub fn brim_flow(&self) -> Result<Flow> {
        let mut width = self.config.first_layer_extrusion_width;
        if width.value == 0.0 {
            if let Some((_, region)) = self.regions.iter().next() {
                width = region.config.perimeter_extrusion_width;
            }
        }
        let extruder = self
            .regions
            .iter()
            .next()
            .map(|(_, r)| r.config.perimeter_extruder)
            .unwrap_or(1);
        let mut flow = Flow::new_from_config_width(
            FlowRole::Perimeter,
            width,
            self.config.nozzle_diameter_at(extruder.saturating_sub(1) as usize),
            self.skirt_first_layer_height()?,
            1.0,
            0.0,
        )?;
        if self.config.brim_width > 0.0 {
            flow.set_solid_spacing(self.config.brim_width)?;
        }
        Ok(flow)
    }

    /// Union of every object's first-layer footprint (slices plus support),
    /// placed at all copies.
    fn first_layer_islands(&self) -> Polygons {
        let mut islands = Polygons::new();
        for object in &self.objects {
            let mut object_islands: Polygons = object
                .layers
                .first()
                .map(|layer| {
                    layer
                        .lslices
                        .iter()
                        .map(|ex| ex.contour.clone())
                        .collect()
                })
                .unwrap_or_default();
            if let Some(support_layer) = object.support_layers.first() {
                for ex in &support_layer.support_islands {
                    object_islands.push(ex.contour.clone());
                }
            }
            for &copy in &object.copies {
                for island in &object_islands {
                    let mut p = island.clone();
                    p.translate(copy.x, copy.y);
                    islands.push(p);
                }
            }
        }
        islands
    }

    /// Generate the skirt: concentric loops around everything on the first
    /// layer, extended until the minimum filament length is reached.
    pub fn make_skirt(&mut self) -> Result<()> {
        if self.state.is_done(PrintStep::Skirt) {
            return Ok(());
        }
        self.state.set_started(PrintStep::Skirt);

        // a failed or cancelled run leaves the step not-started
        match self.make_skirt_inner() {
            Ok(()) => {
                self.state.set_done(PrintStep::Skirt);
                Ok(())
            }
            Err(err) => {
                self.skirt.clear();
                self.invalidate_step(PrintStep::Skirt);
                Err(err)
            }
        }
    }

    fn make_skirt_inner(&mut self) -> Result<()> {
        self.skirt.clear();
        self.skirt.no_sort = true;

        if self.config.skirts == 0 || self.objects.is_empty() {
            return Ok(());
        }

        let flow = self.skirt_flow()?;
        let mm3_per_mm = flow.mm3_per_mm()?;
        let spacing = flow.scaled_spacing()?;
        let islands = self.first_layer_islands();
        if islands.is_empty() {
            return Ok(());
        }

        let first = scale(self.config.skirt_distance) + flow.scaled_width() / 2;
        let mut total_length_mm = 0.0;
        let mut loops = 0u32;
        // draw loops outside-in order after collecting them inside-out
        let mut collected: Vec<Polygon> = Vec::new();
        loop {
            let distance = first + spacing * loops as i64;
            let ring = offset(&islands, distance as f64);
            if ring.is_empty() {
                break;
            }
            for p in &ring {
                total_length_mm += p.length() * strata_geometry::SCALING_FACTOR;
            }
            collected.extend(ring);
            loops += 1;
            let enough_loops = loops >= self.config.skirts;
            let enough_length = total_length_mm >= self.config.min_skirt_length;
            if enough_loops && enough_length {
                break;
            }
            if loops > 1000 {
                log::warn!(target: "slicer::skirt", "giving up extending the skirt for min_skirt_length");
                break;
            }
        }
        for ring in collected.into_iter().rev() {
            self.skirt.append(ExtrusionEntity::Loop(ExtrusionLoop::new(
                ring,
                ExtrusionRole::Skirt,
                mm3_per_mm,
                flow.width,
                flow.height,
            )));
        }

        Ok(())
    }

    /// Generate the brim: exterior bands, interior (hole) bands, ears at
    /// sharp corners and straight connections between nearby objects.
    pub fn make_brim(&mut self) -> Result<()> {
        if self.state.is_done(PrintStep::Brim) {
            return Ok(());
        }
        self.state.set_started(PrintStep::Brim);

        // a failed or cancelled run leaves the step not-started
        match self.make_brim_inner() {
            Ok(()) => {
                self.state.set_done(PrintStep::Brim);
                Ok(())
            }
            Err(err) => {
                self.brim.clear();
                self.brim_polygons.clear();
                self.invalidate_step(PrintStep::Brim);
                Err(err)
            }
        }
    }

    fn make_brim_inner(&mut self) -> Result<()> {
        self.brim.clear();
        self.brim.no_sort = true;
        self.brim_polygons.clear();

        let nothing_to_do = self.config.brim_width == 0.0
            && self.config.interior_brim_width == 0.0
            && self.config.brim_connections_width == 0.0;
        if self.objects.is_empty() || nothing_to_do {
            return Ok(());
        }

        let flow = self.brim_flow()?;
        let mm3_per_mm = flow.mm3_per_mm()?;
        let spacing = flow.scaled_spacing()? as f64;
        let width_scaled = flow.scaled_width() as f64;
        let mut islands = self.first_layer_islands();

        if self.config.brim_ears {
            // keep only the corners sharper than the configured angle
            let max_angle = self.config.brim_ears_max_angle.to_radians();
            let mut ears = Polygons::new();
            for island in &islands {
                for corner in island.convex_points(max_angle) {
                    let r = scale(self.config.brim_width) as f64;
                    let mut ear = circle_polygon(r);
                    ear.translate(corner.x, corner.y);
                    ears.push(ear);
                }
            }
            let clipped = intersection(
                &offset(&islands, scale(self.config.brim_width) as f64),
                &ears,
            );
            self.append_brim_loops(&clipped, &flow, mm3_per_mm);
        } else if self.config.brim_width > 0.0 {
            let num_loops = (self.config.brim_width / flow.width + 0.5).floor() as i64;
            let mut loops = Polygons::new();
            for i in (1..=num_loops).rev() {
                let band = offset2(
                    &islands,
                    width_scaled + spacing * (i as f64 - 1.0),
                    -spacing * 0.5,
                );
                loops.extend(band);
            }
            let merged = union(&loops);
            self.append_brim_loops(&merged, &flow, mm3_per_mm);
        }

        if self.config.brim_connections_width > 0.0 {
            self.make_brim_connections(&mut islands, &flow, mm3_per_mm)?;
        }

        if self.config.interior_brim_width > 0.0 {
            // hole rings become plain areas here; the brim grows inside them
            let mut holes = Polygons::new();
            for object in &self.objects {
                if let Some(layer0) = object.layers.first() {
                    for ex in &layer0.lslices {
                        for hole in &ex.holes {
                            for &copy in &object.copies {
                                let mut p = hole.clone();
                                p.make_counter_clockwise();
                                p.translate(copy.x, copy.y);
                                holes.push(p);
                            }
                        }
                    }
                }
            }
            let num_loops = (self.config.interior_brim_width / flow.width + 0.5).floor() as i64;
            let mut loops = Polygons::new();
            for i in 1..=num_loops {
                loops.extend(offset2(
                    &holes,
                    -spacing * (i as f64 + 0.5),
                    spacing,
                ));
            }
            let merged = union(&loops);
            self.append_brim_loops(&merged, &flow, mm3_per_mm);
        }

        Ok(())
    }

    fn append_brim_loops(&mut self, rings: &Polygons, flow: &Flow, mm3_per_mm: f64) {
        let mut ordered = rings.clone();
        ordered.sort_by(|a, b| {
            b.area()
                .partial_cmp(&a.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for ring in ordered {
            self.brim_polygons.push(ring.clone());
            self.brim.append(ExtrusionEntity::Loop(ExtrusionLoop::new(
                ring,
                ExtrusionRole::Skirt,
                mm3_per_mm,
                flow.width,
                flow.height,
            )));
        }
    }

    /// Straight rectilinear bands between objects with direct visibility.
    fn make_brim_connections(
        &mut self,
        islands: &mut Polygons,
        flow: &Flow,
        mm3_per_mm: f64,
    ) -> Result<()> {
        let spacing = flow.spacing()?;
        let scaled_width = scale(self.config.brim_connections_width) as f64;
        let grown = offset(islands, scaled_width / 2.0);

        let centroids: Vec<Point> = islands.iter().map(Polygon::centroid).collect();
        let mut connections = Vec::new();
        for i in 0..islands.len() {
            for j in i + 1..islands.len() {
                let line = Line::new(centroids[i], centroids[j]);
                // direct visibility: the centroid segment leaves the grown
                // islands exactly once
                let outside = diff_pl(
                    &[Polyline::new(vec![line.a, line.b])],
                    &grown,
                );
                if outside.len() == 1 {
                    connections.push(line);
                }
            }
        }

        let filler = make_fill(strata_config::InfillPattern::Rectilinear);
        let mut already: Polygons = Polygons::new();
        for line in connections {
            let mut spine = Polygon::new(vec![line.a, line.b, line.b.translated(1, 1)]);
            spine.make_counter_clockwise();
            let band = offset(&[spine], scaled_width / 2.0);
            let mut clip = islands.clone();
            clip.extend(already.clone());
            let areas = strata_geometry::diff_ex(&band, &clip);
            for ex in areas {
                already.extend(ex.to_polygons());
                let surface = Surface::new(SurfaceType::BOTTOM, ex);
                let params = FillParams {
                    density: 1.0,
                    dont_adjust: true,
                    layer_id: None,
                    angle: line.direction(),
                    spacing,
                    bounding_box: None,
                };
                let paths = filler.fill_surface(&surface, &params);
                self.brim.append_paths(
                    paths,
                    ExtrusionRole::Skirt,
                    mm3_per_mm,
                    flow.width,
                    flow.height,
                );
            }
        }
        Ok(())
    }
}

/// A 16-gon approximation of a circle with radius `r` scaled units.
fn circle_polygon(r: f64) -> Polygon {
    let mut points = Vec::with_capacity(16);
    for i in 0..16 {
        let a = i as f64 / 16.0 * std::f64::consts::TAU;
        points.push(Point::new(
            (r * a.cos()).round() as i64,
            (r * a.sin()).round() as i64,
        ));
    }
    Polygon::new(points)
}

/// Order points by a chained path from the origin; used for copies.
pub(crate) fn order_copies(points: &[Point]) -> Vec<usize> {
    chained_path_from(points, Point::new(0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_from_mesh;
    use strata_mesh::TriangleMesh;

    fn cube_print(edits: &[(&str, &str)]) -> Print {
        let mut config = DynamicConfig::new();
        for (k, v) in edits {
            config.set_deserialize(k, v).unwrap();
        }
        let mut print = Print::new();
        print.apply_config(config).unwrap();
        print.set_model(model_from_mesh(TriangleMesh::make_cube(20.0, 20.0, 20.0)));
        print
    }

    #[test]
    fn test_region_deduplication() {
        let mut print = cube_print(&[]);
        assert_eq!(print.regions.len(), 1);
        // adding a second identical object reuses the region
        let mut model = std::mem::take(&mut print.model);
        model
            .objects
            .push(crate::model::model_from_mesh(TriangleMesh::make_cube(5.0, 5.0, 5.0)).objects.remove(0));
        print.set_model(model);
        assert_eq!(print.objects.len(), 2);
        assert_eq!(print.regions.len(), 1);
    }

    #[test]
    fn test_config_diff_stability() {
        let mut print = cube_print(&[("perimeters", "2")]);
        let mut config = DynamicConfig::new();
        config.set_deserialize("perimeters", "4").unwrap();
        assert!(print.apply_config(config.clone()).unwrap());
        // applying the same config again must not invalidate anything
        assert!(!print.apply_config(config).unwrap());
    }

    #[test]
    fn test_invalidation_propagates() {
        let mut print = cube_print(&[]);
        print.objects[0].state.set_done(ObjectStep::Slice);
        print.objects[0].state.set_done(ObjectStep::Perimeters);
        print.objects[0].state.set_done(ObjectStep::PrepareInfill);
        print.objects[0].state.set_done(ObjectStep::Infill);
        print.state.set_done(PrintStep::Skirt);
        print.state.set_done(PrintStep::Brim);

        print.invalidate_object_step(0, ObjectStep::Slice);
        let state = &print.objects[0].state;
        assert!(!state.is_started(ObjectStep::Slice));
        assert!(!state.is_started(ObjectStep::Perimeters));
        assert!(!state.is_started(ObjectStep::PrepareInfill));
        assert!(!state.is_started(ObjectStep::Infill));
        assert!(!print.state.is_started(PrintStep::Skirt));
        assert!(!print.state.is_started(PrintStep::Brim));
    }

    #[test]
    fn test_fill_density_zero_crossing_invalidates_perimeters() {
        let mut print = cube_print(&[]);
        print.objects[0].state.set_done(ObjectStep::Perimeters);
        let mut config = DynamicConfig::new();
        config.set_deserialize("fill_density", "0").unwrap();
        print.apply_config(config).unwrap();
        assert!(!print.objects[0].state.is_started(ObjectStep::Perimeters));
    }

    #[test]
    fn test_validate_spiral_vase_multi_object() {
        let mut print = cube_print(&[("spiral_vase", "1")]);
        let mut model = std::mem::take(&mut print.model);
        model
            .objects
            .push(model_from_mesh(TriangleMesh::make_cube(5.0, 5.0, 5.0)).objects.remove(0));
        print.set_model(model);
        assert!(matches!(print.validate(), Err(SlicerError::InvalidPrint(_))));
        assert!(!print.validate_message().is_empty());
    }

    #[test]
    fn test_min_object_distance() {
        let mut print = cube_print(&[]);
        print.config.duplicate_distance = 6.0;
        print.config.extruder_clearance_radius = 20.0;
        assert_eq!(print.min_object_distance(), 6.0);
        print.config.complete_objects = true;
        assert_eq!(print.min_object_distance(), 20.0);
    }
}
