//! Static configuration views.
//!
//! Each pipeline subsystem reads a typed struct view of the option bag:
//! [`PrintConfig`], [`PrintObjectConfig`], [`PrintRegionConfig`] and
//! [`HostConfig`]. Views start from the schema defaults and are updated by
//! applying a [`DynamicConfig`]; diffing two views yields the changed keys
//! that drive step invalidation.

use crate::def::print_config_def;
use crate::dynamic::DynamicConfig;
use crate::enums::{InfillPattern, SeamPosition, SupportMaterialPattern};
use crate::error::{ConfigError, Result};
use crate::option::{FloatOrPercent, OptionValue};

/// Conversion between option values and static view field types.
pub trait OptionConvert: Sized + PartialEq + Clone {
    /// Convert from a stored option value.
    fn from_value(value: &OptionValue) -> Result<Self>;
    /// Convert back into an option value.
    fn to_value(&self) -> OptionValue;
}

impl OptionConvert for bool {
    fn from_value(value: &OptionValue) -> Result<Self> {
        value.get_bool()
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Bool(*self)
    }
}

impl OptionConvert for i64 {
    fn from_value(value: &OptionValue) -> Result<Self> {
        value.get_int()
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Int(*self)
    }
}

impl OptionConvert for u32 {
    fn from_value(value: &OptionValue) -> Result<Self> {
        u32::try_from(value.get_int()?).map_err(|_| ConfigError::BadOptionType("non-negative int"))
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Int(*self as i64)
    }
}

impl OptionConvert for f64 {
    fn from_value(value: &OptionValue) -> Result<Self> {
        value.get_float()
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Float(*self)
    }
}

impl OptionConvert for FloatOrPercent {
    fn from_value(value: &OptionValue) -> Result<Self> {
        value.get_float_or_percent()
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::FloatOrPercent(*self)
    }
}

impl OptionConvert for String {
    fn from_value(value: &OptionValue) -> Result<Self> {
        Ok(value.get_string()?.to_string())
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::String(self.clone())
    }
}

impl OptionConvert for Vec<f64> {
    fn from_value(value: &OptionValue) -> Result<Self> {
        Ok(value.get_floats()?.to_vec())
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Floats(self.clone())
    }
}

impl OptionConvert for Vec<bool> {
    fn from_value(value: &OptionValue) -> Result<Self> {
        Ok(value.get_bools()?.to_vec())
    }
    fn to_value(&self) -> OptionValue {
        OptionValue::Bools(self.clone())
    }
}

macro_rules! enum_convert {
    ($ty:ident) => {
        impl OptionConvert for $ty {
            fn from_value(value: &OptionValue) -> Result<Self> {
                $ty::from_tag(value.get_enum()?)
                    .ok_or(ConfigError::BadOptionType(stringify!($ty)))
            }
            fn to_value(&self) -> OptionValue {
                OptionValue::Enum(self.tag())
            }
        }
    };
}

enum_convert!(InfillPattern);
enum_convert!(SeamPosition);
enum_convert!(SupportMaterialPattern);

macro_rules! static_config {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($field:ident : $ty:ty => $key:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(
                #[doc = concat!("The `", $key, "` option.")]
                pub $field: $ty,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                let def = print_config_def();
                Self {
                    $($field: <$ty as OptionConvert>::from_value(
                        &def.get($key).expect("option is in the schema").default,
                    )
                    .expect("schema default matches the view field type"),)+
                }
            }
        }

        impl $name {
            /// Apply every option of `config` this view covers; returns the
            /// keys whose value changed.
            pub fn apply_dynamic(&mut self, config: &DynamicConfig) -> Vec<&'static str> {
                let mut changed = Vec::new();
                $(
                    if let Some(value) = config.get($key) {
                        if let Ok(value) = <$ty as OptionConvert>::from_value(value) {
                            if self.$field != value {
                                self.$field = value;
                                changed.push($key);
                            }
                        }
                    }
                )+
                changed
            }

            /// Keys whose values differ between the two views.
            pub fn diff_keys(&self, other: &Self) -> Vec<&'static str> {
                let mut diff = Vec::new();
                $(
                    if self.$field != other.$field {
                        diff.push($key);
                    }
                )+
                diff
            }

            /// Serialize a single option by key.
            pub fn serialize_key(&self, key: &str) -> Option<String> {
                match key {
                    $($key => Some(OptionConvert::to_value(&self.$field).serialize_str()),)+
                    _ => None,
                }
            }

            /// The option keys this view covers.
            pub fn keys() -> &'static [&'static str] {
                &[$($key),+]
            }
        }
    };
}

static_config! {
    /// Print-wide options.
    pub struct PrintConfig {
        brim_width: f64 => "brim_width",
        interior_brim_width: f64 => "interior_brim_width",
        brim_connections_width: f64 => "brim_connections_width",
        brim_ears: bool => "brim_ears",
        brim_ears_max_angle: f64 => "brim_ears_max_angle",
        complete_objects: bool => "complete_objects",
        duplicate_distance: f64 => "duplicate_distance",
        extruder_clearance_height: f64 => "extruder_clearance_height",
        extruder_clearance_radius: f64 => "extruder_clearance_radius",
        extrusion_width: FloatOrPercent => "extrusion_width",
        first_layer_extrusion_width: FloatOrPercent => "first_layer_extrusion_width",
        min_skirt_length: f64 => "min_skirt_length",
        nozzle_diameter: Vec<f64> => "nozzle_diameter",
        min_layer_height: Vec<f64> => "min_layer_height",
        max_layer_height: Vec<f64> => "max_layer_height",
        retract_layer_change: Vec<bool> => "retract_layer_change",
        skirt_distance: f64 => "skirt_distance",
        skirt_height: i64 => "skirt_height",
        skirts: u32 => "skirts",
        spiral_vase: bool => "spiral_vase",
        threads: u32 => "threads",
        z_steps_per_mm: f64 => "z_steps_per_mm",
    }
}

impl PrintConfig {
    /// Nozzle diameter of a zero-based extruder id, clamped to the table.
    pub fn nozzle_diameter_at(&self, extruder: usize) -> f64 {
        vec_at(&self.nozzle_diameter, extruder)
    }

    /// Minimum layer height of an extruder.
    pub fn min_layer_height_at(&self, extruder: usize) -> f64 {
        vec_at(&self.min_layer_height, extruder)
    }

    /// Maximum layer height of an extruder.
    pub fn max_layer_height_at(&self, extruder: usize) -> f64 {
        vec_at(&self.max_layer_height, extruder)
    }
}

/// Per-extruder vectors answer the first element for out-of-range ids.
fn vec_at(values: &[f64], index: usize) -> f64 {
    values
        .get(index)
        .or_else(|| values.first())
        .copied()
        .unwrap_or(0.0)
}

static_config! {
    /// Per-object options.
    pub struct PrintObjectConfig {
        adaptive_slicing: bool => "adaptive_slicing",
        adaptive_slicing_quality: f64 => "adaptive_slicing_quality",
        dont_support_bridges: bool => "dont_support_bridges",
        first_layer_height: FloatOrPercent => "first_layer_height",
        infill_only_where_needed: bool => "infill_only_where_needed",
        interface_shells: bool => "interface_shells",
        layer_height: f64 => "layer_height",
        match_horizontal_surfaces: bool => "match_horizontal_surfaces",
        raft_layers: u32 => "raft_layers",
        regions_overlap: f64 => "regions_overlap",
        seam_position: SeamPosition => "seam_position",
        sequential_print_priority: i64 => "sequential_print_priority",
        support_material: bool => "support_material",
        support_material_angle: f64 => "support_material_angle",
        support_material_buildplate_only: bool => "support_material_buildplate_only",
        support_material_contact_distance: f64 => "support_material_contact_distance",
        support_material_contact_loops: u32 => "support_material_contact_loops",
        support_material_enforce_layers: u32 => "support_material_enforce_layers",
        support_material_extruder: u32 => "support_material_extruder",
        support_material_extrusion_width: FloatOrPercent => "support_material_extrusion_width",
        support_material_interface_extruder: u32 => "support_material_interface_extruder",
        support_material_interface_layers: u32 => "support_material_interface_layers",
        support_material_interface_spacing: f64 => "support_material_interface_spacing",
        support_material_interface_speed: FloatOrPercent => "support_material_interface_speed",
        support_material_pattern: SupportMaterialPattern => "support_material_pattern",
        support_material_pillar_size: f64 => "support_material_pillar_size",
        support_material_pillar_spacing: f64 => "support_material_pillar_spacing",
        support_material_spacing: f64 => "support_material_spacing",
        support_material_speed: f64 => "support_material_speed",
        support_material_threshold: FloatOrPercent => "support_material_threshold",
        xy_size_compensation: f64 => "xy_size_compensation",
    }
}

impl PrintObjectConfig {
    /// Support is involved when enabled directly, through a raft, or through
    /// enforced layers.
    pub fn has_support_material(&self) -> bool {
        self.support_material
            || self.raft_layers > 0
            || self.support_material_enforce_layers > 0
    }
}

static_config! {
    /// Per-region options.
    pub struct PrintRegionConfig {
        bottom_infill_pattern: InfillPattern => "bottom_infill_pattern",
        bottom_solid_layers: u32 => "bottom_solid_layers",
        bottom_solid_min_thickness: f64 => "bottom_solid_min_thickness",
        bridge_flow_ratio: f64 => "bridge_flow_ratio",
        bridge_speed: f64 => "bridge_speed",
        over_bridge_flow_ratio: f64 => "over_bridge_flow_ratio",
        external_perimeter_extrusion_width: FloatOrPercent => "external_perimeter_extrusion_width",
        external_perimeter_speed: FloatOrPercent => "external_perimeter_speed",
        external_perimeters_first: bool => "external_perimeters_first",
        external_perimeters_hole: bool => "external_perimeters_hole",
        external_perimeters_nothole: bool => "external_perimeters_nothole",
        external_perimeters_vase: bool => "external_perimeters_vase",
        extra_perimeters: bool => "extra_perimeters",
        fill_angle: f64 => "fill_angle",
        fill_density: f64 => "fill_density",
        fill_exactly: bool => "fill_exactly",
        fill_gaps: bool => "fill_gaps",
        fill_pattern: InfillPattern => "fill_pattern",
        gap_fill_speed: f64 => "gap_fill_speed",
        infill_every_layers: u32 => "infill_every_layers",
        infill_extruder: u32 => "infill_extruder",
        infill_extrusion_width: FloatOrPercent => "infill_extrusion_width",
        infill_overlap: FloatOrPercent => "infill_overlap",
        infill_speed: f64 => "infill_speed",
        overhangs: bool => "overhangs",
        perimeter_extruder: u32 => "perimeter_extruder",
        perimeter_extrusion_width: FloatOrPercent => "perimeter_extrusion_width",
        perimeter_speed: f64 => "perimeter_speed",
        perimeters: u32 => "perimeters",
        solid_infill_below_area: f64 => "solid_infill_below_area",
        solid_infill_every_layers: u32 => "solid_infill_every_layers",
        solid_infill_extruder: u32 => "solid_infill_extruder",
        solid_infill_extrusion_width: FloatOrPercent => "solid_infill_extrusion_width",
        solid_infill_speed: FloatOrPercent => "solid_infill_speed",
        thin_walls: bool => "thin_walls",
        top_infill_extrusion_width: FloatOrPercent => "top_infill_extrusion_width",
        top_infill_pattern: InfillPattern => "top_infill_pattern",
        top_solid_infill_speed: FloatOrPercent => "top_solid_infill_speed",
        top_solid_layers: u32 => "top_solid_layers",
        top_solid_min_thickness: f64 => "top_solid_min_thickness",
    }
}

static_config! {
    /// Print-host collaborator options; carried for config compatibility.
    pub struct HostConfig {
        print_host: String => "print_host",
        host_api_key: String => "host_api_key",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_schema() {
        let region = PrintRegionConfig::default();
        assert_eq!(region.perimeters, 3);
        assert_eq!(region.fill_density, 20.0);
        assert_eq!(region.fill_pattern, InfillPattern::Honeycomb);
        let object = PrintObjectConfig::default();
        assert_eq!(object.layer_height, 0.3);
        assert!(!object.support_material);
    }

    #[test]
    fn test_apply_dynamic_reports_changes() {
        let mut region = PrintRegionConfig::default();
        let mut dynamic = DynamicConfig::new();
        dynamic.set_deserialize("perimeters", "5").unwrap();
        dynamic.set_deserialize("fill_density", "20%").unwrap();
        let changed = region.apply_dynamic(&dynamic);
        // fill_density did not change from its default
        assert_eq!(changed, vec!["perimeters"]);
        assert_eq!(region.perimeters, 5);
    }

    #[test]
    fn test_diff_keys() {
        let a = PrintRegionConfig::default();
        let mut b = a.clone();
        b.fill_pattern = InfillPattern::Concentric;
        b.top_solid_layers = 0;
        let mut diff = a.diff_keys(&b);
        diff.sort();
        assert_eq!(diff, vec!["fill_pattern", "top_solid_layers"]);
    }

    #[test]
    fn test_serialize_key() {
        let region = PrintRegionConfig::default();
        assert_eq!(
            region.serialize_key("perimeter_extrusion_width").as_deref(),
            Some("0")
        );
        assert_eq!(region.serialize_key("not_a_key"), None);
    }

    #[test]
    fn test_has_support_material() {
        let mut object = PrintObjectConfig::default();
        assert!(!object.has_support_material());
        object.raft_layers = 3;
        assert!(object.has_support_material());
    }

    #[test]
    fn test_nozzle_diameter_at_clamps() {
        let print = PrintConfig::default();
        assert_eq!(print.nozzle_diameter_at(0), 0.5);
        assert_eq!(print.nozzle_diameter_at(7), 0.5);
    }
}
