//! The process-wide option schema.
//!
//! [`ConfigDef`] enumerates every option the slicer understands: its typed
//! value kind, default, limits, aliases, shortcut targets and the key a
//! percent value resolves against. The schema is built once and shared.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::enums::{
    EnumTable, InfillPattern, SeamPosition, SupportMaterialPattern, INFILL_PATTERN_TABLE,
    SEAM_POSITION_TABLE, SUPPORT_PATTERN_TABLE,
};
use crate::error::{ConfigError, Result};
use crate::option::{FloatOrPercent, OptionValue};

/// The value shape of an option.
#[derive(Debug, Clone, Copy)]
pub enum OptionKind {
    /// Boolean flag.
    Bool,
    /// Integer.
    Int,
    /// Float.
    Float,
    /// Percentage.
    Percent,
    /// Absolute or percent amount.
    FloatOrPercent,
    /// Text.
    Str,
    /// 2D point, serialized `XxY`.
    Point,
    /// 3D point, serialized `XxYxZ`.
    Point3,
    /// Enumeration backed by a string table.
    Enum(&'static EnumTable),
    /// Per-extruder floats.
    Floats,
    /// Per-extruder integers.
    Ints,
    /// Multiple strings.
    Strings,
    /// Per-extruder flags.
    Bools,
    /// Multiple points.
    Points,
}

/// Schema entry for one option.
#[derive(Debug)]
pub struct OptionDef {
    /// Canonical key.
    pub key: &'static str,
    /// Value shape.
    pub kind: OptionKind,
    /// Default value.
    pub default: OptionValue,
    /// Lower bound for numeric kinds.
    pub min: Option<f64>,
    /// Upper bound for numeric kinds.
    pub max: Option<f64>,
    /// Stale key names accepted at parse time.
    pub aliases: &'static [&'static str],
    /// Keys a shortcut option writes through to.
    pub shortcut: &'static [&'static str],
    /// Shortcut resolved during normalize (only where unset) instead of at
    /// parse time.
    pub deferred_shortcut: bool,
    /// Key that a percent value of this option refers to.
    pub ratio_over: Option<&'static str>,
    /// Command-line switch exposed by the CLI collaborator.
    pub cli: Option<&'static str>,
    /// Short user-facing description.
    pub description: &'static str,
}

impl OptionDef {
    fn new(key: &'static str, kind: OptionKind, default: OptionValue) -> Self {
        Self {
            key,
            kind,
            default,
            min: None,
            max: None,
            aliases: &[],
            shortcut: &[],
            deferred_shortcut: false,
            ratio_over: None,
            cli: None,
            description: "",
        }
    }

    fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    fn shortcut(mut self, targets: &'static [&'static str]) -> Self {
        self.shortcut = targets;
        self
    }

    fn deferred(mut self) -> Self {
        self.deferred_shortcut = true;
        self
    }

    fn ratio_over(mut self, key: &'static str) -> Self {
        self.ratio_over = Some(key);
        self
    }

    fn cli(mut self, switch: &'static str) -> Self {
        self.cli = Some(switch);
        self
    }

    fn describe(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }

    /// Parse a textual value according to this option's kind.
    pub fn deserialize(&self, text: &str) -> Result<OptionValue> {
        let invalid = || ConfigError::InvalidOptionValue {
            key: self.key.to_string(),
            value: text.to_string(),
        };
        let text = text.trim();
        let value = match self.kind {
            OptionKind::Bool => OptionValue::Bool(parse_bool(text).ok_or_else(invalid)?),
            OptionKind::Int => OptionValue::Int(text.parse().map_err(|_| invalid())?),
            OptionKind::Float => OptionValue::Float(text.parse().map_err(|_| invalid())?),
            OptionKind::Percent => {
                let stripped = text.strip_suffix('%').unwrap_or(text);
                OptionValue::Percent(stripped.trim().parse().map_err(|_| invalid())?)
            }
            OptionKind::FloatOrPercent => match text.strip_suffix('%') {
                Some(stripped) => OptionValue::FloatOrPercent(FloatOrPercent::percent(
                    stripped.trim().parse().map_err(|_| invalid())?,
                )),
                None => OptionValue::FloatOrPercent(FloatOrPercent::absolute(
                    text.parse().map_err(|_| invalid())?,
                )),
            },
            OptionKind::Str => OptionValue::String(text.to_string()),
            OptionKind::Point => OptionValue::Point(parse_point(text).ok_or_else(invalid)?),
            OptionKind::Point3 => {
                let mut parts = text.split('x');
                let mut coord = [0f64; 3];
                for c in &mut coord {
                    *c = parts
                        .next()
                        .and_then(|p| p.trim().parse().ok())
                        .ok_or_else(invalid)?;
                }
                OptionValue::Point3((coord[0], coord[1], coord[2]))
            }
            OptionKind::Enum(table) => OptionValue::Enum(table.tag(text).ok_or_else(invalid)?),
            OptionKind::Floats => OptionValue::Floats(
                split_list(text)
                    .map(|p| p.parse().map_err(|_| invalid()))
                    .collect::<Result<_>>()?,
            ),
            OptionKind::Ints => OptionValue::Ints(
                split_list(text)
                    .map(|p| p.parse().map_err(|_| invalid()))
                    .collect::<Result<_>>()?,
            ),
            OptionKind::Strings => {
                OptionValue::Strings(text.split(';').map(|s| s.trim().to_string()).collect())
            }
            OptionKind::Bools => OptionValue::Bools(
                split_list(text)
                    .map(|p| parse_bool(p).ok_or_else(invalid))
                    .collect::<Result<_>>()?,
            ),
            OptionKind::Points => OptionValue::Points(
                split_list(text)
                    .map(|p| parse_point(p).ok_or_else(invalid))
                    .collect::<Result<_>>()?,
            ),
        };
        self.validate_value(&value)?;
        Ok(value)
    }

    /// Check a typed value against this option's kind and limits.
    pub fn validate_value(&self, value: &OptionValue) -> Result<()> {
        let kind_matches = matches!(
            (&self.kind, value),
            (OptionKind::Bool, OptionValue::Bool(_))
                | (OptionKind::Int, OptionValue::Int(_))
                | (OptionKind::Float, OptionValue::Float(_))
                | (OptionKind::Percent, OptionValue::Percent(_))
                | (OptionKind::FloatOrPercent, OptionValue::FloatOrPercent(_))
                | (OptionKind::Str, OptionValue::String(_))
                | (OptionKind::Point, OptionValue::Point(_))
                | (OptionKind::Point3, OptionValue::Point3(_))
                | (OptionKind::Enum(_), OptionValue::Enum(_))
                | (OptionKind::Floats, OptionValue::Floats(_))
                | (OptionKind::Ints, OptionValue::Ints(_))
                | (OptionKind::Strings, OptionValue::Strings(_))
                | (OptionKind::Bools, OptionValue::Bools(_))
                | (OptionKind::Points, OptionValue::Points(_))
        );
        if !kind_matches {
            return Err(ConfigError::InvalidOptionValue {
                key: self.key.to_string(),
                value: value.serialize_str(),
            });
        }
        if let OptionKind::Enum(table) = self.kind {
            if let OptionValue::Enum(tag) = value {
                if table.string(*tag).is_none() {
                    return Err(ConfigError::InvalidOptionValue {
                        key: self.key.to_string(),
                        value: tag.to_string(),
                    });
                }
            }
        }

        let mut numbers: Vec<f64> = Vec::new();
        match value {
            OptionValue::Int(v) => numbers.push(*v as f64),
            OptionValue::Float(v) | OptionValue::Percent(v) => numbers.push(*v),
            OptionValue::FloatOrPercent(v) if !v.percent => numbers.push(v.value),
            OptionValue::Floats(v) => numbers.extend_from_slice(v),
            OptionValue::Ints(v) => numbers.extend(v.iter().map(|i| *i as f64)),
            _ => {}
        }
        for n in numbers {
            if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
                return Err(ConfigError::InvalidOptionValue {
                    key: self.key.to_string(),
                    value: value.serialize_str(),
                });
            }
        }
        Ok(())
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

fn parse_point(text: &str) -> Option<(f64, f64)> {
    let (x, y) = text.split_once(['x', ','])?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// The full option schema.
#[derive(Debug, Default)]
pub struct ConfigDef {
    options: BTreeMap<&'static str, OptionDef>,
}

impl ConfigDef {
    fn add(&mut self, def: OptionDef) {
        self.options.insert(def.key, def);
    }

    /// True when `key` is a canonical option key.
    pub fn has(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Look up a canonical key.
    pub fn get(&self, key: &str) -> Option<&OptionDef> {
        self.options.get(key)
    }

    /// Resolve a key or one of its aliases to its definition.
    pub fn resolve(&self, key: &str) -> Option<&OptionDef> {
        self.options.get(key).or_else(|| {
            self.options
                .values()
                .find(|def| def.aliases.iter().any(|alias| *alias == key))
        })
    }

    /// All canonical keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.options.keys().copied()
    }
}

/// The process-wide schema; built on first use, read-only afterwards.
pub fn print_config_def() -> &'static ConfigDef {
    static DEF: OnceLock<ConfigDef> = OnceLock::new();
    DEF.get_or_init(build_def)
}

fn build_def() -> ConfigDef {
    use OptionKind as K;
    use OptionValue as V;
    let mut def = ConfigDef::default();

    // --- print scope ---------------------------------------------------
    def.add(
        OptionDef::new("brim_width", K::Float, V::Float(0.0))
            .min(0.0)
            .cli("brim-width")
            .describe("Width of the brim printed around each object on the first layer"),
    );
    def.add(
        OptionDef::new("interior_brim_width", K::Float, V::Float(0.0))
            .min(0.0)
            .describe("Width of the brim printed inside holes on the first layer"),
    );
    def.add(
        OptionDef::new("brim_connections_width", K::Float, V::Float(0.0))
            .min(0.0)
            .describe("Width of straight brim connections between nearby objects"),
    );
    def.add(OptionDef::new("brim_ears", K::Bool, V::Bool(false)));
    def.add(
        OptionDef::new("brim_ears_max_angle", K::Float, V::Float(125.0))
            .min(0.0)
            .max(180.0)
            .describe("Only corners sharper than this angle get a brim ear"),
    );
    def.add(
        OptionDef::new("complete_objects", K::Bool, V::Bool(false))
            .describe("Print each object completely before moving to the next"),
    );
    def.add(OptionDef::new("duplicate_distance", K::Float, V::Float(6.0)).min(0.0));
    def.add(OptionDef::new("extruder_clearance_height", K::Float, V::Float(20.0)).min(0.0));
    def.add(OptionDef::new("extruder_clearance_radius", K::Float, V::Float(20.0)).min(0.0));
    def.add(
        OptionDef::new(
            "extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height")
        .describe("Default extrusion width; zero means automatic"),
    );
    def.add(
        OptionDef::new(
            "first_layer_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("first_layer_height"),
    );
    def.add(OptionDef::new("min_skirt_length", K::Float, V::Float(0.0)).min(0.0));
    def.add(
        OptionDef::new("nozzle_diameter", K::Floats, V::Floats(vec![0.5]))
            .cli("nozzle-diameter")
            .describe("Diameter of each extruder nozzle"),
    );
    def.add(OptionDef::new("min_layer_height", K::Floats, V::Floats(vec![0.15])));
    def.add(OptionDef::new("max_layer_height", K::Floats, V::Floats(vec![0.3])));
    def.add(OptionDef::new("retract_layer_change", K::Bools, V::Bools(vec![false])));
    def.add(OptionDef::new("skirt_distance", K::Float, V::Float(6.0)).min(0.0));
    def.add(OptionDef::new("skirt_height", K::Int, V::Int(1)));
    def.add(
        OptionDef::new("skirts", K::Int, V::Int(1))
            .min(0.0)
            .cli("skirts")
            .describe("Number of skirt loops drawn around the first layer"),
    );
    def.add(
        OptionDef::new("spiral_vase", K::Bool, V::Bool(false))
            .describe("Spiralize the outer contour; forces a single perimeter and no infill"),
    );
    def.add(
        OptionDef::new("threads", K::Int, V::Int(2))
            .min(1.0)
            .describe("Upper bound on worker threads"),
    );
    def.add(
        OptionDef::new("z_steps_per_mm", K::Float, V::Float(0.0))
            .min(0.0)
            .describe("Full Z steps per millimeter; layer heights snap to four full steps"),
    );

    // --- object scope ---------------------------------------------------
    def.add(OptionDef::new("adaptive_slicing", K::Bool, V::Bool(false)));
    def.add(
        OptionDef::new("adaptive_slicing_quality", K::Percent, V::Percent(75.0))
            .min(0.0)
            .max(100.0),
    );
    def.add(OptionDef::new("dont_support_bridges", K::Bool, V::Bool(true)));
    def.add(
        OptionDef::new(
            "first_layer_height",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.35)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new("infill_only_where_needed", K::Bool, V::Bool(false)));
    def.add(OptionDef::new("interface_shells", K::Bool, V::Bool(false)));
    def.add(
        OptionDef::new("layer_height", K::Float, V::Float(0.3))
            .min(0.0)
            .cli("layer-height")
            .describe("Vertical slice thickness"),
    );
    def.add(OptionDef::new("match_horizontal_surfaces", K::Bool, V::Bool(false)));
    def.add(OptionDef::new("raft_layers", K::Int, V::Int(0)).min(0.0));
    def.add(OptionDef::new("regions_overlap", K::Float, V::Float(0.0)).min(0.0));
    def.add(OptionDef::new(
        "seam_position",
        K::Enum(&SEAM_POSITION_TABLE),
        V::Enum(SeamPosition::Aligned.tag()),
    ));
    def.add(OptionDef::new("sequential_print_priority", K::Int, V::Int(0)));
    def.add(OptionDef::new("support_material", K::Bool, V::Bool(false)).cli("support-material"));
    def.add(
        OptionDef::new("support_material_angle", K::Float, V::Float(0.0))
            .min(0.0)
            .max(359.0),
    );
    def.add(OptionDef::new(
        "support_material_buildplate_only",
        K::Bool,
        V::Bool(false),
    ));
    def.add(OptionDef::new("support_material_contact_distance", K::Float, V::Float(0.2)).min(0.0));
    def.add(OptionDef::new("support_material_contact_loops", K::Int, V::Int(1)).min(0.0));
    def.add(OptionDef::new("support_material_enforce_layers", K::Int, V::Int(0)).min(0.0));
    def.add(OptionDef::new("support_material_extruder", K::Int, V::Int(1)).min(0.0));
    def.add(OptionDef::new(
        "support_material_extrusion_width",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
    ));
    def.add(OptionDef::new("support_material_interface_extruder", K::Int, V::Int(1)).min(0.0));
    def.add(OptionDef::new("support_material_interface_layers", K::Int, V::Int(3)).min(0.0));
    def.add(OptionDef::new("support_material_interface_spacing", K::Float, V::Float(0.0)).min(0.0));
    def.add(OptionDef::new(
        "support_material_interface_speed",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::percent(100.0)),
    ));
    def.add(OptionDef::new(
        "support_material_pattern",
        K::Enum(&SUPPORT_PATTERN_TABLE),
        V::Enum(SupportMaterialPattern::Pillars.tag()),
    ));
    def.add(OptionDef::new("support_material_pillar_size", K::Float, V::Float(2.5)).min(0.0));
    def.add(OptionDef::new("support_material_pillar_spacing", K::Float, V::Float(10.0)).min(0.0));
    def.add(OptionDef::new("support_material_spacing", K::Float, V::Float(2.5)).min(0.0));
    def.add(OptionDef::new("support_material_speed", K::Float, V::Float(60.0)).min(0.0));
    def.add(
        OptionDef::new(
            "support_material_threshold",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::percent(60.0)),
        )
        .describe("Overhang slope threshold above which support is generated"),
    );
    def.add(OptionDef::new("xy_size_compensation", K::Float, V::Float(0.0)));

    // --- region scope ---------------------------------------------------
    def.add(OptionDef::new(
        "bottom_infill_pattern",
        K::Enum(&INFILL_PATTERN_TABLE),
        V::Enum(InfillPattern::Rectilinear.tag()),
    ));
    def.add(OptionDef::new("bottom_solid_layers", K::Int, V::Int(3)).min(0.0));
    def.add(OptionDef::new("bottom_solid_min_thickness", K::Float, V::Float(0.0)).min(0.0));
    def.add(OptionDef::new("bridge_flow_ratio", K::Float, V::Float(1.0)).min(0.0));
    def.add(OptionDef::new("bridge_speed", K::Float, V::Float(60.0)).min(0.0));
    def.add(OptionDef::new("over_bridge_flow_ratio", K::Float, V::Float(1.0)).min(0.0));
    def.add(
        OptionDef::new(
            "external_perimeter_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new(
        "external_perimeter_speed",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::percent(50.0)),
    ));
    def.add(OptionDef::new("external_perimeters_first", K::Bool, V::Bool(false)));
    def.add(OptionDef::new("external_perimeters_hole", K::Bool, V::Bool(true)));
    def.add(OptionDef::new("external_perimeters_nothole", K::Bool, V::Bool(true)));
    def.add(OptionDef::new("external_perimeters_vase", K::Bool, V::Bool(false)));
    def.add(OptionDef::new("extra_perimeters", K::Bool, V::Bool(true)));
    def.add(OptionDef::new("fill_angle", K::Float, V::Float(45.0)).min(0.0).max(360.0));
    def.add(
        OptionDef::new("fill_density", K::Percent, V::Percent(20.0))
            .min(0.0)
            .max(100.0)
            .aliases(&["infill_density"])
            .cli("fill-density")
            .describe("Density of the sparse internal infill"),
    );
    def.add(OptionDef::new("fill_exactly", K::Bool, V::Bool(false)));
    def.add(OptionDef::new("fill_gaps", K::Bool, V::Bool(true)));
    def.add(OptionDef::new(
        "fill_pattern",
        K::Enum(&INFILL_PATTERN_TABLE),
        V::Enum(InfillPattern::Honeycomb.tag()),
    ));
    def.add(OptionDef::new("gap_fill_speed", K::Float, V::Float(20.0)).min(0.0));
    def.add(OptionDef::new("infill_every_layers", K::Int, V::Int(1)).min(1.0));
    def.add(OptionDef::new("infill_extruder", K::Int, V::Int(1)).min(0.0));
    def.add(
        OptionDef::new(
            "infill_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new(
        "infill_overlap",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::percent(55.0)),
    ));
    def.add(OptionDef::new("infill_speed", K::Float, V::Float(80.0)).min(0.0));
    def.add(OptionDef::new("overhangs", K::Bool, V::Bool(true)));
    def.add(OptionDef::new("perimeter_extruder", K::Int, V::Int(1)).min(0.0));
    def.add(
        OptionDef::new(
            "perimeter_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new("perimeter_speed", K::Float, V::Float(60.0)).min(0.0));
    def.add(
        OptionDef::new("perimeters", K::Int, V::Int(3))
            .min(0.0)
            .aliases(&["wall_count"])
            .cli("perimeters")
            .describe("Number of perimeter loops per island"),
    );
    def.add(OptionDef::new("solid_infill_below_area", K::Float, V::Float(70.0)).min(0.0));
    def.add(OptionDef::new("solid_infill_every_layers", K::Int, V::Int(0)).min(0.0));
    def.add(OptionDef::new("solid_infill_extruder", K::Int, V::Int(1)).min(0.0));
    def.add(
        OptionDef::new(
            "solid_infill_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new(
        "solid_infill_speed",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::percent(20.0)),
    ));
    def.add(OptionDef::new("thin_walls", K::Bool, V::Bool(true)));
    def.add(
        OptionDef::new(
            "top_infill_extrusion_width",
            K::FloatOrPercent,
            V::FloatOrPercent(FloatOrPercent::absolute(0.0)),
        )
        .ratio_over("layer_height"),
    );
    def.add(OptionDef::new(
        "top_infill_pattern",
        K::Enum(&INFILL_PATTERN_TABLE),
        V::Enum(InfillPattern::Rectilinear.tag()),
    ));
    def.add(OptionDef::new(
        "top_solid_infill_speed",
        K::FloatOrPercent,
        V::FloatOrPercent(FloatOrPercent::percent(15.0)),
    ));
    def.add(OptionDef::new("top_solid_layers", K::Int, V::Int(3)).min(0.0));
    def.add(OptionDef::new("top_solid_min_thickness", K::Float, V::Float(0.0)).min(0.0));

    // --- shortcuts ------------------------------------------------------
    def.add(
        OptionDef::new("solid_layers", K::Int, V::Int(3))
            .min(0.0)
            .shortcut(&["top_solid_layers", "bottom_solid_layers"])
            .describe("Sets both top and bottom solid layer counts"),
    );
    def.add(OptionDef::new(
        "external_fill_pattern",
        K::Enum(&INFILL_PATTERN_TABLE),
        V::Enum(InfillPattern::Rectilinear.tag()),
    )
    .shortcut(&["top_infill_pattern", "bottom_infill_pattern"]));
    def.add(
        OptionDef::new("extruder", K::Int, V::Int(1))
            .min(0.0)
            .shortcut(&[
                "perimeter_extruder",
                "infill_extruder",
                "solid_infill_extruder",
                "support_material_extruder",
                "support_material_interface_extruder",
            ])
            .deferred()
            .describe("Sets every role-specific extruder that is still unset"),
    );

    // --- host scope -----------------------------------------------------
    def.add(OptionDef::new("print_host", K::Str, V::String(String::new()))
        .aliases(&["octoprint_host"]));
    def.add(OptionDef::new("host_api_key", K::Str, V::String(String::new())));

    def
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lookup_and_alias() {
        let def = print_config_def();
        assert!(def.has("layer_height"));
        assert!(!def.has("no_such_option"));
        assert_eq!(def.resolve("infill_density").map(|d| d.key), Some("fill_density"));
    }

    #[test]
    fn test_deserialize_kinds() {
        let def = print_config_def();
        assert_eq!(
            def.get("fill_density").unwrap().deserialize("42%").unwrap(),
            OptionValue::Percent(42.0)
        );
        assert_eq!(
            def.get("first_layer_height").unwrap().deserialize("0.42").unwrap(),
            OptionValue::FloatOrPercent(FloatOrPercent::absolute(0.42))
        );
        assert_eq!(
            def.get("nozzle_diameter").unwrap().deserialize("0.4,0.6").unwrap(),
            OptionValue::Floats(vec![0.4, 0.6])
        );
        assert_eq!(
            def.get("fill_pattern").unwrap().deserialize("rectilinear-grid").unwrap(),
            OptionValue::Enum(InfillPattern::Grid.tag())
        );
    }

    #[test]
    fn test_range_validation() {
        let def = print_config_def();
        assert!(def.get("fill_density").unwrap().deserialize("140%").is_err());
        assert!(def.get("perimeters").unwrap().deserialize("-1").is_err());
        assert!(def.get("layer_height").unwrap().deserialize("abc").is_err());
    }
}
