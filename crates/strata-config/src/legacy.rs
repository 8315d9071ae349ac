//! Legacy option rewriting.
//!
//! Historical configs are full of renamed keys, retyped values and options
//! that no longer exist. `rewrite` maps an incoming `(key, value)` pair to
//! its current form, or to nothing when the option was retired (a silent
//! no-op by contract, so decade-old configs still load).

/// Rewrite a legacy `(key, value)` pair.
///
/// Returns `None` when the key is retired; otherwise the pair to use. Keys
/// unknown to this table pass through unchanged (schema validation decides
/// their fate).
pub fn rewrite(key: &str, value: &str) -> Option<(String, String)> {
    // renamed ratio options became percent values
    if let Some(stripped) = key.strip_suffix("_ratio") {
        if matches!(stripped, "extrusion_width" | "first_layer_height") {
            let rewritten = match value.parse::<f64>() {
                Ok(v) if v != 0.0 => format!("{}%", v * 100.0),
                _ => "0".to_string(),
            };
            return Some((stripped.to_string(), rewritten));
        }
    }

    match key {
        // fill_density was turned into a percent value
        "fill_density" if !value.contains('%') => {
            let rewritten = match value.parse::<f64>() {
                Ok(v) => format!("{}%", v * 100.0),
                Err(_) => value.to_string(),
            };
            Some((key.to_string(), rewritten))
        }
        // the boolean became a seam policy
        "randomize_start" if value == "1" => {
            Some(("seam_position".to_string(), "random".to_string()))
        }
        "randomize_start" => None,
        // zero used to mean "automatic threshold"
        "support_material_threshold" if value == "0" => {
            Some((key.to_string(), "60%".to_string()))
        }
        // cemetery of removed options
        "duplicate_x" | "duplicate_y" | "multiply_x" | "multiply_y" | "support_material_tool"
        | "acceleration" | "adjust_overhang_flow" | "standby_temperature" | "scale" | "rotate"
        | "duplicate" | "duplicate_grid" | "start_perimeters_at_concave_points"
        | "start_perimeters_at_non_overhang" | "seal_position" | "bed_size" | "print_center"
        | "g0" => None,
        _ => Some((key.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_rewrite() {
        assert_eq!(
            rewrite("extrusion_width_ratio", "0.9"),
            Some(("extrusion_width".to_string(), "90%".to_string()))
        );
        assert_eq!(
            rewrite("extrusion_width_ratio", "junk"),
            Some(("extrusion_width".to_string(), "0".to_string()))
        );
    }

    #[test]
    fn test_fill_density_fraction() {
        assert_eq!(
            rewrite("fill_density", "0.4"),
            Some(("fill_density".to_string(), "40%".to_string()))
        );
        assert_eq!(
            rewrite("fill_density", "40%"),
            Some(("fill_density".to_string(), "40%".to_string()))
        );
    }

    #[test]
    fn test_retired_keys_vanish() {
        assert_eq!(rewrite("duplicate_grid", "2x2"), None);
        assert_eq!(rewrite("randomize_start", "0"), None);
    }

    #[test]
    fn test_randomize_start_becomes_seam() {
        assert_eq!(
            rewrite("randomize_start", "1"),
            Some(("seam_position".to_string(), "random".to_string()))
        );
    }
}
