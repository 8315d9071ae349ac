//! Layer-height planning: the Z positions every other step builds on.

use strata_geometry::scale;

use crate::adaptive::SlicingAdaptive;
use crate::spline::LayerHeightSpline;

/// Everything the planner needs, resolved from the configs by the caller.
#[derive(Debug, Clone)]
pub struct LayerHeightParams {
    /// Configured layer height in millimeters.
    pub layer_height: f64,
    /// Resolved first layer height; zero when a raft replaces it.
    pub first_layer_height: f64,
    /// Strictest lower bound over the extruders involved.
    pub min_layer_height: f64,
    /// Strictest upper bound over the extruders involved.
    pub max_layer_height: f64,
    /// Smallest nozzle involved; caps the static layer height.
    pub min_nozzle_diameter: f64,
    /// Full Z steps per millimeter; zero disables gradation.
    pub z_steps_per_mm: f64,
    /// Use adaptive facet-driven heights.
    pub adaptive: bool,
    /// Adaptive quality in percent (100 = finest).
    pub adaptive_quality: f64,
    /// Land layers exactly on horizontal features.
    pub match_horizontal_surfaces: bool,
    /// User overrides: `((lo, hi), height)` forces the height inside a Z
    /// band.
    pub layer_height_ranges: Vec<((f64, f64), f64)>,
    /// Object height in millimeters.
    pub object_height: f64,
}

/// Snap a height to the printer's four-full-step quantum.
pub fn adjust_layer_height(layer_height: f64, z_steps_per_mm: f64) -> f64 {
    if z_steps_per_mm > 0.0 {
        let min_dz = 1.0 / z_steps_per_mm * 4.0;
        let result = (layer_height / min_dz + 0.5).floor() * min_dz;
        if result > 0.0 {
            return result;
        }
    }
    layer_height
}

/// Generate the strictly increasing `print_z` sequence for an object, in
/// object coordinates (a raft shifts them later).
///
/// When the spline is valid and the `Layers` step is already done, the
/// sequence is re-read from the spline's interpolation so interactive edits
/// survive; otherwise a fresh sequence is generated and stored into the
/// spline.
pub fn generate_object_layers(
    params: &LayerHeightParams,
    adaptive: &mut SlicingAdaptive,
    spline: &mut LayerHeightSpline,
    layers_done: bool,
) -> Vec<f64> {
    let layer_height = adjust_layer_height(
        params.layer_height.min(params.min_nozzle_diameter),
        params.z_steps_per_mm,
    );

    spline.set_object_height(params.object_height);

    let mut result: Vec<f64> = Vec::new();
    if layers_done && spline.is_valid() {
        // layer heights were already generated; read edits back from the
        // spline interpolation
        result = spline.interpolated_layers();
    } else {
        if params.first_layer_height > 0.0 {
            result.push(params.first_layer_height);
        }
        let mut print_z = params.first_layer_height;

        if params.adaptive {
            adaptive.prepare(params.object_height);
        }

        while print_z < params.object_height {
            let mut height = if params.adaptive {
                let mut h = adaptive.next_layer_height(
                    print_z,
                    params.adaptive_quality,
                    params.min_layer_height,
                    params.max_layer_height,
                );
                if params.match_horizontal_surfaces {
                    if let Some(offset) =
                        adaptive.nearest_horizontal_offset(print_z + h, params.min_layer_height)
                    {
                        if offset > 0.0 {
                            // a flat feature slightly above: shrink so one
                            // more layer fits under it, else widen onto it
                            if h - (params.min_layer_height - offset) > params.min_layer_height {
                                h -= params.min_layer_height - offset;
                            } else {
                                h += offset;
                            }
                        } else if h + offset >= params.min_layer_height {
                            // slight overshoot: pull the layer down onto it
                            h += offset;
                        }
                    }
                }
                h
            } else {
                layer_height
            };

            // user-provided layer height ranges win
            for ((lo, hi), range_height) in &params.layer_height_ranges {
                if print_z >= *lo && print_z <= *hi && *range_height > 0.0 {
                    height = *range_height;
                }
            }

            print_z += height;
            result.push(print_z);
        }

        // reduce or thicken the top layer to match the object height
        if result.len() > 1 && !params.adaptive {
            let diff = result[result.len() - 1] - params.object_height;
            let last = result.len() - 1;
            let old_h = result[last] - result[last - 1];
            if diff < 0.0 {
                let new_h = params.min_nozzle_diameter.min(old_h - diff);
                result[last] = result[last - 1] + new_h;
            } else if params.min_nozzle_diameter / 2.0 < old_h {
                // don't generate a top layer thinner than half a nozzle
                let new_h = (params.min_nozzle_diameter / 2.0).max(old_h - diff);
                result[last] = result[last - 1] + new_h;
            }
        }

        spline.set_layers(&result);
    }

    // z gradation snaps every layer boundary to four full steps
    if params.z_steps_per_mm > 0.0 {
        let gradation = 1.0 / params.z_steps_per_mm * 4.0;
        let gradation_scaled = scale(gradation);
        let mut last_z = 0.0;
        for z in &mut result {
            let mut height = *z - last_z;
            let effect = (scale(height).rem_euclid(gradation_scaled)) as f64
                * strata_geometry::SCALING_FACTOR;
            if effect > gradation / 2.0 && height + (gradation - effect) <= params.max_layer_height
            {
                height += gradation - effect;
            } else {
                height -= effect;
            }
            height = height.clamp(params.min_layer_height, params.max_layer_height);
            *z = last_z + height;
            last_z = *z;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn static_params(layer_height: f64, first: f64, nozzle: f64, height: f64) -> LayerHeightParams {
        LayerHeightParams {
            layer_height,
            first_layer_height: first,
            min_layer_height: 0.05,
            max_layer_height: 100.0,
            min_nozzle_diameter: nozzle,
            z_steps_per_mm: 0.0,
            adaptive: false,
            adaptive_quality: 75.0,
            match_horizontal_surfaces: false,
            layer_height_ranges: Vec::new(),
            object_height: height,
        }
    }

    #[test]
    fn test_static_layers_cube() {
        // 20mm cube at 2mm layers lands exactly on every even Z
        let params = static_params(2.0, 2.0, 3.0, 20.0);
        let mut adaptive = SlicingAdaptive::new();
        let mut spline = LayerHeightSpline::new(20.0);
        let zs = generate_object_layers(&params, &mut adaptive, &mut spline, false);
        assert_eq!(zs.len(), 10);
        for (i, z) in zs.iter().enumerate() {
            assert_relative_eq!(*z, (i as f64 + 1.0) * 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_thick_layers_cap_top() {
        // 10mm layers on a 20mm cube: the last layer is shortened to land
        // on the object top
        let params = static_params(10.0, 2.0, 11.0, 20.0);
        let mut adaptive = SlicingAdaptive::new();
        let mut spline = LayerHeightSpline::new(20.0);
        let zs = generate_object_layers(&params, &mut adaptive, &mut spline, false);
        assert_eq!(zs.len(), 3);
        assert_relative_eq!(zs[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(zs[1], 12.0, epsilon = 1e-9);
        assert_relative_eq!(zs[2], 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_layer_height_ranges() {
        let mut params = static_params(0.3, 0.3, 0.5, 10.0);
        params.layer_height_ranges = vec![((2.0, 5.0), 0.1)];
        let mut adaptive = SlicingAdaptive::new();
        let mut spline = LayerHeightSpline::new(10.0);
        let zs = generate_object_layers(&params, &mut adaptive, &mut spline, false);
        // inside the band the increments are 0.1
        let heights: Vec<f64> = zs.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(heights
            .iter()
            .zip(zs.iter())
            .filter(|(_, z)| **z > 2.2 && **z < 5.0)
            .all(|(h, _)| (*h - 0.1).abs() < 1e-9));
    }

    #[test]
    fn test_gradation_snaps_heights() {
        let mut params = static_params(0.25, 0.25, 0.5, 5.0);
        params.z_steps_per_mm = 400.0;
        params.min_layer_height = 0.01;
        params.max_layer_height = 0.5;
        let mut adaptive = SlicingAdaptive::new();
        let mut spline = LayerHeightSpline::new(5.0);
        let zs = generate_object_layers(&params, &mut adaptive, &mut spline, false);
        let quantum = 4.0 / 400.0;
        let mut last = 0.0;
        for z in zs {
            let height = z - last;
            let remainder = (height / quantum).round() * quantum - height;
            assert!(remainder.abs() < 1e-6, "height {height} not on the quantum");
            last = z;
        }
    }

    #[test]
    fn test_spline_reread_when_done() {
        let params = static_params(0.2, 0.2, 0.5, 4.0);
        let mut adaptive = SlicingAdaptive::new();
        let mut spline = LayerHeightSpline::new(4.0);
        let first = generate_object_layers(&params, &mut adaptive, &mut spline, false);
        // a user edit flows back through the spline on the next run
        spline.set_layer_height(2.0, 0.3, 0.1, 0.4);
        let second = generate_object_layers(&params, &mut adaptive, &mut spline, true);
        assert_ne!(first, second);
    }
}
