//! Extrusion cross-section math.
//!
//! A [`Flow`] maps a semantic role, a nozzle diameter and a layer height to
//! the centerline spacing between adjacent extrusions and the volume pushed
//! per head-move unit. Normal extrusions are modeled as a rectangle with two
//! semicircular caps of diameter `height`; bridges as a circle of diameter
//! `width`.

use serde::{Deserialize, Serialize};

use strata_config::FloatOrPercent;
use strata_geometry::scale;

use crate::error::{Result, SlicerError};

/// Fraction of the nozzle diameter left as a gap between bridge threads.
pub const BRIDGE_EXTRA_SPACING_MULT: f64 = 0.05;

/// The semantic role an extrusion width is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowRole {
    /// Inner perimeter loops.
    Perimeter,
    /// Outermost perimeter loop.
    ExternalPerimeter,
    /// Sparse internal infill.
    Infill,
    /// Solid internal infill.
    SolidInfill,
    /// Topmost solid infill.
    TopSolidInfill,
    /// Support material base and contact.
    SupportMaterial,
    /// Support material interface layers.
    SupportMaterialInterface,
}

/// A sane default extrusion width for a role, as a multiple of the nozzle
/// diameter.
pub fn auto_extrusion_width(role: FlowRole, nozzle_diameter: f64) -> f64 {
    match role {
        FlowRole::SupportMaterial
        | FlowRole::SupportMaterialInterface
        | FlowRole::TopSolidInfill
        | FlowRole::ExternalPerimeter => 1.05 * nozzle_diameter,
        FlowRole::Perimeter | FlowRole::SolidInfill | FlowRole::Infill => 1.125 * nozzle_diameter,
    }
}

/// An immutable extrusion cross-section descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Extrusion width in millimeters.
    pub width: f64,
    /// Layer height in millimeters; equals `width` for bridges.
    pub height: f64,
    /// Nozzle diameter in millimeters.
    pub nozzle_diameter: f64,
    /// Fraction of the theoretical thread overlap actually applied.
    pub spacing_ratio: f64,
    /// Bridge flows have a circular cross-section.
    pub bridge: bool,
    /// The role the flow was derived for, kept for error reporting.
    pub role: FlowRole,
}

impl Flow {
    /// Build a flow from a configured width.
    ///
    /// A zero width picks the automatic role default; a percent width is
    /// resolved against the layer height. A positive `bridge_flow_ratio`
    /// overrides everything with a circular cross-section of diameter
    /// `sqrt(ratio) * nozzle_diameter`.
    pub fn new_from_config_width(
        role: FlowRole,
        width: FloatOrPercent,
        nozzle_diameter: f64,
        height: f64,
        spacing_ratio: f64,
        bridge_flow_ratio: f64,
    ) -> Result<Flow> {
        if height <= 0.0 && bridge_flow_ratio == 0.0 {
            return Err(SlicerError::InvalidFlowHeight(role));
        }

        let (w, h, bridge) = if bridge_flow_ratio > 0.0 {
            // a ratio of exactly 1 avoids the square root
            let w = if bridge_flow_ratio == 1.0 {
                nozzle_diameter
            } else {
                bridge_flow_ratio.sqrt() * nozzle_diameter
            };
            (w, w, true)
        } else if !width.percent && width.value <= 0.0 {
            (auto_extrusion_width(role, nozzle_diameter), height, false)
        } else {
            (width.get_abs_value(height), height, false)
        };

        Ok(Flow {
            width: w,
            height: h,
            nozzle_diameter,
            spacing_ratio,
            bridge,
            role,
        })
    }

    /// Build a flow from a desired centerline spacing.
    pub fn new_from_spacing(
        spacing: f64,
        nozzle_diameter: f64,
        height: f64,
        spacing_ratio: f64,
        bridge: bool,
        role: FlowRole,
    ) -> Result<Flow> {
        if height <= 0.0 && !bridge {
            return Err(SlicerError::InvalidFlowHeight(role));
        }
        let width = if bridge {
            spacing - BRIDGE_EXTRA_SPACING_MULT * nozzle_diameter
        } else {
            spacing + height * (1.0 - 0.25 * std::f64::consts::PI) * spacing_ratio
        };
        Ok(Flow {
            width,
            height: if bridge { width } else { height },
            nozzle_diameter,
            spacing_ratio,
            bridge,
            role,
        })
    }

    /// Centerline spacing between two adjacent extrusions of this flow.
    pub fn spacing(&self) -> Result<f64> {
        let spacing = if self.bridge {
            self.width + BRIDGE_EXTRA_SPACING_MULT * self.nozzle_diameter
        } else {
            self.width - self.height * (1.0 - 0.25 * std::f64::consts::PI) * self.spacing_ratio
        };
        if spacing <= 0.0 {
            return Err(SlicerError::NegativeSpacing(self.role));
        }
        Ok(spacing)
    }

    /// Centerline spacing between an extrusion of this flow and one of
    /// `other`. Symmetric: `a.spacing_to(b) == b.spacing_to(a)`.
    pub fn spacing_to(&self, other: &Flow) -> Result<f64> {
        let spacing = if self.bridge {
            0.5 * self.width + 0.5 * other.width + BRIDGE_EXTRA_SPACING_MULT * self.nozzle_diameter
        } else {
            0.5 * self.spacing()? + 0.5 * other.spacing()?
        };
        if spacing <= 0.0 {
            return Err(SlicerError::NegativeSpacing(self.role));
        }
        Ok(spacing)
    }

    /// Extrusion volume per head-move unit, in mm³/mm.
    pub fn mm3_per_mm(&self) -> Result<f64> {
        let rate = if self.bridge {
            // area of a circle with diameter `width`
            self.width * self.width * 0.25 * std::f64::consts::PI
        } else {
            // rectangle with semicircular caps: h * (w - 0.215 h)
            self.height * (self.width - self.height * (1.0 - 0.25 * std::f64::consts::PI))
        };
        if rate <= 0.0 {
            return Err(SlicerError::NegativeFlow(self.role));
        }
        Ok(rate)
    }

    /// Width in scaled units.
    pub fn scaled_width(&self) -> i64 {
        scale(self.width)
    }

    /// Spacing in scaled units.
    pub fn scaled_spacing(&self) -> Result<i64> {
        Ok(scale(self.spacing()?))
    }

    /// Replace the width so that `total_width` is filled by an integer
    /// number of lines (used to align skirt/brim bands).
    pub fn set_solid_spacing(&mut self, total_width: f64) -> Result<()> {
        let spacing = self.spacing()?;
        let scaled_total = scale(total_width);
        let scaled_spacing = scale(spacing);
        if scaled_total > 0 && scaled_spacing > 0 {
            let adjusted = solid_spacing(scaled_total, scaled_spacing);
            let delta = (adjusted - scaled_spacing) as f64 * strata_geometry::SCALING_FACTOR;
            self.width += delta;
        }
        Ok(())
    }
}

/// Stretch `distance` so that `width / distance` is an integer, with the
/// first and last lines centered on the interval ends.
///
/// The distance is never decreased and the increase is capped at 20%, so a
/// narrow band cannot blow the spacing up arbitrarily.
pub fn solid_spacing(width: i64, distance: i64) -> i64 {
    debug_assert!(width >= 0);
    debug_assert!(distance > 0);
    let eps = strata_geometry::SCALED_EPSILON;
    let intervals = (width - eps) / distance;
    let adjusted = if intervals == 0 {
        distance
    } else {
        (width - eps) / intervals
    };
    let factor = adjusted as f64 / distance as f64;
    if factor > 1.2 {
        (distance as f64 * 1.2 + 0.5).floor() as i64
    } else {
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plain(width: f64, height: f64) -> Flow {
        Flow {
            width,
            height,
            nozzle_diameter: 0.4,
            spacing_ratio: 1.0,
            bridge: false,
            role: FlowRole::Perimeter,
        }
    }

    #[test]
    fn test_spacing_and_volume() {
        let flow = plain(0.45, 0.2);
        let spacing = flow.spacing().unwrap();
        assert_relative_eq!(spacing, 0.45 - 0.2 * (1.0 - 0.25 * std::f64::consts::PI));
        assert_relative_eq!(
            flow.mm3_per_mm().unwrap(),
            0.2 * (0.45 - 0.2 * (1.0 - 0.25 * std::f64::consts::PI))
        );
    }

    #[test]
    fn test_bridge_flow_is_circular() {
        let flow = Flow::new_from_config_width(
            FlowRole::SolidInfill,
            FloatOrPercent::absolute(0.0),
            0.4,
            0.2,
            1.0,
            1.0,
        )
        .unwrap();
        assert!(flow.bridge);
        assert_relative_eq!(flow.width, 0.4);
        assert_relative_eq!(flow.height, 0.4);
        assert_relative_eq!(
            flow.mm3_per_mm().unwrap(),
            0.25 * std::f64::consts::PI * 0.16
        );
    }

    #[test]
    fn test_auto_width() {
        let flow = Flow::new_from_config_width(
            FlowRole::ExternalPerimeter,
            FloatOrPercent::absolute(0.0),
            0.4,
            0.2,
            1.0,
            0.0,
        )
        .unwrap();
        assert_relative_eq!(flow.width, 1.05 * 0.4);
        let flow = Flow::new_from_config_width(
            FlowRole::Infill,
            FloatOrPercent::absolute(0.0),
            0.4,
            0.2,
            1.0,
            0.0,
        )
        .unwrap();
        assert_relative_eq!(flow.width, 1.125 * 0.4);
    }

    #[test]
    fn test_percent_width_resolves_against_height() {
        let flow = Flow::new_from_config_width(
            FlowRole::Perimeter,
            FloatOrPercent::percent(200.0),
            0.4,
            0.25,
            1.0,
            0.0,
        )
        .unwrap();
        assert_relative_eq!(flow.width, 0.5);
    }

    #[test]
    fn test_spacing_symmetry() {
        let a = plain(0.45, 0.2);
        let b = plain(0.6, 0.2);
        assert_relative_eq!(
            a.spacing_to(&b).unwrap(),
            b.spacing_to(&a).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_negative_spacing_is_an_error() {
        let flow = plain(0.01, 0.4);
        assert!(matches!(
            flow.spacing(),
            Err(SlicerError::NegativeSpacing(FlowRole::Perimeter))
        ));
    }

    #[test]
    fn test_spacing_round_trip() {
        let original = plain(0.45, 0.2);
        let spacing = original.spacing().unwrap();
        let rebuilt =
            Flow::new_from_spacing(spacing, 0.4, 0.2, 1.0, false, FlowRole::Perimeter).unwrap();
        assert_relative_eq!(rebuilt.width, original.width, epsilon = 1e-12);
    }

    #[test]
    fn test_solid_spacing_integrality() {
        for (width, distance) in [(10_000_000i64, 300_000i64), (999_999, 250_000), (5_000_000, 333_333)] {
            let adjusted = solid_spacing(width, distance);
            assert!(adjusted >= distance);
            assert!(adjusted as f64 <= distance as f64 * 1.2 + 1.0);
            if adjusted as f64 / distance as f64 <= 1.2 {
                // an integer number of intervals fits
                let intervals = (width - strata_geometry::SCALED_EPSILON) / adjusted;
                assert!(intervals * adjusted <= width);
                assert!((intervals + 1) * adjusted > width - strata_geometry::SCALED_EPSILON);
            }
        }
    }
}
