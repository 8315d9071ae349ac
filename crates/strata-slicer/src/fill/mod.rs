//! Fill pattern implementations.
//!
//! Every pattern exposes the same operation: given an expolygon, a
//! direction, a minimum spacing, a density and the `dont_adjust` flag,
//! return polylines covering the region at the target line distance.

pub mod concentric;
pub mod honeycomb;
pub mod rectilinear;

pub use concentric::FillConcentric;
pub use honeycomb::FillHoneycomb;
pub use rectilinear::{FillGrid, FillRectilinear, FillTriangles};

use strata_config::InfillPattern;
use strata_geometry::{offset_expolygons, scale, BoundingBox, ExPolygon, Point, Polylines};

use crate::surface::Surface;

/// Parameters shared by all fill invocations.
#[derive(Debug, Clone)]
pub struct FillParams {
    /// Line density in `0..=1`; 1 is solid.
    pub density: f64,
    /// Use the spacing verbatim instead of stretching it to an integer
    /// number of lines.
    pub dont_adjust: bool,
    /// Layer index, used by patterns that alternate direction per layer.
    pub layer_id: Option<usize>,
    /// Base fill angle in radians.
    pub angle: f64,
    /// Minimum centerline spacing in millimeters.
    pub spacing: f64,
    /// Reference frame for pattern alignment across layers and islands;
    /// usually the object's bounding box.
    pub bounding_box: Option<BoundingBox>,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            density: 1.0,
            dont_adjust: false,
            layer_id: None,
            angle: 0.0,
            spacing: 0.45,
            bounding_box: None,
        }
    }
}

/// A fill pattern.
pub trait Fill: Send + Sync {
    /// The produced paths must be emitted in order (concentric fill).
    fn no_sort(&self) -> bool {
        false
    }

    /// Additional rotation applied at the given layer.
    fn layer_angle(&self, layer_id: usize) -> f64 {
        if layer_id % 2 == 1 {
            std::f64::consts::FRAC_PI_2
        } else {
            0.0
        }
    }

    /// Fill one expolygon; `direction` is `(angle, reference point)`.
    fn fill_expolygon(
        &self,
        expolygon: &ExPolygon,
        direction: (f64, Point),
        params: &FillParams,
    ) -> Polylines;

    /// Fill a surface: inset by half a spacing so the fill does not squeeze
    /// against the perimeters, then fill each resulting island.
    fn fill_surface(&self, surface: &Surface, params: &FillParams) -> Polylines {
        let spacing_scaled = scale(params.spacing) as f64;
        let insets = offset_expolygons(
            std::slice::from_ref(&surface.expolygon),
            -0.5 * spacing_scaled,
        );
        let direction = infill_direction(self, surface, params);
        insets
            .iter()
            .flat_map(|ex| self.fill_expolygon(ex, direction, params))
            .collect()
    }
}

/// Resolve the rotation and the reference point of the pattern.
///
/// A bridge surface overrides the angle with its detected bridge direction;
/// otherwise the pattern's per-layer rotation applies, scaled down by the
/// surface thickness when several layers are combined.
pub fn infill_direction<F: Fill + ?Sized>(
    fill: &F,
    surface: &Surface,
    params: &FillParams,
) -> (f64, Point) {
    let mut angle = params.angle;
    let shift = params
        .bounding_box
        .filter(|bb| bb.defined)
        .map(|bb| bb.center())
        .unwrap_or_else(|| surface.expolygon.bounding_box().center());

    if let Some(bridge_angle) = surface.bridge_angle {
        angle = bridge_angle;
    } else if let Some(layer_id) = params.layer_id {
        angle += fill.layer_angle(layer_id / surface.thickness_layers.max(1) as usize);
    }
    angle += std::f64::consts::FRAC_PI_2;
    (angle, shift)
}

/// Instantiate the pattern implementation for a configured pattern.
pub fn make_fill(pattern: InfillPattern) -> Box<dyn Fill> {
    match pattern {
        InfillPattern::Rectilinear => Box::new(FillRectilinear::default()),
        InfillPattern::Grid => Box::new(FillGrid),
        InfillPattern::Triangles => Box::new(FillTriangles),
        InfillPattern::Honeycomb => Box::new(FillHoneycomb),
        InfillPattern::Concentric => Box::new(FillConcentric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Surface, SurfaceType};
    use strata_geometry::Polygon;

    fn square_surface(side_mm: f64) -> Surface {
        let side = scale(side_mm);
        Surface::new(
            SurfaceType::INTERNAL,
            ExPolygon::from_contour(Polygon::new(vec![
                Point::new(0, 0),
                Point::new(side, 0),
                Point::new(side, side),
                Point::new(0, side),
            ])),
        )
    }

    #[test]
    fn test_every_pattern_produces_paths() {
        for pattern in [
            InfillPattern::Rectilinear,
            InfillPattern::Grid,
            InfillPattern::Triangles,
            InfillPattern::Honeycomb,
            InfillPattern::Concentric,
        ] {
            let fill = make_fill(pattern);
            let params = FillParams {
                density: 0.4,
                spacing: 0.5,
                layer_id: Some(4),
                ..FillParams::default()
            };
            let paths = fill.fill_surface(&square_surface(30.0), &params);
            assert!(!paths.is_empty(), "{pattern:?} produced no paths");
        }
    }

    #[test]
    fn test_bridge_angle_overrides_direction() {
        let fill = make_fill(InfillPattern::Rectilinear);
        let mut surface = square_surface(10.0);
        surface.bridge_angle = Some(1.0);
        let params = FillParams {
            layer_id: Some(7),
            angle: 0.3,
            ..FillParams::default()
        };
        let (angle, _) = infill_direction(fill.as_ref(), &surface, &params);
        assert!((angle - (1.0 + std::f64::consts::FRAC_PI_2)).abs() < 1e-12);
    }
}
