//! Classified slice surfaces.

use serde::{Deserialize, Serialize};

use strata_geometry::{ExPolygon, Polygon, Polygons};

/// Where a surface sits relative to its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfacePosition {
    /// Not covered by the layer above.
    Top,
    /// Not supported by the layer below.
    Bottom,
    /// Surrounded by material on both sides.
    Internal,
    /// Transient marker used while composing perimeters.
    Perimeter,
}

/// How densely a surface will be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceDensity {
    /// Fully filled.
    Solid,
    /// Filled at the configured infill density.
    Sparse,
    /// Intentionally left empty.
    Void,
}

/// Extra semantics attached to a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceModifier {
    /// No modifier.
    None,
    /// Spans unsupported air and is extruded with bridge flow.
    Bridge,
    /// Sits directly on a bridge and compensates its sag.
    OverBridge,
}

/// The three orthogonal labels of a surface.
///
/// Every surface has exactly one position and one density; modifiers are
/// exclusive. Comparison is by named fields; the bit encoding exists only
/// for compact serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceType {
    /// Position group.
    pub position: SurfacePosition,
    /// Density group.
    pub density: SurfaceDensity,
    /// Modifier group.
    pub modifier: SurfaceModifier,
}

impl SurfaceType {
    /// A surface type with no modifier.
    pub const fn new(position: SurfacePosition, density: SurfaceDensity) -> Self {
        Self {
            position,
            density,
            modifier: SurfaceModifier::None,
        }
    }

    /// The same type with a modifier attached.
    pub const fn with_modifier(mut self, modifier: SurfaceModifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Top solid surface.
    pub const TOP: Self = Self::new(SurfacePosition::Top, SurfaceDensity::Solid);
    /// Bottom solid surface.
    pub const BOTTOM: Self = Self::new(SurfacePosition::Bottom, SurfaceDensity::Solid);
    /// Bottom solid surface extruded as a bridge.
    pub const BOTTOM_BRIDGE: Self =
        Self::new(SurfacePosition::Bottom, SurfaceDensity::Solid).with_modifier(SurfaceModifier::Bridge);
    /// Sparse internal surface.
    pub const INTERNAL: Self = Self::new(SurfacePosition::Internal, SurfaceDensity::Sparse);
    /// Solid internal surface.
    pub const INTERNAL_SOLID: Self = Self::new(SurfacePosition::Internal, SurfaceDensity::Solid);
    /// Internal bridge over sparse infill.
    pub const INTERNAL_BRIDGE: Self =
        Self::new(SurfacePosition::Internal, SurfaceDensity::Solid).with_modifier(SurfaceModifier::Bridge);
    /// Solid layer right above an internal bridge.
    pub const INTERNAL_OVERBRIDGE: Self = Self::new(SurfacePosition::Internal, SurfaceDensity::Solid)
        .with_modifier(SurfaceModifier::OverBridge);
    /// Internal void left by infill combination.
    pub const INTERNAL_VOID: Self = Self::new(SurfacePosition::Internal, SurfaceDensity::Void);

    /// True for top surfaces.
    pub fn is_top(&self) -> bool {
        self.position == SurfacePosition::Top
    }

    /// True for bottom surfaces.
    pub fn is_bottom(&self) -> bool {
        self.position == SurfacePosition::Bottom
    }

    /// True for internal surfaces.
    pub fn is_internal(&self) -> bool {
        self.position == SurfacePosition::Internal
    }

    /// True for top and bottom surfaces.
    pub fn is_external(&self) -> bool {
        self.is_top() || self.is_bottom()
    }

    /// True for solid surfaces.
    pub fn is_solid(&self) -> bool {
        self.density == SurfaceDensity::Solid
    }

    /// True for bridging surfaces.
    pub fn is_bridge(&self) -> bool {
        self.modifier == SurfaceModifier::Bridge
    }

    /// Compact bit encoding: position in bits 0-1, density in bits 2-3,
    /// modifier in bits 4-5.
    pub fn to_bits(self) -> u8 {
        let p = match self.position {
            SurfacePosition::Top => 0u8,
            SurfacePosition::Bottom => 1,
            SurfacePosition::Internal => 2,
            SurfacePosition::Perimeter => 3,
        };
        let d = match self.density {
            SurfaceDensity::Solid => 0u8,
            SurfaceDensity::Sparse => 1,
            SurfaceDensity::Void => 2,
        };
        let m = match self.modifier {
            SurfaceModifier::None => 0u8,
            SurfaceModifier::Bridge => 1,
            SurfaceModifier::OverBridge => 2,
        };
        p | (d << 2) | (m << 4)
    }

    /// Decode the compact bit encoding.
    pub fn from_bits(bits: u8) -> Option<Self> {
        let position = match bits & 0b11 {
            0 => SurfacePosition::Top,
            1 => SurfacePosition::Bottom,
            2 => SurfacePosition::Internal,
            _ => SurfacePosition::Perimeter,
        };
        let density = match (bits >> 2) & 0b11 {
            0 => SurfaceDensity::Solid,
            1 => SurfaceDensity::Sparse,
            2 => SurfaceDensity::Void,
            _ => return None,
        };
        let modifier = match (bits >> 4) & 0b11 {
            0 => SurfaceModifier::None,
            1 => SurfaceModifier::Bridge,
            2 => SurfaceModifier::OverBridge,
            _ => return None,
        };
        Some(Self {
            position,
            density,
            modifier,
        })
    }
}

/// A classified region of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Classification labels.
    pub surface_type: SurfaceType,
    /// The region shape.
    pub expolygon: ExPolygon,
    /// How many object layers this fill spans (infill combination).
    pub thickness_layers: u32,
    /// Direction bridges are extruded along, radians; `None` when not a
    /// bridge or when no anchor direction was found.
    pub bridge_angle: Option<f64>,
    /// Additional perimeter loops requested for this surface.
    pub extra_perimeters: u32,
}

impl Surface {
    /// A plain surface with default attributes.
    pub fn new(surface_type: SurfaceType, expolygon: ExPolygon) -> Self {
        Self {
            surface_type,
            expolygon,
            thickness_layers: 1,
            bridge_angle: None,
            extra_perimeters: 0,
        }
    }

    /// Clone attributes onto a different shape.
    pub fn clone_with_shape(&self, expolygon: ExPolygon) -> Self {
        Self {
            expolygon,
            ..self.clone()
        }
    }

    /// Net area of the shape.
    pub fn area(&self) -> f64 {
        self.expolygon.area()
    }

    /// The shape's rings.
    pub fn to_polygons(&self) -> Polygons {
        self.expolygon.to_polygons()
    }

    /// The outer contour.
    pub fn contour(&self) -> &Polygon {
        &self.expolygon.contour
    }

    /// Surfaces can merge when every attribute but the shape matches.
    pub fn can_merge_with(&self, other: &Surface) -> bool {
        self.surface_type == other.surface_type
            && self.thickness_layers == other.thickness_layers
            && self.bridge_angle == other.bridge_angle
            && self.extra_perimeters == other.extra_perimeters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_groups() {
        let t = SurfaceType::INTERNAL_BRIDGE;
        assert!(t.is_internal());
        assert!(t.is_solid());
        assert!(t.is_bridge());
        assert!(!t.is_external());
    }

    #[test]
    fn test_bits_round_trip() {
        for t in [
            SurfaceType::TOP,
            SurfaceType::BOTTOM_BRIDGE,
            SurfaceType::INTERNAL,
            SurfaceType::INTERNAL_VOID,
            SurfaceType::INTERNAL_OVERBRIDGE,
            SurfaceType::new(SurfacePosition::Perimeter, SurfaceDensity::Sparse),
        ] {
            assert_eq!(SurfaceType::from_bits(t.to_bits()), Some(t));
        }
    }

    #[test]
    fn test_can_merge_with() {
        let a = Surface::new(SurfaceType::TOP, ExPolygon::default());
        let mut b = a.clone();
        assert!(a.can_merge_with(&b));
        b.extra_perimeters = 2;
        assert!(!a.can_merge_with(&b));
    }
}
