//! Configuration enums and their string bridging tables.
//!
//! Each enum carries a single `(string, tag)` table; parsing and
//! serialization are both generated from it, and stale strings are folded to
//! current tags through the alias list at parse time.

use serde::{Deserialize, Serialize};

/// One enum's bidirectional string map.
#[derive(Debug)]
pub struct EnumTable {
    /// Enum name, for diagnostics.
    pub name: &'static str,
    /// Current `(string, tag)` pairs.
    pub entries: &'static [(&'static str, u32)],
    /// Stale strings mapped to current strings.
    pub aliases: &'static [(&'static str, &'static str)],
}

impl EnumTable {
    /// Tag for a string, resolving aliases.
    pub fn tag(&self, s: &str) -> Option<u32> {
        let resolved = self
            .aliases
            .iter()
            .find(|(alias, _)| *alias == s)
            .map(|(_, target)| *target)
            .unwrap_or(s);
        self.entries
            .iter()
            .find(|(name, _)| *name == resolved)
            .map(|(_, tag)| *tag)
    }

    /// Current string for a tag.
    pub fn string(&self, tag: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, t)| *t == tag)
            .map(|(name, _)| *name)
    }
}

macro_rules! config_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $table:ident {
            $($(#[$vmeta:meta])* $variant:ident = $tag:literal => $str:literal,)+
        }
        aliases { $($alias:literal => $target:literal,)* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $tag,)+
        }

        /// String table for the enum.
        pub static $table: EnumTable = EnumTable {
            name: stringify!($name),
            entries: &[$(($str, $tag),)+],
            aliases: &[$(($alias, $target),)*],
        };

        impl $name {
            /// The canonical config-file string.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }

            /// Parse a config-file string, resolving aliases.
            pub fn from_str_tag(s: &str) -> Option<Self> {
                Self::from_tag($table.tag(s)?)
            }

            /// Recover the variant from its numeric tag.
            pub fn from_tag(tag: u32) -> Option<Self> {
                match tag {
                    $($tag => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The numeric tag.
            pub fn tag(self) -> u32 {
                self as u32
            }
        }
    };
}

config_enum! {
    /// Fill patterns for sparse and solid surfaces.
    InfillPattern, INFILL_PATTERN_TABLE {
        /// Parallel lines, direction alternating between layers.
        Rectilinear = 0 => "rectilinear",
        /// Rectilinear without the per-layer direction flip.
        Grid = 1 => "grid",
        /// Three-way line directions.
        Triangles = 2 => "triangles",
        /// Hexagonal cells.
        Honeycomb = 3 => "honeycomb",
        /// Inward offsets of the boundary.
        Concentric = 4 => "concentric",
    }
    aliases {
        "rectilinear-grid" => "grid",
    }
}

config_enum! {
    /// Where perimeter loops start and end.
    SeamPosition, SEAM_POSITION_TABLE {
        /// Deterministically pseudo-random per layer.
        Random = 0 => "random",
        /// Nearest vertex to the previous position.
        Nearest = 1 => "nearest",
        /// Aligned to the seam of the layer below.
        Aligned = 2 => "aligned",
        /// Rear of the print, for easy cleanup.
        Rear = 3 => "rear",
    }
    aliases {
        "hidden" => "nearest",
    }
}

config_enum! {
    /// Fill pattern for support material base layers.
    SupportMaterialPattern, SUPPORT_PATTERN_TABLE {
        /// Parallel lines.
        Rectilinear = 0 => "rectilinear",
        /// Crossed lines every few layers.
        RectilinearGrid = 1 => "rectilinear-grid",
        /// Hexagonal cells.
        Honeycomb = 2 => "honeycomb",
        /// Square pillars on a regular grid.
        Pillars = 3 => "pillars",
    }
    aliases {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for pattern in [
            InfillPattern::Rectilinear,
            InfillPattern::Grid,
            InfillPattern::Honeycomb,
            InfillPattern::Concentric,
        ] {
            assert_eq!(InfillPattern::from_str_tag(pattern.as_str()), Some(pattern));
            assert_eq!(InfillPattern::from_tag(pattern.tag()), Some(pattern));
        }
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(
            InfillPattern::from_str_tag("rectilinear-grid"),
            Some(InfillPattern::Grid)
        );
        assert_eq!(SeamPosition::from_str_tag("hidden"), Some(SeamPosition::Nearest));
    }

    #[test]
    fn test_unknown_string() {
        assert_eq!(InfillPattern::from_str_tag("voronoi"), None);
    }
}
