#![warn(missing_docs)]

//! Typed option schema, dynamic configuration and static views for the
//! strata slicer.
//!
//! The process-wide [`ConfigDef`] enumerates every option (kind, default,
//! limits, aliases, shortcuts). User input flows through a
//! [`DynamicConfig`], where legacy rewriting, shortcut expansion and
//! validation happen, and is then applied onto the typed static views that
//! the pipeline reads ([`PrintConfig`], [`PrintObjectConfig`],
//! [`PrintRegionConfig`]).

pub mod def;
pub mod dynamic;
pub mod enums;
pub mod error;
pub mod legacy;
pub mod option;
pub mod static_views;

pub use def::{print_config_def, ConfigDef, OptionDef, OptionKind};
pub use dynamic::DynamicConfig;
pub use enums::{EnumTable, InfillPattern, SeamPosition, SupportMaterialPattern};
pub use error::{ConfigError, Result};
pub use option::{FloatOrPercent, OptionValue};
pub use static_views::{
    HostConfig, OptionConvert, PrintConfig, PrintObjectConfig, PrintRegionConfig,
};

/// Environment prefix for seeding a [`DynamicConfig`] at start-up.
pub const ENV_PREFIX: &str = "STRATA_";
