//! Configuration errors.
//!
//! Configuration errors are raised eagerly at the config boundary; they never
//! propagate out of the pipeline itself.

use thiserror::Error;

/// Errors raised while reading or writing configuration options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The key is not defined by the schema and is not a legacy alias.
    #[error("unknown configuration option '{0}'")]
    UnknownOption(String),

    /// A value failed to parse or is out of range for its option.
    #[error("invalid value for option '{key}': {value}")]
    InvalidOptionValue {
        /// Offending option key.
        key: String,
        /// The rejected textual value.
        value: String,
    },

    /// A typed getter was used against a different option type.
    #[error("option type mismatch: expected {0}")]
    BadOptionType(&'static str),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
