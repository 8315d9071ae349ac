//! Error types for the slicing pipeline.

use thiserror::Error;

use crate::flow::FlowRole;

/// Errors that can occur while preparing or running the pipeline.
#[derive(Error, Debug)]
pub enum SlicerError {
    /// A flow derivation produced a non-positive volumetric rate. Usually a
    /// too-narrow extrusion width.
    #[error("computed a negative extrusion flow for {0:?}; is an extrusion width set too small?")]
    NegativeFlow(FlowRole),

    /// A flow derivation produced a non-positive centerline spacing.
    #[error("computed a negative extrusion spacing for {0:?}; is an extrusion width set too small?")]
    NegativeSpacing(FlowRole),

    /// Computing an extrusion width needed another option that is not set.
    #[error("cannot compute the width of '{key}': option '{dependency}' is not available")]
    MissingDependentVariable {
        /// The width option being resolved.
        key: &'static str,
        /// The option it depends on.
        dependency: &'static str,
    },

    /// A flow was requested with no usable layer height.
    #[error("invalid flow height supplied for {0:?}")]
    InvalidFlowHeight(FlowRole),

    /// Cross-validation of the print failed.
    #[error("invalid print: {0}")]
    InvalidPrint(String),

    /// Slicing produced no closed loop on any layer.
    #[error("slicing produced an empty result; is the model watertight and above the bed?")]
    SliceError,

    /// The external cancellation token was observed.
    #[error("cancelled")]
    Cancelled,

    /// A configuration error surfaced while applying options.
    #[error(transparent)]
    Config(#[from] strata_config::ConfigError),

    /// A mesh error surfaced while slicing.
    #[error(transparent)]
    Mesh(#[from] strata_mesh::MeshError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, SlicerError>;

/// Process exit codes for the CLI collaborator.
impl SlicerError {
    /// 1 user error, 2 geometric failure, 3 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            SlicerError::Config(_)
            | SlicerError::InvalidPrint(_)
            | SlicerError::NegativeFlow(_)
            | SlicerError::NegativeSpacing(_)
            | SlicerError::MissingDependentVariable { .. }
            | SlicerError::InvalidFlowHeight(_) => 1,
            SlicerError::Cancelled => 3,
            SlicerError::SliceError | SlicerError::Mesh(_) => 2,
        }
    }
}
