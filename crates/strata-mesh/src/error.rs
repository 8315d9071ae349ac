//! Error types for mesh loading and slicing.

use thiserror::Error;

/// Errors that can occur while reading or slicing a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no facets.
    #[error("mesh is empty")]
    EmptyMesh,

    /// An STL file could not be parsed.
    #[error("failed to read STL: {0}")]
    ReadError(String),

    /// An I/O failure while reading a mesh file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Slicing produced no closed loop on any layer.
    #[error("slicing produced no layers")]
    SliceError,
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
