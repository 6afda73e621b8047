//! Error types for tetmend.
//!
//! Operators report "nothing to do" and "candidate rejected" through their
//! normal return value (`Ok(false)`, `Ok(None)`). An `Err` always means the
//! mesh was found in, or would be left in, an inconsistent state: callers
//! must stop editing the mesh once they see one.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while building or editing a mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The mesh has no cells.
    #[error("mesh has no cells")]
    EmptyMesh,

    /// A cell references an invalid vertex index.
    #[error("cell {cell} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The cell index.
        cell: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A cell has duplicate vertices or zero volume.
    #[error("cell {cell} is degenerate")]
    DegenerateCell {
        /// The cell index.
        cell: usize,
    },

    /// A face is shared by more than two cells.
    #[error("face ({v0}, {v1}, {v2}) is shared by more than two cells")]
    NonManifoldFace {
        /// First vertex of the face.
        v0: usize,
        /// Second vertex of the face.
        v1: usize,
        /// Third vertex of the face.
        v2: usize,
    },

    /// A handle refers to a removed element.
    #[error("{what} {index} is not alive")]
    DeadHandle {
        /// Kind of element.
        what: &'static str,
        /// The stale index.
        index: usize,
    },

    /// Adjacency across a face is not symmetric or does not share the face.
    #[error("adjacency mismatch across face {face} of cell {cell}")]
    AdjacencyMismatch {
        /// The cell index.
        cell: usize,
        /// The local face.
        face: usize,
    },

    /// A cell is inverted or flat.
    #[error("cell {cell} is inverted (orientation {det:e})")]
    InvertedCell {
        /// The cell index.
        cell: usize,
        /// Six times its signed volume.
        det: f64,
    },

    /// Invalid mesh state for the requested operation.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Returns `true` for errors that mean the mesh itself is inconsistent.
    pub fn is_invalid_mesh(&self) -> bool {
        matches!(
            self,
            MeshError::DeadHandle { .. }
                | MeshError::AdjacencyMismatch { .. }
                | MeshError::InvertedCell { .. }
                | MeshError::InvalidState(_)
        )
    }
}
