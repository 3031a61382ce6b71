//! Error types for frame geometry and transform operations.

use thiserror::Error;

/// Result type alias for frame type operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors raised while building frame geometry or validating transforms.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// Modality string is not one of the supported imaging modalities.
    #[error("unrecognized modality `{0}` (expected CT or MR)")]
    UnknownModality(String),

    /// An edge references a node index that does not exist.
    #[error("edge {edge} references node {node}, but the frame has only {node_count} nodes")]
    EdgeOutOfBounds {
        /// Position of the offending edge in the edge list.
        edge: usize,
        /// The invalid node index.
        node: usize,
        /// Number of nodes in the frame.
        node_count: usize,
    },

    /// An edge connects a node to itself.
    #[error("edge {edge} connects node {node} to itself")]
    DegenerateEdge {
        /// Position of the offending edge in the edge list.
        edge: usize,
        /// The repeated node index.
        node: usize,
    },

    /// The frame has no edges for the requested modality.
    #[error("frame geometry has no edges")]
    EmptyGeometry,

    /// A rotation matrix failed the orthonormality check.
    #[error("rotation is not orthonormal (deviation {deviation:.3e}, determinant {determinant:.6})")]
    NonOrthonormal {
        /// Frobenius norm of `RᵀR − I`.
        deviation: f64,
        /// Determinant of the rotation block.
        determinant: f64,
    },

    /// A homogeneous matrix does not have `[0, 0, 0, 1]` as its bottom row.
    #[error("homogeneous matrix bottom row must be [0, 0, 0, 1]")]
    NotHomogeneous,

    /// A value that must be finite and positive was not.
    #[error("invalid {name}: {value}")]
    InvalidValue {
        /// Name of the parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}

impl FrameError {
    /// Returns true if this error describes malformed configuration
    /// (modality or frame definition) rather than bad numeric data.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownModality(_)
                | Self::EdgeOutOfBounds { .. }
                | Self::DegenerateEdge { .. }
                | Self::EmptyGeometry
                | Self::InvalidValue { .. }
        )
    }
}
