//! Error types for slice images and volumes.

use thiserror::Error;

/// Result type alias for marker operations.
pub type MarkerResult<T> = Result<T, MarkerError>;

/// Errors raised while building slice images or volumes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarkerError {
    /// Pixel buffer length does not match the declared size.
    #[error("pixel buffer has {actual} values, expected {expected}")]
    BufferSize {
        /// Number of values implied by the dimensions.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A spacing component is zero, negative or not finite.
    #[error("spacing along axis {axis} must be finite and positive, got {value}")]
    InvalidSpacing {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// The rejected spacing.
        value: f64,
    },
}
