//! Error types for ICP alignment and frame registration.

use frame_types::FrameError;
use thiserror::Error;

use crate::Stage;

/// Errors raised by a single ICP alignment or Kabsch fit.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IcpError {
    /// Fewer than three source points.
    #[error("source has {points} points, at least 3 are required")]
    InsufficientSource {
        /// Number of source points provided.
        points: usize,
    },

    /// Fewer than three target points.
    #[error("target has {points} points, at least 3 are required")]
    InsufficientTarget {
        /// Number of target points provided.
        points: usize,
    },

    /// All source points lie on one line.
    #[error("source points are collinear")]
    DegenerateSource,

    /// All target points lie on one line.
    #[error("target points are collinear")]
    DegenerateTarget,

    /// Paired point sets differ in length.
    #[error("point sets must have equal length: {source_len} vs {target_len}")]
    MismatchedLengths {
        /// Number of source points.
        source_len: usize,
        /// Number of target points.
        target_len: usize,
    },

    /// SVD of the cross-covariance matrix did not produce singular vectors.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// The fitted rotation failed the orthonormality check.
    #[error("fitted rotation is not orthonormal (deviation {deviation:.3e}, determinant {determinant:.6})")]
    NonOrthonormal {
        /// Frobenius norm of `RᵀR − I`.
        deviation: f64,
        /// Determinant of the fitted rotation.
        determinant: f64,
    },
}

impl IcpError {
    /// Coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientSource { .. }
            | Self::InsufficientTarget { .. }
            | Self::DegenerateSource
            | Self::DegenerateTarget => ErrorKind::InsufficientData,
            Self::MismatchedLengths { .. } => ErrorKind::Configuration,
            Self::SvdFailed | Self::NonOrthonormal { .. } => ErrorKind::Numerical,
        }
    }
}

/// Errors raised by the three-stage registration pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    /// The frame geometry could not be turned into a reference mesh.
    #[error("invalid frame geometry: {0}")]
    Geometry(#[from] FrameError),

    /// Registration parameters failed validation.
    #[error("invalid registration parameters: {0}")]
    InvalidParams(String),

    /// A filter removed every point.
    #[error("{stage} left no points")]
    EmptyCloud {
        /// The filter that emptied the cloud.
        stage: Stage,
    },

    /// ICP failed during one of the alignment stages.
    #[error("{stage} alignment failed: {source}")]
    Icp {
        /// The alignment stage that failed.
        stage: Stage,
        /// The underlying ICP error.
        #[source]
        source: IcpError,
    },
}

impl RegistrationError {
    /// Coarse classification of this error.
    ///
    /// # Example
    ///
    /// ```
    /// use frame_registration::{ErrorKind, RegistrationError, Stage};
    ///
    /// let err = RegistrationError::EmptyCloud { stage: Stage::InlierFilter };
    /// assert_eq!(err.kind(), ErrorKind::InsufficientData);
    /// assert_eq!(err.stage(), Some(Stage::InlierFilter));
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Geometry(err) => {
                if err.is_configuration() {
                    ErrorKind::Configuration
                } else {
                    ErrorKind::Numerical
                }
            }
            Self::InvalidParams(_) => ErrorKind::Configuration,
            Self::EmptyCloud { .. } => ErrorKind::InsufficientData,
            Self::Icp { source, .. } => source.kind(),
        }
    }

    /// The pipeline stage that failed, if the error came from one.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::EmptyCloud { stage } | Self::Icp { stage, .. } => Some(*stage),
            Self::Geometry(_) | Self::InvalidParams(_) => None,
        }
    }
}

/// Broad error categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed modality, frame definition or parameters.
    Configuration,
    /// Too few or degenerate points to register.
    InsufficientData,
    /// SVD failure or a non-orthonormal rotation.
    Numerical,
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_icp_error_kind() {
        assert_eq!(
            IcpError::InsufficientSource { points: 2 }.kind(),
            ErrorKind::InsufficientData
        );
        assert_eq!(IcpError::DegenerateTarget.kind(), ErrorKind::InsufficientData);
        assert_eq!(IcpError::SvdFailed.kind(), ErrorKind::Numerical);
    }

    #[test]
    fn test_registration_error_kind() {
        let err = RegistrationError::from(FrameError::EmptyGeometry);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.stage(), None);

        let err = RegistrationError::InvalidParams("inverted band".into());
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = RegistrationError::Icp {
            stage: Stage::Refine,
            source: IcpError::NonOrthonormal {
                deviation: 1e-3,
                determinant: 1.0,
            },
        };
        assert_eq!(err.kind(), ErrorKind::Numerical);
        assert_eq!(err.stage(), Some(Stage::Refine));
    }

    #[test]
    fn test_icp_error_source_chain() {
        let err = RegistrationError::Icp {
            stage: Stage::Coarse,
            source: IcpError::DegenerateSource,
        };
        let msg = err.to_string();
        assert!(msg.contains("coarse"), "{msg}");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("source points are collinear".to_string())
        );
    }
}
