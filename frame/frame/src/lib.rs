//! Stereotactic frame detection and registration for CT and MR volumes.
//!
//! This umbrella crate re-exports the frame-* crates and adds
//! [`FrameDetector`], which runs the whole pipeline: slices are walked by a
//! [`SliceProvider`](markers::SliceProvider), markers are found by a
//! [`MarkerDetector`](markers::MarkerDetector), the detections are stacked
//! into one point cloud, and the cloud is registered onto the frame with a
//! three-stage ICP.
//!
//! # Quick Start
//!
//! ```
//! use frame::prelude::*;
//! use frame::markers::Volume;
//!
//! # let volume = Volume::new([4, 4, 2], vec![0.0; 32]).unwrap();
//! let mut detector = FrameDetector::new(&StaticFrame::leksell(), Modality::Ct).unwrap();
//! let mut slices = AxialSliceProvider::new(volume).with_preprocessor(Preprocessor::Ct);
//!
//! let markers = detector.detect(&mut slices, &BlobDetector::new());
//! # assert!(markers.is_empty());
//! // An empty scan cannot be registered
//! assert!(detector.transform_to_frame_space().is_err());
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Point clouds, rigid transforms, frame geometry and the reference mesh
//! - [`registration`] - Kabsch, ICP, stage filters and the three-stage engine
//! - [`markers`] - Slice providers, preprocessing and blob detection
//!
//! # Feature Flags
//!
//! - `serde` - Serialize transforms, clouds, frame profiles and parameters

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod detector;

pub use detector::FrameDetector;

// =============================================================================
// Re-exports
// =============================================================================

/// Point clouds, rigid transforms, frame geometry and the reference mesh.
pub use frame_types as types;

/// Kabsch, ICP, stage filters and the three-stage registration engine.
pub use frame_registration as registration;

/// Slice providers, preprocessing and fiducial blob detection.
pub use frame_markers as markers;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for frame detection.
///
/// # Usage
///
/// ```
/// use frame::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use frame_types::{
        FrameGeometry, Modality, Point2, Point3, PointCloud, ReferenceMesh, RigidTransform,
        StaticFrame,
    };

    // Registration
    pub use frame_registration::{register, RegistrationError, RegistrationParams};

    // Markers
    pub use frame_markers::{
        accumulate, AxialSliceProvider, BlobDetector, MarkerDetector, Preprocessor, SliceProvider,
    };

    // Pipeline
    pub use crate::FrameDetector;
}

// =============================================================================
// Tests
// =============================================================================
