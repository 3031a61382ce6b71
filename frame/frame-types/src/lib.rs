//! Core types for stereotactic frame registration.
//!
//! This crate provides the shared vocabulary of the frame workspace:
//!
//! - [`PointCloud`] - Marker positions accumulated from scan slices
//! - [`RigidTransform`] - Rotation plus translation, exactly invertible
//! - [`Modality`] - CT or MR, selecting frame edges and pre-filtering
//! - [`FrameGeometry`] / [`StaticFrame`] - Known frame nodes and edges
//! - [`ReferenceMesh`] - Polyline skeleton used as the registration target
//!
//! # Units
//!
//! All coordinates are `f64` millimetres in either the scan's physical
//! space or the frame's own space. Transforms say which way they map.
//!
//! # Coordinate System
//!
//! Right-handed. For axial scans of a head in a frame:
//! - X: lateral (right/left)
//! - Y: posterior/anterior
//! - Z: depth along the slice stack
//!
//! # Example
//!
//! ```
//! use frame_types::{Point3, PointCloud, RigidTransform, Vector3};
//!
//! let cloud: PointCloud = [Point3::new(0.0, 0.0, -50.0), Point3::new(190.0, 0.0, -50.0)]
//!     .into_iter()
//!     .collect();
//!
//! let shift = RigidTransform::from_translation(Vector3::new(0.0, 0.0, 10.0));
//! let moved = cloud.transformed(&shift);
//! assert!((moved.points[0].z + 40.0).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cloud;
mod error;
mod geometry;
mod mesh;
mod modality;
mod transform;

pub use cloud::{centroid, percentile, spans_plane, Axis, PointCloud};
pub use error::{FrameError, FrameResult};
pub use geometry::{frame_extent, FrameGeometry, StaticFrame};
pub use mesh::{ClosestPoint, ReferenceMesh, Segment};
pub use modality::Modality;
pub use transform::{check_orthonormal, RigidTransform, ORTHONORMAL_TOLERANCE};

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix3, Matrix4, Point2, Point3, Rotation3, Vector3};
