//! Slice providers, preprocessing and fiducial marker detection.
//!
//! The pieces that turn an image volume into the marker cloud fed to
//! registration:
//! - [`SliceProvider`] and [`MarkerDetector`] - the collaborator traits
//! - [`accumulate`] - stacks per-slice detections into a [`PointCloud`]
//! - [`AxialSliceProvider`] - walks an in-memory [`Volume`]
//! - [`Preprocessor`] - CT window or MR Li threshold with closing
//! - [`BlobDetector`] - small connected components and their centres
//!
//! # Example
//!
//! ```
//! use frame_markers::{accumulate, AxialSliceProvider, BlobDetector, Preprocessor, Volume};
//! use nalgebra::{Matrix3, Point3};
//!
//! // One bright 2 mm rod running through four slices
//! let volume = Volume::from_fn(
//!     [16, 16, 4],
//!     [1.0, 1.0, 3.0],
//!     [0.0, 0.0, 0.0],
//!     Matrix3::identity(),
//!     |p: Point3<f64>| if (p.x - 8.0).hypot(p.y - 5.0) <= 1.0 { 1500.0 } else { 0.0 },
//! )
//! .unwrap();
//!
//! let mut provider = AxialSliceProvider::new(volume).with_preprocessor(Preprocessor::Ct);
//! let cloud = accumulate(&mut provider, &BlobDetector::new());
//!
//! assert_eq!(cloud.len(), 4);
//! assert!((cloud.points[3].x - 8.0).abs() < 1e-9);
//! assert!((cloud.points[3].z - 9.0).abs() < 1e-9);
//! ```
//!
//! [`PointCloud`]: frame_types::PointCloud

#![warn(missing_docs)]
// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod blob;
mod error;
mod image;
mod preprocess;
mod provider;

pub use blob::{BlobDetector, DEFAULT_MAX_AREA_MM2};
pub use error::{MarkerError, MarkerResult};
pub use image::{ImageSlice, Volume};
pub use preprocess::{binary_closing, li_threshold, Preprocessor, CT_WINDOW_LOWER, CT_WINDOW_UPPER};
pub use provider::{accumulate, AxialSliceProvider, MarkerDetector, SliceProvider};
