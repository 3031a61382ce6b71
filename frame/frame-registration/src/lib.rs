//! Registration of stereotactic frame markers against the frame geometry.
//!
//! This crate turns an accumulated marker cloud into the rigid transform
//! between scan space and frame space:
//! - **ICP** - Point-to-segment alignment onto the reference mesh
//! - **Kabsch algorithm** - Optimal rigid transform from paired points
//! - **Stage filters** - Depth percentile, depth band, lateral cluster and
//!   inlier-distance rejection between ICP runs
//! - **Three-stage engine** - Coarse, refine and final ICP, each stage
//!   seeded from scratch on a cleaner subset of the cloud
//!
//! # Quick Start
//!
//! ```
//! use frame_registration::{register, RegistrationParams};
//! use frame_types::{FrameGeometry, Modality, Point3, PointCloud, StaticFrame};
//!
//! let frame = StaticFrame::leksell();
//! let mesh = frame.reference_mesh(Modality::Mr).unwrap();
//!
//! // Markers sampled along the four vertical posts
//! let cloud: PointCloud = [(0.0, 0.0), (0.0, 120.0), (190.0, 0.0), (190.0, 120.0)]
//!     .iter()
//!     .flat_map(|&(x, y)| (1..20).map(move |k| Point3::new(x, y, -6.0 * f64::from(k))))
//!     .collect();
//!
//! let frame_to_scan = register(&cloud, &mesh, Modality::Mr, &RegistrationParams::default()).unwrap();
//! assert!(frame_to_scan.is_identity(1e-6));
//! ```
//!
//! # Direction of the result
//!
//! Every ICP stage maps scan points into frame space. [`register`] returns
//! the inverse of the final stage, which maps frame space into scan space:
//! the transform a resampler needs to pull each frame-space voxel from the
//! scan.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod engine;
mod error;
mod filter;
mod icp;
mod kabsch;
mod params;
mod target;

pub use engine::{
    register, register_detailed, register_detailed_with, register_with, Aligner, IcpAligner,
    RegistrationReport, Stage, StageReport,
};
pub use error::{ErrorKind, IcpError, RegistrationError, RegistrationResult};
pub use filter::{
    band_filter, coarse_filter, depth_prefilter, inlier_filter, lateral_filter, refine_filter,
};
pub use icp::{icp_align, icp_align_points, IcpParams, IcpResult, DEFAULT_MAX_LANDMARKS};
pub use kabsch::compute_rigid_transform;
pub use params::{Band, LateralSplit, RegistrationParams};
pub use target::{ClosestPointTarget, PointTarget};
