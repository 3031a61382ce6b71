//! Iterative Closest Point (ICP) alignment onto a closest-point target.
//!
//! ICP iteratively refines a rigid transform by:
//! 1. Finding the closest target point for every transformed source point
//! 2. Fitting the incremental rigid transform with Kabsch
//! 3. Composing it onto the running transform and repeating until the
//!    residual stops changing
//!
//! Correspondence search runs in parallel over the source points; results
//! are collected in source order so runs are deterministic.

use frame_types::{centroid, spans_plane, RigidTransform};
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::kabsch::compute_rigid_transform;
use crate::target::{ClosestPointTarget, PointTarget};
use crate::IcpError;

/// Incremental transforms smaller than this (radians and mm) end the loop.
const MIN_INCREMENT: f64 = 1e-12;

/// Default landmark limit for ICP sources.
pub const DEFAULT_MAX_LANDMARKS: usize = 200;

/// Parameters for ICP alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpParams {
    /// Maximum number of iterations (default: 100).
    pub max_iterations: u32,
    /// Stop when the RMS residual changes by less than this, in mm (default: 1e-9).
    pub convergence_threshold: f64,
    /// Seed the alignment by moving the source centroid onto the target
    /// centroid (default: true).
    pub match_centroids: bool,
    /// Stride through the source when it has more points than this; the
    /// stride is `len / max_landmarks`. `None` uses every point
    /// (default: 200).
    pub max_landmarks: Option<usize>,
    /// Transform applied to the source before seeding (default: identity).
    pub initial_transform: RigidTransform,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-9,
            match_centroids: true,
            max_landmarks: Some(DEFAULT_MAX_LANDMARKS),
            initial_transform: RigidTransform::identity(),
        }
    }
}

impl IcpParams {
    /// Creates new ICP parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence threshold.
    #[must_use]
    pub const fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Enables or disables centroid seeding.
    #[must_use]
    pub const fn with_match_centroids(mut self, enabled: bool) -> Self {
        self.match_centroids = enabled;
        self
    }

    /// Limits the number of source points used.
    #[must_use]
    pub const fn with_max_landmarks(mut self, max_landmarks: Option<usize>) -> Self {
        self.max_landmarks = max_landmarks;
        self
    }

    /// Sets the initial transform guess.
    #[must_use]
    pub const fn with_initial_transform(mut self, transform: RigidTransform) -> Self {
        self.initial_transform = transform;
        self
    }
}

/// Result of an ICP alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpResult {
    /// Transform mapping source points onto the target.
    pub transform: RigidTransform,
    /// RMS distance to the last set of correspondences.
    pub rms_error: f64,
    /// Largest distance to the last set of correspondences.
    pub max_error: f64,
    /// Number of iterations performed.
    pub iterations: u32,
    /// Whether a convergence criterion was met before the iteration cap.
    pub converged: bool,
    /// Number of source points used.
    pub correspondence_count: usize,
}

/// Aligns `source` onto `target` with rigid ICP.
///
/// # Errors
///
/// Returns an error if:
/// - Source or target has fewer than 3 points, or all of them are collinear
/// - A Kabsch fit fails (SVD failure or non-orthonormal rotation)
///
/// # Example
///
/// ```
/// use frame_registration::{icp_align, IcpParams};
/// use frame_types::{ReferenceMesh, RigidTransform, Vector3};
/// use nalgebra::Point3;
///
/// let nodes = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(0.0, 0.0, -100.0),
///     Point3::new(100.0, 0.0, 0.0),
///     Point3::new(100.0, 0.0, -100.0),
/// ];
/// let mesh = ReferenceMesh::new(&nodes, &[[0, 1], [2, 3]]).unwrap();
///
/// // Markers on both posts, shifted sideways by 2 mm
/// let source: Vec<_> = [0.0, 100.0]
///     .iter()
///     .flat_map(|&x| (1..10).map(move |k| Point3::new(x + 2.0, 0.0, -10.0 * f64::from(k))))
///     .collect();
///
/// let result = icp_align(&source, &mesh, &IcpParams::default()).unwrap();
/// assert!(result.rms_error < 1e-6);
/// assert!((result.transform.translation - Vector3::new(-2.0, 0.0, 0.0)).norm() < 1e-6);
/// ```
pub fn icp_align<T>(
    source: &[Point3<f64>],
    target: &T,
    params: &IcpParams,
) -> Result<IcpResult, IcpError>
where
    T: ClosestPointTarget + ?Sized,
{
    let source_points = subsample(source, params.max_landmarks);
    validate(&source_points, target.target_points())?;

    let mut current = params.initial_transform;
    if params.match_centroids {
        let moved: Vec<Point3<f64>> = source_points
            .iter()
            .map(|p| current.transform_point(p))
            .collect();
        if let (Some(source_centroid), Some(target_centroid)) = (centroid(&moved), target.centroid())
        {
            current =
                RigidTransform::from_translation(target_centroid - source_centroid).compose(&current);
        }
    }

    let mut prev_rms = f64::INFINITY;
    let mut rms_error = f64::INFINITY;
    let mut max_error = f64::INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..params.max_iterations {
        iterations = iter + 1;

        let transformed: Vec<Point3<f64>> = source_points
            .iter()
            .map(|p| current.transform_point(p))
            .collect();

        let matched: Vec<Point3<f64>> = transformed
            .par_iter()
            .map(|p| target.closest_point(p))
            .collect();

        let incremental = compute_rigid_transform(&transformed, &matched)?;
        current = incremental.compose(&current);

        (rms_error, max_error) = residuals(&transformed, &matched, &incremental);

        if (prev_rms - rms_error).abs() < params.convergence_threshold
            || (incremental.angle() < MIN_INCREMENT
                && incremental.translation.norm() < MIN_INCREMENT)
        {
            converged = true;
            break;
        }
        prev_rms = rms_error;
    }

    if params.max_iterations == 0 {
        let transformed: Vec<Point3<f64>> = source_points
            .iter()
            .map(|p| current.transform_point(p))
            .collect();
        let matched: Vec<Point3<f64>> = transformed
            .par_iter()
            .map(|p| target.closest_point(p))
            .collect();
        (rms_error, max_error) = residuals(&transformed, &matched, &RigidTransform::identity());
    } else if !converged {
        warn!(
            iterations,
            rms_error, "ICP reached its iteration cap without converging"
        );
    }

    debug!(
        points = source_points.len(),
        iterations, rms_error, converged, "ICP alignment finished"
    );

    Ok(IcpResult {
        transform: current,
        rms_error,
        max_error,
        iterations,
        converged,
        correspondence_count: source_points.len(),
    })
}

/// Aligns source points onto a set of target points using ICP.
///
/// Builds a KD-tree over `target_points` and delegates to [`icp_align`].
///
/// # Errors
///
/// See [`icp_align`].
pub fn icp_align_points(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    params: &IcpParams,
) -> Result<IcpResult, IcpError> {
    let target = PointTarget::new(target_points.to_vec());
    icp_align(source_points, &target, params)
}

fn validate(source: &[Point3<f64>], target: &[Point3<f64>]) -> Result<(), IcpError> {
    if source.len() < 3 {
        return Err(IcpError::InsufficientSource {
            points: source.len(),
        });
    }
    if target.len() < 3 {
        return Err(IcpError::InsufficientTarget {
            points: target.len(),
        });
    }
    if !spans_plane(source) {
        return Err(IcpError::DegenerateSource);
    }
    if !spans_plane(target) {
        return Err(IcpError::DegenerateTarget);
    }
    Ok(())
}

/// Takes every `len / max_landmarks`-th point, keeping order.
///
/// Sources with fewer than twice the limit are used whole.
fn subsample(points: &[Point3<f64>], max_landmarks: Option<usize>) -> Vec<Point3<f64>> {
    match max_landmarks {
        Some(n) if n > 0 && points.len() > n => {
            let step = points.len() / n;
            points
                .iter()
                .step_by(step)
                .take(points.len() / step)
                .copied()
                .collect()
        }
        _ => points.to_vec(),
    }
}

/// RMS and max distance between the updated source points and their matches.
fn residuals(
    transformed: &[Point3<f64>],
    matched: &[Point3<f64>],
    incremental: &RigidTransform,
) -> (f64, f64) {
    let (sum_sq, max_sq) = transformed
        .iter()
        .zip(matched)
        .map(|(p, m)| (incremental.transform_point(p) - m).norm_squared())
        .fold((0.0, 0.0_f64), |(sum, max), d| (sum + d, max.max(d)));

    #[allow(clippy::cast_precision_loss)]
    let rms = (sum_sq / transformed.len() as f64).sqrt();
    (rms, max_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use frame_types::ReferenceMesh;
    use nalgebra::{Rotation3, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn make_random_points(count: usize, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                Point3::new(
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                )
            })
            .collect()
    }

    fn transform_points(points: &[Point3<f64>], transform: &RigidTransform) -> Vec<Point3<f64>> {
        points.iter().map(|p| transform.transform_point(p)).collect()
    }

    /// Two 120 mm posts 200 mm apart with 20 evenly spread samples each.
    fn posts() -> (ReferenceMesh, Vec<Point3<f64>>) {
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -120.0),
            Point3::new(200.0, 0.0, 0.0),
            Point3::new(200.0, 0.0, -120.0),
        ];
        let mesh = ReferenceMesh::new(&nodes, &[[0, 1], [2, 3]]).unwrap();
        let samples = [0.0, 200.0]
            .iter()
            .flat_map(|&x| (0..20).map(move |k| Point3::new(x, 0.0, -60.0 + (f64::from(k) - 9.5) * 6.0)))
            .collect();
        (mesh, samples)
    }

    #[test]
    fn test_icp_translation() {
        let source = make_random_points(25, 42);
        let translation = Vector3::new(10.0, 5.0, 0.0);
        let target = transform_points(&source, &RigidTransform::from_translation(translation));

        let result = icp_align_points(&source, &target, &IcpParams::default()).unwrap();

        assert!(result.converged);
        assert!(result.rms_error < 1e-6);
        assert_relative_eq!(result.transform.translation, translation, epsilon = 1e-4);
    }

    #[test]
    fn test_icp_rotation_and_translation() {
        let source = make_random_points(25, 42);
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 36.0);
        let truth = RigidTransform::new(rotation, Vector3::new(3.0, 4.0, 0.0));
        let target = transform_points(&source, &truth);

        let result = icp_align_points(&source, &target, &IcpParams::default()).unwrap();

        assert!(result.rms_error < 1e-4, "RMS error too large: {}", result.rms_error);
        for (s, t) in source.iter().zip(&target) {
            assert!((result.transform.transform_point(s) - t).norm() < 1e-3);
        }
    }

    #[test]
    fn test_icp_idempotent_on_aligned_input() {
        let (mesh, samples) = posts();
        let result = icp_align(&samples, &mesh, &IcpParams::default()).unwrap();

        assert!(result.converged);
        assert!(result.transform.is_identity(1e-9));
        assert!(result.rms_error < 1e-9);
    }

    #[test]
    fn test_icp_onto_mesh_recovers_rotation() {
        let (mesh, samples) = posts();
        let truth = RigidTransform::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), 3.0_f64.to_radians()),
            Vector3::new(2.0, -1.0, 0.0),
        );
        let scan = transform_points(&samples, &truth);

        let result = icp_align(&scan, &mesh, &IcpParams::new().with_max_iterations(500)).unwrap();

        assert!(result.transform.angle_to(&truth.inverse()) < 1e-4);
        assert!(result.rms_error < 1e-6);
    }

    #[test]
    fn test_icp_insufficient_points() {
        let (mesh, _) = posts();
        let two = [Point3::new(0.0, 0.0, -10.0), Point3::new(0.0, 0.0, -20.0)];
        assert_eq!(
            icp_align(&two, &mesh, &IcpParams::default()),
            Err(IcpError::InsufficientSource { points: 2 })
        );

        let single_bar = ReferenceMesh::new(
            &[Point3::origin(), Point3::new(0.0, 0.0, -10.0)],
            &[[0, 1]],
        )
        .unwrap();
        let source = make_random_points(10, 1);
        assert_eq!(
            icp_align(&source, &single_bar, &IcpParams::default()),
            Err(IcpError::InsufficientTarget { points: 2 })
        );
    }

    #[test]
    fn test_icp_collinear_source() {
        let (mesh, _) = posts();
        let line: Vec<Point3<f64>> = (0..10)
            .map(|k| Point3::new(0.0, 0.0, -10.0 * f64::from(k)))
            .collect();
        assert_eq!(
            icp_align(&line, &mesh, &IcpParams::default()),
            Err(IcpError::DegenerateSource)
        );
    }

    #[test]
    fn test_icp_max_iterations() {
        let source = make_random_points(25, 42);
        let target = transform_points(
            &source,
            &RigidTransform::from_rotation(Rotation3::from_axis_angle(&Vector3::x_axis(), 0.2)),
        );

        let params = IcpParams::new().with_max_iterations(1);
        let result = icp_align_points(&source, &target, &params).unwrap();
        assert_eq!(result.iterations, 1);

        let params = IcpParams::new().with_max_iterations(0);
        let result = icp_align_points(&source, &target, &params).unwrap();
        assert_eq!(result.iterations, 0);
        assert!(!result.converged);
        assert!(result.rms_error.is_finite());
    }

    #[test]
    fn test_icp_max_landmarks() {
        let (mesh, samples) = posts();
        let params = IcpParams::new().with_max_landmarks(Some(10));
        let result = icp_align(&samples, &mesh, &params).unwrap();
        assert_eq!(result.correspondence_count, 10);

        let picked = subsample(&samples, Some(10));
        assert_eq!(picked[0], samples[0]);
        assert_eq!(picked[5], samples[20]);
    }

    #[test]
    fn test_landmark_stride() {
        assert_eq!(IcpParams::default().max_landmarks, Some(DEFAULT_MAX_LANDMARKS));

        // Below twice the limit the stride is one
        let points = make_random_points(234, 9);
        assert_eq!(subsample(&points, Some(200)), points);

        let points = make_random_points(450, 9);
        let picked = subsample(&points, Some(200));
        assert_eq!(picked.len(), 225);
        assert_eq!(picked[1], points[2]);
        assert_eq!(subsample(&points, None).len(), 450);
    }

    #[test]
    fn test_icp_is_deterministic() {
        let source = make_random_points(50, 3);
        let target = transform_points(
            &source,
            &RigidTransform::from_translation(Vector3::new(0.5, -0.2, 0.1)),
        );
        let a = icp_align_points(&source, &target, &IcpParams::default()).unwrap();
        let b = icp_align_points(&source, &target, &IcpParams::default()).unwrap();
        assert_eq!(a, b);
    }
}
