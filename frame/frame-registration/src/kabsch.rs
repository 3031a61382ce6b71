//! Kabsch algorithm for computing optimal rigid transformations.
//!
//! The Kabsch algorithm finds the rotation that minimizes the RMSD
//! (root mean square deviation) between two paired sets of points.

use frame_types::{check_orthonormal, FrameError, RigidTransform};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

use crate::IcpError;

/// Computes the optimal rigid transform that aligns source points to target points.
///
/// Uses the Kabsch algorithm (SVD-based). Reflections are corrected so the
/// result is always a proper rotation, and the fitted rotation is checked
/// for orthonormality before it is returned.
///
/// # Errors
///
/// Returns an error if:
/// - The point sets have different lengths
/// - Either point set is empty
/// - SVD computation fails
/// - The fitted rotation is not orthonormal
///
/// # Example
///
/// ```
/// use frame_registration::compute_rigid_transform;
/// use nalgebra::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
///
/// // Target is source translated by (1, 2, 3)
/// let target = vec![
///     Point3::new(1.0, 2.0, 3.0),
///     Point3::new(2.0, 2.0, 3.0),
///     Point3::new(1.0, 3.0, 3.0),
/// ];
///
/// let transform = compute_rigid_transform(&source, &target).unwrap();
/// let aligned = transform.transform_point(&source[0]);
/// assert!((aligned - target[0]).norm() < 1e-9);
/// ```
pub fn compute_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
) -> Result<RigidTransform, IcpError> {
    if source_points.is_empty() {
        return Err(IcpError::InsufficientSource { points: 0 });
    }
    if target_points.is_empty() {
        return Err(IcpError::InsufficientTarget { points: 0 });
    }
    if source_points.len() != target_points.len() {
        return Err(IcpError::MismatchedLengths {
            source_len: source_points.len(),
            target_len: target_points.len(),
        });
    }

    let source_centroid = compute_centroid(source_points);
    let target_centroid = compute_centroid(target_points);

    // Cross-covariance H = sum(s_i * t_i^T) of the centred sets
    let mut h = Matrix3::zeros();
    for (s, t) in source_points.iter().zip(target_points) {
        h += (s.coords - source_centroid) * (t.coords - target_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(IcpError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(IcpError::SvdFailed)?;

    // R = V * U^T
    let mut v = v_t.transpose();
    let mut rotation_matrix = v * u.transpose();

    // Reflection: flip the singular vector of the smallest singular value
    if rotation_matrix.determinant() < 0.0 {
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(2, |(i, _)| i);
        for i in 0..3 {
            v[(i, smallest)] = -v[(i, smallest)];
        }
        rotation_matrix = v * u.transpose();
    }

    check_orthonormal(&rotation_matrix).map_err(|err| match err {
        FrameError::NonOrthonormal {
            deviation,
            determinant,
        } => IcpError::NonOrthonormal {
            deviation,
            determinant,
        },
        _ => IcpError::SvdFailed,
    })?;

    let rotation = Rotation3::from_matrix_unchecked(rotation_matrix);
    let translation = target_centroid - rotation * source_centroid;

    Ok(RigidTransform::new(rotation, translation))
}

/// Computes the centroid of a set of points.
fn compute_centroid(points: &[Point3<f64>]) -> Vector3<f64> {
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    sum / n
}
