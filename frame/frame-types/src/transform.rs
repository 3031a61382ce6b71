//! Rigid transformation type for registration results.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameResult};

/// Maximum Frobenius norm of `RᵀR − I` accepted for a rotation block.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// A rigid transformation: orthonormal rotation followed by translation.
///
/// Points map as `p' = R·p + t`. Transforms produced by registration map
/// scan space into frame space; the engine's final result is the inverse
/// (frame space into scan space), which is the direction an image
/// resampler pulling output voxels from the scan expects.
///
/// The rotation is stored as a matrix so that [`RigidTransform::inverse`]
/// is an exact transpose rather than a numerical inversion.
///
/// # Example
///
/// ```
/// use frame_types::RigidTransform;
/// use nalgebra::{Point3, Rotation3, Vector3};
/// use std::f64::consts::FRAC_PI_2;
///
/// let transform = RigidTransform::new(
///     Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
///     Vector3::new(1.0, 2.0, 3.0),
/// );
///
/// let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((p - Point3::new(1.0, 3.0, 3.0)).norm() < 1e-12);
///
/// let back = transform.inverse().transform_point(&p);
/// assert!((back - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "TransformData", into = "TransformData")
)]
pub struct RigidTransform {
    /// Orthonormal rotation.
    pub rotation: Rotation3<f64>,
    /// Translation vector in millimetres.
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Creates a transform from a rotation and a translation.
    #[must_use]
    pub const fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::identity(), translation)
    }

    /// A pure rotation about the origin.
    #[must_use]
    pub fn from_rotation(rotation: Rotation3<f64>) -> Self {
        Self::new(rotation, Vector3::zeros())
    }

    /// Builds a transform from a raw 3×3 matrix and translation, checking
    /// that the matrix is a proper rotation.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NonOrthonormal`] if `RᵀR` deviates from the
    /// identity by more than [`ORTHONORMAL_TOLERANCE`] or `det R ≤ 0`.
    pub fn try_from_parts(matrix: Matrix3<f64>, translation: Vector3<f64>) -> FrameResult<Self> {
        check_orthonormal(&matrix)?;
        Ok(Self::new(
            Rotation3::from_matrix_unchecked(matrix),
            translation,
        ))
    }

    /// Transforms a point.
    #[inline]
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation * point + self.translation
    }

    /// Transforms a direction vector (rotation only).
    #[inline]
    #[must_use]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * vector
    }

    /// Composes this transform with another (self * other).
    ///
    /// The result applies `other` first, then `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Exact inverse: transposed rotation and back-rotated translation.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Converts to a 4×4 homogeneous matrix with bottom row `[0, 0, 0, 1]`.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Builds a transform from a 4×4 homogeneous matrix.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NotHomogeneous`] if the bottom row is not
    /// `[0, 0, 0, 1]`, or [`FrameError::NonOrthonormal`] if the upper-left
    /// block is not a proper rotation (e.g. it carries scale or shear).
    pub fn from_matrix4(matrix: &Matrix4<f64>) -> FrameResult<Self> {
        const BOTTOM_TOLERANCE: f64 = 1e-12;

        let bottom = [matrix[(3, 0)], matrix[(3, 1)], matrix[(3, 2)], matrix[(3, 3)] - 1.0];
        if bottom.iter().any(|v| v.abs() > BOTTOM_TOLERANCE) {
            return Err(FrameError::NotHomogeneous);
        }

        let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = matrix.fixed_view::<3, 1>(0, 3).into_owned();
        Self::try_from_parts(rotation, translation)
    }

    /// Flattens the transform into twelve parameters: the rotation matrix
    /// in row-major order followed by the translation.
    ///
    /// This is the parameter layout of a 3D affine transform file, so the
    /// result can be written out and read back with
    /// [`RigidTransform::from_parameters`].
    #[must_use]
    pub fn to_parameters(&self) -> [f64; 12] {
        let m = self.rotation.matrix();
        let mut params = [0.0; 12];
        for row in 0..3 {
            for col in 0..3 {
                params[row * 3 + col] = m[(row, col)];
            }
            params[9 + row] = self.translation[row];
        }
        params
    }

    /// Rebuilds a transform from the layout of [`RigidTransform::to_parameters`].
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NonOrthonormal`] if the rotation block is not
    /// a proper rotation.
    pub fn from_parameters(params: &[f64; 12]) -> FrameResult<Self> {
        let matrix = Matrix3::from_row_slice(&params[..9]);
        let translation = Vector3::new(params[9], params[10], params[11]);
        Self::try_from_parts(matrix, translation)
    }

    /// Rotation angle in radians of the relative rotation between two
    /// transforms.
    #[must_use]
    pub fn angle_to(&self, other: &Self) -> f64 {
        rotation_angle(&(self.rotation.inverse() * other.rotation))
    }

    /// Rotation angle of this transform in radians, in `[0, π]`.
    #[must_use]
    pub fn angle(&self) -> f64 {
        rotation_angle(&self.rotation)
    }

    /// Returns true if this transform is approximately the identity.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        self.angle() < epsilon && self.translation.norm() < epsilon
    }

    /// Returns true if the rotation block is still orthonormal within
    /// [`ORTHONORMAL_TOLERANCE`].
    #[must_use]
    pub fn is_rigid(&self) -> bool {
        check_orthonormal(self.rotation.matrix()).is_ok()
    }
}

/// Rotation angle from `atan2(2·sin θ, 2·cos θ)`, which keeps full
/// precision for the near-identity rotations ICP produces.
fn rotation_angle(rotation: &Rotation3<f64>) -> f64 {
    let m = rotation.matrix();
    let sin2 = Vector3::new(
        m[(2, 1)] - m[(1, 2)],
        m[(0, 2)] - m[(2, 0)],
        m[(1, 0)] - m[(0, 1)],
    )
    .norm();
    let cos2 = m.trace() - 1.0;
    sin2.atan2(cos2)
}

/// Checks that `matrix` is a proper rotation (orthonormal, determinant +1).
///
/// # Errors
///
/// Returns [`FrameError::NonOrthonormal`] describing the deviation.
pub fn check_orthonormal(matrix: &Matrix3<f64>) -> FrameResult<()> {
    let deviation = (matrix.transpose() * matrix - Matrix3::identity()).norm();
    let determinant = matrix.determinant();
    if deviation.is_finite() && deviation < ORTHONORMAL_TOLERANCE && determinant > 0.0 {
        Ok(())
    } else {
        Err(FrameError::NonOrthonormal {
            deviation,
            determinant,
        })
    }
}

/// Serialized form of [`RigidTransform`]: row-major rotation and translation.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct TransformData {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

#[cfg(feature = "serde")]
impl From<RigidTransform> for TransformData {
    fn from(t: RigidTransform) -> Self {
        let m = t.rotation.matrix();
        Self {
            rotation: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            translation: [t.translation.x, t.translation.y, t.translation.z],
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<TransformData> for RigidTransform {
    type Error = FrameError;

    fn try_from(data: TransformData) -> Result<Self, Self::Error> {
        let r = data.rotation;
        let matrix = Matrix3::new(
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
        );
        Self::try_from_parts(matrix, Vector3::from(data.translation))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn sample_transform() -> RigidTransform {
        let axis = nalgebra::Unit::new_normalize(Vector3::new(1.0, -2.0, 0.5));
        RigidTransform::new(
            Rotation3::from_axis_angle(&axis, 0.7),
            Vector3::new(-103.7, 18.7, 88.0),
        )
    }

    #[test]
    fn test_identity_transform() {
        let transform = RigidTransform::identity();
        let point = Point3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(transform.transform_point(&point), point, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_90_degrees_z() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
        let transform = RigidTransform::from_rotation(rotation);
        let result = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_applies_right_first() {
        let rotate = RigidTransform::from_rotation(Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            PI / 2.0,
        ));
        let shift = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));

        // Shift then rotate: (0,0,0) -> (1,0,0) -> (0,1,0)
        let p = rotate.compose(&shift).transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let transform = sample_transform();
        let point = Point3::new(12.5, -40.0, 77.25);
        let recovered = transform
            .inverse()
            .transform_point(&transform.transform_point(&point));
        assert!((recovered - point).norm() < 1e-9);
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let transform = sample_transform();
        assert!(transform.compose(&transform.inverse()).is_identity(1e-12));
        assert!(transform.inverse().compose(&transform).is_identity(1e-12));
    }

    #[test]
    fn test_transform_vector_ignores_translation() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
        let transform = RigidTransform::new(rotation, Vector3::new(100.0, 100.0, 100.0));
        let result = transform.transform_vector(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(result, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix4_round_trip() {
        let transform = sample_transform();
        let mat = transform.to_matrix4();
        assert_eq!(mat[(3, 3)], 1.0);
        assert_eq!(mat[(3, 0)], 0.0);
        assert_relative_eq!(mat[(0, 3)], -103.7);

        let restored = RigidTransform::from_matrix4(&mat).unwrap();
        assert_eq!(restored, transform);
    }

    #[test]
    fn test_from_matrix4_rejects_scale() {
        let mut mat = Matrix4::identity();
        mat[(0, 0)] = 2.0;
        assert!(matches!(
            RigidTransform::from_matrix4(&mat),
            Err(FrameError::NonOrthonormal { .. })
        ));
    }

    #[test]
    fn test_from_matrix4_rejects_projective_row() {
        let mut mat = Matrix4::identity();
        mat[(3, 0)] = 0.5;
        assert_eq!(
            RigidTransform::from_matrix4(&mat),
            Err(FrameError::NotHomogeneous)
        );
    }

    #[test]
    fn test_reflection_rejected() {
        let mut reflect = Matrix3::identity();
        reflect[(2, 2)] = -1.0;
        let err = RigidTransform::try_from_parts(reflect, Vector3::zeros()).unwrap_err();
        assert!(matches!(err, FrameError::NonOrthonormal { determinant, .. } if determinant < 0.0));
    }

    #[test]
    fn test_parameters_round_trip() {
        let transform = sample_transform();
        let params = transform.to_parameters();
        assert_eq!(params[9], -103.7);
        assert_eq!(params[1], transform.rotation.matrix()[(0, 1)]);

        let restored = RigidTransform::from_parameters(&params).unwrap();
        assert_eq!(restored.to_parameters(), params);
    }

    #[test]
    fn test_angle_to() {
        let a = RigidTransform::from_rotation(Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            0.1,
        ));
        let b = RigidTransform::from_rotation(Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            0.35,
        ));
        assert_relative_eq!(a.angle_to(&b), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_is_identity() {
        assert!(RigidTransform::identity().is_identity(1e-10));
        let t = RigidTransform::from_translation(Vector3::new(0.001, 0.0, 0.0));
        assert!(!t.is_identity(1e-10));
        assert!(t.is_identity(0.01));

        let tiny = RigidTransform::from_rotation(Rotation3::from_axis_angle(
            &Vector3::x_axis(),
            1e-9,
        ));
        assert_relative_eq!(tiny.angle(), 1e-9, max_relative = 1e-6);
        assert_eq!(RigidTransform::default(), RigidTransform::identity());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let transform = sample_transform();
        let json = serde_json::to_string(&transform).unwrap();
        let parsed: RigidTransform = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to_parameters(), transform.to_parameters());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_rejects_scaled_rotation() {
        let json = r#"{"rotation":[[2,0,0],[0,1,0],[0,0,1]],"translation":[0,0,0]}"#;
        assert!(serde_json::from_str::<RigidTransform>(json).is_err());
    }
}
