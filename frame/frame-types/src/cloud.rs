//! Point clouds accumulated from per-slice marker detections.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RigidTransform;

/// A coordinate axis of the scan's physical space.
///
/// Frame filters address the depth (slice) axis and the lateral
/// (left/right) axis through this type so that a frame profile can
/// remap them without touching the filter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// Left/right.
    X,
    /// Posterior/anterior.
    Y,
    /// Inferior/superior (slice depth for axial scans).
    Z,
}

impl Axis {
    /// Component index of this axis (0, 1 or 2).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Reads this axis' coordinate from a point.
    #[inline]
    #[must_use]
    pub fn of(self, point: &Point3<f64>) -> f64 {
        point[self.index()]
    }
}

/// An ordered collection of 3D points in millimetres.
///
/// Order follows acquisition (slice traversal, then detector order) but
/// carries no meaning for registration. Operations that filter or move
/// points return a new cloud so each registration stage keeps its input
/// intact.
///
/// # Example
///
/// ```
/// use frame_types::{Axis, PointCloud};
/// use nalgebra::Point3;
///
/// let cloud = PointCloud::from_points(vec![
///     Point3::new(0.0, 0.0, -50.0),
///     Point3::new(10.0, 0.0, -10.0),
/// ]);
///
/// let deep = cloud.filter(|p| Axis::Z.of(p) < -20.0);
/// assert_eq!(deep.len(), 1);
/// assert_eq!(cloud.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud {
    /// Points in insertion order.
    pub points: Vec<Point3<f64>>,
}

impl PointCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a cloud from existing points.
    #[must_use]
    pub const fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends a point.
    pub fn push(&mut self, point: Point3<f64>) {
        self.points.push(point);
    }

    /// Iterates over the points.
    pub fn iter(&self) -> std::slice::Iter<'_, Point3<f64>> {
        self.points.iter()
    }

    /// Borrows the points as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Returns a new cloud with the points matching `predicate`, in order.
    #[must_use]
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Point3<f64>) -> bool,
    {
        Self {
            points: self.points.iter().copied().filter(|p| predicate(p)).collect(),
        }
    }

    /// Returns the concatenation of `self` followed by `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut points = Vec::with_capacity(self.len() + other.len());
        points.extend_from_slice(&self.points);
        points.extend_from_slice(&other.points);
        Self { points }
    }

    /// Returns a new cloud with every point moved by `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &RigidTransform) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| transform.transform_point(p))
                .collect(),
        }
    }

    /// Arithmetic mean of the points, or `None` for an empty cloud.
    #[must_use]
    pub fn centroid(&self) -> Option<Point3<f64>> {
        centroid(&self.points)
    }

    /// Coordinates of every point along `axis`, in cloud order.
    #[must_use]
    pub fn coordinates(&self, axis: Axis) -> Vec<f64> {
        self.points.iter().map(|p| axis.of(p)).collect()
    }

    /// The `q`-th percentile (0-100) of the coordinates along `axis`.
    ///
    /// Returns `None` for an empty cloud or a percentile outside [0, 100].
    #[must_use]
    pub fn percentile(&self, axis: Axis, q: f64) -> Option<f64> {
        percentile(&self.coordinates(axis), q)
    }

    /// Returns true if the cloud contains three points that are not collinear.
    #[must_use]
    pub fn spans_plane(&self) -> bool {
        spans_plane(&self.points)
    }
}

impl FromIterator<Point3<f64>> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3<f64>>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<Point3<f64>> for PointCloud {
    fn extend<I: IntoIterator<Item = Point3<f64>>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Point3<f64>;
    type IntoIter = std::slice::Iter<'a, Point3<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Arithmetic mean of a point set, or `None` if it is empty.
#[must_use]
pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Some(Point3::from(sum / n))
}

/// Percentile with linear interpolation between order statistics.
///
/// For `n` sorted values the rank is `q / 100 · (n − 1)`; fractional
/// ranks interpolate between the two neighbouring values.
///
/// # Example
///
/// ```
/// use frame_types::percentile;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(percentile(&values, 50.0), Some(3.0));
/// assert!((percentile(&values, 90.0).unwrap() - 4.6).abs() < 1e-12);
/// assert_eq!(percentile(&[], 50.0), None);
/// ```
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = rank - rank.floor();

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Returns true if `points` contains at least three non-collinear points.
///
/// Collinearity is judged relative to the extent of the set, so the test
/// behaves the same for clouds measured in millimetres or metres.
#[must_use]
pub fn spans_plane(points: &[Point3<f64>]) -> bool {
    const RELATIVE_TOLERANCE: f64 = 1e-9;

    let Some(first) = points.first() else {
        return false;
    };
    if points.len() < 3 {
        return false;
    }

    // Farthest point from the first defines the candidate line.
    let Some(far) = points
        .iter()
        .max_by(|a, b| (*a - first).norm_squared().total_cmp(&(*b - first).norm_squared()))
    else {
        return false;
    };
    let span = (far - first).norm();
    if span <= f64::MIN_POSITIVE {
        return false;
    }
    let direction = (far - first) / span;
    let tolerance = RELATIVE_TOLERANCE * span.max(1.0);

    points.iter().any(|p| {
        let offset = p - first;
        (offset - direction * offset.dot(&direction)).norm() > tolerance
    })
}
