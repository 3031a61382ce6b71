//! Closest-point targets for ICP.

use frame_types::{centroid, ReferenceMesh};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

/// Something ICP can align a point set onto.
///
/// Implementors answer closest-point queries and expose the points used
/// to validate the target and seed alignment. Queries run in parallel,
/// so targets must be `Sync`.
pub trait ClosestPointTarget: Sync {
    /// The point of the target closest to `point`.
    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64>;

    /// Representative points of the target, used for validation.
    fn target_points(&self) -> &[Point3<f64>];

    /// Point the source centroid is moved onto when seeding alignment.
    ///
    /// Defaults to the mean of [`target_points`](Self::target_points).
    fn centroid(&self) -> Option<Point3<f64>> {
        centroid(self.target_points())
    }
}

impl ClosestPointTarget for ReferenceMesh {
    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Self::closest_point(self, point).point
    }

    fn target_points(&self) -> &[Point3<f64>] {
        self.vertices()
    }
}

/// A point-set target backed by a KD-tree.
///
/// # Example
///
/// ```
/// use frame_registration::{ClosestPointTarget, PointTarget};
/// use nalgebra::Point3;
///
/// let target = PointTarget::new(vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(10.0, 0.0, 0.0),
///     Point3::new(0.0, 10.0, 0.0),
/// ]);
/// let hit = target.closest_point(&Point3::new(9.0, 1.0, 0.0));
/// assert_eq!(hit, Point3::new(10.0, 0.0, 0.0));
/// ```
pub struct PointTarget {
    points: Vec<Point3<f64>>,
    tree: KdTree<f64, 3>,
}

impl std::fmt::Debug for PointTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointTarget")
            .field("points", &self.points.len())
            .finish_non_exhaustive()
    }
}

impl PointTarget {
    /// Builds the KD-tree over `points`.
    #[must_use]
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Self { points, tree }
    }

    /// Number of target points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the target has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl ClosestPointTarget for PointTarget {
    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        if self.points.is_empty() {
            return *point;
        }
        let nearest = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[point.x, point.y, point.z]);
        #[allow(clippy::cast_possible_truncation)]
        let idx = nearest.item as usize;
        self.points.get(idx).copied().unwrap_or(*point)
    }

    fn target_points(&self) -> &[Point3<f64>] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_point_target_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let points: Vec<Point3<f64>> = (0..200)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                )
            })
            .collect();
        let target = PointTarget::new(points.clone());

        for _ in 0..20 {
            let q = Point3::new(
                rng.gen_range(-60.0..60.0),
                rng.gen_range(-60.0..60.0),
                rng.gen_range(-60.0..60.0),
            );
            let expected = points
                .iter()
                .min_by(|a, b| (*a - q).norm_squared().total_cmp(&(*b - q).norm_squared()))
                .unwrap();
            assert_relative_eq!((target.closest_point(&q) - q).norm(), (expected - q).norm());
        }
    }

    #[test]
    fn test_mesh_target_seeds_on_vertex_mean() {
        // One N-plate at x = 0 and a lone post at x = 190
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -120.0),
            Point3::new(0.0, 120.0, 0.0),
            Point3::new(0.0, 120.0, -120.0),
            Point3::new(190.0, 0.0, 0.0),
            Point3::new(190.0, 0.0, -120.0),
        ];
        let mesh = ReferenceMesh::new(&nodes, &[[0, 1], [2, 3], [2, 1], [4, 5]]).unwrap();

        let seed = ClosestPointTarget::centroid(&mesh).unwrap();
        assert_relative_eq!(seed, Point3::new(380.0 / 6.0, 40.0, -60.0), epsilon = 1e-12);
        assert!((seed - mesh.centroid()).norm() > 10.0);
        assert_eq!(mesh.target_points().len(), 6);
        assert_relative_eq!(
            ClosestPointTarget::closest_point(&mesh, &Point3::new(3.0, 0.0, -50.0)),
            Point3::new(0.0, 0.0, -50.0)
        );
    }

    #[test]
    fn test_empty_point_target() {
        let target = PointTarget::new(Vec::new());
        assert!(target.is_empty());
        assert!(ClosestPointTarget::centroid(&target).is_none());
    }
}
