//! Polyline reference mesh built from frame nodes and edges.
//!
//! The reference mesh is the registration target: ICP matches every
//! marker to the closest point on the frame's skeleton, and the inlier
//! filter measures marker-to-skeleton distances.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameResult};

/// A straight line segment between two frame nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    /// First endpoint.
    pub start: Point3<f64>,
    /// Second endpoint.
    pub end: Point3<f64>,
}

impl Segment {
    /// Creates a segment.
    #[must_use]
    pub const fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    /// Segment length.
    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Midpoint of the segment.
    #[must_use]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.end)
    }

    /// Closest point on the segment to `point`.
    ///
    /// Projects onto the supporting line and clamps to the endpoints.
    #[must_use]
    pub fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let direction = self.end - self.start;
        let length_sq = direction.norm_squared();
        if length_sq <= f64::MIN_POSITIVE {
            return self.start;
        }
        let t = ((point - self.start).dot(&direction) / length_sq).clamp(0.0, 1.0);
        self.start + direction * t
    }
}

/// Result of a closest-point query against a [`ReferenceMesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    /// Closest point on the mesh.
    pub point: Point3<f64>,
    /// Euclidean distance from the query point.
    pub distance: f64,
    /// Index of the segment containing `point`.
    pub segment: usize,
}

/// Piecewise-linear frame skeleton used as the registration target.
///
/// Built once from frame nodes and a modality's edge list; immutable and
/// safe to share across threads afterwards.
///
/// # Example
///
/// ```
/// use frame_types::ReferenceMesh;
/// use nalgebra::Point3;
///
/// let nodes = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(0.0, 0.0, -100.0),
/// ];
/// let mesh = ReferenceMesh::new(&nodes, &[[0, 1]]).unwrap();
///
/// let hit = mesh.closest_point(&Point3::new(3.0, 4.0, -50.0));
/// assert!((hit.distance - 5.0).abs() < 1e-12);
/// assert!((hit.point.z + 50.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "MeshData", into = "MeshData")
)]
pub struct ReferenceMesh {
    segments: Vec<Segment>,
    vertices: Vec<Point3<f64>>,
    edges: Vec<[usize; 2]>,
}

impl ReferenceMesh {
    /// Builds the mesh from node coordinates and node-index pairs.
    ///
    /// # Errors
    ///
    /// - [`FrameError::EmptyGeometry`] if there are no edges
    /// - [`FrameError::EdgeOutOfBounds`] if an edge names a missing node
    /// - [`FrameError::DegenerateEdge`] if an edge joins a node to itself
    pub fn new(nodes: &[Point3<f64>], edges: &[[usize; 2]]) -> FrameResult<Self> {
        if edges.is_empty() {
            return Err(FrameError::EmptyGeometry);
        }

        let mut used = vec![false; nodes.len()];
        let mut segments = Vec::with_capacity(edges.len());
        for (edge_idx, &[a, b]) in edges.iter().enumerate() {
            for node in [a, b] {
                if node >= nodes.len() {
                    return Err(FrameError::EdgeOutOfBounds {
                        edge: edge_idx,
                        node,
                        node_count: nodes.len(),
                    });
                }
            }
            if a == b {
                return Err(FrameError::DegenerateEdge {
                    edge: edge_idx,
                    node: a,
                });
            }
            used[a] = true;
            used[b] = true;
            segments.push(Segment::new(nodes[a], nodes[b]));
        }

        // Renumber edges against the used nodes only
        let mut remap = vec![0; nodes.len()];
        let mut vertices = Vec::new();
        for (idx, p) in nodes.iter().enumerate() {
            if used[idx] {
                remap[idx] = vertices.len();
                vertices.push(*p);
            }
        }
        let edges = edges.iter().map(|&[a, b]| [remap[a], remap[b]]).collect();

        Ok(Self {
            segments,
            vertices,
            edges,
        })
    }

    /// The mesh segments, in edge order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The distinct nodes referenced by at least one edge, in node order.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Edges as index pairs into [`vertices`](Self::vertices), in edge order.
    #[must_use]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Total length of all segments.
    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(Segment::length).sum()
    }

    /// Length-weighted centroid of the skeleton.
    ///
    /// This is the centre of mass of the wire frame, independent of how
    /// many nodes subdivide each bar. ICP seeds on the vertex mean instead.
    /// Falls back to the vertex mean when every segment has zero length.
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        let total = self.total_length();
        if total > f64::MIN_POSITIVE {
            let weighted: Vector3<f64> = self
                .segments
                .iter()
                .map(|s| s.midpoint().coords * s.length())
                .sum();
            return Point3::from(weighted / total);
        }
        crate::centroid(&self.vertices).unwrap_or_else(Point3::origin)
    }

    /// Closest point on the mesh to `point`.
    ///
    /// Ties keep the lowest segment index, so results are deterministic.
    #[must_use]
    pub fn closest_point(&self, point: &Point3<f64>) -> ClosestPoint {
        let mut best = ClosestPoint {
            point: self.segments[0].start,
            distance: f64::INFINITY,
            segment: 0,
        };
        let mut best_sq = f64::INFINITY;

        for (idx, segment) in self.segments.iter().enumerate() {
            let candidate = segment.closest_point(point);
            let dist_sq = (candidate - point).norm_squared();
            if dist_sq < best_sq {
                best_sq = dist_sq;
                best = ClosestPoint {
                    point: candidate,
                    distance: 0.0,
                    segment: idx,
                };
            }
        }

        best.distance = best_sq.sqrt();
        best
    }

    /// Closest points for many queries, computed in parallel.
    ///
    /// The output is in the same order as `points`.
    #[must_use]
    pub fn closest_points(&self, points: &[Point3<f64>]) -> Vec<ClosestPoint> {
        points.par_iter().map(|p| self.closest_point(p)).collect()
    }

    /// Distance from `point` to the mesh.
    #[must_use]
    pub fn distance(&self, point: &Point3<f64>) -> f64 {
        self.closest_point(point).distance
    }
}

/// Serialized form of [`ReferenceMesh`]: nodes and node-index edges.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct MeshData {
    nodes: Vec<Point3<f64>>,
    edges: Vec<[usize; 2]>,
}

#[cfg(feature = "serde")]
impl From<ReferenceMesh> for MeshData {
    fn from(mesh: ReferenceMesh) -> Self {
        Self {
            nodes: mesh.vertices,
            edges: mesh.edges,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<MeshData> for ReferenceMesh {
    type Error = FrameError;

    fn try_from(data: MeshData) -> Result<Self, Self::Error> {
        Self::new(&data.nodes, &data.edges)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two vertical posts 200 mm apart, 120 mm tall.
    fn posts() -> ReferenceMesh {
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -120.0),
            Point3::new(200.0, 0.0, 0.0),
            Point3::new(200.0, 0.0, -120.0),
        ];
        ReferenceMesh::new(&nodes, &[[0, 1], [2, 3]]).unwrap()
    }

    #[test]
    fn test_segment_closest_point_clamps() {
        let segment = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));

        assert_relative_eq!(
            segment.closest_point(&Point3::new(5.0, 3.0, 0.0)),
            Point3::new(5.0, 0.0, 0.0)
        );
        assert_relative_eq!(
            segment.closest_point(&Point3::new(-4.0, 1.0, 0.0)),
            Point3::new(0.0, 0.0, 0.0)
        );
        assert_relative_eq!(
            segment.closest_point(&Point3::new(14.0, 1.0, 0.0)),
            Point3::new(10.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_zero_length_segment() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let segment = Segment::new(p, p);
        assert_eq!(segment.closest_point(&Point3::origin()), p);
    }

    #[test]
    fn test_closest_point_picks_nearest_post() {
        let mesh = posts();
        let hit = mesh.closest_point(&Point3::new(190.0, 2.0, -60.0));
        assert_eq!(hit.segment, 1);
        assert_relative_eq!(hit.point, Point3::new(200.0, 0.0, -60.0), epsilon = 1e-12);
        assert_relative_eq!(hit.distance, 104.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_closest_points_preserves_order() {
        let mesh = posts();
        let queries = [
            Point3::new(1.0, 0.0, -10.0),
            Point3::new(199.0, 0.0, -10.0),
            Point3::new(0.0, 0.0, 30.0),
        ];
        let hits = mesh.closest_points(&queries);
        assert_eq!(hits.iter().map(|h| h.segment).collect::<Vec<_>>(), vec![0, 1, 0]);
        assert_relative_eq!(hits[2].distance, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_centroid_is_length_weighted() {
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -100.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, -10.0),
        ];
        let mesh = ReferenceMesh::new(&nodes, &[[0, 1], [2, 3]]).unwrap();
        let c = mesh.centroid();
        assert_relative_eq!(c.x, 100.0 / 110.0, epsilon = 1e-12);
        assert_relative_eq!(c.z, (-50.0 * 100.0 - 5.0 * 10.0) / 110.0, epsilon = 1e-12);
        assert_relative_eq!(posts().centroid(), Point3::new(100.0, 0.0, -60.0));
    }

    #[test]
    fn test_vertices_only_used_nodes() {
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let mesh = ReferenceMesh::new(&nodes, &[[0, 2]]).unwrap();
        assert_eq!(mesh.vertices(), &[nodes[0], nodes[2]]);
        assert_eq!(mesh.edges(), &[[0, 1]]);
    }

    #[test]
    fn test_rejects_bad_edges() {
        let nodes = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            ReferenceMesh::new(&nodes, &[[0, 5]]),
            Err(FrameError::EdgeOutOfBounds {
                edge: 0,
                node: 5,
                node_count: 2
            })
        );
        assert_eq!(
            ReferenceMesh::new(&nodes, &[[0, 1], [1, 1]]),
            Err(FrameError::DegenerateEdge { edge: 1, node: 1 })
        );
        assert_eq!(ReferenceMesh::new(&nodes, &[]), Err(FrameError::EmptyGeometry));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(9.0, 9.0, 9.0),
            Point3::new(0.0, 0.0, -120.0),
            Point3::new(0.0, 120.0, 0.0),
        ];
        let mesh = ReferenceMesh::new(&nodes, &[[0, 2], [3, 2]]).unwrap();
        let json = serde_json::to_string(&mesh).unwrap();
        let parsed: ReferenceMesh = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, mesh);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_rejects_invalid_mesh() {
        assert!(serde_json::from_str::<ReferenceMesh>(r#"{"nodes":[],"edges":[]}"#).is_err());
        assert!(
            serde_json::from_str::<ReferenceMesh>(r#"{"nodes":[[0,0,0]],"edges":[[0,3]]}"#)
                .is_err()
        );
        assert!(serde_json::from_str::<ReferenceMesh>(r#"{"segments":[],"vertices":[]}"#).is_err());
    }
}
