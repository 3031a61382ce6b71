//! Frame geometry definitions.
//!
//! A frame is a set of nodes (bar endpoints, in frame coordinates) plus,
//! per modality, the edges between nodes that show up as markers in that
//! kind of scan.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameResult, Modality, ReferenceMesh};

/// Read access to a stereotactic frame's known geometry.
///
/// Implementors describe the frame; the registration pipeline only needs
/// the nodes and the edge list for the scan's modality.
pub trait FrameGeometry {
    /// Node coordinates in frame space (mm).
    fn nodes(&self) -> &[Point3<f64>];

    /// Node-index pairs forming the visible bars for `modality`.
    fn edges(&self, modality: Modality) -> &[[usize; 2]];

    /// Builds the reference mesh for `modality`.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if the edge list is empty or references
    /// nodes that do not exist.
    fn reference_mesh(&self, modality: Modality) -> FrameResult<ReferenceMesh> {
        ReferenceMesh::new(self.nodes(), self.edges(modality))
    }
}

/// A frame described entirely by data.
///
/// Construct it with [`StaticFrame::new`], which validates every edge, or
/// deserialize it (with the `serde` feature) from a frame profile.
///
/// # Example
///
/// ```
/// use frame_types::{FrameGeometry, Modality, StaticFrame};
///
/// let frame = StaticFrame::leksell();
/// let mesh = frame.reference_mesh(Modality::Mr).unwrap();
/// assert_eq!(mesh.segment_count(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StaticFrame {
    nodes: Vec<Point3<f64>>,
    ct_edges: Vec<[usize; 2]>,
    mr_edges: Vec<[usize; 2]>,
    /// Physical size of the frame along each axis (mm).
    pub dimensions: [f64; 3],
    /// Margin added on both sides of each axis when sizing output grids (mm).
    pub offset: [f64; 3],
}

impl StaticFrame {
    /// Creates a frame, validating both edge lists against the nodes.
    ///
    /// Dimensions and offset start at zero; set them with
    /// [`with_extent`](Self::with_extent).
    ///
    /// # Errors
    ///
    /// Returns the first edge validation error found, CT edges first.
    pub fn new(
        nodes: Vec<Point3<f64>>,
        ct_edges: Vec<[usize; 2]>,
        mr_edges: Vec<[usize; 2]>,
    ) -> FrameResult<Self> {
        validate_edges(&nodes, &ct_edges)?;
        validate_edges(&nodes, &mr_edges)?;
        Ok(Self {
            nodes,
            ct_edges,
            mr_edges,
            dimensions: [0.0; 3],
            offset: [0.0; 3],
        })
    }

    /// Leksell-style localizer: two lateral N-plates at x = 0 and x = 190 mm,
    /// each spanning y in [0, 120] and z in [-120, 0].
    ///
    /// Both modalities see the same six bars.
    #[must_use]
    pub fn leksell() -> Self {
        let mut nodes = Vec::with_capacity(8);
        for x in [0.0, 190.0] {
            nodes.push(Point3::new(x, 0.0, 0.0));
            nodes.push(Point3::new(x, 120.0, 0.0));
            nodes.push(Point3::new(x, 0.0, -120.0));
            nodes.push(Point3::new(x, 120.0, -120.0));
        }
        // Posterior post, diagonal, anterior post for each plate.
        let edges = vec![[0, 2], [2, 1], [1, 3], [4, 6], [6, 5], [5, 7]];

        Self {
            nodes,
            ct_edges: edges.clone(),
            mr_edges: edges,
            dimensions: [190.0, 120.0, 120.0],
            offset: [5.0, 5.0, 5.0],
        }
    }

    /// Sets the frame dimensions and output-grid offset.
    #[must_use]
    pub const fn with_extent(mut self, dimensions: [f64; 3], offset: [f64; 3]) -> Self {
        self.dimensions = dimensions;
        self.offset = offset;
        self
    }

    /// Voxel extent of a frame-space grid with the given spacing.
    ///
    /// # Errors
    ///
    /// See [`frame_extent`].
    pub fn extent(&self, spacing: [f64; 3]) -> FrameResult<[usize; 3]> {
        frame_extent(self.dimensions, spacing, self.offset)
    }
}

impl FrameGeometry for StaticFrame {
    fn nodes(&self) -> &[Point3<f64>] {
        &self.nodes
    }

    fn edges(&self, modality: Modality) -> &[[usize; 2]] {
        match modality {
            Modality::Ct => &self.ct_edges,
            Modality::Mr => &self.mr_edges,
        }
    }
}

fn validate_edges(nodes: &[Point3<f64>], edges: &[[usize; 2]]) -> FrameResult<()> {
    if edges.is_empty() {
        return Err(FrameError::EmptyGeometry);
    }
    for (edge, &[a, b]) in edges.iter().enumerate() {
        if let Some(&node) = [a, b].iter().find(|&&n| n >= nodes.len()) {
            return Err(FrameError::EdgeOutOfBounds {
                edge,
                node,
                node_count: nodes.len(),
            });
        }
        if a == b {
            return Err(FrameError::DegenerateEdge { edge, node: a });
        }
    }
    Ok(())
}

/// Number of voxels along each axis of a frame-space output grid.
///
/// Each axis gets `round((dimension + 2·|offset|) / spacing)` voxels.
///
/// # Errors
///
/// Returns [`FrameError::InvalidValue`] if a spacing is not finite and
/// positive, or a dimension is negative or not finite.
///
/// # Example
///
/// ```
/// use frame_types::frame_extent;
///
/// let extent = frame_extent([190.0, 120.0, 120.0], [0.5, 0.5, 1.0], [5.0, 5.0, 5.0]).unwrap();
/// assert_eq!(extent, [400, 260, 130]);
/// ```
pub fn frame_extent(
    dimensions: [f64; 3],
    spacing: [f64; 3],
    offset: [f64; 3],
) -> FrameResult<[usize; 3]> {
    let mut extent = [0; 3];
    for axis in 0..3 {
        let s = spacing[axis];
        if !s.is_finite() || s <= 0.0 {
            return Err(FrameError::InvalidValue {
                name: "spacing",
                value: s,
            });
        }
        let d = dimensions[axis];
        if !d.is_finite() || d < 0.0 {
            return Err(FrameError::InvalidValue {
                name: "dimension",
                value: d,
            });
        }
        let o = offset[axis];
        if !o.is_finite() {
            return Err(FrameError::InvalidValue {
                name: "offset",
                value: o,
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let voxels = ((d + 2.0 * o.abs()) / s).round() as usize;
        extent[axis] = voxels;
    }
    Ok(extent)
}
