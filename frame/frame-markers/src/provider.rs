//! Slice traversal and point cloud accumulation.

use frame_types::{Point3, PointCloud};
use nalgebra::Point2;
use tracing::{debug, info};

use crate::{ImageSlice, Preprocessor, Volume};

/// A source of 2D slices ordered along the depth axis.
pub trait SliceProvider {
    /// The slice image type handed to detectors.
    type Slice;

    /// Returns `true` once every slice has been handed out.
    fn is_exhausted(&self) -> bool;

    /// Returns the next slice and advances, or `None` when exhausted.
    fn next_slice(&mut self) -> Option<Self::Slice>;

    /// Depth coordinate (mm) of the most recently returned slice.
    fn current_depth(&self) -> f64;
}

/// Locates fiducial marker centres in one slice.
///
/// Closures of the form `Fn(&S) -> Vec<Point2<f64>>` are detectors too.
pub trait MarkerDetector<S> {
    /// In-plane physical positions of the markers found in `slice`.
    fn detect(&self, slice: &S) -> Vec<Point2<f64>>;
}

impl<S, F> MarkerDetector<S> for F
where
    F: Fn(&S) -> Vec<Point2<f64>>,
{
    fn detect(&self, slice: &S) -> Vec<Point2<f64>> {
        self(slice)
    }
}

/// Runs `detector` over every remaining slice of `provider` and stacks
/// the detections into one cloud.
///
/// Each candidate `(x, y)` becomes `(x, y, depth)`, with the depth read
/// from the provider after it has advanced to that slice. Points keep
/// slice order, then detector order.
///
/// # Example
///
/// ```
/// use frame_markers::{accumulate, AxialSliceProvider, ImageSlice, Volume};
/// use nalgebra::Point2;
///
/// let volume = Volume::new([2, 2, 3], vec![0.0; 12]).unwrap();
/// let mut provider = AxialSliceProvider::new(volume);
///
/// let cloud = accumulate(&mut provider, &|_: &ImageSlice| vec![Point2::new(1.0, 2.0)]);
/// assert_eq!(cloud.len(), 3);
/// assert_eq!(cloud.points[2].z, 2.0);
/// ```
pub fn accumulate<P, D>(provider: &mut P, detector: &D) -> PointCloud
where
    P: SliceProvider + ?Sized,
    D: MarkerDetector<P::Slice> + ?Sized,
{
    let mut cloud = PointCloud::new();
    let mut slices = 0_usize;

    while !provider.is_exhausted() {
        let Some(slice) = provider.next_slice() else {
            break;
        };
        slices += 1;

        let candidates = detector.detect(&slice);
        let depth = provider.current_depth();
        if !candidates.is_empty() {
            debug!(depth, candidates = candidates.len(), "slice markers");
        }
        cloud.extend(candidates.iter().map(|c| Point3::new(c.x, c.y, depth)));
    }

    info!(slices, points = cloud.len(), "accumulated marker cloud");
    cloud
}

/// Walks a [`Volume`] slice by slice along its third index axis.
///
/// Slices come in storage order, slice 0 first. The volume is not
/// reoriented, so callers that need the superior slice first store it at
/// index 0 (a negative z direction cosine with the origin at the top of
/// the frame). An optional [`Preprocessor`] is applied to every slice
/// before it is returned.
#[derive(Debug, Clone)]
pub struct AxialSliceProvider {
    volume: Volume,
    preprocessor: Option<Preprocessor>,
    next: usize,
}

impl AxialSliceProvider {
    /// Creates a provider positioned before the first slice.
    #[must_use]
    pub const fn new(volume: Volume) -> Self {
        Self {
            volume,
            preprocessor: None,
            next: 0,
        }
    }

    /// Applies `preprocessor` to every slice.
    #[must_use]
    pub const fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// The underlying volume.
    #[must_use]
    pub const fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Total number of slices.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.volume.slice_count()
    }

    /// Returns `true` if the volume has no slices.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewinds to the first slice.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl SliceProvider for AxialSliceProvider {
    type Slice = ImageSlice;

    fn is_exhausted(&self) -> bool {
        self.next >= self.volume.slice_count()
    }

    fn next_slice(&mut self) -> Option<ImageSlice> {
        let slice = self.volume.slice(self.next)?;
        self.next += 1;
        Some(match &self.preprocessor {
            Some(pre) => pre.apply(&slice),
            None => slice,
        })
    }

    /// Before the first call to `next_slice` this is the depth of slice 0.
    fn current_depth(&self) -> f64 {
        self.volume.slice_depth(self.next.saturating_sub(1))
    }
}
