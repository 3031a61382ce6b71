//! Fiducial marker detection by connected-component labelling.

use std::collections::VecDeque;

use nalgebra::Point2;
use tracing::debug;

use crate::{ImageSlice, MarkerDetector};

/// Default upper bound on a marker's cross-section (mm²).
pub const DEFAULT_MAX_AREA_MM2: f64 = 150.0;

/// Offsets of the 4-connected neighbourhood.
const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Finds small bright blobs in a slice and returns their centres.
///
/// Pixels with a value above zero are foreground. Each 4-connected
/// foreground component whose physical area is below `max_area_mm2`
/// yields one marker at its intensity-weighted centre of gravity, in
/// physical coordinates. Markers are ordered by the raster position of
/// each component's first pixel.
///
/// # Example
///
/// ```
/// use frame_markers::{BlobDetector, ImageSlice};
///
/// let mut pixels = vec![0.0; 25];
/// pixels[2 * 5 + 3] = 1.0;
/// let slice = ImageSlice::new(5, 5, pixels).unwrap();
///
/// let markers = BlobDetector::new().detect(&slice);
/// assert_eq!(markers.len(), 1);
/// assert_eq!((markers[0].x, markers[0].y), (3.0, 2.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlobDetector {
    /// Components this large or larger are rejected (mm²).
    pub max_area_mm2: f64,
}

impl Default for BlobDetector {
    fn default() -> Self {
        Self {
            max_area_mm2: DEFAULT_MAX_AREA_MM2,
        }
    }
}

#[derive(Debug, Default)]
struct Blob {
    pixels: usize,
    weight: f64,
    weighted_x: f64,
    weighted_y: f64,
}

impl BlobDetector {
    /// Creates a detector with the default area bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum marker area (mm²).
    #[must_use]
    pub const fn with_max_area(mut self, max_area_mm2: f64) -> Self {
        self.max_area_mm2 = max_area_mm2;
        self
    }

    /// Detects marker centres in `slice`.
    #[must_use]
    pub fn detect(&self, slice: &ImageSlice) -> Vec<Point2<f64>> {
        let blobs = label_components(slice);
        let total = blobs.len();
        let pixel_area = slice.pixel_area();

        let markers: Vec<Point2<f64>> = blobs
            .into_iter()
            .filter_map(|blob| {
                #[allow(clippy::cast_precision_loss)]
                let area = blob.pixels as f64 * pixel_area;
                (area < self.max_area_mm2 && blob.weight > 0.0).then(|| {
                    slice.index_to_physical(
                        blob.weighted_x / blob.weight,
                        blob.weighted_y / blob.weight,
                    )
                })
            })
            .collect();

        debug!(
            components = total,
            markers = markers.len(),
            "labelled slice"
        );
        markers
    }
}

impl MarkerDetector<ImageSlice> for BlobDetector {
    fn detect(&self, slice: &ImageSlice) -> Vec<Point2<f64>> {
        Self::detect(self, slice)
    }
}

/// Flood-fills every foreground component in raster order.
fn label_components(slice: &ImageSlice) -> Vec<Blob> {
    let (width, height) = (slice.width(), slice.height());
    let pixels = slice.pixels();
    let mut visited = vec![false; pixels.len()];
    let mut blobs = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..pixels.len() {
        if visited[start] || pixels[start] <= 0.0 {
            continue;
        }

        let mut blob = Blob::default();
        visited[start] = true;
        queue.push_back((start % width, start / width));

        while let Some((x, y)) = queue.pop_front() {
            let value = f64::from(pixels[y * width + x]);
            blob.pixels += 1;
            blob.weight += value;
            #[allow(clippy::cast_precision_loss)]
            let (fx, fy) = (x as f64, y as f64);
            blob.weighted_x += value * fx;
            blob.weighted_y += value * fy;

            for &(dx, dy) in &NEIGHBOURS {
                let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy))
                else {
                    continue;
                };
                if nx >= width || ny >= height {
                    continue;
                }
                let idx = ny * width + nx;
                if !visited[idx] && pixels[idx] > 0.0 {
                    visited[idx] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
        blobs.push(blob);
    }

    blobs
}
