//! In-memory slice images and voxel volumes with physical geometry.
//!
//! Both types store intensities in raster order (x fastest) and map voxel
//! indices to physical millimetres as `origin + direction · (index ⊙ spacing)`.

use nalgebra::{Matrix2, Matrix3, Point2, Point3, Vector2, Vector3};

use crate::{MarkerError, MarkerResult};

fn check_spacing(spacing: &[f64]) -> MarkerResult<()> {
    for (axis, &value) in spacing.iter().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(MarkerError::InvalidSpacing { axis, value });
        }
    }
    Ok(())
}

/// A single 2D slice with its physical placement.
///
/// # Example
///
/// ```
/// use frame_markers::ImageSlice;
///
/// let slice = ImageSlice::new(4, 3, vec![0.0; 12])
///     .unwrap()
///     .with_spacing([0.5, 0.5])
///     .unwrap()
///     .with_origin([-10.0, 20.0]);
///
/// let p = slice.index_to_physical(2.0, 1.0);
/// assert!((p.x + 9.0).abs() < 1e-12);
/// assert!((p.y - 20.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSlice {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
    spacing: [f64; 2],
    origin: [f64; 2],
    direction: Matrix2<f64>,
}

impl ImageSlice {
    /// Creates a slice with unit spacing, zero origin and identity direction.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::BufferSize`] if `pixels.len() != width * height`.
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> MarkerResult<Self> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(MarkerError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            spacing: [1.0, 1.0],
            origin: [0.0, 0.0],
            direction: Matrix2::identity(),
        })
    }

    /// Sets the pixel spacing (mm).
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::InvalidSpacing`] for a non-positive or
    /// non-finite component.
    pub fn with_spacing(mut self, spacing: [f64; 2]) -> MarkerResult<Self> {
        check_spacing(&spacing)?;
        self.spacing = spacing;
        Ok(self)
    }

    /// Sets the physical position of pixel (0, 0).
    #[must_use]
    pub const fn with_origin(mut self, origin: [f64; 2]) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the direction cosines (columns are the index axes).
    #[must_use]
    pub const fn with_direction(mut self, direction: Matrix2<f64>) -> Self {
        self.direction = direction;
        self
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Pixel spacing (mm).
    #[must_use]
    pub const fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    /// Physical position of pixel (0, 0).
    #[must_use]
    pub const fn origin(&self) -> [f64; 2] {
        self.origin
    }

    /// Raster-order pixel values.
    #[must_use]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Value at (x, y), or `None` outside the image.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    /// Physical area of one pixel (mm²).
    #[must_use]
    pub fn pixel_area(&self) -> f64 {
        self.spacing[0] * self.spacing[1]
    }

    /// Maps a (possibly fractional) pixel index to physical coordinates.
    #[must_use]
    pub fn index_to_physical(&self, x: f64, y: f64) -> Point2<f64> {
        let scaled = Vector2::new(x * self.spacing[0], y * self.spacing[1]);
        Point2::from(Vector2::from(self.origin) + self.direction * scaled)
    }

    /// Returns a slice with the same geometry and `f` applied to every pixel.
    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: FnMut(f32) -> f32,
    {
        self.with_pixels(self.pixels.iter().copied().map(f).collect())
    }

    /// Same geometry, new pixel values. The caller keeps the length equal.
    pub(crate) fn with_pixels(&self, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            width: self.width,
            height: self.height,
            pixels,
            spacing: self.spacing,
            origin: self.origin,
            direction: self.direction,
        }
    }
}

/// A 3D voxel volume, slices stacked along the third index axis.
///
/// Voxel (i, j, k) lives at `pixels[(k * ny + j) * nx + i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    size: [usize; 3],
    voxels: Vec<f32>,
    spacing: [f64; 3],
    origin: [f64; 3],
    direction: Matrix3<f64>,
}

impl Volume {
    /// Creates a volume with unit spacing, zero origin and identity direction.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::BufferSize`] if the voxel count does not
    /// match `size`.
    pub fn new(size: [usize; 3], voxels: Vec<f32>) -> MarkerResult<Self> {
        let expected = size[0] * size[1] * size[2];
        if voxels.len() != expected {
            return Err(MarkerError::BufferSize {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self {
            size,
            voxels,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: Matrix3::identity(),
        })
    }

    /// Creates a volume by evaluating `f` at every voxel's physical position.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::InvalidSpacing`] for a bad spacing.
    pub fn from_fn<F>(
        size: [usize; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: Matrix3<f64>,
        mut f: F,
    ) -> MarkerResult<Self>
    where
        F: FnMut(Point3<f64>) -> f32,
    {
        check_spacing(&spacing)?;
        let mut volume = Self {
            size,
            voxels: Vec::with_capacity(size[0] * size[1] * size[2]),
            spacing,
            origin,
            direction,
        };
        for k in 0..size[2] {
            for j in 0..size[1] {
                for i in 0..size[0] {
                    let p = volume.index_to_physical(i, j, k);
                    volume.voxels.push(f(p));
                }
            }
        }
        Ok(volume)
    }

    /// Sets the voxel spacing (mm).
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::InvalidSpacing`] for a non-positive or
    /// non-finite component.
    pub fn with_spacing(mut self, spacing: [f64; 3]) -> MarkerResult<Self> {
        check_spacing(&spacing)?;
        self.spacing = spacing;
        Ok(self)
    }

    /// Sets the physical position of voxel (0, 0, 0).
    #[must_use]
    pub const fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the direction cosines (columns are the index axes).
    #[must_use]
    pub const fn with_direction(mut self, direction: Matrix3<f64>) -> Self {
        self.direction = direction;
        self
    }

    /// Number of voxels along each index axis.
    #[must_use]
    pub const fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Voxel spacing (mm).
    #[must_use]
    pub const fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Number of slices along the third axis.
    #[must_use]
    pub const fn slice_count(&self) -> usize {
        self.size[2]
    }

    /// Value at (i, j, k), or `None` outside the volume.
    #[must_use]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f32> {
        let [nx, ny, nz] = self.size;
        (i < nx && j < ny && k < nz).then(|| self.voxels[(k * ny + j) * nx + i])
    }

    /// Physical position of voxel (i, j, k).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn index_to_physical(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        let scaled = Vector3::new(
            i as f64 * self.spacing[0],
            j as f64 * self.spacing[1],
            k as f64 * self.spacing[2],
        );
        Point3::from(Vector3::from(self.origin) + self.direction * scaled)
    }

    /// Depth coordinate of slice `k`.
    #[must_use]
    pub fn slice_depth(&self, k: usize) -> f64 {
        self.index_to_physical(0, 0, k).z
    }

    /// Extracts slice `k` as a 2D image.
    ///
    /// The slice keeps the in-plane spacing, its origin is the in-plane
    /// position of voxel (0, 0, k), and its direction is the upper-left
    /// 2×2 block of the volume direction.
    #[must_use]
    pub fn slice(&self, k: usize) -> Option<ImageSlice> {
        let [nx, ny, nz] = self.size;
        if k >= nz {
            return None;
        }
        let start = k * nx * ny;
        let corner = self.index_to_physical(0, 0, k);
        Some(ImageSlice {
            width: nx,
            height: ny,
            pixels: self.voxels[start..start + nx * ny].to_vec(),
            spacing: [self.spacing[0], self.spacing[1]],
            origin: [corner.x, corner.y],
            direction: self.direction.fixed_view::<2, 2>(0, 0).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_slice_buffer_size_checked() {
        assert_eq!(
            ImageSlice::new(3, 3, vec![0.0; 8]),
            Err(MarkerError::BufferSize {
                expected: 9,
                actual: 8
            })
        );
        assert_eq!(
            Volume::new([2, 2, 2], vec![0.0; 7]),
            Err(MarkerError::BufferSize {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn test_invalid_spacing() {
        let slice = ImageSlice::new(1, 1, vec![0.0]).unwrap();
        assert_eq!(
            slice.with_spacing([1.0, -0.5]),
            Err(MarkerError::InvalidSpacing {
                axis: 1,
                value: -0.5
            })
        );
        let volume = Volume::new([1, 1, 1], vec![0.0]).unwrap();
        assert!(volume.with_spacing([1.0, 1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_slice_get_and_area() {
        let slice = ImageSlice::new(2, 2, vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_spacing([0.5, 2.0])
            .unwrap();
        assert_eq!(slice.get(1, 0), Some(2.0));
        assert_eq!(slice.get(0, 1), Some(3.0));
        assert_eq!(slice.get(2, 0), None);
        assert_relative_eq!(slice.pixel_area(), 1.0);
    }

    #[test]
    fn test_flipped_direction() {
        let slice = ImageSlice::new(10, 10, vec![0.0; 100])
            .unwrap()
            .with_origin([5.0, 5.0])
            .with_direction(Matrix2::new(-1.0, 0.0, 0.0, -1.0));
        let p = slice.index_to_physical(2.0, 3.0);
        assert_relative_eq!(p, Point2::new(3.0, 2.0));
    }

    #[test]
    fn test_volume_slice_geometry() {
        let volume = Volume::from_fn(
            [3, 2, 4],
            [0.5, 0.5, 2.0],
            [-1.0, -2.0, -3.0],
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)),
            |p| p.z as f32,
        )
        .unwrap();

        assert_eq!(volume.slice_count(), 4);
        assert_relative_eq!(volume.slice_depth(0), -3.0);
        assert_relative_eq!(volume.slice_depth(2), -7.0);

        let slice = volume.slice(2).unwrap();
        assert_eq!((slice.width(), slice.height()), (3, 2));
        assert!(slice.pixels().iter().all(|&v| (v + 7.0).abs() < 1e-6));
        assert_eq!(slice.origin(), [-1.0, -2.0]);
        assert!(volume.slice(4).is_none());
    }

    #[test]
    fn test_volume_indexing() {
        let voxels: Vec<f32> = (0..24u8).map(f32::from).collect();
        let volume = Volume::new([4, 3, 2], voxels).unwrap();
        assert_eq!(volume.get(1, 2, 1), Some(21.0));
        assert_eq!(volume.get(4, 0, 0), None);
    }
}
