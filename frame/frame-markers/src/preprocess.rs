//! Modality-specific slice preprocessing.
//!
//! Every preprocessor produces a binary slice (0 background, 1 foreground)
//! that the blob detector labels directly.

use frame_types::Modality;
use tracing::debug;

use crate::ImageSlice;

/// Lower bound of the CT window that captures the fiducial rods.
pub const CT_WINDOW_LOWER: f32 = 900.0;

/// Upper bound of the CT window that captures the fiducial rods.
pub const CT_WINDOW_UPPER: f32 = 30000.0;

/// Iteration cap for the Li threshold search.
const LI_MAX_ITERATIONS: usize = 1000;

/// Turns a raw slice into a binary foreground mask.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Preprocessor {
    /// Binary window `[900, 30000]`.
    Ct,
    /// Li minimum cross-entropy threshold followed by a binary closing.
    Mr,
    /// Custom inclusive window.
    BinaryThreshold {
        /// Lowest intensity mapped to foreground.
        lower: f32,
        /// Highest intensity mapped to foreground.
        upper: f32,
    },
}

impl Preprocessor {
    /// The default preprocessor for a modality.
    #[must_use]
    pub const fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Ct => Self::Ct,
            Modality::Mr => Self::Mr,
        }
    }

    /// Applies the preprocessor, returning a new binary slice.
    ///
    /// # Example
    ///
    /// ```
    /// use frame_markers::{ImageSlice, Preprocessor};
    ///
    /// let slice = ImageSlice::new(3, 1, vec![100.0, 1200.0, 40000.0]).unwrap();
    /// let mask = Preprocessor::Ct.apply(&slice);
    /// assert_eq!(mask.pixels(), &[0.0, 1.0, 0.0]);
    /// ```
    #[must_use]
    pub fn apply(&self, slice: &ImageSlice) -> ImageSlice {
        match *self {
            Self::Ct => binary_threshold(slice, CT_WINDOW_LOWER, CT_WINDOW_UPPER),
            Self::BinaryThreshold { lower, upper } => binary_threshold(slice, lower, upper),
            Self::Mr => {
                let Some(threshold) = li_threshold(slice.pixels()) else {
                    return slice.map(|_| 0.0);
                };
                debug!(threshold, "li threshold");
                let mask = slice.map(|v| if v > threshold { 1.0 } else { 0.0 });
                binary_closing(&mask)
            }
        }
    }
}

fn binary_threshold(slice: &ImageSlice, lower: f32, upper: f32) -> ImageSlice {
    slice.map(|v| if (lower..=upper).contains(&v) { 1.0 } else { 0.0 })
}

/// Li's iterative minimum cross-entropy threshold.
///
/// Pixels strictly above the returned value are foreground. A constant
/// image returns its single value. Returns `None` when no finite value is
/// present.
///
/// # Example
///
/// ```
/// use frame_markers::li_threshold;
///
/// let values = [10.0, 10.0, 10.0, 110.0, 110.0, 110.0];
/// let t = li_threshold(&values).unwrap();
/// assert!(t > 10.0 && t < 110.0);
/// ```
#[must_use]
pub fn li_threshold(values: &[f32]) -> Option<f32> {
    let mut sorted: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| f64::from(v))
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();

    let min = sorted[0];
    if sorted.len() == 1 {
        return Some(to_f32(min));
    }
    let tolerance = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min)
        / 2.0;

    // Work on intensities shifted to start at zero so the logarithms stay defined
    let shifted: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| f64::from(v) - min)
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let mut t_next = shifted.iter().sum::<f64>() / shifted.len() as f64;
    let mut t_curr = -2.0 * tolerance;

    for _ in 0..LI_MAX_ITERATIONS {
        if (t_next - t_curr).abs() <= tolerance {
            break;
        }
        t_curr = t_next;

        let (mut fore_sum, mut fore_n, mut back_sum, mut back_n) = (0.0, 0_usize, 0.0, 0_usize);
        for &v in &shifted {
            if v > t_curr {
                fore_sum += v;
                fore_n += 1;
            } else {
                back_sum += v;
                back_n += 1;
            }
        }
        if fore_n == 0 || back_n == 0 {
            break;
        }
        #[allow(clippy::cast_precision_loss)]
        let (mean_fore, mean_back) = (fore_sum / fore_n as f64, back_sum / back_n as f64);
        if mean_back == 0.0 {
            break;
        }
        t_next = (mean_back - mean_fore) / (mean_back.ln() - mean_fore.ln());
    }

    Some(to_f32(t_next + min))
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(value: f64) -> f32 {
    value as f32
}

/// Offsets of the 3×3 cross structuring element.
const CROSS: [(isize, isize); 5] = [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)];

/// Binary closing (dilation then erosion) with a 3×3 cross.
///
/// The mask is padded with one pixel of background first, so foreground
/// never grows out to the image border.
#[must_use]
pub fn binary_closing(mask: &ImageSlice) -> ImageSlice {
    let (width, height) = (mask.width(), mask.height());
    let (padded_width, padded_height) = (width + 2, height + 2);

    let mut padded = vec![0.0; padded_width * padded_height];
    for y in 0..height {
        let row = &mask.pixels()[y * width..(y + 1) * width];
        let start = (y + 1) * padded_width + 1;
        padded[start..start + width].copy_from_slice(row);
    }

    let dilated = morph_pass(&padded, padded_width, padded_height, f32::max, 0.0);
    let closed = morph_pass(&dilated, padded_width, padded_height, f32::min, 1.0);

    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let start = (y + 1) * padded_width + 1;
        out.extend_from_slice(&closed[start..start + width]);
    }
    mask.with_pixels(out)
}

/// One pass of a cross-shaped filter; out-of-bounds neighbours are skipped.
fn morph_pass(
    pixels: &[f32],
    width: usize,
    height: usize,
    combine: fn(f32, f32) -> f32,
    init: f32,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(pixels.len());

    for y in 0..height {
        for x in 0..width {
            let value = CROSS
                .iter()
                .filter_map(|&(dx, dy)| {
                    let px = x.checked_add_signed(dx)?;
                    let py = y.checked_add_signed(dy)?;
                    (px < width && py < height).then(|| pixels[py * width + px])
                })
                .fold(init, combine);
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn slice(width: usize, height: usize, pixels: &[f32]) -> ImageSlice {
        ImageSlice::new(width, height, pixels.to_vec()).unwrap()
    }

    #[test]
    fn test_for_modality() {
        assert_eq!(Preprocessor::for_modality(Modality::Ct), Preprocessor::Ct);
        assert_eq!(Preprocessor::for_modality(Modality::Mr), Preprocessor::Mr);
    }

    #[test]
    fn test_ct_window_is_inclusive() {
        let mask = Preprocessor::Ct.apply(&slice(4, 1, &[899.0, 900.0, 30000.0, 30001.0]));
        assert_eq!(mask.pixels(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_custom_window() {
        let pre = Preprocessor::BinaryThreshold {
            lower: 5.0,
            upper: 10.0,
        };
        let mask = pre.apply(&slice(3, 1, &[4.0, 7.0, 11.0]));
        assert_eq!(mask.pixels(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_li_two_levels() {
        // Shifted background is zero, so the search stops at the mean
        let mut values = vec![10.0; 50];
        values.extend(vec![110.0; 50]);
        assert_relative_eq!(li_threshold(&values).unwrap(), 60.0, epsilon = 1e-4);
    }

    #[test]
    fn test_li_noisy_bimodal() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(11);
        let mut values: Vec<f32> = (0..900).map(|_| rng.gen_range(15.0..25.0)).collect();
        values.extend((0..100).map(|_| rng.gen_range(190.0..210.0)));

        let t = li_threshold(&values).unwrap();
        assert!(t > 25.0 && t < 190.0, "threshold {t}");
    }

    #[test]
    fn test_li_degenerate_inputs() {
        assert_eq!(li_threshold(&[]), None);
        assert_eq!(li_threshold(&[f32::NAN]), None);
        assert_eq!(li_threshold(&[7.0, 7.0, 7.0]), Some(7.0));
    }

    #[test]
    fn test_mr_constant_slice_is_empty() {
        let mask = Preprocessor::Mr.apply(&slice(3, 3, &[5.0; 9]));
        assert!(mask.pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_closing_fills_hole() {
        #[rustfmt::skip]
        let mask = slice(5, 5, &[
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ]);
        let closed = binary_closing(&mask);
        assert_eq!(closed.get(2, 2), Some(1.0));
        assert_eq!(closed.get(1, 1), Some(1.0));
        assert_eq!(closed.get(0, 1), Some(0.0));
        assert_eq!(closed.get(0, 0), Some(0.0));
        assert_eq!(closed.pixels().iter().filter(|&&v| v > 0.0).count(), 9);
    }

    #[test]
    fn test_closing_does_not_grow_at_border() {
        // Two columns touching the left edge; the right column stays empty
        #[rustfmt::skip]
        let mask = slice(3, 3, &[
            1.0, 1.0, 0.0,
            1.0, 1.0, 0.0,
            1.0, 1.0, 0.0,
        ]);
        assert_eq!(binary_closing(&mask).pixels(), mask.pixels());

        // A gap on the border between two set pixels is not bridged
        #[rustfmt::skip]
        let mask = slice(3, 3, &[
            1.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
        ]);
        assert_eq!(binary_closing(&mask).pixels(), mask.pixels());
    }

    #[test]
    fn test_closing_empty_slice() {
        let mask = slice(0, 0, &[]);
        assert!(binary_closing(&mask).pixels().is_empty());
    }

    #[test]
    fn test_mr_keeps_bright_disc() {
        let mut pixels = vec![0.0; 81];
        for y in 3..6 {
            for x in 3..6 {
                pixels[y * 9 + x] = 1000.0;
            }
        }
        let mask = Preprocessor::Mr.apply(&slice(9, 9, &pixels));
        let on: usize = mask.pixels().iter().filter(|&&v| v > 0.0).count();
        assert_eq!(on, 9);
        assert_eq!(mask.get(4, 4), Some(1.0));
    }

    proptest! {
        #[test]
        fn prop_li_stays_within_intensity_range(
            values in prop::collection::vec(0.0f32..4000.0, 1..200),
        ) {
            let t = li_threshold(&values).unwrap();
            let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            prop_assert!(t >= lo - 1e-3 && t <= hi + 1e-3, "{t} outside [{lo}, {hi}]");
        }
    }
}
