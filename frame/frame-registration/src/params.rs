//! Tunable thresholds for the three-stage registration.

use frame_types::{Axis, Modality};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{RegistrationError, RegistrationResult, DEFAULT_MAX_LANDMARKS};

/// An open interval `(lower, upper)` along one axis, in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Band {
    /// Exclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    pub upper: f64,
}

impl Band {
    /// Creates a band.
    #[must_use]
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Returns true if `lower < value < upper`.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value < self.upper
    }

    fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper
    }
}

/// Lateral thresholds separating the two side plates of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LateralSplit {
    /// Points strictly below this belong to the right cluster.
    pub right_below: f64,
    /// Points strictly above this belong to the left cluster.
    pub left_above: f64,
}

impl LateralSplit {
    /// Creates a split.
    #[must_use]
    pub const fn new(right_below: f64, left_above: f64) -> Self {
        Self {
            right_below,
            left_above,
        }
    }
}

/// Parameters for [`register`](crate::register).
///
/// The defaults are tuned for a Leksell-style frame, with depth running
/// from 0 at the top of the localizer to -120 mm at the bottom and the
/// side plates near x = 0 and x = 190 mm in frame space.
///
/// # Example
///
/// ```
/// use frame_registration::{Band, RegistrationParams};
/// use frame_types::Modality;
///
/// let params = RegistrationParams::default()
///     .with_inlier_distance(2.0)
///     .with_refine_band(Band::new(-115.0, -5.0));
///
/// assert!(params.validate().is_ok());
/// assert_eq!(params.depth_percentile(Modality::Ct), Some(90.0));
/// assert_eq!(params.depth_percentile(Modality::Mr), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegistrationParams {
    /// Iteration cap for the coarse stage (default: 1000).
    pub coarse_iterations: u32,
    /// Iteration cap for the refine stage (default: 300).
    pub refine_iterations: u32,
    /// Iteration cap for the final stage (default: 300).
    pub final_iterations: u32,
    /// Depth percentile for the CT pre-filter (default: 90).
    pub ct_depth_percentile: Option<f64>,
    /// Depth percentile for the MR pre-filter (default: none).
    pub mr_depth_percentile: Option<f64>,
    /// Axis along the slice stack (default: Z).
    pub depth_axis: Axis,
    /// Axis across the frame's side plates (default: X).
    pub lateral_axis: Axis,
    /// Depth band kept after the coarse stage (default: (-100, -20)).
    pub coarse_band: Band,
    /// Lateral clusters kept after the coarse stage (default: < 20, > 170).
    pub lateral_split: LateralSplit,
    /// Maximum marker-to-frame distance kept after the refine stage (default: 3 mm).
    pub inlier_distance: f64,
    /// Depth band kept after the refine stage (default: (-110, -10)).
    pub refine_band: Band,
    /// ICP residual-change threshold, in mm (default: 1e-9).
    pub convergence_threshold: f64,
    /// Seed every ICP run by matching centroids (default: true).
    pub match_centroids: bool,
    /// Landmark limit per ICP run (default: 200).
    pub max_landmarks: Option<usize>,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            coarse_iterations: 1000,
            refine_iterations: 300,
            final_iterations: 300,
            ct_depth_percentile: Some(90.0),
            mr_depth_percentile: None,
            depth_axis: Axis::Z,
            lateral_axis: Axis::X,
            coarse_band: Band::new(-100.0, -20.0),
            lateral_split: LateralSplit::new(20.0, 170.0),
            inlier_distance: 3.0,
            refine_band: Band::new(-110.0, -10.0),
            convergence_threshold: 1e-9,
            match_centroids: true,
            max_landmarks: Some(DEFAULT_MAX_LANDMARKS),
        }
    }
}

impl RegistrationParams {
    /// Creates parameters with the default profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration caps of the three ICP stages.
    #[must_use]
    pub const fn with_iterations(mut self, coarse: u32, refine: u32, fine: u32) -> Self {
        self.coarse_iterations = coarse;
        self.refine_iterations = refine;
        self.final_iterations = fine;
        self
    }

    /// Sets the pre-filter percentile for one modality (`None` disables it).
    #[must_use]
    pub const fn with_depth_percentile(mut self, modality: Modality, percentile: Option<f64>) -> Self {
        match modality {
            Modality::Ct => self.ct_depth_percentile = percentile,
            Modality::Mr => self.mr_depth_percentile = percentile,
        }
        self
    }

    /// Sets the depth and lateral axes.
    #[must_use]
    pub const fn with_axes(mut self, depth: Axis, lateral: Axis) -> Self {
        self.depth_axis = depth;
        self.lateral_axis = lateral;
        self
    }

    /// Sets the depth band applied after the coarse stage.
    #[must_use]
    pub const fn with_coarse_band(mut self, band: Band) -> Self {
        self.coarse_band = band;
        self
    }

    /// Sets the lateral split applied after the coarse stage.
    #[must_use]
    pub const fn with_lateral_split(mut self, split: LateralSplit) -> Self {
        self.lateral_split = split;
        self
    }

    /// Sets the inlier distance applied after the refine stage.
    #[must_use]
    pub const fn with_inlier_distance(mut self, distance: f64) -> Self {
        self.inlier_distance = distance;
        self
    }

    /// Sets the depth band applied after the refine stage.
    #[must_use]
    pub const fn with_refine_band(mut self, band: Band) -> Self {
        self.refine_band = band;
        self
    }

    /// Sets the ICP convergence threshold.
    #[must_use]
    pub const fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Enables or disables centroid seeding.
    #[must_use]
    pub const fn with_match_centroids(mut self, enabled: bool) -> Self {
        self.match_centroids = enabled;
        self
    }

    /// Limits the number of source points per ICP run.
    #[must_use]
    pub const fn with_max_landmarks(mut self, max_landmarks: Option<usize>) -> Self {
        self.max_landmarks = max_landmarks;
        self
    }

    /// Pre-filter percentile for `modality`, if that modality is pre-filtered.
    #[must_use]
    pub const fn depth_percentile(&self, modality: Modality) -> Option<f64> {
        match modality {
            Modality::Ct => self.ct_depth_percentile,
            Modality::Mr => self.mr_depth_percentile,
        }
    }

    /// Checks every threshold for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParams`] describing the first
    /// problem found.
    pub fn validate(&self) -> RegistrationResult<()> {
        let invalid = |msg: String| Err(RegistrationError::InvalidParams(msg));

        for (name, value) in [
            ("coarse_iterations", self.coarse_iterations),
            ("refine_iterations", self.refine_iterations),
            ("final_iterations", self.final_iterations),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }

        for (modality, percentile) in [
            (Modality::Ct, self.ct_depth_percentile),
            (Modality::Mr, self.mr_depth_percentile),
        ] {
            if let Some(q) = percentile {
                if !(0.0..=100.0).contains(&q) {
                    return invalid(format!(
                        "{modality} depth percentile {q} is outside [0, 100]"
                    ));
                }
            }
        }

        if self.depth_axis == self.lateral_axis {
            return invalid(format!(
                "depth and lateral axes must differ (both {:?})",
                self.depth_axis
            ));
        }

        for (name, band) in [("coarse_band", self.coarse_band), ("refine_band", self.refine_band)] {
            if !band.is_valid() {
                return invalid(format!(
                    "{name} ({}, {}) is empty or not finite",
                    band.lower, band.upper
                ));
            }
        }

        let split = self.lateral_split;
        if !split.right_below.is_finite() || !split.left_above.is_finite() {
            return invalid("lateral split must be finite".to_string());
        }
        if split.right_below > split.left_above {
            return invalid(format!(
                "lateral clusters overlap: right < {} and left > {}",
                split.right_below, split.left_above
            ));
        }

        if !self.inlier_distance.is_finite() || self.inlier_distance <= 0.0 {
            return invalid(format!(
                "inlier distance must be positive, got {}",
                self.inlier_distance
            ));
        }

        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return invalid(format!(
                "convergence threshold must be non-negative, got {}",
                self.convergence_threshold
            ));
        }

        if matches!(self.max_landmarks, Some(n) if n < 3) {
            return invalid("max_landmarks must be at least 3".to_string());
        }

        Ok(())
    }
}
