//! Point rejection between registration stages.
//!
//! Every filter returns a new cloud and never mutates its input. The two
//! post-alignment filters work in frame space: they move the cloud with
//! the stage's scan-to-frame transform, select points against frame
//! priors, and move the survivors back into scan space.

use frame_types::{Axis, PointCloud, ReferenceMesh, RigidTransform};
use rayon::prelude::*;

use crate::params::{Band, LateralSplit};
use crate::{RegistrationError, RegistrationResult, Stage};

/// Keeps points whose depth is strictly above the `percentile`-th
/// percentile of all depths.
///
/// # Errors
///
/// Returns [`RegistrationError::EmptyCloud`] for an empty input or when
/// no point lies above the percentile, and
/// [`RegistrationError::InvalidParams`] for a percentile outside [0, 100].
///
/// # Example
///
/// ```
/// use frame_registration::depth_prefilter;
/// use frame_types::{Axis, Point3, PointCloud};
///
/// let cloud: PointCloud = (0..10).map(|k| Point3::new(0.0, 0.0, -10.0 * f64::from(k))).collect();
/// let top = depth_prefilter(&cloud, Axis::Z, 80.0).unwrap();
/// assert_eq!(top.coordinates(Axis::Z), vec![0.0, -10.0]);
/// ```
pub fn depth_prefilter(
    cloud: &PointCloud,
    depth_axis: Axis,
    percentile: f64,
) -> RegistrationResult<PointCloud> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(RegistrationError::InvalidParams(format!(
            "depth percentile {percentile} is outside [0, 100]"
        )));
    }
    let threshold = cloud
        .percentile(depth_axis, percentile)
        .ok_or(RegistrationError::EmptyCloud {
            stage: Stage::Prefilter,
        })?;

    non_empty(
        cloud.filter(|p| depth_axis.of(p) > threshold),
        Stage::Prefilter,
    )
}

/// Keeps points strictly inside `band` along `axis`.
#[must_use]
pub fn band_filter(cloud: &PointCloud, axis: Axis, band: Band) -> PointCloud {
    cloud.filter(|p| band.contains(axis.of(p)))
}

/// Keeps the right cluster followed by the left cluster.
///
/// Points between the two thresholds are dropped.
#[must_use]
pub fn lateral_filter(cloud: &PointCloud, axis: Axis, split: LateralSplit) -> PointCloud {
    let right = cloud.filter(|p| axis.of(p) < split.right_below);
    let left = cloud.filter(|p| axis.of(p) > split.left_above);
    right.union(&left)
}

/// Keeps points closer than `max_distance` to the reference mesh.
#[must_use]
pub fn inlier_filter(cloud: &PointCloud, mesh: &ReferenceMesh, max_distance: f64) -> PointCloud {
    let keep: Vec<bool> = cloud
        .as_slice()
        .par_iter()
        .map(|p| mesh.distance(p) < max_distance)
        .collect();
    cloud
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Post-coarse filter: depth band then lateral clusters, in frame space.
///
/// # Errors
///
/// Returns [`RegistrationError::EmptyCloud`] if no point survives.
pub fn coarse_filter(
    cloud: &PointCloud,
    to_frame: &RigidTransform,
    depth_axis: Axis,
    band: Band,
    lateral_axis: Axis,
    split: LateralSplit,
) -> RegistrationResult<PointCloud> {
    let in_frame = cloud.transformed(to_frame);
    let banded = band_filter(&in_frame, depth_axis, band);
    let kept = lateral_filter(&banded, lateral_axis, split);
    non_empty(kept.transformed(&to_frame.inverse()), Stage::LateralFilter)
}

/// Post-refine filter: distance to the mesh then depth band, in frame space.
///
/// # Errors
///
/// Returns [`RegistrationError::EmptyCloud`] if no point survives.
pub fn refine_filter(
    cloud: &PointCloud,
    to_frame: &RigidTransform,
    mesh: &ReferenceMesh,
    max_distance: f64,
    depth_axis: Axis,
    band: Band,
) -> RegistrationResult<PointCloud> {
    let in_frame = cloud.transformed(to_frame);
    let inliers = inlier_filter(&in_frame, mesh, max_distance);
    let kept = band_filter(&inliers, depth_axis, band);
    non_empty(kept.transformed(&to_frame.inverse()), Stage::InlierFilter)
}

fn non_empty(cloud: PointCloud, stage: Stage) -> RegistrationResult<PointCloud> {
    if cloud.is_empty() {
        Err(RegistrationError::EmptyCloud { stage })
    } else {
        Ok(cloud)
    }
}
