//! The three-stage coarse-to-fine registration pipeline.

use std::fmt;

use frame_types::{Modality, PointCloud, ReferenceMesh, RigidTransform};
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::filter::{coarse_filter, depth_prefilter, refine_filter};
use crate::icp::{icp_align, IcpParams, IcpResult};
use crate::{IcpError, RegistrationError, RegistrationParams, RegistrationResult};

/// A step of the registration pipeline, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stage {
    /// Depth percentile pre-filter (CT only by default).
    Prefilter,
    /// First ICP run on the pre-filtered cloud.
    Coarse,
    /// Depth band and lateral cluster selection after the coarse run.
    LateralFilter,
    /// Second ICP run.
    Refine,
    /// Mesh distance and depth band selection after the refine run.
    InlierFilter,
    /// Third ICP run, producing the result.
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prefilter => "depth pre-filter",
            Self::Coarse => "coarse",
            Self::LateralFilter => "lateral filter",
            Self::Refine => "refine",
            Self::InlierFilter => "inlier filter",
            Self::Final => "final",
        })
    }
}

/// Rigid alignment of a cloud onto the reference mesh.
///
/// The pipeline only needs this narrow interface, so the ICP backend can
/// be swapped (or instrumented in tests) without touching the stages.
pub trait Aligner {
    /// Aligns `source` onto `target`, returning a source-to-target result.
    ///
    /// # Errors
    ///
    /// Returns an [`IcpError`] if alignment is impossible.
    fn align(
        &self,
        source: &PointCloud,
        target: &ReferenceMesh,
        params: &IcpParams,
    ) -> Result<IcpResult, IcpError>;
}

/// The default [`Aligner`]: point-to-segment ICP.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcpAligner;

impl Aligner for IcpAligner {
    fn align(
        &self,
        source: &PointCloud,
        target: &ReferenceMesh,
        params: &IcpParams,
    ) -> Result<IcpResult, IcpError> {
        icp_align(source.as_slice(), target, params)
    }
}

/// Outcome of one ICP stage.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StageReport {
    /// Which alignment stage this is.
    pub stage: Stage,
    /// Points fed into the stage.
    pub input_points: usize,
    /// Scan-to-frame transform found by the stage.
    pub transform: RigidTransform,
    /// ICP iterations performed.
    pub iterations: u32,
    /// Final RMS residual (mm).
    pub rms_error: f64,
    /// Whether ICP converged before its iteration cap.
    pub converged: bool,
}

/// Full record of a registration run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegistrationReport {
    /// Modality the cloud was registered as.
    pub modality: Modality,
    /// Points in the accumulated cloud.
    pub input_points: usize,
    /// Points left after the depth pre-filter.
    pub prefiltered_points: usize,
    /// Coarse stage.
    pub coarse: StageReport,
    /// Refine stage.
    pub refine: StageReport,
    /// Final stage.
    pub final_stage: StageReport,
    /// Frame-to-scan transform (the inverse of the final stage's transform).
    pub transform: RigidTransform,
}

/// Registers a marker cloud against the reference mesh.
///
/// Returns the transform mapping frame-space points into scan space. Its
/// inverse maps scan points into frame space.
///
/// # Errors
///
/// Returns a [`RegistrationError`] if the parameters are invalid, a
/// filter removes every point, or an ICP stage fails.
pub fn register(
    cloud: &PointCloud,
    mesh: &ReferenceMesh,
    modality: Modality,
    params: &RegistrationParams,
) -> RegistrationResult<RigidTransform> {
    register_with(cloud, mesh, modality, params, &IcpAligner)
}

/// [`register`] with a caller-supplied [`Aligner`].
///
/// # Errors
///
/// See [`register`].
pub fn register_with<A>(
    cloud: &PointCloud,
    mesh: &ReferenceMesh,
    modality: Modality,
    params: &RegistrationParams,
    aligner: &A,
) -> RegistrationResult<RigidTransform>
where
    A: Aligner + ?Sized,
{
    register_detailed_with(cloud, mesh, modality, params, aligner).map(|report| report.transform)
}

/// [`register`], returning every stage's outcome.
///
/// # Errors
///
/// See [`register`].
pub fn register_detailed(
    cloud: &PointCloud,
    mesh: &ReferenceMesh,
    modality: Modality,
    params: &RegistrationParams,
) -> RegistrationResult<RegistrationReport> {
    register_detailed_with(cloud, mesh, modality, params, &IcpAligner)
}

/// [`register_detailed`] with a caller-supplied [`Aligner`].
///
/// # Errors
///
/// See [`register`].
pub fn register_detailed_with<A>(
    cloud: &PointCloud,
    mesh: &ReferenceMesh,
    modality: Modality,
    params: &RegistrationParams,
    aligner: &A,
) -> RegistrationResult<RegistrationReport>
where
    A: Aligner + ?Sized,
{
    params.validate()?;
    info!(%modality, points = cloud.len(), "registering frame markers");

    let prefiltered = match params.depth_percentile(modality) {
        Some(q) => depth_prefilter(cloud, params.depth_axis, q)?,
        None => cloud.clone(),
    };
    debug!(kept = prefiltered.len(), "depth pre-filter done");

    let coarse = run_stage(
        aligner,
        Stage::Coarse,
        &prefiltered,
        mesh,
        params.coarse_iterations,
        params,
    )?;

    // Post-stage filters always start from the full accumulated cloud
    let lateral = coarse_filter(
        cloud,
        &coarse.transform,
        params.depth_axis,
        params.coarse_band,
        params.lateral_axis,
        params.lateral_split,
    )?;
    debug!(kept = lateral.len(), "lateral filter done");

    let refine = run_stage(
        aligner,
        Stage::Refine,
        &lateral,
        mesh,
        params.refine_iterations,
        params,
    )?;

    let inliers = refine_filter(
        cloud,
        &refine.transform,
        mesh,
        params.inlier_distance,
        params.depth_axis,
        params.refine_band,
    )?;
    debug!(kept = inliers.len(), "inlier filter done");

    let final_stage = run_stage(
        aligner,
        Stage::Final,
        &inliers,
        mesh,
        params.final_iterations,
        params,
    )?;

    let transform = final_stage.transform.inverse();
    info!(
        rms_error = final_stage.rms_error,
        points = inliers.len(),
        rotation_deg = transform.angle().to_degrees(),
        "frame registration finished"
    );

    Ok(RegistrationReport {
        modality,
        input_points: cloud.len(),
        prefiltered_points: prefiltered.len(),
        coarse,
        refine,
        final_stage,
        transform,
    })
}

fn run_stage<A>(
    aligner: &A,
    stage: Stage,
    source: &PointCloud,
    mesh: &ReferenceMesh,
    max_iterations: u32,
    params: &RegistrationParams,
) -> RegistrationResult<StageReport>
where
    A: Aligner + ?Sized,
{
    let icp_params = IcpParams::new()
        .with_max_iterations(max_iterations)
        .with_convergence_threshold(params.convergence_threshold)
        .with_match_centroids(params.match_centroids)
        .with_max_landmarks(params.max_landmarks);

    let result = aligner
        .align(source, mesh, &icp_params)
        .map_err(|source| RegistrationError::Icp { stage, source })?;

    info!(
        %stage,
        points = source.len(),
        iterations = result.iterations,
        rms_error = result.rms_error,
        converged = result.converged,
        "registration stage done"
    );

    Ok(StageReport {
        stage,
        input_points: source.len(),
        transform: result.transform,
        iterations: result.iterations,
        rms_error: result.rms_error,
        converged: result.converged,
    })
}
