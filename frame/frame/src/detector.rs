//! End-to-end frame detection: accumulate markers, then register them.

use frame_markers::{accumulate, MarkerDetector, SliceProvider};
use frame_registration::{
    register_detailed, RegistrationParams, RegistrationReport, RegistrationResult,
};
use frame_types::{FrameGeometry, Modality, PointCloud, ReferenceMesh, RigidTransform};
use tracing::info;

/// Detects a stereotactic frame in one scan.
///
/// The reference mesh is built once from the frame geometry and reused for
/// every registration. [`detect`](Self::detect) fills the marker cloud;
/// [`transform_to_frame_space`](Self::transform_to_frame_space) registers it.
///
/// # Example
///
/// ```
/// use frame::prelude::*;
///
/// let mut detector = FrameDetector::new(&StaticFrame::leksell(), Modality::Mr).unwrap();
///
/// let markers: PointCloud = [(0.0, 0.0), (0.0, 120.0), (190.0, 0.0), (190.0, 120.0)]
///     .iter()
///     .flat_map(|&(x, y)| (1..20).map(move |k| Point3::new(x, y, -6.0 * f64::from(k))))
///     .collect();
/// detector.set_point_cloud(markers);
///
/// let frame_to_scan = detector.transform_to_frame_space().unwrap();
/// assert!(frame_to_scan.is_identity(1e-6));
/// ```
#[derive(Debug, Clone)]
pub struct FrameDetector {
    mesh: ReferenceMesh,
    modality: Modality,
    params: RegistrationParams,
    cloud: PointCloud,
}

impl FrameDetector {
    /// Builds the reference mesh of `geometry` for `modality`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Geometry`](frame_registration::RegistrationError::Geometry)
    /// if the geometry has no usable edges.
    pub fn new<G>(geometry: &G, modality: Modality) -> RegistrationResult<Self>
    where
        G: FrameGeometry + ?Sized,
    {
        let mesh = geometry.reference_mesh(modality)?;
        Ok(Self {
            mesh,
            modality,
            params: RegistrationParams::default(),
            cloud: PointCloud::new(),
        })
    }

    /// Overrides the registration parameters.
    #[must_use]
    pub const fn with_params(mut self, params: RegistrationParams) -> Self {
        self.params = params;
        self
    }

    /// Drains `provider` through `detector` and keeps the resulting cloud.
    ///
    /// Any cloud from an earlier call is replaced.
    pub fn detect<P, D>(&mut self, provider: &mut P, detector: &D) -> &PointCloud
    where
        P: SliceProvider + ?Sized,
        D: MarkerDetector<P::Slice> + ?Sized,
    {
        self.cloud = accumulate(provider, detector);
        info!(
            modality = %self.modality,
            points = self.cloud.len(),
            "frame markers detected"
        );
        &self.cloud
    }

    /// Replaces the marker cloud with one accumulated elsewhere.
    pub fn set_point_cloud(&mut self, cloud: PointCloud) {
        self.cloud = cloud;
    }

    /// The current marker cloud (empty before detection).
    #[must_use]
    pub const fn point_cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// Registers the marker cloud and returns the frame-to-scan transform.
    ///
    /// # Errors
    ///
    /// Propagates every [`register`](frame_registration::register) error;
    /// an undetected (empty) cloud fails like any other empty input.
    pub fn transform_to_frame_space(&self) -> RegistrationResult<RigidTransform> {
        self.registration_report().map(|report| report.transform)
    }

    /// Registers the marker cloud, returning every stage's outcome.
    ///
    /// # Errors
    ///
    /// See [`transform_to_frame_space`](Self::transform_to_frame_space).
    pub fn registration_report(&self) -> RegistrationResult<RegistrationReport> {
        register_detailed(&self.cloud, &self.mesh, self.modality, &self.params)
    }

    /// The reference mesh registration aligns against.
    #[must_use]
    pub const fn mesh(&self) -> &ReferenceMesh {
        &self.mesh
    }

    /// The scan modality.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        self.modality
    }

    /// The registration parameters.
    #[must_use]
    pub const fn params(&self) -> &RegistrationParams {
        &self.params
    }
}
