//! Pipeline tests for the frame crate ecosystem.
//!
//! Organized in tiers of increasing scope:
//!
//! - Tier 1: Foundation (transforms, frame geometry)
//! - Tier 2: Markers (volumes, preprocessing, accumulation)
//! - Tier 3: Registration (synthetic marker clouds)
//! - Tier 4: Full pipeline (rendered volumes through `FrameDetector`)

// Allow test-specific patterns
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_truncation)]

use frame::markers::Volume;
use frame::prelude::*;
use frame::registration::{register_detailed, Stage};
use frame::types::{frame_extent, Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Frame-to-scan placement used throughout: 2° about z, shifted in-plane.
fn placement() -> RigidTransform {
    RigidTransform::new(
        Rotation3::from_axis_angle(&Vector3::z_axis(), 2.0_f64.to_radians()),
        Vector3::new(10.0, -5.0, 0.0),
    )
}

/// Ideal Leksell marker positions (frame space) on slices every 3 mm.
fn leksell_slices(noise_sd: f64, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, noise_sd).unwrap();
    let mut cloud = PointCloud::new();

    for k in 1..40 {
        let z = -3.0 * f64::from(k);
        for x in [0.0, 190.0] {
            for y in [0.0, z + 120.0, 120.0] {
                cloud.push(Point3::new(
                    x + noise.sample(&mut rng),
                    y + noise.sample(&mut rng),
                    z,
                ));
            }
        }
    }
    cloud
}

// =============================================================================
// TIER 1: Foundation
// =============================================================================

mod tier1_foundation {
    use super::*;

    #[test]
    fn transform_parameters_round_trip() {
        let t = placement();
        let params = t.to_parameters();
        let back = RigidTransform::from_parameters(&params).unwrap();
        assert_eq!(back.to_parameters(), params);
        assert!(t.compose(&t.inverse()).is_identity(1e-12));
    }

    #[test]
    fn leksell_output_grid() {
        let frame = StaticFrame::leksell();
        assert_eq!(frame.extent([1.0, 1.0, 1.0]).unwrap(), [200, 130, 130]);
        assert_eq!(
            frame_extent(frame.dimensions, [0.5, 0.5, 2.0], frame.offset).unwrap(),
            [400, 260, 65]
        );
    }

    #[test]
    fn reference_mesh_per_modality() {
        let frame = StaticFrame::leksell();
        for modality in [Modality::Ct, Modality::Mr] {
            let mesh = frame.reference_mesh(modality).unwrap();
            assert_eq!(mesh.segment_count(), 6);
            assert_eq!(mesh.vertices().len(), 8);
        }
    }
}

// =============================================================================
// TIER 2: Markers
// =============================================================================

mod tier2_markers {
    use super::*;

    /// A single 3 mm rod along z at (8, 5), sampled on 1 mm pixels.
    fn rod_volume(slices: usize) -> Volume {
        Volume::from_fn(
            [16, 16, slices],
            [1.0, 1.0, 2.0],
            [0.0, 0.0, -2.0],
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)),
            |p| {
                if (p.x - 8.0).hypot(p.y - 5.0) <= 1.5 {
                    1200.0
                } else {
                    0.0
                }
            },
        )
        .unwrap()
    }

    #[test]
    fn ct_rod_accumulates_one_marker_per_slice() {
        let mut provider =
            AxialSliceProvider::new(rod_volume(5)).with_preprocessor(Preprocessor::Ct);
        let cloud = accumulate(&mut provider, &BlobDetector::new());

        assert_eq!(cloud.len(), 5);
        let depths: Vec<f64> = cloud.iter().map(|p| p.z).collect();
        assert_eq!(depths, vec![-2.0, -4.0, -6.0, -8.0, -10.0]);
        for p in &cloud {
            assert!((p.x - 8.0).abs() < 1e-9);
            assert!((p.y - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mr_rod_accumulates_one_marker_per_slice() {
        let mut provider =
            AxialSliceProvider::new(rod_volume(3)).with_preprocessor(Preprocessor::Mr);
        let cloud = accumulate(&mut provider, &BlobDetector::new());
        assert_eq!(cloud.len(), 3);
        assert!(cloud.iter().all(|p| (p.x - 8.0).abs() < 1e-9));
    }

    #[test]
    fn closure_detector() {
        let mut provider = AxialSliceProvider::new(rod_volume(4));
        let corners = |slice: &frame::markers::ImageSlice| {
            vec![
                slice.index_to_physical(0.0, 0.0),
                slice.index_to_physical(15.0, 15.0),
            ]
        };
        let cloud = accumulate(&mut provider, &corners);
        assert_eq!(cloud.len(), 8);
        assert_eq!(cloud.points[7], Point3::new(15.0, 15.0, -8.0));
    }
}

// =============================================================================
// TIER 3: Registration
// =============================================================================

mod tier3_registration {
    use super::*;

    #[test]
    fn recovers_placement_from_noisy_markers() {
        let mesh = StaticFrame::leksell().reference_mesh(Modality::Mr).unwrap();
        let scan = leksell_slices(0.1, 7).transformed(&placement());

        let found = register(&scan, &mesh, Modality::Mr, &RegistrationParams::default()).unwrap();

        assert!(found.angle_to(&placement()).to_degrees() < 0.5);
        assert!((found.translation - placement().translation).norm() < 0.5);
    }

    #[test]
    fn recovers_placement_with_ct_profile() {
        let mesh = StaticFrame::leksell().reference_mesh(Modality::Ct).unwrap();
        let scan = leksell_slices(0.1, 7).transformed(&placement());

        let report =
            register_detailed(&scan, &mesh, Modality::Ct, &RegistrationParams::default()).unwrap();

        // Only the top tenth of the slices seeds the coarse stage
        assert!(report.prefiltered_points < scan.len() / 5);
        assert_eq!(report.coarse.input_points, report.prefiltered_points);
        assert!(report.transform.angle_to(&placement()).to_degrees() < 0.5);
        assert!((report.transform.translation - placement().translation).norm() < 0.5);
    }

    #[test]
    fn stages_shrink_the_cloud() {
        let mesh = StaticFrame::leksell().reference_mesh(Modality::Mr).unwrap();
        let scan = leksell_slices(0.1, 8).transformed(&placement());

        let report =
            register_detailed(&scan, &mesh, Modality::Mr, &RegistrationParams::default()).unwrap();

        assert_eq!(report.input_points, scan.len());
        assert!(report.refine.input_points < report.coarse.input_points);
        assert!(report.final_stage.input_points <= report.coarse.input_points);
        assert!(report.final_stage.rms_error < 0.5);
        assert_eq!(report.transform, report.final_stage.transform.inverse());
    }

    #[test]
    fn markers_above_the_band_fail_in_lateral_filter() {
        let mesh = StaticFrame::leksell().reference_mesh(Modality::Mr).unwrap();
        // Already aligned on both posterior posts, but only in the top 10 mm
        let cloud: PointCloud = [0.0, 190.0]
            .iter()
            .flat_map(|&x| (0..5).map(move |k| Point3::new(x, 0.0, -2.0 - 2.0 * f64::from(k))))
            .collect();
        let params = RegistrationParams::default().with_match_centroids(false);

        let err = register(&cloud, &mesh, Modality::Mr, &params).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::LateralFilter));
    }
}

// =============================================================================
// TIER 4: Full pipeline
// =============================================================================

mod tier4_pipeline {
    use super::*;

    /// Renders the Leksell rods (2.5 mm radius) placed by `placement()` into
    /// a 1 mm × 1 mm × 3 mm volume stored superior slice first.
    fn rendered_scan() -> Volume {
        let mesh = StaticFrame::leksell().reference_mesh(Modality::Mr).unwrap();
        let to_frame = placement().inverse();

        Volume::from_fn(
            [240, 160, 39],
            [1.0, 1.0, 3.0],
            [-20.0, -20.0, -3.0],
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)),
            |p| {
                let q = to_frame.transform_point(&p);
                // Only the two plates carry rods
                if q.x.abs() > 5.0 && (q.x - 190.0).abs() > 5.0 {
                    return 0.0;
                }
                if mesh.distance(&q) <= 2.5 {
                    1000.0
                } else {
                    0.0
                }
            },
        )
        .unwrap()
    }

    #[test]
    fn mr_volume_to_frame_transform() {
        let mut detector = FrameDetector::new(&StaticFrame::leksell(), Modality::Mr).unwrap();
        let mut slices =
            AxialSliceProvider::new(rendered_scan()).with_preprocessor(Preprocessor::Mr);

        let cloud = detector.detect(&mut slices, &BlobDetector::new());
        // Six rods cross most slices; near the ends a post and a diagonal merge
        assert!(cloud.len() >= 39 * 4 && cloud.len() <= 39 * 6, "{}", cloud.len());

        let frame_to_scan = detector.transform_to_frame_space().unwrap();
        assert!(frame_to_scan.angle_to(&placement()).to_degrees() < 0.5);
        assert!((frame_to_scan.translation - placement().translation).norm() < 0.5);

        // Frame-space nodes land on the rendered rods
        let corner = frame_to_scan.transform_point(&Point3::new(190.0, 120.0, -60.0));
        let expected = placement().transform_point(&Point3::new(190.0, 120.0, -60.0));
        assert!((corner - expected).norm() < 1.0);
    }

    #[test]
    fn ct_volume_markers() {
        let mut detector = FrameDetector::new(&StaticFrame::leksell(), Modality::Ct).unwrap();
        let mut slices =
            AxialSliceProvider::new(rendered_scan()).with_preprocessor(Preprocessor::Ct);

        let detected = detector.detect(&mut slices, &BlobDetector::new()).len();
        let cloud = detector.point_cloud();
        let mid_slice = cloud.iter().filter(|p| (p.z + 60.0).abs() < 1e-9).count();
        assert_eq!(mid_slice, 6);
        assert_eq!(cloud.len(), detected);
    }
}
