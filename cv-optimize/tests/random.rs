use approx::assert_relative_eq;
use cv_consensus::{Ransac, RefinedConsensus};
use cv_core::nalgebra::{Matrix3, Point2, Point3, Rotation3, UnitVector3, Vector2, Vector3};
use cv_core::sample_consensus::{Consensus, Model};
use cv_core::{
    CameraMatrix, CameraPoint, CameraToCamera, FeatureMatch, KeyPoint, Pose, Projective,
    TriangulatorObservations, WorldPoint, WorldToCamera,
};
use cv_geom::triangulation::{DltSettings, DltTriangulator};
use cv_optimize::{
    EpipolarResidual, RefineEpipolar, RefineFundamental, RefineMetric, RefineMetricHomogeneous,
    RefineProjective, TriangulationSettings,
};
use cv_pinhole::{EssentialMatrix, FundamentalMatrix};
use eight_point::EightPointFundamental;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const ROUNDS: usize = 32;

fn random_pose(rng: &mut Pcg64) -> WorldToCamera {
    WorldToCamera::from_parts(
        Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.3..0.3),
        ),
        Rotation3::from_euler_angles(
            rng.gen_range(-0.1..0.1),
            rng.gen_range(-0.1..0.1),
            rng.gen_range(-0.1..0.1),
        ),
    )
}

/// A point in front of the identity camera and three views of it, the first being the identity.
fn some_views(rng: &mut Pcg64) -> (WorldPoint, Vec<WorldToCamera>) {
    let point = WorldPoint::from_point(Point3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(4.0..8.0),
    ));
    let poses = vec![WorldToCamera::identity(), random_pose(rng), random_pose(rng)];
    (point, poses)
}

fn bearings(point: WorldPoint, poses: &[WorldToCamera]) -> Vec<(WorldToCamera, UnitVector3<f64>)> {
    poses
        .iter()
        .map(|&pose| (pose, pose.transform(point).bearing()))
        .collect()
}

fn offset(point: WorldPoint) -> WorldPoint {
    WorldPoint::from_point(point.point().unwrap() + Vector3::new(0.6, 0.0, 0.0))
}

fn error(a: WorldPoint, b: WorldPoint) -> f64 {
    (a.point().unwrap() - b.point().unwrap()).norm()
}

#[test]
fn metric_refines_perturbed_point() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = Pcg64::seed_from_u64(0);
    for _ in 0..ROUNDS {
        let (point, poses) = some_views(&mut rng);
        let refined = RefineMetric::new()
            .refine(offset(point), &bearings(point, &poses))
            .unwrap();
        assert!(refined.converged, "{:?}", refined.termination);
        assert!(error(refined.estimate, point) <= 1e-6);
        assert!(refined.objective < 1e-12);
    }
}

#[test]
fn homogeneous_refines_perturbed_point() {
    let mut rng = Pcg64::seed_from_u64(1);
    for _ in 0..ROUNDS {
        let (point, poses) = some_views(&mut rng);
        let refined = RefineMetricHomogeneous::new()
            .refine(offset(point), &bearings(point, &poses))
            .unwrap();
        let homogeneous = refined.estimate.homogeneous();
        assert_relative_eq!(homogeneous.norm(), 1.0, epsilon = 1e-12);
        assert!(homogeneous.w >= 0.0);
        assert!(error(refined.estimate, point) <= 1e-6);
    }
}

#[test]
fn projective_refines_perturbed_pixels() {
    let mut rng = Pcg64::seed_from_u64(2);
    let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
    for _ in 0..ROUNDS {
        let (point, poses) = some_views(&mut rng);
        let observations: Vec<(CameraMatrix, KeyPoint)> = poses
            .iter()
            .map(|&pose| {
                let camera = CameraMatrix::from_intrinsics_pose(&k, pose);
                (camera, camera.project(point).unwrap())
            })
            .collect();
        let refined = RefineProjective::new()
            .refine(offset(point), &observations)
            .unwrap();
        assert!(error(refined.estimate, point) <= 1e-6);
    }
}

#[test]
fn epipolar_refines_reference_ray() {
    let mut rng = Pcg64::seed_from_u64(3);
    for _ in 0..ROUNDS {
        let (point, poses) = some_views(&mut rng);
        let point = CameraPoint(point.0);
        let views: Vec<(EssentialMatrix, UnitVector3<f64>)> = poses[1..]
            .iter()
            .map(|&pose| {
                let relative = CameraToCamera(pose.0);
                (EssentialMatrix::from(relative), relative.transform(point).bearing())
            })
            .collect();
        let initial = CameraPoint::from_point(point.point().unwrap() + Vector3::new(0.6, 0.0, 0.0));
        let refined = RefineEpipolar::new()
            .refine(initial, point.bearing(), &views)
            .unwrap();
        let expected = Point2::from_homogeneous(point.bearing_unnormalized()).unwrap();
        let actual = Point2::from_homogeneous(refined.estimate.bearing_unnormalized()).unwrap();
        assert!((expected - actual).norm() <= 1e-6);
    }
}

#[test]
fn refinement_does_not_increase_reprojection_error() {
    let mut rng = Pcg64::seed_from_u64(4);
    let reprojection = |point: WorldPoint, observations: &[(WorldToCamera, UnitVector3<f64>)]| {
        observations
            .iter()
            .map(|&(pose, bearing)| {
                let projected = Point2::from_homogeneous(pose.transform(point).bearing_unnormalized()).unwrap();
                let observed = Point2::from_homogeneous(bearing.into_inner()).unwrap();
                (projected - observed).norm_squared()
            })
            .sum::<f64>()
    };
    for _ in 0..ROUNDS {
        let (point, poses) = some_views(&mut rng);
        let noisy: Vec<(WorldToCamera, UnitVector3<f64>)> = bearings(point, &poses)
            .into_iter()
            .map(|(pose, bearing)| {
                let noise = Vector3::new(rng.gen_range(-1e-3..1e-3), rng.gen_range(-1e-3..1e-3), 0.0);
                (pose, UnitVector3::new_normalize(bearing.into_inner() + noise))
            })
            .collect();
        let linear = DltTriangulator::new()
            .triangulate_observations(noisy.iter().copied())
            .unwrap();
        let refined = TriangulationSettings::default()
            .metric()
            .triangulate_refined(noisy.iter().copied())
            .unwrap();
        assert!(reprojection(refined.estimate, &noisy) <= reprojection(linear, &noisy) * (1.0 + 1e-9));
    }
}

#[test]
fn triangulate_then_refine_fails_without_baseline() {
    let point = WorldPoint::from_point(Point3::new(0.1, 0.2, 5.0));
    let pose = WorldToCamera::identity();
    let observations = [(pose, pose.transform(point).bearing()); 2];
    assert!(TriangulationSettings::default()
        .metric()
        .triangulate_observations(observations.iter().copied())
        .is_none());
}

#[test]
fn triangulation_settings_reach_linear_stage() {
    let mut rng = Pcg64::seed_from_u64(11);
    let (point, poses) = some_views(&mut rng);
    let observations = bearings(point, &poses);
    let settings = TriangulationSettings::default();
    assert!(settings
        .homogeneous()
        .triangulate_refined(observations.iter().copied())
        .is_some());
    let strict = TriangulationSettings {
        dlt: DltSettings::default().degeneracy(1.0),
        ..settings
    };
    assert!(strict
        .homogeneous()
        .triangulate_refined(observations.iter().copied())
        .is_none());
}

/// Pixel matches seen by two cameras with the same intrinsics, and the true fundamental matrix.
fn pixel_matches(rng: &mut Pcg64, noise: f64) -> (Vec<FeatureMatch<KeyPoint>>, FundamentalMatrix) {
    let k = Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
    let pose = WorldToCamera::from_parts(
        Vector3::new(-0.6, 0.05, 0.1),
        Rotation3::from_euler_angles(0.02, 0.1, -0.03),
    );
    let first = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
    let second = CameraMatrix::from_intrinsics_pose(&k, pose);
    let matches = (0..60)
        .map(|_| {
            let point = WorldPoint::from_point(Point3::new(
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(4.0..8.0),
            ));
            let mut jitter = |p: KeyPoint| {
                KeyPoint(p.0 + Vector2::new(rng.gen_range(-noise..=noise), rng.gen_range(-noise..=noise)))
            };
            FeatureMatch(
                jitter(first.project(point).unwrap()),
                jitter(second.project(point).unwrap()),
            )
        })
        .collect();
    let k_inv = k.try_inverse().unwrap();
    let essential = EssentialMatrix::from(CameraToCamera(pose.0));
    let truth = FundamentalMatrix(k_inv.transpose() * essential.0 * k_inv);
    (matches, truth)
}

fn sampson_sum(f: &FundamentalMatrix, matches: &[FeatureMatch<KeyPoint>]) -> f64 {
    matches.iter().map(|m| f.residual(m)).sum()
}

#[test]
fn fundamental_refines_perturbed_matrix() {
    let mut rng = Pcg64::seed_from_u64(5);
    let (matches, truth) = pixel_matches(&mut rng, 0.0);
    let truth = truth.normalized().unwrap();
    let mut perturbed = truth.0;
    for entry in perturbed.iter_mut() {
        *entry += rng.gen_range(-1e-4..1e-4) * entry.abs();
    }
    for residual in [EpipolarResidual::Sampson, EpipolarResidual::Algebraic] {
        let refined = RefineFundamental::new()
            .residual(residual)
            .refine_matches(FundamentalMatrix(perturbed), &matches)
            .unwrap();
        let estimate = refined.estimate;
        assert_relative_eq!(estimate.0.norm(), 1.0, epsilon = 1e-12);
        assert!(estimate.0.determinant().abs() < 1e-12);
        assert!(matches.iter().all(|m| estimate.residual(m) <= 1e-6));
    }
}

#[test]
fn fundamental_refinement_improves_linear_estimate() {
    let mut rng = Pcg64::seed_from_u64(6);
    let (matches, _) = pixel_matches(&mut rng, 0.5);
    let linear = EightPointFundamental::new()
        .from_matches(matches.iter().copied())
        .unwrap();
    let refined = RefineFundamental::new()
        .refine_matches(linear, &matches)
        .unwrap();
    assert!(sampson_sum(&refined.estimate, &matches) <= sampson_sum(&linear, &matches));
}

#[test]
fn fundamental_needs_eight_matches() {
    let mut rng = Pcg64::seed_from_u64(7);
    let (matches, truth) = pixel_matches(&mut rng, 0.0);
    assert!(RefineFundamental::new()
        .refine_matches(truth, &matches[..7])
        .is_err());
}

#[test]
fn consensus_then_fundamental_refinement() {
    let mut rng = Pcg64::seed_from_u64(8);
    let (mut matches, _) = pixel_matches(&mut rng, 0.3);
    for m in matches.iter_mut().step_by(4) {
        m.1 = KeyPoint(Point2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }
    let mut refined = RefinedConsensus::new(
        Ransac::new(4.0, Pcg64::seed_from_u64(9)),
        RefineFundamental::new(),
    );
    let (fundamental, inliers) = refined
        .model_inliers(&EightPointFundamental::new(), matches.iter().copied())
        .unwrap();
    assert!(inliers.iter().filter(|&&ix| ix % 4 == 0).count() <= 2);
    assert!(fundamental.0.determinant().abs() < 1e-12);
}
