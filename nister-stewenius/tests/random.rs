use cv_core::{
    nalgebra::{IsometryMatrix3, Point3, Rotation3, UnitVector3, Vector3},
    sample_consensus::{Estimator, Model},
    CameraPoint, CameraToCamera, FeatureMatch, Pose, Projective,
};
use cv_pinhole::{EssentialMatrix, NormalizedKeyPoint};
use itertools::Itertools;
use nister_stewenius::NisterStewenius;

const SAMPLE_POINTS: usize = 5;
const RESIDUAL_THRESHOLD: f64 = 1e-6;
const ESSENTIAL_THRESHOLD: f64 = 1e-5;

const ROT_MAGNITUDE: f64 = 0.2;
const POINT_BOX_SIZE: f64 = 2.0;
const POINT_DISTANCE: f64 = 3.0;

#[test]
fn randomized() {
    let successes = (0..1000).filter(|_| run_round()).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

#[test]
fn normalized_keypoints() {
    let pose = CameraToCamera::from_parts(
        Vector3::new(0.4, 0.1, -0.2),
        Rotation3::from_euler_angles(0.1, -0.05, 0.2),
    );
    let points = [
        Point3::new(0.1, 0.2, 3.0),
        Point3::new(-0.6, 0.4, 4.0),
        Point3::new(0.8, -0.3, 3.5),
        Point3::new(0.2, -0.7, 5.0),
        Point3::new(-0.4, -0.1, 4.5),
    ];
    let matches = points.iter().map(|&p| {
        let a = CameraPoint::from_point(p);
        FeatureMatch(
            NormalizedKeyPoint::from_camera_point(a).unwrap(),
            NormalizedKeyPoint::from_camera_point(pose.transform(a)).unwrap(),
        )
    });
    let hypotheses = NisterStewenius::new().estimate(matches.clone());
    assert!(!hypotheses.is_empty());
    assert!(hypotheses
        .iter()
        .any(|e| same_essential(e, &EssentialMatrix::from(pose))));
}

#[test]
fn repeated_correspondence_is_degenerate() {
    let (_, aps, bps) = some_test_data();
    let matches = [0, 1, 2, 3, 3].map(|i| FeatureMatch(aps[i], bps[i]));
    let hypotheses = NisterStewenius::new().estimate(matches.iter().copied());
    assert!(hypotheses.is_empty());
}

fn same_essential(a: &EssentialMatrix, b: &EssentialMatrix) -> bool {
    let a = a.0.normalize();
    let b = b.0.normalize();
    (a - b).norm() < ESSENTIAL_THRESHOLD || (a + b).norm() < ESSENTIAL_THRESHOLD
}

fn run_round() -> bool {
    let (pose, aps, bps) = some_test_data();
    let matches = aps.iter().zip(&bps).map(|(&a, &b)| FeatureMatch(a, b));
    let hypotheses = NisterStewenius::new().estimate(matches.clone());
    let residuals_ok = hypotheses
        .iter()
        .cartesian_product(matches.clone())
        .all(|(e, m)| e.residual(&m) < RESIDUAL_THRESHOLD);
    if !residuals_ok {
        eprintln!("failed residual check");
    }
    let found = hypotheses
        .iter()
        .any(|e| same_essential(e, &EssentialMatrix::from(pose)));
    if !found {
        eprintln!("true essential matrix not among {} hypotheses", hypotheses.len());
    }
    residuals_ok && found
}

/// Gets a random relative pose, input points A and input points B.
fn some_test_data() -> (
    CameraToCamera,
    [UnitVector3<f64>; SAMPLE_POINTS],
    [UnitVector3<f64>; SAMPLE_POINTS],
) {
    // The relative pose orientation is fixed and translation is random.
    let relative_pose = CameraToCamera(IsometryMatrix3::from_parts(
        Vector3::new_random().into(),
        Rotation3::new(Vector3::new_random() * std::f64::consts::PI * 2.0 * ROT_MAGNITUDE),
    ));

    // Generate A's camera points.
    let cams_a = (0..SAMPLE_POINTS).map(|_| {
        let mut a = Point3::from(Vector3::new_random() * POINT_BOX_SIZE);
        a.x -= 0.5 * POINT_BOX_SIZE;
        a.y -= 0.5 * POINT_BOX_SIZE;
        a.z += POINT_DISTANCE;
        CameraPoint::from_point(a)
    });

    let mut kps_a = [UnitVector3::new_normalize(Vector3::z()); SAMPLE_POINTS];
    let mut kps_b = [UnitVector3::new_normalize(Vector3::z()); SAMPLE_POINTS];
    for ((a, b), camera) in kps_a.iter_mut().zip(kps_b.iter_mut()).zip(cams_a) {
        *a = camera.bearing();
        *b = relative_pose.transform(camera).bearing();
    }

    (relative_pose, kps_a, kps_b)
}
