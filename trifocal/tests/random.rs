use cv_core::nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use cv_core::{CameraMatrix, FeatureTriple, KeyPoint, Pose, Projective, WorldPoint, WorldToCamera};
use cv_geom::trifocal::TrifocalTensor;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use trifocal::{algebraic_error, TrifocalAlgebraicPoint7, TrifocalLinearPoint7};

const POINTS: usize = 30;
const ROUNDS: usize = 20;

fn intrinsics() -> Matrix3<f64> {
    Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0)
}

fn random_pose(rng: &mut Pcg64, translation: Vector3<f64>) -> WorldToCamera {
    let mut jitter = || rng.gen_range(-0.1..0.1);
    WorldToCamera::from_parts(
        translation + Vector3::new(jitter(), jitter(), jitter()),
        Rotation3::from_euler_angles(jitter(), jitter(), jitter()),
    )
}

/// Pixel triples of random points, the first camera at the origin, with uniform noise of
/// `noise` pixels, and the tensor of the noise free pixels.
fn some_test_data(rng: &mut Pcg64, noise: f64) -> (Vec<FeatureTriple<KeyPoint>>, TrifocalTensor) {
    let k = intrinsics();
    let second = random_pose(rng, Vector3::new(-0.5, 0.1, 0.05));
    let third = random_pose(rng, Vector3::new(0.3, -0.4, 0.1));
    let cameras = [
        CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity()),
        CameraMatrix::from_intrinsics_pose(&k, second),
        CameraMatrix::from_intrinsics_pose(&k, third),
    ];
    let triples = (0..POINTS)
        .map(|_| {
            let point = WorldPoint::from_point(Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(4.0..6.0),
            ));
            let mut observe = |camera: &CameraMatrix| {
                let KeyPoint(p) = camera.project(point).unwrap();
                KeyPoint(p + Vector2::new(rng.gen_range(-noise..=noise), rng.gen_range(-noise..=noise)))
            };
            FeatureTriple(observe(&cameras[0]), observe(&cameras[1]), observe(&cameras[2]))
        })
        .collect();
    // With the first camera at [I | 0] the tensor relates normalized first view points, so the
    // first view is moved into pixels by the intrinsics.
    let normalized = TrifocalTensor::from_cameras(&cameras[1], &cameras[2]);
    let truth = normalized.transform(&k.try_inverse().unwrap(), &Matrix3::identity(), &Matrix3::identity());
    (triples, truth)
}

#[test]
fn linear_recovers_exact_tensor() {
    let mut rng = Pcg64::from_seed([5; 32]);
    for _ in 0..ROUNDS {
        let (triples, truth) = some_test_data(&mut rng, 0.0);
        for estimator in [TrifocalLinearPoint7::new(), TrifocalLinearPoint7::new().enforce(false)] {
            let tensor = estimator.from_triples(&triples).unwrap();
            assert!(tensor.distance(&truth).unwrap() < 1e-6);
        }
    }
}

#[test]
fn algebraic_recovers_exact_tensor() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = Pcg64::from_seed([6; 32]);
    for _ in 0..ROUNDS {
        let (triples, truth) = some_test_data(&mut rng, 0.0);
        let tensor = TrifocalAlgebraicPoint7::new().from_triples(&triples).unwrap();
        assert!(tensor.distance(&truth).unwrap() < 1e-6);
    }
}

#[test]
fn algebraic_error_is_not_worse_than_linear() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = Pcg64::from_seed([7; 32]);
    for _ in 0..ROUNDS {
        let (triples, _) = some_test_data(&mut rng, 0.5);
        let unconstrained = TrifocalLinearPoint7::new().enforce(false).from_triples(&triples).unwrap();
        let linear = TrifocalLinearPoint7::new().from_triples(&triples).unwrap();
        let algebraic = TrifocalAlgebraicPoint7::new().from_triples(&triples).unwrap();
        let error_unconstrained = algebraic_error(&unconstrained, &triples).unwrap();
        let error_linear = algebraic_error(&linear, &triples).unwrap();
        let error_algebraic = algebraic_error(&algebraic, &triples).unwrap();
        // The unconstrained solution is the minimum over all tensors.
        assert!(error_unconstrained <= error_algebraic * (1.0 + 1e-6));
        assert!(error_algebraic <= 1.2 * error_linear);
    }
}

#[test]
fn search_reports_termination() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = Pcg64::from_seed([10; 32]);
    let (triples, _) = some_test_data(&mut rng, 0.5);
    let estimator = TrifocalAlgebraicPoint7::new();
    let estimate = estimator.search(&triples).unwrap();
    assert_eq!(estimate.converged, estimate.termination.was_successful());
    assert!(estimate.evaluations > 0);
    let tensor = estimator.from_triples(&triples).unwrap();
    assert!(tensor.distance(&estimate.tensor).unwrap() < 1e-12);
}

#[test]
fn algebraic_estimate_is_consistent() {
    let mut rng = Pcg64::from_seed([8; 32]);
    let (triples, _) = some_test_data(&mut rng, 0.5);
    let tensor = TrifocalAlgebraicPoint7::new().from_triples(&triples).unwrap();
    let (p2, p3) = tensor.cameras(1e-12, 1000).unwrap();
    let rebuilt = TrifocalTensor::from_cameras(&p2, &p3);
    assert!(tensor.distance(&rebuilt).unwrap() < 1e-7);
}

#[test]
fn extracted_fundamentals_hold_on_estimate() {
    let mut rng = Pcg64::from_seed([9; 32]);
    let (triples, _) = some_test_data(&mut rng, 0.0);
    let tensor = TrifocalLinearPoint7::new().from_triples(&triples).unwrap();
    let (f21, f31) = tensor.fundamentals(1e-12, 1000).unwrap();
    for FeatureTriple(a, b, c) in &triples {
        let (a, b, c) = (a.0.to_homogeneous(), b.0.to_homogeneous(), c.0.to_homogeneous());
        assert!(b.dot(&(f21.0 * a)).abs() / (f21.0.norm() * a.norm() * b.norm()) < 1e-9);
        assert!(c.dot(&(f31.0 * a)).abs() / (f31.0.norm() * a.norm() * c.norm()) < 1e-9);
    }
}

#[test]
fn collapsed_view_fails() {
    let point = KeyPoint(Point2::new(1.0, 2.0));
    let triples: Vec<_> = (0..8)
        .map(|i| {
            let i = i as f64;
            FeatureTriple(KeyPoint(Point2::new(i, 0.5 * i)), point, KeyPoint(Point2::new(0.0, i)))
        })
        .collect();
    assert!(TrifocalLinearPoint7::new().from_triples(&triples).is_none());
    assert!(TrifocalAlgebraicPoint7::new().from_triples(&triples).is_none());
}
