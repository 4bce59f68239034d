use approx::assert_relative_eq;
use cv_consensus::{LeastMedianSquares, Ransac, RefinedConsensus};
use cv_core::nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use cv_core::sample_consensus::{Consensus, Model};
use cv_core::{
    CameraMatrix, CameraPoint, CameraToCamera, FeatureMatch, KeyPoint, ModelRefiner, Pose,
    Projective, WorldPoint, WorldToCamera,
};
use cv_geom::residual::SampsonDistance;
use cv_geom::similarity::{ScaleTranslateRotate, ScaleTranslateRotateEstimator};
use cv_pinhole::{EssentialMatrix, FundamentalMatrix, NormalizedKeyPoint};
use eight_point::{EightPoint, EightPointFundamental};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const MATCHES: usize = 100;

/// Pixel matches of random points where every third match is replaced by random pixels. Returns
/// the matches and whether each one is an outlier.
fn pixel_matches(rng: &mut SmallRng) -> (Vec<FeatureMatch<KeyPoint>>, Vec<bool>) {
    let k = Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
    let first = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
    let second = CameraMatrix::from_intrinsics_pose(
        &k,
        WorldToCamera::from_parts(
            Vector3::new(-0.5, 0.05, 0.1),
            Rotation3::from_euler_angles(0.03, 0.1, -0.02),
        ),
    );
    (0..MATCHES)
        .map(|ix| {
            if ix % 3 == 0 {
                let mut pixel = || KeyPoint(Point2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
                (FeatureMatch(pixel(), pixel()), true)
            } else {
                let point = WorldPoint::from_point(Point3::new(
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(4.0..8.0),
                ));
                (
                    FeatureMatch(first.project(point).unwrap(), second.project(point).unwrap()),
                    false,
                )
            }
        })
        .unzip()
}

#[test]
fn ransac_rejects_outliers() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = SmallRng::seed_from_u64(10);
    let (matches, outliers) = pixel_matches(&mut rng);
    let mut ransac = Ransac::new(1e-4, SmallRng::seed_from_u64(11));
    let (fundamental, inliers) = ransac
        .model_inliers(&EightPointFundamental::new(), matches.iter().copied())
        .expect("no fundamental matrix found");
    let true_inliers = outliers.iter().filter(|&&o| !o).count();
    assert!(inliers.len() >= true_inliers);
    assert!(inliers.iter().filter(|&&ix| outliers[ix]).count() <= 2);
    for (m, &outlier) in matches.iter().zip(&outliers) {
        if !outlier {
            assert!(fundamental.residual(m) < 1e-6);
        }
    }
}

#[test]
fn ransac_with_plug_in_distance() {
    let mut rng = SmallRng::seed_from_u64(20);
    let pose = CameraToCamera::from_parts(
        Vector3::new(0.4, 0.1, -0.1),
        Rotation3::from_euler_angles(-0.05, 0.08, 0.02),
    );
    let mut matches: Vec<FeatureMatch<NormalizedKeyPoint>> = (0..60)
        .map(|_| {
            let a = CameraPoint::from_point(Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(3.0..6.0),
            ));
            FeatureMatch(
                NormalizedKeyPoint::from_camera_point(a).unwrap(),
                NormalizedKeyPoint::from_camera_point(pose.transform(a)).unwrap(),
            )
        })
        .collect();
    for m in matches.iter_mut().step_by(5) {
        m.1 = NormalizedKeyPoint(m.1 .0 + Vector2::new(0.05, -0.04));
    }

    let mut ransac = Ransac::new(1e-10, SmallRng::seed_from_u64(21));
    let mut sampson = SampsonDistance::<EssentialMatrix>::default();
    let (essential, inliers) = ransac
        .model_inliers_with(&EightPoint::new(), &mut sampson, &matches)
        .expect("no essential matrix found");
    assert_eq!(inliers.len(), 48);
    assert!(inliers.iter().all(|ix| ix % 5 != 0));
    let angle = essential
        .possible_rotations(1e-12, 1000)
        .unwrap()
        .iter()
        .map(|r| r.rotation_to(&pose.0.rotation).angle())
        .fold(f64::INFINITY, f64::min);
    assert_relative_eq!(angle, 0.0, epsilon = 1e-6);
}

#[test]
fn too_few_observations() {
    let mut rng = SmallRng::seed_from_u64(30);
    let (matches, _) = pixel_matches(&mut rng);
    let mut ransac = Ransac::new(1e-4, SmallRng::seed_from_u64(31));
    assert!(ransac
        .model(&EightPointFundamental::new(), matches[..7].iter().copied())
        .is_none());
    let mut lmeds = LeastMedianSquares::new(1.0, SmallRng::seed_from_u64(32));
    assert!(lmeds
        .model(&EightPointFundamental::new(), matches[..7].iter().copied())
        .is_none());
}

fn similarity_matches(rng: &mut SmallRng, truth: &ScaleTranslateRotate) -> Vec<FeatureMatch<KeyPoint>> {
    (0..50)
        .map(|ix| {
            let a = Point2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0));
            let b = if ix % 5 < 2 {
                Point2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0))
            } else {
                truth.transform(a)
            };
            FeatureMatch(KeyPoint(a), KeyPoint(b))
        })
        .collect()
}

#[test]
fn lmeds_recovers_similarity() {
    let truth = ScaleTranslateRotate {
        scale: 1.3,
        angle: -0.4,
        translation: Vector2::new(12.0, -5.0),
    };
    let mut rng = SmallRng::seed_from_u64(40);
    let matches = similarity_matches(&mut rng, &truth);
    let mut lmeds = LeastMedianSquares::new(1e-9, SmallRng::seed_from_u64(41));
    let (model, inliers) = lmeds
        .model_inliers(&ScaleTranslateRotateEstimator::new(), matches.iter().copied())
        .expect("no similarity found");
    assert_relative_eq!(model.scale, truth.scale, epsilon = 1e-9);
    assert_relative_eq!(model.angle, truth.angle, epsilon = 1e-9);
    // Everything at or below the median distance is kept, and all of those are exact.
    assert!(inliers.len() > matches.len() / 2);
    assert!(inliers.iter().all(|ix| ix % 5 >= 2));
}

#[test]
fn lmeds_fails_above_max_median() {
    let truth = ScaleTranslateRotate {
        scale: 0.8,
        angle: 0.2,
        translation: Vector2::new(-3.0, 4.0),
    };
    let mut rng = SmallRng::seed_from_u64(50);
    let noisy: Vec<_> = similarity_matches(&mut rng, &truth)
        .into_iter()
        .map(|FeatureMatch(a, b)| {
            FeatureMatch(a, KeyPoint(b.0 + Vector2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))))
        })
        .collect();
    let mut lmeds = LeastMedianSquares::new(1e-6, SmallRng::seed_from_u64(51));
    assert!(lmeds
        .model(&ScaleTranslateRotateEstimator::new(), noisy.iter().copied())
        .is_none());
}

/// Re-solves the fundamental matrix by least squares over all inliers.
struct Refit;

impl ModelRefiner<FundamentalMatrix, FeatureMatch<KeyPoint>> for Refit {
    fn refine(&self, _: &FundamentalMatrix, data: &[FeatureMatch<KeyPoint>]) -> Option<FundamentalMatrix> {
        EightPointFundamental::new().from_matches(data.iter().copied())
    }
}

/// Always fails.
struct Broken;

impl ModelRefiner<FundamentalMatrix, FeatureMatch<KeyPoint>> for Broken {
    fn refine(&self, _: &FundamentalMatrix, _: &[FeatureMatch<KeyPoint>]) -> Option<FundamentalMatrix> {
        None
    }
}

#[test]
fn refined_consensus_refines_inliers() {
    let mut rng = SmallRng::seed_from_u64(60);
    let (matches, outliers) = pixel_matches(&mut rng);
    let mut refined = RefinedConsensus::new(Ransac::new(1e-4, SmallRng::seed_from_u64(61)), Refit);
    let (fundamental, inliers) = refined
        .model_inliers(&EightPointFundamental::new(), matches.iter().copied())
        .expect("refinement failed");
    assert!(inliers.iter().filter(|&&ix| outliers[ix]).count() <= 2);
    let clean = inliers.iter().filter(|&&ix| !outliers[ix]);
    assert!(clean.map(|&ix| fundamental.residual(&matches[ix])).all(|r| r < 1e-6));
}

#[test]
fn refinement_failure_fails_consensus() {
    let mut rng = SmallRng::seed_from_u64(70);
    let (matches, _) = pixel_matches(&mut rng);
    let mut refined = RefinedConsensus::new(Ransac::new(1e-4, SmallRng::seed_from_u64(71)), Broken);
    assert!(refined
        .model(&EightPointFundamental::new(), matches.iter().copied())
        .is_none());
}
