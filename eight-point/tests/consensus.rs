use approx::assert_relative_eq;
use arrsac::Arrsac;
use cv_core::{
    nalgebra::{Point3, Rotation3, UnitVector3, Vector3},
    sample_consensus::{Consensus, Model},
    CameraPoint, CameraToCamera, FeatureMatch, Pose, Projective,
};
use eight_point::EightPoint;
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[test]
fn arrsac_rejects_outliers() {
    let mut rng = SmallRng::seed_from_u64(0);
    let pose = CameraToCamera::from_parts(
        Vector3::new(0.6, -0.1, 0.2),
        Rotation3::from_euler_angles(0.05, -0.12, 0.03),
    );
    let mut matches: Vec<FeatureMatch<UnitVector3<f64>>> = (0..80)
        .map(|_| {
            let a = CameraPoint::from_point(Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(3.0..5.0),
            ));
            FeatureMatch(a.bearing(), pose.transform(a).bearing())
        })
        .collect();
    // Every fourth match is replaced by a random pair of bearings.
    for m in matches.iter_mut().step_by(4) {
        let random = |rng: &mut SmallRng| {
            UnitVector3::new_normalize(Vector3::new(
                rng.gen_range(-0.3..0.3),
                rng.gen_range(-0.3..0.3),
                1.0,
            ))
        };
        *m = FeatureMatch(random(&mut rng), random(&mut rng));
    }

    let mut arrsac = Arrsac::new(1e-6, SmallRng::seed_from_u64(1));
    let (essential, inliers) = arrsac
        .model_inliers(&EightPoint::new(), matches.iter().copied())
        .expect("no essential matrix found");
    assert!(inliers.len() >= 55);
    assert!(inliers.iter().all(|&i| essential.residual(&matches[i]) < 1e-6));

    let expected = essential.possible_rotations(1e-12, 1000).unwrap();
    let angle = expected
        .iter()
        .map(|r| r.rotation_to(&pose.0.rotation).angle())
        .fold(f64::INFINITY, f64::min);
    assert_relative_eq!(angle, 0.0, epsilon = 1e-6);
}
