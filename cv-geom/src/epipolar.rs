//! Two-view relations between cameras and the epipolar matrices.

use cv_core::{
    nalgebra::{Matrix3, Matrix3x4, Vector3},
    Bearing, CameraMatrix, CameraToCamera, FeatureMatch, Pose, Projective, TriangulatorRelative,
};
use cv_pinhole::{EssentialMatrix, FundamentalMatrix};

/// Creates a camera matrix for the second view of a fundamental matrix, given that the first
/// camera is `[I | 0]`:
///
/// ```text
/// P2 = [ [e2]x F + e2 v^T | lambda e2 ]
/// ```
///
/// `e2` is the left epipole (`F^T e2 = 0`), `v` is an arbitrary vector and `lambda` a non-zero
/// scale. Every choice gives the same camera pair up to a projective transform, so `v = 0` and
/// `lambda = 1` are customary.
pub fn fundamental_to_projective(
    fundamental: &FundamentalMatrix,
    e2: Vector3<f64>,
    v: Vector3<f64>,
    lambda: f64,
) -> CameraMatrix {
    let left = e2.cross_matrix() * fundamental.0 + e2 * v.transpose();
    let mut camera = Matrix3x4::zeros();
    camera.fixed_slice_mut::<3, 3>(0, 0).copy_from(&left);
    camera.set_column(3, &(lambda * e2));
    CameraMatrix(camera)
}

/// Same as [`fundamental_to_projective`] with the epipole computed from `fundamental`,
/// `v = 0` and `lambda = 1`.
pub fn canonical_projective(
    fundamental: &FundamentalMatrix,
    epsilon: f64,
    max_iterations: usize,
) -> Option<CameraMatrix> {
    let (_, e2) = fundamental.epipoles(epsilon, max_iterations)?;
    Some(fundamental_to_projective(fundamental, e2, Vector3::zeros(), 1.0))
}

/// Computes the fundamental matrix between the camera `[I | 0]` and the camera `P2 = [M | m]`,
/// which is `[m]x M`.
pub fn fundamental_from_cameras(second: &CameraMatrix) -> FundamentalMatrix {
    let m = second.0.fixed_slice::<3, 3>(0, 0).into_owned();
    let e2: Vector3<f64> = second.0.column(3).into_owned();
    FundamentalMatrix(e2.cross_matrix() * m)
}

/// Computes the fundamental matrix relating two cameras with known intrinsic matrices and the
/// relative pose between them.
pub fn fundamental_from_pose(
    pose: CameraToCamera,
    first: &Matrix3<f64>,
    second: &Matrix3<f64>,
) -> Option<FundamentalMatrix> {
    let essential = EssentialMatrix::from(pose);
    let k1_inv = first.try_inverse()?;
    let k2_inv = second.try_inverse()?;
    Some(FundamentalMatrix(k2_inv.transpose() * essential.0 * k1_inv))
}

/// Picks the one pose out of the four decompositions of an essential matrix which places the
/// most triangulated matches in front of both cameras.
///
/// Returns `None` if the decomposition fails or no match has a positive depth in both views
/// for any pose. Ties go to the earlier pose in the order of
/// [`EssentialMatrix::possible_unscaled_poses`].
pub fn pose_from_essential<B, T>(
    essential: &EssentialMatrix,
    matches: impl Iterator<Item = FeatureMatch<B>> + Clone,
    triangulator: &T,
    epsilon: f64,
    max_iterations: usize,
) -> Option<CameraToCamera>
where
    B: Bearing + Clone,
    T: TriangulatorRelative,
{
    let poses = essential.possible_unscaled_poses(epsilon, max_iterations)?;
    let mut best: Option<(CameraToCamera, usize)> = None;
    for pose in poses {
        let in_front = matches
            .clone()
            .filter(|FeatureMatch(a, b)| {
                triangulator
                    .triangulate_relative(pose, a.clone(), b.clone())
                    .and_then(|point_a| {
                        let depth_a = point_a.point()?.z;
                        let depth_b = pose.transform(point_a).point()?.z;
                        Some(depth_a > 0.0 && depth_b > 0.0)
                    })
                    .unwrap_or(false)
            })
            .count();
        log::trace!("pose candidate has {} points in front", in_front);
        if best.map_or(true, |(_, count)| in_front > count) {
            best = Some((pose, in_front));
        }
    }
    best.filter(|&(_, count)| count > 0).map(|(pose, _)| pose)
}
