use crate::{KeyPoint, Pose, Projective, WorldPoint, WorldToCamera};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3, Matrix3x4, Point2, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A 3x4 camera projection matrix `P` which maps homogeneous [`WorldPoint`] to homogeneous
/// image points as `x = P X`.
///
/// For a calibrated camera this is `[R | t]` and the image points are normalized keypoints.
/// For an uncalibrated camera this is `K [R | t]` (or any projective equivalent of it)
/// and the image points are in pixels. The matrix is only defined up to a non-zero scale.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraMatrix(pub Matrix3x4<f64>);

impl CameraMatrix {
    /// The canonical camera `[I | 0]`.
    pub fn canonical() -> Self {
        Self(Matrix3x4::identity())
    }

    /// Creates the camera matrix `K [R | t]` of a camera with intrinsic matrix `K`.
    pub fn from_intrinsics_pose(intrinsics: &Matrix3<f64>, pose: WorldToCamera) -> Self {
        Self(intrinsics * pose.matrix3x4())
    }

    /// Projects a point into homogeneous image coordinates.
    pub fn project_homogeneous(&self, point: WorldPoint) -> Vector3<f64> {
        self.0 * point.homogeneous()
    }

    /// Projects a point onto the image.
    ///
    /// Returns `None` if the point projects to infinity on the image plane.
    pub fn project(&self, point: WorldPoint) -> Option<KeyPoint> {
        Point2::from_homogeneous(self.project_homogeneous(point)).map(KeyPoint)
    }
}

impl From<WorldToCamera> for CameraMatrix {
    fn from(pose: WorldToCamera) -> Self {
        Self(pose.matrix3x4())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Point3, Rotation3};

    #[test]
    fn project_matches_pose_transform() {
        let pose = WorldToCamera::from_parts(
            Vector3::new(0.1, 0.2, 0.3),
            Rotation3::from_euler_angles(0.2, 0.1, -0.1),
        );
        let point = WorldPoint::from_point(Point3::new(0.5, -0.5, 5.0));
        let camera = pose.transform(point).point().unwrap();
        let projected = CameraMatrix::from(pose).project(point).unwrap();
        assert!((projected.x - camera.x / camera.z).abs() < 1e-12);
        assert!((projected.y - camera.y / camera.z).abs() < 1e-12);
    }

    #[test]
    fn intrinsics_premultiply() {
        let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 400.0, 240.0, 0.0, 0.0, 1.0);
        let camera = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
        let point = WorldPoint::from_point(Point3::new(0.1, -0.2, 2.0));
        let projected = camera.project(point).unwrap();
        assert!((projected.x - (320.0 + 500.0 * 0.05)).abs() < 1e-9);
        assert!((projected.y - (240.0 - 400.0 * 0.1)).abs() < 1e-9);
    }
}
