use crate::{CameraPoint, Projective, WorldPoint};
use derive_more::{AsMut, AsRef, From, Into};
use nalgebra::{IsometryMatrix3, Matrix3x4, Matrix4, Point3, Rotation3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented by all the different poses in this library:
///
/// * [`CameraToWorld`] - Transforms [`CameraPoint`] into [`WorldPoint`]
/// * [`WorldToCamera`] - Transforms [`WorldPoint`] into [`CameraPoint`]
/// * [`CameraToCamera`] - Transforms [`CameraPoint`] from one camera into [`CameraPoint`] for another camera
/// * [`WorldToWorld`] - Transforms [`WorldPoint`] from one reconstruction into another
pub trait Pose: From<IsometryMatrix3<f64>> + Clone + Copy {
    type InputPoint: Projective;
    type OutputPoint: Projective;
    type Inverse: Pose;

    /// Retrieve the isometry.
    fn isometry(self) -> IsometryMatrix3<f64>;

    /// Creates a pose with no change in position or orientation.
    fn identity() -> Self {
        IsometryMatrix3::identity().into()
    }

    /// Takes the inverse of the pose.
    fn inverse(self) -> Self::Inverse {
        self.isometry().inverse().into()
    }

    /// Applies a scale factor to the pose (scales the translation component)
    #[must_use]
    fn scale(self, scale: f64) -> Self {
        let mut isometry = self.isometry();
        isometry.translation.vector *= scale;
        isometry.into()
    }

    /// Create the pose from rotation and translation.
    fn from_parts(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        IsometryMatrix3::from_parts(translation.into(), rotation).into()
    }

    /// Retrieve the homogeneous matrix.
    fn homogeneous(self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    /// Retrieve the `[R | t]` matrix.
    fn matrix3x4(self) -> Matrix3x4<f64> {
        self.homogeneous().fixed_slice::<3, 4>(0, 0).into_owned()
    }

    /// Transform the given point to an output point.
    ///
    /// Points at infinity stay at infinity and are only rotated.
    fn transform(self, input: Self::InputPoint) -> Self::OutputPoint {
        Projective::from_homogeneous(self.homogeneous() * input.homogeneous())
    }
}

/// This contains a world pose, which is a pose of the world relative to the camera.
/// This maps [`WorldPoint`] into [`CameraPoint`], changing an absolute position into
/// a vector relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToCamera(pub IsometryMatrix3<f64>);

impl Pose for WorldToCamera {
    type InputPoint = WorldPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

impl WorldToCamera {
    /// The location of the optical center in world coordinates.
    pub fn optical_center(self) -> Point3<f64> {
        self.inverse().isometry().translation.vector.into()
    }
}

/// This contains a camera pose, which is a pose of the camera relative to the world.
/// This transforms camera points (with depth as `z`) into world coordinates.
/// This also tells you where the camera is located and oriented in the world.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToWorld(pub IsometryMatrix3<f64>);

impl Pose for CameraToWorld {
    type InputPoint = CameraPoint;
    type OutputPoint = WorldPoint;
    type Inverse = WorldToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

/// This contains a relative pose that transforms the [`CameraPoint`] of one image
/// into the corresponding [`CameraPoint`] of another image. This transforms
/// the point from the camera space of camera `A` to camera `B`.
///
/// Camera space for a given camera is defined as thus:
///
/// * Origin is the optical center
/// * Positive z axis is forwards
/// * Positive y axis is down
/// * Positive x axis is right
///
/// Note that this is a right-handed coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToCamera(pub IsometryMatrix3<f64>);

impl Pose for CameraToCamera {
    type InputPoint = CameraPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

impl CameraToCamera {
    /// Computes the relative pose from camera `A` to camera `B` given the pose of each camera
    /// in the same reconstruction.
    pub fn from_world_poses(a_pose: WorldToCamera, b_pose: WorldToCamera) -> Self {
        (b_pose.isometry() * a_pose.isometry().inverse()).into()
    }
}

/// This contains a relative pose that transforms the [`WorldPoint`] of one reconstruction
/// into the corresponding [`WorldPoint`] of another reconstruction. This transforms
/// the point from the world space of reconstruction `A` to reconstruction `B`.
///
/// Unlike the other poses, the translation of a [`WorldToWorld`] is often only meaningful
/// together with a scale factor, since each reconstruction has its own unit of distance.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToWorld(pub IsometryMatrix3<f64>);

impl Pose for WorldToWorld {
    type InputPoint = WorldPoint;
    type OutputPoint = WorldPoint;
    type Inverse = WorldToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

impl WorldToWorld {
    /// If a camera has a pose in two different reconstructions, we can derive the
    /// [`WorldToWorld`] transformation from the [`WorldToCamera`] pose of the camera
    /// in each reconstruction. This must be passed the camera pose in reconstruction `A`
    /// and then reconstruction `B` in that order. It will return the [`WorldToWorld`]
    /// transformation from `A` to `B`.
    pub fn from_camera_poses(a_pose: WorldToCamera, b_pose: WorldToCamera) -> Self {
        (b_pose.isometry().inverse() * a_pose.isometry()).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Point3, Vector4};

    fn some_pose() -> WorldToCamera {
        WorldToCamera::from_parts(
            Vector3::new(0.3, -0.2, 1.5),
            Rotation3::from_euler_angles(0.1, -0.2, 0.05),
        )
    }

    #[test]
    fn inverse_round_trip() {
        let pose = some_pose();
        let point = WorldPoint::from_point(Point3::new(0.5, 0.25, 4.0));
        let back = pose.inverse().transform(pose.transform(point));
        assert!((back.point().unwrap() - point.point().unwrap()).norm() < 1e-12);
    }

    #[test]
    fn optical_center_maps_to_origin() {
        let pose = some_pose();
        let center = WorldPoint::from_point(pose.optical_center());
        let camera = pose.transform(center).point().unwrap();
        assert!(camera.coords.norm() < 1e-12);
    }

    #[test]
    fn relative_pose_from_world_poses() {
        let a = some_pose();
        let b = WorldToCamera::from_parts(
            Vector3::new(-1.0, 0.1, 0.2),
            Rotation3::from_euler_angles(-0.1, 0.3, 0.0),
        );
        let relative = CameraToCamera::from_world_poses(a, b);
        let world = WorldPoint::from_point(Point3::new(0.1, 0.4, 3.0));
        let via_relative = relative.transform(a.transform(world));
        let direct = b.transform(world);
        assert!((via_relative.0 - direct.0).norm() < 1e-12);
    }

    #[test]
    fn point_at_infinity_is_rotated_only() {
        let pose = some_pose();
        let point = WorldPoint(Vector4::new(0.0, 0.0, 1.0, 0.0));
        let out = pose.transform(point);
        assert_eq!(out.w, 0.0);
        let expected = pose.isometry().rotation * Vector3::z();
        assert!((out.xyz() - expected).norm() < 1e-12);
    }
}
