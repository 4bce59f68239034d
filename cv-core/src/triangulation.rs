use crate::{
    Bearing, CameraMatrix, CameraPoint, CameraToCamera, ImagePoint, Pose, WorldPoint,
    WorldToCamera,
};

/// This trait is for algorithms which allow you to triangulate a point from two or more observances.
/// Each observance is a [`WorldToCamera`] and a [`Bearing`].
///
/// Triangulators are not required to check that the point lies in front of the cameras.
/// Cost functions that care about cheirality check the depth themselves.
pub trait TriangulatorObservations {
    fn triangulate_observations<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<WorldPoint>;
}

/// This trait allows you to take one relative pose from camera `A` to camera `B` and two bearings `a` and `b` from
/// their respective cameras to triangulate a point from the perspective of camera `A`.
pub trait TriangulatorRelative {
    fn triangulate_relative<A: Bearing, B: Bearing>(
        &self,
        relative_pose: CameraToCamera,
        a: A,
        b: B,
    ) -> Option<CameraPoint>;
}

impl<T> TriangulatorRelative for T
where
    T: TriangulatorObservations,
{
    fn triangulate_relative<A: Bearing, B: Bearing>(
        &self,
        CameraToCamera(pose): CameraToCamera,
        a: A,
        b: B,
    ) -> Option<CameraPoint> {
        use core::iter::once;

        // The first camera is used as the world, so its pose is the identity and the
        // relative pose becomes the pose of the second camera.
        self.triangulate_observations(
            once((WorldToCamera::identity(), a.bearing()))
                .chain(once((WorldToCamera(pose), b.bearing()))),
        )
        .map(|p| CameraPoint(p.0))
    }
}

/// This trait is for algorithms which triangulate a point from two or more uncalibrated views.
/// Each observance is a [`CameraMatrix`] and the pixel location of the feature in that view.
///
/// The result is only defined up to the projective ambiguity of the camera matrices.
pub trait TriangulatorProjective {
    fn triangulate_projective<P: ImagePoint>(
        &self,
        pairs: impl IntoIterator<Item = (CameraMatrix, P)>,
    ) -> Option<WorldPoint>;
}
