use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Point3, Unit, Vector3, Vector4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented for homogeneous projective 3d coordinate.
pub trait Projective: From<Vector4<f64>> + Clone + Copy {
    /// Retrieve the homogeneous vector.
    ///
    /// No constraints are put on this vector. All components can move freely and it is not normalized.
    /// However, this vector may be normalized if desired and it will still be equivalent to the original.
    fn homogeneous(self) -> Vector4<f64>;

    /// Create the point from a homogeneous vector.
    fn from_homogeneous(point: Vector4<f64>) -> Self {
        point.into()
    }

    /// Retrieve the euclidean 3d point by normalizing the homogeneous coordinate.
    ///
    /// This fails when `w` is zero, since the point then lies at infinity (like a star in the sky),
    /// whereas a 3d euclidean point cannot.
    fn point(self) -> Option<Point3<f64>> {
        Point3::from_homogeneous(self.homogeneous())
    }

    /// Convert the euclidean 3d point into homogeneous coordinates.
    fn from_point(point: Point3<f64>) -> Self {
        point.to_homogeneous().into()
    }

    /// Scales the homogeneous vector to unit length with a non-negative `w`.
    ///
    /// This does not change the point that is represented, but it keeps points near
    /// infinity numerically well behaved.
    #[must_use]
    fn normalized(self) -> Self {
        let mut homogeneous = self.homogeneous();
        if homogeneous.w < 0.0 {
            homogeneous = -homogeneous;
        }
        let norm = homogeneous.norm();
        if norm > 0.0 {
            homogeneous /= norm;
        }
        homogeneous.into()
    }

    /// Retrieve the normalized bearing of the coordinate.
    fn bearing(self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.bearing_unnormalized())
    }

    /// Retrieve the unnormalized bearing of the coordinate.
    ///
    /// The `w` component is taken into account so that the bearing of a point
    /// with a negative `w` still points at the represented point.
    fn bearing_unnormalized(self) -> Vector3<f64> {
        let homogeneous = self.homogeneous();
        if homogeneous.w < 0.0 {
            -homogeneous.xyz()
        } else {
            homogeneous.xyz()
        }
    }
}

/// A 3d point which is relative to the camera's optical center and orientation where
/// the positive X axis is right, positive Y axis is down, and positive Z axis is forwards
/// from the optical center of the camera. The unit of distance of a `CameraPoint` is
/// unspecified and relative to the current reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraPoint(pub Vector4<f64>);

impl Projective for CameraPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}

impl CameraPoint {
    /// The depth of the point along the optical axis of the camera.
    ///
    /// Returns `None` for points at infinity. A negative depth means the point is behind the camera.
    pub fn depth(self) -> Option<f64> {
        self.point().map(|p| p.z)
    }
}

/// A point in "world" coordinates.
///
/// The real-world units are typically unknown, since scaling the whole world by any factor
/// produces exactly the same normalized image coordinates on every frame. The unit of distance
/// and orientation are the same as the current reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldPoint(pub Vector4<f64>);

impl Projective for WorldPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalized_keeps_point() {
        let point = WorldPoint(Vector4::new(2.0, -4.0, 6.0, -2.0));
        let normalized = point.normalized();
        assert!(normalized.w > 0.0);
        assert!((normalized.homogeneous().norm() - 1.0).abs() < 1e-12);
        let a = point.point().unwrap();
        let b = normalized.point().unwrap();
        assert!((a - b).norm() < 1e-12);
    }

    #[test]
    fn point_at_infinity_has_no_euclidean_form() {
        let point = WorldPoint(Vector4::new(0.0, 0.0, 1.0, 0.0));
        assert!(point.point().is_none());
        assert_eq!(point.bearing().into_inner(), Vector3::z());
    }

    #[test]
    fn depth_of_point_behind_camera() {
        let point = CameraPoint(Vector4::new(0.1, 0.2, 3.0, -1.0));
        assert!(point.depth().unwrap() < 0.0);
        assert!(point.bearing().z < 0.0);
    }
}
