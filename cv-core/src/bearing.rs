use nalgebra::{Unit, UnitVector3, Vector3};

/// This trait is implemented by anything that can be turned into a pointing vector
/// out of the optical center of a camera.
///
/// The bearing's X axis points right, Y axis points down, and Z axis points forwards.
/// Bearings are not required to be in front of the camera, which allows omnidirectional
/// cameras to use the same algorithms as pinhole cameras.
pub trait Bearing {
    /// Retrieve the unnormalized bearing.
    ///
    /// Use this when you know that you do not need the bearing to be normalized,
    /// and it may increase performance. Otherwise use [`Bearing::bearing`].
    fn bearing_unnormalized(&self) -> Vector3<f64>;

    /// Retrieve the normalized bearing.
    fn bearing(&self) -> UnitVector3<f64> {
        Unit::new_normalize(self.bearing_unnormalized())
    }

    /// Create the type from a bearing of any length.
    fn from_bearing_vector(bearing: Vector3<f64>) -> Self;
}

impl Bearing for UnitVector3<f64> {
    fn bearing_unnormalized(&self) -> Vector3<f64> {
        self.into_inner()
    }

    fn bearing(&self) -> UnitVector3<f64> {
        *self
    }

    fn from_bearing_vector(bearing: Vector3<f64>) -> Self {
        Unit::new_normalize(bearing)
    }
}
