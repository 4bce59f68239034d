use cv_core::{
    nalgebra::{Matrix3, Rotation3, Vector3, SVD},
    sample_consensus::Model,
    Bearing, CameraToCamera, FeatureMatch, Pose,
};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This stores an essential matrix, which is satisfied by the following constraint:
///
/// transpose(x') * E * x = 0
///
/// Where `x'` and `x` are homogeneous normalized image coordinates (or any bearing pointing
/// at the same feature). You can get a homogeneous normalized image coordinate by appending
/// `1.0` to a `NormalizedKeyPoint`.
///
/// `E * x` is the epipolar line in the second image on which `x'` must lie. The matrix is only
/// defined up to scale. A valid essential matrix has two equal singular values and one zero
/// singular value, which [`EssentialMatrix::recondition`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// Can be used to enforce the constraints of an essential matrix to fix it.
    ///
    /// This finds the closest essential matrix in frobenius form. This just means
    /// that the two singular values are averaged and the null singular value is
    /// forced to zero.
    pub fn recondition(self, epsilon: f64, max_iterations: usize) -> Option<Self> {
        let mut svd = self.try_svd(true, true, epsilon, max_iterations)?;
        svd.singular_values[2] = 0.0;
        let new_singular = (svd.singular_values[0] + svd.singular_values[1]) / 2.0;
        svd.singular_values[0] = new_singular;
        svd.singular_values[1] = new_singular;
        svd.recompose().ok().map(Self)
    }

    /// Returns two possible rotations for the essential matrix along with a translation
    /// bearing of arbitrary length. The translation's length is unknown and of unknown sign
    /// and must be solved for by using a prior (see [`EssentialMatrix::possible_unscaled_poses`]).
    ///
    /// `epsilon` is the threshold by which the singular value decomposition is considered
    /// complete. Making this smaller may improve the precision. It is recommended to
    /// set this to no higher than `1e-6`.
    ///
    /// `max_iterations` is the maximum number of iterations that singular value decomposition
    /// will run on this matrix. Use this in soft realtime systems to cap the execution time.
    /// A `max_iterations` of `0` may execute indefinitely and is not recommended.
    ///
    /// ```
    /// use cv_core::CameraToCamera;
    /// use cv_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use cv_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// let (rot_a, rot_b, t) = EssentialMatrix::from(pose).possible_rotations_unscaled_translation(1e-6, 50).unwrap();
    /// let a_close = rot_a.rotation_to(&pose.0.rotation).angle() < 1e-4;
    /// let b_close = rot_b.rotation_to(&pose.0.rotation).angle() < 1e-4;
    /// // At least one rotation is correct.
    /// assert!(a_close || b_close);
    /// // The translation points in the same (or reverse) direction
    /// let t_res = 1.0 - t.normalize().dot(&pose.0.translation.vector.normalize()).abs();
    /// assert!(t_res < 1e-4);
    /// ```
    pub fn possible_rotations_unscaled_translation(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(Rotation3<f64>, Rotation3<f64>, Vector3<f64>)> {
        // `W` from https://en.wikipedia.org/wiki/Essential_matrix#Finding_one_solution.
        let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let wt = w.transpose();

        let SVD { u, v_t, .. } = SVD::try_new(self.0, true, true, epsilon, max_iterations)?;
        let (mut u, mut v_t) = (u?, v_t?);

        // The last singular vectors are undetermined in sign since d = (a a 0), so
        // flip them to get proper rotations.
        if u.determinant() < 0.0 {
            u.column_mut(2).neg_mut();
        }
        if v_t.determinant() < 0.0 {
            v_t.row_mut(2).neg_mut();
        }

        Some((
            Rotation3::from_matrix_unchecked(u * w * v_t),
            Rotation3::from_matrix_unchecked(u * wt * v_t),
            u.column(2).into_owned(),
        ))
    }

    /// See [`EssentialMatrix::possible_rotations_unscaled_translation`].
    ///
    /// This returns only the two rotations that are possible.
    pub fn possible_rotations(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<[Rotation3<f64>; 2]> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, rot_b, _)| [rot_a, rot_b])
    }

    /// See [`EssentialMatrix::possible_rotations_unscaled_translation`].
    ///
    /// This returns all four combinations of the two rotations and the two signs of the
    /// translation. Exactly one of them places the observed points in front of both cameras.
    ///
    /// ```
    /// use cv_core::CameraToCamera;
    /// use cv_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use cv_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// let rbs = EssentialMatrix::from(pose).possible_unscaled_poses(1e-6, 50).unwrap();
    /// let one_correct = rbs.iter().any(|&upose| {
    ///     let angle_residual =
    ///         upose.0.rotation.rotation_to(&pose.0.rotation).angle();
    ///     let translation_residual =
    ///         1.0 - upose.0.translation.vector.normalize()
    ///                    .dot(&pose.0.translation.vector.normalize());
    ///     angle_residual < 1e-4 && translation_residual < 1e-4
    /// });
    /// assert!(one_correct);
    /// ```
    pub fn possible_unscaled_poses(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<[CameraToCamera; 4]> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, rot_b, t)| {
                [
                    CameraToCamera::from_parts(t, rot_a),
                    CameraToCamera::from_parts(t, rot_b),
                    CameraToCamera::from_parts(-t, rot_a),
                    CameraToCamera::from_parts(-t, rot_b),
                ]
            })
    }

    /// Scales the matrix to unit frobenius norm.
    ///
    /// Returns `None` for the zero matrix.
    pub fn normalized(self) -> Option<Self> {
        let norm = self.0.norm();
        if norm > 0.0 && norm.is_finite() {
            Some(Self(self.0 / norm))
        } else {
            None
        }
    }
}

/// Generates an essential matrix corresponding to this relative camera pose.
///
/// If a point `a` is transformed using [`Pose::transform`] into
/// a point `b`, then the essential matrix returned by this method will
/// give a residual of approximately `0.0` when you call
/// `essential.residual(&FeatureMatch(a, b))`.
impl From<CameraToCamera> for EssentialMatrix {
    fn from(pose: CameraToCamera) -> Self {
        Self(pose.0.translation.vector.cross_matrix() * *pose.0.rotation.matrix())
    }
}

/// The algebraic residual `|b^T E a|` of the bearings.
///
/// Bearings are used as given, so normalized keypoints are scored on the virtual image plane
/// while unit bearings are scored on the unit sphere.
impl<P> Model<FeatureMatch<P>> for EssentialMatrix
where
    P: Bearing,
{
    fn residual(&self, data: &FeatureMatch<P>) -> f64 {
        let FeatureMatch(a, b) = data;
        Float::abs(
            b.bearing_unnormalized()
                .dot(&(self.0 * a.bearing_unnormalized())),
        )
    }
}
