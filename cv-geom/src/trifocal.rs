//! The trifocal tensor relating three views.
//!
//! The tensor is stored as three 3x3 slices `[T1, T2, T3]`. The first camera is always assumed
//! to be `[I | 0]`, so the tensor created from the cameras `P2 = [a1 a2 a3 a4]` and
//! `P3 = [b1 b2 b3 b4]` is `Ti = ai b4^T - a4 bi^T`. Like the epipolar matrices, the tensor is only
//! defined up to scale.

use cv_core::{
    nalgebra::{Matrix3, Matrix3x4, Point2, SVector, Vector3},
    sample_consensus::Model,
    CameraMatrix, FeatureTriple, ImagePoint, Pose, WorldToCamera,
};
use cv_pinhole::FundamentalMatrix;
use derive_more::{AsMut, AsRef, From, Into};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Finds the unit vector `x` with `m x = 0`.
///
/// Fails if the null space is not one dimensional.
fn null_vector(
    m: Matrix3<f64>,
    epsilon: f64,
    max_iterations: usize,
    degeneracy: f64,
) -> Option<Vector3<f64>> {
    let svd = m.try_svd(false, true, epsilon, max_iterations)?;
    let v_t = svd.v_t?;
    let singular = svd.singular_values;
    if !(singular[0] > 0.0) || singular[1] <= degeneracy * singular[0] {
        return None;
    }
    Some(v_t.row(2).transpose())
}

/// Three 3x3 matrices relating point and line correspondences over three views.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct TrifocalTensor(pub [Matrix3<f64>; 3]);

impl TrifocalTensor {
    /// Creates the tensor from the cameras of the second and third views, where the first
    /// camera is `[I | 0]`.
    ///
    /// ```
    /// use cv_core::nalgebra::{Point3, Rotation3, Vector3};
    /// use cv_core::{CameraMatrix, Pose, Projective, WorldPoint, WorldToCamera};
    /// use cv_geom::trifocal::TrifocalTensor;
    ///
    /// let second = WorldToCamera::from_parts(Vector3::new(-0.5, 0.1, 0.0), Rotation3::new(Vector3::new(0.0, 0.1, 0.0)));
    /// let third = WorldToCamera::from_parts(Vector3::new(0.2, -0.4, 0.1), Rotation3::new(Vector3::new(0.1, 0.0, -0.05)));
    /// let tensor = TrifocalTensor::from_poses(second, third);
    /// let point = WorldPoint::from_point(Point3::new(0.3, 0.2, 4.0));
    /// let [x1, x2, x3] = [CameraMatrix::canonical(), second.into(), third.into()]
    ///     .map(|camera: CameraMatrix| camera.project(point).unwrap().0);
    /// assert!(tensor.constraint_point_point_point(x1, x2, x3).norm() < 1e-12);
    /// ```
    pub fn from_cameras(second: &CameraMatrix, third: &CameraMatrix) -> Self {
        let (p2, p3) = (&second.0, &third.0);
        let slice = |i: usize| p2.column(i) * p3.column(3).transpose() - p2.column(3) * p3.column(i).transpose();
        Self([slice(0), slice(1), slice(2)])
    }

    /// Creates the tensor of three calibrated views, where the first view is the world frame.
    pub fn from_poses(second: WorldToCamera, third: WorldToCamera) -> Self {
        Self::from_cameras(&second.into(), &third.into())
    }

    /// Computes `sum_i x1^i Ti` for the homogeneous point `(x, y, 1)` in the first view.
    pub fn contract(&self, x1: Point2<f64>) -> Matrix3<f64> {
        let [t1, t2, t3] = &self.0;
        t1 * x1.x + t2 * x1.y + t3
    }

    /// Evaluates the point-point-point constraint `[x2]x (sum_i x1^i Ti) [x3]x`, which is the zero
    /// matrix for a perfect correspondence.
    pub fn constraint_point_point_point(
        &self,
        x1: Point2<f64>,
        x2: Point2<f64>,
        x3: Point2<f64>,
    ) -> Matrix3<f64> {
        x2.to_homogeneous().cross_matrix()
            * self.contract(x1)
            * x3.to_homogeneous().cross_matrix()
    }

    /// Evaluates the point-line-line constraint `l2^T (sum_i x1^i Ti) l3`, which is zero when the
    /// lines `l2` and `l3` pass through the images of the point seen at `x1`.
    pub fn constraint_point_line_line(
        &self,
        x1: Point2<f64>,
        l2: Vector3<f64>,
        l3: Vector3<f64>,
    ) -> f64 {
        l2.dot(&(self.contract(x1) * l3))
    }

    /// Transfers a point from the first view into the third view through the plane back projected
    /// from the line `l2` in the second view.
    ///
    /// The result is homogeneous and lies at infinity if the plane contains the point's ray.
    pub fn transfer_13_line(&self, x1: Point2<f64>, l2: Vector3<f64>) -> Vector3<f64> {
        self.contract(x1).tr_mul(&l2)
    }

    /// Transfers a point from the first view into the second view through the plane back projected
    /// from the line `l3` in the third view.
    pub fn transfer_12_line(&self, x1: Point2<f64>, l3: Vector3<f64>) -> Vector3<f64> {
        self.contract(x1) * l3
    }

    /// Transfers the correspondence `(x1, x2)` into the third view.
    ///
    /// The line through `x2` perpendicular to the epipolar line of `x1` is used, which avoids the
    /// degenerate choice of the epipolar line itself. `f21` is the fundamental matrix from the
    /// first into the second view (see [`TrifocalTensor::fundamentals`]).
    pub fn transfer_13(
        &self,
        f21: &FundamentalMatrix,
        x1: Point2<f64>,
        x2: Point2<f64>,
    ) -> Option<Point2<f64>> {
        let epipolar = f21.0 * x1.to_homogeneous();
        let l2 = Vector3::new(epipolar.y, -epipolar.x, -x2.x * epipolar.y + x2.y * epipolar.x);
        Point2::from_homogeneous(self.transfer_13_line(x1, l2))
    }

    /// Extracts the epipoles `(e2, e3)`, the images of the first camera center in the second and
    /// third views, as unit homogeneous vectors.
    ///
    /// `e2` is perpendicular to the left null vectors of every slice and `e3` is perpendicular
    /// to the right null vectors of every slice. Fails when the null spaces are not one
    /// dimensional, which happens for degenerate tensors.
    pub fn epipoles(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let degeneracy = 1e-10;
        let mut lefts = Matrix3::zeros();
        let mut rights = Matrix3::zeros();
        for (i, slice) in self.0.iter().enumerate() {
            let left = null_vector(slice.transpose(), epsilon, max_iterations, degeneracy)?;
            let right = null_vector(*slice, epsilon, max_iterations, degeneracy)?;
            lefts.set_row(i, &left.transpose());
            rights.set_row(i, &right.transpose());
        }
        let e2 = null_vector(lefts, epsilon, max_iterations, degeneracy)?;
        let e3 = null_vector(rights, epsilon, max_iterations, degeneracy)?;
        Some((e2, e3))
    }

    /// Extracts the fundamental matrices `(F21, F31)` with `x2^T F21 x1 = 0` and `x3^T F31 x1 = 0`.
    pub fn fundamentals(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(FundamentalMatrix, FundamentalMatrix)> {
        let (e2, e3) = self.epipoles(epsilon, max_iterations)?;
        let [t1, t2, t3] = &self.0;
        let te3 = Matrix3::from_columns(&[t1 * e3, t2 * e3, t3 * e3]);
        let te2 = Matrix3::from_columns(&[t1.tr_mul(&e2), t2.tr_mul(&e2), t3.tr_mul(&e2)]);
        Some((
            FundamentalMatrix(e2.cross_matrix() * te3),
            FundamentalMatrix(e3.cross_matrix() * te2),
        ))
    }

    /// Extracts camera matrices `(P2, P3)` for the second and third views which are consistent
    /// with the tensor and the first camera `[I | 0]`, up to a common projective transform.
    pub fn cameras(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(CameraMatrix, CameraMatrix)> {
        let (e2, e3) = self.epipoles(epsilon, max_iterations)?;
        Some(self.cameras_from_epipoles(e2, e3))
    }

    /// Same as [`TrifocalTensor::cameras`] with already known unit epipoles.
    pub fn cameras_from_epipoles(&self, e2: Vector3<f64>, e3: Vector3<f64>) -> (CameraMatrix, CameraMatrix) {
        let [t1, t2, t3] = &self.0;
        let mut p2 = Matrix3x4::zeros();
        let mut p3 = Matrix3x4::zeros();
        let projector = e3 * e3.transpose() - Matrix3::identity();
        for (i, slice) in [t1, t2, t3].into_iter().enumerate() {
            p2.set_column(i, &(slice * e3));
            p3.set_column(i, &(projector * slice.tr_mul(&e2)));
        }
        p2.set_column(3, &e2);
        p3.set_column(3, &e3);
        (CameraMatrix(p2), CameraMatrix(p3))
    }

    /// Scales the tensor to unit frobenius norm.
    ///
    /// Returns `None` for the zero tensor.
    pub fn normalized(self) -> Option<Self> {
        let norm = self.to_vector().norm();
        if norm > 0.0 && norm.is_finite() {
            Some(Self(self.0.map(|slice| slice / norm)))
        } else {
            None
        }
    }

    /// Stacks the tensor into a vector, slice by slice and row by row within a slice.
    pub fn to_vector(&self) -> SVector<f64, 27> {
        SVector::from_fn(|index, _| {
            let slice = index / 9;
            let row = (index % 9) / 3;
            let col = index % 3;
            self.0[slice][(row, col)]
        })
    }

    /// The inverse of [`TrifocalTensor::to_vector`].
    pub fn from_vector(vector: &SVector<f64, 27>) -> Self {
        let slice = |i: usize| Matrix3::from_fn(|row, col| vector[i * 9 + row * 3 + col]);
        Self([slice(0), slice(1), slice(2)])
    }

    /// Applies the image transforms `h1`, `h2`, `h3` of each view to the tensor, so that the
    /// tensor relates the transformed points `h1 x1`, `h2 x2`, `h3 x3`.
    ///
    /// `h1_inverse` is the inverse of `h1`. This is used to undo the conditioning of normalized
    /// estimation.
    pub fn transform(
        &self,
        h1_inverse: &Matrix3<f64>,
        h2: &Matrix3<f64>,
        h3: &Matrix3<f64>,
    ) -> Self {
        let slice = |i: usize| {
            let mixed = self.0[0] * h1_inverse[(0, i)]
                + self.0[1] * h1_inverse[(1, i)]
                + self.0[2] * h1_inverse[(2, i)];
            h2 * mixed * h3.transpose()
        };
        Self([slice(0), slice(1), slice(2)])
    }

    /// The distance between the two tensors after scaling both to unit norm, taking the sign
    /// which brings them closest.
    pub fn distance(&self, other: &Self) -> Option<f64> {
        let a = self.normalized()?.to_vector();
        let b = other.normalized()?.to_vector();
        Some((a - b).norm().min((a + b).norm()))
    }
}

impl<P: ImagePoint> Model<FeatureTriple<P>> for TrifocalTensor {
    /// The squared frobenius norm of the point-point-point constraint.
    ///
    /// This is an algebraic error, so it scales with the tensor. Normalize the tensor first when
    /// comparing against a threshold.
    fn residual(&self, FeatureTriple(a, b, c): &FeatureTriple<P>) -> f64 {
        self.constraint_point_point_point(a.image_point(), b.image_point(), c.image_point())
            .norm_squared()
    }
}

/// Convenience to build a tensor from three poses in a common world frame.
///
/// The first pose is moved to the origin so that its camera becomes `[I | 0]`.
pub fn trifocal_from_world_poses(
    first: WorldToCamera,
    second: WorldToCamera,
    third: WorldToCamera,
) -> TrifocalTensor {
    let to_first = first.inverse().isometry();
    TrifocalTensor::from_poses(
        WorldToCamera(second.isometry() * to_first),
        WorldToCamera(third.isometry() * to_first),
    )
}
