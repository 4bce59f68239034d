use crate::{CameraIntrinsics, EssentialMatrix};
use cv_core::{
    nalgebra::{Matrix3, Point2, Vector3},
    sample_consensus::Model,
    FeatureMatch, ImagePoint,
};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This stores a fundamental matrix, which is satisfied by the following constraint:
///
/// transpose(x') * F * x = 0
///
/// Where `x'` and `x` are homogeneous pixel coordinates in the second and first image.
/// This is the uncalibrated counterpart of the [`EssentialMatrix`], and the two are related by
/// `F = K2^-T E K1^-1`. A valid fundamental matrix has rank 2.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FundamentalMatrix(pub Matrix3<f64>);

impl FundamentalMatrix {
    /// Computes `K2^-T E K1^-1`.
    ///
    /// Returns `None` if either intrinsic matrix is singular.
    pub fn from_essential(
        essential: EssentialMatrix,
        first: &CameraIntrinsics,
        second: &CameraIntrinsics,
    ) -> Option<Self> {
        let k1_inv = first.matrix().try_inverse()?;
        let k2_inv = second.matrix().try_inverse()?;
        Some(Self(k2_inv.transpose() * essential.0 * k1_inv))
    }

    /// Computes `K2^T F K1`.
    pub fn essential(&self, first: &CameraIntrinsics, second: &CameraIntrinsics) -> EssentialMatrix {
        EssentialMatrix(second.matrix().transpose() * self.0 * first.matrix())
    }

    /// Projects the matrix onto the closest rank 2 matrix in frobenius form by zeroing its
    /// smallest singular value.
    pub fn recondition(self, epsilon: f64, max_iterations: usize) -> Option<Self> {
        let mut svd = self.try_svd(true, true, epsilon, max_iterations)?;
        svd.singular_values[2] = 0.0;
        svd.recompose().ok().map(Self)
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

    /// Computes both epipoles `(e1, e2)` such that `F e1 = 0` and `F^T e2 = 0`.
    ///
    /// The epipoles are unit length homogeneous vectors. `e1` is the image of the second
    /// camera's optical center in the first image and `e2` the image of the first camera's
    /// center in the second image. An epipole at infinity has a zero third component.
    pub fn epipoles(&self, epsilon: f64, max_iterations: usize) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let svd = self.try_svd(true, true, epsilon, max_iterations)?;
        let u = svd.u?;
        let v_t = svd.v_t?;
        let e1 = v_t.row(2).transpose();
        let e2 = u.column(2).into_owned();
        Some((e1, e2))
    }
}

impl From<EssentialMatrix> for FundamentalMatrix {
    /// An essential matrix is a fundamental matrix for cameras with identity intrinsics.
    fn from(essential: EssentialMatrix) -> Self {
        Self(essential.0)
    }
}

/// Computes the first order geometric error (the Sampson distance) of a correspondence
/// `(a, b)` to the two-view relation `m` (either a fundamental or essential matrix):
///
/// ```text
/// (b^T M a)^2 / ((M a)_0^2 + (M a)_1^2 + (M^T b)_0^2 + (M^T b)_1^2)
/// ```
///
/// The homogeneous points are taken as given. The distance does not change when `m` is
/// multiplied by a non-zero scalar. A zero denominator yields `f64::MAX`, unless the numerator
/// is also zero, in which case the correspondence fits perfectly.
///
/// ```
/// use cv_core::nalgebra::{Matrix3, Vector3};
/// use cv_pinhole::sampson_distance;
/// let m = Matrix3::new(0.0, -1.0, 0.5, 1.0, 0.0, -0.25, -0.5, 0.25, 0.0);
/// let a = Vector3::new(0.3, 0.1, 1.0);
/// let b = Vector3::new(0.2, -0.1, 1.0);
/// let distance = sampson_distance(&m, a, b);
/// assert!((distance - sampson_distance(&(m * -7.5), a, b)).abs() < 1e-12);
/// ```
pub fn sampson_distance(m: &Matrix3<f64>, a: Vector3<f64>, b: Vector3<f64>) -> f64 {
    match sampson_residual(m, a, b) {
        Some(residual) => residual * residual,
        None if b.dot(&(m * a)) == 0.0 => 0.0,
        None => f64::MAX,
    }
}

/// The signed square root of [`sampson_distance`], `b^T M a / sqrt(...)`, for use as a least
/// squares residual.
///
/// Returns `None` when the denominator is zero.
pub fn sampson_residual(m: &Matrix3<f64>, a: Vector3<f64>, b: Vector3<f64>) -> Option<f64> {
    let ma = m * a;
    let mtb = m.tr_mul(&b);
    let denominator = ma.x * ma.x + ma.y * ma.y + mtb.x * mtb.x + mtb.y * mtb.y;
    if denominator > 0.0 {
        Some(b.dot(&ma) / Float::sqrt(denominator))
    } else {
        None
    }
}

/// Computes the algebraic residual `|b^T M a|` of a correspondence `(a, b)` to the
/// two-view relation `m`.
///
/// This is cheap, but it depends on the scale of `m` and of the points.
pub fn algebraic_distance(m: &Matrix3<f64>, a: Vector3<f64>, b: Vector3<f64>) -> f64 {
    Float::abs(b.dot(&(m * a)))
}

/// Uses the Sampson distance in image space.
impl<P> Model<FeatureMatch<P>> for FundamentalMatrix
where
    P: ImagePoint,
{
    fn residual(&self, data: &FeatureMatch<P>) -> f64 {
        let FeatureMatch(a, b) = data;
        sampson_distance(&self.0, a.image_homogeneous(), b.image_homogeneous())
    }
}

/// Computes the similarity transform that moves the centroid of the points to the origin and
/// scales them so that their mean distance from the origin is `sqrt(2)`.
///
/// This conditioning step is what makes the linear fundamental matrix estimators stable in pixel
/// coordinates. Returns `None` if there are no points or all of them coincide.
///
/// ```
/// use cv_core::nalgebra::Point2;
/// use cv_pinhole::hartley_normalization;
/// let points = [Point2::new(10.0, 20.0), Point2::new(30.0, 20.0), Point2::new(20.0, 40.0)];
/// let t = hartley_normalization(points.iter().copied()).unwrap();
/// let mean_distance = points
///     .iter()
///     .map(|p| Point2::from_homogeneous(t * p.to_homogeneous()).unwrap().coords.norm())
///     .sum::<f64>()
///     / 3.0;
/// assert!((mean_distance - 2.0f64.sqrt()).abs() < 1e-12);
/// ```
pub fn hartley_normalization(points: impl Iterator<Item = Point2<f64>> + Clone) -> Option<Matrix3<f64>> {
    let (sum, count) = points
        .clone()
        .fold((Vector3::zeros(), 0usize), |(sum, count), p| {
            (sum + p.coords.push(0.0), count + 1)
        });
    if count == 0 {
        return None;
    }
    let centroid = sum.xy() / count as f64;
    let mean_distance = points.map(|p| (p.coords - centroid).norm()).sum::<f64>() / count as f64;
    if !(mean_distance > 0.0 && mean_distance.is_finite()) {
        return None;
    }
    let scale = Float::sqrt(2.0) / mean_distance;
    Some(Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}
