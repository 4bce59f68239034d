//! Distance functions scoring correspondences against two-view models.
//!
//! These implement [`DistanceFromModel`], so a model is bound once and then any number of
//! correspondences are scored without allocating.

use core::marker::PhantomData;
use cv_core::{
    nalgebra::Matrix3, Bearing, CameraModel, CameraToCamera, DistanceFromModel, FeatureMatch,
    ImagePoint, Pose, Projective, SetModel, TriangulatorRelative,
};
use cv_pinhole::{
    algebraic_distance, sampson_distance, CameraIntrinsics, EssentialMatrix, FundamentalMatrix,
    NormalizedKeyPoint,
};

/// The Sampson distance (first order geometric error) of a correspondence to an epipolar matrix.
///
/// `M` is either a [`FundamentalMatrix`], in which case the correspondence is in pixels, or an
/// [`EssentialMatrix`], in which case it can be any bearing (normalized keypoints give the
/// distance on the virtual image plane). See [`sampson_distance`] for the formula. Scaling the
/// model does not change the distance.
///
/// ```
/// use cv_core::nalgebra::{Matrix3, Point2};
/// use cv_core::{DistanceFromModel, FeatureMatch, KeyPoint, SetModel};
/// use cv_geom::residual::SampsonDistance;
/// use cv_pinhole::FundamentalMatrix;
///
/// let f = FundamentalMatrix(Matrix3::new(0.0, -1e-4, 0.01, 1e-4, 0.0, -0.02, -0.01, 0.02, 0.0));
/// let data = FeatureMatch(KeyPoint(Point2::new(100.0, 50.0)), KeyPoint(Point2::new(110.0, 52.0)));
/// let mut sampson = SampsonDistance::default();
/// sampson.set_model(&f);
/// let d = sampson.distance(&data);
/// sampson.set_model(&FundamentalMatrix(f.0 * 25.0));
/// assert!((sampson.distance(&data) - d).abs() <= 1e-12 * d.max(1.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampsonDistance<M> {
    model: Matrix3<f64>,
    _phantom: PhantomData<M>,
}

impl<M> Default for SampsonDistance<M> {
    fn default() -> Self {
        Self {
            model: Matrix3::zeros(),
            _phantom: PhantomData,
        }
    }
}

impl<M> SetModel<M> for SampsonDistance<M>
where
    M: Into<Matrix3<f64>> + Copy,
{
    fn set_model(&mut self, model: &M) {
        self.model = (*model).into();
    }
}

impl<P: ImagePoint> DistanceFromModel<FundamentalMatrix, FeatureMatch<P>>
    for SampsonDistance<FundamentalMatrix>
{
    fn distance(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        sampson_distance(&self.model, a.image_homogeneous(), b.image_homogeneous())
    }
}

impl<P: Bearing> DistanceFromModel<EssentialMatrix, FeatureMatch<P>>
    for SampsonDistance<EssentialMatrix>
{
    fn distance(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        sampson_distance(
            &self.model,
            a.bearing_unnormalized(),
            b.bearing_unnormalized(),
        )
    }
}

/// The algebraic residual `|b^T M a|` of a correspondence to an epipolar matrix.
///
/// This is the cheapest distance, but it is not invariant to the scale of the model or the
/// coordinates, so thresholds must be chosen with the normalization of the model in mind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgebraicDistance<M> {
    model: Matrix3<f64>,
    _phantom: PhantomData<M>,
}

impl<M> Default for AlgebraicDistance<M> {
    fn default() -> Self {
        Self {
            model: Matrix3::zeros(),
            _phantom: PhantomData,
        }
    }
}

impl<M> SetModel<M> for AlgebraicDistance<M>
where
    M: Into<Matrix3<f64>> + Copy,
{
    fn set_model(&mut self, model: &M) {
        self.model = (*model).into();
    }
}

impl<P: ImagePoint> DistanceFromModel<FundamentalMatrix, FeatureMatch<P>>
    for AlgebraicDistance<FundamentalMatrix>
{
    fn distance(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        algebraic_distance(&self.model, a.image_homogeneous(), b.image_homogeneous())
    }
}

impl<P: Bearing> DistanceFromModel<EssentialMatrix, FeatureMatch<P>>
    for AlgebraicDistance<EssentialMatrix>
{
    fn distance(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        algebraic_distance(
            &self.model,
            a.bearing_unnormalized(),
            b.bearing_unnormalized(),
        )
    }
}

/// Symmetric squared reprojection error of a correspondence under a relative pose.
///
/// The point is triangulated in the first camera with the candidate [`CameraToCamera`] and
/// reprojected into both views. The distance is the sum of both squared reprojection errors,
/// in normalized image coordinates, or in pixels when the intrinsics of both views are set with
/// [`DistanceSe3SymmetricSq::intrinsics`].
///
/// A correspondence that cannot be triangulated, or whose point lies at infinity or has a
/// non-positive depth in either view, scores `f64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSe3SymmetricSq<T> {
    triangulator: T,
    pose: CameraToCamera,
    intrinsics: Option<(CameraIntrinsics, CameraIntrinsics)>,
}

impl<T> DistanceSe3SymmetricSq<T> {
    /// Creates the distance function with the triangulator used to find the 3d point.
    pub fn new(triangulator: T) -> Self {
        Self {
            triangulator,
            pose: CameraToCamera::identity(),
            intrinsics: None,
        }
    }

    /// Measures the error in pixels using the intrinsics of the first and second views.
    #[must_use]
    pub fn intrinsics(self, first: CameraIntrinsics, second: CameraIntrinsics) -> Self {
        Self {
            intrinsics: Some((first, second)),
            ..self
        }
    }

    fn squared_error(
        &self,
        observed: NormalizedKeyPoint,
        projected: NormalizedKeyPoint,
        intrinsics: Option<&CameraIntrinsics>,
    ) -> f64 {
        match intrinsics {
            Some(intrinsics) => {
                (intrinsics.uncalibrate(observed).0 - intrinsics.uncalibrate(projected).0)
                    .norm_squared()
            }
            None => (observed.0 - projected.0).norm_squared(),
        }
    }
}

impl<T: Default> Default for DistanceSe3SymmetricSq<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> SetModel<CameraToCamera> for DistanceSe3SymmetricSq<T> {
    fn set_model(&mut self, model: &CameraToCamera) {
        self.pose = *model;
    }
}

impl<T> DistanceFromModel<CameraToCamera, FeatureMatch<NormalizedKeyPoint>>
    for DistanceSe3SymmetricSq<T>
where
    T: TriangulatorRelative,
{
    fn distance(&self, &FeatureMatch(a, b): &FeatureMatch<NormalizedKeyPoint>) -> f64 {
        let point_a = match self.triangulator.triangulate_relative(self.pose, a, b) {
            Some(point) => point,
            None => return f64::MAX,
        };
        let point_b = self.pose.transform(point_a);
        let (euclidean_a, euclidean_b) = match (point_a.point(), point_b.point()) {
            (Some(a), Some(b)) => (a, b),
            _ => return f64::MAX,
        };
        if euclidean_a.z <= 0.0 || euclidean_b.z <= 0.0 {
            return f64::MAX;
        }
        let projected_a = NormalizedKeyPoint((euclidean_a.coords.xy() / euclidean_a.z).into());
        let projected_b = NormalizedKeyPoint((euclidean_b.coords.xy() / euclidean_b.z).into());
        let (first, second) = match &self.intrinsics {
            Some((first, second)) => (Some(first), Some(second)),
            None => (None, None),
        };
        self.squared_error(a, projected_a, first) + self.squared_error(b, projected_b, second)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::triangulation::{DltTriangulator, PixelDepthTriangulator};
    use cv_core::nalgebra::{Point2, Point3, Rotation3, Vector2, Vector3, Vector4};
    use cv_core::{Bearing, CameraPoint, KeyPoint, TriangulatorObservations, WorldPoint, WorldToCamera};

    /// Triangulates every correspondence to the same point, in the frame of the first camera.
    struct Fixed(WorldPoint);

    impl TriangulatorObservations for Fixed {
        fn triangulate_observations<B: Bearing>(
            &self,
            _: impl IntoIterator<Item = (WorldToCamera, B)>,
        ) -> Option<WorldPoint> {
            Some(self.0)
        }
    }

    fn pose() -> CameraToCamera {
        CameraToCamera::from_parts(
            Vector3::new(0.5, 0.05, -0.1),
            Rotation3::from_euler_angles(0.02, -0.1, 0.04),
        )
    }

    fn observe(point: Point3<f64>) -> FeatureMatch<NormalizedKeyPoint> {
        let a = CameraPoint::from_point(point);
        let b = pose().transform(a);
        FeatureMatch(
            NormalizedKeyPoint::from_camera_point(a).unwrap(),
            NormalizedKeyPoint::from_camera_point(b).unwrap(),
        )
    }

    #[test]
    fn se3_distance_is_zero_for_exact_match() {
        let mut distance = DistanceSe3SymmetricSq::new(DltTriangulator::new());
        distance.set_model(&pose());
        assert!(distance.distance(&observe(Point3::new(0.2, 0.3, 4.0))) < 1e-16);
    }

    #[test]
    fn se3_distance_rejects_negative_depth() {
        let mut distance = DistanceSe3SymmetricSq::new(PixelDepthTriangulator::new());
        // The reversed translation places every point behind the cameras.
        distance.set_model(&CameraToCamera::from_parts(
            -pose().0.translation.vector,
            pose().0.rotation,
        ));
        let data = observe(Point3::new(0.2, 0.3, 4.0));
        assert_eq!(distance.distance(&data), f64::MAX);
    }

    #[test]
    fn se3_distance_rejects_point_behind_second_view() {
        let point = Point3::new(0.0, 0.0, 0.02);
        let behind = pose().transform(CameraPoint::from_point(point)).point().unwrap();
        assert!(behind.z < 0.0);
        let mut distance = DistanceSe3SymmetricSq::new(Fixed(WorldPoint::from_point(point)));
        distance.set_model(&pose());
        let data = observe(Point3::new(0.2, 0.3, 4.0));
        assert_eq!(distance.distance(&data), f64::MAX);
    }

    #[test]
    fn se3_distance_rejects_point_at_infinity() {
        let mut distance =
            DistanceSe3SymmetricSq::new(Fixed(WorldPoint(Vector4::new(0.1, 0.2, 1.0, 0.0))));
        distance.set_model(&pose());
        let data = observe(Point3::new(0.2, 0.3, 4.0));
        assert_eq!(distance.distance(&data), f64::MAX);
    }

    #[test]
    fn se3_distance_in_pixels() {
        let intrinsics = CameraIntrinsics::identity()
            .focals(Vector2::new(800.0, 800.0))
            .principal_point(Point2::new(320.0, 240.0));
        let mut normalized = DistanceSe3SymmetricSq::new(DltTriangulator::new());
        let mut pixels = DistanceSe3SymmetricSq::new(DltTriangulator::new()).intrinsics(intrinsics, intrinsics);
        normalized.set_model(&pose());
        pixels.set_model(&pose());
        let FeatureMatch(a, b) = observe(Point3::new(-0.4, 0.1, 3.0));
        let noisy = FeatureMatch(NormalizedKeyPoint(a.0 + Vector2::new(1e-3, 0.0)), b);
        let d_normalized = normalized.distance(&noisy);
        let d_pixels = pixels.distance(&noisy);
        assert!(d_normalized > 0.0);
        assert!((d_pixels / d_normalized - 800.0 * 800.0).abs() < 1e-3 * 800.0 * 800.0);
    }

    #[test]
    fn sampson_and_algebraic_on_essential() {
        let essential = EssentialMatrix::from(pose());
        let data = observe(Point3::new(0.1, -0.2, 5.0));
        let mut sampson = SampsonDistance::<EssentialMatrix>::default();
        let mut algebraic = AlgebraicDistance::<EssentialMatrix>::default();
        sampson.set_model(&essential);
        algebraic.set_model(&essential);
        assert!(sampson.distance(&data) < 1e-20);
        assert!(algebraic.distance(&data) < 1e-10);

        let FeatureMatch(a, b) = data;
        let off = FeatureMatch(a, NormalizedKeyPoint(b.0 + Vector2::new(0.0, 0.01)));
        assert!(sampson.distance(&off) > 0.0);
        let mut distances = [0.0; 2];
        sampson.distances(&[data, off], &mut distances);
        assert!(distances[0] < distances[1]);
    }

    #[test]
    fn sampson_on_fundamental_pixels() {
        let f = FundamentalMatrix(Matrix3::new(0.0, -1e-4, 0.01, 1e-4, 0.0, -0.02, -0.01, 0.02, 0.0));
        let mut sampson = SampsonDistance::<FundamentalMatrix>::default();
        sampson.set_model(&f);
        let data = FeatureMatch(KeyPoint(Point2::new(10.0, 5.0)), KeyPoint(Point2::new(12.0, 7.0)));
        assert!(sampson.distance(&data) >= 0.0);
    }
}
