//! Scale and similarity transforms between two images estimated from two correspondences.
//!
//! These are the smallest motion models that still carry a relative scale, which makes them useful
//! for checking how a feature track grows or shrinks between frames. Both estimators need exactly
//! two correspondences, and both refuse to produce a model when the vector between the two points
//! has zero length in either image, since the relative scale is undefined there.

use cv_core::{
    nalgebra::{Point2, Rotation2, Vector2},
    sample_consensus::{Estimator, Model},
    FeatureMatch, ImagePoint,
};
use num_traits::Float;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Maps a point `a` in the first image onto `b = scale * a + translation` in the second image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ScaleTranslate {
    pub scale: f64,
    pub translation: Vector2<f64>,
}

impl ScaleTranslate {
    pub fn transform(&self, point: Point2<f64>) -> Point2<f64> {
        point * self.scale + self.translation
    }
}

impl<P: ImagePoint> Model<FeatureMatch<P>> for ScaleTranslate {
    /// The squared distance between the transferred first point and the second point.
    fn residual(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        (self.transform(a.image_point()) - b.image_point()).norm_squared()
    }
}

/// Maps a point `a` in the first image onto `b = scale * R(angle) * a + translation` in the
/// second image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ScaleTranslateRotate {
    pub scale: f64,
    /// Counter-clockwise rotation in radians.
    pub angle: f64,
    pub translation: Vector2<f64>,
}

impl ScaleTranslateRotate {
    pub fn transform(&self, point: Point2<f64>) -> Point2<f64> {
        Rotation2::new(self.angle) * point * self.scale + self.translation
    }
}

impl<P: ImagePoint> Model<FeatureMatch<P>> for ScaleTranslateRotate {
    /// The squared distance between the transferred first point and the second point.
    fn residual(&self, FeatureMatch(a, b): &FeatureMatch<P>) -> f64 {
        (self.transform(a.image_point()) - b.image_point()).norm_squared()
    }
}

/// The vectors between the two points of a pair of correspondences in each image, together with
/// the first correspondence. `None` when either vector is (nearly) zero length.
fn pair_vectors<P: ImagePoint>(
    mut data: impl Iterator<Item = FeatureMatch<P>>,
    epsilon: f64,
) -> Option<(Point2<f64>, Point2<f64>, Vector2<f64>, Vector2<f64>)> {
    let FeatureMatch(a0, b0) = data.next()?;
    let FeatureMatch(a1, b1) = data.next()?;
    let (a0, b0) = (a0.image_point(), b0.image_point());
    let (a1, b1) = (a1.image_point(), b1.image_point());
    let va = a1 - a0;
    let vb = b1 - b0;
    if va.norm() <= epsilon || vb.norm() <= epsilon {
        log::trace!("zero length correspondence vector, scale is undefined");
        return None;
    }
    Some((a0, b0, va, vb))
}

/// Estimates a [`ScaleTranslate`] from two correspondences.
///
/// ```
/// use cv_core::nalgebra::Point2;
/// use cv_core::sample_consensus::Estimator;
/// use cv_core::{FeatureMatch, KeyPoint};
/// use cv_geom::similarity::ScaleTranslateEstimator;
///
/// let data = [
///     FeatureMatch(KeyPoint(Point2::new(1.0, 1.0)), KeyPoint(Point2::new(12.0, 2.0))),
///     FeatureMatch(KeyPoint(Point2::new(3.0, 2.0)), KeyPoint(Point2::new(16.0, 4.0))),
/// ];
/// let model = ScaleTranslateEstimator::new().estimate(data.iter().copied()).unwrap();
/// assert!((model.scale - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTranslateEstimator {
    epsilon: f64,
}

impl ScaleTranslateEstimator {
    pub fn new() -> Self {
        Default::default()
    }

    /// The length below which a vector between the two correspondences counts as zero.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl Default for ScaleTranslateEstimator {
    fn default() -> Self {
        Self { epsilon: 0.0 }
    }
}

impl<P: ImagePoint> Estimator<FeatureMatch<P>> for ScaleTranslateEstimator {
    type Model = ScaleTranslate;
    type ModelIter = Option<ScaleTranslate>;
    const MIN_SAMPLES: usize = 2;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<P>> + Clone,
    {
        let (a0, b0, va, vb) = pair_vectors(data, self.epsilon)?;
        let scale = vb.norm() / va.norm();
        if !scale.is_finite() {
            return None;
        }
        Some(ScaleTranslate {
            scale,
            translation: b0 - a0 * scale,
        })
    }
}

/// Estimates a [`ScaleTranslateRotate`] from two correspondences.
///
/// The rotation is the angle between the vectors joining the two points in each image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTranslateRotateEstimator {
    epsilon: f64,
}

impl ScaleTranslateRotateEstimator {
    pub fn new() -> Self {
        Default::default()
    }

    /// The length below which a vector between the two correspondences counts as zero.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl Default for ScaleTranslateRotateEstimator {
    fn default() -> Self {
        Self { epsilon: 0.0 }
    }
}

impl<P: ImagePoint> Estimator<FeatureMatch<P>> for ScaleTranslateRotateEstimator {
    type Model = ScaleTranslateRotate;
    type ModelIter = Option<ScaleTranslateRotate>;
    const MIN_SAMPLES: usize = 2;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<P>> + Clone,
    {
        let (a0, b0, va, vb) = pair_vectors(data, self.epsilon)?;
        let scale = vb.norm() / va.norm();
        let angle = Float::atan2(vb.y, vb.x) - Float::atan2(va.y, va.x);
        if !scale.is_finite() || !angle.is_finite() {
            return None;
        }
        let rotated = Rotation2::new(angle) * a0 * scale;
        Some(ScaleTranslateRotate {
            scale,
            angle,
            translation: b0 - rotated,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cv_core::KeyPoint;

    fn matches(
        model: impl Fn(Point2<f64>) -> Point2<f64>,
        points: &[Point2<f64>],
    ) -> impl Iterator<Item = FeatureMatch<KeyPoint>> + Clone + '_ {
        let mapped: [Point2<f64>; 2] = [model(points[0]), model(points[1])];
        points
            .iter()
            .zip(mapped)
            .map(|(&a, b)| FeatureMatch(KeyPoint(a), KeyPoint(b)))
    }

    #[test]
    fn recovers_scale_translate() {
        let truth = ScaleTranslate {
            scale: 0.75,
            translation: Vector2::new(-3.0, 14.0),
        };
        let points = [Point2::new(10.0, 20.0), Point2::new(-5.0, 40.0)];
        let model = ScaleTranslateEstimator::new()
            .estimate(matches(|p| truth.transform(p), &points))
            .unwrap();
        assert!((model.scale - truth.scale).abs() < 1e-12);
        assert!((model.translation - truth.translation).norm() < 1e-10);
        let probe = FeatureMatch(
            KeyPoint(Point2::new(7.0, 7.0)),
            KeyPoint(truth.transform(Point2::new(7.0, 7.0))),
        );
        assert!(model.residual(&probe) < 1e-18);
    }

    #[test]
    fn recovers_scale_translate_rotate() {
        let truth = ScaleTranslateRotate {
            scale: 1.5,
            angle: 0.4,
            translation: Vector2::new(2.0, -1.0),
        };
        let points = [Point2::new(1.0, 2.0), Point2::new(4.0, -3.0)];
        let model = ScaleTranslateRotateEstimator::new()
            .estimate(matches(|p| truth.transform(p), &points))
            .unwrap();
        assert!((model.scale - truth.scale).abs() < 1e-12);
        assert!((model.angle - truth.angle).abs() < 1e-12);
        let probe = Point2::new(-6.0, 3.0);
        assert!((model.transform(probe) - truth.transform(probe)).norm() < 1e-10);
    }

    #[test]
    fn points_at_origin_fail() {
        let origin = KeyPoint(Point2::origin());
        let data = [FeatureMatch(origin, origin), FeatureMatch(origin, origin)];
        assert!(ScaleTranslateEstimator::new()
            .estimate(data.iter().copied())
            .is_none());
        assert!(ScaleTranslateRotateEstimator::new()
            .estimate(data.iter().copied())
            .is_none());
    }

    #[test]
    fn collapsed_second_image_fails() {
        let data = [
            FeatureMatch(KeyPoint(Point2::new(1.0, 0.0)), KeyPoint(Point2::new(3.0, 3.0))),
            FeatureMatch(KeyPoint(Point2::new(0.0, 1.0)), KeyPoint(Point2::new(3.0, 3.0))),
        ];
        assert!(ScaleTranslateEstimator::new()
            .estimate(data.iter().copied())
            .is_none());
    }
}
