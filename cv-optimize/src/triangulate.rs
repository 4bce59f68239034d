use crate::{RefineError, RefineMetric, RefineMetricHomogeneous, Refinement};
use cv_core::{
    nalgebra::UnitVector3, Bearing, TriangulatorObservations, WorldPoint, WorldToCamera,
};

/// Refines a point given calibrated observations of it.
pub trait PointRefiner {
    fn refine_point<B: Bearing>(
        &self,
        initial: WorldPoint,
        observations: &[(WorldToCamera, B)],
    ) -> Result<Refinement<WorldPoint>, RefineError>;
}

impl PointRefiner for RefineMetric {
    fn refine_point<B: Bearing>(
        &self,
        initial: WorldPoint,
        observations: &[(WorldToCamera, B)],
    ) -> Result<Refinement<WorldPoint>, RefineError> {
        self.refine(initial, observations)
    }
}

impl PointRefiner for RefineMetricHomogeneous {
    fn refine_point<B: Bearing>(
        &self,
        initial: WorldPoint,
        observations: &[(WorldToCamera, B)],
    ) -> Result<Refinement<WorldPoint>, RefineError> {
        self.refine(initial, observations)
    }
}

/// A linear triangulation whose output is the initial estimate of a refinement.
///
/// The refinement only runs when the triangulation succeeds, and its outcome is the outcome of
/// the whole. As a [`TriangulatorObservations`] it returns the refined point whether or not the
/// minimizer converged.
///
/// ```
/// use cv_core::nalgebra::{Point3, Rotation3, Vector3};
/// use cv_core::{Pose, Projective, TriangulatorObservations, WorldPoint, WorldToCamera};
/// use cv_optimize::TriangulationSettings;
///
/// let point = WorldPoint::from_point(Point3::new(-0.4, 0.2, 6.0));
/// let poses = [
///     WorldToCamera::identity(),
///     WorldToCamera::from_parts(Vector3::new(-0.5, 0.0, 0.1), Rotation3::new(Vector3::new(0.0, 0.05, 0.0))),
///     WorldToCamera::from_parts(Vector3::new(0.5, 0.2, 0.0), Rotation3::new(Vector3::new(0.02, -0.05, 0.0))),
/// ];
/// let triangulated = TriangulationSettings::default()
///     .metric()
///     .triangulate_observations(poses.iter().map(|&pose| (pose, pose.transform(point).bearing())))
///     .unwrap();
/// assert!((triangulated.point().unwrap() - point.point().unwrap()).norm() < 1e-8);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriangulateThenRefine<T, R> {
    triangulator: T,
    refiner: R,
}

impl<T, R> TriangulateThenRefine<T, R>
where
    T: TriangulatorObservations,
    R: PointRefiner,
{
    pub fn new(triangulator: T, refiner: R) -> Self {
        Self {
            triangulator,
            refiner,
        }
    }

    pub fn triangulator(&self) -> &T {
        &self.triangulator
    }

    pub fn refiner(&self) -> &R {
        &self.refiner
    }

    /// Triangulates and refines, keeping the convergence information.
    ///
    /// Returns `None` if the linear triangulation fails or the refinement returns an error.
    pub fn triangulate_refined<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<Refinement<WorldPoint>> {
        let observations: Vec<(WorldToCamera, UnitVector3<f64>)> = pairs
            .into_iter()
            .map(|(pose, bearing)| (pose, bearing.bearing()))
            .collect();
        let initial = self
            .triangulator
            .triangulate_observations(observations.iter().copied())?;
        match self.refiner.refine_point(initial, &observations) {
            Ok(refinement) => Some(refinement),
            Err(e) => {
                log::debug!("refinement of the triangulated point failed: {}", e);
                None
            }
        }
    }
}

impl<T, R> TriangulatorObservations for TriangulateThenRefine<T, R>
where
    T: TriangulatorObservations,
    R: PointRefiner,
{
    fn triangulate_observations<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<WorldPoint> {
        self.triangulate_refined(pairs)
            .map(|refinement| refinement.estimate)
    }
}
