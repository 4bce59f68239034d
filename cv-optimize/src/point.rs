use crate::{ConvergeSettings, RefineError, Refinement};
use cv_core::{
    nalgebra::{
        storage::Owned, Const, DVector, Dynamic, Matrix2x4, Matrix3, Matrix3x4, OMatrix, Point2, Point3,
        Vector2, Vector3, Vector4, U3, U4,
    },
    Bearing, CameraMatrix, CameraPoint, ImagePoint, Pose, Projective, WorldPoint, WorldToCamera,
};
use cv_pinhole::{sampson_residual, EssentialMatrix};
use levenberg_marquardt::LeastSquaresProblem;

/// Projects a homogeneous point with a camera matrix.
///
/// Returns the difference to the observed image point and its derivative by the four homogeneous
/// coordinates. Fails when the point projects to infinity.
fn reprojection(
    camera: &Matrix3x4<f64>,
    point: &Vector4<f64>,
    observed: &Point2<f64>,
) -> Option<(Vector2<f64>, Matrix2x4<f64>)> {
    let projected = camera * point;
    if projected.z == 0.0 {
        return None;
    }
    let u = projected.x / projected.z;
    let v = projected.y / projected.z;
    let depth_row = camera.row(2);
    let jacobian = Matrix2x4::from_rows(&[
        (camera.row(0) - depth_row * u) / projected.z,
        (camera.row(1) - depth_row * v) / projected.z,
    ]);
    Some((Vector2::new(u - observed.x, v - observed.y), jacobian))
}

/// Converts calibrated observations into camera matrices and points on the virtual image plane.
fn calibrated_views<B: Bearing>(
    observations: &[(WorldToCamera, B)],
) -> Result<Vec<(Matrix3x4<f64>, Point2<f64>)>, RefineError> {
    observations
        .iter()
        .map(|(pose, bearing)| {
            Point2::from_homogeneous(bearing.bearing_unnormalized())
                .map(|observed| (pose.matrix3x4(), observed))
                .ok_or(RefineError::Degenerate)
        })
        .collect()
}

/// Reprojection residuals of a homogeneous point, two per view.
struct HomogeneousProblem<'a> {
    views: &'a [(Matrix3x4<f64>, Point2<f64>)],
    point: Vector4<f64>,
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U4> for HomogeneousProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U4>;
    type ParameterStorage = Owned<f64, U4>;

    fn set_params(&mut self, x: &Vector4<f64>) {
        self.point = *x;
    }

    fn params(&self) -> Vector4<f64> {
        self.point
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut residuals = DVector::zeros(2 * self.views.len());
        for (ix, (camera, observed)) in self.views.iter().enumerate() {
            let (residual, _) = reprojection(camera, &self.point, observed)?;
            residuals.fixed_rows_mut::<2>(2 * ix).copy_from(&residual);
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U4>> {
        let mut jacobian =
            OMatrix::<f64, Dynamic, U4>::zeros_generic(Dynamic::new(2 * self.views.len()), Const::<4>);
        for (ix, (camera, observed)) in self.views.iter().enumerate() {
            let (_, derivative) = reprojection(camera, &self.point, observed)?;
            jacobian
                .fixed_slice_mut::<2, 4>(2 * ix, 0)
                .copy_from(&derivative);
        }
        Some(jacobian)
    }
}

/// Reprojection residuals of a euclidean point, two per view.
struct EuclideanProblem<'a> {
    views: &'a [(Matrix3x4<f64>, Point2<f64>)],
    point: Vector3<f64>,
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U3> for EuclideanProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, x: &Vector3<f64>) {
        self.point = *x;
    }

    fn params(&self) -> Vector3<f64> {
        self.point
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let point = self.point.push(1.0);
        let mut residuals = DVector::zeros(2 * self.views.len());
        for (ix, (camera, observed)) in self.views.iter().enumerate() {
            let (residual, _) = reprojection(camera, &point, observed)?;
            residuals.fixed_rows_mut::<2>(2 * ix).copy_from(&residual);
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U3>> {
        let point = self.point.push(1.0);
        let mut jacobian =
            OMatrix::<f64, Dynamic, U3>::zeros_generic(Dynamic::new(2 * self.views.len()), Const::<3>);
        for (ix, (camera, observed)) in self.views.iter().enumerate() {
            let (_, derivative) = reprojection(camera, &point, observed)?;
            jacobian
                .fixed_slice_mut::<2, 3>(2 * ix, 0)
                .copy_from(&derivative.fixed_slice::<2, 3>(0, 0));
        }
        Some(jacobian)
    }
}

fn refine_homogeneous(
    converge: &ConvergeSettings,
    initial: WorldPoint,
    views: &[(Matrix3x4<f64>, Point2<f64>)],
) -> Result<Refinement<WorldPoint>, RefineError> {
    if views.len() < 2 {
        return Err(RefineError::Degenerate);
    }
    let problem = HomogeneousProblem {
        views,
        point: initial.normalized().homogeneous(),
    };
    let (problem, report) = converge.levenberg_marquardt(views.len()).minimize(problem);
    let point = problem.point;
    if !point.iter().all(|n| n.is_finite()) {
        return Err(RefineError::NonFinite);
    }
    if point.norm() == 0.0 {
        return Err(RefineError::Degenerate);
    }
    Ok(Refinement::from_report(WorldPoint(point).normalized(), report))
}

/// Refines a euclidean point by minimizing its reprojection error on the virtual image plane of
/// every calibrated view.
///
/// The observations are the world to camera poses and the bearings of the point in each view.
/// The three coordinates of the point are the parameters and the jacobian is analytic.
///
/// ```
/// use cv_core::nalgebra::{Point3, Rotation3, Vector3};
/// use cv_core::{Pose, Projective, WorldPoint, WorldToCamera};
/// use cv_optimize::RefineMetric;
///
/// let point = WorldPoint::from_point(Point3::new(0.3, -0.2, 5.0));
/// let observations: Vec<_> = [
///     WorldToCamera::identity(),
///     WorldToCamera::from_parts(Vector3::new(-1.0, 0.1, 0.0), Rotation3::new(Vector3::new(0.0, 0.1, 0.0))),
/// ]
/// .iter()
/// .map(|&pose| (pose, pose.transform(point).bearing()))
/// .collect();
/// let initial = WorldPoint::from_point(Point3::new(0.9, -0.2, 5.0));
/// let refined = RefineMetric::new().refine(initial, &observations).unwrap();
/// let error = (refined.estimate.point().unwrap() - point.point().unwrap()).norm();
/// assert!(error < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefineMetric {
    converge: ConvergeSettings,
}

impl RefineMetric {
    pub fn new() -> Self {
        Default::default()
    }

    /// Default: [`ConvergeSettings::default`]
    #[must_use]
    pub fn settings(self, converge: ConvergeSettings) -> Self {
        Self { converge }
    }

    /// Refines `initial` against two or more observations.
    ///
    /// Fails if `initial` is at infinity, if there are fewer than two observations or a bearing
    /// is perpendicular to the optical axis, or if the refined point is not finite.
    pub fn refine<B: Bearing>(
        &self,
        initial: WorldPoint,
        observations: &[(WorldToCamera, B)],
    ) -> Result<Refinement<WorldPoint>, RefineError> {
        let initial = initial.point().ok_or(RefineError::PointAtInfinity)?;
        let views = calibrated_views(observations)?;
        if views.len() < 2 {
            return Err(RefineError::Degenerate);
        }
        let problem = EuclideanProblem {
            views: &views,
            point: initial.coords,
        };
        let (problem, report) = self.converge.levenberg_marquardt(views.len()).minimize(problem);
        let point = problem.point;
        if !point.iter().all(|n| n.is_finite()) {
            return Err(RefineError::NonFinite);
        }
        Ok(Refinement::from_report(
            WorldPoint::from_point(Point3::from(point)),
            report,
        ))
    }
}

/// Refines a homogeneous point by minimizing its reprojection error in every calibrated view.
///
/// This is [`RefineMetric`] with the four homogeneous coordinates as the parameters, so distant
/// points and points at infinity are refined without dividing by `w`. The result is scaled to unit
/// norm with a non-negative `w`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefineMetricHomogeneous {
    converge: ConvergeSettings,
}

impl RefineMetricHomogeneous {
    pub fn new() -> Self {
        Default::default()
    }

    /// Default: [`ConvergeSettings::default`]
    #[must_use]
    pub fn settings(self, converge: ConvergeSettings) -> Self {
        Self { converge }
    }

    /// Refines `initial` against two or more observations.
    pub fn refine<B: Bearing>(
        &self,
        initial: WorldPoint,
        observations: &[(WorldToCamera, B)],
    ) -> Result<Refinement<WorldPoint>, RefineError> {
        let views = calibrated_views(observations)?;
        refine_homogeneous(&self.converge, initial, &views)
    }
}

/// Refines a homogeneous point by minimizing its reprojection error in pixels given the camera
/// matrices of uncalibrated views.
///
/// The result is scaled to unit norm with a non-negative `w`, like the output of
/// [`ProjectiveDlt`](cv_geom::triangulation::ProjectiveDlt).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefineProjective {
    converge: ConvergeSettings,
}

impl RefineProjective {
    pub fn new() -> Self {
        Default::default()
    }

    /// Default: [`ConvergeSettings::default`]
    #[must_use]
    pub fn settings(self, converge: ConvergeSettings) -> Self {
        Self { converge }
    }

    /// Refines `initial` against two or more observations.
    pub fn refine<P: ImagePoint>(
        &self,
        initial: WorldPoint,
        observations: &[(CameraMatrix, P)],
    ) -> Result<Refinement<WorldPoint>, RefineError> {
        let views: Vec<(Matrix3x4<f64>, Point2<f64>)> = observations
            .iter()
            .map(|(camera, observed)| (camera.0, observed.image_point()))
            .collect();
        refine_homogeneous(&self.converge, initial, &views)
    }
}

/// Residuals of a point in the reference camera against its observations.
struct EpipolarProblem<'a> {
    reference: Point2<f64>,
    views: &'a [(Matrix3<f64>, Vector3<f64>)],
    point: Vector3<f64>,
}

impl<'a> EpipolarProblem<'a> {
    fn residuals_at(&self, point: &Vector3<f64>) -> Option<DVector<f64>> {
        let projected = Point2::from_homogeneous(*point)?;
        let homogeneous = projected.coords.push(1.0);
        let mut residuals = DVector::zeros(2 + self.views.len());
        residuals[0] = projected.x - self.reference.x;
        residuals[1] = projected.y - self.reference.y;
        for (ix, (essential, observed)) in self.views.iter().enumerate() {
            residuals[2 + ix] = sampson_residual(essential, homogeneous, *observed)?;
        }
        Some(residuals)
    }
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U3> for EpipolarProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, x: &Vector3<f64>) {
        self.point = *x;
    }

    fn params(&self) -> Vector3<f64> {
        self.point
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.point)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U3>> {
        let base = self.residuals_at(&self.point)?;
        let mut jacobian = OMatrix::<f64, Dynamic, U3>::zeros_generic(Dynamic::new(base.len()), Const::<3>);
        for parameter in 0..3 {
            let step = 1e-8 * self.point[parameter].abs().max(1.0);
            let mut moved = self.point;
            moved[parameter] += step;
            let column = (self.residuals_at(&moved)? - &base) / step;
            jacobian.set_column(parameter, &column);
        }
        Some(jacobian)
    }
}

/// Refines a point in the reference camera so that its reference observation agrees with the
/// epipolar lines of its observations in the other views.
///
/// Each other view is given by the essential matrix `E` from the reference camera to it, such
/// that `b^T E a = 0` for a reference bearing `a` and a bearing `b` in that view. The residuals
/// are the reprojection error in the reference view and the signed Sampson error of every other
/// view, so the refined point moves across the rays but the essential matrices leave its depth
/// along the ray unconstrained. The depth of the initial estimate is therefore kept up to the
/// first order. The jacobian is found by forward differences.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefineEpipolar {
    converge: ConvergeSettings,
}

impl RefineEpipolar {
    pub fn new() -> Self {
        Default::default()
    }

    /// Default: [`ConvergeSettings::default`]
    #[must_use]
    pub fn settings(self, converge: ConvergeSettings) -> Self {
        Self { converge }
    }

    /// Refines `initial` given its observation in the reference view and at least one other view.
    pub fn refine<A: Bearing, B: Bearing>(
        &self,
        initial: CameraPoint,
        reference: A,
        views: &[(EssentialMatrix, B)],
    ) -> Result<Refinement<CameraPoint>, RefineError> {
        let initial = initial.point().ok_or(RefineError::PointAtInfinity)?;
        let reference = Point2::from_homogeneous(reference.bearing_unnormalized())
            .ok_or(RefineError::Degenerate)?;
        if views.is_empty() {
            return Err(RefineError::Degenerate);
        }
        let views: Vec<(Matrix3<f64>, Vector3<f64>)> = views
            .iter()
            .map(|(essential, bearing)| (essential.0, bearing.bearing_unnormalized()))
            .collect();
        let problem = EpipolarProblem {
            reference,
            views: &views,
            point: initial.coords,
        };
        let (problem, report) = self
            .converge
            .levenberg_marquardt(views.len() + 1)
            .minimize(problem);
        let point = problem.point;
        if !point.iter().all(|n| n.is_finite()) {
            return Err(RefineError::NonFinite);
        }
        Ok(Refinement::from_report(
            CameraPoint::from_point(Point3::from(point)),
            report,
        ))
    }
}
