use crate::{constrained_solution, epipole_map, tensor_from, Conditioning, TrifocalLinearPoint7};
use cv_core::{
    nalgebra::{storage::Owned, Const, DMatrix, DVector, Dynamic, OMatrix, Vector3, Vector6, U6},
    sample_consensus::Estimator,
    FeatureTriple, ImagePoint,
};
use cv_geom::trifocal::TrifocalTensor;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};

/// Minimizes the algebraic error of the consistent tensor over the two epipoles.
///
/// The tensor for given epipoles is the linear least squares solution among the tensors of cameras
/// with those epipoles, so only six parameters are searched.
struct EpipoleProblem<'a> {
    rows: &'a DMatrix<f64>,
    normal: &'a DMatrix<f64>,
    /// Fixes the sign of the solution so that the residuals are continuous in the parameters.
    reference: DVector<f64>,
    epipoles: Vector6<f64>,
    epsilon: f64,
    max_iterations: usize,
}

impl<'a> EpipoleProblem<'a> {
    fn tensor_at(&self, epipoles: &Vector6<f64>) -> Option<DVector<f64>> {
        let e2 = Vector3::new(epipoles[0], epipoles[1], epipoles[2]).try_normalize(0.0)?;
        let e3 = Vector3::new(epipoles[3], epipoles[4], epipoles[5]).try_normalize(0.0)?;
        let mut solution =
            constrained_solution(self.normal, epipole_map(&e2, &e3), self.epsilon, self.max_iterations)?;
        if solution.dot(&self.reference) < 0.0 {
            solution.neg_mut();
        }
        Some(solution)
    }

    fn residuals_at(&self, epipoles: &Vector6<f64>) -> Option<DVector<f64>> {
        Some(self.rows * self.tensor_at(epipoles)?)
    }
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U6> for EpipoleProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U6>;
    type ParameterStorage = Owned<f64, U6>;

    fn set_params(&mut self, x: &Vector6<f64>) {
        self.epipoles = *x;
    }

    fn params(&self) -> Vector6<f64> {
        self.epipoles
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.epipoles)
    }

    /// Forward differences, since the tensor depends on the epipoles through a decomposition.
    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U6>> {
        let base = self.residuals_at(&self.epipoles)?;
        let mut jacobian = OMatrix::<f64, Dynamic, U6>::zeros_generic(Dynamic::new(base.len()), Const::<6>);
        for parameter in 0..6 {
            let step = 1e-7 * self.epipoles[parameter].abs().max(1.0);
            let mut moved = self.epipoles;
            moved[parameter] += step;
            let column = (self.residuals_at(&moved)? - &base) / step;
            jacobian.set_column(parameter, &column);
        }
        Some(jacobian)
    }
}

/// Estimates the trifocal tensor from seven or more point triples by minimizing the algebraic error
/// over geometrically consistent tensors.
///
/// The epipoles of the linear solution are the initial guess. Levenberg-Marquardt then adjusts
/// them, re-solving the tensor of cameras with the current epipoles at every step. The result is
/// always consistent with a set of cameras and its algebraic error is never above that of
/// [`TrifocalLinearPoint7`] with enforcement.
#[derive(Debug, Clone, Copy)]
pub struct TrifocalAlgebraicPoint7 {
    linear: TrifocalLinearPoint7,
    ftol: f64,
    gtol: f64,
    patience: usize,
}

impl TrifocalAlgebraicPoint7 {
    pub fn new() -> Self {
        Default::default()
    }

    /// The linear estimator giving the initial epipoles and its decomposition settings.
    ///
    /// Enforcement on the linear estimator is ignored, the epipoles always come from the
    /// unconstrained solution.
    #[must_use]
    pub fn linear(self, linear: TrifocalLinearPoint7) -> Self {
        Self { linear, ..self }
    }

    /// Relative reduction of the algebraic error below which the search stops.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }

    /// Default: `1e-12`
    #[must_use]
    pub fn gtol(self, gtol: f64) -> Self {
        Self { gtol, ..self }
    }

    /// Bounds the residual evaluations to `patience * 7`.
    ///
    /// Default: `100`
    #[must_use]
    pub fn patience(self, patience: usize) -> Self {
        Self { patience, ..self }
    }

    /// Estimates the tensor from seven or more triples.
    ///
    /// Fails in the same cases as [`TrifocalLinearPoint7::from_triples`].
    pub fn from_triples<P: ImagePoint>(&self, triples: &[FeatureTriple<P>]) -> Option<TrifocalTensor> {
        self.search(triples).map(|estimate| estimate.tensor)
    }

    /// Like [`TrifocalAlgebraicPoint7::from_triples`], but also reports how the epipole search
    /// terminated.
    ///
    /// The tensor of the last epipoles is returned even when the search did not converge.
    pub fn search<P: ImagePoint>(&self, triples: &[FeatureTriple<P>]) -> Option<AlgebraicEstimate> {
        if triples.len() < 7 {
            return None;
        }
        let linear = &self.linear;
        let conditioning = Conditioning::new(triples)?;
        let normal = conditioning.normal(triples);
        let rows = conditioning.rows(triples);
        let initial = linear.linear(&normal)?;
        let (e2, e3) = initial.epipoles(linear.epsilon, linear.max_iterations)?;
        let reference = linear.consistent(&normal, &e2, &e3)?.to_vector();
        let problem = EpipoleProblem {
            rows: &rows,
            normal: &normal,
            reference: DVector::from_column_slice(reference.as_slice()),
            epipoles: Vector6::new(e2.x, e2.y, e2.z, e3.x, e3.y, e3.z),
            epsilon: linear.epsilon,
            max_iterations: linear.max_iterations,
        };
        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_gtol(self.gtol)
            .with_patience(self.patience)
            .minimize(problem);
        log::debug!(
            "trifocal algebraic search terminated with {:?} after {} evaluations, objective {}",
            report.termination,
            report.number_of_evaluations,
            report.objective_function
        );
        let solution = problem.tensor_at(&problem.epipoles)?;
        Some(AlgebraicEstimate {
            tensor: conditioning.restore(&tensor_from(&solution))?,
            converged: report.termination.was_successful(),
            termination: report.termination,
            evaluations: report.number_of_evaluations,
        })
    }
}

/// The result of [`TrifocalAlgebraicPoint7::search`].
#[derive(Debug)]
pub struct AlgebraicEstimate {
    /// The estimated tensor, with unit norm.
    pub tensor: TrifocalTensor,
    /// Whether the epipole search met one of its tolerances.
    pub converged: bool,
    pub termination: TerminationReason,
    /// The number of residual evaluations.
    pub evaluations: usize,
}

impl Default for TrifocalAlgebraicPoint7 {
    fn default() -> Self {
        Self {
            linear: TrifocalLinearPoint7::new(),
            ftol: 1e-12,
            gtol: 1e-12,
            patience: 100,
        }
    }
}

impl<P> Estimator<FeatureTriple<P>> for TrifocalAlgebraicPoint7
where
    P: ImagePoint,
{
    type Model = TrifocalTensor;
    type ModelIter = Option<TrifocalTensor>;
    const MIN_SAMPLES: usize = 7;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureTriple<P>> + Clone,
    {
        let triples: Vec<FeatureTriple<P>> = data.collect();
        self.from_triples(&triples)
    }
}
