use crate::{ConvergeSettings, RefineError, Refinement};
use cv_core::{
    nalgebra::{storage::Owned, Const, DVector, Dynamic, Matrix3, OMatrix, SVector, Vector3, U9},
    FeatureMatch, ImagePoint, ModelRefiner,
};
use cv_pinhole::FundamentalMatrix;
use levenberg_marquardt::LeastSquaresProblem;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The residual minimized by [`RefineFundamental`].
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpipolarResidual {
    /// The signed square root of the Sampson distance, in pixels.
    Sampson,
    /// `x2^T F x1` with `F` scaled to unit frobenius norm.
    Algebraic,
}

/// One residual and its derivative by the nine entries of `F` in column major order.
fn residual(
    kind: EpipolarResidual,
    f: &Matrix3<f64>,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
) -> Option<(f64, SVector<f64, 9>)> {
    let fa = f * a;
    let fb = f.transpose() * b;
    let error = b.dot(&fa);
    // d(b^T F a) / dF_ij = b_i a_j
    let outer = b * a.transpose();
    let error_derivative = SVector::<f64, 9>::from_column_slice(outer.as_slice());
    match kind {
        EpipolarResidual::Algebraic => {
            let norm = f.norm();
            if norm == 0.0 {
                return None;
            }
            let entries = SVector::<f64, 9>::from_column_slice(f.as_slice());
            let derivative = error_derivative / norm - entries * (error / (norm * norm * norm));
            Some((error / norm, derivative))
        }
        EpipolarResidual::Sampson => {
            let denominator = fa.x * fa.x + fa.y * fa.y + fb.x * fb.x + fb.y * fb.y;
            if denominator <= 0.0 {
                return None;
            }
            let root = denominator.sqrt();
            // d(denominator) / dF_ij = [i < 2] 2 (F a)_i a_j + [j < 2] 2 (F^T b)_j b_i
            let mut denominator_derivative = Matrix3::zeros();
            for j in 0..3 {
                for i in 0..3 {
                    let mut d = 0.0;
                    if i < 2 {
                        d += 2.0 * fa[i] * a[j];
                    }
                    if j < 2 {
                        d += 2.0 * fb[j] * b[i];
                    }
                    denominator_derivative[(i, j)] = d;
                }
            }
            let denominator_derivative =
                SVector::<f64, 9>::from_column_slice(denominator_derivative.as_slice());
            let derivative = error_derivative / root
                - denominator_derivative * (error / (2.0 * denominator * root));
            Some((error / root, derivative))
        }
    }
}

struct FundamentalProblem<'a> {
    kind: EpipolarResidual,
    matches: &'a [(Vector3<f64>, Vector3<f64>)],
    entries: SVector<f64, 9>,
}

impl<'a> FundamentalProblem<'a> {
    fn matrix(&self) -> Matrix3<f64> {
        Matrix3::from_column_slice(self.entries.as_slice())
    }
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U9> for FundamentalProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U9>;
    type ParameterStorage = Owned<f64, U9>;

    fn set_params(&mut self, x: &SVector<f64, 9>) {
        self.entries = *x;
    }

    fn params(&self) -> SVector<f64, 9> {
        self.entries
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let f = self.matrix();
        let mut residuals = DVector::zeros(self.matches.len());
        for (ix, (a, b)) in self.matches.iter().enumerate() {
            residuals[ix] = residual(self.kind, &f, a, b)?.0;
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U9>> {
        let f = self.matrix();
        let mut jacobian =
            OMatrix::<f64, Dynamic, U9>::zeros_generic(Dynamic::new(self.matches.len()), Const::<9>);
        for (ix, (a, b)) in self.matches.iter().enumerate() {
            let (_, derivative) = residual(self.kind, &f, a, b)?;
            jacobian.set_row(ix, &derivative.transpose());
        }
        Some(jacobian)
    }
}

/// Refines a fundamental matrix over its inlier correspondences.
///
/// All nine entries are the parameters. Both residuals are invariant to the scale of the matrix,
/// so the minimizer only moves it across the space of epipolar geometries. The result is
/// projected back to rank 2 and scaled to unit frobenius norm.
///
/// Through [`ModelRefiner`] this can polish the output of a consensus on its inliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineFundamental {
    residual: EpipolarResidual,
    epsilon: f64,
    max_iterations: usize,
    converge: ConvergeSettings,
}

impl RefineFundamental {
    pub fn new() -> Self {
        Default::default()
    }

    /// Default: [`EpipolarResidual::Sampson`]
    #[must_use]
    pub fn residual(self, residual: EpipolarResidual) -> Self {
        Self { residual, ..self }
    }

    /// The epsilon of the SVD which restores rank 2.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Default: `1000`
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Default: [`ConvergeSettings::default`]
    #[must_use]
    pub fn settings(self, converge: ConvergeSettings) -> Self {
        Self { converge, ..self }
    }

    /// Refines `initial` over at least eight correspondences.
    pub fn refine_matches<P: ImagePoint>(
        &self,
        initial: FundamentalMatrix,
        matches: &[FeatureMatch<P>],
    ) -> Result<Refinement<FundamentalMatrix>, RefineError> {
        if matches.len() < 8 {
            return Err(RefineError::Degenerate);
        }
        let initial = initial.normalized().ok_or(RefineError::Degenerate)?;
        let matches: Vec<(Vector3<f64>, Vector3<f64>)> = matches
            .iter()
            .map(|FeatureMatch(a, b)| (a.image_homogeneous(), b.image_homogeneous()))
            .collect();
        let problem = FundamentalProblem {
            kind: self.residual,
            matches: &matches,
            entries: SVector::<f64, 9>::from_column_slice(initial.0.as_slice()),
        };
        let (problem, report) = self
            .converge
            .levenberg_marquardt(matches.len())
            .minimize(problem);
        let refined = problem.matrix();
        if !refined.iter().all(|n| n.is_finite()) {
            return Err(RefineError::NonFinite);
        }
        let refined = FundamentalMatrix(refined)
            .recondition(self.epsilon, self.max_iterations)
            .and_then(FundamentalMatrix::normalized)
            .ok_or(RefineError::Degenerate)?;
        Ok(Refinement::from_report(refined, report))
    }
}

impl Default for RefineFundamental {
    fn default() -> Self {
        Self {
            residual: EpipolarResidual::Sampson,
            epsilon: 1e-12,
            max_iterations: 1000,
            converge: ConvergeSettings::default(),
        }
    }
}

impl<P> ModelRefiner<FundamentalMatrix, FeatureMatch<P>> for RefineFundamental
where
    P: ImagePoint,
{
    fn refine(&self, model: &FundamentalMatrix, data: &[FeatureMatch<P>]) -> Option<FundamentalMatrix> {
        match self.refine_matches(*model, data) {
            Ok(refinement) => Some(refinement.estimate),
            Err(e) => {
                log::debug!("fundamental matrix refinement failed: {}", e);
                None
            }
        }
    }
}
