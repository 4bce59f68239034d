//! Levenberg-Marquardt refinement for the estimates of the linear solvers.
//!
//! The point refiners polish a triangulated point against all of its observations:
//! [`RefineMetric`] and [`RefineMetricHomogeneous`] work with calibrated views,
//! [`RefineProjective`] with camera matrices and pixels, and [`RefineEpipolar`] with the essential
//! matrices from a reference view. [`RefineFundamental`] polishes a fundamental matrix over its
//! inliers and implements [`ModelRefiner`](cv_core::ModelRefiner), so it can follow a consensus.
//! [`TriangulateThenRefine`] chains a linear triangulator with a point refiner.
//!
//! Every refiner returns its best estimate even when the minimizer did not converge, so the
//! caller decides what to do with [`Refinement::converged`].

mod fundamental;
mod point;
mod settings;
mod triangulate;

pub use fundamental::*;
pub use levenberg_marquardt::TerminationReason;
pub use point::*;
pub use settings::*;
pub use triangulate::*;

use levenberg_marquardt::MinimizationReport;
use thiserror::Error;

/// The outcome of a refinement.
#[derive(Debug)]
pub struct Refinement<T> {
    /// The best estimate found.
    pub estimate: T,
    /// Whether the minimizer stopped because one of its tolerances was met.
    pub converged: bool,
    /// Why the minimizer stopped.
    pub termination: TerminationReason,
    /// The number of residual evaluations.
    pub evaluations: usize,
    /// Half of the sum of squared residuals at the estimate.
    pub objective: f64,
}

impl<T> Refinement<T> {
    fn from_report(estimate: T, report: MinimizationReport<f64>) -> Self {
        log::debug!(
            "refinement terminated with {:?} after {} evaluations, objective {}",
            report.termination,
            report.number_of_evaluations,
            report.objective_function
        );
        Self {
            estimate,
            converged: report.termination.was_successful(),
            termination: report.termination,
            evaluations: report.number_of_evaluations,
            objective: report.objective_function,
        }
    }

    /// Replaces the estimate, keeping the convergence information.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Refinement<U> {
        Refinement {
            estimate: f(self.estimate),
            converged: self.converged,
            termination: self.termination,
            evaluations: self.evaluations,
            objective: self.objective,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RefineError {
    #[error("the point is at infinity and has no euclidean coordinates")]
    PointAtInfinity,
    #[error("the refined estimate is not finite")]
    NonFinite,
    #[error("the observations do not constrain the estimate")]
    Degenerate,
}
