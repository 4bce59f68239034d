use crate::{RefineMetric, RefineMetricHomogeneous, TriangulateThenRefine};
use cv_geom::triangulation::{DltSettings, DltTriangulator, MetricHomogeneousDlt};
use levenberg_marquardt::LevenbergMarquardt;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The stopping criteria of the Levenberg-Marquardt minimizer.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConvergeSettings {
    /// The relative reduction of the sum of squares below which the minimizer stops
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_ftol"))]
    pub ftol: f64,
    /// The orthogonality between the residuals and the jacobian columns below which the
    /// minimizer stops, per observation
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_gtol"))]
    pub gtol: f64,
    /// The residual evaluations are bounded by `patience * (parameters + 1)`
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_patience"))]
    pub patience: usize,
}

impl ConvergeSettings {
    /// The minimizer for a problem with `observations` observations.
    ///
    /// `gtol` is scaled by the observation count, since the gradient grows with the number of
    /// residuals.
    pub fn levenberg_marquardt(&self, observations: usize) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_gtol(self.gtol * observations.max(1) as f64)
            .with_patience(self.patience)
    }
}

impl Default for ConvergeSettings {
    fn default() -> Self {
        Self {
            ftol: default_ftol(),
            gtol: default_gtol(),
            patience: default_patience(),
        }
    }
}

fn default_ftol() -> f64 {
    1e-12
}

fn default_gtol() -> f64 {
    1e-12
}

fn default_patience() -> usize {
    100
}

/// The settings of a linear triangulation followed by a refinement.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct TriangulationSettings {
    /// The decomposition settings of the linear triangulation
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub dlt: DltSettings,
    /// The stopping criteria of the refinement
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub converge: ConvergeSettings,
}

impl TriangulationSettings {
    /// Euclidean DLT followed by [`RefineMetric`].
    pub fn metric(&self) -> TriangulateThenRefine<DltTriangulator, RefineMetric> {
        TriangulateThenRefine::new(
            self.dlt.into(),
            RefineMetric::new().settings(self.converge),
        )
    }

    /// Homogeneous DLT followed by [`RefineMetricHomogeneous`], which keeps points at infinity.
    pub fn homogeneous(&self) -> TriangulateThenRefine<MetricHomogeneousDlt, RefineMetricHomogeneous> {
        TriangulateThenRefine::new(
            self.dlt.into(),
            RefineMetricHomogeneous::new().settings(self.converge),
        )
    }
}
