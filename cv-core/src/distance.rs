use sample_consensus::Model;

/// Binds the model that subsequent calls to [`DistanceFromModel::distance`] are scored against.
///
/// This is separate from [`DistanceFromModel`] so that binding a model never depends on the type
/// of the observations that will be scored.
pub trait SetModel<M> {
    fn set_model(&mut self, model: &M);
}

/// A cost function which scores observations against a bound model.
///
/// The model is bound once with [`SetModel::set_model`] and then any number of
/// observations can be scored with [`DistanceFromModel::distance`]. Implementors
/// precompute whatever they need from the model when it is bound, so scoring many
/// observations never needs to allocate.
///
/// Distances are always non-negative. An observation which is physically impossible
/// under the model (for instance a point triangulated behind the camera) scores
/// `f64::MAX` so that consensus treats it as a strong outlier.
pub trait DistanceFromModel<M, D>: SetModel<M> {
    /// Computes the distance of one observation from the bound model.
    fn distance(&self, data: &D) -> f64;

    /// Computes the distance of every observation, writing them to `distances`.
    ///
    /// Panics if the two slices differ in length.
    fn distances(&self, data: &[D], distances: &mut [f64]) {
        assert_eq!(
            data.len(),
            distances.len(),
            "one distance slot is required per observation"
        );
        for (datum, distance) in data.iter().zip(distances.iter_mut()) {
            *distance = self.distance(datum);
        }
    }
}

/// Uses the [`Model::residual`] of the model itself as the distance.
///
/// Until a model is bound, every observation scores `f64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelResidual<M>(pub Option<M>);

impl<M> Default for ModelResidual<M> {
    fn default() -> Self {
        Self(None)
    }
}

impl<M: Clone> SetModel<M> for ModelResidual<M> {
    fn set_model(&mut self, model: &M) {
        self.0 = Some(model.clone());
    }
}

impl<M, D> DistanceFromModel<M, D> for ModelResidual<M>
where
    M: Model<D> + Clone,
{
    fn distance(&self, data: &D) -> f64 {
        self.0
            .as_ref()
            .map(|model| model.residual(data))
            .unwrap_or(f64::MAX)
    }
}

/// Improves a model using every observation that was found to agree with it.
///
/// Returning `None` means that refinement failed. Composite operations treat this as their own
/// failure rather than falling back to the unrefined model.
pub trait ModelRefiner<M, D> {
    fn refine(&self, model: &M, data: &[D]) -> Option<M>;
}
