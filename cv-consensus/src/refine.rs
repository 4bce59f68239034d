use alloc::vec::Vec;
use cv_core::{
    sample_consensus::{Consensus, Estimator},
    ModelRefiner,
};

/// Runs a [`ModelRefiner`] over the inliers found by another consensus.
///
/// The inlier set is the one found by the inner consensus, it is not recomputed for the refined
/// model. When refinement fails, the whole estimate fails, so a caller never receives an
/// unrefined model by accident.
#[derive(Debug, Clone)]
pub struct RefinedConsensus<C, F> {
    consensus: C,
    refiner: F,
}

impl<C, F> RefinedConsensus<C, F> {
    pub fn new(consensus: C, refiner: F) -> Self {
        Self { consensus, refiner }
    }

    pub fn consensus(&self) -> &C {
        &self.consensus
    }

    pub fn refiner(&self) -> &F {
        &self.refiner
    }
}

impl<E, D, C, F> Consensus<E, D> for RefinedConsensus<C, F>
where
    E: Estimator<D>,
    C: Consensus<E, D>,
    F: ModelRefiner<E::Model, D>,
    D: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = D> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = D> + Clone,
    {
        let (model, inliers) = self.consensus.model_inliers(estimator, data.clone())?;
        let inliers: Vec<usize> = inliers.into_iter().collect();
        let all: Vec<D> = data.collect();
        let selected: Vec<D> = inliers.iter().map(|&ix| all[ix].clone()).collect();
        match self.refiner.refine(&model, &selected) {
            Some(refined) => Some((refined, inliers)),
            None => {
                log::debug!("refinement over {} inliers failed", selected.len());
                None
            }
        }
    }
}
