use crate::draw_sample;
use alloc::vec::Vec;
use cv_core::{
    sample_consensus::{Consensus, Estimator},
    DistanceFromModel, ModelResidual,
};
use float_ord::FloatOrd;
use rand::Rng;

/// Least median of squares.
///
/// A fixed number of minimal samples is drawn. The hypothesis whose median distance over all
/// observations is smallest wins, which needs no inlier threshold up front and tolerates up to
/// half of the observations being outliers. The search fails if the best median is above
/// `max_median_error`. The inliers are then the observations whose distance is at most the
/// `inlier_fraction` quantile of the distances to the winning model.
#[derive(Debug, Clone)]
pub struct LeastMedianSquares<R> {
    max_median_error: f64,
    inlier_fraction: f64,
    iterations: usize,
    rng: R,
    sample: Vec<usize>,
    distances: Vec<f64>,
}

impl<R> LeastMedianSquares<R>
where
    R: Rng,
{
    pub fn new(max_median_error: f64, rng: R) -> Self {
        Self {
            max_median_error,
            inlier_fraction: 0.5,
            iterations: 500,
            rng,
            sample: Vec::new(),
            distances: Vec::new(),
        }
    }

    /// The quantile of the distances to the winning model at or below which an observation is
    /// an inlier.
    ///
    /// Default: `0.5`
    #[must_use]
    pub fn inlier_fraction(self, inlier_fraction: f64) -> Self {
        Self {
            inlier_fraction,
            ..self
        }
    }

    /// The number of samples drawn.
    ///
    /// Default: `500`
    #[must_use]
    pub fn iterations(self, iterations: usize) -> Self {
        Self { iterations, ..self }
    }

    /// The element of rank `rank` of the distances, reordering them.
    fn select(&mut self, rank: usize) -> f64 {
        let (_, &mut value, _) = self
            .distances
            .select_nth_unstable_by_key(rank, |&d| FloatOrd(d));
        value
    }

    /// Finds the model with the least median distance, scoring observations with `distance`.
    ///
    /// Returns `None` when there are fewer observations than the estimator needs, no sample
    /// produced a hypothesis, or the least median is above the maximum median error.
    pub fn model_inliers_with<E, D, F>(
        &mut self,
        estimator: &E,
        distance: &mut F,
        data: &[D],
    ) -> Option<(E::Model, Vec<usize>)>
    where
        E: Estimator<D>,
        D: Clone,
        F: DistanceFromModel<E::Model, D>,
    {
        if data.len() < E::MIN_SAMPLES {
            return None;
        }
        self.distances.clear();
        self.distances.resize(data.len(), 0.0);
        let median_rank = data.len() / 2;
        let mut best: Option<(E::Model, f64)> = None;
        for iteration in 0..self.iterations {
            draw_sample(&mut self.rng, data.len(), E::MIN_SAMPLES, &mut self.sample);
            let sample = self.sample.iter().map(|&ix| data[ix].clone());
            for model in estimator.estimate(sample) {
                distance.set_model(&model);
                distance.distances(data, &mut self.distances);
                let median = self.select(median_rank);
                if best.as_ref().map_or(true, |&(_, best_median)| median < best_median) {
                    log::trace!("lmeds iteration {} found median {}", iteration, median);
                    best = Some((model, median));
                }
            }
        }
        let (model, median) = best?;
        if median > self.max_median_error {
            log::debug!(
                "lmeds least median {} is above the maximum {}",
                median,
                self.max_median_error
            );
            return None;
        }

        distance.set_model(&model);
        distance.distances(data, &mut self.distances);
        let rank = ((data.len() as f64 * self.inlier_fraction) as usize).min(data.len() - 1);
        let threshold = self.select(rank);
        let inliers: Vec<usize> = data
            .iter()
            .enumerate()
            .filter(|(_, datum)| distance.distance(datum) <= threshold)
            .map(|(ix, _)| ix)
            .collect();
        log::debug!(
            "lmeds median {} threshold {} kept {}/{} inliers",
            median,
            threshold,
            inliers.len(),
            data.len()
        );
        Some((model, inliers))
    }
}

impl<E, D, R> Consensus<E, D> for LeastMedianSquares<R>
where
    E: Estimator<D>,
    E::Model: Clone,
    D: Clone,
    R: Rng,
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
        let data: Vec<D> = data.collect();
        self.model_inliers_with(estimator, &mut ModelResidual::<E::Model>::default(), &data)
    }
}
