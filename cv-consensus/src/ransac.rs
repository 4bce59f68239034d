use crate::draw_sample;
use alloc::vec::Vec;
use cv_core::{
    sample_consensus::{Consensus, Estimator},
    DistanceFromModel, ModelResidual,
};
use num_traits::Float;
use rand::Rng;

/// The number of iterations after which a sample free of outliers was drawn with probability
/// `confidence`, given that a fraction `inlier_ratio` of the observations are inliers.
fn iterations_needed(confidence: f64, inlier_ratio: f64, samples: usize) -> f64 {
    let clean = Float::powi(inlier_ratio, samples as i32);
    if clean >= 1.0 {
        return 1.0;
    }
    if clean <= 0.0 {
        return f64::INFINITY;
    }
    Float::ceil(Float::ln(1.0 - confidence) / Float::ln(1.0 - clean))
}

/// Random sample consensus.
///
/// Every iteration draws the minimal sample of the estimator without replacement, scores every
/// hypothesis it produces against all observations and keeps the one with the most inliers.
/// Ties go to the hypothesis whose inliers have the smaller total distance. Whenever a better
/// hypothesis is found, the iteration bound is lowered to the number of iterations that draw an
/// all inlier sample with the configured confidence.
///
/// ```
/// use cv_consensus::Ransac;
/// use cv_core::nalgebra::{Point2, Vector2};
/// use cv_core::sample_consensus::Consensus;
/// use cv_core::{FeatureMatch, KeyPoint};
/// use cv_geom::similarity::ScaleTranslateEstimator;
/// use rand::{rngs::SmallRng, SeedableRng};
///
/// let mut data: Vec<_> = (0..20)
///     .map(|i| {
///         let a = Point2::new(i as f64, (i * i % 7) as f64);
///         FeatureMatch(KeyPoint(a), KeyPoint(a * 2.0 + Vector2::new(1.0, -3.0)))
///     })
///     .collect();
/// data[3].1 = KeyPoint(Point2::new(100.0, 100.0));
/// let mut ransac = Ransac::new(1e-6, SmallRng::seed_from_u64(0));
/// let (model, inliers) = ransac.model_inliers(&ScaleTranslateEstimator::new(), data.iter().copied()).unwrap();
/// assert!((model.scale - 2.0).abs() < 1e-9);
/// assert_eq!(inliers.len(), 19);
/// ```
#[derive(Debug, Clone)]
pub struct Ransac<R> {
    threshold: f64,
    confidence: f64,
    max_iterations: usize,
    rng: R,
    sample: Vec<usize>,
}

impl<R> Ransac<R>
where
    R: Rng,
{
    /// Creates the consensus with the inlier `threshold` on the distance and the random number
    /// generator which draws the samples.
    pub fn new(threshold: f64, rng: R) -> Self {
        Self {
            threshold,
            confidence: 0.99,
            max_iterations: 1000,
            rng,
            sample: Vec::new(),
        }
    }

    /// The probability of having drawn at least one sample free of outliers when iteration stops
    /// early.
    ///
    /// Default: `0.99`
    #[must_use]
    pub fn confidence(self, confidence: f64) -> Self {
        Self { confidence, ..self }
    }

    /// The upper bound on the number of samples drawn.
    ///
    /// Default: `1000`
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Finds the best model, scoring observations with `distance`.
    ///
    /// Returns the model and the indices of the observations whose distance to it is within the
    /// threshold, or `None` when there are fewer observations than the estimator needs or no
    /// sample produced a hypothesis.
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
            log::debug!(
                "ransac needs {} observations, got {}",
                E::MIN_SAMPLES,
                data.len()
            );
            return None;
        }
        let mut best: Option<(E::Model, usize, f64)> = None;
        let mut bound = self.max_iterations;
        let mut iteration = 0;
        while iteration < bound {
            iteration += 1;
            draw_sample(&mut self.rng, data.len(), E::MIN_SAMPLES, &mut self.sample);
            let sample = self.sample.iter().map(|&ix| data[ix].clone());
            for model in estimator.estimate(sample) {
                distance.set_model(&model);
                let mut inliers = 0;
                let mut total = 0.0;
                for datum in data {
                    let d = distance.distance(datum);
                    if d <= self.threshold {
                        inliers += 1;
                        total += d;
                    }
                }
                let better = match &best {
                    None => true,
                    Some((_, best_inliers, best_total)) => {
                        inliers > *best_inliers || (inliers == *best_inliers && total < *best_total)
                    }
                };
                if better {
                    log::trace!(
                        "ransac iteration {} found {} inliers (total distance {})",
                        iteration,
                        inliers,
                        total
                    );
                    let ratio = inliers as f64 / data.len() as f64;
                    let needed = iterations_needed(self.confidence, ratio, E::MIN_SAMPLES);
                    bound = needed.min(self.max_iterations as f64) as usize;
                    best = Some((model, inliers, total));
                }
            }
        }
        let (model, inliers, _) = best?;
        log::debug!(
            "ransac kept {}/{} inliers after {} iterations",
            inliers,
            data.len(),
            iteration
        );
        distance.set_model(&model);
        let inliers = data
            .iter()
            .enumerate()
            .filter(|(_, datum)| distance.distance(datum) <= self.threshold)
            .map(|(ix, _)| ix)
            .collect();
        Some((model, inliers))
    }
}

impl<E, D, R> Consensus<E, D> for Ransac<R>
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

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iteration_bound() {
        // Half inliers with two point samples need 17 iterations for 99% confidence.
        assert_eq!(iterations_needed(0.99, 0.5, 2), 17.0);
        assert_eq!(iterations_needed(0.99, 1.0, 8), 1.0);
        assert!(iterations_needed(0.99, 0.0, 8).is_infinite());
        assert!(iterations_needed(0.99, 0.3, 8) > iterations_needed(0.99, 0.6, 8));
    }
}
