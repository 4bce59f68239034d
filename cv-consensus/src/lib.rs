//! Robust model fitting over the [`Estimator`](cv_core::sample_consensus::Estimator) trait.
//!
//! [`Ransac`] keeps the hypothesis agreeing with the most observations, [`LeastMedianSquares`]
//! the one with the smallest median distance, and [`RefinedConsensus`] runs a
//! [`ModelRefiner`](cv_core::ModelRefiner) over the inliers found by any other consensus.
//!
//! All of them implement [`Consensus`](cv_core::sample_consensus::Consensus), scoring with the
//! residual of the model. `Ransac` and `LeastMedianSquares` can also score with any
//! [`DistanceFromModel`](cv_core::DistanceFromModel) through `model_inliers_with`.

#![no_std]

extern crate alloc;

mod lmeds;
mod ransac;
mod refine;

pub use lmeds::LeastMedianSquares;
pub use ransac::Ransac;
pub use refine::RefinedConsensus;

use alloc::vec::Vec;
use rand::Rng;

/// Draws `amount` distinct indices below `length` into `sample`.
fn draw_sample<R: Rng>(rng: &mut R, length: usize, amount: usize, sample: &mut Vec<usize>) {
    sample.clear();
    sample.extend(rand::seq::index::sample(rng, length, amount).iter());
}
