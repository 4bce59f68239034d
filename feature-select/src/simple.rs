use crate::{copy_through, FeatureSelectLimit, SelectImage, SelectPoint};
use float_ord::FloatOrd;
use rand::Rng;

/// Selects the first `limit` features in detection order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectFirst;

impl<P: SelectPoint> FeatureSelectLimit<P> for SelectFirst {
    fn select(
        &mut self,
        _: &SelectImage<'_>,
        _: bool,
        _: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if !copy_through(detected, limit, selected) {
            selected.extend_from_slice(&detected[..limit]);
        }
    }
}

/// Selects features spread evenly over the detection order, at indices `i * len / limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectEveryNth;

impl<P: SelectPoint> FeatureSelectLimit<P> for SelectEveryNth {
    fn select(
        &mut self,
        _: &SelectImage<'_>,
        _: bool,
        _: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if !copy_through(detected, limit, selected) {
            selected.extend((0..limit).map(|i| detected[i * detected.len() / limit].clone()));
        }
    }
}

/// Selects the `limit` features with the best intensity.
///
/// The best features are found with a partial selection rather than a full sort. They are
/// written in detection order.
#[derive(Debug, Clone, Default)]
pub struct SelectBest {
    indices: Vec<usize>,
    scores: Vec<f64>,
}

impl SelectBest {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<P: SelectPoint> FeatureSelectLimit<P> for SelectBest {
    fn select(
        &mut self,
        image: &SelectImage<'_>,
        positive: bool,
        _: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if copy_through(detected, limit, selected) {
            return;
        }
        self.scores.clear();
        self.scores
            .extend(detected.iter().map(|point| image.score(point, positive)));
        self.indices.clear();
        self.indices.extend(0..detected.len());
        let scores = &self.scores;
        self.indices
            .select_nth_unstable_by_key(limit - 1, |&ix| FloatOrd(-scores[ix]));
        let best = &mut self.indices[..limit];
        best.sort_unstable();
        selected.extend(best.iter().map(|&ix| detected[ix].clone()));
    }
}

/// Selects `limit` features uniformly at random without replacement.
///
/// This is a partial Fisher-Yates shuffle over an index buffer which is kept between calls.
#[derive(Debug, Clone)]
pub struct SelectRandom<R> {
    rng: R,
    indices: Vec<usize>,
}

impl<R: Rng> SelectRandom<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            indices: vec![],
        }
    }
}

impl<P: SelectPoint, R: Rng> FeatureSelectLimit<P> for SelectRandom<R> {
    fn select(
        &mut self,
        _: &SelectImage<'_>,
        _: bool,
        _: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if copy_through(detected, limit, selected) {
            return;
        }
        self.indices.clear();
        self.indices.extend(0..detected.len());
        for i in 0..limit {
            let j = self.rng.gen_range(i..detected.len());
            self.indices.swap(i, j);
            selected.push(detected[self.indices[i]].clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ScoredKeyPoint;
    use cv_core::{nalgebra::Point2, KeyPoint};
    use rand::{rngs::SmallRng, SeedableRng};

    fn scored(intensities: &[f64]) -> Vec<ScoredKeyPoint> {
        intensities
            .iter()
            .enumerate()
            .map(|(ix, &intensity)| ScoredKeyPoint {
                point: KeyPoint(Point2::new(ix as f64, 0.0)),
                intensity,
            })
            .collect()
    }

    fn positions(points: &[ScoredKeyPoint]) -> Vec<usize> {
        points.iter().map(|p| p.point.x as usize).collect()
    }

    #[test]
    fn first_and_every_nth() {
        let detected = scored(&[0.0; 10]);
        let image = SelectImage::new(10, 1);
        let mut selected = vec![];
        SelectFirst.select(&image, true, None, &detected, 3, &mut selected);
        assert_eq!(positions(&selected), [0, 1, 2]);
        SelectEveryNth.select(&image, true, None, &detected, 4, &mut selected);
        assert_eq!(positions(&selected), [0, 2, 5, 7]);
    }

    #[test]
    fn best_respects_sign() {
        let detected = scored(&[0.5, 3.0, -2.0, 1.0, 7.0, -4.0]);
        let image = SelectImage::new(10, 1);
        let mut selected = vec![];
        let mut best = SelectBest::new();
        best.select(&image, true, None, &detected, 3, &mut selected);
        assert_eq!(positions(&selected), [1, 3, 4]);
        best.select(&image, false, None, &detected, 2, &mut selected);
        assert_eq!(positions(&selected), [2, 5]);
    }

    #[test]
    fn random_draws_distinct_features() {
        let detected = scored(&[0.0; 50]);
        let image = SelectImage::new(50, 1);
        let mut random = SelectRandom::new(SmallRng::seed_from_u64(0));
        let mut selected = vec![];
        for _ in 0..20 {
            random.select(&image, true, None, &detected, 20, &mut selected);
            let mut drawn = positions(&selected);
            drawn.sort_unstable();
            drawn.dedup();
            assert_eq!(drawn.len(), 20);
        }
    }
}
