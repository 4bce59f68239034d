use crate::{FeatureSelectLimit, SelectImage, SelectPoint};
use cv_core::nalgebra::Point2;
use float_ord::FloatOrd;

/// Candidate features binned into square cells covering the image.
///
/// The cells and their buffers are kept between calls so that repeated selections on images of
/// the same size do not allocate.
#[derive(Debug, Clone, Default)]
struct Grid {
    side: f64,
    columns: usize,
    rows: usize,
    /// Indices of the detected features in each cell.
    cells: Vec<Vec<usize>>,
    /// The number of prior features in each cell which are still to be skipped.
    prior: Vec<usize>,
    /// The next candidate to take from each cell.
    cursors: Vec<usize>,
}

impl Grid {
    /// Sizes the grid so that `limit` cells roughly cover the image.
    fn reset(&mut self, width: u32, height: u32, limit: usize) {
        let width = width.max(1) as f64;
        let height = height.max(1) as f64;
        self.side = (width * height / limit as f64).sqrt().ceil().max(1.0);
        self.columns = (width / self.side).ceil() as usize;
        self.rows = (height / self.side).ceil() as usize;
        let cells = self.columns * self.rows;
        self.cells.resize_with(cells, Vec::new);
        for cell in &mut self.cells[..cells] {
            cell.clear();
        }
        self.prior.clear();
        self.prior.resize(cells, 0);
        self.cursors.clear();
        self.cursors.resize(cells, 0);
    }

    fn len(&self) -> usize {
        self.columns * self.rows
    }

    /// The cell containing `position`, clamping positions outside of the image to its border.
    fn cell(&self, position: Point2<f64>) -> usize {
        let clamp = |value: f64, cells: usize| {
            if value > 0.0 {
                ((value / self.side) as usize).min(cells - 1)
            } else {
                0
            }
        };
        clamp(position.y, self.rows) * self.columns + clamp(position.x, self.columns)
    }

    fn bin<P: SelectPoint>(&mut self, prior: Option<&[P]>, detected: &[P]) {
        for point in prior.unwrap_or_default() {
            let cell = self.cell(point.image_position());
            self.prior[cell] += 1;
        }
        for (ix, point) in detected.iter().enumerate() {
            let cell = self.cell(point.image_position());
            self.cells[cell].push(ix);
        }
    }

    /// Visits the cells round robin, taking one candidate from each per pass.
    ///
    /// A cell with remaining prior features gives up its turn instead, once per prior feature.
    fn take<P: SelectPoint>(&mut self, detected: &[P], limit: usize, selected: &mut Vec<P>) {
        let cells = self.len();
        loop {
            let mut remaining = false;
            for cell in 0..cells {
                let cursor = self.cursors[cell];
                if cursor >= self.cells[cell].len() {
                    continue;
                }
                remaining = true;
                if self.prior[cell] > 0 {
                    self.prior[cell] -= 1;
                    continue;
                }
                selected.push(detected[self.cells[cell][cursor]].clone());
                self.cursors[cell] += 1;
                if selected.len() == limit {
                    return;
                }
            }
            if !remaining {
                return;
            }
        }
    }
}

/// Selects features spread uniformly over the image.
///
/// The image is split into a grid with about `limit` cells. Passes over the grid take one feature
/// from every cell, in detection order within the cell, until the limit is reached or all
/// features are taken. A cell that already holds prior features skips one pass per prior
/// feature, so new features go to the regions with fewer tracked ones first.
#[derive(Debug, Clone, Default)]
pub struct SelectUniform {
    grid: Grid,
}

impl SelectUniform {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<P: SelectPoint> FeatureSelectLimit<P> for SelectUniform {
    fn select(
        &mut self,
        image: &SelectImage<'_>,
        _: bool,
        prior: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if copy_without_prior(prior, detected, limit, selected) {
            return;
        }
        self.grid.reset(image.width, image.height, limit);
        self.grid.bin(prior, detected);
        self.grid.take(detected, limit, selected);
    }
}

/// Like [`SelectUniform`], but every cell gives its best features first.
#[derive(Debug, Clone, Default)]
pub struct SelectUniformBest {
    grid: Grid,
    scores: Vec<f64>,
}

impl SelectUniformBest {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<P: SelectPoint> FeatureSelectLimit<P> for SelectUniformBest {
    fn select(
        &mut self,
        image: &SelectImage<'_>,
        positive: bool,
        prior: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    ) {
        if copy_without_prior(prior, detected, limit, selected) {
            return;
        }
        self.grid.reset(image.width, image.height, limit);
        self.grid.bin(prior, detected);
        self.scores.clear();
        self.scores
            .extend(detected.iter().map(|point| image.score(point, positive)));
        let scores = &self.scores;
        for cell in &mut self.grid.cells {
            cell.sort_by_key(|&ix| FloatOrd(-scores[ix]));
        }
        self.grid.take(detected, limit, selected);
    }
}

/// Selects every feature when nothing is tracked yet and no more than `limit` were detected.
fn copy_without_prior<P: Clone>(
    prior: Option<&[P]>,
    detected: &[P],
    limit: usize,
    selected: &mut Vec<P>,
) -> bool {
    if prior.map_or(true, |prior| prior.is_empty()) {
        crate::copy_through(detected, limit, selected)
    } else {
        assert!(limit > 0, "the feature limit must be positive");
        selected.clear();
        false
    }
}
