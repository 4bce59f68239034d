//! Estimation of the [`TrifocalTensor`] from point correspondences over three views.
//!
//! Every point triple gives the nine equations of the point-point-point constraint
//! `[x2]x (sum_i x1^i Ti) [x3]x = 0`, four of which are independent, so seven triples determine the
//! 27 entries of the tensor up to scale. Points are conditioned per view with
//! [`cv_pinhole::hartley_normalization`] before the system is solved.
//!
//! A tensor solved this way is generally not consistent with any three cameras once noise is
//! present. [`TrifocalLinearPoint7`] can enforce consistency with the epipoles extracted from the
//! linear solution, and [`TrifocalAlgebraicPoint7`] additionally searches for the epipoles which
//! minimize the algebraic error of the consistent tensor.

mod algebraic;

pub use algebraic::{AlgebraicEstimate, TrifocalAlgebraicPoint7};

use cv_core::{
    nalgebra::{DMatrix, DVector, Matrix3, Point2, SMatrix, SVector, Vector3},
    sample_consensus::{Estimator, Model},
    FeatureTriple, ImagePoint, KeyPoint,
};
use cv_geom::trifocal::TrifocalTensor;
use cv_pinhole::hartley_normalization;
use float_ord::FloatOrd;

/// The conditioning transform of each view.
#[derive(Debug, Clone, Copy)]
struct Conditioning {
    first: Matrix3<f64>,
    second: Matrix3<f64>,
    third: Matrix3<f64>,
}

impl Conditioning {
    fn new<P: ImagePoint>(triples: &[FeatureTriple<P>]) -> Option<Self> {
        Some(Self {
            first: hartley_normalization(triples.iter().map(|FeatureTriple(a, _, _)| a.image_point()))?,
            second: hartley_normalization(triples.iter().map(|FeatureTriple(_, b, _)| b.image_point()))?,
            third: hartley_normalization(triples.iter().map(|FeatureTriple(_, _, c)| c.image_point()))?,
        })
    }

    fn apply(transform: &Matrix3<f64>, point: Point2<f64>) -> Point2<f64> {
        let h = transform * point.to_homogeneous();
        Point2::new(h.x / h.z, h.y / h.z)
    }

    fn condition<P: ImagePoint>(&self, FeatureTriple(a, b, c): &FeatureTriple<P>) -> FeatureTriple<KeyPoint> {
        FeatureTriple(
            KeyPoint(Self::apply(&self.first, a.image_point())),
            KeyPoint(Self::apply(&self.second, b.image_point())),
            KeyPoint(Self::apply(&self.third, c.image_point())),
        )
    }

    /// Moves a tensor of the original points into the conditioned frame.
    fn condition_tensor(&self, tensor: &TrifocalTensor) -> Option<TrifocalTensor> {
        let first_inverse = self.first.try_inverse()?;
        tensor.transform(&first_inverse, &self.second, &self.third).normalized()
    }

    /// Moves a tensor of the conditioned points back to the original points.
    fn restore(&self, tensor: &TrifocalTensor) -> Option<TrifocalTensor> {
        let second = self.second.try_inverse()?;
        let third = self.third.try_inverse()?;
        tensor.transform(&self.first, &second, &third).normalized()
    }

    /// The normal equations `A^T A` of the conditioned triples.
    fn normal<P: ImagePoint>(&self, triples: &[FeatureTriple<P>]) -> DMatrix<f64> {
        let normal = triples
            .iter()
            .map(|triple| {
                let FeatureTriple(x1, x2, x3) = self.condition(triple);
                let block = constraint_rows(x1.0, x2.0, x3.0);
                block.tr_mul(&block)
            })
            .fold(SMatrix::<f64, 27, 27>::zeros(), |acc, m| acc + m);
        DMatrix::from_column_slice(27, 27, normal.as_slice())
    }

    /// The stacked constraint rows `A` of the conditioned triples.
    fn rows<P: ImagePoint>(&self, triples: &[FeatureTriple<P>]) -> DMatrix<f64> {
        let mut rows = DMatrix::zeros(9 * triples.len(), 27);
        for (ix, triple) in triples.iter().enumerate() {
            let FeatureTriple(x1, x2, x3) = self.condition(triple);
            rows.fixed_slice_mut::<9, 27>(9 * ix, 0)
                .copy_from(&constraint_rows(x1.0, x2.0, x3.0));
        }
        rows
    }
}

/// The nine rows of the point-point-point constraint, linear in the entries of the tensor as laid
/// out by [`TrifocalTensor::to_vector`].
fn constraint_rows(x1: Point2<f64>, x2: Point2<f64>, x3: Point2<f64>) -> SMatrix<f64, 9, 27> {
    let x1 = x1.to_homogeneous();
    let cross2 = x2.to_homogeneous().cross_matrix();
    let cross3 = x3.to_homogeneous().cross_matrix();
    SMatrix::from_fn(|row, index| {
        let (r, c) = (row / 3, row % 3);
        let (i, j, k) = (index / 9, (index % 9) / 3, index % 3);
        x1[i] * cross2[(r, j)] * cross3[(k, c)]
    })
}

fn smallest_eigenvector(
    matrix: DMatrix<f64>,
    epsilon: f64,
    max_iterations: usize,
) -> Option<DVector<f64>> {
    let eigens = matrix.try_symmetric_eigen(epsilon, max_iterations)?;
    let (ix, _) = eigens
        .eigenvalues
        .iter()
        .enumerate()
        .min_by_key(|&(_, &n)| FloatOrd(n))?;
    Some(eigens.eigenvectors.column(ix).into_owned())
}

fn tensor_from(vector: &DVector<f64>) -> TrifocalTensor {
    TrifocalTensor::from_vector(&SVector::<f64, 27>::from_column_slice(vector.as_slice()))
}

/// The 27x18 map from the unknown columns of `P2 = [a1 a2 a3 | e2]` and `P3 = [b1 b2 b3 | e3]`
/// to the tensor `Ti = ai e3^T - e2 bi^T`. Parameters are `a1, a2, a3, b1, b2, b3`.
fn epipole_map(e2: &Vector3<f64>, e3: &Vector3<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(27, 18, |index, parameter| {
        let (i, j, k) = (index / 9, (index % 9) / 3, index % 3);
        if parameter < 9 {
            if parameter == 3 * i + j {
                e3[k]
            } else {
                0.0
            }
        } else if parameter - 9 == 3 * i + k {
            -e2[j]
        } else {
            0.0
        }
    })
}

/// Minimizes `|A t|` over unit tensors `t` in the range of the epipole map, given the normal
/// equations `A^T A`.
///
/// The range has 15 dimensions since moving every `ai` along `e2` and `bi` along `e3` by the same
/// amount does not change the tensor.
fn constrained_solution(
    normal: &DMatrix<f64>,
    map: DMatrix<f64>,
    epsilon: f64,
    max_iterations: usize,
) -> Option<DVector<f64>> {
    let svd = map.try_svd(true, false, epsilon, max_iterations)?;
    let u = svd.u?;
    let largest = svd.singular_values.max();
    let range: Vec<usize> = (0..svd.singular_values.len())
        .filter(|&ix| svd.singular_values[ix] > 1e-10 * largest)
        .collect();
    if range.is_empty() {
        return None;
    }
    let basis = u.select_columns(range.iter());
    let reduced = basis.tr_mul(&(normal * &basis));
    let solution = smallest_eigenvector(reduced, epsilon, max_iterations)?;
    Some(basis * solution)
}

/// The mean algebraic error of the triples under the tensor.
///
/// The error is measured in the conditioned frame of the triples with the tensor scaled to unit
/// norm, which is the quantity minimized by [`TrifocalLinearPoint7`] and
/// [`TrifocalAlgebraicPoint7`]. This makes errors of different estimates comparable. Returns `None`
/// for an empty or degenerate set of triples or the zero tensor.
pub fn algebraic_error<P: ImagePoint>(tensor: &TrifocalTensor, triples: &[FeatureTriple<P>]) -> Option<f64> {
    let conditioning = Conditioning::new(triples)?;
    let conditioned = conditioning.condition_tensor(tensor)?;
    let total: f64 = triples
        .iter()
        .map(|triple| conditioned.residual(&conditioning.condition(triple)))
        .sum();
    Some(total / triples.len() as f64)
}

/// The normalized linear estimate of the trifocal tensor from seven or more point triples.
///
/// With [`TrifocalLinearPoint7::enforce`] (the default), the epipoles are extracted from the linear
/// solution and the tensor is re-solved over the tensors of cameras with those epipoles. The
/// result then corresponds to an actual set of cameras. The returned tensor has unit norm.
///
/// ```
/// use cv_core::nalgebra::{Point3, Rotation3, Vector3};
/// use cv_core::sample_consensus::{Estimator, Model};
/// use cv_core::{CameraMatrix, FeatureTriple, Pose, Projective, WorldPoint, WorldToCamera};
/// use trifocal::TrifocalLinearPoint7;
///
/// let cameras: [CameraMatrix; 3] = [
///     CameraMatrix::canonical(),
///     WorldToCamera::from_parts(Vector3::new(-0.5, 0.1, 0.0), Rotation3::from_euler_angles(0.0, 0.1, 0.0)).into(),
///     WorldToCamera::from_parts(Vector3::new(0.2, -0.4, 0.1), Rotation3::from_euler_angles(0.1, 0.0, -0.05)).into(),
/// ];
/// let triples: Vec<_> = (0..9)
///     .map(|i| {
///         let i = i as f64;
///         let p = WorldPoint::from_point(Point3::new((i * 0.9).sin(), (i * 1.7).cos(), 4.0 + (i * 0.5).sin()));
///         let [a, b, c] = cameras.map(|camera| camera.project(p).unwrap());
///         FeatureTriple(a, b, c)
///     })
///     .collect();
/// let tensor = TrifocalLinearPoint7::new().estimate(triples.iter().copied()).unwrap();
/// assert!(triples.iter().all(|t| tensor.residual(t) < 1e-12));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TrifocalLinearPoint7 {
    epsilon: f64,
    max_iterations: usize,
    enforce: bool,
}

impl TrifocalLinearPoint7 {
    pub fn new() -> Self {
        Default::default()
    }

    /// The convergence threshold of the eigen and singular value decompositions.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// The iteration cap of the eigen and singular value decompositions.
    ///
    /// Default: `1000`
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Whether the solution is made consistent with its own epipoles.
    ///
    /// Default: `true`
    #[must_use]
    pub fn enforce(self, enforce: bool) -> Self {
        Self { enforce, ..self }
    }

    /// Estimates the tensor from seven or more triples.
    ///
    /// Returns `None` for fewer than seven triples, if the points of a view collapse to a single
    /// point, or if the epipoles of the linear solution are degenerate.
    pub fn from_triples<P: ImagePoint>(&self, triples: &[FeatureTriple<P>]) -> Option<TrifocalTensor> {
        if triples.len() < 7 {
            return None;
        }
        let conditioning = Conditioning::new(triples)?;
        let normal = conditioning.normal(triples);
        let linear = self.linear(&normal)?;
        let tensor = if self.enforce {
            let (e2, e3) = linear.epipoles(self.epsilon, self.max_iterations)?;
            self.consistent(&normal, &e2, &e3)?
        } else {
            linear
        };
        conditioning.restore(&tensor)
    }

    /// The unconstrained least squares solution in the conditioned frame.
    fn linear(&self, normal: &DMatrix<f64>) -> Option<TrifocalTensor> {
        let solution = smallest_eigenvector(normal.clone(), self.epsilon, self.max_iterations)?;
        Some(tensor_from(&solution))
    }

    /// The least squares solution among the tensors with the epipoles `e2` and `e3`.
    fn consistent(
        &self,
        normal: &DMatrix<f64>,
        e2: &Vector3<f64>,
        e3: &Vector3<f64>,
    ) -> Option<TrifocalTensor> {
        let solution = constrained_solution(normal, epipole_map(e2, e3), self.epsilon, self.max_iterations)?;
        Some(tensor_from(&solution))
    }
}

impl Default for TrifocalLinearPoint7 {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
            enforce: true,
        }
    }
}

impl<P> Estimator<FeatureTriple<P>> for TrifocalLinearPoint7
where
    P: ImagePoint,
{
    type Model = TrifocalTensor;
    type ModelIter = Option<TrifocalTensor>;
    const MIN_SAMPLES: usize = 7;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureTriple<P>> + Clone,
    {
        let triples: Vec<FeatureTriple<P>> = data.collect();
        self.from_triples(&triples)
    }
}
