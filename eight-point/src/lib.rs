#![no_std]

use cv_core::{
    nalgebra::{Matrix3, OMatrix, OVector, Point2, Vector3, U9},
    sample_consensus::Estimator,
    Bearing, FeatureMatch, ImagePoint,
};
use cv_pinhole::{hartley_normalization, EssentialMatrix, FundamentalMatrix};
use float_ord::FloatOrd;

/// Accumulates `A^T A` where every correspondence adds the row of `b^T M a = 0` for the
/// column-major entries of `M`. Returns the count of correspondences as well.
fn encode_epipolar_equation(
    matches: impl Iterator<Item = (Vector3<f64>, Vector3<f64>)>,
) -> (OMatrix<f64, U9, U9>, usize) {
    let mut ata = OMatrix::<f64, U9, U9>::zeros();
    let mut count = 0;
    for (a, b) in matches {
        let mut row = OVector::<f64, U9>::zeros();
        for j in 0..3 {
            let v = a[j] * b;
            row.fixed_rows_mut::<3>(3 * j).copy_from(&v);
        }
        ata += row * row.transpose();
        count += 1;
    }
    (ata, count)
}

/// Finds the eigenvector of the smallest eigenvalue of the accumulated system as a matrix.
fn smallest_solution(
    ata: OMatrix<f64, U9, U9>,
    epsilon: f64,
    max_iterations: usize,
) -> Option<Matrix3<f64>> {
    let eigens = ata.try_symmetric_eigen(epsilon, max_iterations)?;
    let eigenvector = eigens
        .eigenvalues
        .iter()
        .enumerate()
        .min_by_key(|&(_, &n)| FloatOrd(n))
        .map(|(ix, _)| eigens.eigenvectors.column(ix).into_owned())?;
    Some(Matrix3::from_iterator(eigenvector.iter().copied()))
}

/// Performs the
/// [eight-point algorithm](https://en.wikipedia.org/wiki/Eight-point_algorithm)
/// by Richard Hartley and Andrew Zisserman.
///
/// Any number of correspondences from eight upwards can be used, in which case the essential
/// matrix is the least squares solution. The result is reconditioned with
/// [`cv_pinhole::EssentialMatrix::recondition`] so that it has two equal singular values and one
/// zero singular value. To get the poses, see
/// [`cv_pinhole::EssentialMatrix::possible_unscaled_poses`].
#[derive(Copy, Clone, Debug)]
pub struct EightPoint {
    epsilon: f64,
    max_iterations: usize,
}

impl EightPoint {
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

    /// Estimates the essential matrix from eight or more bearing correspondences.
    ///
    /// Returns `None` for fewer than eight correspondences or if a decomposition fails.
    pub fn from_matches<B, I>(&self, data: I) -> Option<EssentialMatrix>
    where
        B: Bearing,
        I: Iterator<Item = FeatureMatch<B>>,
    {
        let (ata, count) = encode_epipolar_equation(
            data.map(|FeatureMatch(a, b)| (a.bearing().into_inner(), b.bearing().into_inner())),
        );
        if count < 8 {
            return None;
        }
        let essential = smallest_solution(ata, self.epsilon, self.max_iterations)?;
        EssentialMatrix(essential).recondition(self.epsilon, self.max_iterations)
    }
}

impl Default for EightPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl<B> Estimator<FeatureMatch<B>> for EightPoint
where
    B: Bearing,
{
    type Model = EssentialMatrix;
    type ModelIter = Option<EssentialMatrix>;
    const MIN_SAMPLES: usize = 8;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<B>> + Clone,
    {
        self.from_matches(data)
    }
}

/// The normalized eight-point algorithm for the fundamental matrix of uncalibrated pixel
/// correspondences.
///
/// The points of each image are conditioned with [`cv_pinhole::hartley_normalization`] before
/// the linear system is solved, the solution is forced to rank 2, and the conditioning is undone.
/// The returned matrix has unit frobenius norm.
///
/// ```
/// use cv_core::nalgebra::{Matrix3, Point3, Rotation3, Vector3};
/// use cv_core::sample_consensus::Model;
/// use cv_core::{CameraMatrix, FeatureMatch, KeyPoint, WorldPoint, Projective, Pose, WorldToCamera};
/// use eight_point::EightPointFundamental;
///
/// let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
/// let first = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
/// let second = CameraMatrix::from_intrinsics_pose(
///     &k,
///     WorldToCamera::from_parts(Vector3::new(-0.5, 0.1, 0.05), Rotation3::from_euler_angles(0.05, 0.1, 0.0)),
/// );
/// let matches: Vec<FeatureMatch<KeyPoint>> = (0..12)
///     .map(|i| {
///         let i = i as f64;
///         let p = WorldPoint::from_point(Point3::new((i * 0.7).sin(), (i * 1.3).cos(), 4.0 + (i * 0.4).sin()));
///         FeatureMatch(first.project(p).unwrap(), second.project(p).unwrap())
///     })
///     .collect();
/// let f = EightPointFundamental::new().from_matches(matches.iter().copied()).unwrap();
/// assert!(matches.iter().all(|m| f.residual(m) < 1e-8));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct EightPointFundamental {
    epsilon: f64,
    max_iterations: usize,
}

impl EightPointFundamental {
    pub fn new() -> Self {
        Default::default()
    }

    /// See [`EightPoint::epsilon`].
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// See [`EightPoint::max_iterations`].
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Estimates the fundamental matrix from eight or more pixel correspondences.
    ///
    /// Returns `None` for fewer than eight correspondences, if either set of points collapses to
    /// a single point, or if a decomposition fails.
    pub fn from_matches<P, I>(&self, data: I) -> Option<FundamentalMatrix>
    where
        P: ImagePoint,
        I: Iterator<Item = FeatureMatch<P>> + Clone,
    {
        let first = data.clone().map(|FeatureMatch(a, _)| a.image_point());
        let second = data.clone().map(|FeatureMatch(_, b)| b.image_point());
        let t1 = hartley_normalization(first)?;
        let t2 = hartley_normalization(second)?;
        let condition = |t: &Matrix3<f64>, p: Point2<f64>| t * p.to_homogeneous();
        let (ata, count) = encode_epipolar_equation(data.map(|FeatureMatch(a, b)| {
            (condition(&t1, a.image_point()), condition(&t2, b.image_point()))
        }));
        if count < 8 {
            return None;
        }
        let conditioned = smallest_solution(ata, self.epsilon, self.max_iterations)?;
        let conditioned =
            FundamentalMatrix(conditioned).recondition(self.epsilon, self.max_iterations)?;
        FundamentalMatrix(t2.transpose() * conditioned.0 * t1).normalized()
    }
}

impl Default for EightPointFundamental {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl<P> Estimator<FeatureMatch<P>> for EightPointFundamental
where
    P: ImagePoint,
{
    type Model = FundamentalMatrix;
    type ModelIter = Option<FundamentalMatrix>;
    const MIN_SAMPLES: usize = 8;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<P>> + Clone,
    {
        self.from_matches(data)
    }
}
