//! The seven-point algorithm for the fundamental matrix.
//!
//! Seven correspondences leave a two dimensional family `F = a F1 + (1 - a) F2` of matrices
//! satisfying the epipolar constraint. Requiring `det(F) = 0` gives a cubic in `a` with one or
//! three real roots, so one sample produces up to three fundamental matrices.

#![no_std]

use arrayvec::ArrayVec;
use cv_core::{
    nalgebra::{Matrix3, OMatrix, OVector, Vector3, U9},
    sample_consensus::Estimator,
    FeatureMatch, ImagePoint,
};
use cv_pinhole::{hartley_normalization, FundamentalMatrix};
use float_ord::FloatOrd;
use num_traits::Float;

/// Finds the real roots of `a x^3 + b x^2 + c x + d`.
///
/// When the leading coefficient vanishes relative to the others, the quadratic (or linear)
/// polynomial is solved instead. Roots are taken from the eigenvalues of the companion matrix and
/// polished with Newton's method.
fn real_cubic_roots(a: f64, b: f64, c: f64, d: f64, tolerance: f64) -> ArrayVec<f64, 3> {
    let mut roots = ArrayVec::new();
    let scale = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
    if !(scale > 0.0) || !scale.is_finite() {
        return roots;
    }
    let (a, b, c, d) = (a / scale, b / scale, c / scale, d / scale);
    if a.abs() <= tolerance {
        if b.abs() <= tolerance {
            if c.abs() > tolerance {
                roots.push(-d / c);
            }
            return roots;
        }
        let discriminant = c * c - 4.0 * b * d;
        if discriminant >= 0.0 {
            // Avoids cancellation between -c and the root of the discriminant.
            let q = -0.5 * (c + c.signum() * discriminant.sqrt());
            if q != 0.0 {
                roots.push(q / b);
                roots.push(d / q);
            } else {
                roots.push(0.0);
            }
        }
        return roots;
    }
    let companion = Matrix3::new(-b / a, -c / a, -d / a, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
    let polynomial = |x: f64| ((a * x + b) * x + c) * x + d;
    let derivative = |x: f64| (3.0 * a * x + 2.0 * b) * x + c;
    for eigenvalue in companion.complex_eigenvalues().iter() {
        if eigenvalue.im.abs() > 1e-8 * eigenvalue.re.abs().max(1.0) {
            continue;
        }
        let mut x = eigenvalue.re;
        for _ in 0..2 {
            let slope = derivative(x);
            if slope == 0.0 {
                break;
            }
            x -= polynomial(x) / slope;
        }
        if x.is_finite() {
            roots.push(x);
        }
    }
    roots
}

/// Performs the seven-point algorithm by Richard Hartley and Andrew Zisserman on pixel
/// correspondences.
///
/// The points of each image are conditioned with [`cv_pinhole::hartley_normalization`], the two
/// dimensional null space of the constraints is found, and every real root of the determinant
/// cubic is forced to rank 2 and denormalized. The matrices have unit frobenius norm and are
/// returned in the order the roots are found.
///
/// ```
/// use cv_core::nalgebra::{Matrix3, Point3, Rotation3, Vector3};
/// use cv_core::sample_consensus::{Estimator, Model};
/// use cv_core::{CameraMatrix, FeatureMatch, KeyPoint, Pose, Projective, WorldPoint, WorldToCamera};
/// use seven_point::SevenPoint;
///
/// let k = Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
/// let first = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
/// let second = CameraMatrix::from_intrinsics_pose(
///     &k,
///     WorldToCamera::from_parts(Vector3::new(0.4, -0.1, 0.1), Rotation3::from_euler_angles(0.1, -0.05, 0.02)),
/// );
/// let matches: Vec<FeatureMatch<KeyPoint>> = [
///     [0.1, 0.2, 3.0], [-0.6, 0.4, 4.0], [0.8, -0.3, 3.5], [0.2, -0.7, 5.0],
///     [-0.4, -0.1, 4.5], [0.5, 0.6, 3.2], [-0.9, 0.3, 6.0],
/// ]
/// .iter()
/// .map(|&[x, y, z]| {
///     let p = WorldPoint::from_point(Point3::new(x, y, z));
///     FeatureMatch(first.project(p).unwrap(), second.project(p).unwrap())
/// })
/// .collect();
/// let hypotheses = SevenPoint::new().estimate(matches.iter().copied());
/// assert!(!hypotheses.is_empty());
/// for f in &hypotheses {
///     assert!(matches.iter().all(|m| f.residual(m) < 1e-8));
/// }
/// ```
#[derive(Copy, Clone, Debug)]
pub struct SevenPoint {
    epsilon: f64,
    max_iterations: usize,
    degeneracy: f64,
}

impl SevenPoint {
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

    /// The third smallest eigenvalue of the constraint system must exceed this fraction of the
    /// largest one, otherwise the null space has more than two dimensions and the sample is
    /// degenerate. This is also the relative size below which the cubic's leading coefficient is
    /// treated as zero.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn degeneracy(self, degeneracy: f64) -> Self {
        Self { degeneracy, ..self }
    }

    /// Computes the fundamental matrices consistent with seven pixel correspondences.
    pub fn from_matches<P: ImagePoint>(&self, matches: &[FeatureMatch<P>; 7]) -> ArrayVec<FundamentalMatrix, 3> {
        let mut solutions = ArrayVec::new();
        let t1 = match hartley_normalization(matches.iter().map(|FeatureMatch(a, _)| a.image_point())) {
            Some(t) => t,
            None => return solutions,
        };
        let t2 = match hartley_normalization(matches.iter().map(|FeatureMatch(_, b)| b.image_point())) {
            Some(t) => t,
            None => return solutions,
        };

        let mut ata = OMatrix::<f64, U9, U9>::zeros();
        for FeatureMatch(a, b) in matches {
            let a: Vector3<f64> = t1 * a.image_homogeneous();
            let b: Vector3<f64> = t2 * b.image_homogeneous();
            let mut row = OVector::<f64, U9>::zeros();
            for j in 0..3 {
                row.fixed_rows_mut::<3>(3 * j).copy_from(&(a[j] * b));
            }
            ata += row * row.transpose();
        }
        let eigens = match ata.try_symmetric_eigen(self.epsilon, self.max_iterations) {
            Some(eigens) => eigens,
            None => return solutions,
        };
        let mut order = [0, 1, 2, 3, 4, 5, 6, 7, 8];
        order.sort_unstable_by_key(|&ix| FloatOrd(eigens.eigenvalues[ix]));
        if !(eigens.eigenvalues[order[2]] > self.degeneracy * eigens.eigenvalues[order[8]]) {
            log::trace!("seven point constraints are rank deficient");
            return solutions;
        }
        let as_matrix = |ix: usize| Matrix3::from_iterator(eigens.eigenvectors.column(ix).iter().copied());
        let f1 = as_matrix(order[0]);
        let f2 = as_matrix(order[1]);

        // det(f2 + x g) is a cubic in x, which is recovered by interpolating at four points.
        let g = f1 - f2;
        let d = f2.determinant();
        let s1 = (f2 + g).determinant() - d;
        let sm1 = (f2 - g).determinant() - d;
        let s2 = (f2 + g * 2.0).determinant() - d;
        let b = 0.5 * (s1 + sm1);
        let t = 0.5 * (s1 - sm1);
        let a = (s2 - 2.0 * t - 4.0 * b) / 6.0;
        let c = t - a;

        let mut candidates: ArrayVec<Matrix3<f64>, 3> = real_cubic_roots(a, b, c, d, self.degeneracy)
            .into_iter()
            .map(|x| f2 + g * x)
            .collect();
        let scale = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
        // A vanishing cubic term means the root went to infinity, where the solution is `g`.
        if candidates.len() < 3 && a.abs() <= self.degeneracy * scale {
            candidates.push(g);
        }
        for candidate in candidates {
            let conditioned = FundamentalMatrix(candidate).recondition(self.epsilon, self.max_iterations);
            let fundamental = conditioned.and_then(|f| FundamentalMatrix(t2.transpose() * f.0 * t1).normalized());
            if let Some(fundamental) = fundamental {
                solutions.push(fundamental);
            }
        }
        solutions
    }
}

impl Default for SevenPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
            degeneracy: 1e-12,
        }
    }
}

impl<P> Estimator<FeatureMatch<P>> for SevenPoint
where
    P: ImagePoint,
{
    type Model = FundamentalMatrix;
    type ModelIter = ArrayVec<FundamentalMatrix, 3>;
    const MIN_SAMPLES: usize = 7;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<P>> + Clone,
    {
        let sample: ArrayVec<FeatureMatch<P>, 7> = data.take(7).collect();
        let sample = match sample.into_inner() {
            Ok(sample) => sample,
            Err(_) => panic!("the seven-point algorithm needs exactly seven correspondences"),
        };
        self.from_matches(&sample)
    }
}
