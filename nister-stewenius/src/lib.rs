//! The five-point relative pose solver of Stewenius, Engels and Nister.
//!
//! The solver works directly on bearings, so the correspondences can be normalized keypoints
//! or unit vectors pointing out of the optical centers. It yields up to ten essential matrices,
//! one for every real root of the tenth degree polynomial system. Use a consensus algorithm
//! with more correspondences to pick the right one.

#![no_std]

use arrayvec::ArrayVec;
use cv_core::{
    nalgebra::{
        self,
        dimension::{U10, U20, U4, U5, U9},
        DimName, Matrix3, OMatrix, OVector, UnitVector3, Vector3, Vector4,
    },
    sample_consensus::Estimator,
    Bearing, FeatureMatch,
};
use cv_pinhole::EssentialMatrix;
use float_ord::FloatOrd;
use num_traits::Float;

const BASIS_XXX: usize = 0;
const BASIS_XXY: usize = 1;
const BASIS_XYY: usize = 2;
const BASIS_YYY: usize = 3;
const BASIS_XXZ: usize = 4;
const BASIS_XYZ: usize = 5;
const BASIS_YYZ: usize = 6;
const BASIS_XZZ: usize = 7;
const BASIS_YZZ: usize = 8;
const BASIS_ZZZ: usize = 9;
const BASIS_XX: usize = 10;
const BASIS_XY: usize = 11;
const BASIS_YY: usize = 12;
const BASIS_XZ: usize = 13;
const BASIS_YZ: usize = 14;
const BASIS_ZZ: usize = 15;
const BASIS_X: usize = 16;
const BASIS_Y: usize = 17;
const BASIS_Z: usize = 18;
const BASIS_1: usize = 19;


type PolyBasisVec = OVector<f64, U20>;
type NullspaceMat = OMatrix<f64, U9, U4>;
type ConstraintMat = OMatrix<f64, U10, U20>;
type Square10 = OMatrix<f64, U10, U10>;

fn encode_epipolar_equation(
    a: &[UnitVector3<f64>; 5],
    b: &[UnitVector3<f64>; 5],
) -> OMatrix<f64, U5, U9> {
    let mut out: OMatrix<f64, U5, U9> = nalgebra::zero();
    for i in 0..U5::dim() {
        let mut row = OVector::<f64, U9>::zeros();
        let ap = a[i].into_inner();
        let bp = b[i].into_inner();
        for j in 0..3 {
            let v = ap[j] * bp;
            row.fixed_rows_mut::<3>(3 * j).copy_from(&v);
        }
        out.row_mut(i).copy_from(&row.transpose());
    }
    out
}

/// Finds the four dimensional null space of the epipolar constraints of five correspondences.
///
/// Returns `None` if the decomposition fails or if the constraints have rank below five, which
/// happens when correspondences are repeated or all points are coplanar with both centers.
pub fn five_points_nullspace_basis(
    a: &[UnitVector3<f64>; 5],
    b: &[UnitVector3<f64>; 5],
    solver: &NisterStewenius,
) -> Option<NullspaceMat> {
    let epipolar_constraint = encode_epipolar_equation(a, b);
    let ee = epipolar_constraint.transpose() * epipolar_constraint;
    let m = ee.try_symmetric_eigen(solver.epsilon, solver.max_iterations)?;
    // We need to sort the eigenvectors by their corresponding eigenvalue.
    let mut sources = [0, 1, 2, 3, 4, 5, 6, 7, 8];
    sources.sort_unstable_by_key(|&ix| FloatOrd(m.eigenvalues[ix]));
    // The constraints must have rank 5 so that the null space has exactly 4 dimensions.
    let largest = m.eigenvalues[sources[8]];
    if !(m.eigenvalues[sources[4]] > solver.degeneracy * largest) {
        log::trace!("five point constraints are rank deficient");
        return None;
    }
    let mut nullspace = NullspaceMat::zeros();
    // Place the null space vectors into the null matrix.
    for (&ix, mut column) in sources.iter().zip(nullspace.column_iter_mut()) {
        column.copy_from(&m.eigenvectors.column(ix));
    }
    Some(nullspace)
}

fn o1(a: Vector4<f64>, b: Vector4<f64>) -> PolyBasisVec {
    let mut res = PolyBasisVec::zeros();
    res[BASIS_XX] = a.x * b.x;
    res[BASIS_XY] = a.x * b.y + a.y * b.x;
    res[BASIS_XZ] = a.x * b.z + a.z * b.x;
    res[BASIS_YY] = a.y * b.y;
    res[BASIS_YZ] = a.y * b.z + a.z * b.y;
    res[BASIS_ZZ] = a.z * b.z;
    res[BASIS_X] = a.x * b.w + a.w * b.x;
    res[BASIS_Y] = a.y * b.w + a.w * b.y;
    res[BASIS_Z] = a.z * b.w + a.w * b.z;
    res[BASIS_1] = a.w * b.w;
    res
}

fn o2(a: PolyBasisVec, b: Vector4<f64>) -> PolyBasisVec {
    let mut res = PolyBasisVec::zeros();
    res[BASIS_XXX] = a[BASIS_XX] * b.x;
    res[BASIS_XXY] = a[BASIS_XX] * b.y + a[BASIS_XY] * b.x;
    res[BASIS_XXZ] = a[BASIS_XX] * b.z + a[BASIS_XZ] * b.x;
    res[BASIS_XYY] = a[BASIS_XY] * b.y + a[BASIS_YY] * b.x;
    res[BASIS_XYZ] = a[BASIS_XY] * b.z + a[BASIS_YZ] * b.x + a[BASIS_XZ] * b.y;
    res[BASIS_XZZ] = a[BASIS_XZ] * b.z + a[BASIS_ZZ] * b.x;
    res[BASIS_YYY] = a[BASIS_YY] * b.y;
    res[BASIS_YYZ] = a[BASIS_YY] * b.z + a[BASIS_YZ] * b.y;
    res[BASIS_YZZ] = a[BASIS_YZ] * b.z + a[BASIS_ZZ] * b.y;
    res[BASIS_ZZZ] = a[BASIS_ZZ] * b.z;
    res[BASIS_XX] = a[BASIS_XX] * b.w + a[BASIS_X] * b.x;
    res[BASIS_XY] = a[BASIS_XY] * b.w + a[BASIS_X] * b.y + a[BASIS_Y] * b.x;
    res[BASIS_XZ] = a[BASIS_XZ] * b.w + a[BASIS_X] * b.z + a[BASIS_Z] * b.x;
    res[BASIS_YY] = a[BASIS_YY] * b.w + a[BASIS_Y] * b.y;
    res[BASIS_YZ] = a[BASIS_YZ] * b.w + a[BASIS_Y] * b.z + a[BASIS_Z] * b.y;
    res[BASIS_ZZ] = a[BASIS_ZZ] * b.w + a[BASIS_Z] * b.z;
    res[BASIS_X] = a[BASIS_X] * b.w + a[BASIS_1] * b.x;
    res[BASIS_Y] = a[BASIS_Y] * b.w + a[BASIS_1] * b.y;
    res[BASIS_Z] = a[BASIS_Z] * b.w + a[BASIS_1] * b.z;
    res[BASIS_1] = a[BASIS_1] * b.w;
    res
}

fn five_points_polynomial_constraints(nullspace: &NullspaceMat) -> ConstraintMat {
    // Build the polynomial form of E (equation (8) in Stewenius et al. [1])
    let mut e_poly = [[Vector4::zeros(); 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let x = nullspace[(3 * i + j, 0)];
            let y = nullspace[(3 * i + j, 1)];
            let z = nullspace[(3 * i + j, 2)];
            let w = nullspace[(3 * i + j, 3)];
            e_poly[i][j] = Vector4::new(x, y, z, w);
        }
    }

    // The constraint matrix.
    let mut m = ConstraintMat::zeros();
    // Determinant constraint det(E) = 0; equation (19) of Nister [2].
    m.row_mut(0).copy_from(
        &(o2(
            o1(e_poly[0][1], e_poly[1][2]) - o1(e_poly[0][2], e_poly[1][1]),
            e_poly[2][0],
        ) + o2(
            o1(e_poly[0][2], e_poly[1][0]) - o1(e_poly[0][0], e_poly[1][2]),
            e_poly[2][1],
        ) + o2(
            o1(e_poly[0][0], e_poly[1][1]) - o1(e_poly[0][1], e_poly[1][0]),
            e_poly[2][2],
        ))
        .transpose(),
    );

    // Cubic singular values constraint.
    // Equation (20).
    let mut eet = [[PolyBasisVec::zeros(); 3]; 3];
    for i in 0..3 {
        // Since EET is symmetric, we only compute
        for j in 0..3 {
            // its upper triangular part.
            if i <= j {
                eet[i][j] = o1(e_poly[i][0], e_poly[j][0])
                    + o1(e_poly[i][1], e_poly[j][1])
                    + o1(e_poly[i][2], e_poly[j][2]);
            } else {
                eet[i][j] = eet[j][i];
            }
        }
    }

    // Equation (21).
    let mut l = eet;
    let trace = 0.5 * (eet[0][0] + eet[1][1] + eet[2][2]);
    #[allow(clippy::needless_range_loop)]
    for i in 0..3 {
        l[i][i] -= trace;
    }

    // Equation (23).
    #[allow(clippy::needless_range_loop)]
    for i in 0..3 {
        for j in 0..3 {
            let leij =
                o2(l[i][0], e_poly[0][j]) + o2(l[i][1], e_poly[1][j]) + o2(l[i][2], e_poly[2][j]);
            m.row_mut(1 + i * 3 + j).copy_from(&leij.transpose());
        }
    }

    m
}

/// Solves for the null vector of `m - lambda I`.
///
/// The smallest singular value must be at most `null_tolerance` relative to the largest for the
/// eigenvalue to be accepted.
fn compute_eigenvector(
    m: &Square10,
    lambda: f64,
    solver: &NisterStewenius,
) -> Option<OVector<f64, U10>> {
    let svd = (m - Square10::from_diagonal_element(lambda)).try_svd(
        false,
        true,
        solver.epsilon,
        solver.max_iterations,
    )?;
    // Ensure that the singular value is below a threshold.
    if svd.singular_values[9] <= solver.null_tolerance * svd.singular_values[0] {
        Some(svd.v_t?.row(9).transpose())
    } else {
        None
    }
}

fn essentials_from_action_ebasis<'a>(
    at: Square10,
    eb: NullspaceMat,
    solver: &'a NisterStewenius,
) -> impl Iterator<Item = EssentialMatrix> + 'a {
    let eigenvalues = at.complex_eigenvalues();
    (0..eigenvalues.len())
        .filter_map(move |i| {
            let e = eigenvalues[i];
            // Roots are accepted as real when the imaginary part is small relative to them.
            if e.im.abs() <= solver.imaginary_tolerance * e.re.abs().max(1.0) {
                // Solve for the eigen vector.
                compute_eigenvector(&at, e.re, solver).map(|v| v.fixed_rows::<4>(5).into_owned())
            } else {
                None
            }
        })
        .map(move |vector| Matrix3::from_iterator((eb * vector).iter().copied()))
        .map(EssentialMatrix)
}

/// Takes in two sets of bearings.
/// Returns all essential matrix solutions.
fn five_points_relative_pose<'a>(
    a: &[UnitVector3<f64>; 5],
    b: &[UnitVector3<f64>; 5],
    solver: &'a NisterStewenius,
) -> impl Iterator<Item = EssentialMatrix> + 'a {
    // Step 1: Nullspace Extraction.
    let e_basis = if let Some(m) = five_points_nullspace_basis(a, b, solver) {
        m
    } else {
        return essentials_from_action_ebasis(Square10::zeros(), NullspaceMat::zeros(), solver);
    };

    // Step 2: Constraint Expansion.
    let e_constraints = five_points_polynomial_constraints(&e_basis);

    // Step 3: Gauss-Jordan Elimination (done thanks to a LU decomposition).
    let c_lu = e_constraints.fixed_slice::<10, 10>(0, 0).full_piv_lu();
    let m = if let Some(m) = c_lu.solve(&e_constraints.fixed_slice::<10, 10>(0, 10).into_owned()) {
        m
    } else {
        return essentials_from_action_ebasis(Square10::zeros(), NullspaceMat::zeros(), solver);
    };

    // For next steps we follow the matlab code given in Stewenius et al [1].

    // Build action matrix.

    let mut at = Square10::zeros();
    at.fixed_slice_mut::<3, 10>(0, 0)
        .copy_from(&m.fixed_slice::<3, 10>(0, 0));

    at.row_mut(3).copy_from(&m.row(4));
    at.row_mut(4).copy_from(&m.row(5));
    at.row_mut(5).copy_from(&m.row(7));
    at[(6, 0)] = -1.0;
    at[(7, 1)] = -1.0;
    at[(8, 3)] = -1.0;
    at[(9, 6)] = -1.0;

    essentials_from_action_ebasis(at, e_basis, solver)
}

/// Implements the 5-point algorithm from the paper "Recent developments on direct relative orientation".
///
/// The hypotheses are returned in the order the eigenvalues of the action matrix are found.
#[derive(Copy, Clone, Debug)]
pub struct NisterStewenius {
    epsilon: f64,
    max_iterations: usize,
    degeneracy: f64,
    imaginary_tolerance: f64,
    null_tolerance: f64,
}

impl NisterStewenius {
    pub fn new() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
            degeneracy: 1e-12,
            imaginary_tolerance: 1e-8,
            null_tolerance: 1e-9,
        }
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

    /// The fifth smallest eigenvalue of the constraint system must exceed this fraction of the
    /// largest one, otherwise the sample is degenerate.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn degeneracy(self, degeneracy: f64) -> Self {
        Self { degeneracy, ..self }
    }

    /// A root is real when its imaginary part is at most this times `max(1, |re|)`.
    ///
    /// Default: `1e-8`
    #[must_use]
    pub fn imaginary_tolerance(self, imaginary_tolerance: f64) -> Self {
        Self {
            imaginary_tolerance,
            ..self
        }
    }

    /// A root is kept when the smallest singular value of `A - root I` is at most this times the
    /// largest one.
    ///
    /// Default: `1e-9`
    #[must_use]
    pub fn null_tolerance(self, null_tolerance: f64) -> Self {
        Self {
            null_tolerance,
            ..self
        }
    }

    /// Computes every essential matrix consistent with exactly five bearing correspondences.
    pub fn from_matches<B: Bearing>(
        &self,
        a: [B; 5],
        b: [B; 5],
    ) -> ArrayVec<EssentialMatrix, 10> {
        let a = a.map(|a| a.bearing());
        let b = b.map(|b| b.bearing());
        five_points_relative_pose(&a, &b, self).collect()
    }
}

impl Default for NisterStewenius {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Estimator<FeatureMatch<B>> for NisterStewenius
where
    B: Bearing,
{
    type Model = EssentialMatrix;

    type ModelIter = ArrayVec<EssentialMatrix, 10>;

    const MIN_SAMPLES: usize = 5;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<B>> + Clone,
    {
        let mut a = [UnitVector3::new_unchecked(Vector3::z()); 5];
        let mut b = [UnitVector3::new_unchecked(Vector3::z()); 5];
        let mut count = 0;
        for ((a, b), FeatureMatch(ma, mb)) in a.iter_mut().zip(b.iter_mut()).zip(data) {
            *a = ma.bearing();
            *b = mb.bearing();
            count += 1;
        }
        assert!(count == 5);
        let hypotheses: ArrayVec<EssentialMatrix, 10> =
            five_points_relative_pose(&a, &b, self).collect();
        log::trace!("five point produced {} hypotheses", hypotheses.len());
        hypotheses
    }
}
