//! Linear triangulation of a single point from two or more views.
//!
//! Every solver here sets up the homogeneous linear system `A X = 0` (the direct linear
//! transform, or DLT) and takes the null vector of `A^T A`. The system is accumulated as a 4x4
//! matrix, so the number of observations does not affect the memory used.
//!
//! None of these triangulators enforce cheirality. The distance functions in
//! [`crate::residual`] check the depth of the point themselves.

use cv_core::{
    nalgebra::{Matrix4, RowVector4, Vector3, Vector4},
    Bearing, CameraMatrix, CameraPoint, CameraToCamera, ImagePoint, Pose, Projective,
    TriangulatorObservations, TriangulatorProjective, TriangulatorRelative, WorldPoint,
    WorldToCamera,
};
use float_ord::FloatOrd;
use num_traits::Float;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The decomposition settings shared by the linear triangulators.
///
/// ```
/// use cv_geom::triangulation::{DltSettings, DltTriangulator, ProjectiveDlt};
///
/// let settings = DltSettings::default().degeneracy(1e-10);
/// let calibrated = DltTriangulator::from(settings);
/// let projective = ProjectiveDlt::new().settings(settings);
/// ```
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct DltSettings {
    /// The convergence threshold of the symmetric eigen solver
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_epsilon"))]
    pub epsilon: f64,
    /// The iteration cap of the symmetric eigen solver
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,
    /// The ratio of the second smallest to the largest eigenvalue of the normal matrix below which
    /// the system is considered rank deficient
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_degeneracy"))]
    pub degeneracy: f64,
}

impl DltSettings {
    /// Default is `1e-12`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Default is `1000`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Default is `1e-14`.
    #[must_use]
    pub fn degeneracy(self, degeneracy: f64) -> Self {
        Self { degeneracy, ..self }
    }

    /// Finds the unit null vector of the accumulated normal matrix `A^T A`.
    ///
    /// Fails if the eigen decomposition fails, if the system is rank deficient, or if the result
    /// is not finite.
    fn solve(&self, normal: Matrix4<f64>) -> Option<Vector4<f64>> {
        let se = normal.try_symmetric_eigen(self.epsilon, self.max_iterations)?;
        let mut order = [0usize, 1, 2, 3];
        order.sort_unstable_by_key(|&ix| FloatOrd(se.eigenvalues[ix].abs()));
        let largest = se.eigenvalues[order[3]].abs();
        let second_smallest = se.eigenvalues[order[1]].abs();
        if !(largest > 0.0) || second_smallest <= self.degeneracy * largest {
            log::trace!(
                "triangulation is rank deficient: eigenvalues {:?}",
                se.eigenvalues.as_slice()
            );
            return None;
        }
        Some(se.eigenvectors.column(order[0]).into_owned()).filter(|x| x.iter().all(|n| n.is_finite()))
    }
}

impl Default for DltSettings {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            max_iterations: default_max_iterations(),
            degeneracy: default_degeneracy(),
        }
    }
}

fn default_epsilon() -> f64 {
    1e-12
}

fn default_max_iterations() -> usize {
    1000
}

fn default_degeneracy() -> f64 {
    1e-14
}

/// Implements construction from [`DltSettings`] for a linear triangulator.
macro_rules! dlt_settings {
    ($triangulator:ident) => {
        impl $triangulator {
            /// Creates the triangulator with the default [`DltSettings`].
            pub fn new() -> Self {
                Default::default()
            }

            /// Replaces the decomposition settings.
            #[must_use]
            pub fn settings(self, settings: DltSettings) -> Self {
                Self { settings }
            }
        }

        impl From<DltSettings> for $triangulator {
            fn from(settings: DltSettings) -> Self {
                Self { settings }
            }
        }
    };
}

/// Accumulates `A^T A` where `A` stacks `[b]x [R | t]` for every observation.
///
/// Only two of the three rows of each cross product are independent, but keeping all three
/// avoids picking rows that vanish for bearings perpendicular to the optical axis.
/// Returns the matrix and the number of observations.
fn calibrated_normal_matrix<B: Bearing>(
    pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
) -> (Matrix4<f64>, usize) {
    let mut normal = Matrix4::zeros();
    let mut count = 0;
    for (pose, bearing) in pairs {
        let term = bearing.bearing().cross_matrix() * pose.matrix3x4();
        normal += term.transpose() * term;
        count += 1;
    }
    (normal, count)
}

/// Flips the homogeneous vector to a non-negative `w` and scales it to unit length.
fn canonical_homogeneous(x: Vector4<f64>) -> WorldPoint {
    WorldPoint(x).normalized()
}

/// Calibrated linear triangulation with a Euclidean result.
///
/// This is the direct linear transform: each observation contributes the constraint
/// `b x ([R | t] X) = 0`, and the solution is the eigenvector of the smallest eigenvalue of
/// the normal matrix. Triangulation fails with fewer than two observations, when the rays are
/// parallel or the optical centers coincide, and when the point lies at infinity.
///
/// ```
/// use cv_core::nalgebra::{Vector3, Point3, Rotation3};
/// use cv_core::{TriangulatorRelative, CameraToCamera, CameraPoint, Pose, Projective};
/// use cv_geom::triangulation::DltTriangulator;
///
/// let point = CameraPoint::from_point(Point3::new(0.3, 0.1, 2.0));
/// let pose = CameraToCamera::from_parts(Vector3::new(0.1, 0.1, 0.1), Rotation3::new(Vector3::new(0.1, 0.1, 0.1)));
/// let bearing_a = point.bearing();
/// let bearing_b = pose.transform(point).bearing();
/// let triangulated = DltTriangulator::new().triangulate_relative(pose, bearing_a, bearing_b).unwrap();
/// let distance = (point.point().unwrap().coords - triangulated.point().unwrap().coords).norm();
/// assert!(distance < 1e-8);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct DltTriangulator {
    settings: DltSettings,
}

dlt_settings!(DltTriangulator);

impl TriangulatorObservations for DltTriangulator {
    fn triangulate_observations<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<WorldPoint> {
        let homogeneous = MetricHomogeneousDlt::from(self.settings).triangulate_homogeneous(pairs)?;
        homogeneous.point().map(WorldPoint::from_point)
    }
}

/// Calibrated linear triangulation with a homogeneous result.
///
/// Solves the same system as [`DltTriangulator`], but returns the unit length homogeneous
/// point with a non-negative `w`. Points at infinity (`w = 0`) are valid output, which makes this
/// suitable for very distant points and for scenes with nearly pure rotation.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct MetricHomogeneousDlt {
    settings: DltSettings,
}

dlt_settings!(MetricHomogeneousDlt);

impl MetricHomogeneousDlt {
    /// Triangulates the homogeneous point seen by all of the observations.
    pub fn triangulate_homogeneous<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<WorldPoint> {
        let (normal, count) = calibrated_normal_matrix(pairs);
        if count < 2 {
            return None;
        }
        self.settings.solve(normal).map(canonical_homogeneous)
    }
}

impl TriangulatorObservations for MetricHomogeneousDlt {
    fn triangulate_observations<B: Bearing>(
        &self,
        pairs: impl IntoIterator<Item = (WorldToCamera, B)>,
    ) -> Option<WorldPoint> {
        self.triangulate_homogeneous(pairs)
    }
}

/// Uncalibrated linear triangulation from camera matrices and pixel observations.
///
/// Each observation `(x, y)` of camera `P` contributes the rows `x P3 - P1` and `y P3 - P2`,
/// each scaled to unit length so that no view dominates the solution. The result is the unit
/// homogeneous point with non-negative `w`, which is only defined up to the projective ambiguity
/// of the cameras. Points at infinity are valid output.
///
/// ```
/// use cv_core::nalgebra::{Matrix3, Point3, Rotation3, Vector3};
/// use cv_core::{CameraMatrix, Pose, Projective, TriangulatorProjective, WorldPoint, WorldToCamera};
/// use cv_geom::triangulation::ProjectiveDlt;
///
/// let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
/// let first = CameraMatrix::from_intrinsics_pose(&k, WorldToCamera::identity());
/// let second = CameraMatrix::from_intrinsics_pose(
///     &k,
///     WorldToCamera::from_parts(Vector3::new(-0.5, 0.0, 0.0), Rotation3::new(Vector3::new(0.0, 0.1, 0.0))),
/// );
/// let point = WorldPoint::from_point(Point3::new(0.2, -0.1, 4.0));
/// let observations = [first, second].map(|camera| (camera, camera.project(point).unwrap()));
/// let triangulated = ProjectiveDlt::new().triangulate_projective(observations).unwrap();
/// assert!((triangulated.point().unwrap() - point.point().unwrap()).norm() < 1e-6);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct ProjectiveDlt {
    settings: DltSettings,
}

dlt_settings!(ProjectiveDlt);

impl TriangulatorProjective for ProjectiveDlt {
    fn triangulate_projective<P: ImagePoint>(
        &self,
        pairs: impl IntoIterator<Item = (CameraMatrix, P)>,
    ) -> Option<WorldPoint> {
        let mut normal = Matrix4::zeros();
        let mut count = 0;
        for (CameraMatrix(camera), point) in pairs {
            let point = point.image_point();
            let rows: [RowVector4<f64>; 2] = [
                point.x * camera.row(2) - camera.row(0),
                point.y * camera.row(2) - camera.row(1),
            ];
            for row in rows {
                let norm = row.norm();
                if norm > 0.0 {
                    let row = row / norm;
                    normal += row.transpose() * row;
                }
            }
            count += 1;
        }
        if count < 2 {
            return None;
        }
        self.settings.solve(normal).map(canonical_homogeneous)
    }
}

/// Closed form two-view triangulation by solving for the depth along the first bearing.
///
/// The point is placed on the ray of the first bearing `a` at the depth `lambda` which brings it
/// closest (in the sense of the cross product with `b`) to the ray of the second bearing:
///
/// ```text
/// lambda = -((b x R a) . (b x t)) / |b x R a|^2
/// ```
///
/// This fails when the rays are parallel. The depth is returned as is, so a negative `lambda`
/// gives a point behind the first camera.
///
/// ```
/// use cv_core::nalgebra::{Vector3, Point3, Rotation3};
/// use cv_core::{TriangulatorRelative, CameraToCamera, CameraPoint, Pose, Projective};
/// use cv_geom::triangulation::PixelDepthTriangulator;
///
/// let point = CameraPoint::from_point(Point3::new(-0.3, 0.2, 3.0));
/// let pose = CameraToCamera::from_parts(Vector3::new(0.4, 0.0, 0.1), Rotation3::new(Vector3::new(0.0, -0.1, 0.0)));
/// let triangulated = PixelDepthTriangulator::new()
///     .triangulate_relative(pose, point.bearing(), pose.transform(point).bearing())
///     .unwrap();
/// assert!((point.point().unwrap() - triangulated.point().unwrap()).norm() < 1e-9);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct PixelDepthTriangulator {
    epsilon: f64,
}

impl PixelDepthTriangulator {
    /// Creates a `PixelDepthTriangulator` with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the squared sine of the angle between the rays below which they are considered parallel.
    ///
    /// Default is `1e-12`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Computes the depth along the unnormalized bearing `a`, so the triangulated point is `lambda * a`.
    pub fn depth(&self, relative_pose: CameraToCamera, a: Vector3<f64>, b: Vector3<f64>) -> Option<f64> {
        let isometry = relative_pose.isometry();
        let rotated = isometry.rotation * a;
        let b_rotated = b.cross(&rotated);
        let denominator = b_rotated.norm_squared();
        if denominator <= self.epsilon * b.norm_squared() * rotated.norm_squared() {
            return None;
        }
        let lambda = -b_rotated.dot(&b.cross(&isometry.translation.vector)) / denominator;
        Some(lambda).filter(|lambda| lambda.is_finite())
    }
}

impl Default for PixelDepthTriangulator {
    fn default() -> Self {
        Self { epsilon: 1e-12 }
    }
}

impl TriangulatorRelative for PixelDepthTriangulator {
    fn triangulate_relative<A: Bearing, B: Bearing>(
        &self,
        relative_pose: CameraToCamera,
        a: A,
        b: B,
    ) -> Option<CameraPoint> {
        let a = a.bearing_unnormalized();
        let lambda = self.depth(relative_pose, a, b.bearing_unnormalized())?;
        Some(CameraPoint::from_point((a * lambda).into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cv_core::nalgebra::{Point3, Rotation3, UnitVector3};

    fn poses() -> [WorldToCamera; 3] {
        [
            WorldToCamera::identity(),
            WorldToCamera::from_parts(
                Vector3::new(-0.6, 0.1, 0.05),
                Rotation3::from_euler_angles(0.02, 0.15, -0.03),
            ),
            WorldToCamera::from_parts(
                Vector3::new(0.3, -0.5, 0.2),
                Rotation3::from_euler_angles(-0.1, -0.05, 0.1),
            ),
        ]
    }

    fn observations(point: WorldPoint) -> impl Iterator<Item = (WorldToCamera, UnitVector3<f64>)> + Clone {
        poses()
            .into_iter()
            .map(move |pose| (pose, pose.transform(point).bearing()))
    }

    #[test]
    fn n_view_recovers_point() {
        let point = WorldPoint::from_point(Point3::new(0.4, -0.2, 5.0));
        let triangulated = DltTriangulator::new()
            .triangulate_observations(observations(point))
            .unwrap();
        assert!((triangulated.point().unwrap() - point.point().unwrap()).norm() < 1e-8);
    }

    #[test]
    fn single_observation_fails() {
        let point = WorldPoint::from_point(Point3::new(0.4, -0.2, 5.0));
        assert!(DltTriangulator::new()
            .triangulate_observations(observations(point).take(1))
            .is_none());
    }

    #[test]
    fn coincident_centers_fail() {
        let point = WorldPoint::from_point(Point3::new(0.4, -0.2, 5.0));
        let rotated = WorldToCamera::from_parts(Vector3::zeros(), Rotation3::from_euler_angles(0.0, 0.2, 0.0));
        let pairs = [WorldToCamera::identity(), rotated]
            .map(|pose| (pose, pose.transform(point).bearing()));
        assert!(DltTriangulator::new().triangulate_observations(pairs).is_none());
    }

    #[test]
    fn settings_reach_every_solver() {
        let point = WorldPoint::from_point(Point3::new(0.4, -0.2, 5.0));
        let cameras = poses().map(CameraMatrix::from);
        let pixels = cameras.map(|camera| (camera, camera.project(point).unwrap()));
        assert!(DltTriangulator::new().triangulate_observations(observations(point)).is_some());
        assert!(MetricHomogeneousDlt::new().triangulate_homogeneous(observations(point)).is_some());
        assert!(ProjectiveDlt::new().triangulate_projective(pixels).is_some());
        // Every system is rank deficient under this ratio.
        let strict = DltSettings::default().degeneracy(1.0);
        assert!(DltTriangulator::from(strict)
            .triangulate_observations(observations(point))
            .is_none());
        assert!(MetricHomogeneousDlt::new()
            .settings(strict)
            .triangulate_homogeneous(observations(point))
            .is_none());
        assert!(ProjectiveDlt::from(strict).triangulate_projective(pixels).is_none());
    }

    #[test]
    fn homogeneous_handles_points_at_infinity() {
        let point = WorldPoint(Vector4::new(0.1, -0.05, 1.0, 0.0));
        let triangulated = MetricHomogeneousDlt::new()
            .triangulate_homogeneous(observations(point))
            .unwrap();
        assert!((triangulated.homogeneous().norm() - 1.0).abs() < 1e-12);
        assert!(triangulated.w.abs() < 1e-9);
        assert!((triangulated.xyz().normalize() - point.xyz().normalize()).norm() < 1e-9);
        assert!(DltTriangulator::new()
            .triangulate_observations(observations(point))
            .map_or(true, |p| p.point().unwrap().coords.norm() > 1e6));
    }

    #[test]
    fn homogeneous_output_is_canonical() {
        let point = WorldPoint::from_point(Point3::new(-1.0, 0.5, 3.0));
        let triangulated = MetricHomogeneousDlt::new()
            .triangulate_homogeneous(observations(point))
            .unwrap();
        assert!(triangulated.w > 0.0);
        assert!((triangulated.homogeneous().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pixel_depth_parallel_rays_fail() {
        let pose = CameraToCamera::from_parts(Vector3::new(1.0, 0.0, 0.0), Rotation3::identity());
        let bearing = Vector3::z();
        assert!(PixelDepthTriangulator::new().depth(pose, bearing, bearing).is_none());
    }

    #[test]
    fn pixel_depth_recovers_point_behind_camera() {
        let point = CameraPoint::from_point(Point3::new(0.2, 0.1, -4.0));
        let pose = CameraToCamera::from_parts(Vector3::new(0.5, 0.0, 0.0), Rotation3::identity());
        let triangulated = PixelDepthTriangulator::new()
            .triangulate_relative(pose, point.bearing(), pose.transform(point).bearing())
            .unwrap();
        assert!((triangulated.point().unwrap() - point.point().unwrap()).norm() < 1e-9);
    }
}
