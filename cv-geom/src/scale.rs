//! Resolving the scale ambiguity between two metric reconstructions.
//!
//! Two reconstructions which are each metric (up to their own scale) and which share one view can
//! be brought into the same frame. Every feature observed in all views of both scenes is
//! triangulated in each scene relative to the shared view. The ratio of its depths in the shared
//! view is one estimate of the scale between the scenes. Outliers are common, so the estimate is
//! taken from the tightest cluster of ratios.

use crate::triangulation::MetricHomogeneousDlt;
use alloc::vec::Vec;
use cv_core::{
    nalgebra::{IsometryMatrix3, Point3},
    Bearing, CameraToCamera, Pose, WorldPoint, WorldToCamera, WorldToWorld,
};
use float_ord::FloatOrd;
use num_traits::Float;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A similarity transform: points are first scaled about the origin and then moved by the
/// isometry.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ScaleIsometry {
    pub scale: f64,
    pub isometry: WorldToWorld,
}

impl ScaleIsometry {
    /// Applies the scale and then the isometry. Points at infinity are only rotated.
    pub fn transform(&self, point: WorldPoint) -> WorldPoint {
        let mut scaled = point;
        scaled.0.x *= self.scale;
        scaled.0.y *= self.scale;
        scaled.0.z *= self.scale;
        self.isometry.transform(scaled)
    }

    pub fn transform_point(&self, point: Point3<f64>) -> Point3<f64> {
        self.isometry.isometry() * (point * self.scale)
    }
}

/// One metric reconstruction, as seen by [`ResolveSceneScale`].
///
/// `poses[0]` must be the view shared with the other scene. `observations` holds the bearing of
/// every common feature in every view, feature major: the observation of feature `f` in view `v`
/// is `observations[f * poses.len() + v]`.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a, B> {
    pub poses: &'a [WorldToCamera],
    pub observations: &'a [B],
}

impl<'a, B> Scene<'a, B> {
    fn features(&self) -> usize {
        self.observations.len() / self.poses.len()
    }
}

/// Computes the [`ScaleIsometry`] taking the world of one scene into the world of another.
#[derive(Debug, Clone)]
pub struct ResolveSceneScale {
    window_fraction: f64,
    infinity_tolerance: f64,
    triangulator: MetricHomogeneousDlt,
    scales: Vec<f64>,
}

impl ResolveSceneScale {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fraction of the scale samples which form the window searched for the tightest cluster.
    ///
    /// Default: `0.1`
    #[must_use]
    pub fn window_fraction(self, window_fraction: f64) -> Self {
        Self {
            window_fraction,
            ..self
        }
    }

    /// A triangulated point whose unit homogeneous `w` is at most this is treated as being at
    /// infinity and gives no scale sample.
    ///
    /// Default: `1e-12`
    #[must_use]
    pub fn infinity_tolerance(self, infinity_tolerance: f64) -> Self {
        Self {
            infinity_tolerance,
            ..self
        }
    }

    #[must_use]
    pub fn triangulator(self, triangulator: MetricHomogeneousDlt) -> Self {
        Self {
            triangulator,
            ..self
        }
    }

    /// The scale samples gathered by the last call to [`ResolveSceneScale::resolve`], sorted.
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Finds the transform from the world of `first` to the world of `second`.
    ///
    /// Returns `None` if no feature could be triangulated in front of the shared view in both
    /// scenes.
    ///
    /// # Panics
    ///
    /// Panics if either scene has no views, if the observations do not fill every view of every
    /// feature, or if the scenes disagree on the number of features.
    pub fn resolve<B>(&mut self, first: Scene<'_, B>, second: Scene<'_, B>) -> Option<ScaleIsometry>
    where
        B: Bearing + Clone,
    {
        assert!(!first.poses.is_empty() && !second.poses.is_empty());
        assert_eq!(first.observations.len() % first.poses.len(), 0);
        assert_eq!(second.observations.len() % second.poses.len(), 0);
        let features = first.features();
        assert_eq!(features, second.features());

        self.scales.clear();
        self.scales.reserve(features);
        let mut failed_triangulate = 0usize;
        let mut failed_infinity = 0usize;
        let mut failed_behind = 0usize;
        for feature in 0..features {
            let (p1, p2) = match (
                self.triangulate_local(&first, feature),
                self.triangulate_local(&second, feature),
            ) {
                (Some(p1), Some(p2)) => (p1, p2),
                _ => {
                    failed_triangulate += 1;
                    continue;
                }
            };
            if p1.0.w.abs() <= self.infinity_tolerance || p2.0.w.abs() <= self.infinity_tolerance {
                failed_infinity += 1;
                continue;
            }
            let z1 = p1.0.z / p1.0.w;
            let z2 = p2.0.z / p2.0.w;
            if z1 <= 0.0 || z2 <= 0.0 {
                failed_behind += 1;
                continue;
            }
            self.scales.push(z2 / z1);
        }
        log::debug!(
            "scale samples {}/{} (triangulate failed {}, infinity {}, behind {})",
            self.scales.len(),
            features,
            failed_triangulate,
            failed_infinity,
            failed_behind
        );

        let scale = self.select_scale()?;
        // The shared view in the units of the second scene, then into the second world.
        let first_to_view = first.poses[0].isometry();
        let scaled_first_to_view = IsometryMatrix3::from_parts(
            (first_to_view.translation.vector * scale).into(),
            first_to_view.rotation,
        );
        let view_to_second = second.poses[0].isometry().inverse();
        Some(ScaleIsometry {
            scale,
            isometry: WorldToWorld(view_to_second * scaled_first_to_view),
        })
    }

    /// Triangulates a feature in the frame of the shared view of the scene.
    fn triangulate_local<B: Bearing + Clone>(
        &self,
        scene: &Scene<'_, B>,
        feature: usize,
    ) -> Option<WorldPoint> {
        let views = scene.poses.len();
        let observations = &scene.observations[feature * views..(feature + 1) * views];
        let shared = scene.poses[0];
        let pairs = scene.poses.iter().zip(observations).map(|(&pose, bearing)| {
            let local: CameraToCamera = CameraToCamera::from_world_poses(shared, pose);
            (WorldToCamera(local.isometry()), bearing.clone())
        });
        self.triangulator.triangulate_homogeneous(pairs)
    }

    /// Picks the middle of the sorted window of samples with the smallest range.
    fn select_scale(&mut self) -> Option<f64> {
        match self.scales.len() {
            0 => return None,
            1 => return Some(self.scales[0]),
            _ => {}
        }
        self.scales.sort_unstable_by_key(|&s| FloatOrd(s));
        let len = self.scales.len();
        let mut window = ((len as f64 * self.window_fraction) as usize).max(1);
        if window % 2 == 0 {
            window += 1;
        }
        if window > len {
            window = if len % 2 == 0 { len - 1 } else { len };
        }
        let mut best_value = self.scales[window / 2];
        let mut best_range = self.scales[window - 1] - self.scales[0];
        for i in window..len {
            let range = self.scales[i] - self.scales[i + 1 - window];
            if range < best_range {
                best_range = range;
                best_value = self.scales[i - window / 2];
            }
        }
        log::trace!("scale {} with window {} range {}", best_value, window, best_range);
        Some(best_value)
    }
}

impl Default for ResolveSceneScale {
    fn default() -> Self {
        Self {
            window_fraction: 0.1,
            infinity_tolerance: 1e-12,
            triangulator: MetricHomogeneousDlt::new(),
            scales: Vec::new(),
        }
    }
}
