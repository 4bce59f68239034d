//! Bounds the number of detected features before they are matched and fed to geometric
//! estimation.
//!
//! Every strategy implements [`FeatureSelectLimit`]. Given the detected features and a limit, it
//! writes at most `limit` of them to the output. Strategies that look at the image layout also
//! take the features that are already tracked (the prior) into account, so that new features go
//! to regions that are not covered yet.
//!
//! ```
//! use cv_core::{nalgebra::Point2, KeyPoint};
//! use feature_select::{FeatureSelectLimit, SelectImage, SelectUniform};
//!
//! let detected: Vec<KeyPoint> = (0..100)
//!     .map(|i| KeyPoint(Point2::new((i % 10) as f64 * 64.0, (i / 10) as f64 * 48.0)))
//!     .collect();
//! let mut selected = vec![];
//! SelectUniform::new().select(&SelectImage::new(640, 480), true, None, &detected, 10, &mut selected);
//! assert_eq!(selected.len(), 10);
//! ```

mod settings;
mod simple;
mod uniform;

pub use settings::*;
pub use simple::*;
pub use uniform::*;

use cv_core::{nalgebra::Point2, KeyPoint};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A strategy which selects at most `limit` features out of the detected ones.
pub trait FeatureSelectLimit<P: SelectPoint> {
    /// Clears `selected` and fills it with at most `limit` of the `detected` features.
    ///
    /// When `positive` is true, features with a larger intensity are better, otherwise features
    /// with a smaller intensity are. `prior` holds the features which are already tracked in this
    /// image. If there is no prior and no more than `limit` features were detected, all of them are
    /// selected.
    ///
    /// Panics if `limit` is zero.
    fn select(
        &mut self,
        image: &SelectImage<'_>,
        positive: bool,
        prior: Option<&[P]>,
        detected: &[P],
        limit: usize,
        selected: &mut Vec<P>,
    );
}

/// A feature that can be selected.
pub trait SelectPoint: Clone {
    /// The position of the feature in pixels.
    fn image_position(&self) -> Point2<f64>;

    /// The intensity of the feature, used when the image has no intensity lookup.
    fn intensity(&self) -> f64 {
        0.0
    }
}

impl SelectPoint for KeyPoint {
    fn image_position(&self) -> Point2<f64> {
        self.0
    }
}

/// A keypoint with the response of the detector at it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ScoredKeyPoint {
    pub point: KeyPoint,
    pub intensity: f64,
}

impl SelectPoint for ScoredKeyPoint {
    fn image_position(&self) -> Point2<f64> {
        self.point.0
    }

    fn intensity(&self) -> f64 {
        self.intensity
    }
}

/// Looks up the intensity of a feature by its pixel.
pub trait FeatureIntensity {
    /// The intensity at pixel `(x, y)`, or `None` if it is outside of the image.
    fn intensity(&self, x: u32, y: u32) -> Option<f64>;
}

#[cfg(feature = "image")]
impl FeatureIntensity for image::ImageBuffer<image::Luma<f32>, Vec<f32>> {
    fn intensity(&self, x: u32, y: u32) -> Option<f64> {
        self.get_pixel_checked(x, y).map(|p| p.0[0] as f64)
    }
}

#[cfg(feature = "image")]
impl FeatureIntensity for image::GrayImage {
    fn intensity(&self, x: u32, y: u32) -> Option<f64> {
        self.get_pixel_checked(x, y).map(|p| p.0[0] as f64)
    }
}

/// The image the features were detected in.
#[derive(Clone, Copy)]
pub struct SelectImage<'a> {
    pub width: u32,
    pub height: u32,
    /// Overrides the intensity carried by the features.
    pub intensity: Option<&'a dyn FeatureIntensity>,
}

impl<'a> SelectImage<'a> {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            intensity: None,
        }
    }

    #[must_use]
    pub fn with_intensity(self, intensity: &'a dyn FeatureIntensity) -> Self {
        Self {
            intensity: Some(intensity),
            ..self
        }
    }

    /// The intensity of `point`, from the lookup when there is one and the pixel is inside of it.
    pub fn intensity<P: SelectPoint>(&self, point: &P) -> f64 {
        let position = point.image_position();
        self.intensity
            .filter(|_| position.x >= 0.0 && position.y >= 0.0)
            .and_then(|lookup| lookup.intensity(position.x as u32, position.y as u32))
            .unwrap_or_else(|| point.intensity())
    }

    /// The intensity of `point` oriented so that larger is always better.
    fn score<P: SelectPoint>(&self, point: &P, positive: bool) -> f64 {
        let intensity = self.intensity(point);
        if positive {
            intensity
        } else {
            -intensity
        }
    }
}

/// Selects every detected feature when there are no more than `limit` of them.
///
/// Returns whether the selection is complete.
fn copy_through<P: Clone>(detected: &[P], limit: usize, selected: &mut Vec<P>) -> bool {
    assert!(limit > 0, "the feature limit must be positive");
    selected.clear();
    if detected.len() <= limit {
        log::debug!(
            "{} features fit within the limit of {}, copying them through",
            detected.len(),
            limit
        );
        selected.extend_from_slice(detected);
        true
    } else {
        false
    }
}
