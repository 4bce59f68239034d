#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Two observations of the same 3d point from two views.
///
/// The type of `P` decides the coordinate convention (pixels, normalized coordinates or bearings),
/// so every match handed to one algorithm shares the same convention.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureMatch<P>(pub P, pub P);

/// Three observations of the same 3d point from three views.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureTriple<P>(pub P, pub P, pub P);
