//! # `cv`
//!
//! Batteries-included robust multi-view geometry
//!
//! This crate should only be used for documentation/reference and for quickly creating and
//! running a computer vision sample/routine. It also stores all of the multi-view geometry
//! crates of this workspace in one place for discoverability. If you are making a production
//! application, import the dependencies from this crate individually so that you don't have an
//! explosive number of dependencies. Although not recommended, you can also disable default
//! features on this crate and enable specific features on this crate just to get the
//! functionality you want.
//!
//! All of the basic computer vision types/dependencies are included in the root of the crate.
//! Modules are created to store algorithms and data structures which may or may not be used.
//! Almost all of the things in these modules come from optional libraries.
//!
//! ## Modules
//! * [`camera`] - camera models to convert image coordinates into bearings (and back)
//! * [`consensus`] - finding the best estimated model from noisy data
//! * [`geom`] - computational geometry algorithms used in computer vision
//! * [`estimate`] - estimation of models from data
//! * [`feature`] - bounding the number of detected features
//! * [`optimize`] - optimizing models to fit data

#![no_std]

pub use cv_core::{sample_consensus::*, *};

/// Camera models
pub mod camera {
    /// The pinhole camera model
    #[cfg(feature = "cv-pinhole")]
    pub use cv_pinhole as pinhole;
}

/// Consensus algorithms (RANSAC, LMedS, ARRSAC)
pub mod consensus {
    #[cfg(feature = "arrsac")]
    pub use arrsac::Arrsac;
    #[cfg(feature = "cv-consensus")]
    pub use cv_consensus::{LeastMedianSquares, Ransac, RefinedConsensus};
}

/// Computational geometry
pub mod geom {
    #[cfg(feature = "cv-geom")]
    pub use cv_geom::*;
}

/// Estimation algorithms
pub mod estimate {
    #[cfg(feature = "eight-point")]
    pub use eight_point::{EightPoint, EightPointFundamental};
    #[cfg(feature = "nister-stewenius")]
    pub use nister_stewenius::NisterStewenius;
    #[cfg(feature = "seven-point")]
    pub use seven_point::SevenPoint;
    #[cfg(feature = "trifocal")]
    pub use trifocal::{TrifocalAlgebraicPoint7, TrifocalLinearPoint7};
}

/// Feature selection
pub mod feature {
    /// Bounds the number of features by rank, randomly or uniformly over the image
    #[cfg(feature = "feature-select")]
    pub mod select {
        pub use feature_select::*;
    }
}

/// Optimization algorithms
pub mod optimize {
    #[cfg(feature = "cv-optimize")]
    pub use cv_optimize::*;

    /// Re-export of [`levenberg_marquardt`] to define custom refinement problems
    #[cfg(feature = "levenberg-marquardt")]
    pub mod lm {
        pub use levenberg_marquardt::*;
    }
}
