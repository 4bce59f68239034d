//! # Rust CV Core
//!
//! This library provides the common abstractions and types used by the multi-view geometry crates.
//! Every estimator, triangulator, refiner and consensus driver in the workspace speaks in terms of
//! the types specified here: keypoints, bearings, poses, projective points, camera matrices and
//! correspondences. The crate is designed to be very small so that it adds negligable build time.
//!
//! The crate is designed to work with `#![no_std]`, even without an allocator. `libm` is used
//! (indirectly through [`num-traits`]) for all math algorithms that aren't present in `core`.
//!
//! ## Coordinates
//!
//! A correspondence is always expressed in one coordinate convention which is fixed by its type:
//!
//! * [`KeyPoint`] is a location on the image in pixels
//! * a normalized keypoint (from a camera model crate like `cv-pinhole`) lives on the virtual image plane
//! * a [`Bearing`] such as [`nalgebra::UnitVector3`] is a pointing vector out of the optical center
//!
//! Since [`FeatureMatch`] and [`FeatureTriple`] are generic over the point type, it is not possible
//! to hand pixel coordinates to an algorithm that expects calibrated ones by accident.
//!
//! ## Triangulation
//!
//! Several of the traits within `cv-core`, such as [`TriangulatorObservations`], must perform a process
//! called [triangulation](https://en.wikipedia.org/wiki/Triangulation). We typically have some of the
//! following data:
//!
//! * [The pose of a camera](WorldToCamera)
//! * [The relative pose of a camera](CameraToCamera)
//! * [The projection matrix of an uncalibrated camera](CameraMatrix)
//! * [A bearing direction at which lies a feature](Bearing)
//!
//! We have to take this data and produce a 3d point. Cameras have an optical center which all bearings protrude from.
//! What typically happens in triangulation is that we have (at least) two optical centers and a bearing out of
//! each of those optical centers approximately pointing towards the 3d point. The bearings wont actually
//! intersect since they are based on noisy data, which is why different triangulation algorithms exist.
//!
//! - `p` the point we are trying to triangulate
//! - `a` the normalized keypoint on camera A
//! - `b` the normalized keypoint on camera B
//! - `O` the optical center of a camera
//! - `@` the virtual image plane
//!
//! ```text
//!                        @
//!                        @
//!               p--------b--------O
//!              /         @
//!             /          @
//!            /           @
//!           /            @
//!   @@@@@@@a@@@@@
//!         /
//!        /
//!       /
//!      O
//! ```
//!
//! ## Sample consensus
//!
//! Estimators implement [`sample_consensus::Estimator`] and their models implement
//! [`sample_consensus::Model`]. When a different cost function should be used to score models than
//! the one built into the model, a [`DistanceFromModel`] can be plugged into the consensus driver
//! instead. Refinement of a consensus model over its inliers is expressed with [`ModelRefiner`].

#![no_std]

mod bearing;
mod camera;
mod distance;
mod keypoint;
mod matches;
mod point;
mod pose;
mod projection;
mod triangulation;

pub use bearing::*;
pub use camera::*;
pub use distance::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use point::*;
pub use pose::*;
pub use projection::*;
pub use sample_consensus;
pub use triangulation::*;
