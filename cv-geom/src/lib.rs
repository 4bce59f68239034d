//! This crate contains computational geometry algorithms for [Rust CV](https://github.com/rust-cv/).
//!
//! ## Triangulation
//!
//! In this problem we know the relative pose of cameras and the bearing of the same feature
//! observed in each camera frame. We want to find the point of intersection from all cameras.
//! See [`triangulation`] for the linear solvers. They do not check that the point lies in front of
//! the cameras; the distance functions in [`residual`] do.
//!
//! ## Epipolar and trifocal relations
//!
//! [`epipolar`] moves between fundamental matrices, essential matrices, projective cameras and
//! poses. [`trifocal`] does the same for the three view [`trifocal::TrifocalTensor`].
//!
//! ## Scale
//!
//! [`similarity`] estimates the scale between two images from two correspondences, and
//! `scale` (requires the `alloc` feature) resolves the unknown scale between two metric
//! reconstructions which share a view.

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod epipolar;
pub mod residual;
#[cfg(feature = "alloc")]
pub mod scale;
pub mod similarity;
pub mod triangulation;
pub mod trifocal;
