//! Core geometry and resampling engine for calibrated N-dimensional volumes.
//!
//! A volume carries per-axis physical sampling (start, step, direction
//! cosines) that ties voxel-index space to world space through a 4x4 affine
//! matrix. This crate provides the algebra between those spaces and the
//! resampling pipeline built on top of it: linear (affine) resampling,
//! displacement-grid resampling, and uniform re-gridding.

pub mod affine;
pub mod dims;
pub mod error;
pub mod geometry;
pub mod interp;
pub mod resample;
pub mod transform;
pub mod volume;

pub use dims::{AxisKind, Dimension};
pub use error::{CoreError, Result};
pub use geometry::{Affine, Rotation, Vec3};
pub use interp::Order;
pub use transform::{TransformChain, TransformLink};
pub use volume::{Sampling, Volume};
