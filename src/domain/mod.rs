//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`Band`, `SmoothingKind`, `NoiseModel`)
//! - the per-star modelling parameters (`ModellingParameters`)
//! - the run configuration assembled from CLI flags (`InversionConfig`)

pub mod types;

pub use types::*;
