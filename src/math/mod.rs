//! Mathematical utilities: least squares, robust statistics, histograms, seeding.

pub mod histogram;
pub mod ols;
pub mod seed;
pub mod stats;

pub use histogram::*;
pub use ols::*;
pub use seed::*;
pub use stats::*;
