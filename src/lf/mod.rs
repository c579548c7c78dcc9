//! Observed luminosity function.

pub mod observed;

pub use observed::*;
