//! Iterative inversion of the luminosity function.
//!
//! - [`Inverter`]: one forward-simulate / compare / refine step
//! - [`ConvergenceDetector`]: decides when the chi-square history has flattened
//! - [`run_to_convergence`]: the per-run loop over an [`InversionState`]
//! - [`UncertaintyResampler`]: bootstrap over perturbed luminosity functions

pub mod bootstrap;
pub mod convergence;
pub mod inverter;
pub mod state;

pub use bootstrap::*;
pub use convergence::*;
pub use inverter::*;
pub use state::*;
