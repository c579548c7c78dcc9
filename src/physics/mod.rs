//! Stellar-evolution models consumed by the forward simulator.
//!
//! The inversion treats these as opaque, pure functions:
//! - draw a progenitor mass from the IMF
//! - pre-white-dwarf lifetime as a function of metallicity, helium and mass
//! - initial-final mass relation
//! - white-dwarf magnitude as a function of cooling time, mass, atmosphere and band
//!
//! Implementations must be `Send + Sync`: the forward simulator shares one instance
//! across its worker threads.

use rand::rngs::StdRng;

use crate::domain::{Atmosphere, Band};

pub mod analytic;

pub use analytic::*;

/// The four physics callables.
pub trait StellarPhysics: Send + Sync {
    /// Draw a progenitor mass (solar masses) from the initial mass function.
    fn draw_mass(&self, rng: &mut StdRng) -> f64;

    /// Pre-white-dwarf lifetime (years).
    fn lifetime(&self, z: f64, y: f64, mass: f64) -> f64;

    /// White-dwarf mass (solar masses) for a given progenitor mass.
    fn final_mass(&self, initial_mass: f64) -> f64;

    /// Present-day absolute magnitude after `cooling_time` years of cooling.
    ///
    /// Non-finite results mark the star as undetectable.
    fn cooling_magnitude(&self, cooling_time: f64, mass: f64, atmosphere: Atmosphere, band: Band) -> f64;

    /// Progenitor mass range spanned by the IMF; used to lay out diagnostic axes.
    fn progenitor_mass_range(&self) -> (f64, f64) {
        (0.6, 7.0)
    }

    /// Short label for reports.
    fn name(&self) -> &str;
}
