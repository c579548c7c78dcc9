//! Closed-form stand-ins for the stellar-evolution tables.
//!
//! - IMF: single power law `dN/dM ∝ M^-α` over `[mass_min, mass_max]`, sampled by
//!   inverse CDF
//! - lifetime: `t = t_sun · M^-2.5`, lengthened slightly at higher metallicity and
//!   shortened at higher helium content
//! - IFMR: linear, `M_f = a + b·M_i`, capped at the Chandrasekhar mass
//! - cooling: Mestel law `L ∝ M · t^-7/5` converted to magnitudes, with fixed
//!   offsets for atmosphere type and band
//!
//! These reproduce the qualitative behaviour the inversion relies on (old
//! populations produce faint white dwarfs, young ones bright) without tying the
//! crate to any published table.

use rand::Rng;
use rand::rngs::StdRng;

use crate::domain::{Atmosphere, Band, Y_SOLAR, Z_SOLAR};
use crate::physics::StellarPhysics;

/// Main-sequence lifetime of a one-solar-mass star (years).
const T_SUN: f64 = 1.0e10;
/// Chandrasekhar mass (solar masses).
const M_CHANDRASEKHAR: f64 = 1.38;
/// Reference point of the cooling law: a 0.6 M_sun white dwarf after 1e8 years.
const COOLING_T0: f64 = 1.0e8;
const COOLING_M0: f64 = 0.6;
const COOLING_MAG0: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticPhysics {
    pub imf_slope: f64,
    pub mass_min: f64,
    pub mass_max: f64,
    pub ifmr_intercept: f64,
    pub ifmr_slope: f64,
    /// Cooling-time stretch for helium atmospheres (they fade faster).
    pub he_cooling_factor: f64,
}

impl Default for AnalyticPhysics {
    fn default() -> Self {
        Self {
            imf_slope: 2.35,
            mass_min: 0.6,
            mass_max: 7.0,
            ifmr_intercept: 0.394,
            ifmr_slope: 0.109,
            he_cooling_factor: 1.15,
        }
    }
}

impl AnalyticPhysics {
    fn band_offset(band: Band) -> f64 {
        match band {
            Band::Bol => 0.0,
            Band::V => 0.4,
            Band::R => 0.1,
            Band::I => -0.2,
        }
    }
}

impl StellarPhysics for AnalyticPhysics {
    fn draw_mass(&self, rng: &mut StdRng) -> f64 {
        let u: f64 = rng.r#gen();
        let a = 1.0 - self.imf_slope;
        if a.abs() < 1e-12 {
            // α = 1: logarithmic CDF.
            return self.mass_min * (self.mass_max / self.mass_min).powf(u);
        }
        let lo = self.mass_min.powf(a);
        let hi = self.mass_max.powf(a);
        (lo + u * (hi - lo)).powf(1.0 / a)
    }

    fn lifetime(&self, z: f64, y: f64, mass: f64) -> f64 {
        if !(mass > 0.0) {
            return f64::INFINITY;
        }
        let y = y.clamp(0.0, 0.95);
        let metal_factor = (z / Z_SOLAR).max(1e-6).powf(0.1);
        let helium_factor = ((1.0 - y) / (1.0 - Y_SOLAR)).powi(2);
        T_SUN * mass.powf(-2.5) * metal_factor * helium_factor
    }

    fn final_mass(&self, initial_mass: f64) -> f64 {
        (self.ifmr_intercept + self.ifmr_slope * initial_mass).min(M_CHANDRASEKHAR)
    }

    fn cooling_magnitude(&self, cooling_time: f64, mass: f64, atmosphere: Atmosphere, band: Band) -> f64 {
        if !(cooling_time > 0.0 && mass > 0.0) {
            return f64::NAN;
        }
        let t = match atmosphere {
            Atmosphere::H => cooling_time,
            Atmosphere::He => cooling_time * self.he_cooling_factor,
        };
        // M = M0 - 2.5 log10(L/L0), L/L0 = (M/M0) (t/t0)^-1.4
        let log_l = (mass / COOLING_M0).log10() - 1.4 * (t / COOLING_T0).log10();
        COOLING_MAG0 - 2.5 * log_l + Self::band_offset(band)
    }

    fn progenitor_mass_range(&self) -> (f64, f64) {
        (self.mass_min, self.mass_max)
    }

    fn name(&self) -> &str {
        "analytic (power-law IMF, linear IFMR, Mestel cooling)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn imf_draws_stay_in_range_and_favour_low_masses() {
        let physics = AnalyticPhysics::default();
        let mut rng = StdRng::seed_from_u64(17);
        let draws: Vec<f64> = (0..20_000).map(|_| physics.draw_mass(&mut rng)).collect();
        assert!(draws.iter().all(|&m| (0.6..=7.0).contains(&m)));
        let below_two = draws.iter().filter(|&&m| m < 2.0).count() as f64 / draws.len() as f64;
        // Analytic fraction: (0.6^-1.35 - 2^-1.35) / (0.6^-1.35 - 7^-1.35) ≈ 0.83
        assert!((below_two - 0.83).abs() < 0.02, "fraction below 2 Msun: {below_two}");
    }

    #[test]
    fn massive_stars_die_young() {
        let physics = AnalyticPhysics::default();
        let sun = physics.lifetime(Z_SOLAR, Y_SOLAR, 1.0);
        assert!((sun - T_SUN).abs() < 1.0);
        assert!(physics.lifetime(Z_SOLAR, Y_SOLAR, 3.0) < 1e9);
        assert!(physics.lifetime(Z_SOLAR, 0.35, 1.0) < sun);
        assert!(physics.lifetime(0.03, Y_SOLAR, 1.0) > sun);
    }

    #[test]
    fn ifmr_is_monotone_and_capped() {
        let physics = AnalyticPhysics::default();
        assert!(physics.final_mass(1.0) < physics.final_mass(3.0));
        assert!(physics.final_mass(100.0) <= M_CHANDRASEKHAR);
    }

    #[test]
    fn white_dwarfs_fade_with_cooling_time() {
        let physics = AnalyticPhysics::default();
        let young = physics.cooling_magnitude(1e8, 0.6, Atmosphere::H, Band::Bol);
        let old = physics.cooling_magnitude(1e10, 0.6, Atmosphere::H, Band::Bol);
        assert!((young - COOLING_MAG0).abs() < 1e-12);
        assert!((old - (COOLING_MAG0 + 7.0)).abs() < 1e-9);
        let he = physics.cooling_magnitude(1e10, 0.6, Atmosphere::He, Band::Bol);
        assert!(he > old);
        assert!(physics.cooling_magnitude(0.0, 0.6, Atmosphere::H, Band::V).is_nan());
    }
}
