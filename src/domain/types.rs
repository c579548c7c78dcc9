//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - selected from CLI flags (`clap::ValueEnum`)
//! - used in-memory during the inversion
//! - recorded in exported result files

use std::path::PathBuf;

use clap::ValueEnum;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::InversionError;

/// Photometric band in which magnitudes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// Bolometric magnitude.
    Bol,
    /// Johnson V.
    V,
    /// Cousins R.
    R,
    /// Cousins I.
    I,
}

impl Band {
    pub fn display_name(self) -> &'static str {
        match self {
            Band::Bol => "M_bol",
            Band::V => "M_V",
            Band::R => "M_R",
            Band::I => "M_I",
        }
    }
}

/// White-dwarf atmosphere type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atmosphere {
    /// Hydrogen-dominated (DA).
    H,
    /// Helium-dominated (non-DA).
    He,
}

/// Smoothing strategy used by the convergence detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingKind {
    /// Linear fit over the most recent window of chi-square values.
    SlidingLinear,
    /// Power-law fit over the whole chi-square history.
    PowerLaw,
}

/// Noise model used to perturb the observed LF for bootstrap realizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoiseModel {
    /// `density + N(0, σ)`, clamped at zero.
    Gaussian,
    /// Poisson redraw of the effective star count `(density/σ)²`.
    Poisson,
}

/// Solar reference metallicity used as the default mean.
pub const Z_SOLAR: f64 = 0.017;
/// Solar reference helium mass fraction used as the default mean.
pub const Y_SOLAR: f64 = 0.27;

/// Model selection and its stochastic knobs.
///
/// Treated as read-only by the core; construct with [`ModellingParameters::new`] (or
/// `Default`) so the invariants the samplers rely on hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModellingParameters {
    pub metallicity_mean: f64,
    pub metallicity_sigma: f64,
    pub helium_mean: f64,
    pub helium_sigma: f64,
    /// Probability that a white dwarf has a hydrogen atmosphere.
    pub w_h: f64,
    /// Width of the zero-mean Gaussian magnitude error.
    pub sigma_m: f64,
    pub band: Band,
}

impl Default for ModellingParameters {
    fn default() -> Self {
        Self {
            metallicity_mean: Z_SOLAR,
            metallicity_sigma: 0.0,
            helium_mean: Y_SOLAR,
            helium_sigma: 0.0,
            w_h: 0.8,
            sigma_m: 0.05,
            band: Band::Bol,
        }
    }
}

impl ModellingParameters {
    pub fn new(
        metallicity: (f64, f64),
        helium: (f64, f64),
        w_h: f64,
        sigma_m: f64,
        band: Band,
    ) -> Result<Self, InversionError> {
        let params = Self {
            metallicity_mean: metallicity.0,
            metallicity_sigma: metallicity.1,
            helium_mean: helium.0,
            helium_sigma: helium.1,
            w_h,
            sigma_m,
            band,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the ranges the per-star samplers depend on.
    ///
    /// A positive mean keeps the truncated-normal rejection loop finite.
    pub fn validate(&self) -> Result<(), InversionError> {
        check_truncated_normal("metallicity", self.metallicity_mean, self.metallicity_sigma)?;
        check_truncated_normal("helium", self.helium_mean, self.helium_sigma)?;
        if !(self.helium_mean < 1.0) {
            return Err(InversionError::InvalidParameter(format!(
                "helium mean must be < 1, got {}",
                self.helium_mean
            )));
        }
        if !(self.w_h.is_finite() && (0.0..=1.0).contains(&self.w_h)) {
            return Err(InversionError::InvalidParameter(format!(
                "w_H must be in [0, 1], got {}",
                self.w_h
            )));
        }
        if !(self.sigma_m.is_finite() && self.sigma_m >= 0.0) {
            return Err(InversionError::InvalidParameter(format!(
                "sigma_M must be finite and >= 0, got {}",
                self.sigma_m
            )));
        }
        Ok(())
    }

    /// Precompute the per-star distributions.
    pub fn samplers(&self) -> Result<StarSamplers, InversionError> {
        self.validate()?;
        let normal = |mean: f64, sigma: f64, what: &str| {
            Normal::new(mean, sigma).map_err(|e| {
                InversionError::InvalidParameter(format!("{what} distribution error: {e}"))
            })
        };
        Ok(StarSamplers {
            metallicity: normal(self.metallicity_mean, self.metallicity_sigma, "metallicity")?,
            helium: normal(self.helium_mean, self.helium_sigma, "helium")?,
            magnitude_error: normal(0.0, self.sigma_m, "magnitude error")?,
            w_h: self.w_h,
        })
    }
}

fn check_truncated_normal(what: &str, mean: f64, sigma: f64) -> Result<(), InversionError> {
    if !(mean.is_finite() && mean > 0.0) {
        return Err(InversionError::InvalidParameter(format!(
            "{what} mean must be finite and > 0, got {mean}"
        )));
    }
    if !(sigma.is_finite() && sigma >= 0.0) {
        return Err(InversionError::InvalidParameter(format!(
            "{what} sigma must be finite and >= 0, got {sigma}"
        )));
    }
    Ok(())
}

/// Ready-to-sample distributions derived from [`ModellingParameters`].
#[derive(Debug, Clone, Copy)]
pub struct StarSamplers {
    metallicity: Normal<f64>,
    helium: Normal<f64>,
    magnitude_error: Normal<f64>,
    w_h: f64,
}

impl StarSamplers {
    pub fn draw_metallicity<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        draw_positive(&self.metallicity, rng)
    }

    pub fn draw_helium<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        draw_positive(&self.helium, rng)
    }

    pub fn draw_atmosphere<R: Rng + ?Sized>(&self, rng: &mut R) -> Atmosphere {
        if rng.r#gen::<f64>() < self.w_h {
            Atmosphere::H
        } else {
            Atmosphere::He
        }
    }

    pub fn draw_magnitude_error<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.magnitude_error.sample(rng)
    }
}

// Normal truncated to positive values by rejection. The mean is validated > 0, so
// each draw is accepted with probability >= 1/2.
fn draw_positive<R: Rng + ?Sized>(dist: &Normal<f64>, rng: &mut R) -> f64 {
    loop {
        let v = dist.sample(rng);
        if v > 0.0 {
            return v;
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct InversionConfig {
    pub lf_path: PathBuf,
    /// Optional initial-guess SFH file; a flat prior is built when absent.
    pub prior_path: Option<PathBuf>,
    pub prior_t_min: f64,
    pub prior_t_max: f64,
    pub prior_bins: usize,
    pub prior_rate: f64,

    pub population_size: usize,
    pub max_attempts_per_star: u64,
    pub seed: u64,

    pub smoothing: SmoothingKind,
    pub window: usize,
    pub threshold: f64,
    pub min_iterations: usize,
    pub max_iterations: usize,

    pub bootstrap_repeats: usize,
    pub noise: NoiseModel,

    pub params: ModellingParameters,

    pub export_csv: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub debug: bool,
}

/// Configuration of `sfh simulate`.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub sfh_path: PathBuf,
    pub mag_min: f64,
    pub mag_max: f64,
    pub mag_bins: usize,
    pub population_size: usize,
    pub max_attempts_per_star: u64,
    pub seed: u64,
    pub params: ModellingParameters,
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_parameters_are_valid() {
        assert!(ModellingParameters::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let err = ModellingParameters::new((0.0, 0.01), (0.27, 0.0), 0.8, 0.1, Band::V).unwrap_err();
        assert!(matches!(err, InversionError::InvalidParameter(_)));
        let err = ModellingParameters::new((0.02, 0.0), (0.27, 0.0), 1.5, 0.1, Band::V).unwrap_err();
        assert!(matches!(err, InversionError::InvalidParameter(_)));
        let err = ModellingParameters::new((0.02, 0.0), (0.27, 0.0), 0.5, -0.1, Band::V).unwrap_err();
        assert!(matches!(err, InversionError::InvalidParameter(_)));
    }

    #[test]
    fn truncated_draws_are_positive() {
        // A wide sigma relative to the mean makes rejections frequent.
        let params = ModellingParameters::new((0.01, 0.05), (0.2, 0.5), 0.5, 0.1, Band::Bol).unwrap();
        let samplers = params.samplers().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..2_000 {
            assert!(samplers.draw_metallicity(&mut rng) > 0.0);
            assert!(samplers.draw_helium(&mut rng) > 0.0);
        }
    }

    #[test]
    fn atmosphere_fraction_follows_w_h() {
        let params = ModellingParameters {
            w_h: 0.25,
            ..ModellingParameters::default()
        };
        let samplers = params.samplers().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let n_h = (0..n)
            .filter(|_| samplers.draw_atmosphere(&mut rng) == Atmosphere::H)
            .count();
        let frac = n_h as f64 / n as f64;
        assert!((frac - 0.25).abs() < 0.02, "H fraction {frac}");
    }
}
