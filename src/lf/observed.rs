//! Observed white-dwarf luminosity function.
//!
//! Immutable once built. It is both the inversion target and the template the
//! bootstrap resampler perturbs ([`ObservedLuminosityFunction::perturbed`] returns a
//! new value; the original is never touched).

use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::domain::NoiseModel;
use crate::error::InversionError;

/// One magnitude bin of the observed LF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LfBin {
    pub centre: f64,
    pub width: f64,
    /// Star-count density (stars per unit volume per magnitude).
    pub density: f64,
    /// One-sigma uncertainty on `density`. Non-finite or non-positive values mark the
    /// bin as unusable for the chi-square.
    pub density_uncertainty: f64,
}

impl LfBin {
    pub fn lower(&self) -> f64 {
        self.centre - 0.5 * self.width
    }

    pub fn upper(&self) -> f64 {
        self.centre + 0.5 * self.width
    }

    /// Whether this bin can contribute to the chi-square.
    pub fn is_usable(&self) -> bool {
        self.density.is_finite()
            && self.density_uncertainty.is_finite()
            && self.density_uncertainty > 0.0
    }
}

/// Magnitude-binned star-count density with per-bin uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedLuminosityFunction {
    bins: Vec<LfBin>,
}

impl ObservedLuminosityFunction {
    /// Build an LF; bins must be ordered by magnitude and must not overlap.
    ///
    /// Gaps between bins are allowed (surveys often drop poorly populated bins).
    pub fn new(bins: Vec<LfBin>) -> Result<Self, InversionError> {
        if bins.is_empty() {
            return Err(InversionError::InvalidBinning(
                "luminosity function has no bins".into(),
            ));
        }
        for (i, b) in bins.iter().enumerate() {
            if !(b.centre.is_finite() && b.width.is_finite() && b.width > 0.0) {
                return Err(InversionError::InvalidBinning(format!(
                    "LF bin {i} has invalid centre/width ({}, {})",
                    b.centre, b.width
                )));
            }
            if b.density.is_nan() {
                return Err(InversionError::InvalidBinning(format!("LF bin {i} has NaN density")));
            }
        }
        for (i, pair) in bins.windows(2).enumerate() {
            let (a, b) = (&pair[0], &pair[1]);
            let tol = 1e-9 * a.width.min(b.width);
            if b.centre <= a.centre || b.lower() < a.upper() - tol {
                return Err(InversionError::InvalidBinning(format!(
                    "LF bins {i} and {} overlap or are out of order",
                    i + 1
                )));
            }
        }
        Ok(Self { bins })
    }

    /// Empty grid of `n` equal-width bins over `[mag_min, mag_max]`.
    ///
    /// Used as the binning template when forward-simulating a known SFH.
    pub fn empty_grid(mag_min: f64, mag_max: f64, n: usize) -> Result<Self, InversionError> {
        if n == 0 || !(mag_min.is_finite() && mag_max.is_finite() && mag_max > mag_min) {
            return Err(InversionError::InvalidBinning(format!(
                "invalid magnitude grid [{mag_min}, {mag_max}] with {n} bins"
            )));
        }
        let width = (mag_max - mag_min) / n as f64;
        let bins = (0..n)
            .map(|i| LfBin {
                centre: mag_min + (i as f64 + 0.5) * width,
                width,
                density: 0.0,
                density_uncertainty: f64::NAN,
            })
            .collect();
        Self::new(bins)
    }

    pub fn bins(&self) -> &[LfBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn mag_min(&self) -> f64 {
        self.bins[0].lower()
    }

    pub fn mag_max(&self) -> f64 {
        self.bins[self.bins.len() - 1].upper()
    }

    /// Index of the bin containing magnitude `mag` (half-open `[lower, upper)`).
    pub fn bin_index(&self, mag: f64) -> Option<usize> {
        if !mag.is_finite() {
            return None;
        }
        let idx = self.bins.partition_point(|b| b.upper() <= mag);
        let bin = self.bins.get(idx)?;
        (mag >= bin.lower()).then_some(idx)
    }

    /// Indices of bins that carry a usable uncertainty.
    pub fn usable_bins(&self) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.is_usable().then_some(i))
            .collect()
    }

    /// Same binning, new densities and uncertainties.
    pub fn with_densities(&self, densities: &[f64], uncertainties: &[f64]) -> Result<Self, InversionError> {
        if densities.len() != self.bins.len() || uncertainties.len() != self.bins.len() {
            return Err(InversionError::InvalidBinning(format!(
                "expected {} LF values, got {}/{}",
                self.bins.len(),
                densities.len(),
                uncertainties.len()
            )));
        }
        let bins = self
            .bins
            .iter()
            .zip(densities.iter().zip(uncertainties.iter()))
            .map(|(b, (&density, &density_uncertainty))| LfBin {
                density,
                density_uncertainty,
                ..*b
            })
            .collect();
        Self::new(bins)
    }

    /// Draw a perturbed realization consistent with the quoted uncertainties.
    ///
    /// Bins with zero or undefined uncertainty are reproduced unchanged. Quoted
    /// uncertainties are carried over so the realization is weighted like the
    /// original in the chi-square.
    pub fn perturbed<R: Rng + ?Sized>(&self, noise: NoiseModel, rng: &mut R) -> Self {
        let bins = self
            .bins
            .iter()
            .map(|b| LfBin {
                density: perturb_density(b, noise, rng),
                ..*b
            })
            .collect();
        Self { bins }
    }
}

fn perturb_density<R: Rng + ?Sized>(bin: &LfBin, noise: NoiseModel, rng: &mut R) -> f64 {
    let sigma = bin.density_uncertainty;
    if !(sigma.is_finite() && sigma > 0.0) || !bin.density.is_finite() {
        return bin.density;
    }
    match noise {
        NoiseModel::Gaussian => match Normal::new(bin.density, sigma) {
            Ok(dist) => dist.sample(rng).max(0.0),
            Err(_) => bin.density,
        },
        NoiseModel::Poisson => {
            if bin.density <= 0.0 {
                // No effective count to redraw from; fall back to Gaussian scatter.
                return Normal::new(bin.density, sigma)
                    .map(|d| d.sample(rng).max(0.0))
                    .unwrap_or(bin.density);
            }
            // σ/ρ = 1/√n for a Poisson count n.
            let n_eff = (bin.density / sigma).powi(2);
            match Poisson::new(n_eff) {
                Ok(dist) => {
                    let k: f64 = dist.sample(rng);
                    bin.density * k / n_eff
                }
                Err(_) => bin.density,
            }
        }
    }
}

impl<'de> Deserialize<'de> for ObservedLuminosityFunction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            bins: Vec<LfBin>,
        }
        let raw = Raw::deserialize(deserializer)?;
        ObservedLuminosityFunction::new(raw.bins).map_err(serde::de::Error::custom)
    }
}
