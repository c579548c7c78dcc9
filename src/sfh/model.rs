//! Piecewise-constant star-formation history over lookback time.
//!
//! An [`SfhModel`] is a value: cloning it produces a fully independent copy, and it
//! is never edited in place. Each inversion iteration builds a new model over the
//! same binning via [`SfhModel::with_rates`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::InversionError;

/// Relative tolerance (of the covered span) for bin edges to count as touching.
const EDGE_REL_TOL: f64 = 1e-9;

/// One lookback-time bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SfhBin {
    /// Bin centre (years of lookback time).
    pub centre: f64,
    /// Bin width (years).
    pub width: f64,
    /// Star-formation rate (stars per unit volume per year).
    pub rate: f64,
    /// One-sigma uncertainty on `rate`.
    pub rate_uncertainty: f64,
}

impl SfhBin {
    pub fn new(centre: f64, width: f64, rate: f64) -> Self {
        Self {
            centre,
            width,
            rate,
            rate_uncertainty: 0.0,
        }
    }

    pub fn lower(&self) -> f64 {
        self.centre - 0.5 * self.width
    }

    pub fn upper(&self) -> f64 {
        self.centre + 0.5 * self.width
    }
}

/// Star-formation history: contiguous, non-overlapping bins with non-negative rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SfhModel {
    bins: Vec<SfhBin>,
}

impl SfhModel {
    /// Build a model, validating the tiling and non-negativity invariants.
    pub fn new(bins: Vec<SfhBin>) -> Result<Self, InversionError> {
        validate_tiling(&bins)?;
        for (i, b) in bins.iter().enumerate() {
            if !(b.rate.is_finite() && b.rate >= 0.0) {
                return Err(InversionError::NegativeRate {
                    bin: i,
                    value: b.rate,
                });
            }
            if !(b.rate_uncertainty.is_finite() && b.rate_uncertainty >= 0.0) {
                return Err(InversionError::NegativeRate {
                    bin: i,
                    value: b.rate_uncertainty,
                });
            }
        }
        Ok(Self { bins })
    }

    /// Flat prior: `n` equal-width bins over `[t_min, t_max]` at constant `rate`.
    pub fn uniform(t_min: f64, t_max: f64, n: usize, rate: f64) -> Result<Self, InversionError> {
        if n == 0 {
            return Err(InversionError::InvalidBinning("at least one bin is required".into()));
        }
        if !(t_min.is_finite() && t_max.is_finite() && t_max > t_min) {
            return Err(InversionError::InvalidBinning(format!(
                "invalid time range [{t_min}, {t_max}]"
            )));
        }
        let width = (t_max - t_min) / n as f64;
        let bins = (0..n)
            .map(|i| SfhBin::new(t_min + (i as f64 + 0.5) * width, width, rate))
            .collect();
        Self::new(bins)
    }

    pub fn bins(&self) -> &[SfhBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn t_min(&self) -> f64 {
        self.bins.first().map(SfhBin::lower).unwrap_or(0.0)
    }

    pub fn t_max(&self) -> f64 {
        self.bins.last().map(SfhBin::upper).unwrap_or(0.0)
    }

    pub fn rates(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.rate).collect()
    }

    pub fn rate_uncertainties(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.rate_uncertainty).collect()
    }

    /// Index of the bin containing lookback time `t` (upper edge of the last bin
    /// included).
    pub fn bin_index(&self, t: f64) -> Option<usize> {
        if !(t >= self.t_min() && t <= self.t_max()) {
            return None;
        }
        let idx = self.bins.partition_point(|b| b.upper() <= t);
        Some(idx.min(self.bins.len() - 1))
    }

    /// New model over the same binning with replaced rates and uncertainties.
    pub fn with_rates(&self, rates: &[f64], uncertainties: &[f64]) -> Result<Self, InversionError> {
        if rates.len() != self.bins.len() || uncertainties.len() != self.bins.len() {
            return Err(InversionError::InvalidBinning(format!(
                "expected {} rates, got {} rates and {} uncertainties",
                self.bins.len(),
                rates.len(),
                uncertainties.len()
            )));
        }
        let bins = self
            .bins
            .iter()
            .zip(rates.iter().zip(uncertainties.iter()))
            .map(|(b, (&rate, &rate_uncertainty))| SfhBin {
                rate,
                rate_uncertainty,
                ..*b
            })
            .collect();
        Self::new(bins)
    }

    /// Integrated number of stars formed and its uncertainty.
    ///
    /// Bin uncertainties are treated as independent and combined in quadrature.
    pub fn integrate(&self) -> (f64, f64) {
        let total = self.bins.iter().map(|b| b.rate * b.width).sum();
        let var: f64 = self
            .bins
            .iter()
            .map(|b| b.width * b.width * b.rate_uncertainty * b.rate_uncertainty)
            .sum();
        (total, var.sqrt())
    }

    /// Inverse-CDF sampler over the cumulative `rate·width` table.
    pub fn sampler(&self) -> Result<CreationTimeSampler, InversionError> {
        CreationTimeSampler::new(self)
    }

    /// Draw a single formation lookback time.
    ///
    /// Convenience over [`SfhModel::sampler`]; prefer building the sampler once when
    /// drawing many times.
    pub fn draw_creation_time<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, InversionError> {
        Ok(self.sampler()?.draw(rng).0)
    }
}

impl<'de> Deserialize<'de> for SfhModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            bins: Vec<SfhBin>,
        }
        let raw = Raw::deserialize(deserializer)?;
        SfhModel::new(raw.bins).map_err(serde::de::Error::custom)
    }
}

fn validate_tiling(bins: &[SfhBin]) -> Result<(), InversionError> {
    if bins.is_empty() {
        return Err(InversionError::InvalidBinning("at least one bin is required".into()));
    }
    for (i, b) in bins.iter().enumerate() {
        if !(b.centre.is_finite() && b.width.is_finite() && b.width > 0.0) {
            return Err(InversionError::InvalidBinning(format!(
                "bin {i} has invalid centre/width ({}, {})",
                b.centre, b.width
            )));
        }
    }

    let span = bins[bins.len() - 1].upper() - bins[0].lower();
    let tol = EDGE_REL_TOL * span.abs().max(f64::MIN_POSITIVE);
    for (i, pair) in bins.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        if b.centre <= a.centre {
            return Err(InversionError::InvalidBinning(format!(
                "bin centres must be strictly increasing (bin {} at {} after {})",
                i + 1,
                b.centre,
                a.centre
            )));
        }
        let gap = b.lower() - a.upper();
        if gap.abs() > tol {
            let what = if gap > 0.0 { "gap" } else { "overlap" };
            return Err(InversionError::InvalidBinning(format!(
                "{what} of {:.6e} between bins {i} and {}",
                gap.abs(),
                i + 1
            )));
        }
    }
    Ok(())
}

/// Precomputed cumulative distribution of formation times.
#[derive(Debug, Clone)]
pub struct CreationTimeSampler {
    lowers: Vec<f64>,
    widths: Vec<f64>,
    cumulative: Vec<f64>,
    total: f64,
}

impl CreationTimeSampler {
    fn new(sfh: &SfhModel) -> Result<Self, InversionError> {
        let mut cumulative = Vec::with_capacity(sfh.len());
        let mut acc = 0.0;
        for b in sfh.bins() {
            acc += b.rate * b.width;
            cumulative.push(acc);
        }
        if !(acc.is_finite() && acc > 0.0) {
            return Err(InversionError::DegenerateDistribution);
        }
        Ok(Self {
            lowers: sfh.bins().iter().map(SfhBin::lower).collect(),
            widths: sfh.bins().iter().map(|b| b.width).collect(),
            cumulative,
            total: acc,
        })
    }

    /// Draw `(lookback_time, bin_index)`.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, usize) {
        let u = rng.r#gen::<f64>() * self.total;
        // First bin whose cumulative mass exceeds u; zero-rate bins have zero mass
        // and are skipped automatically.
        let idx = self
            .cumulative
            .partition_point(|&c| c <= u)
            .min(self.cumulative.len() - 1);
        let t = self.lowers[idx] + rng.r#gen::<f64>() * self.widths[idx];
        (t, idx)
    }
}
