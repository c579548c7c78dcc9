//! Dense 2-D histograms and uniform binning axes.
//!
//! The forward simulator keys histograms by bin *indices*; mapping a physical value
//! to an index is the caller's job (SFH bins, LF bins, or a [`UniformAxis`]).

use serde::{Deserialize, Serialize};

/// Uniformly spaced axis over `[min, max)` with `n` bins.
///
/// Values outside the range are clamped into the first or last bin, so every finite
/// value lands somewhere (the axes here are diagnostic, not selection cuts).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformAxis {
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl UniformAxis {
    pub fn new(min: f64, max: f64, n: usize) -> Self {
        Self {
            min,
            max,
            n: n.max(1),
        }
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.n as f64
    }

    pub fn centre(&self, idx: usize) -> f64 {
        self.min + (idx as f64 + 0.5) * self.width()
    }

    pub fn index(&self, value: f64) -> usize {
        if !value.is_finite() || value <= self.min {
            return 0;
        }
        let idx = ((value - self.min) / self.width()).floor() as usize;
        idx.min(self.n - 1)
    }
}

/// Row-major `nx × ny` histogram of weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram2d {
    nx: usize,
    ny: usize,
    counts: Vec<f64>,
}

impl Histogram2d {
    pub fn zeros(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            counts: vec![0.0; nx * ny],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Add `weight` at `(ix, iy)`. Out-of-range indices are ignored.
    pub fn add(&mut self, ix: usize, iy: usize, weight: f64) {
        if ix < self.nx && iy < self.ny {
            self.counts[ix * self.ny + iy] += weight;
        }
    }

    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        if ix < self.nx && iy < self.ny {
            self.counts[ix * self.ny + iy]
        } else {
            0.0
        }
    }

    pub fn row(&self, ix: usize) -> &[f64] {
        &self.counts[ix * self.ny..(ix + 1) * self.ny]
    }

    /// Sum over `y` for fixed `x`.
    pub fn row_sum(&self, ix: usize) -> f64 {
        self.row(ix).iter().sum()
    }

    /// Sum over `x` for fixed `y`.
    pub fn column_sum(&self, iy: usize) -> f64 {
        (0..self.nx).map(|ix| self.get(ix, iy)).sum()
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Accumulate another histogram of the same shape into this one.
    pub fn merge(&mut self, other: &Histogram2d) {
        debug_assert_eq!(self.shape(), other.shape());
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += *b;
        }
    }
}
