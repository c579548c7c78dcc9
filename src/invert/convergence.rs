//! Convergence detection on a noisy chi-square history.
//!
//! The raw chi-square fluctuates from iteration to iteration (every iteration draws
//! a fresh synthetic population), so the detector judges a smoothed curve instead:
//!
//! - [`Smoothing::SlidingLinear`]: least-squares line through the latest `window`
//!   values; the smoothed value at `i` is that line (fitted on the window ending at
//!   `i`) evaluated at `i`, and the per-iteration relative change is the line's
//!   slope over its value at the latest index
//! - [`Smoothing::PowerLaw`]: `χ² ≈ A (i + 1)^k` fitted in log–log space over the
//!   whole history
//!
//! The run is converged once that relative change drops below the threshold. Once
//! the chi-square sits at its Monte Carlo floor it scatters by tens of percent per
//! iteration, so the default threshold is a per-iteration trend of 2%.

use serde::{Deserialize, Serialize};

use crate::domain::SmoothingKind;
use crate::error::InversionError;
use crate::math::fit_line;

/// Smoothing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Smoothing {
    SlidingLinear { window: usize },
    PowerLaw,
}

impl Smoothing {
    pub fn from_kind(kind: SmoothingKind, window: usize) -> Self {
        match kind {
            SmoothingKind::SlidingLinear => Smoothing::SlidingLinear { window },
            SmoothingKind::PowerLaw => Smoothing::PowerLaw,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Smoothing::SlidingLinear { window } => format!("sliding-linear (window {window})"),
            Smoothing::PowerLaw => "power-law".to_string(),
        }
    }

    /// Smoothed chi-square at history index `i`, or `None` when the history cannot
    /// support a fit there.
    pub fn smoothed_value_at(&self, history: &[f64], i: usize) -> Option<f64> {
        if i >= history.len() {
            return None;
        }
        match *self {
            Smoothing::SlidingLinear { window } => {
                let start = (i + 1).saturating_sub(window.max(1));
                let ys = &history[start..=i];
                if ys.len() < 2 {
                    return ys.first().copied().filter(|v| v.is_finite());
                }
                let xs: Vec<f64> = (start..=i).map(|k| k as f64).collect();
                let (a, b) = fit_line(&xs, ys)?;
                Some(a + b * i as f64)
            }
            Smoothing::PowerLaw => {
                let (ln_a, k) = power_law_fit(history)?;
                Some((ln_a + k * ((i + 1) as f64).ln()).exp())
            }
        }
    }

    /// Relative change per iteration of the smoothed curve at the latest entry.
    ///
    /// `None` with fewer than two entries, or when the sliding fit is not positive at
    /// the latest entry.
    pub fn relative_change_at_latest(&self, history: &[f64]) -> Option<f64> {
        let n = history.len();
        if n < 2 {
            return None;
        }
        match *self {
            Smoothing::SlidingLinear { window } => {
                // One fit over the window: slope / value at the latest index.
                let start = n.saturating_sub(window.max(2));
                let xs: Vec<f64> = (start..n).map(|k| k as f64).collect();
                let (a, b) = fit_line(&xs, &history[start..])?;
                let latest = a + b * (n - 1) as f64;
                (latest > 0.0 && b.is_finite()).then(|| b / latest)
            }
            Smoothing::PowerLaw => {
                // s(n-1)/s(n-2) = (n/(n-1))^k, independent of the amplitude.
                let (_, k) = power_law_fit(history)?;
                let ratio = (n as f64 / (n - 1) as f64).powf(k);
                ratio.is_finite().then_some(ratio - 1.0)
            }
        }
    }
}

// Fit ln χ² = ln A + k ln(i + 1) over entries with χ² > 0.
fn power_law_fit(history: &[f64]) -> Option<(f64, f64)> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = history
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_finite() && **c > 0.0)
        .map(|(i, c)| (((i + 1) as f64).ln(), c.ln()))
        .unzip();
    fit_line(&xs, &ys)
}

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.02;
pub const DEFAULT_MIN_ITERATIONS: usize = 10;

/// Detector knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    pub smoothing: Smoothing,
    pub threshold: f64,
    /// No convergence check before this many iterations.
    pub min_iterations: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::SlidingLinear { window: DEFAULT_WINDOW },
            threshold: DEFAULT_THRESHOLD,
            min_iterations: DEFAULT_MIN_ITERATIONS,
        }
    }
}

impl ConvergenceConfig {
    pub fn validate(&self) -> Result<(), InversionError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(InversionError::InvalidParameter(format!(
                "convergence threshold must be finite and > 0, got {}",
                self.threshold
            )));
        }
        if let Smoothing::SlidingLinear { window } = self.smoothing {
            if window < 2 {
                return Err(InversionError::InvalidParameter(format!(
                    "smoothing window must be >= 2, got {window}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    Warmup,
    Checking,
    /// Terminal.
    Converged,
}

impl DetectorState {
    pub fn label(self) -> &'static str {
        match self {
            DetectorState::Warmup => "warmup",
            DetectorState::Checking => "checking",
            DetectorState::Converged => "converged",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    state: DetectorState,
    last_change: Option<f64>,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            state: DetectorState::Warmup,
            last_change: None,
        }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Relative change computed at the most recent check.
    pub fn last_change(&self) -> Option<f64> {
        self.last_change
    }

    pub fn is_converged(&self) -> bool {
        self.state == DetectorState::Converged
    }

    /// Update the state from the full history (one entry per completed iteration).
    pub fn check(&mut self, history: &[f64]) -> DetectorState {
        if self.state == DetectorState::Converged {
            return self.state;
        }
        if history.len() < self.config.min_iterations {
            self.state = DetectorState::Warmup;
            return self.state;
        }
        self.last_change = self.config.smoothing.relative_change_at_latest(history);
        self.state = match self.last_change {
            Some(change) if change.abs() < self.config.threshold => DetectorState::Converged,
            _ => DetectorState::Checking,
        };
        self.state
    }
}
