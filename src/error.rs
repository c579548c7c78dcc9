//! Error types.
//!
//! Two layers:
//! - [`InversionError`]: failures raised by the core (SFH model, forward simulator,
//!   inverter, convergence loop, resampler). These surface immediately to the caller
//!   of the failing operation.
//! - [`AppError`]: the binary's boundary error carrying a process exit code.

use thiserror::Error;

/// Failures raised by the inversion core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InversionError {
    /// Bins do not tile their interval (gaps, overlaps, non-increasing centres,
    /// non-positive or non-finite widths).
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    /// A rate or rate uncertainty is negative (or not finite).
    #[error("negative rate in bin {bin}: {value}")]
    NegativeRate { bin: usize, value: f64 },

    /// Sampling was requested from an SFH whose integrated rate is zero.
    #[error("cannot sample creation times: star formation rate is zero everywhere")]
    DegenerateDistribution,

    /// The forward simulation produced no detectable white dwarfs.
    #[error("no white dwarfs detected after {attempted} simulated stars")]
    EmptyPopulation { attempted: u64 },

    /// No observed bin carries a usable (finite, non-zero) uncertainty.
    #[error("observed luminosity function has no bin with a usable uncertainty")]
    NoUsableBins,

    /// A modelling or run parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The iteration cap was reached before the detector reported convergence.
    #[error("no convergence after {iterations} iterations (last chi-square {last_chi_square:.4})")]
    NotConverged {
        iterations: usize,
        last_chi_square: f64,
    },

    /// Every bootstrap realization failed.
    #[error("all {attempted} bootstrap realizations failed")]
    AllRealizationsFailed { attempted: usize },
}

impl InversionError {
    /// Short stable label used when tallying dropped realizations.
    pub fn kind(&self) -> &'static str {
        match self {
            InversionError::InvalidBinning(_) => "invalid-binning",
            InversionError::NegativeRate { .. } => "negative-rate",
            InversionError::DegenerateDistribution => "degenerate-distribution",
            InversionError::EmptyPopulation { .. } => "empty-population",
            InversionError::NoUsableBins => "no-usable-bins",
            InversionError::InvalidParameter(_) => "invalid-parameter",
            InversionError::NotConverged { .. } => "not-converged",
            InversionError::AllRealizationsFailed { .. } => "all-realizations-failed",
        }
    }

    /// Process exit code used when this error reaches the binary.
    ///
    /// - 2: malformed input or configuration
    /// - 3: the data/model combination yields nothing to work with
    /// - 4: the computation itself failed
    pub fn exit_code(&self) -> u8 {
        match self {
            InversionError::InvalidBinning(_)
            | InversionError::NegativeRate { .. }
            | InversionError::NoUsableBins
            | InversionError::InvalidParameter(_) => 2,
            InversionError::DegenerateDistribution | InversionError::EmptyPopulation { .. } => 3,
            InversionError::NotConverged { .. } | InversionError::AllRealizationsFailed { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<InversionError> for AppError {
    fn from(err: InversionError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inversion_errors_map_to_exit_codes() {
        let app: AppError = InversionError::NoUsableBins.into();
        assert_eq!(app.exit_code(), 2);

        let app: AppError = InversionError::EmptyPopulation { attempted: 10 }.into();
        assert_eq!(app.exit_code(), 3);
        assert!(app.to_string().contains("10"));

        let app: AppError = InversionError::NotConverged {
            iterations: 5,
            last_chi_square: 1.0,
        }
        .into();
        assert_eq!(app.exit_code(), 4);
    }
}
