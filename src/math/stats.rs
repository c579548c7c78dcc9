//! Summary statistics for bootstrap ensembles.

use serde::{Deserialize, Serialize};

/// Scale factor that turns a median absolute deviation into a standard-deviation
/// estimate for normally distributed samples.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Location and spread of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustSummary {
    pub mean: f64,
    /// Sample standard deviation (`n - 1` denominator; 0 for a single value).
    pub std: f64,
    pub median: f64,
    /// Median absolute deviation scaled by [`MAD_TO_SIGMA`].
    pub mad: f64,
    pub n: usize,
}

impl RobustSummary {
    /// Summarise the finite values in `values`. Returns `None` if none are finite.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let n = finite.len();
        if n == 0 {
            return None;
        }

        let mean = finite.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            let ss: f64 = finite.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n as f64 - 1.0)).sqrt()
        } else {
            0.0
        };

        let median = median_mut(&mut finite)?;
        let mut abs_dev: Vec<f64> = finite.iter().map(|v| (v - median).abs()).collect();
        let mad = MAD_TO_SIGMA * median_mut(&mut abs_dev)?;

        Some(Self {
            mean,
            std,
            median,
            mad,
            n,
        })
    }
}

/// Median of `values`, sorting them in place.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn median_handles_odd_and_even() {
        assert_eq!(median_mut(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_mut(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_mut(&mut []), None);
    }

    #[test]
    fn summary_of_identical_values_has_zero_spread() {
        let s = RobustSummary::from_values(&[2.5e-12; 7]).unwrap();
        assert_relative_eq!(s.mean, 2.5e-12, max_relative = 1e-12);
        assert_relative_eq!(s.median, 2.5e-12, max_relative = 1e-12);
        assert!(s.std.abs() < 1e-24);
        assert_eq!(s.mad, 0.0);
        assert_eq!(s.n, 7);
    }

    #[test]
    fn summary_matches_hand_computation() {
        let s = RobustSummary::from_values(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_relative_eq!(s.mean, 22.0);
        assert_relative_eq!(s.median, 3.0);
        // |dev| = [2, 1, 0, 1, 97] -> median 1
        assert_relative_eq!(s.mad, MAD_TO_SIGMA);
        let expected_std = ((21.0f64.powi(2) + 20.0f64.powi(2) + 19.0f64.powi(2)
            + 18.0f64.powi(2)
            + 78.0f64.powi(2))
            / 4.0)
            .sqrt();
        assert_relative_eq!(s.std, expected_std, max_relative = 1e-12);
    }

    #[test]
    fn summary_ignores_non_finite() {
        let s = RobustSummary::from_values(&[f64::NAN, 1.0, f64::INFINITY]).unwrap();
        assert_eq!(s.n, 1);
        assert_eq!(s.std, 0.0);
        assert!(RobustSummary::from_values(&[f64::NAN]).is_none());
    }
}
