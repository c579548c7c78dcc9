//! Bootstrap uncertainty estimation.
//!
//! Each realization perturbs the observed LF within its quoted uncertainties and runs
//! a full, independent inversion from the same initial guess. Realizations run on
//! rayon's pool with independently seeded RNGs; one that fails is dropped and
//! tallied, never aborting the batch.

use std::collections::BTreeMap;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{ModellingParameters, NoiseModel};
use crate::error::InversionError;
use crate::invert::{InversionSettings, Inverter, run_to_convergence};
use crate::lf::ObservedLuminosityFunction;
use crate::math::{RobustSummary, derive_seed, stream_rng};
use crate::physics::StellarPhysics;
use crate::sfh::SfhModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of realizations (M).
    pub repeats: usize,
    pub noise: NoiseModel,
    pub seed: u64,
}

/// Per-bin statistics over the surviving realizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub per_bin: Vec<RobustSummary>,
    pub succeeded: usize,
    pub dropped: usize,
    /// Dropped realizations by error kind.
    pub dropped_by_kind: BTreeMap<String, usize>,
}

pub struct UncertaintyResampler<'a> {
    physics: &'a dyn StellarPhysics,
    params: &'a ModellingParameters,
    observed: &'a ObservedLuminosityFunction,
    settings: InversionSettings,
}

impl<'a> UncertaintyResampler<'a> {
    pub fn new(
        physics: &'a dyn StellarPhysics,
        params: &'a ModellingParameters,
        observed: &'a ObservedLuminosityFunction,
        settings: InversionSettings,
    ) -> Self {
        Self {
            physics,
            params,
            observed,
            settings,
        }
    }

    /// Run `config.repeats` perturbed inversions and summarize the recovered rates.
    pub fn run(&self, initial: &SfhModel, config: &BootstrapConfig) -> Result<BootstrapSummary, InversionError> {
        if config.repeats == 0 {
            return Err(InversionError::InvalidParameter(
                "bootstrap repeats must be > 0".into(),
            ));
        }
        info!(
            "bootstrap: {} realizations, {:?} noise",
            config.repeats, config.noise
        );

        let outcomes: Vec<Result<Vec<f64>, InversionError>> = (0..config.repeats)
            .into_par_iter()
            .map(|i| self.realization(initial, config, i as u64))
            .collect();

        summarize_realizations(initial.len(), outcomes)
    }

    fn realization(&self, initial: &SfhModel, config: &BootstrapConfig, index: u64) -> Result<Vec<f64>, InversionError> {
        let seed = derive_seed(config.seed, index);
        let mut rng = stream_rng(seed, 0);
        let perturbed = self.observed.perturbed(config.noise, &mut rng);
        let inverter = Inverter::new(self.physics, self.params, &perturbed, self.settings.simulation)?;
        let settings = InversionSettings {
            seed: derive_seed(seed, 1),
            ..self.settings
        };
        let outcome = run_to_convergence(&inverter, initial.clone(), &settings, |_| {})?;
        Ok(outcome.state.current_sfh().rates())
    }
}

/// Aggregate realization outcomes into per-bin statistics.
///
/// Failed realizations are excluded and counted; if none succeeded the batch fails
/// with `AllRealizationsFailed`.
pub fn summarize_realizations(
    n_bins: usize,
    outcomes: Vec<Result<Vec<f64>, InversionError>>,
) -> Result<BootstrapSummary, InversionError> {
    let attempted = outcomes.len();
    let mut dropped_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut per_bin_values: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
    let mut succeeded = 0;

    for outcome in outcomes {
        match outcome {
            Ok(rates) if rates.len() == n_bins => {
                for (values, rate) in per_bin_values.iter_mut().zip(rates) {
                    values.push(rate);
                }
                succeeded += 1;
            }
            Ok(rates) => {
                warn!("dropping realization with {} bins (expected {n_bins})", rates.len());
                *dropped_by_kind.entry("invalid-binning".to_string()).or_default() += 1;
            }
            Err(e) => {
                let count = dropped_by_kind.entry(e.kind().to_string()).or_default();
                if *count == 0 {
                    warn!("dropping bootstrap realization: {e}");
                }
                *count += 1;
            }
        }
    }

    if succeeded == 0 {
        return Err(InversionError::AllRealizationsFailed { attempted });
    }
    let dropped = attempted - succeeded;
    if dropped > 0 {
        warn!("{dropped}/{attempted} bootstrap realizations dropped: {dropped_by_kind:?}");
    }

    let per_bin = per_bin_values
        .iter()
        .map(|values| RobustSummary::from_values(values).ok_or(InversionError::AllRealizationsFailed { attempted }))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BootstrapSummary {
        per_bin,
        succeeded,
        dropped,
        dropped_by_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
        use crate::physics::AnalyticPhysics;
    use crate::sfh::SfhBin;
    use crate::sim::{ForwardSimulator, SimulationConfig, synthetic_luminosity_function};
    use approx::assert_relative_eq;

    fn quick_settings() -> InversionSettings {
        InversionSettings {
            simulation: SimulationConfig {
                population_size: 3_000,
                max_attempts_per_star: 1_000,
            },
            seed: 1,
            ..InversionSettings::default()
        }
    }

    #[test]
    fn failed_realizations_are_dropped_and_counted() {
        let outcomes = vec![
            Ok(vec![1.0, 2.0]),
            Err(InversionError::EmptyPopulation { attempted: 10 }),
            Ok(vec![3.0, 4.0]),
            Err(InversionError::EmptyPopulation { attempted: 12 }),
            Err(InversionError::NotConverged {
                iterations: 5,
                last_chi_square: 1.0,
            }),
        ];
        let summary = summarize_realizations(2, outcomes).unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.dropped_by_kind.get("empty-population"), Some(&2));
        assert_eq!(summary.dropped_by_kind.get("not-converged"), Some(&1));
        assert_relative_eq!(summary.per_bin[0].mean, 2.0);
        assert_relative_eq!(summary.per_bin[1].median, 3.5);
    }

    #[test]
    fn all_failed_is_an_error() {
        let outcomes = vec![Err(InversionError::DegenerateDistribution); 4];
        assert_eq!(
            summarize_realizations(3, outcomes),
            Err(InversionError::AllRealizationsFailed { attempted: 4 })
        );
    }

    #[test]
    fn identical_realizations_have_zero_spread() {
        let outcomes = vec![Ok(vec![5e-12, 1e-13]); 6];
        let summary = summarize_realizations(2, outcomes).unwrap();
        for (stats, expected) in summary.per_bin.iter().zip([5e-12, 1e-13]) {
            assert_relative_eq!(stats.mean, expected, max_relative = 1e-12);
            assert_eq!(stats.median, expected);
            assert!(stats.std <= 1e-12 * expected);
            assert_eq!(stats.mad, 0.0);
        }
    }

    #[test]
    fn resampler_runs_every_realization() {
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let grid = ObservedLuminosityFunction::empty_grid(10.0, 17.5, 3).unwrap();
        let truth = SfhModel::uniform(0.0, 8e9, 2, 2e-12).unwrap();
        let observed = synthetic_luminosity_function(
            &truth,
            &ForwardSimulator::new(
                &physics,
                &params,
                &grid,
                SimulationConfig {
                    population_size: 10_000,
                    max_attempts_per_star: 1_000,
                },
            ),
            11,
        )
        .unwrap();

        let resampler = UncertaintyResampler::new(&physics, &params, &observed, quick_settings());
        let prior = SfhModel::uniform(0.0, 8e9, 2, 1e-12).unwrap();
        let config = BootstrapConfig {
            repeats: 4,
            noise: NoiseModel::Poisson,
            seed: 3,
        };
        let summary = resampler.run(&prior, &config).unwrap();
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.per_bin.len(), 2);
        for stats in &summary.per_bin {
            assert_eq!(stats.n, 4);
            assert!(stats.mean > 0.0 && stats.std.is_finite() && stats.std >= 0.0);
        }
        // Same seed, same answer.
        assert_eq!(resampler.run(&prior, &config).unwrap(), summary);
    }

    #[test]
    fn ensemble_tracks_single_run_for_tight_uncertainties() {
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let grid = ObservedLuminosityFunction::empty_grid(10.0, 17.5, 3).unwrap();
        let truth = SfhModel::new(vec![SfhBin::new(1e9, 2e9, 5e-12), SfhBin::new(5e9, 6e9, 1e-13)]).unwrap();
        let simulated = synthetic_luminosity_function(
            &truth,
            &ForwardSimulator::new(
                &physics,
                &params,
                &grid,
                SimulationConfig {
                    population_size: 50_000,
                    max_attempts_per_star: 1_000,
                },
            ),
            2024,
        )
        .unwrap();
        // Shrink the quoted errors tenfold: perturbations become negligible and the
        // ensemble spread is the Monte Carlo scatter of the inversion itself.
        let densities: Vec<f64> = simulated.bins().iter().map(|b| b.density).collect();
        let sigmas: Vec<f64> = simulated.bins().iter().map(|b| b.density_uncertainty / 10.0).collect();
        let observed = simulated.with_densities(&densities, &sigmas).unwrap();

        let settings = InversionSettings {
            simulation: SimulationConfig {
                population_size: 10_000,
                max_attempts_per_star: 1_000,
            },
            seed: 5,
            ..InversionSettings::default()
        };
        let prior = SfhModel::new(vec![SfhBin::new(1e9, 2e9, 1e-12), SfhBin::new(5e9, 6e9, 1e-12)]).unwrap();
        let inverter = Inverter::new(&physics, &params, &observed, settings.simulation).unwrap();
        let single = run_to_convergence(&inverter, prior.clone(), &settings, |_| {})
            .unwrap()
            .state
            .current_sfh()
            .rates();

        let resampler = UncertaintyResampler::new(&physics, &params, &observed, settings);
        let config = BootstrapConfig {
            repeats: 6,
            noise: NoiseModel::Gaussian,
            seed: 21,
        };
        let summary = resampler.run(&prior, &config).unwrap();
        assert_eq!(summary.succeeded, 6);
        for (stats, &rate) in summary.per_bin.iter().zip(&single) {
            assert_eq!(stats.n, 6);
            assert_relative_eq!(stats.median, rate, max_relative = 0.15);
            assert_relative_eq!(stats.mean, rate, max_relative = 0.15);
            assert!(stats.std < 0.1 * stats.median, "{stats:?}");
            assert!(stats.mad < 0.1 * stats.median, "{stats:?}");
        }
    }

    #[test]
    fn every_realization_failing_reports_the_batch() {
        // A population younger than any white dwarf cannot be detected.
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let observed = ObservedLuminosityFunction::new(vec![crate::lf::LfBin {
            centre: 12.0,
            width: 1.0,
            density: 1e-3,
            density_uncertainty: 1e-4,
        }])
        .unwrap();
        let settings = InversionSettings {
            simulation: SimulationConfig {
                population_size: 5,
                max_attempts_per_star: 20,
            },
            ..quick_settings()
        };
        let resampler = UncertaintyResampler::new(&physics, &params, &observed, settings);
        let prior = SfhModel::new(vec![SfhBin::new(5e4, 1e5, 1e-12)]).unwrap();
        let config = BootstrapConfig {
            repeats: 3,
            noise: NoiseModel::Gaussian,
            seed: 9,
        };
        assert_eq!(
            resampler.run(&prior, &config),
            Err(InversionError::AllRealizationsFailed { attempted: 3 })
        );
    }
}
