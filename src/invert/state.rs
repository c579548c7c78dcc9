//! Inversion state and the iterate-until-converged loop.
//!
//! The state is handed by value through each iteration:
//!
//! ```text
//! output = inverter.iterate(&state, seed)?;
//! state  = state.advance(output);
//! ```
//!
//! so an iteration either completes and produces a new state or fails and leaves
//! nothing half-updated.

use log::debug;

use crate::error::InversionError;
use crate::invert::{ConvergenceConfig, ConvergenceDetector, DetectorState, IterationOutput, Inverter};
use crate::math::derive_seed;
use crate::sfh::SfhModel;
use crate::sim::{JointDistributions, SimulationConfig};

/// Per-run inversion state.
///
/// Invariant: `chi_square_history().len() == iteration()`.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionState {
    current_sfh: SfhModel,
    chi_square_history: Vec<f64>,
    iteration: usize,
    min_iterations_before_check: usize,
    convergence_threshold: f64,
}

impl InversionState {
    pub fn new(initial: SfhModel, convergence: ConvergenceConfig) -> Self {
        Self {
            current_sfh: initial,
            chi_square_history: Vec::new(),
            iteration: 0,
            min_iterations_before_check: convergence.min_iterations,
            convergence_threshold: convergence.threshold,
        }
    }

    pub fn current_sfh(&self) -> &SfhModel {
        &self.current_sfh
    }

    pub fn into_sfh(self) -> SfhModel {
        self.current_sfh
    }

    pub fn chi_square_history(&self) -> &[f64] {
        &self.chi_square_history
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn min_iterations_before_check(&self) -> usize {
        self.min_iterations_before_check
    }

    pub fn convergence_threshold(&self) -> f64 {
        self.convergence_threshold
    }

    /// Promote the refined SFH and record the iteration's chi-square.
    pub fn advance(mut self, output: IterationOutput) -> Self {
        self.current_sfh = output.refined;
        self.chi_square_history.push(output.chi_square);
        self.iteration += 1;
        self
    }
}

/// Progress notification emitted after every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationEvent {
    /// Completed iterations (1-based).
    pub iteration: usize,
    pub chi_square: f64,
    pub stars_attempted: u64,
    pub stars_detected: u64,
    pub detector_state: DetectorState,
}

/// Everything one inversion run needs besides the inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InversionSettings {
    pub simulation: SimulationConfig,
    pub convergence: ConvergenceConfig,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            convergence: ConvergenceConfig::default(),
            max_iterations: 200,
            seed: 0,
        }
    }
}

/// Converged run.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionOutcome {
    pub state: InversionState,
    /// Relative change of the smoothed chi-square at the converging check.
    pub final_change: Option<f64>,
    /// Synthetic LF density of the last simulated SFH.
    pub last_synthetic_density: Vec<f64>,
    /// Joint distributions of the last simulation.
    pub last_joint: Option<JointDistributions>,
}

/// Iterate from `initial` until the detector reports convergence.
///
/// Errors from the inverter surface immediately. Reaching `max_iterations` without
/// convergence fails with `NotConverged`.
pub fn run_to_convergence<F>(
    inverter: &Inverter<'_>,
    initial: SfhModel,
    settings: &InversionSettings,
    mut observer: F,
) -> Result<InversionOutcome, InversionError>
where
    F: FnMut(&IterationEvent),
{
    settings.convergence.validate()?;
    if settings.max_iterations == 0 {
        return Err(InversionError::InvalidParameter(
            "max iterations must be > 0".into(),
        ));
    }

    let mut detector = ConvergenceDetector::new(settings.convergence);
    let mut state = InversionState::new(initial, settings.convergence);
    let mut last_synthetic_density = Vec::new();
    let mut last_joint = None;

    while !detector.is_converged() {
        if state.iteration() >= settings.max_iterations {
            return Err(InversionError::NotConverged {
                iterations: state.iteration(),
                last_chi_square: state.chi_square_history().last().copied().unwrap_or(f64::NAN),
            });
        }

        let output = inverter.iterate(&state, derive_seed(settings.seed, state.iteration() as u64))?;
        let (attempted, detected, chi_square) = (output.stars_attempted, output.stars_detected, output.chi_square);
        last_synthetic_density = output.synthetic_density.clone();
        last_joint = Some(output.joint.clone());
        state = state.advance(output);

        let detector_state = detector.check(state.chi_square_history());
        observer(&IterationEvent {
            iteration: state.iteration(),
            chi_square,
            stars_attempted: attempted,
            stars_detected: detected,
            detector_state,
        });
    }

    debug!(
        "converged after {} iterations (relative change {:?})",
        state.iteration(),
        detector.last_change()
    );

    Ok(InversionOutcome {
        state,
        final_change: detector.last_change(),
        last_synthetic_density,
        last_joint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModellingParameters;
    use crate::lf::ObservedLuminosityFunction;
    use crate::math::UniformAxis;
    use crate::physics::AnalyticPhysics;
    use crate::sfh::SfhBin;
    use crate::sim::{ForwardSimulator, synthetic_luminosity_function};

    fn two_bin(young: f64, old: f64) -> SfhModel {
        SfhModel::new(vec![SfhBin::new(1e9, 2e9, young), SfhBin::new(5e9, 6e9, old)]).unwrap()
    }

    fn observed(physics: &AnalyticPhysics, params: &ModellingParameters) -> ObservedLuminosityFunction {
        let grid = ObservedLuminosityFunction::empty_grid(10.0, 17.5, 3).unwrap();
        let sim = ForwardSimulator::new(
            physics,
            params,
            &grid,
            SimulationConfig {
                population_size: 50_000,
                max_attempts_per_star: 1_000,
            },
        );
        synthetic_luminosity_function(&two_bin(5e-12, 1e-13), &sim, 2024).unwrap()
    }

    fn settings(max_iterations: usize) -> InversionSettings {
        InversionSettings {
            max_iterations,
            seed: 7,
            ..InversionSettings::default()
        }
    }

    #[test]
    fn advance_keeps_history_in_step_with_iteration() {
        let sfh = two_bin(1e-12, 1e-12);
        let state = InversionState::new(sfh.clone(), ConvergenceConfig::default());
        assert_eq!(state.iteration(), 0);
        assert!(state.chi_square_history().is_empty());

        let refined = two_bin(2e-12, 5e-13);
        let state = state.advance(IterationOutput {
            refined: refined.clone(),
            chi_square: 12.5,
            chi_square_per_bin: vec![],
            synthetic_density: vec![],
            joint: JointDistributions::zeros(2, 3, UniformAxis::new(0.6, 7.0, 4), UniformAxis::new(0.4, 1.4, 5)),
            stars_attempted: 10,
            stars_detected: 5,
        });
        assert_eq!(state.iteration(), 1);
        assert_eq!(state.chi_square_history(), &[12.5]);
        assert_eq!(state.current_sfh(), &refined);
        assert_eq!(state.min_iterations_before_check(), 10);
    }

    #[test]
    fn recovers_ranking_of_two_bin_history() {
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let lf = observed(&physics, &params);
        let settings = settings(200);
        let inverter = Inverter::new(&physics, &params, &lf, settings.simulation).unwrap();

        let mut events = Vec::new();
        let outcome = run_to_convergence(&inverter, two_bin(1e-12, 1e-12), &settings, |e| events.push(*e)).unwrap();

        let history = outcome.state.chi_square_history();
        assert_eq!(history.len(), outcome.state.iteration());
        assert!(outcome.state.iteration() >= settings.convergence.min_iterations);
        assert!(outcome.state.iteration() < settings.max_iterations);
        assert_eq!(events.len(), history.len());
        assert!(events.windows(2).all(|w| w[1].iteration == w[0].iteration + 1));
        assert_eq!(events.last().map(|e| e.detector_state), Some(DetectorState::Converged));
        assert!(outcome.final_change.is_some_and(|c| c.abs() < settings.convergence.threshold));

        let rates = outcome.state.current_sfh().rates();
        assert!(rates[0] > rates[1], "ranking not recovered: {rates:?}");
        assert!((rates[0] / 5e-12 - 1.0).abs() < 0.25, "young rate off: {rates:?}");
        assert!((rates[1] / 1e-13 - 1.0).abs() < 0.25, "old rate off: {rates:?}");
        assert!(history[history.len() - 1] < history[0], "chi-square did not improve: {history:?}");
        assert!(outcome.state.current_sfh().bins().iter().all(|b| b.rate_uncertainty > 0.0));
        let joint = outcome.last_joint.expect("at least one iteration ran");
        assert_eq!(joint.transfer.total(), settings.simulation.population_size as f64);
    }

    #[test]
    fn exhausting_the_cap_is_an_error() {
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let lf = observed(&physics, &params);
        let inverter = Inverter::new(&physics, &params, &lf, settings(3).simulation).unwrap();
        let err = run_to_convergence(&inverter, two_bin(1e-12, 1e-12), &settings(3), |_| {}).unwrap_err();
        assert!(matches!(err, InversionError::NotConverged { iterations: 3, .. }));
    }

    #[test]
    fn inverter_errors_surface_immediately() {
        let physics = AnalyticPhysics::default();
        let params = ModellingParameters::default();
        let lf = observed(&physics, &params);
        let inverter = Inverter::new(&physics, &params, &lf, settings(50).simulation).unwrap();
        let mut calls = 0;
        let err = run_to_convergence(&inverter, two_bin(0.0, 0.0), &settings(50), |_| calls += 1).unwrap_err();
        assert_eq!(err, InversionError::DegenerateDistribution);
        assert_eq!(calls, 0);
    }
}
