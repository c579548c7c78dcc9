//! Shared pipeline logic behind the CLI commands.
//!
//! invert: load LF -> build prior -> iterate to convergence -> (bootstrap) -> compare
//! simulate: load SFH -> forward simulate onto a magnitude grid
//!
//! The front-end in `app` only handles presentation and exports.

use chrono::Utc;
use log::info;

use crate::domain::{InversionConfig, SimulateConfig};
use crate::error::AppError;
use crate::invert::{
    BootstrapConfig, BootstrapSummary, ConvergenceConfig, InversionOutcome, InversionSettings, Inverter,
    Smoothing, UncertaintyResampler, run_to_convergence,
};
use crate::io::{Ingested, ResultFile, RunSummary, load_luminosity_function, load_sfh};
use crate::lf::ObservedLuminosityFunction;
use crate::physics::StellarPhysics;
use crate::report::{BinComparison, PopulationDiagnostics, compute_comparison, compute_population_diagnostics};
use crate::sfh::SfhModel;
use crate::sim::{ForwardSimulator, SimulationConfig, synthetic_luminosity_function};

/// All computed outputs of a single `sfh invert` run.
#[derive(Debug, Clone)]
pub struct InvertOutput {
    pub lf: Ingested<ObservedLuminosityFunction>,
    pub outcome: InversionOutcome,
    pub bootstrap: Option<BootstrapSummary>,
    pub comparison: Vec<BinComparison>,
    /// Mass summaries of the last forward simulation.
    pub diagnostics: Option<PopulationDiagnostics>,
    pub result: ResultFile,
}

pub fn settings_from_config(config: &InversionConfig) -> InversionSettings {
    InversionSettings {
        simulation: SimulationConfig {
            population_size: config.population_size,
            max_attempts_per_star: config.max_attempts_per_star,
        },
        convergence: ConvergenceConfig {
            smoothing: Smoothing::from_kind(config.smoothing, config.window),
            threshold: config.threshold,
            min_iterations: config.min_iterations,
        },
        max_iterations: config.max_iterations,
        seed: config.seed,
    }
}

/// Initial guess: the prior CSV when given, otherwise a flat prior.
pub fn initial_sfh(config: &InversionConfig) -> Result<SfhModel, AppError> {
    match &config.prior_path {
        Some(path) => Ok(load_sfh(path)?.value),
        None => Ok(SfhModel::uniform(
            config.prior_t_min,
            config.prior_t_max,
            config.prior_bins,
            config.prior_rate,
        )?),
    }
}

/// Execute the full inversion pipeline.
pub fn run_inversion(config: &InversionConfig, physics: &dyn StellarPhysics) -> Result<InvertOutput, AppError> {
    let lf = load_luminosity_function(&config.lf_path)?;
    info!(
        "loaded {} LF bins ({} usable, {} rows skipped) from {}",
        lf.value.len(),
        lf.value.usable_bins().len(),
        lf.row_errors.len(),
        config.lf_path.display()
    );

    let prior = initial_sfh(config)?;
    info!(
        "initial SFH: {} bins over [{:.3e}, {:.3e}] years",
        prior.len(),
        prior.t_min(),
        prior.t_max()
    );

    let settings = settings_from_config(config);
    let inverter = Inverter::new(physics, &config.params, &lf.value, settings.simulation)?;
    let outcome = run_to_convergence(&inverter, prior.clone(), &settings, |event| {
        info!(
            "iteration {:>3}: chi2={:.4} detected={} attempted={} [{}]",
            event.iteration,
            event.chi_square,
            event.stars_detected,
            event.stars_attempted,
            event.detector_state.label()
        );
    })?;
    info!("converged after {} iterations", outcome.state.iteration());

    let bootstrap_config = (config.bootstrap_repeats > 0).then(|| BootstrapConfig {
        repeats: config.bootstrap_repeats,
        noise: config.noise,
        seed: crate::math::derive_seed(config.seed, u64::MAX),
    });
    let bootstrap = match &bootstrap_config {
        Some(bc) => {
            let resampler = UncertaintyResampler::new(physics, &config.params, &lf.value, settings);
            Some(resampler.run(&prior, bc)?)
        }
        None => None,
    };

    let comparison = compute_comparison(&lf.value, &outcome.last_synthetic_density)?;
    let diagnostics = outcome
        .last_joint
        .as_ref()
        .map(|joint| compute_population_diagnostics(outcome.state.current_sfh(), &lf.value, joint));

    let result = ResultFile {
        tool: "sfh".to_string(),
        generated: Utc::now(),
        config: RunSummary {
            lf_path: config.lf_path.clone(),
            prior_path: config.prior_path.clone(),
            population_size: config.population_size,
            seed: config.seed,
            smoothing: settings.convergence.smoothing,
            threshold: config.threshold,
            min_iterations: config.min_iterations,
            max_iterations: config.max_iterations,
            params: config.params.clone(),
            physics: physics.name().to_string(),
            bootstrap: bootstrap_config,
        },
        sfh: outcome.state.current_sfh().clone(),
        chi_square_history: outcome.state.chi_square_history().to_vec(),
        iterations: outcome.state.iteration(),
        bootstrap: bootstrap.clone(),
    };

    Ok(InvertOutput {
        lf,
        outcome,
        bootstrap,
        comparison,
        diagnostics,
        result,
    })
}

/// Forward-simulate a known SFH onto the configured magnitude grid.
pub fn run_simulation(config: &SimulateConfig, physics: &dyn StellarPhysics) -> Result<ObservedLuminosityFunction, AppError> {
    let sfh = load_sfh(&config.sfh_path)?.value;
    let grid = ObservedLuminosityFunction::empty_grid(config.mag_min, config.mag_max, config.mag_bins)?;
    config.params.validate()?;
    let simulator = ForwardSimulator::new(
        physics,
        &config.params,
        &grid,
        SimulationConfig {
            population_size: config.population_size,
            max_attempts_per_star: config.max_attempts_per_star,
        },
    );
    let lf = synthetic_luminosity_function(&sfh, &simulator, config.seed)?;
    info!(
        "simulated {} white dwarfs from {} into {} magnitude bins",
        config.population_size,
        config.sfh_path.display(),
        lf.len()
    );
    Ok(lf)
}
