//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - converts them into run configs
//! - runs the inversion / simulation pipeline
//! - prints reports
//! - writes optional exports and the debug bundle

use std::path::Path;

use clap::Parser;
use log::info;

use crate::cli::{Command, InvertArgs, ModelArgs, ReportArgs, SimulateArgs};
use crate::domain::{InversionConfig, ModellingParameters, SimulateConfig};
use crate::error::AppError;
use crate::physics::AnalyticPhysics;

pub mod pipeline;

/// Entry point for the `sfh` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Invert(args) => handle_invert(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Report(args) => handle_report(args),
    }
}

fn handle_invert(args: InvertArgs) -> Result<(), AppError> {
    let config = inversion_config_from_args(&args)?;
    let physics = AnalyticPhysics::default();
    let run = pipeline::run_inversion(&config, &physics)?;

    println!("{}", crate::report::format_run_summary(&run.result));
    println!("{}", crate::report::format_sfh_table(&run.result.sfh, run.bootstrap.as_ref()));
    println!("{}", crate::report::format_comparison(&run.comparison));

    if let Some(path) = &config.export_csv {
        crate::io::write_sfh_csv(path, &run.result.sfh, run.bootstrap.as_ref())?;
        info!("wrote SFH CSV to {}", path.display());
    }
    if let Some(path) = &config.export_json {
        crate::io::write_result_json(path, &run.result)?;
        info!("wrote result JSON to {}", path.display());
    }
    if config.debug {
        let path = crate::debug::write_debug_bundle(
            Path::new("debug"),
            &run.result,
            &run.comparison,
            run.diagnostics.as_ref(),
        )?;
        info!("wrote debug bundle to {}", path.display());
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(&args)?;
    let physics = AnalyticPhysics::default();
    let lf = pipeline::run_simulation(&config, &physics)?;

    match &config.output {
        Some(path) => {
            crate::io::write_lf_csv(path, &lf)?;
            info!("wrote synthetic LF to {}", path.display());
        }
        None => println!("{}", crate::report::format_lf_table(&lf)),
    }
    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<(), AppError> {
    let result = crate::io::read_result_json(&args.result)?;

    println!("{}", crate::report::format_run_summary(&result));
    println!("{}", crate::report::format_sfh_table(&result.sfh, result.bootstrap.as_ref()));
    println!(
        "{}",
        crate::report::format_chi_square_history(&result.chi_square_history, &result.config.smoothing)
    );
    Ok(())
}

pub fn modelling_params_from_args(args: &ModelArgs) -> Result<ModellingParameters, AppError> {
    Ok(ModellingParameters::new(
        (args.z_mean, args.z_sigma),
        (args.y_mean, args.y_sigma),
        args.w_h,
        args.sigma_m,
        args.band,
    )?)
}

pub fn inversion_config_from_args(args: &InvertArgs) -> Result<InversionConfig, AppError> {
    Ok(InversionConfig {
        lf_path: args.lf.clone(),
        prior_path: args.prior.clone(),
        prior_t_min: args.t_min,
        prior_t_max: args.t_max,
        prior_bins: args.sfh_bins,
        prior_rate: args.prior_rate,
        population_size: args.population,
        max_attempts_per_star: args.max_attempts,
        seed: args.seed,
        smoothing: args.smoothing,
        window: args.window,
        threshold: args.threshold,
        min_iterations: args.min_iterations,
        max_iterations: args.max_iterations,
        bootstrap_repeats: args.bootstrap,
        noise: args.noise,
        params: modelling_params_from_args(&args.model)?,
        export_csv: args.export.clone(),
        export_json: args.export_json.clone(),
        debug: args.debug,
    })
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> Result<SimulateConfig, AppError> {
    Ok(SimulateConfig {
        sfh_path: args.sfh.clone(),
        mag_min: args.mag_min,
        mag_max: args.mag_max,
        mag_bins: args.mag_bins,
        population_size: args.population,
        max_attempts_per_star: args.max_attempts,
        seed: args.seed,
        params: modelling_params_from_args(&args.model)?,
        output: args.output.clone(),
    })
}
