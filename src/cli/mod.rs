//! Command-line parsing for the WDLF → SFH inverter.
//!
//! Argument parsing and command dispatch stay separate from the numerical code: the
//! structs here are converted into plain config values in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Band, NoiseModel, SmoothingKind, Y_SOLAR, Z_SOLAR};
use crate::invert::{DEFAULT_MIN_ITERATIONS, DEFAULT_THRESHOLD, DEFAULT_WINDOW};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sfh",
    version,
    about = "Recover a star-formation history from a white-dwarf luminosity function"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Invert an observed luminosity function, optionally with bootstrap uncertainties.
    Invert(InvertArgs),
    /// Forward-simulate a known SFH into a synthetic luminosity function.
    Simulate(SimulateArgs),
    /// Print a previously exported result JSON.
    Report(ReportArgs),
}

/// Modelling parameters shared by `invert` and `simulate`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Mean metallicity Z.
    #[arg(long, default_value_t = Z_SOLAR)]
    pub z_mean: f64,

    /// Metallicity scatter (0 = fixed).
    #[arg(long, default_value_t = 0.0)]
    pub z_sigma: f64,

    /// Mean helium mass fraction Y.
    #[arg(long, default_value_t = Y_SOLAR)]
    pub y_mean: f64,

    /// Helium scatter (0 = fixed).
    #[arg(long, default_value_t = 0.0)]
    pub y_sigma: f64,

    /// Fraction of hydrogen-atmosphere white dwarfs.
    #[arg(long = "w-h", default_value_t = 0.8)]
    pub w_h: f64,

    /// Gaussian magnitude error.
    #[arg(long, default_value_t = 0.05)]
    pub sigma_m: f64,

    /// Photometric band of the luminosity function.
    #[arg(long, value_enum, default_value_t = Band::Bol)]
    pub band: Band,
}

/// Options for `sfh invert`.
#[derive(Debug, Parser, Clone)]
pub struct InvertArgs {
    /// Observed luminosity function CSV (centre,width,density,uncertainty).
    #[arg(long, value_name = "CSV")]
    pub lf: PathBuf,

    /// Initial-guess SFH CSV (centre,width,rate). A flat prior is used when absent.
    #[arg(long, value_name = "CSV")]
    pub prior: Option<PathBuf>,

    /// Flat prior: earliest lookback time (years).
    #[arg(long, default_value_t = 0.0)]
    pub t_min: f64,

    /// Flat prior: latest lookback time (years).
    #[arg(long, default_value_t = 1.2e10)]
    pub t_max: f64,

    /// Flat prior: number of time bins.
    #[arg(long, default_value_t = 12)]
    pub sfh_bins: usize,

    /// Flat prior: constant rate.
    #[arg(long, default_value_t = 1e-12)]
    pub prior_rate: f64,

    /// Detected white dwarfs per forward simulation.
    #[arg(short = 'n', long, default_value_t = 20_000)]
    pub population: usize,

    /// Simulated stars allowed per requested detection before giving up.
    #[arg(long, default_value_t = 1_000)]
    pub max_attempts: u64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Chi-square smoothing used for convergence detection.
    #[arg(long, value_enum, default_value_t = SmoothingKind::SlidingLinear)]
    pub smoothing: SmoothingKind,

    /// Window length for sliding-linear smoothing.
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    /// Converged when the smoothed chi-square trend per iteration drops below this
    /// fraction.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,

    /// Iterations before the first convergence check.
    #[arg(long, default_value_t = DEFAULT_MIN_ITERATIONS)]
    pub min_iterations: usize,

    /// Give up after this many iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Bootstrap realizations (0 = skip).
    #[arg(long, default_value_t = 0)]
    pub bootstrap: usize,

    /// Noise model for bootstrap realizations.
    #[arg(long, value_enum, default_value_t = NoiseModel::Gaussian)]
    pub noise: NoiseModel,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Export the recovered SFH to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export the full result (config, SFH, history, bootstrap) to JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Write a markdown debug bundle under `debug/`.
    #[arg(long)]
    pub debug: bool,
}

/// Options for `sfh simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Known SFH CSV (centre,width,rate).
    #[arg(long, value_name = "CSV")]
    pub sfh: PathBuf,

    /// Brightest magnitude of the output grid.
    #[arg(long, default_value_t = 10.0)]
    pub mag_min: f64,

    /// Faintest magnitude of the output grid.
    #[arg(long, default_value_t = 18.0)]
    pub mag_max: f64,

    /// Number of magnitude bins.
    #[arg(long, default_value_t = 16)]
    pub mag_bins: usize,

    /// Detected white dwarfs to simulate.
    #[arg(short = 'n', long, default_value_t = 50_000)]
    pub population: usize,

    /// Simulated stars allowed per requested detection before giving up.
    #[arg(long, default_value_t = 1_000)]
    pub max_attempts: u64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Write the synthetic LF to CSV (printed to the terminal otherwise).
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}

/// Options for `sfh report`.
#[derive(Debug, Parser)]
pub struct ReportArgs {
    /// Result JSON produced by `sfh invert --export-json`.
    #[arg(long, value_name = "JSON")]
    pub result: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_defaults_and_flags_parse() {
        let cli = Cli::try_parse_from([
            "sfh",
            "invert",
            "--lf",
            "lf.csv",
            "--smoothing",
            "power-law",
            "--bootstrap",
            "20",
            "--noise",
            "poisson",
            "--w-h",
            "0.6",
            "--band",
            "v",
        ])
        .unwrap();
        let Command::Invert(args) = cli.command else {
            panic!("expected invert");
        };
        assert_eq!(args.smoothing, SmoothingKind::PowerLaw);
        assert_eq!(args.bootstrap, 20);
        assert_eq!(args.noise, NoiseModel::Poisson);
        assert_eq!(args.model.w_h, 0.6);
        assert_eq!(args.model.band, Band::V);
        assert_eq!(args.max_iterations, 200);
        assert_eq!(args.window, 10);
        assert_eq!(args.threshold, 0.02);
        assert_eq!(args.min_iterations, 10);
        assert!(args.prior.is_none());
    }

    #[test]
    fn simulate_requires_sfh() {
        assert!(Cli::try_parse_from(["sfh", "simulate"]).is_err());
        assert!(Cli::try_parse_from(["sfh", "simulate", "--sfh", "truth.csv"]).is_ok());
    }
}
