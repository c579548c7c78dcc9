//! Monte Carlo forward model: SFH → synthetic white-dwarf luminosity function.
//!
//! Per synthetic star:
//! 1. formation lookback time from the SFH
//! 2. progenitor mass from the IMF, metallicity and helium from truncated normals
//! 3. cooling time = age − pre-WD lifetime; non-positive means still on the way, the
//!    star is counted as attempted but never binned
//! 4. final mass, atmosphere, magnitude (+ Gaussian error)
//! 5. stars whose magnitude lands in an LF bin are detections and are binned into the
//!    LF counts, P_WD (magnitude × WD mass), P_MS (formation bin × progenitor mass)
//!    and the transfer matrix (formation bin × magnitude bin)
//!
//! Sampling stops once the requested number of detections is reached. The work is
//! split into a fixed number of chunks, each with its own seeded RNG and private
//! histograms, merged at the end (so results depend on the seed, not the thread
//! count).

use log::{debug, warn};
use rayon::prelude::*;

use crate::domain::{Band, ModellingParameters, StarSamplers};
use crate::error::InversionError;
use crate::lf::ObservedLuminosityFunction;
use crate::math::{Histogram2d, UniformAxis, stream_rng};
use crate::physics::StellarPhysics;
use crate::sfh::{CreationTimeSampler, SfhModel};

/// Number of independent sampling chunks.
const SIM_CHUNKS: usize = 32;
/// White-dwarf mass axis of P_WD.
const WD_MASS_AXIS: (f64, f64, usize) = (0.4, 1.4, 50);
/// Number of progenitor-mass bins in P_MS.
const PROGENITOR_MASS_BINS: usize = 40;

/// Knobs of one forward simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    /// Number of detected white dwarfs to accumulate.
    pub population_size: usize,
    /// Attempt budget per requested detection.
    pub max_attempts_per_star: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_size: 20_000,
            max_attempts_per_star: 1_000,
        }
    }
}

/// Joint diagnostic distributions of one forward simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDistributions {
    /// Formation-time bin × progenitor mass.
    pub p_ms: Histogram2d,
    /// Magnitude bin × white-dwarf mass.
    pub p_wd: Histogram2d,
    /// Formation-time bin × magnitude bin.
    pub transfer: Histogram2d,
    pub progenitor_axis: UniformAxis,
    pub wd_mass_axis: UniformAxis,
}

impl JointDistributions {
    pub fn zeros(n_sfh: usize, n_lf: usize, progenitor_axis: UniformAxis, wd_mass_axis: UniformAxis) -> Self {
        Self {
            p_ms: Histogram2d::zeros(n_sfh, progenitor_axis.n),
            p_wd: Histogram2d::zeros(n_lf, wd_mass_axis.n),
            transfer: Histogram2d::zeros(n_sfh, n_lf),
            progenitor_axis,
            wd_mass_axis,
        }
    }

    /// Mean progenitor mass of the detected white dwarfs formed in `sfh_bin`.
    pub fn mean_progenitor_mass(&self, sfh_bin: usize) -> Option<f64> {
        weighted_axis_mean(&self.p_ms, sfh_bin, &self.progenitor_axis)
    }

    /// Mean white-dwarf mass of the detections in `lf_bin`.
    pub fn mean_wd_mass(&self, lf_bin: usize) -> Option<f64> {
        weighted_axis_mean(&self.p_wd, lf_bin, &self.wd_mass_axis)
    }

    fn merge(&mut self, other: &JointDistributions) {
        self.p_ms.merge(&other.p_ms);
        self.p_wd.merge(&other.p_wd);
        self.transfer.merge(&other.transfer);
    }
}

fn weighted_axis_mean(hist: &Histogram2d, row: usize, axis: &UniformAxis) -> Option<f64> {
    if row >= hist.shape().0 {
        return None;
    }
    let total = hist.row_sum(row);
    if !(total > 0.0) {
        return None;
    }
    let sum: f64 = hist.row(row).iter().enumerate().map(|(k, &n)| n * axis.centre(k)).sum();
    Some(sum / total)
}

/// Output of one forward simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPopulation {
    /// Raw detected-star counts per LF bin.
    pub lf_counts: Vec<f64>,
    pub joint: JointDistributions,
    /// All stars drawn, detected or not.
    pub stars_attempted: u64,
    pub stars_detected: u64,
}

impl SyntheticPopulation {
    /// Physical stars represented by one simulated star.
    pub fn scale(&self, sfh: &SfhModel) -> f64 {
        if self.stars_attempted == 0 {
            return 0.0;
        }
        sfh.integrate().0 / self.stars_attempted as f64
    }

    /// Synthetic density per LF bin in physical units.
    pub fn densities(&self, sfh: &SfhModel, lf: &ObservedLuminosityFunction) -> Vec<f64> {
        let scale = self.scale(sfh);
        self.lf_counts
            .iter()
            .zip(lf.bins())
            .map(|(&n, b)| n * scale / b.width)
            .collect()
    }
}

/// Forward simulator bound to one physics model, parameter set and LF binning.
pub struct ForwardSimulator<'a> {
    physics: &'a dyn StellarPhysics,
    params: &'a ModellingParameters,
    binning: &'a ObservedLuminosityFunction,
    config: SimulationConfig,
}

impl<'a> ForwardSimulator<'a> {
    pub fn new(
        physics: &'a dyn StellarPhysics,
        params: &'a ModellingParameters,
        binning: &'a ObservedLuminosityFunction,
        config: SimulationConfig,
    ) -> Self {
        Self {
            physics,
            params,
            binning,
            config,
        }
    }

    /// Draw a synthetic population from `sfh`.
    pub fn simulate(&self, sfh: &SfhModel, seed: u64) -> Result<SyntheticPopulation, InversionError> {
        if self.config.population_size == 0 {
            return Err(InversionError::InvalidParameter(
                "population size must be > 0".into(),
            ));
        }
        if self.config.max_attempts_per_star == 0 {
            return Err(InversionError::InvalidParameter(
                "attempt budget per star must be > 0".into(),
            ));
        }

        let sampler = sfh.sampler()?;
        let samplers = self.params.samplers()?;
        let (m_lo, m_hi) = self.physics.progenitor_mass_range();
        let progenitor_axis = UniformAxis::new(m_lo, m_hi, PROGENITOR_MASS_BINS);
        let wd_mass_axis = UniformAxis::new(WD_MASS_AXIS.0, WD_MASS_AXIS.1, WD_MASS_AXIS.2);

        let n_chunks = SIM_CHUNKS.min(self.config.population_size);
        let base = self.config.population_size / n_chunks;
        let extra = self.config.population_size % n_chunks;

        let ctx = ChunkContext {
            physics: self.physics,
            samplers: &samplers,
            sampler: &sampler,
            binning: self.binning,
            band: self.params.band,
            n_sfh: sfh.len(),
            progenitor_axis,
            wd_mass_axis,
        };

        let chunks: Vec<ChunkResult> = (0..n_chunks)
            .into_par_iter()
            .map(|chunk| {
                let target = base + usize::from(chunk < extra);
                let budget = (target as u64).saturating_mul(self.config.max_attempts_per_star);
                ctx.run(target, budget, seed, chunk as u64)
            })
            .collect();

        let mut lf_counts = vec![0.0; self.binning.len()];
        let mut joint = JointDistributions::zeros(sfh.len(), self.binning.len(), progenitor_axis, wd_mass_axis);
        let mut stars_attempted = 0u64;
        let mut stars_detected = 0u64;
        for c in &chunks {
            for (acc, v) in lf_counts.iter_mut().zip(c.lf_counts.iter()) {
                *acc += v;
            }
            joint.merge(&c.joint);
            stars_attempted += c.attempted;
            stars_detected += c.detected;
        }

        if stars_detected == 0 {
            return Err(InversionError::EmptyPopulation {
                attempted: stars_attempted,
            });
        }
        if (stars_detected as usize) < self.config.population_size {
            warn!(
                "attempt budget exhausted: {stars_detected}/{} white dwarfs detected after {stars_attempted} stars",
                self.config.population_size
            );
        }
        debug!(
            "forward simulation: {stars_detected} detected / {stars_attempted} attempted ({:.2}%)",
            100.0 * stars_detected as f64 / stars_attempted as f64
        );

        Ok(SyntheticPopulation {
            lf_counts,
            joint,
            stars_attempted,
            stars_detected,
        })
    }
}

struct ChunkContext<'a> {
    physics: &'a dyn StellarPhysics,
    samplers: &'a StarSamplers,
    sampler: &'a CreationTimeSampler,
    binning: &'a ObservedLuminosityFunction,
    band: Band,
    n_sfh: usize,
    progenitor_axis: UniformAxis,
    wd_mass_axis: UniformAxis,
}

struct ChunkResult {
    lf_counts: Vec<f64>,
    joint: JointDistributions,
    attempted: u64,
    detected: u64,
}

impl ChunkContext<'_> {
    fn run(&self, target: usize, budget: u64, seed: u64, chunk: u64) -> ChunkResult {
        let mut rng = stream_rng(seed, chunk);
        let mut out = ChunkResult {
            lf_counts: vec![0.0; self.binning.len()],
            joint: JointDistributions::zeros(self.n_sfh, self.binning.len(), self.progenitor_axis, self.wd_mass_axis),
            attempted: 0,
            detected: 0,
        };

        while (out.detected as usize) < target && out.attempted < budget {
            out.attempted += 1;

            let (age, sfh_bin) = self.sampler.draw(&mut rng);
            let mass = self.physics.draw_mass(&mut rng);
            let z = self.samplers.draw_metallicity(&mut rng);
            let y = self.samplers.draw_helium(&mut rng);

            let cooling_time = age - self.physics.lifetime(z, y, mass);
            if !(cooling_time > 0.0) {
                continue;
            }

            let wd_mass = self.physics.final_mass(mass);
            let atmosphere = self.samplers.draw_atmosphere(&mut rng);
            let mag = self.physics.cooling_magnitude(cooling_time, wd_mass, atmosphere, self.band)
                + self.samplers.draw_magnitude_error(&mut rng);

            let Some(lf_bin) = self.binning.bin_index(mag) else {
                continue;
            };

            out.lf_counts[lf_bin] += 1.0;
            out.joint.p_ms.add(sfh_bin, self.progenitor_axis.index(mass), 1.0);
            out.joint.p_wd.add(lf_bin, self.wd_mass_axis.index(wd_mass), 1.0);
            out.joint.transfer.add(sfh_bin, lf_bin, 1.0);
            out.detected += 1;
        }

        out
    }
}

/// Forward-simulate a known SFH into an observed-style LF.
///
/// Densities are `count · scale / width`; uncertainties are the Poisson error on
/// the count, `√count · scale / width`. Empty bins get a NaN uncertainty (unusable).
pub fn synthetic_luminosity_function(
    sfh: &SfhModel,
    simulator: &ForwardSimulator<'_>,
    seed: u64,
) -> Result<ObservedLuminosityFunction, InversionError> {
    let population = simulator.simulate(sfh, seed)?;
    let scale = population.scale(sfh);
    let binning = simulator.binning;
    let (densities, uncertainties): (Vec<f64>, Vec<f64>) = population
        .lf_counts
        .iter()
        .zip(binning.bins())
        .map(|(&n, b)| {
            let density = n * scale / b.width;
            let sigma = if n > 0.0 { n.sqrt() * scale / b.width } else { f64::NAN };
            (density, sigma)
        })
        .unzip();
    binning.with_densities(&densities, &uncertainties)
}
