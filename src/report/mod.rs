//! Reporting utilities: observed-vs-synthetic comparison and terminal output.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::lf::ObservedLuminosityFunction;
use crate::sfh::SfhModel;
use crate::sim::JointDistributions;

pub mod format;

pub use format::*;

/// One magnitude bin of the final fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinComparison {
    pub centre: f64,
    pub observed: f64,
    pub synthetic: f64,
    /// `(synthetic − observed) / σ`, `None` for bins excluded from the chi-square.
    pub pull: Option<f64>,
}

/// Compare a synthetic density with the observed LF bin by bin.
pub fn compute_comparison(
    observed: &ObservedLuminosityFunction,
    synthetic_density: &[f64],
) -> Result<Vec<BinComparison>, AppError> {
    if synthetic_density.len() != observed.len() {
        return Err(AppError::new(
            4,
            format!(
                "Synthetic LF has {} bins, observed LF has {}.",
                synthetic_density.len(),
                observed.len()
            ),
        ));
    }
    Ok(observed
        .bins()
        .iter()
        .zip(synthetic_density)
        .map(|(b, &synthetic)| BinComparison {
            centre: b.centre,
            observed: b.density,
            synthetic,
            pull: b.is_usable().then(|| (synthetic - b.density) / b.density_uncertainty),
        })
        .collect())
}

/// The `n` bins with the largest absolute pull, worst first.
pub fn worst_bins(comparison: &[BinComparison], n: usize) -> Vec<BinComparison> {
    let mut sorted: Vec<BinComparison> = comparison.iter().filter(|c| c.pull.is_some()).copied().collect();
    sorted.sort_by(|a, b| {
        let pa = a.pull.map(f64::abs).unwrap_or(0.0);
        let pb = b.pull.map(f64::abs).unwrap_or(0.0);
        pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}

/// Detections of the last forward simulation per formation-time bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationRow {
    pub centre: f64,
    pub detected: f64,
    pub mean_progenitor_mass: Option<f64>,
}

/// Detections of the last forward simulation per magnitude bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeRow {
    pub centre: f64,
    pub detected: f64,
    pub mean_wd_mass: Option<f64>,
}

/// P_MS and P_WD summarised along their mass axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationDiagnostics {
    pub formation: Vec<FormationRow>,
    pub magnitude: Vec<MagnitudeRow>,
}

pub fn compute_population_diagnostics(
    sfh: &SfhModel,
    observed: &ObservedLuminosityFunction,
    joint: &JointDistributions,
) -> PopulationDiagnostics {
    let formation = sfh
        .bins()
        .iter()
        .enumerate()
        .map(|(j, b)| FormationRow {
            centre: b.centre,
            detected: joint.p_ms.row_sum(j),
            mean_progenitor_mass: joint.mean_progenitor_mass(j),
        })
        .collect();
    let magnitude = observed
        .bins()
        .iter()
        .enumerate()
        .map(|(i, b)| MagnitudeRow {
            centre: b.centre,
            detected: joint.p_wd.row_sum(i),
            mean_wd_mass: joint.mean_wd_mass(i),
        })
        .collect();
    PopulationDiagnostics { formation, magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lf::LfBin;
    use crate::math::UniformAxis;

    fn lf() -> ObservedLuminosityFunction {
        ObservedLuminosityFunction::new(vec![
            LfBin {
                centre: 12.0,
                width: 1.0,
                density: 10.0,
                density_uncertainty: 1.0,
            },
            LfBin {
                centre: 13.0,
                width: 1.0,
                density: 20.0,
                density_uncertainty: f64::NAN,
            },
            LfBin {
                centre: 14.0,
                width: 1.0,
                density: 30.0,
                density_uncertainty: 2.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn pulls_skip_unusable_bins() {
        let cmp = compute_comparison(&lf(), &[12.0, 0.0, 24.0]).unwrap();
        assert_eq!(cmp[0].pull, Some(2.0));
        assert_eq!(cmp[1].pull, None);
        assert_eq!(cmp[2].pull, Some(-3.0));

        let worst = worst_bins(&cmp, 1);
        assert_eq!(worst.len(), 1);
        assert_eq!(worst[0].centre, 14.0);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        assert_eq!(compute_comparison(&lf(), &[1.0]).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn diagnostics_average_along_mass_axes() {
        let sfh = SfhModel::uniform(0.0, 4e9, 2, 1e-12).unwrap();
        let mut joint = JointDistributions::zeros(2, 3, UniformAxis::new(0.0, 4.0, 4), UniformAxis::new(0.0, 1.0, 2));
        // Formation bin 0: one star at 1.5 and one at 3.5 M_sun.
        joint.p_ms.add(0, 1, 1.0);
        joint.p_ms.add(0, 3, 1.0);
        // Magnitude bin 2: three stars in the upper WD mass bin.
        joint.p_wd.add(2, 1, 3.0);

        let diag = compute_population_diagnostics(&sfh, &lf(), &joint);
        assert_eq!(diag.formation.len(), 2);
        assert_eq!(diag.formation[0].detected, 2.0);
        assert_eq!(diag.formation[0].mean_progenitor_mass, Some(2.5));
        assert_eq!(diag.formation[1].mean_progenitor_mass, None);
        assert_eq!(diag.magnitude[2].detected, 3.0);
        assert_eq!(diag.magnitude[2].mean_wd_mass, Some(0.75));
        assert_eq!(diag.magnitude[0].mean_wd_mass, None);
    }
}
