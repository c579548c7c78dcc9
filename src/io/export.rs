//! CSV exports.
//!
//! Meant to be easy to consume in spreadsheets or downstream scripts, and readable
//! by this tool's own ingest (an exported LF is a valid `--lf` input, an exported SFH
//! a valid `--prior`/`--sfh` input).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::AppError;
use crate::invert::BootstrapSummary;
use crate::lf::ObservedLuminosityFunction;
use crate::sfh::SfhModel;

/// Write the recovered SFH, with bootstrap statistics when present.
pub fn write_sfh_csv(path: &Path, sfh: &SfhModel, bootstrap: Option<&BootstrapSummary>) -> Result<(), AppError> {
    let mut file = create(path)?;
    write_sfh(&mut file, sfh, bootstrap)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

/// Write a luminosity function in the ingest format.
pub fn write_lf_csv(path: &Path, lf: &ObservedLuminosityFunction) -> Result<(), AppError> {
    let mut file = create(path)?;
    write_lf(&mut file, lf)
        .map_err(|e| AppError::new(2, format!("Failed to write LF CSV '{}': {e}", path.display())))
}

fn create(path: &Path) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))
}

fn write_sfh<W: Write>(out: &mut W, sfh: &SfhModel, bootstrap: Option<&BootstrapSummary>) -> std::io::Result<()> {
    write!(out, "centre,width,rate,rate_uncertainty")?;
    if bootstrap.is_some() {
        write!(out, ",boot_mean,boot_std,boot_median,boot_mad")?;
    }
    writeln!(out)?;

    for (i, b) in sfh.bins().iter().enumerate() {
        write!(out, "{:.6e},{:.6e},{:.6e},{:.6e}", b.centre, b.width, b.rate, b.rate_uncertainty)?;
        if let Some(stats) = bootstrap.and_then(|s| s.per_bin.get(i)) {
            write!(
                out,
                ",{:.6e},{:.6e},{:.6e},{:.6e}",
                stats.mean, stats.std, stats.median, stats.mad
            )?;
        } else if bootstrap.is_some() {
            write!(out, ",,,,")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_lf<W: Write>(out: &mut W, lf: &ObservedLuminosityFunction) -> std::io::Result<()> {
    writeln!(out, "centre,width,density,uncertainty")?;
    for b in lf.bins() {
        let sigma = if b.density_uncertainty.is_finite() {
            format!("{:.6e}", b.density_uncertainty)
        } else {
            String::new()
        };
        writeln!(out, "{:.6},{:.6},{:.6e},{sigma}", b.centre, b.width, b.density)?;
    }
    Ok(())
}
