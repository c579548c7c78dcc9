//! Debug bundle writer for inspecting an inversion run.
//!
//! `sfh invert --debug` drops a markdown file under `debug/` with the run
//! configuration, the chi-square history next to its smoothed curve and per-step
//! relative change (what the convergence detector saw), the final SFH, the final
//! observed-vs-synthetic comparison and the mass summaries of P_MS and P_WD.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::AppError;
use crate::io::ResultFile;
use crate::report::{BinComparison, PopulationDiagnostics};

/// Write the bundle into `dir` and return its path.
pub fn write_debug_bundle(
    dir: &Path,
    result: &ResultFile,
    comparison: &[BinComparison],
    diagnostics: Option<&PopulationDiagnostics>,
) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("sfh_debug_seed{}_{ts}.md", result.config.seed));

    let mut file = File::create(&path).map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;
    file.write_all(render_debug_bundle(result, comparison, diagnostics).as_bytes())
        .map_err(|e| AppError::new(4, format!("Failed to write debug bundle: {e}")))?;

    Ok(path)
}

/// Markdown body of the bundle.
pub fn render_debug_bundle(
    result: &ResultFile,
    comparison: &[BinComparison],
    diagnostics: Option<&PopulationDiagnostics>,
) -> String {
    let cfg = &result.config;
    let mut out = String::new();

    out.push_str("# sfh debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- lf: {}\n", cfg.lf_path.display()));
    out.push_str(&format!(
        "- prior: {}\n",
        cfg.prior_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "flat".to_string())
    ));
    out.push_str(&format!("- physics: {}\n", cfg.physics));
    out.push_str(&format!("- seed: {}\n", cfg.seed));
    out.push_str(&format!("- population_size: {}\n", cfg.population_size));
    out.push_str(&format!(
        "- convergence: {}, threshold={:.3e}, min_iterations={}, max_iterations={}\n",
        cfg.smoothing.label(),
        cfg.threshold,
        cfg.min_iterations,
        cfg.max_iterations
    ));
    out.push_str(&format!("- params: {:?}\n", cfg.params));
    if let Some(b) = &cfg.bootstrap {
        out.push_str(&format!(
            "- bootstrap: repeats={}, noise={:?}, seed={}\n",
            b.repeats, b.noise, b.seed
        ));
    }

    out.push_str("\n## Chi-square history\n");
    out.push_str("| iteration | chi2 | smoothed | relative_change |\n");
    out.push_str("| - | - | - | - |\n");
    let history = &result.chi_square_history;
    for (i, chi2) in history.iter().enumerate() {
        let smoothed = cfg.smoothing.smoothed_value_at(history, i);
        let change = cfg.smoothing.relative_change_at_latest(&history[..=i]);
        out.push_str(&format!(
            "| {i} | {chi2:.6} | {} | {} |\n",
            fmt_opt(smoothed, 6),
            fmt_opt(change, 6)
        ));
    }

    out.push_str("\n## Final SFH\n");
    out.push_str("| centre | width | rate | rate_uncertainty | boot_mean | boot_std | boot_median | boot_mad |\n");
    out.push_str("| - | - | - | - | - | - | - | - |\n");
    for (i, b) in result.sfh.bins().iter().enumerate() {
        let stats = result.bootstrap.as_ref().and_then(|s| s.per_bin.get(i));
        out.push_str(&format!(
            "| {:.4e} | {:.4e} | {:.4e} | {:.4e} | {} | {} | {} | {} |\n",
            b.centre,
            b.width,
            b.rate,
            b.rate_uncertainty,
            fmt_sci(stats.map(|s| s.mean)),
            fmt_sci(stats.map(|s| s.std)),
            fmt_sci(stats.map(|s| s.median)),
            fmt_sci(stats.map(|s| s.mad)),
        ));
    }
    if let Some(s) = &result.bootstrap {
        out.push_str(&format!(
            "\nBootstrap: succeeded={}, dropped={} {:?}\n",
            s.succeeded, s.dropped, s.dropped_by_kind
        ));
    }

    out.push_str("\n## Final LF comparison\n");
    out.push_str("| mag | observed | synthetic | pull |\n");
    out.push_str("| - | - | - | - |\n");
    for c in comparison {
        out.push_str(&format!(
            "| {:.3} | {:.4e} | {:.4e} | {} |\n",
            c.centre,
            c.observed,
            c.synthetic,
            fmt_opt(c.pull, 3)
        ));
    }

    if let Some(d) = diagnostics {
        out.push_str("\n## Last simulation: P_MS by formation time\n");
        out.push_str("| centre | detected | mean_progenitor_mass |\n");
        out.push_str("| - | - | - |\n");
        for row in &d.formation {
            out.push_str(&format!(
                "| {:.4e} | {:.0} | {} |\n",
                row.centre,
                row.detected,
                fmt_opt(row.mean_progenitor_mass, 3)
            ));
        }
        out.push_str("\n## Last simulation: P_WD by magnitude\n");
        out.push_str("| mag | detected | mean_wd_mass |\n");
        out.push_str("| - | - | - |\n");
        for row in &d.magnitude {
            out.push_str(&format!(
                "| {:.3} | {:.0} | {} |\n",
                row.centre,
                row.detected,
                fmt_opt(row.mean_wd_mass, 3)
            ));
        }
    }

    out
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.digits$}"),
        _ => "-".to_string(),
    }
}

fn fmt_sci(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.4e}"),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModellingParameters;
    use crate::invert::Smoothing;
    use crate::io::RunSummary;
    use crate::sfh::SfhModel;
    use chrono::Utc;

    #[test]
    fn bundle_lists_history_and_bins() {
        let result = ResultFile {
            tool: "sfh".to_string(),
            generated: Utc::now(),
            config: RunSummary {
                lf_path: PathBuf::from("lf.csv"),
                prior_path: None,
                population_size: 100,
                seed: 1,
                smoothing: Smoothing::SlidingLinear { window: 3 },
                threshold: 1e-3,
                min_iterations: 2,
                max_iterations: 10,
                params: ModellingParameters::default(),
                physics: "analytic".to_string(),
                bootstrap: None,
            },
            sfh: SfhModel::uniform(0.0, 4e9, 2, 1e-12).unwrap(),
            chi_square_history: vec![9.0, 4.0, 3.9],
            iterations: 3,
            bootstrap: None,
        };
        let diagnostics = PopulationDiagnostics {
            formation: vec![crate::report::FormationRow {
                centre: 1e9,
                detected: 40.0,
                mean_progenitor_mass: Some(2.5),
            }],
            magnitude: vec![crate::report::MagnitudeRow {
                centre: 12.5,
                detected: 40.0,
                mean_wd_mass: None,
            }],
        };
        let text = render_debug_bundle(&result, &[], Some(&diagnostics));
        assert!(text.contains("## Chi-square history"));
        assert!(text.contains("| 2 | 3.900000 |"));
        assert!(text.contains("prior: flat"));
        // First row has no relative change yet.
        assert!(text.contains("| 0 | 9.000000 | 9.000000 | - |"));
        assert!(text.contains("| 1.0000e9 | 40 | 2.500 |"));
        assert!(text.contains("| 12.500 | 40 | - |"));
        assert!(!render_debug_bundle(&result, &[], None).contains("P_MS"));
    }
}
