//! Formatted terminal output.
//!
//! Formatting lives in one place so the numerical code stays clean and output
//! changes stay localized.

use crate::invert::{BootstrapSummary, Smoothing};
use crate::io::ResultFile;
use crate::lf::ObservedLuminosityFunction;
use crate::report::BinComparison;
use crate::sfh::SfhModel;

/// Header block: configuration, iterations and final chi-square.
pub fn format_run_summary(result: &ResultFile) -> String {
    let cfg = &result.config;
    let mut out = String::new();

    out.push_str("=== sfh - WDLF -> SFH inversion ===\n");
    out.push_str(&format!("Generated: {}\n", result.generated.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("LF: {}\n", cfg.lf_path.display()));
    match &cfg.prior_path {
        Some(p) => out.push_str(&format!("Prior: {}\n", p.display())),
        None => out.push_str("Prior: flat\n"),
    }
    out.push_str(&format!("Physics: {}\n", cfg.physics));
    out.push_str(&format!(
        "Params: Z={:.4}±{:.4} Y={:.3}±{:.3} w_H={:.2} σ_M={:.3} band={}\n",
        cfg.params.metallicity_mean,
        cfg.params.metallicity_sigma,
        cfg.params.helium_mean,
        cfg.params.helium_sigma,
        cfg.params.w_h,
        cfg.params.sigma_m,
        cfg.params.band.display_name(),
    ));
    out.push_str(&format!(
        "Population: {} per iteration | seed={}\n",
        cfg.population_size, cfg.seed
    ));
    out.push_str(&format!(
        "Convergence: {} | threshold={:.2e} | min={} | cap={}\n",
        cfg.smoothing.label(),
        cfg.threshold,
        cfg.min_iterations,
        cfg.max_iterations
    ));

    let first = result.chi_square_history.first().copied().unwrap_or(f64::NAN);
    let last = result.chi_square_history.last().copied().unwrap_or(f64::NAN);
    out.push_str(&format!(
        "Iterations: {} | chi2 {:.4} -> {:.4}\n",
        result.iterations, first, last
    ));

    let (total, total_sigma) = result.sfh.integrate();
    out.push_str(&format!("Integrated SFH: {total:.4e} ± {total_sigma:.4e}\n"));
    out.push('\n');

    out
}

/// Recovered SFH table, with bootstrap columns when present.
pub fn format_sfh_table(sfh: &SfhModel, bootstrap: Option<&BootstrapSummary>) -> String {
    let mut out = String::new();
    out.push_str("Recovered star-formation history:\n");

    let mut header = format!("{:>12} {:>12} {:>12} {:>12}", "t_centre", "width", "rate", "σ_int");
    if bootstrap.is_some() {
        header.push_str(&format!(" {:>12} {:>12} {:>12} {:>12}", "boot_mean", "boot_std", "boot_med", "boot_mad"));
    }
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(&"-".repeat(header.chars().count()));
    out.push('\n');

    for (i, b) in sfh.bins().iter().enumerate() {
        let mut row = format!(
            "{:>12.4e} {:>12.4e} {:>12.4e} {:>12.4e}",
            b.centre, b.width, b.rate, b.rate_uncertainty
        );
        if let Some(stats) = bootstrap.and_then(|s| s.per_bin.get(i)) {
            row.push_str(&format!(
                " {:>12.4e} {:>12.4e} {:>12.4e} {:>12.4e}",
                stats.mean, stats.std, stats.median, stats.mad
            ));
        }
        out.push_str(row.trim_end());
        out.push('\n');
    }

    if let Some(s) = bootstrap {
        out.push_str(&format!(
            "Bootstrap: {} succeeded, {} dropped",
            s.succeeded, s.dropped
        ));
        if !s.dropped_by_kind.is_empty() {
            let kinds: Vec<String> = s.dropped_by_kind.iter().map(|(k, n)| format!("{k}={n}")).collect();
            out.push_str(&format!(" ({})", kinds.join(", ")));
        }
        out.push('\n');
    }

    out
}

/// Observed vs synthetic LF per magnitude bin.
pub fn format_comparison(comparison: &[BinComparison]) -> String {
    let mut out = String::new();
    out.push_str("Final fit (observed vs synthetic LF):\n");
    out.push_str(&format!("{:>8} {:>12} {:>12} {:>8}\n", "mag", "observed", "synthetic", "pull"));
    out.push_str(&format!("{:-<8} {:-<12} {:-<12} {:-<8}\n", "", "", "", ""));
    for c in comparison {
        let pull = c.pull.map(|p| format!("{p:>8.2}")).unwrap_or_else(|| format!("{:>8}", "-"));
        out.push_str(&format!(
            "{:>8.3} {:>12.4e} {:>12.4e} {pull}\n",
            c.centre, c.observed, c.synthetic
        ));
    }
    out
}

/// Chi-square history with the smoothed curve alongside.
pub fn format_chi_square_history(history: &[f64], smoothing: &Smoothing) -> String {
    let mut out = String::new();
    out.push_str("Chi-square history:\n");
    out.push_str(&format!("{:>6} {:>14} {:>14}\n", "iter", "chi2", "smoothed"));
    for (i, chi2) in history.iter().enumerate() {
        let smoothed = smoothing
            .smoothed_value_at(history, i)
            .map(|v| format!("{v:>14.4}"))
            .unwrap_or_else(|| format!("{:>14}", "-"));
        out.push_str(&format!("{i:>6} {chi2:>14.4} {smoothed}\n"));
    }
    out
}

/// Luminosity function table (used by `sfh simulate`).
pub fn format_lf_table(lf: &ObservedLuminosityFunction) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>8} {:>8} {:>12} {:>12}\n", "mag", "width", "density", "σ"));
    out.push_str(&format!("{:-<8} {:-<8} {:-<12} {:-<12}\n", "", "", "", ""));
    for b in lf.bins() {
        out.push_str(&format!(
            "{:>8.3} {:>8.3} {:>12.4e} {:>12.4e}\n",
            b.centre, b.width, b.density, b.density_uncertainty
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::RobustSummary;
    use std::collections::BTreeMap;

    #[test]
    fn sfh_table_has_one_row_per_bin() {
        let sfh = SfhModel::uniform(0.0, 6e9, 3, 1e-12).unwrap();
        let text = format_sfh_table(&sfh, None);
        assert_eq!(text.lines().count(), 2 + 3);
        assert!(!text.contains("boot_mean"));
    }

    #[test]
    fn sfh_table_reports_dropped_realizations() {
        let sfh = SfhModel::uniform(0.0, 6e9, 2, 1e-12).unwrap();
        let mut dropped_by_kind = BTreeMap::new();
        dropped_by_kind.insert("empty-population".to_string(), 2);
        let summary = BootstrapSummary {
            per_bin: vec![RobustSummary::from_values(&[1e-12, 2e-12]).unwrap(); 2],
            succeeded: 8,
            dropped: 2,
            dropped_by_kind,
        };
        let text = format_sfh_table(&sfh, Some(&summary));
        assert!(text.contains("boot_mean"));
        assert!(text.contains("8 succeeded, 2 dropped (empty-population=2)"));
    }

    #[test]
    fn history_lists_every_iteration() {
        let history = [30.0, 20.0, 15.0, 14.0];
        let text = format_chi_square_history(&history, &Smoothing::SlidingLinear { window: 3 });
        assert_eq!(text.lines().count(), 2 + history.len());
    }
}
