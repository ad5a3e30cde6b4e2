//! Formatted terminal output.
//!
//! Formatting lives in one place so the analysis code stays free of
//! presentation details.

use crate::dataset::DatasetInfo;
use crate::error::AppError;
use crate::fit::{FitResult, FitStatus, FluxPoint, HypothesisSelection};
use crate::report::SelectionSummary;

/// Header plus selection outcome.
pub fn format_selection(summary: &SelectionSummary) -> String {
    let mut out = String::new();
    out.push_str("=== vhe - spectral analysis ===\n");
    out.push_str(&format!(
        "Target: RA={:.3} Dec={:.3} | radius={:.2} deg\n",
        summary.target.ra_deg, summary.target.dec_deg, summary.radius_deg
    ));
    out.push_str(&format!(
        "Selected: {} of {} observations | livetime={:.2} h\n",
        summary.selected.len(),
        summary.candidates,
        summary.total_livetime_s / 3600.0
    ));
    if summary.skipped_rows > 0 {
        out.push_str(&format!("Catalog rows skipped: {}\n", summary.skipped_rows));
    }
    if !summary.selected.is_empty() {
        let ids: Vec<String> = summary.selected.iter().map(|id| id.to_string()).collect();
        out.push_str(&format!("Obs ids: {}\n", ids.join(", ")));
    }
    out
}

/// Observations removed during loading or reduction.
pub fn format_dropped(dropped: &[(u32, AppError)]) -> String {
    if dropped.is_empty() {
        return String::new();
    }
    let mut out = format!("\nDropped observations ({}):\n", dropped.len());
    for (obs_id, err) in dropped {
        out.push_str(&format!("  {obs_id:>8}  {err}\n"));
    }
    out
}

/// Dataset info table (per observation or cumulative).
pub fn format_info_table(title: &str, rows: &[DatasetInfo]) -> String {
    let mut out = format!("\n{title}:\n");
    push_line(
        &mut out,
        format!(
            "{:<14} {:>5} {:>9} {:>9} {:>9} {:>9} {:>8} {:>7} {:>9}",
            "name", "n_obs", "counts", "off", "bkg", "excess", "sqrt_ts", "alpha", "live[h]"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<14} {:->5} {:->9} {:->9} {:->9} {:->9} {:->8} {:->7} {:->9}",
            "", "", "", "", "", "", "", "", ""
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<14} {:>5} {:>9.0} {:>9.0} {:>9.2} {:>9.2} {:>8.2} {:>7.4} {:>9.3}",
                truncate(&r.name, 14),
                r.n_obs,
                r.counts,
                r.counts_off,
                r.background,
                r.excess,
                r.sqrt_ts,
                r.alpha,
                r.livetime_s / 3600.0
            ),
        );
    }
    out
}

/// One block per hypothesis: status, statistic, parameters with errors.
pub fn format_fit_table(fits: &[FitResult], accepted: Option<usize>) -> String {
    let mut out = String::from("\nFits:\n");
    for (i, fit) in fits.iter().enumerate() {
        let mark = if accepted == Some(i) { "*" } else { " " };
        out.push_str(&format!(
            "{mark} {:<18} stat={:<12.4} status={}\n",
            fit.model.kind.display_name(),
            fit.total_stat,
            fit.status.label()
        ));
        match &fit.status {
            FitStatus::NotConverged { reason } => out.push_str(&format!("    ({reason})\n")),
            FitStatus::ConvergedAtBoundary { parameters } => {
                out.push_str(&format!("    (at bound: {})\n", parameters.join(", ")))
            }
            FitStatus::Converged => {}
        }
        for p in &fit.model.parameters {
            let value = match p.error {
                Some(err) => format!("{:.4e} ± {:.2e}", p.value, err),
                None if p.frozen => format!("{:.4e} (frozen)", p.value),
                None => format!("{:.4e}", p.value),
            };
            push_line(&mut out, format!("    {:<10} {value} {}", p.name, p.unit));
        }
    }
    out
}

pub fn format_comparisons(selection: &HypothesisSelection) -> String {
    let mut out = String::from("\nModel comparison:\n");
    if selection.comparisons.is_empty() && selection.skipped.is_empty() {
        out.push_str("  (single hypothesis)\n");
    }
    for c in &selection.comparisons {
        out.push_str(&format!(
            "  {} -> {}: dTS={:.3} dof={} p={:.3e} sigma={:.2}\n",
            c.simple.display_name(),
            c.complex.display_name(),
            c.delta_ts,
            c.dof,
            c.p_value,
            c.significance
        ));
    }
    for (kind, reason) in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {reason}\n", kind.display_name()));
    }
    out.push_str(&format!("Accepted: {}\n", selection.accepted_kind.display_name()));
    out
}

pub fn format_flux_points(points: &[FluxPoint]) -> String {
    let mut out = String::from("\nFlux points:\n");
    push_line(
        &mut out,
        format!(
            "{:>8} {:>8} {:>8} {:>7} {:>13} {:>7} {:>7}",
            "e_ref", "e_min", "e_max", "norm", "dnde", "sqrt_ts", "counts"
        ),
    );
    for p in points {
        let flux = if p.is_ul {
            format!("<{:.3e}", p.dnde_ul)
        } else {
            format!("{:.3e}", p.dnde)
        };
        push_line(
            &mut out,
            format!(
                "{:>8.3} {:>8.3} {:>8.3} {:>7.3} {:>13} {:>7.2} {:>7.0}",
                p.e_ref, p.e_min, p.e_max, p.norm, flux, p.sqrt_ts, p.counts
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
