//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of
//! presentation details.

use crate::app::RunOutput;
use crate::domain::{LiteCurve, QuickTtvs};
use crate::io::TableHeader;
use crate::omc::OmcSelection;

/// Run summary: target, per-planet fit, O-C model diagnostics and outputs.
pub fn format_run_summary(run: &RunOutput) -> String {
    let mut out = String::new();
    let ctx = &run.context;

    out.push_str("=== ttv - Transit Timing Run ===\n");
    out.push_str(&format!("Target: {} ({}, KIC {})\n", ctx.target, ctx.koi_id, ctx.kic_id));
    out.push_str(&format!(
        "Baseline: [{:.3}, {:.3}] d ({:.1} d) | limb darkening u = [{:.3}, {:.3}]\n",
        ctx.time_start,
        ctx.time_end,
        ctx.baseline(),
        ctx.limbdark[0],
        ctx.limbdark[1]
    ));
    for (cadence, lc) in &run.detrended {
        out.push_str(&format!(
            "Detrended {}: {} cadences in {} quarters\n",
            cadence.label(),
            lc.len(),
            lc.quarters().len()
        ));
    }
    out.push_str(&format!(
        "Reconciliation: {} bad cadences, {} quarters excluded\n",
        run.reconciliation.bad_count(),
        run.reconciliation.excluded_quarters.len()
    ));

    out.push_str("\nPlanets:\n");
    out.push_str(
        format!(
            "{:<3} {:>12} {:>12} {:>8} {:>8} {:>7} {:>9} {:>6}\n",
            "n", "period", "epoch", "ror", "dur[h]", "b", "buffer[h]", "good"
        )
        .trim_end(),
    );
    out.push('\n');
    for (n, p) in run.planets.iter().enumerate() {
        let ror = run.radius_ratio.get(n).copied().unwrap_or(f64::NAN);
        let buffer = run.reconciliation.ttv_buffer.get(n).copied().unwrap_or(f64::NAN);
        out.push_str(
            format!(
                "{n:<3} {:>12.6} {:>12.5} {:>8.4} {:>8.3} {:>7.3} {:>9.3} {:>6}\n",
                p.period,
                p.epoch,
                ror,
                p.duration * 24.0,
                p.impact,
                buffer * 24.0,
                format!("{}/{}", p.num_good(), p.len()),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    for (n, o) in run.omc.iter().enumerate() {
        out.push_str(&format!("\nO-C models, planet {n}:\n"));
        out.push_str(&format_selection(&o.selection));
        let outliers = o.quick.outlier.iter().filter(|x| **x).count();
        out.push_str(&format!("  outliers: {outliers}/{}\n", o.quick.index.len()));
    }

    if !run.written.is_empty() {
        out.push_str("\nWritten:\n");
        for path in &run.written {
            out.push_str(&format!("- {}\n", path.display()));
        }
    }
    out
}

fn format_selection(selection: &OmcSelection) -> String {
    let mut out = String::new();
    for fit in &selection.fits {
        let chosen = if fit.kind == selection.best.kind { "*" } else { " " };
        out.push_str(&format!("{chosen} {:<20} AIC={:.3}\n", fit.kind.label(), fit.aic));
    }
    for (kind, reason) in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {reason}\n", kind.label()));
    }
    out
}

/// Short description of a stored light-curve table.
pub fn format_table_summary(header: &TableHeader, lc: &LiteCurve) -> String {
    let mut out = String::new();
    out.push_str(&format!("Target: {}\n", header.target));
    out.push_str(&format!(
        "Cadence: {}\n",
        header.cadence.map_or("unknown", |c| c.label())
    ));
    out.push_str(&format!("Written: {}\n", header.created.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("Columns: {}\n", header.columns.join(", ")));
    out.push_str(&format!("Rows: {}\n", lc.len()));
    if let (Some(first), Some(last)) = (lc.time.first(), lc.time.last()) {
        out.push_str(&format!("Time: [{first:.5}, {last:.5}]\n"));
    }
    let quarters: Vec<String> = lc.quarters().iter().map(i32::to_string).collect();
    out.push_str(&format!("Quarters: {}\n", quarters.join(" ")));
    let masked = lc.mask.iter().filter(|m| **m).count();
    out.push_str(&format!("Masked: {masked}\n"));
    out
}

/// Quick-TTV file as an aligned table (O-C in minutes relative to the
/// quick times).
pub fn format_quick_ttvs(ttvs: &QuickTtvs) -> String {
    let mut out = String::new();
    out.push_str(
        format!("{:>6} {:>16} {:>16} {:>10} {:>8}\n", "index", "independent", "quick", "Δ[min]", "p_out").trim_end(),
    );
    out.push('\n');
    for i in 0..ttvs.index.len() {
        let flag = if ttvs.outlier[i] { " x" } else { "" };
        out.push_str(&format!(
            "{:>6} {:>16.6} {:>16.6} {:>10.3} {:>8.3}{flag}\n",
            ttvs.index[i],
            ttvs.independent[i],
            ttvs.quick[i],
            (ttvs.independent[i] - ttvs.quick[i]) * 1440.0,
            ttvs.outlier_prob[i],
        ));
    }
    out
}
