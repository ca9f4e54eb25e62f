//! Outlier reconciliation between independent and quick transit times.
//!
//! A cadence is discarded before re-detrending only when it is an outlier
//! under the transit model built from *both* timing series. Residuals cover
//! every detrended cadence of a quarter, not just the fitting windows.
//! Quarters in which no transit photometry was collected are excluded as a
//! whole.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::domain::{LCIT, LiteCurve, Planet};
use crate::error::FitError;
use crate::fit::{QuarterData, QuarterSet, TransitTimes};
use crate::math::special::normal_interval_upper;
use crate::math::stats::{mad_std, median};
use crate::transit::{PlanetTransits, QuadraticLimbDarkening, TransitModel};

/// Cadences closer than this (days) are considered the same cadence.
const TIME_MATCH: f64 = 1e-8;

/// Extra half-width (days) added to detrending masks to absorb timing scatter:
/// `max(3, z_{(N-1)/N}) · MADσ(independent - quick) + lcit`.
pub fn ttv_buffer(independent: &[f64], quick: &[f64]) -> f64 {
    let diff: Vec<f64> = independent
        .iter()
        .zip(quick)
        .map(|(a, b)| a - b)
        .filter(|d| d.is_finite())
        .collect();
    let n = diff.len();
    if n == 0 {
        return LCIT;
    }
    let z = normal_interval_upper((n as f64 - 1.0) / n as f64).max(3.0);
    let scatter = mad_std(&diff);
    z * if scatter.is_finite() { scatter } else { 0.0 } + LCIT
}

/// Cadences to drop from the raw photometry before re-detrending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Sorted times of bad cadences, per quarter.
    pub bad_times: BTreeMap<i32, Vec<f64>>,
    /// Quarters that are excluded wholesale.
    pub excluded_quarters: BTreeSet<i32>,
    /// Per-planet mask buffer (days).
    pub ttv_buffer: Vec<f64>,
}

impl Reconciliation {
    pub fn bad_count(&self) -> usize {
        self.bad_times.values().map(Vec::len).sum()
    }

    /// `true` for cadences of `lc` that survive reconciliation.
    pub fn keep_mask(&self, lc: &LiteCurve) -> Vec<bool> {
        lc.time
            .iter()
            .zip(&lc.quarter)
            .map(|(&t, q)| {
                if self.excluded_quarters.contains(q) {
                    return false;
                }
                let Some(bad) = self.bad_times.get(q) else {
                    return true;
                };
                let i = bad.partition_point(|&b| b < t - TIME_MATCH);
                !bad.get(i).is_some_and(|&b| (b - t).abs() <= TIME_MATCH)
            })
            .collect()
    }

    /// Drop bad cadences; a quarter survives only when more than
    /// `min_fraction` of its cadences remain.
    pub fn filter_curve(&self, lc: &LiteCurve, min_fraction: f64) -> LiteCurve {
        let mut keep = self.keep_mask(lc);
        for q in lc.quarters() {
            let rows: Vec<usize> = (0..lc.len()).filter(|&i| lc.quarter[i] == q).collect();
            let kept = rows.iter().filter(|&&i| keep[i]).count();
            if (kept as f64) <= min_fraction * rows.len() as f64 {
                if kept > 0 {
                    warn!(quarter = q, kept, total = rows.len(), "too few cadences survive, quarter dropped");
                }
                rows.iter().for_each(|&i| keep[i] = false);
            }
        }
        lc.select(&keep)
    }
}

fn timing_model(
    limbdark: [f64; 2],
    planets: &[Planet],
    radius_ratio: &[f64],
    tts: impl Fn(usize) -> Vec<f64>,
) -> Result<TransitModel, FitError> {
    let transits = planets
        .iter()
        .zip(radius_ratio)
        .enumerate()
        .map(|(n, (p, &k))| PlanetTransits::new(p.period, k, p.impact, p.duration, tts(n)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TransitModel::new(QuadraticLimbDarkening::new(limbdark), transits))
}

/// `|r - median(r)| > sigma · MADσ(r)`.
fn robust_outliers(residual: &[f64], sigma: f64) -> Vec<bool> {
    let med = median(residual);
    let scale = mad_std(residual);
    if !(scale > 0.0) {
        return vec![false; residual.len()];
    }
    residual.iter().map(|r| (r - med).abs() > sigma * scale).collect()
}

/// Flag cadences that are outliers under both the independent and the quick
/// transit times, and quarters without usable transits.
///
/// `planets` carry the quick times at every transit index; `independent[n]`
/// holds planet `n`'s independent times. `fitting` decides which quarters
/// hold transits; residuals are taken over the matching quarter of
/// `detrended`, which holds every detrended cadence.
pub fn reconcile_outliers(
    limbdark: [f64; 2],
    planets: &[Planet],
    radius_ratio: &[f64],
    independent: &[TransitTimes],
    fitting: &QuarterSet,
    detrended: &QuarterSet,
    sigma: f64,
) -> Result<Reconciliation, FitError> {
    let indep_model = timing_model(limbdark, planets, radius_ratio, |n| independent[n].tts.clone())?;
    let quick_model = timing_model(limbdark, planets, radius_ratio, |n| planets[n].tts.clone())?;

    let mut out = Reconciliation::default();
    for (q, data) in fitting.iter() {
        if matches!(data, QuarterData::NoTransits(_)) {
            out.excluded_quarters.insert(q);
            continue;
        }
        let Some(QuarterData::Transits(photometry)) = detrended.get(q) else {
            warn!(quarter = q, "no detrended photometry for quarter, outliers not checked");
            continue;
        };
        let residual = |model: &TransitModel| -> Vec<f64> {
            photometry
                .model_flux(model, 1.0)
                .iter()
                .zip(&photometry.flux)
                .map(|(m, f)| f - m)
                .collect()
        };
        let bad_indep = robust_outliers(&residual(&indep_model), sigma);
        let bad_quick = robust_outliers(&residual(&quick_model), sigma);
        let mut bad: Vec<f64> = photometry
            .time
            .iter()
            .zip(bad_indep.iter().zip(&bad_quick))
            .filter(|(_, (a, b))| **a && **b)
            .map(|(t, _)| *t)
            .collect();
        if !bad.is_empty() {
            bad.sort_by(f64::total_cmp);
            out.bad_times.insert(q, bad);
        }
    }

    out.ttv_buffer = planets
        .iter()
        .zip(independent)
        .map(|(p, times)| {
            let quick: Vec<f64> = times
                .index
                .iter()
                .map(|i| p.index.iter().position(|j| j == i).map_or(f64::NAN, |k| p.tts[k]))
                .collect();
            ttv_buffer(&times.tts, &quick)
        })
        .collect();

    info!(
        bad = out.bad_count(),
        excluded_quarters = out.excluded_quarters.len(),
        "outliers reconciled"
    );
    Ok(out)
}
