//! Near-transit photometry grouped by observing quarter.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{CadenceKind, LiteCurve};
use crate::infer::prior::normal_lnpdf;
use crate::math::stats::{mean, std_dev, variance};
use crate::transit::TransitModel;

/// Near-transit cadences of one quarter.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterPhotometry {
    pub cadence: CadenceKind,
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub error: Vec<f64>,
}

impl QuarterPhotometry {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn exposure(&self) -> f64 {
        self.cadence.integration_time()
    }

    /// Model flux `flux0 + Σ transits` at every cadence.
    pub fn model_flux(&self, model: &TransitModel, flux0: f64) -> Vec<f64> {
        model
            .delta_flux(&self.time, self.exposure(), self.cadence.oversample())
            .into_iter()
            .map(|d| flux0 + d)
            .collect()
    }

    /// Gaussian log-likelihood with per-quarter jitter added to the mean
    /// photometric error.
    pub fn log_likelihood(&self, model: &TransitModel, flux0: f64, log_jit: f64) -> f64 {
        let sd = ((mean(&self.error).powi(2) + log_jit.exp()).sqrt()) / std::f64::consts::SQRT_2;
        self.model_flux(model, flux0)
            .iter()
            .zip(&self.flux)
            .map(|(m, f)| normal_lnpdf(*f, *m, sd))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuarterData {
    Transits(QuarterPhotometry),
    /// Data exist for the quarter but too few cadences fall near transits.
    NoTransits(CadenceKind),
}

/// Minimum near-transit cadence count for a usable quarter.
fn min_cadences(cadence: CadenceKind) -> usize {
    match cadence {
        CadenceKind::Short => 45,
        CadenceKind::Long => 5,
    }
}

/// Per-quarter photometry keyed by quarter number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterSet {
    quarters: BTreeMap<i32, QuarterData>,
}

impl QuarterSet {
    /// Collect cadences where `window` is set, quarter by quarter. A quarter
    /// already holding transits is never replaced by a later curve.
    pub fn collect(curves: &[(CadenceKind, &LiteCurve, &[bool])]) -> Self {
        let mut quarters = BTreeMap::new();
        for (cadence, lc, window) in curves {
            for q in lc.quarters() {
                if matches!(quarters.get(&q), Some(QuarterData::Transits(_))) {
                    continue;
                }
                let rows: Vec<usize> = (0..lc.len())
                    .filter(|&i| lc.quarter[i] == q && window[i])
                    .collect();
                let data = if rows.len() > min_cadences(*cadence) {
                    QuarterData::Transits(QuarterPhotometry {
                        cadence: *cadence,
                        time: rows.iter().map(|&i| lc.time[i]).collect(),
                        flux: rows.iter().map(|&i| lc.flux[i]).collect(),
                        error: rows.iter().map(|&i| lc.error[i]).collect(),
                    })
                } else {
                    QuarterData::NoTransits(*cadence)
                };
                quarters.insert(q, data);
            }
        }
        Self { quarters }
    }

    pub fn get(&self, quarter: i32) -> Option<&QuarterData> {
        self.quarters.get(&quarter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &QuarterData)> {
        self.quarters.iter().map(|(q, d)| (*q, d))
    }

    /// Quarters with usable near-transit photometry, ascending.
    pub fn with_transits(&self) -> Vec<(i32, &QuarterPhotometry)> {
        self.quarters
            .iter()
            .filter_map(|(q, d)| match d {
                QuarterData::Transits(p) => Some((*q, p)),
                QuarterData::NoTransits(_) => None,
            })
            .collect()
    }

    /// Time and flux of every usable quarter, concatenated in quarter order.
    pub fn stacked(&self) -> (Vec<f64>, Vec<f64>) {
        let mut time = Vec::new();
        let mut flux = Vec::new();
        for (_, p) in self.with_transits() {
            time.extend_from_slice(&p.time);
            flux.extend_from_slice(&p.flux);
        }
        (time, flux)
    }
}

/// Priors for the per-quarter flux offset and log-jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NuisancePrior {
    pub mu_flux0: f64,
    pub sd_flux0: f64,
    pub mu_log_jit: f64,
    pub sd_log_jit: f64,
}

impl NuisancePrior {
    pub fn from_quarters(set: &QuarterSet) -> Self {
        let (_, flux) = set.stacked();
        Self {
            mu_flux0: mean(&flux),
            sd_flux0: std_dev(&flux).max(1e-6),
            mu_log_jit: (variance(&flux) / 10.0).max(f64::MIN_POSITIVE).ln(),
            sd_log_jit: 10.0,
        }
    }

    pub fn log_prior(&self, flux0: &[f64], log_jit: &[f64]) -> f64 {
        flux0
            .iter()
            .map(|f| normal_lnpdf(*f, self.mu_flux0, self.sd_flux0))
            .chain(log_jit.iter().map(|j| normal_lnpdf(*j, self.mu_log_jit, self.sd_log_jit)))
            .sum()
    }
}

/// Summed log-likelihood of every usable quarter, in parallel.
pub fn quarters_log_likelihood(
    quarters: &[(i32, &QuarterPhotometry)],
    model: &TransitModel,
    flux0: &[f64],
    log_jit: &[f64],
) -> f64 {
    quarters
        .par_iter()
        .enumerate()
        .map(|(j, (_, p))| p.log_likelihood(model, flux0[j], log_jit[j]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LCIT, SCIT};

    fn curve(n: usize, dt: f64, quarters: &[i32]) -> LiteCurve {
        let per = n / quarters.len();
        LiteCurve {
            time: (0..n).map(|i| i as f64 * dt).collect(),
            flux: vec![1.0; n],
            error: vec![1e-4; n],
            cadno: (0..n as i64).collect(),
            quarter: (0..n).map(|i| quarters[(i / per).min(quarters.len() - 1)]).collect(),
            channel: vec![1; n],
            mask: vec![false; n],
            quality: vec![0; n],
        }
    }

    #[test]
    fn quarters_need_enough_near_transit_cadences() {
        let lc = curve(200, LCIT, &[3, 4]);
        // Ten cadences in quarter 3, three in quarter 4.
        let window: Vec<bool> = (0..200).map(|i| (40..50).contains(&i) || (150..153).contains(&i)).collect();
        let set = QuarterSet::collect(&[(CadenceKind::Long, &lc, &window)]);
        assert_eq!(set.with_transits().len(), 1);
        assert_eq!(set.with_transits()[0].0, 3);
        assert_eq!(set.get(4), Some(&QuarterData::NoTransits(CadenceKind::Long)));
    }

    #[test]
    fn short_cadence_keeps_its_own_exposure() {
        let sc = curve(100, SCIT, &[7]);
        let lc = curve(100, LCIT, &[7, 8]);
        let all = vec![true; 100];
        let set = QuarterSet::collect(&[
            (CadenceKind::Short, &sc, &all),
            (CadenceKind::Long, &lc, &all),
        ]);
        let usable = set.with_transits();
        assert_eq!(usable.len(), 2);
        assert_eq!(usable[0].1.cadence, CadenceKind::Short);
        assert_eq!(usable[0].1.exposure(), SCIT);
        assert_eq!(usable[1].1.cadence, CadenceKind::Long);
    }
}
