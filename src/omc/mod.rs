//! Observed-minus-computed (O-C) modelling.
//!
//! Per planet, the independent transit times are compared against their own
//! linear ephemeris. Candidate trends (Matern-3/2 GP, sinusoid, polynomials)
//! are fitted to the residuals, each with a Gaussian mixture outlier model,
//! and the lowest-AIC candidate gives the "quick" transit times.

pub mod mixture;
pub mod models;
pub mod outliers;
pub mod periodic;
pub mod selector;

pub use mixture::{Mixture, fit_mixture, flag_outliers};
pub use models::{OmcModel, TrendKind, fit_trend, max_polyorder};
pub use outliers::flag_omc_outliers;
pub use periodic::{OmcFrequency, match_frequencies, search_omc_frequency, sinusoid_period};
pub use selector::{CandidateFit, OmcSampling, OmcSelection, akaike, predict_selected, select_trend};

use tracing::info;

use crate::domain::{OmcSeries, Planet, PipelineConfig, QuickTtvs};
use crate::error::FitError;
use crate::fit::TransitTimes;
use crate::infer::Solver;

/// Minimum number of inliers before a periodic search is attempted.
pub const MIN_PERIODIC_INLIERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmcOptions {
    pub outlier_sigma: f64,
    pub fap_single_planet: f64,
    pub fap_multi_planet: f64,
    pub fap_keep: f64,
    pub sampling: OmcSampling,
}

impl OmcOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            outlier_sigma: config.omc_outlier_sigma,
            fap_single_planet: config.fap_single_planet,
            fap_multi_planet: config.fap_multi_planet,
            fap_keep: config.fap_keep,
            sampling: OmcSampling {
                settings: config.sampling.settings(config.seed),
                max_draws: config.sampling.max_prediction_draws,
            },
        }
    }
}

/// Result of O-C modelling for one planet.
#[derive(Debug, Clone)]
pub struct PlanetOmc {
    /// Planet with `tts` replaced by the quick times at every index and the
    /// ephemeris refit to them.
    pub planet: Planet,
    pub series: OmcSeries,
    pub quick: QuickTtvs,
    pub selection: OmcSelection,
}

struct OmcData {
    xtime: Vec<f64>,
    yomc: Vec<f64>,
    full_x: Vec<f64>,
    preflag: Vec<bool>,
}

impl OmcData {
    fn new(planet: &Planet, times: &TransitTimes, sigma: f64) -> Result<Self, FitError> {
        let xtime = times
            .linear_ephemeris(&times.index)
            .ok_or_else(|| FitError::insufficient("fewer than two independent transit times"))?;
        let full_x = times
            .linear_ephemeris(&planet.index)
            .ok_or_else(|| FitError::insufficient("fewer than two independent transit times"))?;
        let yomc: Vec<f64> = times.tts.iter().zip(&xtime).map(|(t, x)| t - x).collect();
        let preflag = flag_omc_outliers(&yomc, sigma);
        Ok(Self {
            xtime,
            yomc,
            full_x,
            preflag,
        })
    }

    fn inliers(&self) -> usize {
        self.preflag.iter().filter(|o| !**o).count()
    }
}

/// Model the O-C series of every planet and derive quick transit times.
///
/// `independent[n]` holds planet `n`'s independent times on its
/// well-covered transits.
pub fn model_omc(
    planets: &[Planet],
    independent: &[TransitTimes],
    opts: &OmcOptions,
    solver: &dyn Solver,
) -> Result<Vec<PlanetOmc>, FitError> {
    let data = planets
        .iter()
        .zip(independent)
        .map(|(p, t)| OmcData::new(p, t, opts.outlier_sigma))
        .collect::<Result<Vec<_>, _>>()?;

    let fap_threshold = if planets.len() == 1 {
        opts.fap_single_planet
    } else {
        opts.fap_multi_planet
    };
    let found: Vec<OmcFrequency> = data
        .iter()
        .map(|d| search_omc_frequency(&d.xtime, &d.yomc, &d.preflag, fap_threshold, MIN_PERIODIC_INLIERS))
        .collect();
    let matched = match_frequencies(&found, opts.fap_keep);

    let mut results = Vec::with_capacity(planets.len());
    for (n, ((planet, times), d)) in planets.iter().zip(independent).zip(&data).enumerate() {
        let period = sinusoid_period(matched[n], found[n].baseline);
        let kinds = TrendKind::candidates(max_polyorder(d.inliers()), period);
        let seed = 1000 * n as u64;

        let selection = select_trend(&kinds, &d.xtime, &d.yomc, &d.preflag, solver, &opts.sampling, seed)?;
        let trend = predict_selected(&selection.best, &d.xtime, &d.yomc, &d.full_x, solver, &opts.sampling, seed + 999)?;
        let quick_full: Vec<f64> = d.full_x.iter().zip(&trend).map(|(x, t)| x + t).collect();

        let quick: Vec<f64> = times
            .index
            .iter()
            .map(|i| {
                planet
                    .index
                    .iter()
                    .position(|j| j == i)
                    .map_or(f64::NAN, |k| quick_full[k])
            })
            .collect();
        let outlier_prob: Vec<f64> = selection.best.foreground_prob.iter().map(|fg| 1.0 - fg).collect();
        let outlier = selection.best.outlier.clone();

        info!(
            planet = n,
            model = %selection.best.kind.label(),
            aic = selection.best.aic,
            outliers = outlier.iter().filter(|o| **o).count(),
            skipped = selection.skipped.len(),
            "O-C model selected"
        );

        results.push(PlanetOmc {
            planet: planet.with_tts(quick_full, planet.index.clone()).refit_ephemeris(),
            series: OmcSeries {
                index: times.index.clone(),
                ephemeris: d.xtime.clone(),
                residual: d.yomc.clone(),
                uncertainty: times.error.clone(),
                outlier_prob: outlier_prob.clone(),
                outlier: outlier.clone(),
            },
            quick: QuickTtvs {
                index: times.index.clone(),
                independent: times.tts.clone(),
                quick,
                outlier_prob,
                outlier,
            },
            selection,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{Engine, SampleSettings};

    #[test]
    fn quick_times_follow_trend_and_flag_outlier() {
        let index: Vec<i64> = (0..40).collect();
        let truth: Vec<f64> = index.iter().map(|&i| 5.0 + 12.5 * i as f64 + 2e-3 * (i as f64 * 0.37).sin()).collect();
        let mut tts: Vec<f64> = truth
            .iter()
            .enumerate()
            .map(|(i, t)| t + 1e-4 * ((i * 7 % 5) as f64 - 2.0))
            .collect();
        tts[17] += 0.03;

        let planet = Planet {
            epoch: 5.0,
            period: 12.5,
            depth: 1e-3,
            duration: 0.15,
            impact: 0.3,
            tts: truth.clone(),
            index: index.clone(),
            quality: vec![true; 40],
            overlap: vec![false; 40],
        };
        let times = TransitTimes {
            index: index.clone(),
            tts,
            error: vec![1e-4; 40],
        };
        let opts = OmcOptions {
            sampling: OmcSampling {
                settings: SampleSettings {
                    tune: 1000,
                    draws: 500,
                    chains: 2,
                    target_accept: 0.3,
                    seed: 3,
                },
                max_draws: 100,
            },
            ..OmcOptions::from_config(&PipelineConfig::default())
        };

        let out = model_omc(&[planet], &[times], &opts, &Engine::default()).unwrap();
        let r = &out[0];
        assert_eq!(r.quick.quick.len(), 40);
        assert_eq!(r.planet.tts.len(), 40);
        assert!(r.series.outlier[17]);
        assert!(r.quick.outlier_prob[17] > 0.5);
        assert!((r.quick.quick[17] - truth[17]).abs() < 0.01);
        assert!((r.planet.period - 12.5).abs() < 1e-3);
    }
}
