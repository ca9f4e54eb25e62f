//! Information-criterion selection among O-C trend models.
//!
//! For each candidate:
//! - fit the trend to pre-flagged inliers (MAP + sampling)
//! - classify residuals with a two-component mixture
//! - AIC = n ln(Σ r² over mixture inliers / their count) + 2k
//!
//! The lowest AIC wins and is refit to predict every transit epoch.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::mixture::{fit_mixture, flag_outliers};
use super::models::{TrendKind, fit_trend};
use crate::error::FitError;
use crate::infer::{SampleSettings, Solver};

/// Sampling settings shared by every O-C fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmcSampling {
    pub settings: SampleSettings,
    pub max_draws: usize,
}

impl OmcSampling {
    fn with_seed(&self, offset: u64) -> SampleSettings {
        SampleSettings {
            seed: self.settings.seed.wrapping_add(offset),
            ..self.settings
        }
    }
}

/// One evaluated candidate.
#[derive(Debug, Clone)]
pub struct CandidateFit {
    pub kind: TrendKind,
    pub aic: f64,
    pub foreground_prob: Vec<f64>,
    pub outlier: Vec<bool>,
}

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct OmcSelection {
    pub best: CandidateFit,
    /// Every candidate that could be evaluated.
    pub fits: Vec<CandidateFit>,
    /// Candidates that failed, and why.
    pub skipped: Vec<(TrendKind, String)>,
}

/// `n ln(Σ r²[inliers] / n_inliers) + 2k`; infinite without inliers.
pub fn akaike(residuals: &[f64], outlier: &[bool], k: usize) -> f64 {
    let inliers: Vec<f64> = residuals
        .iter()
        .zip(outlier)
        .filter(|(_, o)| !**o)
        .map(|(r, _)| *r)
        .collect();
    if inliers.is_empty() {
        return f64::INFINITY;
    }
    let n = residuals.len() as f64;
    let sse: f64 = inliers.iter().map(|r| r * r).sum();
    n * (sse / inliers.len() as f64).ln() + 2.0 * k as f64
}

fn inliers_of(x: &[f64], y: &[f64], outlier: &[bool]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .zip(outlier)
        .filter(|(_, o)| !**o)
        .map(|((x, y), _)| (*x, *y))
        .unzip()
}

fn evaluate(
    kind: TrendKind,
    xtime: &[f64],
    yomc: &[f64],
    preflag: &[bool],
    solver: &dyn Solver,
    sampling: &OmcSampling,
    seed_offset: u64,
) -> Result<CandidateFit, FitError> {
    let (x_in, y_in) = inliers_of(xtime, yomc, preflag);
    let trend = fit_trend(
        kind,
        &x_in,
        &y_in,
        xtime,
        solver,
        &sampling.with_seed(seed_offset),
        sampling.max_draws,
    )?;
    let residuals: Vec<f64> = yomc.iter().zip(&trend).map(|(y, t)| y - t).collect();
    let mixture = fit_mixture(&residuals, solver, &sampling.with_seed(seed_offset + 1))?;
    let (foreground_prob, outlier) = flag_outliers(&residuals, &mixture);
    let aic = akaike(&residuals, &outlier, kind.param_count());
    debug!(model = %kind.label(), aic, outliers = outlier.iter().filter(|o| **o).count(), "O-C candidate");
    Ok(CandidateFit {
        kind,
        aic,
        foreground_prob,
        outlier,
    })
}

/// Fit and select the best O-C trend model.
pub fn select_trend(
    candidates: &[TrendKind],
    xtime: &[f64],
    yomc: &[f64],
    preflag: &[bool],
    solver: &dyn Solver,
    sampling: &OmcSampling,
    seed_offset: u64,
) -> Result<OmcSelection, FitError> {
    let results: Vec<Result<CandidateFit, FitError>> = candidates
        .par_iter()
        .enumerate()
        .map(|(c, kind)| evaluate(*kind, xtime, yomc, preflag, solver, sampling, seed_offset + 10 * c as u64))
        .collect();

    let mut fits = Vec::new();
    let mut skipped = Vec::new();
    for (kind, result) in candidates.iter().zip(results) {
        match result {
            Ok(fit) => fits.push(fit),
            Err(err) => {
                warn!(model = %kind.label(), error = %err, "O-C candidate failed");
                skipped.push((*kind, err.to_string()));
            }
        }
    }

    // Ties keep the earlier candidate.
    let best = fits
        .iter()
        .fold(None::<&CandidateFit>, |best, f| match best {
            Some(b) if !(f.aic < b.aic) => Some(b),
            _ => Some(f),
        })
        .cloned()
        .ok_or_else(|| FitError::numerical("no O-C trend model could be fitted"))?;

    Ok(OmcSelection { best, fits, skipped })
}

/// Refit the winning model to its mixture inliers and predict at `x_predict`.
pub fn predict_selected(
    best: &CandidateFit,
    xtime: &[f64],
    yomc: &[f64],
    x_predict: &[f64],
    solver: &dyn Solver,
    sampling: &OmcSampling,
    seed_offset: u64,
) -> Result<Vec<f64>, FitError> {
    let (x_in, y_in) = inliers_of(xtime, yomc, &best.outlier);
    fit_trend(
        best.kind,
        &x_in,
        &y_in,
        x_predict,
        solver,
        &sampling.with_seed(seed_offset),
        sampling.max_draws,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::Engine;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn akaike_uses_full_length_and_inlier_mean() {
        let r = [1.0, -1.0, 10.0];
        let aic = akaike(&r, &[false, false, true], 2);
        assert!((aic - (3.0 * 1.0_f64.ln() + 4.0)).abs() < 1e-12);
        assert!(akaike(&r, &[true; 3], 2).is_infinite());
    }

    #[test]
    fn linear_omc_prefers_first_order_polynomial() {
        let mut rng = StdRng::seed_from_u64(17);
        let noise = Normal::new(0.0, 2e-4).unwrap();
        let x: Vec<f64> = (0..60).map(|i| 130.0 + 22.3 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|x| 4e-3 * (x - 790.0) / 660.0 + noise.sample(&mut rng))
            .collect();
        let preflag = vec![false; x.len()];
        let sampling = OmcSampling {
            settings: SampleSettings {
                tune: 1500,
                draws: 800,
                chains: 2,
                target_accept: 0.3,
                seed: 5,
            },
            max_draws: 200,
        };
        let kinds = vec![TrendKind::Sinusoid { period: (x[59] - x[0]) / 3.0 }, TrendKind::Polynomial(1)];
        let sel = select_trend(&kinds, &x, &y, &preflag, &Engine::default(), &sampling, 0).unwrap();
        assert!(sel.skipped.is_empty());
        assert_eq!(sel.best.kind, TrendKind::Polynomial(1), "{:?}", sel.fits.iter().map(|f| f.aic).collect::<Vec<_>>());
    }
}
