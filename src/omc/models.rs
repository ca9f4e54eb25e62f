//! Candidate trend models for an O-C series.
//!
//! Every model is a posterior over a few trend parameters plus a white-noise
//! variance. The trend can be evaluated at arbitrary ephemeris times, which is
//! how the winning model is extended to transits that were never fitted.

use std::f64::consts::PI;

use crate::error::FitError;
use crate::infer::prior::normal_lnpdf;
use crate::infer::{Model, ParamLayout, SampleSettings, Solver, Vars};
use crate::math::celerite::{CeleriteGp, matern32_terms};
use crate::math::poly::{legendre, to_legendre_domain};
use crate::math::stats::{mean, std_dev};

/// Accuracy of the semiseparable Matern-3/2 approximation.
const MATERN_EPS: f64 = 0.01;
/// Floor on the O-C scale (days) so that priors stay proper for constant series.
const MIN_SCALE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendKind {
    Matern32,
    /// Single sinusoid with a fixed period (days).
    Sinusoid { period: f64 },
    Polynomial(usize),
}

impl TrendKind {
    /// Parameter count charged by the information criterion.
    pub fn param_count(&self) -> usize {
        match self {
            TrendKind::Matern32 | TrendKind::Sinusoid { .. } => 3,
            TrendKind::Polynomial(order) => order + 1,
        }
    }

    pub fn label(&self) -> String {
        match self {
            TrendKind::Matern32 => "matern32".to_string(),
            TrendKind::Sinusoid { period } => format!("sinusoid(P={period:.1})"),
            TrendKind::Polynomial(order) => format!("poly{order}"),
        }
    }

    /// Candidates in evaluation order: GP, sinusoid, then polynomials of
    /// increasing order.
    pub fn candidates(max_polyorder: usize, period: f64) -> Vec<TrendKind> {
        let mut kinds = vec![TrendKind::Matern32, TrendKind::Sinusoid { period }];
        kinds.extend((1..=max_polyorder).map(TrendKind::Polynomial));
        kinds
    }
}

/// Highest polynomial order worth trying for `inliers` points.
pub fn max_polyorder(inliers: usize) -> usize {
    match inliers {
        n if n >= 16 => 3,
        n if n >= 8 => 2,
        _ => 1,
    }
}

pub struct OmcModel {
    kind: TrendKind,
    layout: ParamLayout,
    x: Vec<f64>,
    y: Vec<f64>,
    x_range: (f64, f64),
    mu_y: f64,
    sd_y: f64,
    mu_log_rho: f64,
}

impl OmcModel {
    pub fn new(kind: TrendKind, x: &[f64], y: &[f64]) -> Result<Self, FitError> {
        if x.len() < 2 || x.len() != y.len() {
            return Err(FitError::insufficient(format!(
                "{} O-C points are too few for a trend model",
                x.len()
            )));
        }
        let mut layout = ParamLayout::new();
        match kind {
            TrendKind::Matern32 => {
                layout.push("mean", 1);
                layout.push("log_sigma", 1);
                layout.push("log_rho", 1);
            }
            TrendKind::Sinusoid { .. } => {
                layout.push("offset", 1);
                layout.push("amp_sin", 1);
                layout.push("amp_cos", 1);
            }
            TrendKind::Polynomial(order) => {
                layout.push("coeffs", order + 1);
            }
        }
        layout.push("log_yvar", 1);

        let spacing = (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64;
        Ok(Self {
            kind,
            layout,
            x: x.to_vec(),
            y: y.to_vec(),
            x_range: (x[0], x[x.len() - 1]),
            mu_y: mean(y),
            sd_y: std_dev(y).max(MIN_SCALE),
            mu_log_rho: spacing.max(MIN_SCALE).ln(),
        })
    }

    pub fn kind(&self) -> TrendKind {
        self.kind
    }

    fn at(&self, theta: &[f64], name: &str) -> f64 {
        self.layout.range(name).map_or(f64::NAN, |r| theta[r.start])
    }

    /// Parametric trend (sinusoid or polynomial) at `x`.
    fn parametric(&self, theta: &[f64], x: f64) -> f64 {
        match self.kind {
            TrendKind::Sinusoid { period } => {
                let phase = 2.0 * PI * x / period;
                self.at(theta, "offset")
                    + self.at(theta, "amp_sin") * phase.sin()
                    + self.at(theta, "amp_cos") * phase.cos()
            }
            TrendKind::Polynomial(_) => {
                let u = to_legendre_domain(x, self.x_range.0, self.x_range.1);
                self.layout.range("coeffs").map_or(f64::NAN, |r| {
                    theta[r].iter().enumerate().map(|(j, c)| c * legendre(j, u)).sum()
                })
            }
            TrendKind::Matern32 => self.at(theta, "mean"),
        }
    }

    fn gp(&self, theta: &[f64]) -> Result<CeleriteGp, FitError> {
        let terms = matern32_terms(
            self.at(theta, "log_sigma").exp(),
            self.at(theta, "log_rho").exp(),
            MATERN_EPS,
        );
        let yvar = self.at(theta, "log_yvar").exp();
        CeleriteGp::compute(&terms, &self.x, &vec![yvar; self.x.len()])
    }

    /// Trend at `x_star` (sorted ascending). A GP that cannot be factorized
    /// yields NaNs.
    pub fn predict(&self, theta: &[f64], x_star: &[f64]) -> Vec<f64> {
        match self.kind {
            TrendKind::Matern32 => {
                let Ok(gp) = self.gp(theta) else {
                    return vec![f64::NAN; x_star.len()];
                };
                let m = self.at(theta, "mean");
                let resid: Vec<f64> = self.y.iter().map(|y| y - m).collect();
                gp.predict(&resid, x_star).into_iter().map(|v| v + m).collect()
            }
            _ => x_star.iter().map(|&x| self.parametric(theta, x)).collect(),
        }
    }
}

impl Model for OmcModel {
    fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn initial_point(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.layout.dim()];
        let mut set = |name: &str, v: f64| {
            if let Some(r) = self.layout.range(name) {
                theta[r.start] = v;
            }
        };
        set("mean", self.mu_y);
        set("offset", self.mu_y);
        set("coeffs", self.mu_y);
        set("log_sigma", self.sd_y.ln());
        set("log_rho", self.mu_log_rho);
        set("log_yvar", 2.0 * self.sd_y.ln());
        theta
    }

    fn log_prob(&self, theta: &[f64]) -> f64 {
        let log_yvar = self.at(theta, "log_yvar");
        let mut lp = normal_lnpdf(log_yvar, 2.0 * self.sd_y.ln(), 10.0);
        match self.kind {
            TrendKind::Matern32 => {
                lp += normal_lnpdf(self.at(theta, "mean"), self.mu_y, self.sd_y)
                    + normal_lnpdf(self.at(theta, "log_sigma"), self.sd_y.ln(), 5.0)
                    + normal_lnpdf(self.at(theta, "log_rho"), self.mu_log_rho, 5.0);
                if !lp.is_finite() {
                    return f64::NEG_INFINITY;
                }
                let Ok(gp) = self.gp(theta) else {
                    return f64::NEG_INFINITY;
                };
                let m = self.at(theta, "mean");
                let resid: Vec<f64> = self.y.iter().map(|y| y - m).collect();
                lp + gp.log_likelihood(&resid)
            }
            TrendKind::Sinusoid { .. } => {
                lp += normal_lnpdf(self.at(theta, "offset"), self.mu_y, self.sd_y)
                    + normal_lnpdf(self.at(theta, "amp_sin"), 0.0, self.sd_y)
                    + normal_lnpdf(self.at(theta, "amp_cos"), 0.0, self.sd_y);
                lp + self.white_noise_likelihood(theta, log_yvar)
            }
            TrendKind::Polynomial(_) => {
                if let Some(r) = self.layout.range("coeffs") {
                    lp += theta[r]
                        .iter()
                        .enumerate()
                        .map(|(j, c)| {
                            let mu = if j == 0 { self.mu_y } else { 0.0 };
                            normal_lnpdf(*c, mu, self.sd_y)
                        })
                        .sum::<f64>();
                }
                lp + self.white_noise_likelihood(theta, log_yvar)
            }
        }
    }

    fn scales(&self) -> Vec<f64> {
        let mut scales = vec![0.3; self.layout.dim()];
        for name in ["mean", "offset", "amp_sin", "amp_cos", "coeffs"] {
            if let Some(r) = self.layout.range(name) {
                scales[r].iter_mut().for_each(|s| *s = 0.3 * self.sd_y);
            }
        }
        scales
    }
}

impl OmcModel {
    fn white_noise_likelihood(&self, theta: &[f64], log_yvar: f64) -> f64 {
        let sd = (0.5 * log_yvar).exp();
        let ll: f64 = self
            .x
            .iter()
            .zip(&self.y)
            .map(|(&x, &y)| normal_lnpdf(y, self.parametric(theta, x), sd))
            .sum();
        if ll.is_finite() { ll } else { f64::NEG_INFINITY }
    }
}

/// MAP fit followed by sampling; returns the posterior-median trend at
/// `x_predict`.
pub fn fit_trend(
    kind: TrendKind,
    x: &[f64],
    y: &[f64],
    x_predict: &[f64],
    solver: &dyn Solver,
    settings: &SampleSettings,
    max_draws: usize,
) -> Result<Vec<f64>, FitError> {
    let model = OmcModel::new(kind, x, y)?;
    let map = solver.optimize(&model, &model.initial_point(), Vars::All)?;
    let trace = solver.sample(&model, &map, settings)?;
    Ok(trace.median_of(max_draws, |theta| model.predict(theta, x_predict)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::Engine;

    fn quick_settings() -> SampleSettings {
        SampleSettings {
            tune: 600,
            draws: 400,
            chains: 2,
            target_accept: 0.3,
            seed: 9,
        }
    }

    #[test]
    fn candidate_order_and_parameter_counts() {
        let kinds = TrendKind::candidates(max_polyorder(10), 500.0);
        let labels: Vec<String> = kinds.iter().map(|k| k.label()).collect();
        assert_eq!(labels, vec!["matern32", "sinusoid(P=500.0)", "poly1", "poly2"]);
        let k: Vec<usize> = kinds.iter().map(|k| k.param_count()).collect();
        assert_eq!(k, vec![3, 3, 2, 3]);
        assert_eq!(max_polyorder(7), 1);
        assert_eq!(max_polyorder(16), 3);
    }

    #[test]
    fn polynomial_trend_tracks_a_line() {
        let x: Vec<f64> = (0..30).map(|i| 100.0 + 10.0 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, x)| 1e-4 * (x - 250.0) / 150.0 + 1e-5 * ((i * 7 % 5) as f64 - 2.0))
            .collect();
        let trend = fit_trend(
            TrendKind::Polynomial(1),
            &x,
            &y,
            &x,
            &Engine::default(),
            &quick_settings(),
            100,
        )
        .unwrap();
        for (t, x) in trend.iter().zip(&x) {
            assert!((t - 1e-4 * (x - 250.0) / 150.0).abs() < 2e-5);
        }
    }

    #[test]
    fn matern_prediction_extends_to_new_epochs() {
        let x: Vec<f64> = (0..25).map(|i| 5.0 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 1e-3 * (x / 40.0).sin()).collect();
        let model = OmcModel::new(TrendKind::Matern32, &x, &y).unwrap();
        let x_new: Vec<f64> = (0..49).map(|i| 2.5 * i as f64).collect();
        let pred = model.predict(&model.initial_point(), &x_new);
        assert_eq!(pred.len(), 49);
        assert!(pred.iter().all(|v| v.is_finite()));
    }
}
