//! Two-component Gaussian mixture for O-C residuals.
//!
//! The narrow component holds well-behaved transits ("foreground"), the broad
//! one outliers. Component scales are ordered in the parameterisation so the
//! labels cannot switch during sampling.

use crate::error::FitError;
use crate::infer::prior::{Interval, normal_lnpdf};
use crate::infer::{Model, ParamLayout, SampleSettings, Solver};
use crate::math::stats::{mad_std, std_dev};

const WEIGHT: Interval = Interval { lo: 0.0, hi: 1.0 };

/// Posterior-median mixture components, in data units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mixture {
    pub weight_fg: f64,
    pub loc: [f64; 2],
    pub scale: [f64; 2],
}

impl Mixture {
    /// Foreground membership probability of each residual.
    pub fn foreground_probability(&self, residuals: &[f64]) -> Vec<f64> {
        residuals
            .iter()
            .map(|&r| {
                let fg = self.weight_fg * normal_lnpdf(r, self.loc[0], self.scale[0]).exp();
                let bg = (1.0 - self.weight_fg) * normal_lnpdf(r, self.loc[1], self.scale[1]).exp();
                let total = fg + bg;
                if total > 0.0 {
                    fg / total
                } else {
                    // Far from both components: the broader one wins.
                    if self.scale[0] >= self.scale[1] { 1.0 } else { 0.0 }
                }
            })
            .collect()
    }
}

/// Foreground probability and outlier flag (`bg > fg`) per residual.
pub fn flag_outliers(residuals: &[f64], mixture: &Mixture) -> (Vec<f64>, Vec<bool>) {
    let fg = mixture.foreground_probability(residuals);
    let bad = fg.iter().map(|p| 1.0 - p > *p).collect();
    (fg, bad)
}

/// Mixture posterior over residuals scaled by a robust σ.
pub struct MixtureModel {
    layout: ParamLayout,
    z: Vec<f64>,
    scale: f64,
}

impl MixtureModel {
    pub fn new(residuals: &[f64]) -> Result<Self, FitError> {
        let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
        if finite.len() < 3 {
            return Err(FitError::insufficient("too few residuals for a mixture model"));
        }
        let mut scale = mad_std(&finite);
        if !(scale > 0.0) {
            scale = std_dev(&finite);
        }
        if !(scale > 0.0) {
            return Err(FitError::insufficient("residuals have no spread"));
        }
        let mut layout = ParamLayout::new();
        layout.push("w", 1);
        layout.push("mu", 2);
        layout.push("log_s_fg", 1);
        layout.push("log_ds", 1);
        Ok(Self {
            layout,
            z: finite.iter().map(|r| r / scale).collect(),
            scale,
        })
    }

    fn components(&self, theta: &[f64]) -> (f64, [f64; 2], [f64; 2]) {
        let s_fg = theta[3].exp();
        let s_bg = s_fg * (1.0 + theta[4].exp());
        (WEIGHT.forward(theta[0]), [theta[1], theta[2]], [s_fg, s_bg])
    }

    /// Components of a parameter vector, in data units.
    pub fn mixture(&self, theta: &[f64]) -> Mixture {
        let (w, loc, scale) = self.components(theta);
        Mixture {
            weight_fg: w,
            loc: [loc[0] * self.scale, loc[1] * self.scale],
            scale: [scale[0] * self.scale, scale[1] * self.scale],
        }
    }
}

impl Model for MixtureModel {
    fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn initial_point(&self) -> Vec<f64> {
        vec![WEIGHT.backward(0.9), 0.0, 0.0, 0.0, 2.0_f64.ln()]
    }

    fn log_prob(&self, theta: &[f64]) -> f64 {
        let (w, loc, scale) = self.components(theta);
        let lp = WEIGHT.log_jacobian(theta[0])
            + normal_lnpdf(loc[0], 0.0, 1.0)
            + normal_lnpdf(loc[1], 0.0, 5.0)
            + normal_lnpdf(theta[3], 0.0, 2.0)
            + normal_lnpdf(theta[4], 1.0, 2.0);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        let ll: f64 = self
            .z
            .iter()
            .map(|&z| {
                let a = w.ln() + normal_lnpdf(z, loc[0], scale[0]);
                let b = (1.0 - w).ln() + normal_lnpdf(z, loc[1], scale[1]);
                let m = a.max(b);
                m + ((a - m).exp() + (b - m).exp()).ln()
            })
            .sum();
        if ll.is_finite() { lp + ll } else { f64::NEG_INFINITY }
    }
}

/// Sample the mixture posterior and summarise it by per-parameter medians.
pub fn fit_mixture(residuals: &[f64], solver: &dyn Solver, settings: &SampleSettings) -> Result<Mixture, FitError> {
    let model = MixtureModel::new(residuals)?;
    let trace = solver.sample(&model, &model.initial_point(), settings)?;
    let median: Vec<f64> = (0..model.layout.dim()).map(|k| trace.median(k)).collect();
    Ok(model.mixture(&median))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::Engine;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn flags_points_from_the_broad_component() {
        let mixture = Mixture {
            weight_fg: 0.9,
            loc: [0.0, 0.0],
            scale: [1.0, 10.0],
        };
        let (fg, bad) = flag_outliers(&[0.1, -0.5, 8.0, -30.0], &mixture);
        assert_eq!(bad, vec![false, false, true, true]);
        assert!(fg[0] > 0.9);
        // Shifting residuals and the components together leaves flags unchanged.
        let shifted = Mixture {
            loc: [5.0, 5.0],
            ..mixture
        };
        let (_, bad_shifted) = flag_outliers(&[5.1, 4.5, 13.0, -25.0], &shifted);
        assert_eq!(bad, bad_shifted);
    }

    #[test]
    fn sampled_mixture_separates_outliers() {
        let mut rng = StdRng::seed_from_u64(21);
        let core = Normal::new(0.0, 1e-3).unwrap();
        let mut resid: Vec<f64> = (0..60).map(|_| core.sample(&mut rng)).collect();
        resid.extend([0.05, -0.04, 0.06]);
        let settings = SampleSettings {
            tune: 1500,
            draws: 1000,
            chains: 2,
            target_accept: 0.3,
            seed: 4,
        };
        let mixture = fit_mixture(&resid, &Engine::default(), &settings).unwrap();
        let (_, bad) = flag_outliers(&resid, &mixture);
        assert!(bad[60] && bad[61] && bad[62]);
        assert!(bad[..60].iter().filter(|b| **b).count() <= 2);
    }
}
