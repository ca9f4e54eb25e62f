//! Gaussian-process detrending.
//!
//! The out-of-transit flux is modelled as
//!
//! ```text
//! flux = mean(t) + GP(t) + white noise
//! mean(t) = flux0[s] · (1 + ramp_amp[s] · exp(-(t - t0[s]) / tau[s]))
//! ```
//!
//! where `s` is the data segment of each cadence (see [`super::gaps`]) and
//! the ramp is optional. Hyperparameters are found by staged MAP
//! optimization; the conditioned GP plus the mean is the trend that the
//! light curve is divided by. In-transit cadences are excluded from the fit
//! but still receive a (interpolated) trend.

use tracing::{debug, info, warn};

use super::gaps::Segmentation;
use crate::domain::{GpKernel, KernelChoice, LiteCurve};
use crate::error::{DetrendError, FitError};
use crate::infer::prior::{Interval, expit, normal_lnpdf};
use crate::infer::{Model, ParamLayout, Solver, Vars};
use crate::math::celerite::CeleriteGp;
use crate::math::lombscargle::peak_period;
use crate::math::stats::{Boundary, mean, median_filter, std_dev, variance};

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetrendOptions {
    pub break_tolerance: usize,
    pub jump_tolerance: f64,
    pub min_period: f64,
    pub kernel: KernelChoice,
    pub correct_ramp: bool,
}

impl DetrendOptions {
    pub fn label(&self) -> String {
        let kernel = match self.kernel {
            KernelChoice::Rotation => "rotation",
            KernelChoice::Sho => "sho",
        };
        if self.correct_ramp {
            format!("{kernel}+ramp")
        } else {
            kernel.to_string()
        }
    }

    /// This configuration followed by strictly simpler ones: drop the ramp,
    /// then fall back to a single SHO.
    pub fn ladder(&self) -> Vec<DetrendOptions> {
        let mut rungs = vec![*self];
        if self.correct_ramp {
            rungs.push(DetrendOptions {
                correct_ramp: false,
                ..*self
            });
        }
        if self.kernel == KernelChoice::Rotation {
            rungs.push(DetrendOptions {
                kernel: KernelChoice::Sho,
                correct_ramp: false,
                ..*self
            });
        }
        rungs
    }
}

/// A normalized curve plus the trend it was divided by.
#[derive(Debug, Clone)]
pub struct TrendFit {
    pub curve: LiteCurve,
    pub trend: Vec<f64>,
    pub kernel: GpKernel,
    pub options: DetrendOptions,
}

/// Posterior over detrending hyperparameters for one light curve.
pub struct TrendModel {
    layout: ParamLayout,
    options: DetrendOptions,
    /// Out-of-transit cadences.
    time_: Vec<f64>,
    flux_: Vec<f64>,
    seg_: Vec<usize>,
    /// Every cadence.
    time: Vec<f64>,
    seg: Vec<usize>,
    seg_t0: Vec<f64>,
    nseg: usize,
    // Prior centres.
    mu_log_sigma: f64,
    mu_log_period: f64,
    mu_flux0: Vec<f64>,
    sd_ramp: f64,
    mu_log_yvar: f64,
    flux_scale: f64,
}

impl TrendModel {
    pub fn new(lc: &LiteCurve, options: DetrendOptions) -> Result<Self, FitError> {
        let keep: Vec<usize> = (0..lc.len()).filter(|&i| !lc.mask[i]).collect();
        if keep.len() < 3 {
            return Err(FitError::insufficient(format!(
                "only {} unmasked cadences to detrend",
                keep.len()
            )));
        }
        let time_: Vec<f64> = keep.iter().map(|&i| lc.time[i]).collect();
        let flux_: Vec<f64> = keep.iter().map(|&i| lc.flux[i]).collect();

        let segmentation = Segmentation::new(
            &lc.cadno,
            &lc.flux,
            options.break_tolerance,
            options.jump_tolerance,
        );
        let seg = segmentation.labels();
        let seg_: Vec<usize> = keep.iter().map(|&i| seg[i]).collect();
        let nseg = segmentation.count();
        let seg_t0: Vec<f64> = segmentation.ranges().map(|r| lc.time[r.start]).collect();

        // Dominant variability period as the kernel period prior.
        let baseline = time_[time_.len() - 1] - time_[0];
        let peak = peak_period(&time_, &flux_, 1.0 / baseline, 1.0 / options.min_period)
            .unwrap_or(10.0 * options.min_period);
        let period_offset = (peak - options.min_period).max(0.1 * options.min_period);

        let overall = mean(&flux_);
        let mu_flux0: Vec<f64> = (0..nseg)
            .map(|s| {
                let vals: Vec<f64> = flux_
                    .iter()
                    .zip(&seg_)
                    .filter(|(_, l)| **l == s)
                    .map(|(f, _)| *f)
                    .collect();
                // A segment can be entirely in transit.
                if vals.is_empty() { overall } else { mean(&vals) }
            })
            .collect();

        let smooth = median_filter(&flux_, 13, Boundary::Zero);
        let hf: Vec<f64> = flux_.iter().zip(&smooth).map(|(f, s)| f - s).collect();
        let white = variance(&hf).max(f64::MIN_POSITIVE);

        let mut layout = ParamLayout::new();
        layout.push("log_sigma", 1);
        layout.push("log_period", 1);
        layout.push("log_q0", 1);
        if options.kernel == KernelChoice::Rotation {
            layout.push("log_dq", 1);
            layout.push("mix", 1);
        }
        layout.push("flux0", nseg);
        if options.correct_ramp {
            layout.push("ramp_amp", nseg);
            layout.push("log_tau", nseg);
        }
        layout.push("log_yvar", 1);

        let flux_std = std_dev(&flux_);
        Ok(Self {
            layout,
            options,
            time_,
            flux_,
            seg_,
            time: lc.time.clone(),
            seg,
            seg_t0,
            nseg,
            mu_log_sigma: flux_std.max(f64::MIN_POSITIVE).ln(),
            mu_log_period: period_offset.ln(),
            mu_flux0,
            sd_ramp: std_dev(&lc.flux).max(1e-6),
            mu_log_yvar: white.ln(),
            flux_scale: flux_std.max(1e-6),
        })
    }

    fn at(&self, theta: &[f64], name: &str) -> f64 {
        self.layout.range(name).map_or(f64::NAN, |r| theta[r.start])
    }

    fn block<'t>(&self, theta: &'t [f64], name: &str) -> &'t [f64] {
        self.layout.range(name).map_or(&[], |r| &theta[r])
    }

    pub fn kernel(&self, theta: &[f64]) -> GpKernel {
        let sigma = self.at(theta, "log_sigma").exp();
        let period = self.options.min_period + self.at(theta, "log_period").exp();
        let q0 = self.at(theta, "log_q0").exp();
        match self.options.kernel {
            KernelChoice::Rotation => GpKernel::Rotation {
                sigma,
                period,
                q0,
                dq: self.at(theta, "log_dq").exp(),
                mix: expit(self.at(theta, "mix")),
            },
            KernelChoice::Sho => GpKernel::Sho {
                sigma,
                period,
                q: 0.5 + q0,
            },
        }
    }

    fn mean_fn(&self, theta: &[f64], time: &[f64], seg: &[usize]) -> Vec<f64> {
        let flux0 = self.block(theta, "flux0");
        let ramp = self.options.correct_ramp.then(|| {
            (
                self.block(theta, "ramp_amp"),
                self.block(theta, "log_tau"),
            )
        });
        time.iter()
            .zip(seg)
            .map(|(&t, &s)| match ramp {
                Some((amp, log_tau)) => {
                    flux0[s] * (1.0 + amp[s] * (-(t - self.seg_t0[s]) / log_tau[s].exp()).exp())
                }
                None => flux0[s],
            })
            .collect()
    }

    fn gp(&self, theta: &[f64]) -> Result<CeleriteGp, FitError> {
        let yvar = self.at(theta, "log_yvar").exp();
        CeleriteGp::compute(
            &self.kernel(theta).terms(),
            &self.time_,
            &vec![yvar; self.time_.len()],
        )
    }

    /// Trend at every cadence: GP conditioned on out-of-transit residuals
    /// plus the mean function.
    pub fn predict(&self, theta: &[f64]) -> Result<Vec<f64>, FitError> {
        let gp = self.gp(theta)?;
        let mean_ = self.mean_fn(theta, &self.time_, &self.seg_);
        let resid: Vec<f64> = self.flux_.iter().zip(&mean_).map(|(f, m)| f - m).collect();
        let gp_part = gp.predict(&resid, &self.time);
        let full_mean = self.mean_fn(theta, &self.time, &self.seg);
        let trend: Vec<f64> = gp_part.iter().zip(&full_mean).map(|(g, m)| g + m).collect();
        if trend.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(FitError::numerical("predicted trend is not finite and positive"));
        }
        Ok(trend)
    }

    /// Optimization stages: segment levels, noise, then kernel and ramp
    /// blocks interleaved, then everything.
    fn stages(&self) -> Vec<Vec<&'static str>> {
        let mut kernel_block = vec!["log_yvar", "flux0", "log_sigma", "log_period", "log_q0"];
        if self.options.kernel == KernelChoice::Rotation {
            kernel_block.extend(["log_dq", "mix"]);
        }
        let mut stages = vec![vec!["flux0"], vec!["flux0", "log_yvar"]];
        let rounds = 1 + usize::from(self.options.correct_ramp);
        for _ in 0..rounds {
            stages.push(kernel_block.clone());
            if self.options.correct_ramp {
                stages.push(vec!["log_yvar", "flux0", "ramp_amp", "log_tau"]);
            }
        }
        stages
    }
}

impl Model for TrendModel {
    fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn initial_point(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.layout.dim()];
        let mut set = |name: &str, values: &[f64]| {
            if let Some(r) = self.layout.range(name) {
                theta[r].copy_from_slice(values);
            }
        };
        set("log_sigma", &[self.mu_log_sigma]);
        set("log_period", &[self.mu_log_period]);
        set("log_q0", &[0.5_f64.ln()]);
        set("log_dq", &[1e-3_f64.ln()]);
        set("mix", &[Interval::new(0.0, 1.0).backward(0.1)]);
        set("flux0", &self.mu_flux0);
        set("ramp_amp", &vec![0.0; self.nseg]);
        set("log_tau", &vec![0.0; self.nseg]);
        set("log_yvar", &[self.mu_log_yvar]);
        theta
    }

    fn log_prob(&self, theta: &[f64]) -> f64 {
        let mut lp = normal_lnpdf(self.at(theta, "log_sigma"), self.mu_log_sigma, 5.0)
            + normal_lnpdf(self.at(theta, "log_period"), self.mu_log_period, 2.0)
            + normal_lnpdf(self.at(theta, "log_q0"), 0.0, 5.0)
            + normal_lnpdf(self.at(theta, "log_yvar"), self.mu_log_yvar, 5.0);
        if self.options.kernel == KernelChoice::Rotation {
            lp += normal_lnpdf(self.at(theta, "log_dq"), 0.0, 5.0);
            lp += Interval::new(0.0, 1.0).log_jacobian(self.at(theta, "mix"));
        }
        lp += self
            .block(theta, "flux0")
            .iter()
            .zip(&self.mu_flux0)
            .map(|(f, mu)| normal_lnpdf(*f, *mu, 1.0))
            .sum::<f64>();
        if self.options.correct_ramp {
            lp += self
                .block(theta, "ramp_amp")
                .iter()
                .map(|a| normal_lnpdf(*a, 0.0, self.sd_ramp))
                .sum::<f64>();
            lp += self
                .block(theta, "log_tau")
                .iter()
                .map(|t| normal_lnpdf(*t, 0.0, 5.0))
                .sum::<f64>();
        }
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }

        let Ok(gp) = self.gp(theta) else {
            return f64::NEG_INFINITY;
        };
        let mean_ = self.mean_fn(theta, &self.time_, &self.seg_);
        let resid: Vec<f64> = self.flux_.iter().zip(&mean_).map(|(f, m)| f - m).collect();
        lp + gp.log_likelihood(&resid)
    }

    fn scales(&self) -> Vec<f64> {
        let mut scales = vec![0.5; self.layout.dim()];
        for name in ["flux0", "ramp_amp"] {
            if let Some(r) = self.layout.range(name) {
                scales[r].iter_mut().for_each(|s| *s = self.flux_scale);
            }
        }
        scales
    }
}

/// Fit one detrending configuration and normalize the curve by its trend.
pub fn flatten_with_gp(
    lc: &LiteCurve,
    options: DetrendOptions,
    solver: &dyn Solver,
) -> Result<TrendFit, FitError> {
    let model = TrendModel::new(lc, options)?;
    let stages = model.stages();
    let mut vars: Vec<Vars<'_>> = stages.iter().map(|s| Vars::Blocks(s)).collect();
    vars.push(Vars::All);

    let theta = solver.optimize_stages(&model, &model.initial_point(), &vars)?;
    let trend = model.predict(&theta)?;
    let kernel = model.kernel(&theta);
    debug!(?kernel, segments = model.nseg, "detrending MAP");

    Ok(TrendFit {
        curve: lc.normalized_by(&trend),
        trend,
        kernel,
        options,
    })
}

/// Try each rung of `options.ladder()` in turn and return the first success.
pub fn flatten_with_fallback(
    lc: &LiteCurve,
    options: DetrendOptions,
    solver: &dyn Solver,
) -> Result<TrendFit, DetrendError> {
    let mut attempts = Vec::new();
    for rung in options.ladder() {
        match flatten_with_gp(lc, rung, solver) {
            Ok(fit) => {
                info!(config = %rung.label(), cadences = lc.len(), "detrended");
                return Ok(fit);
            }
            Err(err) => {
                warn!(config = %rung.label(), error = %err, "detrending failed, trying a simpler model");
                attempts.push((rung.label(), err));
            }
        }
    }
    Err(DetrendError { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LCIT;
    use crate::infer::Engine;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn synthetic(n: usize, amp: f64, seed: u64) -> LiteCurve {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 2e-4).unwrap();
        let time: Vec<f64> = (0..n).map(|i| 130.0 + i as f64 * LCIT).collect();
        let flux = time
            .iter()
            .map(|t| 1.0 + amp * (2.0 * std::f64::consts::PI * t / 4.0).sin() + noise.sample(&mut rng))
            .collect();
        LiteCurve {
            time,
            flux,
            error: vec![2e-4; n],
            cadno: (0..n as i64).collect(),
            quarter: vec![5; n],
            channel: vec![1; n],
            mask: vec![false; n],
            quality: vec![0; n],
        }
    }

    fn options(kernel: KernelChoice, correct_ramp: bool) -> DetrendOptions {
        DetrendOptions {
            break_tolerance: 13,
            jump_tolerance: 5.0,
            min_period: 1.0,
            kernel,
            correct_ramp,
        }
    }

    #[test]
    fn ladder_simplifies_monotonically() {
        let labels: Vec<String> = options(KernelChoice::Rotation, true)
            .ladder()
            .iter()
            .map(|o| o.label())
            .collect();
        assert_eq!(labels, vec!["rotation+ramp", "rotation", "sho"]);
        assert_eq!(options(KernelChoice::Sho, false).ladder().len(), 1);
    }

    #[test]
    fn staged_blocks_exist_in_layout() {
        let lc = synthetic(300, 1e-3, 1);
        let model = TrendModel::new(&lc, options(KernelChoice::Rotation, true)).unwrap();
        for stage in model.stages() {
            model.layout().indices(&stage).unwrap();
        }
        assert!(model.log_prob(&model.initial_point()).is_finite());
    }

    #[test]
    fn removes_stellar_variability_and_interpolates_masked_cadences() {
        let mut lc = synthetic(600, 2e-3, 2);
        for m in lc.mask.iter_mut().skip(290).take(20) {
            *m = true;
        }
        let fit = flatten_with_gp(&lc, options(KernelChoice::Sho, false), &Engine::default()).unwrap();
        let resid_std = std_dev(&fit.curve.flux);
        assert!(resid_std < 6e-4, "residual scatter {resid_std}");
        for i in 290..310 {
            assert!((fit.curve.flux[i] - 1.0).abs() < 2e-3);
        }
    }

    #[test]
    fn detrending_a_flat_curve_is_idempotent() {
        let lc = synthetic(400, 0.0, 3);
        let fit = flatten_with_gp(&lc, options(KernelChoice::Sho, false), &Engine::default()).unwrap();
        for t in &fit.trend {
            assert!((t - 1.0).abs() < 5e-4);
        }
    }

    #[test]
    fn fully_masked_curve_exhausts_the_ladder() {
        let mut lc = synthetic(50, 1e-3, 4);
        lc.mask = vec![true; 50];
        let err = flatten_with_fallback(&lc, options(KernelChoice::Rotation, true), &Engine::default())
            .unwrap_err();
        assert_eq!(err.attempts.len(), 3);
    }
}
