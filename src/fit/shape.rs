//! Global transit-shape fit.
//!
//! All planets and quarters are fitted at once. Each planet gets a radius
//! ratio, impact parameter and duration; its well-covered transit times are
//! the current times plus a first-order Legendre perturbation over the
//! observing baseline. Per-quarter flux offsets and jitter terms absorb
//! instrumental differences between quarters.

use tracing::{debug, info};

use super::TransitTimes;
use super::quarters::{NuisancePrior, QuarterPhotometry, QuarterSet, quarters_log_likelihood};
use crate::domain::{Planet, TargetContext};
use crate::error::FitError;
use crate::infer::prior::{Interval, normal_lnpdf};
use crate::infer::{Model, ParamLayout, Solver, Vars};
use crate::math::poly::{fit_ephemeris, legendre, to_legendre_domain};
use crate::transit::{PlanetTransits, QuadraticLimbDarkening, TransitModel, transit_depth};

const LOG_R: Interval = Interval { lo: -11.512_925_464_970_229, hi: -0.010_050_335_853_501_44 };
const IMPACT: Interval = Interval { lo: 0.0, hi: 1.0 };

/// Shape-fit results.
#[derive(Debug, Clone)]
pub struct ShapeFit {
    /// Planets with refreshed epoch, period, depth, duration and impact.
    pub planets: Vec<Planet>,
    pub radius_ratio: Vec<f64>,
    /// Fitted times of every well-covered transit (no uncertainties).
    pub times: Vec<TransitTimes>,
}

/// Per-planet parameter values decoded from a parameter vector.
struct PlanetParams {
    radius_ratio: f64,
    impact: f64,
    duration: f64,
    tts: Vec<f64>,
}

pub struct ShapeModel<'a> {
    layout: ParamLayout,
    limb_darkening: QuadraticLimbDarkening,
    quarters: Vec<(i32, &'a QuarterPhotometry)>,
    nuisance: NuisancePrior,
    index: Vec<Vec<i64>>,
    fixed_tts: Vec<Vec<f64>>,
    /// Transit epochs mapped onto the Legendre domain of the baseline.
    legendre_x: Vec<Vec<f64>>,
    durations: Vec<f64>,
    depths: Vec<f64>,
    impacts: Vec<f64>,
}

impl<'a> ShapeModel<'a> {
    pub fn new(ctx: &TargetContext, planets: &[Planet], quarters: &'a QuarterSet) -> Result<Self, FitError> {
        let usable = quarters.with_transits();
        if usable.is_empty() {
            return Err(FitError::insufficient("no quarter has photometry near transits"));
        }
        let npl = planets.len();

        let mut index = Vec::with_capacity(npl);
        let mut fixed_tts = Vec::with_capacity(npl);
        let mut legendre_x = Vec::with_capacity(npl);
        for p in planets {
            let good = TransitTimes::good_transits(p);
            legendre_x.push(
                good.index
                    .iter()
                    .map(|&i| {
                        let t = p.epoch + p.period * i as f64;
                        to_legendre_domain(t, ctx.time_start, ctx.time_end)
                    })
                    .collect(),
            );
            index.push(good.index);
            fixed_tts.push(good.tts);
        }

        let mut layout = ParamLayout::new();
        for name in ["log_r", "b", "log_dur", "C0", "C1"] {
            layout.push(name, npl);
        }
        layout.push("flux0", usable.len());
        layout.push("log_jit", usable.len());

        Ok(Self {
            layout,
            limb_darkening: QuadraticLimbDarkening::new(ctx.limbdark),
            nuisance: NuisancePrior::from_quarters(quarters),
            quarters: usable,
            index,
            fixed_tts,
            legendre_x,
            durations: planets.iter().map(|p| p.duration).collect(),
            depths: planets.iter().map(|p| p.depth).collect(),
            impacts: planets.iter().map(|p| p.impact).collect(),
        })
    }

    fn block<'t>(&self, theta: &'t [f64], name: &str) -> &'t [f64] {
        self.layout.range(name).map_or(&[], |r| &theta[r])
    }

    fn planet_params(&self, theta: &[f64]) -> Vec<PlanetParams> {
        let (log_r, b, log_dur) = (
            self.block(theta, "log_r"),
            self.block(theta, "b"),
            self.block(theta, "log_dur"),
        );
        let (c0, c1) = (self.block(theta, "C0"), self.block(theta, "C1"));
        (0..self.durations.len())
            .map(|n| PlanetParams {
                radius_ratio: LOG_R.forward(log_r[n]).exp(),
                impact: IMPACT.forward(b[n]),
                duration: log_dur[n].exp(),
                tts: self.fixed_tts[n]
                    .iter()
                    .zip(&self.legendre_x[n])
                    .map(|(t, x)| t + c0[n] * legendre(0, *x) + c1[n] * legendre(1, *x))
                    .collect(),
            })
            .collect()
    }

    fn transit_model(&self, params: &[PlanetParams]) -> Result<TransitModel, FitError> {
        let planets = params
            .iter()
            .zip(&self.index)
            .map(|(p, index)| {
                let (_, period) = fit_ephemeris(index, &p.tts)
                    .ok_or_else(|| FitError::numerical("transit times do not define a period"))?;
                PlanetTransits::new(period, p.radius_ratio, p.impact, p.duration, p.tts.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransitModel::new(self.limb_darkening, planets))
    }
}

impl Model for ShapeModel<'_> {
    fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn initial_point(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.layout.dim()];
        let npl = self.durations.len();
        for n in 0..npl {
            let set = |theta: &mut Vec<f64>, name: &str, v: f64| {
                if let Some(r) = self.layout.range(name) {
                    theta[r.start + n] = v;
                }
            };
            set(&mut theta, "log_r", LOG_R.backward(self.depths[n].max(1e-10).sqrt().ln()));
            set(&mut theta, "b", IMPACT.backward(self.impacts[n]));
            set(&mut theta, "log_dur", self.durations[n].ln());
        }
        if let Some(r) = self.layout.range("flux0") {
            theta[r].iter_mut().for_each(|v| *v = self.nuisance.mu_flux0);
        }
        if let Some(r) = self.layout.range("log_jit") {
            theta[r].iter_mut().for_each(|v| *v = self.nuisance.mu_log_jit);
        }
        theta
    }

    fn log_prob(&self, theta: &[f64]) -> f64 {
        let mut lp = self.nuisance.log_prior(self.block(theta, "flux0"), self.block(theta, "log_jit"));
        for n in 0..self.durations.len() {
            let half = self.durations[n] / 2.0;
            lp += LOG_R.log_jacobian(self.block(theta, "log_r")[n])
                + IMPACT.log_jacobian(self.block(theta, "b")[n])
                + normal_lnpdf(self.block(theta, "log_dur")[n], self.durations[n].ln(), 5.0)
                + normal_lnpdf(self.block(theta, "C0")[n], 0.0, half)
                + normal_lnpdf(self.block(theta, "C1")[n], 0.0, half);
        }
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        let Ok(model) = self.transit_model(&self.planet_params(theta)) else {
            return f64::NEG_INFINITY;
        };
        lp + quarters_log_likelihood(
            &self.quarters,
            &model,
            self.block(theta, "flux0"),
            self.block(theta, "log_jit"),
        )
    }

    fn scales(&self) -> Vec<f64> {
        let mut scales = vec![0.1; self.layout.dim()];
        for name in ["C0", "C1"] {
            if let Some(r) = self.layout.range(name) {
                for (n, s) in scales[r].iter_mut().enumerate() {
                    *s = self.durations[n] / 10.0;
                }
            }
        }
        if let Some(r) = self.layout.range("flux0") {
            scales[r].iter_mut().for_each(|s| *s = self.nuisance.sd_flux0);
        }
        if let Some(r) = self.layout.range("log_jit") {
            scales[r].iter_mut().for_each(|s| *s = 1.0);
        }
        scales
    }
}

/// Fit the transit shape of every planet and refresh their ephemerides.
pub fn fit_shape(
    ctx: &TargetContext,
    planets: &[Planet],
    quarters: &QuarterSet,
    solver: &dyn Solver,
) -> Result<ShapeFit, FitError> {
    let model = ShapeModel::new(ctx, planets, quarters)?;
    let stages = [
        Vars::Blocks(&["flux0", "log_jit"]),
        Vars::Blocks(&["b", "log_r", "log_dur"]),
        Vars::Blocks(&["C0", "C1"]),
        Vars::All,
    ];
    let theta = solver.optimize_stages(&model, &model.initial_point(), &stages)?;
    let params = model.planet_params(&theta);

    let mut updated = Vec::with_capacity(planets.len());
    let mut times = Vec::with_capacity(planets.len());
    for ((p, fit), index) in planets.iter().zip(&params).zip(&model.index) {
        let (epoch, period) = fit_ephemeris(index, &fit.tts)
            .ok_or_else(|| FitError::numerical("shape-fit transit times do not define an ephemeris"))?;
        let depth = transit_depth(fit.radius_ratio, fit.impact);
        debug!(
            period,
            epoch,
            ror = fit.radius_ratio,
            impact = fit.impact,
            duration = fit.duration,
            "shape fit"
        );
        updated.push(Planet {
            epoch,
            period,
            depth,
            duration: fit.duration,
            impact: fit.impact,
            ..p.clone()
        });
        times.push(TransitTimes {
            index: index.clone(),
            tts: fit.tts.clone(),
            error: vec![f64::NAN; fit.tts.len()],
        });
    }
    info!(planets = updated.len(), quarters = model.quarters.len(), "transit shape fitted");

    Ok(ShapeFit {
        planets: updated,
        radius_ratio: params.iter().map(|p| p.radius_ratio).collect(),
        times,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CadenceKind, LCIT, LiteCurve};
    use crate::detrend::mask_planets;
    use crate::infer::Engine;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn recovers_injected_transit_shape() {
        let (period, epoch, k, b, dur) = (5.0, 2.0, 0.1, 0.3, 0.15);
        let truth: Vec<f64> = (0..4).map(|i| epoch + period * i as f64).collect();
        let model = TransitModel::new(
            QuadraticLimbDarkening::new([0.4, 0.25]),
            vec![PlanetTransits::new(period, k, b, dur, truth.clone()).unwrap()],
        );
        let n = 1000;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * LCIT).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 2e-4).unwrap();
        let flux: Vec<f64> = model
            .delta_flux(&time, LCIT, 15)
            .iter()
            .map(|d| 1.0 + d + noise.sample(&mut rng))
            .collect();
        let lc = LiteCurve {
            time: time.clone(),
            flux,
            error: vec![2e-4; n],
            cadno: (0..n as i64).collect(),
            quarter: vec![1; n],
            channel: vec![1; n],
            mask: vec![false; n],
            quality: vec![0; n],
        };

        let planet = Planet {
            epoch,
            period,
            depth: 1.2 * k * k,
            duration: 0.16,
            impact: 0.4,
            tts: truth.clone(),
            index: (0..4).collect(),
            quality: vec![true; 4],
            overlap: vec![false; 4],
        };
        let ctx = TargetContext {
            target: "K00001".into(),
            koi_id: "K00001".into(),
            kic_id: 1,
            limbdark: [0.4, 0.25],
            time_start: 0.0,
            time_end: time[n - 1],
        };
        let window = mask_planets(&lc.time, std::slice::from_ref(&planet), |p| 2.5 * p.duration);
        let quarters = QuarterSet::collect(&[(CadenceKind::Long, &lc, &window)]);

        let fit = fit_shape(&ctx, &[planet], &quarters, &Engine::default()).unwrap();
        let p = &fit.planets[0];
        assert!((p.period - period).abs() < 2e-3, "period {}", p.period);
        assert!((p.epoch - epoch).abs() < 5e-3, "epoch {}", p.epoch);
        assert!((p.duration - dur).abs() < 0.02, "duration {}", p.duration);
        assert!((fit.radius_ratio[0] - k).abs() < 0.015, "ror {}", fit.radius_ratio[0]);
        assert_eq!(fit.times[0].tts.len(), 4);
    }
}
