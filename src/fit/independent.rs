//! Independent MAP refit of transits the slide fit could not time.
//!
//! Every failed transit gets a free offset from its shape-fit time (unit
//! normal prior, scaled by a third of the duration); shapes and periods stay
//! fixed. Successfully slide-fitted transits are kept at their slide times.

use tracing::{info, warn};

use super::TransitTimes;
use super::quarters::{NuisancePrior, QuarterPhotometry, QuarterSet, quarters_log_likelihood};
use crate::detrend::make_transit_mask;
use crate::domain::{CadenceKind, LiteCurve, Planet};
use crate::error::FitError;
use crate::infer::prior::normal_lnpdf;
use crate::infer::{Model, ParamLayout, Solver, Vars};
use crate::math::stats::std_dev;
use crate::transit::{PlanetTransits, QuadraticLimbDarkening, TransitModel};

/// Half-width of the photometry window around refitted transits.
pub fn refit_window(duration: f64) -> f64 {
    (2.0 / 24.0_f64).max(2.5 * duration)
}

struct RefitPlanet {
    period: f64,
    radius_ratio: f64,
    impact: f64,
    duration: f64,
    /// Current times of every well-covered transit.
    tts: Vec<f64>,
    /// Positions in `tts` whose time is free.
    refit: Vec<usize>,
    /// Shape-fit times at the free positions.
    anchor: Vec<f64>,
}

pub struct IndependentModel<'a> {
    layout: ParamLayout,
    limb_darkening: QuadraticLimbDarkening,
    quarters: Vec<(i32, &'a QuarterPhotometry)>,
    nuisance: NuisancePrior,
    planets: Vec<RefitPlanet>,
}

fn offset_block(n: usize) -> String {
    format!("tt_offset_{n}")
}

impl IndependentModel<'_> {
    fn transit_times(&self, theta: &[f64]) -> Vec<Vec<f64>> {
        self.planets
            .iter()
            .enumerate()
            .map(|(n, p)| {
                let mut tts = p.tts.clone();
                if let Some(r) = self.layout.range(&offset_block(n)) {
                    for ((&pos, &anchor), off) in p.refit.iter().zip(&p.anchor).zip(&theta[r]) {
                        tts[pos] = anchor + off * p.duration / 3.0;
                    }
                }
                tts
            })
            .collect()
    }

    fn transit_model(&self, tts: Vec<Vec<f64>>) -> Result<TransitModel, FitError> {
        let planets = self
            .planets
            .iter()
            .zip(tts)
            .map(|(p, tts)| PlanetTransits::new(p.period, p.radius_ratio, p.impact, p.duration, tts))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransitModel::new(self.limb_darkening, planets))
    }

    fn block<'t>(&self, theta: &'t [f64], name: &str) -> &'t [f64] {
        self.layout.range(name).map_or(&[], |r| &theta[r])
    }
}

impl Model for IndependentModel<'_> {
    fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn initial_point(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.layout.dim()];
        if let Some(r) = self.layout.range("flux0") {
            theta[r].iter_mut().for_each(|v| *v = self.nuisance.mu_flux0);
        }
        if let Some(r) = self.layout.range("log_jit") {
            theta[r].iter_mut().for_each(|v| *v = self.nuisance.mu_log_jit);
        }
        theta
    }

    fn log_prob(&self, theta: &[f64]) -> f64 {
        let flux0 = self.block(theta, "flux0");
        let log_jit = self.block(theta, "log_jit");
        let mut lp = self.nuisance.log_prior(flux0, log_jit);
        for n in 0..self.planets.len() {
            lp += self
                .block(theta, &offset_block(n))
                .iter()
                .map(|o| normal_lnpdf(*o, 0.0, 1.0))
                .sum::<f64>();
        }
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self.transit_model(self.transit_times(theta)) {
            Ok(model) => lp + quarters_log_likelihood(&self.quarters, &model, flux0, log_jit),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    fn scales(&self) -> Vec<f64> {
        let mut scales = vec![0.3; self.layout.dim()];
        if let Some(r) = self.layout.range("flux0") {
            scales[r].iter_mut().for_each(|s| *s = self.nuisance.sd_flux0);
        }
        if let Some(r) = self.layout.range("log_jit") {
            scales[r].iter_mut().for_each(|s| *s = 1.0);
        }
        scales
    }
}

/// Replace failed slide times with independent MAP times.
///
/// Recovered transits get the scatter of the planet's full series about its
/// best-fit linear ephemeris as their uncertainty.
pub fn fit_independent_ttvs(
    limbdark: [f64; 2],
    planets: &[Planet],
    radius_ratio: &[f64],
    shape: &[TransitTimes],
    slide: &[TransitTimes],
    curves: &[(CadenceKind, &LiteCurve)],
    solver: &dyn Solver,
) -> Result<Vec<TransitTimes>, FitError> {
    let refit: Vec<Vec<usize>> = slide
        .iter()
        .map(|s| (0..s.len()).filter(|&i| s.error[i].is_nan()).collect())
        .collect();
    if refit.iter().all(|r| r.is_empty()) {
        info!("every transit timed by cross-correlation, independent refit skipped");
        return Ok(slide.to_vec());
    }

    let windows: Vec<Vec<bool>> = curves
        .iter()
        .map(|(_, lc)| {
            let mut window = vec![false; lc.len()];
            for ((p, s), r) in planets.iter().zip(slide).zip(&refit) {
                let tts: Vec<f64> = r.iter().map(|&i| s.tts[i]).collect();
                let m = make_transit_mask(&lc.time, &tts, refit_window(p.duration));
                window.iter_mut().zip(m).for_each(|(w, v)| *w |= v);
            }
            window
        })
        .collect();
    let sources: Vec<(CadenceKind, &LiteCurve, &[bool])> = curves
        .iter()
        .zip(&windows)
        .map(|((c, lc), w)| (*c, *lc, w.as_slice()))
        .collect();
    let quarters = QuarterSet::collect(&sources);
    let usable = quarters.with_transits();

    let mut times: Vec<TransitTimes> = slide.to_vec();
    if usable.is_empty() {
        warn!("no photometry near failed transits, keeping shape-fit times");
    } else {
        let mut layout = ParamLayout::new();
        layout.push("flux0", usable.len());
        layout.push("log_jit", usable.len());
        for (n, r) in refit.iter().enumerate() {
            if !r.is_empty() {
                layout.push(offset_block(n), r.len());
            }
        }
        let model = IndependentModel {
            layout,
            limb_darkening: QuadraticLimbDarkening::new(limbdark),
            nuisance: NuisancePrior::from_quarters(&quarters),
            quarters: usable,
            planets: planets
                .iter()
                .zip(radius_ratio)
                .zip(shape.iter().zip(slide))
                .zip(&refit)
                .map(|(((p, &ror), (sh, sl)), r)| RefitPlanet {
                    period: p.period,
                    radius_ratio: ror,
                    impact: p.impact,
                    duration: p.duration,
                    tts: sl.tts.clone(),
                    refit: r.clone(),
                    anchor: r.iter().map(|&i| sh.tts[i]).collect(),
                })
                .collect(),
        };

        let names: Vec<String> = (0..planets.len())
            .filter(|&n| !refit[n].is_empty())
            .map(offset_block)
            .collect();
        let name_refs: Vec<[&str; 1]> = names.iter().map(|n| [n.as_str()]).collect();
        let mut stages = vec![Vars::Blocks(&["flux0", "log_jit"])];
        stages.extend(name_refs.iter().map(|n| Vars::Blocks(n)));
        stages.push(Vars::All);

        let theta = solver.optimize_stages(&model, &model.initial_point(), &stages)?;
        for (t, fitted) in times.iter_mut().zip(model.transit_times(&theta)) {
            t.tts = fitted;
        }
    }

    for (n, (t, r)) in times.iter_mut().zip(&refit).enumerate() {
        if r.is_empty() {
            continue;
        }
        let Some(ephem) = t.linear_ephemeris(&t.index) else {
            warn!(planet = n, "too few transits for an ephemeris");
            continue;
        };
        let resid: Vec<f64> = t.tts.iter().zip(&ephem).map(|(a, b)| a - b).collect();
        let scatter = std_dev(&resid);
        for &i in r {
            t.error[i] = scatter;
        }
        info!(planet = n, refit = r.len(), scatter, "independent TTVs");
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SCIT;
    use crate::infer::Engine;

    #[test]
    fn recovers_a_failed_transit_time() {
        let (period, k, b, dur) = (4.0, 0.1, 0.2, 0.12);
        let truth = vec![3.0, 7.0, 11.02];
        let ld = [0.4, 0.25];
        let model = TransitModel::new(
            QuadraticLimbDarkening::new(ld),
            vec![PlanetTransits::new(period, k, b, dur, truth.clone()).unwrap()],
        );
        let time: Vec<f64> = (0..20_000).map(|i| 10.5 + i as f64 * SCIT).collect();
        let n = time.len();
        let flux: Vec<f64> = model
            .delta_flux(&time, SCIT, 1)
            .iter()
            .enumerate()
            .map(|(i, d)| 1.0 + d + 1e-4 * ((i * 7919 % 17) as f64 / 16.0 - 0.5))
            .collect();
        let sc = LiteCurve {
            time,
            flux,
            error: vec![1e-4; n],
            cadno: (0..n as i64).collect(),
            quarter: vec![9; n],
            channel: vec![1; n],
            mask: vec![false; n],
            quality: vec![0; n],
        };
        let planet = Planet {
            epoch: 3.0,
            period,
            depth: k * k,
            duration: dur,
            impact: b,
            tts: vec![3.0, 7.0, 11.0],
            index: vec![0, 1, 2],
            quality: vec![true; 3],
            overlap: vec![false; 3],
        };
        let shape = TransitTimes {
            index: vec![0, 1, 2],
            tts: vec![3.0, 7.0, 11.0],
            error: vec![f64::NAN; 3],
        };
        let slide = TransitTimes {
            error: vec![1e-3, 1e-3, f64::NAN],
            ..shape.clone()
        };

        let times = fit_independent_ttvs(
            ld,
            &[planet],
            &[k],
            &[shape],
            &[slide],
            &[(CadenceKind::Short, &sc)],
            &Engine::default(),
        )
        .unwrap();
        assert!((times[0].tts[2] - 11.02).abs() < 3e-3, "t = {}", times[0].tts[2]);
        assert_eq!(times[0].tts[0], 3.0);
        assert!(times[0].error[2].is_finite());
    }
}
