//! Per-transit timing by template cross-correlation.
//!
//! For each transit a template light curve is slid across a window of
//! candidate centre times. The χ² curve is smoothed and a parabola fitted
//! around its minimum gives the time and its uncertainty.

use rayon::prelude::*;
use tracing::{info, warn};

use super::TransitTimes;
use crate::domain::{Planet, SCIT};
use crate::math::poly::{linear_fit, polyfit};
use crate::math::stats::{arange, boxcar_smooth, interp, median, nanmedian, std_dev};
use crate::transit::{PlanetTransits, QuadraticLimbDarkening, TransitModel};

/// Knobs of the slide fit, all durations relative to the transit duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideOptions {
    /// Half-width of the photometry kept around each transit.
    pub window: f64,
    /// Half-width of the centre-time search.
    pub search: f64,
    pub smoothing: usize,
    pub max_delta_chisq: usize,
    /// Fits with uncertainty above this multiple of the planet median are rejected.
    pub error_factor: f64,
}

impl Default for SlideOptions {
    fn default() -> Self {
        Self {
            window: 2.5,
            search: 1.0,
            smoothing: 7,
            max_delta_chisq: 9,
            error_factor: 8.0,
        }
    }
}

/// Grid step of the template and of the centre-time search.
pub const SLIDE_STEP: f64 = SCIT / 2.0;

/// Time and curvature uncertainty of the minimum of a sampled χ² curve.
///
/// Points within `Δχ²` of the minimum are kept, widening `Δχ²` from 2 up to
/// `max_delta` until at least three remain; points far from the median of
/// the selection are dropped. The estimate is the mean of the parabola
/// vertex and the median retained grid time, with uncertainty `sqrt(1/a)`.
pub fn refine_minimum(tc: &[f64], chisq: &[f64], max_delta: usize) -> Option<(f64, f64)> {
    let min_chisq = chisq.iter().copied().filter(|c| c.is_finite()).reduce(f64::min)?;

    let mut delta = 1;
    let (tcfit, x2fit) = loop {
        delta += 1;
        let (t, x): (Vec<f64>, Vec<f64>) = tc
            .iter()
            .zip(chisq)
            .filter(|(_, c)| **c < min_chisq + delta as f64)
            .map(|(t, c)| (*t, *c))
            .unzip();
        let steps: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
        let spacing = median(&steps);
        let centre = median(&t);
        let limit = 1.0 + t.len() as f64 / 2.0;
        let (t, x): (Vec<f64>, Vec<f64>) = t
            .iter()
            .zip(&x)
            .filter(|(ti, _)| !((*ti - centre).abs() / spacing > limit))
            .map(|(t, c)| (*t, *c))
            .unzip();
        if t.len() >= 3 || delta >= max_delta {
            break (t, x);
        }
    };
    if tcfit.len() < 3 {
        return None;
    }

    // Centre the abscissa for conditioning; the curvature is unaffected.
    let t_ref = median(&tcfit);
    let shifted: Vec<f64> = tcfit.iter().map(|t| t - t_ref).collect();
    let coeffs = polyfit(&shifted, &x2fit, 2)?;
    let a = coeffs[2];
    if !(a > 0.0) {
        return None;
    }
    let vertex = t_ref - coeffs[1] / (2.0 * a);
    let estimate = 0.5 * (vertex + t_ref);
    let (lo, hi) = (tcfit[0], tcfit[tcfit.len() - 1]);
    if !(estimate >= lo && estimate <= hi) {
        return None;
    }
    Some((estimate, (1.0 / a).sqrt()))
}

/// Template transit on a fine time grid centred on zero.
pub struct Template {
    time: Vec<f64>,
    flux: Vec<f64>,
}

impl Template {
    pub fn new(
        limb_darkening: QuadraticLimbDarkening,
        planet: &Planet,
        radius_ratio: f64,
        search: f64,
    ) -> Option<Self> {
        let half = (0.02 + planet.duration) * (search + 1.6);
        let time = arange(-half, half, SLIDE_STEP);
        let shape = PlanetTransits::new(planet.period, radius_ratio, planet.impact, planet.duration, vec![0.0]).ok()?;
        let model = TransitModel::new(limb_darkening, vec![shape]);
        let flux = model
            .delta_flux(&time, 0.0, 1)
            .into_iter()
            .map(|d| 1.0 + d)
            .collect();
        Some(Self { time, flux })
    }

    fn at(&self, dt: f64) -> f64 {
        interp(dt, &self.time, &self.flux)
    }
}

/// Time one transit near `t0`; `None` when the χ² minimum is unusable.
pub fn slide_one(
    template: &Template,
    time: &[f64],
    flux: &[f64],
    t0: f64,
    duration: f64,
    opts: &SlideOptions,
) -> Option<(f64, f64)> {
    let mut t_ = Vec::new();
    let mut f_ = Vec::new();
    let mut in_ = Vec::new();
    for (&t, &f) in time.iter().zip(flux) {
        let x = (t - t0).abs() / duration;
        if x < opts.window {
            t_.push(t);
            f_.push(f);
            in_.push(x < opts.search);
        }
    }
    if t_.len() < 3 {
        return None;
    }

    let (t_out, f_out): (Vec<f64>, Vec<f64>) = t_
        .iter()
        .zip(&f_)
        .zip(&in_)
        .filter(|(_, m)| !**m)
        .map(|((t, f), _)| (*t, *f))
        .unzip();
    // Remove any residual out-of-transit slope.
    let err = match linear_fit(&t_out, &f_out) {
        Some((c0, c1)) => {
            for (f, t) in f_.iter_mut().zip(&t_) {
                *f /= c0 + c1 * t;
            }
            let detrended: Vec<f64> = f_.iter().zip(&in_).filter(|(_, m)| !**m).map(|(f, _)| *f).collect();
            std_dev(&detrended)
        }
        None => std_dev(&f_),
    };
    if !(err > 0.0) {
        return None;
    }

    let tc = arange(t0 - duration * opts.search, t0 + duration * opts.search, SLIDE_STEP);
    let chisq: Vec<f64> = tc
        .iter()
        .map(|&c| {
            t_.iter()
                .zip(&f_)
                .map(|(t, f)| ((f - template.at(t - c)) / err).powi(2))
                .sum()
        })
        .collect();
    let chisq = boxcar_smooth(&chisq, opts.smoothing);
    refine_minimum(&tc, &chisq, opts.max_delta_chisq)
}

/// Slide-fit every well-covered transit of one planet.
///
/// Overlapping transits and failed fits, as well as fits whose uncertainty
/// exceeds `error_factor` times the median, fall back to the shape-fit time
/// with a NaN uncertainty.
pub fn slide_planet(
    template: &Template,
    planet: &Planet,
    shape: &TransitTimes,
    time: &[f64],
    flux: &[f64],
    opts: &SlideOptions,
) -> TransitTimes {
    let overlap: Vec<bool> = (0..planet.len())
        .filter(|&i| planet.quality[i])
        .map(|i| planet.overlap[i])
        .collect();

    let fits: Vec<Option<(f64, f64)>> = shape
        .tts
        .par_iter()
        .zip(&overlap)
        .map(|(&t0, &overlaps)| {
            if overlaps {
                None
            } else {
                slide_one(template, time, flux, t0, planet.duration, opts)
            }
        })
        .collect();

    let errors: Vec<f64> = fits.iter().map(|f| f.map_or(f64::NAN, |(_, e)| e)).collect();
    let limit = opts.error_factor * nanmedian(&errors);

    let mut tts = shape.tts.clone();
    let mut error = vec![f64::NAN; tts.len()];
    for (i, fit) in fits.iter().enumerate() {
        if let Some((t, e)) = fit
            && e.is_finite()
            && !(*e > limit)
        {
            tts[i] = *t;
            error[i] = *e;
        }
    }
    TransitTimes {
        index: shape.index.clone(),
        tts,
        error,
    }
}

/// Slide-fit every planet against the stacked near-transit photometry.
pub fn fit_slide_ttvs(
    limb_darkening: QuadraticLimbDarkening,
    planets: &[Planet],
    radius_ratio: &[f64],
    shape: &[TransitTimes],
    time: &[f64],
    flux: &[f64],
    opts: &SlideOptions,
) -> Vec<TransitTimes> {
    planets
        .iter()
        .zip(radius_ratio)
        .zip(shape)
        .enumerate()
        .map(|(n, ((planet, &ror), shape))| {
            let Some(template) = Template::new(limb_darkening, planet, ror, opts.search) else {
                warn!(planet = n, "no valid template orbit, slide fit skipped");
                return TransitTimes {
                    error: vec![f64::NAN; shape.len()],
                    ..shape.clone()
                };
            };
            let fitted = slide_planet(&template, planet, shape, time, flux, opts);
            let timed = fitted.error.iter().filter(|e| e.is_finite()).count();
            if timed == 0 {
                warn!(planet = n, "no transit could be timed by cross-correlation");
            }
            info!(planet = n, timed, total = fitted.len(), "slide TTVs");
            fitted
        })
        .collect()
}
