//! The two-pass detrending and transit-timing pipeline.
//!
//! Pass 1 detrends with catalog ephemerides, fits the transit shape and
//! recovers individual transit times. Cadences that both timing solutions
//! agree are outliers are then dropped and the raw photometry is detrended
//! again with masks that follow the measured transit times.

use std::fs;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::detrend::{DetrendOptions, filter_ringing, flatten_with_fallback, mask_planets, mask_with_widths};
use crate::domain::{CadenceKind, LiteCurve, Mission, Planet, PipelineConfig, TargetContext};
use crate::error::AppError;
use crate::fit::{
    QuarterSet, SlideOptions, TransitTimes, fit_independent_ttvs, fit_shape, fit_slide_ttvs, flag_transits,
    refit_window,
};
use crate::infer::{Engine, Solver};
use crate::io::{
    PriorTimes, apply_prior_ttvs, load_catalog, load_prior_ttvs, load_raw_photometry, quick_ttvs_path,
    save_quick_ttvs, smooth_prior, write_litecurve,
};
use crate::omc::{OmcOptions, PlanetOmc, model_omc};
use crate::reconcile::{Reconciliation, reconcile_outliers};
use crate::transit::QuadraticLimbDarkening;

/// Everything a `ttv run` needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mission: Mission,
    pub target: String,
    pub catalog: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub prior_ttvs: Option<PathBuf>,
    pub config: PipelineConfig,
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub context: TargetContext,
    /// Planets with quick transit times.
    pub planets: Vec<Planet>,
    pub radius_ratio: Vec<f64>,
    pub omc: Vec<PlanetOmc>,
    pub reconciliation: Reconciliation,
    /// Final detrended photometry per cadence type.
    pub detrended: Vec<(CadenceKind, LiteCurve)>,
    pub written: Vec<PathBuf>,
}

fn detrend_mask_pass1(p: &Planet) -> f64 {
    (1.0 / 24.0_f64).max(1.5 * p.duration)
}

fn output_mask(p: &Planet) -> f64 {
    (3.0 / 24.0_f64).max(1.5 * p.duration)
}

/// Koi number of a catalog id (`K00137` -> 137).
fn koi_number(koi_id: &str) -> Result<f64, AppError> {
    koi_id
        .get(1..)
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| AppError::input(format!("cannot derive a KOI number from `{koi_id}`")))
}

/// Quality-flag removal and two-pass outlier clipping. Cadences near
/// transits are protected in the first pass only.
fn prepare(lc: &LiteCurve, planets: &[Planet], config: &PipelineConfig) -> LiteCurve {
    let mut lc = lc.remove_flagged(config.quality_bitmask);
    lc.mask = mask_planets(&lc.time, planets, detrend_mask_pass1);
    let lc = lc.clip_outliers(config.clip_kernel, config.clip_sigma, config.clip_sigma, true);
    lc.clip_outliers(config.clip_kernel, config.clip_sigma, 1000.0, false)
}

struct Detrender<'a> {
    config: &'a PipelineConfig,
    min_duration: f64,
    solver: &'a dyn Solver,
}

impl Detrender<'_> {
    fn options(&self, cadence: CadenceKind) -> DetrendOptions {
        DetrendOptions {
            break_tolerance: cadence.break_tolerance(self.min_duration),
            jump_tolerance: self.config.jump_tolerance,
            min_period: self.config.min_rotation_period,
            kernel: self.config.kernel,
            correct_ramp: self.config.correct_ramp,
        }
    }

    /// Detrend each quarter with `mask` applied and stitch them.
    fn detrend(
        &self,
        cadence: CadenceKind,
        quarters: &[LiteCurve],
        mask: impl Fn(&LiteCurve) -> Vec<bool>,
    ) -> Result<LiteCurve, AppError> {
        let options = self.options(cadence);
        let mut out = Vec::with_capacity(quarters.len());
        for lc in quarters.iter().filter(|lc| !lc.is_empty()) {
            let mut lc = lc.clone();
            lc.mask = mask(&lc);
            let fit = flatten_with_fallback(&lc, options, self.solver)?;
            out.push(fit.curve);
        }
        Ok(LiteCurve::stitch(&out))
    }
}

fn curve_pairs(curves: &[(CadenceKind, LiteCurve)]) -> Vec<(CadenceKind, &LiteCurve)> {
    curves
        .iter()
        .filter(|(_, lc)| !lc.is_empty())
        .map(|(c, lc)| (*c, lc))
        .collect()
}

/// Execute the full pipeline and write its outputs.
pub fn run_pipeline(request: &RunRequest) -> Result<RunOutput, AppError> {
    let config = &request.config;
    config.validate()?;
    let solver = Engine::default();

    // 1) Catalog and raw photometry.
    let koi_id = request.mission.koi_id(&request.target)?;
    let catalog = load_catalog(&request.catalog, &koi_id)?;
    let raw = load_raw_photometry(&request.data_dir, &request.target)?;
    let (time_start, time_end) = raw
        .time_range()
        .ok_or_else(|| AppError::data("raw photometry holds no cadences"))?;
    let context = TargetContext {
        target: request.target.clone(),
        koi_id: koi_id.clone(),
        kic_id: catalog.kic_id,
        limbdark: catalog.limbdark,
        time_start,
        time_end,
    };
    let mut planets = catalog.initial_planets(time_start, time_end)?;
    info!(target = %request.target, koi = %koi_id, planets = planets.len(), baseline = context.baseline(), "target loaded");

    // 2) Optional published transit times.
    if let Some(path) = &request.prior_ttvs {
        let priors = load_prior_ttvs(path, koi_number(&koi_id)?, planets.len(), config.prior_ttv_time_offset)?;
        let smoothed: Vec<Option<PriorTimes>> = priors
            .iter()
            .enumerate()
            .map(|(n, prior)| {
                prior.as_ref().and_then(|p| match smooth_prior(p, time_start, time_end, &solver) {
                    Ok(s) => Some(s),
                    Err(err) => {
                        warn!(planet = n, error = %err, "prior TTVs could not be smoothed, ignored");
                        None
                    }
                })
            })
            .collect();
        planets = apply_prior_ttvs(&planets, &smoothed, time_end)?;
    }

    // 3) Clean the raw photometry; filter ringing from long cadence.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let min_duration = planets.iter().map(|p| p.duration).fold(f64::INFINITY, f64::min);
    let mut prepared: Vec<(CadenceKind, Vec<LiteCurve>)> = Vec::new();
    for cadence in [CadenceKind::Short, CadenceKind::Long] {
        let mut quarters = Vec::new();
        for lc in raw.curves(cadence) {
            let mut lc = prepare(lc, &planets, config);
            if cadence == CadenceKind::Long && !config.ringing_frequencies.is_empty() && !lc.is_empty() {
                lc.flux = filter_ringing(
                    &lc,
                    cadence.break_tolerance(min_duration),
                    config.jump_tolerance,
                    &config.ringing_frequencies,
                    config.ringing_bandwidth,
                    &mut rng,
                );
            }
            quarters.push(lc);
        }
        prepared.push((cadence, quarters));
    }

    // 4) First detrending pass.
    let detrender = Detrender {
        config,
        min_duration,
        solver: &solver,
    };
    let mut pass1 = Vec::new();
    for (cadence, quarters) in &prepared {
        let lc = detrender.detrend(*cadence, quarters, |lc| mask_planets(&lc.time, &planets, detrend_mask_pass1))?;
        pass1.push((*cadence, lc));
    }
    let curves = curve_pairs(&pass1);

    // 5) Transit quality and per-quarter photometry.
    let planets = flag_transits(&planets, &curves);
    for (n, p) in planets.iter().enumerate() {
        if p.num_good() < 2 {
            return Err(AppError::data(format!(
                "planet {n} has {} well-covered transits, at least 2 are needed",
                p.num_good()
            )));
        }
    }
    let windows: Vec<Vec<bool>> = curves
        .iter()
        .map(|(_, lc)| mask_planets(&lc.time, &planets, |p| refit_window(p.duration)))
        .collect();
    let collected: Vec<(CadenceKind, &LiteCurve, &[bool])> = curves
        .iter()
        .zip(&windows)
        .map(|((c, lc), w)| (*c, *lc, w.as_slice()))
        .collect();
    let quarters = QuarterSet::collect(&collected);

    // 6) Shape, slide and independent transit times.
    let shape = fit_shape(&context, &planets, &quarters, &solver)?;
    let (time, flux) = quarters.stacked();
    let slide_opts = SlideOptions {
        window: config.slide_window,
        search: config.slide_search,
        smoothing: config.chisq_smoothing,
        max_delta_chisq: config.max_delta_chisq,
        error_factor: config.slide_error_factor,
    };
    let slide = fit_slide_ttvs(
        QuadraticLimbDarkening::new(context.limbdark),
        &shape.planets,
        &shape.radius_ratio,
        &shape.times,
        &time,
        &flux,
        &slide_opts,
    );
    let independent: Vec<TransitTimes> = fit_independent_ttvs(
        context.limbdark,
        &shape.planets,
        &shape.radius_ratio,
        &shape.times,
        &slide,
        &curves,
        &solver,
    )?;

    // 7) O-C model selection and quick transit times.
    let omc = model_omc(&shape.planets, &independent, &OmcOptions::from_config(config), &solver)?;
    let quick_planets: Vec<Planet> = omc.iter().map(|o| o.planet.clone()).collect();

    // 8) Reconcile outliers over every detrended cadence.
    let everywhere: Vec<Vec<bool>> = curves.iter().map(|(_, lc)| vec![true; lc.len()]).collect();
    let whole: Vec<(CadenceKind, &LiteCurve, &[bool])> = curves
        .iter()
        .zip(&everywhere)
        .map(|((c, lc), w)| (*c, *lc, w.as_slice()))
        .collect();
    let reconciliation = reconcile_outliers(
        context.limbdark,
        &quick_planets,
        &shape.radius_ratio,
        &independent,
        &quarters,
        &QuarterSet::collect(&whole),
        config.reconcile_sigma,
    )?;

    // 9) Second detrending pass with TTV-aware masks.
    let widths: Vec<f64> = quick_planets
        .iter()
        .zip(&reconciliation.ttv_buffer)
        .map(|(p, buffer)| (1.0 / 24.0_f64).max(0.5 * p.duration + buffer))
        .collect();
    let mut detrended = Vec::new();
    for (cadence, quarters) in &prepared {
        let kept: Vec<LiteCurve> = quarters
            .iter()
            .map(|lc| reconciliation.filter_curve(lc, config.min_quarter_fraction))
            .filter(|lc| !lc.is_empty())
            .collect();
        let mut lc = detrender.detrend(*cadence, &kept, |lc| mask_with_widths(&lc.time, &quick_planets, &widths))?;
        lc.mask = mask_planets(&lc.time, &quick_planets, output_mask);
        detrended.push((*cadence, lc));
    }

    // 10) Write outputs.
    fs::create_dir_all(&request.output_dir).map_err(|e| {
        AppError::io(format!(
            "Failed to create output directory '{}': {e}",
            request.output_dir.display()
        ))
    })?;
    let mut written = Vec::new();
    for (cadence, lc) in detrended.iter().filter(|(_, lc)| !lc.is_empty()) {
        let path = request
            .output_dir
            .join(format!("{}_{}_detrended.ltc", request.target, cadence.label()));
        write_litecurve(&path, lc, &request.target)?;
        written.push(path);
    }
    for (n, o) in omc.iter().enumerate() {
        let path = quick_ttvs_path(&request.output_dir, &request.target, n);
        save_quick_ttvs(&path, &o.quick)?;
        written.push(path);
    }
    info!(files = written.len(), "outputs written");

    Ok(RunOutput {
        context,
        planets: quick_planets,
        radius_ratio: shape.radius_ratio,
        omc,
        reconciliation,
        detrended,
        written,
    })
}
