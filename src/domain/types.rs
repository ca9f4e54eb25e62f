//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages as immutable snapshots
//! - persisted to binary tables / text files
//! - reloaded later for inspection

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::celerite::{self, Term};
use crate::math::stats::{Boundary, mad_std, median, median_filter};

/// Long cadence integration time (days).
pub const LCIT: f64 = 29.424_381_4 / 1440.0;
/// Short cadence integration time (days).
pub const SCIT: f64 = 58.848_76 / 86_400.0;

/// Kepler quality flags rejected by the "default" bitmask.
pub const DEFAULT_QUALITY_BITMASK: u32 = 1_130_799;

/// Photometric cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceKind {
    Short,
    Long,
}

impl CadenceKind {
    /// Exposure (integration) time in days.
    pub fn integration_time(self) -> f64 {
        match self {
            CadenceKind::Short => SCIT,
            CadenceKind::Long => LCIT,
        }
    }

    /// Sub-exposures used to integrate the transit model over one cadence.
    pub fn oversample(self) -> usize {
        match self {
            CadenceKind::Short => 1,
            CadenceKind::Long => 15,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CadenceKind::Short => "sc",
            CadenceKind::Long => "lc",
        }
    }

    /// Minimum cadence count between segment boundaries for a given shortest
    /// transit duration (days).
    pub fn break_tolerance(self, min_duration: f64) -> usize {
        let per_duration = (min_duration / self.integration_time() * 5.0 / 2.0).floor() as usize;
        match self {
            CadenceKind::Short => per_duration.max(91),
            CadenceKind::Long => per_duration.max(13),
        }
    }

    /// Infer the cadence from the median time step (short cadence is ~1 min).
    pub fn from_median_step(step: f64) -> Self {
        if step < 0.01 {
            CadenceKind::Short
        } else {
            CadenceKind::Long
        }
    }
}

/// Mission whose naming conventions the target follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mission {
    Kepler,
    Simulated,
}

impl Mission {
    /// Catalog id for a target name (`K00137`, or `S00137` for simulations).
    pub fn koi_id(self, target: &str) -> Result<String, AppError> {
        let digits = target.get(1..).unwrap_or_default();
        let well_formed = target.len() > 1 && digits.chars().all(|c| c.is_ascii_digit());
        match self {
            Mission::Kepler if well_formed && target.starts_with('K') => Ok(target.to_string()),
            Mission::Simulated if well_formed && target.starts_with('S') => Ok(format!("K{digits}")),
            _ => Err(AppError::input(format!(
                "target `{target}` does not match mission {self:?}"
            ))),
        }
    }
}

/// Kernel family used by the GP detrender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    /// Quasi-periodic rotation kernel (primary + first harmonic).
    Rotation,
    /// Single damped harmonic oscillator.
    Sho,
}

/// A concrete GP kernel with its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpKernel {
    Rotation {
        sigma: f64,
        period: f64,
        q0: f64,
        dq: f64,
        mix: f64,
    },
    Sho {
        sigma: f64,
        period: f64,
        q: f64,
    },
}

impl GpKernel {
    pub fn terms(&self) -> Vec<Term> {
        match *self {
            GpKernel::Rotation {
                sigma,
                period,
                q0,
                dq,
                mix,
            } => celerite::rotation_terms(sigma, period, q0, dq, mix),
            GpKernel::Sho { sigma, period, q } => {
                celerite::sho_terms_sigma(sigma, 2.0 * std::f64::consts::PI / period, q)
            }
        }
    }
}

/// A time-ordered photometric segment.
///
/// All columns share length and index alignment; `cadno` is strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteCurve {
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub error: Vec<f64>,
    pub cadno: Vec<i64>,
    pub quarter: Vec<i32>,
    pub channel: Vec<i32>,
    /// `true` = excluded from trend fitting (e.g. in transit).
    pub mask: Vec<bool>,
    /// Raw quality flags (zero when unknown).
    pub quality: Vec<u32>,
}

impl LiteCurve {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Check column alignment and cadence ordering.
    pub fn validate(&self) -> Result<(), AppError> {
        let n = self.len();
        let lens = [
            self.flux.len(),
            self.error.len(),
            self.cadno.len(),
            self.quarter.len(),
            self.channel.len(),
            self.mask.len(),
            self.quality.len(),
        ];
        if lens.iter().any(|&l| l != n) {
            return Err(AppError::data(format!(
                "light curve columns are misaligned (time has {n} rows, others {lens:?})"
            )));
        }
        if self.cadno.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::data("cadence numbers are not strictly increasing"));
        }
        Ok(())
    }

    /// Rows where `keep` is true.
    pub fn select(&self, keep: &[bool]) -> LiteCurve {
        fn pick<T: Copy>(col: &[T], keep: &[bool]) -> Vec<T> {
            col.iter().zip(keep).filter(|(_, k)| **k).map(|(v, _)| *v).collect()
        }
        LiteCurve {
            time: pick(&self.time, keep),
            flux: pick(&self.flux, keep),
            error: pick(&self.error, keep),
            cadno: pick(&self.cadno, keep),
            quarter: pick(&self.quarter, keep),
            channel: pick(&self.channel, keep),
            mask: pick(&self.mask, keep),
            quality: pick(&self.quality, keep),
        }
    }

    /// Concatenate curves in the given order.
    pub fn stitch(curves: &[LiteCurve]) -> LiteCurve {
        let mut out = LiteCurve::default();
        for c in curves {
            out.time.extend_from_slice(&c.time);
            out.flux.extend_from_slice(&c.flux);
            out.error.extend_from_slice(&c.error);
            out.cadno.extend_from_slice(&c.cadno);
            out.quarter.extend_from_slice(&c.quarter);
            out.channel.extend_from_slice(&c.channel);
            out.mask.extend_from_slice(&c.mask);
            out.quality.extend_from_slice(&c.quality);
        }
        out
    }

    /// Drop cadences whose quality flags intersect `bitmask`.
    pub fn remove_flagged(&self, bitmask: u32) -> LiteCurve {
        let keep: Vec<bool> = self.quality.iter().map(|q| q & bitmask == 0).collect();
        self.select(&keep)
    }

    /// Sigma-clip flux residuals about a running median.
    ///
    /// When `respect_mask` is set, masked cadences neither contribute to the
    /// noise estimate nor get clipped.
    pub fn clip_outliers(
        &self,
        kernel_size: usize,
        sigma_upper: f64,
        sigma_lower: f64,
        respect_mask: bool,
    ) -> LiteCurve {
        if self.is_empty() {
            return self.clone();
        }
        let smooth = median_filter(&self.flux, kernel_size, Boundary::Mirror);
        let resid: Vec<f64> = self.flux.iter().zip(&smooth).map(|(f, s)| f - s).collect();
        let sample: Vec<f64> = resid
            .iter()
            .zip(&self.mask)
            .filter(|(_, m)| !(respect_mask && **m))
            .map(|(r, _)| *r)
            .collect();
        let sigma = mad_std(&sample);
        if !(sigma > 0.0) {
            return self.clone();
        }
        let keep: Vec<bool> = resid
            .iter()
            .zip(&self.mask)
            .map(|(r, m)| {
                (respect_mask && *m) || (*r < sigma_upper * sigma && *r > -sigma_lower * sigma)
            })
            .collect();
        self.select(&keep)
    }

    /// Cadence type inferred from the median time step.
    pub fn cadence(&self) -> Option<CadenceKind> {
        let steps: Vec<f64> = self.time.windows(2).map(|w| w[1] - w[0]).collect();
        let step = median(&steps);
        step.is_finite().then(|| CadenceKind::from_median_step(step))
    }

    /// Divide flux and error by a trend.
    pub fn normalized_by(&self, trend: &[f64]) -> LiteCurve {
        let mut out = self.clone();
        for ((f, e), t) in out.flux.iter_mut().zip(out.error.iter_mut()).zip(trend) {
            *f /= t;
            *e /= t;
        }
        out
    }

    /// Distinct quarter numbers, ascending.
    pub fn quarters(&self) -> Vec<i32> {
        let mut q = self.quarter.clone();
        q.sort_unstable();
        q.dedup();
        q
    }
}

/// One transiting planet (an immutable snapshot; stages return updated copies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub epoch: f64,
    pub period: f64,
    /// Fractional transit depth.
    pub depth: f64,
    /// Total transit duration (days).
    pub duration: f64,
    pub impact: f64,
    pub tts: Vec<f64>,
    /// Transit number relative to `epoch`.
    pub index: Vec<i64>,
    pub quality: Vec<bool>,
    pub overlap: Vec<bool>,
}

impl Planet {
    pub fn len(&self) -> usize {
        self.tts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tts.is_empty()
    }

    /// Linear ephemeris times at each transit index.
    pub fn ephemeris(&self) -> Vec<f64> {
        self.index
            .iter()
            .map(|&i| self.epoch + self.period * i as f64)
            .collect()
    }

    /// Copy with a new transit-time series; per-transit flags are reset when
    /// the length changes.
    pub fn with_tts(&self, tts: Vec<f64>, index: Vec<i64>) -> Planet {
        let same_len = tts.len() == self.tts.len();
        let n = tts.len();
        Planet {
            quality: if same_len { self.quality.clone() } else { vec![true; n] },
            overlap: if same_len { self.overlap.clone() } else { vec![false; n] },
            tts,
            index,
            ..self.clone()
        }
    }

    /// Copy whose epoch/period are refit to the current transit times.
    pub fn refit_ephemeris(&self) -> Planet {
        match crate::math::poly::fit_ephemeris(&self.index, &self.tts) {
            Some((epoch, period)) => Planet {
                epoch,
                period,
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    pub fn num_good(&self) -> usize {
        self.quality.iter().filter(|q| **q).count()
    }
}

/// Per-planet observed-minus-computed series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OmcSeries {
    pub index: Vec<i64>,
    /// Linear-ephemeris time of each transit.
    pub ephemeris: Vec<f64>,
    pub residual: Vec<f64>,
    pub uncertainty: Vec<f64>,
    pub outlier_prob: Vec<f64>,
    pub outlier: Vec<bool>,
}

impl OmcSeries {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Final transit times for one planet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickTtvs {
    pub index: Vec<i64>,
    pub independent: Vec<f64>,
    pub quick: Vec<f64>,
    pub outlier_prob: Vec<f64>,
    pub outlier: Vec<bool>,
}

/// Target-level constants shared by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetContext {
    pub target: String,
    pub koi_id: String,
    pub kic_id: i64,
    pub limbdark: [f64; 2],
    pub time_start: f64,
    pub time_end: f64,
}

impl TargetContext {
    pub fn baseline(&self) -> f64 {
        self.time_end - self.time_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(n: usize) -> LiteCurve {
        LiteCurve {
            time: (0..n).map(|i| i as f64 * LCIT).collect(),
            flux: vec![1.0; n],
            error: vec![1e-3; n],
            cadno: (0..n as i64).collect(),
            quarter: vec![3; n],
            channel: vec![41; n],
            mask: vec![false; n],
            quality: vec![0; n],
        }
    }

    #[test]
    fn mission_maps_target_to_koi() {
        assert_eq!(Mission::Kepler.koi_id("K00137").unwrap(), "K00137");
        assert_eq!(Mission::Simulated.koi_id("S00137").unwrap(), "K00137");
        assert!(Mission::Kepler.koi_id("S00137").is_err());
        assert!(Mission::Kepler.koi_id("Kabc").is_err());
    }

    #[test]
    fn clip_removes_spikes_but_respects_mask() {
        let mut lc = curve(200);
        for (i, f) in lc.flux.iter_mut().enumerate() {
            *f += 1e-4 * ((i * 37 % 11) as f64 - 5.0);
        }
        lc.flux[50] += 0.05;
        lc.flux[120] -= 0.05;
        lc.mask[120] = true;

        let clipped = lc.clip_outliers(13, 5.0, 5.0, true);
        assert_eq!(clipped.len(), 199);
        assert!(!clipped.cadno.contains(&50));
        assert!(clipped.cadno.contains(&120));

        // Upward-only pass keeps dips.
        let up = lc.clip_outliers(13, 5.0, 1000.0, false);
        assert!(up.cadno.contains(&120));
        assert!(!up.cadno.contains(&50));
    }

    #[test]
    fn stitch_and_select_keep_alignment() {
        let a = curve(5);
        let mut b = curve(3);
        b.cadno = vec![10, 11, 12];
        let s = LiteCurve::stitch(&[a, b]);
        assert_eq!(s.len(), 8);
        s.validate().unwrap();
        let sub = s.select(&[true, false, true, false, false, false, true, true]);
        assert_eq!(sub.cadno, vec![0, 2, 11, 12]);
        assert_eq!(s.cadence(), Some(CadenceKind::Long));
    }

    #[test]
    fn quality_bitmask_removes_flagged() {
        let mut lc = curve(4);
        lc.quality = vec![0, 1, 2048, 4];
        // 1 and 4 are in the default mask, 2048 is not.
        let kept = lc.remove_flagged(DEFAULT_QUALITY_BITMASK);
        assert_eq!(kept.cadno, vec![0, 2]);
    }

    #[test]
    fn break_tolerance_floors() {
        assert_eq!(CadenceKind::Long.break_tolerance(0.05), 13);
        assert_eq!(CadenceKind::Short.break_tolerance(0.02), 91);
        // 0.05 d is 73.4 short cadences; 5/2 of that is 183.5.
        assert_eq!(CadenceKind::Short.break_tolerance(0.05), 183);
        assert_eq!(CadenceKind::Long.break_tolerance(0.35), 42);
    }
}
