//! Lomb-Scargle periodogram with the Baluev false-alarm probability.
//!
//! Power uses the "standard" normalization on mean-subtracted data:
//!
//! ```text
//! P(f) = 1 - χ²(f) / χ²_ref  ∈ [0, 1]
//! ```
//!
//! where `χ²(f)` is the residual of the best sinusoid at `f` and `χ²_ref` the
//! residual about the mean.

use std::f64::consts::PI;

use rayon::prelude::*;

use super::special::ln_gamma;
use super::stats::{mean, variance};

#[derive(Debug, Clone)]
pub struct LombScargle<'a> {
    t: &'a [f64],
    y: Vec<f64>,
    yy: f64,
}

impl<'a> LombScargle<'a> {
    pub fn new(t: &'a [f64], y: &[f64]) -> Self {
        let m = mean(y);
        let y: Vec<f64> = y.iter().map(|v| v - m).collect();
        let yy = y.iter().map(|v| v * v).sum();
        Self { t, y, yy }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Normalized power at a single frequency (cycles per unit time).
    pub fn power_at(&self, freq: f64) -> f64 {
        if !(self.yy > 0.0) {
            return 0.0;
        }
        let w = 2.0 * PI * freq;
        let (s2, c2) = self.t.iter().fold((0.0, 0.0), |(s, c), &t| {
            let (sn, cs) = (2.0 * w * t).sin_cos();
            (s + sn, c + cs)
        });
        let tau = 0.5 * s2.atan2(c2) / w;

        let (mut yc, mut ys, mut cc, mut ss) = (0.0, 0.0, 0.0, 0.0);
        for (&t, &y) in self.t.iter().zip(&self.y) {
            let (sn, cs) = (w * (t - tau)).sin_cos();
            yc += y * cs;
            ys += y * sn;
            cc += cs * cs;
            ss += sn * sn;
        }
        let mut chi2_drop = 0.0;
        if cc > 0.0 {
            chi2_drop += yc * yc / cc;
        }
        if ss > 0.0 {
            chi2_drop += ys * ys / ss;
        }
        (chi2_drop / self.yy).clamp(0.0, 1.0)
    }

    /// Power over a frequency grid (evaluated in parallel).
    pub fn power(&self, freqs: &[f64]) -> Vec<f64> {
        freqs.par_iter().map(|&f| self.power_at(f)).collect()
    }

    /// Baluev (2008) upper bound on the false-alarm probability of power `z`
    /// given the highest searched frequency `fmax`.
    pub fn false_alarm_probability(&self, z: f64, fmax: f64) -> f64 {
        let n = self.len() as f64;
        if n < 4.0 {
            return 1.0;
        }
        let fap_single = (1.0 - z).max(0.0).powf(0.5 * (n - 3.0));
        let tau = tau_davies(z, fmax, self.t);
        let fap = 1.0 - (1.0 - fap_single) * (-tau).exp();
        fap.clamp(0.0, 1.0)
    }
}

fn gamma_factor(n: f64) -> f64 {
    (2.0 / n).sqrt() * (ln_gamma(0.5 * n) - ln_gamma(0.5 * (n - 1.0))).exp()
}

fn tau_davies(z: f64, fmax: f64, t: &[f64]) -> f64 {
    let n = t.len() as f64;
    let t_eff = (4.0 * PI * variance(t)).sqrt();
    let w = fmax * t_eff;
    gamma_factor(n) * w * (1.0 - z).max(0.0).powf(0.5 * (n - 4.0)) * z.max(0.0).sqrt()
}

/// Regular frequency grid with `samples_per_peak` points per `1/baseline`.
pub fn frequency_grid(fmin: f64, fmax: f64, baseline: f64, samples_per_peak: usize) -> Vec<f64> {
    if !(fmax > fmin) || !(baseline > 0.0) {
        return Vec::new();
    }
    let df = 1.0 / (baseline * samples_per_peak.max(1) as f64);
    let n = ((fmax - fmin) / df).floor() as usize + 1;
    (0..n).map(|i| fmin + i as f64 * df).collect()
}

/// Period of the strongest peak over `[fmin, fmax]`.
pub fn peak_period(t: &[f64], y: &[f64], fmin: f64, fmax: f64) -> Option<f64> {
    let (lo, hi) = (t.first()?, t.last()?);
    let freqs = frequency_grid(fmin, fmax, hi - lo, 5);
    let ls = LombScargle::new(t, y);
    let power = ls.power(&freqs);
    let best = super::stats::argmax(&power)?;
    Some(1.0 / freqs[best])
}

/// Result of a periodic-signal search.
#[derive(Debug, Clone)]
pub struct PeriodSearch {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
    /// `(frequency, false-alarm probability)` for significant local maxima,
    /// strongest first.
    pub peaks: Vec<(f64, f64)>,
}

/// Scan from `1/baseline` up to half the densest sampling rate and keep local
/// maxima whose false-alarm probability is below `fap_threshold`.
pub fn search_periodic(t: &[f64], y: &[f64], fap_threshold: f64) -> Option<PeriodSearch> {
    if t.len() < 4 || t.len() != y.len() {
        return None;
    }
    let baseline = t.last()? - t.first()?;
    let min_dt = t
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !(baseline > 0.0) || !min_dt.is_finite() {
        return None;
    }
    let freqs = frequency_grid(1.0 / baseline, 0.5 / min_dt, baseline, 5);
    if freqs.len() < 3 {
        return None;
    }
    let ls = LombScargle::new(t, y);
    let power = ls.power(&freqs);
    let fmax = freqs[freqs.len() - 1];

    let mut peaks: Vec<(f64, f64, f64)> = (0..freqs.len())
        .filter(|&i| {
            let left = if i == 0 { f64::NEG_INFINITY } else { power[i - 1] };
            let right = power.get(i + 1).copied().unwrap_or(f64::NEG_INFINITY);
            power[i] > left && power[i] >= right
        })
        .map(|i| (freqs[i], power[i], ls.false_alarm_probability(power[i], fmax)))
        .filter(|(_, _, fap)| *fap < fap_threshold)
        .collect();
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));

    Some(PeriodSearch {
        peaks: peaks.into_iter().map(|(f, _, fap)| (f, fap)).collect(),
        freqs,
        power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn recovers_sinusoid_period() {
        let t: Vec<f64> = (0..400).map(|i| i as f64 * 0.25 + 0.01 * (i % 7) as f64).collect();
        let y: Vec<f64> = t.iter().map(|t| (2.0 * PI * t / 7.3).sin()).collect();
        let p = peak_period(&t, &y, 1.0 / 100.0, 1.0).unwrap();
        assert!((p - 7.3).abs() < 0.1, "period {p}");
    }

    #[test]
    fn significant_signal_has_small_fap() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = Normal::new(0.0, 0.3).unwrap();
        let t: Vec<f64> = (0..120).map(|i| i as f64 * 10.0).collect();
        let y: Vec<f64> = t
            .iter()
            .map(|t| (2.0 * PI * t / 230.0).sin() + noise.sample(&mut rng))
            .collect();
        let res = search_periodic(&t, &y, 0.1).unwrap();
        let (f, fap) = res.peaks[0];
        assert!((1.0 / f - 230.0).abs() < 10.0);
        assert!(fap < 1e-6);
    }

    #[test]
    fn white_noise_yields_no_peaks() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let t: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let y: Vec<f64> = t.iter().map(|_| noise.sample(&mut rng)).collect();
        let res = search_periodic(&t, &y, 0.001).unwrap();
        assert!(res.peaks.is_empty());
    }
}
