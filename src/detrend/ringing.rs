//! Notch filtering of known instrumental ringing frequencies.
//!
//! Each contiguous segment is resampled onto a complete cadence grid (missing
//! cadences filled with Gaussian noise matching the segment), notch filtered
//! at every frequency both in forward and in reversed order, blended with a
//! linear ramp so each end is dominated by the pass with the settled filter,
//! and finally reduced back to the observed cadences.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

use super::gaps::Segmentation;
use crate::domain::LiteCurve;
use crate::math::filter::Biquad;
use crate::math::stats::{linspace, median, std_dev};

/// Maximum odd-extension length used by the zero-phase filter.
const MAX_PADLEN: usize = 120;

/// Filtered flux at every cadence of `lc`; the curve itself is left untouched.
pub fn filter_ringing<R: Rng>(
    lc: &LiteCurve,
    break_tolerance: usize,
    jump_tolerance: f64,
    frequencies: &[f64],
    bandwidth: f64,
    rng: &mut R,
) -> Vec<f64> {
    let segmentation = Segmentation::new(&lc.cadno, &lc.flux, break_tolerance, jump_tolerance);
    let mut out = Vec::with_capacity(lc.len());

    for range in segmentation.ranges() {
        let t = &lc.time[range.clone()];
        let f = &lc.flux[range.clone()];
        let c = &lc.cadno[range];
        if t.len() < 3 {
            out.extend_from_slice(f);
            continue;
        }

        let dt = t
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min);
        let npts = (c[c.len() - 1] - c[0] + 1) as usize;

        let (loc, scale) = (median(f), std_dev(f));
        let noise = Normal::new(loc, scale.max(f64::MIN_POSITIVE)).ok();
        let mut filled = vec![loc; npts];
        let mut exists = vec![false; npts];
        for (&ci, &fi) in c.iter().zip(f) {
            let k = (ci - c[0]) as usize;
            filled[k] = fi;
            exists[k] = true;
        }
        if let Some(noise) = noise {
            for (v, e) in filled.iter_mut().zip(&exists) {
                if !e {
                    *v = noise.sample(rng);
                }
            }
        }

        let fs = 1.0 / dt;
        let mut fwd = filled.clone();
        let mut back: Vec<f64> = filled.iter().rev().copied().collect();
        let padlen = MAX_PADLEN.min(npts.saturating_sub(2));
        for &f0 in frequencies {
            let Some(notch) = Biquad::notch(f0, 2.0 * f0 / bandwidth, fs) else {
                warn!(frequency = f0, sampling = fs, "ringing frequency above Nyquist, skipped");
                continue;
            };
            fwd = notch.filtfilt(&fwd, padlen);
            back = notch.filtfilt(&back, padlen);
        }
        back.reverse();

        let ramp = linspace(0.0, 1.0, npts);
        out.extend(
            (0..npts)
                .filter(|&k| exists[k])
                .map(|k| fwd[k] * ramp[k] + back[k] * (1.0 - ramp[k])),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LCIT;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    #[test]
    fn removes_ringing_mode_across_gaps() {
        let n = 1500;
        let mut cadno: Vec<i64> = (0..n as i64).collect();
        // A few missing cadences inside the segment.
        cadno.retain(|c| !(700..705).contains(c));
        let f_ring = 3.0; // cycles per day
        let time: Vec<f64> = cadno.iter().map(|&c| c as f64 * LCIT).collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|t| 1.0 + 1e-3 * (2.0 * PI * f_ring * t).sin())
            .collect();
        let m = cadno.len();
        let lc = LiteCurve {
            time,
            flux: flux.clone(),
            error: vec![1e-4; m],
            cadno,
            quarter: vec![2; m],
            channel: vec![1; m],
            mask: vec![false; m],
            quality: vec![0; m],
        };

        let mut rng = StdRng::seed_from_u64(5);
        let filtered = filter_ringing(&lc, 13, 5.0, &[f_ring], 0.5, &mut rng);
        assert_eq!(filtered.len(), lc.len());
        assert!(std_dev(&flux) > 6e-4);
        assert!(std_dev(&filtered[200..m - 200]) < 1.5e-4);
    }

    #[test]
    fn frequency_above_nyquist_leaves_flux_unchanged() {
        let lc = LiteCurve {
            time: (0..100).map(|i| i as f64 * LCIT).collect(),
            flux: (0..100).map(|i| 1.0 + 1e-4 * (i as f64).sin()).collect(),
            error: vec![1e-4; 100],
            cadno: (0..100).collect(),
            quarter: vec![2; 100],
            channel: vec![1; 100],
            mask: vec![false; 100],
            quality: vec![0; 100],
        };
        let mut rng = StdRng::seed_from_u64(1);
        let filtered = filter_ringing(&lc, 13, 5.0, &[100.0], 0.1, &mut rng);
        for (a, b) in filtered.iter().zip(&lc.flux) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
