//! Robust pre-flagging of O-C outliers.

use crate::math::stats::{Boundary, boxcar_smooth, mad_std, median_filter};

/// Running baseline of an O-C series: 5-point mirrored median filter
/// followed by a 5-point boxcar.
pub fn smooth_baseline(y: &[f64]) -> Vec<f64> {
    boxcar_smooth(&median_filter(y, 5, Boundary::Mirror), 5)
}

/// `true` where `|y - baseline|` exceeds `sigma` MAD-scaled standard
/// deviations of the differences. Nothing is flagged when the spread is zero.
pub fn flag_deviations(y: &[f64], baseline: &[f64], sigma: f64) -> Vec<bool> {
    let diff: Vec<f64> = y.iter().zip(baseline).map(|(a, b)| a - b).collect();
    let scale = mad_std(&diff);
    if !(scale > 0.0) {
        return vec![false; y.len()];
    }
    diff.iter().map(|d| d.abs() / scale > sigma).collect()
}

/// Pre-flag O-C outliers against the smoothed running median.
pub fn flag_omc_outliers(y: &[f64], sigma: f64) -> Vec<bool> {
    flag_deviations(y, &smooth_baseline(y), sigma)
}
