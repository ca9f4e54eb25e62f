//! Segmentation of a light curve at time gaps and flux jumps.
//!
//! Boundaries are cadence indices `[0, b_1, ..., N]`; segment `k` spans
//! `boundaries[k]..boundaries[k + 1]`, so the last entry is already an
//! exclusive end.

use std::ops::Range;

use crate::math::stats::{mad_std, median};

/// Boundary indices at time gaps (`Δcadno > break_tolerance`) and flux jumps
/// (`|Δflux - median(Δflux)| / MADσ > jump_tolerance`), with boundaries closer
/// than `break_tolerance` cadences merged.
pub fn identify_gaps(
    cadno: &[i64],
    flux: &[f64],
    break_tolerance: usize,
    jump_tolerance: f64,
) -> Vec<usize> {
    let n = cadno.len();
    if n < 2 {
        return vec![0, n];
    }
    let tol = break_tolerance as i64;

    let mut gaps = vec![0, n];
    gaps.extend((1..n).filter(|&i| cadno[i] - cadno[i - 1] > tol));

    // Flux differences, padded with a zero in front so index i is the step into cadence i.
    let mut jumps = Vec::with_capacity(n);
    jumps.push(0.0);
    jumps.extend(flux.windows(2).map(|w| w[1] - w[0]));
    let med = median(&jumps);
    let sigma = mad_std(&jumps);
    if sigma > 0.0 {
        gaps.extend((0..n).filter(|&i| (jumps[i] - med).abs() / sigma > jump_tolerance));
    }

    gaps.sort_unstable();
    gaps.dedup();

    let mut bad: Vec<bool> = std::iter::once(false)
        .chain(gaps.windows(2).map(|w| w[1] - w[0] < break_tolerance))
        .collect();
    let last = gaps.len() - 1;
    if bad[last] {
        // Never drop the end of the data; drop the boundary before it instead,
        // unless that is the start of the data.
        bad[last] = false;
        if last - 1 != 0 {
            bad[last - 1] = true;
        }
    }

    gaps.into_iter()
        .zip(bad)
        .filter(|(_, b)| !b)
        .map(|(g, _)| g)
        .collect()
}

/// Index partition of a light curve into contiguous segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    boundaries: Vec<usize>,
}

impl Segmentation {
    pub fn new(cadno: &[i64], flux: &[f64], break_tolerance: usize, jump_tolerance: f64) -> Self {
        Self {
            boundaries: identify_gaps(cadno, flux, break_tolerance, jump_tolerance),
        }
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    pub fn count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.boundaries.windows(2).map(|w| w[0]..w[1])
    }

    /// Segment number of every cadence.
    pub fn labels(&self) -> Vec<usize> {
        let n = self.boundaries.last().copied().unwrap_or(0);
        let mut labels = vec![0; n];
        for (k, r) in self.ranges().enumerate() {
            labels[r].iter_mut().for_each(|l| *l = k);
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth_flux(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 + 1e-4 * (2.3 * i as f64).sin()).collect()
    }

    #[test]
    fn contiguous_data_is_one_segment() {
        let cadno: Vec<i64> = (100..400).collect();
        let flux = smooth_flux(300);
        assert_eq!(identify_gaps(&cadno, &flux, 13, 5.0), vec![0, 300]);
    }

    #[test]
    fn time_gap_creates_boundary() {
        let tol = 13;
        let k = 120;
        let mut cadno: Vec<i64> = (0..300).collect();
        for c in cadno.iter_mut().skip(k) {
            *c += tol as i64 + 1;
        }
        let flux = smooth_flux(300);
        let gaps = identify_gaps(&cadno, &flux, tol, 5.0);
        assert_eq!(gaps, vec![0, k, 300]);

        let seg = Segmentation::new(&cadno, &flux, tol, 5.0);
        let labels = seg.labels();
        assert_eq!(seg.count(), 2);
        assert_eq!(labels[k - 1], 0);
        assert_eq!(labels[k], 1);
    }

    #[test]
    fn flux_jump_creates_boundary() {
        let cadno: Vec<i64> = (0..200).collect();
        let mut flux = smooth_flux(200);
        for f in flux.iter_mut().skip(80) {
            *f += 0.01;
        }
        assert_eq!(identify_gaps(&cadno, &flux, 13, 5.0), vec![0, 80, 200]);
    }

    #[test]
    fn boundary_near_end_is_merged_into_end() {
        let mut cadno: Vec<i64> = (0..200).collect();
        for c in cadno.iter_mut().skip(195) {
            *c += 50;
        }
        let gaps = identify_gaps(&cadno, &smooth_flux(200), 13, 5.0);
        assert_eq!(gaps, vec![0, 200]);
    }

    #[test]
    fn short_curve_keeps_start_and_end() {
        let cadno: Vec<i64> = (0..5).collect();
        assert_eq!(identify_gaps(&cadno, &smooth_flux(5), 13, 5.0), vec![0, 5]);
    }
}
