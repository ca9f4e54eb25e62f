//! Transit masks.

use crate::domain::Planet;

/// `true` wherever a transit centre inside the observed time range lies within
/// `masksize` of the cadence time.
pub fn make_transit_mask(time: &[f64], tts: &[f64], masksize: f64) -> Vec<bool> {
    let mut mask = vec![false; time.len()];
    let (Some(lo), Some(hi)) = (
        time.iter().copied().reduce(f64::min),
        time.iter().copied().reduce(f64::max),
    ) else {
        return mask;
    };
    for &t0 in tts.iter().filter(|t| **t >= lo && **t <= hi) {
        for (m, &t) in mask.iter_mut().zip(time) {
            *m |= (t - t0).abs() < masksize;
        }
    }
    mask
}

/// Union of per-planet masks, each with its own half-width.
pub fn mask_planets<F>(time: &[f64], planets: &[Planet], width: F) -> Vec<bool>
where
    F: Fn(&Planet) -> f64,
{
    let widths: Vec<f64> = planets.iter().map(width).collect();
    mask_with_widths(time, planets, &widths)
}

/// Union of per-planet masks with `widths[n]` the half-width of planet `n`.
pub fn mask_with_widths(time: &[f64], planets: &[Planet], widths: &[f64]) -> Vec<bool> {
    let mut mask = vec![false; time.len()];
    for (p, &w) in planets.iter().zip(widths) {
        let pm = make_transit_mask(time, &p.tts, w);
        for (m, v) in mask.iter_mut().zip(pm) {
            *m |= v;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_cadences_within_half_width() {
        let mask = make_transit_mask(&[4.4, 4.6, 5.4, 5.6], &[5.0], 0.5);
        assert_eq!(mask, vec![false, true, true, false]);
    }

    #[test]
    fn ignores_transits_outside_the_data() {
        // 3.9 is within 0.5 of 4.2 but outside [4.2, 5.0].
        let mask = make_transit_mask(&[4.2, 4.5, 5.0], &[3.9], 0.5);
        assert_eq!(mask, vec![false, false, false]);
        assert!(make_transit_mask(&[], &[1.0], 0.5).is_empty());
    }
}
