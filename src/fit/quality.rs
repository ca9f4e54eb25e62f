//! Per-transit coverage and overlap flags.

use crate::domain::{CadenceKind, LiteCurve, Planet};

/// Number of sorted `time` values within `half_width` (strictly) of `t0`.
fn count_within(time: &[f64], t0: f64, half_width: f64) -> usize {
    let lo = time.partition_point(|&t| t <= t0 - half_width);
    let hi = time.partition_point(|&t| t < t0 + half_width);
    hi.saturating_sub(lo)
}

/// Whether the cadences in `time` cover a transit at `t0` well enough: more
/// than half the expected in-transit count within half a duration, and more
/// than 1.5 times the expected count within 1.5 durations.
pub fn has_coverage(time: &[f64], t0: f64, duration: f64, cadence: CadenceKind) -> bool {
    let expected = (duration / cadence.integration_time()).ceil();
    let inside = count_within(time, t0, 0.5 * duration) as f64;
    let near = count_within(time, t0, 1.5 * duration) as f64;
    inside > 0.5 * expected && near > 1.5 * expected
}

/// Quality flag per transit: covered by either cadence type.
pub fn transit_quality(planet: &Planet, curves: &[(CadenceKind, &LiteCurve)]) -> Vec<bool> {
    planet
        .tts
        .iter()
        .map(|&t0| {
            curves
                .iter()
                .any(|(cadence, lc)| has_coverage(&lc.time, t0, planet.duration, *cadence))
        })
        .collect()
}

/// Overlap flag per transit of every planet: another planet transits within
/// 1.5 of the longest duration in the system.
pub fn transit_overlap(planets: &[Planet]) -> Vec<Vec<bool>> {
    let max_dur = planets.iter().map(|p| p.duration).fold(0.0, f64::max);
    planets
        .iter()
        .enumerate()
        .map(|(i, p)| {
            p.tts
                .iter()
                .map(|&ti| {
                    planets
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .any(|(_, other)| other.tts.iter().any(|&tj| (ti - tj).abs() / max_dur < 1.5))
                })
                .collect()
        })
        .collect()
}

/// Planet snapshots carrying fresh quality and overlap flags.
pub fn flag_transits(planets: &[Planet], curves: &[(CadenceKind, &LiteCurve)]) -> Vec<Planet> {
    let overlap = transit_overlap(planets);
    planets
        .iter()
        .zip(overlap)
        .map(|(p, overlap)| Planet {
            quality: transit_quality(p, curves),
            overlap,
            ..p.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LCIT;

    fn planet(tts: Vec<f64>, duration: f64) -> Planet {
        let n = tts.len();
        Planet {
            epoch: tts[0],
            period: 10.0,
            depth: 1e-3,
            duration,
            impact: 0.3,
            index: (0..n as i64).collect(),
            tts,
            quality: vec![true; n],
            overlap: vec![false; n],
        }
    }

    fn curve(time: Vec<f64>) -> LiteCurve {
        let n = time.len();
        LiteCurve {
            time,
            flux: vec![1.0; n],
            error: vec![1e-4; n],
            cadno: (0..n as i64).collect(),
            quarter: vec![1; n],
            channel: vec![1; n],
            mask: vec![false; n],
            quality: vec![0; n],
        }
    }

    #[test]
    fn coverage_requires_data_in_and_around_transit() {
        let lc = curve((0..2000).map(|i| i as f64 * LCIT).collect());
        let p = planet(vec![10.0, 20.0, 50.0], 0.2);
        // The third transit falls after the data ends (~40.9 d).
        assert_eq!(transit_quality(&p, &[(CadenceKind::Long, &lc)]), vec![true, true, false]);

        // A gap over the second transit.
        let gappy = curve(
            (0..2000)
                .map(|i| i as f64 * LCIT)
                .filter(|t| !(19.93..20.07).contains(t))
                .collect(),
        );
        assert_eq!(transit_quality(&p, &[(CadenceKind::Long, &gappy)]), vec![true, false, false]);
    }

    #[test]
    fn nearby_transits_of_other_planets_overlap() {
        let a = planet(vec![10.0, 20.0], 0.2);
        let b = planet(vec![10.1, 25.0], 0.1);
        let flags = transit_overlap(&[a, b]);
        assert_eq!(flags[0], vec![true, false]);
        assert_eq!(flags[1], vec![true, false]);
    }
}
