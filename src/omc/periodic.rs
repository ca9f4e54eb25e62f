//! Periodic-signal search in O-C series and cross-planet matching.

use crate::math::lombscargle::search_periodic;

/// Strongest significant O-C frequency of one planet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmcFrequency {
    pub freq: Option<f64>,
    pub fap: f64,
    /// `1 / (max - min)` of the planet's ephemeris times.
    pub resolution: f64,
    /// Span of the planet's ephemeris times.
    pub baseline: f64,
}

/// Search the inlier O-C points for a periodic component. Only the strongest
/// peak is considered, and a peak at the lowest searched frequency is
/// treated as no detection.
pub fn search_omc_frequency(
    xtime: &[f64],
    yomc: &[f64],
    outlier: &[bool],
    fap_threshold: f64,
    min_inliers: usize,
) -> OmcFrequency {
    let (lo, hi) = xtime
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let baseline = hi - lo;
    let mut result = OmcFrequency {
        freq: None,
        fap: 1.0,
        resolution: 1.0 / baseline,
        baseline,
    };

    let (x, y): (Vec<f64>, Vec<f64>) = xtime
        .iter()
        .zip(yomc)
        .zip(outlier)
        .filter(|(_, o)| !**o)
        .map(|((x, y), _)| (*x, *y))
        .unzip();
    if x.len() <= min_inliers {
        return result;
    }
    if let Some(search) = search_periodic(&x, &y, fap_threshold)
        && let Some(&(freq, fap)) = search.peaks.first()
        && freq > search.freqs[0]
    {
        result.freq = Some(freq);
        result.fap = fap;
    }
    result
}

/// Decide which planets keep their O-C frequency.
///
/// A single planet keeps whatever its own search found. In multi-planet
/// systems a frequency is kept outright when its false-alarm probability is
/// below `fap_keep`; otherwise only when a later planet's frequency lies
/// within this planet's frequency resolution.
pub fn match_frequencies(found: &[OmcFrequency], fap_keep: f64) -> Vec<Option<f64>> {
    if found.len() == 1 {
        return vec![found[0].freq];
    }
    (0..found.len())
        .map(|i| {
            let fi = found[i].freq?;
            if found[i].fap < fap_keep {
                return Some(fi);
            }
            let close = found[i + 1..]
                .iter()
                .filter_map(|other| other.freq)
                .any(|fj| (fi - fj).abs() < found[i].resolution);
            close.then_some(fi)
        })
        .collect()
}

/// Sinusoid period for a planet: the matched frequency, or twice the
/// ephemeris span when none was found.
pub fn sinusoid_period(freq: Option<f64>, baseline: f64) -> f64 {
    match freq {
        Some(f) if f > 0.0 => 1.0 / f,
        _ => 2.0 * baseline,
    }
}
