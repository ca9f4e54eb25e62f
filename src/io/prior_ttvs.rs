//! Published transit-time catalogs used to seed the ephemeris.
//!
//! Rows are whitespace-delimited: `koi transit_index transit_time offset_minutes`,
//! where `koi` is the numeric candidate id (e.g. `137.01`).

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::Planet;
use crate::error::{AppError, FitError};
use crate::infer::{Model, Solver, Vars};
use crate::math::poly::fit_ephemeris;
use crate::math::stats::{Boundary, median, median_filter};
use crate::omc::outliers::flag_deviations;
use crate::omc::{OmcModel, TrendKind};

/// Deviations beyond this many MAD-σ from the running median are ignored.
const PRIOR_OUTLIER_SIGMA: f64 = 3.0;

/// Raw catalog transit times of one planet.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorTimes {
    pub index: Vec<i64>,
    pub tts: Vec<f64>,
}

impl PriorTimes {
    /// Median spacing between consecutive catalogued transits.
    pub fn period(&self) -> f64 {
        let steps: Vec<f64> = self.tts.windows(2).map(|w| w[1] - w[0]).collect();
        median(&steps)
    }
}

/// Times of candidate `koi`, shifted by `time_offset` days.
pub fn parse_prior_ttvs(text: &str, koi: f64, time_offset: f64) -> Result<Option<PriorTimes>, AppError> {
    let mut out = PriorTimes {
        index: Vec::new(),
        tts: Vec::new(),
    };
    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields[0].starts_with('#') {
            continue;
        }
        if fields.len() < 4 {
            return Err(AppError::input(format!(
                "prior TTV line {} has {} columns, expected 4",
                line_no + 1,
                fields.len()
            )));
        }
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| AppError::input(format!("prior TTV line {}: invalid number '{s}'", line_no + 1)))
        };
        if (parse(fields[0])? - koi).abs() > 1e-6 {
            continue;
        }
        out.index.push(parse(fields[1])?.round() as i64);
        out.tts.push(parse(fields[2])? + parse(fields[3])? / 1440.0 + time_offset);
    }
    Ok((out.tts.len() >= 2).then_some(out))
}

/// Read the catalog once for every planet of a target.
pub fn load_prior_ttvs(
    path: &Path,
    koi_base: f64,
    npl: usize,
    time_offset: f64,
) -> Result<Vec<Option<PriorTimes>>, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read prior TTVs '{}': {e}", path.display())))?;
    (0..npl)
        .map(|n| parse_prior_ttvs(&text, koi_base + 0.01 * (n + 1) as f64, time_offset))
        .collect()
}

/// Smoothed catalog ephemeris: a Matern-3/2 MAP fit to the O-C inliers,
/// predicted at every epoch inside the baseline.
pub fn smooth_prior(
    prior: &PriorTimes,
    time_start: f64,
    time_end: f64,
    solver: &dyn Solver,
) -> Result<PriorTimes, FitError> {
    let (epoch, period) = fit_ephemeris(&prior.index, &prior.tts)
        .ok_or_else(|| FitError::insufficient("prior transit times do not define an ephemeris"))?;

    let mut hepoch = epoch;
    if hepoch < time_start {
        hepoch += (1.0 + ((time_start - hepoch) / period).floor()) * period;
    }
    if hepoch > time_start + period {
        hepoch -= ((hepoch - time_start) / period).floor() * period;
    }
    let count = ((time_end - hepoch) / period).ceil().max(0.0) as i64;
    let index: Vec<i64> = (0..count).collect();
    let ephem: Vec<f64> = index.iter().map(|&i| hepoch + period * i as f64).collect();

    let yomc: Vec<f64> = prior
        .index
        .iter()
        .zip(&prior.tts)
        .map(|(&i, t)| t - (epoch + period * i as f64))
        .collect();
    let outlier = flag_deviations(&yomc, &median_filter(&yomc, 5, Boundary::Mirror), PRIOR_OUTLIER_SIGMA);
    let (x, y): (Vec<f64>, Vec<f64>) = prior
        .tts
        .iter()
        .zip(&yomc)
        .zip(&outlier)
        .filter(|(_, o)| !**o)
        .map(|((x, y), _)| (*x, *y))
        .unzip();

    let model = OmcModel::new(TrendKind::Matern32, &x, &y)?;
    let map = solver.optimize(&model, &model.initial_point(), Vars::All)?;
    let trend = model.predict(&map, &ephem);
    Ok(PriorTimes {
        tts: ephem.iter().zip(&trend).map(|(e, t)| e + t).collect(),
        index,
    })
}

/// Replace planet ephemerides with smoothed catalog times where periods
/// match within `rtol 0.1, atol max duration`.
pub fn apply_prior_ttvs(planets: &[Planet], priors: &[Option<PriorTimes>], time_end: f64) -> Result<Vec<Planet>, AppError> {
    let atol = planets.iter().map(|p| p.duration).fold(0.0, f64::max);
    let periods: Vec<f64> = priors
        .iter()
        .map(|p| p.as_ref().map_or(f64::NAN, PriorTimes::period))
        .collect();

    planets
        .iter()
        .enumerate()
        .map(|(n, p)| {
            let matches: Vec<usize> = periods
                .iter()
                .enumerate()
                .filter(|(_, per)| (**per - p.period).abs() <= atol + 0.1 * p.period.abs())
                .map(|(k, _)| k)
                .collect();
            if matches.len() > 1 {
                return Err(AppError::input(format!(
                    "planet {n} matches {} prior TTV series",
                    matches.len()
                )));
            }
            let Some(prior) = matches.first().and_then(|&k| priors[k].as_ref()) else {
                return Ok(p.clone());
            };
            let Some((epoch, period)) = fit_ephemeris(&prior.index, &prior.tts) else {
                warn!(planet = n, "prior TTVs do not define an ephemeris, keeping catalog values");
                return Ok(p.clone());
            };

            let count = ((time_end - epoch) / period).ceil().max(0.0) as i64;
            let index: Vec<i64> = (0..count).collect();
            let tts: Vec<f64> = index
                .iter()
                .map(|&i| {
                    let t0 = epoch + period * i as f64;
                    prior
                        .tts
                        .iter()
                        .rev()
                        .find(|&&th| (t0 - th).abs() / period < 0.25)
                        .copied()
                        .unwrap_or(t0)
                })
                .collect();
            info!(planet = n, period, transits = tts.len(), "ephemeris replaced by prior TTVs");
            Ok(Planet {
                epoch,
                period,
                ..p.with_tts(tts, index)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::Engine;

    const TEXT: &str = "\
137.01  0  100.0   0.0
137.01  1  110.0   1.44
137.01  2  120.0   0.0
137.02  0  103.0   0.0
137.02  3  136.0   0.0
";

    #[test]
    fn parses_rows_of_one_candidate() {
        let prior = parse_prior_ttvs(TEXT, 137.01, 67.0).unwrap().unwrap();
        assert_eq!(prior.index, vec![0, 1, 2]);
        assert!((prior.tts[1] - 177.001).abs() < 1e-9);
        assert!(parse_prior_ttvs(TEXT, 137.03, 67.0).unwrap().is_none());
        assert!(parse_prior_ttvs("137.01 0 100.0", 137.01, 0.0).is_err());
    }

    #[test]
    fn matching_period_replaces_ephemeris() {
        let planet = Planet {
            epoch: 100.1,
            period: 10.0,
            depth: 1e-3,
            duration: 0.2,
            impact: 0.2,
            tts: vec![100.1, 110.1, 120.1],
            index: vec![0, 1, 2],
            quality: vec![true; 3],
            overlap: vec![false; 3],
        };
        let prior = PriorTimes {
            index: vec![0, 1, 2, 3],
            tts: vec![100.0, 110.01, 120.0, 130.01],
        };
        let out = apply_prior_ttvs(&[planet.clone()], &[Some(prior)], 135.0).unwrap();
        assert_eq!(out[0].tts, vec![100.0, 110.01, 120.0, 130.01]);

        let far = PriorTimes {
            index: vec![0, 1],
            tts: vec![100.0, 130.0],
        };
        let kept = apply_prior_ttvs(&[planet.clone()], &[Some(far)], 135.0).unwrap();
        assert_eq!(kept[0], planet);
    }

    #[test]
    fn smoothed_prior_covers_baseline() {
        let prior = PriorTimes {
            index: (0..20).collect(),
            tts: (0..20).map(|i| 50.0 + 10.0 * i as f64 + 1e-3 * (i as f64 / 3.0).sin()).collect(),
        };
        // Baseline ends between grid times so the last transit is unambiguous.
        let smooth = smooth_prior(&prior, 60.0, 245.0, &Engine::default()).unwrap();
        assert!(smooth.tts[0] >= 60.0 && smooth.tts[0] <= 70.0 + 5e-3);
        assert!((smooth.tts.last().unwrap() - 240.0).abs() < 5e-3);
        assert_eq!(smooth.index.len(), smooth.tts.len());
        for t in &smooth.tts {
            let k = ((t - 50.0) / 10.0).round();
            assert!((t - (50.0 + 10.0 * k)).abs() < 5e-3);
        }
        assert!(smooth.tts.windows(2).all(|w| (w[1] - w[0] - 10.0).abs() < 5e-3));
    }
}
