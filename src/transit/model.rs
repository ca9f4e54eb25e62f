//! Multi-planet transit light curves with arbitrary transit times.

use super::limbdark::QuadraticLimbDarkening;
use super::orbit::CircularOrbit;
use crate::error::FitError;

/// Transit shape plus the centre time of every transit of one planet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanetTransits {
    pub orbit: CircularOrbit,
    pub radius_ratio: f64,
    pub duration: f64,
    /// Sorted transit centre times.
    pub tts: Vec<f64>,
}

impl PlanetTransits {
    pub fn new(
        period: f64,
        radius_ratio: f64,
        impact: f64,
        duration: f64,
        mut tts: Vec<f64>,
    ) -> Result<Self, FitError> {
        let orbit = CircularOrbit::from_duration(period, duration, radius_ratio, impact)?;
        tts.retain(|t| t.is_finite());
        tts.sort_by(f64::total_cmp);
        Ok(Self {
            orbit,
            radius_ratio,
            duration,
            tts,
        })
    }

    /// Offset from the closest transit centre.
    fn offset(&self, t: f64) -> Option<f64> {
        let i = self.tts.partition_point(|&tt| tt < t);
        let after = self.tts.get(i).map(|tt| tt - t);
        let before = i.checked_sub(1).map(|j| t - self.tts[j]);
        match (before, after) {
            (Some(b), Some(a)) if a < b => Some(-a),
            (Some(b), _) => Some(b),
            (None, Some(a)) => Some(-a),
            (None, None) => None,
        }
    }
}

/// Transit-time model: every cadence sees the nearest transit of each planet.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitModel {
    pub limb_darkening: QuadraticLimbDarkening,
    pub planets: Vec<PlanetTransits>,
}

impl TransitModel {
    pub fn new(limb_darkening: QuadraticLimbDarkening, planets: Vec<PlanetTransits>) -> Self {
        Self {
            limb_darkening,
            planets,
        }
    }

    /// Flux change (non-positive) at the instant `t`, summed over planets.
    pub fn instant_delta(&self, t: f64) -> f64 {
        self.planets
            .iter()
            .filter_map(|p| {
                let dt = p.offset(t)?;
                let z = p.orbit.separation(dt);
                Some(-self.limb_darkening.occulted_fraction(z, p.radius_ratio))
            })
            .sum()
    }

    /// Flux change per cadence, averaged over `oversample` sub-exposures
    /// spread evenly across the exposure time `texp`.
    pub fn delta_flux(&self, time: &[f64], texp: f64, oversample: usize) -> Vec<f64> {
        let n = oversample.max(1);
        time.iter()
            .map(|&t| {
                let near = self.planets.iter().any(|p| {
                    p.offset(t)
                        .is_some_and(|dt| dt.abs() <= 0.5 * p.duration + texp)
                });
                if !near {
                    return 0.0;
                }
                (0..n)
                    .map(|j| {
                        let shift = texp * ((j as f64 + 0.5) / n as f64 - 0.5);
                        self.instant_delta(t + shift)
                    })
                    .sum::<f64>()
                    / n as f64
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LCIT;
    use crate::transit::limbdark::transit_depth;

    fn single(tts: Vec<f64>, limbdark: [f64; 2]) -> TransitModel {
        let planet = PlanetTransits::new(5.0, 0.1, 0.3, 0.15, tts).unwrap();
        TransitModel::new(QuadraticLimbDarkening::new(limbdark), vec![planet])
    }

    #[test]
    fn depth_at_centre_and_zero_outside() {
        let model = single(vec![10.0, 15.0], [0.0, 0.0]);
        let flux = model.delta_flux(&[10.0, 10.2, 12.5, 15.0], 0.0, 1);
        let depth = transit_depth(0.1, 0.3);
        assert!((flux[0] + depth).abs() < 5e-6);
        assert_eq!(flux[1], 0.0);
        assert_eq!(flux[2], 0.0);
        assert!((flux[3] + depth).abs() < 5e-6);
    }

    #[test]
    fn follows_shifted_transit_times() {
        let model = single(vec![10.0, 15.03], [0.4, 0.25]);
        let flux = model.delta_flux(&[15.0, 15.03], 0.0, 1);
        assert!(flux[1] < flux[0]);
    }

    #[test]
    fn exposure_smearing_preserves_mid_transit_area() {
        let model = single(vec![10.0], [0.4, 0.25]);
        let time: Vec<f64> = (0..400).map(|i| 9.8 + i as f64 * 0.001).collect();
        let sharp: f64 = model.delta_flux(&time, 0.0, 1).iter().sum();
        let smeared: f64 = model.delta_flux(&time, LCIT, 15).iter().sum();
        assert!((sharp - smeared).abs() < 0.01 * sharp.abs());
        let centre = model.delta_flux(&[10.0], LCIT, 15)[0];
        assert!(centre > model.delta_flux(&[10.0], 0.0, 1)[0]);
    }
}
