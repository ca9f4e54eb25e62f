//! Circular orbits parameterised by transit duration.

use std::f64::consts::PI;

use crate::error::FitError;

/// Sky-plane geometry of one planet on a circular orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularOrbit {
    pub period: f64,
    /// Semi-major axis in stellar radii.
    pub a: f64,
    pub impact: f64,
}

impl CircularOrbit {
    /// Orbit whose total (first to fourth contact) duration is `duration` for
    /// a planet of radius ratio `k` at impact parameter `impact`.
    pub fn from_duration(period: f64, duration: f64, k: f64, impact: f64) -> Result<Self, FitError> {
        let phi = PI * duration / period;
        let chord = (1.0 + k).powi(2) - (impact * phi.cos()).powi(2);
        let a = (chord / phi.sin().powi(2)).sqrt();
        if !(period > 0.0 && duration > 0.0 && duration < period && a.is_finite() && a > impact) {
            return Err(FitError::numerical(format!(
                "no circular orbit with P={period}, T={duration}, k={k}, b={impact}"
            )));
        }
        Ok(Self { period, a, impact })
    }

    /// Projected separation `dt` days after mid-transit; infinite while the
    /// planet is behind the star.
    pub fn separation(&self, dt: f64) -> f64 {
        let m = 2.0 * PI * dt / self.period;
        let (s, c) = m.sin_cos();
        if c <= 0.0 {
            return f64::INFINITY;
        }
        ((self.a * s).powi(2) + (self.impact * c).powi(2)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_points_match_duration() {
        let (period, duration, k, b) = (10.0, 0.2, 0.05, 0.4);
        let orbit = CircularOrbit::from_duration(period, duration, k, b).unwrap();
        assert!((orbit.separation(0.0) - b).abs() < 1e-12);
        assert!((orbit.separation(0.5 * duration) - (1.0 + k)).abs() < 1e-9);
        assert!((orbit.separation(-0.5 * duration) - (1.0 + k)).abs() < 1e-9);
        assert!(orbit.separation(0.5 * period).is_infinite());
    }

    #[test]
    fn rejects_impossible_geometry() {
        assert!(CircularOrbit::from_duration(10.0, 0.2, 0.05, 1.2).is_err());
        assert!(CircularOrbit::from_duration(1.0, 2.0, 0.05, 0.1).is_err());
    }
}
