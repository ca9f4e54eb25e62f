//! Log-density helpers for building posteriors by hand.

use std::f64::consts::PI;

/// Normal log-density.
pub fn normal_lnpdf(x: f64, mu: f64, sd: f64) -> f64 {
    let z = (x - mu) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
}

pub fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Unconstrained parameter mapped onto the open interval `(lo, hi)` through a
/// logistic transform. A uniform prior on the interval contributes only the
/// log-Jacobian of the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn forward(&self, z: f64) -> f64 {
        self.lo + (self.hi - self.lo) * expit(z)
    }

    pub fn backward(&self, x: f64) -> f64 {
        let span = self.hi - self.lo;
        // Keep starting values strictly inside the interval.
        let p = ((x - self.lo) / span).clamp(1e-9, 1.0 - 1e-9);
        logit(p)
    }

    /// `ln |dx/dz|`, i.e. the log-density of a uniform prior in `z` space
    /// (up to the constant `-ln(hi - lo)`).
    pub fn log_jacobian(&self, z: f64) -> f64 {
        let s = expit(z);
        (self.hi - self.lo).ln() + s.ln() + (1.0 - s).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lnpdf_peak() {
        let v = normal_lnpdf(0.0, 0.0, 1.0);
        assert!((v + 0.918_938_533_204_672_7).abs() < 1e-12);
    }

    #[test]
    fn interval_round_trips() {
        let iv = Interval::new(-11.5, -0.01);
        for x in [-11.0, -5.0, -0.5] {
            assert!((iv.forward(iv.backward(x)) - x).abs() < 1e-9);
        }
        assert!((logit(expit(0.3)) - 0.3).abs() < 1e-12);
        assert!(iv.log_jacobian(0.0).is_finite());
    }
}
