//! Quadratic limb darkening and stellar occultation.
//!
//! Lengths are in units of the stellar radius: `z` is the sky-projected
//! centre separation and `k` the planet-to-star radius ratio.

use std::f64::consts::PI;

/// Quadrature nodes per integration piece.
const NODES: usize = 64;

/// `I(μ) = 1 - u1 (1 - μ) - u2 (1 - μ)^2`, normalised to `I(1) = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticLimbDarkening {
    pub u1: f64,
    pub u2: f64,
}

impl QuadraticLimbDarkening {
    pub fn new(coeffs: [f64; 2]) -> Self {
        Self {
            u1: coeffs[0],
            u2: coeffs[1],
        }
    }

    pub fn intensity_at_radius(&self, r: f64) -> f64 {
        let mu = (1.0 - r * r).max(0.0).sqrt();
        let x = 1.0 - mu;
        1.0 - self.u1 * x - self.u2 * x * x
    }

    /// Disk-integrated stellar flux.
    pub fn total_flux(&self) -> f64 {
        PI * (1.0 - self.u1 / 3.0 - self.u2 / 6.0)
    }

    /// Fraction of the stellar flux blocked by a planet of radius `k` at
    /// separation `z`.
    pub fn occulted_fraction(&self, z: f64, k: f64) -> f64 {
        let z = z.abs();
        if !(k > 0.0) || z >= 1.0 + k {
            return 0.0;
        }
        let lo = (z - k).max(0.0);
        let hi = (z + k).min(1.0);
        if hi <= lo {
            return 0.0;
        }

        // Annuli with r <= k - z lie entirely behind the planet.
        let inner = (k - z).clamp(lo, hi);
        let full = |r: f64| self.intensity_at_radius(r) * 2.0 * PI * r;
        let partial = |r: f64| {
            let cos_theta = ((r * r + z * z - k * k) / (2.0 * r * z)).clamp(-1.0, 1.0);
            self.intensity_at_radius(r) * 2.0 * cos_theta.acos() * r
        };

        let blocked = integrate(full, lo, inner) + integrate(partial, inner, hi);
        (blocked / self.total_flux()).clamp(0.0, 1.0)
    }
}

/// `∫ f(r) dr` over `[lo, hi]` with `r = mid - half·cos φ`, which clusters
/// nodes at both ends where the integrands have square-root behaviour.
fn integrate<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    let mid = 0.5 * (lo + hi);
    let half = 0.5 * (hi - lo);
    let h = PI / NODES as f64;
    (0..NODES)
        .map(|j| {
            let phi = (j as f64 + 0.5) * h;
            f(mid - half * phi.cos()) * half * phi.sin()
        })
        .sum::<f64>()
        * h
}

/// Area of a disk of radius `k` at separation `z` that overlaps the unit
/// disk, as a fraction of the unit disk's area.
pub fn overlap_fraction(z: f64, k: f64) -> f64 {
    let z = z.abs();
    if z >= 1.0 + k {
        return 0.0;
    }
    if z <= k - 1.0 {
        return 1.0;
    }
    if z <= 1.0 - k {
        return k * k;
    }
    let k0 = ((k * k + z * z - 1.0) / (2.0 * k * z)).clamp(-1.0, 1.0).acos();
    let k1 = ((1.0 - k * k + z * z) / (2.0 * z)).clamp(-1.0, 1.0).acos();
    let root = (4.0 * z * z - (1.0 + z * z - k * k).powi(2)).max(0.0).sqrt();
    (k * k * k0 + k1 - 0.5 * root) / PI
}

/// Depth of a transit with radius ratio `k` and impact parameter `b`
/// (uniform disk).
pub fn transit_depth(k: f64, b: f64) -> f64 {
    overlap_fraction(b, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_disk_matches_overlap_area() {
        let ld = QuadraticLimbDarkening::new([0.0, 0.0]);
        for (z, k) in [(0.0, 0.1), (0.5, 0.1), (0.95, 0.1), (1.05, 0.1), (0.3, 0.4)] {
            let got = ld.occulted_fraction(z, k);
            let want = overlap_fraction(z, k);
            assert!((got - want).abs() < 5e-4 * want, "z={z} k={k}: {got} vs {want}");
        }
    }

    #[test]
    fn limb_darkening_deepens_central_transits() {
        let ld = QuadraticLimbDarkening::new([0.4, 0.25]);
        let k: f64 = 0.05;
        let centre = ld.occulted_fraction(0.0, k);
        // Small-planet limit: k² I(1) / (1 - u1/3 - u2/6).
        let approx = k * k / (1.0 - 0.4 / 3.0 - 0.25 / 6.0);
        assert!((centre - approx).abs() < 1e-3 * approx);
        assert!(ld.occulted_fraction(0.9, k) < centre);
        assert_eq!(ld.occulted_fraction(1.2, k), 0.0);
    }

    #[test]
    fn overlap_limits() {
        assert_eq!(overlap_fraction(2.0, 0.1), 0.0);
        assert!((overlap_fraction(0.2, 0.1) - 0.01).abs() < 1e-15);
        assert_eq!(overlap_fraction(0.1, 1.5), 1.0);
        let grazing = overlap_fraction(1.0, 0.1);
        assert!(grazing > 0.0 && grazing < 0.01);
    }
}
