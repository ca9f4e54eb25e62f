//! Polynomial fitting and evaluation.
//!
//! Coefficients are stored in ascending order: `c[0] + c[1] x + c[2] x^2 + ...`.

use nalgebra::{DMatrix, DVector};

use super::solve_least_squares;

/// Least-squares polynomial of degree `deg`; `None` if the design is singular
/// or there are fewer points than coefficients.
pub fn polyfit(x: &[f64], y: &[f64], deg: usize) -> Option<Vec<f64>> {
    let n = x.len();
    if n != y.len() || n < deg + 1 {
        return None;
    }
    let design = DMatrix::from_fn(n, deg + 1, |i, j| x[i].powi(j as i32));
    let rhs = DVector::from_column_slice(y);
    solve_least_squares(&design, &rhs).map(|beta| beta.iter().copied().collect())
}

/// Straight line fit, returned as `(intercept, slope)`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    polyfit(x, y, 1).map(|c| (c[0], c[1]))
}

/// Linear ephemeris `(epoch, period)` from transit numbers and times.
pub fn fit_ephemeris(index: &[i64], tts: &[f64]) -> Option<(f64, f64)> {
    let x: Vec<f64> = index.iter().map(|&i| i as f64).collect();
    linear_fit(&x, tts)
}

/// Map `x` from `[lo, hi]` onto the Legendre domain `[-1, 1]`.
pub fn to_legendre_domain(x: f64, lo: f64, hi: f64) -> f64 {
    2.0 * (x - lo) / (hi - lo) - 1.0
}

/// Legendre polynomial `P_n(x)` by the three-term recurrence.
pub fn legendre(n: usize, x: f64) -> f64 {
    match n {
        0 => 1.0,
        1 => x,
        _ => {
            let (mut p0, mut p1) = (1.0, x);
            for k in 1..n {
                let kf = k as f64;
                let p2 = ((2.0 * kf + 1.0) * x * p1 - kf * p0) / (kf + 1.0);
                p0 = p1;
                p1 = p2;
            }
            p1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polyval(coeffs: &[f64], x: f64) -> f64 {
        coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    #[test]
    fn polyfit_recovers_quadratic() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.3).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 - 2.0 * v + 0.5 * v * v).collect();
        let c = polyfit(&x, &y, 2).unwrap();
        assert!((c[0] - 1.0).abs() < 1e-9);
        assert!((c[1] + 2.0).abs() < 1e-9);
        assert!((c[2] - 0.5).abs() < 1e-9);
        assert!((polyval(&c, 2.0) - (1.0 - 4.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn ephemeris_fit_with_missing_epochs() {
        let index = [0, 1, 3, 7];
        let tts: Vec<f64> = index.iter().map(|&i| 100.0 + 3.5 * i as f64).collect();
        let (epoch, period) = fit_ephemeris(&index, &tts).unwrap();
        assert!((epoch - 100.0).abs() < 1e-9);
        assert!((period - 3.5).abs() < 1e-9);
    }

    #[test]
    fn legendre_low_orders() {
        assert_eq!(legendre(0, 0.3), 1.0);
        assert_eq!(legendre(1, 0.3), 0.3);
        assert!((legendre(2, 0.3) - 0.5 * (3.0 * 0.09 - 1.0)).abs() < 1e-12);
        assert_eq!(to_legendre_domain(5.0, 0.0, 10.0), 0.0);
    }
}
