//! Second-order IIR notch filter and zero-phase (forward-backward) filtering.

use std::f64::consts::PI;

/// Biquad coefficients with `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Notch at `f0` with quality factor `q` for sampling frequency `fs`
    /// (all in the same frequency units).
    pub fn notch(f0: f64, q: f64, fs: f64) -> Option<Self> {
        let w0 = 2.0 * f0 / fs;
        if !(w0 > 0.0 && w0 < 1.0) || !(q > 0.0) {
            return None;
        }
        let bw = w0 / q * PI;
        let w0 = w0 * PI;
        let beta = (0.5 * bw).tan();
        let gain = 1.0 / (1.0 + beta);
        let cos_w0 = w0.cos();
        Some(Self {
            b: [gain, -2.0 * gain * cos_w0, gain],
            a: [1.0, -2.0 * gain * cos_w0, 2.0 * gain - 1.0],
        })
    }

    /// Steady-state initial conditions for a unit step input.
    fn step_state(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let rhs0 = b1 - a1 * b0;
        let rhs1 = b2 - a2 * b0;
        let det = 1.0 + a1 + a2;
        [(rhs0 + rhs1) / det, ((1.0 + a1) * rhs1 - a2 * rhs0) / det]
    }

    /// Direct-form II transposed filtering starting from state `zi`.
    fn filter_from(&self, x: &[f64], zi: [f64; 2]) -> Vec<f64> {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let [mut z0, mut z1] = zi;
        x.iter()
            .map(|&xn| {
                let y = b0 * xn + z0;
                z0 = b1 * xn - a1 * y + z1;
                z1 = b2 * xn - a2 * y;
                y
            })
            .collect()
    }

    /// Zero-phase filtering with odd extension of `padlen` samples at each end.
    pub fn filtfilt(&self, x: &[f64], padlen: usize) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let padlen = padlen.min(n - 1);

        let mut ext = Vec::with_capacity(n + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * x[0] - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=padlen).map(|i| 2.0 * x[n - 1] - x[n - 1 - i]));

        let zi = self.step_state();
        let scaled = |s: f64| [zi[0] * s, zi[1] * s];

        let fwd = self.filter_from(&ext, scaled(ext[0]));
        let mut rev: Vec<f64> = fwd.into_iter().rev().collect();
        let y0 = rev[0];
        rev = self.filter_from(&rev, scaled(y0));
        rev.reverse();
        rev[padlen..padlen + n].to_vec()
    }
}
