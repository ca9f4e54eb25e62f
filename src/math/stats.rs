//! Robust statistics and small array utilities.
//!
//! Conventions:
//! - `std_dev`/`variance` are population estimators (divide by `n`).
//! - `mad_std` scales the median absolute deviation to a Gaussian σ.
//! - functions return `NaN` for empty inputs instead of erroring.

/// Scale factor converting a MAD into a normal standard deviation (1 / Φ⁻¹(3/4)).
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

pub fn variance(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / x.len() as f64
}

pub fn std_dev(x: &[f64]) -> f64 {
    variance(x).sqrt()
}

/// Median of all values (NaNs sort last and therefore bias the result; use
/// [`nanmedian`] when NaNs are expected).
pub fn median(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let mut v = x.to_vec();
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    }
}

/// Median ignoring NaNs.
pub fn nanmedian(x: &[f64]) -> f64 {
    let finite: Vec<f64> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    median(&finite)
}

/// Median absolute deviation about the median, scaled to a Gaussian σ.
pub fn mad_std(x: &[f64]) -> f64 {
    let med = median(x);
    let dev: Vec<f64> = x.iter().map(|v| (v - med).abs()).collect();
    MAD_TO_SIGMA * median(&dev)
}

/// Edge handling for [`median_filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Pad with zeros (`scipy.signal.medfilt`).
    Zero,
    /// Reflect about the edge sample without repeating it (`d c b | a b c d | c b a`).
    Mirror,
}

fn padded_value(x: &[f64], idx: isize, boundary: Boundary) -> f64 {
    let n = x.len() as isize;
    if (0..n).contains(&idx) {
        return x[idx as usize];
    }
    match boundary {
        Boundary::Zero => 0.0,
        Boundary::Mirror => {
            if n == 1 {
                return x[0];
            }
            let period = 2 * (n - 1);
            let mut m = idx.rem_euclid(period);
            if m >= n {
                m = period - m;
            }
            x[m as usize]
        }
    }
}

/// Running median with an odd window `size`.
pub fn median_filter(x: &[f64], size: usize, boundary: Boundary) -> Vec<f64> {
    let size = if size % 2 == 0 { size + 1 } else { size.max(1) };
    let half = (size / 2) as isize;
    let mut window = Vec::with_capacity(size);
    (0..x.len() as isize)
        .map(|i| {
            window.clear();
            window.extend((i - half..=i + half).map(|j| padded_value(x, j, boundary)));
            median(&window)
        })
        .collect()
}

/// Centered moving average; edges are mirror-padded so the output keeps the
/// input length and is not pulled toward zero.
pub fn boxcar_smooth(x: &[f64], winsize: usize) -> Vec<f64> {
    if x.is_empty() || winsize <= 1 {
        return x.to_vec();
    }
    let half = (winsize / 2) as isize;
    let lo = -half;
    let hi = winsize as isize - half - 1;
    (0..x.len() as isize)
        .map(|i| {
            let s: f64 = (i + lo..=i + hi)
                .map(|j| padded_value(x, j, Boundary::Mirror))
                .sum();
            s / winsize as f64
        })
        .collect()
}

/// `start, start + step, ...` while `< stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(stop > start) {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// `n` evenly spaced samples over `[start, stop]`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Piecewise-linear interpolation on increasing `xp`, clamped to the end values.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if xp.is_empty() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    let last = xp.len() - 1;
    if x >= xp[last] {
        return fp[last];
    }
    let hi = xp.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let w = (x - xp[lo]) / (xp[hi] - xp[lo]);
    fp[lo] + w * (fp[hi] - fp[lo])
}

/// Index of the largest value, skipping NaNs.
pub fn argmax(x: &[f64]) -> Option<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Index of the smallest value, skipping NaNs.
pub fn argmin(x: &[f64]) -> Option<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
        assert_eq!(nanmedian(&[f64::NAN, 1.0, 5.0, 3.0]), 3.0);
    }

    #[test]
    fn mad_std_matches_gaussian_scale() {
        // |x - 0| = [2,1,0,1,2] -> MAD = 1
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!((mad_std(&x) - MAD_TO_SIGMA).abs() < 1e-12);
        let shifted: Vec<f64> = x.iter().map(|v| v + 100.0).collect();
        assert!((mad_std(&shifted) - mad_std(&x)).abs() < 1e-12);
    }

    #[test]
    fn median_filter_boundaries() {
        let x = [5.0, 1.0, 1.0, 1.0, 5.0];
        // zero padding pulls the edges down
        assert_eq!(median_filter(&x, 3, Boundary::Zero), vec![1.0, 1.0, 1.0, 1.0, 1.0]);
        // mirror: [1,5,1] at both edges
        assert_eq!(median_filter(&x, 3, Boundary::Mirror), vec![1.0, 1.0, 1.0, 1.0, 1.0]);

        let ramp = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(median_filter(&ramp, 5, Boundary::Mirror), vec![2.0, 2.0, 3.0, 4.0, 4.0]);
        assert_eq!(median_filter(&ramp, 3, Boundary::Zero), vec![1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn boxcar_preserves_constants_and_lines() {
        let c = vec![2.0; 10];
        assert_eq!(boxcar_smooth(&c, 5), c);
        let line: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let sm = boxcar_smooth(&line, 5);
        for i in 2..8 {
            assert!((sm[i] - line[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn interp_clamps_and_interpolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 0.0];
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert!((interp(0.5, &xp, &fp) - 5.0).abs() < 1e-12);
        assert!((interp(1.5, &xp, &fp) - 5.0).abs() < 1e-12);
        assert_eq!(interp(3.0, &xp, &fp), 0.0);
    }

    #[test]
    fn arange_excludes_stop() {
        let a = arange(0.0, 1.0, 0.25);
        assert_eq!(a.len(), 4);
        assert!((a[3] - 0.75).abs() < 1e-12);
        assert!(arange(1.0, 0.0, 0.1).is_empty());
    }
}
