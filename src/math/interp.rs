//! Linear interpolation on sorted abscissae.

/// Interpolate `ys(xs)` at `x`, clamping to the end values outside the range.
///
/// `xs` must be sorted ascending and the same length as `ys`. Returns `NaN`
/// for empty input or a `NaN` abscissa.
pub fn interp_clamped(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }

    // First index with xs[i] > x; the bracket is [i-1, i].
    let i = xs[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Interpolate at every point of `targets`; values outside `xs` become `outside`.
pub fn resample(xs: &[f64], ys: &[f64], targets: &[f64], outside: f64) -> Vec<f64> {
    let n = xs.len().min(ys.len());
    targets
        .iter()
        .map(|&t| {
            if n == 0 || t < xs[0] || t > xs[n - 1] {
                outside
            } else {
                interp_clamped(xs, ys, t)
            }
        })
        .collect()
}

/// `n` log-spaced values from `start` to `stop` inclusive.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![start];
    }
    let (l0, l1) = (start.ln(), stop.ln());
    (0..n)
        .map(|i| (l0 + (l1 - l0) * i as f64 / (n as f64 - 1.0)).exp())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_and_clamps() {
        let xs = [1.0, 2.0, 4.0];
        let ys = [10.0, 20.0, 0.0];
        assert!((interp_clamped(&xs, &ys, 1.5) - 15.0).abs() < 1e-12);
        assert!((interp_clamped(&xs, &ys, 3.0) - 10.0).abs() < 1e-12);
        assert_eq!(interp_clamped(&xs, &ys, 0.0), 10.0);
        assert_eq!(interp_clamped(&xs, &ys, 9.0), 0.0);
        assert_eq!(interp_clamped(&xs, &ys, 2.0), 20.0);
        assert!(interp_clamped(&xs, &ys, f64::NAN).is_nan());
    }

    #[test]
    fn resample_marks_outside_points() {
        let out = resample(&[1.0, 2.0], &[1.0, 3.0], &[0.5, 1.5, 2.5], 0.0);
        assert_eq!(out, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn logspace_hits_endpoints() {
        let v = logspace(0.1, 10.0, 3);
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12);
        assert!((v[2] - 10.0).abs() < 1e-9);
    }
}
