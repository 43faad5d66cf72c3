//! Small statistics helpers: means, medians, percentiles.

/// Mean of the finite values, `None` if there are none.
pub fn finite_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Median of the finite values (NaN-ignoring), `None` if there are none.
pub fn nan_median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut v: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let n = v.len();
    Some(if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    })
}

/// Percentile `q` in `[0, 100]` of **sorted** data, linearly interpolated
/// between closest ranks.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let pos = (q / 100.0).clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// 50th percentile and the symmetric uncertainty `0.5 * ((p84 - p50) + (p50 - p16))`.
pub fn p50_with_unc(samples: &[f64]) -> (f64, f64) {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let p16 = percentile_sorted(&sorted, 16.0);
    let p50 = percentile_sorted(&sorted, 50.0);
    let p84 = percentile_sorted(&sorted, 84.0);
    (p50, 0.5 * ((p84 - p50) + (p50 - p16)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&v, 50.0), 3.0);
        assert!((percentile_sorted(&v, 16.0) - 1.64).abs() < 1e-12);
        assert!((percentile_sorted(&v, 84.0) - 4.36).abs() < 1e-12);
    }

    #[test]
    fn p50_averages_asymmetric_spread() {
        let v: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let (p50, unc) = p50_with_unc(&v);
        assert_eq!(p50, 50.0);
        assert!((unc - 34.0).abs() < 1e-9);
    }

    #[test]
    fn median_and_mean_ignore_nan() {
        assert_eq!(nan_median([3.0, f64::NAN, 1.0, 2.0]), Some(2.0));
        assert_eq!(finite_mean([f64::NAN, 2.0, 4.0]), Some(3.0));
        assert_eq!(finite_mean([f64::NAN]), None);
    }
}
