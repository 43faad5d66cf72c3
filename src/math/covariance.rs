//! Parameter uncertainties from the curvature of the cost surface.
//!
//! For a cost `C(θ) = -ln p(θ)` the covariance of the estimate near the
//! minimum is approximated by the inverse Hessian `H⁻¹`. We build `H` by
//! central finite differences and invert it with an SVD pseudo-inverse so
//! that flat or degenerate directions do not blow up the whole matrix.

use nalgebra::DMatrix;

/// Central-difference Hessian of `f` at `x`.
///
/// `steps[i]` is the finite-difference step for coordinate `i`.
pub fn numerical_hessian<F>(f: F, x: &[f64], steps: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let mut h = DMatrix::<f64>::zeros(n, n);
    let f0 = f(x);
    let mut p = x.to_vec();

    for i in 0..n {
        let hi = steps[i];

        p[i] = x[i] + hi;
        let fp = f(&p);
        p[i] = x[i] - hi;
        let fm = f(&p);
        p[i] = x[i];
        h[(i, i)] = (fp - 2.0 * f0 + fm) / (hi * hi);

        for j in (i + 1)..n {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                p[i] = x[i] + si * hi;
                p[j] = x[j] + sj * hj;
                let v = f(&p);
                p[i] = x[i];
                p[j] = x[j];
                v
            };
            let fpp = corner(1.0, 1.0);
            let fpm = corner(1.0, -1.0);
            let fmp = corner(-1.0, 1.0);
            let fmm = corner(-1.0, -1.0);
            let v = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }

    h
}

/// Invert a Hessian into a covariance matrix.
///
/// Returns `None` if the matrix contains non-finite entries or the SVD
/// pseudo-inverse fails at every tolerance tried.
pub fn covariance_from_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }

    // Progressively looser tolerances for nearly singular Hessians.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(inv) = hessian.clone().pseudo_inverse(tol) {
            if inv.iter().all(|v| v.is_finite()) {
                return Some(inv);
            }
        }
    }
    None
}

/// One-sigma uncertainties: square roots of the covariance diagonal.
///
/// Non-positive or non-finite variances map to `0.0`.
pub fn sigmas(cov: &DMatrix<f64>) -> Vec<f64> {
    cov.diagonal()
        .iter()
        .map(|&v| if v.is_finite() && v > 0.0 { v.sqrt() } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_bowl_recovers_sigmas() {
        // C = 0.5 * ((x-1)/0.1)^2 + 0.5 * ((y+2)/3)^2
        let f = |p: &[f64]| 0.5 * ((p[0] - 1.0) / 0.1).powi(2) + 0.5 * ((p[1] + 2.0) / 3.0).powi(2);
        let h = numerical_hessian(f, &[1.0, -2.0], &[1e-3, 1e-2]);
        let cov = covariance_from_hessian(&h).unwrap();
        let s = sigmas(&cov);
        assert!((s[0] - 0.1).abs() < 1e-4);
        assert!((s[1] - 3.0).abs() < 1e-3);
        assert!(cov[(0, 1)].abs() < 1e-6);
    }

    #[test]
    fn non_finite_hessian_is_rejected() {
        let h = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(covariance_from_hessian(&h).is_none());
    }
}
