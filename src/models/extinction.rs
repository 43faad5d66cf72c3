//! Dust extinction law.
//!
//! `A(λ)/A(V) = 1 + k(λ-V) / R(V)` where `k = E(λ-V)/E(B-V)`.
//!
//! - UV (`x ≥ 3.3 µm⁻¹`): Fitzpatrick & Massa (1990),
//!   `k = C1 + C2 x + C3 D(x; x0, γ) + C4 F(x)` with `C1 = 2.18 - 2.91 C2`
//!   and the bump amplitude parameterized as `B3 = C3 / γ²`.
//! - optical/IR (`x < 3.3 µm⁻¹`): Cardelli, Clayton & Mathis (1989),
//!   `A(λ)/A(V) = a(x) + b(x) / R(V)`.

/// Dust shape parameters, in the order of the dust window of the full vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DustParams {
    pub av: f64,
    pub rv: f64,
    pub c2: f64,
    pub b3: f64,
    pub c4: f64,
    pub x0: f64,
    pub gamma: f64,
}

impl DustParams {
    /// Build from the 7-value dust window `[Av, Rv, C2, B3, C4, xo, gamma]`.
    pub fn from_slice(p: &[f64]) -> Option<Self> {
        match p {
            &[av, rv, c2, b3, c4, x0, gamma] => Some(Self {
                av,
                rv,
                c2,
                b3,
                c4,
                x0,
                gamma,
            }),
            _ => None,
        }
    }
}

/// Wavenumber (1/micron) where the UV parameterization takes over.
pub const X_UV: f64 = 3.3;

/// FM90 far-UV curvature onset.
const X_FUV: f64 = 5.9;

/// `A(λ)/A(V)` at wavelength `wave` (micron).
pub fn alav(wave: f64, p: &DustParams) -> f64 {
    let x = 1.0 / wave;
    if x >= X_UV {
        1.0 + fm90_k(x, p) / p.rv
    } else {
        let (a, b) = ccm89_ab(x);
        a + b / p.rv
    }
}

/// Extinction in magnitudes at `wave` (micron).
pub fn a_lambda(wave: f64, p: &DustParams) -> f64 {
    p.av * alav(wave, p)
}

/// Flux transmission `10^(-0.4 A(λ))`.
pub fn transmission(wave: f64, p: &DustParams) -> f64 {
    10f64.powf(-0.4 * a_lambda(wave, p))
}

/// FM90 `E(λ-V)/E(B-V)` at wavenumber `x`.
pub fn fm90_k(x: f64, p: &DustParams) -> f64 {
    let c1 = 2.18 - 2.91 * p.c2;
    let c3 = p.b3 * p.gamma * p.gamma;
    let x2 = x * x;
    let d = x2 / ((x2 - p.x0 * p.x0).powi(2) + x2 * p.gamma * p.gamma);
    let f = if x >= X_FUV {
        let y = x - X_FUV;
        0.5392 * y * y + 0.05644 * y * y * y
    } else {
        0.0
    };
    c1 + p.c2 * x + c3 * d + p.c4 * f
}

/// CCM89 `a(x)` and `b(x)` for `x < 3.3 µm⁻¹`.
///
/// The IR power law is used for everything redward of `x = 1.1`.
pub fn ccm89_ab(x: f64) -> (f64, f64) {
    if x < 1.1 {
        let xp = x.powf(1.61);
        (0.574 * xp, -0.527 * xp)
    } else {
        let y = x - 1.82;
        let a = 1.0 + 0.17699 * y - 0.50447 * y.powi(2) - 0.02427 * y.powi(3)
            + 0.72085 * y.powi(4)
            + 0.01979 * y.powi(5)
            - 0.77530 * y.powi(6)
            + 0.32999 * y.powi(7);
        let b = 1.41338 * y + 2.28305 * y.powi(2) + 1.07233 * y.powi(3)
            - 5.38434 * y.powi(4)
            - 0.62251 * y.powi(5)
            + 5.30260 * y.powi(6)
            - 2.09002 * y.powi(7);
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mw() -> DustParams {
        DustParams {
            av: 1.0,
            rv: 3.1,
            c2: 0.73,
            b3: 3.6,
            c4: 0.4,
            x0: 4.59,
            gamma: 0.89,
        }
    }

    #[test]
    fn normalized_at_v() {
        // a(x_V) = 1, b(x_V) = 0 at x = 1.82.
        let v = alav(1.0 / 1.82, &mw());
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn b_band_gives_one_over_rv_excess() {
        // A(B)/A(V) ≈ 1 + 1/Rv for CCM89 at x ≈ 2.27.
        let p = mw();
        let ab = alav(1.0 / 2.27, &p);
        assert!((ab - (1.0 + 1.0 / p.rv)).abs() < 0.05, "A(B)/A(V) = {ab}");
    }

    #[test]
    fn bump_peaks_near_x0() {
        let p = mw();
        let at_peak = fm90_k(p.x0, &p);
        let below = fm90_k(p.x0 - 0.8, &p);
        let above = fm90_k(p.x0 + 0.8, &p);
        assert!(at_peak > below && at_peak > above);
    }

    #[test]
    fn transmission_dims_blue_more_than_red() {
        let p = mw();
        assert!(transmission(0.2, &p) < transmission(0.55, &p));
        assert!(transmission(0.55, &p) < transmission(2.2, &p));
        assert!((transmission(1.0 / 1.82, &p) - 10f64.powf(-0.4)).abs() < 1e-9);
    }

    #[test]
    fn from_slice_requires_seven_values() {
        assert!(DustParams::from_slice(&[1.0; 6]).is_none());
        assert_eq!(DustParams::from_slice(&[1.0, 3.1, 0.73, 3.6, 0.4, 4.59, 0.89]), Some(mw()));
    }
}
