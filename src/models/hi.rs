//! Interstellar HI Lyman-alpha absorption.
//!
//! The damping-wing optical depth of a column `N(HI)` is
//!
//! ```text
//! τ(λ) = 4.26e-20 N(HI) / (6.04e-10 + (λ - λ0)²)      (λ in Å)
//! ```
//!
//! with the line center `λ0` Doppler shifted by the velocity of the absorbing
//! component.

/// Lyman-alpha rest wavelength in Å.
pub const LYA_REST_ANGSTROM: f64 = 1215.67;

/// Speed of light in km/s.
pub const C_KMS: f64 = 299_792.458;

const TAU_SCALE: f64 = 4.26e-20;
const DAMPING_SQ: f64 = 6.04e-10;

/// One absorbing HI component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HiComponent {
    pub log_column: f64,
    /// Radial velocity in km/s.
    pub velocity: f64,
}

/// Optical depth of one component at `wave` (micron).
pub fn tau(wave: f64, comp: &HiComponent) -> f64 {
    let center = LYA_REST_ANGSTROM * (1.0 + comp.velocity / C_KMS);
    let dl = wave * 1e4 - center;
    TAU_SCALE * 10f64.powf(comp.log_column) / (DAMPING_SQ + dl * dl)
}

/// Transmission `exp(-Σ τ)` through all components at `wave` (micron).
pub fn transmission(wave: f64, comps: &[HiComponent]) -> f64 {
    let total: f64 = comps.iter().map(|c| tau(wave, c)).sum();
    (-total).exp()
}
