//! Layered SED synthesis.
//!
//! Each stage consumes the previous stage's fluxes plus its own window of the
//! full parameter vector:
//!
//! ```text
//! stellar (0..3, velocity) -> dust (3..10) -> HI (10..12, velocities) [-> wind]
//! ```

use crate::data::ModelGrid;
use crate::domain::{CHANNEL_BAND, ChannelFluxes};
use crate::error::AppError;
use crate::math::interp_clamped;
use crate::models::extinction::{self, DustParams};
use crate::models::hi::{self, C_KMS, HiComponent};
use crate::params::layout::{self, DUST, HI, STELLAR};

/// Wind emission only affects wavelengths redward of this (micron).
pub const WIND_MIN_WAVE: f64 = 1.0;

/// IR wind emission parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindParams {
    pub amp: f64,
    pub alpha: f64,
}

/// Outputs of every synthesis stage.
#[derive(Debug, Clone)]
pub struct SedStages {
    pub stellar: ChannelFluxes,
    pub dust: ChannelFluxes,
    pub hi: ChannelFluxes,
    /// Final model: `hi` with wind emission applied when enabled.
    pub full: ChannelFluxes,
}

/// Intrinsic stellar SED at `[logTeff, logg, logZ]`, Doppler shifted by
/// `velocity` (km/s). Broadband points are not shifted.
pub fn stellar_sed(grid: &ModelGrid, stellar: &[f64], velocity: f64) -> Result<ChannelFluxes, AppError> {
    let &[log_teff, log_g, log_z] = stellar else {
        return Err(AppError::new(
            4,
            format!("Stellar window needs 3 values, got {}.", stellar.len()),
        ));
    };

    let mut sed = grid.interpolate([log_teff, log_g, log_z]);
    if velocity != 0.0 {
        let factor = 1.0 + velocity / C_KMS;
        for (name, fluxes) in sed.iter_mut() {
            if name == CHANNEL_BAND {
                continue;
            }
            let waves = &grid.waves[name];
            let rest = fluxes.clone();
            for (f, &w) in fluxes.iter_mut().zip(waves) {
                *f = interp_clamped(waves, &rest, w / factor);
            }
        }
    }
    Ok(sed)
}

/// Apply dust extinction with the 7-value dust window.
pub fn dust_extinguished_sed(
    grid: &ModelGrid,
    dust: &[f64],
    sed: &ChannelFluxes,
) -> Result<ChannelFluxes, AppError> {
    let p = DustParams::from_slice(dust).ok_or_else(|| {
        AppError::new(4, format!("Dust window needs 7 values, got {}.", dust.len()))
    })?;
    Ok(map_channels(grid, sed, |w| extinction::transmission(w, &p)))
}

/// Apply HI absorption with `[logHI, logHI_MW]` at `[velocity, vel_MW]`.
pub fn hi_abs_sed(
    grid: &ModelGrid,
    hi_cols: &[f64],
    velocities: [f64; 2],
    sed: &ChannelFluxes,
) -> Result<ChannelFluxes, AppError> {
    let &[log_hi, log_hi_mw] = hi_cols else {
        return Err(AppError::new(
            4,
            format!("HI window needs 2 values, got {}.", hi_cols.len()),
        ));
    };
    let comps = [
        HiComponent {
            log_column: log_hi,
            velocity: velocities[0],
        },
        HiComponent {
            log_column: log_hi_mw,
            velocity: velocities[1],
        },
    ];
    Ok(map_channels(grid, sed, |w| hi::transmission(w, &comps)))
}

/// Add IR wind emission: `F *= 1 + amp * λ^alpha` for `λ > 1 µm`.
pub fn wind_sed(grid: &ModelGrid, wind: WindParams, sed: &ChannelFluxes) -> ChannelFluxes {
    map_channels(grid, sed, |w| {
        if w > WIND_MIN_WAVE {
            1.0 + wind.amp * w.powf(wind.alpha)
        } else {
            1.0
        }
    })
}

/// Run all stages for a full parameter vector.
pub fn synthesize(
    grid: &ModelGrid,
    full: &[f64],
    velocity: f64,
    vel_mw: f64,
    wind: Option<WindParams>,
) -> Result<SedStages, AppError> {
    layout::check_full(full)?;

    let stellar = stellar_sed(grid, &full[STELLAR], velocity)?;
    let dust = dust_extinguished_sed(grid, &full[DUST], &stellar)?;
    let hi = hi_abs_sed(grid, &full[HI], [velocity, vel_mw], &dust)?;
    let full_sed = match wind {
        Some(w) => wind_sed(grid, w, &hi),
        None => hi.clone(),
    };

    Ok(SedStages {
        stellar,
        dust,
        hi,
        full: full_sed,
    })
}

/// Multiply every channel point by `factor(wave)`.
fn map_channels<F>(grid: &ModelGrid, sed: &ChannelFluxes, factor: F) -> ChannelFluxes
where
    F: Fn(f64) -> f64,
{
    sed.iter()
        .map(|(name, fluxes)| {
            let out = match grid.waves.get(name) {
                Some(waves) => fluxes
                    .iter()
                    .zip(waves)
                    .map(|(&f, &w)| f * factor(w))
                    .collect(),
                None => fluxes.clone(),
            };
            (name.clone(), out)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::grid::tests::toy_grid;
    use crate::math::logspace;

    fn grid() -> ModelGrid {
        toy_grid(&BTreeMap::from([
            ("BAND".to_string(), vec![0.44, 0.55, 1.6, 2.2]),
            ("STIS".to_string(), logspace(0.115, 1.0, 400)),
        ]))
    }

    fn full(av: f64, log_hi: f64) -> Vec<f64> {
        vec![4.5, 8.0, 0.0, av, 3.1, 0.73, 3.6, 0.4, 4.59, 0.89, log_hi, 17.0]
    }

    #[test]
    fn stages_layer_in_order() {
        let g = grid();
        let s = synthesize(&g, &full(1.0, 21.5), 0.0, 0.0, None).unwrap();

        // Dust dims every point relative to the stellar SED.
        for (a, b) in s.stellar["BAND"].iter().zip(&s.dust["BAND"]) {
            assert!(b < a);
        }
        // HI only bites near Lyman-alpha.
        let waves = &g.waves["STIS"];
        let lya = waves
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1 - 0.121567)
                    .abs()
                    .total_cmp(&(b.1 - 0.121567).abs())
            })
            .map(|(i, _)| i)
            .unwrap();
        assert!(s.hi["STIS"][lya] < 0.01 * s.dust["STIS"][lya]);
        let red = waves.len() - 1;
        assert!((s.hi["STIS"][red] - s.dust["STIS"][red]).abs() / s.dust["STIS"][red] < 1e-4);
        assert_eq!(s.hi, s.full);
    }

    #[test]
    fn zero_av_leaves_stellar_sed_untouched() {
        let g = grid();
        let s = synthesize(&g, &full(0.0, 16.0), 0.0, 0.0, None).unwrap();
        for (a, b) in s.stellar["BAND"].iter().zip(&s.dust["BAND"]) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn wind_only_brightens_ir() {
        let g = grid();
        let wind = WindParams { amp: 0.1, alpha: 1.0 };
        let s = synthesize(&g, &full(0.5, 19.0), 0.0, 0.0, Some(wind)).unwrap();
        let band_hi = &s.hi["BAND"];
        let band_full = &s.full["BAND"];
        assert_eq!(band_hi[0], band_full[0]);
        assert!((band_full[3] / band_hi[3] - 1.22).abs() < 1e-9);
    }

    #[test]
    fn velocity_shift_moves_spectra_but_not_bands() {
        let g = grid();
        let rest = stellar_sed(&g, &[4.5, 8.0, 0.0], 0.0).unwrap();
        let moved = stellar_sed(&g, &[4.5, 8.0, 0.0], 500.0).unwrap();
        assert_eq!(rest["BAND"], moved["BAND"]);
        assert_ne!(rest["STIS"], moved["STIS"]);
    }

    #[test]
    fn wrong_length_vector_is_rejected() {
        let g = grid();
        assert!(synthesize(&g, &full(1.0, 20.0)[..11], 0.0, 0.0, None).is_err());
        assert!(stellar_sed(&g, &[4.5, 8.0], 0.0).is_err());
    }
}
