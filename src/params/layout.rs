//! Parameter vector layouts.
//!
//! Two representations of the physical parameters exist:
//!
//! - the **full** vector (12 values):
//!   `[logTeff, logg, logZ, Av, Rv, C2, B3, C4, xo, gamma, logHI, logHI_MW]`
//! - the **fit** vector (10 values) handed to optimizers, with `logZ` (index 2)
//!   and the trailing `logHI_MW` removed.
//!
//! `expand` is deliberately not the inverse of `compress`: the dropped interior
//! slot is copied in from context and the trailing slot is always overwritten
//! with a pinned constant. `expand(compress(x))` therefore differs from `x`
//! whenever `x`'s last value is not the pinned value.
//!
//! The SED synthesis stages read fixed windows of the full vector
//! ([`STELLAR`], [`DUST`], [`HI`]). Changing the layout means updating these
//! windows together with every consumer.

use std::ops::Range;

use crate::error::AppError;

/// Length of the full physical parameter vector.
pub const FULL_LEN: usize = 12;

/// Length of the fit vector produced by [`compress`] from a full vector.
pub const FIT_LEN: usize = FULL_LEN - 2;

/// Stellar atmosphere window: `logTeff, logg, logZ`.
pub const STELLAR: Range<usize> = 0..3;

/// Dust window: `Av, Rv, C2, B3, C4, xo, gamma`.
pub const DUST: Range<usize> = 3..10;

/// HI window: `logHI, logHI_MW`.
pub const HI: Range<usize> = 10..12;

/// Interior index removed by [`compress`].
pub const DROPPED_INTERIOR: usize = 2;

/// Default pinned value for the trailing slot (log10 of the Milky Way HI column).
pub const DEFAULT_PINNED_TAIL: f64 = 17.0;

/// Smallest full vector [`compress`] accepts.
///
/// Shorter inputs would overlap the dropped interior slot with the trailing one.
pub const MIN_FULL_LEN: usize = 4;

/// Drop the interior slot and the trailing slot.
///
/// Output length is `full.len() - 2`, with `out[0..2] == full[0..2]` and
/// `out[2..] == full[3..full.len() - 1]`.
pub fn compress(full: &[f64]) -> Result<Vec<f64>, AppError> {
    if full.len() < MIN_FULL_LEN {
        return Err(AppError::new(
            2,
            format!(
                "Full parameter vector too short: {} values (need at least {MIN_FULL_LEN}).",
                full.len()
            ),
        ));
    }

    let mut fit = Vec::with_capacity(full.len() - 2);
    fit.extend_from_slice(&full[..DROPPED_INTERIOR]);
    fit.extend_from_slice(&full[DROPPED_INTERIOR + 1..full.len() - 1]);
    Ok(fit)
}

/// Rebuild a full vector from a fit vector.
///
/// `interior` fills the slot [`compress`] removed; the trailing slot is set to
/// `pinned_tail` regardless of any previous value.
pub fn expand(fit: &[f64], interior: f64, pinned_tail: f64) -> Result<Vec<f64>, AppError> {
    if fit.len() < MIN_FULL_LEN - 2 {
        return Err(AppError::new(
            2,
            format!(
                "Fit parameter vector too short: {} values (need at least {}).",
                fit.len(),
                MIN_FULL_LEN - 2
            ),
        ));
    }

    let mut full = Vec::with_capacity(fit.len() + 2);
    full.extend_from_slice(&fit[..DROPPED_INTERIOR]);
    full.push(interior);
    full.extend_from_slice(&fit[DROPPED_INTERIOR..]);
    full.push(pinned_tail);
    Ok(full)
}

/// Check a full vector has exactly the layout length before slicing windows.
pub fn check_full(full: &[f64]) -> Result<(), AppError> {
    if full.len() != FULL_LEN {
        return Err(AppError::new(
            4,
            format!(
                "Full parameter vector has {} values, expected {FULL_LEN}.",
                full.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compress_drops_interior_and_tail() {
        let full: Vec<f64> = (0..FULL_LEN).map(|i| i as f64).collect();
        let fit = compress(&full).unwrap();
        assert_eq!(fit, vec![0.0, 1.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(fit.len(), FIT_LEN);
    }

    #[test]
    fn expand_inserts_context_and_pins_tail() {
        let fit = vec![4.5, 8.0, 1.0, 3.1, 0.7, 3.6, 0.4, 4.59, 0.89, 20.5];
        let full = expand(&fit, -0.3, DEFAULT_PINNED_TAIL).unwrap();
        assert_eq!(full.len(), FULL_LEN);
        assert_eq!(full[DROPPED_INTERIOR], -0.3);
        assert_eq!(full[3..11], fit[2..]);
        assert_eq!(full[FULL_LEN - 1], 17.0);
    }

    #[test]
    fn short_vectors_are_rejected() {
        assert!(compress(&[1.0, 2.0, 3.0]).is_err());
        assert!(compress(&[]).is_err());
        assert!(expand(&[1.0], 0.0, 17.0).is_err());
        assert!(check_full(&[0.0; 11]).is_err());
    }

    #[test]
    fn windows_cover_the_full_vector() {
        assert_eq!(STELLAR.end, DUST.start);
        assert_eq!(DUST.end, HI.start);
        assert_eq!(HI.end, FULL_LEN);
    }

    proptest! {
        #[test]
        fn compress_keeps_leading_pair(v in prop::collection::vec(-1e6f64..1e6, MIN_FULL_LEN..40)) {
            let fit = compress(&v).unwrap();
            prop_assert_eq!(fit.len(), v.len() - 2);
            prop_assert_eq!(&fit[0..2], &v[0..2]);
        }

        #[test]
        fn expand_always_pins_tail(f in prop::collection::vec(-1e6f64..1e6, 2..40), z in -5.0f64..5.0) {
            let full = expand(&f, z, DEFAULT_PINNED_TAIL).unwrap();
            prop_assert_eq!(*full.last().unwrap(), 17.0);
        }

        #[test]
        fn compress_then_expand_is_not_a_round_trip(
            v in prop::collection::vec(-1e6f64..1e6, MIN_FULL_LEN..40)
        ) {
            prop_assume!(*v.last().unwrap() != DEFAULT_PINNED_TAIL);
            let full = expand(&compress(&v).unwrap(), v[DROPPED_INTERIOR], DEFAULT_PINNED_TAIL).unwrap();
            prop_assert_eq!(full.len(), v.len());
            prop_assert_ne!(full.last(), v.last());
        }
    }
}
