//! Scalar flux normalization between observed data and a model.
//!
//! Model grids are in arbitrary flux units, so every comparison first scales
//! the model by one number. Three flavours exist:
//!
//! - [`average_ratio`]: plain ratio of means over one reference channel
//! - [`masked_ratio`]: the same, ignoring points where the model has no flux
//! - [`weighted_ratio`]: per-channel mean ratio over usable points, combined
//!   across channels weighted by point count (the one used in the objective)

use crate::domain::{CHANNEL_BAND, ChannelFluxes, StarData};
use crate::fit::weights::ChannelWeights;

/// Observed, model and weight arrays of one channel.
#[derive(Debug, Clone, Copy)]
pub struct RatioChannel<'a> {
    pub obs: &'a [f64],
    pub model: &'a [f64],
    pub weights: &'a [f64],
}

/// `mean(obs) / mean(model)`.
///
/// `None` for empty input or a non-finite result.
pub fn average_ratio(obs: &[f64], model: &[f64]) -> Option<f64> {
    if obs.is_empty() || model.is_empty() {
        return None;
    }
    let mo = obs.iter().sum::<f64>() / obs.len() as f64;
    let mm = model.iter().sum::<f64>() / model.len() as f64;
    let r = mo / mm;
    r.is_finite().then_some(r)
}

/// `mean(obs) / mean(model)` over points with `model > 0` and both values finite.
pub fn masked_ratio(obs: &[f64], model: &[f64]) -> Option<f64> {
    let (o, m): (Vec<f64>, Vec<f64>) = obs
        .iter()
        .zip(model)
        .filter(|(o, m)| o.is_finite() && m.is_finite() && **m > 0.0)
        .map(|(o, m)| (*o, *m))
        .unzip();
    average_ratio(&o, &m)
}

/// Point-count weighted mean of per-channel mean ratios.
///
/// Within a channel, points are kept if their weight is positive, the observed
/// value is finite and the model value is finite and non-zero. A channel with
/// no kept points contributes nothing. `None` when no channel contributes.
pub fn weighted_ratio<'a, I>(channels: I) -> Option<f64>
where
    I: IntoIterator<Item = RatioChannel<'a>>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for ch in channels {
        let (sum, n) = ch
            .obs
            .iter()
            .zip(ch.model)
            .zip(ch.weights)
            .filter(|((o, m), w)| **w > 0.0 && o.is_finite() && m.is_finite() && **m != 0.0)
            .fold((0.0, 0usize), |(s, n), ((o, m), _)| (s + o / m, n + 1));
        if n > 0 {
            // n * mean == sum
            total += sum;
            count += n;
        }
    }
    if count == 0 {
        return None;
    }
    let r = total / count as f64;
    r.is_finite().then_some(r)
}

/// [`weighted_ratio`] over every observed channel of `star`.
pub fn star_norm(star: &StarData, model: &ChannelFluxes, weights: &ChannelWeights) -> Option<f64> {
    weighted_ratio(star.channels.iter().filter_map(|(name, spec)| {
        Some(RatioChannel {
            obs: &spec.fluxes,
            model: model.get(name)?,
            weights: weights.get(name)?,
        })
    }))
}

/// Quick-look scale from the broadband points alone ([`masked_ratio`] over `BAND`).
pub fn band_ratio(star: &StarData, model: &ChannelFluxes) -> Option<f64> {
    masked_ratio(&star.channel(CHANNEL_BAND)?.fluxes, model.get(CHANNEL_BAND)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_ratio_weights_channels_by_point_count() {
        let obs_a = vec![2.0; 10];
        let model_a = vec![1.0; 10];
        let w_a = vec![1.0; 10];
        let obs_b = vec![100.0];
        let model_b = vec![1.0];
        let w_b = vec![1.0];
        let r = weighted_ratio([
            RatioChannel {
                obs: &obs_a,
                model: &model_a,
                weights: &w_a,
            },
            RatioChannel {
                obs: &obs_b,
                model: &model_b,
                weights: &w_b,
            },
        ])
        .unwrap();
        assert!((r - 120.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn empty_channels_are_excluded() {
        let obs = vec![4.0, 6.0];
        let model = vec![2.0, 2.0];
        let w = vec![1.0, 1.0];
        let dead_w = vec![0.0, 0.0];
        let nan_model = vec![f64::NAN, 0.0];
        let r = weighted_ratio([
            RatioChannel {
                obs: &obs,
                model: &model,
                weights: &w,
            },
            RatioChannel {
                obs: &obs,
                model: &model,
                weights: &dead_w,
            },
            RatioChannel {
                obs: &obs,
                model: &nan_model,
                weights: &w,
            },
        ])
        .unwrap();
        assert!((r - 2.5).abs() < 1e-12);

        assert_eq!(
            weighted_ratio([RatioChannel {
                obs: &obs,
                model: &nan_model,
                weights: &w,
            }]),
            None
        );
    }

    #[test]
    fn plain_and_masked_ratios() {
        let obs = [2.0, 4.0, f64::NAN];
        let model = [1.0, 1.0, 0.0];
        assert_eq!(average_ratio(&obs[..2], &model[..2]), Some(3.0));
        assert_eq!(average_ratio(&obs, &model), None);
        assert_eq!(masked_ratio(&obs, &model), Some(3.0));
        assert_eq!(average_ratio(&[], &[]), None);
    }

    #[test]
    fn band_ratio_needs_broadband_points() {
        let mut star = StarData::default();
        assert_eq!(band_ratio(&star, &ChannelFluxes::new()), None);
        star.channels.insert(
            CHANNEL_BAND.to_string(),
            crate::domain::Spectrum {
                waves: vec![0.44, 0.55],
                fluxes: vec![4.0, 2.0],
                uncs: vec![0.1; 2],
                npts: vec![1.0; 2],
            },
        );
        let model = ChannelFluxes::from([(CHANNEL_BAND.to_string(), vec![2.0, 1.0])]);
        assert_eq!(band_ratio(&star, &model), Some(2.0));
    }
}
