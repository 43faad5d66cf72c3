//! Reporting utilities: residuals, fit statistics and formatted terminal output.

pub mod format;

pub use format::*;

use std::collections::BTreeMap;

use crate::domain::{ChannelFluxes, StarData};
use crate::fit::ChannelWeights;

/// Goodness of fit over the weighted points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitStats {
    pub chi2: f64,
    pub n_points: usize,
    pub n_free: usize,
}

impl FitStats {
    /// `chi2 / (n - k)`, `NaN` without degrees of freedom.
    pub fn reduced_chi2(&self) -> f64 {
        let dof = self.n_points.saturating_sub(self.n_free);
        if dof == 0 { f64::NAN } else { self.chi2 / dof as f64 }
    }
}

/// Percent residuals `100 (obs - s·model) / (s·model)` per channel.
///
/// Points without a positive finite model or a finite observation are `NaN`.
pub fn percent_residuals(star: &StarData, model: &ChannelFluxes, norm: f64) -> BTreeMap<String, Vec<f64>> {
    star.channels
        .iter()
        .filter_map(|(name, spec)| {
            let m = model.get(name)?;
            let r = spec
                .fluxes
                .iter()
                .zip(m)
                .map(|(&o, &m)| {
                    let sm = norm * m;
                    if o.is_finite() && sm.is_finite() && sm > 0.0 {
                        100.0 * (o - sm) / sm
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            Some((name.clone(), r))
        })
        .collect()
}

/// Weighted chi-square of the normalized model.
pub fn fit_stats(
    star: &StarData,
    model: &ChannelFluxes,
    norm: f64,
    weights: &ChannelWeights,
    n_free: usize,
) -> FitStats {
    let mut chi2 = 0.0;
    let mut n_points = 0;
    for (name, spec) in &star.channels {
        let (Some(m), Some(w)) = (model.get(name), weights.get(name)) else {
            continue;
        };
        for ((&o, &m), &w) in spec.fluxes.iter().zip(m).zip(w) {
            if w > 0.0 && m.is_finite() {
                chi2 += ((o - norm * m) * w).powi(2);
                n_points += 1;
            }
        }
    }
    FitStats {
        chi2,
        n_points,
        n_free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Spectrum;

    fn star() -> StarData {
        let mut star = StarData::default();
        star.channels.insert(
            "BAND".to_string(),
            Spectrum {
                waves: vec![0.44, 0.55, 0.66],
                fluxes: vec![2.2, 1.8, f64::NAN],
                uncs: vec![0.1, 0.1, 0.1],
                npts: vec![1.0; 3],
            },
        );
        star
    }

    #[test]
    fn residuals_are_percent_of_scaled_model() {
        let model = ChannelFluxes::from([("BAND".to_string(), vec![1.0, 1.0, 1.0])]);
        let r = percent_residuals(&star(), &model, 2.0);
        assert!((r["BAND"][0] - 10.0).abs() < 1e-9);
        assert!((r["BAND"][1] + 10.0).abs() < 1e-9);
        assert!(r["BAND"][2].is_nan());
    }

    #[test]
    fn chi2_counts_weighted_points_only() {
        let model = ChannelFluxes::from([("BAND".to_string(), vec![1.0, 1.0, 1.0])]);
        let weights = ChannelWeights::from([("BAND".to_string(), vec![10.0, 10.0, 0.0])]);
        let s = fit_stats(&star(), &model, 2.0, &weights, 1);
        assert_eq!(s.n_points, 2);
        assert!((s.chi2 - 8.0).abs() < 1e-9);
        assert!((s.reduced_chi2() - 8.0).abs() < 1e-9);
    }
}
