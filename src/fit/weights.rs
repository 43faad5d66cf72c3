//! Per-point fit weights.

use std::collections::BTreeMap;

use crate::data::ModelGrid;
use crate::domain::StarData;

/// Weights keyed by channel name, aligned with the channel arrays.
pub type ChannelWeights = BTreeMap<String, Vec<f64>>;

/// Weights `1/unc` for usable points, zero elsewhere.
///
/// A point is unusable if its uncertainty is not positive, it has no data
/// (`npts == 0`), its flux is not finite, it falls inside one of the
/// `exclude` wavenumber ranges (1/micron), or any grid model has no flux there.
pub fn fit_weights(star: &StarData, grid: Option<&ModelGrid>, exclude: &[(f64, f64)]) -> ChannelWeights {
    star.channels
        .iter()
        .map(|(name, spec)| {
            let nodes = grid.and_then(|g| g.fluxes.get(name));
            let weights = (0..spec.len())
                .map(|i| {
                    let (wave, flux, unc, npts) = (spec.waves[i], spec.fluxes[i], spec.uncs[i], spec.npts[i]);
                    let usable = unc > 0.0 && npts > 0.0 && flux.is_finite();
                    let x = 1.0 / wave;
                    let excluded = exclude.iter().any(|&(lo, hi)| x >= lo && x <= hi);
                    let uncovered = nodes.is_some_and(|per_model| per_model.iter().any(|m| !m.get(i).is_some_and(|f| *f > 0.0)));
                    if usable && !excluded && !uncovered { 1.0 / unc } else { 0.0 }
                })
                .collect();
            (name.clone(), weights)
        })
        .collect()
}

/// Number of points with non-zero weight.
pub fn n_weighted(weights: &ChannelWeights) -> usize {
    weights.values().flatten().filter(|w| **w > 0.0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Spectrum;

    fn star() -> StarData {
        let mut star = StarData::default();
        star.channels.insert(
            "STIS".to_string(),
            Spectrum {
                // 1/0.1215 = 8.23 sits in the Lyman-alpha exclusion.
                waves: vec![0.1215, 0.15, 0.2, 0.3, 0.4],
                fluxes: vec![1.0, 1.0, f64::NAN, 1.0, 1.0],
                uncs: vec![0.1, 0.1, 0.1, 0.0, 0.5],
                npts: vec![1.0, 1.0, 1.0, 1.0, 0.0],
            },
        );
        star
    }

    #[test]
    fn masks_bad_points_and_exclusions() {
        let w = fit_weights(&star(), None, &crate::domain::default_exclude_regions());
        assert_eq!(w["STIS"], vec![0.0, 10.0, 0.0, 0.0, 0.0]);
        assert_eq!(n_weighted(&w), 1);
    }

    #[test]
    fn no_exclusions_keeps_lyman_alpha() {
        let w = fit_weights(&star(), None, &[]);
        assert_eq!(w["STIS"][0], 10.0);
    }
}
