//! Log-probability of the model given the data.
//!
//! `ln p(θ) = ln L(θ) + ln π(θ)` with a Gaussian likelihood on the weighted
//! residuals of the normalized model:
//!
//! ```text
//! ln L = -0.5 Σ ((F_obs - s·F_mod) · w)²,   s = weighted_ratio(F_obs, F_mod)
//! ```
//!
//! The optimizer works on the vector of free parameters only; fixed values
//! come from the base parameter set.

use crate::data::ModelGrid;
use crate::domain::StarData;
use crate::error::AppError;
use crate::fit::norm::star_norm;
use crate::fit::weights::{ChannelWeights, fit_weights, n_weighted};
use crate::models::{SedStages, WindParams, synthesize};
use crate::params::{ParamId, ParamSet};

/// Everything needed to evaluate the model against one star.
#[derive(Debug, Clone)]
pub struct SedProblem<'a> {
    pub grid: &'a ModelGrid,
    pub star: &'a StarData,
    pub weights: ChannelWeights,
    base: ParamSet,
}

impl<'a> SedProblem<'a> {
    /// Check that the grid matches the star and build the weights.
    pub fn new(
        grid: &'a ModelGrid,
        star: &'a StarData,
        base: ParamSet,
        exclude: &[(f64, f64)],
    ) -> Result<Self, AppError> {
        grid.ensure_covers(&star.channel_waves())?;
        let weights = fit_weights(star, Some(grid), exclude);
        if n_weighted(&weights) == 0 {
            return Err(AppError::new(3, format!("No usable data points for '{}'.", star.name)));
        }
        Ok(Self {
            grid,
            star,
            weights,
            base,
        })
    }

    pub fn base(&self) -> &ParamSet {
        &self.base
    }

    /// Replace the parameter set that supplies fixed values.
    pub fn set_base(&mut self, base: ParamSet) {
        self.base = base;
    }

    pub fn n_free(&self) -> usize {
        self.base.free_indices().len()
    }

    /// The base set with its free parameters replaced by `free`.
    pub fn params_at(&self, free: &[f64]) -> Result<ParamSet, AppError> {
        let mut p = self.base.clone();
        p.set_free_values(free, None)?;
        Ok(p)
    }

    /// All SED stages for a parameter set.
    pub fn model(&self, params: &ParamSet) -> Result<SedStages, AppError> {
        let wind = params.wind_enabled().then(|| WindParams {
            amp: params.value(ParamId::WindAmp),
            alpha: params.value(ParamId::WindAlpha),
        });
        synthesize(
            self.grid,
            &params.full_vector(),
            params.value(ParamId::Velocity),
            params.value(ParamId::VelMw),
            wind,
        )
    }

    /// Normalization of a model to the data.
    pub fn norm(&self, stages: &SedStages) -> Option<f64> {
        star_norm(self.star, &stages.full, &self.weights)
    }

    /// Gaussian log-likelihood of a parameter set.
    pub fn ln_like(&self, params: &ParamSet) -> f64 {
        let Ok(stages) = self.model(params) else {
            return f64::NEG_INFINITY;
        };
        let Some(norm) = self.norm(&stages) else {
            return f64::NEG_INFINITY;
        };

        let mut chi2 = 0.0;
        for (name, spec) in &self.star.channels {
            let (Some(model), Some(weights)) = (stages.full.get(name), self.weights.get(name)) else {
                continue;
            };
            for ((&obs, &m), &w) in spec.fluxes.iter().zip(model).zip(weights) {
                if w > 0.0 && m.is_finite() {
                    let r = (obs - norm * m) * w;
                    chi2 += r * r;
                }
            }
        }
        -0.5 * chi2
    }

    /// `ln L + ln π` at a free-parameter vector; `-inf` outside the bounds.
    pub fn ln_prob(&self, free: &[f64]) -> f64 {
        let Ok(params) = self.params_at(free) else {
            return f64::NEG_INFINITY;
        };
        let lp = params.ln_prior();
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        let lnp = lp + self.ln_like(&params);
        if lnp.is_nan() { f64::NEG_INFINITY } else { lnp }
    }

    /// Minimization target `-ln p`; never NaN.
    pub fn cost(&self, free: &[f64]) -> f64 {
        let c = -self.ln_prob(free);
        if c.is_finite() { c } else { f64::INFINITY }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::grid::tests::toy_grid;
    use crate::domain::Spectrum;
    use crate::math::logspace;
    use crate::params::StellarBounds;

    fn truth_params(grid: &ModelGrid) -> ParamSet {
        let b = grid.bounds();
        let mut p = ParamSet::new(
            StellarBounds {
                log_teff: b.log_teff,
                log_g: b.log_g,
                log_z: b.log_z,
            },
            17.0,
        );
        p.set_value(ParamId::LogTeff, 4.5);
        p.set_value(ParamId::LogG, 8.0);
        p.set_value(ParamId::Av, 0.8);
        p.set_value(ParamId::LogHI, 20.0);
        for id in ParamId::ALL {
            if !matches!(id, ParamId::Av | ParamId::Rv) {
                p.get_mut(id).fixed = true;
            }
        }
        p
    }

    pub(crate) fn setup() -> (ModelGrid, StarData, ParamSet) {
        let channels = BTreeMap::from([
            ("BAND".to_string(), vec![0.44, 0.55, 0.8, 1.6]),
            ("STIS".to_string(), logspace(0.13, 1.0, 120)),
        ]);
        let grid = toy_grid(&channels);
        let params = truth_params(&grid);
        let stages = synthesize(&grid, &params.full_vector(), 0.0, 0.0, None).unwrap();

        let mut star = StarData::default();
        for (name, waves) in channels {
            let fluxes: Vec<f64> = stages.full[&name].iter().map(|f| 3.0 * f).collect();
            let uncs = fluxes.iter().map(|f| 0.01 * f).collect();
            let n = waves.len();
            star.channels.insert(
                name,
                Spectrum {
                    waves,
                    fluxes,
                    uncs,
                    npts: vec![1.0; n],
                },
            );
        }
        (grid, star, params)
    }

    #[test]
    fn truth_has_zero_chi2_and_recovers_the_scale() {
        let (grid, star, params) = setup();
        let problem = SedProblem::new(&grid, &star, params.clone(), &[]).unwrap();
        let stages = problem.model(&params).unwrap();
        assert!((problem.norm(&stages).unwrap() - 3.0).abs() < 1e-9);
        assert!(problem.ln_like(&params).abs() < 1e-9);
        assert_eq!(problem.n_free(), 2);
    }

    #[test]
    fn cost_grows_away_from_truth_and_is_infinite_out_of_bounds() {
        let (grid, star, params) = setup();
        let problem = SedProblem::new(&grid, &star, params, &[]).unwrap();
        let at_truth = problem.cost(&[0.8, 3.1]);
        let off = problem.cost(&[1.0, 3.1]);
        assert!(off > at_truth);
        assert_eq!(problem.cost(&[-1.0, 3.1]), f64::INFINITY);
        assert_eq!(problem.cost(&[0.8]), f64::INFINITY);
    }

    #[test]
    fn star_without_usable_points_is_rejected() {
        let (grid, mut star, params) = setup();
        for spec in star.channels.values_mut() {
            spec.uncs.iter_mut().for_each(|u| *u = 0.0);
        }
        let err = SedProblem::new(&grid, &star, params, &[]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
