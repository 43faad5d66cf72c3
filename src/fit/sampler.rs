//! Ensemble MCMC sampling of the posterior around the minimizer result.
//!
//! Walkers start in a small Gaussian ball around the best-fit point (seeded,
//! clamped inside the bounds) and are advanced with the affine-invariant
//! ensemble sampler from `emcee`. After discarding a burn-in fraction, the
//! 16th/50th/84th percentiles of each parameter give its value and a symmetric
//! uncertainty.

use emcee::{EnsembleSampler, Guess, Prob};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use crate::domain::McmcChain;
use crate::error::AppError;
use crate::fit::objective::SedProblem;
use crate::math::p50_with_unc;
use crate::params::{ParamId, ParamSet};

/// A(V) below this is bumped before sampling so walkers are not stuck at the bound.
pub const MIN_START_AV: f64 = 1e-3;
const BUMPED_AV: f64 = 0.1;

/// Sampler settings.
#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub nsteps: usize,
    pub nwalkers: Option<usize>,
    pub burnfrac: f64,
    pub seed: u64,
}

/// Sampler outcome.
#[derive(Debug, Clone)]
pub struct SamplerResult {
    /// Base set with percentile values and uncertainties of the free parameters.
    pub params: ParamSet,
    pub chain: McmcChain,
}

struct Posterior<'p, 'a> {
    problem: &'p SedProblem<'a>,
}

impl Posterior<'_, '_> {
    fn params(&self, guess: &Guess) -> Option<ParamSet> {
        let free: Vec<f64> = guess.values.iter().map(|&v| f64::from(v)).collect();
        self.problem.params_at(&free).ok()
    }
}

impl Prob for Posterior<'_, '_> {
    fn lnlike(&self, params: &Guess) -> f32 {
        match self.params(params) {
            Some(p) => self.problem.ln_like(&p) as f32,
            None => f32::NEG_INFINITY,
        }
    }

    fn lnprior(&self, params: &Guess) -> f32 {
        match self.params(params) {
            Some(p) => p.ln_prior() as f32,
            None => f32::NEG_INFINITY,
        }
    }
}

/// Smallest valid ensemble for `ndim` dimensions, or the requested size
/// raised to the nearest valid one.
pub fn walker_count(ndim: usize, requested: Option<usize>) -> usize {
    let min = 2 * ndim.max(1);
    let n = requested.unwrap_or(min).max(min);
    n + n % 2
}

/// Gaussian ball of walkers around `center`, clamped inside `bounds`.
pub fn initial_walkers(
    center: &[f64],
    scales: &[f64],
    bounds: &[(f64, f64)],
    nwalkers: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>, AppError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let unit = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Walker distribution error: {e}")))?;

    let walkers = (0..nwalkers)
        .map(|_| {
            center
                .iter()
                .zip(scales)
                .zip(bounds)
                .map(|((&c, &s), &(lo, hi))| {
                    let v = c + s * unit.sample(&mut rng);
                    // Keep a sliver away from hard bounds so ln_prior stays finite.
                    let pad = 1e-6 * (hi - lo).abs();
                    v.clamp(lo + pad, hi - pad)
                })
                .collect()
        })
        .collect();
    Ok(walkers)
}

/// Run the ensemble sampler starting at the problem's base set.
pub fn sample(problem: &SedProblem<'_>, opts: &SamplerOptions) -> Result<SamplerResult, AppError> {
    let mut base = problem.base().clone();
    if base.value(ParamId::Av) < MIN_START_AV {
        info!(av = base.value(ParamId::Av), "A(V) too small to start sampling, using 0.1");
        base.set_value(ParamId::Av, BUMPED_AV);
    }

    let ids = base.free_ids();
    let ndim = ids.len();
    if ndim == 0 {
        return Err(AppError::new(2, "No free parameters to sample."));
    }
    if opts.nsteps == 0 {
        return Err(AppError::new(2, "MCMC needs at least one step."));
    }
    let nwalkers = walker_count(ndim, opts.nwalkers);
    if opts.nwalkers.is_some_and(|n| n != nwalkers) {
        warn!(requested = ?opts.nwalkers, used = nwalkers, "walker count raised to a valid ensemble size");
    }

    let center = base.free_values();
    let bounds: Vec<(f64, f64)> = ids.iter().map(|&id| base.get(id).bounds).collect();
    let scales: Vec<f64> = ids
        .iter()
        .zip(&center)
        .map(|(&id, &c)| {
            let unc = base.get(id).unc;
            let s = if unc.is_finite() && unc > 0.0 { 0.1 * unc } else { 1e-3 * c.abs() };
            s.max(1e-5)
        })
        .collect();
    let start = initial_walkers(&center, &scales, &bounds, nwalkers, opts.seed)?;
    let p0: Vec<Guess> = start
        .iter()
        .map(|w| Guess::new(&w.iter().map(|&v| v as f32).collect::<Vec<f32>>()))
        .collect();

    let mut problem = problem.clone();
    problem.set_base(base.clone());
    let posterior = Posterior { problem: &problem };

    info!(ndim, nwalkers, nsteps = opts.nsteps, "starting ensemble sampler");
    let mut sampler = EnsembleSampler::new(nwalkers, ndim, &posterior)
        .map_err(|e| AppError::new(4, format!("Failed to create sampler: {e}")))?;

    let mut samples: Vec<Vec<f64>> = Vec::with_capacity(nwalkers * opts.nsteps);
    sampler
        .sample(&p0, opts.nsteps, |step| {
            for g in step.pos.iter() {
                samples.push(g.values.iter().map(|&v| f64::from(v)).collect());
            }
        })
        .map_err(|e| AppError::new(4, format!("Sampler failed: {e}")))?;

    let chain = McmcChain {
        names: ids.iter().map(|id| id.name().to_string()).collect(),
        nwalkers,
        nsteps: samples.len() / nwalkers,
        samples,
    };
    let params = summarize_chain(&base, &chain, opts.burnfrac)?;
    Ok(SamplerResult { params, chain })
}

/// Write percentile values and uncertainties of the chain columns into `base`.
///
/// Chain columns are matched to parameters by name.
pub fn summarize_chain(base: &ParamSet, chain: &McmcChain, burnfrac: f64) -> Result<ParamSet, AppError> {
    if chain.burn_steps(burnfrac) >= chain.nsteps {
        return Err(AppError::new(
            2,
            format!("Burn-in fraction {burnfrac} leaves no samples of {} steps.", chain.nsteps),
        ));
    }
    let mut params = base.clone();
    for (i, name) in chain.names.iter().enumerate() {
        let id = ParamId::from_name(name)
            .ok_or_else(|| AppError::new(2, format!("Unknown parameter '{name}' in chain.")))?;
        let (value, unc) = p50_with_unc(&chain.column(i, burnfrac));
        let p = params.get_mut(id);
        p.value = value;
        p.unc = unc;
    }
    info!(burnfrac, kept_steps = chain.nsteps - chain.burn_steps(burnfrac), "chain summarized");
    Ok(params)
}
