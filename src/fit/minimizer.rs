//! Deterministic local minimization of `-ln p` with Nelder–Mead.
//!
//! Uncertainties come from the inverse of a finite-difference Hessian of the
//! cost at the optimum.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::fit::objective::SedProblem;
use crate::math::{covariance_from_hessian, numerical_hessian, sigmas};
use crate::params::ParamSet;

/// Default iteration cap.
pub const DEFAULT_MAX_ITER: u64 = 10_000;

/// Simplex standard-deviation tolerance.
const SD_TOLERANCE: f64 = 1e-10;

/// Minimizer outcome.
#[derive(Debug, Clone)]
pub struct MinimizerResult {
    /// Base set with the best free values and their uncertainties written in.
    pub params: ParamSet,
    pub cost: f64,
    pub iterations: u64,
    pub converged: bool,
    pub message: String,
}

struct NegLnProb<'p, 'a> {
    problem: &'p SedProblem<'a>,
}

impl CostFunction for NegLnProb<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(self.problem.cost(p))
    }
}

/// Relative simplex / finite-difference step for one coordinate.
fn step_for(value: f64, bounds: (f64, f64)) -> f64 {
    let span = (bounds.1 - bounds.0).abs();
    let s = 0.05 * value.abs().max(0.1);
    if span.is_finite() && span > 0.0 { s.min(0.1 * span) } else { s }
}

/// Initial simplex: `x0` plus one vertex per coordinate, stepping inward
/// when the forward step would leave the bounds.
fn initial_simplex(x0: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let mut simplex = vec![x0.to_vec()];
    for (i, (&x, &b)) in x0.iter().zip(bounds).enumerate() {
        let step = step_for(x, b);
        let mut v = x0.to_vec();
        v[i] = if x + step <= b.1 { x + step } else { x - step };
        simplex.push(v);
    }
    simplex
}

/// Minimize `-ln p` over the free parameters of `problem`, starting at its base set.
pub fn minimize(problem: &SedProblem<'_>, max_iter: u64) -> Result<MinimizerResult, AppError> {
    let base = problem.base();
    let x0 = base.free_values();
    if x0.is_empty() {
        return Err(AppError::new(2, "No free parameters to fit."));
    }
    let bounds: Vec<(f64, f64)> = base.free_ids().iter().map(|&id| base.get(id).bounds).collect();

    let start_cost = problem.cost(&x0);
    if !start_cost.is_finite() {
        return Err(AppError::new(
            4,
            "Starting parameters give a non-finite cost; check the initial values against the bounds.",
        ));
    }
    info!(n_free = x0.len(), start_cost, max_iter, "starting Nelder-Mead");

    let solver = NelderMead::new(initial_simplex(&x0, &bounds))
        .with_sd_tolerance(SD_TOLERANCE)
        .map_err(|e| AppError::new(4, format!("Invalid minimizer setup: {e}")))?;
    let res = Executor::new(NegLnProb { problem }, solver)
        .configure(|state| state.max_iters(max_iter))
        .run()
        .map_err(|e| AppError::new(4, format!("Minimizer failed: {e}")))?;

    let state = res.state();
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| AppError::new(4, "Minimizer returned no parameters."))?;
    let cost = state.get_best_cost();
    let iterations = state.get_iter();
    let (converged, message) = match state.get_termination_reason() {
        Some(TerminationReason::SolverConverged) => (true, "Optimization terminated successfully.".to_string()),
        Some(TerminationReason::MaxItersReached) => (
            false,
            format!("Maximum number of iterations ({max_iter}) has been exceeded."),
        ),
        Some(other) => (false, format!("Terminated: {other:?}")),
        None => (false, "Terminated without a reason.".to_string()),
    };
    if converged {
        info!(iterations, cost, "minimizer converged");
    } else {
        warn!(iterations, cost, %message, "minimizer did not converge");
    }

    let steps: Vec<f64> = best
        .iter()
        .zip(&bounds)
        .map(|(&x, &b)| 0.1 * step_for(x, b))
        .collect();
    let hessian = numerical_hessian(|x| problem.cost(x), &best, &steps);
    let uncs = match covariance_from_hessian(&hessian) {
        Some(cov) => sigmas(&cov),
        None => {
            warn!("Hessian not invertible; minimizer uncertainties set to zero");
            vec![0.0; best.len()]
        }
    };
    debug!(?best, ?uncs, "minimizer result");

    let mut params = base.clone();
    params.set_free_values(&best, Some(&uncs))?;

    Ok(MinimizerResult {
        params,
        cost,
        iterations,
        converged,
        message,
    })
}
