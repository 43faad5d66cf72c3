//! Formatted terminal output: parameter tables and run summaries.
//!
//! We keep formatting code in one place so the fitting code stays clean and
//! output changes are localized.

use std::time::Duration;

use crate::data::ModelGrid;
use crate::domain::StarData;
use crate::fit::{MinimizerResult, SamplerResult};
use crate::params::ParamSet;
use crate::report::FitStats;

/// Parameter table: name, value, uncertainty, fixed flag and prior.
pub fn format_param_table(title: &str, params: &ParamSet) -> String {
    let mut out = String::new();
    out.push_str(&format!("{title}:\n"));
    out.push_str(format!("{:<10} {:>14} {:>12} {:>6} {:<20}", "name", "value", "unc", "fixed", "prior").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<14} {:-<12} {:-<6} {:-<20}", "", "", "", "", "").trim_end());
    out.push('\n');

    for (id, p) in params.iter() {
        let prior = p
            .prior
            .map(|(m, s)| format!("N({m:.4}, {s:.4})"))
            .unwrap_or_default();
        out.push_str(
            format!(
                "{:<10} {:>14} {:>12} {:>6} {:<20}",
                id.name(),
                fmt_num(p.value),
                if p.fixed { String::new() } else { fmt_num(p.unc) },
                if p.fixed { "yes" } else { "" },
                prior,
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Header block describing the star and the model grid.
pub fn format_star_summary(star: &StarData, grid: &ModelGrid) -> String {
    let mut out = String::new();
    out.push_str("=== extfit - SED extinction fit ===\n");
    out.push_str(&format!(
        "Star: {} ({})\n",
        star.name,
        star.sptype.as_deref().unwrap_or("unknown type")
    ));
    for (name, spec) in &star.channels {
        let (lo, hi) = spec
            .waves
            .first()
            .zip(spec.waves.last())
            .map(|(a, b)| (*a, *b))
            .unwrap_or((f64::NAN, f64::NAN));
        out.push_str(&format!("  {name:<12} n={:<6} λ=[{lo:.4}, {hi:.4}] µm\n", spec.len()));
    }
    let b = grid.bounds();
    out.push_str(&format!(
        "Grid: {} models | logTeff=[{:.3}, {:.3}] logg=[{:.2}, {:.2}] logZ=[{:.2}, {:.2}]\n",
        grid.points.len(),
        b.log_teff.0,
        b.log_teff.1,
        b.log_g.0,
        b.log_g.1,
        b.log_z.0,
        b.log_z.1
    ));
    out
}

/// Minimizer status line plus the parameter table.
pub fn format_minimizer(result: &MinimizerResult, stats: &FitStats, elapsed: Duration) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nMinimizer: {} ({} iterations, {:.1}s)\n",
        result.message,
        result.iterations,
        elapsed.as_secs_f64()
    ));
    out.push_str(&format!(
        "-ln p={:.4} chi2={:.3} n={} reduced chi2={:.3}\n\n",
        result.cost,
        stats.chi2,
        stats.n_points,
        stats.reduced_chi2()
    ));
    out.push_str(&format_param_table("Best fit (minimizer)", &result.params));
    out
}

/// Sampler summary plus the percentile parameter table.
pub fn format_sampler(result: &SamplerResult, burnfrac: f64, elapsed: Duration) -> String {
    let chain = &result.chain;
    let mut out = String::new();
    out.push_str(&format!(
        "\nMCMC: {} walkers x {} steps, burn-in {:.0}% ({:.1}s)\n\n",
        chain.nwalkers,
        chain.nsteps,
        100.0 * burnfrac,
        elapsed.as_secs_f64()
    ));
    out.push_str(&format_param_table("Posterior p50 (MCMC)", &result.params));
    out
}

/// Short one-line-per-parameter annotation used on figures.
pub fn param_annotation(params: &ParamSet) -> Vec<String> {
    params
        .iter()
        .filter(|(_, p)| !p.fixed)
        .map(|(id, p)| format!("{} = {} ± {}", id.name(), fmt_num(p.value), fmt_num(p.unc)))
        .collect()
}

fn fmt_num(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 {
        "0".to_string()
    } else if !(1e-3..1e5).contains(&a) {
        format!("{v:.3e}")
    } else {
        format!("{v:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamId, StellarBounds};

    fn params() -> ParamSet {
        let mut p = ParamSet::new(
            StellarBounds {
                log_teff: (4.4, 4.6),
                log_g: (7.5, 8.5),
                log_z: (0.0, 0.0),
            },
            17.0,
        );
        p.get_mut(ParamId::Av).unc = 0.05;
        p.get_mut(ParamId::LogTeff).prior = Some((4.5, 0.01));
        p
    }

    #[test]
    fn table_lists_every_parameter() {
        let table = format_param_table("Start", &params());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3 + 16);
        assert!(lines.iter().any(|l| l.starts_with("Av") && l.contains("0.0500")));
        assert!(lines.iter().any(|l| l.starts_with("logTeff") && l.contains("N(4.5000, 0.0100)")));
        assert!(lines.iter().any(|l| l.starts_with("logHI_MW") && l.contains("yes")));
    }

    #[test]
    fn annotation_skips_fixed_parameters() {
        let ann = param_annotation(&params());
        assert!(ann.iter().any(|l| l.starts_with("Av = 0.5000 ± 0.0500")));
        assert!(!ann.iter().any(|l| l.starts_with("logZ")));
    }

    #[test]
    fn numbers_switch_to_scientific_outside_range() {
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(3.1), "3.1000");
        assert_eq!(fmt_num(1.2e20), "1.200e20");
    }
}
