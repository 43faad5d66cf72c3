//! Run logic of every subcommand, kept apart from printing.
//!
//! `fit` is the main workflow:
//! star -> model grid -> starting parameters -> minimizer -> (sampler) ->
//! extinction curve -> figures
//!
//! `app` then only formats the returned outputs for the terminal.

use std::collections::BTreeMap;
use std::f64::consts::LN_10;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::data::{ModelGrid, find_model_files, simulate_star, simulated_channels};
use crate::domain::{
    DEFAULT_VELOCITY, ExtCurveFile, FitConfig, GridConfig, ModType, NormPlotConfig, SimulateConfig,
    StackConfig, StarData,
};
use crate::error::AppError;
use crate::fit::{
    MinimizerResult, SamplerOptions, SamplerResult, SedProblem, band_ratio, minimize, sample, summarize_chain,
};
use crate::io::{
    build_ext_file, calc_elx, dust_columns, load_star, read_chains_csv, read_ext_json, write_chains_csv,
    write_ext_json, write_star_file,
};
use crate::params::layout::DEFAULT_PINNED_TAIL;
use crate::params::{ParamId, ParamSet};
use crate::plot::stack::{StackLayout, stack_order, uv_slope};
use crate::plot::{ChainFigure, FitFigure, FitFigureOptions, NormSpecFigure, StackFigure, render_ascii_sed, render_figure};
use crate::report::{FitStats, fit_stats};

/// Starting A(V) for white dwarf grids.
const WD_AV_INIT: f64 = 0.5;
/// Starting A(V) otherwise.
const DEFAULT_AV_INIT: f64 = 0.2;
/// Gas-to-dust ratio used for the Milky Way HI column, `N(HI) / A(V)`.
const HI_PER_AV: f64 = 1.61e20;
const WIND_AMP_INIT: f64 = 1e-3;

/// Terminal plot size.
pub const ASCII_WIDTH: usize = 100;
pub const ASCII_HEIGHT: usize = 25;

/// All computed outputs of a single `extfit fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub star: StarData,
    pub grid: ModelGrid,
    pub start: ParamSet,
    pub minimizer: MinimizerResult,
    pub min_stats: FitStats,
    pub min_elapsed: Duration,
    pub sampler: Option<(SamplerResult, Duration)>,
    pub curve: ExtCurveFile,
    /// Terminal plot of the final model (`--showfit`).
    pub ascii: Option<String>,
    pub written: Vec<PathBuf>,
}

/// Outputs of `extfit norm-plot`.
#[derive(Debug, Clone)]
pub struct NormPlotRun {
    pub params: ParamSet,
    pub ascii: Option<String>,
    pub written: Vec<PathBuf>,
}

pub fn grid_cache_path(cache_dir: &Path, modstr: &str) -> PathBuf {
    cache_dir.join(format!("{modstr}_modinfo.bin"))
}

pub fn cont_grid_cache_path(cache_dir: &Path, modstr: &str) -> PathBuf {
    cache_dir.join(format!("{modstr}_contmodinfo.bin"))
}

/// Continuum cache next to a regular cache: `modinfo` -> `contmodinfo` in the file name.
pub fn cont_cache_for(path: &Path) -> Result<PathBuf, AppError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| n.contains("modinfo"))
        .ok_or_else(|| {
            AppError::new(2, format!("'{}' is not a model grid cache (no 'modinfo' in the name).", path.display()))
        })?;
    Ok(path.with_file_name(name.replacen("modinfo", "contmodinfo", 1)))
}

fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display())))
}

/// Cached grid with `--picmodel`, otherwise built from the model files and cached.
fn load_grid(config: &FitConfig, star: &StarData) -> Result<ModelGrid, AppError> {
    let cache = grid_cache_path(&config.cache_dir, &config.modstr);
    if config.picmodel {
        return ModelGrid::load_cache(&cache);
    }
    let (files, _) = find_model_files(&config.modpath, &config.modstr)?;
    let grid = ModelGrid::from_files(&files, &star.channel_waves())?;
    ensure_dir(&config.cache_dir)?;
    grid.save_cache(&cache)?;
    Ok(grid)
}

/// Pull a value into `[lo, hi]`, warning when it moves.
fn clamp_to_bounds(params: &mut ParamSet, id: ParamId) {
    let p = params.get_mut(id);
    let v = p.value.clamp(p.bounds.0, p.bounds.1);
    if v != p.value {
        warn!(param = id.name(), value = p.value, bounds = ?p.bounds, "starting value outside the grid, clamped");
        p.value = v;
    }
}

/// Gaussian prior `(mean, sigma)`; `sigma` must be positive and finite.
fn gaussian_prior(key: &str, mean: f64, sigma: f64) -> Result<(f64, f64), AppError> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok((mean, sigma))
    } else {
        Err(AppError::new(2, format!("Metadata '{key}' must give a positive uncertainty, got {sigma}.")))
    }
}

/// Starting parameters from the star metadata and the run options.
pub fn configure_params(star: &StarData, grid: &ModelGrid, config: &FitConfig) -> Result<ParamSet, AppError> {
    let mut params = ParamSet::new(grid.bounds(), DEFAULT_PINNED_TAIL);
    let meta = &star.model_params;

    if let Some(&teff) = meta.get("Teff") {
        let p = params.get_mut(ParamId::LogTeff);
        p.value = teff.log10();
        match meta.get("Teff_unc") {
            Some(&unc) => p.prior = Some(gaussian_prior("Teff_unc", p.value, unc / (teff * LN_10))?),
            None => p.fixed = true,
        }
    }
    if let Some(&logg) = meta.get("logg") {
        let p = params.get_mut(ParamId::LogG);
        p.value = logg;
        match meta.get("logg_unc") {
            Some(&unc) => p.prior = Some(gaussian_prior("logg_unc", logg, unc)?),
            None => p.fixed = true,
        }
    }
    if let Some(&z) = meta.get("Z") {
        let p = params.get_mut(ParamId::LogZ);
        p.value = z.log10();
        p.fixed = true;
    }
    for id in [ParamId::LogTeff, ParamId::LogG, ParamId::LogZ] {
        clamp_to_bounds(&mut params, id);
    }

    let velocity = params.get_mut(ParamId::Velocity);
    match meta.get("velocity") {
        Some(&v) => {
            velocity.value = v;
            velocity.fixed = true;
        }
        None => {
            velocity.value = DEFAULT_VELOCITY;
            velocity.fixed = false;
        }
    }

    let av = config.av_init.unwrap_or(match config.modtype {
        ModType::Whitedwarfs => WD_AV_INIT,
        ModType::Obstars => DEFAULT_AV_INIT,
    });
    params.set_value(ParamId::Av, av);
    clamp_to_bounds(&mut params, ParamId::Av);
    // Foreground column from the gas-to-dust ratio unless given explicitly.
    let log_hi_mw = config
        .pinned_log_hi_mw
        .unwrap_or_else(|| (HI_PER_AV * params.value(ParamId::Av).max(0.01)).log10());
    params.set_pinned_tail(log_hi_mw);
    params.set_value(ParamId::VelMw, config.vel_mw);

    if config.wind {
        params.set_value(ParamId::WindAmp, WIND_AMP_INIT);
        params.get_mut(ParamId::WindAmp).fixed = false;
        params.get_mut(ParamId::WindAlpha).fixed = false;
    }
    Ok(params)
}

/// Execute the full fit of one star.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, AppError> {
    // 1) Observed data.
    let star = load_star(&config.data_path, &config.starname, config.only_bands.as_deref())?;

    // 2) Model grid for the star's channels.
    let grid = load_grid(config, &star)?;

    // 3) Starting point.
    let start = configure_params(&star, &grid, config)?;

    // 4) Minimizer.
    let problem = SedProblem::new(&grid, &star, start.clone(), &config.exclude_regions)?;
    info!(star = %star.name, n_free = problem.n_free(), "starting minimizer");
    let t0 = Instant::now();
    let minimizer = minimize(&problem, config.max_iter)?;
    let min_elapsed = t0.elapsed();

    let stages = problem.model(&minimizer.params)?;
    let norm = problem
        .norm(&stages)
        .ok_or_else(|| AppError::new(3, "Best-fit model has no usable normalization."))?;
    let min_stats = fit_stats(&star, &stages.full, norm, &problem.weights, problem.n_free());

    let figure_opts = FitFigureOptions {
        rayleigh_jeans: config.rayleigh_jeans,
        resid_range: config.resid_range,
        lya_panel: config.lya_panel,
    };
    // Output names use the requested star, not the `name` in its file.
    let outname = format!("{}_mefit", config.starname);
    let mut written = Vec::new();
    let fig = FitFigure::new(
        &star,
        &grid,
        &stages,
        norm,
        &minimizer.params,
        format!("{} (minimizer)", star.name),
        figure_opts,
    );
    written.extend(render_figure(&fig, &config.figs_dir.join(format!("{outname}_minimizer")), &config.formats)?);

    let mut fit_params = BTreeMap::from([("MIN".to_string(), minimizer.params.to_rows())]);
    let mut best = minimizer.params.clone();

    // 5) Sampler.
    let mut sampler = None;
    if config.mcmc {
        let mut sproblem = problem.clone();
        sproblem.set_base(minimizer.params.clone());
        let opts = SamplerOptions {
            nsteps: config.mcmc_nsteps,
            nwalkers: config.mcmc_walkers,
            burnfrac: config.burnfrac,
            seed: config.seed,
        };
        let t0 = Instant::now();
        let result = sample(&sproblem, &opts)?;
        let elapsed = t0.elapsed();

        ensure_dir(&config.exts_dir)?;
        let chains_path = config.exts_dir.join(format!("{outname}_chains.csv"));
        write_chains_csv(&chains_path, &result.chain)?;
        written.push(chains_path);

        let stages = sproblem.model(&result.params)?;
        let norm = sproblem
            .norm(&stages)
            .ok_or_else(|| AppError::new(3, "Posterior model has no usable normalization."))?;
        let fig = FitFigure::new(
            &star,
            &grid,
            &stages,
            norm,
            &result.params,
            format!("{} (MCMC p50)", star.name),
            figure_opts,
        );
        written.extend(render_figure(&fig, &config.figs_dir.join(format!("{outname}_mcmc")), &config.formats)?);
        let chains_fig = ChainFigure::new(format!("{} chains", star.name), &result.chain, config.burnfrac);
        written.extend(render_figure(
            &chains_fig,
            &config.figs_dir.join(format!("{outname}_mcmc_chains")),
            &config.formats,
        )?);

        fit_params.insert("MCMC".to_string(), result.params.to_rows());
        best = result.params.clone();
        sampler = Some((result, elapsed));
    }

    // 6) Extinction curve against the intrinsic stellar model.
    let best_stages = problem.model(&best)?;
    let (rel_band, curves) = calc_elx(&star, &best_stages.stellar, config.rel_band.as_deref())?;
    let curve = build_ext_file(&star, rel_band, curves, dust_columns(&best), fit_params);
    ensure_dir(&config.exts_dir)?;
    let curve_path = config.exts_dir.join(format!("{outname}_ext.json"));
    write_ext_json(&curve_path, &curve)?;
    written.push(curve_path);

    let ascii = if config.showfit {
        let norm = band_ratio(&star, &best_stages.full)
            .or_else(|| problem.norm(&best_stages))
            .unwrap_or(1.0);
        Some(render_ascii_sed(&star, &best_stages.full, norm, ASCII_WIDTH, ASCII_HEIGHT))
    } else {
        None
    };

    Ok(FitRun {
        star,
        grid,
        start,
        minimizer,
        min_stats,
        min_elapsed,
        sampler,
        curve,
        ascii,
        written,
    })
}

/// Re-plot a finished fit with the spectra divided by the continuum model.
pub fn run_norm_plot(config: &NormPlotConfig) -> Result<NormPlotRun, AppError> {
    let star = load_star(&config.obspath, &config.starname, config.only_bands.as_deref())?;
    let grid = ModelGrid::load_cache(&config.picmodname)?;
    let cont_grid = ModelGrid::load_cache(&cont_cache_for(&config.picmodname)?)?;

    let outname = format!("{}_mefit", config.starname);
    let curve = read_ext_json(&config.exts_dir.join(format!("{outname}_ext.json")))?;
    let rows = match curve.fit_params.get("MCMC") {
        Some(rows) => rows,
        None => {
            warn!("curve has no MCMC parameters, using the minimizer result");
            curve
                .fit_params
                .get("MIN")
                .ok_or_else(|| AppError::new(2, "Curve file has no fit parameters."))?
        }
    };
    let mut params = ParamSet::new(grid.bounds(), DEFAULT_PINNED_TAIL);
    params.apply_rows(rows)?;
    let log_hi_mw = config.pinned_log_hi_mw.unwrap_or(params.value(ParamId::LogHIMw));
    params.set_pinned_tail(log_hi_mw);

    let chains_path = config.exts_dir.join(format!("{outname}_chains.csv"));
    if chains_path.exists() {
        let chain = read_chains_csv(&chains_path)?;
        params = summarize_chain(&params, &chain, config.burnfrac)?;
    } else {
        warn!(path = %chains_path.display(), "no chains found, using the saved parameters");
    }

    let problem = SedProblem::new(&grid, &star, params.clone(), &config.exclude_regions)?;
    let stages = problem.model(&params)?;
    let norm = problem
        .norm(&stages)
        .ok_or_else(|| AppError::new(3, "Model has no usable normalization."))?;
    let cont_problem = SedProblem::new(&cont_grid, &star, params.clone(), &config.exclude_regions)?;
    let cont_stages = cont_problem.model(&params)?;

    let mut written = Vec::new();
    let ascii = if config.formats.is_empty() {
        Some(render_ascii_sed(&star, &stages.full, norm, ASCII_WIDTH, ASCII_HEIGHT))
    } else {
        let fig = NormSpecFigure::new(
            &star,
            &stages.full,
            &cont_stages.full,
            norm,
            &problem.weights,
            format!("{} (p50, burnfrac={})", star.name, config.burnfrac),
        );
        written.extend(render_figure(&fig, &config.figs_dir.join(format!("{outname}_norm")), &config.formats)?);
        None
    };

    Ok(NormPlotRun { params, ascii, written })
}

/// Stack the spectra of several stars, ordered by UV slope.
pub fn run_stack(config: &StackConfig) -> Result<Vec<PathBuf>, AppError> {
    let stars: Vec<StarData> = config
        .starnames
        .iter()
        .map(|name| load_star(&config.path, name, None))
        .collect::<Result<_, _>>()?;

    let slopes: Vec<Option<f64>> = stars.iter().map(|s| uv_slope(s, &config.channel)).collect();
    for (star, slope) in stars.iter().zip(&slopes) {
        if slope.is_none() {
            warn!(star = %star.name, channel = %config.channel, "no UV slope, placed last");
        }
    }
    let ordered: Vec<StarData> = stack_order(&slopes).into_iter().map(|i| stars[i].clone()).collect();

    let fig = StackFigure::new("", &ordered, StackLayout::new(config.uv));
    if fig.entries.is_empty() {
        return Err(AppError::new(3, "No star has flux in the normalization window."));
    }
    render_figure(&fig, &config.out, &config.formats)
}

/// Build the regular and continuum grids for a star and cache them.
pub fn run_grid(config: &GridConfig) -> Result<Vec<PathBuf>, AppError> {
    let star = load_star(&config.path, &config.starname, None)?;
    let (regular, cont) = find_model_files(&config.modpath, &config.modstr)?;
    ensure_dir(&config.cache_dir)?;

    let channels = star.channel_waves();
    let mut written = Vec::new();
    let path = grid_cache_path(&config.cache_dir, &config.modstr);
    ModelGrid::from_files(&regular, &channels)?.save_cache(&path)?;
    written.push(path);

    if cont.is_empty() {
        warn!(modstr = %config.modstr, "no continuum models found, skipping the continuum grid");
    } else {
        let path = cont_grid_cache_path(&config.cache_dir, &config.modstr);
        ModelGrid::from_files(&cont, &channels)?.save_cache(&path)?;
        written.push(path);
    }
    Ok(written)
}

/// Write a synthetic star; returns the star file path.
pub fn run_simulate(config: &SimulateConfig) -> Result<PathBuf, AppError> {
    let (files, _) = find_model_files(&config.modpath, &config.modstr)?;
    let grid = ModelGrid::from_files(&files, &simulated_channels())?;
    let star = simulate_star(&grid, config)?;
    ensure_dir(&config.out)?;
    write_star_file(&config.out, &star)
}
