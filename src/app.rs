//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - sets up logging and the thread pool
//! - parses CLI arguments into run configs
//! - runs the pipeline for the chosen subcommand
//! - prints reports/plots

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FitArgs, GridArgs, NormPlotArgs, SimulateArgs, StackArgs};
use crate::domain::{
    DEFAULT_VEL_MW, FitConfig, GridConfig, NormPlotConfig, OutputFormat, SimulateConfig, StackConfig,
    default_exclude_regions,
};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `extfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .map_err(|e| AppError::new(2, format!("Failed to set up the thread pool: {e}")))?;

    match cli.command {
        Command::Fit(args) => handle_fit(&fit_config_from_args(&args, cli.threads)),
        Command::NormPlot(args) => handle_norm_plot(&norm_plot_config_from_args(&args)),
        Command::Stack(args) => handle_stack(&stack_config_from_args(&args)),
        Command::Grid(args) => handle_grid(&grid_config_from_args(&args)),
        Command::Simulate(args) => handle_simulate(&simulate_config_from_args(&args)),
    }
}

fn handle_fit(config: &FitConfig) -> Result<(), AppError> {
    let run = pipeline::run_fit(config)?;

    println!("{}", crate::report::format_star_summary(&run.star, &run.grid));
    println!("{}", crate::report::format_param_table("Starting parameters", &run.start));
    println!(
        "{}",
        crate::report::format_minimizer(&run.minimizer, &run.min_stats, run.min_elapsed)
    );
    if let Some((result, elapsed)) = &run.sampler {
        println!("{}", crate::report::format_sampler(result, config.burnfrac, *elapsed));
    }
    if let Some(plot) = &run.ascii {
        println!("{plot}");
    }
    for path in &run.written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_norm_plot(config: &NormPlotConfig) -> Result<(), AppError> {
    let run = pipeline::run_norm_plot(config)?;
    println!("{}", crate::report::format_param_table("Plotted parameters", &run.params));
    if let Some(plot) = &run.ascii {
        println!("{plot}");
    }
    for path in &run.written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_stack(config: &StackConfig) -> Result<(), AppError> {
    for path in pipeline::run_stack(config)? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_grid(config: &GridConfig) -> Result<(), AppError> {
    for path in pipeline::run_grid(config)? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_simulate(config: &SimulateConfig) -> Result<(), AppError> {
    let path = pipeline::run_simulate(config)?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Figure formats, falling back to SVG when none is requested.
fn formats_or_svg(formats: Vec<OutputFormat>) -> Vec<OutputFormat> {
    if formats.is_empty() { vec![OutputFormat::Svg] } else { formats }
}

pub fn fit_config_from_args(args: &FitArgs, threads: usize) -> FitConfig {
    FitConfig {
        starname: args.starname.clone(),
        data_path: args.path.clone(),
        modtype: args.modtype,
        modpath: args.modpath.clone(),
        modstr: args
            .modstr
            .clone()
            .unwrap_or_else(|| args.modtype.default_modstr().to_string()),
        picmodel: args.picmodel,
        cache_dir: args.cache_dir.clone(),
        only_bands: args.bands.clone(),

        wind: args.wind,
        av_init: args.av_init,
        pinned_log_hi_mw: args.pinned_log_hi_mw,
        vel_mw: DEFAULT_VEL_MW,
        exclude_regions: default_exclude_regions(),

        max_iter: args.max_iter,
        mcmc: args.mcmc,
        mcmc_nsteps: args.mcmc_nsteps,
        mcmc_walkers: args.mcmc_walkers,
        burnfrac: args.burnfrac,
        seed: args.seed,
        threads,

        rel_band: args.rel_band.clone(),
        resid_range: args.resid_range,
        rayleigh_jeans: args.rj,
        lya_panel: args.lya,
        showfit: args.showfit,
        formats: formats_or_svg(args.format.formats()),
        figs_dir: args.figs_dir.clone(),
        exts_dir: args.exts_dir.clone(),
    }
}

/// No format flag means a terminal plot instead of figure files.
pub fn norm_plot_config_from_args(args: &NormPlotArgs) -> NormPlotConfig {
    NormPlotConfig {
        starname: args.starname.clone(),
        obspath: args.obspath.clone(),
        picmodname: args.picmodname.clone(),
        only_bands: args.bands.clone(),
        burnfrac: args.burnfrac,
        exts_dir: args.exts_dir.clone(),
        figs_dir: args.figs_dir.clone(),
        pinned_log_hi_mw: args.pinned_log_hi_mw,
        exclude_regions: default_exclude_regions(),
        formats: args.format.formats(),
    }
}

pub fn stack_config_from_args(args: &StackArgs) -> StackConfig {
    StackConfig {
        starnames: args.starnames.clone(),
        path: args.path.clone(),
        uv: args.uv,
        channel: args.channel.clone(),
        out: args.out.clone(),
        formats: formats_or_svg(args.format.formats()),
    }
}

pub fn grid_config_from_args(args: &GridArgs) -> GridConfig {
    GridConfig {
        starname: args.starname.clone(),
        path: args.path.clone(),
        modpath: args.modpath.clone(),
        modstr: args.modstr.clone(),
        cache_dir: args.cache_dir.clone(),
    }
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        starname: args.starname.clone(),
        modpath: args.modpath.clone(),
        modstr: args.modstr.clone(),
        out: args.out.clone(),
        log_teff: args.log_teff,
        log_g: args.log_g,
        av: args.av,
        rv: args.rv,
        log_hi: args.log_hi,
        snr: args.snr,
        seed: args.seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModType;

    fn parse(argv: &[&str]) -> Command {
        Cli::parse_from(argv).command
    }

    #[test]
    fn fit_config_resolves_defaults() {
        let Command::Fit(args) = parse(&["extfit", "fit", "wd1", "--modtype", "obstars"]) else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args, 4);
        assert_eq!(config.modtype, ModType::Obstars);
        assert_eq!(config.modstr, "tlusty_");
        assert_eq!(config.formats, vec![OutputFormat::Svg]);
        assert_eq!(config.vel_mw, -10.0);
        assert_eq!(config.threads, 4);
        assert!(!config.exclude_regions.is_empty());
    }

    #[test]
    fn modstr_overrides_modtype() {
        let Command::Fit(args) = parse(&["extfit", "fit", "wd1", "--modstr", "koester_", "--png"]) else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args, 1);
        assert_eq!(config.modstr, "koester_");
        assert_eq!(config.formats, vec![OutputFormat::Png]);
    }

    #[test]
    fn norm_plot_without_formats_is_terminal_only() {
        let Command::NormPlot(args) = parse(&["extfit", "norm-plot", "wd1"]) else {
            panic!("expected norm-plot");
        };
        assert!(norm_plot_config_from_args(&args).formats.is_empty());
    }
}
