//! Command-line parsing for the SED extinction fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ModType, OutputFormat};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "extfit", version, about = "Dust extinction from stellar SED fits")]
pub struct Cli {
    /// Worker threads for the global rayon pool.
    #[arg(long, global = true, default_value_t = 1)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a reddened star with model SED x dust x HI, optionally sample with MCMC.
    Fit(FitArgs),
    /// Plot a finished fit with the spectra divided by the continuum model.
    NormPlot(NormPlotArgs),
    /// Plot the spectra of several stars stacked with offsets.
    Stack(StackArgs),
    /// Build and cache the model grids for a star.
    Grid(GridArgs),
    /// Write a synthetic reddened star generated from the model grid.
    Simulate(SimulateArgs),
}

/// Figure file formats. Neither flag set means the command default.
#[derive(Debug, Args, Clone, Default)]
pub struct FormatArgs {
    /// Save figures as PNG.
    #[arg(long)]
    pub png: bool,

    /// Save figures as SVG.
    #[arg(long)]
    pub svg: bool,
}

impl FormatArgs {
    /// Requested formats, in a fixed order.
    pub fn formats(&self) -> Vec<OutputFormat> {
        let mut out = Vec::new();
        if self.svg {
            out.push(OutputFormat::Svg);
        }
        if self.png {
            out.push(OutputFormat::Png);
        }
        out
    }
}

/// Options for `extfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Name of the star (reads `<path>/<star>.dat`).
    pub starname: String,

    /// Directory with the observed data.
    #[arg(long, default_value = "data")]
    pub path: PathBuf,

    /// Family of atmosphere models.
    #[arg(long, value_enum, default_value_t = ModType::Whitedwarfs)]
    pub modtype: ModType,

    /// Fit the IR wind emission as well.
    #[arg(long)]
    pub wind: bool,

    /// Directory with the model files.
    #[arg(long, env = "EXTFIT_MODPATH", default_value = "models")]
    pub modpath: PathBuf,

    /// Model file prefix; defaults by `--modtype`.
    #[arg(long)]
    pub modstr: Option<String>,

    /// Load the cached model grid instead of reading model files.
    #[arg(long)]
    pub picmodel: bool,

    /// Directory for the model grid caches.
    #[arg(long, default_value = ".")]
    pub cache_dir: PathBuf,

    /// Starting A(V).
    #[arg(long)]
    pub av_init: Option<f64>,

    /// Sample the posterior with the ensemble sampler after minimizing.
    #[arg(long)]
    pub mcmc: bool,

    /// Number of MCMC steps.
    #[arg(long, default_value_t = 1000)]
    pub mcmc_nsteps: usize,

    /// Number of walkers (at least twice the free parameters).
    #[arg(long)]
    pub mcmc_walkers: Option<usize>,

    /// Fraction of the MCMC steps discarded as burn-in.
    #[arg(long, default_value_t = 0.5)]
    pub burnfrac: f64,

    /// Seed for the walker start positions.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Minimizer iteration cap.
    #[arg(long, default_value_t = 10_000)]
    pub max_iter: u64,

    /// Only use these observed bands.
    #[arg(long, num_args = 1..)]
    pub bands: Option<Vec<String>>,

    /// Band the extinction curve is relative to.
    #[arg(long)]
    pub rel_band: Option<String>,

    /// Residual plot limits in percent.
    #[arg(long, default_value_t = 20.0)]
    pub resid_range: f64,

    /// Plot λ⁴ F(λ).
    #[arg(long)]
    pub rj: bool,

    /// Add a Lyman-alpha zoom panel to the fit figures.
    #[arg(long)]
    pub lya: bool,

    /// Print an ASCII plot of the fit in the terminal.
    #[arg(long)]
    pub showfit: bool,

    #[command(flatten)]
    pub format: FormatArgs,

    /// Directory for figures.
    #[arg(long, default_value = "figs")]
    pub figs_dir: PathBuf,

    /// Directory for extinction curves and chains.
    #[arg(long, default_value = "exts")]
    pub exts_dir: PathBuf,

    /// Pinned Milky Way HI column (log10 cm⁻²); defaults to `log10(1.61e20 · A(V))`.
    #[arg(long)]
    pub pinned_log_hi_mw: Option<f64>,
}

/// Options for `extfit norm-plot`.
#[derive(Debug, Args, Clone)]
pub struct NormPlotArgs {
    pub starname: String,

    /// Fraction of the MCMC steps discarded as burn-in.
    #[arg(long, default_value_t = 0.5)]
    pub burnfrac: f64,

    /// Directory with the observed data.
    #[arg(long, default_value = "data")]
    pub obspath: PathBuf,

    /// Cached model grid; the continuum grid is found by replacing
    /// `modinfo` with `contmodinfo` in the name.
    #[arg(long, default_value = "wd_hubeny__modinfo.bin")]
    pub picmodname: PathBuf,

    /// Only use these observed bands.
    #[arg(long, num_args = 1..)]
    pub bands: Option<Vec<String>>,

    #[arg(long, default_value = "exts")]
    pub exts_dir: PathBuf,

    #[arg(long, default_value = "figs")]
    pub figs_dir: PathBuf,

    /// Override the pinned Milky Way HI column saved with the fit.
    #[arg(long)]
    pub pinned_log_hi_mw: Option<f64>,

    #[command(flatten)]
    pub format: FormatArgs,
}

/// Options for `extfit stack`.
#[derive(Debug, Args, Clone)]
pub struct StackArgs {
    /// Stars to stack.
    #[arg(required = true, num_args = 1..)]
    pub starnames: Vec<String>,

    /// Directory with the observed data.
    #[arg(long, default_value = "data")]
    pub path: PathBuf,

    /// Plot the UV only.
    #[arg(long)]
    pub uv: bool,

    /// Channel used to order the stars by UV slope.
    #[arg(long, default_value = "STIS")]
    pub channel: String,

    /// Output file stem.
    #[arg(long, default_value = "figs/spec_stack")]
    pub out: PathBuf,

    #[command(flatten)]
    pub format: FormatArgs,
}

/// Options for `extfit grid`.
#[derive(Debug, Args, Clone)]
pub struct GridArgs {
    /// Star whose channels define the grid wavelengths.
    #[arg(long = "star")]
    pub starname: String,

    #[arg(long, default_value = "data")]
    pub path: PathBuf,

    #[arg(long, env = "EXTFIT_MODPATH", default_value = "models")]
    pub modpath: PathBuf,

    #[arg(long, default_value = "wd_hubeny_")]
    pub modstr: String,

    #[arg(long, default_value = ".")]
    pub cache_dir: PathBuf,
}

/// Options for `extfit simulate`.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    pub starname: String,

    #[arg(long, env = "EXTFIT_MODPATH", default_value = "models")]
    pub modpath: PathBuf,

    #[arg(long, default_value = "wd_hubeny_")]
    pub modstr: String,

    /// Injected A(V).
    #[arg(long, default_value_t = 1.0)]
    pub av: f64,

    /// Injected R(V).
    #[arg(long, default_value_t = 3.1)]
    pub rv: f64,

    #[arg(long, default_value_t = 4.5)]
    pub log_teff: f64,

    #[arg(long, default_value_t = 8.0)]
    pub log_g: f64,

    /// Injected log10 HI column.
    #[arg(long, default_value_t = 21.0)]
    pub log_hi: f64,

    /// Signal-to-noise ratio per point.
    #[arg(long, default_value_t = 50.0)]
    pub snr: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output directory for the star file and spectra.
    #[arg(long, default_value = "data")]
    pub out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_defaults_and_formats() {
        let cli = Cli::parse_from(["extfit", "fit", "wd1", "--mcmc", "--png", "--bands", "V", "K"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.starname, "wd1");
        assert!(args.mcmc);
        assert_eq!(args.mcmc_nsteps, 1000);
        assert_eq!(args.burnfrac, 0.5);
        assert_eq!(args.format.formats(), vec![OutputFormat::Png]);
        assert_eq!(args.bands, Some(vec!["V".to_string(), "K".to_string()]));
        assert_eq!(cli.threads, 1);
    }

    #[test]
    fn stack_takes_many_stars() {
        let cli = Cli::parse_from(["extfit", "stack", "a", "b", "c", "--uv"]);
        let Command::Stack(args) = cli.command else {
            panic!("expected stack");
        };
        assert_eq!(args.starnames.len(), 3);
        assert!(args.uv);
        assert!(args.format.formats().is_empty());
    }
}
