//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Channel name of the broadband photometry.
pub const CHANNEL_BAND: &str = "BAND";

/// Grid-only channel holding the full model on a coarse log-spaced wavelength grid.
pub const CHANNEL_FULL_LOWRES: &str = "MODEL_FULL_LOWRES";

/// Which family of atmosphere models to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModType {
    Obstars,
    Whitedwarfs,
}

impl ModType {
    /// File-name prefix of the model grid files for this family.
    pub fn default_modstr(self) -> &'static str {
        match self {
            ModType::Obstars => "tlusty_",
            ModType::Whitedwarfs => "wd_hubeny_",
        }
    }
}

/// Figure file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

/// Flux arrays keyed by channel name.
pub type ChannelFluxes = BTreeMap<String, Vec<f64>>;

/// One observed channel: wavelength-ordered arrays of equal length.
///
/// Wavelengths are in micron. `npts == 0` marks a point without data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub waves: Vec<f64>,
    pub fluxes: Vec<f64>,
    pub uncs: Vec<f64>,
    pub npts: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Check the channel invariant: equal lengths and non-decreasing wavelengths.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.waves.len();
        if self.fluxes.len() != n || self.uncs.len() != n || self.npts.len() != n {
            return Err(format!(
                "array lengths differ (waves={}, fluxes={}, uncs={}, npts={})",
                n,
                self.fluxes.len(),
                self.uncs.len(),
                self.npts.len()
            ));
        }
        if self.waves.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err("wavelengths must be finite and positive".to_string());
        }
        if self.waves.windows(2).any(|w| w[1] < w[0]) {
            return Err("wavelengths are not sorted".to_string());
        }
        Ok(())
    }
}

/// Observed photometry and spectra for one star.
#[derive(Debug, Clone, Default)]
pub struct StarData {
    pub name: String,
    /// File name the data was read from (used for figure titles).
    pub file: String,
    pub sptype: Option<String>,
    /// Numeric metadata such as `Teff`, `Teff_unc`, `logg`, `logg_unc`, `Z`, `velocity`.
    pub model_params: BTreeMap<String, f64>,
    pub channels: BTreeMap<String, Spectrum>,
    /// Names of the broadband points, in the same order as the `BAND` channel arrays.
    pub band_names: Vec<String>,
}

impl StarData {
    pub fn channel(&self, name: &str) -> Option<&Spectrum> {
        self.channels.get(name)
    }

    /// Wavelength arrays per channel, as used to build a matching model grid.
    pub fn channel_waves(&self) -> BTreeMap<String, Vec<f64>> {
        self.channels
            .iter()
            .map(|(k, v)| (k.clone(), v.waves.clone()))
            .collect()
    }
}

/// A saved parameter table row (one per named parameter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRow {
    pub name: String,
    pub value: f64,
    pub unc: f64,
    pub fixed: bool,
    pub prior: Option<(f64, f64)>,
}

/// Extinction curve for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtChannel {
    pub waves: Vec<f64>,
    pub exts: Vec<f64>,
    pub uncs: Vec<f64>,
    pub npts: Vec<f64>,
}

/// A saved extinction curve file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtCurveFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub star: String,
    /// Curve type; always `elx` (E(λ-X) in magnitudes).
    pub ext_type: String,
    /// Reference band name, or the reference wavelength in micron.
    pub rel_band: String,
    /// Dust columns such as `AV` and `RV` as `(value, unc)`.
    pub columns: BTreeMap<String, (f64, f64)>,
    /// Parameter tables keyed by fit stage (`MIN`, `MCMC`).
    pub fit_params: BTreeMap<String, Vec<ParamRow>>,
    pub curves: BTreeMap<String, ExtChannel>,
}

/// Walker positions of an ensemble sampler run.
///
/// `samples[step * nwalkers + walker]` holds one position with one value per
/// entry of `names`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McmcChain {
    pub names: Vec<String>,
    pub nwalkers: usize,
    pub nsteps: usize,
    pub samples: Vec<Vec<f64>>,
}

impl McmcChain {
    pub fn position(&self, step: usize, walker: usize) -> &[f64] {
        &self.samples[step * self.nwalkers + walker]
    }

    /// First step kept after discarding a `burnfrac` fraction of the steps.
    pub fn burn_steps(&self, burnfrac: f64) -> usize {
        ((self.nsteps as f64 * burnfrac.clamp(0.0, 1.0)).floor() as usize).min(self.nsteps)
    }

    /// All samples of parameter `index` from step `burn_steps(burnfrac)` on.
    pub fn column(&self, index: usize, burnfrac: f64) -> Vec<f64> {
        let start = self.burn_steps(burnfrac) * self.nwalkers;
        self.samples[start.min(self.samples.len())..]
            .iter()
            .map(|s| s[index])
            .collect()
    }

    /// Trace of parameter `index` for one walker.
    pub fn trace(&self, index: usize, walker: usize) -> Vec<f64> {
        (0..self.nsteps).map(|step| self.position(step, walker)[index]).collect()
    }
}

/// Configuration of a `fit` run, derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub starname: String,
    pub data_path: PathBuf,
    pub modtype: ModType,
    pub modpath: PathBuf,
    pub modstr: String,
    pub picmodel: bool,
    pub cache_dir: PathBuf,
    pub only_bands: Option<Vec<String>>,

    pub wind: bool,
    /// Starting A(V); unset means 0.5 for white dwarfs and 0.2 otherwise.
    pub av_init: Option<f64>,
    /// Pinned Milky Way `logHI`; unset means `log10(1.61e20 · A(V))` at the start.
    pub pinned_log_hi_mw: Option<f64>,
    pub vel_mw: f64,
    /// Wavenumber ranges (1/micron) given zero weight.
    pub exclude_regions: Vec<(f64, f64)>,

    pub max_iter: u64,
    pub mcmc: bool,
    pub mcmc_nsteps: usize,
    pub mcmc_walkers: Option<usize>,
    pub burnfrac: f64,
    pub seed: u64,
    pub threads: usize,

    pub rel_band: Option<String>,
    pub resid_range: f64,
    pub rayleigh_jeans: bool,
    pub lya_panel: bool,
    pub showfit: bool,
    pub formats: Vec<OutputFormat>,
    pub figs_dir: PathBuf,
    pub exts_dir: PathBuf,
}

/// Configuration of a `norm-plot` run.
#[derive(Debug, Clone)]
pub struct NormPlotConfig {
    pub starname: String,
    pub obspath: PathBuf,
    pub picmodname: PathBuf,
    pub only_bands: Option<Vec<String>>,
    pub burnfrac: f64,
    pub exts_dir: PathBuf,
    pub figs_dir: PathBuf,
    /// Pinned Milky Way `logHI`; unset means the value saved with the fit.
    pub pinned_log_hi_mw: Option<f64>,
    pub exclude_regions: Vec<(f64, f64)>,
    pub formats: Vec<OutputFormat>,
}

/// Configuration of a `stack` run.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub starnames: Vec<String>,
    pub path: PathBuf,
    pub uv: bool,
    pub channel: String,
    pub out: PathBuf,
    pub formats: Vec<OutputFormat>,
}

/// Configuration of a `grid` run.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub starname: String,
    pub path: PathBuf,
    pub modpath: PathBuf,
    pub modstr: String,
    pub cache_dir: PathBuf,
}

/// Configuration of a `simulate` run.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub starname: String,
    pub modpath: PathBuf,
    pub modstr: String,
    pub out: PathBuf,
    pub log_teff: f64,
    pub log_g: f64,
    pub av: f64,
    pub rv: f64,
    pub log_hi: f64,
    pub snr: f64,
    pub seed: u64,
}

/// Starting Milky Way HI velocity (km/s).
pub const DEFAULT_VEL_MW: f64 = -10.0;

/// Starting stellar velocity (km/s) when the star file gives none.
pub const DEFAULT_VELOCITY: f64 = 10.0;

/// Default exclusion: the core of the Lyman-alpha line.
pub fn default_exclude_regions() -> Vec<(f64, f64)> {
    vec![(8.23 - 0.1, 8.23 + 0.1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_validate_rejects_unsorted_waves() {
        let s = Spectrum {
            waves: vec![0.2, 0.1],
            fluxes: vec![1.0, 1.0],
            uncs: vec![0.1, 0.1],
            npts: vec![1.0, 1.0],
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn chain_burn_in_drops_leading_steps() {
        let chain = McmcChain {
            names: vec!["Av".to_string()],
            nwalkers: 2,
            nsteps: 4,
            samples: (0..8).map(|i| vec![i as f64]).collect(),
        };
        assert_eq!(chain.burn_steps(0.5), 2);
        assert_eq!(chain.column(0, 0.5), vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(chain.column(0, 1.0), Vec::<f64>::new());
        assert_eq!(chain.trace(0, 1), vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn spectrum_validate_rejects_ragged_arrays() {
        let s = Spectrum {
            waves: vec![0.1, 0.2],
            fluxes: vec![1.0],
            uncs: vec![0.1, 0.1],
            npts: vec![1.0, 1.0],
        };
        assert!(s.validate().is_err());
    }
}
