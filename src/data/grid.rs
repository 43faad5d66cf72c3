//! Stellar atmosphere model grid.
//!
//! A grid is built from a set of model files, each holding one synthetic
//! spectrum at a `(logTeff, logg, logZ)` node. On construction every model is
//! resampled onto the wavelengths of the observed channels (plus a coarse
//! full-range channel for plotting), so later evaluations only interpolate
//! between nodes.
//!
//! Building a grid means parsing hundreds of files; the result is cached with
//! `bincode` and reloaded with [`ModelGrid::load_cache`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use globset::Glob;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{CHANNEL_FULL_LOWRES, ChannelFluxes};
use crate::error::AppError;
use crate::math::{logspace, resample};
use crate::params::StellarBounds;

/// Number of nearest nodes blended when the requested point is not a node.
const N_NEIGHBORS: usize = 11;

/// Coarse full-range wavelength grid (micron) for the plotting channel.
const FULL_LOWRES_RANGE: (f64, f64) = (0.1, 2.5);
const FULL_LOWRES_POINTS: usize = 300;

/// Parameters of one grid node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub log_teff: f64,
    pub log_g: f64,
    pub log_z: f64,
}

impl GridPoint {
    fn coords(&self) -> [f64; 3] {
        [self.log_teff, self.log_g, self.log_z]
    }
}

/// A model spectrum at native resolution.
#[derive(Debug, Clone)]
pub struct ModelSpectrum {
    pub point: GridPoint,
    pub waves: Vec<f64>,
    pub fluxes: Vec<f64>,
}

/// Model fluxes resampled per channel for every grid node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelGrid {
    pub points: Vec<GridPoint>,
    pub waves: BTreeMap<String, Vec<f64>>,
    /// `fluxes[channel][node][wave]`.
    pub fluxes: BTreeMap<String, Vec<Vec<f64>>>,
}

impl ModelGrid {
    /// Resample native model spectra onto the given channel wavelengths.
    ///
    /// A `MODEL_FULL_LOWRES` channel is always added. Wavelengths outside a
    /// model's coverage get zero flux.
    pub fn from_spectra(
        models: &[ModelSpectrum],
        channels: &BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, AppError> {
        if models.is_empty() {
            return Err(AppError::new(2, "Cannot build a model grid without models."));
        }

        let mut waves = channels.clone();
        waves.insert(
            CHANNEL_FULL_LOWRES.to_string(),
            logspace(FULL_LOWRES_RANGE.0, FULL_LOWRES_RANGE.1, FULL_LOWRES_POINTS),
        );

        let fluxes = waves
            .iter()
            .map(|(name, cwaves)| {
                let per_model = models
                    .iter()
                    .map(|m| resample(&m.waves, &m.fluxes, cwaves, 0.0))
                    .collect();
                (name.clone(), per_model)
            })
            .collect();

        Ok(Self {
            points: models.iter().map(|m| m.point).collect(),
            waves,
            fluxes,
        })
    }

    /// Read model files (in parallel) and build a grid for `channels`.
    pub fn from_files(
        files: &[PathBuf],
        channels: &BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, AppError> {
        let models: Vec<ModelSpectrum> = files
            .par_iter()
            .map(|f| read_model_file(f))
            .collect::<Result<_, _>>()?;
        debug!(n_models = models.len(), "parsed model files");
        Self::from_spectra(&models, channels)
    }

    pub fn save_cache(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::new(2, format!("Failed to create grid cache '{}': {e}", path.display()))
        })?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| AppError::new(2, format!("Failed to write grid cache: {e}")))?;
        info!(path = %path.display(), "wrote model grid cache");
        Ok(())
    }

    pub fn load_cache(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::new(2, format!("Failed to open grid cache '{}': {e}", path.display()))
        })?;
        let grid: Self = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| AppError::new(2, format!("Invalid grid cache '{}': {e}", path.display())))?;
        if grid.points.is_empty() {
            return Err(AppError::new(2, "Grid cache holds no models."));
        }
        Ok(grid)
    }

    /// Check that every observed channel has a matching grid channel of the same length.
    pub fn ensure_covers(&self, channels: &BTreeMap<String, Vec<f64>>) -> Result<(), AppError> {
        for (name, w) in channels {
            match self.waves.get(name) {
                Some(gw) if gw.len() == w.len() => {}
                Some(gw) => {
                    return Err(AppError::new(
                        2,
                        format!(
                            "Grid channel '{name}' has {} points but the data has {}; rebuild the grid.",
                            gw.len(),
                            w.len()
                        ),
                    ));
                }
                None => {
                    return Err(AppError::new(
                        2,
                        format!("Grid has no channel '{name}'; rebuild the grid for this star."),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Axis ranges of the grid.
    pub fn bounds(&self) -> StellarBounds {
        let range = |k: usize| {
            self.points
                .iter()
                .map(|p| p.coords()[k])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
        };
        StellarBounds {
            log_teff: range(0),
            log_g: range(1),
            log_z: range(2),
        }
    }

    /// Node indices and blending weights for a point in parameter space.
    ///
    /// Distances are measured with every axis scaled by its grid range. An
    /// exact node match returns that node alone.
    pub fn node_weights(&self, point: [f64; 3]) -> Vec<(usize, f64)> {
        let b = self.bounds();
        let spans = [b.log_teff, b.log_g, b.log_z].map(|(lo, hi)| {
            let s = hi - lo;
            if s > 0.0 { s } else { 1.0 }
        });

        let mut d2: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let c = p.coords();
                let d = (0..3)
                    .map(|k| ((c[k] - point[k]) / spans[k]).powi(2))
                    .sum::<f64>();
                (i, d)
            })
            .collect();
        d2.sort_by(|a, b| a.1.total_cmp(&b.1));

        if d2[0].1 < 1e-20 {
            return vec![(d2[0].0, 1.0)];
        }

        d2.truncate(N_NEIGHBORS);
        let total: f64 = d2.iter().map(|(_, d)| 1.0 / d).sum();
        d2.into_iter().map(|(i, d)| (i, (1.0 / d) / total)).collect()
    }

    /// Blend the node fluxes of every channel at `point`.
    pub fn interpolate(&self, point: [f64; 3]) -> ChannelFluxes {
        let weights = self.node_weights(point);
        self.fluxes
            .iter()
            .map(|(name, per_model)| {
                let n = self.waves[name].len();
                let mut out = vec![0.0; n];
                for &(idx, w) in &weights {
                    for (o, f) in out.iter_mut().zip(&per_model[idx]) {
                        *o += w * f;
                    }
                }
                (name.clone(), out)
            })
            .collect()
    }
}

/// Find model files `<modpath>/<modstr>*.dat`, split into regular and
/// continuum (`cont` in the file name) models.
///
/// An empty regular set is a fatal error.
pub fn find_model_files(modpath: &Path, modstr: &str) -> Result<(Vec<PathBuf>, Vec<PathBuf>), AppError> {
    let matcher = Glob::new(&format!("{modstr}*.dat"))
        .map_err(|e| AppError::new(2, format!("Invalid model string '{modstr}': {e}")))?
        .compile_matcher();

    let entries = std::fs::read_dir(modpath).map_err(|e| {
        AppError::new(2, format!("Failed to read model directory '{}': {e}", modpath.display()))
    })?;

    let mut regular = Vec::new();
    let mut cont = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !matcher.is_match(&name) {
            continue;
        }
        if name.contains("cont") {
            cont.push(entry.path());
        } else {
            regular.push(entry.path());
        }
    }
    regular.sort();
    cont.sort();

    if regular.is_empty() {
        return Err(AppError::new(
            2,
            format!("no model files found matching '{}/{modstr}*.dat'", modpath.display()),
        ));
    }
    info!(regular = regular.len(), cont = cont.len(), "model files found");
    Ok((regular, cont))
}

/// Parse one model file.
///
/// Header lines `# logTeff = ..`, `# logg = ..`, `# logZ = ..` give the node;
/// remaining non-comment lines are `wave_um flux`.
pub fn read_model_file(path: &Path) -> Result<ModelSpectrum, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::new(2, format!("Failed to read model file '{}': {e}", path.display()))
    })?;
    parse_model_text(&text).map_err(|e| AppError::new(2, format!("{}: {e}", path.display())))
}

fn parse_model_text(text: &str) -> Result<ModelSpectrum, String> {
    let mut log_teff = None;
    let mut log_g = None;
    let mut log_z = None;
    let mut rows: Vec<(f64, f64)> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            if let Some((key, value)) = header.split_once('=') {
                let value: Option<f64> = value.trim().parse().ok();
                match key.trim() {
                    "logTeff" => log_teff = value,
                    "logg" => log_g = value,
                    "logZ" => log_z = value,
                    _ => {}
                }
            }
            continue;
        }

        let mut cols = line.split_whitespace();
        let wave = cols.next().and_then(|s| s.parse::<f64>().ok());
        let flux = cols.next().and_then(|s| s.parse::<f64>().ok());
        match (wave, flux) {
            (Some(w), Some(f)) if w.is_finite() && w > 0.0 && f.is_finite() => rows.push((w, f)),
            _ => return Err(format!("line {}: expected `wave flux`", lineno + 1)),
        }
    }

    let point = GridPoint {
        log_teff: log_teff.ok_or("missing `# logTeff = ` header")?,
        log_g: log_g.ok_or("missing `# logg = ` header")?,
        log_z: log_z.unwrap_or(0.0),
    };
    if rows.len() < 2 {
        return Err("fewer than two spectrum rows".to_string());
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(ModelSpectrum {
        point,
        waves: rows.iter().map(|r| r.0).collect(),
        fluxes: rows.iter().map(|r| r.1).collect(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smooth synthetic spectrum whose slope depends on the node.
    pub(crate) fn toy_model(log_teff: f64, log_g: f64) -> ModelSpectrum {
        let waves = logspace(0.09, 3.0, 2000);
        let t = 10f64.powf(log_teff);
        let fluxes = waves
            .iter()
            .map(|&w| {
                // Planck-like shape in arbitrary units, with a mild gravity term.
                let x = 14387.77 / (w * t);
                (1.0 + 0.01 * (log_g - 8.0)) / (w.powi(5) * (x.exp() - 1.0))
            })
            .collect();
        ModelSpectrum {
            point: GridPoint {
                log_teff,
                log_g,
                log_z: 0.0,
            },
            waves,
            fluxes,
        }
    }

    pub(crate) fn toy_grid(channels: &BTreeMap<String, Vec<f64>>) -> ModelGrid {
        let models: Vec<ModelSpectrum> = [4.4, 4.5, 4.6]
            .iter()
            .flat_map(|&t| [7.5, 8.0, 8.5].map(|g| toy_model(t, g)))
            .collect();
        ModelGrid::from_spectra(&models, channels).unwrap()
    }

    fn channels() -> BTreeMap<String, Vec<f64>> {
        BTreeMap::from([
            ("BAND".to_string(), vec![0.44, 0.55, 2.2]),
            ("STIS".to_string(), logspace(0.12, 1.0, 50)),
        ])
    }

    #[test]
    fn exact_node_returns_that_model() {
        let grid = toy_grid(&channels());
        let w = grid.node_weights([4.5, 8.0, 0.0]);
        assert_eq!(w.len(), 1);
        assert_eq!(grid.points[w[0].0].log_teff, 4.5);

        let fluxes = grid.interpolate([4.5, 8.0, 0.0]);
        let m = toy_model(4.5, 8.0);
        let expected = resample(&m.waves, &m.fluxes, &[0.55], 0.0)[0];
        assert!((fluxes["BAND"][1] - expected).abs() / expected < 1e-12);
        assert!(fluxes.contains_key(CHANNEL_FULL_LOWRES));
    }

    #[test]
    fn off_node_weights_sum_to_one_and_stay_bracketed() {
        let grid = toy_grid(&channels());
        let w = grid.node_weights([4.45, 7.9, 0.0]);
        let total: f64 = w.iter().map(|x| x.1).sum();
        assert!((total - 1.0).abs() < 1e-12);

        let f = grid.interpolate([4.45, 7.9, 0.0])["BAND"][0];
        let lo = grid.interpolate([4.4, 7.5, 0.0])["BAND"][0];
        let hi = grid.interpolate([4.6, 8.5, 0.0])["BAND"][0];
        assert!(f > lo.min(hi) && f < lo.max(hi));
    }

    #[test]
    fn cache_round_trip() {
        let grid = toy_grid(&channels());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy_modinfo.bin");
        grid.save_cache(&path).unwrap();
        let back = ModelGrid::load_cache(&path).unwrap();
        assert_eq!(back.points, grid.points);
        assert_eq!(back.fluxes["STIS"], grid.fluxes["STIS"]);
    }

    #[test]
    fn model_text_parsing_and_file_discovery() {
        let text = "# logTeff = 4.5\n# logg = 8.0\n0.2 3.0\n0.1 2.0\n";
        let m = parse_model_text(text).unwrap();
        assert_eq!(m.waves, vec![0.1, 0.2]);
        assert_eq!(m.point.log_z, 0.0);
        assert!(parse_model_text("0.1 2.0\n0.2 3.0\n").is_err());

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wd_hubeny_t45g80.dat"), text).unwrap();
        std::fs::write(dir.path().join("wd_hubeny_t45g80_cont.dat"), text).unwrap();
        std::fs::write(dir.path().join("tlusty_t45g80.dat"), text).unwrap();
        let (regular, cont) = find_model_files(dir.path(), "wd_hubeny_").unwrap();
        assert_eq!(regular.len(), 1);
        assert_eq!(cont.len(), 1);
        assert!(find_model_files(dir.path(), "kurucz_").is_err());
    }
}
