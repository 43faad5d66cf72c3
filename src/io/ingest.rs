//! Star data ingest.
//!
//! A star is described by a small text file `<star>.dat`:
//!
//! ```text
//! # comment
//! name = azv456
//! sptype = O9.7Ib
//! Teff = 29500
//! Teff_unc = 1000
//! BAND:V = 0.5500 1.23e-13 1.2e-15
//! SPEC:STIS = azv456_stis.csv
//! ```
//!
//! Spectra referenced with `SPEC:<channel>` are CSV files (relative to the star
//! file) with the header `wave,flux,unc[,npts]`.
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic output**: every channel is sorted by wavelength and validated

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{CHANNEL_BAND, Spectrum, StarData};
use crate::error::AppError;

/// A row-level error encountered while reading a spectrum CSV.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Path of the data file for `starname` under `dir`.
pub fn star_file_path(dir: &Path, starname: &str) -> PathBuf {
    dir.join(format!("{starname}.dat"))
}

/// Load `<dir>/<starname>.dat`.
///
/// `only_bands` restricts the broadband points to the named bands.
pub fn load_star(dir: &Path, starname: &str, only_bands: Option<&[String]>) -> Result<StarData, AppError> {
    read_star_file(&star_file_path(dir, starname), only_bands)
}

/// Parse a star file and every spectrum it references.
pub fn read_star_file(path: &Path, only_bands: Option<&[String]>) -> Result<StarData, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::new(2, format!("Failed to read star file '{}': {e}", path.display()))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut star = StarData {
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        file: path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        ..StarData::default()
    };
    let mut bands: Vec<(String, f64, f64, f64)> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let at = |msg: String| AppError::new(2, format!("{}:{}: {msg}", path.display(), idx + 1));

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| at("expected `key = value`".to_string()))?;
        let (key, value) = (key.trim(), value.trim());

        if let Some(band) = key.strip_prefix("BAND:") {
            let nums: Vec<f64> = value
                .split_whitespace()
                .map(|s| s.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|e| at(format!("invalid band values: {e}")))?;
            let &[wave, flux, unc] = nums.as_slice() else {
                return Err(at(format!("band '{band}' needs `wave flux unc`")));
            };
            bands.push((band.trim().to_string(), wave, flux, unc));
        } else if let Some(channel) = key.strip_prefix("SPEC:") {
            let channel = channel.trim();
            if channel == CHANNEL_BAND {
                return Err(at(format!("'{CHANNEL_BAND}' is reserved for broadband points")));
            }
            let spec = read_spectrum_csv(&base_dir.join(value))?;
            if !spec.is_empty() {
                star.channels.insert(channel.to_string(), spec);
            }
        } else {
            match key {
                "name" => star.name = value.to_string(),
                "sptype" => star.sptype = Some(value.to_string()),
                _ => {
                    let v: f64 = value
                        .parse()
                        .ok()
                        .filter(|v: &f64| v.is_finite())
                        .ok_or_else(|| at(format!("metadata '{key}' is not a finite number: '{value}'")))?;
                    star.model_params.insert(key.to_string(), v);
                }
            }
        }
    }

    if let Some(keep) = only_bands {
        let before = bands.len();
        bands.retain(|b| keep.iter().any(|k| k == &b.0));
        debug!(kept = bands.len(), dropped = before - bands.len(), "band selection");
    }
    if !bands.is_empty() {
        bands.sort_by(|a, b| a.1.total_cmp(&b.1));
        star.band_names = bands.iter().map(|b| b.0.clone()).collect();
        let spec = Spectrum {
            waves: bands.iter().map(|b| b.1).collect(),
            fluxes: bands.iter().map(|b| b.2).collect(),
            uncs: bands.iter().map(|b| b.3).collect(),
            npts: vec![1.0; bands.len()],
        };
        star.channels.insert(CHANNEL_BAND.to_string(), spec);
    }

    for (name, spec) in &star.channels {
        spec.validate()
            .map_err(|e| AppError::new(2, format!("Channel '{name}' of '{}': {e}", path.display())))?;
    }
    if star.channels.is_empty() {
        return Err(AppError::new(
            3,
            format!("No photometry or spectra in '{}'.", path.display()),
        ));
    }
    Ok(star)
}

/// Read a `wave,flux,unc[,npts]` spectrum CSV, sorted by wavelength.
///
/// Unparseable rows are skipped and logged.
pub fn read_spectrum_csv(path: &Path) -> Result<Spectrum, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open spectrum CSV '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{}': {e}", path.display())))?
        .clone();
    let header_map = build_header_map(&headers);
    for required in ["wave", "flux", "unc"] {
        if !header_map.contains_key(required) {
            return Err(AppError::new(
                2,
                format!("Missing required column `{required}` in '{}'.", path.display()),
            ));
        }
    }

    let mut rows: Vec<[f64; 4]> = Vec::new();
    let mut row_errors = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map));
        match parsed {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }
    if !row_errors.is_empty() {
        warn!(
            file = %path.display(),
            skipped = row_errors.len(),
            first_line = row_errors[0].line,
            first_error = %row_errors[0].message,
            "skipped spectrum rows"
        );
    }

    rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
    Ok(Spectrum {
        waves: rows.iter().map(|r| r[0]).collect(),
        fluxes: rows.iter().map(|r| r[1]).collect(),
        uncs: rows.iter().map(|r| r[2]).collect(),
        npts: rows.iter().map(|r| r[3]).collect(),
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<[f64; 4], String> {
    let get = |name: &str| -> Result<Option<f64>, String> {
        match header_map.get(name).and_then(|&i| record.get(i)) {
            None | Some("") => Ok(None),
            Some(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("invalid `{name}` value '{s}'")),
        }
    };
    let wave = get("wave")?.ok_or("missing `wave`")?;
    if !(wave.is_finite() && wave > 0.0) {
        return Err(format!("non-positive wavelength {wave}"));
    }
    // Missing flux/unc stay in the channel as NaN so masks line up with the file.
    let flux = get("flux")?.unwrap_or(f64::NAN);
    let unc = get("unc")?.unwrap_or(f64::NAN);
    let npts = get("npts")?.unwrap_or(1.0);
    Ok([wave, flux, unc, npts])
}

/// Write `star` as `<dir>/<name>.dat` plus one CSV per spectrum channel.
pub fn write_star_file(dir: &Path, star: &StarData) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;
    let path = star_file_path(dir, &star.name);
    let mut file = File::create(&path)
        .map_err(|e| AppError::new(2, format!("Failed to create star file '{}': {e}", path.display())))?;
    let werr = |e: std::io::Error| AppError::new(2, format!("Failed to write star file: {e}"));

    writeln!(file, "# written by extfit").map_err(werr)?;
    writeln!(file, "name = {}", star.name).map_err(werr)?;
    if let Some(sptype) = &star.sptype {
        writeln!(file, "sptype = {sptype}").map_err(werr)?;
    }
    for (k, v) in &star.model_params {
        writeln!(file, "{k} = {v}").map_err(werr)?;
    }

    if let Some(band) = star.channel(CHANNEL_BAND) {
        for (i, name) in star.band_names.iter().enumerate() {
            writeln!(
                file,
                "BAND:{name} = {:.6} {:.6e} {:.6e}",
                band.waves[i], band.fluxes[i], band.uncs[i]
            )
            .map_err(werr)?;
        }
    }

    for (channel, spec) in star.channels.iter().filter(|(k, _)| k.as_str() != CHANNEL_BAND) {
        let csv_name = format!("{}_{}.csv", star.name, channel.to_ascii_lowercase());
        write_spectrum_csv(&dir.join(&csv_name), spec)?;
        writeln!(file, "SPEC:{channel} = {csv_name}").map_err(werr)?;
    }
    Ok(path)
}

/// Write a spectrum as `wave,flux,unc,npts`.
pub fn write_spectrum_csv(path: &Path, spec: &Spectrum) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create spectrum CSV '{}': {e}", path.display())))?;
    writeln!(file, "wave,flux,unc,npts")
        .map_err(|e| AppError::new(2, format!("Failed to write spectrum CSV header: {e}")))?;
    for i in 0..spec.len() {
        writeln!(
            file,
            "{:.8},{:.8e},{:.8e},{}",
            spec.waves[i], spec.fluxes[i], spec.uncs[i], spec.npts[i]
        )
        .map_err(|e| AppError::new(2, format!("Failed to write spectrum CSV row: {e}")))?;
    }
    Ok(())
}
