//! Extinction curves: computation from a fit and JSON read/write.
//!
//! The curve is the color excess relative to a reference band X,
//!
//! ```text
//! E(λ-X) = (m_obs(λ) - m_mod(λ)) - (m_obs(X) - m_mod(X))
//! ```
//!
//! against the intrinsic (unreddened) stellar model. The flux normalization
//! cancels in the difference. The schema is `domain::ExtCurveFile`.

use std::collections::BTreeMap;
use std::f64::consts::LN_10;
use std::fs::File;
use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{CHANNEL_BAND, ChannelFluxes, ExtChannel, ExtCurveFile, ParamRow, StarData};
use crate::error::AppError;
use crate::params::{ParamId, ParamSet};

/// Reference wavelength (micron) when no reference band is given.
pub const DEFAULT_REF_WAVE: f64 = 0.55;

/// Curve type written to the file.
pub const EXT_TYPE: &str = "elx";

/// Magnitude difference `m_obs - m_mod`, if both fluxes are usable.
fn dmag(obs: f64, model: f64) -> Option<f64> {
    (obs.is_finite() && model.is_finite() && obs > 0.0 && model > 0.0).then(|| -2.5 * (obs / model).log10())
}

/// Reference `(label, m_obs - m_mod)`.
///
/// Uses `rel_band` when the star has that band, otherwise the usable point
/// closest to 0.55 µm.
fn reference(star: &StarData, intrinsic: &ChannelFluxes, rel_band: Option<&str>) -> Result<(String, f64), AppError> {
    if let (Some(band), Some(spec), Some(model)) = (rel_band, star.channel(CHANNEL_BAND), intrinsic.get(CHANNEL_BAND)) {
        if let Some(i) = star.band_names.iter().position(|b| b == band) {
            if let Some(d) = dmag(spec.fluxes[i], model[i]) {
                return Ok((band.to_string(), d));
            }
        }
        warn!(band, "reference band not usable, falling back to {DEFAULT_REF_WAVE} micron");
    }

    let mut best: Option<(f64, f64, f64)> = None;
    for (name, spec) in &star.channels {
        let Some(model) = intrinsic.get(name) else {
            continue;
        };
        for i in 0..spec.len() {
            if spec.npts[i] <= 0.0 {
                continue;
            }
            if let Some(d) = dmag(spec.fluxes[i], model[i]) {
                let dist = (spec.waves[i] - DEFAULT_REF_WAVE).abs();
                if best.is_none_or(|b| dist < b.0) {
                    best = Some((dist, spec.waves[i], d));
                }
            }
        }
    }
    let (_, wave, d) = best.ok_or_else(|| AppError::new(3, "No usable point for the extinction reference."))?;
    Ok((format!("{wave:.4}"), d))
}

/// E(λ-X) for every channel of `star` against the intrinsic model.
///
/// Returns the reference label and the per-channel curves. Points without
/// usable flux are dropped.
pub fn calc_elx(
    star: &StarData,
    intrinsic: &ChannelFluxes,
    rel_band: Option<&str>,
) -> Result<(String, BTreeMap<String, ExtChannel>), AppError> {
    let (label, ref_dmag) = reference(star, intrinsic, rel_band)?;

    let mut curves = BTreeMap::new();
    for (name, spec) in &star.channels {
        let Some(model) = intrinsic.get(name) else {
            continue;
        };
        let mut ext = ExtChannel::default();
        for i in 0..spec.len() {
            if spec.npts[i] <= 0.0 {
                continue;
            }
            let Some(d) = dmag(spec.fluxes[i], model[i]) else {
                continue;
            };
            let unc = if spec.uncs[i].is_finite() { spec.uncs[i].abs() } else { 0.0 };
            ext.waves.push(spec.waves[i]);
            ext.exts.push(d - ref_dmag);
            ext.uncs.push(2.5 / LN_10 * unc / spec.fluxes[i]);
            ext.npts.push(spec.npts[i]);
        }
        if !ext.waves.is_empty() {
            curves.insert(name.clone(), ext);
        }
    }
    if curves.is_empty() {
        return Err(AppError::new(3, "No usable points for the extinction curve."));
    }
    Ok((label, curves))
}

/// Dust columns `AV`, `RV`, `EBV` and `LOGHI` as `(value, unc)`.
pub fn dust_columns(params: &ParamSet) -> BTreeMap<String, (f64, f64)> {
    let av = params.get(ParamId::Av);
    let rv = params.get(ParamId::Rv);
    let hi = params.get(ParamId::LogHI);
    let ebv = av.value / rv.value;
    let ebv_unc = ebv * ((av.unc / av.value).powi(2) + (rv.unc / rv.value).powi(2)).sqrt();
    BTreeMap::from([
        ("AV".to_string(), (av.value, av.unc)),
        ("RV".to_string(), (rv.value, rv.unc)),
        (
            "EBV".to_string(),
            (ebv, if ebv_unc.is_finite() { ebv_unc } else { 0.0 }),
        ),
        ("LOGHI".to_string(), (hi.value, hi.unc)),
    ])
}

/// Assemble the curve file.
pub fn build_ext_file(
    star: &StarData,
    rel_band: String,
    curves: BTreeMap<String, ExtChannel>,
    columns: BTreeMap<String, (f64, f64)>,
    fit_params: BTreeMap<String, Vec<ParamRow>>,
) -> ExtCurveFile {
    ExtCurveFile {
        tool: format!("extfit {}", env!("CARGO_PKG_VERSION")),
        generated: Utc::now(),
        star: star.name.clone(),
        ext_type: EXT_TYPE.to_string(),
        rel_band,
        columns,
        fit_params,
        curves,
    }
}

/// Write a curve JSON file.
pub fn write_ext_json(path: &Path, curve: &ExtCurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))?;
    info!(path = %path.display(), "wrote extinction curve");
    Ok(())
}

/// Read a curve JSON file.
pub fn read_ext_json(path: &Path) -> Result<ExtCurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: ExtCurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Spectrum;
    use crate::params::StellarBounds;

    fn star() -> (StarData, ChannelFluxes) {
        let mut star = StarData {
            name: "toy".to_string(),
            band_names: vec!["B".to_string(), "V".to_string()],
            ..StarData::default()
        };
        star.channels.insert(
            "BAND".to_string(),
            Spectrum {
                waves: vec![0.44, 0.55],
                fluxes: vec![1.0, 2.0],
                uncs: vec![0.01, 0.02],
                npts: vec![1.0, 1.0],
            },
        );
        star.channels.insert(
            "STIS".to_string(),
            Spectrum {
                waves: vec![0.2, 0.3, 0.4],
                fluxes: vec![0.5, -1.0, 1.0],
                uncs: vec![0.005, 0.01, 0.01],
                npts: vec![1.0, 1.0, 0.0],
            },
        );
        let model = ChannelFluxes::from([
            ("BAND".to_string(), vec![10.0, 10.0]),
            ("STIS".to_string(), vec![10.0, 10.0, 10.0]),
        ]);
        (star, model)
    }

    #[test]
    fn reference_point_has_zero_excess() {
        let (star, model) = star();
        let (label, curves) = calc_elx(&star, &model, None).unwrap();
        assert_eq!(label, "0.5500");
        assert!(curves["BAND"].exts[1].abs() < 1e-12);
        // B is half as bright as V relative to the same model: 2.5 log10(2) mag fainter.
        assert!((curves["BAND"].exts[0] - 2.5 * 2f64.log10()).abs() < 1e-12);
        // Negative flux and npts == 0 points are dropped.
        assert_eq!(curves["STIS"].waves, vec![0.2]);
        assert!((curves["STIS"].uncs[0] - 2.5 / LN_10 * 0.01).abs() < 1e-12);
    }

    #[test]
    fn named_reference_band_is_used() {
        let (star, model) = star();
        let (label, curves) = calc_elx(&star, &model, Some("B")).unwrap();
        assert_eq!(label, "B");
        assert!(curves["BAND"].exts[0].abs() < 1e-12);
        let (label, _) = calc_elx(&star, &model, Some("K")).unwrap();
        assert_eq!(label, "0.5500");
    }

    #[test]
    fn curve_json_round_trip() {
        let (star, model) = star();
        let (label, curves) = calc_elx(&star, &model, None).unwrap();
        let params = ParamSet::new(
            StellarBounds {
                log_teff: (4.4, 4.6),
                log_g: (7.5, 8.5),
                log_z: (0.0, 0.0),
            },
            17.0,
        );
        let file = build_ext_file(
            &star,
            label,
            curves,
            dust_columns(&params),
            BTreeMap::from([("MIN".to_string(), params.to_rows())]),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy_mefit_ext.json");
        write_ext_json(&path, &file).unwrap();
        let back = read_ext_json(&path).unwrap();
        assert_eq!(back.curves, file.curves);
        assert_eq!(back.columns["AV"], (0.5, 0.0));
        assert_eq!(back.fit_params["MIN"].len(), 16);
    }
}
