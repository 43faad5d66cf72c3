//! End-to-end checks: a synthetic reddened star is fitted back to its
//! injected dust parameters.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use extfit::app::pipeline::{run_fit, run_grid, run_norm_plot, run_simulate, run_stack};
use extfit::data::{GridPoint, ModelGrid, ModelSpectrum, simulate_star, simulated_channels};
use extfit::domain::{
    DEFAULT_VEL_MW, FitConfig, GridConfig, ModType, NormPlotConfig, OutputFormat, SimulateConfig,
    StackConfig, default_exclude_regions,
};
use extfit::fit::{SedProblem, minimize};
use extfit::io::read_chains_csv;
use extfit::math::logspace;
use extfit::params::{ParamId, ParamSet};

const TEFFS: [f64; 3] = [4.4, 4.5, 4.6];
const LOGGS: [f64; 3] = [7.5, 8.0, 8.5];

fn planck_like(log_teff: f64, log_g: f64, wave: f64) -> f64 {
    let x = 14387.77 / (wave * 10f64.powf(log_teff));
    (1.0 + 0.01 * (log_g - 8.0)) / (wave.powi(5) * (x.exp() - 1.0))
}

fn toy_models() -> Vec<ModelSpectrum> {
    let waves = logspace(0.09, 3.0, 3000);
    TEFFS
        .iter()
        .flat_map(|&t| LOGGS.map(|g| (t, g)))
        .map(|(t, g)| ModelSpectrum {
            point: GridPoint {
                log_teff: t,
                log_g: g,
                log_z: 0.0,
            },
            fluxes: waves.iter().map(|&w| planck_like(t, g, w)).collect(),
            waves: waves.clone(),
        })
        .collect()
}

fn write_model_files(dir: &Path) {
    write_models_named(dir, "wd_hubeny_");
}

fn write_models_named(dir: &Path, prefix: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let waves = logspace(0.09, 3.0, 3000);
    for &t in &TEFFS {
        for &g in &LOGGS {
            let path = dir.join(format!("{prefix}t{}_g{}.dat", (t * 100.0) as i64, (g * 10.0) as i64));
            let mut f = std::fs::File::create(path).unwrap();
            writeln!(f, "# logTeff = {t}").unwrap();
            writeln!(f, "# logg = {g}").unwrap();
            for &w in &waves {
                writeln!(f, "{w:.8} {:.8e}", planck_like(t, g, w)).unwrap();
            }
        }
    }
}

fn simulate_config(snr: f64) -> SimulateConfig {
    SimulateConfig {
        starname: "sim1".to_string(),
        modpath: "models".into(),
        modstr: "wd_hubeny_".to_string(),
        out: "data".into(),
        log_teff: 4.5,
        log_g: 8.0,
        av: 1.2,
        rv: 3.1,
        log_hi: 21.0,
        snr,
        seed: 7,
    }
}

#[test]
fn minimizer_recovers_injected_dust() {
    let grid = ModelGrid::from_spectra(&toy_models(), &simulated_channels()).unwrap();
    let star = simulate_star(&grid, &simulate_config(1e4)).unwrap();

    let mut params = ParamSet::new(grid.bounds(), 17.0);
    for id in ParamId::ALL {
        params.get_mut(id).fixed = true;
    }
    params.set_value(ParamId::LogTeff, 4.5);
    params.set_value(ParamId::LogG, 8.0);
    params.set_value(ParamId::LogZ, 0.0);
    params.set_value(ParamId::LogHI, 21.0);
    params.set_value(ParamId::VelMw, DEFAULT_VEL_MW);
    params.set_value(ParamId::Av, 0.6);
    params.set_value(ParamId::Rv, 4.0);
    params.get_mut(ParamId::Av).fixed = false;
    params.get_mut(ParamId::Rv).fixed = false;

    let problem = SedProblem::new(&grid, &star, params, &default_exclude_regions()).unwrap();
    assert_eq!(problem.n_free(), 2);
    let result = minimize(&problem, 2000).unwrap();

    let av = result.params.value(ParamId::Av);
    let rv = result.params.value(ParamId::Rv);
    assert!((av - 1.2).abs() / 1.2 < 0.01, "A(V) = {av}");
    assert!((rv - 3.1).abs() / 3.1 < 0.01, "R(V) = {rv}");
}

fn fit_config(root: &Path) -> FitConfig {
    FitConfig {
        starname: "sim1".to_string(),
        data_path: root.join("data"),
        modtype: ModType::Whitedwarfs,
        modpath: root.join("models"),
        modstr: "wd_hubeny_".to_string(),
        picmodel: false,
        cache_dir: root.join("cache"),
        only_bands: None,
        wind: false,
        av_init: None,
        pinned_log_hi_mw: None,
        vel_mw: DEFAULT_VEL_MW,
        exclude_regions: default_exclude_regions(),
        max_iter: 300,
        mcmc: false,
        mcmc_nsteps: 10,
        mcmc_walkers: None,
        burnfrac: 0.5,
        seed: 1,
        threads: 1,
        rel_band: Some("V".to_string()),
        resid_range: 20.0,
        rayleigh_jeans: false,
        lya_panel: true,
        showfit: true,
        formats: vec![OutputFormat::Svg],
        figs_dir: root.join("figs"),
        exts_dir: root.join("exts"),
    }
}

#[test]
fn simulate_then_fit_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    let data = dir.path().join("data");
    write_model_files(&models);

    let sim = SimulateConfig {
        modpath: models,
        out: data,
        ..simulate_config(200.0)
    };
    let star_file = run_simulate(&sim).unwrap();
    assert!(star_file.exists());

    let run = run_fit(&fit_config(dir.path())).unwrap();

    assert!(dir.path().join("cache/wd_hubeny__modinfo.bin").exists());
    assert!(dir.path().join("figs/sim1_mefit_minimizer.svg").exists());
    assert!(dir.path().join("exts/sim1_mefit_ext.json").exists());
    assert_eq!(run.curve.rel_band, "V");
    assert!(run.curve.fit_params.contains_key("MIN"));
    assert!(!run.curve.fit_params.contains_key("MCMC"));
    assert!(run.ascii.is_some());

    let columns: BTreeMap<String, (f64, f64)> = run.curve.columns.clone();
    assert!(columns["AV"].0 > 0.0);
}

#[test]
fn sampled_fit_feeds_grid_norm_plot_and_stack() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let models = root.join("models");
    let data = root.join("data");
    write_model_files(&models);
    write_models_named(&models, "wd_hubeny_cont_");

    let sim = SimulateConfig {
        modpath: models.clone(),
        out: data.clone(),
        ..simulate_config(200.0)
    };
    let star_file = run_simulate(&sim).unwrap();

    // The display name in the file differs from the name the star is requested by.
    let text = std::fs::read_to_string(&star_file).unwrap();
    assert!(text.contains("name = sim1"));
    std::fs::write(&star_file, text.replace("name = sim1", "name = HD 1")).unwrap();

    let config = FitConfig {
        mcmc: true,
        mcmc_nsteps: 20,
        mcmc_walkers: None,
        rel_band: None,
        lya_panel: false,
        showfit: false,
        ..fit_config(root)
    };
    let run = run_fit(&config).unwrap();
    assert_eq!(run.star.name, "HD 1");

    let exts = root.join("exts");
    let figs = root.join("figs");
    assert!(exts.join("sim1_mefit_ext.json").exists());
    assert!(!exts.join("HD 1_mefit_ext.json").exists());
    assert!(figs.join("sim1_mefit_mcmc.svg").exists());
    assert!(figs.join("sim1_mefit_mcmc_chains.svg").exists());
    assert!(run.curve.fit_params.contains_key("MIN"));
    assert!(run.curve.fit_params.contains_key("MCMC"));

    let (result, _) = run.sampler.as_ref().unwrap();
    let chain = read_chains_csv(&exts.join("sim1_mefit_chains.csv")).unwrap();
    let n_free = result.chain.names.len();
    assert_eq!(chain.names, result.chain.names);
    assert_eq!(chain.nsteps, 20);
    assert_eq!(chain.nwalkers % 2, 0);
    assert!(chain.nwalkers >= 2 * n_free);
    assert_eq!(chain.samples.len(), chain.nsteps * chain.nwalkers);
    assert!(chain.samples.iter().all(|s| s.len() == n_free));

    let cache = root.join("cache");
    let cached = run_grid(&GridConfig {
        starname: "sim1".to_string(),
        path: data.clone(),
        modpath: models,
        modstr: "wd_hubeny_".to_string(),
        cache_dir: cache.clone(),
    })
    .unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cache.join("wd_hubeny__modinfo.bin").exists());
    assert!(cache.join("wd_hubeny__contmodinfo.bin").exists());

    let plotted = run_norm_plot(&NormPlotConfig {
        starname: "sim1".to_string(),
        obspath: data.clone(),
        picmodname: cache.join("wd_hubeny__modinfo.bin"),
        only_bands: None,
        burnfrac: 0.5,
        exts_dir: exts,
        figs_dir: figs.clone(),
        pinned_log_hi_mw: None,
        exclude_regions: default_exclude_regions(),
        formats: vec![OutputFormat::Svg],
    })
    .unwrap();
    assert!(plotted.ascii.is_none());
    assert!(figs.join("sim1_mefit_norm.svg").exists());
    let saved_hi_mw = run.start.value(ParamId::LogHIMw);
    assert!((plotted.params.value(ParamId::LogHIMw) - saved_hi_mw).abs() < 1e-9);

    let stacked = run_stack(&StackConfig {
        starnames: vec!["sim1".to_string()],
        path: data,
        uv: true,
        channel: "STIS".to_string(),
        out: figs.join("stack"),
        formats: vec![OutputFormat::Svg],
    })
    .unwrap();
    assert_eq!(stacked.len(), 1);
    assert!(figs.join("stack.svg").exists());
}
