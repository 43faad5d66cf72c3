//! Named parameter set used by the fitters.
//!
//! Every physical parameter carries a value, an uncertainty, hard bounds, a
//! fixed flag and an optional Gaussian prior. The optimizer never sees the
//! names: it works on the **free vector**, i.e. the entries of
//! `compress(full) ++ [velocity, windamp, windalpha]` whose parameter is not
//! fixed. Every update from an optimizer goes back through
//! [`layout::expand`](super::layout::expand), so the pinned trailing slot is
//! re-applied on each evaluation.

use crate::domain::ParamRow;
use crate::error::AppError;
use crate::params::layout::{self, FIT_LEN, FULL_LEN};

/// Identifier of a named parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    LogTeff,
    LogG,
    LogZ,
    Av,
    Rv,
    C2,
    B3,
    C4,
    X0,
    Gamma,
    LogHI,
    LogHIMw,
    Velocity,
    VelMw,
    WindAmp,
    WindAlpha,
}

/// Number of named parameters.
pub const N_PARAMS: usize = 16;

/// Order of the full physical vector (see [`layout`]).
pub const FULL_ORDER: [ParamId; FULL_LEN] = [
    ParamId::LogTeff,
    ParamId::LogG,
    ParamId::LogZ,
    ParamId::Av,
    ParamId::Rv,
    ParamId::C2,
    ParamId::B3,
    ParamId::C4,
    ParamId::X0,
    ParamId::Gamma,
    ParamId::LogHI,
    ParamId::LogHIMw,
];

/// Parameters appended after the compressed vector.
pub const EXTRA_ORDER: [ParamId; 3] = [ParamId::Velocity, ParamId::WindAmp, ParamId::WindAlpha];

/// Order of the optimizer-facing vector: `compress(FULL_ORDER) ++ EXTRA_ORDER`.
pub const FIT_ORDER: [ParamId; FIT_LEN + 3] = [
    ParamId::LogTeff,
    ParamId::LogG,
    ParamId::Av,
    ParamId::Rv,
    ParamId::C2,
    ParamId::B3,
    ParamId::C4,
    ParamId::X0,
    ParamId::Gamma,
    ParamId::LogHI,
    ParamId::Velocity,
    ParamId::WindAmp,
    ParamId::WindAlpha,
];

impl ParamId {
    pub const ALL: [ParamId; N_PARAMS] = [
        ParamId::LogTeff,
        ParamId::LogG,
        ParamId::LogZ,
        ParamId::Av,
        ParamId::Rv,
        ParamId::C2,
        ParamId::B3,
        ParamId::C4,
        ParamId::X0,
        ParamId::Gamma,
        ParamId::LogHI,
        ParamId::LogHIMw,
        ParamId::Velocity,
        ParamId::VelMw,
        ParamId::WindAmp,
        ParamId::WindAlpha,
    ];

    /// Name used in tables, chain files and saved curves.
    pub fn name(self) -> &'static str {
        match self {
            ParamId::LogTeff => "logTeff",
            ParamId::LogG => "logg",
            ParamId::LogZ => "logZ",
            ParamId::Av => "Av",
            ParamId::Rv => "Rv",
            ParamId::C2 => "C2",
            ParamId::B3 => "B3",
            ParamId::C4 => "C4",
            ParamId::X0 => "xo",
            ParamId::Gamma => "gamma",
            ParamId::LogHI => "logHI",
            ParamId::LogHIMw => "logHI_MW",
            ParamId::Velocity => "velocity",
            ParamId::VelMw => "vel_MW",
            ParamId::WindAmp => "windamp",
            ParamId::WindAlpha => "windalpha",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: f64,
    pub unc: f64,
    pub bounds: (f64, f64),
    pub fixed: bool,
    /// Gaussian prior `(mean, sigma)`.
    pub prior: Option<(f64, f64)>,
}

impl Param {
    fn new(value: f64, bounds: (f64, f64)) -> Self {
        Self {
            value,
            unc: 0.0,
            bounds,
            fixed: false,
            prior: None,
        }
    }

    fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn in_bounds(&self, value: f64) -> bool {
        value >= self.bounds.0 && value <= self.bounds.1
    }
}

/// Axis ranges of the stellar model grid, used as bounds for the stellar parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StellarBounds {
    pub log_teff: (f64, f64),
    pub log_g: (f64, f64),
    pub log_z: (f64, f64),
}

/// The full set of named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    params: Vec<Param>,
    pinned_tail: f64,
}

impl ParamSet {
    /// Default starting point and bounds.
    ///
    /// Stellar parameters start mid-grid; `logZ`, `logHI_MW`, `vel_MW` and the
    /// wind parameters start fixed.
    pub fn new(stellar: StellarBounds, pinned_tail: f64) -> Self {
        let mid = |(lo, hi): (f64, f64)| 0.5 * (lo + hi);
        let params = ParamId::ALL
            .iter()
            .map(|id| match id {
                ParamId::LogTeff => Param::new(mid(stellar.log_teff), stellar.log_teff),
                ParamId::LogG => Param::new(mid(stellar.log_g), stellar.log_g),
                ParamId::LogZ => Param::new(mid(stellar.log_z), stellar.log_z).fixed(),
                ParamId::Av => Param::new(0.5, (0.0, 10.0)),
                ParamId::Rv => Param::new(3.1, (2.0, 6.0)),
                ParamId::C2 => Param::new(0.73, (-0.1, 5.0)),
                ParamId::B3 => Param::new(3.6, (-1.0, 6.0)),
                ParamId::C4 => Param::new(0.4, (-0.5, 1.5)),
                ParamId::X0 => Param::new(4.59, (4.5, 4.9)),
                ParamId::Gamma => Param::new(0.89, (0.6, 1.7)),
                ParamId::LogHI => Param::new(20.0, (16.0, 24.0)),
                ParamId::LogHIMw => Param::new(pinned_tail, (16.0, 24.0)).fixed(),
                ParamId::Velocity => Param::new(0.0, (-1000.0, 1000.0)),
                ParamId::VelMw => Param::new(0.0, (-500.0, 500.0)).fixed(),
                ParamId::WindAmp => Param::new(0.0, (0.0, 1.0)).fixed(),
                ParamId::WindAlpha => Param::new(1.0, (-5.0, 5.0)).fixed(),
            })
            .collect();
        Self { params, pinned_tail }
    }

    pub fn get(&self, id: ParamId) -> &Param {
        &self.params[id.index()]
    }

    pub fn get_mut(&mut self, id: ParamId) -> &mut Param {
        &mut self.params[id.index()]
    }

    pub fn value(&self, id: ParamId) -> f64 {
        self.get(id).value
    }

    pub fn set_value(&mut self, id: ParamId, value: f64) {
        self.get_mut(id).value = value;
    }

    pub fn pinned_tail(&self) -> f64 {
        self.pinned_tail
    }

    /// Change the pinned `logHI_MW` and its current value together.
    pub fn set_pinned_tail(&mut self, value: f64) {
        self.pinned_tail = value;
        self.set_value(ParamId::LogHIMw, value);
    }

    /// Whether the IR wind stage takes part in the model.
    pub fn wind_enabled(&self) -> bool {
        !self.get(ParamId::WindAmp).fixed || self.value(ParamId::WindAmp) != 0.0
    }

    /// Full physical vector in [`FULL_ORDER`].
    pub fn full_vector(&self) -> Vec<f64> {
        FULL_ORDER.iter().map(|&id| self.value(id)).collect()
    }

    /// Optimizer-facing vector in [`FIT_ORDER`], fixed entries included.
    pub fn fit_vector(&self) -> Result<Vec<f64>, AppError> {
        let mut fit = layout::compress(&self.full_vector())?;
        fit.extend(EXTRA_ORDER.iter().map(|&id| self.value(id)));
        Ok(fit)
    }

    /// Write back a vector in [`FIT_ORDER`].
    ///
    /// The full vector is rebuilt with [`layout::expand`]: `logZ` is taken from
    /// the current set and `logHI_MW` is set to the pinned value.
    pub fn apply_fit_vector(&mut self, fit: &[f64]) -> Result<(), AppError> {
        if fit.len() != FIT_ORDER.len() {
            return Err(AppError::new(
                4,
                format!("Fit vector has {} values, expected {}.", fit.len(), FIT_ORDER.len()),
            ));
        }
        let full = layout::expand(&fit[..FIT_LEN], self.value(ParamId::LogZ), self.pinned_tail)?;
        for (&id, &v) in FULL_ORDER.iter().zip(full.iter()) {
            self.set_value(id, v);
        }
        for (&id, &v) in EXTRA_ORDER.iter().zip(fit[FIT_LEN..].iter()) {
            self.set_value(id, v);
        }
        Ok(())
    }

    /// Positions in [`FIT_ORDER`] of the parameters that are free.
    pub fn free_indices(&self) -> Vec<usize> {
        FIT_ORDER
            .iter()
            .enumerate()
            .filter(|(_, id)| !self.get(**id).fixed)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn free_ids(&self) -> Vec<ParamId> {
        self.free_indices().into_iter().map(|i| FIT_ORDER[i]).collect()
    }

    pub fn free_names(&self) -> Vec<&'static str> {
        self.free_ids().into_iter().map(ParamId::name).collect()
    }

    pub fn free_values(&self) -> Vec<f64> {
        self.free_ids().into_iter().map(|id| self.value(id)).collect()
    }

    /// Set the free parameters from an optimizer vector (and optionally their uncertainties).
    pub fn set_free_values(&mut self, values: &[f64], uncs: Option<&[f64]>) -> Result<(), AppError> {
        let free = self.free_indices();
        if values.len() != free.len() {
            return Err(AppError::new(
                4,
                format!("Expected {} free values, got {}.", free.len(), values.len()),
            ));
        }
        let mut fit = self.fit_vector()?;
        for (&i, &v) in free.iter().zip(values) {
            fit[i] = v;
        }
        self.apply_fit_vector(&fit)?;

        if let Some(uncs) = uncs {
            for (&i, &u) in free.iter().zip(uncs) {
                self.get_mut(FIT_ORDER[i]).unc = u;
            }
        }
        Ok(())
    }

    /// Sum of log priors; `-inf` outside bounds.
    pub fn ln_prior(&self) -> f64 {
        let mut lnp = 0.0;
        for id in ParamId::ALL {
            let p = self.get(id);
            if p.fixed {
                continue;
            }
            if !p.in_bounds(p.value) {
                return f64::NEG_INFINITY;
            }
            if let Some((mean, sigma)) = p.prior {
                let z = (p.value - mean) / sigma;
                lnp -= 0.5 * z * z;
            }
        }
        lnp
    }

    /// Table of all parameters for saving.
    pub fn to_rows(&self) -> Vec<ParamRow> {
        ParamId::ALL
            .iter()
            .map(|&id| {
                let p = self.get(id);
                ParamRow {
                    name: id.name().to_string(),
                    value: p.value,
                    unc: p.unc,
                    fixed: p.fixed,
                    prior: p.prior,
                }
            })
            .collect()
    }

    /// Restore values, fixed flags and priors from a saved table.
    ///
    /// Unknown names are rejected; parameters missing from the table keep their
    /// current state.
    pub fn apply_rows(&mut self, rows: &[ParamRow]) -> Result<(), AppError> {
        for row in rows {
            let id = ParamId::from_name(&row.name).ok_or_else(|| {
                AppError::new(2, format!("Unknown parameter '{}' in saved table.", row.name))
            })?;
            let p = self.get_mut(id);
            p.value = row.value;
            p.unc = row.unc;
            p.fixed = row.fixed;
            p.prior = row.prior;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Param)> {
        ParamId::ALL.into_iter().zip(self.params.iter())
    }
}
