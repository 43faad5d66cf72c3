//! Continuum-normalized spectra (`norm-plot`).
//!
//! Data and the full model are divided by the continuum-only model so the
//! absorption lines stand out. Zero-weight points are drawn faint.

use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::domain::{CHANNEL_BAND, ChannelFluxes, StarData};
use crate::fit::ChannelWeights;
use crate::plot::style::{self, MODEL_COLOR};
use crate::plot::{DrawResult, Figure, linear_range};

/// UV panel range (micron).
pub const UV_WINDOW: (f64, f64) = (0.11, 0.38);
/// Optical/IR panel range (micron).
pub const OPT_WINDOW: (f64, f64) = (0.35, 2.0);
/// Residual axis limits in percent.
pub const NORM_RESID_LIMIT: f64 = 10.0;

/// One spectral channel, continuum normalized.
#[derive(Debug, Clone)]
pub struct NormSeries {
    pub channel: String,
    pub color: RGBColor,
    /// Weighted data points.
    pub data: Vec<(f64, f64)>,
    /// Zero-weight data points.
    pub faint: Vec<(f64, f64)>,
    pub model: Vec<(f64, f64)>,
    /// Percent residuals of the weighted points.
    pub resid: Vec<(f64, f64)>,
}

/// `values / (scale · cont)`, `NaN` where the continuum is not positive.
pub fn continuum_normalize(values: &[f64], cont: &[f64], scale: f64) -> Vec<f64> {
    values
        .iter()
        .zip(cont)
        .map(|(&v, &c)| {
            let d = scale * c;
            if d.is_finite() && d > 0.0 { v / d } else { f64::NAN }
        })
        .collect()
}

pub struct NormSpecFigure {
    pub title: String,
    pub series: Vec<NormSeries>,
}

impl NormSpecFigure {
    /// `model` and `cont` are unscaled model fluxes; `norm` scales them to the data.
    pub fn new(
        star: &StarData,
        model: &ChannelFluxes,
        cont: &ChannelFluxes,
        norm: f64,
        weights: &ChannelWeights,
        title: impl Into<String>,
    ) -> Self {
        let mut series = Vec::new();
        for (name, spec) in &star.channels {
            if name == CHANNEL_BAND {
                continue;
            }
            let (Some(m), Some(c)) = (model.get(name), cont.get(name)) else {
                continue;
            };
            let data = continuum_normalize(&spec.fluxes, c, norm);
            let mod_norm = continuum_normalize(m, c, 1.0);
            let w = weights.get(name);

            let mut s = NormSeries {
                channel: name.clone(),
                color: style::channel_color(name),
                data: Vec::new(),
                faint: Vec::new(),
                model: Vec::new(),
                resid: Vec::new(),
            };
            for i in 0..spec.len() {
                let wave = spec.waves[i];
                if mod_norm[i].is_finite() {
                    s.model.push((wave, mod_norm[i]));
                }
                if !data[i].is_finite() || spec.npts[i] <= 0.0 {
                    continue;
                }
                let weighted = w.and_then(|w| w.get(i)).is_some_and(|&w| w > 0.0);
                if weighted {
                    s.data.push((wave, data[i]));
                    if mod_norm[i].is_finite() && mod_norm[i] != 0.0 {
                        s.resid.push((wave, 100.0 * (data[i] - mod_norm[i]) / mod_norm[i]));
                    }
                } else {
                    s.faint.push((wave, data[i]));
                }
            }
            series.push(s);
        }
        Self {
            title: title.into(),
            series,
        }
    }

    fn y_range(&self, window: (f64, f64)) -> (f64, f64) {
        let inside = |p: &&(f64, f64)| p.0 >= window.0 && p.0 <= window.1;
        let values = self
            .series
            .iter()
            .flat_map(|s| s.data.iter().chain(&s.model).filter(inside).map(|p| p.1));
        linear_range(values, 0.05)
            .map(|(lo, hi)| (lo.max(-0.1), hi.min(3.0)))
            .filter(|(lo, hi)| hi > lo)
            .unwrap_or((0.0, 1.5))
    }

    fn draw_panel<'a, DB, X>(&self, chart: &mut ChartContext<'a, DB, Cartesian2d<X, RangedCoordf64>>) -> DrawResult<DB>
    where
        DB: DrawingBackend + 'a,
        X: Ranged<ValueType = f64>,
    {
        for s in &self.series {
            let faint = s.color.mix(0.2);
            chart.draw_series(s.faint.iter().map(|&p| Circle::new(p, 1, faint.filled())))?;
            chart.draw_series(s.data.iter().map(|&p| Circle::new(p, 1, s.color.filled())))?;
            chart
                .draw_series(LineSeries::new(s.model.iter().copied(), MODEL_COLOR.stroke_width(1)))?;
        }
        Ok(())
    }
}

impl Figure for NormSpecFigure {
    fn size(&self) -> (u32, u32) {
        (1400, 900)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
        root.fill(&WHITE)?;
        let root = root.titled(&self.title, ("sans-serif", 22))?;
        let (w, h) = root.dim_in_pixel();
        let (upper, lower) = root.split_vertically((h as f64 * 0.68) as i32);
        let (uv_area, opt_area) = upper.split_horizontally((w as f64 * 0.45) as i32);

        let (y0, y1) = self.y_range(UV_WINDOW);
        let mut uv = ChartBuilder::on(&uv_area)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(UV_WINDOW.0..UV_WINDOW.1, y0..y1)?;
        uv.configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .y_desc("F(λ) / continuum")
            .draw()?;
        self.draw_panel(&mut uv)?;

        let (y0, y1) = self.y_range(OPT_WINDOW);
        let mut opt = ChartBuilder::on(&opt_area)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d((OPT_WINDOW.0..OPT_WINDOW.1).log_scale(), y0..y1)?;
        opt.configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .x_label_formatter(&|v| format!("{v:.2}"))
            .draw()?;
        self.draw_panel(&mut opt)?;

        let r = NORM_RESID_LIMIT;
        let mut resid = ChartBuilder::on(&lower)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d((UV_WINDOW.0..OPT_WINDOW.1).log_scale(), -r..r)?;
        resid
            .configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .y_desc("residual [%]")
            .x_label_formatter(&|v| format!("{v:.2}"))
            .draw()?;
        resid.draw_series(LineSeries::new(
            [(UV_WINDOW.0, 0.0), (OPT_WINDOW.1, 0.0)],
            BLACK.stroke_width(1),
        ))?;
        for s in &self.series {
            resid.draw_series(
                s.resid
                    .iter()
                    .map(|&(x, v)| Circle::new((x, v.clamp(-r, r)), 1, s.color.filled())),
            )?;
        }
        Ok(())
    }
}
