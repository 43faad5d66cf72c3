//! Fit figure: the observed SED with the model stages, plus percent residuals.
//!
//! Layout:
//!
//! ```text
//! +-----------------------------+-----------+
//! | SED (log-log)               | Lyα zoom  |  (zoom only with `lya_panel`)
//! +-----------------------------+-----------+
//! | residuals [%]                           |
//! +-----------------------------------------+
//! ```

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::data::ModelGrid;
use crate::domain::{CHANNEL_BAND, CHANNEL_FULL_LOWRES, StarData};
use crate::models::SedStages;
use crate::params::ParamSet;
use crate::plot::style::{self, DUST_COLOR, MODEL_COLOR, STELLAR_COLOR};
use crate::plot::{DrawResult, Figure, linear_range, log_range};
use crate::report::{param_annotation, percent_residuals};

/// Wavelength window of the Lyman-alpha zoom panel (micron).
pub const LYA_WINDOW: (f64, f64) = (0.115, 0.13);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitFigureOptions {
    /// Plot `λ⁴ F(λ)` instead of `F(λ)`.
    pub rayleigh_jeans: bool,
    /// Residual axis limits, `±resid_range` percent.
    pub resid_range: f64,
    pub lya_panel: bool,
}

impl Default for FitFigureOptions {
    fn default() -> Self {
        Self {
            rayleigh_jeans: false,
            resid_range: 20.0,
            lya_panel: false,
        }
    }
}

/// One drawn series. An empty label keeps it out of the legend.
#[derive(Debug, Clone)]
pub struct Trace {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
    /// Markers instead of a line.
    pub markers: bool,
}

impl Trace {
    fn within(&self, window: (f64, f64)) -> Trace {
        Trace {
            points: self
                .points
                .iter()
                .copied()
                .filter(|p| p.0 >= window.0 && p.0 <= window.1)
                .collect(),
            ..self.clone()
        }
    }
}

/// `(wave, scale·flux)` pairs for a log axis, optionally in `λ⁴ F(λ)`.
///
/// Non-positive and non-finite values are masked.
pub fn flux_points(waves: &[f64], fluxes: &[f64], scale: f64, rayleigh_jeans: bool) -> Vec<(f64, f64)> {
    waves
        .iter()
        .zip(fluxes)
        .filter_map(|(&w, &f)| {
            let y = scale * f * if rayleigh_jeans { w.powi(4) } else { 1.0 };
            (w > 0.0 && y.is_finite() && y > 0.0).then_some((w, y))
        })
        .collect()
}

pub struct FitFigure {
    pub title: String,
    pub observed: Vec<Trace>,
    pub models: Vec<Trace>,
    pub residuals: Vec<Trace>,
    pub annotation: Vec<String>,
    pub options: FitFigureOptions,
}

impl FitFigure {
    /// Prepare every series of the figure for one set of model stages.
    pub fn new(
        star: &StarData,
        grid: &ModelGrid,
        stages: &SedStages,
        norm: f64,
        params: &ParamSet,
        title: impl Into<String>,
        options: FitFigureOptions,
    ) -> Self {
        let rj = options.rayleigh_jeans;
        let resid = percent_residuals(star, &stages.full, norm);

        let mut observed = Vec::new();
        let mut models = Vec::new();
        let mut residuals = Vec::new();
        for (name, spec) in &star.channels {
            let is_band = name == CHANNEL_BAND;
            let color = style::channel_color(name);
            let fluxes: Vec<f64> = spec
                .fluxes
                .iter()
                .zip(&spec.npts)
                .map(|(&f, &n)| if n > 0.0 { f } else { f64::NAN })
                .collect();
            observed.push(Trace {
                label: name.clone(),
                color,
                points: flux_points(&spec.waves, &fluxes, 1.0, rj),
                markers: is_band,
            });

            if !is_band {
                if let Some(model) = stages.full.get(name) {
                    models.push(Trace {
                        label: String::new(),
                        color: MODEL_COLOR,
                        points: flux_points(&spec.waves, model, norm, rj),
                        markers: false,
                    });
                }
            }

            if let Some(r) = resid.get(name) {
                let points = spec
                    .waves
                    .iter()
                    .zip(r)
                    .zip(&spec.npts)
                    .filter(|((_, r), n)| r.is_finite() && **n > 0.0)
                    .map(|((&w, &r), _)| (w, r))
                    .collect();
                residuals.push(Trace {
                    label: String::new(),
                    color,
                    points,
                    markers: is_band,
                });
            }
        }

        if let Some(waves) = grid.waves.get(CHANNEL_FULL_LOWRES) {
            let stage_list = [
                ("stellar", STELLAR_COLOR, &stages.stellar),
                ("stellar + dust", DUST_COLOR, &stages.dust),
                ("full model", MODEL_COLOR, &stages.full),
            ];
            for (label, color, sed) in stage_list {
                if let Some(f) = sed.get(CHANNEL_FULL_LOWRES) {
                    models.push(Trace {
                        label: label.to_string(),
                        color,
                        points: flux_points(waves, f, norm, rj),
                        markers: false,
                    });
                }
            }
        }

        Self {
            title: title.into(),
            observed,
            models,
            residuals,
            annotation: param_annotation(params),
            options,
        }
    }

    /// Wavelength range of the observations (the models may extend further).
    fn wave_range(&self) -> Option<(f64, f64)> {
        log_range(self.observed.iter().flat_map(|t| t.points.iter().map(|p| p.0)), 0.03)
            .or_else(|| log_range(self.models.iter().flat_map(|t| t.points.iter().map(|p| p.0)), 0.03))
    }

    fn flux_range(&self) -> Option<(f64, f64)> {
        log_range(self.observed.iter().flat_map(|t| t.points.iter().map(|p| p.1)), 0.15)
    }

    fn draw_sed<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, x: (f64, f64)) -> DrawResult<DB> {
        let Some((y0, y1)) = self.flux_range() else {
            return Ok(());
        };

        let mut chart = ChartBuilder::on(area)
            .caption(&self.title, ("sans-serif", 22))
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d((x.0..x.1).log_scale(), (y0..y1).log_scale())?;

        chart
            .configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .y_desc(style::flux_label(self.options.rayleigh_jeans))
            .x_label_formatter(&|v| format!("{v:.2}"))
            .y_label_formatter(&|v| format!("{v:.1e}"))
            .draw()?;

        for trace in self.models.iter().chain(&self.observed) {
            draw_trace(&mut chart, trace)?;
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        let (_, h) = area.dim_in_pixel();
        let n = self.annotation.len() as i32;
        for (i, line) in self.annotation.iter().enumerate() {
            let y = h as i32 - 60 - 16 * (n - i as i32);
            area.draw(&Text::new(line.as_str(), (100, y), ("sans-serif", 13).into_font()))?;
        }
        Ok(())
    }

    fn draw_residuals<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, x: (f64, f64)) -> DrawResult<DB> {
        let r = self.options.resid_range.abs().max(1e-6);
        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d((x.0..x.1).log_scale(), -r..r)?;

        chart
            .configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .y_desc("residual [%]")
            .x_label_formatter(&|v| format!("{v:.2}"))
            .draw()?;

        chart.draw_series(LineSeries::new([(x.0, 0.0), (x.1, 0.0)], BLACK.stroke_width(1)))?;
        for trace in &self.residuals {
            let clipped = Trace {
                points: trace.points.iter().map(|&(w, v)| (w, v.clamp(-r, r))).collect(),
                ..trace.clone()
            };
            draw_trace(&mut chart, &clipped)?;
        }
        Ok(())
    }

    fn draw_lya<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
        let traces: Vec<Trace> = self
            .models
            .iter()
            .chain(&self.observed)
            .map(|t| t.within(LYA_WINDOW))
            .filter(|t| !t.points.is_empty())
            .collect();
        let Some((y0, y1)) = linear_range(traces.iter().flat_map(|t| t.points.iter().map(|p| p.1)), 0.05) else {
            return Ok(());
        };
        let (y0, y1) = (y0.min(0.0), y1);

        let mut chart = ChartBuilder::on(area)
            .caption("Lyα", ("sans-serif", 18))
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(LYA_WINDOW.0..LYA_WINDOW.1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .x_labels(4)
            .x_label_formatter(&|v| format!("{v:.3}"))
            .y_label_formatter(&|v| format!("{v:.1e}"))
            .draw()?;

        for trace in &traces {
            let unlabeled = Trace {
                label: String::new(),
                ..trace.clone()
            };
            draw_trace(&mut chart, &unlabeled)?;
        }
        Ok(())
    }
}

impl Figure for FitFigure {
    fn size(&self) -> (u32, u32) {
        if self.options.lya_panel { (1500, 900) } else { (1200, 900) }
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
        root.fill(&WHITE)?;
        let Some(x) = self.wave_range() else {
            return Ok(());
        };

        let (w, h) = root.dim_in_pixel();
        let (upper, lower) = root.split_vertically((h as f64 * 0.7) as i32);
        if self.options.lya_panel {
            let (main, zoom) = upper.split_horizontally((w as f64 * 0.7) as i32);
            self.draw_sed(&main, x)?;
            self.draw_lya(&zoom)?;
        } else {
            self.draw_sed(&upper, x)?;
        }
        self.draw_residuals(&lower, x)
    }
}

/// Draw a trace on a chart with any `f64` axes and register its legend entry.
pub(crate) fn draw_trace<'a, DB, X, Y>(chart: &mut ChartContext<'a, DB, Cartesian2d<X, Y>>, trace: &Trace) -> DrawResult<DB>
where
    DB: DrawingBackend + 'a,
    X: Ranged<ValueType = f64>,
    Y: Ranged<ValueType = f64>,
{
    let color = trace.color;
    if trace.markers {
        let anno = chart.draw_series(trace.points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
        if !trace.label.is_empty() {
            anno.label(trace.label.as_str())
                .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
        }
    } else {
        let anno = chart.draw_series(LineSeries::new(trace.points.iter().copied(), color.stroke_width(1)))?;
        if !trace.label.is_empty() {
            anno.label(trace.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
    }
    Ok(())
}
