//! Walker traces, one panel per sampled parameter.

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::domain::McmcChain;
use crate::plot::{DrawResult, Figure, linear_range};

const PANEL_HEIGHT: u32 = 180;
const TRACE_COLOR: RGBColor = RGBColor(31, 119, 180);

pub struct ChainFigure {
    pub title: String,
    pub names: Vec<String>,
    /// `traces[param][walker][step]`.
    pub traces: Vec<Vec<Vec<f64>>>,
    /// First step after burn-in, marked with a vertical line.
    pub burn_step: usize,
    pub nsteps: usize,
}

impl ChainFigure {
    pub fn new(title: impl Into<String>, chain: &McmcChain, burnfrac: f64) -> Self {
        let traces = (0..chain.names.len())
            .map(|p| (0..chain.nwalkers).map(|w| chain.trace(p, w)).collect())
            .collect();
        Self {
            title: title.into(),
            names: chain.names.clone(),
            traces,
            burn_step: chain.burn_steps(burnfrac),
            nsteps: chain.nsteps,
        }
    }

    fn draw_panel<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, index: usize) -> DrawResult<DB> {
        let walkers = &self.traces[index];
        let (y0, y1) = linear_range(walkers.iter().flatten().copied(), 0.05).unwrap_or((0.0, 1.0));
        let x1 = self.nsteps.max(2) as f64 - 1.0;

        let mut builder = ChartBuilder::on(area);
        builder
            .margin(8)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 30);
        if index == 0 {
            builder.caption(&self.title, ("sans-serif", 20));
        }
        let mut chart = builder.build_cartesian_2d(0.0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc(self.names[index].as_str())
            .y_labels(4)
            .draw()?;

        for walker in walkers {
            chart.draw_series(LineSeries::new(
                walker.iter().enumerate().map(|(i, &v)| (i as f64, v)),
                TRACE_COLOR.mix(0.3).stroke_width(1),
            ))?;
        }
        let b = self.burn_step as f64;
        chart.draw_series(LineSeries::new([(b, y0), (b, y1)], RED.stroke_width(1)))?;
        Ok(())
    }
}

impl Figure for ChainFigure {
    fn size(&self) -> (u32, u32) {
        (1000, PANEL_HEIGHT * self.names.len().max(1) as u32)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
        root.fill(&WHITE)?;
        if self.names.is_empty() {
            return Ok(());
        }
        let panels = root.split_evenly((self.names.len(), 1));
        for (i, panel) in panels.iter().enumerate() {
            self.draw_panel(panel, i)?;
        }
        Ok(())
    }
}
