//! Stacked spectra of several stars (`stack`).
//!
//! Each star is divided by its median flux in a normalization window and
//! offset multiplicatively by `10^(offset·i)`. Stars are ordered by their UV
//! slope, the ratio of the median flux near 0.15 µm to that near 0.28 µm.

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::domain::{CHANNEL_BAND, StarData};
use crate::math::nan_median;
use crate::plot::fit::{Trace, draw_trace};
use crate::plot::{DrawResult, Figure};
use crate::plot::style;

/// Half width (micron) of the windows used for the UV slope.
const SLOPE_HALF_WIDTH: f64 = 0.01;
const SLOPE_BLUE: f64 = 0.15;
const SLOPE_RED: f64 = 0.28;

const STACK_COLORS: [RGBColor; 2] = [RGBColor(0, 0, 255), RGBColor(0, 128, 0)];

/// Windows, offsets and axis limits for one stack flavor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackLayout {
    pub norm_window: (f64, f64),
    pub label_window: (f64, f64),
    /// Offset between consecutive stars in dex.
    pub offset: f64,
    /// Label position relative to the spectrum in dex.
    pub label_offset: f64,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub norm_label: &'static str,
}

impl StackLayout {
    pub fn new(uv: bool) -> Self {
        if uv {
            Self {
                norm_window: (0.25, 0.29),
                label_window: (0.13, 0.14),
                offset: 0.2,
                label_offset: -0.07,
                x_range: (0.11, 0.35),
                y_range: (1e-1, 1e5),
                norm_label: "0.27",
            }
        } else {
            Self {
                norm_window: (0.5, 0.8),
                label_window: (0.5, 0.8),
                offset: 0.5,
                label_offset: -0.15,
                x_range: (0.1, 2.5),
                y_range: (1e-2, 1e12),
                norm_label: "0.65",
            }
        }
    }
}

/// Median flux of all usable points of `star` inside `window`.
pub fn window_median(star: &StarData, window: (f64, f64)) -> Option<f64> {
    nan_median(star.channels.values().flat_map(|s| {
        (0..s.len())
            .filter(move |&i| s.npts[i] > 0.0 && s.waves[i] >= window.0 && s.waves[i] <= window.1)
            .map(move |i| s.fluxes[i])
    }))
}

/// Ratio of the median flux near 0.15 µm to that near 0.28 µm in `channel`.
pub fn uv_slope(star: &StarData, channel: &str) -> Option<f64> {
    let spec = star.channel(channel)?;
    let median_near = |center: f64| {
        nan_median(
            (0..spec.len())
                .filter(|&i| spec.npts[i] > 0.0 && (spec.waves[i] - center).abs() < SLOPE_HALF_WIDTH)
                .map(|i| spec.fluxes[i]),
        )
    };
    let ratio = median_near(SLOPE_BLUE)? / median_near(SLOPE_RED)?;
    ratio.is_finite().then_some(ratio)
}

/// Indices sorted by ascending slope; stars without a slope go last in input order.
pub fn stack_order(slopes: &[Option<f64>]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..slopes.len()).collect();
    idx.sort_by(|&a, &b| match (slopes[a], slopes[b]) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    idx
}

/// One star of the stack, already normalized and offset.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub label: String,
    pub traces: Vec<Trace>,
    pub label_at: Option<(f64, f64)>,
}

pub struct StackFigure {
    pub title: String,
    pub layout: StackLayout,
    pub entries: Vec<StackEntry>,
}

impl StackFigure {
    /// Stars are drawn bottom-up in the given order.
    pub fn new(title: impl Into<String>, stars: &[StarData], layout: StackLayout) -> Self {
        let mut entries = Vec::with_capacity(stars.len());
        for (i, star) in stars.iter().enumerate() {
            let Some(norm) = window_median(star, layout.norm_window).filter(|n| *n > 0.0) else {
                tracing::warn!(star = %star.name, "no flux in the normalization window, skipped");
                continue;
            };
            let factor = 10f64.powf(layout.offset * i as f64) / norm;
            let color = STACK_COLORS[i % STACK_COLORS.len()];

            let traces = star
                .channels
                .iter()
                .map(|(name, spec)| Trace {
                    label: String::new(),
                    color,
                    points: (0..spec.len())
                        .filter(|&j| spec.npts[j] > 0.0)
                        .map(|j| (spec.waves[j], spec.fluxes[j] * factor))
                        .filter(|p| p.1.is_finite() && p.1 > 0.0)
                        .collect(),
                    markers: name == CHANNEL_BAND,
                })
                .collect();

            let label_at = window_median(star, layout.label_window).filter(|v| *v > 0.0).map(|v| {
                let x = layout.label_window.0;
                (x, v * factor * 10f64.powf(layout.label_offset))
            });

            entries.push(StackEntry {
                label: format!("{} {}", star.name, star.sptype.as_deref().unwrap_or_default()).trim_end().to_string(),
                traces,
                label_at,
            });
        }
        Self {
            title: title.into(),
            layout,
            entries,
        }
    }
}

impl Figure for StackFigure {
    fn size(&self) -> (u32, u32) {
        (1000, 1000)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
        root.fill(&WHITE)?;
        let l = &self.layout;
        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, ("sans-serif", 22))
            .margin(15)
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 45)
            .build_cartesian_2d((l.x_range.0..l.x_range.1).log_scale(), (l.y_range.0..l.y_range.1).log_scale())?;
        chart
            .configure_mesh()
            .x_desc(style::WAVE_LABEL)
            .y_desc(format!("F(λ)/F({} µm) + offset", l.norm_label))
            .x_label_formatter(&|v| format!("{v:.2}"))
            .y_label_formatter(&|v| format!("{v:.0e}"))
            .draw()?;

        for entry in &self.entries {
            for trace in &entry.traces {
                draw_trace(&mut chart, trace)?;
            }
            if let Some(at) = entry.label_at {
                chart.draw_series(std::iter::once(Text::new(
                    entry.label.clone(),
                    at,
                    ("sans-serif", 12).into_font(),
                )))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Spectrum;

    fn star(name: &str, blue: f64, red: f64) -> StarData {
        let mut s = StarData {
            name: name.to_string(),
            sptype: Some("DA".to_string()),
            ..StarData::default()
        };
        s.channels.insert(
            "STIS".to_string(),
            Spectrum {
                waves: vec![0.145, 0.15, 0.155, 0.27, 0.28, 0.6],
                fluxes: vec![blue, blue, blue, red, red, 1.0],
                uncs: vec![0.1; 6],
                npts: vec![1.0; 6],
            },
        );
        s
    }

    #[test]
    fn stars_sort_by_uv_slope() {
        let stars = [star("a", 3.0, 1.0), star("b", 1.0, 1.0), star("c", 2.0, 1.0)];
        let slopes: Vec<Option<f64>> = stars.iter().map(|s| uv_slope(s, "STIS")).collect();
        assert_eq!(slopes[0], Some(3.0));
        assert_eq!(stack_order(&slopes), vec![1, 2, 0]);
        assert_eq!(stack_order(&[None, Some(2.0), Some(1.0)]), vec![2, 1, 0]);
        assert_eq!(uv_slope(&stars[0], "IUE"), None);
    }

    #[test]
    fn entries_are_normalized_and_offset() {
        let layout = StackLayout::new(false);
        let stars = [star("a", 3.0, 1.0), star("b", 3.0, 1.0)];
        let fig = StackFigure::new("stack", &stars, layout);
        assert_eq!(fig.entries.len(), 2);
        assert_eq!(fig.entries[0].label, "a DA");
        let at = |e: &StackEntry| e.traces[0].points.iter().find(|p| p.0 == 0.6).map(|p| p.1);
        assert_eq!(at(&fig.entries[0]), Some(1.0));
        let second = at(&fig.entries[1]).unwrap();
        assert!((second - 10f64.powf(0.5)).abs() < 1e-12);
    }
}
