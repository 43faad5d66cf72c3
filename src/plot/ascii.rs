//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid, log-log axes), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - broadband points: `o`
//! - spectral points: `.`
//! - model: `-` line

use crate::domain::{CHANNEL_BAND, ChannelFluxes, StarData};

/// Render observed fluxes against the scaled model.
pub fn render_ascii_sed(star: &StarData, model: &ChannelFluxes, norm: f64, width: usize, height: usize) -> String {
    let mut points = Vec::new();
    let mut curve = Vec::new();
    for (name, spec) in &star.channels {
        let marker = if name == CHANNEL_BAND { 'o' } else { '.' };
        for i in 0..spec.len() {
            if spec.npts[i] > 0.0 {
                if let Some(p) = log_point(spec.waves[i], spec.fluxes[i]) {
                    points.push((p.0, p.1, marker));
                }
            }
        }
        if let Some(m) = model.get(name) {
            curve.extend(
                spec.waves
                    .iter()
                    .zip(m)
                    .filter_map(|(&w, &f)| log_point(w, norm * f)),
            );
        }
    }
    curve.sort_by(|a, b| a.0.total_cmp(&b.0));
    render_plot(&points, &curve, width, height)
}

fn log_point(wave: f64, flux: f64) -> Option<(f64, f64)> {
    (wave > 0.0 && flux.is_finite() && flux > 0.0).then(|| (wave.log10(), flux.log10()))
}

fn render_plot(points: &[(f64, f64, char)], curve: &[(f64, f64)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let xs = points.iter().map(|p| p.0).chain(curve.iter().map(|p| p.0));
    let (x_min, x_max) = range(xs).unwrap_or((-1.0, 0.5));
    let ys = points.iter().map(|p| p.1).chain(curve.iter().map(|p| p.1));
    let (y_min, y_max) = range(ys).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max);
    for &(x, y, ch) in points {
        grid[map_y(y, y_min, y_max, height)][map_x(x, x_min, x_max, width)] = ch;
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: λ=[{:.3}, {:.3}] µm | log F=[{y_min:.2}, {y_max:.2}]\n",
        10f64.powf(x_min),
        10f64.powf(x_max)
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min.is_finite() && max.is_finite() && max > min { Some((min, max)) } else { None }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let xx = map_x(x, x_min, x_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, xx, yy, '-');
        } else {
            grid[yy][xx] = '-';
        }
        prev = Some((xx, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
