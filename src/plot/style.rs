//! Colors and labels shared by the figures.

use plotters::style::RGBColor;

/// Per-channel color, keyed on the grating / instrument name.
pub fn channel_color(name: &str) -> RGBColor {
    match name {
        "BAND" => RGBColor(0, 0, 0),
        "STIS_G140L" | "STIS" => RGBColor(75, 0, 130),
        "STIS_G230L" => RGBColor(238, 130, 238),
        "STIS_G430L" => RGBColor(0, 0, 255),
        "STIS_G750L" => RGBColor(0, 128, 0),
        "WFC3_G102" => RGBColor(255, 165, 0),
        "WFC3_G141" => RGBColor(255, 69, 0),
        "IUE" => RGBColor(0, 128, 128),
        "MODEL_FULL_LOWRES" => RGBColor(0, 0, 0),
        _ => fallback_color(name),
    }
}

/// Stable color for channel names without an assigned one.
fn fallback_color(name: &str) -> RGBColor {
    const PALETTE: [RGBColor; 6] = [
        RGBColor(31, 119, 180),
        RGBColor(214, 39, 40),
        RGBColor(148, 103, 189),
        RGBColor(140, 86, 75),
        RGBColor(227, 119, 194),
        RGBColor(127, 127, 127),
    ];
    let h = name.bytes().fold(0usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
    PALETTE[h % PALETTE.len()]
}

/// Stellar-only model.
pub const STELLAR_COLOR: RGBColor = RGBColor(128, 128, 128);
/// Model after dust extinction.
pub const DUST_COLOR: RGBColor = RGBColor(0, 158, 115);
/// Full model.
pub const MODEL_COLOR: RGBColor = RGBColor(213, 94, 0);

/// Flux axis label, in `λ⁴ F(λ)` units when `rayleigh_jeans` is set.
pub fn flux_label(rayleigh_jeans: bool) -> &'static str {
    if rayleigh_jeans { "λ⁴ F(λ) [RJ units]" } else { "F(λ) [ergs cm⁻² s⁻¹ Å⁻¹]" }
}

pub const WAVE_LABEL: &str = "λ [µm]";
