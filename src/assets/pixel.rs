use std::path::Path;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{read_text_lossy, Error, Result};

/// Cut-offs for [`classify_pixel`]. Every field has a default, so a JSON
/// file only needs the values it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Every channel above this is light background.
    pub light_min: u8,
    /// Largest channel spread still counted as gray.
    pub gray_spread: u8,
    /// Gray pixels brighter than this are background (checkerboards).
    pub gray_min: u8,
    /// Every channel below this is dark ink.
    pub dark_max: u8,
    /// Minimum red for the accent hue.
    pub accent_red_min: u8,
    /// Minimum green for the accent hue.
    pub accent_green_min: u8,
    /// Accent needs red > green + step and green > blue + step.
    pub accent_step: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            light_min: 200,
            gray_spread: 20,
            gray_min: 150,
            dark_max: 60,
            accent_red_min: 130,
            accent_green_min: 90,
            accent_step: 15,
        }
    }
}

impl Thresholds {
    /// Parse thresholds from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::Json {
            what: "thresholds",
            source,
        })
    }

    /// Load a thresholds file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read_text_lossy(path)?)
    }
}

/// What a pixel looks like to the logo tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelClass {
    /// Fully transparent.
    Transparent,
    /// Light or light-gray backdrop.
    Background,
    /// Near-black ink.
    Dark,
    /// Warm gold accent.
    Accent,
    /// Anything else (anti-aliasing fringe, stray colors).
    Other,
}

/// Classify one pixel.
pub fn classify_pixel(pixel: Rgba<u8>, thresholds: &Thresholds) -> PixelClass {
    let [r, g, b, a] = pixel.0;
    if a == 0 {
        return PixelClass::Transparent;
    }
    if r < thresholds.dark_max && g < thresholds.dark_max && b < thresholds.dark_max {
        return PixelClass::Dark;
    }
    let step = u16::from(thresholds.accent_step);
    if r > thresholds.accent_red_min
        && g > thresholds.accent_green_min
        && u16::from(r) > u16::from(g) + step
        && u16::from(g) > u16::from(b) + step
    {
        return PixelClass::Accent;
    }
    let light = r > thresholds.light_min && g > thresholds.light_min && b > thresholds.light_min;
    let spread = r.max(g).max(b) - r.min(g).min(b);
    let gray = spread < thresholds.gray_spread && r > thresholds.gray_min;
    if light || gray {
        PixelClass::Background
    } else {
        PixelClass::Other
    }
}

/// Target colors for [`recolor`](crate::assets::recolor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    /// Replacement for [`PixelClass::Dark`].
    pub dark: Rgba<u8>,
    /// Replacement for [`PixelClass::Accent`].
    pub accent: Rgba<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            dark: Rgba([0, 0, 0, 255]),
            accent: Rgba([0xC5, 0xA0, 0x59, 255]),
        }
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` (the `#` is optional).
pub fn parse_hex_color(text: &str) -> Result<Rgba<u8>> {
    let invalid = || Error::InvalidColor(text.to_string());
    let hex = text.trim().trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_logo_palette() {
        let t = Thresholds::default();
        assert_eq!(classify_pixel(Rgba([9, 9, 9, 0]), &t), PixelClass::Transparent);
        assert_eq!(classify_pixel(Rgba([10, 12, 8, 255]), &t), PixelClass::Dark);
        assert_eq!(classify_pixel(Rgba([197, 160, 89, 255]), &t), PixelClass::Accent);
        assert_eq!(classify_pixel(Rgba([250, 250, 250, 255]), &t), PixelClass::Background);
        assert_eq!(classify_pixel(Rgba([170, 172, 168, 255]), &t), PixelClass::Background);
        assert_eq!(classify_pixel(Rgba([40, 90, 200, 255]), &t), PixelClass::Other);
    }

    #[test]
    fn thresholds_fill_missing_fields_with_defaults() {
        let t = Thresholds::from_json(r#"{"dark_max": 100}"#).expect("should parse");
        assert_eq!(t.dark_max, 100);
        assert_eq!(t.light_min, Thresholds::default().light_min);
        assert!(Thresholds::from_json(r#"{"darkmax": 1}"#).is_err());
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#C5A059").expect("color"), Rgba([197, 160, 89, 255]));
        assert_eq!(parse_hex_color("00000080").expect("color"), Rgba([0, 0, 0, 128]));
        for bad in ["#C5A05", "#GGGGGG", "", "#ééé"] {
            let err = parse_hex_color(bad).expect_err("should reject");
            assert!(err.to_string().contains("Invalid color"));
        }
    }
}
