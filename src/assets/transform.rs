use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::assets::pixel::{classify_pixel, Palette, PixelClass, Thresholds};
use crate::error::{Error, Result};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Open any supported image as RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgba8())
}

/// Save as PNG, creating parent directories.
pub fn save_png(path: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Make background pixels transparent. Returns the number cleared.
pub fn remove_background(image: &mut RgbaImage, thresholds: &Thresholds) -> usize {
    let mut cleared = 0;
    for pixel in image.pixels_mut() {
        if classify_pixel(*pixel, thresholds) == PixelClass::Background {
            *pixel = TRANSPARENT;
            cleared += 1;
        }
    }
    debug!(cleared, "removed background pixels");
    cleared
}

/// Snap dark and accent pixels to the palette. Returns the number of
/// pixels changed.
///
/// With `strict`, everything that is neither dark nor accent becomes
/// transparent and recolored pixels become fully opaque; otherwise other
/// pixels are untouched and alpha is preserved.
pub fn recolor(image: &mut RgbaImage, palette: &Palette, thresholds: &Thresholds, strict: bool) -> usize {
    let mut changed = 0;
    for pixel in image.pixels_mut() {
        let alpha = if strict { 255 } else { pixel.0[3] };
        let replacement = match classify_pixel(*pixel, thresholds) {
            PixelClass::Transparent => continue,
            PixelClass::Dark => with_alpha(palette.dark, alpha),
            PixelClass::Accent => with_alpha(palette.accent, alpha),
            PixelClass::Background | PixelClass::Other if strict => TRANSPARENT,
            PixelClass::Background | PixelClass::Other => continue,
        };
        if *pixel != replacement {
            *pixel = replacement;
            changed += 1;
        }
    }
    changed
}

fn with_alpha(color: Rgba<u8>, alpha: u8) -> Rgba<u8> {
    let [r, g, b, _] = color.0;
    Rgba([r, g, b, alpha])
}

/// Bounding box `(x, y, width, height)` of non-transparent pixels.
pub fn content_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Trim to content, center on a square canvas, and resize to `size`
/// with `padding` pixels on each side.
///
/// `background` fills the canvas; `None` keeps it transparent. A fully
/// transparent input is simply resized.
pub fn square_icon(image: &RgbaImage, size: u32, padding: u32, background: Option<Rgba<u8>>) -> RgbaImage {
    let inner = size.saturating_sub(padding.saturating_mul(2)).max(1);
    let squared = match content_bounds(image) {
        Some((x, y, width, height)) => {
            let content = imageops::crop_imm(image, x, y, width, height).to_image();
            let side = width.max(height);
            let mut square = RgbaImage::from_pixel(side, side, TRANSPARENT);
            imageops::overlay(
                &mut square,
                &content,
                i64::from((side - width) / 2),
                i64::from((side - height) / 2),
            );
            square
        }
        None => image.clone(),
    };
    let resized = imageops::resize(&squared, inner, inner, FilterType::Lanczos3);

    let mut canvas = RgbaImage::from_pixel(size, size, background.unwrap_or(TRANSPARENT));
    let offset = i64::from((size - inner.min(size)) / 2);
    imageops::overlay(&mut canvas, &resized, offset, offset);
    canvas
}

/// Keep the top `fraction` of the image (e.g. the icon part of a stacked
/// logo). `fraction` is clamped to `(0, 1]`.
pub fn crop_top(image: &RgbaImage, fraction: f32) -> RgbaImage {
    let height = image.height();
    let keep = (height as f32 * fraction.clamp(0.0, 1.0)).round() as u32;
    let keep = keep.clamp(1.min(height), height);
    imageops::crop_imm(image, 0, 0, image.width(), keep).to_image()
}
