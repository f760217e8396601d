/// Pixel classification, thresholds, and colors.
pub mod pixel;
/// Whole-image operations and PNG I/O.
pub mod transform;

pub use pixel::{classify_pixel, parse_hex_color, Palette, PixelClass, Thresholds};
pub use transform::{content_bounds, crop_top, load_image, recolor, remove_background, save_png, square_icon};
