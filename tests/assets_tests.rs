mod support;

use image::{Rgba, RgbaImage};
use schemasnap::assets::{
    crop_top, load_image, parse_hex_color, recolor, remove_background, save_png, square_icon,
    Palette, Thresholds,
};
use schemasnap::Error;

use support::unique_temp_dir;

const GOLD: Rgba<u8> = Rgba([200, 150, 60, 255]);

fn logo_on_white() -> RgbaImage {
    let mut image = RgbaImage::from_pixel(10, 6, Rgba([250, 250, 250, 255]));
    for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
        image.put_pixel(x, y, Rgba([20, 20, 20, 255]));
    }
    image.put_pixel(6, 2, GOLD);
    image
}

#[test]
fn clean_and_recolor_survive_a_png_round_trip() {
    let temp = unique_temp_dir("schemasnap_assets");
    let input = temp.join("logo.png");
    save_png(&input, &logo_on_white()).expect("should save input");

    let mut image = load_image(&input).expect("should load input");
    let thresholds = Thresholds::default();
    assert_eq!(remove_background(&mut image, &thresholds), 55);

    let palette = Palette {
        dark: parse_hex_color("#112233").expect("valid color"),
        ..Palette::default()
    };
    assert_eq!(recolor(&mut image, &palette, &thresholds, false), 5);

    let output = temp.join("nested/logo_clean.png");
    save_png(&output, &image).expect("should save output");
    let reloaded = load_image(&output).expect("should reload output");

    assert_eq!(reloaded.dimensions(), (10, 6));
    assert_eq!(reloaded.get_pixel(0, 0).0[3], 0);
    assert_eq!(*reloaded.get_pixel(2, 2), Rgba([0x11, 0x22, 0x33, 255]));
    assert_eq!(*reloaded.get_pixel(6, 2), Rgba([0xC5, 0xA0, 0x59, 255]));
}

#[test]
fn icons_are_square_and_padded() {
    let mut image = logo_on_white();
    remove_background(&mut image, &Thresholds::default());

    let transparent = square_icon(&image, 16, 2, None);
    assert_eq!(transparent.dimensions(), (16, 16));
    assert_eq!(transparent.get_pixel(0, 0).0[3], 0);

    let white = parse_hex_color("FFFFFF").expect("valid color");
    let filled = square_icon(&image, 16, 2, Some(white));
    assert_eq!(*filled.get_pixel(0, 0), white);
    assert_eq!(*filled.get_pixel(15, 15), white);
}

#[test]
fn crop_top_keeps_the_requested_fraction() {
    let cropped = crop_top(&logo_on_white(), 0.5);
    assert_eq!(cropped.dimensions(), (10, 3));
    assert_eq!(*cropped.get_pixel(6, 2), GOLD);
}

#[test]
fn thresholds_files_override_defaults() {
    let temp = unique_temp_dir("schemasnap_thresholds");
    let path = temp.join("thresholds.json");
    std::fs::write(&path, r#"{"dark_max": 30}"#).expect("should write thresholds");

    let thresholds = Thresholds::load(&path).expect("should load thresholds");
    assert_eq!(thresholds.dark_max, 30);
    assert_eq!(thresholds.light_min, Thresholds::default().light_min);

    std::fs::write(&path, r#"{"darkness": 30}"#).expect("should write thresholds");
    assert!(matches!(
        Thresholds::load(&path),
        Err(Error::Json { what: "thresholds", .. })
    ));
}

#[test]
fn missing_image_is_reported_with_its_path() {
    let temp = unique_temp_dir("schemasnap_missing_image");
    let err = load_image(&temp.join("nope.png")).expect_err("should fail");
    assert!(err.to_string().contains("nope.png"));
}
