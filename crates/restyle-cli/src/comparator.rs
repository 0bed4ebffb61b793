use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use restyle_contracts::media::ImagePayload;

const DIVIDER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Slider positions are percentages; out-of-range values pin to the ends.
pub fn clamp_position(position: f64) -> f64 {
    if position.is_nan() {
        return 50.0;
    }
    position.clamp(0.0, 100.0)
}

/// Before/after split at `position` percent of the width: the original on the
/// left, the generated image on the right. The original is scaled to the
/// generated image's size.
pub fn compose(original: &DynamicImage, generated: &DynamicImage, position: f64) -> RgbaImage {
    let (width, height) = generated.dimensions();
    let before = if original.dimensions() == (width, height) {
        original.to_rgba8()
    } else {
        original
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgba8()
    };
    let mut out = generated.to_rgba8();
    let split = ((f64::from(width) * clamp_position(position) / 100.0).round() as u32).min(width);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x < split {
            *pixel = *before.get_pixel(x, y);
        }
    }
    if split > 0 && split < width {
        for y in 0..height {
            out.put_pixel(split, y, DIVIDER);
        }
    }
    out
}

pub fn write_comparison(
    original: &ImagePayload,
    generated: &ImagePayload,
    position: f64,
    out: &Path,
) -> Result<()> {
    let before =
        image::load_from_memory(&original.bytes).context("original image could not be decoded")?;
    let after = image::load_from_memory(&generated.bytes)
        .context("generated image could not be decoded")?;
    DynamicImage::ImageRgba8(compose(&before, &after, position))
        .save_with_format(out, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", out.display()))
}
