use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use restyle_contracts::media::ImagePayload;
use restyle_contracts::session::{Message, Product};
use sha2::{Digest, Sha256};

use crate::gateway::{DesignGateway, GatewayError, GatewayResult};

const FALLBACK_DIM: u32 = 256;
const TINT_STRENGTH: f32 = 0.35;

/// Offline gateway: tints the room by a colour hashed from the instruction
/// and answers lookups and chat with canned content.
pub struct DryrunGateway;

impl DesignGateway for DryrunGateway {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn style_transform(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> GatewayResult<ImagePayload> {
        tinted_png(image, instruction)
            .map(|bytes| ImagePayload::new("image/png", bytes))
            .map_err(|err| GatewayError::GenerationFailed(format!("{err:#}")))
    }

    fn find_products(&self, _image: &ImagePayload, query: &str) -> GatewayResult<Vec<Product>> {
        let subject = query.trim();
        Ok([("Statement piece", "$49.00"), ("Coordinating accent", "$129.00")]
            .iter()
            .enumerate()
            .map(|(idx, (label, price))| Product {
                item_name: format!("{label} for \"{subject}\""),
                url: format!(
                    "https://shop.example.com/items/{}",
                    short_id(subject, idx as u64)
                ),
                price: (*price).to_string(),
            })
            .collect())
    }

    fn converse(&self, prior: &[Message], text: &str) -> GatewayResult<String> {
        Ok(format!(
            "(dry run) You said \"{}\". I can see {} earlier message(s) in this conversation.",
            text.trim(),
            prior.len()
        ))
    }
}

fn tinted_png(image: &ImagePayload, instruction: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(instruction);
    let tinted = match image::load_from_memory(&image.bytes) {
        Ok(decoded) => {
            let mut rgb = decoded.to_rgb8();
            let blend = |channel: u8, target: u8| -> u8 {
                (f32::from(channel) * (1.0 - TINT_STRENGTH) + f32::from(target) * TINT_STRENGTH)
                    .round() as u8
            };
            for pixel in rgb.pixels_mut() {
                *pixel = Rgb([
                    blend(pixel[0], r),
                    blend(pixel[1], g),
                    blend(pixel[2], b),
                ]);
            }
            rgb
        }
        Err(_) => RgbImage::from_pixel(FALLBACK_DIM, FALLBACK_DIM, Rgb([r, g, b])),
    };

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(tinted)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dry-run PNG encode failed")?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(text: &str, idx: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use restyle_contracts::media::ImagePayload;
    use restyle_contracts::session::Message;

    use super::{color_from_prompt, DryrunGateway};
    use crate::gateway::DesignGateway;

    fn grey_png(width: u32, height: u32) -> anyhow::Result<ImagePayload> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(ImagePayload::new("image/png", bytes))
    }

    #[test]
    fn transform_keeps_dimensions_and_tints() -> anyhow::Result<()> {
        let room = grey_png(8, 4)?;
        let out = DryrunGateway.style_transform(&room, "Reimagine in Bohemian")?;
        assert_eq!(out.mime_type, "image/png");
        let decoded = image::load_from_memory(&out.bytes)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 4));
        let (r, _, _) = color_from_prompt("Reimagine in Bohemian");
        let expected = (128.0f32 * (1.0f32 - 0.35f32) + f32::from(r) * 0.35f32).round() as u8;
        assert_eq!(decoded.get_pixel(0, 0)[0], expected);
        Ok(())
    }

    #[test]
    fn undecodable_input_yields_solid_swatch() -> anyhow::Result<()> {
        let out = DryrunGateway
            .refine(&ImagePayload::new("image/png", b"junk".to_vec()), "make it red")?;
        let decoded = image::load_from_memory(&out.bytes)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (256, 256));
        let (r, g, b) = color_from_prompt("make it red");
        assert_eq!(decoded.get_pixel(10, 10), &Rgb([r, g, b]));
        Ok(())
    }

    #[test]
    fn lookup_is_deterministic() -> anyhow::Result<()> {
        let room = ImagePayload::new("image/png", Vec::new());
        let first = DryrunGateway.find_products(&room, "find a lamp")?;
        let second = DryrunGateway.find_products(&room, "find a lamp")?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0].item_name.contains("\"find a lamp\""));
        assert!(first[0].url.starts_with("https://shop.example.com/items/"));
        assert_ne!(first[0].url, first[1].url);
        Ok(())
    }

    #[test]
    fn converse_mentions_history_size() -> anyhow::Result<()> {
        let reply = DryrunGateway.converse(&[Message::bot("Welcome")], "hello")?;
        assert!(reply.contains("\"hello\""));
        assert!(reply.contains("1 earlier message(s)"));
        Ok(())
    }
}
