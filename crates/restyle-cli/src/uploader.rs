use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::ImageFormat;
use restyle_contracts::media::{is_image_mime, mime_for_path, ImagePayload};

/// Reads a room photo from disk. The content type comes from the file's
/// bytes when they are recognisable, otherwise from its extension; anything
/// that is not `image/*` is refused.
pub fn load_image(path: &Path) -> Result<ImagePayload> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }

    let sniffed = image::guess_format(&bytes).ok();
    let mime_type = match (sniffed, mime_for_path(path)) {
        (Some(format), _) => format.to_mime_type(),
        (None, Some(_)) if ImageFormat::from_path(path).is_ok() => {
            bail!("{} does not contain valid image data", path.display())
        }
        (None, Some(mime_type)) => mime_type,
        (None, None) => bail!("{} is not an image file", path.display()),
    };
    if !is_image_mime(mime_type) {
        bail!("{} is not an image file ({mime_type})", path.display());
    }

    if let Some(format) = sniffed {
        image::load_from_memory_with_format(&bytes, format)
            .with_context(|| format!("{} could not be decoded", path.display()))?;
    }
    Ok(ImagePayload::new(mime_type, bytes))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::load_image;

    fn encoded(format: ImageFormat) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])))
            .write_to(&mut Cursor::new(&mut bytes), format)?;
        Ok(bytes)
    }

    #[test]
    fn png_file_is_accepted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("room.png");
        fs::write(&path, encoded(ImageFormat::Png)?)?;
        let payload = load_image(&path)?;
        assert_eq!(payload.mime_type, "image/png");
        assert!(!payload.is_empty());
        Ok(())
    }

    #[test]
    fn content_wins_over_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("room.png");
        fs::write(&path, encoded(ImageFormat::Jpeg)?)?;
        assert_eq!(load_image(&path)?.mime_type, "image/jpeg");
        Ok(())
    }

    #[test]
    fn non_image_files_are_refused() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, "just some text")?;
        assert!(load_image(&notes).is_err());

        let disguised = temp.path().join("room.png");
        fs::write(&disguised, "just some text")?;
        let err = load_image(&disguised).unwrap_err();
        assert!(format!("{err:#}").contains("does not contain valid image data"));
        Ok(())
    }

    #[test]
    fn truncated_images_are_refused() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("room.png");
        let bytes = encoded(ImageFormat::Png)?;
        fs::write(&path, &bytes[..bytes.len() / 2])?;
        assert!(load_image(&path).is_err());
        Ok(())
    }

    #[test]
    fn missing_and_empty_files_are_errors() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(load_image(&temp.path().join("missing.png")).is_err());
        let empty = temp.path().join("empty.jpg");
        fs::write(&empty, b"")?;
        assert!(load_image(&empty).is_err());
        Ok(())
    }
}
