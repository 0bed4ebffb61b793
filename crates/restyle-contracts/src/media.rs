use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// An image held fully in memory together with its content type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_base64(mime_type: &str, data: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .context("image base64 decode failed")?;
        Ok(Self::new(mime_type, bytes))
    }

    /// Parses a `data:<mime>;base64,<data>` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let Some(rest) = data_url.trim().strip_prefix("data:") else {
            bail!("not a data URL");
        };
        let Some((header, data)) = rest.split_once(',') else {
            bail!("data URL has no payload separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("data URL payload is not base64 encoded");
        };
        if mime_type.is_empty() {
            bail!("data URL is missing a content type");
        }
        Self::from_base64(mime_type, data)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Content type of a data URL: the text between the first `:` and the first `;`.
pub fn mime_type_of(data_url: &str) -> Option<&str> {
    let start = data_url.find(':')? + 1;
    let end = data_url.find(';')?;
    if end < start {
        return None;
    }
    let mime = &data_url[start..end];
    (!mime.is_empty()).then_some(mime)
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("image/")
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// File extension to use when writing an image of the given content type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{extension_for_mime, mime_for_path, mime_type_of, ImagePayload};

    #[test]
    fn data_url_decodes_into_payload() -> anyhow::Result<()> {
        let payload = ImagePayload::from_data_url("data:image/png;base64,aGVsbG8=")?;
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.bytes, b"hello".to_vec());
        assert_eq!(payload.to_data_url(), "data:image/png;base64,aGVsbG8=");
        Ok(())
    }

    #[test]
    fn malformed_data_urls_are_rejected() {
        assert!(ImagePayload::from_data_url("image/png;base64,aGVsbG8=").is_err());
        assert!(ImagePayload::from_data_url("data:image/png;base64").is_err());
        assert!(ImagePayload::from_data_url("data:image/png,aGVsbG8=").is_err());
        assert!(ImagePayload::from_data_url("data:;base64,aGVsbG8=").is_err());
        assert!(ImagePayload::from_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn mime_type_is_extracted_between_colon_and_semicolon() {
        assert_eq!(
            mime_type_of("data:image/webp;base64,AAAA"),
            Some("image/webp")
        );
        assert_eq!(mime_type_of("image/webp,AAAA"), None);
        assert_eq!(mime_type_of("data:;base64,AAAA"), None);
    }

    #[test]
    fn image_types_only() {
        assert!(ImagePayload::new("image/jpeg", vec![1]).is_image());
        assert!(!ImagePayload::new("application/pdf", vec![1]).is_image());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(mime_for_path(Path::new("room.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("room.webp")), Some("image/webp"));
        assert_eq!(mime_for_path(Path::new("notes.txt")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
    }
}
