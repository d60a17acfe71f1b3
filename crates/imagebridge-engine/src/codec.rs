use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use imagebridge_contracts::chat::ContentPart;

use crate::error::{truncate_text, BridgeError, Result};

pub const PNG_MIME: &str = "image/png";

/// Image file bytes plus the MIME type they were written as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn to_content_part(&self) -> ContentPart {
        ContentPart::image_url(self.to_data_url())
    }
}

/// Serializes to PNG so the round trip stays pixel-identical.
pub fn encode(image: &DynamicImage) -> Result<EncodedImage> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| BridgeError::encoding(err.to_string()))?;
    Ok(EncodedImage::new(bytes, PNG_MIME))
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(BridgeError::decoding("image data is empty"));
    }
    image::load_from_memory(bytes).map_err(|err| BridgeError::decoding(err.to_string()))
}

pub fn decode_base64(text: &str) -> Result<DynamicImage> {
    let bytes = decode_base64_bytes(text).map_err(BridgeError::decoding)?;
    decode(&bytes)
}

/// Splits `data:<mime>;base64,<payload>` into its MIME type and raw bytes.
pub fn parse_data_url(url: &str) -> Result<EncodedImage> {
    let trimmed = url.trim();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        return Err(BridgeError::malformed_data_url(format!(
            "missing data: scheme in '{}'",
            truncate_text(trimmed, 40)
        )));
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        return Err(BridgeError::malformed_data_url(format!(
            "missing ',' separator in '{}'",
            truncate_text(trimmed, 40)
        )));
    };
    let mime = meta
        .split(';')
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(PNG_MIME)
        .to_string();
    let bytes = decode_base64_bytes(payload).map_err(BridgeError::decoding)?;
    Ok(EncodedImage::new(bytes, mime))
}

pub fn decode_data_url(url: &str) -> Result<DynamicImage> {
    let encoded = parse_data_url(url)?;
    decode(encoded.bytes())
}

/// Base64 decode that tolerates line breaks inside the payload.
pub(crate) fn decode_base64_bytes(text: &str) -> std::result::Result<Vec<u8>, String> {
    let compact: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|err| format!("base64 decode failed: {err}"))
}
