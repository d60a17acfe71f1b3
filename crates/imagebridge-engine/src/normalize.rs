use image::DynamicImage;
use serde_json::{Map, Value};

use imagebridge_contracts::chat::ChatCompletion;

use crate::codec::{self, decode_base64_bytes};
use crate::error::{truncate_text, BridgeError, Result, TransportError};
use crate::transport::ImageFetcher;

/// Provider payload shapes the normalizer accepts.
#[derive(Debug, Clone, Copy)]
pub enum ProviderResponse<'a> {
    /// Deserialized chat/completions object.
    Completion(&'a ChatCompletion),
    /// Plain JSON mapping carrying `choices`.
    Mapping(&'a Map<String, Value>),
    /// Raw HTTP response body.
    RawBody(&'a str),
}

/// Image bytes pulled out of a response, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl GeneratedImage {
    pub fn to_raster(&self) -> Result<DynamicImage> {
        codec::decode(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedResponse {
    Text(String),
    Image(GeneratedImage),
    Empty,
}

impl NormalizedResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Empty => "empty",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Image(_) | Self::Empty => None,
        }
    }

    /// Text content, or an empty string for image/empty responses.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Image(_) | Self::Empty => String::new(),
        }
    }
}

/// `choices[0].message`, reduced to the two fields extraction looks at.
/// A missing and a `null` content both become `None`, whatever the shape.
#[derive(Debug, Default)]
struct MessageView {
    images: Option<Value>,
    content: Option<Value>,
}

impl MessageView {
    fn from_completion(completion: &ChatCompletion) -> Option<Self> {
        let message = completion.first_message()?;
        Some(Self {
            images: message.images.clone(),
            content: message.content.clone().filter(|value| !value.is_null()),
        })
    }

    fn from_mapping(mapping: &Map<String, Value>) -> Option<Self> {
        let message = mapping
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("message"))
            .and_then(Value::as_object)?;
        Some(Self {
            images: message.get("images").cloned(),
            content: message
                .get("content")
                .filter(|value| !value.is_null())
                .cloned(),
        })
    }

    fn from_raw_body(body: &str) -> Result<Option<Self>> {
        let parsed: Value = serde_json::from_str(body).map_err(|err| {
            BridgeError::ProviderCall(TransportError::InvalidBody(format!(
                "{err}: {}",
                truncate_text(body, 512)
            )))
        })?;
        Ok(parsed.as_object().and_then(Self::from_mapping))
    }
}

/// Reduces any accepted response shape to text, an image, or nothing.
pub fn normalize<F>(response: ProviderResponse<'_>, fetcher: &F) -> Result<NormalizedResponse>
where
    F: ImageFetcher + ?Sized,
{
    let view = match response {
        ProviderResponse::Completion(completion) => MessageView::from_completion(completion),
        ProviderResponse::Mapping(mapping) => MessageView::from_mapping(mapping),
        ProviderResponse::RawBody(body) => MessageView::from_raw_body(body)?,
    };
    let Some(view) = view else {
        return Ok(NormalizedResponse::Empty);
    };

    if let Some(url) = view.images.as_ref().and_then(first_image_url) {
        return resolve_image_url(&url, fetcher).map(NormalizedResponse::Image);
    }
    match view.content {
        Some(content) => Ok(NormalizedResponse::Text(content_text(&content))),
        None => Ok(NormalizedResponse::Empty),
    }
}

fn first_image_url(images: &Value) -> Option<String> {
    let entry = match images {
        Value::Array(items) => items.first()?,
        Value::Null => return None,
        other => other,
    };
    let url = match entry {
        Value::String(raw) => Some(raw.as_str()),
        Value::Object(obj) => obj
            .get("image_url")
            .and_then(|value| match value {
                Value::String(raw) => Some(raw.as_str()),
                Value::Object(nested) => nested.get("url").and_then(Value::as_str),
                _ => None,
            })
            .or_else(|| obj.get("url").and_then(Value::as_str)),
        _ => None,
    }?;
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn content_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.clone()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<String>>()
            .join("\n"),
        Value::Object(obj) => obj
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => other.to_string(),
    }
}

fn resolve_image_url<F>(url: &str, fetcher: &F) -> Result<GeneratedImage>
where
    F: ImageFetcher + ?Sized,
{
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("data:image") {
        let Some((meta, payload)) = url.split_once(',') else {
            return Err(BridgeError::invalid_image_payload(
                "data URL image has no ',' separator",
            ));
        };
        let mime_type = meta
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let bytes = decode_base64_bytes(payload).map_err(BridgeError::invalid_image_payload)?;
        return Ok(GeneratedImage { bytes, mime_type });
    }
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        let bytes = fetcher.fetch(url).map_err(|source| BridgeError::RemoteFetch {
            url: truncate_text(url, 200),
            source,
        })?;
        return Ok(GeneratedImage {
            bytes,
            mime_type: None,
        });
    }
    let bytes = decode_base64_bytes(url).map_err(BridgeError::invalid_image_payload)?;
    Ok(GeneratedImage {
        bytes,
        mime_type: None,
    })
}
