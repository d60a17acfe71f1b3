use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use imagebridge_contracts::chat::{ChatCompletion, ChatRequest};

use crate::codec::EncodedImage;
use crate::config::ProviderConfig;
use crate::error::{truncate_text, BridgeError, TransportError};

const ERROR_BODY_MAX_CHARS: usize = 512;

/// Resolves image references (`http(s)://` URLs) found inside responses.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Files and fields for a dedicated image-edit upload.
#[derive(Debug, Clone)]
pub struct EditUpload {
    pub model: String,
    pub prompt: String,
    pub image: EncodedImage,
    pub image_name: String,
    pub mask: EncodedImage,
    pub mask_name: String,
}

/// The provider HTTP boundary. Implementations are blocking and impose no
/// total timeout of their own.
pub trait Transport: ImageFetcher + Send + Sync {
    /// Typed `chat/completions` call.
    fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError>;

    /// Raw JSON POST relative to the base URL; returns the response body.
    fn post_json(&self, path: &str, body: &Value) -> Result<String, TransportError>;

    /// Multipart upload to `images/edits`; returns the parsed JSON payload.
    fn edit_image(&self, upload: &EditUpload) -> Result<Value, TransportError>;
}

pub struct HttpTransport {
    config: ProviderConfig,
    http: HttpClient,
}

impl HttpTransport {
    /// Builds the client with no total timeout; callers needing a deadline
    /// wrap the call.
    pub fn new(config: ProviderConfig) -> crate::error::Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| BridgeError::configuration(format!("HTTP client setup failed: {err}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn authorized(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.bearer_auth(&self.config.api_key);
        if let Some(referer) = self.config.referer.as_deref() {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = self.config.title.as_deref() {
            request = request.header("X-Title", title);
        }
        request
    }
}

impl ImageFetcher for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!(url, "fetching provider image");
        let response = self.http.get(url).send()?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                code,
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl Transport for HttpTransport {
    fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError> {
        let endpoint = self.config.endpoint("chat/completions");
        debug!(endpoint = %endpoint, model = %request.model, "chat completion request");
        let payload = serde_json::to_vec(request).map_err(|err| {
            TransportError::UnsupportedParameter {
                parameter: "body".to_string(),
                detail: err.to_string(),
            }
        })?;
        let response = self
            .authorized(self.http.post(&endpoint))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()?;
        let body = response_body_or_error(response)?;
        serde_json::from_str(&body).map_err(|err| {
            TransportError::InvalidBody(format!(
                "{err}: {}",
                truncate_text(&body, ERROR_BODY_MAX_CHARS)
            ))
        })
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<String, TransportError> {
        let endpoint = self.config.endpoint(path);
        debug!(endpoint = %endpoint, "raw JSON request");
        let response = self
            .authorized(self.http.post(&endpoint))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()?;
        response_body_or_error(response)
    }

    fn edit_image(&self, upload: &EditUpload) -> Result<Value, TransportError> {
        let endpoint = self.config.endpoint("images/edits");
        debug!(endpoint = %endpoint, model = %upload.model, "image edit request");
        let image = MultipartPart::bytes(upload.image.bytes().to_vec())
            .file_name(upload.image_name.clone())
            .mime_str(upload.image.mime_type())?;
        let mask = MultipartPart::bytes(upload.mask.bytes().to_vec())
            .file_name(upload.mask_name.clone())
            .mime_str(upload.mask.mime_type())?;
        let form = MultipartForm::new()
            .text("model", upload.model.clone())
            .text("prompt", upload.prompt.clone())
            .part("image", image)
            .part("mask", mask);
        let response = self
            .authorized(self.http.post(&endpoint))
            .multipart(form)
            .send()?;
        let body = response_body_or_error(response)?;
        serde_json::from_str(&body).map_err(|err| TransportError::InvalidBody(err.to_string()))
    }
}

fn response_body_or_error(response: HttpResponse) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        return Ok(body);
    }
    Err(TransportError::Status {
        code: status.as_u16(),
        body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
    })
}
