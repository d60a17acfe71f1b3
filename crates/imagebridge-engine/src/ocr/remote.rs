use std::time::Duration;

use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::codec;
use crate::config::OcrConfig;
use crate::error::{truncate_text, BridgeError, Result};

use super::OcrEngine;

#[derive(Debug, Serialize)]
struct RemoteOcrRequest<'a> {
    prompt: &'a str,
    image_b64: String,
}

/// OCR over HTTP. Without an endpoint it reports itself unconfigured and the
/// refiner skips it entirely.
pub struct RemoteOcr {
    endpoint: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl RemoteOcr {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.filter(|value| !value.trim().is_empty()),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.endpoint.clone(), config.timeout)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl OcrEngine for RemoteOcr {
    fn name(&self) -> &str {
        "remote"
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    fn infer(&self, image: &DynamicImage, prompt: &str) -> Result<String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| BridgeError::configuration("DEEPSEEK_OCR_ENDPOINT is not set"))?;
        let payload = RemoteOcrRequest {
            prompt,
            image_b64: codec::encode(image)?.to_base64(),
        };
        debug!(endpoint, timeout_secs = self.timeout.as_secs_f64(), "remote OCR request");
        let response = self
            .http
            .post(endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(|err| BridgeError::inference(format!("remote OCR request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| BridgeError::inference(format!("remote OCR body unreadable: {err}")))?;
        if status.as_u16() != 200 {
            return Err(BridgeError::inference(format!(
                "remote OCR returned {}: {}",
                status.as_u16(),
                truncate_text(&body, 200)
            )));
        }
        Ok(parse_remote_ocr_body(&body))
    }
}

/// `{"text": ...}`, then `{"outputs": [{"text": ...}]}`, then the body itself.
pub fn parse_remote_ocr_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return text.trim().to_string();
        }
        let first_output = value
            .get("outputs")
            .and_then(Value::as_array)
            .and_then(|outputs| outputs.first())
            .and_then(|output| output.get("text"))
            .and_then(Value::as_str);
        if let Some(text) = first_output {
            return text.trim().to_string();
        }
    }
    body.trim().to_string()
}
