use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openrouter/polaris-alpha";
pub const DEFAULT_TEXT_MODEL: &str = "openrouter/polaris-alpha";
pub const DEFAULT_VISION_MODEL: &str = "google/gemini-2.5-flash-image";
pub const DEFAULT_OCR_MODEL: &str = "deepseek-ai/DeepSeek-OCR";
pub const DEFAULT_OCR_TIMEOUT_SECS: f64 = 30.0;

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Credentials and routing for one provider client. Built once, never
/// mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(BridgeError::configuration("provider API key is empty"));
        }
        let model_id = model_id.into().trim().to_string();
        if model_id.is_empty() {
            return Err(BridgeError::configuration("provider model id is empty"));
        }
        Ok(Self {
            api_key,
            base_url: normalize_base_url(&base_url.into()),
            model_id,
            referer: None,
            title: None,
        })
    }

    /// Reads `OPENROUTER_*` from the process environment. `model` overrides
    /// `OPENROUTER_MODEL` when given.
    pub fn from_env(model: Option<&str>) -> Result<Self> {
        Self::from_lookup(model, non_empty_env)
    }

    /// Client for text-first work (`OPENROUTER_MODEL_TEXT`).
    pub fn text() -> Result<Self> {
        let model = non_empty_env("OPENROUTER_MODEL_TEXT")
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        Self::from_env(Some(&model))
    }

    /// Client for image understanding and editing (`OPENROUTER_MODEL_VISION`).
    pub fn vision() -> Result<Self> {
        let model = non_empty_env("OPENROUTER_MODEL_VISION")
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());
        Self::from_env(Some(&model))
    }

    pub fn from_lookup<F>(model: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(api_key) = lookup("OPENROUTER_API_KEY") else {
            return Err(BridgeError::configuration(
                "OPENROUTER_API_KEY environment variable is required",
            ));
        };
        let base_url = lookup("OPENROUTER_BASE_URL")
            .or_else(|| lookup("OPENROUTER_API_BASE"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model_id = model
            .map(str::to_string)
            .or_else(|| lookup("OPENROUTER_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut config = Self::new(api_key, base_url, model_id)?;
        config.referer = lookup("OPENROUTER_HTTP_REFERER");
        config.title = lookup("OPENROUTER_X_TITLE");
        Ok(config)
    }

    pub fn with_model(&self, model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..self.clone()
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        let bare = parsed.path().trim().is_empty() || parsed.path() == "/";
        let openrouter = parsed
            .host_str()
            .map(|host| host.ends_with("openrouter.ai"))
            .unwrap_or(false);
        if bare && openrouter {
            base = format!("{base}/api/v1");
        }
    }
    base
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    Local,
    Remote,
}

impl OcrBackendKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(BridgeError::configuration(format!(
                "DEEPSEEK_OCR_BACKEND must be 'local' or 'remote', got '{other}'"
            ))),
        }
    }
}

/// Knobs handed to the in-process OCR model on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInferenceParams {
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
}

impl Default for LocalInferenceParams {
    fn default() -> Self {
        Self {
            base_size: 1024,
            image_size: 640,
            crop_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    pub backend: OcrBackendKind,
    pub model_id: String,
    pub device: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub params: LocalInferenceParams,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Local,
            model_id: DEFAULT_OCR_MODEL.to_string(),
            device: None,
            endpoint: None,
            timeout: Duration::from_secs_f64(DEFAULT_OCR_TIMEOUT_SECS),
            params: LocalInferenceParams::default(),
        }
    }
}

impl OcrConfig {
    pub fn remote(endpoint: Option<String>) -> Self {
        Self {
            backend: OcrBackendKind::Remote,
            endpoint,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = match lookup("DEEPSEEK_OCR_BACKEND") {
            Some(raw) => OcrBackendKind::parse(&raw)?,
            None => defaults.backend,
        };
        let timeout_secs = match lookup("DEEPSEEK_OCR_TIMEOUT") {
            Some(raw) => parse_number::<f64>("DEEPSEEK_OCR_TIMEOUT", &raw)?,
            None => DEFAULT_OCR_TIMEOUT_SECS,
        };
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(BridgeError::configuration(format!(
                "DEEPSEEK_OCR_TIMEOUT must be a positive number of seconds, got {timeout_secs}"
            )));
        }
        let params = LocalInferenceParams {
            base_size: match lookup("DEEPSEEK_BASE_SIZE") {
                Some(raw) => parse_number("DEEPSEEK_BASE_SIZE", &raw)?,
                None => defaults.params.base_size,
            },
            image_size: match lookup("DEEPSEEK_IMAGE_SIZE") {
                Some(raw) => parse_number("DEEPSEEK_IMAGE_SIZE", &raw)?,
                None => defaults.params.image_size,
            },
            crop_mode: lookup("DEEPSEEK_CROP_MODE")
                .map(|raw| raw == "1")
                .unwrap_or(defaults.params.crop_mode),
        };
        Ok(Self {
            backend,
            model_id: lookup("DEEPSEEK_OCR_MODEL").unwrap_or(defaults.model_id),
            device: lookup("DEEPSEEK_DEVICE"),
            endpoint: lookup("DEEPSEEK_OCR_ENDPOINT"),
            timeout: Duration::from_secs_f64(timeout_secs),
            params,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| BridgeError::configuration(format!("{key} is not a valid number: '{raw}'")))
}
