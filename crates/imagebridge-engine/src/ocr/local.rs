use std::sync::{Arc, Mutex};

use image::DynamicImage;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{LocalInferenceParams, OcrConfig};
use crate::error::{BridgeError, Result};

use super::OcrEngine;

/// What an in-process OCR model hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutput {
    Text(String),
    Fields(Map<String, Value>),
    Lines(Vec<String>),
    Other,
}

impl OcrOutput {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Fields(fields) => match fields.get("text") {
                Some(Value::String(text)) => text.trim().to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string().trim().to_string(),
            },
            Self::Lines(lines) => lines.join("\n").trim().to_string(),
            Self::Other => String::new(),
        }
    }
}

/// A loaded model. Implementations own weights, tokenizer and device.
pub trait OcrModel: Send + Sync {
    fn infer(
        &self,
        image: &DynamicImage,
        prompt: &str,
        params: &LocalInferenceParams,
    ) -> Result<OcrOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModelSpec {
    pub model_id: String,
    pub device: Option<String>,
}

/// Builds the model on first use.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &LocalModelSpec) -> Result<Arc<dyn OcrModel>>;
}

impl<F> ModelLoader for F
where
    F: Fn(&LocalModelSpec) -> Result<Arc<dyn OcrModel>> + Send + Sync,
{
    fn load(&self, spec: &LocalModelSpec) -> Result<Arc<dyn OcrModel>> {
        self(spec)
    }
}

/// Load-once slot for a model. The lock is held across the first load so
/// concurrent first callers wait instead of loading twice. A failed load
/// leaves the slot empty and the next caller retries.
pub struct ModelCell {
    slot: Mutex<Option<Arc<dyn OcrModel>>>,
}

impl ModelCell {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_load(
        &self,
        loader: &dyn ModelLoader,
        spec: &LocalModelSpec,
    ) -> Result<Arc<dyn OcrModel>> {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        info!(model = %spec.model_id, device = ?spec.device, "loading local OCR model");
        let model = loader.load(spec)?;
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some())
    }
}

impl Default for ModelCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide model shared by every [`LocalOcr`] unless told otherwise.
/// Never torn down.
pub static SHARED_MODEL: ModelCell = ModelCell::new();

pub struct LocalOcr {
    spec: LocalModelSpec,
    params: LocalInferenceParams,
    loader: Arc<dyn ModelLoader>,
    cell: &'static ModelCell,
}

impl LocalOcr {
    pub fn new(config: &OcrConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            spec: LocalModelSpec {
                model_id: config.model_id.clone(),
                device: config.device.clone(),
            },
            params: config.params,
            loader,
            cell: &SHARED_MODEL,
        }
    }

    pub fn with_cell(mut self, cell: &'static ModelCell) -> Self {
        self.cell = cell;
        self
    }

    pub fn spec(&self) -> &LocalModelSpec {
        &self.spec
    }
}

impl OcrEngine for LocalOcr {
    fn name(&self) -> &str {
        "local"
    }

    fn infer(&self, image: &DynamicImage, prompt: &str) -> Result<String> {
        let model = self.cell.get_or_load(self.loader.as_ref(), &self.spec)?;
        Ok(model.infer(image, prompt, &self.params)?.into_text())
    }
}

/// Loader for builds without an in-process model.
pub(crate) fn missing_loader(spec: &LocalModelSpec) -> Result<Arc<dyn OcrModel>> {
    Err(BridgeError::configuration(format!(
        "no local OCR loader registered for '{}'",
        spec.model_id
    )))
}
