use std::sync::Arc;

use tracing::debug;

use imagebridge_contracts::chat::{ChatMessage, ChatRequest, ContentPart, ResponseFormat};

use crate::config::ProviderConfig;
use crate::error::{BridgeError, Result};
use crate::normalize::{normalize, NormalizedResponse, ProviderResponse};
use crate::transport::{HttpTransport, Transport};

/// Optional request knobs. Unset fields are left off the wire entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f64>,
    pub json_mode: bool,
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Text and vision chat against one configured model.
pub struct ContentGenerator {
    transport: Arc<dyn Transport>,
    model: String,
}

impl ContentGenerator {
    pub fn new(transport: Arc<dyn Transport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        let model = config.model_id.clone();
        Ok(Self::new(Arc::new(HttpTransport::new(config)?), model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, messages: Vec<ChatMessage>, options: &GenerateOptions) -> ChatRequest {
        let mut request = ChatRequest::new(self.model.clone(), messages);
        request.temperature = options.temperature;
        if options.json_mode {
            request.response_format = Some(ResponseFormat::json_object());
        }
        request
    }

    pub fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: &GenerateOptions,
    ) -> Result<NormalizedResponse> {
        let request = self.build_request(messages, options);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            json_mode = options.json_mode,
            "generating content"
        );
        let completion = self
            .transport
            .chat(&request)
            .map_err(BridgeError::ProviderCall)?;
        normalize(ProviderResponse::Completion(&completion), self.transport.as_ref())
    }

    /// Single user turn built from loose text and image parts.
    pub fn generate_parts(
        &self,
        parts: Vec<ContentPart>,
        options: &GenerateOptions,
    ) -> Result<NormalizedResponse> {
        self.generate(vec![ChatMessage::user_parts(parts)], options)
    }

    /// Like [`generate`](Self::generate) but yields the text directly, empty
    /// when the model answered with something other than text.
    pub fn generate_text(&self, messages: Vec<ChatMessage>, options: &GenerateOptions) -> Result<String> {
        Ok(self.generate(messages, options)?.into_text())
    }
}
