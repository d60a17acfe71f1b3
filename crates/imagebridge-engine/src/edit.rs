use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, GenericImageView, RgbImage};
use serde_json::Value;
use tracing::{debug, info, warn};

use imagebridge_contracts::chat::{ChatMessage, ChatRequest, ContentPart, Modality};
use imagebridge_contracts::models::{EditProtocol, ModelFamilyTable};

use crate::codec;
use crate::config::ProviderConfig;
use crate::error::{truncate_text, BridgeError, Result};
use crate::mask;
use crate::normalize::{normalize, NormalizedResponse, ProviderResponse};
use crate::transport::{EditUpload, HttpTransport, Transport};

/// Appended to the edit prompt when base image and mask travel as chat parts.
pub const MASK_INSTRUCTION: &str = "The first image is the base image and the second image is a mask. \
White regions of the mask are the areas to edit; black regions must remain unchanged.";

const DIAGNOSTIC_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub base_image: DynamicImage,
    /// White (255) marks pixels to edit, black (0) pixels to keep.
    pub mask: DynamicImage,
    pub prompt: String,
    pub model_id: String,
}

pub struct ImageEditor {
    transport: Arc<dyn Transport>,
    families: ModelFamilyTable,
}

impl ImageEditor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            families: ModelFamilyTable::default(),
        }
    }

    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    pub fn with_families(mut self, families: ModelFamilyTable) -> Self {
        self.families = families;
        self
    }

    pub fn protocol_for(&self, model_id: &str) -> EditProtocol {
        self.families.protocol_for(model_id)
    }

    /// Runs the edit and returns an RGB image whichever protocol served it.
    pub fn edit(&self, request: &EditRequest) -> Result<RgbImage> {
        let protocol = self.protocol_for(&request.model_id);
        info!(
            model = %request.model_id,
            protocol = protocol.as_str(),
            "dispatching image edit"
        );
        let edited = match protocol {
            EditProtocol::EmbeddedChat => self.edit_via_chat(request)?,
            EditProtocol::EditEndpoint => self.edit_via_endpoint(request)?,
        };
        Ok(edited.to_rgb8())
    }

    fn edit_via_chat(&self, request: &EditRequest) -> Result<DynamicImage> {
        let (width, height) = request.base_image.dimensions();
        let rgb_mask = mask::to_rgb_mask(&request.mask, width, height)?;
        let base = codec::encode(&request.base_image)?;
        let mask = codec::encode(&DynamicImage::ImageRgb8(rgb_mask))?;

        let instruction = format!("{}\n\n{MASK_INSTRUCTION}", request.prompt.trim());
        let message = ChatMessage::user(vec![
            ContentPart::text(instruction),
            base.to_content_part(),
            mask.to_content_part(),
        ]);
        let mut chat = ChatRequest::new(request.model_id.clone(), vec![message]);
        chat.modalities = Some(vec![Modality::Image, Modality::Text]);

        let normalized = match self.transport.chat(&chat) {
            Ok(completion) => {
                normalize(ProviderResponse::Completion(&completion), self.transport.as_ref())?
            }
            Err(err) if err.is_client_rejection() => {
                warn!(
                    model = %request.model_id,
                    error = %err,
                    "typed chat client rejected the exchange; retrying as raw HTTP"
                );
                let body = raw_chat_body(&chat)?;
                let raw = self
                    .transport
                    .post_json("chat/completions", &body)
                    .map_err(BridgeError::ProviderCall)?;
                normalize(ProviderResponse::RawBody(&raw), self.transport.as_ref())?
            }
            Err(err) => return Err(BridgeError::ProviderCall(err)),
        };

        match normalized {
            NormalizedResponse::Image(image) => image.to_raster(),
            NormalizedResponse::Text(content) => Err(BridgeError::NoImageInResponse {
                model: request.model_id.clone(),
                content: truncate_text(&content, DIAGNOSTIC_MAX_CHARS),
            }),
            NormalizedResponse::Empty => Err(BridgeError::NoImageInResponse {
                model: request.model_id.clone(),
                content: String::new(),
            }),
        }
    }

    fn edit_via_endpoint(&self, request: &EditRequest) -> Result<DynamicImage> {
        let (width, height) = request.base_image.dimensions();
        let alpha_mask = mask::to_edit_mask(&request.mask, width, height)?;
        let upload = EditUpload {
            model: request.model_id.clone(),
            prompt: request.prompt.clone(),
            image: codec::encode(&request.base_image)?,
            image_name: "image.png".to_string(),
            mask: codec::encode(&DynamicImage::ImageRgba8(alpha_mask))?,
            mask_name: "mask.png".to_string(),
        };
        let payload = self
            .transport
            .edit_image(&upload)
            .map_err(BridgeError::ProviderCall)?;
        let Some(b64) = first_b64_payload(&payload) else {
            return Err(BridgeError::NoDataInResponse {
                model: request.model_id.clone(),
            });
        };
        debug!(model = %request.model_id, bytes = b64.len(), "edit endpoint returned image");
        let bytes = BASE64
            .decode(b64.trim().as_bytes())
            .map_err(|err| BridgeError::invalid_image_payload(format!("b64_json: {err}")))?;
        codec::decode(&bytes)
    }
}

/// The chat request as a plain JSON body, with the modality flag set
/// explicitly so it survives regardless of how the typed request serialized.
fn raw_chat_body(chat: &ChatRequest) -> Result<Value> {
    let mut body = serde_json::to_value(chat)
        .map_err(|err| BridgeError::encoding(format!("chat request: {err}")))?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "modalities".to_string(),
            serde_json::json!(["image", "text"]),
        );
    }
    Ok(body)
}

fn first_b64_payload(payload: &Value) -> Option<&str> {
    payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("b64_json"))
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}
