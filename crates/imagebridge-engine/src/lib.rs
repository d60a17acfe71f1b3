pub mod codec;
pub mod config;
pub mod edit;
pub mod error;
pub mod generate;
pub mod mask;
pub mod normalize;
pub mod ocr;
pub mod transport;

#[cfg(test)]
mod testing;

pub use codec::EncodedImage;
pub use config::{LocalInferenceParams, OcrBackendKind, OcrConfig, ProviderConfig};
pub use edit::{EditRequest, ImageEditor, MASK_INSTRUCTION};
pub use error::{BridgeError, Result, TransportError};
pub use generate::{ContentGenerator, GenerateOptions};
pub use normalize::{normalize, GeneratedImage, NormalizedResponse, ProviderResponse};
pub use ocr::{OcrEngine, OcrRefiner, OCR_PROMPT};
pub use transport::{EditUpload, HttpTransport, ImageFetcher, Transport};
