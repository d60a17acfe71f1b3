use thiserror::Error;

/// Failure reported by the HTTP boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The typed client could not encode the request body.
    #[error("unsupported request parameter '{parameter}': {detail}")]
    UnsupportedParameter { parameter: String, detail: String },

    #[error("request failed ({code}): {body}")]
    Status { code: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    /// The reply arrived but does not fit the typed response.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// True when the typed client, not the provider, refused the request or
    /// the reply. A raw JSON exchange is not bound by either. Provider
    /// statuses never count.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::UnsupportedParameter { .. } | Self::InvalidBody(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("image encoding failed: {0}")]
    Encoding(String),

    #[error("image decoding failed: {0}")]
    Decoding(String),

    #[error("malformed data URL: {0}")]
    MalformedDataUrl(String),

    #[error("mask is {mask_width}x{mask_height} but image is {image_width}x{image_height}")]
    DimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("provider call failed: {0}")]
    ProviderCall(#[source] TransportError),

    #[error("{model} returned no image (content: {content:?})")]
    NoImageInResponse { model: String, content: String },

    #[error("{model} edit response carried no image data")]
    NoDataInResponse { model: String },

    #[error("failed fetching image {url}: {source}")]
    RemoteFetch {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("invalid image payload: {0}")]
    InvalidImagePayload(String),

    #[error("OCR inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates factory methods for [`BridgeError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl BridgeError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    configuration => Configuration,
    /// Create an encoding error.
    encoding => Encoding,
    /// Create a decoding error.
    decoding => Decoding,
    /// Create a malformed data URL error.
    malformed_data_url => MalformedDataUrl,
    /// Create an invalid image payload error.
    invalid_image_payload => InvalidImagePayload,
    /// Create an OCR inference error.
    inference => Inference,
}

impl From<image::ImageError> for BridgeError {
    fn from(e: image::ImageError) -> Self {
        Self::Decoding(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
