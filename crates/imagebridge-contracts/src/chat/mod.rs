mod completion;
mod messages;

pub use completion::{AssistantMessage, ChatChoice, ChatCompletion};
pub use messages::{
    ChatMessage, ChatRequest, ChatRole, ContentPart, ImageUrl, MessageContent, Modality,
    ResponseFormat,
};
