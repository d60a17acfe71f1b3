//! Scripted transport used by the dispatcher tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use imagebridge_contracts::chat::{ChatCompletion, ChatRequest};

use crate::error::TransportError;
use crate::transport::{EditUpload, ImageFetcher, Transport};

#[derive(Debug, Clone)]
pub(crate) enum Recorded {
    Chat(ChatRequest),
    PostJson { path: String, body: Value },
    EditImage(EditUpload),
    Fetch(String),
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    chat: Mutex<VecDeque<Result<Value, TransportError>>>,
    post_json: Mutex<VecDeque<Result<String, TransportError>>>,
    edits: Mutex<VecDeque<Result<Value, TransportError>>>,
    fetches: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    calls: Mutex<Vec<Recorded>>,
}

impl FakeTransport {
    pub(crate) fn push_chat(&self, response: Result<Value, TransportError>) {
        self.chat.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_post_json(&self, response: Result<String, TransportError>) {
        self.post_json.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_edit(&self, response: Result<Value, TransportError>) {
        self.edits.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_fetch(&self, response: Result<Vec<u8>, TransportError>) {
        self.fetches.lock().unwrap().push_back(response);
    }

    pub(crate) fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Recorded) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unscripted() -> TransportError {
    TransportError::Network("no scripted response".to_string())
}

impl ImageFetcher for FakeTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.record(Recorded::Fetch(url.to_string()));
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }
}

impl Transport for FakeTransport {
    fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError> {
        self.record(Recorded::Chat(request.clone()));
        let payload = self
            .chat
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))?;
        serde_json::from_value(payload).map_err(|err| TransportError::InvalidBody(err.to_string()))
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<String, TransportError> {
        self.record(Recorded::PostJson {
            path: path.to_string(),
            body: body.clone(),
        });
        self.post_json
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }

    fn edit_image(&self, upload: &EditUpload) -> Result<Value, TransportError> {
        self.record(Recorded::EditImage(upload.clone()));
        self.edits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }
}
