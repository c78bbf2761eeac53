//! What a turn asks for: which agent, what text, which image.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// A remote agent service and the paths it streams from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Short name, also the key for the agent's conversation history.
    pub name: String,
    /// Event-stream path (text-only turns, query parameters).
    pub stream_path: String,
    /// Chunked-fetch path (multipart turns).
    pub multimodal_path: String,
    /// Whether the agent keeps server-side memory keyed by `chatId`.
    pub sends_chat_id: bool,
}

impl AgentEndpoint {
    /// Domain-expert chat app with server-side memory per chat id.
    pub fn inspector() -> Self {
        Self {
            name: "inspector".to_string(),
            stream_path: "/ai/inspector_app/chat/sse".to_string(),
            multimodal_path: "/ai/inspector_app/chat/multimodal".to_string(),
            sends_chat_id: true,
        }
    }

    /// General tool-using agent; stateless on the server.
    pub fn manus() -> Self {
        Self {
            name: "manus".to_string(),
            stream_path: "/ai/manus/chat".to_string(),
            multimodal_path: "/ai/manus/chat/multimodal".to_string(),
            sends_chat_id: false,
        }
    }

    /// Built-in endpoints.
    pub fn presets() -> Vec<Self> {
        vec![Self::inspector(), Self::manus()]
    }

    /// Look up a built-in endpoint by name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::presets().into_iter().find(|agent| agent.name == name)
    }
}

/// An image sent alongside the prompt.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, guessing the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, StreamError> {
        let bytes = std::fs::read(path).map_err(|e| {
            StreamError::InvalidRequest(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(file_name, mime_type, bytes))
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One conversation turn to stream.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent: AgentEndpoint,
    pub message: String,
    pub chat_id: Option<String>,
    pub image: Option<ImageAttachment>,
}

impl TurnRequest {
    pub fn new(agent: AgentEndpoint, message: impl Into<String>) -> Self {
        Self {
            agent,
            message: message.into(),
            chat_id: None,
            image: None,
        }
    }

    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Chat id to put on the wire, if the agent takes one.
    pub fn wire_chat_id(&self) -> Option<&str> {
        if self.agent.sends_chat_id {
            self.chat_id.as_deref()
        } else {
            None
        }
    }
}
