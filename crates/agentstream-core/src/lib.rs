//! # agentstream-core
//!
//! Client-side streaming chat with AI agents.
//!
//! This crate is framework-agnostic and can be used by:
//! - the `agentstream` CLI
//! - a desktop or terminal UI (via [`event_bus`])
//! - any program that wants incremental agent replies
//!
//! ## Key Concepts
//!
//! - **Frame**: one `data: <content>` line of the wire format ([`stream`])
//! - **Transport**: event-stream (GET) or chunked fetch (multipart POST) ([`transport`])
//! - **Turn**: a user message and the agent's streamed reply ([`session`])
//! - **Conversation**: the ordered messages of one chat id ([`conversation`])
//! - **AgentChat**: turns recorded into per-agent history ([`chat`])

pub mod auth;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod paths;
pub mod session;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use chat::{ActiveTurn, AgentChat, TurnOutcome, TurnSummary};
pub use config::ClientConfig;
pub use conversation::{ConversationStore, Message, Role};
pub use error::StreamError;
pub use session::{
    AgentEndpoint, CancelHandle, ImageAttachment, SessionController, SessionId, SessionState,
    StreamEvent, StreamHandle, TurnRequest,
};
pub use stream::{AgentUpdate, FrameDecoder};
