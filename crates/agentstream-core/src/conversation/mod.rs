//! Conversation history: in-memory store and its on-disk snapshot.

mod history;
mod store;

pub use history::{HistoryError, HistorySnapshot, HistoryStore, JsonFileHistory};
pub use store::{ConversationStore, Message, Role};
