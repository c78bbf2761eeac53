//! Ordered message history per session.
//!
//! The store is append-only: messages are never edited or reordered, and a
//! session disappears only through an explicit [`ConversationStore::delete`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Messages keyed by session, in the order they were appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationStore {
    sessions: BTreeMap<SessionId, Vec<Message>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, creating the session on first use.
    pub fn append(&mut self, id: &SessionId, message: Message) {
        self.sessions.entry(id.clone()).or_default().push(message);
    }

    pub fn append_user(&mut self, id: &SessionId, content: impl Into<String>) {
        self.append(id, Message::user(content));
    }

    pub fn append_assistant(&mut self, id: &SessionId, content: impl Into<String>) {
        self.append(id, Message::assistant(content));
    }

    /// Messages of a session; empty for an unknown id.
    pub fn messages(&self, id: &SessionId) -> &[Message] {
        self.sessions.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete(&mut self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &SessionId> {
        self.sessions.keys()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
