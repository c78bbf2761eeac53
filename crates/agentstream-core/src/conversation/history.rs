//! Conversation persistence.
//!
//! All agents' conversations are saved together as one pretty-printed JSON
//! file:
//!
//! ```text
//! {
//!   "savedAt": "2026-02-04T10:15:30.123Z",
//!   "agents": {
//!     "inspector": { "<chat id>": [ { "role": "user", ... } ] },
//!     "manus": { ... }
//!   }
//! }
//! ```
//!
//! Writes go to `{file}.tmp` first and are renamed into place, so an
//! interrupted save never leaves a truncated history behind.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::ConversationStore;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every agent's conversations at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agents: BTreeMap<String, ConversationStore>,
}

impl HistorySnapshot {
    pub fn agent(&self, name: &str) -> Option<&ConversationStore> {
        self.agents.get(name)
    }

    /// Store for `name`, created empty if absent.
    pub fn agent_mut(&mut self, name: &str) -> &mut ConversationStore {
        self.agents.entry(name.to_string()).or_default()
    }
}

/// Somewhere to keep history between runs.
pub trait HistoryStore: Send + Sync {
    /// Load the last saved snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<HistorySnapshot>, HistoryError>;

    fn save(&self, snapshot: &HistorySnapshot) -> Result<(), HistoryError>;
}

/// History kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl HistoryStore for JsonFileHistory {
    fn load(&self) -> Result<Option<HistorySnapshot>, HistoryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let snapshot: HistorySnapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}
