//! Structured progress updates embedded in payloads.
//!
//! Multi-step agents report progress as a JSON object per payload instead of
//! plain text. Plain text payloads are still the common case, so parsing never
//! fails: anything that isn't a recognised update comes back as `Text`.

use serde::{Deserialize, Serialize};

/// Kind of a structured agent update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Thinking,
    ToolCalling,
    Content,
    StepProgress,
    Complete,
    Error,
}

impl UpdateKind {
    /// Human-readable label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            UpdateKind::Thinking => "thinking",
            UpdateKind::ToolCalling => "tool call",
            UpdateKind::Content => "content",
            UpdateKind::StepProgress => "step",
            UpdateKind::Complete => "complete",
            UpdateKind::Error => "error",
        }
    }
}

/// Wire shape of a structured update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    #[serde(default)]
    pub tool_info: Option<String>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A payload interpreted for display.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentUpdate {
    /// Plain text delta.
    Text(String),
    /// A structured progress update.
    Structured(StructuredUpdate),
}

impl AgentUpdate {
    /// Interpret a payload.
    pub fn parse(payload: &str) -> Self {
        let trimmed = payload.trim_start();
        if trimmed.starts_with('{') {
            if let Ok(update) = serde_json::from_str::<StructuredUpdate>(trimmed) {
                return AgentUpdate::Structured(update);
            }
        }
        AgentUpdate::Text(payload.to_string())
    }

    /// Text to show for this update.
    pub fn display_text(&self) -> String {
        match self {
            AgentUpdate::Text(text) => text.clone(),
            AgentUpdate::Structured(update) => {
                let content = update.content.as_deref().unwrap_or_default();
                match (update.kind, update.current_step, update.total_steps) {
                    (UpdateKind::StepProgress, Some(step), Some(total)) => {
                        format!("[{step}/{total}] {content}")
                    }
                    (UpdateKind::ToolCalling, _, _) => match update.tool_info.as_deref() {
                        Some(tool) if !tool.is_empty() => format!("[{tool}] {content}"),
                        _ => content.to_string(),
                    },
                    _ => content.to_string(),
                }
            }
        }
    }

    /// Whether the update says the agent is done.
    pub fn is_final(&self) -> bool {
        match self {
            AgentUpdate::Text(_) => false,
            AgentUpdate::Structured(update) => {
                update.finished.unwrap_or(false)
                    || matches!(update.kind, UpdateKind::Complete | UpdateKind::Error)
            }
        }
    }
}
