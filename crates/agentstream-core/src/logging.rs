//! Per-turn wire transcripts.
//!
//! Each turn can write what went over the wire (request, payloads, terminal
//! outcome) to `{log_dir}/{turn_id}.log`. Without a log dir, logging is a
//! no-op.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only transcript file.
pub type TranscriptHandle = Arc<Mutex<Option<File>>>;

/// Format current UTC time as ISO 8601 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the transcript (if present).
pub fn log_line(handle: &TranscriptHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{turn_id}.log` and return a shared handle.
pub fn open_transcript(log_dir: Option<&Path>, turn_id: &str) -> TranscriptHandle {
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", turn_id)))
            .ok()
    });
    Arc::new(Mutex::new(file))
}
