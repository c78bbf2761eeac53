//! Server-sent events framing.
//!
//! Fields accumulate until a blank line dispatches the event:
//!
//! ```text
//! event: message      <- optional, defaults to "message"
//! data: first line    <- data lines are joined with "\n"
//! data: second line
//!                     <- blank line: dispatch
//! ```
//!
//! `:` starts a comment (servers use these as keep-alives). `id` and `retry`
//! are recognised; `retry` is ignored because streams are never resumed.

/// Event type used when the server doesn't name one.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseMessage {
    /// Whether this is an unnamed (`message`) event.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    /// Unterminated line carried over to the next chunk.
    buffer: String,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the events it dispatches.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseMessage> {
        let mut messages = Vec::new();
        self.buffer.push_str(chunk);

        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&str> = buffer.split('\n').collect();
        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_string();
        }

        for line in lines {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(message) = self.process_line(line) {
                messages.push(message);
            }
        }

        messages
    }

    /// End of stream. An event without its closing blank line is discarded.
    pub fn finish(&mut self) {
        if self.has_data || !self.buffer.is_empty() {
            log::debug!("discarding unterminated event at end of stream");
        }
        self.buffer.clear();
        self.reset_event();
    }

    /// The most recent `id:` seen.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        if !self.has_data {
            self.reset_event();
            return None;
        }

        let event = self
            .event
            .take()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        let message = SseMessage {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        };
        self.reset_event();
        Some(message)
    }

    fn reset_event(&mut self) {
        self.data.clear();
        self.has_data = false;
        self.event = None;
    }
}
