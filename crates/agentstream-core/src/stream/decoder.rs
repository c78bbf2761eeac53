//! Frame decoder for `data:`-prefixed stream bodies.
//!
//! Turns raw chunks into discrete payloads, independent of which transport
//! produced them.
//!
//! # How This Decoder Works
//!
//! The server writes one payload per line, prefixed with `data: `. Chunks
//! arrive with whatever boundaries the network chose, so the decoder:
//! 1. Decodes bytes to text, holding back a multi-byte character that was
//!    split across two reads
//! 2. Buffers text until a `\n` completes a line
//! 3. Strips the `data: ` prefix and emits the rest as a payload
//! 4. Stops at the end-of-stream sentinel (which is never emitted as content)
//!
//! Lines without the prefix are skipped. Upstream framing is not guaranteed
//! to be line-clean, so a stray line is not an error.

/// Prefix marking a payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload content that marks the end of the stream.
pub const DEFAULT_SENTINEL: &str = "[DONE]";

/// One decoded unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One delta of assistant output.
    Payload(String),
    /// The sentinel was seen; nothing after it is decoded.
    End,
}

/// Incremental decoder state for one stream.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Text of the current, not yet terminated line.
    buffer: String,

    /// Tail bytes of an incomplete UTF-8 sequence.
    ///
    /// # Why We Need This
    ///
    /// A read from a byte stream can stop in the middle of a character:
    /// `你` is three bytes and the first read may only carry two of them.
    /// Decoding those two bytes on their own would produce garbage, so they
    /// wait here for the next read.
    pending_bytes: Vec<u8>,

    sentinel: String,
    finished: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_sentinel(DEFAULT_SENTINEL)
    }
}

impl FrameDecoder {
    /// Create a decoder using the default `[DONE]` sentinel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom end-of-stream sentinel.
    pub fn with_sentinel(sentinel: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            pending_bytes: Vec::new(),
            sentinel: sentinel.into(),
            finished: false,
        }
    }

    /// The sentinel this decoder stops at.
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Whether the sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed raw bytes from a pull-based reader.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.finished || bytes.is_empty() {
            return Vec::new();
        }
        let text = self.decode_utf8(bytes);
        self.feed(&text)
    }

    /// Feed a text chunk and collect the frames it completes.
    ///
    /// The chunk may contain partial lines; these are buffered until the
    /// rest of the line arrives.
    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.finished || chunk.is_empty() {
            return frames;
        }

        self.buffer.push_str(chunk);

        // Take the buffer so we can split it while still calling &mut self
        // methods; the unterminated tail goes back in afterwards.
        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&str> = buffer.split('\n').collect();

        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_string();
        }

        for line in lines {
            if let Some(frame) = self.decode_line(line) {
                let end = frame == Frame::End;
                frames.push(frame);
                if end {
                    self.buffer.clear();
                    break;
                }
            }
        }

        frames
    }

    /// Flush whatever is still buffered when the stream ends.
    ///
    /// A final payload line does not need a trailing newline.
    pub fn flush(&mut self) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let remaining = std::mem::take(&mut self.buffer);
        self.decode_line(&remaining).into_iter().collect()
    }

    /// Classify a message that the transport already framed.
    ///
    /// The event-stream transport hands over one complete message per event,
    /// so there is no line splitting to do; only the sentinel check applies.
    pub fn accept_message(&mut self, data: &str) -> Option<Frame> {
        if self.finished {
            return None;
        }
        if data == self.sentinel {
            self.finished = true;
            return Some(Frame::End);
        }
        Some(Frame::Payload(data.to_string()))
    }

    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let content = line.strip_prefix(DATA_PREFIX)?;

        if content == self.sentinel {
            self.finished = true;
            return Some(Frame::End);
        }

        Some(Frame::Payload(content.to_string()))
    }

    /// Streaming UTF-8 decode: complete characters out, incomplete tail kept.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        // Invalid sequence: replace it and keep going.
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + len);
                        }
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }
}
