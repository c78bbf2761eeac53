//! Session controller: one streamed turn, from start to a single outcome.
//!
//! `start` picks a transport and returns a [`StreamHandle`]. The handle is an
//! iterator of [`StreamEvent`]s: any number of payloads, then exactly one of
//! `Completed` or `Failed`, then `None`. A cancelled turn just ends, with no
//! terminal event.
//!
//! The transport's reader thread only sends into a channel. All state changes
//! happen here, on the consumer's thread, once per received signal, and the
//! cancel flag is checked again before anything is yielded. A payload that
//! was already in flight when the consumer cancelled is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::{AuthHeader, StaticToken};
use crate::config::{ClientConfig, TransportPreference};
use crate::error::StreamError;
use crate::logging::{log_line, open_transcript, TranscriptHandle};
use crate::transport::{
    self, ChunkedFetchTransport, CloseSignal, Connection, EventStreamTransport, Signal,
    Transport, TransportKind,
};

use super::request::TurnRequest;
use super::state::SessionState;

/// How often a blocked consumer re-checks for a cancel from another thread.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a stream yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Payload(String),
    Completed,
    Failed(StreamError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Payload(_))
    }
}

/// Starts turns against a pair of transports.
pub struct SessionController {
    event_stream: Arc<dyn Transport>,
    chunked_fetch: Arc<dyn Transport>,
    preference: TransportPreference,
    log_dir: Option<PathBuf>,
}

impl SessionController {
    /// Controller with the HTTP transports, using the config's static token.
    pub fn new(config: &ClientConfig) -> Self {
        let auth = AuthHeader::new(
            config.auth_header.clone(),
            Arc::new(StaticToken(config.auth_token.clone())),
        );
        Self::with_auth(config, auth)
    }

    /// Controller with the HTTP transports and a caller-supplied token source.
    pub fn with_auth(config: &ClientConfig, auth: AuthHeader) -> Self {
        Self {
            event_stream: Arc::new(EventStreamTransport::new(config, Some(auth.clone()))),
            chunked_fetch: Arc::new(ChunkedFetchTransport::new(config, Some(auth))),
            preference: config.transport,
            log_dir: config.log_dir.clone(),
        }
    }

    /// Controller over arbitrary transports.
    pub fn with_transports(
        event_stream: Arc<dyn Transport>,
        chunked_fetch: Arc<dyn Transport>,
    ) -> Self {
        Self {
            event_stream,
            chunked_fetch,
            preference: TransportPreference::Auto,
            log_dir: None,
        }
    }

    pub fn preference(mut self, preference: TransportPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Write a wire transcript per turn into `dir`.
    pub fn log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// The transport `request` would use.
    ///
    /// An image needs a request body, which only chunked fetch can carry.
    pub fn select(&self, request: &TurnRequest) -> &dyn Transport {
        if request.has_image() || self.preference == TransportPreference::Chunked {
            self.chunked_fetch.as_ref()
        } else {
            self.event_stream.as_ref()
        }
    }

    /// Start streaming a turn.
    ///
    /// Never fails directly: if the transport can't be opened, the handle's
    /// only event is `Failed`.
    pub fn start(&self, request: &TurnRequest) -> StreamHandle {
        let transport = self.select(request);
        let kind = transport.kind();
        let turn_id = Uuid::new_v4().to_string();

        let transcript = open_transcript(self.log_dir.as_deref(), &turn_id);
        log_line(
            &transcript,
            "REQUEST",
            &format!(
                "{} via {} (image: {}): {}",
                request.agent.name,
                kind,
                request.has_image(),
                request.message
            ),
        );
        log::debug!("turn {} starting via {}", turn_id, kind);

        let (sink, connection, rx) = transport::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut handle = StreamHandle {
            turn_id,
            kind,
            state: SessionState::Idle,
            rx,
            closed: connection.signal(),
            connection: Some(connection),
            cancelled,
            transcript,
        };

        if let Err(e) = transport.open(request, sink.clone()) {
            log::debug!("turn {} failed to open: {}", handle.turn_id, e);
            sink.fail(e);
        }
        handle.state = SessionState::Streaming;
        handle
    }
}

/// Cancels a turn from anywhere, including another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    closed: Arc<CloseSignal>,
}

impl CancelHandle {
    /// Request cancellation. The consumer sees the stream end without a
    /// terminal event.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.closed.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One in-flight turn.
///
/// Iterate it to receive events. Dropping it closes the transport.
pub struct StreamHandle {
    turn_id: String,
    kind: TransportKind,
    state: SessionState,
    rx: Receiver<Signal>,
    connection: Option<Connection>,
    closed: Arc<CloseSignal>,
    cancelled: Arc<AtomicBool>,
    transcript: TranscriptHandle,
}

impl StreamHandle {
    /// Unique id of this turn (also the transcript file name).
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Transport carrying this turn.
    pub fn transport(&self) -> TransportKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        if !self.state.is_terminal() && self.cancelled.load(Ordering::SeqCst) {
            return SessionState::Cancelled;
        }
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn canceller(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Cancel the turn. Returns false if it had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        self.finish(SessionState::Cancelled);
        true
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        if let Some(connection) = self.connection.take() {
            connection.close();
        }

        let label = match state {
            SessionState::Completed => "COMPLETE",
            SessionState::Errored => "ERROR",
            SessionState::Cancelled => "CANCEL",
            SessionState::Idle | SessionState::Streaming => return,
        };
        log_line(&self.transcript, label, "");
        log::debug!("turn {} finished: {:?}", self.turn_id, state);
    }
}

impl Iterator for StreamHandle {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if self.state.is_terminal() {
                return None;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                self.finish(SessionState::Cancelled);
                return None;
            }

            let signal = match self.rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => Signal::Failed(StreamError::Disconnected),
            };

            // A cancel may have landed while we were waiting.
            if self.cancelled.load(Ordering::SeqCst) {
                self.finish(SessionState::Cancelled);
                return None;
            }

            let event = match signal {
                Signal::Payload(text) => {
                    log_line(&self.transcript, "PAYLOAD", &text);
                    StreamEvent::Payload(text)
                }
                Signal::Completed => {
                    self.finish(SessionState::Completed);
                    StreamEvent::Completed
                }
                Signal::Failed(error) => {
                    if error.is_open_failure() {
                        log::error!("turn {} could not start: {}", self.turn_id, error);
                    } else {
                        log::error!("turn {} failed mid-stream: {}", self.turn_id, error);
                    }
                    log_line(&self.transcript, "ERROR", &error.to_string());
                    self.finish(SessionState::Errored);
                    StreamEvent::Failed(error)
                }
            };
            return Some(event);
        }
    }
}

impl std::iter::FusedIterator for StreamHandle {}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            log::debug!("turn {} dropped while streaming", self.turn_id);
        }
    }
}
