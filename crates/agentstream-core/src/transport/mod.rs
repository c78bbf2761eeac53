//! Transport adapters.
//!
//! Both adapters look the same to the session controller: `open` starts a
//! background reader that reports through a [`TransportSink`], and the paired
//! [`Connection`] closes it.
//!
//! - [`EventStreamTransport`]: server-sent events over GET, request in the query
//! - [`ChunkedFetchTransport`]: multipart POST, body read incrementally
//!
//! # Delivery rules
//!
//! The sink delivers at most one terminal signal (complete or fail) and nothing
//! after it. Once the connection is closed, the sink drops everything silently.
//!
//! # Release on close
//!
//! Each reader runs on its own thread with a private current-thread tokio
//! runtime. Closing the connection wakes that runtime, which drops the reader
//! future (and with it the HTTP response) and then the runtime itself, so the
//! socket is shut down even if the server never sends another byte.

mod chunked_fetch;
mod event_stream;
mod http;
mod sse;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tokio::sync::Notify;

use crate::error::StreamError;
use crate::session::TurnRequest;

pub use chunked_fetch::ChunkedFetchTransport;
pub use event_stream::EventStreamTransport;
pub use sse::{SseMessage, SseParser};

/// Which adapter carried a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    EventStream,
    ChunkedFetch,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::EventStream => write!(f, "event-stream"),
            TransportKind::ChunkedFetch => write!(f, "chunked-fetch"),
        }
    }
}

/// A way of streaming one turn.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Start streaming `request`, reporting through `sink`.
    ///
    /// Returns an error only when the stream could not be started at all.
    /// Everything after that, including a non-success status, is reported
    /// through the sink.
    fn open(&self, request: &TurnRequest, sink: TransportSink) -> Result<(), StreamError>;
}

/// What a transport reports to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Signal {
    Payload(String),
    Completed,
    Failed(StreamError),
}

/// Close state shared by a connection, its sink and any cancel handles.
#[derive(Debug, Default)]
pub(crate) struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    /// Mark closed and wake the reader. Returns true if this call closed it.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once closed.
    pub(crate) async fn wait(&self) {
        loop {
            // Register before checking so a close in between is not missed.
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Reporting side of a transport: the normalized payload / error / complete shape.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: Sender<Signal>,
    closed: Arc<CloseSignal>,
}

impl TransportSink {
    /// True once the stream finished or the consumer closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Forward one payload. Returns false when the reader should stop.
    pub fn payload(&self, text: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(Signal::Payload(text.into())).is_ok()
    }

    /// Report normal end of stream.
    pub fn complete(&self) {
        self.finish(Signal::Completed);
    }

    /// Report a failure.
    pub fn fail(&self, error: StreamError) {
        self.finish(Signal::Failed(error));
    }

    fn finish(&self, signal: Signal) {
        // the first terminal signal wins across clones and threads
        if self.closed.close() {
            let _ = self.tx.send(signal);
        }
    }

    #[cfg(test)]
    pub(crate) fn send_raw(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}

/// Close handle for one open transport.
///
/// `close` is idempotent and also runs on drop, so a connection can't leak.
#[derive(Debug)]
pub struct Connection {
    closed: Arc<CloseSignal>,
}

impl Connection {
    /// Close the connection and release the reader. Returns true if this call
    /// closed it.
    pub fn close(&self) -> bool {
        self.closed.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    pub(crate) fn signal(&self) -> Arc<CloseSignal> {
        Arc::clone(&self.closed)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create a sink, its connection, and the controller's receiving end.
pub(crate) fn channel() -> (TransportSink, Connection, Receiver<Signal>) {
    let (tx, rx) = mpsc::channel();
    let closed = Arc::new(CloseSignal::default());
    let sink = TransportSink {
        tx,
        closed: Arc::clone(&closed),
    };
    (sink, Connection { closed }, rx)
}

/// Reports `Disconnected` if a reader exits (or panics) without a terminal signal.
struct FinishGuard(TransportSink);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.fail(StreamError::Disconnected);
    }
}

/// Run an async reader on its own thread until it finishes or the connection
/// is closed, whichever comes first.
pub(crate) fn spawn_reader<F, Fut>(
    name: &str,
    sink: TransportSink,
    reader: F,
) -> Result<(), StreamError>
where
    F: FnOnce(TransportSink) -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    let label = name.to_string();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let guard = FinishGuard(sink.clone());
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    guard
                        .0
                        .fail(StreamError::Connect(format!("failed to start runtime: {e}")));
                    return;
                }
            };

            let closed = Arc::clone(&sink.closed);
            runtime.block_on(async move {
                tokio::select! {
                    _ = closed.wait() => log::debug!("{} released", label),
                    _ = reader(sink) => {}
                }
            });
            // Dropping the runtime drops any connection it still owns.
        })
        .map(|_| ())
        .map_err(|e| StreamError::Connect(format!("failed to start reader thread: {e}")))
}
