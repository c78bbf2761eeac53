//! One-shot HTTP stub for transport tests.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use crate::transport::Signal;

/// A server that answers exactly one request.
pub struct StubServer {
    pub base_url: String,
    requests: Receiver<String>,
    client_closed: Receiver<()>,
}

impl StubServer {
    /// Serve `segments` in order, pausing briefly between them so the client
    /// sees them as separate reads, then close.
    pub fn start(segments: Vec<Vec<u8>>) -> Self {
        Self::serve(segments, false)
    }

    /// Like [`StubServer::streaming`], but keeps the connection open after the
    /// last chunk and watches for the client to close it.
    pub fn holding(chunks: &[&str]) -> Self {
        Self::serve(streaming_segments(chunks), true)
    }

    fn serve(segments: Vec<Vec<u8>>, hold: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        let (closed_tx, closed_rx) = mpsc::channel();

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let request = read_request(&mut stream);
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());

            for segment in segments {
                if stream.write_all(&segment).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(Duration::from_millis(20));
            }

            if hold && wait_for_eof(&mut stream) {
                let _ = closed_tx.send(());
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests: rx,
            client_closed: closed_rx,
        }
    }

    /// A 200 event-stream response whose body is sent in `chunks`.
    pub fn streaming(chunks: &[&str]) -> Self {
        Self::start(streaming_segments(chunks))
    }

    /// An error status with an empty body.
    pub fn status(code: u16, reason: &str) -> Self {
        Self::start(vec![format!(
            "HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )
        .into_bytes()])
    }

    /// Whether a held connection was closed by the client within `timeout`.
    pub fn client_closed_within(&self, timeout: Duration) -> bool {
        self.client_closed.recv_timeout(timeout).is_ok()
    }

    /// The raw request the server received.
    pub fn request(&self) -> String {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_default()
    }
}

fn streaming_segments(chunks: &[&str]) -> Vec<Vec<u8>> {
    let mut segments =
        vec![b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n"
            .to_vec()];
    segments.extend(chunks.iter().map(|chunk| chunk.as_bytes().to_vec()));
    segments
}

/// Block until the peer closes (true) or nothing happens for 10s (false).
fn wait_for_eof(stream: &mut TcpStream) -> bool {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return false
            }
            Err(_) => return true,
        }
    }
}

/// A base URL nothing is listening on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Collect signals until a terminal one (or timeout).
pub fn collect_signals(rx: &Receiver<Signal>) -> Vec<Signal> {
    let mut signals = Vec::new();
    while let Ok(signal) = rx.recv_timeout(Duration::from_secs(5)) {
        let terminal = matches!(signal, Signal::Completed | Signal::Failed(_));
        signals.push(signal);
        if terminal {
            break;
        }
    }
    signals
}

fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);

        let Some(head_end) = find(&data, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..head_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());

        let complete = match content_length {
            Some(len) => data.len() >= head_end + 4 + len,
            None if head.contains("transfer-encoding: chunked") => data.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
    }

    data
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
