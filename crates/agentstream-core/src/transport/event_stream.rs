//! Event-stream transport: server-sent events over a GET request.
//!
//! There is no request body, so the prompt travels as query parameters
//! (`message`, plus `chatId` for agents with server-side memory). The body is
//! split into lines on a background reader; each dispatched `message` event is
//! one payload.

use reqwest::header::ACCEPT;

use crate::auth::AuthHeader;
use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::session::TurnRequest;
use crate::stream::{Frame, FrameDecoder};

use super::http::{self, BodyReader};
use super::sse::SseParser;
use super::{spawn_reader, Transport, TransportKind, TransportSink};

pub struct EventStreamTransport {
    config: ClientConfig,
    auth: Option<AuthHeader>,
}

impl EventStreamTransport {
    pub fn new(config: &ClientConfig, auth: Option<AuthHeader>) -> Self {
        Self {
            config: config.clone(),
            auth,
        }
    }

    fn query(request: &TurnRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![("message", request.message.clone())];
        if let Some(chat_id) = request.wire_chat_id() {
            query.push(("chatId", chat_id.to_string()));
        }
        query
    }
}

impl Transport for EventStreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::EventStream
    }

    fn open(&self, request: &TurnRequest, sink: TransportSink) -> Result<(), StreamError> {
        let url = self.config.endpoint_url(&request.agent.stream_path);
        let query = Self::query(request);
        let auth = http::auth_pair(self.auth.as_ref());
        let connect_timeout = self.config.connect_timeout();
        let sentinel = self.config.sentinel.clone();
        log::debug!("event-stream open: {}", url);

        spawn_reader("event-stream-reader", sink, move |sink| async move {
            let response = match http::client(connect_timeout) {
                Ok(client) => {
                    let get = client
                        .get(&url)
                        .header(ACCEPT, "text/event-stream")
                        .query(&query);
                    http::send(get, auth).await
                }
                Err(e) => Err(e),
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    log::error!("event-stream open failed: {}", e);
                    sink.fail(e);
                    return;
                }
            };

            let mut reader = EventReader::new(&sentinel);
            http::pump(response, &mut reader, &sink, "event-stream").await;
        })
    }
}

/// SSE lines in, payloads out.
struct EventReader {
    parser: SseParser,
    decoder: FrameDecoder,
    /// Bytes of the line being received.
    line: Vec<u8>,
}

impl EventReader {
    fn new(sentinel: &str) -> Self {
        Self {
            parser: SseParser::new(),
            decoder: FrameDecoder::with_sentinel(sentinel),
            line: Vec::new(),
        }
    }

    /// Forward the events `text` dispatches. False once reading should stop.
    fn dispatch(&mut self, text: &str, sink: &TransportSink) -> bool {
        for message in self.parser.feed(text) {
            if !message.is_message() {
                log::debug!("skipping '{}' event", message.event);
                continue;
            }
            match self.decoder.accept_message(&message.data) {
                Some(Frame::Payload(payload)) => {
                    if !sink.payload(payload) {
                        return false;
                    }
                }
                Some(Frame::End) => {
                    sink.complete();
                    return false;
                }
                None => {}
            }
        }
        true
    }
}

impl BodyReader for EventReader {
    fn chunk(&mut self, bytes: &[u8], sink: &TransportSink) -> bool {
        self.line.extend_from_slice(bytes);

        while let Some(newline) = self.line.iter().position(|&b| b == b'\n') {
            let rest = self.line.split_off(newline + 1);
            let line = std::mem::replace(&mut self.line, rest);
            // Whole lines only, so a lossy decode can't split a character.
            let text = String::from_utf8_lossy(&line);
            if !self.dispatch(&text, sink) {
                return false;
            }
        }
        true
    }

    fn end(&mut self, sink: &TransportSink) {
        self.parser.finish();
        sink.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::session::AgentEndpoint;
    use crate::test_support::{collect_signals, refused_url, StubServer};
    use crate::transport::{channel, Signal};
    use std::sync::Arc;
    use std::time::Duration;

    fn transport_for(base_url: &str, auth: Option<AuthHeader>) -> EventStreamTransport {
        let config = ClientConfig {
            base_url: base_url.to_string(),
            ..ClientConfig::default()
        };
        EventStreamTransport::new(&config, auth)
    }

    fn payload(text: &str) -> Signal {
        Signal::Payload(text.to_string())
    }

    mod reading {
        use super::*;

        fn read(chunks: &[&[u8]]) -> Vec<Signal> {
            let (sink, _conn, rx) = channel();
            let mut reader = EventReader::new("[DONE]");
            let mut open = true;
            for chunk in chunks {
                open = reader.chunk(chunk, &sink);
                if !open {
                    break;
                }
            }
            if open {
                reader.end(&sink);
            }
            rx.try_iter().collect()
        }

        #[test]
        fn messages_until_sentinel() {
            let signals = read(&[b"data:Hel\n\ndata:lo\n\ndata:[DONE]\n\ndata:ignored\n\n"]);
            assert_eq!(signals, vec![payload("Hel"), payload("lo"), Signal::Completed]);
        }

        #[test]
        fn lines_split_across_chunks() {
            let signals = read(&[b"da", b"ta: Hel", b"lo\n", b"\n", b"data: [DONE]\n\n"]);
            assert_eq!(signals, vec![payload("Hello"), Signal::Completed]);
        }

        #[test]
        fn character_split_across_chunks() {
            let bytes = "data: 你好\n\n".as_bytes();
            let signals = read(&[&bytes[..7], &bytes[7..]]);
            assert_eq!(signals, vec![payload("你好"), Signal::Completed]);
        }

        #[test]
        fn end_of_body_completes() {
            let signals = read(&[b"data: a\n\n"]);
            assert_eq!(signals, vec![payload("a"), Signal::Completed]);
        }

        #[test]
        fn named_events_are_not_payloads() {
            let signals = read(&[b"event: ping\ndata: x\n\ndata: y\n\n"]);
            assert_eq!(signals, vec![payload("y"), Signal::Completed]);
        }

        #[test]
        fn closed_sink_stops_reading() {
            let (sink, conn, rx) = channel();
            conn.close();
            let mut reader = EventReader::new("[DONE]");
            assert!(!reader.chunk(b"data: a\n\n", &sink));
            assert!(rx.try_iter().next().is_none());
        }
    }

    mod http {
        use super::*;

        #[test]
        fn streams_payloads_from_server() {
            let server = StubServer::streaming(&["data:Hel\n\n", "data:lo\n\n", "data:[DONE]\n\n"]);
            let transport = transport_for(&server.base_url, None);
            let (sink, _conn, rx) = channel();

            let request = TurnRequest::new(AgentEndpoint::inspector(), "hello").chat_id("chat-1");
            transport.open(&request, sink).unwrap();

            let signals = collect_signals(&rx);
            assert_eq!(signals, vec![payload("Hel"), payload("lo"), Signal::Completed]);

            let raw = server.request();
            let request_line = raw.lines().next().unwrap_or_default();
            assert!(request_line.starts_with("GET /ai/inspector_app/chat/sse?"));
            assert!(request_line.contains("message=hello"));
            assert!(request_line.contains("chatId=chat-1"));
            assert!(raw.to_lowercase().contains("accept: text/event-stream"));
        }

        #[test]
        fn message_is_percent_encoded() {
            let server = StubServer::streaming(&["data:[DONE]\n\n"]);
            let transport = transport_for(&server.base_url, None);
            let (sink, _conn, rx) = channel();

            transport
                .open(&TurnRequest::new(AgentEndpoint::manus(), "你&"), sink)
                .unwrap();
            collect_signals(&rx);

            let raw = server.request();
            assert!(raw.contains("message=%E4%BD%A0%26"));
            assert!(!raw.contains("chatId"));
        }

        #[test]
        fn auth_header_is_sent() {
            let server = StubServer::streaming(&["data:[DONE]\n\n"]);
            let auth = AuthHeader::new("satoken", Arc::new(StaticToken(Some("tok".to_string()))));
            let transport = transport_for(&server.base_url, Some(auth));
            let (sink, _conn, rx) = channel();

            transport
                .open(&TurnRequest::new(AgentEndpoint::manus(), "hi"), sink)
                .unwrap();
            collect_signals(&rx);

            assert!(server.request().to_lowercase().contains("satoken: tok"));
        }

        #[test]
        fn error_status_fails_once() {
            let server = StubServer::status(500, "Internal Server Error");
            let transport = transport_for(&server.base_url, None);
            let (sink, _conn, rx) = channel();

            transport
                .open(&TurnRequest::new(AgentEndpoint::manus(), "hi"), sink)
                .unwrap();

            let signals = collect_signals(&rx);
            assert_eq!(signals, vec![Signal::Failed(StreamError::Status(500))]);
        }

        #[test]
        fn refused_connection_fails() {
            let transport = transport_for(&refused_url(), None);
            let (sink, _conn, rx) = channel();

            transport
                .open(&TurnRequest::new(AgentEndpoint::manus(), "hi"), sink)
                .unwrap();

            let signals = collect_signals(&rx);
            assert_eq!(signals.len(), 1);
            assert!(matches!(signals[0], Signal::Failed(StreamError::Connect(_))));
        }

        #[test]
        fn close_shuts_down_an_idle_stream() {
            let server = StubServer::holding(&["data: first\n\n"]);
            let transport = transport_for(&server.base_url, None);
            let (sink, conn, rx) = channel();

            transport
                .open(&TurnRequest::new(AgentEndpoint::manus(), "hi"), sink)
                .unwrap();
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(5)).unwrap(),
                payload("first")
            );
            // the server is silent but the connection stays up
            assert!(!server.client_closed_within(Duration::from_millis(200)));

            assert!(conn.close());
            assert!(server.client_closed_within(Duration::from_secs(2)));
            assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        }
    }
}
