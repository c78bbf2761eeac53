//! Chunked-fetch transport: multipart POST with an incrementally read body.
//!
//! Used when the turn carries an image, which a GET-based event stream has no
//! way to send. The response body is read as it arrives and pushed through the
//! [`FrameDecoder`] in pieces of at most `read_chunk_size` bytes, so the same
//! `data: ` framing applies.

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};

use crate::auth::AuthHeader;
use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::session::TurnRequest;
use crate::stream::{Frame, FrameDecoder};

use super::http::{self, BodyReader};
use super::{spawn_reader, Transport, TransportKind, TransportSink};

pub struct ChunkedFetchTransport {
    config: ClientConfig,
    auth: Option<AuthHeader>,
}

impl ChunkedFetchTransport {
    pub fn new(config: &ClientConfig, auth: Option<AuthHeader>) -> Self {
        Self {
            config: config.clone(),
            auth,
        }
    }
}

impl Transport for ChunkedFetchTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ChunkedFetch
    }

    fn open(&self, request: &TurnRequest, sink: TransportSink) -> Result<(), StreamError> {
        let form = build_form(request)?;
        let url = self.config.endpoint_url(&request.agent.multimodal_path);
        let auth = http::auth_pair(self.auth.as_ref());
        let connect_timeout = self.config.connect_timeout();
        let chunk_size = self.config.read_chunk_size.max(1);
        let sentinel = self.config.sentinel.clone();
        log::debug!("chunked-fetch open: {}", url);

        spawn_reader("chunked-fetch-reader", sink, move |sink| async move {
            let response = match http::client(connect_timeout) {
                Ok(client) => {
                    let post = client
                        .post(&url)
                        .header(ACCEPT, "text/event-stream")
                        .multipart(form);
                    http::send(post, auth).await
                }
                Err(e) => Err(e),
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    log::error!("chunked-fetch request failed: {}", e);
                    sink.fail(e);
                    return;
                }
            };

            let mut reader = ChunkReader::new(FrameDecoder::with_sentinel(sentinel), chunk_size);
            http::pump(response, &mut reader, &sink, "chunked-fetch").await;
        })
    }
}

fn build_form(request: &TurnRequest) -> Result<Form, StreamError> {
    let mut form = Form::new().text("message", request.message.clone());

    if let Some(chat_id) = request.wire_chat_id() {
        form = form.text("chatId", chat_id.to_string());
    }

    if let Some(ref image) = request.image {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| StreamError::InvalidRequest(format!("bad image type: {e}")))?;
        form = form.part("image", part);
    }

    Ok(form)
}

/// Body bytes into the frame decoder, at most `chunk_size` bytes per step.
struct ChunkReader {
    decoder: FrameDecoder,
    chunk_size: usize,
}

impl ChunkReader {
    fn new(decoder: FrameDecoder, chunk_size: usize) -> Self {
        Self {
            decoder,
            chunk_size,
        }
    }
}

impl BodyReader for ChunkReader {
    fn chunk(&mut self, bytes: &[u8], sink: &TransportSink) -> bool {
        for piece in bytes.chunks(self.chunk_size) {
            if sink.is_closed() {
                log::debug!("chunked-fetch closed by consumer");
                return false;
            }
            let frames = self.decoder.feed_bytes(piece);
            if !forward(frames, sink) {
                return false;
            }
        }
        true
    }

    fn end(&mut self, sink: &TransportSink) {
        let frames = self.decoder.flush();
        if forward(frames, sink) {
            sink.complete();
        }
    }
}

/// Forward frames; false once the reader should stop.
fn forward(frames: Vec<Frame>, sink: &TransportSink) -> bool {
    for frame in frames {
        match frame {
            Frame::Payload(payload) => {
                // payload() drops silently once the consumer has closed
                if !sink.payload(payload) {
                    return false;
                }
            }
            Frame::End => {
                sink.complete();
                return false;
            }
        }
    }
    true
}
