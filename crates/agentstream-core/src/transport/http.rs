//! HTTP plumbing shared by both adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};

use crate::auth::AuthHeader;
use crate::error::StreamError;

use super::TransportSink;

/// Turns body bytes into sink signals.
pub(crate) trait BodyReader {
    /// Handle one received chunk. Returns false once reading should stop.
    fn chunk(&mut self, bytes: &[u8], sink: &TransportSink) -> bool;

    /// The body ended normally.
    fn end(&mut self, sink: &TransportSink);
}

/// Resolved auth header, owned so it can move onto a reader thread.
pub(crate) fn auth_pair(auth: Option<&AuthHeader>) -> Option<(String, String)> {
    auth.and_then(|auth| auth.header())
        .map(|(name, token)| (name.to_string(), token))
}

/// Client for a single turn.
///
/// No overall timeout: the body stays open for as long as the agent talks.
pub(crate) fn client(connect_timeout: Duration) -> Result<Client, StreamError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| StreamError::Connect(e.to_string()))
}

/// Send the request and check the status before any body is read.
pub(crate) async fn send(
    request: RequestBuilder,
    auth: Option<(String, String)>,
) -> Result<Response, StreamError> {
    let request = match auth {
        Some((name, token)) => request.header(name, token),
        None => request,
    };

    let response = request
        .send()
        .await
        .map_err(|e| StreamError::Connect(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Pull the body chunk by chunk into `reader` until it stops, the body ends,
/// or a read fails.
pub(crate) async fn pump<R: BodyReader>(
    mut response: Response,
    reader: &mut R,
    sink: &TransportSink,
    label: &str,
) {
    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                if !reader.chunk(&bytes, sink) {
                    return;
                }
            }
            Ok(None) => {
                reader.end(sink);
                return;
            }
            Err(e) => {
                if !sink.is_closed() {
                    log::error!("{} read error: {}", label, e);
                }
                sink.fail(StreamError::Read(e.to_string()));
                return;
            }
        }
    }
}
