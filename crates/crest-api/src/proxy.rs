//! Driving a forwarded exchange against a remote peer.
//!
//! The request body is streamed to the peer chunk by chunk through the
//! secret scanner; the peer's response is streamed back verbatim. Nothing
//! is buffered whole. A scanner hit aborts the upload mid-stream and is
//! reported separately from transport failures, which blacklist the peer.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::extract::Request;
use axum::response::Response;
use bytes::Bytes;
use axum::http::header::{self, HeaderMap, HeaderName};
use futures::{Stream, StreamExt, TryStreamExt};

use crest_core::node::epoch_secs;
use crest_core::peer::Peer;
use crest_services::{PeerSelector, SecretKind, SecretScanner};

use crate::API_PATH;

/// Safety margin subtracted from the peer's advertised idle timeout so
/// this side gives up before racing the remote server's own timeout.
pub const IDLE_TIMEOUT_DELTA_MS: u64 = 5_000;

pub enum ForwardError {
    /// The scanner fired; the remainder of the body was never sent.
    SecretDetected(SecretKind),
    /// Connection refused, reset, timed out, or the peer spoke garbage.
    Transport(reqwest::Error),
}

/// Target URI for a selected peer: scheme and port by TLS availability,
/// fixed API path, original query string appended verbatim.
pub fn remote_target(peer: &Peer, query: Option<&str>) -> String {
    let (scheme, port) = if peer.offers_api_ssl() {
        ("https", peer.api_ssl_port)
    } else {
        ("http", peer.api_port)
    };
    let mut target = format!("{scheme}://{}:{port}{API_PATH}", peer.host);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Target URI for the operator-forced remote server.
pub fn forced_target(base: &str, query: Option<&str>) -> String {
    let mut target = base.trim_end_matches('/').to_string();
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Forward `req` to `target`, streaming both directions.
///
/// When a peer is given, its idle-timeout hint bounds the exchange and a
/// transport failure blacklists its host. The forced-URL path passes no
/// peer and gets neither.
pub async fn forward(
    client: &reqwest::Client,
    selector: &Arc<PeerSelector>,
    target: &str,
    peer: Option<&Peer>,
    req: Request,
) -> Result<Response, ForwardError> {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("multipart"))
        .unwrap_or(false);

    let detected: Arc<OnceLock<SecretKind>> = Arc::new(OnceLock::new());
    let body_stream = req.into_body().into_data_stream();
    // File uploads are passed through unscanned: the sensitive fields are
    // literal key=value text, and scanning binary parts would only yield
    // false positives.
    let body = if multipart {
        reqwest::Body::wrap_stream(body_stream.map_err(io::Error::other))
    } else {
        reqwest::Body::wrap_stream(scanned_body(body_stream, detected.clone()))
    };

    let mut builder = client
        .request(method, target)
        .headers(strip_hop_headers(&headers))
        .body(body);
    if let Some(timeout) = peer.and_then(exchange_timeout) {
        builder = builder.timeout(timeout);
    }

    let upstream = match builder.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            if let Some(kind) = detected.get() {
                return Err(ForwardError::SecretDetected(*kind));
            }
            if let Some(peer) = peer {
                selector.blacklist_host(&peer.host, epoch_secs());
            }
            return Err(ForwardError::Transport(e));
        }
    };

    let status = upstream.status();
    let response_headers = strip_hop_headers(upstream.headers());

    // A failure while relaying the response body is a transport failure
    // too; the client sees a truncated body, the peer gets blacklisted.
    let blacklist_on_error = {
        let selector = selector.clone();
        let host = peer.map(|p| p.host.clone());
        move |e: &reqwest::Error| {
            tracing::warn!(error = %e, "proxied response stream failed");
            if let Some(host) = &host {
                selector.blacklist_host(host, epoch_secs());
            }
        }
    };
    let body = Body::from_stream(upstream.bytes_stream().inspect_err(blacklist_on_error));

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// The exchange must finish inside the peer's own idle timeout, with a
/// margin; a hint at or below the margin means no bound can be trusted.
fn exchange_timeout(peer: &Peer) -> Option<Duration> {
    let ms = peer.api_idle_timeout_ms.saturating_sub(IDLE_TIMEOUT_DELTA_MS);
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Wrap the request body so every chunk passes the scanner before going
/// upstream. Detection records the kind in `detected` and fails the
/// stream, which aborts the upload without sending the rest of the body.
fn scanned_body(
    stream: BodyDataStream,
    detected: Arc<OnceLock<SecretKind>>,
) -> impl Stream<Item = Result<Bytes, io::Error>> {
    let mut scanner = SecretScanner::new();
    stream.map(move |chunk| {
        let chunk = chunk.map_err(io::Error::other)?;
        if let Some(kind) = scanner.scan(&chunk) {
            let _ = detected.set(kind);
            return Err(io::Error::other("secret parameter in request body"));
        }
        Ok(chunk)
    })
}

/// Hop-by-hop and length-bearing headers that must not cross the proxy.
const STRIPPED_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

fn strip_hop_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if !STRIPPED_HEADERS.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}
