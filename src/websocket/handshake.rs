//! Opening handshake and connection takeover.

use std::future::Future;

use axum::http::{header, HeaderValue, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};

use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::websocket::socket::WebSocket;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The socket type handed to a session once the connection is upgraded.
pub type UpgradedSocket = WebSocket<TokioIo<Upgraded>>;

/// `base64(SHA-1(key + GUID))`.
pub fn accept_key(key: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(key);
    sha.update(GUID.as_bytes());
    STANDARD.encode(sha.finalize())
}

/// Validate the upgrade request and schedule `session` on the raw connection.
///
/// The returned 101 response must reach the client before the connection is
/// handed over; the session therefore runs on its own task.
pub fn upgrade<F, Fut>(request: &Request, session: F) -> Result<Response, HttpError>
where
    F: FnOnce(UpgradedSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let key = request
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .ok_or_else(|| HttpError::bad_request("Missing Sec-WebSocket-Key header"))?;
    let accept = HeaderValue::from_str(&accept_key(key.as_bytes()))
        .map_err(|_| HttpError::internal("unrepresentable Sec-WebSocket-Accept"))?;
    let on_upgrade = request
        .take_upgrade()
        .ok_or_else(|| HttpError::new(StatusCode::UPGRADE_REQUIRED, "Connection cannot be upgraded"))?;

    let url = request.url().clone();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                tracing::debug!(url = %url, "WebSocket connection opened");
                session(WebSocket::new(TokioIo::new(upgraded))).await;
                tracing::debug!(url = %url, "WebSocket connection closed");
            }
            Err(err) => tracing::warn!(url = %url, error = %err, "WebSocket upgrade failed"),
        }
    });

    let mut response = Response::with_status(StatusCode::SWITCHING_PROTOCOLS);
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
