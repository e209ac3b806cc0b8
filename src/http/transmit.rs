//! Response transmission.
//!
//! # Data Flow
//! ```text
//! settled Response + body transforms + request signal
//!     → signal already fired? → error response (reason status), Connection: close
//!     → splice transforms (Content-Length dropped)
//!     → relay: each chunk checks the signal; abort ends the stream with an error
//!     → axum::body::Body handed to hyper
//! ```
//!
//! A relay that ends in an error makes hyper tear the connection down instead
//! of finishing the message, so a cancelled response is never completed.

use axum::http::{header, HeaderValue};
use futures_util::stream::{self, StreamExt};

use crate::http::abort::{AbortOnDrop, AbortSignal};
use crate::http::body::{Body, BodyStream};
use crate::http::error::HttpError;
use crate::http::response::Response;
use crate::middleware::transform::{splice, BodyTransform};

/// Hyper-facing response type.
pub type HostResponse = axum::http::Response<axum::body::Body>;

/// Turn the settled response into what hyper writes.
///
/// `guard` aborts the request token if hyper drops the body early (client gone).
pub fn transmit(
    mut response: Response,
    transforms: Vec<Box<dyn BodyTransform>>,
    signal: &AbortSignal,
    guard: AbortOnDrop,
) -> HostResponse {
    if let Some(reason) = signal.reason() {
        guard.disarm();
        return abort_response(&reason);
    }

    if !transforms.is_empty() {
        response.headers_mut().remove(header::CONTENT_LENGTH);
    }
    let status = response.status();
    let headers = std::mem::take(response.headers_mut());
    let body = match response.take_body() {
        Body::Empty if transforms.is_empty() => {
            guard.disarm();
            axum::body::Body::empty()
        }
        Body::Full(bytes) if transforms.is_empty() => {
            guard.disarm();
            axum::body::Body::from(bytes)
        }
        body => {
            let source = splice(body.into_stream(), transforms);
            axum::body::Body::from_stream(relay(source, signal.clone(), guard))
        }
    };

    let mut out = HostResponse::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

/// The error response written when the token fired before transmission.
pub fn abort_response(reason: &HttpError) -> HostResponse {
    reason.log();
    let mut response = reason.to_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    let status = response.status();
    let headers = std::mem::take(response.headers_mut());
    let body = match response.take_body() {
        Body::Full(bytes) => axum::body::Body::from(bytes),
        _ => axum::body::Body::empty(),
    };
    let mut out = HostResponse::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

struct Relay {
    source: BodyStream,
    signal: AbortSignal,
    guard: Option<AbortOnDrop>,
}

/// Forward `source` chunk by chunk until it ends, fails, or `signal` fires.
fn relay(source: BodyStream, signal: AbortSignal, guard: AbortOnDrop) -> BodyStream {
    let state = Relay {
        source,
        signal,
        guard: Some(guard),
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        let next = tokio::select! {
            biased;
            reason = state.signal.aborted() => Err(reason),
            chunk = state.source.next() => Ok(chunk),
        };
        match next {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(state))),
            Ok(Some(Err(err))) => {
                tracing::debug!(error = %err, "Response body failed mid-stream");
                Some((Err(err), None))
            }
            Ok(None) => {
                if let Some(guard) = state.guard.take() {
                    guard.disarm();
                }
                None
            }
            Err(reason) => {
                tracing::debug!(reason = %reason, "Response aborted mid-stream");
                Some((Err(reason), None))
            }
        }
    })
    .boxed()
}
