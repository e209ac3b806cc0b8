//! Request adapter.
//!
//! # Responsibilities
//! - Turn the host stack's `http::Request<axum::body::Body>` into an engine [`Request`]
//! - Expose the body as a cancellable, lazily-consumed byte stream
//! - Transparently inflate `gzip`/`deflate` request bodies
//! - Arm the per-request body timeout
//! - Derive fetch metadata (`cache`, `credentials`, `destination`, `mode`, `priority`)
//!
//! # Design Decisions
//! - Derived fields are recomputed from headers on every access
//! - Bodies exist only for methods other than GET/HEAD/DELETE that declare a Content-Type
//! - Once the signal fires every pending read resolves with the abort reason and
//!   the connection's body is dropped

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use hyper::upgrade::OnUpgrade;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use url::Url;

use crate::encoding::{decode_stream, Encoding};
use crate::http::abort::{AbortController, AbortSignal};
use crate::http::body::{collect_stream, BodyStream};
use crate::http::error::HttpError;

/// Cache mode derived from `Cache-Control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCache {
    Default,
    NoStore,
    NoCache,
}

impl RequestCache {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCache::Default => "default",
            RequestCache::NoStore => "no-store",
            RequestCache::NoCache => "no-cache",
        }
    }
}

/// Whether the request carries credentials (cookies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Include,
    Omit,
}

impl Credentials {
    pub fn as_str(&self) -> &'static str {
        match self {
            Credentials::Include => "include",
            Credentials::Omit => "omit",
        }
    }
}

/// Bucketed urgency from the `Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Auto,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Auto => "auto",
            Priority::Low => "low",
        }
    }
}

/// An incoming request as seen by middleware and handlers.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    referrer: Option<Url>,
    body: Mutex<Option<BodyStream>>,
    body_used: AtomicBool,
    signal: AbortSignal,
    upgrade: Mutex<Option<OnUpgrade>>,
}

impl Request {
    /// Build a request directly. `body` is ignored for bodiless methods.
    pub fn new(
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<BodyStream>,
        signal: AbortSignal,
    ) -> Self {
        let body = if expects_body(&method, &headers) { body } else { None };
        let referrer = headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok());
        Self {
            method,
            url,
            headers,
            referrer,
            body: Mutex::new(body),
            body_used: AtomicBool::new(false),
            signal,
            upgrade: Mutex::new(None),
        }
    }

    /// Adapt a request from the host stack.
    ///
    /// The body stream stops with the abort reason as soon as `controller`
    /// fires. When `timeout` is set and a body is expected, the controller is
    /// aborted with a 408 if the body has not finished within it. A
    /// compressed body fails with 413 once it inflates past `max_decoded` bytes.
    pub fn adapt(
        request: axum::http::Request<axum::body::Body>,
        controller: &AbortController,
        timeout: Option<Duration>,
        max_decoded: usize,
    ) -> Result<Self, HttpError> {
        let (mut parts, body) = request.into_parts();
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = Url::parse(&format!("http://{host}{target}"))
            .map_err(|_| HttpError::bad_request(format!("Invalid request URL {target}")))?;

        let signal = controller.signal();
        let body = if expects_body(&parts.method, &parts.headers) {
            let encoding = content_encoding(&parts.headers)?;
            let done = timeout.map(|timeout| arm_timeout(controller, timeout));
            let stream = abortable(body, signal.clone(), done);
            Some(decode_stream(stream, encoding, max_decoded))
        } else {
            None
        };

        let upgrade = parts.extensions.remove::<OnUpgrade>();
        let request = Self::new(parts.method, url, parts.headers, body, signal);
        *lock(&request.upgrade) = upgrade;
        Ok(request)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// `Referer` as an absolute URL. `None` stands for `about:client`.
    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cache(&self) -> RequestCache {
        match self.header_str(header::CACHE_CONTROL) {
            Some(v) if v.contains("no-store") => RequestCache::NoStore,
            Some(v) if v.contains("no-cache") => RequestCache::NoCache,
            _ => RequestCache::Default,
        }
    }

    pub fn credentials(&self) -> Credentials {
        if self.headers.contains_key(header::COOKIE) {
            Credentials::Include
        } else {
            Credentials::Omit
        }
    }

    pub fn destination(&self) -> &str {
        self.header_str("sec-fetch-dest").unwrap_or("empty")
    }

    pub fn mode(&self) -> &str {
        self.header_str("sec-fetch-mode").unwrap_or("no-cors")
    }

    /// Urgency `u=0..7` from `Priority`: 0-2 high, 3-4 auto, 5-7 low.
    pub fn priority(&self) -> Priority {
        let urgency = self.header_str("priority").and_then(|v| {
            v.split(',')
                .map(str::trim)
                .find_map(|item| item.strip_prefix("u="))
                .and_then(|u| u.parse::<u8>().ok())
        });
        match urgency {
            Some(0..=2) => Priority::High,
            Some(5..=7) => Priority::Low,
            _ => Priority::Auto,
        }
    }

    pub fn has_body(&self) -> bool {
        lock(&self.body).is_some()
    }

    pub fn body_used(&self) -> bool {
        self.body_used.load(Ordering::Acquire)
    }

    /// Take the body stream. Returns `None` for bodiless requests or once taken.
    pub fn take_body(&self) -> Option<BodyStream> {
        let body = lock(&self.body).take();
        if body.is_some() {
            self.body_used.store(true, Ordering::Release);
        }
        body
    }

    /// Read the whole body. Fails with the abort reason if the request is cancelled.
    pub async fn bytes(&self) -> Result<Bytes, HttpError> {
        if self.body_used() {
            return Err(HttpError::internal("request body already used"));
        }
        match self.take_body() {
            Some(stream) => collect_stream(stream).await,
            None => Ok(Bytes::new()),
        }
    }

    pub async fn text(&self) -> Result<String, HttpError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HttpError::bad_request("Request body is not valid UTF-8"))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| HttpError::bad_request(format!("Invalid JSON body: {err}")))
    }

    /// Take the connection upgrade handle (WebSocket).
    pub fn take_upgrade(&self) -> Option<OnUpgrade> {
        lock(&self.upgrade).take()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn expects_body(method: &Method, headers: &HeaderMap) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
        && headers.contains_key(header::CONTENT_TYPE)
}

fn content_encoding(headers: &HeaderMap) -> Result<Encoding, HttpError> {
    let Some(value) = headers.get(header::CONTENT_ENCODING) else {
        return Ok(Encoding::Identity);
    };
    value
        .to_str()
        .ok()
        .and_then(Encoding::parse)
        .ok_or_else(|| {
            HttpError::bad_request(format!(
                "Unsupported Content-Encoding {}",
                String::from_utf8_lossy(value.as_bytes())
            ))
        })
}

/// Abort `controller` with a 408 unless the returned sender is used or dropped first.
fn arm_timeout(controller: &AbortController, timeout: Duration) -> oneshot::Sender<()> {
    let (done, finished) = oneshot::channel::<()>();
    let controller = controller.clone();
    let signal = controller.signal();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                if controller.abort(HttpError::timeout("Request timed out")) {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Request body timed out");
                }
            }
            _ = finished => {}
            _ = signal.aborted() => {}
        }
    });
    done
}

struct Abortable {
    source: axum::body::BodyDataStream,
    signal: AbortSignal,
    _done: Option<oneshot::Sender<()>>,
}

/// Relay the connection's body until it ends or `signal` fires.
fn abortable(
    body: axum::body::Body,
    signal: AbortSignal,
    done: Option<oneshot::Sender<()>>,
) -> BodyStream {
    let state = Abortable {
        source: body.into_data_stream(),
        signal,
        _done: done,
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
            Ok(Some(Err(err))) => Some((Err(HttpError::aborted(err.to_string())), None)),
            // Dropping the state clears the timeout.
            Ok(None) => None,
            Err(reason) => Some((Err(reason), None)),
        }
    })
    .boxed()
}
