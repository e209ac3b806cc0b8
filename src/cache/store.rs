//! In-memory response store.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;

use crate::http::body::Body;
use crate::http::response::Response;
use crate::observability::metrics;

/// Header stamped on every response served from the cache.
pub const X_LAST_CACHED: &str = "x-last-cached";

/// Marks a response produced by a cache hit so it is never stored again.
#[derive(Debug, Clone, Copy)]
pub struct CachedAt(pub OffsetDateTime);

/// A buffered copy of a response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    cached_at: OffsetDateTime,
}

impl CacheEntry {
    /// Capture `status`, `headers` and `body`. `Content-Encoding` is dropped: bodies are stored decoded.
    pub fn new(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Self {
        headers.remove(header::CONTENT_ENCODING);
        if headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        Self {
            status,
            headers,
            body,
            cached_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn cached_at(&self) -> OffsetDateTime {
        self.cached_at
    }

    /// A fresh response with the stored status, headers and body plus `X-Last-Cached`.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::Full(self.body.clone()));
        response.set_status(self.status);
        *response.headers_mut() = self.headers.clone();
        if let Ok(stamp) = self.cached_at.format(&Rfc3339) {
            if let Ok(value) = HeaderValue::from_str(&stamp) {
                response.headers_mut().insert(X_LAST_CACHED, value);
            }
        }
        response.extensions_mut().insert(CachedAt(self.cached_at));
        response
    }
}

/// Shared response cache, keyed by `METHOD:URL`. Cloning shares the same map.
///
/// Entries never expire; they are removed explicitly.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(method: &Method, url: &Url) -> String {
        format!("{method}:{url}")
    }

    /// Clone the entry under `key` into a response.
    pub fn lookup(&self, key: &str) -> Option<Response> {
        self.entries.get(key).map(|entry| entry.to_response())
    }

    /// Store a buffered response. Streaming bodies are refused (see [`CachePlugin`](super::CachePlugin)).
    pub fn insert(&self, key: impl Into<String>, response: &Response) -> bool {
        if response.body_used() {
            return false;
        }
        let body = match response.body() {
            Body::Empty => Bytes::new(),
            Body::Full(bytes) => bytes.clone(),
            Body::Stream(_) => return false,
        };
        self.insert_entry(key, CacheEntry::new(response.status(), response.headers().clone(), body));
        true
    }

    pub fn insert_entry(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        tracing::debug!(key = %key, bytes = entry.body.len(), "Response cached");
        self.entries.insert(key, entry);
        metrics::set_cache_entries(self.entries.len());
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        metrics::set_cache_entries(self.entries.len());
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::set_cache_entries(0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
