//! Cache preprocessor (serve hits) and postprocessor (store eligible responses).

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::cache::store::{CacheEntry, CachedAt, ResponseCache};
use crate::encoding::Encoding;
use crate::http::abort::AbortSignal;
use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::{Request, RequestCache};
use crate::http::response::Response;
use crate::middleware::pipeline::{PostprocessResult, Postprocessor, Preprocessor};
use crate::middleware::transform::BodyTransform;
use crate::observability::metrics;

/// Registers as both a preprocessor and a postprocessor over one [`ResponseCache`].
#[derive(Debug, Clone)]
pub struct CachePlugin {
    cache: ResponseCache,
}

impl CachePlugin {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn check(&self, request: &Request, context: &Context) {
        if !cacheable_method(request.method())
            || context.signal().is_aborted()
            || request.cache() == RequestCache::NoStore
        {
            return;
        }
        let key = ResponseCache::key(request.method(), request.url());
        if let Some(hit) = self.cache.lookup(&key) {
            tracing::debug!(key = %key, "Cache hit");
            metrics::record_cache_hit();
            context.resolve(hit);
        }
    }

    fn store(&self, response: &mut Response, request: &Request) -> Option<Box<dyn BodyTransform>> {
        if !eligible(response, request) {
            return None;
        }
        let key = ResponseCache::key(request.method(), request.url());
        if response.body().is_stream() {
            return Some(Box::new(Capture {
                cache: self.cache.clone(),
                key,
                status: response.status(),
                headers: response.headers().clone(),
                buf: BytesMut::new(),
                signal: request.signal().clone(),
            }));
        }
        self.cache.insert(key, response);
        None
    }
}

fn cacheable_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::DELETE
}

fn eligible(response: &Response, request: &Request) -> bool {
    let no_store = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-store"));
    let encoded = response
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| Encoding::parse(v) != Some(Encoding::Identity));

    response.ok()
        && response.status() != StatusCode::PARTIAL_CONTENT
        && !response.body_used()
        && !no_store
        && !encoded
        && response.extensions().get::<CachedAt>().is_none()
        && cacheable_method(request.method())
        && !request.signal().is_aborted()
}

impl Preprocessor for CachePlugin {
    fn preprocess<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        self.check(request, context);
        future::ready(Ok(())).boxed()
    }
}

impl Postprocessor for CachePlugin {
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        _context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult> {
        future::ready(Ok(self.store(response, request))).boxed()
    }
}

/// Tees a streaming body and stores it once the stream completes unaborted.
struct Capture {
    cache: ResponseCache,
    key: String,
    status: StatusCode,
    headers: HeaderMap,
    buf: BytesMut,
    signal: AbortSignal,
}

impl BodyTransform for Capture {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError> {
        self.buf.extend_from_slice(&chunk);
        Ok(chunk)
    }

    fn flush(&mut self) -> Result<Bytes, HttpError> {
        if !self.signal.is_aborted() {
            let body = self.buf.split().freeze();
            let headers = std::mem::take(&mut self.headers);
            self.cache
                .insert_entry(self.key.clone(), CacheEntry::new(self.status, headers, body));
        }
        Ok(Bytes::new())
    }
}
