//! Streams the request body (or a greeting) back one chunk every 500 ms, gzipped.

use std::time::Duration;

use axum::http::{header, HeaderValue};
use bytes::Bytes;
use futures_util::{stream, StreamExt};

use crate::encoding::compress::Compressor;
use crate::encoding::Encoding;
use crate::http::body::{Body, BodyStream};
use crate::http::{Context, HttpError, Reply, Request, Response};
use crate::middleware::transform::{splice, BodyTransform};

const STEP: Duration = Duration::from_millis(500);

pub fn slow(request: &Request, context: &Context) -> Result<Reply, HttpError> {
    let source: BodyStream = request.take_body().unwrap_or_else(|| {
        stream::iter([Ok(Bytes::from_static(b"Hello, World!"))]).boxed()
    });

    let signal = context.signal();
    let delayed = source
        .then(move |chunk| {
            let signal = signal.clone();
            async move {
                tokio::select! {
                    biased;
                    reason = signal.aborted() => {
                        tracing::debug!(reason = %reason, "Slow stream aborted");
                        Err(reason)
                    }
                    _ = tokio::time::sleep(STEP) => chunk,
                }
            }
        })
        .boxed();

    let gzip = Compressor::new(Encoding::Gzip)
        .map(|c| Box::new(c) as Box<dyn BodyTransform>)
        .into_iter()
        .collect();
    let mut response = Response::new(Body::from_stream(splice(delayed, gzip)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    Ok(response.into())
}
