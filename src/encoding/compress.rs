//! Response compression postprocessor.

use std::io::Write;

use axum::http::{header, HeaderValue};
use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::encoding::Encoding;
use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::middleware::pipeline::{PostprocessResult, Postprocessor};
use crate::middleware::transform::BodyTransform;

/// Compresses `text/*` bodies when the client accepts the configured coding.
#[derive(Debug, Clone, Copy)]
pub struct Compression {
    format: Encoding,
}

impl Compression {
    /// `format` must be gzip or deflate; identity disables compression.
    pub fn new(format: Encoding) -> Self {
        Self { format }
    }

    pub fn gzip() -> Self {
        Self::new(Encoding::Gzip)
    }

    pub fn deflate() -> Self {
        Self::new(Encoding::Deflate)
    }

    fn applies(&self, response: &Response, request: &Request) -> bool {
        if self.format == Encoding::Identity || response.body().is_empty() {
            return false;
        }
        let is_text = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/"));
        let accepted = request
            .headers()
            .get_all(header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|token| token.split(';').next().unwrap_or("").trim())
            .any(|token| token.eq_ignore_ascii_case(self.format.as_str()));

        is_text && accepted && !response.headers().contains_key(header::CONTENT_ENCODING)
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::gzip()
    }
}

impl Postprocessor for Compression {
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        _context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult> {
        let result = if self.applies(response, request) {
            response.headers_mut().insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(self.format.as_str()),
            );
            response
                .headers_mut()
                .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            Compressor::new(self.format).map(|c| Box::new(c) as Box<dyn BodyTransform>)
        } else {
            None
        };
        future::ready(Ok(result)).boxed()
    }
}

/// Streaming encoder usable as a spliced body transform.
pub enum Compressor {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
    Finished,
}

impl Compressor {
    pub fn new(format: Encoding) -> Option<Self> {
        let level = flate2::Compression::default();
        match format {
            Encoding::Identity => None,
            Encoding::Gzip => Some(Compressor::Gzip(GzEncoder::new(Vec::new(), level))),
            Encoding::Deflate => Some(Compressor::Deflate(ZlibEncoder::new(Vec::new(), level))),
        }
    }
}

impl BodyTransform for Compressor {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError> {
        let out = match self {
            Compressor::Gzip(encoder) => {
                encoder.write_all(&chunk)?;
                std::mem::take(encoder.get_mut())
            }
            Compressor::Deflate(encoder) => {
                encoder.write_all(&chunk)?;
                std::mem::take(encoder.get_mut())
            }
            Compressor::Finished => Vec::new(),
        };
        Ok(Bytes::from(out))
    }

    fn flush(&mut self) -> Result<Bytes, HttpError> {
        let out = match std::mem::replace(self, Compressor::Finished) {
            Compressor::Gzip(encoder) => encoder.finish()?,
            Compressor::Deflate(encoder) => encoder.finish()?,
            Compressor::Finished => Vec::new(),
        };
        Ok(Bytes::from(out))
    }
}
