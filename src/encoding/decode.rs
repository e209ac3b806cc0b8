//! Streaming request-body decompression.

use std::io::Write;

use axum::http::StatusCode;
use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};
use futures_util::stream::{self, StreamExt};

use crate::encoding::Encoding;
use crate::http::body::BodyStream;
use crate::http::error::HttpError;

enum Inflater {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Inflater {
    fn new(encoding: Encoding) -> Option<Self> {
        match encoding {
            Encoding::Identity => None,
            Encoding::Gzip => Some(Inflater::Gzip(GzDecoder::new(Vec::new()))),
            Encoding::Deflate => Some(Inflater::Deflate(ZlibDecoder::new(Vec::new()))),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> std::io::Result<Bytes> {
        let out = match self {
            Inflater::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                std::mem::take(decoder.get_mut())
            }
            Inflater::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                std::mem::take(decoder.get_mut())
            }
        };
        Ok(Bytes::from(out))
    }

    fn finish(self) -> std::io::Result<Bytes> {
        let out = match self {
            Inflater::Gzip(decoder) => decoder.finish()?,
            Inflater::Deflate(decoder) => decoder.finish()?,
        };
        Ok(Bytes::from(out))
    }
}

/// Default ceiling on the inflated size of a request body.
pub const DEFAULT_MAX_DECODED: usize = 16 * 1024 * 1024;

fn too_large(encoding: Encoding, limit: usize) -> HttpError {
    tracing::debug!(encoding = %encoding, limit, "Decoded request body exceeds limit");
    HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
}

fn invalid(encoding: Encoding, err: std::io::Error) -> HttpError {
    tracing::debug!(encoding = %encoding, error = %err, "Failed to decode request body");
    HttpError::bad_request(format!("Invalid {encoding} request body"))
}

/// Inflate `source` according to `encoding`. Identity returns the stream untouched.
///
/// The stream fails with 413 once more than `limit` bytes have been inflated.
pub fn decode_stream(source: BodyStream, encoding: Encoding, limit: usize) -> BodyStream {
    let Some(inflater) = Inflater::new(encoding) else {
        return source;
    };
    stream::unfold(Some((source, inflater, 0usize)), move |state| async move {
        let (mut source, mut inflater, mut total) = state?;
        loop {
            let out = match source.next().await {
                Some(Ok(chunk)) => match inflater.push(&chunk) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => out,
                    Err(err) => return Some((Err(invalid(encoding, err)), None)),
                },
                Some(Err(err)) => return Some((Err(err), None)),
                None => {
                    return match inflater.finish() {
                        Ok(out) if out.is_empty() => None,
                        Ok(out) if total + out.len() > limit => Some((Err(too_large(encoding, limit)), None)),
                        Ok(out) => Some((Ok(out), None)),
                        Err(err) => Some((Err(invalid(encoding, err)), None)),
                    };
                }
            };
            total += out.len();
            if total > limit {
                return Some((Err(too_large(encoding, limit)), None));
            }
            return Some((Ok(out), Some((source, inflater, total))));
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::collect_stream;
    use flate2::write::{GzEncoder, ZlibEncoder};

    fn chunked(data: Vec<u8>, size: usize) -> BodyStream {
        let chunks: Vec<_> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn inflates_gzip_across_chunk_boundaries() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(br#"{"title":"Test Task"}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = collect_stream(decode_stream(chunked(compressed, 3), Encoding::Gzip, DEFAULT_MAX_DECODED))
            .await
            .unwrap();
        assert_eq!(decoded, Bytes::from_static(br#"{"title":"Test Task"}"#));
    }

    #[tokio::test]
    async fn inflates_zlib_deflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(b"hello deflate").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = collect_stream(decode_stream(chunked(compressed, 4), Encoding::Deflate, DEFAULT_MAX_DECODED))
            .await
            .unwrap();
        assert_eq!(decoded, Bytes::from_static(b"hello deflate"));
    }

    #[tokio::test]
    async fn garbage_is_a_client_error() {
        let err = collect_stream(decode_stream(
            chunked(b"definitely not gzip".to_vec(), 8),
            Encoding::Gzip,
            DEFAULT_MAX_DECODED,
        ))
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn inflation_past_the_limit_is_rejected() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(&vec![0u8; 1024 * 1024]).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < 4096);

        let err = collect_stream(decode_stream(chunked(compressed, 512), Encoding::Gzip, 64 * 1024))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
