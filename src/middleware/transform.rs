//! Streaming body transforms returned by postprocessors.
//!
//! # Data Flow
//! ```text
//! handler body ──▶ T1.transform ──▶ T2.transform ──▶ … ──▶ transmitter
//!   (end)      ──▶ T1.flush ──▶ T2.transform+flush ──▶ …
//! ```
//!
//! Transforms are applied in postprocessor registration order. Output of an
//! earlier transform's `flush` still passes through every later transform.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};

use crate::http::body::BodyStream;
use crate::http::error::HttpError;

/// A chunk-wise rewrite of an outgoing body (compression, capture, …).
pub trait BodyTransform: Send {
    /// Rewrite one chunk. May return an empty buffer to hold data back.
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError>;

    /// Emit whatever was held back once the source ends.
    fn flush(&mut self) -> Result<Bytes, HttpError> {
        Ok(Bytes::new())
    }
}

struct Splice {
    source: Option<BodyStream>,
    transforms: Vec<Box<dyn BodyTransform>>,
}

impl Splice {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError> {
        let mut chunk = chunk;
        for transform in &mut self.transforms {
            if chunk.is_empty() {
                break;
            }
            chunk = transform.transform(chunk)?;
        }
        Ok(chunk)
    }

    fn flush(&mut self) -> Result<Bytes, HttpError> {
        let mut carried = Bytes::new();
        for transform in &mut self.transforms {
            let mut out = BytesMut::new();
            if !carried.is_empty() {
                out.extend_from_slice(&transform.transform(carried)?);
            }
            out.extend_from_slice(&transform.flush()?);
            carried = out.freeze();
        }
        Ok(carried)
    }
}

/// Pipe `source` through `transforms`. With no transforms the source is returned unchanged.
pub fn splice(source: BodyStream, transforms: Vec<Box<dyn BodyTransform>>) -> BodyStream {
    if transforms.is_empty() {
        return source;
    }
    let state = Splice {
        source: Some(source),
        transforms,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            let source = state.source.as_mut()?;
            match source.next().await {
                Some(Ok(chunk)) => match state.transform(chunk) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => return Some((Ok(out), state)),
                    Err(err) => {
                        state.source = None;
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    // Transforms are not flushed after a failed source.
                    state.source = None;
                    return Some((Err(err), state));
                }
                None => {
                    state.source = None;
                    match state.flush() {
                        Ok(out) if out.is_empty() => return None,
                        Ok(out) => return Some((Ok(out), state)),
                        Err(err) => return Some((Err(err), state)),
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::collect_stream;

    struct Upper;

    impl BodyTransform for Upper {
        fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError> {
            Ok(Bytes::from(chunk.to_ascii_uppercase()))
        }
    }

    /// Holds everything back until flush.
    struct Buffering(BytesMut);

    impl BodyTransform for Buffering {
        fn transform(&mut self, chunk: Bytes) -> Result<Bytes, HttpError> {
            self.0.extend_from_slice(&chunk);
            Ok(Bytes::new())
        }

        fn flush(&mut self) -> Result<Bytes, HttpError> {
            self.0.extend_from_slice(b"!");
            Ok(self.0.split().freeze())
        }
    }

    fn source(chunks: &[&'static str]) -> BodyStream {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[tokio::test]
    async fn flushed_output_passes_through_later_transforms() {
        let spliced = splice(
            source(&["hello ", "world"]),
            vec![Box::new(Buffering(BytesMut::new())), Box::new(Upper)],
        );
        let out = collect_stream(spliced).await.unwrap();
        assert_eq!(out, Bytes::from_static(b"HELLO WORLD!"));
    }

    #[tokio::test]
    async fn source_errors_stop_the_pipe() {
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Err(HttpError::aborted("gone")),
            Ok(Bytes::from_static(b"b")),
        ])
        .boxed();
        let spliced = splice(failing, vec![Box::new(Upper)]);
        let err = collect_stream(spliced).await.unwrap_err();
        assert_eq!(err.message(), "gone");
    }
}
