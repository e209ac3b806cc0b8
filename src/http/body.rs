//! Message bodies shared by requests and responses.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::http::error::HttpError;

/// A fallible stream of body chunks. Errors carry the abort reason or a decode failure.
pub type BodyStream = BoxStream<'static, Result<Bytes, HttpError>>;

/// Body of a [`Response`](crate::http::response::Response).
///
/// `Full` bodies can be cloned (for the cache); `Stream` bodies are read once.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<Bytes, HttpError>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// Known length, if the body is buffered.
    pub fn len(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len()),
            Body::Stream(_) => None,
        }
    }

    /// Duplicate a buffered body. Streams cannot be duplicated.
    pub fn try_clone(&self) -> Option<Body> {
        match self {
            Body::Empty => Some(Body::Empty),
            Body::Full(bytes) => Some(Body::Full(bytes.clone())),
            Body::Stream(_) => None,
        }
    }

    /// View the body as a stream regardless of variant.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Empty => stream::empty().boxed(),
            Body::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Body::Stream(stream) => stream,
        }
    }

    /// Buffer the whole body.
    pub async fn collect(self) -> Result<Bytes, HttpError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(stream) => collect_stream(stream).await,
        }
    }
}

pub(crate) async fn collect_stream(mut stream: BodyStream) -> Result<Bytes, HttpError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_bodies_collect_in_order() {
        let body = Body::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"Hello, ")),
            Ok(Bytes::from_static(b"World!")),
        ]));
        assert!(body.try_clone().is_none());
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"Hello, World!"));
    }

    #[tokio::test]
    async fn stream_errors_surface_on_collect() {
        let body = Body::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(HttpError::timeout("Request timed out")),
        ]));
        let err = body.collect().await.unwrap_err();
        assert_eq!(err.message(), "Request timed out");
    }
}
