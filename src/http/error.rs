//! Engine error type and its wire format.
//!
//! # Taxonomy
//! - `Client`: an explicit status surfaced verbatim (bad request, not found, rate limited, 502)
//! - `Timeout`: the request deadline elapsed (408)
//! - `Aborted`: the request token fired without a more specific reason (408)
//! - `Contract`: a handler misbehaved or failed unexpectedly (500, generic message)
//! - `Aggregate`: several preprocessors failed at once
//! - `Transmission`: the connection dropped mid-write (fatal to that connection only)
//!
//! Every error renders as `{"error":{"name":…,"message":…,"status":…}}`.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use crate::http::body::Body;
use crate::http::response::Response;

/// Message shown to clients in place of an unanticipated failure.
pub const GENERIC_MESSAGE: &str = "An unknown error occurred.";

/// Classification of an [`HttpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Timeout,
    Aborted,
    Contract,
    Aggregate,
    Transmission,
}

impl ErrorKind {
    /// Name used in the JSON error payload.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Client => "HTTPError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Aborted => "AbortError",
            ErrorKind::Contract => "HandlerContractError",
            ErrorKind::Aggregate => "AggregateError",
            ErrorKind::Transmission => "TransmissionError",
        }
    }
}

/// The single error type flowing through the request lifecycle.
///
/// Cloneable so that an abort reason can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    kind: ErrorKind,
    message: String,
    status: StatusCode,
    headers: HeaderMap,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    name: &'a str,
    message: &'a str,
    status: u16,
}

impl HttpError {
    /// An error with a status and message chosen by the caller, surfaced verbatim.
    ///
    /// Any status is accepted; a deliberate 5xx keeps its message. Unanticipated
    /// failures belong in [`HttpError::contract`] or [`HttpError::internal`].
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Client,
            message: message.into(),
            status,
            headers: HeaderMap::new(),
            cause: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// The request deadline elapsed before the body completed.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            ..Self::new(StatusCode::REQUEST_TIMEOUT, message)
        }
    }

    /// A cancellation without a more specific reason (client went away, shutdown).
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Aborted,
            ..Self::new(StatusCode::REQUEST_TIMEOUT, message)
        }
    }

    /// A handler broke its contract. The client only ever sees [`GENERIC_MESSAGE`].
    pub fn contract<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Contract,
            message: GENERIC_MESSAGE.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// The server is going away; in-flight requests end with 503.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Aborted,
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }

    /// A contract failure described only by text (nothing to chain as a source).
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::contract(Detail(detail.into()))
    }

    /// The connection failed while the response was being written.
    pub fn transmission(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transmission,
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }

    /// Combine several failures. The first error decides status and headers.
    pub fn aggregate(errors: Vec<HttpError>) -> Self {
        let mut errors = errors.into_iter();
        let Some(first) = errors.next() else {
            return Self::internal("empty aggregate error");
        };
        let mut message = first.message.clone();
        for err in errors {
            message.push_str("; ");
            message.push_str(&err.message);
        }
        Self {
            kind: ErrorKind::Aggregate,
            message,
            status: first.status,
            headers: first.headers.clone(),
            cause: Some(Arc::new(first)),
        }
    }

    /// Attach a response header (e.g. `Retry-After`, `WWW-Authenticate`).
    pub fn with_header(mut self, name: HeaderName, value: impl Into<HeaderValue>) -> Self {
        self.headers.append(name, value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> String {
        let body = ErrorBody {
            error: ErrorPayload {
                name: self.name(),
                message: &self.message,
                status: self.status.as_u16(),
            },
        };
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(&body).unwrap_or_default()
    }

    /// Render as a response carrying the error's status and headers.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.to_json()));
        response.set_status(self.status);
        for (name, value) in &self.headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }

    /// Log the hidden cause of a contract error. Everything else is the client's business.
    pub fn log(&self) {
        match (&self.kind, &self.cause) {
            (ErrorKind::Contract, Some(cause)) => {
                tracing::error!(error = %cause, "Handler contract violation");
            }
            (ErrorKind::Contract, None) => {
                tracing::error!(error = %self.message, "Handler contract violation");
            }
            _ => {
                tracing::debug!(status = %self.status, error = %self.message, kind = self.name(), "Request failed");
            }
        }
    }
}

#[derive(Debug)]
struct Detail(String);

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Detail {}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::contract(err)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::contract(err)
    }
}

impl From<axum::Error> for HttpError {
    fn from(err: axum::Error) -> Self {
        HttpError::transmission(err.to_string())
    }
}
