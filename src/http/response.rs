//! Engine-level response value.
//!
//! Unlike `http::Response`, the status is settable to any code in 100..=599
//! (informational codes included) and the body tracks whether it was taken.

use axum::http::{header, Extensions, HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;

use crate::http::body::Body;
use crate::http::error::HttpError;

#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    extensions: Extensions,
    used: bool,
}

impl Response {
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
            extensions: Extensions::new(),
            used: false,
        }
    }

    /// A response with the given status and no body.
    pub fn with_status(status: StatusCode) -> Self {
        let mut response = Self::new(Body::Empty);
        response.status = status;
        response
    }

    /// Serialize `value` as the body with `Content-Type: application/json`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        let body = serde_json::to_vec(value)?;
        let mut response = Self::new(body);
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(response)
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut response = Self::new(text.into());
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain;charset=UTF-8"),
        );
        response
    }

    pub fn html(html: impl Into<String>) -> Self {
        let mut response = Self::new(html.into());
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html;charset=UTF-8"),
        );
        response
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Result<Self, HttpError> {
        let value = HeaderValue::from_str(location)
            .map_err(|_| HttpError::internal(format!("invalid redirect target {location}")))?;
        let mut response = Self::with_status(StatusCode::FOUND);
        response.headers.insert(header::LOCATION, value);
        Ok(response)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set any status in 100..=599.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Like [`set_status`](Self::set_status) from a raw code; out-of-range codes are rejected.
    pub fn set_status_code(&mut self, code: u16) -> Result<(), HttpError> {
        match StatusCode::from_u16(code) {
            Ok(status) if code < 600 => {
                self.status = status;
                Ok(())
            }
            _ => Err(HttpError::internal(format!("invalid status code {code}"))),
        }
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Append a `Set-Cookie` entry. Entries are never merged.
    pub fn append_cookie(&mut self, cookie: &str) -> Result<(), HttpError> {
        let value = HeaderValue::from_str(cookie)
            .map_err(|_| HttpError::internal("invalid Set-Cookie value"))?;
        self.headers.append(header::SET_COOKIE, value);
        Ok(())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
        self.used = false;
    }

    /// True once the body has been taken for reading.
    pub fn body_used(&self) -> bool {
        self.used
    }

    /// Take the body out for reading. Leaves the response marked used.
    pub fn take_body(&mut self) -> Body {
        self.used = true;
        std::mem::take(&mut self.body)
    }

    /// Clone status, headers and a buffered body. Used or streaming responses cannot be cloned.
    pub fn try_clone(&self) -> Option<Response> {
        if self.used {
            return None;
        }
        let body = self.body.try_clone()?;
        Some(Response {
            status: self.status,
            headers: self.headers.clone(),
            body,
            extensions: Extensions::new(),
            used: false,
        })
    }
}

impl From<HttpError> for Response {
    fn from(err: HttpError) -> Self {
        err.to_response()
    }
}
