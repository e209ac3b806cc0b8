//! Response security headers: CORS and Content-Security-Policy.

use axum::http::{header, HeaderValue};
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::middleware::pipeline::{PostprocessResult, Postprocessor};

/// Adds `Access-Control-Allow-Origin` for cross-origin requests.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    allow_credentials: bool,
}

impl Cors {
    pub fn new(allow_credentials: bool) -> Self {
        Self { allow_credentials }
    }

    pub fn apply(&self, response: &mut Response, request: &Request) {
        let Some(origin) = request.headers().get(header::ORIGIN) else {
            return;
        };
        if response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            return;
        }
        let headers = response.headers_mut();
        if self.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        } else {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
}

impl Postprocessor for Cors {
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        _context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult> {
        self.apply(response, request);
        future::ready(Ok(None)).boxed()
    }
}

/// Sets a Content-Security-Policy on document responses that lack one.
#[derive(Debug, Clone)]
pub struct ContentSecurityPolicy {
    policy: HeaderValue,
}

impl ContentSecurityPolicy {
    /// Build from `(directive, sources)` pairs: `default-src 'self'; img-src 'self' data:`.
    pub fn from_directives<'a, I, S>(directives: I) -> Result<Self, HttpError>
    where
        I: IntoIterator<Item = (&'a str, S)>,
        S: IntoIterator<Item = &'a str>,
    {
        let policy = directives
            .into_iter()
            .map(|(name, sources)| {
                let sources: Vec<&str> = sources.into_iter().collect();
                format!("{name} {}", sources.join(" "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(&policy)
    }

    pub fn new(policy: &str) -> Result<Self, HttpError> {
        let policy = HeaderValue::from_str(policy)
            .map_err(|_| HttpError::internal(format!("invalid Content-Security-Policy {policy}")))?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &HeaderValue {
        &self.policy
    }

    pub fn apply(&self, response: &mut Response, request: &Request) {
        if request.destination() == "document"
            && !response.headers().contains_key(header::CONTENT_SECURITY_POLICY)
        {
            response
                .headers_mut()
                .insert(header::CONTENT_SECURITY_POLICY, self.policy.clone());
        }
    }
}

impl Default for ContentSecurityPolicy {
    fn default() -> Self {
        Self {
            policy: HeaderValue::from_static("default-src 'self'"),
        }
    }
}

impl Postprocessor for ContentSecurityPolicy {
    fn postprocess<'a>(
        &'a self,
        response: &'a mut Response,
        request: &'a Request,
        _context: &'a Context,
    ) -> BoxFuture<'a, PostprocessResult> {
        self.apply(response, request);
        future::ready(Ok(None)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::abort::AbortController;
    use axum::http::{HeaderMap, Method};
    use url::Url;

    fn request(headers: &[(&'static str, &'static str)]) -> Request {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        Request::new(
            Method::GET,
            Url::parse("http://localhost/").unwrap(),
            map,
            None,
            AbortController::new().signal(),
        )
    }

    #[test]
    fn cors_wildcard_or_echoed_origin() {
        let req = request(&[("origin", "https://example.com")]);

        let mut response = Response::text("ok");
        Cors::new(false).apply(&mut response, &req);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let mut response = Response::text("ok");
        Cors::new(true).apply(&mut response, &req);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.com"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let mut response = Response::text("ok");
        Cors::new(false).apply(&mut response, &request(&[]));
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn csp_only_for_documents() {
        let csp = ContentSecurityPolicy::from_directives([
            ("default-src", vec!["'self'"]),
            ("img-src", vec!["'self'", "data:"]),
        ])
        .unwrap();
        assert_eq!(csp.policy(), "default-src 'self'; img-src 'self' data:");

        let mut response = Response::html("<p>hi</p>");
        csp.apply(&mut response, &request(&[("sec-fetch-dest", "document")]));
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));

        let mut response = Response::text("{}");
        csp.apply(&mut response, &request(&[]));
        assert!(!response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    }
}
