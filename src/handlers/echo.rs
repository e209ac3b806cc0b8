//! Reflects the request back as JSON.

use axum::http::{header, HeaderValue};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use time::OffsetDateTime;

use crate::handlers::describe;
use crate::http::{Context, HttpError, Reply, Request, Response};
use crate::routing::Handler;

/// Echo handler. Sets two cookies and two `X-Foo` values to show that
/// multi-valued headers are appended, not merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Handler for Echo {
    fn call<'a>(&'a self, request: &'a Request, context: &'a Context) -> BoxFuture<'a, Result<Reply, HttpError>> {
        async move {
            let updated = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            let cookies = [format!("updated={updated}"), format!("client-ip={}", context.ip())];

            let mut info = describe(request, context);
            info.insert("cookies".into(), Value::from(cookies.to_vec()));
            let body = if request.has_body() {
                Value::from(request.text().await?)
            } else {
                Value::Null
            };
            info.insert("body".into(), body);
            info.insert(
                "signal".into(),
                serde_json::json!({ "aborted": request.signal().is_aborted() }),
            );

            let mut response = Response::json(&info)?;
            for cookie in &cookies {
                response.append_cookie(cookie)?;
            }
            let headers = response.headers_mut();
            headers.append("x-foo", HeaderValue::from_static("bar"));
            headers.append("x-foo", HeaderValue::from_static("bazz"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            Ok(response.into())
        }
        .boxed()
    }
}
