//! Plugin behaviour observed through a running server.

mod common;

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use flate2::read::GzDecoder;
use futures_util::future::join_all;
use serde_json::Value;

use common::{client, config_with_routes, raw_exchange, start, start_with};
use quay::cache::{ResponseCache, X_LAST_CACHED};
use quay::http::{Context, HttpError, Reply, Request, Response};
use quay::ServerBuilder;

fn require_authorization(request: &Request, context: &Context) -> Result<(), HttpError> {
    if context.search_param("secure").is_some() && !request.headers().contains_key(header::AUTHORIZATION) {
        return Err(HttpError::new(StatusCode::UNAUTHORIZED, "Missing Authorization header")
            .with_header(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic")));
    }
    Ok(())
}

fn hello(_: &Request, _: &Context) -> Result<Reply, HttpError> {
    Ok(Response::text("hello").into())
}

#[tokio::test]
async fn failing_preprocessor_rejects_while_others_still_run() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let builder = ServerBuilder::new()
        .route("/hello", hello)
        .preprocessor(require_authorization)
        .preprocessor(move |_: &Request, _: &Context| -> Result<(), HttpError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    let server = start_with(builder, ResponseCache::new()).await;

    let response = client().get(server.url("/hello?secure=1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Missing Authorization header");

    let response = client()
        .get(server.url("/hello?secure=1"))
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello");

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limiter_rejects_past_the_threshold() {
    let mut config = config_with_routes(&[("/favicon.svg", "favicon")]);
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 2;
    let server = start(config).await;

    for _ in 0..2 {
        let response = client().get(server.url("/favicon.svg")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client().get(server.url("/favicon.svg")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
}

#[tokio::test]
async fn concurrent_requests_past_the_threshold_are_rejected() {
    const MAX: usize = 5;
    const EXTRA: usize = 4;

    let mut config = config_with_routes(&[("/favicon.svg", "favicon")]);
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = MAX;
    let server = start(config).await;

    let client = client();
    let responses = join_all((0..MAX + EXTRA).map(|_| client.get(server.url("/favicon.svg")).send())).await;

    let mut ok = 0;
    let mut rejected = 0;
    for response in responses {
        let response = response.unwrap();
        match response.status() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => {
                assert_eq!(response.headers()[header::RETRY_AFTER], "60");
                rejected += 1;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, MAX);
    assert_eq!(rejected, EXTRA);
}

/// Headers a replay may legitimately differ in: the capture stamp and the
/// `Date` the connection layer writes at send time.
fn replayable(headers: &HeaderMap) -> Vec<(String, Vec<u8>)> {
    let mut pairs: Vec<_> = headers
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), X_LAST_CACHED | "date"))
        .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
        .collect();
    pairs.sort();
    pairs
}

#[tokio::test]
async fn cached_responses_are_replayed() {
    let mut config = config_with_routes(&[("/favicon.svg", "favicon"), ("/cache", "cache")]);
    config.cache.enabled = true;
    let server = start(config).await;

    let first = client().get(server.url("/favicon.svg")).send().await.unwrap();
    assert!(first.headers().get(X_LAST_CACHED).is_none());
    let first_status = first.status();
    let first_headers = replayable(first.headers());
    let first = first.bytes().await.unwrap();

    let second = client().get(server.url("/favicon.svg")).send().await.unwrap();
    assert!(second.headers().get(X_LAST_CACHED).is_some());
    assert_eq!(second.status(), first_status);
    assert_eq!(replayable(second.headers()), first_headers);
    assert_eq!(second.bytes().await.unwrap(), first);
    assert_eq!(server.cache.len(), 1);

    let response = client().delete(server.url("/cache")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let key = format!("GET:{}", server.url("/favicon.svg"));
    assert!(!server.cache.contains(&key));
}

#[tokio::test]
async fn rate_limit_abort_outranks_a_cache_hit() {
    let mut config = config_with_routes(&[("/favicon.svg", "favicon")]);
    config.cache.enabled = true;
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 1;
    let server = start(config).await;

    let response = client().get(server.url("/favicon.svg")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.cache.len(), 1);

    // The cache holds a hit, but the limiter aborts the same request.
    let response = client().get(server.url("/favicon.svg")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(X_LAST_CACHED).is_none());
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Too many requests");
}

#[tokio::test]
async fn text_responses_are_compressed_on_request() {
    let mut config = config_with_routes(&[("/", "home"), ("/favicon.svg", "favicon")]);
    config.compression.enabled = true;
    let server = start(config).await;

    let response = client()
        .get(server.url("/"))
        .header(header::ACCEPT_ENCODING, "br, gzip;q=0.8")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(response.headers()[header::VARY], "Accept-Encoding");

    let compressed = response.bytes().await.unwrap();
    let mut html = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut html).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));

    // Without the header nothing is encoded.
    let response = client().get(server.url("/")).send().await.unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

    // Only text types are compressed.
    let response = client()
        .get(server.url("/favicon.svg"))
        .header(header::ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn stalled_request_body_times_out() {
    let mut config = config_with_routes(&[("/echo", "echo")]);
    config.timeouts.request_ms = Some(100);
    let server = start(config).await;

    let request = format!(
        "POST /echo HTTP/1.1\r\nHost: {}\r\nContent-Type: text/plain\r\nContent-Length: 100\r\n\r\n0123456789",
        server.addr
    );
    let reply = raw_exchange(server.addr, request.as_bytes(), Duration::from_secs(2)).await;

    assert!(reply.starts_with("HTTP/1.1 408"), "unexpected reply: {reply}");
    assert!(reply.contains("TimeoutError"));
    assert!(!reply.contains("200 OK"));
}
