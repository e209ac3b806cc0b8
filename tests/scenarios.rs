//! End-to-end request scenarios over a real listener.

mod common;

use std::time::Duration;

use reqwest::header;
use reqwest::StatusCode;
use serde_json::Value;

use common::{client, config_with_routes, start, start_with};
use quay::cache::ResponseCache;
use quay::http::{Context, HttpError, Reply, Request};
use quay::ServerBuilder;

#[tokio::test]
async fn unknown_path_is_a_json_404() {
    let server = start(config_with_routes(&[("/echo", "echo")])).await;

    let response = client().get(server.url("/dne")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("application/json"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["name"], "HTTPError");
    assert_eq!(body["error"]["status"], 404);
    assert_eq!(
        body["error"]["message"],
        format!("http://{}/dne not found.", server.addr)
    );
}

#[tokio::test]
async fn tasks_round_trip() {
    let server = start(config_with_routes(&[("/tasks", "tasks")])).await;
    let client = client();

    let response = client
        .post(server.url("/tasks"))
        .json(&serde_json::json!({ "title": "Ship it", "description": "soon" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/tasks?id="));
    let created: Value = response.json().await.unwrap();

    let list: Value = client.get(server.url("/tasks")).send().await.unwrap().json().await.unwrap();
    let tasks = list.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], created["id"]);
    assert_eq!(tasks[0]["completed"], false);

    let one: Value = client.get(server.url(&location)).send().await.unwrap().json().await.unwrap();
    assert_eq!(one["title"], "Ship it");

    let response = client.put(server.url("/tasks")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn serves_static_index_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>static</h1>").unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs").join("index.htm"), "<p>docs</p>").unwrap();

    let mut config = config_with_routes(&[]);
    config.statics.root = Some(dir.path().to_path_buf());
    let server = start(config).await;

    let response = client().get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert_eq!(response.text().await.unwrap(), "<h1>static</h1>");

    let response = client().get(server.url("/docs/")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "<p>docs</p>");

    let response = client().get(server.url("/missing.txt")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn echo_appends_multi_valued_headers() {
    let server = start(config_with_routes(&[("/echo", "echo")])).await;

    let response = client()
        .post(server.url("/echo"))
        .header(header::COOKIE, "theme=dark; lang=en")
        .header(header::CONTENT_TYPE, "text/plain")
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].to_str().unwrap().starts_with("updated="));
    assert_eq!(cookies[1], "client-ip=127.0.0.1");
    let foo: Vec<_> = response.headers().get_all("x-foo").iter().collect();
    assert_eq!(foo, ["bar", "bazz"]);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], "ping");
    assert_eq!(body["requestCookies"]["theme"], "dark");
    assert_eq!(body["signal"]["aborted"], false);
}

fn moved(_: &Request, _: &Context) -> Result<Reply, HttpError> {
    Ok(url::Url::parse("http://localhost/elsewhere").unwrap().into())
}

fn item(_: &Request, context: &Context) -> Result<Reply, HttpError> {
    let id = context.param("id").unwrap_or_default();
    Ok(quay::http::Response::text(format!("item {id}")).into())
}

#[tokio::test]
async fn redirects_and_route_params() {
    let builder = ServerBuilder::new()
        .route("/old", moved)
        .route("/items/:id(\\d+)", item);
    let server = start_with(builder, ResponseCache::new()).await;

    let response = client().get(server.url("/old")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "http://localhost/elsewhere");

    let response = client().get(server.url("/items/42?x=1")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "item 42");

    let response = client().get(server.url("/items/abc")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn out_of_bounds(_: &Request, _: &Context) -> Result<Reply, HttpError> {
    let items: Vec<u32> = Vec::new();
    Ok(quay::http::Response::text(items[3].to_string()).into())
}

#[tokio::test]
async fn panicking_handler_is_a_500() {
    let builder = ServerBuilder::new()
        .route("/boom", out_of_bounds)
        .route("/items/:id", item);
    let server = start_with(builder, ResponseCache::new()).await;

    let response = client().get(server.url("/boom")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["name"], "HandlerContractError");
    assert_eq!(body["error"]["message"], "An unknown error occurred.");
    assert_eq!(body["error"]["status"], 500);

    // The server keeps serving.
    let response = client().get(server.url("/items/7")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "item 7");
}

#[tokio::test]
async fn shutdown_stops_the_listener() {
    let server = start(config_with_routes(&[("/echo", "echo")])).await;
    let addr = server.addr;
    server.stop().await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        client().get(format!("http://{addr}/echo")).send(),
    )
    .await
    .unwrap();
    assert!(result.is_err());
}
