//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use quay::cache::ResponseCache;
use quay::config::ServerConfig;
use quay::{handlers, ServerBuilder, Shutdown};

/// A server running on an ephemeral port. Shut down on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub cache: ResponseCache,
    pub task: Option<JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(mut self) -> std::io::Result<()> {
        self.shutdown.trigger();
        match self.task.take() {
            Some(task) => tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("server did not stop")
                .expect("server task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server from configuration with the demo handlers registered.
pub async fn start(config: ServerConfig) -> TestServer {
    let cache = ResponseCache::new();
    let registry = handlers::registry(cache.clone(), None);
    let builder = ServerBuilder::from_config(&config, &registry, cache.clone()).expect("valid config");
    start_with(builder, cache).await
}

/// Start a server from a prepared builder.
pub async fn start_with(builder: ServerBuilder, cache: ResponseCache) -> TestServer {
    let shutdown = Shutdown::new();
    let server = builder.signal(shutdown.signal()).build().expect("server builds");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(server.run(listener));

    TestServer {
        addr,
        shutdown,
        cache,
        task: Some(task),
    }
}

/// Configuration with only the given routes mounted.
pub fn config_with_routes(routes: &[(&str, &str)]) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.routes = routes
        .iter()
        .map(|(pattern, key)| quay::config::RouteConfig::new(*pattern, *key))
        .collect();
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Write `request` verbatim and read until the server closes or `wait` elapses.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8], wait: Duration) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut received = Vec::new();
    let _ = tokio::time::timeout(wait, stream.read_to_end(&mut received)).await;
    String::from_utf8_lossy(&received).into_owned()
}
