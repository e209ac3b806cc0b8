//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the engine: route table, middleware pipeline, static files
//! - Wire plugins from configuration in a fixed order
//! - Create the Axum service (one catch-all handler, tracing layer)
//! - Serve plain HTTP or HTTPS until the shutdown signal fires

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cache::{CachePlugin, ResponseCache};
use crate::config::schema::{RouteConfig, ServerConfig};
use crate::encoding::{Compression, Encoding, DEFAULT_MAX_DECODED};
use crate::http::abort::{AbortController, AbortSignal};
use crate::http::dispatch::Engine;
use crate::http::transmit::HostResponse;
use crate::middleware::pipeline::{Pipeline, Postprocessor, Preprocessor};
use crate::observability::RequestLogger;
use crate::routing::{Handler, HandlerRef, PatternError, Registry, RouteTable, StaticFiles};
use crate::security::{ContentSecurityPolicy, Cors, RateLimitOptions, RateLimiter};

/// How long TLS connections may drain after shutdown.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Error type for server assembly.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("No handler registered under {0:?}")]
    UnknownHandler(String),

    #[error("Unsupported compression format {0:?}")]
    UnsupportedEncoding(String),

    #[error("Invalid Content-Security-Policy: {0}")]
    InvalidPolicy(String),
}

/// Builder for [`HttpServer`].
///
/// Preprocessors run concurrently; postprocessors run in the order added.
pub struct ServerBuilder {
    pathname: String,
    routes: Vec<(String, HandlerRef)>,
    pipeline: Pipeline,
    statics: Option<StaticFiles>,
    static_paths: Vec<String>,
    timeout: Option<Duration>,
    max_decoded_body: usize,
    signal: Option<AbortSignal>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            pathname: "/".to_string(),
            routes: Vec::new(),
            pipeline: Pipeline::new(),
            statics: None,
            static_paths: Vec::new(),
            timeout: None,
            max_decoded_body: DEFAULT_MAX_DECODED,
            signal: None,
        }
    }

    /// Build from configuration, resolving route keys through `registry`.
    ///
    /// Plugin order:
    /// - preprocessors: request logger, rate limiter, cache lookup
    /// - postprocessors: cache capture, CORS, CSP, compression
    ///
    /// The cache captures bodies before compression encodes them. `cache`
    /// is only wired in when `cache.enabled` is set. Must be called from
    /// within a Tokio runtime when rate limiting is enabled.
    pub fn from_config(
        config: &ServerConfig,
        registry: &Registry,
        cache: ResponseCache,
    ) -> Result<Self, ServerError> {
        let mut builder = Self::new()
            .pathname(&config.listener.pathname)
            .routes_from(&config.routes, registry)?
            .preprocessor(RequestLogger);

        if let Some(root) = &config.statics.root {
            builder = builder
                .statics(StaticFiles::new(root, config.statics.index_files.clone()))
                .static_paths(config.statics.paths.clone());
        }
        if let Some(ms) = config.timeouts.request_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder = builder.max_decoded_body(config.limits.max_decoded_body);

        if config.rate_limit.enabled {
            builder = builder.preprocessor(RateLimiter::new(RateLimitOptions {
                timeout: Duration::from_millis(config.rate_limit.timeout_ms),
                max_requests: config.rate_limit.max_requests,
            }));
        }
        if config.cache.enabled {
            let plugin = Arc::new(CachePlugin::new(cache));
            builder.pipeline.push_preprocessor(plugin.clone());
            builder.pipeline.push_postprocessor(plugin);
        }
        if config.cors.enabled {
            builder = builder.postprocessor(Cors::new(config.cors.allow_credentials));
        }
        if config.csp.enabled {
            let csp = ContentSecurityPolicy::new(&config.csp.policy)
                .map_err(|err| ServerError::InvalidPolicy(err.message().to_string()))?;
            builder = builder.postprocessor(csp);
        }
        if config.compression.enabled {
            let format = Encoding::parse(&config.compression.format)
                .filter(|format| *format != Encoding::Identity)
                .ok_or_else(|| ServerError::UnsupportedEncoding(config.compression.format.clone()))?;
            builder = builder.postprocessor(Compression::new(format));
        }

        tracing::debug!(
            routes = builder.routes.len(),
            preprocessors = builder.pipeline.preprocessor_count(),
            postprocessors = builder.pipeline.postprocessor_count(),
            "Server configured"
        );
        Ok(builder)
    }

    /// Base pathname that relative route patterns resolve against.
    pub fn pathname(mut self, pathname: impl Into<String>) -> Self {
        self.pathname = pathname.into();
        self
    }

    pub fn route(self, pattern: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.route_ref(pattern, HandlerRef::direct(handler))
    }

    pub fn route_ref(mut self, pattern: impl Into<String>, handler: HandlerRef) -> Self {
        self.routes.push((pattern.into(), handler));
        self
    }

    /// Mount a configured route table. Unknown handler keys are an error.
    pub fn routes_from(mut self, table: &[RouteConfig], registry: &Registry) -> Result<Self, ServerError> {
        for route in table {
            let handler = registry
                .get(&route.handler)
                .ok_or_else(|| ServerError::UnknownHandler(route.handler.clone()))?;
            self.routes.push((route.pattern.clone(), handler));
        }
        Ok(self)
    }

    pub fn preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.pipeline.push_preprocessor(Arc::new(preprocessor));
        self
    }

    pub fn postprocessor(mut self, postprocessor: impl Postprocessor + 'static) -> Self {
        self.pipeline.push_postprocessor(Arc::new(postprocessor));
        self
    }

    pub fn statics(mut self, statics: StaticFiles) -> Self {
        self.statics = Some(statics);
        self
    }

    /// Path prefixes served from the static root before route matching.
    pub fn static_paths(mut self, paths: Vec<String>) -> Self {
        self.static_paths = paths;
        self
    }

    /// Deadline for receiving a request body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ceiling on the inflated size of a gzip or deflate request body.
    pub fn max_decoded_body(mut self, bytes: usize) -> Self {
        self.max_decoded_body = bytes;
        self
    }

    /// Server-wide cancellation; firing it stops the listener.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn build(self) -> Result<HttpServer, ServerError> {
        let mut routes = RouteTable::new(self.pathname);
        for (pattern, handler) in self.routes {
            routes.insert(&pattern, handler)?;
        }
        let signal = self
            .signal
            .unwrap_or_else(|| AbortController::new().signal());

        let engine = Engine {
            routes,
            pipeline: self.pipeline,
            statics: self.statics,
            static_paths: self.static_paths,
            timeout: self.timeout,
            max_decoded_body: self.max_decoded_body,
            signal,
        };
        Ok(HttpServer {
            engine: Arc::new(engine),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server wrapping the engine.
#[derive(Clone)]
pub struct HttpServer {
    engine: Arc<Engine>,
}

impl HttpServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The Axum service: every request goes to the engine.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle)
            .with_state(self.engine.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.engine.routes().len(), "HTTP server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let signal = self.engine.signal().clone();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.aborted().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run over TLS on `addr`.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, routes = self.engine.routes().len(), "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let signal = self.engine.signal().clone();
        let shutdown = handle.clone();
        tokio::spawn(async move {
            signal.aborted().await;
            shutdown.graceful_shutdown(Some(TLS_DRAIN));
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Catch-all handler; axum's router is not used for dispatch.
async fn handle(State(engine): State<Arc<Engine>>, request: Request) -> HostResponse {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    engine.dispatch(request, peer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::{Context, Reply};
    use crate::http::error::HttpError;
    use crate::http::request::Request as EngineRequest;
    use crate::http::response::Response;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    fn hello(_: &EngineRequest, context: &Context) -> Result<Reply, HttpError> {
        let name = context.param("name").unwrap_or("world");
        Ok(Response::text(format!("Hello, {name}!")).into())
    }

    async fn body_text(response: HostResponse) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn routes_through_the_engine() {
        let server = ServerBuilder::new()
            .pathname("/api/")
            .route("hello/:name", hello)
            .build()
            .unwrap();

        let response = server
            .router()
            .oneshot(axum::http::Request::get("/api/hello/quay").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Hello, quay!");

        let response = server
            .router()
            .oneshot(axum::http::Request::get("/dne").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(body_text(response).await.contains("http://localhost/dne not found."));
    }

    #[tokio::test]
    async fn config_wires_plugins_and_rejects_unknown_keys() {
        let mut registry = Registry::new();
        registry.register_handler("hello", hello);

        let mut config = ServerConfig::default();
        config.routes = vec![RouteConfig::new("/hello", "hello")];
        config.cors.enabled = true;
        config.compression.enabled = true;
        let builder = ServerBuilder::from_config(&config, &registry, ResponseCache::new()).unwrap();
        assert_eq!(builder.pipeline.postprocessor_count(), 2);

        config.routes.push(RouteConfig::new("/missing", "missing"));
        let err = ServerBuilder::from_config(&config, &registry, ResponseCache::new()).err();
        assert!(matches!(err, Some(ServerError::UnknownHandler(key)) if key == "missing"));
    }

    #[tokio::test]
    async fn invalid_patterns_fail_the_build() {
        let err = ServerBuilder::new().route("/a/(", hello).build().err();
        assert!(matches!(err, Some(ServerError::Pattern(_))));
    }
}
