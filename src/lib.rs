//! Quay: an embeddable HTTP(S)/WebSocket server engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net (listener / TLS) ──▶ http::server (axum catch-all)
//!                                                   │
//!                                                   ▼
//!                        http::dispatch ── new AbortController (follows server signal)
//!                            │
//!                            ├─▶ http::request   adapt: URL, abortable body, upgrade
//!                            ├─▶ middleware      preprocessors (concurrent)
//!                            │     ├ observability::RequestLogger
//!                            │     ├ security::RateLimiter
//!                            │     └ cache::CachePlugin (hit → settle early)
//!                            ├─▶ routing         statics prefix → route table → statics → 404
//!                            ├─▶ middleware      postprocessors (sequential, body transforms)
//!                            │     ├ cache capture, CORS, CSP
//!                            │     └ encoding::Compression
//!                            ▼
//!     Client Response ◀── http::transmit (abort check, guarded streaming relay)
//!
//!     Upgraded connections ──▶ websocket (handshake, frame codec, echo session)
//! ```
//!
//! # Cross-Cutting Concerns
//! - `config`: TOML schema, loading, validation
//! - `lifecycle`: shutdown token, OS signals
//! - `observability`: tracing setup, Prometheus metrics

// Core subsystems
pub mod http;
pub mod middleware;
pub mod routing;

// Plugins and protocols
pub mod cache;
pub mod encoding;
pub mod security;
pub mod websocket;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;

// Demo endpoints
pub mod handlers;

pub use config::schema::ServerConfig;
pub use http::{HttpError, HttpServer, ServerBuilder};
pub use lifecycle::Shutdown;
