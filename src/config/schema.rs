//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! Every section is optional; plugins are off unless enabled.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Where to listen and the base pathname for relative routes.
    pub listener: ListenerConfig,

    /// Serve HTTPS when present.
    pub tls: Option<TlsConfig>,

    /// Static file serving.
    pub statics: StaticsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache.
    pub cache: CacheConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    pub cors: CorsConfig,

    pub csp: CspConfig,

    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route table, matched in order.
    pub routes: Vec<RouteConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            tls: None,
            statics: StaticsConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            compression: CompressionConfig::default(),
            cors: CorsConfig::default(),
            csp: CspConfig::default(),
            websocket: WebSocketConfig::default(),
            observability: ObservabilityConfig::default(),
            routes: default_routes(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub hostname: String,

    pub port: u16,

    /// Base pathname; relative route patterns resolve against it.
    pub pathname: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 8000,
            pathname: "/".to_string(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Static file serving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticsConfig {
    /// Directory files are served from. Disabled when unset.
    pub root: Option<PathBuf>,

    /// Path prefixes served from `root` before route matching.
    pub paths: Vec<String>,

    /// Files tried, in order, for directory requests.
    pub index_files: Vec<String>,
}

impl Default for StaticsConfig {
    fn default() -> Self {
        Self {
            root: None,
            paths: Vec::new(),
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for receiving the request body, in milliseconds.
    pub request_ms: Option<u64>,
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest inflated size of a gzip or deflate request body, in bytes.
    pub max_decoded_body: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_decoded_body: 16 * 1024 * 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Sliding window length in milliseconds.
    pub timeout_ms: u64,

    /// Requests allowed per client within the window.
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 60_000,
            max_requests: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// `gzip` or `deflate`.
    pub format: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "gzip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Echo the origin and allow credentials instead of `*`.
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CspConfig {
    pub enabled: bool,

    pub policy: String,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: "default-src 'self'".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Interval between heartbeat frames; 0 disables them.
    pub heartbeat_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self { heartbeat_ms: 1000 }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default level for the `quay` target when `RUST_LOG` is unset.
    pub log_level: String,

    pub metrics_enabled: bool,

    /// Prometheus scrape address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A route mapping a pattern to a registered handler key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    pub pattern: String,

    pub handler: String,
}

impl RouteConfig {
    pub fn new(pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler: handler.into(),
        }
    }
}

/// Routes mounted when the configuration names none.
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/", "home"),
        RouteConfig::new("/favicon.svg", "favicon"),
        RouteConfig::new("/tasks", "tasks"),
        RouteConfig::new("/echo", "echo"),
        RouteConfig::new("/socket", "socket"),
        RouteConfig::new("/cache", "cache"),
        RouteConfig::new("/slow", "slow"),
    ]
}
