//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (resolve hostname, bind TcpListener)
//!     → tls.rs (optional: load PEM pair into RustlsConfig)
//!     → Hand off to HTTP layer (axum::serve / axum_server::bind_rustls)
//! ```
//!
//! # Design Decisions
//! - The first resolved address wins
//! - TLS is optional and handled by axum-server; certificates are never generated

pub mod listener;
pub mod tls;

pub use listener::{base_url, bind, resolve, ListenerError};
pub use tls::{load_tls_config, TlsError};
