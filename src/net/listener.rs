//! TCP listener setup.
//!
//! # Responsibilities
//! - Resolve the configured hostname and port
//! - Bind the plain-HTTP listener
//! - Compute the public base URL logged at startup

use std::net::SocketAddr;

use tokio::net::TcpListener;
use url::Url;

use crate::config::schema::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The hostname did not resolve to any address.
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// First socket address `hostname:port` resolves to.
pub async fn resolve(config: &ListenerConfig) -> Result<SocketAddr, ListenerError> {
    let host = format!("{}:{}", config.hostname, config.port);
    let mut addrs = tokio::net::lookup_host(&host)
        .await
        .map_err(|source| ListenerError::Resolve {
            host: host.clone(),
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::Resolve {
        host: host.clone(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
    })
}

/// Bind to the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr = resolve(config).await?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(address = %local_addr, "Listener bound");
    }
    Ok(listener)
}

/// `http(s)://hostname:port/pathname` for the bound address.
pub fn base_url(config: &ListenerConfig, local_addr: SocketAddr, secure: bool) -> Option<Url> {
    let scheme = if secure { "https" } else { "http" };
    let pathname = if config.pathname.starts_with('/') {
        config.pathname.as_str()
    } else {
        "/"
    };
    Url::parse(&format!(
        "{scheme}://{}:{}{pathname}",
        config.hostname,
        local_addr.port()
    ))
    .ok()
}
