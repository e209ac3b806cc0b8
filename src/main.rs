//! `quay` command-line server.
//!
//! Loads an optional TOML configuration, applies command-line overrides,
//! mounts the demo handlers and serves until Ctrl-C or SIGTERM.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use quay::cache::ResponseCache;
use quay::config::schema::TlsConfig;
use quay::config::{load_config, validate_config, ConfigError, ServerConfig};
use quay::lifecycle::{shutdown_on_signal, Shutdown};
use quay::observability::{init_tracing, metrics};
use quay::{handlers, net, ServerBuilder};

#[derive(Debug, Parser)]
#[command(name = "quay", version, about = "Embeddable HTTP(S)/WebSocket server")]
struct Cli {
    /// TOML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(short = 'H', long)]
    hostname: Option<String>,

    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Base pathname for relative routes.
    #[arg(short = 'a', long = "path")]
    pathname: Option<String>,

    /// Directory to serve static files from.
    #[arg(short = 's', long = "static")]
    static_root: Option<PathBuf>,

    /// Request body timeout in milliseconds.
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Verbose logging.
    #[arg(short = 'd', long)]
    debug: bool,

    /// TLS private key (PEM). Requires --cert.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// TLS certificate chain (PEM). Requires --key.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(hostname) = self.hostname {
            config.listener.hostname = hostname;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(pathname) = self.pathname {
            config.listener.pathname = pathname;
        }
        if let Some(root) = self.static_root {
            config.statics.root = Some(root);
        }
        if let Some(timeout) = self.timeout {
            config.timeouts.request_ms = Some(timeout);
        }
        if self.debug {
            config.observability.log_level = "debug".to_string();
        }
        if let (Some(key), Some(cert)) = (self.key, self.cert) {
            config.tls = Some(TlsConfig {
                cert_path: cert.display().to_string(),
                key_path: key.display().to_string(),
            });
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let debug = cli.debug;

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_tracing(&config.observability.log_level, debug);
    tracing::info!("quay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        hostname = %config.listener.hostname,
        port = config.listener.port,
        routes = config.routes.len(),
        tls = config.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let heartbeat = match config.websocket.heartbeat_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let cache = ResponseCache::new();
    let registry = handlers::registry(cache.clone(), heartbeat);
    let server = ServerBuilder::from_config(&config, &registry, cache)?
        .signal(shutdown.signal())
        .build()?;

    match &config.tls {
        Some(tls) => {
            let tls_config = net::load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            let addr = net::resolve(&config.listener).await?;
            if let Some(url) = net::base_url(&config.listener, addr, true) {
                tracing::info!(url = %url, "Now serving");
            }
            server.run_tls(addr, tls_config).await?;
        }
        None => {
            let listener = net::bind(&config.listener).await?;
            if let Some(url) = net::base_url(&config.listener, listener.local_addr()?, false) {
                tracing::info!(url = %url, "Now serving");
            }
            server.run(listener).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
