//! Structured logging.
//!
//! # Responsibilities
//! - Install the `tracing` subscriber for the binary
//! - Log one line per request before routing
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - The request logger never fails a request

use futures_util::future::{self, BoxFuture, FutureExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::middleware::pipeline::Preprocessor;

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, else by `level`.
///
/// `debug` forces `quay=debug` regardless of `level`. Calling this twice is
/// harmless: the second install is ignored.
pub fn init_tracing(level: &str, debug: bool) {
    let fallback = if debug {
        "quay=debug,tower_http=debug".to_string()
    } else {
        format!("quay={level},tower_http={level}")
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Preprocessor logging `METHOD url` for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Preprocessor for RequestLogger {
    fn preprocess<'a>(
        &'a self,
        request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        tracing::info!(client = %context.ip(), "{} {}", request.method(), request.url());
        future::ready(Ok(())).boxed()
    }
}
