//! Shutdown coordination for the server.

use crate::http::abort::{AbortController, AbortSignal};
use crate::http::error::HttpError;

/// Coordinator for graceful shutdown.
///
/// Wraps the server-wide cancellation token: the listener stops accepting
/// once it fires, and every in-flight request observes it through its own
/// token. Clones share the same token.
#[derive(Clone, Default)]
pub struct Shutdown {
    controller: AbortController,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The signal handed to the server and its requests.
    pub fn signal(&self) -> AbortSignal {
        self.controller.signal()
    }

    /// Trigger the shutdown signal. Returns `false` if it had already fired.
    pub fn trigger(&self) -> bool {
        let fired = self
            .controller
            .abort(HttpError::unavailable("Server is shutting down"));
        if fired {
            tracing::info!("Shutdown triggered");
        }
        fired
    }

    pub fn is_triggered(&self) -> bool {
        self.controller.signal().is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn trigger_fires_once_with_503() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.clone().trigger());
        assert!(!shutdown.trigger());
        assert_eq!(signal.aborted().await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
