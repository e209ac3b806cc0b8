//! Composable cancellation: a signal that fires once, carrying a reason.
//!
//! One [`AbortController`] exists per request. Socket closure, preprocessor
//! rejection, the body timeout and server shutdown all funnel into it, either
//! by calling [`AbortController::abort`] directly or through
//! [`AbortController::follow`] / [`AbortSignal::any`].
//!
//! Waiters suspend on a `watch` channel; nothing polls.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::http::error::HttpError;

struct Inner {
    reason: watch::Sender<Option<HttpError>>,
    /// Signals composed from this one; aborted together with it.
    dependents: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Arc<Self> {
        let (reason, _) = watch::channel(None);
        Arc::new(Self {
            reason,
            dependents: Mutex::new(Vec::new()),
        })
    }

    fn abort(&self, reason: HttpError) -> bool {
        let propagated = reason.clone();
        let fired = self.reason.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
        if fired {
            let dependents = match self.dependents.lock() {
                Ok(mut dependents) => std::mem::take(&mut *dependents),
                Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
            };
            for dependent in dependents.iter().filter_map(Weak::upgrade) {
                dependent.abort(propagated.clone());
            }
        }
        fired
    }

    fn add_dependent(&self, dependent: &Arc<Inner>) {
        let mut dependents = match self.dependents.lock() {
            Ok(dependents) => dependents,
            Err(poisoned) => poisoned.into_inner(),
        };
        dependents.retain(|weak| weak.strong_count() > 0);
        dependents.push(Arc::downgrade(dependent));
    }
}

/// Read side of a cancellation token.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl AbortSignal {
    /// A signal that is already aborted.
    pub fn abort(reason: HttpError) -> Self {
        let controller = AbortController::new();
        controller.abort(reason);
        controller.signal()
    }

    /// A signal that aborts with a timeout error after `duration`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn timeout(duration: Duration) -> Self {
        let controller = AbortController::new();
        let weak = Arc::downgrade(&controller.inner);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                inner.abort(HttpError::timeout("The operation timed out"));
            }
        });
        controller.signal()
    }

    /// A signal that fires as soon as any of `signals` fires, with that signal's reason.
    pub fn any<'a>(signals: impl IntoIterator<Item = &'a AbortSignal>) -> Self {
        let controller = AbortController::new();
        for signal in signals {
            controller.follow(signal);
            if controller.signal().is_aborted() {
                break;
            }
        }
        controller.signal()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.reason.borrow().is_some()
    }

    pub fn reason(&self) -> Option<HttpError> {
        self.inner.reason.borrow().clone()
    }

    /// Resolves with the reason once the signal fires.
    pub async fn aborted(&self) -> HttpError {
        let mut rx = self.inner.reason.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            // The sender lives as long as `self`, so this never completes.
            None => std::future::pending().await,
        }
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Write side of a cancellation token.
#[derive(Clone)]
pub struct AbortController {
    inner: Arc<Inner>,
}

impl AbortController {
    pub fn new() -> Self {
        Self { inner: Inner::new() }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Fire the signal. Returns `false` if it had already fired; the first reason stays.
    pub fn abort(&self, reason: HttpError) -> bool {
        self.inner.abort(reason)
    }

    /// Abort this controller whenever `signal` aborts (immediately if it already has).
    pub fn follow(&self, signal: &AbortSignal) {
        if let Some(reason) = signal.reason() {
            self.abort(reason);
            return;
        }
        signal.inner.add_dependent(&self.inner);
        // Closes the window between the check above and registration.
        if let Some(reason) = signal.reason() {
            self.abort(reason);
        }
    }

    /// Abort with `reason` when the returned guard is dropped without being disarmed.
    pub fn abort_on_drop(&self, reason: HttpError) -> AbortOnDrop {
        AbortOnDrop {
            controller: Some(self.clone()),
            reason: Some(reason),
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`AbortController::abort_on_drop`].
pub struct AbortOnDrop {
    controller: Option<AbortController>,
    reason: Option<HttpError>,
}

impl AbortOnDrop {
    pub fn disarm(mut self) {
        self.controller = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let (Some(controller), Some(reason)) = (self.controller.take(), self.reason.take()) {
            if controller.abort(reason) {
                tracing::debug!("Request aborted by dropped connection");
            }
        }
    }
}
