//! Sliding-window rate limiting per client IP.

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue, StatusCode};
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::http::context::Context;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::middleware::pipeline::Preprocessor;
use crate::observability::metrics;

/// Window length and request allowance.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitOptions {
    pub timeout: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_requests: 60,
        }
    }
}

type Ledger = DashMap<IpAddr, Vec<Instant>>;

/// Preprocessor rejecting clients with more than `max_requests` requests within `timeout`.
///
/// A background task prunes the ledger every `timeout`; it stops once the
/// limiter (and every clone) is dropped.
#[derive(Clone)]
pub struct RateLimiter {
    ledger: Arc<Ledger>,
    options: RateLimitOptions,
}

impl RateLimiter {
    /// Must be called from within a Tokio runtime.
    pub fn new(options: RateLimitOptions) -> Self {
        let ledger = Arc::new(Ledger::new());
        spawn_sweeper(Arc::downgrade(&ledger), options.timeout);
        Self { ledger, options }
    }

    pub fn options(&self) -> RateLimitOptions {
        self.options
    }

    /// Requests currently retained for `ip`.
    pub fn count(&self, ip: IpAddr) -> usize {
        self.ledger.get(&ip).map_or(0, |times| times.len())
    }

    /// Record a request. Returns the rejection if `ip` is over the limit.
    pub fn hit(&self, ip: IpAddr) -> Result<(), HttpError> {
        let count = {
            let mut times = self.ledger.entry(ip).or_default();
            times.push(Instant::now());
            times.len()
        };
        if count > self.options.max_requests {
            tracing::warn!(client = %ip, count, "Rate limit exceeded");
            metrics::record_rate_limited();
            return Err(self.rejection());
        }
        Ok(())
    }

    fn rejection(&self) -> HttpError {
        let retry_after = (self.options.timeout.as_millis() as f64 / 1000.0).round() as u64;
        HttpError::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
            .with_header(header::RETRY_AFTER, HeaderValue::from(retry_after))
    }

    /// Drop timestamps older than the window and forget idle clients.
    pub fn sweep(&self) {
        sweep(&self.ledger, self.options.timeout);
    }
}

fn sweep(ledger: &Ledger, timeout: Duration) {
    let Some(threshold) = Instant::now().checked_sub(timeout) else {
        return;
    };
    ledger.retain(|_, times| {
        times.retain(|time| *time > threshold);
        !times.is_empty()
    });
}

/// Shortest sweep period; `interval_at` rejects a zero period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

fn spawn_sweeper(ledger: Weak<Ledger>, timeout: Duration) {
    let period = timeout.max(MIN_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            let Some(ledger) = ledger.upgrade() else {
                break;
            };
            sweep(&ledger, timeout);
            tracing::trace!(clients = ledger.len(), "Rate limit ledger swept");
        }
    });
}

impl Preprocessor for RateLimiter {
    fn preprocess<'a>(
        &'a self,
        _request: &'a Request,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        if let Err(rejection) = self.hit(context.ip()) {
            context.abort(rejection);
        }
        future::ready(Ok(())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[tokio::test]
    async fn rejects_past_the_threshold() {
        let limiter = RateLimiter::new(RateLimitOptions {
            timeout: Duration::from_millis(1500),
            max_requests: 2,
        });
        assert!(limiter.hit(CLIENT).is_ok());
        assert!(limiter.hit(CLIENT).is_ok());

        let err = limiter.hit(CLIENT).unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.headers()[header::RETRY_AFTER], "2");

        // Other clients are unaffected.
        assert!(limiter.hit(IpAddr::V4(Ipv4Addr::LOCALHOST)).is_ok());
    }

    #[tokio::test]
    async fn sweep_forgets_expired_entries() {
        let limiter = RateLimiter::new(RateLimitOptions {
            timeout: Duration::from_millis(20),
            max_requests: 1,
        });
        limiter.hit(CLIENT).unwrap();
        assert_eq!(limiter.count(CLIENT), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.sweep();
        assert_eq!(limiter.count(CLIENT), 0);
        assert!(limiter.hit(CLIENT).is_ok());
    }

    #[tokio::test]
    async fn background_sweeper_prunes_the_ledger() {
        let limiter = RateLimiter::new(RateLimitOptions {
            timeout: Duration::from_millis(20),
            max_requests: 5,
        });
        limiter.hit(CLIENT).unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(limiter.count(CLIENT), 0);
    }

    #[tokio::test]
    async fn zero_window_still_sweeps() {
        let limiter = RateLimiter::new(RateLimitOptions {
            timeout: Duration::ZERO,
            max_requests: 1,
        });
        limiter.hit(CLIENT).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(limiter.count(CLIENT), 0);
    }
}
