//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request lifecycle produces:
//!     → logging.rs (subscriber setup, per-request log line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (`method`, `url`, `status`)
//! - HTTP-level spans come from `tower_http::trace::TraceLayer`
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, RequestLogger};
