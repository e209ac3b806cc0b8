//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP sliding window; aborts the token with 429)
//!     → Pass to routing
//!
//! Outgoing response:
//!     → headers.rs (CORS, Content-Security-Policy)
//! ```
//!
//! # Design Decisions
//! - Rejection goes through the request token, so it outranks every other preprocessor
//! - Ledger is owned by the limiter instance, not process-global
//! - Existing headers set by handlers are never overwritten

pub mod headers;
pub mod rate_limit;

pub use headers::{ContentSecurityPolicy, Cors};
pub use rate_limit::{RateLimitOptions, RateLimiter};
