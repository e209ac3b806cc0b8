//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Preprocessing:
//!     GET/DELETE, not aborted, request not no-store
//!     → store.rs lookup "METHOD:URL"
//!     → hit: clone + X-Last-Cached → context.resolve (routing skipped)
//!
//! Postprocessing:
//!     ok, not 206, body unused, not no-store, not already encoded, not a hit
//!     → buffered body: stored now
//!     → streaming body: capture transform stores it when the stream completes
//! ```
//!
//! # Design Decisions
//! - Entries hold buffered bytes, so a hit can never observe a consumed body
//! - No TTL and no capacity bound; invalidation is explicit (`remove`, `clear`)
//! - Shared via `Arc<DashMap>`; an entry becomes visible only once complete

pub mod plugin;
pub mod store;

pub use plugin::CachePlugin;
pub use store::{CacheEntry, CachedAt, ResponseCache, X_LAST_CACHED};
