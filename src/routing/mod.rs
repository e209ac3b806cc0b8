//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request URL (pathname + search)
//!     → router.rs (ordered lookup)
//!     → pattern.rs (compiled URL pattern, named/numbered captures)
//!     → handler.rs (HandlerRef: direct, or lazy + memoized)
//!     → Return: RouteMatch or None
//!
//! No match:
//!     → statics.rs (file under the static root, directory → index file)
//!     → otherwise 404
//!
//! Route compilation (at startup):
//!     config routes table + registry.rs
//!     → RoutePattern::parse (relative patterns joined to the base pathname)
//!     → frozen RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - First match wins in insertion order, no specificity ranking
//! - Only pathname and search take part in matching

pub mod handler;
pub mod pattern;
pub mod registry;
pub mod router;
pub mod statics;

pub use handler::{handler_fn, Handler, HandlerRef, Methods};
pub use pattern::{PatternError, RoutePattern};
pub use registry::Registry;
pub use router::{RouteMatch, RouteTable};
pub use statics::StaticFiles;
