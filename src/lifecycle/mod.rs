//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → server signal aborts (503)
//!             → listener stops accepting
//!             → in-flight requests observe the abort through their tokens
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One token for the whole server; requests compose their own on top of it
//! - Shutdown is idempotent: only the first trigger counts

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_on_signal;
