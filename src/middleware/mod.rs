//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Request + Context
//!     → pipeline.rs preprocessors (concurrent; may reject, abort, or resolve early)
//!     → [dispatch: handler / static / cache hit]
//!     → pipeline.rs postprocessors (sequential; may edit the response)
//!     → transform.rs (returned body transforms spliced into the outgoing stream)
//! ```
//!
//! # Design Decisions
//! - Closed single-method traits; plain closures implement them too
//! - Lists are built once by `ServerBuilder` and never change at runtime

pub mod pipeline;
pub mod transform;

pub use pipeline::{Pipeline, PostprocessResult, Postprocessor, Preprocessor};
pub use transform::{splice, BodyTransform};
