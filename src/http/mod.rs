//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, catch-all handler, graceful shutdown)
//!     → dispatch.rs (per-request token, lifecycle state machine)
//!         → request.rs (adapt: URL, abortable body, upgrade handle)
//!         → context.rs (params, cookies, state bag, settlement slot)
//!     → transmit.rs (abort check, transforms, guarded body relay)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - One cancellation token per request, composed from the server token
//! - Exactly one outcome per request; later attempts to settle are ignored
//! - Errors are values (`HttpError`) all the way to the wire

pub mod abort;
pub mod body;
pub mod context;
pub mod cookies;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod response;
pub mod server;
pub mod transmit;

pub use abort::{AbortController, AbortSignal};
pub use body::Body;
pub use context::{Context, Reply};
pub use error::{ErrorKind, HttpError};
pub use request::Request;
pub use response::Response;
pub use server::{HttpServer, ServerBuilder, ServerError};
