//! WebSocket subsystem.
//!
//! # Responsibilities
//! - Complete the opening handshake (`Sec-WebSocket-Accept`)
//! - Take over the upgraded connection from hyper
//! - Encode and decode frames on the raw byte stream
//!
//! # Data Flow
//! ```text
//! GET + Sec-WebSocket-Key
//!     → handshake.rs (101 response, session spawned on OnUpgrade)
//!     → socket.rs (buffered reads, frame.rs decode)
//!     → session (echo, ping/pong, close, heartbeat)
//! ```
//!
//! # Design Decisions
//! - Frames are read whole; fragmented messages are surfaced frame by frame
//! - Payloads above 16 MiB are refused
//! - The session outlives the request lifecycle; it ends on close or EOF

pub mod echo;
pub mod frame;
pub mod handshake;
pub mod socket;

pub use echo::echo;
pub use frame::{apply_mask, Frame, FrameError, OpCode};
pub use handshake::{accept_key, upgrade, UpgradedSocket};
pub use socket::WebSocket;
