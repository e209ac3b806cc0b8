//! Content codings for request and response bodies.
//!
//! # Data Flow
//! ```text
//! Request:  Content-Encoding: gzip|deflate → decode.rs (streaming inflate)
//! Response: Accept-Encoding match          → compress.rs (streaming deflate, spliced transform)
//! ```
//!
//! # Design Decisions
//! - `deflate` means the zlib container, as browsers send it
//! - `identity` is the same as no header
//! - Anything else in a request is rejected with 400

pub mod compress;
pub mod decode;

use std::fmt;

pub use compress::Compression;
pub use decode::{decode_stream, DEFAULT_MAX_DECODED};

/// Supported content codings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
}

impl Encoding {
    /// Parse a single `Content-Encoding` token. Unknown codings yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(Encoding::Identity),
            "gzip" | "x-gzip" => Some(Encoding::Gzip),
            "deflate" => Some(Encoding::Deflate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
