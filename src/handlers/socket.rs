//! WebSocket echo endpoint.

use std::time::Duration;

use crate::http::{Context, HttpError, Reply, Request};
use crate::websocket::{self, handshake};

/// Upgrades the connection and runs the echo session on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Socket {
    heartbeat: Option<Duration>,
}

impl Socket {
    /// `heartbeat`: interval between unsolicited `tick` frames.
    pub fn new(heartbeat: Option<Duration>) -> Self {
        Self { heartbeat }
    }

    pub fn handle(&self, request: &Request, context: &Context) -> Result<Reply, HttpError> {
        let heartbeat = self.heartbeat;
        let signal = context.signal();
        let response = handshake::upgrade(request, move |socket| {
            websocket::echo(socket, heartbeat, signal)
        })?;
        Ok(response.into())
    }
}
