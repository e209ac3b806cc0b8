//! Framed WebSocket connection over any async byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::websocket::frame::{Frame, FrameError};

pub struct WebSocket<S> {
    io: S,
    buf: BytesMut,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Next frame from the peer; `None` once the peer closed the stream cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            if let Some((frame, used)) = Frame::decode(&self.buf)? {
                self.buf.advance(used);
                return Ok(Some(frame));
            }
            if self.io.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.io.write_all(&frame.encode()).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half. The peer sees EOF.
    pub async fn close(&mut self) -> Result<(), FrameError> {
        self.io.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::frame::OpCode;

    #[tokio::test]
    async fn reads_frames_split_across_writes() {
        let (client, server) = tokio::io::duplex(64);
        let mut server = WebSocket::new(server);

        let writer = tokio::spawn(async move {
            let mut client = client;
            let wire = Frame::text("split me").masked([4, 3, 2, 1]).encode();
            let (a, b) = wire.split_at(3);
            client.write_all(a).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b).await.unwrap();
            client.write_all(&Frame::new(OpCode::Ping, "p").encode()).await.unwrap();
            client.shutdown().await.unwrap();
        });

        let first = server.read_frame().await.unwrap().unwrap();
        assert_eq!(first.text_payload(), "split me");
        let second = server.read_frame().await.unwrap().unwrap();
        assert_eq!(second.opcode, OpCode::Ping);
        assert!(server.read_frame().await.unwrap().is_none());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut server = WebSocket::new(server);
        client.write_all(&[0x81, 0x05, b'H']).await.unwrap();
        drop(client);
        assert!(matches!(server.read_frame().await, Err(FrameError::Truncated)));
    }
}
