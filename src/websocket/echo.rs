//! Echo session: replies to text frames, answers pings, emits a heartbeat.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, Interval};

use crate::http::abort::AbortSignal;
use crate::websocket::frame::{Frame, FrameError, OpCode};
use crate::websocket::socket::WebSocket;

/// Shortest heartbeat period; `interval_at` rejects a zero period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Run until the peer closes, the stream fails or `signal` fires.
///
/// Text frames are answered with `Echo: {text} [{n}]`, `n` counting from 1.
/// Echo and heartbeat frames are masked with a fresh random key; pongs are not.
pub async fn echo<S>(mut socket: WebSocket<S>, heartbeat: Option<Duration>, signal: AbortSignal)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ticker = heartbeat
        .map(|period| period.max(MIN_HEARTBEAT))
        .map(|period| interval_at(Instant::now() + period, period));
    let mut count: u64 = 0;

    loop {
        let frame = tokio::select! {
            frame = socket.read_frame() => frame,
            _ = tick(&mut ticker) => {
                if let Err(err) = socket.write_frame(&masked(Frame::text("tick"))).await {
                    tracing::debug!(error = %err, "WebSocket heartbeat failed");
                    break;
                }
                continue;
            }
            _ = signal.aborted() => {
                let _ = socket.write_frame(&Frame::close()).await;
                break;
            }
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "WebSocket read failed");
                break;
            }
        };

        match respond(&mut socket, frame, &mut count).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                tracing::debug!(error = %err, "WebSocket write failed");
                break;
            }
        }
    }

    // Dropping the ticker stops the heartbeat.
    drop(ticker);
    let _ = socket.close().await;
}

/// Returns `false` when the session should end.
async fn respond<S>(socket: &mut WebSocket<S>, frame: Frame, count: &mut u64) -> Result<bool, FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::trace!(opcode = ?frame.opcode, len = frame.payload.len(), "WebSocket frame");
    match frame.opcode {
        OpCode::Text => {
            *count += 1;
            let text = frame.text_payload();
            tracing::debug!(message = %text, "WebSocket message");
            let reply = Frame::text(format!("Echo: {text} [{count}]"));
            socket.write_frame(&masked(reply)).await?;
        }
        OpCode::Ping => socket.write_frame(&Frame::pong(frame.payload)).await?,
        OpCode::Close => {
            tracing::debug!("WebSocket close frame received");
            return Ok(false);
        }
        _ => tracing::debug!(opcode = ?frame.opcode, payload = %frame.text_payload(), "WebSocket frame ignored"),
    }
    Ok(true)
}

fn masked(frame: Frame) -> Frame {
    frame.masked(rand::random())
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
