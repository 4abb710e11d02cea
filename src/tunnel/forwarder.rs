//! Data forwarding module
//!
//! This module relays bytes between a local connection and the destination
//! stream opened through the jump host.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::events::{Direction, EventSink, TunnelEvent};
use crate::common::ForwardStats;

/// Copy buffer size per direction
pub const BUFFER_SIZE: usize = 8192;

/// Copy from `reader` to `writer` until EOF, then shut `writer` down
///
/// `total` is updated after every write so callers can read a partial count
/// even when the copy is aborted.
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        total.fetch_add(n as u64, Ordering::Relaxed);
    }

    // Pass the EOF on so the other side can finish its half
    writer.shutdown().await
}

/// Relay bytes between `local` and `remote` until both directions end
///
/// The destination-to-local direction runs on its own task; the
/// local-to-destination direction runs on the caller's. When the local side
/// finishes sending, the return direction gets `linger` to drain before it is
/// aborted. Cancelling `cancel` stops both directions immediately. Errors stop
/// only the direction they occur in and are reported to `events`.
pub async fn relay<S>(
    id: u64,
    local: TcpStream,
    remote: S,
    events: &dyn EventSink,
    linger: Duration,
    cancel: &CancellationToken,
) -> ForwardStats
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut local_reader, mut local_writer) = local.into_split();
    let (mut remote_reader, mut remote_writer) = tokio::io::split(remote);

    let up_bytes = AtomicU64::new(0);
    let down_bytes = Arc::new(AtomicU64::new(0));

    // Data flow from destination to local peer
    let down_counter = Arc::clone(&down_bytes);
    let mut downstream = tokio::spawn(async move {
        pump(&mut remote_reader, &mut local_writer, &down_counter).await
    });

    // Data flow from local peer to destination
    let upstream = tokio::select! {
        result = pump(&mut local_reader, &mut remote_writer, &up_bytes) => Some(result),
        _ = cancel.cancelled() => None,
    };

    let local_done = upstream.is_some();
    match upstream {
        Some(Ok(())) => debug!("[{}] Local peer finished sending", id),
        Some(Err(e)) => events.emit(TunnelEvent::CopyFailed {
            id,
            direction: Direction::Upstream,
            error: e.to_string(),
        }),
        None => debug!("[{}] Relay cancelled", id),
    }

    if local_done {
        tokio::select! {
            joined = &mut downstream => match joined {
                Ok(Ok(())) => debug!("[{}] Destination finished sending", id),
                Ok(Err(e)) => events.emit(TunnelEvent::CopyFailed {
                    id,
                    direction: Direction::Downstream,
                    error: e.to_string(),
                }),
                Err(e) => debug!("[{}] Downstream task ended abnormally: {}", id, e),
            },
            _ = tokio::time::sleep(linger) => {
                debug!("[{}] Destination still open after {:?}, closing", id, linger);
            }
            _ = cancel.cancelled() => debug!("[{}] Relay cancelled", id),
        }
    }

    // No-op if the task already finished; otherwise drops its halves
    downstream.abort();

    ForwardStats {
        bytes_up: up_bytes.load(Ordering::Relaxed),
        bytes_down: down_bytes.load(Ordering::Relaxed),
    }
}
