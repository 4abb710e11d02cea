//! Connection handler module
//!
//! This module handles individual local connections: it reaches the jump host,
//! opens the destination channel through it and hands both ends to the relay.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::descriptor::TunnelDescriptor;
use super::dialer::{JumpDialer, JumpSession};
use super::events::{EventSink, ForwardStage, TunnelEvent};
use super::forwarder::relay;
use crate::common::{ConnectionInfo, ForwardStats, Result, TunnelError};

/// State shared by every forward of one tunnel
pub(crate) struct ForwardContext<D> {
    pub(crate) descriptor: Arc<TunnelDescriptor>,
    pub(crate) dialer: Arc<D>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) half_close_linger: Duration,
}

/// Run `fut` unless `cancel` fires first
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TunnelError::Cancelled),
        result = fut => result,
    }
}

/// Report a forward that ended before relaying
///
/// A cancelled forward is logged at debug level instead of emitting `ForwardFailed`.
fn report_failure(events: &dyn EventSink, info: &ConnectionInfo, stage: ForwardStage, error: &TunnelError) {
    match error {
        TunnelError::Cancelled => {
            debug!("[{}] Forward to {} cancelled during {}", info.id, info.destination, stage)
        }
        _ => events.emit(TunnelEvent::ForwardFailed {
            id: info.id,
            stage,
            error: error.to_string(),
        }),
    }
}

/// Reach the jump host within the descriptor's timeout
pub(crate) async fn dial_jump<D: JumpDialer + ?Sized>(
    dialer: &D,
    descriptor: &TunnelDescriptor,
) -> Result<Box<dyn JumpSession>> {
    let timeout = descriptor.connect_timeout();
    match tokio::time::timeout(timeout, dialer.dial(descriptor.jump(), descriptor.credential())).await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::JumpTimeout {
            addr: descriptor.jump().to_string(),
            timeout,
        }),
    }
}

/// Handle a single local connection
///
/// Every failure is scoped to this connection: the local stream, the jump
/// session and the destination channel are all released before returning,
/// whichever step failed.
///
/// # Returns
///
/// Bytes relayed in each direction, or the error that ended the forward
/// before relaying started.
pub(crate) async fn handle_connection<D: JumpDialer>(
    local: TcpStream,
    info: ConnectionInfo,
    ctx: Arc<ForwardContext<D>>,
    cancel: CancellationToken,
) -> Result<ForwardStats> {
    let id = info.id;
    let descriptor = &ctx.descriptor;

    if let Err(e) = local.set_nodelay(true) {
        debug!("[{}] Failed to set TCP_NODELAY: {}", id, e);
    }
    debug!("[{}] Forwarding {} to {}", id, info.peer, info.destination);

    // Step 1: jump host
    let mut session = match until_cancelled(&cancel, dial_jump(ctx.dialer.as_ref(), descriptor)).await {
        Ok(session) => session,
        Err(e) => {
            report_failure(ctx.events.as_ref(), &info, ForwardStage::JumpDial, &e);
            return Err(e);
        }
    };
    ctx.events.emit(TunnelEvent::JumpConnected {
        id,
        jump: descriptor.jump().to_string(),
    });

    // Step 2: destination channel
    let remote = match until_cancelled(&cancel, session.open_direct(descriptor.remote(), info.peer)).await {
        Ok(remote) => remote,
        Err(e) => {
            report_failure(ctx.events.as_ref(), &info, ForwardStage::RemoteDial, &e);
            session.close().await;
            return Err(e);
        }
    };
    ctx.events.emit(TunnelEvent::RemoteConnected {
        id,
        remote: descriptor.remote().to_string(),
    });

    // Step 3: relay
    let stats = relay(id, local, remote, ctx.events.as_ref(), ctx.half_close_linger, &cancel).await;

    session.close().await;
    debug!("[{}] Forward to {} lasted {:?}", id, info.destination, info.elapsed());
    ctx.events.emit(TunnelEvent::ForwardClosed { id, stats });

    Ok(stats)
}
