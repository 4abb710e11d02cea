//! Tunnel event system
//!
//! The lifecycle manager and the forwards report what happens to them as
//! [`TunnelEvent`] values through an injected [`EventSink`]. The default sink
//! writes them to the `log` facade.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::common::ForwardStats;

/// Step of a forward that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStage {
    /// Reaching or authenticating with the jump host
    JumpDial,
    /// Opening the channel to the destination
    RemoteDial,
}

impl fmt::Display for ForwardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JumpDial => write!(f, "jump host dial"),
            Self::RemoteDial => write!(f, "destination dial"),
        }
    }
}

/// Direction of a byte copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local peer to destination
    Upstream,
    /// Destination to local peer
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => write!(f, "local -> remote"),
            Self::Downstream => write!(f, "remote -> local"),
        }
    }
}

/// Something observable that happened in a tunnel
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelEvent {
    /// Local socket bound
    Listening { addr: SocketAddr },
    /// Local connection accepted and dispatched
    Accepted { id: u64, peer: SocketAddr },
    /// Local connection closed straight away because the tunnel is at capacity
    Rejected { id: u64, peer: SocketAddr, limit: usize },
    /// Jump host session established for a forward
    JumpConnected { id: u64, jump: String },
    /// Destination channel opened for a forward
    RemoteConnected { id: u64, remote: String },
    /// Forward abandoned before relaying
    ForwardFailed { id: u64, stage: ForwardStage, error: String },
    /// One copy direction stopped on an error
    CopyFailed { id: u64, direction: Direction, error: String },
    /// Forward finished and released its resources
    ForwardClosed { id: u64, stats: ForwardStats },
    /// Result of a watchdog probe
    HealthCheck { healthy: bool, latency: Duration, error: Option<String> },
    /// Accepting stopped; waiting for in-flight forwards
    Draining { in_flight: usize },
    /// Tunnel fully stopped
    Stopped,
}

/// Receiver of tunnel events
pub trait EventSink: Send + Sync {
    /// Record one event; must not block
    fn emit(&self, event: TunnelEvent);
}

/// Sink that writes events through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TunnelEvent) {
        match event {
            TunnelEvent::Listening { addr } => info!("Tunnel listening on {}", addr),
            TunnelEvent::Accepted { id, peer } => info!("[{}] Connection accepted from {}", id, peer),
            TunnelEvent::Rejected { id, peer, limit } => warn!(
                "[{}] Rejected connection from {}: {} forwards already active",
                id, peer, limit
            ),
            TunnelEvent::JumpConnected { id, jump } => info!("[{}] Connected to {} [1 / 2]", id, jump),
            TunnelEvent::RemoteConnected { id, remote } => info!("[{}] Connected to {} [2 / 2]", id, remote),
            TunnelEvent::ForwardFailed { id, stage, error } => {
                error!("[{}] Forward failed during {}: {}", id, stage, error)
            }
            TunnelEvent::CopyFailed { id, direction, error } => {
                warn!("[{}] Error copying {}: {}", id, direction, error)
            }
            TunnelEvent::ForwardClosed { id, stats } => debug!(
                "[{}] Forward closed, {} bytes up, {} bytes down",
                id, stats.bytes_up, stats.bytes_down
            ),
            TunnelEvent::HealthCheck { healthy: true, latency, .. } => {
                debug!("Watchdog: tunnel healthy ({} ms)", latency.as_millis())
            }
            TunnelEvent::HealthCheck { error, .. } => warn!(
                "Watchdog: tunnel unhealthy: {}",
                error.as_deref().unwrap_or("unknown error")
            ),
            TunnelEvent::Draining { in_flight } => {
                info!("Tunnel shutting down, waiting for {} forwards", in_flight)
            }
            TunnelEvent::Stopped => info!("Tunnel stopped"),
        }
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TunnelEvent) {}
}
