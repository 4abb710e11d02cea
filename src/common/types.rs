//! Shared types module
//!
//! This module contains shared data types used throughout the application.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Information about one accepted local connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Sequence number of the connection, unique per tunnel
    pub id: u64,
    /// Address of the local peer
    pub peer: SocketAddr,
    /// Destination the connection is forwarded to (host:port)
    pub destination: String,
    /// When the connection was accepted
    pub accepted_at: Instant,
}

impl ConnectionInfo {
    /// Build connection information stamped with the current time
    pub fn new(id: u64, peer: SocketAddr, destination: impl Into<String>) -> Self {
        Self {
            id,
            peer,
            destination: destination.into(),
            accepted_at: Instant::now(),
        }
    }

    /// Time since the connection was accepted
    pub fn elapsed(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

/// Bytes moved by a finished forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Local peer -> destination
    pub bytes_up: u64,
    /// Destination -> local peer
    pub bytes_down: u64,
}
