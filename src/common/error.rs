//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::tunnel::EndpointError;

/// Jump Tunnel error type
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Address string could not be parsed
    #[error("Invalid address: {0}")]
    Endpoint(#[from] EndpointError),

    /// The local listening socket could not be bound
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: String,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// The accept loop failed for a reason other than shutdown
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// TCP connection or SSH handshake with the jump host failed
    #[error("Failed to connect to jump host {addr}: {reason}")]
    JumpDial {
        /// Jump host address
        addr: String,
        /// Failure description
        reason: String,
    },

    /// Jump host did not complete connection and authentication in time
    #[error("Connection to jump host {addr} timed out after {timeout:?}")]
    JumpTimeout {
        /// Jump host address
        addr: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Jump host rejected the credential
    #[error("Authentication as '{user}' rejected by {addr}")]
    Authentication {
        /// User name presented
        user: String,
        /// Jump host address
        addr: String,
    },

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// The jump host could not open a channel to the destination
    #[error("Failed to open channel to {addr}: {reason}")]
    RemoteDial {
        /// Destination address
        addr: String,
        /// Failure description
        reason: String,
    },

    /// Credential could not be loaded
    #[error("Credential error: {0}")]
    Credential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation abandoned because the cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Readiness was not reached within the given duration
    #[error("Tunnel not ready after {0:?}")]
    ReadyTimeout(Duration),

    /// `start` was called on a tunnel that already left the created state
    #[error("Tunnel already started")]
    AlreadyStarted,
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `TunnelError`.
pub type Result<T> = std::result::Result<T, TunnelError>;
