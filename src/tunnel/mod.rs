//! SSH tunnel module
//!
//! This module implements the tunnel itself: endpoint parsing, the tunnel
//! descriptor, the listener lifecycle and the per-connection forwards that
//! relay bytes through the jump host.
//!
//! Each accepted connection gets its own SSH session; forwards share nothing
//! but the read-only descriptor.

mod credential;
mod descriptor;
pub mod dialer;
mod endpoint;
pub mod events;
mod forwarder;
mod handler;
mod health;
mod ready;
mod server;

pub use credential::Credential;
pub use descriptor::{TunnelDescriptor, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LOCAL_ADDR, DEFAULT_SSH_PORT};
pub use dialer::{BoxedStream, JumpDialer, JumpSession, RelayStream, SshDialer};
pub use endpoint::{Endpoint, EndpointError};
pub use events::{Direction, EventSink, ForwardStage, LogSink, NullSink, TunnelEvent};
pub use forwarder::BUFFER_SIZE;
pub use health::{Watchdog, DEFAULT_HEALTH_INTERVAL};
pub use ready::ReadySignal;
pub use server::{Tunnel, TunnelState, DEFAULT_HALF_CLOSE_LINGER, DEFAULT_SHUTDOWN_TIMEOUT};
