//! Jump Tunnel: single-hop SSH port forwarding through a jump host
//!
//! This library opens a local listening socket and, for every inbound
//! connection, establishes an SSH session to a jump host and relays bytes
//! between the local peer and a destination that is only reachable from
//! that jump host.
//!
//! # Main Features
//!
//! - `[user@]host[:port]` endpoint parsing with explicit errors
//! - OS-assigned local port published through a one-shot readiness latch
//! - Per-connection forwards that fail in isolation
//! - Cancellation that reaches the accept loop, in-flight dials and copies
//! - Injected event sink for observing forwards without global log capture
//!
//! # Example
//!
//! ```no_run
//! use jump_tunnel::{Credential, Tunnel, TunnelDescriptor, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let credential = Credential::from_key_file("/home/alice/.ssh/id_ed25519", None)?;
//!     let descriptor = TunnelDescriptor::new("alice@jump.example", credential, "10.0.0.5:3306")?;
//!     let tunnel = Tunnel::new(descriptor);
//!
//!     let cancel = CancellationToken::new();
//!     let runner = tunnel.clone();
//!     let token = cancel.clone();
//!     let handle = tokio::spawn(async move { runner.start(token).await });
//!
//!     let port = tunnel.wait_ready(&cancel).await?;
//!     println!("connect to 127.0.0.1:{}", port);
//!
//!     cancel.cancel();
//!     handle.await.expect("tunnel task panicked")
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod tunnel;

// Re-export commonly used structures and functions for convenience
pub use common::{init_logger, Result, TunnelError};
pub use tunnel::{
    Credential, Endpoint, EndpointError, EventSink, JumpDialer, LogSink, ReadySignal, SshDialer,
    Tunnel, TunnelDescriptor, TunnelEvent, TunnelState, Watchdog,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
