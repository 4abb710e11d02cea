//! Tunnel server module
//!
//! This module owns the local listening socket: it binds, publishes the bound
//! port, accepts connections and dispatches each one to its own forward task,
//! and drains in-flight forwards on shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::descriptor::TunnelDescriptor;
use super::dialer::{JumpDialer, SshDialer};
use super::endpoint::Endpoint;
use super::events::{EventSink, LogSink, TunnelEvent};
use super::handler::{handle_connection, ForwardContext};
use crate::common::{ConnectionInfo, Result, TunnelError};

/// Default wait for in-flight forwards after cancellation
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time the return direction may keep running after the local peer stops sending
pub const DEFAULT_HALF_CLOSE_LINGER: Duration = Duration::from_secs(2);

/// Lifecycle of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Built, `start` not called yet
    Created,
    /// Binding the local socket
    Listening,
    /// Accepting and forwarding connections
    Accepting,
    /// No longer accepting; waiting for forwards to finish
    Draining,
    /// Finished
    Stopped,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Accepting => "accepting",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A single-hop SSH tunnel
///
/// Cloning is cheap and every clone refers to the same tunnel, so one clone
/// can run [`start`](Self::start) on a task while others wait for readiness
/// or read the bound port.
pub struct Tunnel<D = SshDialer> {
    pub(crate) descriptor: Arc<TunnelDescriptor>,
    pub(crate) dialer: Arc<D>,
    pub(crate) events: Arc<dyn EventSink>,
    max_connections: Option<usize>,
    shutdown_timeout: Duration,
    half_close_linger: Duration,
    state: Arc<watch::Sender<TunnelState>>,
}

impl<D> Clone for Tunnel<D> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            dialer: Arc::clone(&self.dialer),
            events: Arc::clone(&self.events),
            max_connections: self.max_connections,
            shutdown_timeout: self.shutdown_timeout,
            half_close_linger: self.half_close_linger,
            state: Arc::clone(&self.state),
        }
    }
}

impl Tunnel<SshDialer> {
    /// Create a tunnel that reaches the jump host over SSH
    pub fn new(descriptor: TunnelDescriptor) -> Self {
        Self::with_dialer(descriptor, SshDialer::new())
    }
}

impl<D: JumpDialer> Tunnel<D> {
    /// Create a tunnel that reaches the jump host through `dialer`
    pub fn with_dialer(descriptor: TunnelDescriptor, dialer: D) -> Self {
        let (state, _rx) = watch::channel(TunnelState::Created);
        Self {
            descriptor: Arc::new(descriptor),
            dialer: Arc::new(dialer),
            events: Arc::new(LogSink),
            max_connections: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            half_close_linger: DEFAULT_HALF_CLOSE_LINGER,
            state: Arc::new(state),
        }
    }

    /// Send events to `sink` instead of the log
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Limit the number of concurrent forwards; `None` means unbounded
    pub fn with_max_connections(mut self, limit: Option<usize>) -> Self {
        self.max_connections = limit;
        self
    }

    /// How long to wait for in-flight forwards after cancellation
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// How long the return direction may drain after the local peer stops sending
    pub fn with_half_close_linger(mut self, linger: Duration) -> Self {
        self.half_close_linger = linger;
        self
    }

    /// Tunnel description
    pub fn descriptor(&self) -> &TunnelDescriptor {
        &self.descriptor
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Local endpoint, with the bound port once ready
    pub fn local_endpoint(&self) -> Endpoint {
        self.descriptor.local()
    }

    /// Wait until the local socket is bound, or `cancel` fires first
    ///
    /// May be called before `start`. Returns the bound port.
    pub async fn wait_ready(&self, cancel: &CancellationToken) -> Result<u16> {
        self.descriptor.ready().wait(cancel).await
    }

    /// Wait until the local socket is bound, for at most `limit`
    pub async fn wait_ready_timeout(&self, limit: Duration) -> Result<u16> {
        self.descriptor.ready().wait_timeout(limit).await
    }

    /// Run the tunnel until `cancel` fires
    ///
    /// Binds the local endpoint, fires the readiness signal with the bound
    /// port, then accepts connections, each forwarded on its own task. After
    /// cancellation, waits for in-flight forwards (bounded by the shutdown
    /// timeout) and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tunnel was already started, the local endpoint
    /// cannot be bound, or accepting fails for a reason other than shutdown.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let claimed = self.state.send_if_modified(|state| {
            if *state != TunnelState::Created {
                return false;
            }
            *state = TunnelState::Listening;
            true
        });
        if !claimed {
            return Err(TunnelError::AlreadyStarted);
        }

        let local = self.descriptor.declared_local().clone();
        let listener = match bind(&local).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.send_replace(TunnelState::Stopped);
                return Err(e);
            }
        };

        let bound = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state.send_replace(TunnelState::Stopped);
                return Err(TunnelError::Io(e));
            }
        };

        self.events.emit(TunnelEvent::Listening { addr: bound });
        self.state.send_replace(TunnelState::Accepting);
        // Waiters observe the accepting state once woken
        self.descriptor.ready().fire(bound.port());

        // Forwards hang off this token so a fatal accept error also ends them
        let shutdown = cancel.child_token();
        let mut tasks = JoinSet::new();
        let result = self.accept_loop(listener, &cancel, &shutdown, &mut tasks).await;

        shutdown.cancel();
        self.drain(tasks).await;
        result
    }

    async fn accept_loop(
        &self,
        listener: TcpListener,
        cancel: &CancellationToken,
        shutdown: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> Result<()> {
        let ctx = Arc::new(ForwardContext {
            descriptor: Arc::clone(&self.descriptor),
            dialer: Arc::clone(&self.dialer),
            events: Arc::clone(&self.events),
            half_close_linger: self.half_close_linger,
        });
        let permits = self.max_connections.map(|limit| (limit, Arc::new(Semaphore::new(limit))));
        let destination = self.descriptor.remote().to_string();
        let mut next_id: u64 = 0;

        loop {
            // Reap finished forwards so the set does not grow without bound
            reap_finished(tasks);

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                // Dropping the listener on return closes the socket
                _ = cancel.cancelled() => return Ok(()),
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(_) if cancel.is_cancelled() => return Ok(()),
                Err(e) => return Err(TunnelError::Accept(e)),
            };

            next_id += 1;
            let id = next_id;

            let permit = match &permits {
                Some((limit, semaphore)) => match Arc::clone(semaphore).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        self.events.emit(TunnelEvent::Rejected { id, peer, limit: *limit });
                        continue;
                    }
                },
                None => None,
            };

            self.events.emit(TunnelEvent::Accepted { id, peer });

            let info = ConnectionInfo::new(id, peer, destination.as_str());
            let ctx = Arc::clone(&ctx);
            let token = shutdown.child_token();
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_connection(stream, info, ctx, token).await {
                    debug!("[{}] Forward ended early: {}", id, e);
                }
            });
        }
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        self.state.send_replace(TunnelState::Draining);
        reap_finished(&mut tasks);
        self.events.emit(TunnelEvent::Draining { in_flight: tasks.len() });

        let deadline = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Err(e)) if e.is_panic() => error!("Forward task panicked during shutdown: {}", e),
                    Some(_) => {}
                },
                _ = &mut deadline => {
                    warn!(
                        "Shutdown timeout reached, aborting {} forwards still active",
                        tasks.len()
                    );
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        self.state.send_replace(TunnelState::Stopped);
        self.events.emit(TunnelEvent::Stopped);
    }
}

/// Collect forwards that have already finished, logging any panic
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Forward task panicked: {}", e);
            }
        }
    }
}

async fn bind(local: &Endpoint) -> Result<TcpListener> {
    TcpListener::bind((local.host(), local.port()))
        .await
        .map_err(|source| TunnelError::Bind {
            addr: local.to_string(),
            source,
        })
}
