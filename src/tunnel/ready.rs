//! One-shot readiness latch
//!
//! Fires once when the local listener is bound and carries the bound port.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::common::{Result, TunnelError};

/// Broadcast-once readiness signal
///
/// Any number of clones may wait on it. Waiting after it fired returns
/// immediately and it never resets. The bound port travels with the signal,
/// so whoever observes readiness also observes the port.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<Option<u16>>>,
}

impl ReadySignal {
    /// Create an unfired signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal with the bound port
    ///
    /// Returns `false` without touching the stored port if it already fired.
    pub fn fire(&self, port: u16) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(port);
            true
        })
    }

    /// Whether the signal fired
    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Bound port, once fired
    pub fn port(&self) -> Option<u16> {
        *self.tx.borrow()
    }

    /// Wait for the signal or the cancellation, whichever comes first
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<u16> {
        let mut rx = self.tx.subscribe();
        let outcome = tokio::select! {
            biased;
            fired = rx.wait_for(Option::is_some) => {
                fired.map(|port| port.unwrap_or_default()).map_err(|_| TunnelError::Cancelled)
            }
            _ = cancel.cancelled() => Err(TunnelError::Cancelled),
        };
        outcome
    }

    /// Wait for the signal for at most `limit`
    pub async fn wait_timeout(&self, limit: Duration) -> Result<u16> {
        let mut rx = self.tx.subscribe();
        // The borrowed `Ref` must be released before `rx` goes out of scope
        let outcome = match tokio::time::timeout(limit, rx.wait_for(Option::is_some)).await {
            Ok(Ok(port)) => Ok(port.unwrap_or_default()),
            Ok(Err(_)) => Err(TunnelError::Cancelled),
            Err(_) => Err(TunnelError::ReadyTimeout(limit)),
        };
        outcome
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
