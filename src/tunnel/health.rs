//! Tunnel health watchdog
//!
//! Periodically proves the whole path still works: reach the jump host,
//! open a channel to the destination, then hang up.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::descriptor::TunnelDescriptor;
use super::dialer::{JumpDialer, SshDialer};
use super::events::{EventSink, TunnelEvent};
use super::handler::dial_jump;
use super::server::Tunnel;
use crate::common::{Result, TunnelError};

/// Default interval between probes
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic end-to-end probe of a tunnel's jump host and destination
pub struct Watchdog<D = SshDialer> {
    descriptor: Arc<TunnelDescriptor>,
    dialer: Arc<D>,
    events: Arc<dyn EventSink>,
    interval: Duration,
}

impl<D: JumpDialer> Watchdog<D> {
    /// Watchdog sharing the tunnel's descriptor, dialer and event sink
    pub fn for_tunnel(tunnel: &Tunnel<D>, interval: Duration) -> Self {
        Self {
            descriptor: Arc::clone(&tunnel.descriptor),
            dialer: Arc::clone(&tunnel.dialer),
            events: Arc::clone(&tunnel.events),
            interval,
        }
    }

    /// Probe once; returns how long the probe took
    pub async fn check(&self) -> Result<Duration> {
        let started = Instant::now();
        let limit = self.descriptor.connect_timeout();

        let mut session = dial_jump(self.dialer.as_ref(), &self.descriptor).await?;
        let originator = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let opened = tokio::time::timeout(limit, session.open_direct(self.descriptor.remote(), originator)).await;
        session.close().await;

        match opened {
            Ok(Ok(_stream)) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TunnelError::RemoteDial {
                addr: self.descriptor.remote().to_string(),
                reason: format!("no answer within {:?}", limit),
            }),
        }
    }

    /// Probe every interval until `cancel` fires
    ///
    /// The first probe happens one interval after the call.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Tunnel watchdog shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = self.check() => outcome,
                _ = cancel.cancelled() => {
                    info!("Tunnel watchdog shutting down");
                    return;
                }
            };

            let event = match outcome {
                Ok(latency) => TunnelEvent::HealthCheck {
                    healthy: true,
                    latency,
                    error: None,
                },
                Err(e) => TunnelEvent::HealthCheck {
                    healthy: false,
                    latency: started.elapsed(),
                    error: Some(e.to_string()),
                },
            };
            self.events.emit(event);
        }
    }
}
