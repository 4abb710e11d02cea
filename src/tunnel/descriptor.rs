//! Tunnel descriptor
//!
//! Holds the three endpoints of a tunnel together with the credential, the
//! jump host connection timeout and the readiness signal.

use std::time::Duration;

use super::credential::Credential;
use super::endpoint::Endpoint;
use super::ready::ReadySignal;
use crate::common::{Result, TunnelError};

/// Port used for the jump host when the address does not name one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Loopback address the tunnel listens on unless told otherwise
pub const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1:0";

/// Default time allowed for reaching and authenticating with the jump host
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a tunnel needs to know about where bytes go
///
/// Host keys presented by the jump host are accepted without verification.
/// Callers that need host key pinning must supply their own [`JumpDialer`].
///
/// [`JumpDialer`]: super::dialer::JumpDialer
#[derive(Debug, Clone)]
pub struct TunnelDescriptor {
    local: Endpoint,
    jump: Endpoint,
    remote: Endpoint,
    credential: Credential,
    connect_timeout: Duration,
    ready: ReadySignal,
}

impl TunnelDescriptor {
    /// Describe a tunnel to `destination_address` through `jump_address`
    ///
    /// The local endpoint is loopback with a system-assigned port. The jump
    /// host port becomes 22 when the address leaves it out or gives 0.
    ///
    /// # Errors
    ///
    /// Returns an error if either address fails to parse or the destination
    /// has no port.
    pub fn new(jump_address: &str, credential: Credential, destination_address: &str) -> Result<Self> {
        let jump = Endpoint::parse(jump_address)?.with_default_port(DEFAULT_SSH_PORT);
        let remote = Endpoint::parse(destination_address)?;
        if remote.port() == 0 {
            return Err(TunnelError::Config(format!(
                "Destination '{}' must name a non-zero port",
                destination_address
            )));
        }

        Ok(Self {
            local: Endpoint::parse(DEFAULT_LOCAL_ADDR)?,
            jump,
            remote,
            credential,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ready: ReadySignal::new(),
        })
    }

    /// Listen on `local` instead of the loopback default
    pub fn with_local(mut self, local: Endpoint) -> Self {
        self.local = local;
        self
    }

    /// Override the jump host connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Local endpoint, carrying the bound port once the tunnel is ready
    pub fn local(&self) -> Endpoint {
        match self.ready.port() {
            Some(port) => self.local.clone().with_port(port),
            None => self.local.clone(),
        }
    }

    /// Local endpoint as configured, before binding
    pub fn declared_local(&self) -> &Endpoint {
        &self.local
    }

    /// Jump host endpoint; its port is never 0
    pub fn jump(&self) -> &Endpoint {
        &self.jump
    }

    /// Destination endpoint as seen from the jump host
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    /// Credential presented to the jump host
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Time allowed for reaching and authenticating with the jump host
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Readiness signal fired when the local socket is bound
    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Bound local port, once ready
    pub fn bound_port(&self) -> Option<u16> {
        self.ready.port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::password("secret")
    }

    #[test]
    fn test_new_descriptor() {
        let descriptor =
            TunnelDescriptor::new("alice@jump.example:2222", credential(), "10.0.0.5:3306").unwrap();

        assert_eq!(descriptor.jump().user(), "alice");
        assert_eq!(descriptor.jump().to_string(), "jump.example:2222");
        assert_eq!(descriptor.remote().to_string(), "10.0.0.5:3306");
        assert_eq!(descriptor.local().to_string(), "127.0.0.1:0");
        assert_eq!(descriptor.connect_timeout(), Duration::from_secs(5));
        assert_eq!(descriptor.bound_port(), None);
    }

    #[test]
    fn test_jump_port_defaults_to_22() {
        let descriptor = TunnelDescriptor::new("alice@jump.example", credential(), "db:5432").unwrap();
        assert_eq!(descriptor.jump().port(), 22);

        let descriptor = TunnelDescriptor::new("jump.example:0", credential(), "db:5432").unwrap();
        assert_eq!(descriptor.jump().port(), 22);

        let descriptor = TunnelDescriptor::new("jump.example:2200", credential(), "db:5432").unwrap();
        assert_eq!(descriptor.jump().port(), 2200);
    }

    #[test]
    fn test_rejects_bad_addresses() {
        assert!(matches!(
            TunnelDescriptor::new("jump:ssh", credential(), "db:5432"),
            Err(TunnelError::Endpoint(_))
        ));
        assert!(matches!(
            TunnelDescriptor::new("jump", credential(), "db:xx"),
            Err(TunnelError::Endpoint(_))
        ));
        assert!(matches!(
            TunnelDescriptor::new("jump", credential(), "db"),
            Err(TunnelError::Config(_))
        ));
    }

    #[test]
    fn test_local_reflects_bound_port() {
        let descriptor = TunnelDescriptor::new("jump", credential(), "db:5432").unwrap();
        descriptor.ready().fire(40123);

        assert_eq!(descriptor.local().port(), 40123);
        assert_eq!(descriptor.declared_local().port(), 0);
        assert_eq!(descriptor.bound_port(), Some(40123));
    }
}
