//! Jump host dialing
//!
//! [`JumpDialer`] is the seam between the forwarding logic and the SSH
//! client. [`SshDialer`] is the production implementation built on `russh`;
//! tests substitute an in-process jump host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh::Disconnect;
use tokio::io::{AsyncRead, AsyncWrite};

use super::credential::Credential;
use super::endpoint::Endpoint;
use crate::common::{Result, TunnelError};

/// Byte stream to the destination, as handed out by a jump session
pub trait RelayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> RelayStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed destination stream
pub type BoxedStream = Box<dyn RelayStream>;

/// Establishes authenticated sessions with a jump host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JumpDialer: Send + Sync + 'static {
    /// Connect to `jump` and authenticate as its user with `credential`
    async fn dial(&self, jump: &Endpoint, credential: &Credential) -> Result<Box<dyn JumpSession>>;
}

/// An authenticated session with a jump host
#[async_trait]
pub trait JumpSession: Send {
    /// Ask the jump host to connect to `remote` on behalf of `originator`
    async fn open_direct(&mut self, remote: &Endpoint, originator: SocketAddr) -> Result<BoxedStream>;

    /// Tear the session down
    async fn close(&mut self);
}

/// `russh`-backed dialer
#[derive(Clone)]
pub struct SshDialer {
    config: Arc<client::Config>,
}

impl SshDialer {
    /// Dialer with keepalives every 30 seconds
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            nodelay: true,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Dialer with a caller-supplied client configuration
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JumpDialer for SshDialer {
    async fn dial(&self, jump: &Endpoint, credential: &Credential) -> Result<Box<dyn JumpSession>> {
        let addr = jump.to_string();
        let handler = AcceptAnyHostKey { jump: addr.clone() };

        let mut handle = client::connect(Arc::clone(&self.config), (jump.host(), jump.port()), handler)
            .await
            .map_err(|e| TunnelError::JumpDial {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        debug!("SSH handshake with {} completed", addr);

        let user = jump.user();
        let auth = match credential {
            Credential::PublicKey(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg))
                    .await?
            }
            Credential::Password(password) => handle.authenticate_password(user, password).await?,
        };

        if !auth.success() {
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                debug!("Disconnect after failed authentication: {}", e);
            }
            return Err(TunnelError::Authentication {
                user: user.to_string(),
                addr,
            });
        }

        debug!("Authenticated to {} as '{}' via {}", addr, user, credential.method());
        Ok(Box::new(SshSession { handle, jump: addr }))
    }
}

/// Client handler that trusts every host key
struct AcceptAnyHostKey {
    jump: String,
}

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        warn!(
            "Accepting {} host key of {} without verification",
            server_public_key.algorithm(),
            self.jump
        );
        Ok(true)
    }
}

struct SshSession {
    handle: client::Handle<AcceptAnyHostKey>,
    jump: String,
}

#[async_trait]
impl JumpSession for SshSession {
    async fn open_direct(&mut self, remote: &Endpoint, originator: SocketAddr) -> Result<BoxedStream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                remote.host(),
                u32::from(remote.port()),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(|e| TunnelError::RemoteDial {
                addr: remote.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.handle.disconnect(Disconnect::ByApplication, "", "en").await {
            debug!("Disconnect from {} failed: {}", self.jump, e);
        }
    }
}
