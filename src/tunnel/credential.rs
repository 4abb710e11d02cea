//! Jump host credentials

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use russh::keys::PrivateKey;

use crate::common::{check_file_exists, Result, TunnelError};

/// The single authentication method presented to the jump host
#[derive(Clone)]
pub enum Credential {
    /// Public-key authentication with a decoded private key
    PublicKey(Arc<PrivateKey>),
    /// Password authentication
    Password(String),
}

impl Credential {
    /// Load an OpenSSH or PEM private key from disk
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::Credential` when the file is missing, encrypted
    /// without a passphrase, or not a private key.
    pub fn from_key_file(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        check_file_exists(path).map_err(|e| TunnelError::Credential(e.to_string()))?;

        let key = russh::keys::load_secret_key(path, passphrase).map_err(|e| {
            TunnelError::Credential(format!(
                "Failed to load private key {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Loaded {} private key from {}", key.algorithm(), path.display());
        Ok(Self::PublicKey(Arc::new(key)))
    }

    /// Decode a private key held in memory
    pub fn from_key_data(data: &str, passphrase: Option<&str>) -> Result<Self> {
        let key = russh::keys::decode_secret_key(data, passphrase)
            .map_err(|e| TunnelError::Credential(format!("Failed to decode private key: {}", e)))?;
        Ok(Self::PublicKey(Arc::new(key)))
    }

    /// Password credential
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(password.into())
    }

    /// Short name of the method, for logs
    pub fn method(&self) -> &'static str {
        match self {
            Self::PublicKey(_) => "publickey",
            Self::Password(_) => "password",
        }
    }
}

// Key material and passwords stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().to_string())
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
        }
    }
}
