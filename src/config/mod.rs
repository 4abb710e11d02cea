//! Configuration module
//!
//! This module handles tunnel configuration, including loading from
//! different sources (files, environment variables, command line arguments),
//! merging them by priority and validating the result.

// Submodules
mod defaults;
mod error;
mod loader;
mod merger;
mod validator;

// Re-export types and traits
pub use self::error::ConfigError;
pub use self::loader::{load_dotenv, ArgValues, ConfigLoader};
pub use self::merger::ConfigMerger;
pub use self::validator::ConfigValidator;

use std::path::PathBuf;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::{resolve_home_relative, Result};
use crate::tunnel::{Credential, Endpoint, Tunnel, TunnelDescriptor};

/// Tunnel configuration
///
/// Contains every option needed to build and run a tunnel. Supports loading
/// from a JSON file, environment variables and command-line arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct TunnelConfig {
    // --- Addresses ---

    /// Jump host as `[user@]host[:port]`
    pub jump_host: String,

    /// Destination as `host:port`, resolved by the jump host
    pub destination: String,

    /// Local listen address; port 0 lets the OS pick
    #[serde(default = "defaults::local_addr")]
    pub local_addr: String,

    // --- Credentials ---

    /// Private key file; a leading `~/` is resolved against the home directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,

    /// Passphrase for an encrypted private key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<String>,

    /// Password, used when no private key is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    // --- Timing and limits ---

    /// Jump host connect and handshake timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u64,

    /// How long to wait for in-flight forwards on shutdown, in seconds
    #[serde(default = "defaults::shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// How long the return direction may drain after the local peer
    /// stops sending, in milliseconds
    #[serde(default = "defaults::half_close_linger_ms")]
    pub half_close_linger_ms: u64,

    /// Maximum concurrent forwards; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Seconds between health checks; 0 disables them
    #[serde(default = "defaults::health_check_interval")]
    pub health_check_interval: u64,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for TunnelConfig {
    /// Create a default configuration using centralized defaults
    fn default() -> Self {
        Self {
            jump_host: String::new(),
            destination: String::new(),
            local_addr: defaults::local_addr(),
            private_key: None,
            key_passphrase: None,
            password: None,
            connect_timeout: defaults::connect_timeout(),
            shutdown_timeout: defaults::shutdown_timeout(),
            half_close_linger_ms: defaults::half_close_linger_ms(),
            max_connections: None,
            health_check_interval: defaults::health_check_interval(),
            log_level: defaults::log_level(),
        }
    }
}

// Implement AsRef<TunnelConfig> for TunnelConfig to simplify merge operations
impl AsRef<TunnelConfig> for TunnelConfig {
    fn as_ref(&self) -> &TunnelConfig {
        self
    }
}

impl TunnelConfig {
    /// Private key path with a leading `~/` expanded
    pub fn private_key_path(&self) -> Option<PathBuf> {
        self.private_key.as_ref().map(|path| match path.to_str() {
            Some(s) if s.starts_with("~/") => resolve_home_relative(s),
            _ => path.clone(),
        })
    }

    /// Build the credential: the private key when configured, otherwise the password
    pub fn credential(&self) -> Result<Credential> {
        if let Some(path) = self.private_key_path() {
            return Credential::from_key_file(path, self.key_passphrase.as_deref());
        }

        match &self.password {
            Some(password) => Ok(Credential::password(password.clone())),
            None => Err(ConfigError::MissingRequiredValue("private_key or password".to_string()).into()),
        }
    }

    /// Build the tunnel descriptor, loading the credential
    pub fn descriptor(&self) -> Result<TunnelDescriptor> {
        let local = Endpoint::parse(&self.local_addr)?;
        let descriptor = TunnelDescriptor::new(&self.jump_host, self.credential()?, &self.destination)?
            .with_local(local)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));
        Ok(descriptor)
    }

    /// Build a tunnel over SSH with every configured option applied
    pub fn tunnel(&self) -> Result<Tunnel> {
        Ok(Tunnel::new(self.descriptor()?)
            .with_max_connections(self.max_connections)
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout))
            .with_half_close_linger(Duration::from_millis(self.half_close_linger_ms)))
    }

    /// Health check interval, or `None` when checks are disabled
    pub fn health_interval(&self) -> Option<Duration> {
        match self.health_check_interval {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Log the configuration, leaving secrets out
pub fn log_config(config: &TunnelConfig) {
    // Only log in info level or below
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Tunnel Configuration ===");
    info!("  Jump host: {}", config.jump_host);
    info!("  Destination: {}", config.destination);
    info!("  Local address: {}", config.local_addr);
    match config.private_key_path() {
        Some(path) => info!("  Authentication: private key {}", path.display()),
        None => info!("  Authentication: password"),
    }
    info!("  Connect timeout: {} seconds", config.connect_timeout);
    info!("  Shutdown timeout: {} seconds", config.shutdown_timeout);
    info!("  Half-close linger: {} ms", config.half_close_linger_ms);
    match config.max_connections {
        Some(limit) => info!("  Max connections: {}", limit),
        None => info!("  Max connections: unbounded"),
    }
    match config.health_interval() {
        Some(interval) => info!("  Health check interval: {:?}", interval),
        None => info!("  Health checks: disabled"),
    }
    info!("  Log level: {}", config.log_level);
    info!("============================");
}

// Export constants needed externally
pub use defaults::{ENV_PREFIX, LOG_LEVELS, LOG_LEVEL_STR};
pub use defaults::{LEGACY_DESTINATION_VAR, LEGACY_JUMP_HOST_VAR, LEGACY_PRIVATE_KEY_VAR};
