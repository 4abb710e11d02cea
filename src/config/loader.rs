//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from different sources
//! such as files, environment variables, and command-line arguments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};

use crate::common::resolve_home_relative;
use crate::config::defaults::{self, ENV_PREFIX};
use crate::config::error::{ConfigError, Result};
use crate::config::merger::ConfigMerger;
use crate::config::validator::ConfigValidator;
use crate::config::TunnelConfig;

/// Values given on the command line; `None` means the flag was absent
#[derive(Debug, Clone, Default)]
pub struct ArgValues {
    pub jump_host: Option<String>,
    pub destination: Option<String>,
    pub private_key: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub password: Option<String>,
    pub local_addr: Option<String>,
    pub connect_timeout: Option<u64>,
    pub max_connections: Option<usize>,
    pub health_check_interval: Option<u64>,
    pub log_level: Option<String>,
}

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;

    /// Load configuration from environment variables
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Load configuration from the legacy `SSH_USER`, `SSH_DESTINATION`
    /// and `SSH_PRIVATE_KEY_PATH` variables only
    fn from_legacy_env() -> Self
    where
        Self: Sized;

    /// Create configuration from command line arguments
    fn from_args(args: &ArgValues) -> Self
    where
        Self: Sized;

    /// Load every source in priority order and validate the result
    ///
    /// Priority, lowest first: defaults, `config_file`, environment (when
    /// `use_env` is set), command line. When `use_env` is not set and neither
    /// the file nor the command line names a jump host, the legacy variables
    /// fill in. Warnings are left to the caller, which usually has not
    /// initialized logging yet.
    fn load(config_file: Option<&Path>, use_env: bool, args: &ArgValues) -> Result<Self>
    where
        Self: Sized;
}

/// Load a `.env` file into the process environment
///
/// Reads `path` when given, otherwise searches the current directory and its
/// parents. Variables already set are left alone. Returns the file loaded,
/// or `None` when there was none.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!("Failed to load .env file: {}", e))),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parse an optional environment value, naming the variable on failure
fn parse_env<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e))),
    }
}

impl ConfigLoader for TunnelConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            ConfigError::ParseError(format!("Failed to parse JSON config file {}: {}", path.display(), e))
        })
    }

    fn from_env() -> Result<Self> {
        let get_env = |name: &str| non_empty_var(&format!("{}{}", ENV_PREFIX, name));

        // The legacy variables fill whatever the prefixed ones leave out
        let mut config = Self::from_legacy_env();

        // Addresses
        if let Some(value) = get_env("JUMP_HOST") {
            config.jump_host = value;
        }
        if let Some(value) = get_env("DESTINATION") {
            config.destination = value;
        }
        if let Some(value) = get_env("LOCAL_ADDR") {
            config.local_addr = value;
        }

        // Credentials
        if let Some(value) = get_env("PRIVATE_KEY") {
            config.private_key = Some(PathBuf::from(value));
        }
        config.key_passphrase = get_env("KEY_PASSPHRASE");
        config.password = get_env("PASSWORD");

        // Numeric settings
        let var = |name: &str| format!("{}{}", ENV_PREFIX, name);
        if let Some(v) = parse_env(&var("CONNECT_TIMEOUT"), get_env("CONNECT_TIMEOUT"))? {
            config.connect_timeout = v;
        }
        if let Some(v) = parse_env(&var("SHUTDOWN_TIMEOUT"), get_env("SHUTDOWN_TIMEOUT"))? {
            config.shutdown_timeout = v;
        }
        if let Some(v) = parse_env(&var("HALF_CLOSE_LINGER_MS"), get_env("HALF_CLOSE_LINGER_MS"))? {
            config.half_close_linger_ms = v;
        }
        config.max_connections = parse_env(&var("MAX_CONNECTIONS"), get_env("MAX_CONNECTIONS"))?;
        if let Some(v) = parse_env(&var("HEALTH_CHECK_INTERVAL"), get_env("HEALTH_CHECK_INTERVAL"))? {
            config.health_check_interval = v;
        }

        // Other settings
        if let Some(value) = get_env("LOG_LEVEL") {
            config.log_level = value.to_lowercase();
        }

        Ok(config)
    }

    fn from_legacy_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = non_empty_var(defaults::LEGACY_JUMP_HOST_VAR) {
            config.jump_host = value;
        }
        if let Some(value) = non_empty_var(defaults::LEGACY_DESTINATION_VAR) {
            config.destination = value;
        }
        if let Some(value) = non_empty_var(defaults::LEGACY_PRIVATE_KEY_VAR) {
            config.private_key = Some(resolve_home_relative(&value));
        }

        config
    }

    fn from_args(args: &ArgValues) -> Self {
        let mut config = Self::default();

        if let Some(ref value) = args.jump_host {
            config.jump_host = value.clone();
        }
        if let Some(ref value) = args.destination {
            config.destination = value.clone();
        }
        if let Some(ref value) = args.local_addr {
            config.local_addr = value.clone();
        }
        config.private_key = args.private_key.clone();
        config.key_passphrase = args.key_passphrase.clone();
        config.password = args.password.clone();
        if let Some(value) = args.connect_timeout {
            config.connect_timeout = value;
        }
        config.max_connections = args.max_connections;
        if let Some(value) = args.health_check_interval {
            config.health_check_interval = value;
        }
        if let Some(ref value) = args.log_level {
            config.log_level = value.to_lowercase();
        }

        config
    }

    fn load(config_file: Option<&Path>, use_env: bool, args: &ArgValues) -> Result<Self> {
        // Start with the default configuration
        let mut config = Self::default();
        debug!("Starting with default configuration");

        if let Some(path) = config_file {
            info!("Loading configuration from {}", path.display());
            config = config.merge(Self::from_file(path)?);
        }

        if use_env {
            let env_config = Self::from_env()?;
            if env_config != Self::default() {
                info!("Applying configuration from environment variables");
                config = config.merge(env_config);
            } else {
                debug!("No environment variable configuration found");
            }
        }

        let args_config = Self::from_args(args);

        if !use_env && config.jump_host.is_empty() && args_config.jump_host.is_empty() {
            let legacy = Self::from_legacy_env();
            if legacy != Self::default() {
                info!("Applying configuration from SSH_USER, SSH_DESTINATION and SSH_PRIVATE_KEY_PATH");
                config = config.merge(legacy);
            }
        }

        config = config.merge(args_config);

        config.validate()?;
        Ok(config)
    }
}
