//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults shared by the
//! configuration file, environment variables and command line.

use crate::tunnel::{DEFAULT_HALF_CLOSE_LINGER, DEFAULT_HEALTH_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::tunnel::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_LOCAL_ADDR};

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "JUMP_TUNNEL_";

/// Legacy variable naming the jump host as `user@host[:port]`
pub const LEGACY_JUMP_HOST_VAR: &str = "SSH_USER";

/// Legacy variable naming the private key, relative to the home directory
pub const LEGACY_PRIVATE_KEY_VAR: &str = "SSH_PRIVATE_KEY_PATH";

/// Legacy variable naming the destination as `host:port`
pub const LEGACY_DESTINATION_VAR: &str = "SSH_DESTINATION";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Log levels accepted by the logger
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Default local listen address
pub fn local_addr() -> String {
    DEFAULT_LOCAL_ADDR.to_string()
}

/// Default jump host connect timeout in seconds
pub fn connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

/// Default drain timeout in seconds
pub fn shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT.as_secs()
}

/// Default half-close linger in milliseconds
pub fn half_close_linger_ms() -> u64 {
    DEFAULT_HALF_CLOSE_LINGER.as_millis() as u64
}

/// Default health check interval in seconds
pub fn health_check_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL.as_secs()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
