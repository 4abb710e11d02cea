//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use crate::common::check_file_exists;
use crate::config::defaults::LOG_LEVELS;
use crate::config::error::{ConfigError, Result};
use crate::config::TunnelConfig;
use crate::tunnel::Endpoint;

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the tunnel cannot run with
    fn validate(&self) -> Result<()>;

    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for TunnelConfig {
    fn validate(&self) -> Result<()> {
        validate_addresses(self)?;
        validate_credentials(self)?;
        validate_general_settings(self)?;
        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.key_passphrase.is_some() && self.private_key.is_none() {
            warnings.push("key_passphrase is set but no private_key is configured".to_string());
        }

        if self.password.is_some() && self.private_key.is_none() {
            warnings.push("Password authentication is configured; prefer a private key".to_string());
        }

        if let Ok(local) = Endpoint::parse(&self.local_addr) {
            if !is_loopback(local.host()) {
                warnings.push(format!(
                    "Local address {} is not loopback; the tunnel is reachable from other hosts",
                    self.local_addr
                ));
            }
        }

        warnings
    }
}

/// Validate jump host, destination and local address
fn validate_addresses(config: &TunnelConfig) -> Result<()> {
    if config.jump_host.trim().is_empty() {
        return Err(ConfigError::MissingRequiredValue("jump_host".to_string()));
    }
    Endpoint::parse(&config.jump_host)
        .map_err(|e| ConfigError::InvalidValue("jump_host".to_string(), e.to_string()))?;

    if config.destination.trim().is_empty() {
        return Err(ConfigError::MissingRequiredValue("destination".to_string()));
    }
    let destination = Endpoint::parse(&config.destination)
        .map_err(|e| ConfigError::InvalidValue("destination".to_string(), e.to_string()))?;
    if !destination.port_given() || destination.port() == 0 {
        return Err(ConfigError::InvalidValue(
            "destination".to_string(),
            "a non-zero port is required".to_string(),
        ));
    }

    Endpoint::parse(&config.local_addr)
        .map_err(|e| ConfigError::InvalidValue("local_addr".to_string(), e.to_string()))?;

    Ok(())
}

/// Validate that exactly one credential source is configured
fn validate_credentials(config: &TunnelConfig) -> Result<()> {
    match (&config.private_key_path(), &config.password) {
        (Some(_), Some(_)) => Err(ConfigError::InvalidCombination(
            "private_key and password are mutually exclusive".to_string(),
        )),
        (None, None) => Err(ConfigError::MissingRequiredValue("private_key or password".to_string())),
        (Some(path), None) => check_file_exists(path)
            .map_err(|e| ConfigError::InvalidValue("private_key".to_string(), e.to_string())),
        (None, Some(_)) => Ok(()),
    }
}

/// Validate general settings
fn validate_general_settings(config: &TunnelConfig) -> Result<()> {
    if config.connect_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connect timeout must be greater than 0".to_string(),
        ));
    }

    if config.shutdown_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "shutdown_timeout".to_string(),
            "Shutdown timeout must be greater than 0".to_string(),
        ));
    }

    if config.max_connections == Some(0) {
        return Err(ConfigError::InvalidValue(
            "max_connections".to_string(),
            "Connection limit must be greater than 0".to_string(),
        ));
    }

    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        return Err(ConfigError::InvalidValue(
            "log_level".to_string(),
            format!("'{}', expected one of: {}", config.log_level, LOG_LEVELS.join(", ")),
        ));
    }

    Ok(())
}

fn is_loopback(host: &str) -> bool {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    }
}
