//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use crate::config::TunnelConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` when they are not the
    /// default values. This implements the configuration priority system.
    fn merge(&self, other: impl AsRef<Self>) -> Self
    where
        Self: Sized;
}

impl ConfigMerger for TunnelConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        // Use the other value unless it is still the default
        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        // Use the other value when it is set
        fn merge_option<T: Clone>(self_val: &Option<T>, other_val: &Option<T>) -> Option<T> {
            if other_val.is_some() {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        // A source that names a key switches authentication to it, and
        // one that names a password switches away from any key
        let (private_key, key_passphrase, password) = if other.private_key.is_some() {
            (other.private_key.clone(), other.key_passphrase.clone(), None)
        } else if other.password.is_some() {
            (None, None, other.password.clone())
        } else {
            (
                self.private_key.clone(),
                merge_option(&self.key_passphrase, &other.key_passphrase),
                self.password.clone(),
            )
        };

        Self {
            jump_host: merge_field(&self.jump_host, &other.jump_host, &default.jump_host),
            destination: merge_field(&self.destination, &other.destination, &default.destination),
            local_addr: merge_field(&self.local_addr, &other.local_addr, &default.local_addr),
            private_key,
            key_passphrase,
            password,
            connect_timeout: merge_field(&self.connect_timeout, &other.connect_timeout, &default.connect_timeout),
            shutdown_timeout: merge_field(&self.shutdown_timeout, &other.shutdown_timeout, &default.shutdown_timeout),
            half_close_linger_ms: merge_field(
                &self.half_close_linger_ms,
                &other.half_close_linger_ms,
                &default.half_close_linger_ms,
            ),
            max_connections: merge_option(&self.max_connections, &other.max_connections),
            health_check_interval: merge_field(
                &self.health_check_interval,
                &other.health_check_interval,
                &default.health_check_interval,
            ),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
        }
    }
}
