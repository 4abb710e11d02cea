//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod types;

// Re-export commonly used types and functions
pub use error::{Result, TunnelError};
pub use fs::{check_file_exists, resolve_home_relative};
pub use log::init_logger;
pub use types::{ConnectionInfo, ForwardStats};
