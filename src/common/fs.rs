//! File system helpers
//!
//! Used when validating key material paths.

use std::path::{Path, PathBuf};

use super::error::{Result, TunnelError};

/// Check that a path exists and is a regular file
///
/// # Parameters
///
/// * `path` - File path
///
/// # Returns
///
/// `Ok(())` if the file exists, otherwise a configuration error.
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(TunnelError::Config(format!(
            "File does not exist: {}",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(TunnelError::Config(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Resolve a key path the way the legacy environment variables expect
///
/// The legacy value is always relative to the home directory, written either
/// as `/.ssh/id_rsa`, `.ssh/id_rsa` or `~/.ssh/id_rsa`.
pub fn resolve_home_relative(path: &str) -> PathBuf {
    let trimmed = path.trim_start_matches("~/").trim_start_matches('/');
    match dirs::home_dir() {
        Some(home) => home.join(trimmed),
        None => PathBuf::from(trimmed),
    }
}
