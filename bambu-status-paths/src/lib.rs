//! Path utilities for waybar-bambu-status.
//!
//! Single source of truth for where the broadcast socket and the
//! configuration file live.
//!
//! # Platform Behavior
//!
//! | Platform | Socket Directory | Config File |
//! |----------|------------------|-------------|
//! | Linux    | `$XDG_RUNTIME_DIR` or `/tmp` | `~/.config/waybar-bambu-status/config.toml` |
//! | macOS    | `$TMPDIR` | `~/Library/Application Support/waybar-bambu-status/config.toml` |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine config directory")]
    NoConfigDirectory,

    #[error("Invalid socket name: {0:?}")]
    InvalidSocketName(String),

    #[error("Socket path has no parent directory: {0}")]
    NoParentDirectory(PathBuf),
}

/// Application identifier used in path construction.
pub const APP_NAME: &str = "waybar-bambu-status";

/// Socket file name of the detailed status daemon.
pub const DETAILED_SOCKET_NAME: &str = "waybar-bambu-status.sock";

/// Socket file name of the compact status daemon.
pub const COMPACT_SOCKET_NAME: &str = "waybar-printer.sock";

/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the directory that holds broadcast sockets.
///
/// # Platform Behavior
/// - **Linux**: Prefers `$XDG_RUNTIME_DIR` (e.g., `/run/user/1000`), falls back to `/tmp`
/// - **Other**: The system temp directory
///
/// The directory is not created: both candidates are expected to exist.
pub fn get_socket_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            if runtime_dir.is_dir() {
                return runtime_dir;
            }
        }
    }

    std::env::temp_dir()
}

/// Get the full path of a named broadcast socket.
///
/// Each daemon identity (detailed, compact, ...) owns one socket name, so
/// separate Owner/Relay groups never collide.
///
/// # Errors
/// Returns an error if `name` is empty or contains a path separator.
pub fn get_socket_path(name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(PathError::InvalidSocketName(name.to_string()).into());
    }

    Ok(get_socket_dir().join(name))
}

/// Get the configuration directory.
///
/// # Errors
/// Returns an error if the platform has no notion of a config directory.
pub fn get_config_dir() -> Result<PathBuf> {
    let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
    Ok(config_base.join(APP_NAME))
}

/// Get the default configuration file path.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Make sure the directory that will hold `socket_path` exists.
///
/// Newly created directories get mode 0o700 on Unix. Existing directories
/// are left untouched (`/tmp` must stay world-writable).
pub fn ensure_socket_parent(socket_path: &Path) -> Result<()> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| PathError::NoParentDirectory(socket_path.to_path_buf()))?;

    // A bare file name lives in the working directory
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }

    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(parent, perms)
            .with_context(|| format!("Failed to set permissions on {}", parent.display()))?;
    }

    Ok(())
}

/// Set secure Unix socket permissions.
///
/// Sets the socket to mode 0o600 (owner read/write only).
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(socket_path, perms).with_context(|| {
            format!(
                "Failed to set socket permissions: {}",
                socket_path.display()
            )
        })?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}
