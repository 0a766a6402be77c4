//! Centralized path resolution for umami
//!
//! # Environment Variables
//!
//! - `UMAMI_CONFIG_DIR` - Override config directory (where `stack.toml` lives)
//! - `UMAMI_STATE_DIR` - Override state directory
//! - `UMAMI_STACK` - Path of the stack file to use
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `UMAMI_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/umami` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\umami`
//!    - macOS/Linux: `~/.config/umami`
//!
//! For state_dir():
//! 1. `UMAMI_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/umami` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\umami`
//!    - macOS/Linux: `~/.local/state/umami`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "UMAMI_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "UMAMI_STATE_DIR";

/// Environment variable naming the stack file
pub const ENV_STACK: &str = "UMAMI_STACK";

const APP: &str = "umami";

/// Default stack file name inside the config directory
pub const STACK_FILE: &str = "stack.toml";

/// Get the umami config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.config/umami
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the umami state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.local/state/umami
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Stack file to load: `explicit` (from `--stack` or `UMAMI_STACK`) or the default
pub fn stack_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join(STACK_FILE)),
    }
}

/// State file of a stack inside `dir`
pub fn state_file_in(dir: &Path, stack: &str) -> PathBuf {
    dir.join(format!("{stack}.toml"))
}

/// State file of a stack in the state directory
pub fn state_file(stack: &str) -> Result<PathBuf> {
    Ok(state_file_in(&state_dir()?, stack))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
