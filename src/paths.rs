//! Centralized path resolution for xectl
//!
//! # Environment Variables
//!
//! - `XECTL_CONFIG_DIR` - Override config directory
//! - `XECTL_STATE_DIR` - Override state directory (saved plans live here)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `XECTL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/xectl` (if set)
//! 3. `~/.config/xectl`
//!
//! For state_dir():
//! 1. `XECTL_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/xectl` (if set)
//! 3. `~/.local/state/xectl`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "XECTL_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "XECTL_STATE_DIR";

const APP: &str = "xectl";

/// Get the xectl config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the xectl state directory path
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

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the TOML config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Directory holding halted plans
pub fn plans_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("plans"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring the old value afterwards.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variable
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/xectl/config", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/xectl/config"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/xectl/config/config.toml")
            );
        });
    }

    #[test]
    fn test_state_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_STATE_DIR, "~/xectl-state-test", || {
            assert_eq!(state_dir().unwrap(), home.join("xectl-state-test"));
            assert_eq!(plans_dir().unwrap(), home.join("xectl-state-test").join("plans"));
        });
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/opt/xensource/bin/xe"), PathBuf::from("/opt/xensource/bin/xe"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let path = expand("$XECTL_SURELY_UNSET_VAR/xe");
        assert_eq!(path, PathBuf::from("$XECTL_SURELY_UNSET_VAR/xe"));
    }
}
