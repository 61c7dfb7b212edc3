//! Centralized path resolution for scriptdeploy
//!
//! # Environment Variables
//!
//! - `SCRIPTDEPLOY_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/scriptdeploy`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `SCRIPTDEPLOY_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/scriptdeploy` (if set)
//! 3. `~/.config/scriptdeploy`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "SCRIPTDEPLOY_CONFIG_DIR";

/// File name of the default deployment configuration
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Get the scriptdeploy config directory path
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
        let path = PathBuf::from(xdg_config).join("scriptdeploy");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("scriptdeploy");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Configuration file used when `--config` is not given
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DEFAULT_CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Only use in single-threaded test contexts.
    #[allow(unsafe_code)]
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/config/path"));
            assert_eq!(
                default_config_path().unwrap(),
                PathBuf::from("/custom/config/path/deploy.toml")
            );
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_absolute() {
        let result = expand("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
