//! Path resolution for provision
//!
//! # Environment Variables
//!
//! - `PROVISION_CONTEXT` - Override the default context file
//!
//! # Context File Resolution Priority
//!
//! 1. `PROVISION_CONTEXT` environment variable
//! 2. `XDG_CONFIG_HOME/provision/context.toml` (if set)
//! 3. Platform default: `~/.config/provision/context.toml`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for context file override
pub const ENV_CONTEXT: &str = "PROVISION_CONTEXT";

/// Name of the context file inside the config directory
pub const CONTEXT_FILE_NAME: &str = "context.toml";

/// Get the default context file path
///
/// Priority:
/// 1. `PROVISION_CONTEXT` env var
/// 2. `XDG_CONFIG_HOME/provision/context.toml`
/// 3. Platform default
pub fn context_file() -> Result<PathBuf> {
    if let Ok(file) = std::env::var(ENV_CONTEXT) {
        let path = expand(&file);
        log::debug!("Using context file from {}: {}", ENV_CONTEXT, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config)
            .join("provision")
            .join(CONTEXT_FILE_NAME);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("provision").join(CONTEXT_FILE_NAME);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home
        .join(".config")
        .join("provision")
        .join(CONTEXT_FILE_NAME);
    log::debug!("Using default context file: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Every path handed to an operation constructor goes through here. Unknown
/// variables are left as written.
///
/// ```
/// use provision::paths;
///
/// let template = paths::expand("~/dotfiles/zshrc.tmpl");
/// let script = paths::expand("$HOME/factors/os.sh");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
