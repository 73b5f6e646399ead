//! Platform-specific configuration paths.
//!
//! - **User config**: `~/.config/audren/` (Linux), `~/Library/Application Support/audren/` (macOS), `%APPDATA%\audren\` (Windows)
//! - **Renderer config**: `renderer.toml` inside the user config directory

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "audren";

/// File name of the renderer configuration.
pub const CONFIG_FILE_NAME: &str = "renderer.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default renderer configuration path.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

/// Picks the config file to use: `explicit` when given, otherwise the
/// default path if it exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let path = default_config_path();
            path.is_file().then_some(path)
        }
    }
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::io(crate::FileAction::CreateDir, &dir, e))?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_dir_is_namespaced() {
        assert!(user_config_dir().to_string_lossy().contains("audren"));
    }

    #[test]
    fn default_path_ends_with_file_name() {
        let path = default_config_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(CONFIG_FILE_NAME));
        assert!(path.starts_with(user_config_dir()));
    }

    #[test]
    fn explicit_path_wins_even_if_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        assert_eq!(resolve_config_path(Some(&path)), Some(path));
    }
}
