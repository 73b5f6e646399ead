//! Failures while loading, saving or checking a renderer configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::validation::ValidationError;

/// What the loader was doing to a path when the filesystem refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Reading a config file.
    Read,
    /// Writing a config file.
    Write,
    /// Creating the directory a config file lives in.
    CreateDir,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::Read => "read",
            FileAction::Write => "write",
            FileAction::CreateDir => "create directory",
        })
    }
}

/// Why a renderer configuration could not be produced or stored.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The filesystem refused a config file or directory.
    #[error("cannot {action} {}: {source}", .path.display())]
    Io {
        /// Operation that failed.
        action: FileAction,
        /// File or directory it failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The text is not a renderer config. `path` is unset for in-memory text.
    #[error("{}: {source}", origin(.path))]
    Parse {
        /// File the text was read from.
        path: Option<PathBuf>,
        /// TOML or schema error.
        #[source]
        source: toml::de::Error,
    },

    /// Serializing for `save` failed.
    #[error("renderer config could not be encoded: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Parsed, but no session could be opened with these values.
    #[error("renderer config rejected: {0}")]
    Rejected(#[from] ValidationError),
}

impl ConfigError {
    pub(crate) fn io(action: FileAction, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Attaches the file the text came from to a parse error.
    pub(crate) fn in_file(self, file: &Path) -> Self {
        match self {
            ConfigError::Parse { path: None, source } => ConfigError::Parse {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }

    /// File the failure concerns, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Parse { path, .. } => path.as_deref(),
            ConfigError::Encode(_) | ConfigError::Rejected(_) => None,
        }
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "renderer config".to_owned(),
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(source: toml::de::Error) -> Self {
        ConfigError::Parse { path: None, source }
    }
}
