//! Configuration for audren renderer sessions.
//!
//! A [`RendererConfig`] is the TOML form of the parameters a session is
//! opened with, plus the renderer's tuning knobs. It converts into
//! [`RendererParameters`](audren_renderer::RendererParameters) with `From`.
//!
//! # Example
//!
//! ```rust,no_run
//! use audren_config::{RendererConfig, default_config_path};
//! use audren_renderer::RendererParameters;
//!
//! let config = RendererConfig::load(default_config_path())?;
//! config.validate()?;
//! let params = RendererParameters::from(&config);
//! assert_eq!(params.sample_rate, config.sample_rate);
//! # Ok::<(), audren_config::ConfigError>(())
//! ```

mod config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

/// Configuration validation.
pub mod validation;

pub use config::{Mode, RendererConfig};
pub use error::{ConfigError, FileAction};
pub use paths::{
    CONFIG_FILE_NAME, default_config_path, ensure_user_config_dir, resolve_config_path, user_config_dir,
};
pub use validation::{ValidationError, ValidationIssue, ValidationResult, validate};
