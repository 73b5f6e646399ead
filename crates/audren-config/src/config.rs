//! Renderer configuration file format.

use serde::{Deserialize, Serialize};
use std::path::Path;

use audren_core::{MAX_REVISION, Revision};
use audren_renderer::{ExecutionMode, RendererParameters, TARGET_SAMPLE_COUNT, TARGET_SAMPLE_RATE};

use crate::error::{ConfigError, FileAction};
use crate::validation::{ValidationResult, validate};

/// Who drives ticks, as written in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The scheduler thread renders every 5 ms.
    #[default]
    Auto,
    /// Each update renders one tick inline.
    Manual,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => ExecutionMode::Auto,
            Mode::Manual => ExecutionMode::Manual,
        }
    }
}

/// Session parameters and renderer tuning loaded from TOML.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// sample_count = 240
/// mix_buffer_count = 2
/// voice_count = 24
/// sink_count = 1
/// execution_mode = "auto"
/// revision = 12
/// render_time_limit_percent = 100
/// ```
///
/// Every field is optional and falls back to [`RendererConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Output rate, 32000 or 48000.
    pub sample_rate: u32,
    /// Samples per tick, 160 or 240.
    pub sample_count: u32,
    /// Total mix buffers.
    pub mix_buffer_count: u32,
    /// Voice slots.
    pub voice_count: u32,
    /// Mixes besides the final mix.
    pub sub_mix_count: u32,
    /// Effect slots.
    pub effect_count: u32,
    /// Sink slots.
    pub sink_count: u32,
    /// Splitter slots.
    pub splitter_count: u32,
    /// Splitter destination slots.
    pub splitter_destination_count: u32,
    /// Performance frames kept; 0 disables metrics.
    pub performance_frame_count: u32,
    /// Who drives ticks.
    pub execution_mode: Mode,
    /// Plain revision number the client speaks.
    pub revision: u32,
    /// Allow voices to be dropped when over budget.
    pub voice_drop_enabled: bool,
    /// Share of the time limit a list may use, in percent.
    pub render_time_limit_percent: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            sample_count: TARGET_SAMPLE_COUNT as u32,
            mix_buffer_count: 2,
            voice_count: 24,
            sub_mix_count: 0,
            effect_count: 0,
            sink_count: 1,
            splitter_count: 0,
            splitter_destination_count: 0,
            performance_frame_count: 0,
            execution_mode: Mode::Auto,
            revision: MAX_REVISION,
            voice_drop_enabled: false,
            render_time_limit_percent: 100,
        }
    }
}

impl RendererConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(FileAction::Read, path, e))?;
        Self::from_toml(&content).map_err(|e| e.in_file(path))
    }

    /// Load a configuration and reject it if [`validate`] finds issues.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(FileAction::CreateDir, parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::io(FileAction::Write, path, e))
    }

    /// Checks every field; see [`validate`].
    pub fn validate(&self) -> ValidationResult<()> {
        validate(self)
    }
}

impl From<&RendererConfig> for RendererParameters {
    fn from(config: &RendererConfig) -> Self {
        RendererParameters {
            sample_rate: config.sample_rate,
            sample_count: config.sample_count,
            mix_buffer_count: config.mix_buffer_count,
            sub_mix_count: config.sub_mix_count,
            voice_count: config.voice_count,
            sink_count: config.sink_count,
            effect_count: config.effect_count,
            performance_frame_count: config.performance_frame_count,
            voice_drop_enabled: config.voice_drop_enabled,
            splitter_count: config.splitter_count,
            splitter_destination_count: config.splitter_destination_count,
            execution_mode: config.execution_mode.into(),
            revision: Revision::new(config.revision).to_tag(),
        }
    }
}

impl From<RendererConfig> for RendererParameters {
    fn from(config: RendererConfig) -> Self {
        Self::from(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // --- parsing ---

    #[test]
    fn empty_file_is_default() {
        assert_eq!(RendererConfig::from_toml("").unwrap(), RendererConfig::default());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let config = RendererConfig::from_toml(
            r#"
            sample_rate = 32000
            sample_count = 160
            execution_mode = "manual"
            "#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 32_000);
        assert_eq!(config.sample_count, 160);
        assert_eq!(config.execution_mode, Mode::Manual);
        assert_eq!(config.voice_count, RendererConfig::default().voice_count);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = RendererConfig::from_toml(r#"execution_mode = "turbo""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: None, .. }));
    }

    // --- files ---

    #[test]
    fn save_creates_parent_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("renderer.toml");
        let config = RendererConfig {
            voice_count: 8,
            effect_count: 2,
            execution_mode: Mode::Manual,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(RendererConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = RendererConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { action: FileAction::Read, .. }));
    }

    #[test]
    fn load_validated_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("renderer.toml");
        std::fs::write(&path, "sample_rate = 44100\n").unwrap();
        assert!(RendererConfig::load(&path).is_ok());
        assert!(matches!(
            RendererConfig::load_validated(&path),
            Err(ConfigError::Rejected(_))
        ));
    }

    // --- conversion ---

    #[test]
    fn converts_into_renderer_parameters() {
        let config = RendererConfig {
            revision: 5,
            execution_mode: Mode::Manual,
            voice_count: 3,
            ..Default::default()
        };
        let params = RendererParameters::from(&config);
        assert_eq!(params.revision().get(), 5);
        assert_eq!(params.execution_mode, ExecutionMode::Manual);
        assert_eq!(params.voice_count, 3);
        assert!(params.validate().is_ok());
    }
}
