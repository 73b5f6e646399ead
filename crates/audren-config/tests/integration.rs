//! Integration tests for audren-config.
//!
//! These tests take a config file all the way to an open renderer session.

use std::sync::Arc;

use audren_config::{ConfigError, Mode, RendererConfig, ValidationIssue};
use audren_core::GuestAddr;
use audren_renderer::{
    AudioRenderer, FlatGuestMemory, Manager, MockCoprocessor, RendererParameters, SystemManager, UpdateRequest,
    UpdateResponse,
};
use tempfile::TempDir;

fn open(params: &RendererParameters) -> Result<AudioRenderer, audren_renderer::RendererError> {
    AudioRenderer::open(
        Arc::new(Manager::new()),
        Arc::new(SystemManager::new(Arc::new(MockCoprocessor::new()))),
        params,
        params.work_buffer_size(),
        1,
        Arc::new(FlatGuestMemory::new(GuestAddr::new(0x10_0000), 0x1000)),
    )
}

/// A saved config reloads, converts, and opens a working manual session.
#[test]
fn test_config_file_opens_a_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("renderer.toml");
    let config = RendererConfig {
        voice_count: 4,
        effect_count: 1,
        sub_mix_count: 1,
        mix_buffer_count: 4,
        execution_mode: Mode::Manual,
        revision: 8,
        ..Default::default()
    };
    config.save(&path).unwrap();

    let loaded = RendererConfig::load_validated(&path).unwrap();
    let params = RendererParameters::from(&loaded);
    let renderer = open(&params).unwrap();
    renderer.set_render_time_limit(loaded.render_time_limit_percent);
    renderer.start().unwrap();

    let input = UpdateRequest::new(&params).encode().unwrap();
    let mut output = vec![0u8; UpdateResponse::size_for(&params)];
    renderer.request_update(&input, &mut output, &mut []).unwrap();
    let response = UpdateResponse::decode(&output, params.revision()).unwrap();
    assert_eq!(response.voices.len(), 4);
    assert_eq!(response.effects.len(), 1);
    assert_eq!(renderer.frames_elapsed(), 1);
}

/// Every default-valid config is accepted by the renderer too.
#[test]
fn test_valid_configs_pass_renderer_validation() {
    for (rate, count) in [(32_000, 160), (48_000, 240)] {
        for revision in 1..=audren_core::MAX_REVISION {
            let config = RendererConfig {
                sample_rate: rate,
                sample_count: count,
                revision,
                ..Default::default()
            };
            assert!(config.validate().is_ok());
            assert!(RendererParameters::from(&config).validate().is_ok());
        }
    }
}

/// A hand-written file with several mistakes reports all of them.
#[test]
fn test_bad_file_reports_every_issue() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("renderer.toml");
    std::fs::write(
        &path,
        r#"
        sample_rate = 48000
        sample_count = 160
        sink_count = 0
        render_time_limit_percent = 101
        "#,
    )
    .unwrap();

    let Err(ConfigError::Rejected(err)) = RendererConfig::load_validated(&path) else {
        panic!("expected a validation error");
    };
    assert_eq!(
        err.errors,
        vec![
            ValidationIssue::SampleCount {
                rate: 48_000,
                count: 160,
                expected: 240
            },
            ValidationIssue::ZeroSinks,
            ValidationIssue::RenderTimeLimit(101),
        ]
    );
}

/// Malformed TOML is a parse error, not a validation error.
#[test]
fn test_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("renderer.toml");
    std::fs::write(&path, "voice_count = \"many\"\n").unwrap();
    assert!(matches!(RendererConfig::load(&path), Err(ConfigError::Parse { .. })));
}
