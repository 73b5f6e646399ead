//! Integration tests for audren-cli.
//!
//! Tests run the `audren` binary against a config file in a temporary
//! directory so the user's own config never leaks in.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Helper to get the path to the `audren` binary built by cargo.
fn audren_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_audren"))
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("renderer.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    audren_bin()
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run audren")
}

// ---------------------------------------------------------------------------
// Help and version
// ---------------------------------------------------------------------------

#[test]
fn cli_help_lists_commands() {
    let output = audren_bin().arg("--help").output().expect("failed to run audren --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["render", "devices", "features", "config"] {
        assert!(stdout.contains(command), "help should mention '{command}'");
    }
}

#[test]
fn cli_version_works() {
    let output = audren_bin().arg("--version").output().expect("failed to run audren --version");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("audren"));
}

// ---------------------------------------------------------------------------
// `audren devices` / `audren features`
// ---------------------------------------------------------------------------

#[test]
fn cli_devices_follow_revision() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");

    let old = run(&config, &["devices", "--revision", "3"]);
    assert!(old.status.success());
    let stdout = String::from_utf8_lossy(&old.stdout);
    assert!(stdout.contains("AudioTvOutput"));
    assert!(!stdout.contains("AudioUsbDeviceOutput"));

    let new = run(&config, &["devices", "--revision", "4", "--json"]);
    assert!(new.status.success());
    let names: Vec<String> = serde_json::from_slice(&new.stdout).unwrap();
    assert_eq!(names.len(), 4);
    assert_eq!(names[3], "AudioUsbDeviceOutput");
}

#[test]
fn cli_devices_reject_unknown_revision() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    let output = run(&config, &["devices", "--revision", "99"]);
    assert!(!output.status.success());
}

#[test]
fn cli_features_json_marks_enabled_rows() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "revision = 5\n");

    let output = run(&config, &["features", "--json"]);
    assert!(output.status.success());
    let rows: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    let row = |name: &str| rows.iter().find(|r| r["name"] == name).cloned().unwrap();
    assert_eq!(row("ElapsedFrameCount")["enabled"], true);
    assert_eq!(row("EffectInfoVer2")["enabled"], false);
    assert_eq!(row("EffectInfoVer2")["since"], 7);

    let enabled = run(&config, &["features", "--enabled", "--json"]);
    let enabled: Vec<serde_json::Value> = serde_json::from_slice(&enabled.stdout).unwrap();
    assert!(enabled.iter().all(|r| r["enabled"] == true));
    assert!(enabled.len() < rows.len());
}

// ---------------------------------------------------------------------------
// `audren config`
// ---------------------------------------------------------------------------

#[test]
fn cli_config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("renderer.toml");

    let init = run(&path, &["config", "init"]);
    assert!(init.status.success(), "{}", String::from_utf8_lossy(&init.stderr));
    assert!(path.is_file());

    let again = run(&path, &["config", "init"]);
    assert!(!again.status.success(), "init must not overwrite without --force");

    let validate = run(&path, &["config", "validate"]);
    assert!(validate.status.success());
    assert!(String::from_utf8_lossy(&validate.stdout).contains("valid"));
}

#[test]
fn cli_config_validate_lists_problems() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "sample_rate = 44100\nsink_count = 0\n");
    let output = run(&config, &["config", "validate"]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 problem(s)"), "got: {stdout}");
    assert!(stdout.contains("44100"));
}

#[test]
fn cli_config_show_prints_toml() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "voice_count = 7\n");
    let output = run(&config, &["config", "show"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("voice_count = 7"));
}

// ---------------------------------------------------------------------------
// `audren render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_writes_stereo_wav_and_report() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    let wav = dir.path().join("out.wav");
    let report = dir.path().join("report.json");

    let output = run(
        &config,
        &[
            "render",
            wav.to_str().unwrap(),
            "--ticks",
            "20",
            "--report",
            report.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let reader = hound::WavReader::open(&wav).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 20 * 240 * 2);
    assert!(samples.iter().any(|&s| s != 0));

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["ticks"], 20);
    assert_eq!(report["frames"], 20 * 240);
    assert_eq!(report["commands"]["dropped"], 0);
}

#[test]
fn cli_render_at_low_session_rate() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "sample_rate = 32000\nsample_count = 160\nrevision = 4\n");
    let wav = dir.path().join("low.wav");

    let output = run(&config, &["render", wav.to_str().unwrap(), "--ticks", "10"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let reader = hound::WavReader::open(&wav).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    assert_eq!(reader.len(), 10 * 240 * 2);
}

#[test]
fn cli_render_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "mix_buffer_count = 0\n");
    let wav = dir.path().join("never.wav");
    let output = run(&config, &["render", wav.to_str().unwrap(), "--ticks", "1"]);
    assert!(!output.status.success());
    assert!(!wav.exists());
}
