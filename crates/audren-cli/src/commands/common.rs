//! Shared CLI helpers used across multiple commands.

use anyhow::Context;
use audren_config::{RendererConfig, resolve_config_path};
use audren_core::{BehaviorInfo, MAX_REVISION, Revision};
use std::path::Path;

/// Load the renderer config.
///
/// Uses `explicit` when given, then the default config file if it exists,
/// then built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<RendererConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            RendererConfig::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(RendererConfig::default()),
    }
}

/// Pick the revision from the command line or the config.
pub fn resolve_revision(arg: Option<u32>, config: &RendererConfig) -> anyhow::Result<Revision> {
    let revision = Revision::new(arg.unwrap_or(config.revision));
    if revision.get() == 0 || !revision.is_valid() {
        anyhow::bail!("revision {} is outside 1..={}", revision.get(), MAX_REVISION);
    }
    Ok(revision)
}

/// Behavior state for a client speaking `revision`.
pub fn behavior_at(revision: Revision) -> BehaviorInfo {
    let mut behavior = BehaviorInfo::new();
    behavior.set_user_revision(revision.to_tag());
    behavior
}
