//! Configuration validation.
//!
//! [`validate`] checks every field and reports all problems at once, so a
//! user fixing a config file sees the whole list on the first run.
//!
//! # Example
//!
//! ```rust
//! use audren_config::{RendererConfig, ValidationIssue, validate};
//!
//! let config = RendererConfig {
//!     sample_rate: 44_100,
//!     mix_buffer_count: 0,
//!     ..Default::default()
//! };
//! let err = validate(&config).unwrap_err();
//! assert!(err.errors.contains(&ValidationIssue::SampleRate(44_100)));
//! assert!(err.errors.contains(&ValidationIssue::ZeroMixBuffers));
//! ```

use audren_core::MAX_REVISION;
use audren_renderer::params::MAX_MIX_BUFFERS;
use thiserror::Error;

use crate::config::RendererConfig;

/// Sample rates a session can run at.
pub const SAMPLE_RATES: [u32; 2] = [32_000, 48_000];

/// Highest render time limit, in percent.
pub const MAX_RENDER_TIME_LIMIT: u32 = 100;

/// One problem with a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Rate other than 32000 or 48000.
    #[error("sample rate {0} is not 32000 or 48000")]
    SampleRate(u32),

    /// Sample count that does not cover 5 ms at the configured rate.
    #[error("sample count {count} does not match sample rate {rate} (expected {expected})")]
    SampleCount {
        /// Configured rate.
        rate: u32,
        /// Configured count.
        count: u32,
        /// Count a 5 ms tick needs at `rate`.
        expected: u32,
    },

    /// No mix buffers.
    #[error("mix_buffer_count must be at least 1")]
    ZeroMixBuffers,

    /// More mix buffers than the arena can address per mix.
    #[error("mix_buffer_count {count} exceeds {max} per mix times {mixes} mixes")]
    TooManyMixBuffers {
        /// Configured count.
        count: u32,
        /// Per-mix ceiling.
        max: u32,
        /// Mixes including the final mix.
        mixes: u32,
    },

    /// No sinks, so nothing would be heard.
    #[error("sink_count must be at least 1")]
    ZeroSinks,

    /// Revision outside 1..=current.
    #[error("revision {0} is outside 1..={max}", max = MAX_REVISION)]
    Revision(u32),

    /// Splitters without destinations.
    #[error("splitter_count {splitters} needs at least as many destinations, got {destinations}")]
    SplitterDestinations {
        /// Configured splitters.
        splitters: u32,
        /// Configured destinations.
        destinations: u32,
    },

    /// Render time limit over 100 percent.
    #[error("render_time_limit_percent {0} exceeds 100")]
    RenderTimeLimit(u32),
}

/// Every issue found in a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    /// Issues in field order.
    pub errors: Vec<ValidationIssue>,
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Checks `config` and returns every issue found.
pub fn validate(config: &RendererConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();

    if SAMPLE_RATES.contains(&config.sample_rate) {
        let expected = config.sample_rate / 200;
        if config.sample_count != expected {
            errors.push(ValidationIssue::SampleCount {
                rate: config.sample_rate,
                count: config.sample_count,
                expected,
            });
        }
    } else {
        errors.push(ValidationIssue::SampleRate(config.sample_rate));
    }

    let mixes = config.sub_mix_count.saturating_add(1);
    if config.mix_buffer_count == 0 {
        errors.push(ValidationIssue::ZeroMixBuffers);
    } else if u64::from(config.mix_buffer_count) > u64::from(mixes) * MAX_MIX_BUFFERS as u64 {
        errors.push(ValidationIssue::TooManyMixBuffers {
            count: config.mix_buffer_count,
            max: MAX_MIX_BUFFERS as u32,
            mixes,
        });
    }

    if config.sink_count == 0 {
        errors.push(ValidationIssue::ZeroSinks);
    }

    if config.revision == 0 || config.revision > MAX_REVISION {
        errors.push(ValidationIssue::Revision(config.revision));
    }

    if config.splitter_destination_count < config.splitter_count {
        errors.push(ValidationIssue::SplitterDestinations {
            splitters: config.splitter_count,
            destinations: config.splitter_destination_count,
        });
    }

    if config.render_time_limit_percent > MAX_RENDER_TIME_LIMIT {
        errors.push(ValidationIssue::RenderTimeLimit(config.render_time_limit_percent));
    }

    if errors.is_empty() { Ok(()) } else { Err(ValidationError { errors }) }
}
