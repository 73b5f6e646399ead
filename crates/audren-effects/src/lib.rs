//! Audren Effects - effect records and DSP kernels
//!
//! Every effect the renderer can place in a mix is described here twice: as
//! the parameter record a client sends, and as the host-side state its kernel
//! keeps between ticks.
//!
//! - [`BufferMixerParams`] - Per-pair volume mix inside a mix
//! - [`AuxParams`] / [`AuxRing`] - Send/return and capture through client ring
//!   buffers in guest memory
//! - [`DelayState`] - Multichannel feedback delay
//! - [`ReverbState`] - FDN reverb with early reflections
//! - [`BiquadFilterEffectState`] - One Q14 biquad per channel
//! - [`LightLimiterState`] - Lookahead peak limiter with statistics
//!
//! Kernels take absolute mix buffer indices. They read every input of a
//! sample before writing any output, so in-place routing is safe. A disabled
//! effect, or one with an unsupported channel count, copies inputs to
//! outputs.
//!
//! ## Example
//!
//! ```rust
//! use audren_core::MixBufferArena;
//! use audren_effects::{DelayParams, DelayState, ParameterState};
//!
//! let params = DelayParams {
//!     inputs: [0, 0, 0, 0, 0, 0],
//!     outputs: [0, 0, 0, 0, 0, 0],
//!     channel_count_max: 1,
//!     channel_count: 1,
//!     delay_time_max: 10,
//!     delay_time: 5,
//!     sample_rate: 48000 << 14,
//!     in_gain: 1 << 14,
//!     wet_gain: 1 << 14,
//!     state: ParameterState::Initialized,
//!     ..Default::default()
//! };
//! let mut state = DelayState::new();
//! let mut arena = MixBufferArena::new(1, 240);
//! state.apply(&params, true, &mut arena, &[0], &[0]);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod aux_buffer;
pub mod biquad_filter;
pub mod buffer_mixer;
pub mod delay;
pub mod light_limiter;
pub mod reverb;
pub mod types;

pub use aux_buffer::{AUX_INFO_SIZE, AuxBufferInfo, AuxParams, AuxRing, MAX_MIX_BUFFERS};
pub use biquad_filter::{BiquadFilterEffectState, BiquadFilterParams};
pub use buffer_mixer::BufferMixerParams;
pub use delay::{DelayParams, DelayState};
pub use light_limiter::{LightLimiterParams, LightLimiterState, LightLimiterStatistics, ProcessingMode};
pub use reverb::{ReverbParams, ReverbState};
pub use types::{
    EffectType, MAX_CHANNELS, OutStatus, ParameterState, RESULT_STATE_SIZE, SPECIFIC_SIZE, UsageState,
    is_channel_count_valid,
};

use audren_core::{MixBufferArena, Reader, WireError};

/// Copies `inputs[i]` into `outputs[i]` wherever the two differ.
pub fn bypass(arena: &mut MixBufferArena, inputs: &[usize], outputs: &[usize]) {
    for (&src, &dst) in inputs.iter().zip(outputs) {
        arena.copy(src, dst);
    }
}

/// Decoded type-specific parameters of one effect slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EffectParameters {
    /// Unused slot.
    #[default]
    None,
    /// Accepted type that produces no commands.
    Inert(EffectType),
    /// Buffer mixer.
    BufferMixer(BufferMixerParams),
    /// Aux send/return.
    Aux(AuxParams),
    /// Capture.
    Capture(AuxParams),
    /// Delay.
    Delay(DelayParams),
    /// Reverb.
    Reverb(ReverbParams),
    /// Biquad filter.
    BiquadFilter(BiquadFilterParams),
    /// Light limiter.
    LightLimiter(LightLimiterParams),
}

impl EffectParameters {
    /// Decodes `specific` as the region for `ty`.
    pub fn decode(ty: EffectType, specific: &[u8]) -> Result<Self, WireError> {
        let r = &mut Reader::new(specific);
        Ok(match ty {
            EffectType::Invalid => Self::None,
            EffectType::I3dl2Reverb | EffectType::Compressor => Self::Inert(ty),
            EffectType::BufferMixer => Self::BufferMixer(BufferMixerParams::decode(r)?),
            EffectType::Aux => Self::Aux(AuxParams::decode(r)?),
            EffectType::Capture => Self::Capture(AuxParams::decode(r)?),
            EffectType::Delay => Self::Delay(DelayParams::decode(r)?),
            EffectType::Reverb => Self::Reverb(ReverbParams::decode(r)?),
            EffectType::BiquadFilter => Self::BiquadFilter(BiquadFilterParams::decode(r)?),
            EffectType::LightLimiter => Self::LightLimiter(LightLimiterParams::decode(r)?),
        })
    }

    /// The effect type these parameters belong to.
    pub fn effect_type(&self) -> EffectType {
        match self {
            Self::None => EffectType::Invalid,
            Self::Inert(ty) => *ty,
            Self::BufferMixer(_) => EffectType::BufferMixer,
            Self::Aux(_) => EffectType::Aux,
            Self::Capture(_) => EffectType::Capture,
            Self::Delay(_) => EffectType::Delay,
            Self::Reverb(_) => EffectType::Reverb,
            Self::BiquadFilter(_) => EffectType::BiquadFilter,
            Self::LightLimiter(_) => EffectType::LightLimiter,
        }
    }

    /// Pending parameter transition, for types that carry one.
    pub fn state(&self) -> Option<ParameterState> {
        match self {
            Self::Delay(p) => Some(p.state),
            Self::Reverb(p) => Some(p.state),
            Self::BiquadFilter(p) => Some(p.state),
            Self::LightLimiter(p) => Some(p.state),
            _ => None,
        }
    }

    /// Overwrites the pending transition, for types that carry one.
    pub fn set_state(&mut self, state: ParameterState) {
        match self {
            Self::Delay(p) => p.state = state,
            Self::Reverb(p) => p.state = state,
            Self::BiquadFilter(p) => p.state = state,
            Self::LightLimiter(p) => p.state = state,
            _ => {}
        }
    }

    /// Replaces these parameters with `incoming`.
    ///
    /// For the channel-based types an unsupported channel count falls back to
    /// `channel_count_max`, and a transition still pending from an earlier
    /// update survives until a command list has carried it.
    pub fn merge(&mut self, incoming: Self) {
        let old_state = self.state();
        *self = incoming;

        let channel_count = match self {
            Self::Delay(p) => Some(normalize_channels(&mut p.channel_count, p.channel_count_max)),
            Self::Reverb(p) => Some(normalize_channels(&mut p.channel_count, p.channel_count_max)),
            Self::LightLimiter(p) => Some(normalize_channels(&mut p.channel_count, p.channel_count_max)),
            _ => None,
        };

        if let (Some(valid), Some(old)) = (channel_count, old_state)
            && (!valid || old != ParameterState::Updated)
        {
            self.set_state(old);
        }
    }
}

fn normalize_channels(count: &mut u16, max: u16) -> bool {
    if !is_channel_count_valid(*count) {
        *count = max;
    }
    is_channel_count_valid(*count)
}

/// Host-side DSP state of one effect slot.
#[derive(Debug, Clone, Default)]
pub enum EffectState {
    /// The type keeps no state.
    #[default]
    None,
    /// Delay lines and gains.
    Delay(DelayState),
    /// Reverb network.
    Reverb(ReverbState),
    /// Per-channel biquad history.
    BiquadFilter(BiquadFilterEffectState),
    /// Envelopes, gains and lookahead rings.
    LightLimiter(LightLimiterState),
}

impl EffectState {
    /// Fresh state for `ty`.
    pub fn for_type(ty: EffectType) -> Self {
        match ty {
            EffectType::Delay => Self::Delay(DelayState::new()),
            EffectType::Reverb => Self::Reverb(ReverbState::new()),
            EffectType::BiquadFilter => Self::BiquadFilter(BiquadFilterEffectState::new()),
            EffectType::LightLimiter => Self::LightLimiter(LightLimiterState::new()),
            _ => Self::None,
        }
    }

    /// True if this state belongs to an effect of type `ty`.
    pub fn matches(&self, ty: EffectType) -> bool {
        match self {
            Self::None => !matches!(
                ty,
                EffectType::Delay | EffectType::Reverb | EffectType::BiquadFilter | EffectType::LightLimiter
            ),
            Self::Delay(_) => ty == EffectType::Delay,
            Self::Reverb(_) => ty == EffectType::Reverb,
            Self::BiquadFilter(_) => ty == EffectType::BiquadFilter,
            Self::LightLimiter(_) => ty == EffectType::LightLimiter,
        }
    }

    /// Limiter statistics, if this is a limiter.
    pub fn limiter_statistics(&self) -> Option<&LightLimiterStatistics> {
        match self {
            Self::LightLimiter(s) => Some(s.statistics()),
            _ => None,
        }
    }
}
