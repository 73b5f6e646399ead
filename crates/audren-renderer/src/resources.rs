//! State the command processor owns while a list runs.
//!
//! Everything a command mutates lives here rather than in the session
//! contexts: the mix buffer arena, depop accumulators, per-channel voice
//! state, effect DSP state, upsamplers and the performance recorder. The
//! system shares it with the coprocessor behind one mutex.

use std::sync::Arc;

use audren_core::{GuestMemory, MixBufferArena, UpsamplerState};
use audren_effects::EffectState;
use parking_lot::Mutex;

use crate::command::ProcessResult;
use crate::params::{MAX_CHANNELS, RendererParameters, TARGET_SAMPLE_COUNT};
use crate::performance::PerformanceManager;
use crate::voice::VoiceState;

/// One sink's or sub-mix's upsampler channels and their 48 kHz output.
#[derive(Debug, Clone)]
pub struct UpsamplerSlot {
    /// Per-channel filter state.
    pub states: [UpsamplerState; MAX_CHANNELS],
    /// Upsampled channels, [`TARGET_SAMPLE_COUNT`] samples each.
    pub output: MixBufferArena,
}

impl Default for UpsamplerSlot {
    fn default() -> Self {
        Self {
            states: std::array::from_fn(|_| UpsamplerState::new()),
            output: MixBufferArena::new(MAX_CHANNELS, TARGET_SAMPLE_COUNT),
        }
    }
}

/// PCM16 the device sinks produced during the last list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOutput {
    /// Interleaved channels.
    pub channel_count: usize,
    /// Interleaved frames.
    pub samples: Vec<i16>,
}

/// Processor-owned state of one session.
pub struct RenderResources {
    /// Mix buffers followed by voice scratch buffers.
    pub arena: MixBufferArena,
    /// Depop accumulator per mix buffer.
    pub depop: Vec<i32>,
    /// Playback state per voice channel resource.
    pub voice_states: Vec<VoiceState>,
    /// DSP state per effect slot.
    pub effect_states: Vec<EffectState>,
    /// Upsampler per sink and sub-mix.
    pub upsamplers: Vec<UpsamplerSlot>,
    /// Guest memory the data sources, aux rings and sinks touch.
    pub memory: Arc<dyn GuestMemory>,
    /// What the device sinks wrote.
    pub device_output: DeviceOutput,
    /// Timing recorder; none when metrics are off.
    pub performance: Option<PerformanceManager>,
    /// Outcome of the last list.
    pub last_result: Option<ProcessResult>,
}

impl std::fmt::Debug for RenderResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderResources")
            .field("buffers", &self.arena.buffer_count())
            .field("samples", &self.arena.sample_count())
            .field("voice_states", &self.voice_states.len())
            .field("effect_states", &self.effect_states.len())
            .field("upsamplers", &self.upsamplers.len())
            .field("last_result", &self.last_result)
            .finish_non_exhaustive()
    }
}

/// Resources shared between a system and the coprocessor.
pub type SharedResources = Arc<Mutex<RenderResources>>;

impl RenderResources {
    /// Resources sized for `params`.
    pub fn new(params: &RendererParameters, memory: Arc<dyn GuestMemory>, performance: Option<PerformanceManager>) -> Self {
        Self {
            arena: MixBufferArena::new(params.arena_buffer_count(), params.sample_count as usize),
            depop: vec![0; params.mix_buffer_count as usize],
            voice_states: vec![VoiceState::default(); params.voice_count as usize],
            effect_states: vec![EffectState::None; params.effect_count as usize],
            upsamplers: vec![UpsamplerSlot::default(); params.upsampler_count()],
            memory,
            device_output: DeviceOutput::default(),
            performance,
            last_result: None,
        }
    }

    /// Wraps the resources for sharing.
    pub fn shared(self) -> SharedResources {
        Arc::new(Mutex::new(self))
    }
}
