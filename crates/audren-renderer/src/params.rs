//! Session-wide renderer parameters and derived sizes.

use audren_core::Revision;

use crate::error::{RendererError, Result};
use crate::wire::{
    BEHAVIOR_OUT_SIZE, EFFECT_IN_SIZE, MEMORY_POOL_IN_SIZE, MIX_IN_SIZE, SINK_IN_SIZE,
    VOICE_IN_SIZE, VOICE_RESOURCE_IN_SIZE,
};

/// Channels a voice can have, and scratch buffers reserved for voice decoding.
pub const MAX_CHANNELS: usize = 6;

/// Wave buffers queued per voice.
pub const MAX_WAVE_BUFFERS: usize = 4;

/// Buffers a single mix can own.
pub const MAX_MIX_BUFFERS: usize = 24;

/// Output rate of every device sink.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Samples per device frame at [`TARGET_SAMPLE_RATE`].
pub const TARGET_SAMPLE_COUNT: usize = 240;

/// Sessions the renderer can host at once.
pub const MAX_SESSIONS: usize = 2;

/// Who drives command generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// The scheduler thread generates and submits every tick.
    #[default]
    Auto,
    /// `request_update` generates and executes inline.
    Manual,
}

/// Parameters fixed at session initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererParameters {
    /// Output sample rate, 32000 or 48000.
    pub sample_rate: u32,
    /// Samples per tick, 160 or 240.
    pub sample_count: u32,
    /// Total mix buffers across all mixes.
    pub mix_buffer_count: u32,
    /// Mixes besides the final mix.
    pub sub_mix_count: u32,
    /// Voice slots.
    pub voice_count: u32,
    /// Sink slots.
    pub sink_count: u32,
    /// Effect slots.
    pub effect_count: u32,
    /// Performance frames kept; 0 disables metrics.
    pub performance_frame_count: u32,
    /// Allow the generator to drop voices over budget.
    pub voice_drop_enabled: bool,
    /// Splitter slots.
    pub splitter_count: u32,
    /// Splitter destination slots.
    pub splitter_destination_count: u32,
    /// Who drives ticks.
    pub execution_mode: ExecutionMode,
    /// Packed `REVn` tag requested by the client.
    pub revision: u32,
}

impl Default for RendererParameters {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            sample_count: TARGET_SAMPLE_COUNT as u32,
            mix_buffer_count: 2,
            sub_mix_count: 0,
            voice_count: 1,
            sink_count: 1,
            effect_count: 0,
            performance_frame_count: 0,
            voice_drop_enabled: false,
            splitter_count: 0,
            splitter_destination_count: 0,
            execution_mode: ExecutionMode::Manual,
            revision: Revision::CURRENT.to_tag(),
        }
    }
}

fn align(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

impl RendererParameters {
    /// Decoded revision.
    pub fn revision(&self) -> Revision {
        Revision::from_tag(self.revision)
    }

    /// Mixes including the final mix.
    pub fn mix_count(&self) -> usize {
        self.sub_mix_count as usize + 1
    }

    /// Memory pool slots: one per effect and one per voice wave buffer.
    pub fn memory_pool_count(&self) -> usize {
        self.effect_count as usize + self.voice_count as usize * MAX_WAVE_BUFFERS
    }

    /// Upsampler slots: one per sink and sub-mix.
    pub fn upsampler_count(&self) -> usize {
        self.sink_count as usize + self.sub_mix_count as usize
    }

    /// Buffers in the arena: mix buffers followed by voice scratch.
    pub fn arena_buffer_count(&self) -> usize {
        MAX_CHANNELS + self.mix_buffer_count as usize
    }

    /// Entries per performance frame.
    pub fn performance_entries_per_frame(&self) -> usize {
        (self.voice_count + self.effect_count + self.sink_count + self.sub_mix_count + 1) as usize
    }

    /// Checks the rate, count and revision.
    pub fn validate(&self) -> Result<()> {
        if !self.revision().is_valid() {
            return Err(RendererError::InvalidRevision(self.revision().get()));
        }
        if !matches!(self.sample_rate, 32_000 | 48_000) {
            return Err(RendererError::InvalidUpdateInfo("sample rate must be 32000 or 48000"));
        }
        if !matches!(self.sample_count, 160 | 240) {
            return Err(RendererError::InvalidUpdateInfo("sample count must be 160 or 240"));
        }
        if self.mix_buffer_count == 0 {
            return Err(RendererError::InvalidUpdateInfo("at least one mix buffer is required"));
        }
        Ok(())
    }

    /// Workbuffer bytes a session with these parameters needs.
    pub fn work_buffer_size(&self) -> u64 {
        let sample_count = u64::from(self.sample_count);
        let mut size = 0;
        size += align(self.arena_buffer_count() as u64 * sample_count * 4, 0x40);
        size += align(u64::from(self.mix_buffer_count) * 4, 0x40);
        size += align(self.memory_pool_count() as u64 * MEMORY_POOL_IN_SIZE as u64, 0x40);
        size += align(u64::from(self.voice_count) * (VOICE_IN_SIZE + VOICE_RESOURCE_IN_SIZE) as u64, 0x40);
        size += align(u64::from(self.effect_count) * EFFECT_IN_SIZE as u64, 0x40);
        size += align(self.mix_count() as u64 * MIX_IN_SIZE as u64, 0x40);
        size += align(u64::from(self.sink_count) * SINK_IN_SIZE as u64, 0x40);
        size += align(
            self.upsampler_count() as u64 * (MAX_CHANNELS * TARGET_SAMPLE_COUNT) as u64 * 4,
            0x40,
        );
        size += align(
            u64::from(self.splitter_count) * 0x20 + u64::from(self.splitter_destination_count) * 0x70,
            0x40,
        );
        if self.performance_frame_count > 0 {
            let frame = 0x30 + self.performance_entries_per_frame() as u64 * 0x18;
            size += align(frame * u64::from(self.performance_frame_count + 1), 0x40);
        }
        size += BEHAVIOR_OUT_SIZE as u64;
        align(size, 0x1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_validate() {
        assert!(RendererParameters::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_rate_and_count() {
        let mut p = RendererParameters::default();
        p.sample_rate = 44_100;
        assert!(matches!(p.validate(), Err(RendererError::InvalidUpdateInfo(_))));
        let mut p = RendererParameters::default();
        p.sample_count = 256;
        assert!(matches!(p.validate(), Err(RendererError::InvalidUpdateInfo(_))));
    }

    #[test]
    fn rejects_future_revision() {
        let p = RendererParameters {
            revision: Revision::new(13).to_tag(),
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(RendererError::InvalidRevision(13)));
    }

    #[test]
    fn work_buffer_grows_with_voices() {
        let small = RendererParameters::default();
        let big = RendererParameters {
            voice_count: 64,
            ..small
        };
        assert!(big.work_buffer_size() > small.work_buffer_size());
        assert_eq!(small.work_buffer_size() % 0x1000, 0);
    }

    #[test]
    fn derived_counts() {
        let p = RendererParameters {
            voice_count: 3,
            effect_count: 2,
            sink_count: 1,
            sub_mix_count: 2,
            ..Default::default()
        };
        assert_eq!(p.memory_pool_count(), 14);
        assert_eq!(p.upsampler_count(), 3);
        assert_eq!(p.mix_count(), 3);
        assert_eq!(p.arena_buffer_count(), 8);
    }
}
