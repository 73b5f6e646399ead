//! Per-channel playback state shared between generation and processing.

use audren_core::BiquadFilterState;

use crate::params::{MAX_MIX_BUFFERS, MAX_WAVE_BUFFERS};

/// Samples of decoded history kept for interpolation across ticks.
pub const SAMPLE_HISTORY: usize = 2;

/// DSP-ADPCM predictor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdpcmContext {
    /// Last frame header: coefficient index in the high nibble, scale in the
    /// low nibble.
    pub header: u16,
    /// Most recent decoded sample.
    pub yn0: i16,
    /// Sample before `yn0`.
    pub yn1: i16,
}

impl AdpcmContext {
    /// Bytes of a guest-side loop context record.
    pub const SIZE: usize = 6;

    /// Parses a guest-side loop context record.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            header: u16::from_le_bytes([raw[0], raw[1]]),
            yn0: i16::from_le_bytes([raw[2], raw[3]]),
            yn1: i16::from_le_bytes([raw[4], raw[5]]),
        }
    }
}

/// Playback position and filter memory of one voice channel.
///
/// Indexed by channel resource id. The update path resets and validates it,
/// the generator reads it to decide what to emit, and the data source,
/// biquad and mix-ramp kernels advance it while the list runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoiceState {
    /// Samples played from the current wave buffer.
    pub played_sample_count: u64,
    /// Sample offset within the current wave buffer.
    pub offset: u32,
    /// Wave buffer being played.
    pub wave_buffer_index: usize,
    /// Wave buffers queued and not yet consumed.
    pub wave_buffer_valid: [bool; MAX_WAVE_BUFFERS],
    /// Wave buffers finished since the voice started.
    pub wave_buffers_consumed: u32,
    /// Tail of the previous tick's source samples.
    pub sample_history: [i16; SAMPLE_HISTORY],
    /// Q15 position between source samples.
    pub fraction: i32,
    /// ADPCM predictor.
    pub adpcm_context: AdpcmContext,
    /// State of the two voice biquads.
    pub biquad_states: [BiquadFilterState; 2],
    /// Last sample mixed into each destination, for depop.
    pub previous_samples: [i32; MAX_MIX_BUFFERS],
    /// Passes through a looping wave buffer.
    pub loop_count: u32,
}

impl VoiceState {
    /// True if any wave buffer is queued.
    pub fn has_valid_buffer(&self) -> bool {
        self.wave_buffer_valid.iter().any(|&v| v)
    }

    /// Marks `index` as consumed and advances the play cursor if it pointed
    /// there.
    pub fn consume_buffer(&mut self, index: usize) {
        if self.wave_buffer_index == index {
            self.advance_buffer();
        }
        self.wave_buffer_valid[index] = false;
    }

    /// Moves the play cursor to the next wave buffer.
    pub fn advance_buffer(&mut self) {
        self.wave_buffer_index = (self.wave_buffer_index + 1) % MAX_WAVE_BUFFERS;
        self.wave_buffers_consumed += 1;
    }

    /// Rewinds playback without touching the queue.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.played_sample_count = 0;
        self.adpcm_context = AdpcmContext::default();
        self.sample_history = [0; SAMPLE_HISTORY];
        self.fraction = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_advances_only_current() {
        let mut s = VoiceState::default();
        s.wave_buffer_valid = [true; MAX_WAVE_BUFFERS];
        s.consume_buffer(2);
        assert_eq!(s.wave_buffer_index, 0);
        assert_eq!(s.wave_buffers_consumed, 0);
        assert!(!s.wave_buffer_valid[2]);

        s.consume_buffer(0);
        assert_eq!(s.wave_buffer_index, 1);
        assert_eq!(s.wave_buffers_consumed, 1);
    }

    #[test]
    fn cursor_wraps() {
        let mut s = VoiceState {
            wave_buffer_index: MAX_WAVE_BUFFERS - 1,
            ..Default::default()
        };
        s.advance_buffer();
        assert_eq!(s.wave_buffer_index, 0);
    }

    #[test]
    fn adpcm_context_parses_little_endian() {
        let c = AdpcmContext::from_bytes(&[0x34, 0x12, 0xFF, 0xFF, 0x02, 0x00]);
        assert_eq!(c.header, 0x1234);
        assert_eq!(c.yn0, -1);
        assert_eq!(c.yn1, 2);
    }
}
