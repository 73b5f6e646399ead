//! Lookahead peak limiter with optional statistics.
//!
//! Per channel, an envelope follower tracks `|x|` with separate attack and
//! release coefficients. When the envelope exceeds the threshold the target
//! gain becomes `threshold / envelope`; the applied gain follows that target
//! with the same coefficients. The signal itself passes through a lookahead
//! ring so gain reduction lands before the peak does.
//!
//! The reciprocal of the envelope is a coarse estimate (1/512 input steps,
//! 1/256 output steps). Outside [`ProcessingMode::Mode1`] it then goes through
//! two correction steps of the form `2 - avg * x`, exactly as the hardware
//! does, which keeps the target gain near `threshold * (2 - avg)`.
//!
//! Version 2 commands additionally record, per channel, the largest input
//! magnitude and the smallest gain applied since the last reset.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use audren_core::{MixBufferArena, Reader, WireError, Writer};

use crate::types::{MAX_CHANNELS, ParameterState};

/// How the reciprocal of the envelope is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Estimate plus two correction steps.
    #[default]
    Mode0,
    /// Estimate only.
    Mode1,
}

/// Limiter parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightLimiterParams {
    /// Relative input buffer per channel.
    pub inputs: [i8; MAX_CHANNELS],
    /// Relative output buffer per channel.
    pub outputs: [i8; MAX_CHANNELS],
    /// Channel count the workbuffer was sized for.
    pub channel_count_max: u16,
    /// Channels to process.
    pub channel_count: u16,
    /// Sample rate in Hz.
    pub sample_rate: i32,
    /// Maximum lookahead in microseconds.
    pub look_ahead_time_max: i32,
    /// Attack time in microseconds.
    pub attack_time: i32,
    /// Release time in microseconds.
    pub release_time: i32,
    /// Lookahead in microseconds.
    pub look_ahead_time: i32,
    /// Envelope attack coefficient.
    pub attack_coeff: f32,
    /// Envelope release coefficient.
    pub release_coeff: f32,
    /// Linear threshold, full scale = 1.0.
    pub threshold: f32,
    /// Linear input gain.
    pub input_gain: f32,
    /// Linear output gain.
    pub output_gain: f32,
    /// Lookahead ring length in use.
    pub look_ahead_samples_min: i32,
    /// Lookahead ring capacity.
    pub look_ahead_samples_max: i32,
    /// Pending state transition.
    pub state: ParameterState,
    /// Record statistics (version 2 only).
    pub statistics_enabled: bool,
    /// Reset statistics before this frame.
    pub statistics_reset_required: bool,
    /// Reciprocal mode.
    pub processing_mode: ProcessingMode,
}

impl LightLimiterParams {
    /// Decodes the type-specific region.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut p = Self::default();
        for i in &mut p.inputs {
            *i = r.i8()?;
        }
        for o in &mut p.outputs {
            *o = r.i8()?;
        }
        p.channel_count_max = r.u16()?;
        p.channel_count = r.u16()?;
        p.sample_rate = r.i32()?;
        p.look_ahead_time_max = r.i32()?;
        p.attack_time = r.i32()?;
        p.release_time = r.i32()?;
        p.look_ahead_time = r.i32()?;
        p.attack_coeff = r.f32()?;
        p.release_coeff = r.f32()?;
        p.threshold = r.f32()?;
        p.input_gain = r.f32()?;
        p.output_gain = r.f32()?;
        p.look_ahead_samples_min = r.i32()?;
        p.look_ahead_samples_max = r.i32()?;
        p.state = ParameterState::from_u8(r.u8()?);
        p.statistics_enabled = r.bool()?;
        p.statistics_reset_required = r.bool()?;
        p.processing_mode = if r.u8()? == 1 {
            ProcessingMode::Mode1
        } else {
            ProcessingMode::Mode0
        };
        Ok(p)
    }
}

/// Per-channel limiter statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightLimiterStatistics {
    /// Largest input magnitude seen, full scale = 1.0.
    pub channel_max_sample: [f32; MAX_CHANNELS],
    /// Smallest gain applied.
    pub channel_compression_gain_min: [f32; MAX_CHANNELS],
}

impl Default for LightLimiterStatistics {
    fn default() -> Self {
        Self {
            channel_max_sample: [0.0; MAX_CHANNELS],
            channel_compression_gain_min: [1.0; MAX_CHANNELS],
        }
    }
}

impl LightLimiterStatistics {
    /// Encoded size in bytes.
    pub const SIZE: usize = 0x30;

    /// Writes both arrays, maxima first.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        for v in self.channel_max_sample {
            w.f32(v)?;
        }
        for v in self.channel_compression_gain_min {
            w.f32(v)?;
        }
        Ok(())
    }
}

/// Host-side limiter state.
#[derive(Debug, Clone, Default)]
pub struct LightLimiterState {
    samples_average: [f32; MAX_CHANNELS],
    compression_gain: [f32; MAX_CHANNELS],
    look_ahead_offsets: [usize; MAX_CHANNELS],
    look_ahead_buffers: Vec<Vec<f32>>,
    statistics: LightLimiterStatistics,
}

fn recip_estimate(a: f64) -> f64 {
    let q = (a * 512.0) as i32;
    let r = 1.0 / ((f64::from(q) + 0.5) / 512.0);
    let s = (256.0 * r + 0.5) as i32;
    f64::from(s) / 256.0
}

impl LightLimiterState {
    /// Creates an empty state; the first enabled tick initializes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics gathered by version 2 commands.
    pub fn statistics(&self) -> &LightLimiterStatistics {
        &self.statistics
    }

    /// Resets envelopes, gains and lookahead rings.
    pub fn initialize(&mut self, params: &LightLimiterParams) {
        let len = params.look_ahead_samples_max.max(1) as usize;
        self.samples_average = [0.0; MAX_CHANNELS];
        self.compression_gain = [1.0; MAX_CHANNELS];
        self.look_ahead_offsets = [0; MAX_CHANNELS];
        self.look_ahead_buffers = (0..usize::from(params.channel_count).min(MAX_CHANNELS))
            .map(|_| vec![0.0; len])
            .collect();
    }

    /// Runs the limiter over one frame.
    pub fn process(
        &mut self,
        params: &LightLimiterParams,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
        with_statistics: bool,
    ) {
        let n = inputs.len().min(outputs.len()).min(self.look_ahead_buffers.len());
        if with_statistics && params.statistics_reset_required {
            self.statistics = LightLimiterStatistics::default();
        }
        let ring_len = params.look_ahead_samples_min.max(1) as usize;

        for i in 0..arena.sample_count() {
            for ch in 0..n {
                let sample = arena.get(inputs[ch])[i] as f32 / 32768.0 * params.input_gain;
                let abs_sample = sample.abs();

                let coeff = if abs_sample > self.samples_average[ch] {
                    params.attack_coeff
                } else {
                    params.release_coeff
                };
                self.samples_average[ch] += (abs_sample - self.samples_average[ch]) * coeff;

                let average = f64::from(self.samples_average[ch]);
                let mut reciprocal = recip_estimate(average);
                if params.processing_mode != ProcessingMode::Mode1 {
                    let temp = 2.0 - average * reciprocal;
                    reciprocal = 2.0 - average * temp;
                }

                let attenuation = if self.samples_average[ch] > params.threshold {
                    params.threshold * reciprocal as f32
                } else {
                    1.0
                };
                let coeff = if attenuation < self.compression_gain[ch] {
                    params.attack_coeff
                } else {
                    params.release_coeff
                };
                self.compression_gain[ch] += (attenuation - self.compression_gain[ch]) * coeff;

                let ring = &mut self.look_ahead_buffers[ch];
                let offset = self.look_ahead_offsets[ch].min(ring.len() - 1);
                let delayed = ring[offset];
                ring[offset] = sample;
                self.look_ahead_offsets[ch] = (offset + 1) % ring_len.min(ring.len());

                let out = f64::from(delayed * self.compression_gain[ch] * params.output_gain) * 32768.0;
                arena.get_mut(outputs[ch])[i] = out.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;

                if with_statistics {
                    let stats = &mut self.statistics;
                    stats.channel_max_sample[ch] = stats.channel_max_sample[ch].max(abs_sample);
                    stats.channel_compression_gain_min[ch] =
                        stats.channel_compression_gain_min[ch].min(self.compression_gain[ch]);
                }
            }
        }
    }

    /// Handles the parameter handshake, then processes or bypasses.
    pub fn apply(
        &mut self,
        params: &LightLimiterParams,
        enabled: bool,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
        with_statistics: bool,
    ) {
        if enabled {
            if params.state == ParameterState::Initialized || self.look_ahead_buffers.is_empty() {
                self.initialize(params);
            }
            if !self.look_ahead_buffers.is_empty() {
                self.process(params, arena, inputs, outputs, with_statistics);
                return;
            }
        }
        crate::bypass(arena, inputs, outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LightLimiterParams {
        LightLimiterParams {
            inputs: [0, 1, 0, 0, 0, 0],
            outputs: [0, 1, 0, 0, 0, 0],
            channel_count_max: 1,
            channel_count: 1,
            sample_rate: 48000,
            attack_coeff: 0.5,
            release_coeff: 0.01,
            threshold: 0.25,
            input_gain: 1.0,
            output_gain: 1.0,
            look_ahead_samples_min: 4,
            look_ahead_samples_max: 8,
            state: ParameterState::Initialized,
            ..Default::default()
        }
    }

    #[test]
    fn recip_estimate_is_close() {
        for a in [0.25f64, 0.5, 0.9] {
            assert!((recip_estimate(a) - 1.0 / a).abs() < 0.02 / a);
        }
    }

    #[test]
    fn quiet_signal_is_delayed_unchanged() {
        let p = params();
        let mut state = LightLimiterState::new();
        let mut arena = MixBufferArena::new(1, 16);
        arena.get_mut(0)[0] = 1000;
        state.apply(&p, true, &mut arena, &[0], &[0], false);
        assert_eq!(arena.get(0)[0], 0);
        assert_eq!(arena.get(0)[4], 1000);
    }

    #[test]
    fn loud_signal_is_reduced() {
        let p = params();
        let mut state = LightLimiterState::new();
        let mut arena = MixBufferArena::new(1, 240);
        for _ in 0..4 {
            arena.get_mut(0).fill(30000);
            state.apply(&p, true, &mut arena, &[0], &[0], true);
        }
        let last = arena.get(0)[239];
        assert!(last < 30000 / 2, "expected gain reduction, got {last}");
        let stats = state.statistics();
        assert!(stats.channel_max_sample[0] > 0.9);
        assert!(stats.channel_compression_gain_min[0] < 0.5);
    }

    #[test]
    fn statistics_encode_size() {
        let mut buf = [0u8; LightLimiterStatistics::SIZE];
        LightLimiterStatistics::default().encode(&mut Writer::new(&mut buf)).unwrap();
        assert_eq!(&buf[0x18..0x1C], &1.0f32.to_le_bytes());
    }

    #[test]
    fn disabled_copies_input() {
        let p = params();
        let mut state = LightLimiterState::new();
        let mut arena = MixBufferArena::new(2, 4);
        arena.get_mut(0).fill(9);
        state.apply(&p, false, &mut arena, &[0], &[1], false);
        assert_eq!(arena.get(1), &[9; 4]);
    }
}
