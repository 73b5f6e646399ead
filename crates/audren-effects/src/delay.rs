//! Multichannel feedback delay.
//!
//! Each channel owns a [`DelayLine`]. Per sample, the delayed outputs are
//! cross-fed through a channel-count-specific feedback matrix, low-passed by a
//! one-pole filter and written back. The output is `dry * in + wet * delayed`.
//!
//! # Parameters
//!
//! All gains are Q14 on the wire. `sample_rate` is Q14 Hz; delay times are
//! whole milliseconds.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `in_gain` | Gain into the feedback path |
//! | `feedback_gain` | Total feedback, scaled by 0.98 internally |
//! | `channel_spread` | Share of feedback that crosses channels |
//! | `lowpass_amount` | One-pole coefficient, scaled by 0.95 internally |
//! | `wet_gain` / `dry_gain` | Output mix |

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use audren_core::{DelayLine, MixBufferArena, Reader, WireError, flush_denormal};

use crate::types::{MAX_CHANNELS, ParameterState, is_channel_count_valid};

const FEEDBACK_SCALE: f32 = 0.979_980_47;
const LOWPASS_SCALE: f32 = 0.949_951_17;

/// Delay parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelayParams {
    /// Relative input buffer per channel.
    pub inputs: [i8; MAX_CHANNELS],
    /// Relative output buffer per channel.
    pub outputs: [i8; MAX_CHANNELS],
    /// Channel count the workbuffer was sized for.
    pub channel_count_max: u16,
    /// Channels to process.
    pub channel_count: u16,
    /// Maximum delay in milliseconds.
    pub delay_time_max: u32,
    /// Delay in milliseconds.
    pub delay_time: u32,
    /// Sample rate, Q14 Hz.
    pub sample_rate: i32,
    /// Q14.
    pub in_gain: i32,
    /// Q14.
    pub feedback_gain: i32,
    /// Q14.
    pub wet_gain: i32,
    /// Q14.
    pub dry_gain: i32,
    /// Q14.
    pub channel_spread: i32,
    /// Q14.
    pub lowpass_amount: i32,
    /// Pending state transition.
    pub state: ParameterState,
}

impl DelayParams {
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
        p.delay_time_max = r.u32()?;
        p.delay_time = r.u32()?;
        p.sample_rate = r.i32()?;
        p.in_gain = r.i32()?;
        p.feedback_gain = r.i32()?;
        p.wet_gain = r.i32()?;
        p.dry_gain = r.i32()?;
        p.channel_spread = r.i32()?;
        p.lowpass_amount = r.i32()?;
        p.state = ParameterState::from_u8(r.u8()?);
        Ok(p)
    }

    fn sample_rate_hz(&self) -> f32 {
        q14(self.sample_rate)
    }
}

fn q14(raw: i32) -> f32 {
    raw as f32 / 16384.0
}

/// Host-side delay state.
#[derive(Debug, Clone, Default)]
pub struct DelayState {
    lines: Vec<DelayLine>,
    feedback_gain: f32,
    delay_feedback_gain: f32,
    delay_feedback_cross_gain: f32,
    lowpass_feedback_gain: f32,
    lowpass_gain: f32,
    lowpass_z: [f32; MAX_CHANNELS],
}

impl DelayState {
    /// Creates an empty state; the first enabled tick initializes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated delay lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Rebuilds delay lines and gains from `params`.
    pub fn initialize(&mut self, params: &DelayParams) {
        *self = Self::default();
        let rate = params.sample_rate_hz();
        let max = (params.delay_time_max as f32 * rate / 1000.0) as usize;
        let delay = ((params.delay_time as f32 * rate / 1000.0) as usize).min(max);
        for _ in 0..usize::from(params.channel_count).min(MAX_CHANNELS) {
            let mut line = DelayLine::new(max);
            line.set_delay(delay);
            self.lines.push(line);
        }
        self.update(params);
    }

    /// Refreshes the gains from `params` without clearing the lines.
    pub fn update(&mut self, params: &DelayParams) {
        let mut spread = params.channel_spread;
        self.feedback_gain = q14(params.feedback_gain) * FEEDBACK_SCALE;
        self.delay_feedback_gain = self.feedback_gain * (1.0 - q14(spread));
        if matches!(params.channel_count, 4 | 6) {
            spread >>= 1;
        }
        self.delay_feedback_cross_gain = q14(spread) * self.feedback_gain;
        self.lowpass_feedback_gain = q14(params.lowpass_amount) * LOWPASS_SCALE;
        self.lowpass_gain = 1.0 - self.lowpass_feedback_gain;
    }

    fn matrix(&self, params: &DelayParams, n: usize) -> [[f32; MAX_CHANNELS]; MAX_CHANNELS] {
        let g = self.delay_feedback_gain;
        let x = self.delay_feedback_cross_gain;
        let mut m = [[0.0; MAX_CHANNELS]; MAX_CHANNELS];
        match n {
            1 => m[0][0] = self.feedback_gain,
            2 => {
                m[0][..2].copy_from_slice(&[g, x]);
                m[1][..2].copy_from_slice(&[x, g]);
            }
            4 => {
                m[0][..4].copy_from_slice(&[g, x, x, 0.0]);
                m[1][..4].copy_from_slice(&[x, g, 0.0, x]);
                m[2][..4].copy_from_slice(&[x, 0.0, g, x]);
                m[3][..4].copy_from_slice(&[0.0, x, x, g]);
            }
            _ => {
                m[0] = [g, 0.0, x, 0.0, x, 0.0];
                m[1] = [0.0, g, x, 0.0, 0.0, x];
                m[2] = [x, x, g, 0.0, 0.0, 0.0];
                m[3] = [0.0, 0.0, 0.0, q14(params.feedback_gain), 0.0, 0.0];
                m[4] = [x, 0.0, 0.0, 0.0, g, x];
                m[5] = [0.0, x, 0.0, 0.0, x, g];
            }
        }
        m
    }

    /// Runs the delay over one frame. `inputs` and `outputs` are absolute
    /// mix buffer indices, one per channel.
    pub fn process(
        &mut self,
        params: &DelayParams,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
    ) {
        let n = inputs.len().min(outputs.len()).min(self.lines.len());
        let matrix = self.matrix(params, n);
        let in_gain = q14(params.in_gain);
        let dry = q14(params.dry_gain);
        let wet = q14(params.wet_gain);

        for i in 0..arena.sample_count() {
            let mut x = [0.0f32; MAX_CHANNELS];
            let mut d = [0.0f32; MAX_CHANNELS];
            for ch in 0..n {
                x[ch] = arena.get(inputs[ch])[i] as f32;
                d[ch] = self.lines[ch].read();
            }

            for ch in 0..n {
                let fed: f32 = (0..n).map(|j| d[j] * matrix[j][ch]).sum();
                let gained = x[ch] * in_gain + fed;
                self.lowpass_z[ch] = flush_denormal(
                    gained * self.lowpass_gain + self.lowpass_z[ch] * self.lowpass_feedback_gain,
                );
                self.lines[ch].tick(self.lowpass_z[ch]);
            }

            for ch in 0..n {
                arena.get_mut(outputs[ch])[i] = libm::floorf(x[ch] * dry + d[ch] * wet) as i32;
            }
        }
    }

    /// Handles the parameter handshake, then processes or bypasses.
    pub fn apply(
        &mut self,
        params: &DelayParams,
        enabled: bool,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
    ) {
        if enabled && is_channel_count_valid(params.channel_count) {
            match params.state {
                ParameterState::Initialized => self.initialize(params),
                ParameterState::Updating => self.update(params),
                ParameterState::Updated => {}
            }
            if self.lines.len() == usize::from(params.channel_count) {
                self.process(params, arena, inputs, outputs);
                return;
            }
        }
        crate::bypass(arena, inputs, outputs);
    }
}
