//! Feedback-delay-network reverb.
//!
//! # Structure
//!
//! ```text
//! in ─► Σ channels × base_gain ─► pre-delay ─┬─► 10 early taps ─► per-channel early sum
//!                                            └─► late tap × late_gain
//!                                                    │
//!                       4 × (fdn line → hf damping → mix matrix → allpass) ◄┘
//! out = dry × in + wet × (early + late)
//! ```
//!
//! Early reflection times and gains come from one of five early modes; the
//! FDN and allpass line lengths from one of five late modes. Six-channel
//! output routes the centre through a 5 ms line and feeds the LFE from every
//! early tap at 0.2 gain.
//!
//! # Parameters
//!
//! `sample_rate` is Q14 kHz. Times (`pre_delay`) are Q14 milliseconds and
//! `decay_time` is Q14 seconds. Gains and ratios are Q14.

use libm::{cosf, powf, sqrtf};

use audren_core::{DelayLine, MixBufferArena, Reader, WireError, flush_denormal};

use crate::types::{MAX_CHANNELS, ParameterState, is_channel_count_valid};

/// Number of FDN and allpass lines.
pub const DELAY_LINES: usize = 4;
/// Number of early reflection taps.
pub const EARLY_TAPS: usize = 10;
/// Number of early and late modes.
pub const MODES: usize = 5;

const FDN_MAX_TIMES: [f32; DELAY_LINES] = [53.953_247, 79.192_566, 116.238_77, 170.615_3];
const DECAY_MAX_TIMES: [f32; DELAY_LINES] = [7.0, 9.0, 13.0, 17.0];

const EARLY_DELAY_TIMES: [[f32; EARLY_TAPS + 1]; MODES] = [
    [0.0, 3.5, 2.799_988, 3.899_963, 2.699_951, 13.399_963, 7.899_963, 8.399_963, 9.899_963, 12.0, 12.5],
    [0.0, 11.799_988, 5.5, 11.199_951, 10.399_963, 38.099_976, 22.199_951, 29.599_976, 21.199_951, 24.799_988, 40.0],
    [0.0, 41.5, 20.5, 41.299_988, 0.0, 29.5, 33.799_988, 45.199_951, 46.799_988, 0.0, 50.0],
    [33.099_976, 43.299_988, 22.799_988, 37.899_963, 14.899_963, 35.299_988, 17.899_963, 34.199_951, 0.0, 43.299_988, 50.0],
    [0.0; EARLY_TAPS + 1],
];

const EARLY_DELAY_GAINS: [[f32; EARLY_TAPS]; MODES] = [
    [0.699_951, 0.679_993, 0.699_951, 0.679_993, 0.699_951, 0.679_993, 0.699_951, 0.679_993, 0.679_993, 0.679_993],
    [0.699_951, 0.679_993, 0.699_951, 0.679_993, 0.699_951, 0.679_993, 0.679_993, 0.679_993, 0.679_993, 0.679_993],
    [0.5, 0.699_951, 0.699_951, 0.679_993, 0.5, 0.679_993, 0.679_993, 0.699_951, 0.679_993, 0.0],
    [0.929_993, 0.919_983, 0.869_995, 0.859_985, 0.939_941, 0.809_998, 0.799_988, 0.769_958, 0.759_949, 0.649_963],
    [0.0; EARLY_TAPS],
];

const FDN_DELAY_TIMES: [[f32; DELAY_LINES]; MODES] = [
    [53.953_247, 79.192_566, 116.238_77, 130.615_3],
    [53.953_247, 79.192_566, 116.238_77, 170.615_3],
    [5.0, 10.0, 5.0, 10.0],
    [47.029_968, 71.0, 103.0, 170.0],
    [53.953_247, 79.192_566, 116.238_77, 170.615_3],
];

const DECAY_DELAY_TIMES: [[f32; DELAY_LINES]; MODES] = [
    [7.0, 9.0, 13.0, 17.0],
    [7.0, 9.0, 13.0, 17.0],
    [1.0, 1.0, 1.0, 1.0],
    [7.0, 7.0, 13.0, 9.0],
    [7.0, 9.0, 13.0, 17.0],
];

const OUT_TAPS_1CH: [usize; EARLY_TAPS] = [0; EARLY_TAPS];
const OUT_TAPS_2CH: [usize; EARLY_TAPS] = [0, 0, 1, 1, 0, 1, 0, 0, 1, 1];
const OUT_TAPS_4CH: [usize; EARLY_TAPS] = [0, 0, 1, 1, 0, 1, 2, 2, 3, 3];
const OUT_TAPS_6CH: [usize; EARLY_TAPS] = [0, 0, 1, 1, 2, 2, 4, 4, 5, 5];

const CENTER: usize = 2;
const LFE: usize = 3;

const DECAY_SCALE: f32 = 0.599_975_6;
const HF_DECAY_BYPASS: f32 = 0.994_934_08;
const HF_GAIN_SCALE: f32 = 0.707_092_3;

/// Reverb parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReverbParams {
    /// Relative input buffer per channel.
    pub inputs: [i8; MAX_CHANNELS],
    /// Relative output buffer per channel.
    pub outputs: [i8; MAX_CHANNELS],
    /// Channel count the workbuffer was sized for.
    pub channel_count_max: u16,
    /// Channels to process.
    pub channel_count: u16,
    /// Q14 kHz.
    pub sample_rate: i32,
    /// Early reflection table, 0..5.
    pub early_mode: u32,
    /// Q14.
    pub early_gain: i32,
    /// Q14 milliseconds.
    pub pre_delay: i32,
    /// Late reverb table, 0..5.
    pub late_mode: u32,
    /// Q14.
    pub late_gain: i32,
    /// Q14 seconds.
    pub decay_time: i32,
    /// Q14.
    pub high_freq_decay_ratio: i32,
    /// Q14.
    pub colouration: i32,
    /// Q14.
    pub base_gain: i32,
    /// Q14.
    pub wet_gain: i32,
    /// Q14.
    pub dry_gain: i32,
    /// Pending state transition.
    pub state: ParameterState,
}

impl ReverbParams {
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
        p.early_mode = r.u32()?;
        p.early_gain = r.i32()?;
        p.pre_delay = r.i32()?;
        p.late_mode = r.u32()?;
        p.late_gain = r.i32()?;
        p.decay_time = r.i32()?;
        p.high_freq_decay_ratio = r.i32()?;
        p.colouration = r.i32()?;
        p.base_gain = r.i32()?;
        p.wet_gain = r.i32()?;
        p.dry_gain = r.i32()?;
        p.state = ParameterState::from_u8(r.u8()?);
        Ok(p)
    }

    fn early_mode(&self) -> usize {
        (self.early_mode as usize).min(MODES - 1)
    }

    fn late_mode(&self) -> usize {
        (self.late_mode as usize).min(MODES - 1)
    }
}

fn q14(raw: i32) -> f32 {
    raw as f32 / 16384.0
}

fn pow10_clamped(value: f32) -> f32 {
    if value >= 0.0 {
        1.0
    } else if value <= -5.3 {
        0.0
    } else {
        powf(10.0, value)
    }
}

fn cos_degrees(degrees: f32) -> f32 {
    cosf(degrees * core::f32::consts::PI / 180.0)
}

/// Host-side reverb state.
#[derive(Debug, Clone)]
pub struct ReverbState {
    fdn_lines: [DelayLine; DELAY_LINES],
    decay_lines: [DelayLine; DELAY_LINES],
    decay: f32,
    pre_delay_line: DelayLine,
    center_delay_line: DelayLine,
    early_delay_times: [usize; EARLY_TAPS],
    early_gains: [f32; EARLY_TAPS],
    pre_delay_time: usize,
    hf_decay_prev_gain: [f32; DELAY_LINES],
    hf_decay_gain: [f32; DELAY_LINES],
    prev_feedback_output: [f32; DELAY_LINES],
    initialized: bool,
}

impl Default for ReverbState {
    fn default() -> Self {
        Self {
            fdn_lines: core::array::from_fn(|_| DelayLine::new(0)),
            decay_lines: core::array::from_fn(|_| DelayLine::new(0)),
            decay: 0.0,
            pre_delay_line: DelayLine::new(0),
            center_delay_line: DelayLine::new(0),
            early_delay_times: [0; EARLY_TAPS],
            early_gains: [0.0; EARLY_TAPS],
            pre_delay_time: 0,
            hf_decay_prev_gain: [0.0; DELAY_LINES],
            hf_decay_gain: [0.0; DELAY_LINES],
            prev_feedback_output: [0.0; DELAY_LINES],
            initialized: false,
        }
    }
}

impl ReverbState {
    /// Creates an empty state; the first enabled tick initializes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once delay lines have been sized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sizes every delay line for the sample rate and applies `params`.
    ///
    /// `long_pre_delay` selects a 350 ms pre-delay line instead of 150 ms.
    pub fn initialize(&mut self, params: &ReverbParams, long_pre_delay: bool) {
        let sr = q14(params.sample_rate);
        for i in 0..DELAY_LINES {
            self.fdn_lines[i] = DelayLine::new((FDN_MAX_TIMES[i] * sr) as usize);
            self.decay_lines[i] = DelayLine::new((DECAY_MAX_TIMES[i] * sr) as usize);
        }
        let pre_delay_ms = if long_pre_delay { 350.0 } else { 150.0 };
        self.pre_delay_line = DelayLine::new((pre_delay_ms * sr) as usize);
        self.center_delay_line = DelayLine::new((5.0 * sr) as usize);
        self.prev_feedback_output = [0.0; DELAY_LINES];
        self.initialized = true;
        self.update(params);
    }

    /// Recomputes taps, line lengths and damping from `params`.
    pub fn update(&mut self, params: &ReverbParams) {
        let sr = q14(params.sample_rate);
        let pre_delay = q14(params.pre_delay);
        let early = params.early_mode();
        let late = params.late_mode();
        let pre_max = self.pre_delay_line.max_delay();

        for i in 0..EARLY_TAPS {
            let delay = (((pre_delay + EARLY_DELAY_TIMES[early][i]) * sr) as usize).min(pre_max);
            self.early_delay_times[i] = delay + 1;
            self.early_gains[i] = q14(params.early_gain) * EARLY_DELAY_GAINS[early][i];
        }
        self.pre_delay_time =
            (((pre_delay + EARLY_DELAY_TIMES[early][EARLY_TAPS]) * sr) as usize).min(pre_max);

        let cos_term = if sr > 0.0 { cos_degrees(1280.0 / sr) } else { 1.0 };
        self.decay = DECAY_SCALE * (1.0 - q14(params.colouration));
        let decay_time = q14(params.decay_time);
        let hf_ratio = q14(params.high_freq_decay_ratio);

        for i in 0..DELAY_LINES {
            self.fdn_lines[i].set_delay((FDN_DELAY_TIMES[late][i] * sr) as usize);
            self.decay_lines[i].set_delay((DECAY_DELAY_TIMES[late][i] * sr) as usize);

            let a = (self.fdn_lines[i].max_delay() + self.decay_lines[i].max_delay()) as f32 * -3.0;
            let b = if decay_time * sr > 0.0 { a / (decay_time * sr) } else { 0.0 };

            let (c, d) = if hf_ratio > HF_DECAY_BYPASS || hf_ratio <= 0.0 {
                (0.0, 1.0)
            } else {
                let e = pow10_clamped((1.0 / hf_ratio - 1.0) * 2.0 / 100.0 * (b / 10.0));
                let f = 1.0 - e;
                let g = 2.0 - cos_term * e * 2.0;
                let h = sqrtf((g * g - f * f * 4.0).max(0.0));
                if f == 0.0 {
                    (0.0, 1.0)
                } else {
                    let c = (g - h) / (f * 2.0);
                    (c, 1.0 - c)
                }
            };

            self.hf_decay_prev_gain[i] = c;
            self.hf_decay_gain[i] = pow10_clamped(b / 1000.0) * d * HF_GAIN_SCALE;
            self.prev_feedback_output[i] = 0.0;
        }
    }

    fn allpass_tick(decay: f32, decay_line: &mut DelayLine, fdn: &mut DelayLine, mix: f32) -> f32 {
        let val = decay_line.read();
        let mixed = mix - val * decay;
        let out = decay_line.tick(mixed) + mixed * decay;
        fdn.tick(out);
        out
    }

    /// Runs the reverb over one frame.
    pub fn process(
        &mut self,
        params: &ReverbParams,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
    ) {
        let n = inputs.len().min(outputs.len());
        let taps = match n {
            1 => &OUT_TAPS_1CH,
            2 => &OUT_TAPS_2CH,
            4 => &OUT_TAPS_4CH,
            _ => &OUT_TAPS_6CH,
        };
        let base_gain = q14(params.base_gain);
        let late_gain = q14(params.late_gain);
        let dry = q14(params.dry_gain);
        let wet = q14(params.wet_gain);

        for i in 0..arena.sample_count() {
            let mut early = [0.0f32; MAX_CHANNELS];
            for tap in 0..EARLY_TAPS {
                let s = self.pre_delay_line.tap_out(self.early_delay_times[tap]) * self.early_gains[tap];
                early[taps[tap]] += s;
                if n == 6 {
                    early[LFE] += s;
                }
            }
            if n == 6 {
                early[LFE] *= 0.2;
            }

            let mut x = [0.0f32; MAX_CHANNELS];
            for ch in 0..n {
                x[ch] = arena.get(inputs[ch])[i] as f32;
            }
            let input: f32 = x[..n].iter().sum();
            self.pre_delay_line.write(input * base_gain);

            for l in 0..DELAY_LINES {
                self.prev_feedback_output[l] = flush_denormal(
                    self.prev_feedback_output[l] * self.hf_decay_prev_gain[l]
                        + self.fdn_lines[l].read() * self.hf_decay_gain[l],
                );
            }

            let pre = self.pre_delay_line.tap_out(self.pre_delay_time) * late_gain;
            let fb = self.prev_feedback_output;
            let mix = [
                fb[2] + fb[1] + pre,
                -fb[0] - fb[3] + pre,
                fb[0] - fb[3] + pre,
                fb[1] - fb[2] + pre,
            ];

            let mut late = [0.0f32; DELAY_LINES];
            for l in 0..DELAY_LINES {
                late[l] = Self::allpass_tick(
                    self.decay,
                    &mut self.decay_lines[l],
                    &mut self.fdn_lines[l],
                    mix[l],
                );
            }

            let late_out: [f32; MAX_CHANNELS] = if n == 6 {
                [late[0], late[1], late[2] - late[3], late[3], late[2], late[3]]
            } else {
                [late[0], late[1], late[2], late[3], 0.0, 0.0]
            };

            for ch in 0..n {
                let tail = if n == 6 && ch == CENTER {
                    self.center_delay_line.tick(late_out[ch] * 0.5)
                } else {
                    late_out[ch]
                };
                let out = x[ch] * dry + (early[ch] + tail) * wet;
                arena.get_mut(outputs[ch])[i] = out as i32;
            }
        }
    }

    /// Handles the parameter handshake, then processes or bypasses.
    pub fn apply(
        &mut self,
        params: &ReverbParams,
        enabled: bool,
        long_pre_delay: bool,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
    ) {
        if params.channel_count == 0 {
            return;
        }
        if enabled && is_channel_count_valid(params.channel_count) {
            match params.state {
                ParameterState::Initialized => self.initialize(params, long_pre_delay),
                ParameterState::Updating => self.update(params),
                ParameterState::Updated => {}
            }
            if self.initialized {
                self.process(params, arena, inputs, outputs);
                return;
            }
        }
        crate::bypass(arena, inputs, outputs);
    }
}
