//! Stateful polyphase upsampler to the 48 kHz device rate.
//!
//! # Algorithm
//!
//! Each channel keeps a 20-entry circular history of Q24.8 samples. A phase
//! counter (period 6 for 8 kHz sources, 3 otherwise) decides per output sample
//! whether to advance the history and emit the newest sample directly, or to
//! interpolate with a 20-tap windowed sinc: ten taps walking backward from the
//! read pointer with one window, ten walking forward from the slot after it
//! with the mirrored window.
//!
//! Windows are Q17.15. Products are accumulated with 64-bit wrapping
//! arithmetic and shifted down by 8 + 15 bits, then truncated to `i32`, so the
//! output is bit-exact for a given history, ratio and phase.
//!
//! | source samples/frame | source rate | ratio | period |
//! |----------------------|-------------|-------|--------|
//! | 40                   | 8 kHz       | 6     | 6      |
//! | 80                   | 16 kHz      | 3     | 3      |
//! | 160                  | 32 kHz      | 1.5   | 3      |
//!
//! Any other source count falls back to ratio 1.5.

/// Length of the per-channel history.
pub const HISTORY_SIZE: usize = 20;

/// Taps per window half.
pub const WINDOW_SIZE: usize = 10;

const HISTORY_FRACTION_BITS: u32 = 8;
const WINDOW_FRACTION_BITS: u32 = 15;

/// Windowed sinc tables, Q17.15 raw values.
const SINC_1: [i32; WINDOW_SIZE] = [31253, -4218, 1967, -1064, 579, -299, 140, -57, 19, -3];
const SINC_2: [i32; WINDOW_SIZE] = [26971, -6279, 3062, -1668, 903, -460, 212, -83, 26, -4];
const SINC_3: [i32; WINDOW_SIZE] = [20640, -6316, 3187, -1743, 938, -471, 213, -81, 24, -3];
const SINC_4: [i32; WINDOW_SIZE] = [13295, -4813, 2491, -1365, 728, -361, 159, -58, 16, -1];
const SINC_5: [i32; WINDOW_SIZE] = [6076, -2463, 1300, -712, 376, -183, 79, -27, 7, 0];

/// Integer conversion ratio from source to 48 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsampleRatio {
    /// 8 kHz → 48 kHz.
    Six,
    /// 16 kHz → 48 kHz.
    Three,
    /// 32 kHz → 48 kHz.
    OneAndHalf,
}

impl UpsampleRatio {
    /// Selects the ratio for a source frame of `count` samples.
    pub fn from_source_sample_count(count: u32) -> Self {
        match count {
            40 => UpsampleRatio::Six,
            80 => UpsampleRatio::Three,
            160 => UpsampleRatio::OneAndHalf,
            _ => {
                #[cfg(feature = "tracing")]
                tracing::error!("upsampler: unsupported source sample count {count}, using 1.5");
                UpsampleRatio::OneAndHalf
            }
        }
    }

    /// The ratio as a float.
    pub fn as_f32(self) -> f32 {
        match self {
            UpsampleRatio::Six => 6.0,
            UpsampleRatio::Three => 3.0,
            UpsampleRatio::OneAndHalf => 1.5,
        }
    }

    /// Length of the phase cycle.
    pub fn period(self) -> u8 {
        match self {
            UpsampleRatio::Six => 6,
            UpsampleRatio::Three | UpsampleRatio::OneAndHalf => 3,
        }
    }
}

/// Per-channel upsampler state. Persists across frames.
#[derive(Debug, Clone)]
pub struct UpsamplerState {
    ratio: UpsampleRatio,
    history: [i32; HISTORY_SIZE],
    input_index: usize,
    output_index: usize,
    start_index: usize,
    end_index: usize,
    initialized: bool,
    phase: u8,
}

impl UpsamplerState {
    /// Creates an uninitialized state. Ratio and history are set on first use.
    pub fn new() -> Self {
        Self {
            ratio: UpsampleRatio::OneAndHalf,
            history: [0; HISTORY_SIZE],
            input_index: 0,
            output_index: 0,
            start_index: 0,
            end_index: HISTORY_SIZE - 1,
            initialized: false,
            phase: 0,
        }
    }

    /// True once the first frame has been processed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Ratio chosen at initialization.
    pub fn ratio(&self) -> UpsampleRatio {
        self.ratio
    }

    /// Current phase within the cycle.
    pub fn phase(&self) -> u8 {
        self.phase
    }

    fn initialize(&mut self, source_sample_count: u32) {
        self.ratio = UpsampleRatio::from_source_sample_count(source_sample_count);
        self.history = [0; HISTORY_SIZE];
        self.input_index = 0;
        self.output_index = WINDOW_SIZE - 1;
        self.start_index = 0;
        self.end_index = HISTORY_SIZE - 1;
        self.initialized = true;
    }

    /// Consumes the next input sample into the history.
    fn advance(&mut self, input: &[i32], read_index: &mut usize) {
        let sample = input.get(*read_index).copied().unwrap_or(0);
        *read_index += 1;
        self.history[self.input_index] = sample.wrapping_shl(HISTORY_FRACTION_BITS);
        self.input_index = (self.input_index + 1) % HISTORY_SIZE;
        self.output_index = (self.output_index + 1) % HISTORY_SIZE;
    }

    fn pass_through(&self) -> i32 {
        self.history[self.output_index] >> HISTORY_FRACTION_BITS
    }

    fn interpolate(&self, backward: &[i32; WINDOW_SIZE], forward: &[i32; WINDOW_SIZE]) -> i32 {
        let mut acc: i64 = 0;

        let mut index = self.output_index;
        for &coeff in backward {
            acc = acc.wrapping_add(i64::from(self.history[index]).wrapping_mul(i64::from(coeff)));
            index = if index == self.start_index {
                self.end_index
            } else {
                index - 1
            };
        }

        let mut index = (self.output_index + 1) % HISTORY_SIZE;
        for &coeff in forward {
            acc = acc.wrapping_add(i64::from(self.history[index]).wrapping_mul(i64::from(coeff)));
            index = if index == self.end_index {
                self.start_index
            } else {
                index + 1
            };
        }

        (acc >> (HISTORY_FRACTION_BITS + WINDOW_FRACTION_BITS)) as i32
    }

    /// Upsamples one frame.
    ///
    /// Writes `output.len()` samples at 48 kHz, reading from `input` as the
    /// phase cycle consumes it. `source_sample_count` selects the ratio on the
    /// first call and is ignored afterwards.
    pub fn process(&mut self, output: &mut [i32], input: &[i32], source_sample_count: u32) {
        if !self.initialized {
            self.initialize(source_sample_count);
        }

        let mut read_index = 0;
        for out in output.iter_mut() {
            *out = match (self.ratio, self.phase) {
                (_, 0) => {
                    self.advance(input, &mut read_index);
                    self.pass_through()
                }
                (UpsampleRatio::Six, 1) => self.interpolate(&SINC_1, &SINC_5),
                (UpsampleRatio::Six, 2) => self.interpolate(&SINC_2, &SINC_4),
                (UpsampleRatio::Six, 3) => self.interpolate(&SINC_3, &SINC_3),
                (UpsampleRatio::Six, 4) => self.interpolate(&SINC_4, &SINC_2),
                (UpsampleRatio::Six, _) => self.interpolate(&SINC_5, &SINC_1),
                (UpsampleRatio::Three, 1) => self.interpolate(&SINC_2, &SINC_4),
                (UpsampleRatio::Three, _) => self.interpolate(&SINC_4, &SINC_2),
                (UpsampleRatio::OneAndHalf, 1) => self.interpolate(&SINC_4, &SINC_2),
                (UpsampleRatio::OneAndHalf, _) => {
                    self.advance(input, &mut read_index);
                    self.interpolate(&SINC_2, &SINC_4)
                }
            };
            self.phase = (self.phase + 1) % self.ratio.period();
        }
    }
}

impl Default for UpsamplerState {
    fn default() -> Self {
        Self::new()
    }
}
