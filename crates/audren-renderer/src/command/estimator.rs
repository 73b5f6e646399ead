//! Per-command processing cost estimates.
//!
//! The generator charges every command with an estimate from the table of
//! the session's estimator generation. Voice dropping and the processor's
//! time budget both work on these estimates, so the numbers are units of
//! the coprocessor's clock rather than wall time.
//!
//! | version | revision feature                    | notes                            |
//! |---------|-------------------------------------|----------------------------------|
//! | 1       | -                                   | linear in sample count           |
//! | 2       | `CommandProcessingTimeEstimatorV2`  | measured, per 160/240 frame      |
//! | 3       | `CommandProcessingTimeEstimatorV3`  | resampler quality aware          |
//! | 4, 5    | `...V4`, `...V5`                    | adds multi-tap biquad, capture   |

use audren_core::BehaviorInfo;

use super::{Command, MixRampGroupedCommand};
use crate::wire::{SampleFormat, SrcQuality};

/// Cost table for one estimator generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimator {
    version: u32,
    sample_count: u32,
    buffer_count: u32,
}

/// Picks the 160- or 240-sample figure.
fn by_frame(sample_count: u32, at_160: f32, at_240: f32) -> u32 {
    if sample_count == 160 { at_160 as u32 } else { at_240 as u32 }
}

/// Index of a 1/2/4/6 channel layout in the effect tables.
fn channel_index(channels: u16) -> Option<usize> {
    match channels {
        1 => Some(0),
        2 => Some(1),
        4 => Some(2),
        6 => Some(3),
        _ => None,
    }
}

/// One effect's figures: `[frame][enabled][channels]`, frames 160 then 240.
type EffectTable = [[[f32; 4]; 2]; 2];

const V2_DELAY: EffectTable = [
    [[578.529, 663.064, 703.983, 760.032], [41635.555, 97861.211, 192515.516, 301755.969]],
    [[521.283, 585.396, 629.884, 713.57], [8770.345, 25741.18, 47551.168, 81629.219]],
];
const V2_REVERB: EffectTable = [
    [[492.009, 554.463, 595.864, 656.617], [97192.227, 103278.555, 109579.039, 115065.438]],
    [[495.789, 527.163, 598.752, 666.025], [136463.641, 145749.047, 154796.938, 161968.406]],
];
const V3_DELAY: EffectTable = [
    [[1295.206, 1213.6, 942.028, 1001.553], [8929.042, 25500.75, 47759.617, 82203.07]],
    [[997.668, 977.634, 792.309, 875.427], [11941.051, 37197.371, 69749.836, 120042.398]],
];
const V3_REVERB: EffectTable = [
    [[536.298, 588.798, 643.702, 705.999], [81475.055, 84975.0, 91625.148, 95332.266]],
    [[617.641, 659.536, 711.438, 778.071], [120174.469, 125262.219, 135751.234, 141129.234]],
];
const V3_LIMITER: EffectTable = [
    [[897.004, 931.549, 975.387, 1016.778], [21392.383, 26829.389, 32405.152, 52218.586]],
    [[874.429, 921.553, 945.262, 992.26], [30555.504, 39010.785, 48270.18, 76711.875]],
];
/// Enabled figures of the limiter with statistics, frames 160 then 240.
const V3_LIMITER_STATISTICS: [[f32; 4]; 2] = [
    [23308.928, 29954.062, 35807.477, 58339.773],
    [33526.121, 43549.355, 52190.281, 85526.516],
];

/// Data source slope and intercept, `[frame][quality]` with qualities in
/// Medium, High, Low order.
type SourceTable = [[(f32, f32); 3]; 2];

const V3_PCM16: SourceTable = [
    [(427.52, 6329.442), (371.876, 8049.415), (423.43, 5062.659)],
    [(710.143, 7853.286), (610.487, 10138.842), (676.722, 5810.962)],
];
const V3_PCM_FLOAT: SourceTable = [
    [(1672.026, 7681.211), (1672.982, 9038.011), (1673.216, 6027.577)],
    [(2550.414, 9663.969), (2522.303, 11758.571), (2537.061, 7369.309)],
];
const V3_ADPCM: SourceTable = [
    [(1827.665, 7913.808), (1829.285, 9607.814), (1824.609, 6517.476)],
    [(2756.372, 9736.702), (2731.308, 12154.379), (2732.152, 7929.442)],
];

impl Estimator {
    /// Table for `version`, clamped to 1..=5.
    pub fn new(version: u32, sample_count: u32, buffer_count: u32) -> Self {
        Self {
            version: version.clamp(1, 5),
            sample_count,
            buffer_count,
        }
    }

    /// Table selected by the session's revision.
    pub fn for_behavior(behavior: &BehaviorInfo, sample_count: u32, buffer_count: u32) -> Self {
        Self::new(behavior.estimator_version(), sample_count, buffer_count)
    }

    /// Estimator generation in use.
    pub fn version(&self) -> u32 {
        self.version
    }

    fn frame(&self) -> usize {
        usize::from(self.sample_count != 160)
    }

    fn effect(&self, table: &EffectTable, enabled: bool, channels: u16) -> u32 {
        match channel_index(channels) {
            Some(c) => table[self.frame()][usize::from(enabled)][c] as u32,
            None => {
                tracing::error!(channels, "no estimate for channel count");
                0
            }
        }
    }

    fn grouped_count(g: &MixRampGroupedCommand) -> f32 {
        g.active_count() as f32
    }

    /// Estimated cost of `command`.
    pub fn estimate(&self, command: &Command) -> u32 {
        match self.version {
            1 => self.estimate_v1(command),
            2 => self.estimate_v2(command),
            _ => self.estimate_v3(command),
        }
    }

    fn estimate_v1(&self, command: &Command) -> u32 {
        let sc = self.sample_count as f32;
        match command {
            Command::DataSource(ds) => match ds.format {
                SampleFormat::PcmFloat => 0,
                SampleFormat::Adpcm => (ds.pitch * 0.46 * 1.2) as u32,
                _ => (ds.pitch * 0.25 * 1.2) as u32,
            },
            Command::Volume { .. } => (sc * 8.8 * 1.2) as u32,
            Command::VolumeRamp { .. } => (sc * 9.8 * 1.2) as u32,
            Command::Biquad { .. } => (sc * 58.0 * 1.2) as u32,
            Command::Mix { .. } => (sc * 10.0 * 1.2) as u32,
            Command::MixRamp { .. } => (sc * 14.4 * 1.2) as u32,
            Command::MixRampGrouped(g) => (sc * 14.4 * 1.2 * Self::grouped_count(g)) as u32,
            Command::DepopPrepare { .. } => 1080,
            Command::DepopForMixBuffers { count, .. } => (sc * 8.9 * *count as f32) as u32,
            Command::Delay(cmd) => (sc * f32::from(cmd.params.channel_count) * 202.5) as u32,
            Command::Upsample { .. } => 357_915,
            Command::DownMix6chTo2ch { .. } => 16_108,
            Command::Aux(a) => {
                if a.enabled {
                    15_956
                } else {
                    3_765
                }
            }
            Command::DeviceSink { .. } => 10_042,
            Command::CircularBufferSink { .. } => 55,
            Command::Reverb { cmd, .. } => {
                if cmd.enabled {
                    (f32::from(cmd.params.channel_count) * sc * 750.0 * 1.2) as u32
                } else {
                    0
                }
            }
            Command::Performance { .. } => 1_454,
            Command::ClearMixBuffer => (sc * 0.83 * self.buffer_count as f32 * 1.2) as u32,
            _ => 0,
        }
    }

    fn estimate_v2(&self, command: &Command) -> u32 {
        let sc = self.sample_count;
        let pitch_term = |rate: u32, pitch: f32| rate as f32 / 200.0 / sc as f32 * (pitch * 2.0);
        match command {
            Command::DataSource(ds) => {
                let x = pitch_term(ds.sample_rate, ds.pitch);
                match ds.format {
                    SampleFormat::Adpcm => by_frame(sc, x * 2125.588 + 9039.47, x * 3564.088 + 6225.471),
                    _ => by_frame(sc, x * 749.269 + 6138.94, x * 1195.456 + 7797.047),
                }
            }
            Command::Volume { .. } => by_frame(sc, 1280.3, 1737.8),
            Command::VolumeRamp { .. } => by_frame(sc, 1403.9, 1884.3),
            Command::Biquad { .. } => by_frame(sc, 4813.2, 6915.4),
            Command::Mix { .. } => by_frame(sc, 1342.2, 1833.2),
            Command::MixRamp { .. } => by_frame(sc, 1859.0, 2286.1),
            Command::MixRampGrouped(g) => (sc as f32 * 7.245 * Self::grouped_count(g)) as u32,
            Command::DepopPrepare { .. } => by_frame(sc, 306.62, 293.22),
            Command::DepopForMixBuffers { .. } => by_frame(sc, 762.96, 726.96),
            Command::Delay(cmd) => self.effect(&V2_DELAY, cmd.enabled, cmd.params.channel_count),
            Command::Reverb { cmd, .. } => self.effect(&V2_REVERB, cmd.enabled, cmd.params.channel_count),
            Command::Upsample { .. } => by_frame(sc, 292_000.0, 0.0),
            Command::DownMix6chTo2ch { .. } => by_frame(sc, 10_009.0, 14_577.0),
            Command::Aux(a) => {
                if a.enabled {
                    by_frame(sc, 489.163, 485.562)
                } else {
                    by_frame(sc, 7177.936, 9499.822)
                }
            }
            Command::DeviceSink { inputs, .. } => match inputs.len() {
                2 => by_frame(sc, 9261.545, 9336.054),
                6 => by_frame(sc, 9336.054, 9566.728),
                n => {
                    tracing::error!(inputs = n, "no device sink estimate for input count");
                    0
                }
            },
            Command::CircularBufferSink { inputs, .. } => {
                let n = inputs.len() as f32;
                by_frame(sc, n * 853.629 + 1284.517, n * 1726.021 + 1369.683)
            }
            Command::Performance { .. } => by_frame(sc, 489.35, 491.18),
            Command::ClearMixBuffer => {
                let n = self.buffer_count as f32;
                by_frame(sc, n * 260.4 + 139.65, n * 668.85 + 193.2)
            }
            Command::CopyMixBuffer { .. } => by_frame(sc, 836.32, 1000.9),
            _ => 0,
        }
    }

    fn estimate_v3(&self, command: &Command) -> u32 {
        let sc = self.sample_count;
        let later = self.version >= 4;
        match command {
            Command::DataSource(ds) => {
                let table = match ds.format {
                    SampleFormat::PcmFloat => &V3_PCM_FLOAT,
                    SampleFormat::Adpcm => &V3_ADPCM,
                    _ => &V3_PCM16,
                };
                let quality = match ds.src_quality {
                    SrcQuality::Medium => 0,
                    SrcQuality::High => 1,
                    SrcQuality::Low => 2,
                };
                let (slope, intercept) = table[self.frame()][quality];
                let x = ds.sample_rate as f32 / 200.0 / sc as f32 * ds.pitch - 1.0;
                (x * slope + intercept).max(0.0) as u32
            }
            Command::Volume { .. } => by_frame(sc, 1311.1, 1713.6),
            Command::VolumeRamp { .. } => by_frame(sc, 1425.3, 1700.0),
            Command::Biquad { .. } => by_frame(sc, 4173.2, 5585.1),
            Command::Mix { .. } => by_frame(sc, 1402.8, 1853.2),
            Command::MixRamp { .. } => by_frame(sc, 1968.7, 2459.4),
            Command::MixRampGrouped(g) => {
                let per = if sc == 160 { 6.708 } else { 6.443 };
                (sc as f32 * per * Self::grouped_count(g)) as u32
            }
            Command::DepopForMixBuffers { .. } => by_frame(sc, 739.64, 910.97),
            Command::Delay(cmd) => self.effect(&V3_DELAY, cmd.enabled, cmd.params.channel_count),
            Command::Reverb { cmd, .. } => self.effect(&V3_REVERB, cmd.enabled, cmd.params.channel_count),
            Command::LightLimiter { cmd, with_statistics } => {
                let channels = cmd.params.channel_count;
                match (cmd.enabled && *with_statistics, channel_index(channels)) {
                    (true, Some(c)) => V3_LIMITER_STATISTICS[self.frame()][c] as u32,
                    _ => self.effect(&V3_LIMITER, cmd.enabled, channels),
                }
            }
            Command::Upsample { .. } => by_frame(sc, 312_990.0, 0.0),
            Command::DownMix6chTo2ch { .. } => by_frame(sc, 9949.7, 14_679.0),
            Command::Aux(a) => {
                if a.enabled {
                    by_frame(sc, 7182.136, 9435.961)
                } else {
                    by_frame(sc, 472.111, 462.619)
                }
            }
            Command::DeviceSink { inputs, .. } => match inputs.len() {
                2 => by_frame(sc, 8979.956, 9221.907),
                6 => by_frame(sc, 9177.903, 9725.897),
                n => {
                    tracing::error!(inputs = n, "no device sink estimate for input count");
                    0
                }
            },
            Command::CircularBufferSink { inputs, .. } => {
                let n = inputs.len() as f32;
                by_frame(sc, n * 531.069, n * 770.257)
            }
            Command::Performance { .. } => by_frame(sc, 498.17, 489.42),
            Command::ClearMixBuffer => {
                let n = self.buffer_count.saturating_sub(1) as f32;
                by_frame(sc, n * 266.645, n * 440.681)
            }
            Command::CopyMixBuffer { .. } => by_frame(sc, 842.59, 986.72),
            Command::MultiTapBiquad { .. } if later => by_frame(sc, 7424.5, 9730.4),
            Command::Capture(a) if later => {
                if a.enabled {
                    by_frame(sc, 426.982, 435.204)
                } else {
                    by_frame(sc, 4261.005, 5858.265)
                }
            }
            _ => 0,
        }
    }
}
