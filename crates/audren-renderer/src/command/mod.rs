//! Command lists: the per-tick program the coprocessor executes.
//!
//! - [`Command`] - One operation on the mix buffer arena or guest memory
//! - [`CommandList`] - Header plus commands in execution order
//! - [`generator`] - Builds a list from the session's contexts
//! - [`estimator`] - Predicts the cost of each command
//! - [`processor`] - Executes a list against [`RenderResources`]
//!
//! Commands carry arena indices and host addresses only, never references
//! into the session contexts, so a list can run on another thread while the
//! client prepares the next update.

pub mod data_source;
pub mod estimator;
pub mod generator;
pub mod kernels;
pub mod processor;

use std::fmt;

use audren_core::{BiquadCoefficients, HostAddr};
use audren_effects::{AuxRing, BiquadFilterParams, DelayParams, LightLimiterParams, ReverbParams};

pub use data_source::{DataSourceCommand, WaveBufferSource};
pub use estimator::Estimator;
pub use generator::CommandGenerator;
pub use processor::{CommandListProcessor, ProcessResult};

use crate::params::MAX_MIX_BUFFERS;
use crate::performance::PerformanceSlot;
use crate::resources::RenderResources;
use crate::wire::SampleFormat;

/// Kind of a command, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    /// Invalid or unknown.
    Invalid,
    /// PCM16 data source.
    DataSourcePcmInt16,
    /// Float data source.
    DataSourcePcmFloat,
    /// DSP-ADPCM data source.
    DataSourceAdpcm,
    /// Volume.
    Volume,
    /// Ramped volume.
    VolumeRamp,
    /// Voice biquad.
    Biquad,
    /// Two voice biquads in one pass.
    MultiTapBiquad,
    /// Mix.
    Mix,
    /// Ramped mix.
    MixRamp,
    /// Ramped mix into many buffers.
    MixRampGrouped,
    /// Depop accumulation.
    DepopPrepare,
    /// Depop fade-out.
    DepopForMixBuffers,
    /// Delay effect.
    Delay,
    /// Upsample to 48 kHz.
    Upsample,
    /// 5.1 to stereo.
    DownMix6chTo2ch,
    /// Aux send/return.
    Aux,
    /// Device sink.
    DeviceSink,
    /// Circular buffer sink.
    CircularBufferSink,
    /// Reverb effect.
    Reverb,
    /// Biquad filter effect.
    BiquadFilter,
    /// Light limiter without statistics.
    LightLimiterVersion1,
    /// Light limiter with statistics.
    LightLimiterVersion2,
    /// Capture.
    Capture,
    /// Zero the arena.
    ClearMixBuffer,
    /// Buffer copy.
    CopyMixBuffer,
    /// Performance marker.
    Performance,
}

/// Start or end marker of a performance slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceState {
    /// Stamp the start time.
    Start,
    /// Stamp the elapsed time.
    Stop,
}

/// Parameters shared by the channel-based effect commands.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectCommand<P> {
    /// Effect slot whose state the command advances.
    pub effect: usize,
    /// Absolute input buffers.
    pub inputs: Vec<usize>,
    /// Absolute output buffers.
    pub outputs: Vec<usize>,
    /// Process rather than bypass.
    pub enabled: bool,
    /// Parameters as of generation.
    pub params: P,
}

/// One aux or capture channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxCommand {
    /// Arena buffer sent.
    pub input: usize,
    /// Arena buffer receiving the return.
    pub output: usize,
    /// Send ring.
    pub send: AuxRing,
    /// Return ring; none for capture.
    pub ret: Option<AuxRing>,
    /// Samples from the ring offsets where this channel starts.
    pub offset: u32,
    /// Samples the ring offsets advance by after this channel.
    pub update_count: u32,
    /// Exchange samples rather than reset.
    pub enabled: bool,
}

/// Ramped mix of one voice channel into many buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct MixRampGroupedCommand {
    /// Source buffer.
    pub input: usize,
    /// First destination buffer.
    pub output_offset: usize,
    /// Destination buffers.
    pub count: usize,
    /// Volumes at the start of the tick.
    pub prev_volumes: [f32; MAX_MIX_BUFFERS],
    /// Volumes at the end of the tick.
    pub volumes: [f32; MAX_MIX_BUFFERS],
    /// Fixed-point bits of the volumes.
    pub precision: u32,
    /// Voice state receiving the last contribution per destination.
    pub state: usize,
}

impl MixRampGroupedCommand {
    /// Destinations that receive a non-zero contribution.
    pub fn active_count(&self) -> usize {
        (0..self.count.min(MAX_MIX_BUFFERS))
            .filter(|&i| self.prev_volumes[i] != 0.0 || self.volumes[i] != 0.0)
            .count()
    }
}

/// One command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Zero every arena buffer.
    ClearMixBuffer,
    /// Move a voice channel's leftover samples into the depop accumulators
    /// of `count` buffers from `offset`.
    DepopPrepare {
        /// Voice state.
        state: usize,
        /// First destination buffer.
        offset: usize,
        /// Destination buffers.
        count: usize,
    },
    /// Fade the depop accumulators into their buffers.
    DepopForMixBuffers {
        /// First buffer.
        offset: usize,
        /// Buffers.
        count: usize,
        /// Q15 decay per sample.
        decay: i32,
    },
    /// `output = input * volume`.
    Volume {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Linear volume.
        volume: f32,
        /// Fixed-point bits.
        precision: u32,
    },
    /// Ramped [`Command::Volume`].
    VolumeRamp {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Volume at the first sample.
        prev_volume: f32,
        /// Volume approached by the last sample.
        volume: f32,
        /// Fixed-point bits.
        precision: u32,
    },
    /// `output += input * volume`.
    Mix {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Linear volume.
        volume: f32,
        /// Fixed-point bits.
        precision: u32,
    },
    /// Ramped [`Command::Mix`]; the last contribution is kept for depop.
    MixRamp {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Volume at the first sample.
        prev_volume: f32,
        /// Volume approached by the last sample.
        volume: f32,
        /// Fixed-point bits.
        precision: u32,
        /// Voice state and depop slot receiving the last contribution.
        state: Option<(usize, usize)>,
    },
    /// Ramped mix into a run of buffers.
    MixRampGrouped(Box<MixRampGroupedCommand>),
    /// Copy a buffer.
    CopyMixBuffer {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
    },
    /// Decode and resample one voice channel.
    DataSource(Box<DataSourceCommand>),
    /// Voice biquad.
    Biquad {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Q14 coefficients.
        coefficients: BiquadCoefficients,
        /// Voice state.
        state: usize,
        /// Filter slot in the voice state.
        slot: usize,
        /// Clear the history first.
        needs_init: bool,
        /// Use the float kernel.
        float: bool,
    },
    /// Both voice biquads in one pass, float kernel.
    MultiTapBiquad {
        /// Source.
        input: usize,
        /// Destination.
        output: usize,
        /// Q14 coefficients of both filters.
        coefficients: [BiquadCoefficients; 2],
        /// Voice state.
        state: usize,
        /// Clear each filter's history first.
        needs_init: [bool; 2],
    },
    /// Biquad filter effect.
    BiquadFilterEffect {
        /// Routing and parameters.
        cmd: Box<EffectCommand<BiquadFilterParams>>,
        /// Clear the history first.
        needs_init: bool,
        /// Use the float kernel.
        float: bool,
    },
    /// Delay effect.
    Delay(Box<EffectCommand<DelayParams>>),
    /// Reverb effect.
    Reverb {
        /// Routing and parameters.
        cmd: Box<EffectCommand<ReverbParams>>,
        /// Allow the long pre-delay line.
        long_pre_delay: bool,
    },
    /// Light limiter effect.
    LightLimiter {
        /// Routing and parameters.
        cmd: Box<EffectCommand<LightLimiterParams>>,
        /// Collect statistics.
        with_statistics: bool,
    },
    /// Aux send/return of one channel.
    Aux(Box<AuxCommand>),
    /// Capture of one channel.
    Capture(Box<AuxCommand>),
    /// Upsample sink inputs into an upsampler slot.
    Upsample {
        /// Upsampler slot.
        slot: usize,
        /// Source buffers.
        inputs: Vec<usize>,
        /// Samples per source frame.
        source_sample_count: u32,
    },
    /// Fold 5.1 into stereo.
    DownMix6chTo2ch {
        /// FL, FR, C, LFE, BL, BR sources.
        inputs: [usize; 6],
        /// Destinations in the same order.
        outputs: [usize; 6],
        /// Q16 front, center, LFE, back weights.
        coefficients: [i32; 4],
    },
    /// Hand PCM16 to the host device.
    DeviceSink {
        /// Source buffers, one per channel.
        inputs: Vec<usize>,
        /// Read from this upsampler slot instead of the arena.
        upsampler: Option<usize>,
    },
    /// Write PCM16 into a guest ring.
    CircularBufferSink {
        /// Source buffers, one per channel.
        inputs: Vec<usize>,
        /// Ring address.
        address: HostAddr,
        /// Ring bytes.
        size: u32,
        /// Byte offset of the first write.
        pos: u32,
    },
    /// Performance marker.
    Performance {
        /// Start or stop.
        state: PerformanceState,
        /// Slot stamped.
        slot: PerformanceSlot,
    },
}

impl Command {
    /// Kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::ClearMixBuffer => CommandKind::ClearMixBuffer,
            Command::DepopPrepare { .. } => CommandKind::DepopPrepare,
            Command::DepopForMixBuffers { .. } => CommandKind::DepopForMixBuffers,
            Command::Volume { .. } => CommandKind::Volume,
            Command::VolumeRamp { .. } => CommandKind::VolumeRamp,
            Command::Mix { .. } => CommandKind::Mix,
            Command::MixRamp { .. } => CommandKind::MixRamp,
            Command::MixRampGrouped(_) => CommandKind::MixRampGrouped,
            Command::CopyMixBuffer { .. } => CommandKind::CopyMixBuffer,
            Command::DataSource(ds) => match ds.format {
                SampleFormat::PcmFloat => CommandKind::DataSourcePcmFloat,
                SampleFormat::Adpcm => CommandKind::DataSourceAdpcm,
                _ => CommandKind::DataSourcePcmInt16,
            },
            Command::Biquad { .. } => CommandKind::Biquad,
            Command::MultiTapBiquad { .. } => CommandKind::MultiTapBiquad,
            Command::BiquadFilterEffect { .. } => CommandKind::BiquadFilter,
            Command::Delay(_) => CommandKind::Delay,
            Command::Reverb { .. } => CommandKind::Reverb,
            Command::LightLimiter { with_statistics: false, .. } => CommandKind::LightLimiterVersion1,
            Command::LightLimiter { with_statistics: true, .. } => CommandKind::LightLimiterVersion2,
            Command::Aux(_) => CommandKind::Aux,
            Command::Capture(_) => CommandKind::Capture,
            Command::Upsample { .. } => CommandKind::Upsample,
            Command::DownMix6chTo2ch { .. } => CommandKind::DownMix6chTo2ch,
            Command::DeviceSink { .. } => CommandKind::DeviceSink,
            Command::CircularBufferSink { .. } => CommandKind::CircularBufferSink,
            Command::Performance { .. } => CommandKind::Performance,
        }
    }

    /// Arena buffers the command reads or writes.
    fn buffers(&self) -> Vec<usize> {
        match self {
            Command::ClearMixBuffer | Command::Performance { .. } => Vec::new(),
            Command::DepopPrepare { .. } => Vec::new(),
            Command::DepopForMixBuffers { offset, count, .. } => (*offset..offset + count).collect(),
            Command::Volume { input, output, .. }
            | Command::VolumeRamp { input, output, .. }
            | Command::Mix { input, output, .. }
            | Command::MixRamp { input, output, .. }
            | Command::CopyMixBuffer { input, output }
            | Command::Biquad { input, output, .. }
            | Command::MultiTapBiquad { input, output, .. } => vec![*input, *output],
            Command::MixRampGrouped(g) => {
                let mut v: Vec<usize> = (g.output_offset..g.output_offset + g.count).collect();
                v.push(g.input);
                v
            }
            Command::DataSource(ds) => vec![ds.output],
            Command::BiquadFilterEffect { cmd, .. } => [&cmd.inputs[..], &cmd.outputs[..]].concat(),
            Command::Delay(cmd) => [&cmd.inputs[..], &cmd.outputs[..]].concat(),
            Command::Reverb { cmd, .. } => [&cmd.inputs[..], &cmd.outputs[..]].concat(),
            Command::LightLimiter { cmd, .. } => [&cmd.inputs[..], &cmd.outputs[..]].concat(),
            Command::Aux(a) | Command::Capture(a) => vec![a.input, a.output],
            Command::Upsample { inputs, .. } => inputs.clone(),
            Command::DownMix6chTo2ch { inputs, outputs, .. } => [&inputs[..], &outputs[..]].concat(),
            Command::DeviceSink { inputs, upsampler, .. } => {
                if upsampler.is_some() {
                    Vec::new()
                } else {
                    inputs.clone()
                }
            }
            Command::CircularBufferSink { inputs, .. } => inputs.clone(),
        }
    }

    /// True if every index and address the command uses is valid for
    /// `resources`. Invalid commands are skipped rather than executed.
    pub fn verify(&self, resources: &RenderResources) -> bool {
        if !self.buffers().iter().all(|&b| resources.arena.contains(b)) {
            return false;
        }
        let state_ok = |s: usize| s < resources.voice_states.len();
        match self {
            Command::DepopPrepare { state, offset, count } => {
                state_ok(*state) && offset + count <= resources.depop.len() && *count <= MAX_MIX_BUFFERS
            }
            Command::DepopForMixBuffers { offset, count, .. } => offset + count <= resources.depop.len(),
            Command::MixRamp { state, .. } => {
                state.is_none_or(|(s, slot)| state_ok(s) && slot < MAX_MIX_BUFFERS)
            }
            Command::MixRampGrouped(g) => state_ok(g.state) && g.count <= MAX_MIX_BUFFERS,
            Command::DataSource(ds) => state_ok(ds.state) && ds.channel < ds.channel_count,
            Command::Biquad { state, slot, .. } => state_ok(*state) && *slot < 2,
            Command::MultiTapBiquad { state, .. } => state_ok(*state),
            Command::BiquadFilterEffect { cmd, .. } => cmd.effect < resources.effect_states.len(),
            Command::Delay(cmd) => cmd.effect < resources.effect_states.len(),
            Command::Reverb { cmd, .. } => cmd.effect < resources.effect_states.len(),
            Command::LightLimiter { cmd, .. } => cmd.effect < resources.effect_states.len(),
            Command::Aux(a) => !a.send.info.is_null() && a.ret.is_some_and(|r| !r.info.is_null()),
            Command::Capture(a) => !a.send.info.is_null(),
            Command::Upsample { slot, inputs, .. } => {
                resources.upsamplers.get(*slot).is_some_and(|u| inputs.len() <= u.states.len())
            }
            Command::DeviceSink { inputs, upsampler, .. } => {
                upsampler.is_none_or(|s| resources.upsamplers.get(s).is_some_and(|u| inputs.len() <= u.states.len()))
            }
            Command::CircularBufferSink { address, size, .. } => !address.is_null() && *size > 0,
            Command::Performance { slot, .. } => {
                resources.performance.as_ref().is_some_and(|p| p.contains(*slot))
            }
            _ => true,
        }
    }

    /// Writes a one-line description.
    pub fn dump(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Command::ClearMixBuffer => write!(f, "ClearMixBuffer"),
            Command::DepopPrepare { state, offset, count } => {
                write!(f, "DepopPrepare state {state} buffers {offset}..{}", offset + count)
            }
            Command::DepopForMixBuffers { offset, count, decay } => {
                write!(f, "DepopForMixBuffers buffers {offset}..{} decay {decay:#x}", offset + count)
            }
            Command::Volume { input, output, volume, .. } => write!(f, "Volume {input} -> {output} x {volume}"),
            Command::VolumeRamp {
                input,
                output,
                prev_volume,
                volume,
                ..
            } => write!(f, "VolumeRamp {input} -> {output} x {prev_volume}..{volume}"),
            Command::Mix { input, output, volume, .. } => write!(f, "Mix {input} -> {output} x {volume}"),
            Command::MixRamp {
                input,
                output,
                prev_volume,
                volume,
                ..
            } => write!(f, "MixRamp {input} -> {output} x {prev_volume}..{volume}"),
            Command::MixRampGrouped(g) => write!(
                f,
                "MixRampGrouped {} -> {}..{} active {}",
                g.input,
                g.output_offset,
                g.output_offset + g.count,
                g.active_count()
            ),
            Command::CopyMixBuffer { input, output } => write!(f, "CopyMixBuffer {input} -> {output}"),
            Command::DataSource(ds) => write!(
                f,
                "DataSource {:?} state {} ch {}/{} -> {} rate {} pitch {}",
                ds.format, ds.state, ds.channel, ds.channel_count, ds.output, ds.sample_rate, ds.pitch
            ),
            Command::Biquad { input, output, slot, .. } => write!(f, "Biquad[{slot}] {input} -> {output}"),
            Command::MultiTapBiquad { input, output, .. } => write!(f, "MultiTapBiquad {input} -> {output}"),
            Command::BiquadFilterEffect { cmd, .. } => dump_effect(f, "BiquadFilter", cmd),
            Command::Delay(cmd) => dump_effect(f, "Delay", cmd),
            Command::Reverb { cmd, .. } => dump_effect(f, "Reverb", cmd),
            Command::LightLimiter { cmd, .. } => dump_effect(f, "LightLimiter", cmd),
            Command::Aux(a) => write!(
                f,
                "Aux {} -> {} offset {} update {} enabled {}",
                a.input, a.output, a.offset, a.update_count, a.enabled
            ),
            Command::Capture(a) => write!(f, "Capture {} offset {} update {}", a.input, a.offset, a.update_count),
            Command::Upsample { slot, inputs, .. } => write!(f, "Upsample {inputs:?} -> slot {slot}"),
            Command::DownMix6chTo2ch { inputs, .. } => write!(f, "DownMix6chTo2ch {inputs:?}"),
            Command::DeviceSink { inputs, upsampler } => write!(f, "DeviceSink {inputs:?} upsampler {upsampler:?}"),
            Command::CircularBufferSink { inputs, address, size, pos } => {
                write!(f, "CircularBufferSink {inputs:?} -> {address} size {size:#x} pos {pos:#x}")
            }
            Command::Performance { state, slot } => write!(f, "Performance {state:?} {slot:?}"),
        }
    }
}

fn dump_effect<P>(f: &mut impl fmt::Write, name: &str, cmd: &EffectCommand<P>) -> fmt::Result {
    write!(
        f,
        "{name} effect {} {:?} -> {:?} enabled {}",
        cmd.effect, cmd.inputs, cmd.outputs, cmd.enabled
    )
}

/// A command with its scheduling metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEntry {
    /// Node the command belongs to.
    pub node_id: u32,
    /// Voice slot the command renders, for voice dropping.
    pub voice: Option<usize>,
    /// Disabled commands are skipped.
    pub enabled: bool,
    /// Predicted cost.
    pub estimated_time: u32,
    /// The command itself.
    pub command: Command,
}

/// List-wide parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandListHeader {
    /// Arena buffers.
    pub buffer_count: usize,
    /// Samples per buffer.
    pub sample_count: usize,
    /// Session rate in Hz.
    pub sample_rate: u32,
    /// Estimated cost the processor may spend.
    pub time_limit: u32,
    /// Voices the generator dropped.
    pub voices_dropped: u32,
}

/// A generated command list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandList {
    /// List-wide parameters.
    pub header: CommandListHeader,
    /// Commands in execution order.
    pub commands: Vec<CommandEntry>,
}

impl CommandList {
    /// Sum of the estimates of the enabled commands.
    pub fn estimated_time(&self) -> u64 {
        self.commands
            .iter()
            .filter(|e| e.enabled)
            .map(|e| u64::from(e.estimated_time))
            .sum()
    }

    /// Writes one line per command.
    pub fn dump(&self, f: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            f,
            "# {} commands, {} buffers x {} samples @ {} Hz, limit {}",
            self.commands.len(),
            self.header.buffer_count,
            self.header.sample_count,
            self.header.sample_rate,
            self.header.time_limit
        )?;
        for (i, entry) in self.commands.iter().enumerate() {
            write!(
                f,
                "{i:4} node {:#010x} {} est {:6} ",
                entry.node_id,
                if entry.enabled { "on " } else { "off" },
                entry.estimated_time
            )?;
            entry.command.dump(f)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: Command, enabled: bool, estimate: u32) -> CommandEntry {
        CommandEntry {
            node_id: 1,
            voice: None,
            enabled,
            estimated_time: estimate,
            command,
        }
    }

    #[test]
    fn estimate_ignores_disabled() {
        let list = CommandList {
            header: CommandListHeader::default(),
            commands: vec![
                entry(Command::ClearMixBuffer, true, 10),
                entry(Command::CopyMixBuffer { input: 0, output: 1 }, false, 99),
            ],
        };
        assert_eq!(list.estimated_time(), 10);
    }

    #[test]
    fn dump_lists_every_command() {
        let list = CommandList {
            header: CommandListHeader::default(),
            commands: vec![
                entry(Command::ClearMixBuffer, true, 1),
                entry(
                    Command::Mix {
                        input: 2,
                        output: 0,
                        volume: 0.5,
                        precision: 15,
                    },
                    true,
                    2,
                ),
            ],
        };
        let mut out = String::new();
        list.dump(&mut out).unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("Mix 2 -> 0 x 0.5"));
    }

    #[test]
    fn grouped_counts_live_destinations() {
        let mut g = MixRampGroupedCommand {
            input: 0,
            output_offset: 0,
            count: 3,
            prev_volumes: [0.0; MAX_MIX_BUFFERS],
            volumes: [0.0; MAX_MIX_BUFFERS],
            precision: 15,
            state: 0,
        };
        g.volumes[0] = 1.0;
        g.prev_volumes[2] = 0.5;
        g.volumes[5] = 1.0;
        assert_eq!(g.active_count(), 2);
    }

    #[test]
    fn kinds_follow_payload() {
        let ll = Command::LightLimiter {
            cmd: Box::new(EffectCommand {
                effect: 0,
                inputs: vec![],
                outputs: vec![],
                enabled: true,
                params: LightLimiterParams::default(),
            }),
            with_statistics: true,
        };
        assert_eq!(ll.kind(), CommandKind::LightLimiterVersion2);
        assert_eq!(Command::ClearMixBuffer.kind(), CommandKind::ClearMixBuffer);
    }
}
