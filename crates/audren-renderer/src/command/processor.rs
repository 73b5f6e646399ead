//! Executes command lists against a session's render resources.

use std::time::{Duration, Instant};

use audren_core::biquad::{process_fixed, process_float, process_float_cascade};
use audren_core::{GuestMemory, MemoryAccessError};
use audren_effects::{EffectState, EffectType};

use super::kernels;
use super::{Command, CommandList, CommandListHeader, PerformanceState};
use crate::resources::{RenderResources, UpsamplerSlot};

/// Outcome of one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessResult {
    /// Commands that ran.
    pub executed: u32,
    /// Commands that failed verification or faulted.
    pub skipped: u32,
    /// Commands dropped after the budget ran out.
    pub dropped: u32,
    /// Commands disabled at generation.
    pub disabled: u32,
    /// Estimated cost of the commands that ran.
    pub estimated_time: u64,
    /// Wall time spent.
    pub elapsed: Duration,
    /// The budget ran out before the end of the list.
    pub time_exceeded: bool,
}

/// Runs lists in order: verify, then process.
#[derive(Debug, Clone, Copy)]
pub struct CommandListProcessor {
    enforce_time_limit: bool,
}

impl Default for CommandListProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandListProcessor {
    /// A processor that enforces each list's time limit.
    pub fn new() -> Self {
        Self {
            enforce_time_limit: true,
        }
    }

    /// Enables or disables the time limit.
    pub fn with_time_limit(mut self, enforce: bool) -> Self {
        self.enforce_time_limit = enforce;
        self
    }

    /// Runs `list`, charging each command's estimate against the header's
    /// time limit. Once a command would overrun it, that command and every
    /// enabled command after it are dropped.
    pub fn process(&self, list: &CommandList, resources: &mut RenderResources) -> ProcessResult {
        let start = Instant::now();
        let mut result = ProcessResult::default();
        resources.device_output.channel_count = 0;
        resources.device_output.samples.clear();

        for (index, entry) in list.commands.iter().enumerate() {
            if !entry.enabled {
                result.disabled += 1;
                continue;
            }
            let charged = result.estimated_time + u64::from(entry.estimated_time);
            if self.enforce_time_limit && charged > u64::from(list.header.time_limit) {
                result.dropped = list.commands[index..].iter().filter(|e| e.enabled).count() as u32;
                result.time_exceeded = true;
                tracing::warn!(
                    index,
                    dropped = result.dropped,
                    limit = list.header.time_limit,
                    "command list over budget"
                );
                break;
            }
            if !entry.command.verify(resources) {
                tracing::warn!(index, kind = ?entry.command.kind(), node = entry.node_id, "command failed verification, skipped");
                result.skipped += 1;
                continue;
            }
            match execute(&entry.command, &list.header, resources, start) {
                Ok(()) => {
                    result.executed += 1;
                    result.estimated_time = charged;
                }
                Err(e) => {
                    tracing::warn!(index, kind = ?entry.command.kind(), error = %e, "command faulted, skipped");
                    result.skipped += 1;
                }
            }
        }

        result.elapsed = start.elapsed();
        if let Some(performance) = resources.performance.as_mut() {
            performance.set_frame_result(
                micros(result.elapsed),
                list.header.voices_dropped,
                result.dropped,
                result.time_exceeded,
            );
        }
        resources.last_result = Some(result);
        result
    }
}

fn micros(d: Duration) -> u32 {
    u32::try_from(d.as_micros()).unwrap_or(u32::MAX)
}

/// The effect state for `index`, reset first if it belongs to another type.
fn effect_state(states: &mut [EffectState], index: usize, ty: EffectType) -> Option<&mut EffectState> {
    let state = states.get_mut(index)?;
    if !state.matches(ty) {
        *state = EffectState::for_type(ty);
    }
    Some(state)
}

fn execute(
    command: &Command,
    header: &CommandListHeader,
    resources: &mut RenderResources,
    start: Instant,
) -> Result<(), MemoryAccessError> {
    let RenderResources {
        arena,
        depop,
        voice_states,
        effect_states,
        upsamplers,
        memory,
        device_output,
        performance,
        ..
    } = resources;
    let memory: &dyn GuestMemory = memory.as_ref();

    match command {
        Command::ClearMixBuffer => arena.clear_all(),
        Command::DepopPrepare { state, offset, count } => {
            let previous = &mut voice_states[*state].previous_samples[..*count];
            kernels::depop_prepare(previous, &mut depop[*offset..offset + count]);
        }
        Command::DepopForMixBuffers { offset, count, decay } => {
            kernels::depop_for_mix_buffers(arena, depop, *offset, *count, *decay);
        }
        Command::Volume {
            input,
            output,
            volume,
            precision,
        } => kernels::volume(arena, *input, *output, *volume, *precision),
        Command::VolumeRamp {
            input,
            output,
            prev_volume,
            volume,
            precision,
        } => kernels::volume_ramp(arena, *input, *output, *prev_volume, *volume, *precision),
        Command::Mix {
            input,
            output,
            volume,
            precision,
        } => kernels::mix(arena, *input, *output, *volume, *precision),
        Command::MixRamp {
            input,
            output,
            prev_volume,
            volume,
            precision,
            state,
        } => {
            let last = kernels::mix_ramp(arena, *input, *output, *prev_volume, *volume, *precision);
            if let Some((state, slot)) = state {
                voice_states[*state].previous_samples[*slot] = last;
            }
        }
        Command::MixRampGrouped(g) => {
            let previous = &mut voice_states[g.state].previous_samples;
            for i in 0..g.count {
                if g.prev_volumes[i] == 0.0 && g.volumes[i] == 0.0 {
                    previous[i] = 0;
                    continue;
                }
                previous[i] = kernels::mix_ramp(
                    arena,
                    g.input,
                    g.output_offset + i,
                    g.prev_volumes[i],
                    g.volumes[i],
                    g.precision,
                );
            }
        }
        Command::CopyMixBuffer { input, output } => arena.copy(*input, *output),
        Command::DataSource(ds) => {
            ds.process(&mut voice_states[ds.state], arena.get_mut(ds.output), memory, header.sample_rate);
        }
        Command::Biquad {
            input,
            output,
            coefficients,
            state,
            slot,
            needs_init,
            float,
        } => {
            arena.copy(*input, *output);
            let filter = &mut voice_states[*state].biquad_states[*slot];
            if *needs_init {
                filter.clear();
            }
            if *float {
                process_float(arena.get_mut(*output), coefficients, filter);
            } else {
                process_fixed(arena.get_mut(*output), coefficients, filter);
            }
        }
        Command::MultiTapBiquad {
            input,
            output,
            coefficients,
            state,
            needs_init,
        } => {
            arena.copy(*input, *output);
            let filters = &mut voice_states[*state].biquad_states;
            for (filter, &init) in filters.iter_mut().zip(needs_init) {
                if init {
                    filter.clear();
                }
            }
            process_float_cascade(arena.get_mut(*output), coefficients, filters);
        }
        Command::BiquadFilterEffect { cmd, needs_init, float } => {
            if let Some(EffectState::BiquadFilter(s)) = effect_state(effect_states, cmd.effect, EffectType::BiquadFilter) {
                s.apply(&cmd.params, arena, &cmd.inputs, &cmd.outputs, *needs_init, *float);
            }
        }
        Command::Delay(cmd) => {
            if let Some(EffectState::Delay(s)) = effect_state(effect_states, cmd.effect, EffectType::Delay) {
                s.apply(&cmd.params, cmd.enabled, arena, &cmd.inputs, &cmd.outputs);
            }
        }
        Command::Reverb { cmd, long_pre_delay } => {
            if let Some(EffectState::Reverb(s)) = effect_state(effect_states, cmd.effect, EffectType::Reverb) {
                s.apply(&cmd.params, cmd.enabled, *long_pre_delay, arena, &cmd.inputs, &cmd.outputs);
            }
        }
        Command::LightLimiter { cmd, with_statistics } => {
            if let Some(EffectState::LightLimiter(s)) = effect_state(effect_states, cmd.effect, EffectType::LightLimiter)
            {
                s.apply(&cmd.params, cmd.enabled, arena, &cmd.inputs, &cmd.outputs, *with_statistics);
            }
        }
        Command::Aux(a) => {
            if a.enabled {
                a.send.write(memory, arena.get(a.input), a.offset, a.update_count)?;
                if let Some(ret) = a.ret {
                    let read = ret.read(memory, arena.get_mut(a.output), a.offset, a.update_count)?;
                    if read == 0 {
                        arena.clear(a.output);
                    }
                }
            } else {
                a.send.reset(memory)?;
                if let Some(ret) = a.ret {
                    ret.reset(memory)?;
                }
                arena.copy(a.input, a.output);
            }
        }
        Command::Capture(a) => {
            if a.enabled {
                a.send.write(memory, arena.get(a.input), a.offset, a.update_count)?;
            } else {
                a.send.reset(memory)?;
            }
        }
        Command::Upsample {
            slot,
            inputs,
            source_sample_count,
        } => {
            let UpsamplerSlot { states, output } = &mut upsamplers[*slot];
            for (channel, (&input, state)) in inputs.iter().zip(states.iter_mut()).enumerate() {
                state.process(output.get_mut(channel), arena.get(input), *source_sample_count);
            }
        }
        Command::DownMix6chTo2ch {
            inputs,
            outputs,
            coefficients,
        } => kernels::downmix_6ch_to_2ch(arena, inputs, outputs, coefficients),
        Command::DeviceSink { inputs, upsampler } => {
            let channels: Vec<&[i32]> = match upsampler {
                Some(slot) => (0..inputs.len()).map(|ch| upsamplers[*slot].output.get(ch)).collect(),
                None => inputs.iter().map(|&i| arena.get(i)).collect(),
            };
            kernels::interleave(&channels, &mut device_output.samples);
            device_output.channel_count = channels.len();
        }
        Command::CircularBufferSink {
            inputs,
            address,
            size,
            pos,
        } => {
            kernels::write_circular(memory, arena, inputs, *address, *size, *pos)?;
        }
        Command::Performance { state, slot } => {
            if let Some(performance) = performance.as_mut() {
                let now = micros(start.elapsed());
                match state {
                    PerformanceState::Start => performance.record_start(*slot, now),
                    PerformanceState::Stop => performance.record_stop(*slot, now),
                }
            }
        }
    }
    Ok(())
}
