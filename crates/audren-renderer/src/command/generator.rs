//! Builds a tick's command list from the session contexts.
//!
//! Sections are emitted in a fixed order:
//!
//! 1. `ClearMixBuffer`
//! 2. voices, least important first
//! 3. sub-mixes, sources before destinations
//! 4. the final mix
//! 5. device sinks, then circular buffer sinks
//!
//! Every node is bracketed by performance markers when metrics are on, and
//! the node picked as detail target gets one more pair per step. When voice
//! dropping is enabled and the estimate overruns the budget, whole voices are
//! disabled from the front of the voice section.

use audren_core::{BehaviorInfo, Feature};
use audren_effects::{AuxParams, AuxRing, EffectParameters, EffectType, ParameterState};

use super::kernels::depop_decay;
use super::{
    AuxCommand, Command, CommandEntry, CommandList, CommandListHeader, DataSourceCommand, EffectCommand, Estimator,
    MixRampGroupedCommand, PerformanceState, WaveBufferSource,
};
use crate::effect::{EffectContext, EffectInfo};
use crate::memory_pool::PoolMapper;
use crate::mix::{MixContext, MixInfo};
use crate::params::{MAX_CHANNELS, MAX_MIX_BUFFERS, RendererParameters, TARGET_SAMPLE_RATE};
use crate::performance::{PerformanceEntryType, PerformanceManager, PerformanceSlot};
use crate::sink::SinkContext;
use crate::splitter::SplitterContext;
use crate::voice::{HIGHEST_VOICE_PRIORITY, VoiceChannelResource, VoiceContext, VoiceInfo, VoiceState};
use crate::wire::{SampleFormat, SinkSpecific, SinkType, UNUSED_MIX_ID, UNUSED_SPLITTER_ID};

/// Node id of commands that belong to no node.
pub const INVALID_NODE_ID: u32 = 0xF000_0000;

/// Voices above this many destination buffers use one grouped ramp.
const GROUPED_MIX_THRESHOLD: usize = 8;

/// Detail entry types, one per kind of step.
mod detail {
    pub const PCM_INT16: u8 = 1;
    pub const ADPCM: u8 = 2;
    pub const VOLUME_MIX: u8 = 3;
    pub const BIQUAD: u8 = 4;
    pub const MIX: u8 = 5;
    pub const DELAY: u8 = 6;
    pub const AUX: u8 = 7;
    pub const REVERB: u8 = 8;
    pub const PCM_FLOAT: u8 = 10;
    pub const LIGHT_LIMITER: u8 = 11;
    pub const CAPTURE: u8 = 12;
}

/// Per-session knobs that are not part of the client parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    /// Share of the coprocessor budget this session may use, in percent.
    pub render_time_limit_percent: u32,
    /// Drop voices when the estimate overruns the budget.
    pub voice_drop_enabled: bool,
    /// Weight applied to estimates when deciding what to drop.
    pub voice_drop_parameter: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            render_time_limit_percent: 100,
            voice_drop_enabled: false,
            voice_drop_parameter: 1.0,
        }
    }
}

/// Everything a generation pass reads or advances.
pub struct GenerationContext<'a> {
    /// Voice slots and channel resources.
    pub voices: &'a mut VoiceContext,
    /// Mixes, already sorted.
    pub mixes: &'a MixContext,
    /// Effect slots.
    pub effects: &'a mut EffectContext,
    /// Splitters.
    pub splitters: &'a mut SplitterContext,
    /// Sinks.
    pub sinks: &'a mut SinkContext,
    /// Pool mapper, for host addresses and use marks.
    pub mapper: &'a mut PoolMapper,
    /// Per-channel voice state.
    pub voice_states: &'a mut [VoiceState],
    /// Timing recorder, if metrics are on.
    pub performance: Option<&'a mut PerformanceManager>,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    id: u32,
    voice: Option<usize>,
}

impl Node {
    const NONE: Node = Node {
        id: INVALID_NODE_ID,
        voice: None,
    };

    fn mix(id: u32) -> Self {
        Self { id, voice: None }
    }
}

struct ListBuilder<'p> {
    estimator: Estimator,
    performance: Option<&'p mut PerformanceManager>,
    commands: Vec<CommandEntry>,
}

impl ListBuilder<'_> {
    fn push(&mut self, node: Node, enabled: bool, command: Command) {
        let estimated_time = self.estimator.estimate(&command);
        self.commands.push(CommandEntry {
            node_id: node.id,
            voice: node.voice,
            enabled,
            estimated_time,
            command,
        });
    }

    fn estimated_time(&self) -> u64 {
        self.commands
            .iter()
            .filter(|e| e.enabled)
            .map(|e| u64::from(e.estimated_time))
            .sum()
    }

    fn start(&mut self, node: Node, slot: Option<PerformanceSlot>) -> Option<PerformanceSlot> {
        let slot = slot?;
        self.push(
            node,
            true,
            Command::Performance {
                state: PerformanceState::Start,
                slot,
            },
        );
        Some(slot)
    }

    fn entry(&mut self, node: Node, entry_type: PerformanceEntryType) -> Option<PerformanceSlot> {
        let slot = self.performance.as_deref_mut()?.next_entry(entry_type, node.id);
        self.start(node, slot)
    }

    fn detail(&mut self, node: Node, entry_type: PerformanceEntryType, detail_type: u8) -> Option<PerformanceSlot> {
        let performance = self.performance.as_deref_mut()?;
        if !performance.is_detail_target(node.id) {
            return None;
        }
        let slot = performance.next_detail(detail_type, entry_type, node.id);
        self.start(node, slot)
    }

    fn stop(&mut self, node: Node, slot: Option<PerformanceSlot>) {
        if let Some(slot) = slot {
            self.push(
                node,
                true,
                Command::Performance {
                    state: PerformanceState::Stop,
                    slot,
                },
            );
        }
    }
}

/// `offset + relative`, or an index no arena contains.
fn absolute(offset: usize, relative: i8) -> usize {
    offset.checked_add_signed(isize::from(relative)).unwrap_or(usize::MAX)
}

fn routing(offset: usize, inputs: &[i8], outputs: &[i8], channels: usize) -> (Vec<usize>, Vec<usize>) {
    let n = channels.min(inputs.len()).min(outputs.len());
    (
        inputs[..n].iter().map(|&i| absolute(offset, i)).collect(),
        outputs[..n].iter().map(|&o| absolute(offset, o)).collect(),
    )
}

/// Six-channel layout of revisions before the channel mapping change:
/// center and LFE swapped.
fn use_old_channel_mapping(inputs: &mut [usize], outputs: &mut [usize]) {
    if inputs.len() == 6 && outputs.len() == 6 {
        inputs.swap(2, 3);
        outputs.swap(2, 3);
    }
}

fn data_source_detail(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::PcmInt16 => detail::PCM_INT16,
        SampleFormat::PcmFloat => detail::PCM_FLOAT,
        _ => detail::ADPCM,
    }
}

/// Turns session contexts into command lists.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    estimator: Estimator,
    sample_rate: u32,
    sample_count: u32,
    mix_buffer_count: usize,
    buffer_count: usize,
    precision: u32,
    time_limit: u32,
    voice_drop_parameter: Option<f32>,
    multi_tap_biquad: bool,
    float_biquad: bool,
    long_pre_delay: bool,
    biquad_clear_fixed: bool,
    effect_info_v2: bool,
    delay_mapping_changed: bool,
    reverb_mapping_changed: bool,
}

impl CommandGenerator {
    /// A generator for a session with `params` at the revision `behavior`
    /// reports.
    pub fn new(params: &RendererParameters, behavior: &BehaviorInfo, settings: GeneratorSettings) -> Self {
        let limit_percent = behavior.processing_time_limit_percent() as f32 / 100.0;
        let render_percent = settings.render_time_limit_percent as f32 / 100.0;
        Self {
            estimator: Estimator::for_behavior(behavior, params.sample_count, params.arena_buffer_count() as u32),
            sample_rate: params.sample_rate,
            sample_count: params.sample_count,
            mix_buffer_count: params.mix_buffer_count as usize,
            buffer_count: params.arena_buffer_count(),
            precision: behavior.mix_precision_bits(),
            time_limit: (limit_percent * 2_880_000.0 * render_percent) as u32,
            voice_drop_parameter: settings.voice_drop_enabled.then_some(settings.voice_drop_parameter),
            multi_tap_biquad: behavior.is_supported(Feature::MultiTapBiquadFilterProcessing),
            float_biquad: behavior.is_supported(Feature::BiquadFilterFloatProcessing),
            long_pre_delay: behavior.is_supported(Feature::LongSizePreDelay),
            biquad_clear_fixed: behavior.is_supported(Feature::BiquadFilterEffectStateClearBugFix),
            effect_info_v2: behavior.is_supported(Feature::EffectInfoVer2),
            delay_mapping_changed: behavior.is_supported(Feature::DelayChannelMappingChange),
            reverb_mapping_changed: behavior.is_supported(Feature::ReverbChannelMappingChange),
        }
    }

    /// Estimated cost the processor may spend on one list.
    pub fn time_limit(&self) -> u32 {
        self.time_limit
    }

    /// Cost table in use.
    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    /// Generates one tick's list, advancing voice, effect, splitter and sink
    /// state as the list consumes it.
    pub fn generate(&self, mut ctx: GenerationContext<'_>) -> CommandList {
        let mut b = ListBuilder {
            estimator: self.estimator,
            performance: ctx.performance.take(),
            commands: Vec::new(),
        };

        b.push(Node::NONE, true, Command::ClearMixBuffer);
        self.generate_voices(&mut b, &mut ctx);
        let voice_estimate = b.estimated_time();
        self.generate_sub_mixes(&mut b, &mut ctx);
        self.generate_final_mix(&mut b, &mut ctx);
        self.generate_sinks(&mut b, &mut ctx);

        let total_estimate = b.estimated_time();
        let mut commands = b.commands;
        let mut voices_dropped = 0;
        if let Some(weight) = self.voice_drop_parameter {
            let start = weight * voice_estimate as f32;
            let end = weight * total_estimate as f32;
            let limit = (self.time_limit as f32 + start - end).max(0.0);
            voices_dropped = drop_voices(&mut commands, ctx.voices, start, limit, weight);
            if voices_dropped > 0 {
                tracing::debug!(voices_dropped, estimate = total_estimate, limit = self.time_limit, "dropped voices over budget");
            }
        }

        CommandList {
            header: CommandListHeader {
                buffer_count: self.buffer_count,
                sample_count: self.sample_count as usize,
                sample_rate: self.sample_rate,
                time_limit: self.time_limit,
                voices_dropped,
            },
            commands,
        }
    }

    // --- voices ---

    fn generate_voices(&self, b: &mut ListBuilder<'_>, ctx: &mut GenerationContext<'_>) {
        let order = ctx.voices.sorted().to_vec();
        for slot in order {
            let (infos, resources) = ctx.voices.split_mut();
            let Some(voice) = infos.get_mut(slot) else {
                continue;
            };
            if voice.should_skip() || !voice.update_for_command_generation(resources, ctx.voice_states, ctx.mapper) {
                continue;
            }
            let node = Node {
                id: voice.node_id,
                voice: Some(slot),
            };
            let entry = b.entry(node, PerformanceEntryType::Voice);
            self.generate_voice(b, node, voice, resources, ctx.mixes, ctx.splitters, ctx.mapper);
            b.stop(node, entry);
        }
        ctx.splitters.update_internal_state();
    }

    /// `(offset, count)` of every mix the voice feeds.
    fn voice_destinations(voice: &VoiceInfo, mixes: &MixContext, splitters: &SplitterContext) -> Vec<(usize, usize)> {
        let span = |m: &MixInfo| (m.buffer_offset as usize, (m.buffer_count as usize).min(MAX_MIX_BUFFERS));
        if voice.mix_id != UNUSED_MIX_ID {
            return mixes.info(voice.mix_id).map(span).into_iter().collect();
        }
        if voice.splitter_id == UNUSED_SPLITTER_ID {
            return Vec::new();
        }
        (0..)
            .map_while(|d| splitters.destination(voice.splitter_id, d))
            .filter(|dest| dest.is_configured())
            .filter_map(|dest| mixes.info(dest.mix_id))
            .map(span)
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_voice(
        &self,
        b: &mut ListBuilder<'_>,
        node: Node,
        voice: &mut VoiceInfo,
        resources: &mut [VoiceChannelResource],
        mixes: &MixContext,
        splitters: &mut SplitterContext,
        mapper: &mut PoolMapper,
    ) {
        let channel_count = voice.channel_count.min(MAX_CHANNELS);
        for channel in 0..channel_count {
            let state = voice.channel_resource_ids[channel] as usize;
            let scratch = self.mix_buffer_count + channel;

            let aspect = b.detail(node, PerformanceEntryType::Voice, data_source_detail(voice.sample_format));
            for (offset, count) in Self::voice_destinations(voice, mixes, splitters) {
                b.push(node, voice.was_playing, Command::DepopPrepare { state, offset, count });
            }
            if !voice.was_playing {
                let source = self.data_source(voice, state, channel, scratch, mapper);
                b.push(node, true, Command::DataSource(Box::new(source)));
            }
            b.stop(node, aspect);

            if voice.was_playing {
                voice.prev_volume = 0.0;
                continue;
            }
            if !voice.has_any_connection() {
                continue;
            }

            let aspect = b.detail(node, PerformanceEntryType::Voice, detail::BIQUAD);
            self.voice_biquads(b, node, voice, state, scratch);
            b.stop(node, aspect);

            let aspect = b.detail(node, PerformanceEntryType::Voice, detail::VOLUME_MIX);
            b.push(
                node,
                true,
                Command::VolumeRamp {
                    input: scratch,
                    output: scratch,
                    prev_volume: voice.prev_volume,
                    volume: voice.volume,
                    precision: self.precision,
                },
            );
            b.stop(node, aspect);
            voice.prev_volume = voice.volume;

            if voice.mix_id != UNUSED_MIX_ID {
                let aspect = b.detail(node, PerformanceEntryType::Voice, detail::VOLUME_MIX);
                if let (Some(mix), Some(resource)) = (mixes.info(voice.mix_id), resources.get_mut(state)) {
                    self.voice_mix(b, node, &resource.mix_volumes, &resource.prev_mix_volumes, state, mix, scratch);
                    resource.update_internal_state();
                }
                b.stop(node, aspect);
            } else if voice.splitter_id != UNUSED_SPLITTER_ID {
                let mut index = channel;
                while let Some(dest) = splitters.destination_mut(voice.splitter_id, index) {
                    if dest.is_configured()
                        && let Some(mix) = mixes.info(dest.mix_id)
                    {
                        self.voice_mix(b, node, &dest.mix_volumes, &dest.prev_mix_volumes, state, mix, scratch);
                        dest.mark_as_need_to_update_internal_state();
                    }
                    index += channel_count;
                }
            }

            voice.biquad_initialized = [voice.biquads[0].enabled, voice.biquads[1].enabled];
        }
    }

    fn data_source(
        &self,
        voice: &VoiceInfo,
        state: usize,
        channel: usize,
        output: usize,
        mapper: &mut PoolMapper,
    ) -> DataSourceCommand {
        let wave_buffers = std::array::from_fn(|i| {
            let wb = &voice.wave_buffers[i];
            WaveBufferSource {
                buffer: wb.buffer.get_reference(mapper, true),
                size: wb.buffer.size(),
                context: wb.context.get_reference(mapper, true),
                start_offset: u32::try_from(wb.start_offset).unwrap_or(0),
                end_offset: u32::try_from(wb.end_offset).unwrap_or(0),
                looping: wb.looping,
                stream_ended: wb.stream_ended,
                loop_start: wb.loop_start,
                loop_end: wb.loop_end,
                loop_count: wb.loop_count,
            }
        });
        let coefficients = if voice.sample_format == SampleFormat::Adpcm {
            voice.data_address.get_reference(mapper, true)
        } else {
            audren_core::HostAddr::NULL
        };
        DataSourceCommand {
            format: voice.sample_format,
            src_quality: voice.src_quality,
            output,
            state,
            channel,
            channel_count: voice.channel_count,
            sample_rate: voice.sample_rate,
            pitch: voice.pitch,
            wave_buffers,
            coefficients,
            played_sample_count_reset_at_loop: voice.played_sample_count_reset_at_loop,
            pitch_and_src_skipped: voice.pitch_and_src_skipped,
        }
    }

    fn voice_biquads(&self, b: &mut ListBuilder<'_>, node: Node, voice: &VoiceInfo, state: usize, buffer: usize) {
        let both = voice.biquads[0].enabled && voice.biquads[1].enabled;
        if both && self.multi_tap_biquad && self.float_biquad {
            b.push(
                node,
                true,
                Command::MultiTapBiquad {
                    input: buffer,
                    output: buffer,
                    coefficients: [voice.biquads[0].coefficients, voice.biquads[1].coefficients],
                    state,
                    needs_init: [!voice.biquad_initialized[0], !voice.biquad_initialized[1]],
                },
            );
            return;
        }
        for (slot, biquad) in voice.biquads.iter().enumerate() {
            if biquad.enabled {
                b.push(
                    node,
                    true,
                    Command::Biquad {
                        input: buffer,
                        output: buffer,
                        coefficients: biquad.coefficients,
                        state,
                        slot,
                        needs_init: !voice.biquad_initialized[slot],
                        float: self.float_biquad,
                    },
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn voice_mix(
        &self,
        b: &mut ListBuilder<'_>,
        node: Node,
        volumes: &[f32; MAX_MIX_BUFFERS],
        prev_volumes: &[f32; MAX_MIX_BUFFERS],
        state: usize,
        mix: &MixInfo,
        input: usize,
    ) {
        let offset = mix.buffer_offset as usize;
        let count = (mix.buffer_count as usize).min(MAX_MIX_BUFFERS);
        if count > GROUPED_MIX_THRESHOLD {
            b.push(
                node,
                true,
                Command::MixRampGrouped(Box::new(MixRampGroupedCommand {
                    input,
                    output_offset: offset,
                    count,
                    prev_volumes: *prev_volumes,
                    volumes: *volumes,
                    precision: self.precision,
                    state,
                })),
            );
            return;
        }
        for i in 0..count {
            if volumes[i] == 0.0 && prev_volumes[i] == 0.0 {
                continue;
            }
            b.push(
                node,
                true,
                Command::MixRamp {
                    input,
                    output: offset + i,
                    prev_volume: prev_volumes[i],
                    volume: volumes[i],
                    precision: self.precision,
                    state: Some((state, i)),
                },
            );
        }
    }

    // --- mixes ---

    fn generate_sub_mixes(&self, b: &mut ListBuilder<'_>, ctx: &mut GenerationContext<'_>) {
        let mixes = ctx.mixes;
        for mix in mixes.sorted().filter(|m| m.in_use && !m.is_final()) {
            let node = Node::mix(mix.node_id);
            let entry = b.entry(node, PerformanceEntryType::SubMix);
            self.depop_for_mix(b, node, mix);
            self.generate_effects(b, mix, ctx.effects, ctx.mapper, PerformanceEntryType::SubMix);
            let aspect = b.detail(node, PerformanceEntryType::SubMix, detail::MIX);
            self.generate_mix_out(b, node, mix, mixes, ctx.splitters);
            b.stop(node, aspect);
            b.stop(node, entry);
        }
    }

    fn depop_for_mix(&self, b: &mut ListBuilder<'_>, node: Node, mix: &MixInfo) {
        b.push(
            node,
            true,
            Command::DepopForMixBuffers {
                offset: mix.buffer_offset as usize,
                count: (mix.buffer_count as usize).min(MAX_MIX_BUFFERS),
                decay: depop_decay(mix.sample_rate),
            },
        );
    }

    fn generate_mix_out(
        &self,
        b: &mut ListBuilder<'_>,
        node: Node,
        mix: &MixInfo,
        mixes: &MixContext,
        splitters: &SplitterContext,
    ) {
        if !mix.has_any_connection() {
            return;
        }
        let offset = mix.buffer_offset as usize;
        let count = (mix.buffer_count as usize).min(MAX_MIX_BUFFERS);

        if mix.dest_mix_id != UNUSED_MIX_ID {
            let Some(dest) = mixes.info(mix.dest_mix_id) else {
                return;
            };
            let dest_count = (dest.buffer_count as usize).min(MAX_MIX_BUFFERS);
            for i in 0..count {
                for j in 0..dest_count {
                    let volume = mix.volume * mix.mix_volumes[i][j];
                    if volume != 0.0 {
                        b.push(
                            node,
                            true,
                            Command::Mix {
                                input: offset + i,
                                output: dest.buffer_offset as usize + j,
                                volume,
                                precision: self.precision,
                            },
                        );
                    }
                }
            }
            return;
        }

        if mix.dest_splitter_id == UNUSED_SPLITTER_ID || count == 0 {
            return;
        }
        let mut index = 0;
        while let Some(dest) = splitters.destination(mix.dest_splitter_id, index) {
            if dest.is_configured()
                && let Some(target) = mixes.info(dest.mix_id)
            {
                let input = offset + index % count;
                for j in 0..(target.buffer_count as usize).min(MAX_MIX_BUFFERS) {
                    let volume = mix.volume * dest.mix_volumes[j];
                    if volume != 0.0 {
                        b.push(
                            node,
                            true,
                            Command::Mix {
                                input,
                                output: target.buffer_offset as usize + j,
                                volume,
                                precision: self.precision,
                            },
                        );
                    }
                }
            }
            index += 1;
        }
    }

    fn generate_final_mix(&self, b: &mut ListBuilder<'_>, ctx: &mut GenerationContext<'_>) {
        let Some(mix) = ctx.mixes.final_mix() else {
            tracing::error!("session has no final mix");
            return;
        };
        let node = Node::mix(mix.node_id);
        let entry = b.entry(node, PerformanceEntryType::FinalMix);
        self.depop_for_mix(b, node, mix);
        self.generate_effects(b, mix, ctx.effects, ctx.mapper, PerformanceEntryType::FinalMix);
        let offset = mix.buffer_offset as usize;
        for i in 0..(mix.buffer_count as usize).min(MAX_MIX_BUFFERS) {
            let aspect = b.detail(node, PerformanceEntryType::FinalMix, detail::VOLUME_MIX);
            b.push(
                node,
                true,
                Command::Volume {
                    input: offset + i,
                    output: offset + i,
                    volume: mix.volume,
                    precision: self.precision,
                },
            );
            b.stop(node, aspect);
        }
        b.stop(node, entry);
    }

    // --- effects ---

    fn generate_effects(
        &self,
        b: &mut ListBuilder<'_>,
        mix: &MixInfo,
        effects: &mut EffectContext,
        mapper: &mut PoolMapper,
        entry_type: PerformanceEntryType,
    ) {
        let node = Node::mix(mix.node_id);
        let offset = mix.buffer_offset as usize;
        for &order in &mix.effect_order {
            let Ok(index) = usize::try_from(order) else {
                break;
            };
            let Some(effect) = effects.info_mut(index) else {
                continue;
            };
            if effect.should_skip() {
                continue;
            }

            match effect.params {
                EffectParameters::BufferMixer(p) => {
                    let aspect = b.detail(node, entry_type, detail::MIX);
                    if effect.enabled {
                        for (input, output, volume) in p.pairs() {
                            if volume != 0.0 {
                                b.push(
                                    node,
                                    true,
                                    Command::Mix {
                                        input: absolute(offset, input),
                                        output: absolute(offset, output),
                                        volume,
                                        precision: self.precision,
                                    },
                                );
                            }
                        }
                    }
                    b.stop(node, aspect);
                }
                EffectParameters::Aux(p) => {
                    let aspect = b.detail(node, entry_type, detail::AUX);
                    self.aux_commands(b, node, effect, &p, offset, mapper, false);
                    b.stop(node, aspect);
                }
                EffectParameters::Capture(p) => {
                    let aspect = b.detail(node, entry_type, detail::CAPTURE);
                    self.aux_commands(b, node, effect, &p, offset, mapper, true);
                    b.stop(node, aspect);
                }
                EffectParameters::Delay(p) => {
                    let aspect = b.detail(node, entry_type, detail::DELAY);
                    effect.workbuffer(0, mapper);
                    let (mut inputs, mut outputs) = routing(offset, &p.inputs, &p.outputs, usize::from(p.channel_count));
                    if !self.delay_mapping_changed {
                        use_old_channel_mapping(&mut inputs, &mut outputs);
                    }
                    b.push(
                        node,
                        true,
                        Command::Delay(Box::new(EffectCommand {
                            effect: index,
                            inputs,
                            outputs,
                            enabled: effect.enabled,
                            params: p,
                        })),
                    );
                    b.stop(node, aspect);
                }
                EffectParameters::Reverb(p) => {
                    let aspect = b.detail(node, entry_type, detail::REVERB);
                    effect.workbuffer(0, mapper);
                    let (mut inputs, mut outputs) = routing(offset, &p.inputs, &p.outputs, usize::from(p.channel_count));
                    if !self.reverb_mapping_changed {
                        use_old_channel_mapping(&mut inputs, &mut outputs);
                    }
                    b.push(
                        node,
                        true,
                        Command::Reverb {
                            cmd: Box::new(EffectCommand {
                                effect: index,
                                inputs,
                                outputs,
                                enabled: effect.enabled,
                                params: p,
                            }),
                            long_pre_delay: self.long_pre_delay,
                        },
                    );
                    b.stop(node, aspect);
                }
                EffectParameters::BiquadFilter(p) => {
                    let aspect = b.detail(node, entry_type, detail::BIQUAD);
                    let (inputs, outputs) = routing(offset, &p.inputs, &p.outputs, p.channels());
                    if effect.enabled {
                        let needs_init = match p.state {
                            ParameterState::Initialized => true,
                            ParameterState::Updating | ParameterState::Updated => {
                                !self.biquad_clear_fixed && p.state == ParameterState::Updating
                            }
                        };
                        b.push(
                            node,
                            true,
                            Command::BiquadFilterEffect {
                                cmd: Box::new(EffectCommand {
                                    effect: index,
                                    inputs,
                                    outputs,
                                    enabled: true,
                                    params: p,
                                }),
                                needs_init,
                                float: self.float_biquad,
                            },
                        );
                    } else {
                        for (input, output) in inputs.into_iter().zip(outputs) {
                            b.push(node, true, Command::CopyMixBuffer { input, output });
                        }
                    }
                    b.stop(node, aspect);
                }
                EffectParameters::LightLimiter(p) => {
                    let aspect = b.detail(node, entry_type, detail::LIGHT_LIMITER);
                    effect.workbuffer(0, mapper);
                    let (inputs, outputs) = routing(offset, &p.inputs, &p.outputs, usize::from(p.channel_count));
                    b.push(
                        node,
                        true,
                        Command::LightLimiter {
                            cmd: Box::new(EffectCommand {
                                effect: index,
                                inputs,
                                outputs,
                                enabled: effect.enabled,
                                params: p,
                            }),
                            with_statistics: self.effect_info_v2 && p.statistics_enabled,
                        },
                    );
                    b.stop(node, aspect);
                }
                EffectParameters::Inert(_) => {}
                EffectParameters::None => {
                    if effect.effect_type != EffectType::Invalid {
                        tracing::warn!(effect = index, ty = ?effect.effect_type, "effect without parameters");
                    }
                }
            }

            effect.update_for_command_generation();
        }
    }

    /// One command per channel. Channel `i` reads or writes `i *
    /// sample_count` samples past the ring offsets, and only the last one
    /// advances them.
    #[allow(clippy::too_many_arguments)]
    fn aux_commands(
        &self,
        b: &mut ListBuilder<'_>,
        node: Node,
        effect: &EffectInfo,
        params: &AuxParams,
        offset: usize,
        mapper: &mut PoolMapper,
        capture: bool,
    ) {
        let ring = |index: usize, mapper: &mut PoolMapper| {
            let base = effect.workbuffers[index].get_reference(mapper, effect.enabled);
            if base.is_null() {
                None
            } else {
                AuxRing::at(base, params.count_max)
            }
        };
        let Some(send) = ring(0, mapper) else {
            return;
        };
        let ret = if capture {
            None
        } else {
            match ring(1, mapper) {
                Some(r) => Some(r),
                None => return,
            }
        };

        let channels = params.channels();
        let mut ring_offset = 0u32;
        for i in 0..channels {
            let next = self.sample_count + ring_offset;
            let aux = Box::new(AuxCommand {
                input: offset + usize::from(params.inputs[i]),
                output: offset + usize::from(params.outputs[i]),
                send,
                ret,
                offset: ring_offset,
                update_count: if i + 1 == channels { next } else { 0 },
                enabled: effect.enabled,
            });
            let command = if capture { Command::Capture(aux) } else { Command::Aux(aux) };
            b.push(node, true, command);
            ring_offset = next;
        }
    }

    // --- sinks ---

    fn generate_sinks(&self, b: &mut ListBuilder<'_>, ctx: &mut GenerationContext<'_>) {
        let Some(final_mix) = ctx.mixes.final_mix() else {
            return;
        };
        let offset = final_mix.buffer_offset as usize;

        for sink_type in [SinkType::Device, SinkType::CircularBuffer] {
            for (index, sink) in ctx.sinks.infos_mut().iter_mut().enumerate() {
                if !sink.in_use || sink.sink_type != sink_type {
                    continue;
                }
                let node = Node::mix(sink.node_id);
                let entry = b.entry(node, PerformanceEntryType::Sink);
                if !sink.should_skip() {
                    match sink.specific {
                        SinkSpecific::Device(p) => {
                            let inputs: Vec<usize> = p.inputs[..p.channels()]
                                .iter()
                                .map(|&i| offset + usize::from(i))
                                .collect();
                            self.device_sink(b, index, inputs, p.downmix_enabled, p.downmix_coefficients);
                        }
                        SinkSpecific::CircularBuffer(p) => {
                            let inputs = p.inputs[..p.channels()]
                                .iter()
                                .map(|&i| offset + usize::from(i))
                                .collect();
                            b.push(
                                Node::NONE,
                                true,
                                Command::CircularBufferSink {
                                    inputs,
                                    address: sink.buffer.get_reference(ctx.mapper, true),
                                    size: p.size,
                                    pos: sink.current_pos(),
                                },
                            );
                        }
                        SinkSpecific::None => {
                            tracing::warn!(sink = index, "sink without parameters");
                        }
                    }
                    sink.update_for_command_generation();
                }
                b.stop(node, entry);
            }
        }
    }

    fn device_sink(
        &self,
        b: &mut ListBuilder<'_>,
        slot: usize,
        inputs: Vec<usize>,
        downmix: bool,
        coefficients: [i32; 4],
    ) {
        let mut outputs = inputs;
        if downmix && let Ok(six) = <[usize; 6]>::try_from(outputs.as_slice()) {
            b.push(
                Node::NONE,
                true,
                Command::DownMix6chTo2ch {
                    inputs: six,
                    outputs: six,
                    coefficients,
                },
            );
            outputs.truncate(2);
        }
        let upsampler = (self.sample_rate != TARGET_SAMPLE_RATE).then_some(slot);
        if let Some(slot) = upsampler {
            b.push(
                Node::NONE,
                true,
                Command::Upsample {
                    slot,
                    inputs: outputs.clone(),
                    source_sample_count: self.sample_count,
                },
            );
        }
        b.push(Node::NONE, true, Command::DeviceSink { inputs: outputs, upsampler });
    }
}

/// Disables whole voices from the start of the voice section until the
/// weighted estimate fits `limit`. Stops at the first voice with the highest
/// priority. Returns the number of voices dropped.
fn drop_voices(commands: &mut [CommandEntry], voices: &mut VoiceContext, mut estimate: f32, limit: f32, weight: f32) -> u32 {
    let Some(mut i) = commands.iter().position(|e| e.voice.is_some()) else {
        return 0;
    };

    let mut dropped = 0;
    while i < commands.len() && estimate > limit {
        let Some(slot) = commands[i].voice else {
            break;
        };
        let Some(voice) = voices.info_mut(slot) else {
            break;
        };
        if voice.priority == HIGHEST_VOICE_PRIORITY {
            break;
        }
        voice.voice_dropped = true;
        dropped += 1;

        while i < commands.len() && commands[i].voice == Some(slot) {
            let entry = &mut commands[i];
            match entry.command {
                Command::DepopPrepare { .. } => entry.enabled = true,
                Command::Performance { .. } => {}
                _ if entry.enabled => {
                    entry.enabled = false;
                    estimate -= weight * entry.estimated_time as f32;
                }
                _ => {}
            }
            i += 1;
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::voice::ServerPlayState;
    use crate::wire::{CircularSinkParams, DeviceSinkParams, MemoryPoolInParameter, PoolState};
    use audren_core::{ErrorInfo, GuestAddr, Revision};

    const POOL_BASE: u64 = 0x10_0000;
    use audren_effects::AUX_INFO_SIZE;

    struct Session {
        params: RendererParameters,
        behavior: BehaviorInfo,
        voices: VoiceContext,
        mixes: MixContext,
        effects: EffectContext,
        splitters: SplitterContext,
        sinks: SinkContext,
        mapper: PoolMapper,
        states: Vec<VoiceState>,
    }

    impl Session {
        fn new(voice_count: usize, mix_buffers: u32) -> Self {
            let params = RendererParameters {
                mix_buffer_count: mix_buffers,
                voice_count: voice_count as u32,
                ..Default::default()
            };
            let mut behavior = BehaviorInfo::new();
            behavior.set_user_revision(Revision::CURRENT.to_tag());

            let mut mapper = PoolMapper::new(1);
            mapper
                .update(
                    0,
                    &MemoryPoolInParameter {
                        address: GuestAddr::new(POOL_BASE),
                        size: 0x1_0000,
                        state: PoolState::RequestAttach,
                    },
                )
                .unwrap();

            let mut voices = VoiceContext::new(voice_count);
            for slot in 0..voice_count {
                let v = voices.info_mut(slot).unwrap();
                v.in_use = true;
                v.id = slot as u32;
                v.node_id = 0x1000_0000 | ((slot as u32) << 16);
                v.play_state = ServerPlayState::Started;
                v.last_play_state = ServerPlayState::Started;
                v.sample_rate = 48_000;
                v.channel_count = 1;
                v.pitch = 1.0;
                v.volume = 1.0;
                v.priority = 10;
                v.wave_buffer_count = 1;
                v.mix_id = 0;
                v.channel_resource_ids[0] = slot as u32;
                let wb = &mut v.wave_buffers[0];
                wb.end_offset = 240;
                wb.sent_to_dsp = false;
                let mut err = ErrorInfo::SUCCESS;
                assert!(mapper.try_attach_buffer(&mut err, &mut wb.buffer, GuestAddr::new(POOL_BASE), 480));
                voices.resource_mut(slot).unwrap().mix_volumes[0] = 1.0;
            }
            voices.sort();

            let mut mixes = MixContext::new(1, 1);
            let fm = mixes.info_mut(0).unwrap();
            fm.in_use = true;
            fm.volume = 1.0;
            fm.sample_rate = 48_000;
            fm.buffer_count = mix_buffers;
            fm.node_id = 0x2000_0000;

            let mut sinks = SinkContext::new(1);
            let sink = sinks.info_mut(0).unwrap();
            sink.sink_type = SinkType::Device;
            sink.in_use = true;
            sink.specific = SinkSpecific::Device(DeviceSinkParams {
                input_count: 2,
                inputs: [0, 1, 0, 0, 0, 0],
                ..Default::default()
            });

            Self {
                params,
                behavior,
                voices,
                mixes,
                effects: EffectContext::new(1),
                splitters: SplitterContext::new(0, 0),
                sinks,
                mapper,
                states: vec![VoiceState::default(); voice_count],
            }
        }

        fn generate(&mut self, settings: GeneratorSettings, performance: Option<&mut PerformanceManager>) -> CommandList {
            let generator = CommandGenerator::new(&self.params, &self.behavior, settings);
            generator.generate(GenerationContext {
                voices: &mut self.voices,
                mixes: &self.mixes,
                effects: &mut self.effects,
                splitters: &mut self.splitters,
                sinks: &mut self.sinks,
                mapper: &mut self.mapper,
                voice_states: &mut self.states,
                performance,
            })
        }
    }

    fn kinds(list: &CommandList) -> Vec<CommandKind> {
        list.commands.iter().map(|e| e.command.kind()).collect()
    }

    // --- ordering ---

    #[test]
    fn sections_in_order() {
        let mut s = Session::new(1, 2);
        let list = s.generate(GeneratorSettings::default(), None);
        assert_eq!(
            kinds(&list),
            vec![
                CommandKind::ClearMixBuffer,
                CommandKind::DepopPrepare,
                CommandKind::DataSourcePcmInt16,
                CommandKind::VolumeRamp,
                CommandKind::MixRamp,
                CommandKind::DepopForMixBuffers,
                CommandKind::Volume,
                CommandKind::Volume,
                CommandKind::DeviceSink,
            ]
        );
        assert!(!list.commands[1].enabled, "depop only runs after a stop");
        assert_eq!(list.header.buffer_count, 2 + MAX_CHANNELS);
        assert_eq!(list.header.voices_dropped, 0);
    }

    #[test]
    fn voice_renders_into_scratch_buffer() {
        let mut s = Session::new(1, 2);
        let list = s.generate(GeneratorSettings::default(), None);
        match &list.commands[2].command {
            Command::DataSource(ds) => assert_eq!(ds.output, 2),
            other => panic!("unexpected {other:?}"),
        }
        match list.commands[4].command {
            Command::MixRamp { input, output, state, .. } => {
                assert_eq!((input, output), (2, 0));
                assert_eq!(state, Some((0, 0)));
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stopped_voice_only_depops() {
        let mut s = Session::new(1, 2);
        let v = s.voices.info_mut(0).unwrap();
        v.play_state = ServerPlayState::Stopped;
        v.last_play_state = ServerPlayState::Started;
        let list = s.generate(GeneratorSettings::default(), None);
        let voice: Vec<_> = list.commands.iter().filter(|e| e.voice.is_some()).collect();
        assert_eq!(voice.len(), 1);
        assert_eq!(voice[0].command.kind(), CommandKind::DepopPrepare);
        assert!(voice[0].enabled);
        assert_eq!(s.voices.info(0).unwrap().prev_volume, 0.0);
    }

    #[test]
    fn wide_mix_uses_grouped_ramp() {
        let mut s = Session::new(1, 12);
        let list = s.generate(GeneratorSettings::default(), None);
        assert!(kinds(&list).contains(&CommandKind::MixRampGrouped));
        assert!(!kinds(&list).contains(&CommandKind::MixRamp));
    }

    // --- sinks ---

    #[test]
    fn low_rate_session_upsamples_device_output() {
        let mut s = Session::new(1, 2);
        s.params.sample_rate = 32_000;
        s.params.sample_count = 160;
        let list = s.generate(GeneratorSettings::default(), None);
        let tail = &kinds(&list)[list.commands.len() - 2..];
        assert_eq!(tail, &[CommandKind::Upsample, CommandKind::DeviceSink]);
    }

    #[test]
    fn downmix_precedes_six_channel_device_sink() {
        let mut s = Session::new(1, 6);
        s.sinks.info_mut(0).unwrap().specific = SinkSpecific::Device(DeviceSinkParams {
            input_count: 6,
            inputs: [0, 1, 2, 3, 4, 5],
            downmix_enabled: true,
            ..Default::default()
        });
        let list = s.generate(GeneratorSettings::default(), None);
        let n = list.commands.len();
        assert_eq!(list.commands[n - 2].command.kind(), CommandKind::DownMix6chTo2ch);
        match &list.commands[n - 1].command {
            Command::DeviceSink { inputs, upsampler } => {
                assert_eq!(inputs, &vec![0, 1]);
                assert!(upsampler.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn circular_sink_follows_device_sinks() {
        let mut s = Session::new(0, 2);
        let mut sinks = SinkContext::new(2);
        {
            let c = sinks.info_mut(0).unwrap();
            c.sink_type = SinkType::CircularBuffer;
            c.in_use = true;
            c.specific = SinkSpecific::CircularBuffer(CircularSinkParams {
                address: GuestAddr::new(0x1000),
                size: 0x400,
                input_count: 2,
                sample_count: 240,
                inputs: [0, 1, 0, 0, 0, 0],
                ..Default::default()
            });
        }
        *sinks.info_mut(1).unwrap() = *s.sinks.info(0).unwrap();
        s.sinks = sinks;
        let list = s.generate(GeneratorSettings::default(), None);
        let n = list.commands.len();
        assert_eq!(list.commands[n - 2].command.kind(), CommandKind::DeviceSink);
        assert_eq!(list.commands[n - 1].command.kind(), CommandKind::CircularBufferSink);
    }

    // --- effects ---

    #[test]
    fn aux_advances_rings_on_last_channel_only() {
        let mut s = Session::new(0, 2);
        let mut mapper = PoolMapper::new(0);
        mapper.set_force_map(true);
        s.mapper = mapper;
        let aux = AuxParams {
            inputs: [0; 24],
            outputs: [0; 24],
            mix_buffer_count: 2,
            count_max: 960,
            send_buffer_info_address: GuestAddr::new(0x8000),
            return_buffer_info_address: GuestAddr::new(0x9000),
            ..Default::default()
        };
        let mut err = audren_core::ErrorInfo::SUCCESS;
        {
            let effect = s.effects.info_mut(0).unwrap();
            effect.effect_type = EffectType::Aux;
            effect.enabled = true;
            effect.params = EffectParameters::Aux(aux);
            s.mapper
                .try_attach_buffer(&mut err, &mut effect.workbuffers[0], aux.send_buffer_info_address, aux.ring_size());
            s.mapper
                .try_attach_buffer(&mut err, &mut effect.workbuffers[1], aux.return_buffer_info_address, aux.ring_size());
        }
        s.mixes.info_mut(0).unwrap().effect_order[0] = 0;
        let list = s.generate(GeneratorSettings::default(), None);
        let aux: Vec<&AuxCommand> = list
            .commands
            .iter()
            .filter_map(|e| match &e.command {
                Command::Aux(a) => Some(&**a),
                _ => None,
            })
            .collect();
        assert_eq!(aux.len(), 2);
        assert_eq!((aux[0].offset, aux[0].update_count), (0, 0));
        assert_eq!((aux[1].offset, aux[1].update_count), (240, 480));
        assert_eq!(aux[0].send.samples.raw() - aux[0].send.info.raw(), AUX_INFO_SIZE);
        assert!(aux[0].ret.is_some());
    }

    #[test]
    fn disabled_biquad_effect_copies() {
        let mut s = Session::new(0, 2);
        {
            let effect = s.effects.info_mut(0).unwrap();
            effect.effect_type = EffectType::BiquadFilter;
            effect.enabled = false;
            effect.params = EffectParameters::BiquadFilter(audren_effects::BiquadFilterParams {
                inputs: [0, 1, 0, 0, 0, 0],
                outputs: [0, 1, 0, 0, 0, 0],
                channel_count: 2,
                ..Default::default()
            });
        }
        s.mixes.info_mut(0).unwrap().effect_order[0] = 0;
        let list = s.generate(GeneratorSettings::default(), None);
        let copies = kinds(&list).iter().filter(|k| **k == CommandKind::CopyMixBuffer).count();
        assert_eq!(copies, 2);
    }

    // --- voice dropping ---

    #[test]
    fn drops_voices_over_budget() {
        let mut s = Session::new(3, 2);
        let settings = GeneratorSettings {
            render_time_limit_percent: 0,
            voice_drop_enabled: true,
            voice_drop_parameter: 1.0,
        };
        let list = s.generate(settings, None);
        assert_eq!(list.header.voices_dropped, 3);
        for slot in 0..3 {
            assert!(s.voices.info(slot).unwrap().voice_dropped);
        }
        for e in list.commands.iter().filter(|e| e.voice.is_some()) {
            let depop = e.command.kind() == CommandKind::DepopPrepare;
            assert_eq!(e.enabled, depop, "{:?}", e.command.kind());
        }
    }

    #[test]
    fn highest_priority_voice_stops_dropping() {
        let mut s = Session::new(2, 2);
        for slot in 0..2 {
            s.voices.info_mut(slot).unwrap().priority = HIGHEST_VOICE_PRIORITY;
        }
        s.voices.info_mut(1).unwrap().priority = 20;
        s.voices.sort();
        let settings = GeneratorSettings {
            render_time_limit_percent: 0,
            voice_drop_enabled: true,
            voice_drop_parameter: 1.0,
        };
        let list = s.generate(settings, None);
        assert_eq!(list.header.voices_dropped, 1);
        assert!(s.voices.info(1).unwrap().voice_dropped);
        assert!(!s.voices.info(0).unwrap().voice_dropped);
    }

    #[test]
    fn generous_budget_drops_nothing() {
        let mut s = Session::new(2, 2);
        let settings = GeneratorSettings {
            voice_drop_enabled: true,
            ..Default::default()
        };
        let list = s.generate(settings, None);
        assert_eq!(list.header.voices_dropped, 0);
        assert!(list.commands.iter().filter(|e| e.voice.is_some()).any(|e| e.enabled));
    }

    // --- performance ---

    #[test]
    fn nodes_are_bracketed_by_markers() {
        let mut s = Session::new(1, 2);
        let mut pm = PerformanceManager::new(audren_core::PerformanceFormat::V2, 8, 2);
        pm.tap_frame(0);
        let list = s.generate(GeneratorSettings::default(), Some(&mut pm));
        let markers = kinds(&list).iter().filter(|k| **k == CommandKind::Performance).count();
        // voice, final mix and sink
        assert_eq!(markers, 6);
        assert_eq!(pm.current().entries.len(), 3);
    }

    #[test]
    fn detail_target_gets_step_markers() {
        let mut s = Session::new(1, 2);
        let mut pm = PerformanceManager::new(audren_core::PerformanceFormat::V2, 8, 2);
        pm.set_detail_target(0x1000_0000);
        pm.tap_frame(0);
        s.generate(GeneratorSettings::default(), Some(&mut pm));
        assert!(!pm.current().details.is_empty());
        assert!(pm.current().details.iter().all(|d| d.node_id == 0x1000_0000));
    }
}
