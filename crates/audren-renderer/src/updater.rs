//! Applies a client update blob to the session contexts and writes the
//! status blob back.
//!
//! Sections are consumed in protocol order: behavior, memory pools, voice
//! channel resources, voices, effects, splitters, mixes, sinks, performance.
//! Every section size must equal its record count times the record size, and
//! the bytes consumed must equal the header total. Per-record attachment
//! failures do not fail the update; they land in the behavior error log.

use audren_core::{BehaviorFlags, BehaviorInfo, ErrorInfo, Feature, Reader, Revision, Writer};
use audren_effects::EffectState;

use crate::effect::EffectContext;
use crate::error::{RendererError, Result};
use crate::memory_pool::PoolMapper;
use crate::mix::MixContext;
use crate::params::{MAX_WAVE_BUFFERS, RendererParameters};
use crate::performance::PerformanceManager;
use crate::sink::SinkContext;
use crate::splitter::SplitterContext;
use crate::voice::{VoiceContext, VoiceInfo, VoiceState};
use crate::wire::{
    BEHAVIOR_IN_SIZE, BEHAVIOR_OUT_SIZE, BehaviorInParameter, BehaviorOutStatus, EFFECT_IN_SIZE, EFFECT_OUT_SIZE_V1,
    EFFECT_OUT_SIZE_V2, EffectInParameter, HEADER_SIZE, MEMORY_POOL_IN_SIZE, MEMORY_POOL_OUT_SIZE,
    MIX_DIRTY_HEADER_SIZE, MIX_IN_SIZE, MemoryPoolInParameter, MemoryPoolOutStatus, MixInParameter,
    PERFORMANCE_IN_SIZE, PERFORMANCE_OUT_SIZE, PerformanceInParameter, PerformanceOutStatus,
    RENDERER_INFO_OUT_SIZE, RendererInfoOutStatus, SINK_IN_SIZE, SINK_OUT_SIZE, SinkInParameter, SplitterSection,
    UpdateDataHeader, VOICE_IN_SIZE, VOICE_OUT_SIZE, VOICE_RESOURCE_IN_SIZE, VoiceChannelResourceInParameter,
    VoiceInParameter, VoiceOutStatus,
};
use crate::wire::records::MIX_DIRTY_MAGIC;

/// Session state an update touches.
pub struct UpdateTargets<'a> {
    /// Revision gate and error log.
    pub behavior: &'a mut BehaviorInfo,
    /// Memory pools.
    pub mapper: &'a mut PoolMapper,
    /// Voices and channel resources.
    pub voices: &'a mut VoiceContext,
    /// Per-channel voice state.
    pub voice_states: &'a mut [VoiceState],
    /// Effects.
    pub effects: &'a mut EffectContext,
    /// Effect DSP state, read for limiter statistics.
    pub effect_states: &'a [EffectState],
    /// Splitters.
    pub splitters: &'a mut SplitterContext,
    /// Mixes.
    pub mixes: &'a mut MixContext,
    /// Sinks.
    pub sinks: &'a mut SinkContext,
    /// Timing recorder, if metrics are on.
    pub performance: Option<&'a mut PerformanceManager>,
    /// The session is started.
    pub renderer_active: bool,
    /// Ticks rendered so far.
    pub elapsed_frames: u64,
    /// Voices dropped in the last tick.
    pub voices_dropped: u32,
}

/// Checks that a section holds exactly `count` records of `record` bytes.
fn expect_size(section: &'static str, size: u32, count: usize, record: usize) -> Result<()> {
    if size as usize == count * record {
        Ok(())
    } else {
        tracing::warn!(section, size, expected = count * record, "section size mismatch");
        Err(RendererError::InvalidUpdateInfo(section))
    }
}

fn decode_records<T>(
    r: &mut Reader<'_>,
    count: usize,
    decode: impl Fn(&mut Reader<'_>) -> std::result::Result<T, audren_core::WireError>,
) -> Result<Vec<T>> {
    (0..count).map(|_| decode(r).map_err(RendererError::from)).collect()
}

/// Decodes updates for one session.
#[derive(Debug, Clone)]
pub struct InfoUpdater {
    params: RendererParameters,
}

impl InfoUpdater {
    /// An updater for a session created with `params`.
    pub fn new(params: &RendererParameters) -> Self {
        Self { params: *params }
    }

    /// Bytes of a full status blob.
    pub fn output_size(&self, revision: Revision) -> usize {
        let effect_out = if Feature::EffectInfoVer2.is_supported_at(revision) {
            EFFECT_OUT_SIZE_V2
        } else {
            EFFECT_OUT_SIZE_V1
        };
        HEADER_SIZE
            + self.params.memory_pool_count() * MEMORY_POOL_OUT_SIZE
            + self.params.voice_count as usize * VOICE_OUT_SIZE
            + self.params.effect_count as usize * effect_out
            + self.params.sink_count as usize * SINK_OUT_SIZE
            + PERFORMANCE_OUT_SIZE
            + BEHAVIOR_OUT_SIZE
            + if Feature::ElapsedFrameCount.is_supported_at(revision) { RENDERER_INFO_OUT_SIZE } else { 0 }
    }

    /// Applies `input` and writes statuses into `output`. Performance
    /// histories go to `performance_out`.
    pub fn update(
        &self,
        input: &[u8],
        output: &mut [u8],
        performance_out: &mut [u8],
        t: UpdateTargets<'_>,
    ) -> Result<()> {
        let r = &mut Reader::new(input);
        let header = UpdateDataHeader::decode(r)?;
        if header.total_size as usize > input.len() {
            return Err(RendererError::InvalidUpdateInfo("total size exceeds input"));
        }

        let revision = t.behavior.user_revision();
        let needed = self.output_size(revision);
        if output.len() < needed {
            return Err(RendererError::InsufficientBuffer {
                needed: needed as u64,
                given: output.len() as u64,
            });
        }

        self.update_behavior(r, &header, t.behavior, t.mapper)?;
        let pools = self.update_memory_pools(r, &header, t.behavior, t.mapper)?;
        self.update_voice_resources(r, &header, t.voices)?;
        let voices = self.update_voices(r, &header, t.behavior, t.mapper, t.voices, t.voice_states)?;
        let effects = self.update_effects(r, &header, t.behavior, t.mapper, t.effects, t.effect_states, t.renderer_active)?;
        self.update_splitters(r, &header, t.behavior, t.splitters)?;
        self.update_mixes(r, &header, t.behavior, t.mixes, t.effects, t.splitters)?;
        let sinks = self.update_sinks(r, &header, t.behavior, t.mapper, t.sinks)?;
        let performance = self.update_performance(r, &header, t.performance, performance_out)?;

        if r.offset() != header.total_size as usize {
            tracing::warn!(consumed = r.offset(), total = header.total_size, "update size mismatch");
            return Err(RendererError::InvalidUpdateInfo("consumed size differs from header total"));
        }

        let mut behavior_status = BehaviorOutStatus::default();
        behavior_status.error_count = t.behavior.drain_errors(&mut behavior_status.errors) as u32;
        let renderer_info = t.behavior.is_supported(Feature::ElapsedFrameCount).then_some(RendererInfoOutStatus {
            elapsed_frame_count: t.elapsed_frames,
            voices_dropped: t.voices_dropped,
        });

        let effect_out = if t.behavior.is_supported(Feature::EffectInfoVer2) {
            EFFECT_OUT_SIZE_V2
        } else {
            EFFECT_OUT_SIZE_V1
        };
        let mut out_header = UpdateDataHeader {
            revision: revision.to_tag(),
            behavior_size: BEHAVIOR_OUT_SIZE as u32,
            memory_pool_size: (pools.len() * MEMORY_POOL_OUT_SIZE) as u32,
            voice_size: (voices.len() * VOICE_OUT_SIZE) as u32,
            effect_size: (effects.len() * effect_out) as u32,
            sink_size: (sinks.len() * SINK_OUT_SIZE) as u32,
            performance_size: PERFORMANCE_OUT_SIZE as u32,
            render_info_size: if renderer_info.is_some() { RENDERER_INFO_OUT_SIZE as u32 } else { 0 },
            ..Default::default()
        };
        out_header.total_size = out_header.computed_total();

        let w = &mut Writer::new(output);
        out_header.encode(w)?;
        pools.iter().try_for_each(|s| s.encode(w))?;
        voices.iter().try_for_each(|s| s.encode(w))?;
        effects.iter().try_for_each(|s| s.encode(w))?;
        sinks.iter().try_for_each(|s| s.encode(w))?;
        performance.encode(w)?;
        behavior_status.encode(w)?;
        if let Some(info) = renderer_info {
            info.encode(w)?;
        }
        Ok(())
    }

    // --- sections ---

    fn update_behavior(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &mut BehaviorInfo,
        mapper: &mut PoolMapper,
    ) -> Result<()> {
        expect_size("behavior", header.behavior_size, 1, BEHAVIOR_IN_SIZE)?;
        let params = BehaviorInParameter::decode(r)?;
        behavior.clear_errors();
        behavior.update_flags(BehaviorFlags::from_bits(params.flags));
        mapper.set_force_map(behavior.is_memory_force_mapping_enabled());

        let revision = Revision::from_tag(params.revision);
        if !revision.is_valid() || revision != behavior.user_revision() {
            tracing::warn!(
                revision = revision.get(),
                session = behavior.user_revision().get(),
                "behavior revision differs from the session's"
            );
            return Err(RendererError::InvalidUpdateInfo("behavior revision"));
        }
        Ok(())
    }

    fn update_memory_pools(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &mut BehaviorInfo,
        mapper: &mut PoolMapper,
    ) -> Result<Vec<MemoryPoolOutStatus>> {
        let count = self.params.memory_pool_count();
        expect_size("memory pools", header.memory_pool_size, count, MEMORY_POOL_IN_SIZE)?;
        let records = decode_records(r, count, MemoryPoolInParameter::decode)?;

        let mut statuses = Vec::with_capacity(count);
        for (index, params) in records.iter().enumerate() {
            let state = match mapper.update(index, params) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(index, error = %e, "memory pool update rejected");
                    behavior.append_error(ErrorInfo::new(e.code(), params.address));
                    mapper.pools().get(index).map_or(params.state, |p| p.state())
                }
            };
            statuses.push(MemoryPoolOutStatus { state });
        }
        Ok(statuses)
    }

    fn update_voice_resources(&self, r: &mut Reader<'_>, header: &UpdateDataHeader, voices: &mut VoiceContext) -> Result<()> {
        let count = self.params.voice_count as usize;
        expect_size("voice resources", header.voice_resource_size, count, VOICE_RESOURCE_IN_SIZE)?;
        for (index, params) in decode_records(r, count, VoiceChannelResourceInParameter::decode)?
            .iter()
            .enumerate()
        {
            if let Some(resource) = voices.resource_mut(index) {
                resource.update(params);
            }
        }
        Ok(())
    }

    fn update_voices(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &mut BehaviorInfo,
        mapper: &mut PoolMapper,
        voices: &mut VoiceContext,
        states: &mut [VoiceState],
    ) -> Result<Vec<VoiceOutStatus>> {
        let count = self.params.voice_count as usize;
        expect_size("voices", header.voice_size, count, VOICE_IN_SIZE)?;
        let records = decode_records(r, count, VoiceInParameter::decode)?;

        let mut statuses = Vec::with_capacity(count);
        let mut active_channels = 0;
        for (index, params) in records.iter().enumerate() {
            let Some(info) = voices.info_mut(index) else {
                statuses.push(VoiceOutStatus::default());
                continue;
            };
            if !params.in_use {
                info.in_use = false;
                statuses.push(VoiceOutStatus::default());
                continue;
            }
            if params.is_new {
                *info = VoiceInfo::new();
            }

            let mut error = ErrorInfo::SUCCESS;
            info.update_parameters(&mut error, params, mapper, behavior);
            behavior.append_error(error);

            let mut wave_errors = [[ErrorInfo::SUCCESS; 2]; MAX_WAVE_BUFFERS];
            info.update_wave_buffers(&mut wave_errors, params, states, mapper, behavior);
            for e in wave_errors.into_iter().flatten() {
                behavior.append_error(e);
            }

            active_channels += info.channel_count;
            statuses.push(info.write_out_status(params, states));
        }
        voices.set_active_channel_count(active_channels);
        voices.sort();
        Ok(statuses)
    }

    #[allow(clippy::too_many_arguments)]
    fn update_effects(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &mut BehaviorInfo,
        mapper: &mut PoolMapper,
        effects: &mut EffectContext,
        effect_states: &[EffectState],
        renderer_active: bool,
    ) -> Result<Vec<crate::wire::EffectOutStatus>> {
        let count = self.params.effect_count as usize;
        expect_size("effects", header.effect_size, count, EFFECT_IN_SIZE)?;
        let records = decode_records(r, count, EffectInParameter::decode)?;
        let v2 = behavior.is_supported(Feature::EffectInfoVer2);

        let mut statuses = Vec::with_capacity(count);
        for (index, params) in records.iter().enumerate() {
            let Some(info) = effects.info_mut(index) else {
                continue;
            };
            let mut error = ErrorInfo::SUCCESS;
            if let Err(e) = info.update(&mut error, params, mapper) {
                tracing::warn!(index, error = %e, "effect record rejected");
                behavior.append_error(ErrorInfo::new(e.code(), params.workbuffer));
            }
            behavior.append_error(error);
            let statistics = effect_states.get(index).and_then(EffectState::limiter_statistics);
            statuses.push(info.out_status(renderer_active, v2, statistics)?);
        }
        Ok(statuses)
    }

    fn update_splitters(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &BehaviorInfo,
        splitters: &mut SplitterContext,
    ) -> Result<()> {
        if !behavior.is_supported(Feature::Splitter) {
            return expect_size("splitters", header.splitter_size, 0, 0);
        }
        let raw = r.bytes(header.splitter_size as usize)?;
        if raw.is_empty() {
            return Ok(());
        }
        let section = SplitterSection::decode(&mut Reader::new(raw))?;
        splitters.update(&section);
        Ok(())
    }

    fn update_mixes(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &BehaviorInfo,
        mixes: &mut MixContext,
        effects: &EffectContext,
        splitters: &SplitterContext,
    ) -> Result<()> {
        let dirty_only = behavior.is_supported(Feature::MixInParameterDirtyOnlyUpdate);
        let count = if dirty_only {
            let magic = r.u32()?;
            let count = r.u32()? as usize;
            r.skip(MIX_DIRTY_HEADER_SIZE - 8)?;
            if magic != MIX_DIRTY_MAGIC || count > mixes.count() {
                return Err(RendererError::InvalidUpdateInfo("mix section header"));
            }
            let records_size = header
                .mix_size
                .checked_sub(MIX_DIRTY_HEADER_SIZE as u32)
                .ok_or(RendererError::InvalidUpdateInfo("mix section header"))?;
            expect_size("mixes", records_size, count, MIX_IN_SIZE)?;
            count
        } else {
            expect_size("mixes", header.mix_size, mixes.count(), MIX_IN_SIZE)?;
            mixes.count()
        };
        let records = decode_records(r, count, MixInParameter::decode)?;

        let id_of = |index: usize, params: &MixInParameter| if dirty_only { params.mix_id } else { index as i32 };
        let mut buffers: Vec<u32> = mixes
            .infos()
            .iter()
            .map(|m| if m.in_use { m.buffer_count } else { 0 })
            .collect();
        for (index, params) in records.iter().enumerate() {
            if dirty_only && !params.is_dirty {
                continue;
            }
            let slot = usize::try_from(id_of(index, params))
                .ok()
                .filter(|&s| s < buffers.len())
                .ok_or(RendererError::InvalidUpdateInfo("mix id out of range"))?;
            buffers[slot] = if params.in_use { params.buffer_count } else { 0 };
        }
        let total: u32 = buffers.iter().sum();
        if total > self.params.mix_buffer_count {
            tracing::warn!(total, limit = self.params.mix_buffer_count, "mixes claim too many buffers");
            return Err(RendererError::InvalidUpdateInfo("mix buffer count"));
        }

        let splitter_supported = behavior.is_supported(Feature::Splitter);
        for (index, params) in records.iter().enumerate() {
            if dirty_only && !params.is_dirty {
                continue;
            }
            if let Some(info) = mixes.info_mut(id_of(index, params)) {
                info.update(params, effects.assignments(), splitters, splitter_supported);
            }
        }
        mixes.sort(splitters)
    }

    fn update_sinks(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        behavior: &mut BehaviorInfo,
        mapper: &PoolMapper,
        sinks: &mut SinkContext,
    ) -> Result<Vec<crate::wire::SinkOutStatus>> {
        let count = self.params.sink_count as usize;
        expect_size("sinks", header.sink_size, count, SINK_IN_SIZE)?;
        let records = decode_records(r, count, SinkInParameter::decode)?;

        let mut statuses = Vec::with_capacity(count);
        for (index, params) in records.iter().enumerate() {
            let Some(info) = sinks.info_mut(index) else {
                continue;
            };
            let mut error = ErrorInfo::SUCCESS;
            statuses.push(info.update(&mut error, params, mapper));
            behavior.append_error(error);
        }
        Ok(statuses)
    }

    fn update_performance(
        &self,
        r: &mut Reader<'_>,
        header: &UpdateDataHeader,
        performance: Option<&mut PerformanceManager>,
        out: &mut [u8],
    ) -> Result<PerformanceOutStatus> {
        expect_size("performance", header.performance_size, 1, PERFORMANCE_IN_SIZE)?;
        let params = PerformanceInParameter::decode(r)?;
        let Some(performance) = performance else {
            return Ok(PerformanceOutStatus::default());
        };
        performance.set_detail_target(params.target_node_id);
        Ok(PerformanceOutStatus {
            history_size: performance.copy_histories(out),
        })
    }
}
