//! Client side of the protocol: building updates and reading statuses.

use audren_core::{Feature, Reader, Revision, WireError, Writer};

use super::records::{
    BehaviorInParameter, EffectInParameter, MIX_DIRTY_MAGIC, MemoryPoolInParameter, MixInParameter,
    PerformanceInParameter, SinkInParameter, SplitterSection, UNUSED_SPLITTER_ID, VoiceChannelResourceInParameter,
    VoiceInParameter, WaveBufferInParameter,
};
use super::status::{
    BehaviorOutStatus, EffectOutStatus, MemoryPoolOutStatus, PerformanceOutStatus, RendererInfoOutStatus,
    SinkOutStatus, VoiceOutStatus,
};
use super::{
    BEHAVIOR_IN_SIZE, BEHAVIOR_OUT_SIZE, EFFECT_IN_SIZE, EFFECT_OUT_SIZE_V1, EFFECT_OUT_SIZE_V2, HEADER_SIZE,
    MEMORY_POOL_IN_SIZE, MEMORY_POOL_OUT_SIZE, MIX_DIRTY_HEADER_SIZE, MIX_IN_SIZE, PERFORMANCE_IN_SIZE,
    PERFORMANCE_OUT_SIZE, RENDERER_INFO_OUT_SIZE, SINK_IN_SIZE, SINK_OUT_SIZE, UpdateDataHeader, VOICE_IN_SIZE,
    VOICE_OUT_SIZE, VOICE_RESOURCE_IN_SIZE,
};
use crate::params::{MAX_WAVE_BUFFERS, RendererParameters};

/// Every parameter record of one update, in protocol order.
///
/// [`UpdateRequest::new`] sizes each section to the session's slot counts,
/// which is what the renderer expects to consume.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Packed `REVn` tag, written to the header and the behavior record.
    pub revision: u32,
    /// Behavior flags.
    pub behavior: BehaviorInParameter,
    /// One record per memory pool slot.
    pub memory_pools: Vec<MemoryPoolInParameter>,
    /// One record per voice slot.
    pub voice_resources: Vec<VoiceChannelResourceInParameter>,
    /// One record per voice slot.
    pub voices: Vec<VoiceInParameter>,
    /// One record per effect slot.
    pub effects: Vec<EffectInParameter>,
    /// Splitter section, sent when the revision supports splitters.
    pub splitters: SplitterSection,
    /// One record per mix, or only the dirty ones at revisions that
    /// support dirty-only mix updates.
    pub mixes: Vec<MixInParameter>,
    /// One record per sink slot.
    pub sinks: Vec<SinkInParameter>,
    /// Performance target.
    pub performance: PerformanceInParameter,
}

impl UpdateRequest {
    /// An update with default records for every slot of `params`.
    pub fn new(params: &RendererParameters) -> Self {
        let voices = (0..params.voice_count)
            .map(|id| VoiceInParameter {
                id,
                pitch: 1.0,
                volume: 1.0,
                splitter_id: UNUSED_SPLITTER_ID,
                wave_buffers: [WaveBufferInParameter {
                    sent_to_dsp: true,
                    ..Default::default()
                }; MAX_WAVE_BUFFERS],
                ..Default::default()
            })
            .collect();
        let voice_resources = (0..params.voice_count)
            .map(|id| VoiceChannelResourceInParameter {
                id,
                ..Default::default()
            })
            .collect();
        let mixes = (0..params.mix_count())
            .map(|id| MixInParameter {
                mix_id: id as i32,
                ..Default::default()
            })
            .collect();
        Self {
            revision: params.revision,
            behavior: BehaviorInParameter {
                revision: params.revision,
                flags: 0,
            },
            memory_pools: vec![MemoryPoolInParameter::default(); params.memory_pool_count()],
            voice_resources,
            voices,
            effects: vec![EffectInParameter::default(); params.effect_count as usize],
            splitters: SplitterSection::default(),
            mixes,
            sinks: vec![SinkInParameter::default(); params.sink_count as usize],
            performance: PerformanceInParameter::default(),
        }
    }

    fn revision(&self) -> Revision {
        Revision::from_tag(self.revision)
    }

    /// Section sizes this request encodes to.
    pub fn header(&self) -> UpdateDataHeader {
        let rev = self.revision();
        let splitter_size = if Feature::Splitter.is_supported_at(rev) {
            self.splitters.encoded_size()
        } else {
            0
        };
        let mix_header = if Feature::MixInParameterDirtyOnlyUpdate.is_supported_at(rev) {
            MIX_DIRTY_HEADER_SIZE
        } else {
            0
        };
        let mut h = UpdateDataHeader {
            revision: self.revision,
            behavior_size: BEHAVIOR_IN_SIZE as u32,
            memory_pool_size: (self.memory_pools.len() * MEMORY_POOL_IN_SIZE) as u32,
            voice_resource_size: (self.voice_resources.len() * VOICE_RESOURCE_IN_SIZE) as u32,
            voice_size: (self.voices.len() * VOICE_IN_SIZE) as u32,
            effect_size: (self.effects.len() * EFFECT_IN_SIZE) as u32,
            splitter_size: splitter_size as u32,
            mix_size: (mix_header + self.mixes.len() * MIX_IN_SIZE) as u32,
            sink_size: (self.sinks.len() * SINK_IN_SIZE) as u32,
            performance_size: PERFORMANCE_IN_SIZE as u32,
            render_info_size: 0,
            total_size: 0,
        };
        h.total_size = h.computed_total();
        h
    }

    /// Encodes the whole update.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let header = self.header();
        let mut raw = vec![0u8; header.total_size as usize];
        let w = &mut Writer::new(&mut raw);
        header.encode(w)?;
        BehaviorInParameter {
            revision: self.revision,
            flags: self.behavior.flags,
        }
        .encode(w)?;
        self.memory_pools.iter().try_for_each(|p| p.encode(w))?;
        self.voice_resources.iter().try_for_each(|p| p.encode(w))?;
        self.voices.iter().try_for_each(|p| p.encode(w))?;
        self.effects.iter().try_for_each(|p| p.encode(w))?;
        if header.splitter_size > 0 {
            self.splitters.encode(w)?;
        }
        if Feature::MixInParameterDirtyOnlyUpdate.is_supported_at(self.revision()) {
            w.u32(MIX_DIRTY_MAGIC)?;
            w.u32(self.mixes.len() as u32)?;
            w.zeros(MIX_DIRTY_HEADER_SIZE - 8)?;
        }
        self.mixes.iter().try_for_each(|p| p.encode(w))?;
        self.sinks.iter().try_for_each(|p| p.encode(w))?;
        self.performance.encode(w)?;
        Ok(raw)
    }
}

/// Every status record of one update response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResponse {
    /// Response header.
    pub header: UpdateDataHeader,
    /// One status per memory pool slot.
    pub memory_pools: Vec<MemoryPoolOutStatus>,
    /// One status per voice slot.
    pub voices: Vec<VoiceOutStatus>,
    /// One status per effect slot.
    pub effects: Vec<EffectOutStatus>,
    /// One status per sink slot.
    pub sinks: Vec<SinkOutStatus>,
    /// Performance status.
    pub performance: PerformanceOutStatus,
    /// Drained error log.
    pub behavior: BehaviorOutStatus,
    /// Renderer counters, when the revision reports them.
    pub renderer_info: Option<RendererInfoOutStatus>,
}

impl UpdateResponse {
    /// Bytes the renderer needs to write a response for `params`.
    pub fn size_for(params: &RendererParameters) -> usize {
        let effect_out = if Feature::EffectInfoVer2.is_supported_at(params.revision()) {
            EFFECT_OUT_SIZE_V2
        } else {
            EFFECT_OUT_SIZE_V1
        };
        HEADER_SIZE
            + params.memory_pool_count() * MEMORY_POOL_OUT_SIZE
            + params.voice_count as usize * VOICE_OUT_SIZE
            + params.effect_count as usize * effect_out
            + params.sink_count as usize * SINK_OUT_SIZE
            + PERFORMANCE_OUT_SIZE
            + BEHAVIOR_OUT_SIZE
            + RENDERER_INFO_OUT_SIZE
    }

    /// Parses a response written for a session at `revision`.
    pub fn decode(raw: &[u8], revision: Revision) -> Result<Self, WireError> {
        let r = &mut Reader::new(raw);
        let header = UpdateDataHeader::decode(r)?;
        let v2 = Feature::EffectInfoVer2.is_supported_at(revision);
        let effect_out = if v2 { EFFECT_OUT_SIZE_V2 } else { EFFECT_OUT_SIZE_V1 };

        let memory_pools = (0..header.memory_pool_size as usize / MEMORY_POOL_OUT_SIZE)
            .map(|_| MemoryPoolOutStatus::decode(r))
            .collect::<Result<_, _>>()?;
        let voices = (0..header.voice_size as usize / VOICE_OUT_SIZE)
            .map(|_| VoiceOutStatus::decode(r))
            .collect::<Result<_, _>>()?;
        let effects = (0..header.effect_size as usize / effect_out)
            .map(|_| EffectOutStatus::decode(r, v2))
            .collect::<Result<_, _>>()?;
        let sinks = (0..header.sink_size as usize / SINK_OUT_SIZE)
            .map(|_| SinkOutStatus::decode(r))
            .collect::<Result<_, _>>()?;
        let performance = PerformanceOutStatus::decode(r)?;
        let behavior = BehaviorOutStatus::decode(r)?;
        let renderer_info = if header.render_info_size > 0 {
            Some(RendererInfoOutStatus::decode(r)?)
        } else {
            None
        };
        Ok(Self {
            header,
            memory_pools,
            voices,
            effects,
            sinks,
            performance,
            behavior,
            renderer_info,
        })
    }
}
