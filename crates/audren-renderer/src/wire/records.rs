//! Parameter records sent by the client.
//!
//! Each record decodes from and encodes to its exact wire size. Reserved
//! bytes are skipped on decode and zeroed on encode.

use audren_core::{BiquadCoefficients, GuestAddr, Reader, WireError, Writer, make_magic};
use audren_effects::{EffectType, SPECIFIC_SIZE};

use crate::params::{MAX_CHANNELS, MAX_MIX_BUFFERS, MAX_WAVE_BUFFERS};

/// Magic opening the splitter section.
pub const SPLITTER_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'H');
/// Magic opening each splitter record.
pub const SPLITTER_INFO_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'I');
/// Magic opening each splitter destination record.
pub const SPLITTER_DESTINATION_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'D');
/// Magic opening the dirty-only mix header.
pub const MIX_DIRTY_MAGIC: u32 = make_magic(b'M', b'I', b'X', b'D');

/// Mix id meaning "no destination".
pub const UNUSED_MIX_ID: i32 = i32::MAX;
/// Splitter id meaning "no splitter".
pub const UNUSED_SPLITTER_ID: i32 = -1;
/// Id of the final mix.
pub const FINAL_MIX_ID: i32 = 0;

fn f32_array<const N: usize>(r: &mut Reader<'_>) -> Result<[f32; N], WireError> {
    let mut out = [0.0; N];
    for v in &mut out {
        *v = r.f32()?;
    }
    Ok(out)
}

fn put_f32s(w: &mut Writer<'_>, values: &[f32]) -> Result<(), WireError> {
    values.iter().try_for_each(|&v| w.f32(v))
}

// --- behavior ---

/// Revision and flags the client runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorInParameter {
    /// Packed `REVn` tag.
    pub revision: u32,
    /// [`audren_core::BehaviorFlags`] bits.
    pub flags: u64,
}

impl BehaviorInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let revision = r.u32()?;
        r.skip(4)?;
        Ok(Self {
            revision,
            flags: r.u64()?,
        })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.revision)?;
        w.zeros(4)?;
        w.u64(self.flags)
    }
}

// --- memory pools ---

/// Memory pool state as exchanged with the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PoolState {
    /// Unused slot.
    #[default]
    Invalid = 0,
    /// Allocated but never attached.
    New = 1,
    /// Client asks for a detach.
    RequestDetach = 2,
    /// Detached.
    Detached = 3,
    /// Client asks for an attach.
    RequestAttach = 4,
    /// Attached.
    Attached = 5,
    /// Released by the client.
    Released = 6,
}

impl PoolState {
    /// Decodes a state word. Unknown values map to [`PoolState::Invalid`].
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::New,
            2 => Self::RequestDetach,
            3 => Self::Detached,
            4 => Self::RequestAttach,
            5 => Self::Attached,
            6 => Self::Released,
            _ => Self::Invalid,
        }
    }
}

/// One memory pool record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolInParameter {
    /// Guest base address.
    pub address: GuestAddr,
    /// Bytes covered.
    pub size: u64,
    /// Requested state.
    pub state: PoolState,
}

impl MemoryPoolInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let p = Self {
            address: GuestAddr::new(r.u64()?),
            size: r.u64()?,
            state: PoolState::from_u32(r.u32()?),
        };
        r.skip(0xC)?;
        Ok(p)
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u64(self.address.raw())?;
        w.u64(self.size)?;
        w.u32(self.state as u32)?;
        w.zeros(0xC)
    }
}

// --- voices ---

/// Mix volumes of one voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceChannelResourceInParameter {
    /// Resource slot.
    pub id: u32,
    /// Volume into each destination buffer.
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Slot in use.
    pub in_use: bool,
}

impl VoiceChannelResourceInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let p = Self {
            id: r.u32()?,
            mix_volumes: f32_array(r)?,
            in_use: r.bool()?,
        };
        r.skip(0xB)?;
        Ok(p)
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.id)?;
        put_f32s(w, &self.mix_volumes)?;
        w.bool(self.in_use)?;
        w.zeros(0xB)
    }
}

/// Requested play state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum VoicePlayState {
    /// Play.
    Started = 0,
    /// Stop and release queued buffers.
    #[default]
    Stopped = 1,
    /// Hold position.
    Paused = 2,
}

impl VoicePlayState {
    /// Decodes a state byte. Unknown values stop the voice.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Started,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// One queued wave buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveBufferInParameter {
    /// Guest address of the samples.
    pub address: GuestAddr,
    /// Bytes at `address`.
    pub size: u64,
    /// First sample played.
    pub start_offset: i32,
    /// One past the last sample played.
    pub end_offset: i32,
    /// Loop this buffer.
    pub looping: bool,
    /// Last buffer of the stream.
    pub stream_ended: bool,
    /// Already handed to the renderer.
    pub sent_to_dsp: bool,
    /// Loops before moving on; negative loops forever.
    pub loop_count: i32,
    /// Guest address of an ADPCM loop context.
    pub context_address: GuestAddr,
    /// Bytes at `context_address`.
    pub context_size: u64,
    /// Loop start sample.
    pub loop_start: u32,
    /// Loop end sample.
    pub loop_end: u32,
}

impl WaveBufferInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let address = GuestAddr::new(r.u64()?);
        let size = r.u64()?;
        let start_offset = r.i32()?;
        let end_offset = r.i32()?;
        let looping = r.bool()?;
        let stream_ended = r.bool()?;
        let sent_to_dsp = r.bool()?;
        r.skip(1)?;
        Ok(Self {
            address,
            size,
            start_offset,
            end_offset,
            looping,
            stream_ended,
            sent_to_dsp,
            loop_count: r.i32()?,
            context_address: GuestAddr::new(r.u64()?),
            context_size: r.u64()?,
            loop_start: r.u32()?,
            loop_end: r.u32()?,
        })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u64(self.address.raw())?;
        w.u64(self.size)?;
        w.i32(self.start_offset)?;
        w.i32(self.end_offset)?;
        w.bool(self.looping)?;
        w.bool(self.stream_ended)?;
        w.bool(self.sent_to_dsp)?;
        w.zeros(1)?;
        w.i32(self.loop_count)?;
        w.u64(self.context_address.raw())?;
        w.u64(self.context_size)?;
        w.u32(self.loop_start)?;
        w.u32(self.loop_end)
    }
}

/// One of the two per-voice biquads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceBiquadParameter {
    /// Filter active.
    pub enabled: bool,
    /// Q14 coefficients.
    pub coefficients: BiquadCoefficients,
}

impl VoiceBiquadParameter {
    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let enabled = r.bool()?;
        r.skip(1)?;
        let mut coefficients = BiquadCoefficients::default();
        for b in &mut coefficients.b {
            *b = r.i16()?;
        }
        for a in &mut coefficients.a {
            *a = r.i16()?;
        }
        Ok(Self { enabled, coefficients })
    }

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.bool(self.enabled)?;
        w.zeros(1)?;
        self.coefficients.b.iter().try_for_each(|&b| w.i16(b))?;
        self.coefficients.a.iter().try_for_each(|&a| w.i16(a))
    }
}

/// Sample encodings a voice can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SampleFormat {
    /// Not decodable.
    #[default]
    Invalid = 0,
    /// Signed 8-bit. Not decodable.
    PcmInt8 = 1,
    /// Signed 16-bit.
    PcmInt16 = 2,
    /// Signed 24-bit. Not decodable.
    PcmInt24 = 3,
    /// Signed 32-bit. Not decodable.
    PcmInt32 = 4,
    /// 32-bit float.
    PcmFloat = 5,
    /// 4-bit DSP-ADPCM.
    Adpcm = 6,
}

impl SampleFormat {
    /// Decodes a format byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PcmInt8,
            2 => Self::PcmInt16,
            3 => Self::PcmInt24,
            4 => Self::PcmInt32,
            5 => Self::PcmFloat,
            6 => Self::Adpcm,
            _ => Self::Invalid,
        }
    }
}

/// Resampler quality requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SrcQuality {
    /// Default quality.
    #[default]
    Medium,
    /// Higher quality.
    High,
    /// Lower quality.
    Low,
}

impl SrcQuality {
    /// Decodes a quality byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::High,
            2 => Self::Low,
            _ => Self::Medium,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Medium => 0,
            Self::High => 1,
            Self::Low => 2,
        }
    }
}

/// One voice record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceInParameter {
    /// Voice slot.
    pub id: u32,
    /// Performance node id.
    pub node_id: u32,
    /// First update for this slot.
    pub is_new: bool,
    /// Slot in use.
    pub in_use: bool,
    /// Requested play state.
    pub play_state: VoicePlayState,
    /// Encoding of the wave buffers.
    pub sample_format: SampleFormat,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// 0 is the most important; larger values are dropped first.
    pub priority: u32,
    /// Tie-break among equal priorities.
    pub sort_order: u32,
    /// Channels, 1..=6.
    pub channel_count: u32,
    /// Playback rate multiplier.
    pub pitch: f32,
    /// Linear volume.
    pub volume: f32,
    /// Per-voice filters.
    pub biquads: [VoiceBiquadParameter; 2],
    /// Buffers the client has queued.
    pub wave_buffer_count: u32,
    /// Buffer the client expects to play next.
    pub wave_buffer_index: u16,
    /// ADPCM coefficient table address.
    pub data_address: GuestAddr,
    /// Bytes at `data_address`.
    pub data_size: u64,
    /// Destination mix.
    pub mix_id: i32,
    /// Destination splitter.
    pub splitter_id: i32,
    /// Queued buffers.
    pub wave_buffers: [WaveBufferInParameter; MAX_WAVE_BUFFERS],
    /// Channel resource per channel.
    pub channel_resource_ids: [u32; MAX_CHANNELS],
    /// Clear a previous drop.
    pub clear_voice_drop: bool,
    /// Buffers to flush from the front of the queue.
    pub flush_count: u8,
    /// Bit 0 resets the played count at loop points, bit 1 skips pitch and
    /// sample rate conversion.
    pub flags: u32,
    /// Resampler quality.
    pub src_quality: SrcQuality,
}

impl VoiceInParameter {
    /// Flag bit: reset played samples at loop points.
    pub const FLAG_PLAYED_SAMPLE_RESET_AT_LOOP: u32 = 1;
    /// Flag bit: bypass pitch and sample rate conversion.
    pub const FLAG_PITCH_AND_SRC_SKIPPED: u32 = 2;

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut p = Self {
            id: r.u32()?,
            node_id: r.u32()?,
            is_new: r.bool()?,
            in_use: r.bool()?,
            play_state: VoicePlayState::from_u8(r.u8()?),
            sample_format: SampleFormat::from_u8(r.u8()?),
            sample_rate: r.u32()?,
            priority: r.u32()?,
            sort_order: r.u32()?,
            channel_count: r.u32()?,
            pitch: r.f32()?,
            volume: r.f32()?,
            ..Default::default()
        };
        for b in &mut p.biquads {
            *b = VoiceBiquadParameter::decode(r)?;
        }
        p.wave_buffer_count = r.u32()?;
        p.wave_buffer_index = r.u16()?;
        r.skip(6)?;
        p.data_address = GuestAddr::new(r.u64()?);
        p.data_size = r.u64()?;
        p.mix_id = r.i32()?;
        p.splitter_id = r.i32()?;
        for wb in &mut p.wave_buffers {
            *wb = WaveBufferInParameter::decode(r)?;
        }
        for id in &mut p.channel_resource_ids {
            *id = r.u32()?;
        }
        p.clear_voice_drop = r.bool()?;
        p.flush_count = r.u8()?;
        r.skip(2)?;
        p.flags = r.u32()?;
        p.src_quality = SrcQuality::from_u8(r.u8()?);
        r.skip(0xF)?;
        Ok(p)
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.id)?;
        w.u32(self.node_id)?;
        w.bool(self.is_new)?;
        w.bool(self.in_use)?;
        w.u8(self.play_state as u8)?;
        w.u8(self.sample_format as u8)?;
        w.u32(self.sample_rate)?;
        w.u32(self.priority)?;
        w.u32(self.sort_order)?;
        w.u32(self.channel_count)?;
        w.f32(self.pitch)?;
        w.f32(self.volume)?;
        self.biquads.iter().try_for_each(|b| b.encode(w))?;
        w.u32(self.wave_buffer_count)?;
        w.u16(self.wave_buffer_index)?;
        w.zeros(6)?;
        w.u64(self.data_address.raw())?;
        w.u64(self.data_size)?;
        w.i32(self.mix_id)?;
        w.i32(self.splitter_id)?;
        self.wave_buffers.iter().try_for_each(|wb| wb.encode(w))?;
        self.channel_resource_ids.iter().try_for_each(|&id| w.u32(id))?;
        w.bool(self.clear_voice_drop)?;
        w.u8(self.flush_count)?;
        w.zeros(2)?;
        w.u32(self.flags)?;
        w.u8(self.src_quality.to_u8())?;
        w.zeros(0xF)
    }
}

// --- effects ---

/// One effect record. Both layout versions share this encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectInParameter {
    /// Effect kind.
    pub effect_type: EffectType,
    /// First update for this slot.
    pub is_new: bool,
    /// Processing enabled.
    pub enabled: bool,
    /// Owning mix.
    pub mix_id: i32,
    /// Guest workbuffer.
    pub workbuffer: GuestAddr,
    /// Bytes at `workbuffer`.
    pub workbuffer_size: u64,
    /// Position among the mix's effects.
    pub process_order: i32,
    /// Type-specific parameters.
    pub specific: [u8; SPECIFIC_SIZE],
}

impl Default for EffectInParameter {
    fn default() -> Self {
        Self {
            effect_type: EffectType::Invalid,
            is_new: false,
            enabled: false,
            mix_id: UNUSED_MIX_ID,
            workbuffer: GuestAddr::NULL,
            workbuffer_size: 0,
            process_order: -1,
            specific: [0; SPECIFIC_SIZE],
        }
    }
}

impl EffectInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let effect_type = EffectType::from_u8(r.u8()?);
        let is_new = r.bool()?;
        let enabled = r.bool()?;
        r.skip(1)?;
        let mix_id = r.i32()?;
        let workbuffer = GuestAddr::new(r.u64()?);
        let workbuffer_size = r.u64()?;
        let process_order = r.i32()?;
        r.skip(4)?;
        Ok(Self {
            effect_type,
            is_new,
            enabled,
            mix_id,
            workbuffer,
            workbuffer_size,
            process_order,
            specific: r.array()?,
        })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u8(self.effect_type as u8)?;
        w.bool(self.is_new)?;
        w.bool(self.enabled)?;
        w.zeros(1)?;
        w.i32(self.mix_id)?;
        w.u64(self.workbuffer.raw())?;
        w.u64(self.workbuffer_size)?;
        w.i32(self.process_order)?;
        w.zeros(4)?;
        w.bytes(&self.specific)
    }
}

// --- splitters ---

/// One splitter: a list of destination ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitterInParameter {
    /// Splitter slot.
    pub id: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Destination data ids, in channel order.
    pub destination_ids: Vec<u32>,
}

/// One splitter destination.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitterDestinationInParameter {
    /// Destination slot.
    pub id: u32,
    /// Volume into each buffer of the destination mix.
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Destination mix.
    pub mix_id: i32,
    /// Slot in use.
    pub in_use: bool,
}

/// The whole splitter section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitterSection {
    /// Splitter records.
    pub infos: Vec<SplitterInParameter>,
    /// Destination records.
    pub destinations: Vec<SplitterDestinationInParameter>,
}

impl SplitterSection {
    /// Decodes the section. Records with a wrong magic end the section early.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let magic = r.u32()?;
        let info_count = r.u32()?;
        let data_count = r.u32()?;
        r.skip(super::SPLITTER_HEADER_SIZE - 0xC)?;
        let mut section = Self::default();
        if magic != SPLITTER_MAGIC {
            return Ok(section);
        }

        for _ in 0..info_count {
            if r.u32()? != SPLITTER_INFO_MAGIC {
                break;
            }
            let id = r.u32()?;
            let sample_rate = r.u32()?;
            let count = r.u32()?;
            let mut destination_ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                destination_ids.push(r.u32()?);
            }
            section.infos.push(SplitterInParameter {
                id,
                sample_rate,
                destination_ids,
            });
        }

        for _ in 0..data_count {
            if r.u32()? != SPLITTER_DESTINATION_MAGIC {
                break;
            }
            let id = r.u32()?;
            let mix_volumes = f32_array(r)?;
            let mix_id = r.i32()?;
            let in_use = r.bool()?;
            r.skip(3)?;
            section.destinations.push(SplitterDestinationInParameter {
                id,
                mix_volumes,
                mix_id,
                in_use,
            });
        }

        Ok(section)
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        super::SPLITTER_HEADER_SIZE
            + self
                .infos
                .iter()
                .map(|i| super::SPLITTER_INFO_SIZE + i.destination_ids.len() * 4)
                .sum::<usize>()
            + self.destinations.len() * super::SPLITTER_DESTINATION_SIZE
    }

    /// Encodes the section.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(SPLITTER_MAGIC)?;
        w.u32(self.infos.len() as u32)?;
        w.u32(self.destinations.len() as u32)?;
        w.zeros(super::SPLITTER_HEADER_SIZE - 0xC)?;
        for info in &self.infos {
            w.u32(SPLITTER_INFO_MAGIC)?;
            w.u32(info.id)?;
            w.u32(info.sample_rate)?;
            w.u32(info.destination_ids.len() as u32)?;
            info.destination_ids.iter().try_for_each(|&id| w.u32(id))?;
        }
        for d in &self.destinations {
            w.u32(SPLITTER_DESTINATION_MAGIC)?;
            w.u32(d.id)?;
            put_f32s(w, &d.mix_volumes)?;
            w.i32(d.mix_id)?;
            w.bool(d.in_use)?;
            w.zeros(3)?;
        }
        Ok(())
    }
}

// --- mixes ---

/// One mix record.
#[derive(Debug, Clone, PartialEq)]
pub struct MixInParameter {
    /// Linear volume applied when mixing out.
    pub volume: f32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Buffers owned by the mix.
    pub buffer_count: u32,
    /// Slot in use.
    pub in_use: bool,
    /// Record changed since the last update.
    pub is_dirty: bool,
    /// Mix slot.
    pub mix_id: i32,
    /// Effects attached to the mix.
    pub effect_count: u32,
    /// Performance node id.
    pub node_id: u32,
    /// `mix_volumes[src][dst]` into the destination mix.
    pub mix_volumes: [[f32; MAX_MIX_BUFFERS]; MAX_MIX_BUFFERS],
    /// Destination mix.
    pub dest_mix_id: i32,
    /// Destination splitter.
    pub dest_splitter_id: i32,
}

impl Default for MixInParameter {
    fn default() -> Self {
        Self {
            volume: 1.0,
            sample_rate: crate::params::TARGET_SAMPLE_RATE,
            buffer_count: 0,
            in_use: false,
            is_dirty: false,
            mix_id: FINAL_MIX_ID,
            effect_count: 0,
            node_id: 0,
            mix_volumes: [[0.0; MAX_MIX_BUFFERS]; MAX_MIX_BUFFERS],
            dest_mix_id: UNUSED_MIX_ID,
            dest_splitter_id: UNUSED_SPLITTER_ID,
        }
    }
}

impl MixInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let volume = r.f32()?;
        let sample_rate = r.u32()?;
        let buffer_count = r.u32()?;
        let in_use = r.bool()?;
        let is_dirty = r.bool()?;
        r.skip(2)?;
        let mix_id = r.i32()?;
        let effect_count = r.u32()?;
        let node_id = r.u32()?;
        r.skip(4)?;
        let mut mix_volumes = [[0.0; MAX_MIX_BUFFERS]; MAX_MIX_BUFFERS];
        for row in &mut mix_volumes {
            *row = f32_array(r)?;
        }
        let dest_mix_id = r.i32()?;
        let dest_splitter_id = r.i32()?;
        r.skip(8)?;
        Ok(Self {
            volume,
            sample_rate,
            buffer_count,
            in_use,
            is_dirty,
            mix_id,
            effect_count,
            node_id,
            mix_volumes,
            dest_mix_id,
            dest_splitter_id,
        })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.f32(self.volume)?;
        w.u32(self.sample_rate)?;
        w.u32(self.buffer_count)?;
        w.bool(self.in_use)?;
        w.bool(self.is_dirty)?;
        w.zeros(2)?;
        w.i32(self.mix_id)?;
        w.u32(self.effect_count)?;
        w.u32(self.node_id)?;
        w.zeros(4)?;
        for row in &self.mix_volumes {
            put_f32s(w, row)?;
        }
        w.i32(self.dest_mix_id)?;
        w.i32(self.dest_splitter_id)?;
        w.zeros(8)
    }
}

// --- sinks ---

/// Sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SinkType {
    /// Unused slot.
    #[default]
    Invalid = 0,
    /// Host audio device.
    Device = 1,
    /// Guest ring buffer.
    CircularBuffer = 2,
}

impl SinkType {
    /// Decodes a type byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Device,
            2 => Self::CircularBuffer,
            _ => Self::Invalid,
        }
    }
}

/// Device sink parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSinkParams {
    /// NUL-padded device name.
    pub name: [u8; 0x100],
    /// Buffers fed to the device.
    pub input_count: u32,
    /// Relative input buffers.
    pub inputs: [u8; MAX_CHANNELS],
    /// Fold six channels into two.
    pub downmix_enabled: bool,
    /// Q16 front, center, LFE and back weights.
    pub downmix_coefficients: [i32; 4],
}

impl Default for DeviceSinkParams {
    fn default() -> Self {
        Self {
            name: [0; 0x100],
            input_count: 0,
            inputs: [0; MAX_CHANNELS],
            downmix_enabled: false,
            downmix_coefficients: [0x1_0000, 0xB505, 0x4041, 0xB505],
        }
    }
}

impl DeviceSinkParams {
    /// Name up to the first NUL.
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Sets the name, truncating to 255 bytes.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; 0x100];
        let n = name.len().min(0xFF);
        self.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    /// Inputs in use.
    pub fn channels(&self) -> usize {
        (self.input_count as usize).min(MAX_CHANNELS)
    }
}

/// Circular buffer sink parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircularSinkParams {
    /// Guest ring address.
    pub address: GuestAddr,
    /// Ring size in bytes.
    pub size: u32,
    /// Buffers written per tick.
    pub input_count: u32,
    /// Samples written per buffer per tick.
    pub sample_count: u32,
    /// Write position the client last saw.
    pub previous_pos: u32,
    /// Sample format byte; only PCM16 is written.
    pub sample_format: u8,
    /// Relative input buffers.
    pub inputs: [u8; MAX_CHANNELS],
}

impl CircularSinkParams {
    /// Inputs in use.
    pub fn channels(&self) -> usize {
        (self.input_count as usize).min(MAX_CHANNELS)
    }
}

/// Type-specific sink parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SinkSpecific {
    /// No parameters.
    #[default]
    None,
    /// Device sink.
    Device(DeviceSinkParams),
    /// Circular buffer sink.
    CircularBuffer(CircularSinkParams),
}

/// One sink record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SinkInParameter {
    /// Sink kind.
    pub sink_type: SinkType,
    /// Slot in use.
    pub in_use: bool,
    /// Performance node id.
    pub node_id: u32,
    /// Type-specific parameters.
    pub specific: SinkSpecific,
}

const SINK_SPECIFIC_SIZE: usize = super::SINK_IN_SIZE - 0x10;

impl SinkInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let sink_type = SinkType::from_u8(r.u8()?);
        let in_use = r.bool()?;
        r.skip(2)?;
        let node_id = r.u32()?;
        r.skip(8)?;
        let raw = r.bytes(SINK_SPECIFIC_SIZE)?;
        let s = &mut Reader::new(raw);
        let specific = match sink_type {
            SinkType::Device => {
                let name = s.array()?;
                let input_count = s.u32()?;
                let inputs = s.array()?;
                let downmix_enabled = s.bool()?;
                s.skip(1)?;
                let mut downmix_coefficients = [0; 4];
                for c in &mut downmix_coefficients {
                    *c = s.i32()?;
                }
                SinkSpecific::Device(DeviceSinkParams {
                    name,
                    input_count,
                    inputs,
                    downmix_enabled,
                    downmix_coefficients,
                })
            }
            SinkType::CircularBuffer => {
                let address = GuestAddr::new(s.u64()?);
                let size = s.u32()?;
                let input_count = s.u32()?;
                let sample_count = s.u32()?;
                let previous_pos = s.u32()?;
                let sample_format = s.u8()?;
                s.skip(3)?;
                SinkSpecific::CircularBuffer(CircularSinkParams {
                    address,
                    size,
                    input_count,
                    sample_count,
                    previous_pos,
                    sample_format,
                    inputs: s.array()?,
                })
            }
            SinkType::Invalid => SinkSpecific::None,
        };
        Ok(Self {
            sink_type,
            in_use,
            node_id,
            specific,
        })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u8(self.sink_type as u8)?;
        w.bool(self.in_use)?;
        w.zeros(2)?;
        w.u32(self.node_id)?;
        w.zeros(8)?;
        let mut raw = [0u8; SINK_SPECIFIC_SIZE];
        let s = &mut Writer::new(&mut raw);
        match &self.specific {
            SinkSpecific::None => {}
            SinkSpecific::Device(d) => {
                s.bytes(&d.name)?;
                s.u32(d.input_count)?;
                s.bytes(&d.inputs)?;
                s.bool(d.downmix_enabled)?;
                s.zeros(1)?;
                d.downmix_coefficients.iter().try_for_each(|&c| s.i32(c))?;
            }
            SinkSpecific::CircularBuffer(c) => {
                s.u64(c.address.raw())?;
                s.u32(c.size)?;
                s.u32(c.input_count)?;
                s.u32(c.sample_count)?;
                s.u32(c.previous_pos)?;
                s.u8(c.sample_format)?;
                s.zeros(3)?;
                s.bytes(&c.inputs)?;
            }
        }
        w.bytes(&raw)
    }
}

// --- performance ---

/// Performance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceInParameter {
    /// Node whose sub-steps get detail entries.
    pub target_node_id: u32,
}

impl PerformanceInParameter {
    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let target_node_id = r.u32()?;
        r.skip(0xC)?;
        Ok(Self { target_node_id })
    }

    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.target_node_id)?;
        w.zeros(0xC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{
        EFFECT_IN_SIZE, MEMORY_POOL_IN_SIZE, MIX_IN_SIZE, SINK_IN_SIZE, VOICE_IN_SIZE, VOICE_RESOURCE_IN_SIZE,
        WAVE_BUFFER_IN_SIZE,
    };

    fn encoded_len(f: impl FnOnce(&mut Writer<'_>) -> Result<(), WireError>) -> usize {
        let mut raw = vec![0u8; 0x1000];
        let mut w = Writer::new(&mut raw);
        f(&mut w).unwrap();
        w.offset()
    }

    // --- sizes ---

    #[test]
    fn records_encode_to_their_wire_size() {
        assert_eq!(encoded_len(|w| MemoryPoolInParameter::default().encode(w)), MEMORY_POOL_IN_SIZE);
        assert_eq!(
            encoded_len(|w| VoiceChannelResourceInParameter::default().encode(w)),
            VOICE_RESOURCE_IN_SIZE
        );
        assert_eq!(encoded_len(|w| WaveBufferInParameter::default().encode(w)), WAVE_BUFFER_IN_SIZE);
        assert_eq!(encoded_len(|w| VoiceInParameter::default().encode(w)), VOICE_IN_SIZE);
        assert_eq!(encoded_len(|w| EffectInParameter::default().encode(w)), EFFECT_IN_SIZE);
        assert_eq!(encoded_len(|w| MixInParameter::default().encode(w)), MIX_IN_SIZE);
        assert_eq!(encoded_len(|w| SinkInParameter::default().encode(w)), SINK_IN_SIZE);
    }

    // --- layouts ---

    #[test]
    fn voice_fields_at_fixed_offsets() {
        let mut v = VoiceInParameter {
            id: 3,
            in_use: true,
            play_state: VoicePlayState::Started,
            sample_format: SampleFormat::PcmInt16,
            mix_id: 0,
            splitter_id: UNUSED_SPLITTER_ID,
            flush_count: 2,
            ..Default::default()
        };
        v.wave_buffers[1].end_offset = 480;
        v.channel_resource_ids[0] = 7;
        let mut raw = [0u8; VOICE_IN_SIZE];
        v.encode(&mut Writer::new(&mut raw)).unwrap();
        assert_eq!(raw[0xA], 0);
        assert_eq!(raw[0xB], 2);
        assert_eq!(&raw[0x98 + 0x14..0x98 + 0x18], &480i32.to_le_bytes());
        assert_eq!(&raw[0x140..0x144], &7u32.to_le_bytes());
        assert_eq!(raw[0x159], 2);
        assert_eq!(VoiceInParameter::decode(&mut Reader::new(&raw)).unwrap(), v);
    }

    #[test]
    fn mix_destinations_at_fixed_offsets() {
        let m = MixInParameter {
            in_use: true,
            buffer_count: 2,
            dest_mix_id: 0,
            ..Default::default()
        };
        let mut raw = [0u8; MIX_IN_SIZE];
        m.encode(&mut Writer::new(&mut raw)).unwrap();
        assert_eq!(&raw[0x920..0x924], &0i32.to_le_bytes());
        assert_eq!(&raw[0x924..0x928], &(-1i32).to_le_bytes());
        assert_eq!(MixInParameter::decode(&mut Reader::new(&raw)).unwrap(), m);
    }

    #[test]
    fn sink_specific_decodes_by_type() {
        let mut d = DeviceSinkParams {
            input_count: 2,
            inputs: [0, 1, 0, 0, 0, 0],
            ..Default::default()
        };
        d.set_name("MainAudioOut");
        let s = SinkInParameter {
            sink_type: SinkType::Device,
            in_use: true,
            node_id: 0x4000_0000,
            specific: SinkSpecific::Device(d),
        };
        let mut raw = [0u8; SINK_IN_SIZE];
        s.encode(&mut Writer::new(&mut raw)).unwrap();
        let back = SinkInParameter::decode(&mut Reader::new(&raw)).unwrap();
        match back.specific {
            SinkSpecific::Device(d) => {
                assert_eq!(d.name(), "MainAudioOut");
                assert_eq!(d.channels(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn splitter_section_size_matches_encoding() {
        let section = SplitterSection {
            infos: vec![SplitterInParameter {
                id: 0,
                sample_rate: 48_000,
                destination_ids: vec![0, 1],
            }],
            destinations: vec![SplitterDestinationInParameter::default(); 2],
        };
        let len = encoded_len(|w| section.encode(w));
        assert_eq!(len, section.encoded_size());
        let mut raw = vec![0u8; len];
        section.encode(&mut Writer::new(&mut raw)).unwrap();
        assert_eq!(SplitterSection::decode(&mut Reader::new(&raw)).unwrap(), section);
    }

    #[test]
    fn unknown_enums_fall_back() {
        assert_eq!(PoolState::from_u32(99), PoolState::Invalid);
        assert_eq!(VoicePlayState::from_u8(7), VoicePlayState::Stopped);
        assert_eq!(SampleFormat::from_u8(42), SampleFormat::Invalid);
        assert_eq!(SinkType::from_u8(3), SinkType::Invalid);
    }
}
