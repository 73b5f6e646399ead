//! Fixed-layout little-endian update protocol.
//!
//! A client update is a 0x40-byte [`UpdateDataHeader`] followed by one
//! section per record kind. The renderer answers with the same header layout
//! followed by the status sections. Every section size is validated against
//! `count * record size`, and the sum against the header total.
//!
//! - [`records`] - Parameter records sent by the client
//! - [`status`] - Status records written back
//! - [`request`] - Client-side builder and response parser, used by the CLI
//!   and the tests

pub mod records;
pub mod request;
pub mod status;

pub use records::{
    BehaviorInParameter, CircularSinkParams, DeviceSinkParams, EffectInParameter, MemoryPoolInParameter,
    FINAL_MIX_ID, MixInParameter, PerformanceInParameter, PoolState, SampleFormat, SinkInParameter,
    SinkSpecific, SinkType, SplitterDestinationInParameter, SplitterInParameter, SplitterSection,
    SrcQuality, UNUSED_MIX_ID, UNUSED_SPLITTER_ID, VoiceBiquadParameter, VoiceChannelResourceInParameter,
    VoiceInParameter, VoicePlayState, WaveBufferInParameter,
};
pub use request::{UpdateRequest, UpdateResponse};
pub use status::{
    BehaviorOutStatus, EffectOutStatus, MemoryPoolOutStatus, PerformanceOutStatus, RendererInfoOutStatus,
    SinkOutStatus, VoiceOutStatus,
};

use audren_core::{Reader, WireError, Writer};

/// Bytes in the update header.
pub const HEADER_SIZE: usize = 0x40;
/// Behavior parameter record.
pub const BEHAVIOR_IN_SIZE: usize = 0x10;
/// Behavior status record: ten error entries and a count.
pub const BEHAVIOR_OUT_SIZE: usize = 0xB0;
/// Memory pool parameter record.
pub const MEMORY_POOL_IN_SIZE: usize = 0x20;
/// Memory pool status record.
pub const MEMORY_POOL_OUT_SIZE: usize = 0x10;
/// Voice channel resource record.
pub const VOICE_RESOURCE_IN_SIZE: usize = 0x70;
/// Voice parameter record.
pub const VOICE_IN_SIZE: usize = 0x170;
/// Wave buffer record embedded in a voice.
pub const WAVE_BUFFER_IN_SIZE: usize = 0x38;
/// Voice status record.
pub const VOICE_OUT_SIZE: usize = 0x10;
/// Effect parameter record, both versions.
pub const EFFECT_IN_SIZE: usize = 0xC0;
/// Version 1 effect status record.
pub const EFFECT_OUT_SIZE_V1: usize = 0x10;
/// Version 2 effect status record with result state.
pub const EFFECT_OUT_SIZE_V2: usize = 0x90;
/// Splitter section header.
pub const SPLITTER_HEADER_SIZE: usize = 0x20;
/// Fixed part of a splitter record, before its destination ids.
pub const SPLITTER_INFO_SIZE: usize = 0x10;
/// Splitter destination record.
pub const SPLITTER_DESTINATION_SIZE: usize = 0x70;
/// Header preceding dirty-only mix records.
pub const MIX_DIRTY_HEADER_SIZE: usize = 0x20;
/// Mix parameter record.
pub const MIX_IN_SIZE: usize = 0x930;
/// Sink parameter record.
pub const SINK_IN_SIZE: usize = 0x140;
/// Sink status record.
pub const SINK_OUT_SIZE: usize = 0x20;
/// Performance parameter record.
pub const PERFORMANCE_IN_SIZE: usize = 0x10;
/// Performance status record.
pub const PERFORMANCE_OUT_SIZE: usize = 0x10;
/// Renderer info status record.
pub const RENDERER_INFO_OUT_SIZE: usize = 0x10;

/// Section sizes of an update, input or output.
///
/// Input sizes are in the order the renderer consumes them; output sizes
/// reuse the same slots for the status sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateDataHeader {
    /// Packed `REVn` tag.
    pub revision: u32,
    /// Behavior section.
    pub behavior_size: u32,
    /// Memory pool section.
    pub memory_pool_size: u32,
    /// Voice channel resource section.
    pub voice_resource_size: u32,
    /// Voice section.
    pub voice_size: u32,
    /// Effect section.
    pub effect_size: u32,
    /// Splitter section.
    pub splitter_size: u32,
    /// Mix section.
    pub mix_size: u32,
    /// Sink section.
    pub sink_size: u32,
    /// Performance section.
    pub performance_size: u32,
    /// Renderer info section, output only.
    pub render_info_size: u32,
    /// Header plus every section.
    pub total_size: u32,
}

impl UpdateDataHeader {
    /// Decodes a header from the start of `r`.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut h = Self {
            revision: r.u32()?,
            behavior_size: r.u32()?,
            memory_pool_size: r.u32()?,
            voice_resource_size: r.u32()?,
            voice_size: r.u32()?,
            effect_size: r.u32()?,
            splitter_size: r.u32()?,
            mix_size: r.u32()?,
            sink_size: r.u32()?,
            performance_size: r.u32()?,
            render_info_size: r.u32()?,
            total_size: 0,
        };
        r.skip(0x3C - 0x2C)?;
        h.total_size = r.u32()?;
        Ok(h)
    }

    /// Encodes the header.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        for v in [
            self.revision,
            self.behavior_size,
            self.memory_pool_size,
            self.voice_resource_size,
            self.voice_size,
            self.effect_size,
            self.splitter_size,
            self.mix_size,
            self.sink_size,
            self.performance_size,
            self.render_info_size,
        ] {
            w.u32(v)?;
        }
        w.zeros(0x3C - 0x2C)?;
        w.u32(self.total_size)
    }

    /// Sum of every section size plus the header.
    pub fn computed_total(&self) -> u32 {
        HEADER_SIZE as u32
            + self.behavior_size
            + self.memory_pool_size
            + self.voice_resource_size
            + self.voice_size
            + self.effect_size
            + self.splitter_size
            + self.mix_size
            + self.sink_size
            + self.performance_size
            + self.render_info_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_land_at_fixed_offsets() {
        let h = UpdateDataHeader {
            revision: 0x3056_4552,
            behavior_size: 0x10,
            mix_size: 0x930,
            performance_size: 0x10,
            total_size: 0x9A0,
            ..Default::default()
        };
        let mut raw = [0u8; HEADER_SIZE];
        h.encode(&mut Writer::new(&mut raw)).unwrap();
        assert_eq!(&raw[0..4], &0x3056_4552u32.to_le_bytes());
        assert_eq!(&raw[0x1C..0x20], &0x930u32.to_le_bytes());
        assert_eq!(&raw[0x24..0x28], &0x10u32.to_le_bytes());
        assert_eq!(&raw[0x3C..0x40], &0x9A0u32.to_le_bytes());
        assert_eq!(UpdateDataHeader::decode(&mut Reader::new(&raw)).unwrap(), h);
    }

    #[test]
    fn computed_total_includes_header() {
        let h = UpdateDataHeader {
            voice_size: VOICE_IN_SIZE as u32,
            ..Default::default()
        };
        assert_eq!(h.computed_total(), (HEADER_SIZE + VOICE_IN_SIZE) as u32);
    }

    #[test]
    fn short_header_is_an_error() {
        assert!(UpdateDataHeader::decode(&mut Reader::new(&[0u8; 0x20])).is_err());
    }
}
