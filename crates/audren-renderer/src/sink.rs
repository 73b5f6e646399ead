//! Sinks: where the final mix leaves the renderer.
//!
//! A device sink hands interleaved PCM16 to the host device, optionally
//! folding six channels into two and upsampling to 48 kHz first. A circular
//! buffer sink writes PCM16 frames into a guest ring and reports how far it
//! got.

use audren_core::ErrorInfo;

use crate::memory_pool::{AddressInfo, PoolMapper};
use crate::wire::{SinkInParameter, SinkOutStatus, SinkSpecific, SinkType};

/// One sink slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SinkInfo {
    /// Sink kind.
    pub sink_type: SinkType,
    /// Slot in use.
    pub in_use: bool,
    /// Performance node id.
    pub node_id: u32,
    /// Type-specific parameters.
    pub specific: SinkSpecific,
    /// Guest ring of a circular sink.
    pub buffer: AddressInfo,
    /// The ring is outside every pool.
    pub buffer_unmapped: bool,
    current_pos: u32,
    last_pos: u32,
    last_reported_pos: u32,
}

impl SinkInfo {
    /// Returns the slot to its unused state, keeping nothing.
    pub fn cleanup(&mut self) {
        PoolMapper::force_unmap(&mut self.buffer);
        *self = Self::default();
    }

    /// True if the sink produces no commands.
    pub fn should_skip(&self) -> bool {
        !self.in_use || self.buffer_unmapped
    }

    /// Byte offset the next circular write starts at.
    pub fn current_pos(&self) -> u32 {
        self.current_pos
    }

    /// Applies one record and returns its status.
    ///
    /// A type change drops everything first. A device sink whose in-use flag
    /// did not change only takes the downmix settings. A circular sink
    /// re-attaches its ring when it moved or was unmapped, and restarts at
    /// offset 0.
    pub fn update(&mut self, error: &mut ErrorInfo, params: &SinkInParameter, mapper: &PoolMapper) -> SinkOutStatus {
        *error = ErrorInfo::SUCCESS;
        if self.sink_type != params.sink_type {
            self.cleanup();
            self.sink_type = params.sink_type;
        }

        match (&mut self.specific, &params.specific) {
            (SinkSpecific::Device(current), SinkSpecific::Device(incoming)) if self.in_use == params.in_use => {
                current.downmix_enabled = incoming.downmix_enabled;
                current.downmix_coefficients = incoming.downmix_coefficients;
            }
            (_, SinkSpecific::CircularBuffer(incoming)) => {
                let moved = self.buffer.address() != incoming.address || self.buffer.size() != u64::from(incoming.size);
                if params.in_use && (moved || self.buffer_unmapped || !self.in_use) {
                    self.buffer_unmapped = !mapper.try_attach_buffer(
                        error,
                        &mut self.buffer,
                        incoming.address,
                        u64::from(incoming.size),
                    );
                    self.current_pos = 0;
                    self.last_pos = 0;
                    self.last_reported_pos = 0;
                }
                self.specific = params.specific;
            }
            _ => self.specific = params.specific,
        }

        self.in_use = params.in_use;
        self.node_id = params.node_id;

        SinkOutStatus {
            last_written_offset: match self.specific {
                SinkSpecific::CircularBuffer(_) => self.last_reported_pos,
                _ => 0,
            },
        }
    }

    /// Advances the circular write position past the frames the command list
    /// just generated will write.
    pub fn update_for_command_generation(&mut self) {
        let SinkSpecific::CircularBuffer(c) = self.specific else {
            return;
        };
        if !self.in_use || c.size == 0 {
            return;
        }
        self.last_reported_pos = self.last_pos;
        self.last_pos = self.current_pos;
        let advance = c.channels() as u32 * c.sample_count * 2;
        self.current_pos = (self.current_pos + advance) % c.size;
    }
}

/// Every sink slot of a session.
#[derive(Debug, Clone, Default)]
pub struct SinkContext {
    infos: Vec<SinkInfo>,
}

impl SinkContext {
    /// `count` unused sinks.
    pub fn new(count: usize) -> Self {
        Self {
            infos: vec![SinkInfo::default(); count],
        }
    }

    /// Sink slots.
    pub fn count(&self) -> usize {
        self.infos.len()
    }

    /// Sink `index`.
    pub fn info(&self, index: usize) -> Option<&SinkInfo> {
        self.infos.get(index)
    }

    /// Sink `index`, mutably.
    pub fn info_mut(&mut self, index: usize) -> Option<&mut SinkInfo> {
        self.infos.get_mut(index)
    }

    /// Sinks in slot order.
    pub fn infos(&self) -> &[SinkInfo] {
        &self.infos
    }

    /// Sinks in slot order, mutably.
    pub fn infos_mut(&mut self) -> &mut [SinkInfo] {
        &mut self.infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audren_core::GuestAddr;

    use crate::wire::{CircularSinkParams, DeviceSinkParams, MemoryPoolInParameter, PoolState};

    fn mapper() -> PoolMapper {
        let mut m = PoolMapper::new(1);
        m.update(
            0,
            &MemoryPoolInParameter {
                address: GuestAddr::new(0x20_0000),
                size: 0x1000,
                state: PoolState::RequestAttach,
            },
        )
        .unwrap();
        m
    }

    fn circular(size: u32) -> SinkInParameter {
        SinkInParameter {
            sink_type: SinkType::CircularBuffer,
            in_use: true,
            node_id: 7,
            specific: SinkSpecific::CircularBuffer(CircularSinkParams {
                address: GuestAddr::new(0x20_0000),
                size,
                input_count: 2,
                sample_count: 240,
                ..Default::default()
            }),
        }
    }

    fn device(downmix: bool, name: &str) -> SinkInParameter {
        let mut d = DeviceSinkParams {
            input_count: 2,
            downmix_enabled: downmix,
            ..Default::default()
        };
        d.set_name(name);
        SinkInParameter {
            sink_type: SinkType::Device,
            in_use: true,
            node_id: 1,
            specific: SinkSpecific::Device(d),
        }
    }

    // --- circular ---

    #[test]
    fn circular_position_wraps_and_reports_two_behind() {
        let m = mapper();
        let mut sink = SinkInfo::default();
        let mut err = ErrorInfo::SUCCESS;
        sink.update(&mut err, &circular(0x1000), &m);
        assert!(err.is_success());
        assert!(!sink.should_skip());

        for _ in 0..3 {
            sink.update_for_command_generation();
        }
        // 2 channels * 240 samples * 2 bytes per tick.
        assert_eq!(sink.current_pos(), (3 * 960) % 0x1000);
        let status = sink.update(&mut err, &circular(0x1000), &m);
        assert_eq!(status.last_written_offset, 960);
    }

    #[test]
    fn unmapped_ring_is_skipped() {
        let m = PoolMapper::new(1);
        let mut sink = SinkInfo::default();
        let mut err = ErrorInfo::SUCCESS;
        sink.update(&mut err, &circular(0x1000), &m);
        assert!(!err.is_success());
        assert!(sink.should_skip());
    }

    // --- device ---

    #[test]
    fn device_keeps_name_while_in_use() {
        let m = PoolMapper::new(0);
        let mut sink = SinkInfo::default();
        let mut err = ErrorInfo::SUCCESS;
        sink.update(&mut err, &device(false, "MainAudioOut"), &m);
        sink.update(&mut err, &device(true, "Other"), &m);
        let SinkSpecific::Device(d) = sink.specific else {
            panic!("not a device sink");
        };
        assert_eq!(d.name(), "MainAudioOut");
        assert!(d.downmix_enabled);
    }

    #[test]
    fn type_change_resets_slot() {
        let m = mapper();
        let mut sink = SinkInfo::default();
        let mut err = ErrorInfo::SUCCESS;
        sink.update(&mut err, &circular(0x1000), &m);
        sink.update_for_command_generation();
        sink.update(&mut err, &device(false, "x"), &m);
        assert_eq!(sink.sink_type, SinkType::Device);
        assert_eq!(sink.current_pos(), 0);
        assert!(!sink.buffer.is_mapped());
    }
}
