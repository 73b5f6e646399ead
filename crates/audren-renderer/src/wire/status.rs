//! Status records written back to the client.

use audren_core::{ErrorInfo, GuestAddr, MAX_ERRORS, Reader, WireError, Writer};
use audren_effects::{OutStatus, RESULT_STATE_SIZE};

use super::records::PoolState;

/// Memory pool status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolOutStatus {
    /// State after the update.
    pub state: PoolState,
}

impl MemoryPoolOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.state as u32)?;
        w.zeros(0xC)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let state = PoolState::from_u32(r.u32()?);
        r.skip(0xC)?;
        Ok(Self { state })
    }
}

/// Voice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceOutStatus {
    /// Samples played from the current buffer.
    pub played_sample_count: u64,
    /// Buffers consumed since the voice started.
    pub wave_buffers_consumed: u32,
    /// The voice was dropped to stay within budget.
    pub voice_dropped: bool,
}

impl VoiceOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u64(self.played_sample_count)?;
        w.u32(self.wave_buffers_consumed)?;
        w.bool(self.voice_dropped)?;
        w.zeros(3)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let s = Self {
            played_sample_count: r.u64()?,
            wave_buffers_consumed: r.u32()?,
            voice_dropped: r.bool()?,
        };
        r.skip(3)?;
        Ok(s)
    }
}

fn out_status_from_u8(value: u8) -> OutStatus {
    match value {
        1 => OutStatus::New,
        2 => OutStatus::Initialized,
        3 => OutStatus::Used,
        4 => OutStatus::Removed,
        _ => OutStatus::Invalid,
    }
}

/// Effect status, either layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectOutStatus {
    /// Lifecycle state.
    pub state: OutStatus,
    /// Version 2 result state; `None` selects the version 1 layout.
    pub result_state: Option<[u8; RESULT_STATE_SIZE]>,
}

impl EffectOutStatus {
    /// Encodes one record in the layout `result_state` selects.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u8(self.state as u8)?;
        match &self.result_state {
            None => w.zeros(0xF),
            Some(result) => {
                w.zeros(0xF)?;
                w.bytes(result)
            }
        }
    }

    /// Decodes one record; `v2` selects the layout.
    pub fn decode(r: &mut Reader<'_>, v2: bool) -> Result<Self, WireError> {
        let state = out_status_from_u8(r.u8()?);
        r.skip(0xF)?;
        let result_state = if v2 { Some(r.array()?) } else { None };
        Ok(Self { state, result_state })
    }
}

/// Sink status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkOutStatus {
    /// Byte offset a circular sink last wrote at.
    pub last_written_offset: u32,
}

impl SinkOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.last_written_offset)?;
        w.zeros(0x1C)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let last_written_offset = r.u32()?;
        r.skip(0x1C)?;
        Ok(Self { last_written_offset })
    }
}

/// Performance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceOutStatus {
    /// Bytes of frame history written to the performance output.
    pub history_size: u32,
}

impl PerformanceOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u32(self.history_size)?;
        w.zeros(0xC)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let history_size = r.u32()?;
        r.skip(0xC)?;
        Ok(Self { history_size })
    }
}

/// Drained error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorOutStatus {
    /// Logged errors; entries past `error_count` are zero.
    pub errors: [ErrorInfo; MAX_ERRORS],
    /// Entries in use.
    pub error_count: u32,
}

impl Default for BehaviorOutStatus {
    fn default() -> Self {
        Self {
            errors: [ErrorInfo::SUCCESS; MAX_ERRORS],
            error_count: 0,
        }
    }
}

impl BehaviorOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        for e in &self.errors {
            w.u32(e.error_code)?;
            w.zeros(4)?;
            w.u64(e.address.raw())?;
        }
        w.u32(self.error_count)?;
        w.zeros(0xC)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut s = Self::default();
        for e in &mut s.errors {
            let code = r.u32()?;
            r.skip(4)?;
            *e = ErrorInfo::new(code, GuestAddr::new(r.u64()?));
        }
        s.error_count = r.u32()?;
        r.skip(0xC)?;
        Ok(s)
    }
}

/// Renderer-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererInfoOutStatus {
    /// Ticks rendered since the session started.
    pub elapsed_frame_count: u64,
    /// Voices dropped in the last generated tick.
    pub voices_dropped: u32,
}

impl RendererInfoOutStatus {
    /// Encodes one record.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.u64(self.elapsed_frame_count)?;
        w.u32(self.voices_dropped)?;
        w.zeros(4)
    }

    /// Decodes one record.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let s = Self {
            elapsed_frame_count: r.u64()?,
            voices_dropped: r.u32()?,
        };
        r.skip(4)?;
        Ok(s)
    }
}
