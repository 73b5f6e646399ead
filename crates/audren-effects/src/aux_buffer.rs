//! Aux send/return and capture through client ring buffers.
//!
//! Each workbuffer starts with a 0x40-byte [`AuxBufferInfo`] header followed
//! by `count_max` little-endian `i32` samples. The renderer writes into the
//! send ring and reads back from the return ring; the client sits on the
//! other end of both.
//!
//! Channels of one effect share the rings: channel `i` lands at
//! `write_offset + i * sample_count`, and only the last channel advances the
//! shared offsets.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use audren_core::{GuestAddr, GuestMemory, HostAddr, MemoryAccessError, Reader, WireError};

/// Maximum buffers an aux or capture effect can route.
pub const MAX_MIX_BUFFERS: usize = 0x18;

/// Size of the ring header in guest memory.
pub const AUX_INFO_SIZE: u64 = 0x40;

/// Aux and capture parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AuxParams {
    /// Relative input buffers.
    pub inputs: [u8; MAX_MIX_BUFFERS],
    /// Relative output buffers.
    pub outputs: [u8; MAX_MIX_BUFFERS],
    /// Buffers in use.
    pub mix_buffer_count: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Ring capacity in samples.
    pub count_max: u32,
    /// Upper bound on `mix_buffer_count`.
    pub mix_buffer_count_max: u32,
    /// Guest address of the send ring header.
    pub send_buffer_info_address: GuestAddr,
    /// Guest address of the send ring samples.
    pub send_buffer_address: GuestAddr,
    /// Guest address of the return ring header.
    pub return_buffer_info_address: GuestAddr,
    /// Guest address of the return ring samples.
    pub return_buffer_address: GuestAddr,
    /// Bytes per sample.
    pub mix_buffer_sample_size: u32,
    /// Samples per tick.
    pub sample_count: u32,
    /// Samples per mix buffer.
    pub mix_buffer_sample_count: u32,
}

impl AuxParams {
    /// Decodes the type-specific region.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            inputs: r.array()?,
            outputs: r.array()?,
            mix_buffer_count: r.u32()?,
            sample_rate: r.u32()?,
            count_max: r.u32()?,
            mix_buffer_count_max: r.u32()?,
            send_buffer_info_address: GuestAddr::new(r.u64()?),
            send_buffer_address: GuestAddr::new(r.u64()?),
            return_buffer_info_address: GuestAddr::new(r.u64()?),
            return_buffer_address: GuestAddr::new(r.u64()?),
            mix_buffer_sample_size: r.u32()?,
            sample_count: r.u32()?,
            mix_buffer_sample_count: r.u32()?,
        })
    }

    /// Buffers routed, clamped to the record capacity.
    pub fn channels(&self) -> usize {
        (self.mix_buffer_count as usize).min(MAX_MIX_BUFFERS)
    }

    /// Guest bytes one ring occupies, header included.
    pub fn ring_size(&self) -> u64 {
        AUX_INFO_SIZE + u64::from(self.count_max) * 4
    }
}

/// Ring header shared with the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxBufferInfo {
    /// Next sample the reader consumes.
    pub read_offset: u32,
    /// Next sample the writer produces.
    pub write_offset: u32,
    /// Samples lost to overruns.
    pub lost_sample_count: u32,
    /// Samples written since the last reset.
    pub total_sample_count: u32,
}

impl AuxBufferInfo {
    /// Reads the header at `addr`.
    pub fn load(memory: &dyn GuestMemory, addr: HostAddr) -> Result<Self, MemoryAccessError> {
        let mut raw = [0u8; 16];
        memory.read(addr, &mut raw)?;
        let field = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Ok(Self {
            read_offset: field(0),
            write_offset: field(4),
            lost_sample_count: field(8),
            total_sample_count: field(12),
        })
    }

    /// Writes the header to `addr`.
    pub fn store(&self, memory: &dyn GuestMemory, addr: HostAddr) -> Result<(), MemoryAccessError> {
        let mut raw = [0u8; 16];
        let fields = [self.read_offset, self.write_offset, self.lost_sample_count, self.total_sample_count];
        for (chunk, v) in raw.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        memory.write(addr, &raw)
    }
}

/// Host addresses of one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxRing {
    /// Header address.
    pub info: HostAddr,
    /// First sample address.
    pub samples: HostAddr,
    /// Capacity in samples.
    pub count_max: u32,
}

impl AuxRing {
    /// A ring whose samples follow its header.
    pub fn at(base: HostAddr, count_max: u32) -> Option<Self> {
        Some(Self {
            info: base,
            samples: base.checked_add(AUX_INFO_SIZE)?,
            count_max,
        })
    }

    fn sample_addr(&self, index: u32, len: usize) -> Result<HostAddr, MemoryAccessError> {
        self.samples
            .checked_add(u64::from(index) * 4)
            .ok_or(MemoryAccessError { addr: self.samples, len })
    }

    /// Writes `input` at `info.write_offset + offset`, wrapping at
    /// `count_max`. Advances the write offset by `update_count`.
    ///
    /// Returns the number of samples written; 0 when the request does not
    /// fit the ring.
    pub fn write(
        &self,
        memory: &dyn GuestMemory,
        input: &[i32],
        offset: u32,
        update_count: u32,
    ) -> Result<u32, MemoryAccessError> {
        let count = input.len() as u32;
        if self.count_max == 0 || count > self.count_max {
            return Ok(0);
        }
        let mut info = AuxBufferInfo::load(memory, self.info)?;
        let mut target = info.write_offset + offset;
        if target > self.count_max {
            return Ok(0);
        }

        let mut pos = 0usize;
        while pos < input.len() {
            let run = (self.count_max - target).min(count - pos as u32) as usize;
            if run > 0 {
                let bytes: Vec<u8> = input[pos..pos + run].iter().flat_map(|s| s.to_le_bytes()).collect();
                memory.write(self.sample_addr(target, bytes.len())?, &bytes)?;
            }
            target = (target + run as u32) % self.count_max;
            pos += run;
        }

        if update_count > 0 {
            info.write_offset = (info.write_offset + update_count) % self.count_max;
            info.total_sample_count = info.total_sample_count.wrapping_add(update_count);
            info.store(memory, self.info)?;
        }
        Ok(count)
    }

    /// Fills `output` from `info.read_offset + offset`, wrapping at
    /// `count_max`. Advances the read offset by `update_count`.
    ///
    /// Returns the number of samples read; 0 when the request does not fit
    /// the ring.
    pub fn read(
        &self,
        memory: &dyn GuestMemory,
        output: &mut [i32],
        offset: u32,
        update_count: u32,
    ) -> Result<u32, MemoryAccessError> {
        let count = output.len() as u32;
        if self.count_max == 0 || count > self.count_max {
            return Ok(0);
        }
        let mut info = AuxBufferInfo::load(memory, self.info)?;
        let mut target = info.read_offset + offset;
        if target > self.count_max {
            return Ok(0);
        }

        let mut pos = 0usize;
        let mut bytes = vec![0u8; output.len() * 4];
        while pos < output.len() {
            let run = (self.count_max - target).min(count - pos as u32) as usize;
            if run > 0 {
                let chunk = &mut bytes[..run * 4];
                memory.read(self.sample_addr(target, chunk.len())?, chunk)?;
                for (dst, src) in output[pos..pos + run].iter_mut().zip(chunk.chunks_exact(4)) {
                    *dst = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
                }
            }
            target = (target + run as u32) % self.count_max;
            pos += run;
        }

        if update_count > 0 {
            info.read_offset = (info.read_offset + update_count) % self.count_max;
            info.store(memory, self.info)?;
        }
        Ok(count)
    }

    /// Zeroes the header.
    pub fn reset(&self, memory: &dyn GuestMemory) -> Result<(), MemoryAccessError> {
        AuxBufferInfo::default().store(memory, self.info)
    }
}
