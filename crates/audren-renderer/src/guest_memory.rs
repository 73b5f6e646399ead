//! Flat guest RAM for hosts without a real memory system.
//!
//! [`FlatGuestMemory`] backs a contiguous guest range `[base, base + len)`
//! with a host `Vec<u8>`. The CLI and the tests place wave data, aux rings
//! and circular sink buffers in it.

use audren_core::{GuestAddr, GuestMemory, HostAddr, MemoryAccessError};
use parking_lot::RwLock;

/// Contiguous guest memory starting at a fixed base address.
#[derive(Debug)]
pub struct FlatGuestMemory {
    base: u64,
    mem: RwLock<Vec<u8>>,
}

impl FlatGuestMemory {
    /// Creates `size_bytes` of zeroed memory mapped at `base`.
    pub fn new(base: GuestAddr, size_bytes: usize) -> Self {
        Self {
            base: base.raw(),
            mem: RwLock::new(vec![0u8; size_bytes]),
        }
    }

    /// First guest address covered.
    pub fn base(&self) -> GuestAddr {
        GuestAddr::new(self.base)
    }

    /// Bytes covered.
    pub fn len(&self) -> usize {
        self.mem.read().len()
    }

    /// True if no bytes are covered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes through a guest address, as the client would.
    pub fn write_guest(&self, addr: GuestAddr, data: &[u8]) -> Result<(), MemoryAccessError> {
        self.write(HostAddr::mapped_base(addr), data)
    }

    /// Reads through a guest address, as the client would.
    pub fn read_guest(&self, addr: GuestAddr, out: &mut [u8]) -> Result<(), MemoryAccessError> {
        self.read(HostAddr::mapped_base(addr), out)
    }

    fn range(&self, addr: HostAddr, len: usize, total: usize) -> Result<(usize, usize), MemoryAccessError> {
        let err = MemoryAccessError { addr, len };
        let offset = addr.raw().checked_sub(self.base).ok_or(err)?;
        let start = usize::try_from(offset).map_err(|_| err)?;
        let end = start.checked_add(len).ok_or(err)?;
        if end > total {
            return Err(err);
        }
        Ok((start, end))
    }
}

impl GuestMemory for FlatGuestMemory {
    fn read(&self, addr: HostAddr, out: &mut [u8]) -> Result<(), MemoryAccessError> {
        let mem = self.mem.read();
        let (start, end) = self.range(addr, out.len(), mem.len())?;
        out.copy_from_slice(&mem[start..end]);
        Ok(())
    }

    fn write(&self, addr: HostAddr, data: &[u8]) -> Result<(), MemoryAccessError> {
        let mut mem = self.mem.write();
        let (start, end) = self.range(addr, data.len(), mem.len())?;
        mem[start..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_writes_at_offset() {
        let mem = FlatGuestMemory::new(GuestAddr::new(0x1_0000), 0x100);
        mem.write_guest(GuestAddr::new(0x1_0010), &[1, 2, 3]).unwrap();
        let mut out = [0u8; 3];
        mem.read_guest(GuestAddr::new(0x1_0010), &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn accesses_outside_range_fail() {
        let mem = FlatGuestMemory::new(GuestAddr::new(0x1000), 0x10);
        let mut out = [0u8; 4];
        assert!(mem.read_guest(GuestAddr::new(0xFFF), &mut out).is_err());
        assert!(mem.read_guest(GuestAddr::new(0x100E), &mut out).is_err());
        assert!(mem.write_guest(GuestAddr::new(0x100C), &[0; 4]).is_ok());
    }

    #[test]
    fn u32_helpers() {
        let mem = FlatGuestMemory::new(GuestAddr::new(0), 8);
        mem.write_u32(HostAddr::NULL, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(HostAddr::NULL).unwrap(), 0xDEAD_BEEF);
        assert_eq!(mem.len(), 8);
    }
}
