//! Typed addresses and the guest-memory collaborator.
//!
//! The renderer never does pointer arithmetic on raw integers. A client hands
//! over [`GuestAddr`] values inside parameter records; only a memory pool
//! mapping can turn one into a [`HostAddr`], which is what the command
//! processor reads and writes through a [`GuestMemory`] implementation.
//!
//! There is no `From<GuestAddr> for HostAddr`.

use core::fmt;

/// An address in the client's (guest) address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestAddr(u64);

impl GuestAddr {
    /// The null guest address.
    pub const NULL: GuestAddr = GuestAddr(0);

    /// Wraps a raw guest address.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true for the null address.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Offsets the address by `bytes`, returning `None` on overflow.
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// Byte distance from `base`, or `None` if `self` is below `base`.
    pub fn offset_from(self, base: GuestAddr) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guest:{:#x}", self.0)
    }
}

/// A translated address usable by the command processor.
///
/// Only produced by a memory pool translation (see `PoolMapper` in the
/// renderer crate) or by [`HostAddr::translate`] which that mapper calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddr(u64);

impl HostAddr {
    /// The null host address.
    pub const NULL: HostAddr = HostAddr(0);

    /// Translates a guest address through a mapping whose guest range starts at
    /// `guest_base` and whose host range starts at `host_base`.
    ///
    /// Returns `None` if `addr` lies below `guest_base`.
    pub fn translate(addr: GuestAddr, guest_base: GuestAddr, host_base: HostAddr) -> Option<Self> {
        let offset = addr.offset_from(guest_base)?;
        host_base.0.checked_add(offset).map(Self)
    }

    /// Builds the host base of a freshly mapped region.
    ///
    /// The emulated coprocessor shares the guest's physical view, so a mapped
    /// region's host base carries the same numeric value as its guest base.
    pub const fn mapped_base(guest_base: GuestAddr) -> Self {
        Self(guest_base.0)
    }

    /// Returns the raw integer value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true for the null address.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Offsets the address by `bytes`, returning `None` on overflow.
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host:{:#x}", self.0)
    }
}

/// Error returned when a memory access falls outside backed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccessError {
    /// First byte of the failed access.
    pub addr: HostAddr,
    /// Length of the failed access in bytes.
    pub len: usize,
}

impl fmt::Display for MemoryAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory access of {} bytes at {} is out of bounds", self.len, self.addr)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MemoryAccessError {}

/// Raw byte access to translated guest memory.
///
/// Implementations use interior mutability so one instance can be shared by
/// the control plane and the coprocessor thread.
pub trait GuestMemory: Send + Sync {
    /// Fills `out` from memory starting at `addr`.
    fn read(&self, addr: HostAddr, out: &mut [u8]) -> Result<(), MemoryAccessError>;

    /// Writes `data` to memory starting at `addr`.
    fn write(&self, addr: HostAddr, data: &[u8]) -> Result<(), MemoryAccessError>;

    /// Reads a little-endian `u32`.
    fn read_u32(&self, addr: HostAddr) -> Result<u32, MemoryAccessError> {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Writes a little-endian `u32`.
    fn write_u32(&self, addr: HostAddr, value: u32) -> Result<(), MemoryAccessError> {
        self.write(addr, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_offsets_into_host_range() {
        let base = GuestAddr::new(0x1000);
        let host = HostAddr::mapped_base(base);
        let t = HostAddr::translate(GuestAddr::new(0x1040), base, host).unwrap();
        assert_eq!(t.raw(), 0x1040);
    }

    #[test]
    fn translate_below_base_fails() {
        let base = GuestAddr::new(0x1000);
        assert!(HostAddr::translate(GuestAddr::new(0xFFF), base, HostAddr::mapped_base(base)).is_none());
    }

    #[test]
    fn display_distinguishes_spaces() {
        assert_eq!(GuestAddr::new(0x20).to_string(), "guest:0x20");
        assert_eq!(HostAddr::mapped_base(GuestAddr::new(0x20)).to_string(), "host:0x20");
    }
}
