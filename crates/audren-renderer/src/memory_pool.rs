//! Client memory pools and the mapper that resolves buffers against them.
//!
//! Every guest buffer the renderer touches (wave data, effect workbuffers,
//! aux rings, circular sinks) must sit inside an attached pool. The
//! [`PoolMapper`] is the only place a [`GuestAddr`] becomes a [`HostAddr`].
//! With the `MemoryForceMapping` behavior flag an uncovered buffer is still
//! usable: the failure is logged and the buffer is mapped on its own.

use audren_core::{ErrorInfo, GuestAddr, HostAddr};

use crate::error::{RendererError, Result};
use crate::wire::{MemoryPoolInParameter, PoolState};

/// Pool granularity; address and size must be multiples of this.
pub const POOL_ALIGNMENT: u64 = 0x1000;

/// Which side of the client/coprocessor split owns a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolLocation {
    /// Client memory, mapped on attach.
    #[default]
    Cpu,
    /// Coprocessor memory, always mapped.
    Dsp,
}

/// One memory pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolInfo {
    address: GuestAddr,
    size: u64,
    location: PoolLocation,
    host_base: HostAddr,
    state: PoolState,
    used: bool,
}

impl MemoryPoolInfo {
    /// An empty slot on `location`.
    pub fn new(location: PoolLocation) -> Self {
        Self {
            location,
            state: PoolState::New,
            ..Default::default()
        }
    }

    /// Guest base address.
    pub fn address(&self) -> GuestAddr {
        self.address
    }

    /// Bytes covered.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Owning side.
    pub fn location(&self) -> PoolLocation {
        self.location
    }

    /// State as last reported.
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// True while attached.
    pub fn is_mapped(&self) -> bool {
        !self.host_base.is_null() || (self.location == PoolLocation::Dsp && self.size > 0)
    }

    /// True if a command generated since the last clear referenced the pool.
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// True if `[address, address + size)` lies inside the pool.
    pub fn contains(&self, address: GuestAddr, size: u64) -> bool {
        let Some(offset) = address.offset_from(self.address) else {
            return false;
        };
        offset.checked_add(size).is_some_and(|end| end <= self.size)
    }

    fn translate(&self, address: GuestAddr) -> Option<HostAddr> {
        HostAddr::translate(address, self.address, self.host_base)
    }
}

/// A buffer as resolved by the [`PoolMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressInfo {
    address: GuestAddr,
    size: u64,
    pool: Option<usize>,
    forced: bool,
}

impl AddressInfo {
    /// Guest address of the buffer.
    pub fn address(&self) -> GuestAddr {
        self.address
    }

    /// Bytes in the buffer.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Index of the covering pool, if any.
    pub fn pool(&self) -> Option<usize> {
        self.pool
    }

    /// True if the buffer resolves to host memory.
    pub fn is_mapped(&self) -> bool {
        self.pool.is_some() || self.forced
    }

    /// Host address of the buffer, or [`HostAddr::NULL`] when unmapped.
    ///
    /// `mark_used` pins the covering pool until the next
    /// [`PoolMapper::clear_use_state`], so a detach in between fails with
    /// [`RendererError::InUse`].
    pub fn get_reference(&self, mapper: &mut PoolMapper, mark_used: bool) -> HostAddr {
        if self.forced {
            return HostAddr::mapped_base(self.address);
        }
        let Some(pool) = self.pool.and_then(|i| mapper.pools.get_mut(i)) else {
            return HostAddr::NULL;
        };
        if mark_used {
            pool.used = true;
        }
        pool.translate(self.address).unwrap_or(HostAddr::NULL)
    }
}

/// Owns the pool slots and resolves buffers against them.
#[derive(Debug, Clone, Default)]
pub struct PoolMapper {
    pools: Vec<MemoryPoolInfo>,
    force_map: bool,
}

impl PoolMapper {
    /// `count` empty client pools.
    pub fn new(count: usize) -> Self {
        Self {
            pools: vec![MemoryPoolInfo::new(PoolLocation::Cpu); count],
            force_map: false,
        }
    }

    /// Enables or disables force mapping of uncovered buffers.
    pub fn set_force_map(&mut self, force_map: bool) {
        self.force_map = force_map;
    }

    /// Pool slots.
    pub fn pools(&self) -> &[MemoryPoolInfo] {
        &self.pools
    }

    /// Applies one pool record.
    ///
    /// Attach validates alignment and maps; detach unmaps unless a command
    /// still references the pool. Records in any other state leave the pool
    /// untouched. Returns the state to report.
    pub fn update(&mut self, index: usize, params: &MemoryPoolInParameter) -> Result<PoolState> {
        let pool = self.pools.get_mut(index).ok_or(RendererError::NotFound)?;
        match params.state {
            PoolState::RequestAttach => {
                if pool.is_mapped() {
                    return Err(RendererError::InvalidState);
                }
                if params.address.is_null()
                    || params.size == 0
                    || params.address.raw() % POOL_ALIGNMENT != 0
                    || params.size % POOL_ALIGNMENT != 0
                {
                    return Err(RendererError::InvalidAddressInfo);
                }
                pool.address = params.address;
                pool.size = params.size;
                pool.host_base = HostAddr::mapped_base(params.address);
                pool.state = PoolState::Attached;
                tracing::debug!(index, address = %params.address, size = params.size, "pool attached");
            }
            PoolState::RequestDetach => {
                if !pool.is_mapped() {
                    return Err(RendererError::InvalidState);
                }
                if pool.used {
                    return Err(RendererError::InUse);
                }
                pool.host_base = HostAddr::NULL;
                pool.address = GuestAddr::NULL;
                pool.size = 0;
                pool.state = PoolState::Detached;
                tracing::debug!(index, "pool detached");
            }
            PoolState::Invalid | PoolState::New | PoolState::Attached | PoolState::Detached | PoolState::Released => {}
        }
        Ok(pool.state)
    }

    /// Resolves `[address, address + size)` into `info`.
    ///
    /// On failure `error` records [`RendererError::InvalidAddressInfo`] at
    /// `address`. The return value says whether the buffer is usable, which
    /// with force mapping is true even on failure.
    pub fn try_attach_buffer(
        &self,
        error: &mut ErrorInfo,
        info: &mut AddressInfo,
        address: GuestAddr,
        size: u64,
    ) -> bool {
        *info = AddressInfo {
            address,
            size,
            pool: None,
            forced: false,
        };
        if !address.is_null() {
            info.pool = self.pools.iter().position(|p| p.is_mapped() && p.contains(address, size));
        }
        if info.pool.is_some() {
            *error = ErrorInfo::SUCCESS;
            return true;
        }

        *error = ErrorInfo::new(RendererError::InvalidAddressInfo.code(), address);
        if self.force_map && !address.is_null() {
            info.forced = true;
            tracing::warn!(%address, size, "buffer outside every pool, force mapped");
            return true;
        }
        tracing::warn!(%address, size, "buffer outside every pool");
        false
    }

    /// Drops the pool association of `info`.
    pub fn force_unmap(info: &mut AddressInfo) {
        *info = AddressInfo {
            address: info.address,
            size: info.size,
            pool: None,
            forced: false,
        };
    }

    /// Forgets which pools the previous command list referenced.
    pub fn clear_use_state(&mut self) {
        for pool in &mut self.pools {
            pool.used = false;
        }
    }
}
