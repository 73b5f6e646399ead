//! Renderer error type and the result codes written into the error log.

use thiserror::Error;

/// Module number shared by every renderer result code.
pub const RESULT_MODULE: u32 = 153;

/// Errors reported by the renderer control plane.
///
/// Every variant has a numeric result code (see [`RendererError::code`]) so it
/// can be recorded in the client-visible error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RendererError {
    /// The requested revision is newer than the renderer supports.
    #[error("unsupported revision {0}")]
    InvalidRevision(u32),

    /// The supplied workbuffer is smaller than the session needs.
    #[error("workbuffer too small: need {needed} bytes, got {given}")]
    InsufficientBuffer {
        /// Required size in bytes.
        needed: u64,
        /// Supplied size in bytes.
        given: u64,
    },

    /// Every session slot is in use.
    #[error("no free renderer session")]
    OutOfSessions,

    /// The scheduler already drives the maximum number of systems.
    #[error("scheduler is full")]
    MaxSystemsReached,

    /// The system has not been initialized.
    #[error("renderer not initialized")]
    NotInitialized,

    /// The system is already initialized.
    #[error("renderer already initialized")]
    AlreadyInitialized,

    /// An update blob is malformed or inconsistent.
    #[error("invalid update info: {0}")]
    InvalidUpdateInfo(&'static str),

    /// The process handle is null.
    #[error("invalid process handle")]
    InvalidProcessHandle,

    /// A buffer is not covered by any attached memory pool.
    #[error("address not covered by a memory pool")]
    InvalidAddressInfo,

    /// A memory pool is still referenced by a command.
    #[error("memory pool in use")]
    InUse,

    /// A session, pool or registration was not found.
    #[error("not found")]
    NotFound,

    /// The request is not valid in the current state.
    #[error("invalid state")]
    InvalidState,
}

impl RendererError {
    /// Description number within [`RESULT_MODULE`].
    pub const fn description(self) -> u32 {
        match self {
            RendererError::NotFound => 1,
            RendererError::InsufficientBuffer { .. } => 4,
            RendererError::OutOfSessions => 5,
            RendererError::MaxSystemsReached => 8,
            RendererError::InUse => 14,
            RendererError::InvalidState => 16,
            RendererError::InvalidUpdateInfo(_) => 41,
            RendererError::InvalidAddressInfo => 42,
            RendererError::NotInitialized => 1000,
            RendererError::AlreadyInitialized => 1001,
            RendererError::InvalidProcessHandle => 1536,
            RendererError::InvalidRevision(_) => 1537,
        }
    }

    /// Packed result code: module in the low 9 bits, description above.
    pub const fn code(self) -> u32 {
        RESULT_MODULE | (self.description() << 9)
    }
}

impl From<audren_core::WireError> for RendererError {
    fn from(_: audren_core::WireError) -> Self {
        RendererError::InvalidUpdateInfo("truncated record")
    }
}

/// Convenience result type for renderer operations.
pub type Result<T> = std::result::Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_carry_module() {
        for e in [
            RendererError::OutOfSessions,
            RendererError::InvalidUpdateInfo("x"),
            RendererError::InvalidRevision(13),
        ] {
            assert_eq!(e.code() & 0x1FF, RESULT_MODULE);
        }
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            RendererError::InvalidRevision(0),
            RendererError::InsufficientBuffer { needed: 0, given: 0 },
            RendererError::OutOfSessions,
            RendererError::MaxSystemsReached,
            RendererError::NotInitialized,
            RendererError::AlreadyInitialized,
            RendererError::InvalidUpdateInfo(""),
            RendererError::InvalidProcessHandle,
            RendererError::InvalidAddressInfo,
            RendererError::InUse,
            RendererError::NotFound,
            RendererError::InvalidState,
        ];
        let mut codes: Vec<u32> = all.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn display_messages() {
        assert_eq!(RendererError::InvalidRevision(13).to_string(), "unsupported revision 13");
        assert_eq!(
            RendererError::InsufficientBuffer { needed: 10, given: 4 }.to_string(),
            "workbuffer too small: need 10 bytes, got 4"
        );
    }
}
