//! Enumerations shared by every effect record.

/// Maximum channels an effect processes.
pub const MAX_CHANNELS: usize = 6;

/// Size of the type-specific region inside an effect parameter record.
pub const SPECIFIC_SIZE: usize = 0xA0;

/// Size of the result-state blob in the version 2 effect status.
pub const RESULT_STATE_SIZE: usize = 0x80;

/// True for the channel layouts the kernels implement: 1, 2, 4 or 6.
pub fn is_channel_count_valid(count: u16) -> bool {
    matches!(count, 1 | 2 | 4 | 6)
}

/// Effect kind, as encoded in the first byte of the parameter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EffectType {
    /// Unused slot.
    #[default]
    Invalid = 0,
    /// Per-buffer volume mix.
    BufferMixer = 1,
    /// Send/return through client ring buffers.
    Aux = 2,
    /// Multichannel feedback delay.
    Delay = 3,
    /// FDN reverb.
    Reverb = 4,
    /// I3DL2 reverb. Accepted, produces no commands.
    I3dl2Reverb = 5,
    /// Biquad per channel.
    BiquadFilter = 6,
    /// Lookahead peak limiter.
    LightLimiter = 7,
    /// Send-only capture into a client ring buffer.
    Capture = 8,
    /// Compressor. Accepted, produces no commands.
    Compressor = 9,
}

impl EffectType {
    /// Decodes a type byte. Unknown values map to [`EffectType::Invalid`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EffectType::BufferMixer,
            2 => EffectType::Aux,
            3 => EffectType::Delay,
            4 => EffectType::Reverb,
            5 => EffectType::I3dl2Reverb,
            6 => EffectType::BiquadFilter,
            7 => EffectType::LightLimiter,
            8 => EffectType::Capture,
            9 => EffectType::Compressor,
            _ => EffectType::Invalid,
        }
    }

    /// Number of guest workbuffers the effect attaches.
    pub fn workbuffer_count(self) -> usize {
        match self {
            EffectType::Aux => 2,
            EffectType::Delay
            | EffectType::Reverb
            | EffectType::I3dl2Reverb
            | EffectType::LightLimiter
            | EffectType::Capture
            | EffectType::Compressor => 1,
            EffectType::Invalid | EffectType::BufferMixer | EffectType::BiquadFilter => 0,
        }
    }
}

/// Lifecycle of an effect slot as tracked by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageState {
    /// Slot not in use.
    #[default]
    Invalid,
    /// Slot received its first parameters this update.
    New,
    /// Processed with the effect enabled last tick.
    Enabled,
    /// Processed with the effect disabled last tick.
    Disabled,
}

/// State reported back to the client per effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OutStatus {
    /// Unused.
    #[default]
    Invalid = 0,
    /// Freshly created.
    New = 1,
    /// Initialized but not yet processed.
    Initialized = 2,
    /// In use by the renderer.
    Used = 3,
    /// Removed from processing.
    Removed = 4,
}

/// Handshake between client updates and the DSP state.
///
/// The client writes `Updating` when parameters change. The kernel
/// (re)initializes on `Initialized`, refreshes on `Updating`, and the renderer
/// marks the record `Updated` once a command list has carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ParameterState {
    /// DSP state must be built from scratch.
    #[default]
    Initialized = 0,
    /// DSP state must pick up new parameters.
    Updating = 1,
    /// Nothing pending.
    Updated = 2,
}

impl ParameterState {
    /// Decodes a state byte. Unknown values are treated as `Updated`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ParameterState::Initialized,
            1 => ParameterState::Updating,
            _ => ParameterState::Updated,
        }
    }
}
