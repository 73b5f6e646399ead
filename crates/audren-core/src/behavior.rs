//! Revision decoding, the behavioral feature table, and the bounded error log.
//!
//! Clients declare a revision as a packed `"REVn"` tag. Every version-specific
//! quirk in the renderer is gated on [`Feature::min_revision`]: a feature is
//! active iff its minimum revision is at or below the requested revision.
//!
//! # Table discipline
//!
//! [`Feature::min_revision`] is append-only. Existing rows never change; new
//! behavior gets a new variant at a higher revision.
//!
//! # Error log
//!
//! [`BehaviorInfo`] keeps up to [`MAX_ERRORS`] entries. Once full, further
//! errors are dropped (the oldest are never evicted).

use crate::memory::GuestAddr;
use core::fmt;

/// Highest revision this renderer understands.
pub const MAX_REVISION: u32 = 12;

/// Capacity of the per-update error log.
pub const MAX_ERRORS: usize = 10;

/// Packs four ASCII bytes into a little-endian magic word.
pub const fn make_magic(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

const REVISION_BASE: u32 = make_magic(b'R', b'E', b'V', b'0');

/// A decoded client revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(u32);

impl Revision {
    /// The newest supported revision.
    pub const CURRENT: Revision = Revision(MAX_REVISION);

    /// Wraps a plain revision number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// Decodes a packed `"REVn"` tag.
    ///
    /// Values below `0x100` are taken as plain revision numbers.
    pub const fn from_tag(tag: u32) -> Self {
        if tag >= 0x100 {
            Self(tag.wrapping_sub(REVISION_BASE) >> 24)
        } else {
            Self(tag)
        }
    }

    /// Encodes this revision as a `"REVn"` tag.
    pub const fn to_tag(self) -> u32 {
        REVISION_BASE.wrapping_add(self.0 << 24)
    }

    /// Returns the revision number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// True if this renderer can honour the revision.
    pub const fn is_valid(self) -> bool {
        self.0 <= MAX_REVISION
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REV{}", self.0)
    }
}

/// A named behavior introduced at a specific revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Command lists may use 70% of the DSP frame.
    ProcessingTimeLimit70,
    /// Splitter records are accepted.
    Splitter,
    /// ADPCM wave buffers carry their own loop context.
    AdpcmLoopContextBugFix,
    /// Reverb pre-delay line holds 350ms instead of 150ms.
    LongSizePreDelay,
    /// USB audio device output.
    AudioUsbDeviceOutput,
    /// Command lists may use 75% of the DSP frame.
    ProcessingTimeLimit75,
    /// Looping resets the played sample count.
    VoicePlayedSampleCountResetAtLoopPoint,
    /// Voices may bypass pitch and sample rate conversion.
    VoicePitchAndSrcSkipped,
    /// Corrected splitter destination handling.
    SplitterBugFix,
    /// Voices may flush queued wave buffers.
    FlushVoiceWaveBuffers,
    /// Elapsed frame count reported in renderer info.
    ElapsedFrameCount,
    /// Command lists may use 80% of the DSP frame.
    ProcessingTimeLimit80,
    /// Command buffer size depends on parameters.
    VariadicCommandBufferSize,
    /// Performance frames use the version 2 encoding.
    PerformanceMetricsDataFormatV2,
    /// Second processing-time estimator.
    CommandProcessingTimeEstimatorV2,
    /// Biquad effect clears its state on (re)initialization.
    BiquadFilterEffectStateClearBugFix,
    /// Effect records use the version 2 layout.
    EffectInfoVer2,
    /// Third processing-time estimator.
    CommandProcessingTimeEstimatorV3,
    /// Fourth processing-time estimator.
    CommandProcessingTimeEstimatorV4,
    /// Mix volumes use Q23 instead of Q15.
    VolumeMixParameterPrecisionQ23,
    /// Biquads are processed in floating point.
    BiquadFilterFloatProcessing,
    /// Mix section carries only dirty records.
    MixInParameterDirtyOnlyUpdate,
    /// Wave buffers use the version 2 layout.
    WaveBufferVer2,
    /// Second device API.
    DeviceApiVersion2,
    /// Delay effect channel remap.
    DelayChannelMappingChange,
    /// Reverb effect channel remap.
    ReverbChannelMappingChange,
    /// I3DL2 reverb effect channel remap.
    I3dl2ReverbChannelMappingChange,
    /// Two voice biquads may run as one multi-tap command.
    MultiTapBiquadFilterProcessing,
    /// Fifth processing-time estimator.
    CommandProcessingTimeEstimatorV5,
}

impl Feature {
    /// Every feature, in table order.
    pub const ALL: [Feature; 29] = [
        Feature::ProcessingTimeLimit70,
        Feature::Splitter,
        Feature::AdpcmLoopContextBugFix,
        Feature::LongSizePreDelay,
        Feature::AudioUsbDeviceOutput,
        Feature::ProcessingTimeLimit75,
        Feature::VoicePlayedSampleCountResetAtLoopPoint,
        Feature::VoicePitchAndSrcSkipped,
        Feature::SplitterBugFix,
        Feature::FlushVoiceWaveBuffers,
        Feature::ElapsedFrameCount,
        Feature::ProcessingTimeLimit80,
        Feature::VariadicCommandBufferSize,
        Feature::PerformanceMetricsDataFormatV2,
        Feature::CommandProcessingTimeEstimatorV2,
        Feature::BiquadFilterEffectStateClearBugFix,
        Feature::EffectInfoVer2,
        Feature::CommandProcessingTimeEstimatorV3,
        Feature::CommandProcessingTimeEstimatorV4,
        Feature::VolumeMixParameterPrecisionQ23,
        Feature::BiquadFilterFloatProcessing,
        Feature::MixInParameterDirtyOnlyUpdate,
        Feature::WaveBufferVer2,
        Feature::DeviceApiVersion2,
        Feature::DelayChannelMappingChange,
        Feature::ReverbChannelMappingChange,
        Feature::I3dl2ReverbChannelMappingChange,
        Feature::MultiTapBiquadFilterProcessing,
        Feature::CommandProcessingTimeEstimatorV5,
    ];

    /// The revision that introduced this feature.
    pub const fn min_revision(self) -> u32 {
        match self {
            Feature::ProcessingTimeLimit70 => 1,
            Feature::Splitter | Feature::AdpcmLoopContextBugFix => 2,
            Feature::LongSizePreDelay => 3,
            Feature::AudioUsbDeviceOutput | Feature::ProcessingTimeLimit75 => 4,
            Feature::VoicePlayedSampleCountResetAtLoopPoint
            | Feature::VoicePitchAndSrcSkipped
            | Feature::SplitterBugFix
            | Feature::FlushVoiceWaveBuffers
            | Feature::ElapsedFrameCount
            | Feature::ProcessingTimeLimit80
            | Feature::VariadicCommandBufferSize
            | Feature::PerformanceMetricsDataFormatV2
            | Feature::CommandProcessingTimeEstimatorV2 => 5,
            Feature::BiquadFilterEffectStateClearBugFix => 6,
            Feature::EffectInfoVer2 => 7,
            Feature::CommandProcessingTimeEstimatorV3 => 8,
            Feature::CommandProcessingTimeEstimatorV4
            | Feature::VolumeMixParameterPrecisionQ23
            | Feature::BiquadFilterFloatProcessing => 10,
            Feature::MixInParameterDirtyOnlyUpdate
            | Feature::WaveBufferVer2
            | Feature::DeviceApiVersion2
            | Feature::DelayChannelMappingChange
            | Feature::ReverbChannelMappingChange
            | Feature::I3dl2ReverbChannelMappingChange => 11,
            Feature::MultiTapBiquadFilterProcessing
            | Feature::CommandProcessingTimeEstimatorV5 => 12,
        }
    }

    /// True if the feature is active at `revision`.
    pub const fn is_supported_at(self, revision: Revision) -> bool {
        self.min_revision() <= revision.get()
    }
}

/// Client-controlled behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorFlags(u64);

impl BehaviorFlags {
    /// Attachment failures still yield a usable (pool-less) buffer.
    pub const MEMORY_FORCE_MAPPING: u64 = 1;

    /// Wraps raw flag bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns raw flag bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True if force mapping is requested.
    pub const fn memory_force_mapping(self) -> bool {
        self.0 & Self::MEMORY_FORCE_MAPPING != 0
    }
}

/// One error log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorInfo {
    /// Numeric result code.
    pub error_code: u32,
    /// Guest address the error refers to.
    pub address: GuestAddr,
}

impl ErrorInfo {
    /// A successful (empty) entry.
    pub const SUCCESS: ErrorInfo = ErrorInfo {
        error_code: 0,
        address: GuestAddr::NULL,
    };

    /// Creates an entry.
    pub const fn new(error_code: u32, address: GuestAddr) -> Self {
        Self {
            error_code,
            address,
        }
    }

    /// True if this entry carries no error.
    pub const fn is_success(&self) -> bool {
        self.error_code == 0
    }
}

/// Performance frame encoding selected by revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceFormat {
    /// 0x18-byte frame headers.
    V1,
    /// 0x30-byte frame headers.
    V2,
}

/// Revision/feature oracle plus the bounded error log for one session.
#[derive(Debug, Clone)]
pub struct BehaviorInfo {
    process_revision: Revision,
    user_revision: Revision,
    flags: BehaviorFlags,
    errors: [ErrorInfo; MAX_ERRORS],
    error_count: usize,
}

impl BehaviorInfo {
    /// Creates an oracle with no user revision set.
    pub fn new() -> Self {
        Self {
            process_revision: Revision::CURRENT,
            user_revision: Revision::new(0),
            flags: BehaviorFlags::default(),
            errors: [ErrorInfo::SUCCESS; MAX_ERRORS],
            error_count: 0,
        }
    }

    /// Revision implemented by this renderer.
    pub fn process_revision(&self) -> Revision {
        self.process_revision
    }

    /// Revision requested by the client.
    pub fn user_revision(&self) -> Revision {
        self.user_revision
    }

    /// Decodes and stores the client's revision tag.
    pub fn set_user_revision(&mut self, tag: u32) {
        self.user_revision = Revision::from_tag(tag);
        #[cfg(feature = "tracing")]
        tracing::debug!("behavior: user revision {}", self.user_revision);
    }

    /// Replaces the client flags.
    pub fn update_flags(&mut self, flags: BehaviorFlags) {
        self.flags = flags;
    }

    /// Current client flags.
    pub fn flags(&self) -> BehaviorFlags {
        self.flags
    }

    /// True if `feature` is active for the requested revision.
    pub fn is_supported(&self, feature: Feature) -> bool {
        feature.is_supported_at(self.user_revision)
    }

    /// True if attachment failures should still yield a buffer.
    pub fn is_memory_force_mapping_enabled(&self) -> bool {
        self.flags.memory_force_mapping()
    }

    /// Percentage of the DSP frame a command list may use.
    pub fn processing_time_limit_percent(&self) -> u32 {
        if self.is_supported(Feature::ProcessingTimeLimit80) {
            80
        } else if self.is_supported(Feature::ProcessingTimeLimit75) {
            75
        } else {
            70
        }
    }

    /// Performance frame encoding for the requested revision.
    pub fn performance_format(&self) -> PerformanceFormat {
        if self.is_supported(Feature::PerformanceMetricsDataFormatV2) {
            PerformanceFormat::V2
        } else {
            PerformanceFormat::V1
        }
    }

    /// Processing-time estimator generation for the requested revision.
    pub fn estimator_version(&self) -> u32 {
        if self.is_supported(Feature::CommandProcessingTimeEstimatorV5) {
            5
        } else if self.is_supported(Feature::CommandProcessingTimeEstimatorV4) {
            4
        } else if self.is_supported(Feature::CommandProcessingTimeEstimatorV3) {
            3
        } else if self.is_supported(Feature::CommandProcessingTimeEstimatorV2) {
            2
        } else {
            1
        }
    }

    /// Fractional bits of mix volumes: 23 or 15.
    pub fn mix_precision_bits(&self) -> u32 {
        if self.is_supported(Feature::VolumeMixParameterPrecisionQ23) {
            23
        } else {
            15
        }
    }

    /// Records an error. Entries past [`MAX_ERRORS`] are dropped.
    pub fn append_error(&mut self, error: ErrorInfo) {
        if error.is_success() {
            return;
        }
        if self.error_count < MAX_ERRORS {
            self.errors[self.error_count] = error;
            self.error_count += 1;
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!("behavior: error log full, dropping code {}", error.error_code);
        }
    }

    /// Number of errors recorded since the last drain.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Copies the log into `out`, zero-fills unused slots, and resets the count.
    ///
    /// Returns the number of entries copied. Stored entries are left in place.
    pub fn drain_errors(&mut self, out: &mut [ErrorInfo; MAX_ERRORS]) -> usize {
        let count = self.error_count.min(MAX_ERRORS);
        out[..count].copy_from_slice(&self.errors[..count]);
        out[count..].fill(ErrorInfo::SUCCESS);
        self.error_count = 0;
        count
    }

    /// Resets the count without copying.
    pub fn clear_errors(&mut self) {
        self.error_count = 0;
    }
}

impl Default for BehaviorInfo {
    fn default() -> Self {
        Self::new()
    }
}
