//! Audren Core - primitives for the emulated audio renderer
//!
//! This crate holds the pieces of the renderer that have no notion of
//! sessions, threads or wire formats. Everything here is deterministic and
//! allocation-free on the processing path.
//!
//! # Compatibility
//!
//! - [`BehaviorInfo`] - Revision gate: decodes the client's `REVn` tag, answers
//!   feature queries from an append-only table and keeps a bounded error log
//! - [`Feature`] - Every revision-gated behavior, with its minimum revision
//!
//! # Memory
//!
//! - [`GuestAddr`] / [`HostAddr`] - Distinct address spaces; only a pool
//!   mapping converts between them
//! - [`GuestMemory`] - Byte access to translated memory
//! - [`MixBufferArena`] - Flat per-tick sample buffers
//!
//! # Signal Processing
//!
//! - [`UpsamplerState`] - Bit-exact polyphase upsampler to 48 kHz
//! - [`BiquadCoefficients`] with [`biquad::process_fixed`] and
//!   [`biquad::process_float`] - Q14 biquad kernels
//! - [`DelayLine`] - Circular delay for the delay and reverb effects
//! - [`fixed_point`] - Q-format conversions and saturating gain
//!
//! # Records
//!
//! - [`Reader`] / [`Writer`] - Bounds-checked little-endian cursors
//!
//! # no_std Support
//!
//! Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! audren-core = { version = "0.1", default-features = false }
//! ```
//!
//! Enable the `tracing` feature to get diagnostics from the revision gate and
//! the upsampler.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod behavior;
pub mod biquad;
pub mod delay;
pub mod fixed_point;
pub mod math;
pub mod memory;
pub mod mix_buffer;
pub mod upsampler;
pub mod wire;

pub use behavior::{
    BehaviorFlags, BehaviorInfo, ErrorInfo, Feature, MAX_ERRORS, MAX_REVISION, PerformanceFormat,
    Revision, make_magic,
};
pub use biquad::{BiquadCoefficients, BiquadFilterState, highpass_coefficients, lowpass_coefficients};
pub use delay::DelayLine;
pub use math::{flush_denormal, linear_to_db, ms_to_samples};
pub use memory::{GuestAddr, GuestMemory, HostAddr, MemoryAccessError};
pub use mix_buffer::MixBufferArena;
pub use upsampler::{UpsampleRatio, UpsamplerState};
pub use wire::{Reader, WireError, Writer};
