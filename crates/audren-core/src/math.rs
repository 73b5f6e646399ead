//! Small float helpers for the effect kernels.
//!
//! All functions are allocation-free and `no_std`.

use libm::logf;

/// Convert linear gain to decibels. Inputs at or below zero clamp to -200 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Convert milliseconds to samples.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> f32 {
    ms * sample_rate / 1000.0
}

/// Flush subnormal floats to zero.
///
/// Values below 1e-20 become zero, leaving margin before the IEEE 754
/// subnormal range. Used in feedback paths that decay toward silence.
#[allow(clippy::inline_always)]
#[inline(always)]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_known_values() {
        assert!(linear_to_db(1.0).abs() < 1e-6);
        assert!((linear_to_db(0.5) + 6.0206).abs() < 0.001);
        assert!(linear_to_db(0.0) < -190.0);
    }

    #[test]
    fn ms_samples_conversion() {
        assert_eq!(ms_to_samples(10.0, 48000.0), 480.0);
    }

    #[test]
    fn denormals_flush() {
        assert_eq!(flush_denormal(1e-30), 0.0);
        assert_eq!(flush_denormal(0.25), 0.25);
    }
}
