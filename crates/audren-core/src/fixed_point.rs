//! Fixed-point helpers shared by the command kernels.
//!
//! Mix buffers hold `i32` samples at 16-bit scale. Volumes are applied as
//! Q15 or Q23 multipliers, biquad coefficients are Q14, resampler fractions
//! are Q15 and the upsampler windows are Q17.15.

/// Converts a float to a fixed-point raw value with `frac_bits` fractional bits,
/// truncating toward zero.
#[inline]
pub fn to_fixed(value: f32, frac_bits: u32) -> i64 {
    (f64::from(value) * f64::from(1u32 << frac_bits)) as i64
}

/// Converts a fixed-point raw value back to a float.
#[inline]
pub fn from_fixed(raw: i64, frac_bits: u32) -> f32 {
    (raw as f64 / f64::from(1u32 << frac_bits)) as f32
}

/// Multiplies a sample by a fixed-point gain and rescales, rounding to nearest.
#[inline]
pub fn apply_gain(sample: i32, gain_raw: i64, frac_bits: u32) -> i32 {
    let half = 1i64 << (frac_bits - 1);
    saturate_i32((i64::from(sample) * gain_raw + half) >> frac_bits)
}

/// Multiplies a sample by a fixed-point gain and rescales, truncating.
#[inline]
pub fn mul_shift(sample: i32, gain_raw: i64, frac_bits: u32) -> i64 {
    (i64::from(sample) * gain_raw) >> frac_bits
}

/// Clamps a wide value into `i32`.
#[inline]
pub fn saturate_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Clamps a sample into `i16`.
#[inline]
pub fn saturate_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Converts a Q14 coefficient to float.
#[inline]
pub fn q14_to_f32(raw: i16) -> f32 {
    f32::from(raw) / 16384.0
}

/// Converts a float coefficient to Q14, saturating.
#[inline]
pub fn f32_to_q14(value: f32) -> i16 {
    let raw = libm::roundf(value * 16384.0);
    raw.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}
