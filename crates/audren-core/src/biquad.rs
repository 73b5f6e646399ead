//! Biquad (bi-quadratic) filter kernels for mix buffers.
//!
//! Coefficients travel in Q14 as the client writes them: three feedforward
//! taps `b` and two feedback taps `a`, where the feedback taps are already
//! negated so the recurrence adds them:
//!
//! ```text
//! y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] + a0*y[n-1] + a1*y[n-2]
//! ```
//!
//! Two kernels exist. The fixed kernel runs in transposed direct form II
//! with a 64-bit state and rounds every output back from Q14. The float
//! kernel runs in direct form I on `f64` and only truncates at the output.
//! Revisions with float processing use the latter; older ones the former.
//!
//! The RBJ cookbook helpers build client-side coefficients from a cutoff and
//! Q, and [`BiquadCoefficients::from_normalized`] turns them into Q14.

use core::f32::consts::PI;
use libm::{cosf, sinf};

use crate::fixed_point::{f32_to_q14, saturate_i32};

/// Q14 biquad coefficients with pre-negated feedback taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BiquadCoefficients {
    /// Feedforward taps `b0, b1, b2`.
    pub b: [i16; 3],
    /// Negated feedback taps `-a1, -a2`.
    pub a: [i16; 2],
}

impl BiquadCoefficients {
    /// Coefficients for `y[n] = x[n]`.
    pub const PASSTHROUGH: BiquadCoefficients = BiquadCoefficients {
        b: [1 << 14, 0, 0],
        a: [0, 0],
    };

    /// Builds Q14 coefficients from RBJ-style `(b0, b1, b2, a0, a1, a2)`.
    ///
    /// Normalizes by `a0` and negates the feedback taps. Values outside the
    /// Q14 range saturate.
    pub fn from_normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        let inv = 1.0 / a0;
        Self {
            b: [f32_to_q14(b0 * inv), f32_to_q14(b1 * inv), f32_to_q14(b2 * inv)],
            a: [f32_to_q14(-a1 * inv), f32_to_q14(-a2 * inv)],
        }
    }

    /// Builds coefficients from a cookbook tuple.
    pub fn from_tuple(c: (f32, f32, f32, f32, f32, f32)) -> Self {
        Self::from_normalized(c.0, c.1, c.2, c.3, c.4, c.5)
    }
}

/// Filter memory shared between calls.
///
/// The fixed kernel uses the two integer accumulators; the float kernel uses
/// the four float slots as `x[n-1], x[n-2], y[n-1], y[n-2]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiquadFilterState {
    fixed: [i64; 2],
    float: [f64; 4],
}

impl BiquadFilterState {
    /// Creates a cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all memory.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True if no sample has left a trace in the state.
    pub fn is_clear(&self) -> bool {
        self.fixed == [0; 2] && self.float == [0.0; 4]
    }
}

/// Filters `buffer` in place with the Q14 integer kernel.
pub fn process_fixed(buffer: &mut [i32], coeffs: &BiquadCoefficients, state: &mut BiquadFilterState) {
    let b = coeffs.b.map(i64::from);
    let a = coeffs.a.map(i64::from);
    let [s0, s1] = &mut state.fixed;

    for sample in buffer.iter_mut() {
        let x = i64::from(*sample);
        let acc = x * b[0] + *s0;
        let y = saturate_i32((acc + (1 << 13)) >> 14);
        *sample = y;

        let y = i64::from(y);
        *s0 = *s1 + b[1] * x + a[0] * y;
        *s1 = b[2] * x + a[1] * y;
    }
}

/// Filters `buffer` in place with the floating-point kernel.
pub fn process_float(buffer: &mut [i32], coeffs: &BiquadCoefficients, state: &mut BiquadFilterState) {
    let b = coeffs.b.map(|c| f64::from(c) / 16384.0);
    let a = coeffs.a.map(|c| f64::from(c) / 16384.0);
    let [x1, x2, y1, y2] = &mut state.float;

    for sample in buffer.iter_mut() {
        let x = f64::from(*sample);
        let y = x * b[0] + *x1 * b[1] + *x2 * b[2] + *y1 * a[0] + *y2 * a[1];
        *sample = y.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;

        *x2 = *x1;
        *x1 = x;
        *y2 = *y1;
        *y1 = y;
    }
}

/// Runs two float biquads back to back on each sample.
pub fn process_float_cascade(
    buffer: &mut [i32],
    coeffs: &[BiquadCoefficients; 2],
    states: &mut [BiquadFilterState; 2],
) {
    for sample in buffer.iter_mut() {
        let mut one = [*sample];
        for (c, s) in coeffs.iter().zip(states.iter_mut()) {
            process_float(&mut one, c, s);
        }
        *sample = one[0];
    }
}

/// Low-pass coefficients using the RBJ cookbook formula.
///
/// Returns `(b0, b1, b2, a0, a1, a2)`.
pub fn lowpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> (f32, f32, f32, f32, f32, f32) {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q);

    let b0 = (1.0 - cos_omega) / 2.0;
    let b1 = 1.0 - cos_omega;
    let b2 = (1.0 - cos_omega) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    (b0, b1, b2, a0, a1, a2)
}

/// High-pass coefficients using the RBJ cookbook formula.
///
/// Returns `(b0, b1, b2, a0, a1, a2)`.
pub fn highpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> (f32, f32, f32, f32, f32, f32) {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q);

    let b0 = (1.0 + cos_omega) / 2.0;
    let b1 = -(1.0 + cos_omega);
    let b2 = (1.0 + cos_omega) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    (b0, b1, b2, a0, a1, a2)
}
