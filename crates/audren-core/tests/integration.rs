//! Integration tests for audren-core primitives.
//!
//! Exercises the primitives the way the command processor chains them: a
//! 32 kHz frame is filtered in a mix buffer, gained, then upsampled into a
//! 48 kHz buffer of the same arena.

use audren_core::{
    BiquadCoefficients, BiquadFilterState, DelayLine, MixBufferArena, UpsamplerState, biquad,
    fixed_point, lowpass_coefficients,
};

const SOURCE_COUNT: usize = 160;
const TARGET_COUNT: usize = 240;

fn sine_frame(freq: f32, rate: f32, amplitude: f32, start: usize, len: usize) -> Vec<i32> {
    (start..start + len)
        .map(|n| (amplitude * libm::sinf(core::f32::consts::TAU * freq * n as f32 / rate)) as i32)
        .collect()
}

fn peak(buf: &[i32]) -> i32 {
    buf.iter().map(|s| s.abs()).max().unwrap_or(0)
}

// ============================================================================
// 1. Filter + gain + upsample chain
// ============================================================================

#[test]
fn chain_preserves_low_frequency_level() {
    let mut arena = MixBufferArena::new(2, TARGET_COUNT);
    let mut upsampler = UpsamplerState::new();
    let mut filter = BiquadFilterState::new();
    let coeffs = BiquadCoefficients::from_tuple(lowpass_coefficients(4000.0, 0.707, 32000.0));
    let unity = fixed_point::to_fixed(1.0, 15);

    let mut last_peak = 0;
    for frame in 0..6 {
        let input = sine_frame(250.0, 32000.0, 8000.0, frame * SOURCE_COUNT, SOURCE_COUNT);
        {
            let src = &mut arena.get_mut(0)[..SOURCE_COUNT];
            src.copy_from_slice(&input);
            biquad::process_fixed(src, &coeffs, &mut filter);
            for s in src.iter_mut() {
                *s = fixed_point::apply_gain(*s, unity, 15);
            }
        }
        let source: Vec<i32> = arena.get(0)[..SOURCE_COUNT].to_vec();
        upsampler.process(arena.get_mut(1), &source, SOURCE_COUNT as u32);
        last_peak = peak(arena.get(1));
    }

    assert!(
        (7000..=8800).contains(&last_peak),
        "expected roughly unity level after the chain, got peak {last_peak}"
    );
}

#[test]
fn silence_stays_silent() {
    let mut arena = MixBufferArena::new(2, TARGET_COUNT);
    let mut upsampler = UpsamplerState::new();
    for _ in 0..3 {
        let source = arena.get(0)[..80].to_vec();
        upsampler.process(arena.get_mut(1), &source, 80);
        assert_eq!(peak(arena.get(1)), 0);
    }
}

// ============================================================================
// 2. Delay line against arena buffers
// ============================================================================

#[test]
fn delay_line_shifts_buffer_by_delay() {
    let mut arena = MixBufferArena::new(2, 16);
    for (i, s) in arena.get_mut(0).iter_mut().enumerate() {
        *s = i as i32 + 1;
    }
    let mut line = DelayLine::new(8);
    line.set_delay(4);

    let (src, dst) = arena.get_ref_and_mut(0, 1).unwrap();
    for (o, &i) in dst.iter_mut().zip(src) {
        *o = line.tick(i as f32) as i32;
    }
    assert_eq!(&arena.get(1)[..4], &[0, 0, 0, 0]);
    assert_eq!(&arena.get(1)[4..8], &[1, 2, 3, 4]);
}
