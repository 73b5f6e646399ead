//! Property-based tests for the effect kernels.
//!
//! Every kernel must leave buffers it was not routed to untouched, bypass
//! exactly when disabled, and stay deterministic for identical input.

use audren_core::MixBufferArena;
use audren_effects::{
    DelayParams, DelayState, EffectParameters, LightLimiterParams, LightLimiterState, ParameterState,
    bypass,
};
use proptest::prelude::*;

const Q14: i32 = 1 << 14;

fn delay_params(feedback: i32, delay_ms: u32) -> DelayParams {
    DelayParams {
        inputs: [0, 0, 0, 0, 0, 0],
        outputs: [0, 0, 0, 0, 0, 0],
        channel_count_max: 1,
        channel_count: 1,
        delay_time_max: 5,
        delay_time: delay_ms,
        sample_rate: 48000 * Q14,
        in_gain: Q14,
        feedback_gain: feedback,
        wet_gain: Q14,
        dry_gain: Q14,
        channel_spread: 0,
        lowpass_amount: Q14 / 2,
        state: ParameterState::Initialized,
    }
}

fn fill(arena: &mut MixBufferArena, index: usize, samples: &[i32]) {
    arena.get_mut(index).copy_from_slice(samples);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A disabled kernel behaves exactly like `bypass`.
    #[test]
    fn disabled_delay_equals_bypass(samples in prop::collection::vec(-30000i32..30000, 64)) {
        let mut a = MixBufferArena::new(2, 64);
        let mut b = MixBufferArena::new(2, 64);
        fill(&mut a, 0, &samples);
        fill(&mut b, 0, &samples);
        DelayState::new().apply(&delay_params(0, 1), false, &mut a, &[0], &[1]);
        bypass(&mut b, &[0], &[1]);
        prop_assert_eq!(a.as_slice(), b.as_slice());
    }

    /// Buffers not named as outputs are never written.
    #[test]
    fn unrouted_buffers_untouched(
        samples in prop::collection::vec(-30000i32..30000, 48),
        feedback in 0i32..Q14,
    ) {
        let mut arena = MixBufferArena::new(3, 48);
        fill(&mut arena, 0, &samples);
        arena.get_mut(2).fill(123);
        DelayState::new().apply(&delay_params(feedback, 0), true, &mut arena, &[0], &[1]);
        prop_assert!(arena.get(2).iter().all(|&s| s == 123));
    }

    /// An impulse through sub-unity feedback never exceeds its own level and
    /// its echoes die away.
    #[test]
    fn delay_feedback_is_stable(feedback in 0i32..Q14, delay_ms in 1u32..5) {
        let mut p = delay_params(feedback, delay_ms);
        let mut state = DelayState::new();
        let mut arena = MixBufferArena::new(1, 240);
        let mut peak = 0i32;
        let mut tail = 0i32;
        for tick in 0..60 {
            arena.get_mut(0).fill(0);
            if tick == 0 {
                arena.get_mut(0)[0] = 10000;
            }
            state.apply(&p, true, &mut arena, &[0], &[0]);
            p.state = ParameterState::Updated;
            let tick_peak = arena.get(0).iter().map(|s| s.abs()).max().unwrap_or(0);
            peak = peak.max(tick_peak);
            tail = tick_peak;
        }
        prop_assert!(peak <= 10000, "peak {}", peak);
        prop_assert!(tail < 5000, "tail {}", tail);
    }

    /// The limiter never amplifies beyond its output gain.
    #[test]
    fn limiter_output_bounded(samples in prop::collection::vec(-32768i32..32767, 128)) {
        let p = LightLimiterParams {
            channel_count_max: 1,
            channel_count: 1,
            attack_coeff: 0.5,
            release_coeff: 0.01,
            threshold: 0.5,
            input_gain: 1.0,
            output_gain: 1.0,
            look_ahead_samples_min: 4,
            look_ahead_samples_max: 4,
            state: ParameterState::Initialized,
            ..Default::default()
        };
        let mut arena = MixBufferArena::new(1, 128);
        fill(&mut arena, 0, &samples);
        LightLimiterState::new().apply(&p, true, &mut arena, &[0], &[0], false);
        prop_assert!(arena.get(0).iter().all(|&s| s.abs() <= 32768));
    }

    /// A pending transition survives any sequence of merges until settled.
    #[test]
    fn pending_state_survives_merges(incoming in prop::collection::vec(0u8..3, 1..8)) {
        let make = |state| EffectParameters::Delay(DelayParams {
            channel_count_max: 1,
            channel_count: 1,
            state,
            ..Default::default()
        });
        let mut p = make(ParameterState::Initialized);
        for raw in incoming {
            p.merge(make(ParameterState::from_u8(raw)));
            prop_assert_eq!(p.state(), Some(ParameterState::Initialized));
        }
    }
}
