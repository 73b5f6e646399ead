//! Criterion benchmarks for audren-core primitives
//!
//! Run with: cargo bench -p audren-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use audren_core::{
    BiquadCoefficients, BiquadFilterState, DelayLine, UpsamplerState, biquad, lowpass_coefficients,
};

const SOURCE_COUNTS: &[u32] = &[40, 80, 160];
const TARGET_COUNT: usize = 240;

fn generate_test_frame(size: usize) -> Vec<i32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / 32000.0;
            ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 16000.0) as i32
        })
        .collect()
}

fn bench_upsampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("Upsampler");

    for &source in SOURCE_COUNTS {
        let input = generate_test_frame(source as usize);
        group.bench_with_input(BenchmarkId::new("process", source), &source, |b, &source| {
            let mut state = UpsamplerState::new();
            let mut output = vec![0; TARGET_COUNT];
            b.iter(|| {
                state.process(black_box(&mut output), black_box(&input), source);
            });
        });
    }

    group.finish();
}

fn bench_biquad(c: &mut Criterion) {
    let mut group = c.benchmark_group("Biquad");
    let coeffs = BiquadCoefficients::from_tuple(lowpass_coefficients(1000.0, 0.707, 48000.0));
    let input = generate_test_frame(TARGET_COUNT);

    group.bench_function("fixed", |b| {
        let mut state = BiquadFilterState::new();
        let mut buf = input.clone();
        b.iter(|| {
            buf.copy_from_slice(&input);
            biquad::process_fixed(black_box(&mut buf), &coeffs, &mut state);
        });
    });

    group.bench_function("float", |b| {
        let mut state = BiquadFilterState::new();
        let mut buf = input.clone();
        b.iter(|| {
            buf.copy_from_slice(&input);
            biquad::process_float(black_box(&mut buf), &coeffs, &mut state);
        });
    });

    group.bench_function("float_cascade", |b| {
        let mut states = [BiquadFilterState::new(); 2];
        let mut buf = input.clone();
        b.iter(|| {
            buf.copy_from_slice(&input);
            biquad::process_float_cascade(black_box(&mut buf), &[coeffs, coeffs], &mut states);
        });
    });

    group.finish();
}

fn bench_delay_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("DelayLine");
    group.bench_function("tick_frame", |b| {
        let mut line = DelayLine::new(16800);
        line.set_delay(9600);
        b.iter(|| {
            for i in 0..TARGET_COUNT {
                black_box(line.tick(black_box(i as f32)));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_upsampler, bench_biquad, bench_delay_line);
criterion_main!(benches);
