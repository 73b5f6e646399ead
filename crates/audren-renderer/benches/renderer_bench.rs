//! Criterion benchmarks for audren-renderer ticks
//!
//! Run with: cargo bench -p audren-renderer
#![allow(missing_docs)]

use std::sync::Arc;

use audren_core::GuestAddr;
use audren_renderer::wire::{
    DeviceSinkParams, MemoryPoolInParameter, PoolState, SampleFormat, SinkInParameter, SinkSpecific, SinkType,
    VoicePlayState, WaveBufferInParameter,
};
use audren_renderer::{
    ExecutionMode, FlatGuestMemory, RendererParameters, System, TARGET_SAMPLE_COUNT, UpdateRequest,
    UpdateResponse,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const BASE: u64 = 0x10_0000;
const POOL_SIZE: u64 = 0x4000;
const VOICE_COUNTS: &[u32] = &[1, 8, 24];

fn session(voice_count: u32) -> (System, RendererParameters) {
    let params = RendererParameters {
        voice_count,
        mix_buffer_count: 2,
        execution_mode: ExecutionMode::Manual,
        ..Default::default()
    };
    let memory = Arc::new(FlatGuestMemory::new(GuestAddr::new(BASE), POOL_SIZE as usize));
    let pcm: Vec<u8> = (0..TARGET_SAMPLE_COUNT * 4)
        .flat_map(|i| (((i as f32 * 0.05).sin() * 8000.0) as i16).to_le_bytes())
        .collect();
    let _ = memory.write_guest(GuestAddr::new(BASE), &pcm);

    let mut system = System::new(memory);
    let _ = system.initialize(&params, params.work_buffer_size(), 1, 0);
    (system, params)
}

/// Looping mono voices on the final mix feeding a stereo device sink.
fn request(params: &RendererParameters, first: bool) -> UpdateRequest {
    let mut req = UpdateRequest::new(params);
    req.memory_pools[0] = MemoryPoolInParameter {
        address: GuestAddr::new(BASE),
        size: POOL_SIZE,
        state: if first { PoolState::RequestAttach } else { PoolState::Attached },
    };
    for (i, (voice, resource)) in req.voices.iter_mut().zip(req.voice_resources.iter_mut()).enumerate() {
        resource.in_use = true;
        resource.mix_volumes[0] = 0.1;
        resource.mix_volumes[1] = 0.1;

        voice.in_use = true;
        voice.is_new = first;
        voice.node_id = 0x1000_0000 | i as u32;
        voice.play_state = VoicePlayState::Started;
        voice.sample_format = SampleFormat::PcmInt16;
        voice.sample_rate = if i % 2 == 0 { 48_000 } else { 32_000 };
        voice.pitch = 1.0 + i as f32 * 0.01;
        voice.channel_count = 1;
        voice.mix_id = 0;
        voice.wave_buffer_count = 1;
        voice.wave_buffers[0] = WaveBufferInParameter {
            address: GuestAddr::new(BASE),
            size: (TARGET_SAMPLE_COUNT * 8) as u64,
            end_offset: (TARGET_SAMPLE_COUNT * 4) as i32,
            looping: true,
            loop_start: 0,
            loop_end: (TARGET_SAMPLE_COUNT * 4) as u32,
            loop_count: -1,
            sent_to_dsp: !first,
            ..Default::default()
        };
    }

    let mix = &mut req.mixes[0];
    mix.in_use = true;
    mix.is_dirty = first;
    mix.volume = 1.0;
    mix.sample_rate = 48_000;
    mix.buffer_count = 2;
    mix.node_id = 0x2000_0000;

    req.sinks[0] = SinkInParameter {
        sink_type: SinkType::Device,
        in_use: true,
        node_id: 0x3000_0000,
        specific: SinkSpecific::Device(DeviceSinkParams {
            input_count: 2,
            inputs: [0, 1, 0, 0, 0, 0],
            ..Default::default()
        }),
    };
    req
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("Update");

    for &voices in VOICE_COUNTS {
        let (mut system, params) = session(voices);
        let first = request(&params, true).encode().unwrap_or_default();
        let steady = request(&params, false).encode().unwrap_or_default();
        let mut output = vec![0u8; UpdateResponse::size_for(&params)];
        let _ = system.request_update(&first, &mut output, &mut []);

        group.bench_with_input(BenchmarkId::new("decode", voices), &voices, |b, _| {
            b.iter(|| {
                let _ = system.request_update(black_box(&steady), &mut output, &mut []);
            });
        });
    }

    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tick");

    for &voices in VOICE_COUNTS {
        let (mut system, params) = session(voices);
        let first = request(&params, true).encode().unwrap_or_default();
        let steady = request(&params, false).encode().unwrap_or_default();
        let mut output = vec![0u8; UpdateResponse::size_for(&params)];
        let _ = system.request_update(&first, &mut output, &mut []);
        let _ = system.start();

        group.bench_with_input(BenchmarkId::new("generate", voices), &voices, |b, _| {
            b.iter(|| black_box(system.generate_command_list()));
        });

        group.bench_with_input(BenchmarkId::new("update_and_render", voices), &voices, |b, _| {
            b.iter(|| {
                let _ = system.request_update(black_box(&steady), &mut output, &mut []);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update, bench_tick);
criterion_main!(benches);
