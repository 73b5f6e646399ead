//! End-to-end tests for audren-renderer sessions.
//!
//! Each test opens a session over flat guest memory, drives it with encoded
//! update blobs and checks the status blob and the rendered PCM.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audren_core::{GuestAddr, Writer};
use audren_effects::{EffectType, SPECIFIC_SIZE};
use audren_renderer::performance::PERFORMANCE_MAGIC;
use audren_renderer::wire::{
    CircularSinkParams, DeviceSinkParams, EffectInParameter, MemoryPoolInParameter, PoolState, SampleFormat,
    SinkInParameter, SinkSpecific, SinkType, VoicePlayState, WaveBufferInParameter,
};
use audren_renderer::{
    AudioDsp, AudioRenderer, ExecutionMode, FlatGuestMemory, Manager, MockCoprocessor, RendererError,
    RendererParameters, SystemManager, TARGET_SAMPLE_COUNT, UpdateRequest, UpdateResponse,
};

const BASE: u64 = 0x10_0000;
const RING: u64 = BASE + 0x2000;
const RING_SIZE: u32 = 0x1000;
const DELAY_WORK: u64 = BASE + 0x3000;
const Q14: i32 = 1 << 14;

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

struct Harness {
    renderer: AudioRenderer,
    memory: Arc<FlatGuestMemory>,
    params: RendererParameters,
}

fn params(mode: ExecutionMode, sink_count: u32) -> RendererParameters {
    RendererParameters {
        voice_count: 1,
        sink_count,
        effect_count: 0,
        mix_buffer_count: 2,
        execution_mode: mode,
        ..Default::default()
    }
}

fn open_with(params: RendererParameters, scheduler: Arc<SystemManager>) -> Harness {
    let memory = Arc::new(FlatGuestMemory::new(GuestAddr::new(BASE), 0x4000));
    let renderer = AudioRenderer::open(
        Arc::new(Manager::new()),
        scheduler,
        &params,
        params.work_buffer_size(),
        1,
        memory.clone(),
    )
    .unwrap();
    Harness {
        renderer,
        memory,
        params,
    }
}

fn open(params: RendererParameters) -> Harness {
    open_with(params, Arc::new(SystemManager::new(Arc::new(MockCoprocessor::new()))))
}

fn write_pcm(memory: &FlatGuestMemory, samples: &[i16]) {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    memory.write_guest(GuestAddr::new(BASE), &bytes).unwrap();
}

fn sine(amplitude: f32) -> Vec<i16> {
    (0..TARGET_SAMPLE_COUNT)
        .map(|i| ((i as f32 * 0.1).sin() * amplitude) as i16)
        .collect()
}

/// One voice on the final mix, a stereo device sink, and optionally a
/// circular sink on the same buffers.
fn request(p: &RendererParameters, first: bool) -> UpdateRequest {
    let mut req = UpdateRequest::new(p);
    req.memory_pools[0] = MemoryPoolInParameter {
        address: GuestAddr::new(BASE),
        size: 0x4000,
        state: if first { PoolState::RequestAttach } else { PoolState::Attached },
    };
    req.voice_resources[0].in_use = true;
    req.voice_resources[0].mix_volumes[0] = 1.0;
    req.voice_resources[0].mix_volumes[1] = 1.0;

    let v = &mut req.voices[0];
    v.in_use = true;
    v.is_new = first;
    v.node_id = 0x1000_0000;
    v.play_state = VoicePlayState::Started;
    v.sample_format = SampleFormat::PcmInt16;
    v.sample_rate = 48_000;
    v.channel_count = 1;
    v.mix_id = 0;
    v.wave_buffer_count = 1;
    v.wave_buffers[0] = WaveBufferInParameter {
        address: GuestAddr::new(BASE),
        size: (TARGET_SAMPLE_COUNT * 2) as u64,
        end_offset: TARGET_SAMPLE_COUNT as i32,
        sent_to_dsp: !first,
        ..Default::default()
    };

    let m = &mut req.mixes[0];
    m.in_use = true;
    m.is_dirty = true;
    m.volume = 1.0;
    m.sample_rate = 48_000;
    m.buffer_count = 2;
    m.node_id = 0x2000_0000;

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
    if let Some(sink) = req.sinks.get_mut(1) {
        *sink = SinkInParameter {
            sink_type: SinkType::CircularBuffer,
            in_use: true,
            node_id: 0x3001_0000,
            specific: SinkSpecific::CircularBuffer(CircularSinkParams {
                address: GuestAddr::new(RING),
                size: RING_SIZE,
                input_count: 2,
                sample_count: TARGET_SAMPLE_COUNT as u32,
                inputs: [0, 1, 0, 0, 0, 0],
                ..Default::default()
            }),
        };
    }
    req
}

fn update(h: &Harness, req: &UpdateRequest) -> Result<UpdateResponse, RendererError> {
    update_with_performance(h, req).map(|(res, _)| res)
}

/// Runs one update and also returns the performance output bytes.
fn update_with_performance(h: &Harness, req: &UpdateRequest) -> Result<(UpdateResponse, Vec<u8>), RendererError> {
    let input = req.encode()?;
    let mut output = vec![0u8; UpdateResponse::size_for(&h.params)];
    let mut perf = vec![0u8; 0x1000];
    h.renderer.request_update(&input, &mut output, &mut perf)?;
    Ok((UpdateResponse::decode(&output, h.params.revision())?, perf))
}

fn read_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// A stereo 1 ms delay on the final mix, fully wet, with its delay lines
/// in the attached pool.
fn delay_effect() -> EffectInParameter {
    let mut specific = [0u8; SPECIFIC_SIZE];
    {
        let w = &mut Writer::new(&mut specific);
        for i in [0i8, 1, 0, 0, 0, 0].into_iter().chain([0i8, 1, 0, 0, 0, 0]) {
            w.i8(i).unwrap();
        }
        w.u16(2).unwrap();
        w.u16(2).unwrap();
        w.u32(10).unwrap();
        w.u32(1).unwrap();
        w.i32(48_000 * Q14).unwrap();
        w.i32(Q14).unwrap();
        w.i32(0).unwrap();
        w.i32(Q14).unwrap();
        w.i32(0).unwrap();
        w.i32(0).unwrap();
        w.i32(0).unwrap();
        w.u8(0).unwrap();
    }
    EffectInParameter {
        effect_type: EffectType::Delay,
        is_new: true,
        enabled: true,
        mix_id: 0,
        workbuffer: GuestAddr::new(DELAY_WORK),
        workbuffer_size: 0x1000,
        process_order: 0,
        specific,
    }
}

fn left(samples: &[i16]) -> Vec<i16> {
    samples.iter().step_by(2).copied().collect()
}

// ---------------------------------------------------------------------------
// Manual sessions
// ---------------------------------------------------------------------------

#[test]
fn silent_voice_renders_silence() {
    let h = open(params(ExecutionMode::Manual, 1));
    write_pcm(&h.memory, &[0; TARGET_SAMPLE_COUNT]);
    h.renderer.start().unwrap();

    let res = update(&h, &request(&h.params, true)).unwrap();
    assert_eq!(res.behavior.error_count, 0);
    assert_eq!(res.memory_pools[0].state, PoolState::Attached);

    let out = h.renderer.rendered_output();
    assert_eq!(out.channel_count, 2);
    assert_eq!(out.samples.len(), TARGET_SAMPLE_COUNT * 2);
    assert!(out.samples.iter().all(|&s| s == 0));

    let result = h.renderer.last_result().unwrap();
    assert_eq!(result.dropped, 0);
    assert_eq!(result.skipped, 0);
    assert!(result.executed > 0);
}

#[test]
fn voice_reaches_both_device_channels() {
    let h = open(params(ExecutionMode::Manual, 1));
    write_pcm(&h.memory, &sine(12_000.0));
    h.renderer.start().unwrap();
    update(&h, &request(&h.params, true)).unwrap();

    let out = h.renderer.rendered_output();
    let left: Vec<i16> = out.samples.iter().step_by(2).copied().collect();
    let right: Vec<i16> = out.samples.iter().skip(1).step_by(2).copied().collect();
    assert!(left.iter().any(|&s| s != 0));
    assert_eq!(left, right);
}

#[test]
fn played_samples_are_reported_next_update() {
    let h = open(params(ExecutionMode::Manual, 1));
    write_pcm(&h.memory, &sine(4_000.0));
    h.renderer.start().unwrap();

    let first = update(&h, &request(&h.params, true)).unwrap();
    assert_eq!(first.voices[0].played_sample_count, 0);
    let second = update(&h, &request(&h.params, false)).unwrap();
    assert_eq!(second.voices[0].played_sample_count, TARGET_SAMPLE_COUNT as u64);
    assert_eq!(second.renderer_info.unwrap().elapsed_frame_count, 1);
}

#[test]
fn circular_sink_reports_write_offset() {
    let h = open(params(ExecutionMode::Manual, 2));
    write_pcm(&h.memory, &sine(8_000.0));
    h.renderer.start().unwrap();

    let frame_bytes = (TARGET_SAMPLE_COUNT * 2 * 2) as u32;
    let mut offsets = Vec::new();
    for tick in 0..4 {
        let res = update(&h, &request(&h.params, tick == 0)).unwrap();
        offsets.push(res.sinks[1].last_written_offset);
    }
    assert_eq!(offsets, vec![0, 0, 0, frame_bytes]);

    let mut ring = vec![0u8; RING_SIZE as usize];
    h.memory.read_guest(GuestAddr::new(RING), &mut ring).unwrap();
    assert!(ring.iter().any(|&b| b != 0));
}

#[test]
fn unattached_wave_buffer_is_logged() {
    let h = open(params(ExecutionMode::Manual, 1));
    h.renderer.start().unwrap();
    let mut req = request(&h.params, true);
    req.memory_pools[0].state = PoolState::New;
    let res = update(&h, &req).unwrap();
    assert!(res.behavior.error_count > 0);
    assert_eq!(h.renderer.last_result().unwrap().dropped, 0);
}

#[test]
fn delay_on_final_mix_shifts_the_device_output() {
    let dc = vec![8_000i16; TARGET_SAMPLE_COUNT];

    let dry = open(params(ExecutionMode::Manual, 1));
    write_pcm(&dry.memory, &dc);
    dry.renderer.start().unwrap();
    update(&dry, &request(&dry.params, true)).unwrap();
    let dry_left = left(&dry.renderer.rendered_output().samples);

    let wet = open(RendererParameters {
        effect_count: 1,
        ..params(ExecutionMode::Manual, 1)
    });
    write_pcm(&wet.memory, &dc);
    wet.renderer.start().unwrap();
    let mut req = request(&wet.params, true);
    req.effects[0] = delay_effect();
    let res = update(&wet, &req).unwrap();
    assert_eq!(res.behavior.error_count, 0);
    let result = wet.renderer.last_result().unwrap();
    assert_eq!(result.skipped, 0);

    let wet_left = left(&wet.renderer.rendered_output().samples);
    assert!(dry_left[1..40].iter().all(|&s| s != 0));
    assert!(wet_left[..40].iter().all(|&s| s == 0), "delayed signal arrived early");
    assert!(wet_left[120..].iter().all(|&s| s != 0), "delayed signal never arrived");
}

#[test]
fn dropped_voice_is_recorded_in_the_performance_frame() {
    let h = open(RendererParameters {
        performance_frame_count: 2,
        voice_drop_enabled: true,
        ..params(ExecutionMode::Manual, 1)
    });
    write_pcm(&h.memory, &sine(8_000.0));
    h.renderer.set_render_time_limit(0);
    h.renderer.start().unwrap();

    let mut responses = Vec::new();
    for tick in 0..3 {
        let mut req = request(&h.params, tick == 0);
        req.voices[0].priority = 1;
        responses.push(update_with_performance(&h, &req).unwrap());
        if tick == 0 {
            assert!(h.renderer.rendered_output().samples.iter().all(|&s| s == 0));
        }
    }

    assert!(responses[1].0.voices[0].voice_dropped);
    let (res, perf) = &responses[2];
    assert!(res.performance.history_size >= 0x30);
    assert_eq!(read_u32(perf, 0), PERFORMANCE_MAGIC);
    assert_eq!(read_u32(perf, 0x14), 1, "frame 0 lost its dropped voice");
    assert_eq!(read_u32(perf, 0x20), 0);
}

#[test]
fn malformed_update_leaves_session_usable() {
    let h = open(params(ExecutionMode::Manual, 1));
    h.renderer.start().unwrap();
    let input = request(&h.params, true).encode().unwrap();
    let mut output = vec![0u8; UpdateResponse::size_for(&h.params)];
    assert!(matches!(
        h.renderer.request_update(&input[..0x30], &mut output, &mut []),
        Err(RendererError::InvalidUpdateInfo(_))
    ));
    assert!(update(&h, &request(&h.params, true)).is_ok());
}

// ---------------------------------------------------------------------------
// Automatic sessions
// ---------------------------------------------------------------------------

#[test]
fn automatic_session_renders_on_the_dsp_thread() {
    let scheduler = Arc::new(SystemManager::new(AudioDsp::shared()));
    let mut h = open_with(params(ExecutionMode::Auto, 1), Arc::clone(&scheduler));
    write_pcm(&h.memory, &sine(8_000.0));
    update(&h, &request(&h.params, true)).unwrap();
    h.renderer.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.renderer.frames_elapsed() < 3 {
        assert!(Instant::now() < deadline, "scheduler did not render");
        std::thread::sleep(Duration::from_millis(2));
    }
    h.renderer.stop().unwrap();
    let frames = h.renderer.frames_elapsed();
    assert_eq!(h.renderer.rendered_output().samples.len(), TARGET_SAMPLE_COUNT * 2);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.renderer.frames_elapsed(), frames);

    h.renderer.finalize().unwrap();
    assert_eq!(scheduler.registered(), 0);
    assert!(!scheduler.is_running());
}
