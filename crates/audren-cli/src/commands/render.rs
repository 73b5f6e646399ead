//! Offline render command.
//!
//! Opens a manual-mode session, queues one looping sine wave buffer on a
//! single voice routed to the final mix and a stereo device sink, then
//! drives one update per tick and writes what the sink produced.

use super::common::load_config;
use anyhow::Context;
use audren_core::{GuestAddr, linear_to_db};
use audren_renderer::wire::{
    DeviceSinkParams, MemoryPoolInParameter, PoolState, SampleFormat, SinkInParameter, SinkSpecific, SinkType,
    VoicePlayState, WaveBufferInParameter,
};
use audren_renderer::{
    AudioDsp, AudioRenderer, ExecutionMode, FlatGuestMemory, Manager, RendererParameters, SystemManager,
    TARGET_SAMPLE_RATE, UpdateRequest, UpdateResponse,
};
use clap::Args;
use hound::{SampleFormat as WavSampleFormat, WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Guest address the sample data is mapped at.
const GUEST_BASE: u64 = 0x10_0000;

/// Memory pools are mapped in whole pages.
const POOL_ALIGNMENT: u64 = 0x1000;

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Ticks to render (5 ms each)
    #[arg(short, long, default_value = "200")]
    ticks: u32,

    /// Sine frequency in Hz
    #[arg(short, long, default_value = "440.0")]
    frequency: f32,

    /// Amplitude (0-1)
    #[arg(short, long, default_value = "0.5")]
    amplitude: f32,

    /// Sample rate of the voice's source data
    #[arg(long, default_value = "32000")]
    source_rate: u32,

    /// Voice pitch multiplier
    #[arg(long, default_value = "1.0")]
    pitch: f32,

    /// Voice volume
    #[arg(long, default_value = "1.0")]
    volume: f32,

    /// Write a JSON summary of the render
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Default)]
struct RenderStats {
    ticks: u32,
    executed: u64,
    skipped: u64,
    dropped: u64,
    update_errors: u64,
}

/// One second of a 16-bit sine, so the loop point is seamless for integer
/// frequencies.
fn sine_table(frequency: f32, amplitude: f32, rate: u32) -> Vec<u8> {
    let scale = amplitude.clamp(0.0, 1.0) * f32::from(i16::MAX);
    (0..rate)
        .flat_map(|i| {
            let t = i as f32 / rate as f32;
            (((2.0 * std::f32::consts::PI * frequency * t).sin() * scale) as i16).to_le_bytes()
        })
        .collect()
}

fn session_params(config: &audren_config::RendererConfig) -> RendererParameters {
    let mut params = RendererParameters::from(config);
    params.execution_mode = ExecutionMode::Manual;
    params.voice_count = params.voice_count.max(1);
    params.mix_buffer_count = params.mix_buffer_count.max(2);
    params.sink_count = params.sink_count.max(1);
    params
}

fn request(params: &RendererParameters, args: &RenderArgs, pool_size: u64, data_size: u64, first: bool) -> UpdateRequest {
    let mut req = UpdateRequest::new(params);
    req.memory_pools[0] = MemoryPoolInParameter {
        address: GuestAddr::new(GUEST_BASE),
        size: pool_size,
        state: if first { PoolState::RequestAttach } else { PoolState::Attached },
    };

    let resource = &mut req.voice_resources[0];
    resource.in_use = true;
    resource.mix_volumes[0] = 1.0;
    resource.mix_volumes[1] = 1.0;

    let voice = &mut req.voices[0];
    voice.in_use = true;
    voice.is_new = first;
    voice.node_id = 0x1000_0000;
    voice.play_state = VoicePlayState::Started;
    voice.sample_format = SampleFormat::PcmInt16;
    voice.sample_rate = args.source_rate;
    voice.pitch = args.pitch;
    voice.volume = args.volume;
    voice.channel_count = 1;
    voice.mix_id = 0;
    voice.wave_buffer_count = 1;
    voice.wave_buffers[0] = WaveBufferInParameter {
        address: GuestAddr::new(GUEST_BASE),
        size: data_size,
        end_offset: (data_size / 2) as i32,
        looping: true,
        loop_start: 0,
        loop_end: (data_size / 2) as u32,
        loop_count: -1,
        sent_to_dsp: !first,
        ..Default::default()
    };

    let mix = &mut req.mixes[0];
    mix.in_use = true;
    mix.is_dirty = true;
    mix.volume = 1.0;
    mix.sample_rate = params.sample_rate;
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

pub fn run(args: RenderArgs, config: Option<&Path>) -> anyhow::Result<()> {
    if args.source_rate == 0 {
        anyhow::bail!("source rate must be positive");
    }
    let config = load_config(config)?;
    config.validate()?;
    let params = session_params(&config);

    let table = sine_table(args.frequency, args.amplitude, args.source_rate);
    let data_size = table.len() as u64;
    let pool_size = data_size.div_ceil(POOL_ALIGNMENT) * POOL_ALIGNMENT;
    let memory = Arc::new(FlatGuestMemory::new(GuestAddr::new(GUEST_BASE), pool_size as usize));
    memory
        .write_guest(GuestAddr::new(GUEST_BASE), &table)
        .context("writing sample data")?;

    let scheduler = Arc::new(SystemManager::new(AudioDsp::shared()));
    let mut renderer = AudioRenderer::open(
        Arc::new(Manager::new()),
        scheduler,
        &params,
        params.work_buffer_size(),
        1,
        memory,
    )
    .context("opening renderer session")?;
    renderer.set_render_time_limit(config.render_time_limit_percent);
    renderer.set_voice_drop_enabled(config.voice_drop_enabled);
    renderer.start()?;

    println!(
        "Rendering {} ticks ({:.2}s) at REV{}: {} Hz sine, source {} Hz, session {} Hz",
        args.ticks,
        args.ticks as f32 * 0.005,
        params.revision().get(),
        args.frequency,
        args.source_rate,
        params.sample_rate
    );
    println!("Press Ctrl+C to stop early.\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let pb = ProgressBar::new(u64::from(args.ticks));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ticks ({eta})")?
            .progress_chars("##-"),
    );

    let mut output = vec![0u8; UpdateResponse::size_for(&params)];
    let mut performance = vec![0u8; 0x1000];
    let mut samples: Vec<i16> = Vec::new();
    let mut channels = 0;
    let mut stats = RenderStats::default();

    for tick in 0..args.ticks {
        if !running.load(Ordering::SeqCst) {
            pb.println("Stopping...");
            break;
        }
        let input = request(&params, &args, pool_size, data_size, tick == 0).encode()?;
        renderer
            .request_update(&input, &mut output, &mut performance)
            .with_context(|| format!("update for tick {tick}"))?;

        let response = UpdateResponse::decode(&output, params.revision())?;
        if response.behavior.error_count > 0 {
            stats.update_errors += u64::from(response.behavior.error_count);
            tracing::warn!(tick, errors = response.behavior.error_count, "renderer reported update errors");
        }

        let frame = renderer.rendered_output();
        if frame.channel_count > 0 {
            channels = frame.channel_count;
            samples.extend_from_slice(&frame.samples);
        }
        if let Some(result) = renderer.last_result() {
            stats.executed += u64::from(result.executed);
            stats.skipped += u64::from(result.skipped);
            stats.dropped += u64::from(result.dropped);
        }
        stats.ticks += 1;
        pb.inc(1);
    }
    pb.finish_with_message("done");
    renderer.finalize()?;

    if channels == 0 {
        anyhow::bail!("the device sink produced no output");
    }

    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    let peak_db = linear_to_db(f32::from(peak) / f32::from(i16::MAX));
    println!("\nStats:");
    println!("  Ticks:    {}", stats.ticks);
    println!(
        "  Commands: {} executed, {} skipped, {} dropped",
        stats.executed, stats.skipped, stats.dropped
    );
    println!("  Peak:     {peak_db:.1} dBFS");

    println!("\nWriting {}...", args.output.display());
    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: WavSampleFormat::Int,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for &sample in &samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    if let Some(report_path) = &args.report {
        let report = serde_json::json!({
            "output": args.output.to_string_lossy(),
            "revision": params.revision().get(),
            "session_sample_rate": params.sample_rate,
            "source_sample_rate": args.source_rate,
            "frequency": args.frequency,
            "channels": channels,
            "frames": samples.len() / channels,
            "ticks": stats.ticks,
            "commands": {
                "executed": stats.executed,
                "skipped": stats.skipped,
                "dropped": stats.dropped,
            },
            "update_errors": stats.update_errors,
            "peak_dbfs": peak_db,
        });
        std::fs::write(report_path, serde_json::to_string_pretty(&report)?)?;
        println!("Wrote report to {}", report_path.display());
    }
    println!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_table_covers_one_second() {
        let table = sine_table(1000.0, 1.0, 32_000);
        assert_eq!(table.len(), 64_000);
        let first = i16::from_le_bytes([table[0], table[1]]);
        assert_eq!(first, 0);
    }

    #[test]
    fn amplitude_is_clamped() {
        let table = sine_table(8000.0, 4.0, 32_000);
        let quarter = i16::from_le_bytes([table[2], table[3]]);
        assert!(quarter >= i16::MAX - 1, "got {quarter}");
    }

    #[test]
    fn session_params_force_the_demo_layout() {
        let config = audren_config::RendererConfig {
            voice_count: 0,
            mix_buffer_count: 1,
            sink_count: 0,
            ..Default::default()
        };
        let params = session_params(&config);
        assert_eq!(params.execution_mode, ExecutionMode::Manual);
        assert_eq!(params.voice_count, 1);
        assert_eq!(params.mix_buffer_count, 2);
        assert_eq!(params.sink_count, 1);
    }
}
