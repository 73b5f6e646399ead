//! Wave buffer decoding with pitch and sample rate conversion.
//!
//! Each data source command renders one channel of one voice into a scratch
//! buffer. Source samples are decoded from the queued wave buffers, following
//! loop points and end-of-stream flags, then resampled by linear
//! interpolation on a Q15 position. The last two source samples and the
//! fractional position carry over to the next tick so consecutive ticks join
//! without a seam.

use audren_core::{GuestMemory, HostAddr, fixed_point::saturate_i16};

use crate::params::MAX_WAVE_BUFFERS;
use crate::voice::{AdpcmContext, SAMPLE_HISTORY, VoiceState};
use crate::wire::{SampleFormat, SrcQuality};

/// Samples in one DSP-ADPCM frame.
pub const ADPCM_SAMPLES_PER_FRAME: u32 = 14;
/// Nibbles in one DSP-ADPCM frame, header included.
pub const ADPCM_NIBBLES_PER_FRAME: u32 = 16;
/// Bytes of the ADPCM coefficient table: eight predictor pairs.
pub const ADPCM_COEFFICIENTS_SIZE: usize = 32;

const FRAC_BITS: u32 = 15;
const FRAC_MASK: i64 = (1 << FRAC_BITS) - 1;

const ADPCM_STEPS: [i32; 16] = [0, 1, 2, 3, 4, 5, 6, 7, -8, -7, -6, -5, -4, -3, -2, -1];

/// One wave buffer as the coprocessor sees it: host addresses only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveBufferSource {
    /// Sample data, or null when unmapped.
    pub buffer: HostAddr,
    /// Bytes at `buffer`.
    pub size: u64,
    /// ADPCM loop context, or null.
    pub context: HostAddr,
    /// First sample played.
    pub start_offset: u32,
    /// One past the last sample played.
    pub end_offset: u32,
    /// Loop this buffer.
    pub looping: bool,
    /// Last buffer of the stream.
    pub stream_ended: bool,
    /// Loop start sample.
    pub loop_start: u32,
    /// Loop end sample.
    pub loop_end: u32,
    /// Loops before moving on; negative loops forever.
    pub loop_count: i32,
}

/// Parameters of one data source command.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceCommand {
    /// Encoding of the wave buffers.
    pub format: SampleFormat,
    /// Requested resampler quality.
    pub src_quality: SrcQuality,
    /// Arena buffer receiving the channel.
    pub output: usize,
    /// Voice state of the channel.
    pub state: usize,
    /// Channel decoded from interleaved data.
    pub channel: usize,
    /// Channels interleaved in the data.
    pub channel_count: usize,
    /// Source rate in Hz.
    pub sample_rate: u32,
    /// Playback rate multiplier.
    pub pitch: f32,
    /// The voice's queued buffers.
    pub wave_buffers: [WaveBufferSource; MAX_WAVE_BUFFERS],
    /// ADPCM coefficient table, or null.
    pub coefficients: HostAddr,
    /// Looping resets the played sample count.
    pub played_sample_count_reset_at_loop: bool,
    /// Copy source samples straight through.
    pub pitch_and_src_skipped: bool,
}

/// Bytes of DSP-ADPCM data needed to hold samples `[0, end)`, header
/// nibbles included.
pub fn adpcm_required_bytes(end: u32) -> u64 {
    let mut nibbles = u64::from(end % ADPCM_SAMPLES_PER_FRAME)
        + u64::from(ADPCM_NIBBLES_PER_FRAME) * u64::from(end / ADPCM_SAMPLES_PER_FRAME);
    nibbles += if end % ADPCM_SAMPLES_PER_FRAME != 0 { 3 } else { 1 };
    nibbles / 2
}

fn adpcm_nibble_position(sample: u32) -> u32 {
    let rem = sample % ADPCM_SAMPLES_PER_FRAME;
    let pos = (sample / ADPCM_SAMPLES_PER_FRAME) * ADPCM_NIBBLES_PER_FRAME + rem;
    if rem != 0 { pos + 2 } else { pos }
}

struct DecodeRequest<'a> {
    source: &'a WaveBufferSource,
    start: u32,
    end: u32,
    offset: u32,
    wanted: usize,
}

impl DataSourceCommand {
    /// Q15 step through the source per output sample.
    pub fn ratio_q15(&self, target_sample_rate: u32) -> i64 {
        if target_sample_rate == 0 {
            return 0;
        }
        let ratio = self.sample_rate as f32 / target_sample_rate as f32 * self.pitch;
        (ratio * (1 << FRAC_BITS) as f32) as i64
    }

    /// Renders `output.len()` samples of the channel, advancing `state`.
    ///
    /// A starved voice renders what it has followed by silence. Memory
    /// faults end decoding for the tick as if the voice had starved.
    pub fn process(&self, state: &mut VoiceState, output: &mut [i32], memory: &dyn GuestMemory, target_sample_rate: u32) {
        let count = output.len();
        if self.pitch_and_src_skipped {
            let mut decoded = vec![0i16; count];
            let n = self.decode_from_wave_buffers(state, &mut decoded, memory);
            for (dst, &src) in output.iter_mut().zip(&decoded[..n]) {
                *dst = i32::from(src);
            }
            output[n..].fill(0);
            return;
        }

        let ratio = self.ratio_q15(target_sample_rate);
        if ratio <= 0 {
            output.fill(0);
            return;
        }
        let fraction = i64::from(state.fraction);
        let end_position = fraction + ratio * count as i64;
        let needed = usize::try_from(end_position >> FRAC_BITS).unwrap_or(0);

        let mut temp = vec![0i16; SAMPLE_HISTORY + needed];
        temp[..SAMPLE_HISTORY].copy_from_slice(&state.sample_history);
        let decoded = self.decode_from_wave_buffers(state, &mut temp[SAMPLE_HISTORY..], memory);
        if decoded < needed {
            temp[SAMPLE_HISTORY + decoded..].fill(0);
        }

        let mut position = fraction;
        for out in output.iter_mut() {
            let index = (position >> FRAC_BITS) as usize;
            let frac = position & FRAC_MASK;
            let a = i64::from(temp[index]);
            let b = i64::from(temp[index + 1]);
            *out = (a + (((b - a) * frac) >> FRAC_BITS)) as i32;
            position += ratio;
        }

        state.sample_history.copy_from_slice(&temp[needed..needed + SAMPLE_HISTORY]);
        state.fraction = (end_position & FRAC_MASK) as i32;
    }

    /// Decodes up to `out.len()` source samples, walking the wave buffer
    /// queue. Returns the number decoded.
    fn decode_from_wave_buffers(&self, state: &mut VoiceState, out: &mut [i16], memory: &dyn GuestMemory) -> usize {
        let mut read = 0usize;
        while read < out.len() {
            let index = state.wave_buffer_index % MAX_WAVE_BUFFERS;
            if !state.wave_buffer_valid[index] {
                break;
            }
            let wb = &self.wave_buffers[index];

            if state.offset == 0 && self.format == SampleFormat::Adpcm && !wb.context.is_null() {
                let mut raw = [0u8; AdpcmContext::SIZE];
                match memory.read(wb.context, &mut raw) {
                    Ok(()) => state.adpcm_context = AdpcmContext::from_bytes(&raw),
                    Err(e) => tracing::warn!(error = %e, "adpcm loop context unreadable"),
                }
            }

            let (start, end) = if wb.looping && state.loop_count > 0 && wb.loop_start <= wb.loop_end {
                (wb.loop_start, wb.loop_end)
            } else {
                (wb.start_offset, wb.end_offset)
            };

            let request = DecodeRequest {
                source: wb,
                start,
                end,
                offset: state.offset,
                wanted: out.len() - read,
            };
            let decoded = match self.format {
                SampleFormat::PcmInt16 => decode_pcm16(memory, &mut out[read..], &request, self),
                SampleFormat::PcmFloat => decode_pcm_float(memory, &mut out[read..], &request, self),
                SampleFormat::Adpcm => self.decode_adpcm(memory, &mut out[read..], &request, &mut state.adpcm_context),
                other => {
                    tracing::warn!(format = ?other, "sample format cannot be decoded");
                    0
                }
            };

            state.played_sample_count += decoded as u64;
            read += decoded;
            state.offset += decoded as u32;

            if decoded > 0 && state.offset < end.saturating_sub(start) {
                continue;
            }

            state.offset = 0;
            if wb.looping {
                state.loop_count += 1;
                if wb.loop_count >= 0 && (state.loop_count > wb.loop_count as u32 || decoded == 0) {
                    end_wave_buffer(state, wb);
                }
                if decoded == 0 {
                    break;
                }
                if self.played_sample_count_reset_at_loop {
                    state.played_sample_count = 0;
                }
            } else {
                end_wave_buffer(state, wb);
            }
        }
        read
    }

    fn decode_adpcm(
        &self,
        memory: &dyn GuestMemory,
        out: &mut [i16],
        req: &DecodeRequest<'_>,
        context: &mut AdpcmContext,
    ) -> usize {
        let source = req.source;
        if source.buffer.is_null() || source.size == 0 || req.end < req.start {
            return 0;
        }
        if source.size < adpcm_required_bytes(req.end) {
            return 0;
        }
        let start_pos = req.start + req.offset;
        let to_process = (req.end.saturating_sub(start_pos) as usize).min(req.wanted).min(out.len());
        if to_process == 0 {
            return 0;
        }

        let mut coefficients = [0u8; ADPCM_COEFFICIENTS_SIZE];
        if self.coefficients.is_null() || memory.read(self.coefficients, &mut coefficients).is_err() {
            tracing::warn!("adpcm coefficient table unreadable");
            return 0;
        }
        let coefficient = |i: usize| i32::from(i16::from_le_bytes([coefficients[i * 2], coefficients[i * 2 + 1]]));

        let mut nibble = adpcm_nibble_position(start_pos);
        let last_nibble = adpcm_nibble_position(start_pos + to_process as u32 - 1);
        let first_byte = u64::from(nibble / 2);
        let byte_count = (last_nibble / 2 + 1 - nibble / 2) as usize;
        let mut data = vec![0u8; byte_count];
        let Some(addr) = source.buffer.checked_add(first_byte) else {
            return 0;
        };
        if let Err(e) = memory.read(addr, &mut data) {
            tracing::warn!(error = %e, "adpcm data unreadable");
            return 0;
        }

        let mut header = context.header as u8;
        let mut scale = u32::from(header & 0xF);
        let mut c0 = coefficient(usize::from(header >> 4) * 2);
        let mut c1 = coefficient(usize::from(header >> 4) * 2 + 1);
        let mut yn0 = i32::from(context.yn0);
        let mut yn1 = i32::from(context.yn1);

        let base = nibble / 2;
        for sample in out.iter_mut().take(to_process) {
            if nibble % ADPCM_NIBBLES_PER_FRAME == 0 {
                header = data[(nibble / 2 - base) as usize];
                scale = u32::from(header & 0xF);
                c0 = coefficient(usize::from(header >> 4) * 2);
                c1 = coefficient(usize::from(header >> 4) * 2 + 1);
                nibble += 2;
            }
            let byte = data[(nibble / 2 - base) as usize];
            let code = if nibble & 1 == 1 { byte & 0xF } else { byte >> 4 };
            let xn = ADPCM_STEPS[usize::from(code)] << scale;
            let prediction = c0 * yn0 + c1 * yn1;
            let decoded = i32::from(saturate_i16(((xn << 11) + 0x400 + prediction) >> 11));
            yn1 = yn0;
            yn0 = decoded;
            *sample = decoded as i16;
            nibble += 1;
        }

        context.header = u16::from(header);
        context.yn0 = yn0 as i16;
        context.yn1 = yn1 as i16;
        to_process
    }
}

fn end_wave_buffer(state: &mut VoiceState, wb: &WaveBufferSource) {
    let index = state.wave_buffer_index % MAX_WAVE_BUFFERS;
    state.wave_buffer_valid[index] = false;
    state.loop_count = 0;
    if wb.stream_ended {
        state.played_sample_count = 0;
    }
    state.advance_buffer();
}

fn pcm_samples_to_decode(req: &DecodeRequest<'_>, out_len: usize) -> usize {
    let available = req.end.saturating_sub(req.start).saturating_sub(req.offset) as usize;
    available.min(req.wanted).min(out_len)
}

fn read_interleaved(
    memory: &dyn GuestMemory,
    req: &DecodeRequest<'_>,
    cmd: &DataSourceCommand,
    sample_size: usize,
    count: usize,
) -> Option<Vec<u8>> {
    let channels = cmd.channel_count.max(1);
    let first = u64::from(req.start + req.offset) * channels as u64 * sample_size as u64;
    let len = count * channels * sample_size;
    if first + len as u64 > req.source.size {
        tracing::warn!(first, len, size = req.source.size, "pcm read past the end of the wave buffer");
        return None;
    }
    let mut raw = vec![0u8; len];
    let addr = req.source.buffer.checked_add(first)?;
    match memory.read(addr, &mut raw) {
        Ok(()) => Some(raw),
        Err(e) => {
            tracing::warn!(error = %e, "pcm data unreadable");
            None
        }
    }
}

fn decode_pcm16(memory: &dyn GuestMemory, out: &mut [i16], req: &DecodeRequest<'_>, cmd: &DataSourceCommand) -> usize {
    if req.source.buffer.is_null() || req.source.size == 0 || req.start >= req.end || cmd.channel >= cmd.channel_count {
        return 0;
    }
    let count = pcm_samples_to_decode(req, out.len());
    let Some(raw) = read_interleaved(memory, req, cmd, 2, count) else {
        return 0;
    };
    for (dst, frame) in out.iter_mut().zip(raw.chunks_exact(2 * cmd.channel_count)) {
        let at = cmd.channel * 2;
        *dst = i16::from_le_bytes([frame[at], frame[at + 1]]);
    }
    count
}

fn decode_pcm_float(memory: &dyn GuestMemory, out: &mut [i16], req: &DecodeRequest<'_>, cmd: &DataSourceCommand) -> usize {
    if req.source.buffer.is_null() || req.source.size == 0 || req.start >= req.end || cmd.channel >= cmd.channel_count {
        return 0;
    }
    let count = pcm_samples_to_decode(req, out.len());
    let Some(raw) = read_interleaved(memory, req, cmd, 4, count) else {
        return 0;
    };
    for (dst, frame) in out.iter_mut().zip(raw.chunks_exact(4 * cmd.channel_count)) {
        let at = cmd.channel * 4;
        let value = f32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]);
        *dst = saturate_i16((value * f32::from(i16::MAX)) as i32);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest_memory::FlatGuestMemory;
    use audren_core::GuestAddr;

    const BASE: u64 = 0x1000;

    fn memory_with(samples: &[i16]) -> FlatGuestMemory {
        let mem = FlatGuestMemory::new(GuestAddr::new(BASE), 0x10000);
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        mem.write_guest(GuestAddr::new(BASE), &bytes).unwrap();
        mem
    }

    fn command(len: u32) -> DataSourceCommand {
        let mut wave_buffers = [WaveBufferSource::default(); MAX_WAVE_BUFFERS];
        wave_buffers[0] = WaveBufferSource {
            buffer: HostAddr::mapped_base(GuestAddr::new(BASE)),
            size: u64::from(len) * 2,
            end_offset: len,
            ..Default::default()
        };
        DataSourceCommand {
            format: SampleFormat::PcmInt16,
            src_quality: SrcQuality::Medium,
            output: 0,
            state: 0,
            channel: 0,
            channel_count: 1,
            sample_rate: 48_000,
            pitch: 1.0,
            wave_buffers,
            coefficients: HostAddr::NULL,
            played_sample_count_reset_at_loop: false,
            pitch_and_src_skipped: false,
        }
    }

    fn playing() -> VoiceState {
        let mut s = VoiceState::default();
        s.wave_buffer_valid[0] = true;
        s
    }

    // --- pcm ---

    #[test]
    fn unity_ratio_delays_by_history() {
        let samples: Vec<i16> = (1..=8).collect();
        let mem = memory_with(&samples);
        let cmd = command(8);
        let mut state = playing();
        let mut out = [0i32; 4];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [0, 0, 1, 2]);
        assert_eq!(state.sample_history, [3, 4]);
        assert_eq!(state.played_sample_count, 4);

        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn half_rate_interpolates() {
        let mem = memory_with(&[0, 100, 200, 300, 400, 500]);
        let mut cmd = command(6);
        cmd.sample_rate = 24_000;
        let mut state = playing();
        let mut out = [0i32; 6];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        // Position steps by half a sample; history supplies the first two.
        assert_eq!(out, [0, 0, 0, 0, 0, 50]);
        assert_eq!(state.played_sample_count, 3);
        assert_eq!(state.fraction, 0);
    }

    #[test]
    fn buffer_end_advances_queue_and_starves() {
        let mem = memory_with(&[7, 7, 7]);
        let cmd = command(3);
        let mut state = playing();
        let mut out = [0i32; 8];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert!(!state.wave_buffer_valid[0]);
        assert_eq!(state.wave_buffer_index, 1);
        assert_eq!(state.wave_buffers_consumed, 1);
        assert_eq!(out[2..5], [7, 7, 7]);
        assert_eq!(out[5..], [0, 0, 0]);
    }

    #[test]
    fn stream_end_resets_played_count() {
        let mem = memory_with(&[1, 2]);
        let mut cmd = command(2);
        cmd.wave_buffers[0].stream_ended = true;
        let mut state = playing();
        let mut out = [0i32; 4];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(state.played_sample_count, 0);
    }

    #[test]
    fn finite_loop_plays_count_plus_one_times() {
        let mem = memory_with(&[5, 6]);
        let mut cmd = command(2);
        cmd.pitch_and_src_skipped = true;
        cmd.wave_buffers[0].looping = true;
        cmd.wave_buffers[0].loop_count = 1;
        cmd.wave_buffers[0].loop_end = 2;
        let mut state = playing();
        let mut out = [0i32; 6];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [5, 6, 5, 6, 0, 0]);
        assert!(!state.wave_buffer_valid[0]);
    }

    #[test]
    fn infinite_loop_never_ends() {
        let mem = memory_with(&[1, 2, 3]);
        let mut cmd = command(3);
        cmd.pitch_and_src_skipped = true;
        cmd.wave_buffers[0].looping = true;
        cmd.wave_buffers[0].loop_count = -1;
        cmd.wave_buffers[0].loop_start = 1;
        cmd.wave_buffers[0].loop_end = 3;
        let mut state = playing();
        let mut out = [0i32; 7];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [1, 2, 3, 2, 3, 2, 3]);
        assert!(state.wave_buffer_valid[0]);
    }

    #[test]
    fn float_samples_scale_and_clamp() {
        let mem = FlatGuestMemory::new(GuestAddr::new(BASE), 0x100);
        let bytes: Vec<u8> = [0.5f32, -2.0].iter().flat_map(|s| s.to_le_bytes()).collect();
        mem.write_guest(GuestAddr::new(BASE), &bytes).unwrap();
        let mut cmd = command(2);
        cmd.format = SampleFormat::PcmFloat;
        cmd.wave_buffers[0].size = 8;
        cmd.pitch_and_src_skipped = true;
        let mut state = playing();
        let mut out = [0i32; 2];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [16383, -32768]);
    }

    #[test]
    fn interleaved_channel_is_selected() {
        let mem = memory_with(&[1, -1, 2, -2, 3, -3]);
        let mut cmd = command(3);
        cmd.channel_count = 2;
        cmd.channel = 1;
        cmd.wave_buffers[0].size = 12;
        cmd.pitch_and_src_skipped = true;
        let mut state = playing();
        let mut out = [0i32; 3];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [-1, -2, -3]);
    }

    // --- adpcm ---

    #[test]
    fn adpcm_sizes() {
        assert_eq!(adpcm_required_bytes(14), 8);
        assert_eq!(adpcm_required_bytes(1), 2);
        assert_eq!(adpcm_nibble_position(0), 0);
        assert_eq!(adpcm_nibble_position(1), 3);
        assert_eq!(adpcm_nibble_position(14), 16);
    }

    #[test]
    fn adpcm_decodes_scaled_steps() {
        let mem = FlatGuestMemory::new(GuestAddr::new(BASE), 0x1000);
        // Header: predictor 0, scale 0. Codes 1,2 then zeros.
        mem.write_guest(GuestAddr::new(BASE), &[0x00, 0x12, 0, 0, 0, 0, 0, 0]).unwrap();
        // Coefficient pair 0 = (0, 0): output is the raw step.
        mem.write_guest(GuestAddr::new(BASE + 0x100), &[0u8; ADPCM_COEFFICIENTS_SIZE]).unwrap();
        let mut cmd = command(14);
        cmd.format = SampleFormat::Adpcm;
        cmd.wave_buffers[0].size = 8;
        cmd.coefficients = HostAddr::mapped_base(GuestAddr::new(BASE + 0x100));
        cmd.pitch_and_src_skipped = true;
        let mut state = playing();
        let mut out = [0i32; 3];
        cmd.process(&mut state, &mut out, &mem, 48_000);
        assert_eq!(out, [1, 2, 0]);
        assert_eq!(state.adpcm_context.yn0, 0);
        assert_eq!(state.adpcm_context.yn1, 2);
    }
}
