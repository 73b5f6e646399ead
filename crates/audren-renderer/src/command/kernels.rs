//! Sample kernels for the mixing commands.
//!
//! All kernels work on `i32` samples at 16-bit scale. Volumes are converted
//! to fixed point with the session's mix precision (Q15 or Q23) and applied
//! with rounding.

use audren_core::fixed_point::{apply_gain, saturate_i16, to_fixed};
use audren_core::{GuestMemory, HostAddr, MemoryAccessError, MixBufferArena};

/// Depop decay per sample at 48 kHz, Q15.
pub const DEPOP_DECAY_48K: i32 = 0x7B29;
/// Depop decay per sample at 32 kHz, Q15.
pub const DEPOP_DECAY_32K: i32 = 0x78CC;

/// Default Q16 down-mix weights: front, center, LFE, back.
pub const DEFAULT_DOWNMIX_COEFFICIENTS: [i32; 4] = [0x1_0000, 0xB504, 0, 0xB504];

/// Depop decay for a session sample rate.
pub fn depop_decay(sample_rate: u32) -> i32 {
    if sample_rate == 48_000 { DEPOP_DECAY_48K } else { DEPOP_DECAY_32K }
}

/// Runs `f(input_sample, output_sample)` over two buffers, which may be the
/// same buffer.
fn for_each_pair(arena: &mut MixBufferArena, input: usize, output: usize, mut f: impl FnMut(usize, i32, &mut i32)) {
    match arena.get_ref_and_mut(input, output) {
        Some((src, dst)) => {
            for (i, (&x, y)) in src.iter().zip(dst.iter_mut()).enumerate() {
                f(i, x, y);
            }
        }
        None => {
            for (i, y) in arena.get_mut(output).iter_mut().enumerate() {
                let x = *y;
                f(i, x, y);
            }
        }
    }
}

/// Moves a voice channel's leftover samples into the depop accumulators.
pub fn depop_prepare(previous: &mut [i32], depop: &mut [i32]) {
    for (prev, acc) in previous.iter_mut().zip(depop.iter_mut()) {
        if *prev != 0 {
            *acc = acc.wrapping_add(*prev);
            *prev = 0;
        }
    }
}

/// Fades one accumulator into `output` and returns what is left of it.
fn apply_depop_mix(output: &mut [i32], depop_sample: i32, decay: i32) -> i32 {
    let mut sample = i64::from(depop_sample.unsigned_abs());
    if depop_sample <= 0 {
        for out in output.iter_mut() {
            sample = (sample * i64::from(decay)) >> 15;
            *out = out.wrapping_sub(sample as i32);
        }
        -(sample as i32)
    } else {
        for out in output.iter_mut() {
            sample = (sample * i64::from(decay)) >> 15;
            *out = out.wrapping_add(sample as i32);
        }
        sample as i32
    }
}

/// Fades the accumulators of `count` buffers starting at `offset` into those
/// buffers.
pub fn depop_for_mix_buffers(arena: &mut MixBufferArena, depop: &mut [i32], offset: usize, count: usize, decay: i32) {
    let end = (offset + count).min(depop.len()).min(arena.buffer_count());
    for index in offset..end {
        if depop[index] != 0 {
            depop[index] = apply_depop_mix(arena.get_mut(index), depop[index], decay);
        }
    }
}

/// `output = input * volume`.
pub fn volume(arena: &mut MixBufferArena, input: usize, output: usize, volume: f32, precision: u32) {
    let gain = to_fixed(volume, precision);
    for_each_pair(arena, input, output, |_, x, y| *y = apply_gain(x, gain, precision));
}

/// `output = input * v`, with `v` ramping linearly from `prev_volume` toward
/// `volume` over the buffer.
pub fn volume_ramp(arena: &mut MixBufferArena, input: usize, output: usize, prev_volume: f32, volume: f32, precision: u32) {
    let count = arena.sample_count().max(1);
    let mut gain = to_fixed(prev_volume, precision);
    let step = to_fixed((volume - prev_volume) / count as f32, precision);
    for_each_pair(arena, input, output, |_, x, y| {
        *y = apply_gain(x, gain, precision);
        gain += step;
    });
}

/// `output += input * volume`.
pub fn mix(arena: &mut MixBufferArena, input: usize, output: usize, volume: f32, precision: u32) {
    let gain = to_fixed(volume, precision);
    for_each_pair(arena, input, output, |_, x, y| *y = y.wrapping_add(apply_gain(x, gain, precision)));
}

/// `output += input * v` with a linear ramp. Returns the last contribution,
/// which the voice keeps for depop.
pub fn mix_ramp(arena: &mut MixBufferArena, input: usize, output: usize, prev_volume: f32, volume: f32, precision: u32) -> i32 {
    let count = arena.sample_count().max(1);
    let mut gain = to_fixed(prev_volume, precision);
    let step = to_fixed((volume - prev_volume) / count as f32, precision);
    let mut last = 0;
    for_each_pair(arena, input, output, |_, x, y| {
        last = apply_gain(x, gain, precision);
        *y = y.wrapping_add(last);
        gain += step;
    });
    last
}

/// Folds 5.1 into stereo. Inputs and outputs are in FL, FR, C, LFE, BL, BR
/// order; outputs 2..6 are cleared.
pub fn downmix_6ch_to_2ch(arena: &mut MixBufferArena, inputs: &[usize; 6], outputs: &[usize; 6], coefficients: &[i32; 4]) {
    let [c0, c1, c2, c3] = coefficients.map(i64::from);
    let n = arena.sample_count();
    let mut left = vec![0i32; n];
    let mut right = vec![0i32; n];
    {
        let fl = arena.get(inputs[0]);
        let fr = arena.get(inputs[1]);
        let c = arena.get(inputs[2]);
        let lfe = arena.get(inputs[3]);
        let bl = arena.get(inputs[4]);
        let br = arena.get(inputs[5]);
        for i in 0..n {
            let center = i64::from(c[i]) * c1 + i64::from(lfe[i]) * c2;
            left[i] = ((i64::from(fl[i]) * c0 + center + i64::from(bl[i]) * c3) >> 16) as i32;
            right[i] = ((i64::from(fr[i]) * c0 + center + i64::from(br[i]) * c3) >> 16) as i32;
        }
    }
    arena.get_mut(outputs[0]).copy_from_slice(&left);
    arena.get_mut(outputs[1]).copy_from_slice(&right);
    for &out in &outputs[2..] {
        arena.clear(out);
    }
}

/// Writes each input as a block of PCM16 at `pos`, wrapping to 0 at `size`.
/// Returns the position after the last block.
pub fn write_circular(
    memory: &dyn GuestMemory,
    arena: &MixBufferArena,
    inputs: &[usize],
    address: HostAddr,
    size: u32,
    mut pos: u32,
) -> Result<u32, MemoryAccessError> {
    let block = arena.sample_count() * 2;
    for &input in inputs {
        let bytes: Vec<u8> = arena
            .get(input)
            .iter()
            .flat_map(|&s| saturate_i16(s).to_le_bytes())
            .collect();
        let at = address.checked_add(u64::from(pos)).ok_or(MemoryAccessError {
            addr: address,
            len: block,
        })?;
        memory.write(at, &bytes)?;
        pos += block as u32;
        if pos >= size {
            pos = 0;
        }
    }
    Ok(pos)
}

/// Interleaves `channels` into PCM16 frames.
pub fn interleave(channels: &[&[i32]], out: &mut Vec<i16>) {
    out.clear();
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    out.reserve(frames * channels.len());
    for i in 0..frames {
        out.extend(channels.iter().map(|c| saturate_i16(c[i])));
    }
}
