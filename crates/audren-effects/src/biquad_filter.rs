//! Biquad filter effect: one Q14 biquad per channel.

use audren_core::biquad::{process_fixed, process_float};
use audren_core::{BiquadCoefficients, BiquadFilterState, MixBufferArena, Reader, WireError};

use crate::types::{MAX_CHANNELS, ParameterState};

/// Biquad filter parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiquadFilterParams {
    /// Relative input buffer per channel.
    pub inputs: [i8; MAX_CHANNELS],
    /// Relative output buffer per channel.
    pub outputs: [i8; MAX_CHANNELS],
    /// Q14 coefficients, `a` taps already negated.
    pub coefficients: BiquadCoefficients,
    /// Channels to process. Negative values disable the effect.
    pub channel_count: i8,
    /// Pending state transition.
    pub state: ParameterState,
}

impl BiquadFilterParams {
    /// Decodes the type-specific region.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut p = Self::default();
        for i in &mut p.inputs {
            *i = r.i8()?;
        }
        for o in &mut p.outputs {
            *o = r.i8()?;
        }
        for b in &mut p.coefficients.b {
            *b = r.i16()?;
        }
        for a in &mut p.coefficients.a {
            *a = r.i16()?;
        }
        p.channel_count = r.i8()?;
        p.state = ParameterState::from_u8(r.u8()?);
        Ok(p)
    }

    /// Number of channels to process, clamped to `0..=6`.
    pub fn channels(&self) -> usize {
        usize::try_from(self.channel_count).unwrap_or(0).min(MAX_CHANNELS)
    }
}

/// Host-side biquad state, one filter history per channel.
#[derive(Debug, Clone, Default)]
pub struct BiquadFilterEffectState {
    channels: [BiquadFilterState; MAX_CHANNELS],
}

impl BiquadFilterEffectState {
    /// Creates cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// History for `channel`.
    pub fn channel(&self, channel: usize) -> &BiquadFilterState {
        &self.channels[channel]
    }

    /// Filters `inputs[ch]` into `outputs[ch]` for every channel.
    ///
    /// `needs_init` clears the history first. `float` selects the f64 kernel.
    pub fn apply(
        &mut self,
        params: &BiquadFilterParams,
        arena: &mut MixBufferArena,
        inputs: &[usize],
        outputs: &[usize],
        needs_init: bool,
        float: bool,
    ) {
        let n = inputs.len().min(outputs.len()).min(params.channels());
        for ch in 0..n {
            let state = &mut self.channels[ch];
            if needs_init {
                state.clear();
            }
            arena.copy(inputs[ch], outputs[ch]);
            let buffer = arena.get_mut(outputs[ch]);
            if float {
                process_float(buffer, &params.coefficients, state);
            } else {
                process_fixed(buffer, &params.coefficients, state);
            }
        }
    }
}
