//! Buffer mixer: per-pair volume mix between buffers of one mix.

use audren_core::{Reader, WireError};

use crate::aux_buffer::MAX_MIX_BUFFERS;

/// Buffer mixer parameters as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BufferMixerParams {
    /// Relative source buffers.
    pub inputs: [i8; MAX_MIX_BUFFERS],
    /// Relative destination buffers.
    pub outputs: [i8; MAX_MIX_BUFFERS],
    /// Linear volume per pair.
    pub volumes: [f32; MAX_MIX_BUFFERS],
    /// Pairs in use.
    pub mix_count: u32,
}

impl BufferMixerParams {
    /// Decodes the type-specific region.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut p = Self::default();
        for i in &mut p.inputs {
            *i = r.i8()?;
        }
        for o in &mut p.outputs {
            *o = r.i8()?;
        }
        for v in &mut p.volumes {
            *v = r.f32()?;
        }
        p.mix_count = r.u32()?;
        Ok(p)
    }

    /// `(input, output, volume)` for every pair in use.
    pub fn pairs(&self) -> impl Iterator<Item = (i8, i8, f32)> + '_ {
        let n = (self.mix_count as usize).min(MAX_MIX_BUFFERS);
        (0..n).map(|i| (self.inputs[i], self.outputs[i], self.volumes[i]))
    }
}
