//! Mixes: groups of mix buffers that sum voices and feed each other.
//!
//! Mix 0 is the final mix; sinks read from it. Every other mix routes into a
//! destination mix or through a splitter. [`MixContext::sort`] orders the
//! sub-mixes so each is generated before the mixes it feeds, and assigns
//! every in-use mix its slice of the mix buffer range.

use crate::error::{RendererError, Result};
use crate::params::MAX_MIX_BUFFERS;
use crate::splitter::SplitterContext;
use crate::wire::{FINAL_MIX_ID, MixInParameter, UNUSED_MIX_ID, UNUSED_SPLITTER_ID};

/// One mix slot.
#[derive(Debug, Clone, PartialEq)]
pub struct MixInfo {
    /// Mix slot.
    pub mix_id: i32,
    /// Slot in use.
    pub in_use: bool,
    /// Linear volume applied when mixing out.
    pub volume: f32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Buffers owned by the mix.
    pub buffer_count: u32,
    /// First owned buffer in the arena.
    pub buffer_offset: u32,
    /// Performance node id.
    pub node_id: u32,
    /// `mix_volumes[src][dst]` into the destination mix.
    pub mix_volumes: Box<[[f32; MAX_MIX_BUFFERS]; MAX_MIX_BUFFERS]>,
    /// Destination mix.
    pub dest_mix_id: i32,
    /// Destination splitter.
    pub dest_splitter_id: i32,
    /// Effect slot per process order; -1 when the position is empty.
    pub effect_order: Vec<i32>,
}

impl MixInfo {
    /// An unused slot with room for `effect_count` effects.
    pub fn new(mix_id: i32, effect_count: usize) -> Self {
        Self {
            mix_id,
            in_use: false,
            volume: 0.0,
            sample_rate: 0,
            buffer_count: 0,
            buffer_offset: 0,
            node_id: 0,
            mix_volumes: Box::new([[0.0; MAX_MIX_BUFFERS]; MAX_MIX_BUFFERS]),
            dest_mix_id: UNUSED_MIX_ID,
            dest_splitter_id: UNUSED_SPLITTER_ID,
            effect_order: vec![-1; effect_count],
        }
    }

    /// True if this is the final mix.
    pub fn is_final(&self) -> bool {
        self.mix_id == FINAL_MIX_ID
    }

    /// True if the mix routes anywhere.
    pub fn has_any_connection(&self) -> bool {
        self.dest_mix_id != UNUSED_MIX_ID || self.dest_splitter_id != UNUSED_SPLITTER_ID
    }

    /// Forgets every effect assignment.
    pub fn clear_effect_processing_order(&mut self) {
        self.effect_order.fill(-1);
    }

    /// Applies a record. `effects` yields `(slot, mix_id, process_order)` of
    /// every effect. Returns true if the routing changed.
    pub fn update(
        &mut self,
        params: &MixInParameter,
        effects: impl Iterator<Item = (usize, i32, i32)>,
        splitters: &SplitterContext,
        splitter_supported: bool,
    ) -> bool {
        self.volume = params.volume;
        self.sample_rate = params.sample_rate;
        self.buffer_count = params.buffer_count.min(MAX_MIX_BUFFERS as u32);
        self.in_use = params.in_use;
        self.mix_id = params.mix_id;
        self.node_id = params.node_id;
        *self.mix_volumes = params.mix_volumes;

        let sort_required = if splitter_supported {
            let splitter_changed = splitters.info(self.dest_splitter_id).is_some_and(|s| s.has_new_connection);
            let changed = self.dest_mix_id != params.dest_mix_id
                || self.dest_splitter_id != params.dest_splitter_id
                || splitter_changed;
            self.dest_mix_id = params.dest_mix_id;
            self.dest_splitter_id = params.dest_splitter_id;
            changed
        } else if self.dest_mix_id != params.dest_mix_id {
            self.dest_mix_id = params.dest_mix_id;
            self.dest_splitter_id = UNUSED_SPLITTER_ID;
            true
        } else {
            false
        };

        self.clear_effect_processing_order();
        for (slot, mix_id, order) in effects {
            if mix_id != self.mix_id {
                continue;
            }
            match usize::try_from(order).ok().and_then(|o| self.effect_order.get_mut(o)) {
                Some(entry) => *entry = slot as i32,
                None => tracing::warn!(mix = self.mix_id, effect = slot, order, "effect process order out of range"),
            }
        }

        sort_required
    }
}

/// Every mix of a session and their generation order.
#[derive(Debug, Clone)]
pub struct MixContext {
    infos: Vec<MixInfo>,
    sorted: Vec<usize>,
}

impl MixContext {
    /// `count` mixes, the first being the final mix.
    pub fn new(count: usize, effect_count: usize) -> Self {
        Self {
            infos: (0..count).map(|i| MixInfo::new(i as i32, effect_count)).collect(),
            sorted: (0..count).collect(),
        }
    }

    /// Mix slots.
    pub fn count(&self) -> usize {
        self.infos.len()
    }

    /// Mix `id`.
    pub fn info(&self, id: i32) -> Option<&MixInfo> {
        usize::try_from(id).ok().and_then(|i| self.infos.get(i))
    }

    /// Mix `id`, mutably.
    pub fn info_mut(&mut self, id: i32) -> Option<&mut MixInfo> {
        usize::try_from(id).ok().and_then(|i| self.infos.get_mut(i))
    }

    /// The final mix.
    pub fn final_mix(&self) -> Option<&MixInfo> {
        self.infos.first()
    }

    /// Mix slots in id order.
    pub fn infos(&self) -> &[MixInfo] {
        &self.infos
    }

    /// In-use mixes, sources before destinations.
    pub fn sorted(&self) -> impl Iterator<Item = &MixInfo> {
        self.sorted.iter().map(|&i| &self.infos[i])
    }

    fn destinations(&self, index: usize, splitters: &SplitterContext) -> Vec<usize> {
        let mix = &self.infos[index];
        let ids: Vec<i32> = if mix.dest_mix_id != UNUSED_MIX_ID {
            vec![mix.dest_mix_id]
        } else if mix.dest_splitter_id != UNUSED_SPLITTER_ID {
            splitters.destination_mix_ids(mix.dest_splitter_id).collect()
        } else {
            Vec::new()
        };
        ids.into_iter()
            .filter_map(|id| usize::try_from(id).ok())
            .filter(|&d| self.infos.get(d).is_some_and(|m| m.in_use))
            .collect()
    }

    /// Orders in-use mixes so every mix precedes its destinations, then
    /// assigns buffer offsets in id order.
    ///
    /// Fails with [`RendererError::InvalidUpdateInfo`] if the routing has a
    /// cycle.
    pub fn sort(&mut self, splitters: &SplitterContext) -> Result<()> {
        let n = self.infos.len();
        let edges: Vec<Vec<usize>> = (0..n)
            .map(|i| if self.infos[i].in_use { self.destinations(i, splitters) } else { Vec::new() })
            .collect();

        let mut in_degree = vec![0u32; n];
        for &to in edges.iter().flatten() {
            in_degree[to] += 1;
        }

        let active_count = self.infos.iter().filter(|m| m.in_use).count();
        let mut queue: Vec<usize> = (0..n)
            .rev()
            .filter(|&i| self.infos[i].in_use && in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(active_count);

        while let Some(idx) = queue.pop() {
            sorted.push(idx);
            for &to in &edges[idx] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    queue.push(to);
                }
            }
        }

        if sorted.len() != active_count {
            tracing::warn!(active = active_count, sorted = sorted.len(), "mix routing has a cycle");
            return Err(RendererError::InvalidUpdateInfo("mix routing has a cycle"));
        }

        self.sorted = sorted;
        let mut offset = 0;
        for mix in self.infos.iter_mut().filter(|m| m.in_use) {
            mix.buffer_offset = offset;
            offset += mix.buffer_count;
        }
        Ok(())
    }
}
