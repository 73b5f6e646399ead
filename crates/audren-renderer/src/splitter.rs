//! Splitters: fan a voice or mix out to several destination mixes.
//!
//! A splitter is a list of destination ids. Destination `c + k * channels`
//! receives channel `c` of the source, so a stereo voice with four
//! destinations feeds two mixes per channel.

use crate::params::MAX_MIX_BUFFERS;
use crate::wire::{SplitterSection, UNUSED_MIX_ID};

/// One destination: a mix and the volumes into its buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitterDestination {
    /// Destination slot.
    pub id: u32,
    /// Destination mix.
    pub mix_id: i32,
    /// Target volumes.
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Volumes at the end of the last tick.
    pub prev_mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Slot in use.
    pub in_use: bool,
    need_update: bool,
}

impl Default for SplitterDestination {
    fn default() -> Self {
        Self {
            id: 0,
            mix_id: UNUSED_MIX_ID,
            mix_volumes: [0.0; MAX_MIX_BUFFERS],
            prev_mix_volumes: [0.0; MAX_MIX_BUFFERS],
            in_use: false,
            need_update: false,
        }
    }
}

impl SplitterDestination {
    /// True if the destination feeds a mix.
    pub fn is_configured(&self) -> bool {
        self.in_use && self.mix_id != UNUSED_MIX_ID
    }

    /// Requests that the current volumes become the ramp start after this
    /// tick.
    pub fn mark_as_need_to_update_internal_state(&mut self) {
        self.need_update = true;
    }

    /// Latches the volumes if requested.
    pub fn update_internal_state(&mut self) {
        if self.in_use && self.need_update {
            self.prev_mix_volumes = self.mix_volumes;
        }
        self.need_update = false;
    }
}

/// One splitter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitterInfo {
    /// Splitter slot.
    pub id: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Destination slots, in channel-major order.
    pub destinations: Vec<usize>,
    /// Destinations changed since the last tick.
    pub has_new_connection: bool,
}

/// Every splitter and destination of a session.
#[derive(Debug, Clone, Default)]
pub struct SplitterContext {
    infos: Vec<SplitterInfo>,
    destinations: Vec<SplitterDestination>,
}

impl SplitterContext {
    /// `info_count` splitters sharing `destination_count` destinations.
    pub fn new(info_count: usize, destination_count: usize) -> Self {
        Self {
            infos: (0..info_count)
                .map(|id| SplitterInfo {
                    id: id as u32,
                    ..Default::default()
                })
                .collect(),
            destinations: (0..destination_count)
                .map(|id| SplitterDestination {
                    id: id as u32,
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// True if the session has any splitter.
    pub fn using_splitter(&self) -> bool {
        !self.infos.is_empty() && !self.destinations.is_empty()
    }

    /// Splitter `id`.
    pub fn info(&self, id: i32) -> Option<&SplitterInfo> {
        usize::try_from(id).ok().and_then(|i| self.infos.get(i))
    }

    /// Destination `index` of splitter `id`.
    pub fn destination(&self, id: i32, index: usize) -> Option<&SplitterDestination> {
        let slot = *self.info(id)?.destinations.get(index)?;
        self.destinations.get(slot)
    }

    /// Destination `index` of splitter `id`, mutably.
    pub fn destination_mut(&mut self, id: i32, index: usize) -> Option<&mut SplitterDestination> {
        let slot = *self.info(id)?.destinations.get(index)?;
        self.destinations.get_mut(slot)
    }

    /// Applies a decoded splitter section. Records naming slots past the
    /// session's counts are skipped.
    pub fn update(&mut self, section: &SplitterSection) {
        for params in &section.infos {
            let Some(info) = self.infos.get_mut(params.id as usize) else {
                tracing::warn!(id = params.id, "splitter id out of range");
                continue;
            };
            info.sample_rate = params.sample_rate;
            info.destinations = params
                .destination_ids
                .iter()
                .map(|&d| d as usize)
                .filter(|&d| d < self.destinations.len())
                .collect();
            info.has_new_connection = true;
        }

        for params in &section.destinations {
            let Some(dest) = self.destinations.get_mut(params.id as usize) else {
                tracing::warn!(id = params.id, "splitter destination id out of range");
                continue;
            };
            dest.mix_id = params.mix_id;
            dest.mix_volumes = params.mix_volumes;
            if !dest.in_use && params.in_use {
                dest.prev_mix_volumes = dest.mix_volumes;
                dest.need_update = false;
            }
            dest.in_use = params.in_use;
        }
    }

    /// Mix ids fed by splitter `id`.
    pub fn destination_mix_ids(&self, id: i32) -> impl Iterator<Item = i32> + '_ {
        self.info(id)
            .into_iter()
            .flat_map(|info| info.destinations.iter())
            .filter_map(|&slot| self.destinations.get(slot))
            .filter(|d| d.is_configured())
            .map(|d| d.mix_id)
    }

    /// Clears connection flags and latches ramp volumes after a tick.
    pub fn update_internal_state(&mut self) {
        for info in &mut self.infos {
            info.has_new_connection = false;
        }
        for dest in &mut self.destinations {
            dest.update_internal_state();
        }
    }
}
