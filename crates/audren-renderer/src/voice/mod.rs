//! Voices: client-queued sample streams rendered into a mix or splitter.
//!
//! - [`VoiceInfo`] - Host-side record, updated from the client each tick
//! - [`VoiceState`] - Per-channel playback state the kernels advance
//! - [`VoiceChannelResource`] - Per-channel mix volumes
//! - [`VoiceContext`] - All voice slots plus the priority order the
//!   generator walks

pub mod info;
pub mod state;

pub use info::{HIGHEST_VOICE_PRIORITY, LOWEST_VOICE_PRIORITY, ServerPlayState, VoiceInfo, WaveBuffer};
pub use state::{AdpcmContext, SAMPLE_HISTORY, VoiceState};

use crate::params::MAX_MIX_BUFFERS;
use crate::wire::VoiceChannelResourceInParameter;

/// Mix volumes of one voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceChannelResource {
    /// Resource slot.
    pub id: u32,
    /// Target volume into each destination buffer.
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Volumes at the end of the last tick, ramped from.
    pub prev_mix_volumes: [f32; MAX_MIX_BUFFERS],
    /// Slot in use.
    pub in_use: bool,
}

impl VoiceChannelResource {
    /// Applies one record. Volumes of an unused slot are left alone.
    pub fn update(&mut self, params: &VoiceChannelResourceInParameter) {
        self.id = params.id;
        self.in_use = params.in_use;
        if params.in_use {
            self.mix_volumes = params.mix_volumes;
        }
    }

    /// Latches the current volumes as the next ramp start.
    pub fn update_internal_state(&mut self) {
        self.prev_mix_volumes = self.mix_volumes;
    }
}

/// Every voice slot and channel resource of a session.
#[derive(Debug, Clone, Default)]
pub struct VoiceContext {
    infos: Vec<VoiceInfo>,
    resources: Vec<VoiceChannelResource>,
    sorted: Vec<usize>,
    active_channel_count: usize,
}

impl VoiceContext {
    /// `count` voice slots and as many channel resources.
    pub fn new(count: usize) -> Self {
        Self {
            infos: vec![VoiceInfo::new(); count],
            resources: vec![VoiceChannelResource::default(); count],
            sorted: (0..count).collect(),
            active_channel_count: 0,
        }
    }

    /// Voice slots.
    pub fn count(&self) -> usize {
        self.infos.len()
    }

    /// Slot `index`.
    pub fn info(&self, index: usize) -> Option<&VoiceInfo> {
        self.infos.get(index)
    }

    /// Slot `index`, mutably.
    pub fn info_mut(&mut self, index: usize) -> Option<&mut VoiceInfo> {
        self.infos.get_mut(index)
    }

    /// Channel resource `index`, mutably.
    pub fn resource_mut(&mut self, index: usize) -> Option<&mut VoiceChannelResource> {
        self.resources.get_mut(index)
    }

    /// Slots and resources borrowed together.
    pub fn split_mut(&mut self) -> (&mut [VoiceInfo], &mut [VoiceChannelResource]) {
        (&mut self.infos, &mut self.resources)
    }

    /// Channel resources.
    pub fn resources(&self) -> &[VoiceChannelResource] {
        &self.resources
    }

    /// Slot indices in generation order, after [`VoiceContext::sort`].
    pub fn sorted(&self) -> &[usize] {
        &self.sorted
    }

    /// Channels in use after the last update.
    pub fn active_channel_count(&self) -> usize {
        self.active_channel_count
    }

    /// Records the channels in use.
    pub fn set_active_channel_count(&mut self, count: usize) {
        self.active_channel_count = count;
    }

    /// Orders slots least important first: larger priority values, then
    /// larger sort orders, lead. Equal keys keep slot order.
    pub fn sort(&mut self) {
        let infos = &self.infos;
        self.sorted = (0..infos.len()).collect();
        self.sorted.sort_by(|&a, &b| {
            let (a, b) = (&infos[a], &infos[b]);
            b.priority.cmp(&a.priority).then(b.sort_order.cmp(&a.sort_order))
        });
    }
}
