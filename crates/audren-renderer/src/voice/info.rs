//! Host-side voice record and its per-update and per-tick transitions.

use audren_core::{BehaviorInfo, ErrorInfo, Feature};

use super::VoiceChannelResource;
use super::state::VoiceState;
use crate::error::RendererError;
use crate::memory_pool::{AddressInfo, PoolMapper};
use crate::params::{MAX_CHANNELS, MAX_WAVE_BUFFERS};
use crate::wire::{
    SampleFormat, SrcQuality, UNUSED_MIX_ID, UNUSED_SPLITTER_ID, VoiceBiquadParameter, VoiceInParameter,
    VoiceOutStatus, VoicePlayState, WaveBufferInParameter,
};

/// Priority that is never dropped.
pub const HIGHEST_VOICE_PRIORITY: u32 = 0;
/// Priority of a freshly initialized slot.
pub const LOWEST_VOICE_PRIORITY: u32 = 0xFF;

/// Play state as tracked by the renderer.
///
/// A client stop becomes [`ServerPlayState::RequestStop`] until the next
/// command generation releases the queued buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPlayState {
    /// Playing.
    Started,
    /// Stopped, buffers released.
    #[default]
    Stopped,
    /// Stop requested, buffers not yet released.
    RequestStop,
    /// Holding position.
    Paused,
}

/// Bytes of DSP-ADPCM data covering the first `samples` samples.
fn adpcm_data_size(samples: i32) -> i64 {
    let samples = i64::from(samples);
    let frames = samples / 14;
    let extra = samples % 14;
    let tail = if extra == 0 { 0 } else { extra / 2 + 1 + extra % 2 };
    frames * 8 + tail
}

/// Renderer copy of one queued wave buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveBuffer {
    /// Sample data.
    pub buffer: AddressInfo,
    /// ADPCM loop context.
    pub context: AddressInfo,
    /// First sample played.
    pub start_offset: i32,
    /// One past the last sample played.
    pub end_offset: i32,
    /// Loop this buffer.
    pub looping: bool,
    /// Last buffer of the stream.
    pub stream_ended: bool,
    /// Already queued on the channel states.
    pub sent_to_dsp: bool,
    /// Loop start sample.
    pub loop_start: u32,
    /// Loop end sample.
    pub loop_end: u32,
    /// Loops before moving on; negative loops forever.
    pub loop_count: i32,
}

impl Default for WaveBuffer {
    fn default() -> Self {
        Self {
            buffer: AddressInfo::default(),
            context: AddressInfo::default(),
            start_offset: 0,
            end_offset: 0,
            looping: false,
            stream_ended: false,
            sent_to_dsp: true,
            loop_start: 0,
            loop_end: 0,
            loop_count: 0,
        }
    }
}

/// Everything the renderer knows about one voice slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    /// Slot in use this update.
    pub in_use: bool,
    /// Not yet seen by command generation.
    pub is_new: bool,
    /// Was playing last tick and stopped since; gets one depop pass.
    pub was_playing: bool,
    /// Voice slot.
    pub id: u32,
    /// Performance node id.
    pub node_id: u32,
    /// Encoding of the wave buffers.
    pub sample_format: SampleFormat,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Channels, 1..=6.
    pub channel_count: usize,
    /// Current play state.
    pub play_state: ServerPlayState,
    /// Play state before the last update.
    pub last_play_state: ServerPlayState,
    /// Resampler quality.
    pub src_quality: SrcQuality,
    /// 0 is never dropped; larger values are dropped first.
    pub priority: u32,
    /// Tie-break among equal priorities.
    pub sort_order: u32,
    /// Playback rate multiplier.
    pub pitch: f32,
    /// Linear volume.
    pub volume: f32,
    /// Volume at the end of the last tick.
    pub prev_volume: f32,
    /// Per-voice filters.
    pub biquads: [VoiceBiquadParameter; 2],
    /// Filter state has been primed since the filter was enabled.
    pub biquad_initialized: [bool; 2],
    /// Buffers the client has queued.
    pub wave_buffer_count: u32,
    /// Buffer the client expects to play next.
    pub wave_buffer_index: usize,
    /// ADPCM coefficient table.
    pub data_address: AddressInfo,
    /// Queued buffers.
    pub wave_buffers: [WaveBuffer; MAX_WAVE_BUFFERS],
    /// Channel resource per channel.
    pub channel_resource_ids: [u32; MAX_CHANNELS],
    /// Destination mix.
    pub mix_id: i32,
    /// Destination splitter.
    pub splitter_id: i32,
    /// Dropped by the generator to stay within budget.
    pub voice_dropped: bool,
    /// Coefficient table outside every pool.
    pub data_unmapped: bool,
    /// A wave buffer outside every pool.
    pub buffer_unmapped: bool,
    /// Buffers still to flush at the next generation.
    pub flush_buffer_count: u32,
    /// Looping resets the played sample count.
    pub played_sample_count_reset_at_loop: bool,
    /// Skip pitch and sample rate conversion.
    pub pitch_and_src_skipped: bool,
}

impl Default for VoiceInfo {
    fn default() -> Self {
        Self {
            in_use: false,
            is_new: false,
            was_playing: false,
            id: 0,
            node_id: 0,
            sample_format: SampleFormat::Invalid,
            sample_rate: 0,
            channel_count: 0,
            play_state: ServerPlayState::Stopped,
            last_play_state: ServerPlayState::Stopped,
            src_quality: SrcQuality::Medium,
            priority: LOWEST_VOICE_PRIORITY,
            sort_order: 0,
            pitch: 0.0,
            volume: 0.0,
            prev_volume: 0.0,
            biquads: [VoiceBiquadParameter::default(); 2],
            biquad_initialized: [false; 2],
            wave_buffer_count: 0,
            wave_buffer_index: 0,
            data_address: AddressInfo::default(),
            wave_buffers: [WaveBuffer::default(); MAX_WAVE_BUFFERS],
            channel_resource_ids: [0; MAX_CHANNELS],
            mix_id: UNUSED_MIX_ID,
            splitter_id: UNUSED_SPLITTER_ID,
            voice_dropped: false,
            data_unmapped: false,
            buffer_unmapped: false,
            flush_buffer_count: 0,
            played_sample_count_reset_at_loop: false,
            pitch_and_src_skipped: false,
        }
    }
}

impl VoiceInfo {
    /// A stopped, unused slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource ids of the channels in use.
    pub fn channel_ids(&self) -> &[u32] {
        &self.channel_resource_ids[..self.channel_count.min(MAX_CHANNELS)]
    }

    /// True if the coefficient table moved or was never mapped.
    pub fn should_update_parameters(&self, params: &VoiceInParameter) -> bool {
        self.data_address.address() != params.data_address
            || self.data_address.size() != params.data_size
            || self.data_unmapped
    }

    /// Copies the scalar fields of `params` and re-attaches the coefficient
    /// table when it moved. A failed attachment is reported in `error`.
    pub fn update_parameters(
        &mut self,
        error: &mut ErrorInfo,
        params: &VoiceInParameter,
        mapper: &PoolMapper,
        behavior: &BehaviorInfo,
    ) {
        self.in_use = params.in_use;
        self.id = params.id;
        self.node_id = params.node_id;
        self.update_play_state(params.play_state);
        self.src_quality = params.src_quality;
        self.priority = params.priority;
        self.sort_order = params.sort_order;
        self.sample_rate = params.sample_rate;
        self.sample_format = params.sample_format;
        self.channel_count = (params.channel_count as usize).min(MAX_CHANNELS);
        self.pitch = params.pitch;
        self.volume = params.volume;
        self.biquads = params.biquads;
        self.wave_buffer_count = params.wave_buffer_count;
        self.wave_buffer_index = usize::from(params.wave_buffer_index) % MAX_WAVE_BUFFERS;

        if behavior.is_supported(Feature::FlushVoiceWaveBuffers) {
            self.flush_buffer_count += u32::from(params.flush_count);
        }

        self.mix_id = params.mix_id;
        self.splitter_id = if behavior.is_supported(Feature::Splitter) {
            params.splitter_id
        } else {
            UNUSED_SPLITTER_ID
        };
        self.channel_resource_ids = params.channel_resource_ids;

        self.played_sample_count_reset_at_loop = behavior
            .is_supported(Feature::VoicePlayedSampleCountResetAtLoopPoint)
            && params.flags & VoiceInParameter::FLAG_PLAYED_SAMPLE_RESET_AT_LOOP != 0;
        self.pitch_and_src_skipped = behavior.is_supported(Feature::VoicePitchAndSrcSkipped)
            && params.flags & VoiceInParameter::FLAG_PITCH_AND_SRC_SKIPPED != 0;

        if params.clear_voice_drop {
            self.voice_dropped = false;
        }

        if self.should_update_parameters(params) {
            self.data_unmapped =
                !mapper.try_attach_buffer(error, &mut self.data_address, params.data_address, params.data_size);
        } else {
            *error = ErrorInfo::SUCCESS;
        }
    }

    fn update_play_state(&mut self, state: VoicePlayState) {
        self.last_play_state = self.play_state;
        match state {
            VoicePlayState::Started => self.play_state = ServerPlayState::Started,
            VoicePlayState::Stopped => {
                if self.play_state != ServerPlayState::Stopped {
                    self.play_state = ServerPlayState::RequestStop;
                }
            }
            VoicePlayState::Paused => self.play_state = ServerPlayState::Paused,
        }
    }

    /// Applies the four wave buffer records.
    ///
    /// A new voice starts from an empty queue. Records already sent are left
    /// alone unless an earlier attachment failed. `errors[i]` receives the
    /// buffer and context attachment results of buffer `i`.
    pub fn update_wave_buffers(
        &mut self,
        errors: &mut [[ErrorInfo; 2]; MAX_WAVE_BUFFERS],
        params: &VoiceInParameter,
        states: &mut [VoiceState],
        mapper: &PoolMapper,
        behavior: &BehaviorInfo,
    ) {
        if params.is_new {
            self.wave_buffers = [WaveBuffer::default(); MAX_WAVE_BUFFERS];
            let count = (params.channel_count as usize).min(MAX_CHANNELS);
            for &id in &params.channel_resource_ids[..count] {
                if let Some(state) = states.get_mut(id as usize) {
                    state.wave_buffer_valid = [false; MAX_WAVE_BUFFERS];
                }
            }
        }

        let valid = states
            .get(params.channel_resource_ids[0] as usize)
            .map_or([false; MAX_WAVE_BUFFERS], |s| s.wave_buffer_valid);
        for (i, input) in params.wave_buffers.iter().enumerate() {
            self.update_wave_buffer(&mut errors[i], i, input, params.sample_format, valid[i], mapper, behavior);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_wave_buffer(
        &mut self,
        errors: &mut [ErrorInfo; 2],
        index: usize,
        input: &WaveBufferInParameter,
        format: SampleFormat,
        valid: bool,
        mapper: &PoolMapper,
        behavior: &BehaviorInfo,
    ) {
        let wb = &mut self.wave_buffers[index];
        if !valid && wb.sent_to_dsp && !wb.buffer.address().is_null() {
            PoolMapper::force_unmap(&mut wb.buffer);
            wb.buffer = AddressInfo::default();
        }

        if input.sent_to_dsp && !self.buffer_unmapped {
            return;
        }

        let invalid = ErrorInfo::new(RendererError::InvalidUpdateInfo("").code(), input.address);
        if input.start_offset < 0 || input.end_offset < 0 {
            tracing::warn!(index, start = input.start_offset, end = input.end_offset, "negative wave buffer offsets");
            errors[0] = invalid;
            return;
        }
        let size = i64::try_from(input.size).unwrap_or(i64::MAX);
        let (start, end) = match format {
            SampleFormat::PcmInt16 => (i64::from(input.start_offset) * 2, i64::from(input.end_offset) * 2),
            SampleFormat::PcmFloat => (i64::from(input.start_offset) * 4, i64::from(input.end_offset) * 4),
            SampleFormat::Adpcm => (adpcm_data_size(input.start_offset), adpcm_data_size(input.end_offset)),
            _ => (0, 0),
        };
        if start > size || end > size {
            tracing::warn!(index, ?format, start, end, size, "wave buffer offsets past the end of its data");
            errors[0] = invalid;
            return;
        }

        let wb = &mut self.wave_buffers[index];
        wb.start_offset = input.start_offset;
        wb.end_offset = input.end_offset;
        wb.looping = input.looping;
        wb.stream_ended = input.stream_ended;
        wb.sent_to_dsp = false;
        wb.loop_start = input.loop_start;
        wb.loop_end = input.loop_end;
        wb.loop_count = input.loop_count;

        let [buffer_error, context_error] = errors;
        self.buffer_unmapped = !mapper.try_attach_buffer(buffer_error, &mut wb.buffer, input.address, input.size);

        if format == SampleFormat::Adpcm
            && behavior.is_supported(Feature::AdpcmLoopContextBugFix)
            && !input.context_address.is_null()
        {
            let mapped =
                mapper.try_attach_buffer(context_error, &mut wb.context, input.context_address, input.context_size);
            self.buffer_unmapped = !mapped || self.data_unmapped;
        } else {
            wb.context = AddressInfo::default();
        }
    }

    /// Status for the response. A voice that has not been through command
    /// generation yet reports zeros.
    pub fn write_out_status(&mut self, params: &VoiceInParameter, states: &[VoiceState]) -> VoiceOutStatus {
        if params.is_new {
            self.is_new = true;
        }
        if self.is_new {
            return VoiceOutStatus::default();
        }
        let state = states.get(self.channel_resource_ids[0] as usize);
        VoiceOutStatus {
            played_sample_count: state.map_or(0, |s| s.played_sample_count),
            wave_buffers_consumed: state.map_or(0, |s| s.wave_buffers_consumed),
            voice_dropped: self.voice_dropped,
        }
    }

    /// True if the voice produces no commands this tick.
    pub fn should_skip(&self) -> bool {
        !self.in_use || self.wave_buffer_count == 0 || self.data_unmapped || self.buffer_unmapped || self.voice_dropped
    }

    /// True if the voice feeds a mix or a splitter.
    pub fn has_any_connection(&self) -> bool {
        self.mix_id != UNUSED_MIX_ID || self.splitter_id != UNUSED_SPLITTER_ID
    }

    fn for_each_state(&self, states: &mut [VoiceState], mut f: impl FnMut(&mut VoiceState)) {
        for &id in self.channel_ids() {
            if let Some(state) = states.get_mut(id as usize) {
                f(state);
            }
        }
    }

    fn flush_wave_buffers(&mut self, states: &mut [VoiceState]) {
        let mut index = self.wave_buffer_index;
        for _ in 0..self.flush_buffer_count {
            self.wave_buffers[index].sent_to_dsp = true;
            self.for_each_state(states, |s| s.consume_buffer(index));
            index = (index + 1) % MAX_WAVE_BUFFERS;
        }
        self.flush_buffer_count = 0;
    }

    fn update_parameters_for_command_generation(&mut self, states: &mut [VoiceState], mapper: &mut PoolMapper) -> bool {
        if self.flush_buffer_count > 0 {
            self.flush_wave_buffers(states);
        }

        match self.play_state {
            ServerPlayState::Started => {
                for i in 0..MAX_WAVE_BUFFERS {
                    if !self.wave_buffers[i].sent_to_dsp {
                        self.for_each_state(states, |s| s.wave_buffer_valid[i] = true);
                        self.wave_buffers[i].sent_to_dsp = true;
                    }
                }
                self.was_playing = false;
                if states
                    .get(self.channel_resource_ids[0] as usize)
                    .is_some_and(VoiceState::has_valid_buffer)
                {
                    return true;
                }
            }
            ServerPlayState::Stopped | ServerPlayState::Paused => {
                for wb in &self.wave_buffers {
                    if !wb.sent_to_dsp {
                        wb.buffer.get_reference(mapper, true);
                        wb.context.get_reference(mapper, true);
                    }
                }
                if self.sample_format == SampleFormat::Adpcm && !self.data_address.address().is_null() {
                    self.data_address.get_reference(mapper, true);
                }
                self.was_playing = self.last_play_state == ServerPlayState::Started;
            }
            ServerPlayState::RequestStop => {
                for i in 0..MAX_WAVE_BUFFERS {
                    self.wave_buffers[i].sent_to_dsp = true;
                    self.for_each_state(states, |s| {
                        if s.wave_buffer_valid[i] {
                            s.advance_buffer();
                        }
                        s.wave_buffer_valid[i] = false;
                    });
                }
                self.for_each_state(states, VoiceState::rewind);
                self.play_state = ServerPlayState::Stopped;
                self.was_playing = self.last_play_state == ServerPlayState::Started;
            }
        }

        self.last_play_state = self.play_state;
        self.was_playing
    }

    /// Per-tick transition before command generation.
    ///
    /// Resets the channel states of a new voice, releases flushed and stopped
    /// buffers, and queues newly sent ones. Returns true if the voice has
    /// something to render: queued data, or a final depop pass after a stop.
    pub fn update_for_command_generation(
        &mut self,
        resources: &mut [VoiceChannelResource],
        states: &mut [VoiceState],
        mapper: &mut PoolMapper,
    ) -> bool {
        if self.is_new {
            self.for_each_state(states, |s| *s = VoiceState::default());
            for &id in self.channel_ids() {
                if let Some(resource) = resources.get_mut(id as usize) {
                    resource.prev_mix_volumes = resource.mix_volumes;
                }
            }
            self.prev_volume = self.volume;
            self.is_new = false;
        }
        self.update_parameters_for_command_generation(states, mapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audren_core::GuestAddr;

    use crate::wire::{MemoryPoolInParameter, PoolState};

    fn mapper_with_pool() -> PoolMapper {
        let mut m = PoolMapper::new(1);
        m.update(
            0,
            &MemoryPoolInParameter {
                address: GuestAddr::new(0x10_0000),
                size: 0x1_0000,
                state: PoolState::RequestAttach,
            },
        )
        .unwrap();
        m
    }

    fn started_voice() -> VoiceInParameter {
        let mut p = VoiceInParameter {
            id: 0,
            is_new: true,
            in_use: true,
            play_state: VoicePlayState::Started,
            sample_format: SampleFormat::PcmInt16,
            sample_rate: 48_000,
            channel_count: 1,
            pitch: 1.0,
            volume: 1.0,
            wave_buffer_count: 1,
            mix_id: 0,
            splitter_id: UNUSED_SPLITTER_ID,
            ..Default::default()
        };
        p.wave_buffers = [WaveBufferInParameter {
            sent_to_dsp: true,
            ..Default::default()
        }; MAX_WAVE_BUFFERS];
        p.wave_buffers[0] = WaveBufferInParameter {
            address: GuestAddr::new(0x10_0000),
            size: 480,
            end_offset: 240,
            ..Default::default()
        };
        p
    }

    fn current_behavior() -> BehaviorInfo {
        let mut behavior = BehaviorInfo::new();
        behavior.set_user_revision(audren_core::Revision::CURRENT.to_tag());
        behavior
    }

    fn apply(info: &mut VoiceInfo, p: &VoiceInParameter, states: &mut [VoiceState], mapper: &PoolMapper) -> Vec<ErrorInfo> {
        let behavior = current_behavior();
        let mut err = ErrorInfo::SUCCESS;
        info.update_parameters(&mut err, p, mapper, &behavior);
        let mut wb_errors = [[ErrorInfo::SUCCESS; 2]; MAX_WAVE_BUFFERS];
        info.update_wave_buffers(&mut wb_errors, p, states, mapper, &behavior);
        std::iter::once(err)
            .chain(wb_errors.into_iter().flatten())
            .filter(|e| !e.is_success())
            .collect()
    }

    // --- update ---

    #[test]
    fn started_voice_queues_its_buffer() {
        let mut mapper = mapper_with_pool();
        let mut states = vec![VoiceState::default(); 1];
        let mut resources = vec![VoiceChannelResource::default(); 1];
        let mut info = VoiceInfo::new();
        let p = started_voice();
        assert!(apply(&mut info, &p, &mut states, &mapper).is_empty());
        info.write_out_status(&p, &states);
        assert!(!info.should_skip());

        assert!(info.update_for_command_generation(&mut resources, &mut states, &mut mapper));
        assert!(states[0].wave_buffer_valid[0]);
        assert!(info.wave_buffers[0].sent_to_dsp);
        assert!(!info.is_new);
    }

    #[test]
    fn offsets_past_the_data_are_rejected() {
        let mapper = mapper_with_pool();
        let mut states = vec![VoiceState::default(); 1];
        let mut info = VoiceInfo::new();
        let mut p = started_voice();
        p.wave_buffers[0].end_offset = 241;
        let errors = apply(&mut info, &p, &mut states, &mapper);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, RendererError::InvalidUpdateInfo("").code());
        assert!(info.wave_buffers[0].sent_to_dsp);
    }

    #[test]
    fn unmapped_buffer_skips_voice() {
        let mapper = PoolMapper::new(1);
        let mut states = vec![VoiceState::default(); 1];
        let mut info = VoiceInfo::new();
        let errors = apply(&mut info, &started_voice(), &mut states, &mapper);
        assert_eq!(errors[0].error_code, RendererError::InvalidAddressInfo.code());
        assert!(info.buffer_unmapped);
        assert!(info.should_skip());
    }

    #[test]
    fn adpcm_sizes_count_frame_headers() {
        assert_eq!(adpcm_data_size(0), 0);
        assert_eq!(adpcm_data_size(14), 8);
        assert_eq!(adpcm_data_size(15), 10);
        assert_eq!(adpcm_data_size(16), 10);
    }

    // --- play state ---

    #[test]
    fn stop_releases_queue_and_rewinds() {
        let mut mapper = mapper_with_pool();
        let mut states = vec![VoiceState::default(); 1];
        let mut resources = vec![VoiceChannelResource::default(); 1];
        let mut info = VoiceInfo::new();
        let mut p = started_voice();
        apply(&mut info, &p, &mut states, &mapper);
        info.write_out_status(&p, &states);
        info.update_for_command_generation(&mut resources, &mut states, &mut mapper);
        states[0].offset = 100;

        p.is_new = false;
        p.play_state = VoicePlayState::Stopped;
        p.wave_buffers[0].sent_to_dsp = true;
        apply(&mut info, &p, &mut states, &mapper);
        assert_eq!(info.play_state, ServerPlayState::RequestStop);

        assert!(info.update_for_command_generation(&mut resources, &mut states, &mut mapper));
        assert_eq!(info.play_state, ServerPlayState::Stopped);
        assert!(!states[0].has_valid_buffer());
        assert_eq!(states[0].wave_buffers_consumed, 1);
        assert_eq!(states[0].offset, 0);

        assert!(!info.update_for_command_generation(&mut resources, &mut states, &mut mapper));
    }

    #[test]
    fn flush_consumes_from_client_index() {
        let mut mapper = mapper_with_pool();
        let mut states = vec![VoiceState::default(); 1];
        let mut resources = vec![VoiceChannelResource::default(); 1];
        let mut info = VoiceInfo::new();
        let mut p = started_voice();
        p.wave_buffers[1] = p.wave_buffers[0];
        apply(&mut info, &p, &mut states, &mapper);
        info.write_out_status(&p, &states);
        info.update_for_command_generation(&mut resources, &mut states, &mut mapper);

        p.is_new = false;
        p.flush_count = 1;
        p.wave_buffers[0].sent_to_dsp = true;
        p.wave_buffers[1].sent_to_dsp = true;
        apply(&mut info, &p, &mut states, &mapper);
        info.update_for_command_generation(&mut resources, &mut states, &mut mapper);
        assert!(!states[0].wave_buffer_valid[0]);
        assert!(states[0].wave_buffer_valid[1]);
        assert_eq!(states[0].wave_buffer_index, 1);
        assert_eq!(states[0].wave_buffers_consumed, 1);
    }

    #[test]
    fn new_voice_reports_zero_status() {
        let mapper = mapper_with_pool();
        let mut states = vec![VoiceState {
            played_sample_count: 99,
            ..Default::default()
        }];
        let mut info = VoiceInfo::new();
        let p = started_voice();
        apply(&mut info, &p, &mut states, &mapper);
        assert_eq!(info.write_out_status(&p, &states), VoiceOutStatus::default());
    }

    #[test]
    fn splitter_ignored_before_it_exists() {
        let mapper = mapper_with_pool();
        let mut info = VoiceInfo::new();
        let p = VoiceInParameter {
            splitter_id: 3,
            ..started_voice()
        };
        let mut behavior = BehaviorInfo::new();
        behavior.set_user_revision(audren_core::Revision::new(1).to_tag());
        let mut err = ErrorInfo::SUCCESS;
        info.update_parameters(&mut err, &p, &mapper, &behavior);
        assert_eq!(info.splitter_id, UNUSED_SPLITTER_ID);
    }
}
