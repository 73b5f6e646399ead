//! One renderer session: its contexts, its update path and its command
//! generation.
//!
//! `Uninitialized -> Initialized -> {Started <-> Stopped} -> Finalized`.
//! In manual mode [`System::request_update`] renders inline; in automatic
//! mode the scheduler calls [`System::render_job`] once per tick.

use std::sync::Arc;
use std::time::Instant;

use audren_core::{BehaviorInfo, GuestMemory};

use crate::command::generator::{GenerationContext, GeneratorSettings};
use crate::command::{CommandGenerator, CommandList, CommandListProcessor, ProcessResult};
use crate::coprocessor::DspJob;
use crate::effect::EffectContext;
use crate::error::{RendererError, Result};
use crate::memory_pool::PoolMapper;
use crate::mix::MixContext;
use crate::params::{ExecutionMode, RendererParameters};
use crate::performance::PerformanceManager;
use crate::resources::{DeviceOutput, RenderResources, SharedResources};
use crate::sink::SinkContext;
use crate::splitter::SplitterContext;
use crate::updater::{InfoUpdater, UpdateTargets};
use crate::voice::VoiceContext;

/// Lifecycle state of a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    /// Constructed, not yet initialized.
    #[default]
    Uninitialized,
    /// Initialized, never started.
    Initialized,
    /// Producing command lists.
    Started,
    /// Initialized but paused.
    Stopped,
    /// Torn down; every call fails.
    Finalized,
}

/// Per-session renderer state.
pub struct System {
    state: SystemState,
    params: RendererParameters,
    session_id: usize,
    process_handle: u64,
    behavior: BehaviorInfo,
    mapper: PoolMapper,
    voices: VoiceContext,
    effects: EffectContext,
    splitters: SplitterContext,
    mixes: MixContext,
    sinks: SinkContext,
    resources: SharedResources,
    memory: Arc<dyn GuestMemory>,
    updater: InfoUpdater,
    processor: CommandListProcessor,
    settings: GeneratorSettings,
    elapsed_frames: u64,
    voices_dropped: u32,
    epoch: Instant,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("params", &self.params)
            .field("elapsed_frames", &self.elapsed_frames)
            .field("voices_dropped", &self.voices_dropped)
            .finish_non_exhaustive()
    }
}

impl System {
    /// An uninitialized system over `memory`.
    pub fn new(memory: Arc<dyn GuestMemory>) -> Self {
        let params = RendererParameters::default();
        Self {
            state: SystemState::Uninitialized,
            session_id: 0,
            process_handle: 0,
            behavior: BehaviorInfo::new(),
            mapper: PoolMapper::new(0),
            voices: VoiceContext::new(0),
            effects: EffectContext::new(0),
            splitters: SplitterContext::new(0, 0),
            mixes: MixContext::new(0, 0),
            sinks: SinkContext::new(0),
            resources: RenderResources::new(&params, Arc::clone(&memory), None).shared(),
            memory,
            updater: InfoUpdater::new(&params),
            processor: CommandListProcessor::new(),
            settings: GeneratorSettings::default(),
            elapsed_frames: 0,
            voices_dropped: 0,
            epoch: Instant::now(),
            params,
        }
    }

    /// Workbuffer bytes a session with `params` needs.
    pub fn work_buffer_size(params: &RendererParameters) -> u64 {
        params.work_buffer_size()
    }

    /// Validates `params` and sizes every context for them.
    ///
    /// Fails with [`RendererError::InvalidRevision`] for an unknown
    /// revision, [`RendererError::InvalidProcessHandle`] for a null process
    /// and [`RendererError::InsufficientBuffer`] when `work_buffer_size` is
    /// below [`System::work_buffer_size`].
    pub fn initialize(
        &mut self,
        params: &RendererParameters,
        work_buffer_size: u64,
        process_handle: u64,
        session_id: usize,
    ) -> Result<()> {
        if self.state != SystemState::Uninitialized {
            return Err(RendererError::AlreadyInitialized);
        }
        params.validate()?;
        if process_handle == 0 {
            return Err(RendererError::InvalidProcessHandle);
        }
        let needed = params.work_buffer_size();
        if work_buffer_size < needed {
            return Err(RendererError::InsufficientBuffer {
                needed,
                given: work_buffer_size,
            });
        }

        self.behavior = BehaviorInfo::new();
        self.behavior.set_user_revision(params.revision);
        let performance = (params.performance_frame_count > 0).then(|| {
            PerformanceManager::new(
                self.behavior.performance_format(),
                params.performance_entries_per_frame(),
                params.performance_frame_count as usize,
            )
        });

        self.params = *params;
        self.session_id = session_id;
        self.process_handle = process_handle;
        self.mapper = PoolMapper::new(params.memory_pool_count());
        self.voices = VoiceContext::new(params.voice_count as usize);
        self.effects = EffectContext::new(params.effect_count as usize);
        self.splitters = SplitterContext::new(
            params.splitter_count as usize,
            params.splitter_destination_count as usize,
        );
        self.mixes = MixContext::new(params.mix_count(), params.effect_count as usize);
        self.sinks = SinkContext::new(params.sink_count as usize);
        self.resources = RenderResources::new(params, Arc::clone(&self.memory), performance).shared();
        self.updater = InfoUpdater::new(params);
        self.settings = GeneratorSettings {
            voice_drop_enabled: params.voice_drop_enabled,
            ..GeneratorSettings::default()
        };
        self.elapsed_frames = 0;
        self.voices_dropped = 0;
        self.epoch = Instant::now();
        self.state = SystemState::Initialized;

        tracing::debug!(
            session = session_id,
            revision = self.behavior.user_revision().get(),
            sample_rate = params.sample_rate,
            sample_count = params.sample_count,
            voices = params.voice_count,
            mode = ?params.execution_mode,
            "system initialized"
        );
        Ok(())
    }

    fn require_initialized(&self) -> Result<()> {
        match self.state {
            SystemState::Uninitialized => Err(RendererError::NotInitialized),
            SystemState::Finalized => Err(RendererError::InvalidState),
            _ => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SystemState {
        self.state
    }

    /// True while producing command lists.
    pub fn is_active(&self) -> bool {
        self.state == SystemState::Started
    }

    /// Session slot this system occupies.
    pub fn session_id(&self) -> usize {
        self.session_id
    }

    /// Process handle given at initialization.
    pub fn process_handle(&self) -> u64 {
        self.process_handle
    }

    /// Parameters given at initialization.
    pub fn params(&self) -> &RendererParameters {
        &self.params
    }

    /// Who drives ticks.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.params.execution_mode
    }

    /// Revision gate of the session.
    pub fn behavior(&self) -> &BehaviorInfo {
        &self.behavior
    }

    /// Begins producing command lists.
    pub fn start(&mut self) -> Result<()> {
        self.require_initialized()?;
        if self.state != SystemState::Started {
            self.state = SystemState::Started;
            tracing::debug!(session = self.session_id, "system started");
        }
        Ok(())
    }

    /// Stops producing command lists. Returns once a list the coprocessor
    /// is still running for this session has finished.
    pub fn stop(&mut self) -> Result<()> {
        self.require_initialized()?;
        if self.state == SystemState::Started {
            self.state = SystemState::Stopped;
            drop(self.resources.lock());
            tracing::debug!(session = self.session_id, frames = self.elapsed_frames, "system stopped");
        }
        Ok(())
    }

    /// Stops the system for good. Deregistration and session release are
    /// up to the owner.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == SystemState::Finalized {
            return Ok(());
        }
        if self.state != SystemState::Uninitialized {
            self.stop()?;
        }
        self.state = SystemState::Finalized;
        tracing::debug!(session = self.session_id, "system finalized");
        Ok(())
    }

    /// Applies a client update and writes the statuses into `output` and the
    /// performance histories into `performance_out`. In manual mode a started
    /// system then renders one tick.
    pub fn request_update(&mut self, input: &[u8], output: &mut [u8], performance_out: &mut [u8]) -> Result<()> {
        self.require_initialized()?;
        {
            let mut guard = self.resources.lock();
            let resources = &mut *guard;
            self.updater.update(
                input,
                output,
                performance_out,
                UpdateTargets {
                    behavior: &mut self.behavior,
                    mapper: &mut self.mapper,
                    voices: &mut self.voices,
                    voice_states: &mut resources.voice_states,
                    effects: &mut self.effects,
                    effect_states: &resources.effect_states,
                    splitters: &mut self.splitters,
                    mixes: &mut self.mixes,
                    sinks: &mut self.sinks,
                    performance: resources.performance.as_mut(),
                    renderer_active: self.state == SystemState::Started,
                    elapsed_frames: self.elapsed_frames,
                    voices_dropped: self.voices_dropped,
                },
            )?;
        }

        if self.params.execution_mode == ExecutionMode::Manual && self.state == SystemState::Started {
            let list = self.generate_command_list();
            let result = self.processor.process(&list, &mut self.resources.lock());
            tracing::trace!(
                session = self.session_id,
                executed = result.executed,
                dropped = result.dropped,
                "manual tick rendered"
            );
        }
        Ok(())
    }

    /// Builds the next tick's command list and advances the frame counter.
    pub fn generate_command_list(&mut self) -> CommandList {
        self.mapper.clear_use_state();
        let generator = CommandGenerator::new(&self.params, &self.behavior, self.settings);

        let mut guard = self.resources.lock();
        let resources = &mut *guard;
        if let Some(performance) = resources.performance.as_mut() {
            let start = u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
            performance.tap_frame(start);
        }
        let list = generator.generate(GenerationContext {
            voices: &mut self.voices,
            mixes: &self.mixes,
            effects: &mut self.effects,
            splitters: &mut self.splitters,
            sinks: &mut self.sinks,
            mapper: &mut self.mapper,
            voice_states: &mut resources.voice_states,
            performance: resources.performance.as_mut(),
        });

        self.elapsed_frames += 1;
        self.voices_dropped = list.header.voices_dropped;
        list
    }

    /// The next tick's job for the coprocessor, or `None` when not started.
    pub fn render_job(&mut self) -> Option<DspJob> {
        if self.state != SystemState::Started {
            return None;
        }
        let list = self.generate_command_list();
        Some(DspJob {
            session_id: self.session_id,
            list,
            resources: Arc::clone(&self.resources),
            processor: self.processor,
        })
    }

    /// Processor-owned state, shared with the coprocessor.
    pub fn resources(&self) -> SharedResources {
        Arc::clone(&self.resources)
    }

    /// PCM16 the device sinks wrote during the last tick.
    pub fn rendered_output(&self) -> DeviceOutput {
        self.resources.lock().device_output.clone()
    }

    /// Outcome of the last processed list.
    pub fn last_result(&self) -> Option<ProcessResult> {
        self.resources.lock().last_result
    }

    /// Ticks generated since initialization.
    pub fn frames_elapsed(&self) -> u64 {
        self.elapsed_frames
    }

    /// Voices dropped by the last generation.
    pub fn voices_dropped(&self) -> u32 {
        self.voices_dropped
    }

    /// Share of the revision's time limit the lists may use, in percent.
    pub fn render_time_limit(&self) -> u32 {
        self.settings.render_time_limit_percent
    }

    /// Sets the share of the time limit, in percent.
    pub fn set_render_time_limit(&mut self, percent: u32) {
        self.settings.render_time_limit_percent = percent;
    }

    /// Weight applied to voice estimates when dropping voices.
    pub fn voice_drop_parameter(&self) -> f32 {
        self.settings.voice_drop_parameter
    }

    /// Sets the voice-drop weight.
    pub fn set_voice_drop_parameter(&mut self, weight: f32) {
        self.settings.voice_drop_parameter = weight;
    }

    /// Enables or disables voice dropping.
    pub fn set_voice_drop_enabled(&mut self, enabled: bool) {
        self.settings.voice_drop_enabled = enabled;
    }

    /// Enables or disables the processor's time limit.
    pub fn set_time_limit_enforced(&mut self, enforce: bool) {
        self.processor = self.processor.with_time_limit(enforce);
    }
}
