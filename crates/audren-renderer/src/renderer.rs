//! Client-facing handle over one session.
//!
//! [`AudioRenderer::open`] acquires a session id, initializes a [`System`]
//! and, in automatic mode, registers it with the scheduler. Finalizing (or
//! dropping) undoes those steps in reverse: stop, deregister, release.

use std::sync::Arc;

use audren_core::GuestMemory;
use parking_lot::Mutex;

use crate::command::ProcessResult;
use crate::error::Result;
use crate::manager::Manager;
use crate::params::{ExecutionMode, RendererParameters};
use crate::resources::DeviceOutput;
use crate::system::{System, SystemState};
use crate::system_manager::{Registration, SharedSystem, SystemManager};

/// An open renderer session.
#[derive(Debug)]
pub struct AudioRenderer {
    system: SharedSystem,
    session_id: usize,
    manager: Arc<Manager>,
    scheduler: Arc<SystemManager>,
    registration: Option<Registration>,
    finalized: bool,
}

impl AudioRenderer {
    /// Opens a session over `memory`.
    ///
    /// Fails with [`RendererError::OutOfSessions`](crate::RendererError::OutOfSessions)
    /// when the pool is exhausted, with any [`System::initialize`] error, or
    /// with [`RendererError::MaxSystemsReached`](crate::RendererError::MaxSystemsReached)
    /// when the scheduler is full. A failed open holds no session.
    pub fn open(
        manager: Arc<Manager>,
        scheduler: Arc<SystemManager>,
        params: &RendererParameters,
        work_buffer_size: u64,
        process_handle: u64,
        memory: Arc<dyn GuestMemory>,
    ) -> Result<Self> {
        let session_id = manager.acquire_session()?;
        let release = |e| {
            let _ = manager.release_session(session_id);
            e
        };

        let mut system = System::new(memory);
        system
            .initialize(params, work_buffer_size, process_handle, session_id)
            .map_err(release)?;
        let system = Arc::new(Mutex::new(system));

        let registration = match params.execution_mode {
            ExecutionMode::Auto => Some(scheduler.add(Arc::clone(&system)).map_err(release)?),
            ExecutionMode::Manual => None,
        };

        Ok(Self {
            system,
            session_id,
            manager,
            scheduler,
            registration,
            finalized: false,
        })
    }

    /// Session id held by this renderer.
    pub fn session_id(&self) -> usize {
        self.session_id
    }

    /// Shared handle to the underlying system.
    pub fn system(&self) -> SharedSystem {
        Arc::clone(&self.system)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SystemState {
        self.system.lock().state()
    }

    /// Begins rendering.
    pub fn start(&self) -> Result<()> {
        self.system.lock().start()
    }

    /// Pauses rendering, waiting out a list in flight.
    pub fn stop(&self) -> Result<()> {
        self.system.lock().stop()
    }

    /// Applies an update; see [`System::request_update`].
    pub fn request_update(&self, input: &[u8], output: &mut [u8], performance_out: &mut [u8]) -> Result<()> {
        self.system.lock().request_update(input, output, performance_out)
    }

    /// PCM16 the device sinks wrote during the last tick.
    pub fn rendered_output(&self) -> DeviceOutput {
        self.system.lock().rendered_output()
    }

    /// Outcome of the last processed list.
    pub fn last_result(&self) -> Option<ProcessResult> {
        self.system.lock().last_result()
    }

    /// Ticks generated so far.
    pub fn frames_elapsed(&self) -> u64 {
        self.system.lock().frames_elapsed()
    }

    /// Sets the share of the time limit, in percent.
    pub fn set_render_time_limit(&self, percent: u32) {
        self.system.lock().set_render_time_limit(percent);
    }

    /// Enables or disables voice dropping.
    pub fn set_voice_drop_enabled(&self, enabled: bool) {
        self.system.lock().set_voice_drop_enabled(enabled);
    }

    /// Stops, deregisters and releases the session. Idempotent.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        self.system.lock().finalize()?;
        if let Some(registration) = self.registration.take() {
            self.scheduler.remove(registration)?;
        }
        self.manager.release_session(self.session_id)
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(session = self.session_id, error = %e, "renderer teardown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coprocessor::MockCoprocessor;
    use crate::error::RendererError;
    use crate::guest_memory::FlatGuestMemory;
    use crate::params::MAX_SESSIONS;
    use audren_core::GuestAddr;
    use std::time::Duration;

    fn host() -> (Arc<Manager>, Arc<SystemManager>) {
        (
            Arc::new(Manager::new()),
            Arc::new(SystemManager::with_interval(
                Arc::new(MockCoprocessor::new()),
                Duration::from_millis(1),
            )),
        )
    }

    fn open(
        manager: &Arc<Manager>,
        scheduler: &Arc<SystemManager>,
        mode: ExecutionMode,
        handle: u64,
    ) -> Result<AudioRenderer> {
        let params = RendererParameters {
            execution_mode: mode,
            ..Default::default()
        };
        AudioRenderer::open(
            Arc::clone(manager),
            Arc::clone(scheduler),
            &params,
            params.work_buffer_size(),
            handle,
            Arc::new(FlatGuestMemory::new(GuestAddr::new(0x1000), 0x100)),
        )
    }

    #[test]
    fn automatic_session_registers_and_releases() {
        let (manager, scheduler) = host();
        let mut r = open(&manager, &scheduler, ExecutionMode::Auto, 1).unwrap();
        assert_eq!(manager.active_count(), 1);
        assert_eq!(scheduler.registered(), 1);
        r.finalize().unwrap();
        assert_eq!(manager.active_count(), 0);
        assert_eq!(scheduler.registered(), 0);
        assert_eq!(r.state(), SystemState::Finalized);
        r.finalize().unwrap();
    }

    #[test]
    fn manual_session_skips_the_scheduler() {
        let (manager, scheduler) = host();
        let r = open(&manager, &scheduler, ExecutionMode::Manual, 1).unwrap();
        assert_eq!(scheduler.registered(), 0);
        drop(r);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn failed_initialize_releases_the_session() {
        let (manager, scheduler) = host();
        assert_eq!(
            open(&manager, &scheduler, ExecutionMode::Auto, 0).unwrap_err(),
            RendererError::InvalidProcessHandle
        );
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn pool_exhaustion_is_immediate() {
        let (manager, scheduler) = host();
        let held: Vec<_> = (0..MAX_SESSIONS)
            .map(|_| open(&manager, &scheduler, ExecutionMode::Manual, 1).unwrap())
            .collect();
        assert_eq!(
            open(&manager, &scheduler, ExecutionMode::Manual, 1).unwrap_err(),
            RendererError::OutOfSessions
        );
        drop(held);
        assert!(open(&manager, &scheduler, ExecutionMode::Manual, 1).is_ok());
    }
}
