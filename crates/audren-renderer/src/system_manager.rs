//! Drives registered systems on a fixed tick.
//!
//! Each tick the scheduler thread, under the list lock, asks every started
//! system for its command list and submits it. It then releases the lock,
//! signals the coprocessor and waits for it. Tick N+1 is never produced
//! before the wait for tick N returns.
//!
//! Lock order: control lock, then list lock, then a system's own lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::coprocessor::Coprocessor;
use crate::error::{RendererError, Result};
use crate::params::MAX_SESSIONS;
use crate::system::System;

/// Period of the scheduler thread.
pub const TICK_INTERVAL: Duration = Duration::from_millis(5);

/// A system as the scheduler and its owner share it.
pub type SharedSystem = Arc<Mutex<System>>;

/// Proof of registration, returned by [`SystemManager::add`] and consumed by
/// [`SystemManager::remove`].
#[derive(Debug, PartialEq, Eq)]
pub struct Registration {
    slot: usize,
}

impl Registration {
    /// Slot in the scheduler's list.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

struct SchedulerShared {
    systems: Mutex<Vec<Option<SharedSystem>>>,
    cancel: AtomicBool,
    ticks: AtomicU64,
}

/// The scheduler.
pub struct SystemManager {
    coprocessor: Arc<dyn Coprocessor>,
    control: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<SchedulerShared>,
    interval: Duration,
}

impl std::fmt::Debug for SystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemManager")
            .field("registered", &self.registered())
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

impl SystemManager {
    /// A scheduler that drives `coprocessor` every [`TICK_INTERVAL`].
    pub fn new(coprocessor: Arc<dyn Coprocessor>) -> Self {
        Self::with_interval(coprocessor, TICK_INTERVAL)
    }

    /// A scheduler with a custom tick period.
    pub fn with_interval(coprocessor: Arc<dyn Coprocessor>, interval: Duration) -> Self {
        Self {
            coprocessor,
            control: Mutex::new(None),
            shared: Arc::new(SchedulerShared {
                systems: Mutex::new(vec![None; MAX_SESSIONS]),
                cancel: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
            }),
            interval,
        }
    }

    /// Registers `system`. The first registration starts the thread.
    ///
    /// Fails with [`RendererError::MaxSystemsReached`] when every slot is
    /// taken.
    pub fn add(&self, system: SharedSystem) -> Result<Registration> {
        let mut thread = self.control.lock();
        let (slot, count) = {
            let mut systems = self.shared.systems.lock();
            let slot = systems
                .iter()
                .position(Option::is_none)
                .ok_or(RendererError::MaxSystemsReached)?;
            systems[slot] = Some(system);
            (slot, systems.iter().flatten().count())
        };
        tracing::debug!(slot, count, "scheduler: system registered");
        if count == 1 && thread.is_none() {
            *thread = Some(self.spawn()?);
        }
        Ok(Registration { slot })
    }

    /// Deregisters a system. The last removal stops the thread.
    ///
    /// Fails with [`RendererError::NotFound`] if the slot is already empty.
    pub fn remove(&self, registration: Registration) -> Result<()> {
        let mut thread = self.control.lock();
        let count = {
            let mut systems = self.shared.systems.lock();
            let entry = systems.get_mut(registration.slot).ok_or(RendererError::NotFound)?;
            if entry.take().is_none() {
                return Err(RendererError::NotFound);
            }
            systems.iter().flatten().count()
        };
        tracing::debug!(slot = registration.slot, count, "scheduler: system removed");
        if count == 0 {
            if let Some(handle) = thread.take() {
                self.join(handle);
            }
        }
        Ok(())
    }

    /// Systems currently registered.
    pub fn registered(&self) -> usize {
        self.shared.systems.lock().iter().flatten().count()
    }

    /// True while the thread runs.
    pub fn is_running(&self) -> bool {
        self.control.lock().is_some()
    }

    /// Ticks completed since construction.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    fn spawn(&self) -> Result<JoinHandle<()>> {
        self.shared.cancel.store(false, Ordering::Release);
        self.coprocessor.start();
        let shared = Arc::clone(&self.shared);
        let coprocessor = Arc::clone(&self.coprocessor);
        let interval = self.interval;
        std::thread::Builder::new()
            .name("audren-scheduler".into())
            .spawn(move || run(&shared, coprocessor.as_ref(), interval))
            .map_err(|e| {
                tracing::error!(error = %e, "scheduler: failed to spawn thread");
                self.coprocessor.stop();
                RendererError::InvalidState
            })
    }

    fn join(&self, handle: JoinHandle<()>) {
        self.shared.cancel.store(true, Ordering::Release);
        if handle.join().is_err() {
            tracing::error!("scheduler: thread panicked");
        }
        self.coprocessor.stop();
        tracing::debug!(ticks = self.ticks(), "scheduler: stopped");
    }
}

impl Drop for SystemManager {
    fn drop(&mut self) {
        if let Some(handle) = self.control.lock().take() {
            self.join(handle);
        }
    }
}

/// Produces one tick's jobs under the list lock.
fn produce(shared: &SchedulerShared, coprocessor: &dyn Coprocessor) {
    let systems = shared.systems.lock();
    for system in systems.iter().flatten() {
        if let Some(job) = system.lock().render_job() {
            coprocessor.submit(job);
        }
    }
}

fn run(shared: &SchedulerShared, coprocessor: &dyn Coprocessor, interval: Duration) {
    tracing::debug!(?interval, "scheduler: running");
    let mut deadline = Instant::now();
    loop {
        if shared.cancel.load(Ordering::Acquire) {
            break;
        }
        produce(shared, coprocessor);
        coprocessor.signal();
        coprocessor.wait();
        shared.ticks.fetch_add(1, Ordering::AcqRel);
        if shared.cancel.load(Ordering::Acquire) {
            break;
        }

        deadline += interval;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }
}
