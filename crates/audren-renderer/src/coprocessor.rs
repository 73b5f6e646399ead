//! The emulated audio coprocessor.
//!
//! The scheduler submits one job per started system, signals, and waits.
//! [`AudioDsp`] runs the jobs on its own worker thread; [`MockCoprocessor`]
//! runs them inline and records the order of calls.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::command::{CommandList, CommandListProcessor, ProcessResult};
use crate::resources::SharedResources;

/// One command list and the resources it runs against.
#[derive(Debug)]
pub struct DspJob {
    /// Session the list belongs to.
    pub session_id: usize,
    /// Commands to run.
    pub list: CommandList,
    /// Processor-owned state of the session.
    pub resources: SharedResources,
    /// Processor settings of the session.
    pub processor: CommandListProcessor,
}

impl DspJob {
    /// Runs the list against its resources.
    pub fn run(&self) -> ProcessResult {
        let mut resources = self.resources.lock();
        self.processor.process(&self.list, &mut resources)
    }
}

/// Signal/wait interface of the coprocessor.
pub trait Coprocessor: Send + Sync {
    /// Brings the coprocessor up. Idempotent.
    fn start(&self);
    /// Shuts it down, joining any worker. Idempotent.
    fn stop(&self);
    /// Queues a job for the next signal.
    fn submit(&self, job: DspJob);
    /// Hands every queued job to the coprocessor.
    fn signal(&self);
    /// Blocks until the jobs of the last signal are done. Returns at once
    /// when nothing is outstanding or the coprocessor is stopped.
    fn wait(&self);
}

enum DspMessage {
    Render(Vec<DspJob>),
    Shutdown,
}

struct DspWorker {
    tx: Sender<DspMessage>,
    done: Receiver<usize>,
    handle: JoinHandle<()>,
}

/// Coprocessor backed by a worker thread.
#[derive(Default)]
pub struct AudioDsp {
    pending: Mutex<Vec<DspJob>>,
    worker: Mutex<Option<DspWorker>>,
    outstanding: Mutex<usize>,
}

impl std::fmt::Debug for AudioDsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDsp")
            .field("running", &self.worker.lock().is_some())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl AudioDsp {
    /// A stopped coprocessor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, as the scheduler takes it.
    pub fn shared() -> Arc<dyn Coprocessor> {
        Arc::new(Self::new())
    }
}

fn dsp_loop(rx: Receiver<DspMessage>, done: Sender<usize>) {
    while let Ok(message) = rx.recv() {
        match message {
            DspMessage::Render(jobs) => {
                for job in &jobs {
                    let result = job.run();
                    if result.dropped > 0 || result.skipped > 0 {
                        tracing::debug!(
                            session = job.session_id,
                            dropped = result.dropped,
                            skipped = result.skipped,
                            "dsp: list finished short"
                        );
                    }
                }
                if done.send(jobs.len()).is_err() {
                    break;
                }
            }
            DspMessage::Shutdown => break,
        }
    }
    tracing::debug!("dsp: worker exiting");
}

impl Coprocessor for AudioDsp {
    fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let (tx, rx) = unbounded();
        let (done_tx, done) = bounded(1);
        let spawned = std::thread::Builder::new()
            .name("audren-dsp".into())
            .spawn(move || dsp_loop(rx, done_tx));
        match spawned {
            Ok(handle) => {
                *worker = Some(DspWorker { tx, done, handle });
                tracing::debug!("dsp: started");
            }
            Err(e) => tracing::error!(error = %e, "dsp: failed to spawn worker"),
        }
    }

    fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.tx.send(DspMessage::Shutdown);
        if worker.handle.join().is_err() {
            tracing::error!("dsp: worker panicked");
        }
        *self.outstanding.lock() = 0;
        self.pending.lock().clear();
        tracing::debug!("dsp: stopped");
    }

    fn submit(&self, job: DspJob) {
        self.pending.lock().push(job);
    }

    fn signal(&self) {
        let jobs = std::mem::take(&mut *self.pending.lock());
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            tracing::warn!(jobs = jobs.len(), "dsp: signalled while stopped, jobs discarded");
            return;
        };
        if worker.tx.send(DspMessage::Render(jobs)).is_ok() {
            *self.outstanding.lock() += 1;
        }
    }

    fn wait(&self) {
        let done = match self.worker.lock().as_ref() {
            Some(worker) => worker.done.clone(),
            None => return,
        };
        let mut outstanding = self.outstanding.lock();
        while *outstanding > 0 {
            if done.recv().is_err() {
                *outstanding = 0;
                break;
            }
            *outstanding -= 1;
        }
    }
}

/// Calls a [`MockCoprocessor`] saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoprocessorEvent {
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `submit` for a session
    Submit(usize),
    /// `signal`, with the number of jobs handed over
    Signal(usize),
    /// `wait`
    Wait,
}

/// Inline coprocessor that records every call.
///
/// Jobs run on the signalling thread, so a `wait` always finds them done.
#[derive(Debug, Default)]
pub struct MockCoprocessor {
    events: Mutex<Vec<CoprocessorEvent>>,
    pending: Mutex<Vec<DspJob>>,
    results: Mutex<Vec<ProcessResult>>,
}

impl MockCoprocessor {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    pub fn events(&self) -> Vec<CoprocessorEvent> {
        self.events.lock().clone()
    }

    /// Results of every job run so far.
    pub fn results(&self) -> Vec<ProcessResult> {
        self.results.lock().clone()
    }
}

impl Coprocessor for MockCoprocessor {
    fn start(&self) {
        self.events.lock().push(CoprocessorEvent::Start);
    }

    fn stop(&self) {
        self.events.lock().push(CoprocessorEvent::Stop);
    }

    fn submit(&self, job: DspJob) {
        self.events.lock().push(CoprocessorEvent::Submit(job.session_id));
        self.pending.lock().push(job);
    }

    fn signal(&self) {
        let jobs = std::mem::take(&mut *self.pending.lock());
        self.events.lock().push(CoprocessorEvent::Signal(jobs.len()));
        let mut results = self.results.lock();
        results.extend(jobs.iter().map(DspJob::run));
    }

    fn wait(&self) {
        self.events.lock().push(CoprocessorEvent::Wait);
    }
}
