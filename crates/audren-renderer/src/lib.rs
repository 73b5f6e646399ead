//! Audren Renderer - sessions, update protocol and command lists
//!
//! A client drives a session by sending update blobs; the renderer answers
//! each with a status blob and, once started, turns its state into one
//! command list per 5 ms tick. The lists run on the emulated coprocessor and
//! leave PCM16 in the device sinks.
//!
//! - [`Manager`] - Fixed pool of session ids
//! - [`AudioRenderer`] / [`System`] - One session and its state machine
//! - [`SystemManager`] - Scheduler thread for automatic-mode sessions
//! - [`AudioDsp`] / [`MockCoprocessor`] - Coprocessors that run the lists
//! - [`InfoUpdater`] - Update blob decoder
//! - [`command`] - Command list, estimator, generator and processor
//! - [`wire`] - Fixed-layout record codecs
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use audren_core::GuestAddr;
//! use audren_renderer::{
//!     AudioRenderer, ExecutionMode, FlatGuestMemory, Manager, MockCoprocessor, RendererParameters,
//!     SystemManager, UpdateRequest, UpdateResponse,
//! };
//!
//! let params = RendererParameters {
//!     execution_mode: ExecutionMode::Manual,
//!     ..Default::default()
//! };
//! let memory = Arc::new(FlatGuestMemory::new(GuestAddr::new(0x10_0000), 0x1000));
//! let renderer = AudioRenderer::open(
//!     Arc::new(Manager::new()),
//!     Arc::new(SystemManager::new(Arc::new(MockCoprocessor::new()))),
//!     &params,
//!     params.work_buffer_size(),
//!     1,
//!     memory,
//! )?;
//! renderer.start()?;
//!
//! let input = UpdateRequest::new(&params).encode()?;
//! let mut output = vec![0u8; UpdateResponse::size_for(&params)];
//! renderer.request_update(&input, &mut output, &mut [])?;
//! assert_eq!(renderer.frames_elapsed(), 1);
//! # Ok::<(), audren_renderer::RendererError>(())
//! ```

pub mod command;
pub mod coprocessor;
pub mod device;
pub mod effect;
pub mod error;
pub mod guest_memory;
pub mod manager;
pub mod memory_pool;
pub mod mix;
pub mod params;
pub mod performance;
pub mod renderer;
pub mod resources;
pub mod sink;
pub mod splitter;
pub mod system;
pub mod system_manager;
pub mod updater;
pub mod voice;
pub mod wire;

pub use command::{CommandGenerator, CommandList, CommandListProcessor, ProcessResult};
pub use coprocessor::{AudioDsp, Coprocessor, CoprocessorEvent, DspJob, MockCoprocessor};
pub use device::{DeviceName, device_names, list_device_names};
pub use error::{RendererError, Result};
pub use guest_memory::FlatGuestMemory;
pub use manager::Manager;
pub use memory_pool::PoolMapper;
pub use params::{ExecutionMode, MAX_SESSIONS, RendererParameters, TARGET_SAMPLE_COUNT, TARGET_SAMPLE_RATE};
pub use performance::PerformanceManager;
pub use renderer::AudioRenderer;
pub use resources::{DeviceOutput, RenderResources, SharedResources};
pub use system::{System, SystemState};
pub use system_manager::{Registration, SharedSystem, SystemManager, TICK_INTERVAL};
pub use updater::{InfoUpdater, UpdateTargets};
pub use wire::{UpdateRequest, UpdateResponse};
