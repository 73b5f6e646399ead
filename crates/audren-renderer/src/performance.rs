//! Per-tick timing history returned to the client.
//!
//! Each generated command list brackets every voice, mix and sink with
//! performance commands. The processor stamps start and end times into the
//! current frame's entries; at the next generation the frame moves into the
//! history ring, and the update path copies the history out in the
//! revision's frame layout:
//!
//! ```text
//! [header][entry * entry_count][detail * detail_count] ... [null header]
//! ```

use std::collections::VecDeque;

use audren_core::{PerformanceFormat, WireError, Writer, make_magic};

/// Frame header magic.
pub const PERFORMANCE_MAGIC: u32 = make_magic(b'P', b'E', b'R', b'F');

/// Detail entries recorded per frame.
pub const MAX_DETAIL_ENTRIES: usize = 100;

/// What a performance entry measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PerformanceEntryType {
    /// Unused.
    #[default]
    Invalid = 0,
    /// A voice.
    Voice = 1,
    /// A sub-mix.
    SubMix = 2,
    /// The final mix.
    FinalMix = 3,
    /// A sink.
    Sink = 4,
}

/// Timing of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceEntry {
    /// Node measured.
    pub node_id: u32,
    /// Microseconds from the start of processing.
    pub start_time: u32,
    /// Microseconds spent.
    pub processed_time: u32,
    /// Kind of node.
    pub entry_type: PerformanceEntryType,
}

/// Timing of one command inside the detail target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceDetail {
    /// Node measured.
    pub node_id: u32,
    /// Microseconds from the start of processing.
    pub start_time: u32,
    /// Microseconds spent.
    pub processed_time: u32,
    /// Command kind, as its detail code.
    pub detail_type: u8,
    /// Kind of node the command belongs to.
    pub entry_type: PerformanceEntryType,
}

/// One tick's measurements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerformanceFrame {
    /// Node timings.
    pub entries: Vec<PerformanceEntry>,
    /// Command timings of the detail target.
    pub details: Vec<PerformanceDetail>,
    /// Microseconds spent on the whole list.
    pub total_processing_time: u32,
    /// Voices the generator dropped.
    pub voices_dropped: u32,
    /// Microseconds since the manager was created, at generation.
    pub start_time: u64,
    /// Tick counter.
    pub frame_index: u32,
    /// The list overran its time budget.
    pub render_time_exceeded: bool,
    /// Commands dropped for lack of time.
    pub commands_dropped: u32,
}

struct Layout {
    header: usize,
    entry: usize,
    detail: usize,
}

fn layout(format: PerformanceFormat) -> Layout {
    match format {
        PerformanceFormat::V1 => Layout {
            header: 0x18,
            entry: 0x10,
            detail: 0x10,
        },
        PerformanceFormat::V2 => Layout {
            header: 0x30,
            entry: 0x18,
            detail: 0x18,
        },
    }
}

impl PerformanceFrame {
    /// Encoded bytes in `format`.
    pub fn encoded_size(&self, format: PerformanceFormat) -> usize {
        let l = layout(format);
        l.header + self.entries.len() * l.entry + self.details.len() * l.detail
    }

    fn encode(&self, w: &mut Writer<'_>, format: PerformanceFormat) -> Result<(), WireError> {
        let l = layout(format);
        let next_offset = self.encoded_size(format) as u32;
        w.u32(PERFORMANCE_MAGIC)?;
        w.u32(self.entries.len() as u32)?;
        w.u32(self.details.len() as u32)?;
        w.u32(next_offset)?;
        w.u32(self.total_processing_time)?;
        match format {
            PerformanceFormat::V1 => w.u32(self.frame_index)?,
            PerformanceFormat::V2 => {
                w.u32(self.voices_dropped)?;
                w.u64(self.start_time)?;
                w.u32(self.frame_index)?;
                w.bool(self.render_time_exceeded)?;
                w.zeros(3)?;
                w.u32(self.commands_dropped)?;
                w.zeros(4)?;
            }
        }
        for e in &self.entries {
            w.u32(e.node_id)?;
            w.u32(e.start_time)?;
            w.u32(e.processed_time)?;
            w.u8(e.entry_type as u8)?;
            w.zeros(l.entry - 13)?;
        }
        for d in &self.details {
            w.u32(d.node_id)?;
            w.u32(d.start_time)?;
            w.u32(d.processed_time)?;
            w.u8(d.detail_type)?;
            w.u8(d.entry_type as u8)?;
            w.zeros(l.detail - 14)?;
        }
        Ok(())
    }
}

/// Slot a performance command stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceSlot {
    /// A node entry.
    Entry(usize),
    /// A command detail.
    Detail(usize),
}

/// Records timings and keeps the history ring.
#[derive(Debug, Clone)]
pub struct PerformanceManager {
    format: PerformanceFormat,
    entries_per_frame: usize,
    history_capacity: usize,
    history: VecDeque<PerformanceFrame>,
    current: PerformanceFrame,
    frame_index: u32,
    started: bool,
    detail_target: u32,
}

impl PerformanceManager {
    /// A manager keeping `frame_count` frames of up to `entries_per_frame`
    /// entries each.
    pub fn new(format: PerformanceFormat, entries_per_frame: usize, frame_count: usize) -> Self {
        Self {
            format,
            entries_per_frame,
            history_capacity: frame_count.max(1),
            history: VecDeque::new(),
            current: PerformanceFrame::default(),
            frame_index: 0,
            started: false,
            detail_target: 0,
        }
    }

    /// Layout of copied frames.
    pub fn format(&self) -> PerformanceFormat {
        self.format
    }

    /// Frames waiting to be copied out.
    pub fn pending_frames(&self) -> usize {
        self.history.len()
    }

    /// Node whose commands get detail entries.
    pub fn set_detail_target(&mut self, node_id: u32) {
        self.detail_target = node_id;
    }

    /// True if `node_id` is the detail target.
    pub fn is_detail_target(&self, node_id: u32) -> bool {
        self.detail_target != 0 && self.detail_target == node_id
    }

    /// Closes the current frame into the history and opens the next one.
    ///
    /// The oldest frame is dropped when the ring is full.
    pub fn tap_frame(&mut self, start_time: u64) {
        if self.started {
            let frame = std::mem::take(&mut self.current);
            if self.history.len() == self.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(frame);
        }
        self.started = true;
        self.current.start_time = start_time;
        self.current.frame_index = self.frame_index;
        self.frame_index = self.frame_index.wrapping_add(1);
    }

    /// Reserves a node entry in the current frame.
    pub fn next_entry(&mut self, entry_type: PerformanceEntryType, node_id: u32) -> Option<PerformanceSlot> {
        if self.current.entries.len() >= self.entries_per_frame {
            return None;
        }
        self.current.entries.push(PerformanceEntry {
            node_id,
            entry_type,
            ..Default::default()
        });
        Some(PerformanceSlot::Entry(self.current.entries.len() - 1))
    }

    /// Reserves a detail entry in the current frame.
    pub fn next_detail(&mut self, detail_type: u8, entry_type: PerformanceEntryType, node_id: u32) -> Option<PerformanceSlot> {
        if self.current.details.len() >= MAX_DETAIL_ENTRIES {
            return None;
        }
        self.current.details.push(PerformanceDetail {
            node_id,
            detail_type,
            entry_type,
            ..Default::default()
        });
        Some(PerformanceSlot::Detail(self.current.details.len() - 1))
    }

    /// True if `slot` exists in the current frame.
    pub fn contains(&self, slot: PerformanceSlot) -> bool {
        match slot {
            PerformanceSlot::Entry(i) => i < self.current.entries.len(),
            PerformanceSlot::Detail(i) => i < self.current.details.len(),
        }
    }

    /// Stamps the start of `slot`, in microseconds from list start.
    pub fn record_start(&mut self, slot: PerformanceSlot, time_us: u32) {
        match slot {
            PerformanceSlot::Entry(i) => {
                if let Some(e) = self.current.entries.get_mut(i) {
                    e.start_time = time_us;
                }
            }
            PerformanceSlot::Detail(i) => {
                if let Some(d) = self.current.details.get_mut(i) {
                    d.start_time = time_us;
                }
            }
        }
    }

    /// Stamps the end of `slot`, in microseconds from list start.
    pub fn record_stop(&mut self, slot: PerformanceSlot, time_us: u32) {
        match slot {
            PerformanceSlot::Entry(i) => {
                if let Some(e) = self.current.entries.get_mut(i) {
                    e.processed_time = time_us.saturating_sub(e.start_time);
                }
            }
            PerformanceSlot::Detail(i) => {
                if let Some(d) = self.current.details.get_mut(i) {
                    d.processed_time = time_us.saturating_sub(d.start_time);
                }
            }
        }
    }

    /// Records the outcome of the list the current frame measured.
    pub fn set_frame_result(&mut self, total_us: u32, voices_dropped: u32, commands_dropped: u32, exceeded: bool) {
        self.current.total_processing_time = total_us;
        self.current.voices_dropped = voices_dropped;
        self.current.commands_dropped = commands_dropped;
        self.current.render_time_exceeded = exceeded;
    }

    /// The frame being measured.
    pub fn current(&self) -> &PerformanceFrame {
        &self.current
    }

    /// Copies pending frames into `out`, oldest first, and returns the
    /// bytes written.
    ///
    /// Frames that do not fit stay pending. A zeroed header terminates the
    /// list when room remains.
    pub fn copy_histories(&mut self, out: &mut [u8]) -> u32 {
        let header = layout(self.format).header;
        let mut w = Writer::new(out);
        while let Some(frame) = self.history.front() {
            if frame.encoded_size(self.format) > w.remaining() {
                break;
            }
            if let Err(e) = frame.encode(&mut w, self.format) {
                tracing::warn!(error = %e, "performance frame copy failed");
                break;
            }
            self.history.pop_front();
        }
        let written = w.offset();
        if w.remaining() >= header && w.zeros(header).is_err() {
            tracing::warn!("performance terminator did not fit");
        }
        written as u32
    }
}
