//! Circular delay line used by the delay and reverb effects.
//!
//! The line has a fixed capacity chosen at construction and a current delay
//! that may be shortened or lengthened up to that capacity without
//! reallocating. Writes land `delay` slots ahead of the read cursor, so a
//! sample written by [`DelayLine::tick`] comes back out `delay` ticks later.
//!
//! [`DelayLine::tap_out`] reads relative to the write cursor instead, which is
//! how early reflections sample a pre-delay line at several distances.

#[cfg(not(feature = "std"))]
use alloc::vec;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Fixed-capacity circular delay line.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    input: usize,
    output: usize,
    delay: usize,
    max_delay: usize,
}

impl DelayLine {
    /// Creates a zeroed line able to delay up to `max_delay` samples, with the
    /// delay set to `max_delay`.
    pub fn new(max_delay: usize) -> Self {
        let mut line = Self {
            buffer: vec![0.0; max_delay + 1],
            input: 0,
            output: 0,
            delay: 0,
            max_delay,
        };
        line.set_delay(max_delay);
        line
    }

    /// Creates a line sized for `max_ms` milliseconds at `sample_rate` Hz.
    pub fn from_time(max_ms: f32, sample_rate: f32) -> Self {
        Self::new(crate::math::ms_to_samples(max_ms, sample_rate) as usize)
    }

    /// Maximum delay in samples.
    pub fn max_delay(&self) -> usize {
        self.max_delay
    }

    /// Current delay in samples.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Changes the delay. Values above [`max_delay`](Self::max_delay) are
    /// ignored.
    pub fn set_delay(&mut self, delay: usize) {
        if delay > self.max_delay {
            return;
        }
        self.delay = delay;
        self.input = (self.output + delay) % self.buffer.len();
    }

    /// Sample at the read cursor.
    #[inline]
    pub fn read(&self) -> f32 {
        self.buffer[self.output]
    }

    /// Writes at the write cursor and advances it.
    #[inline]
    pub fn write(&mut self, value: f32) {
        self.buffer[self.input] = value;
        self.input = (self.input + 1) % self.buffer.len();
    }

    /// Writes `value`, then returns and advances past the read cursor.
    #[inline]
    pub fn tick(&mut self, value: f32) -> f32 {
        self.write(value);
        let out = self.read();
        self.output = (self.output + 1) % self.buffer.len();
        out
    }

    /// Sample written `index` writes ago; `0` is the most recent write.
    #[inline]
    pub fn tap_out(&self, index: usize) -> f32 {
        let len = self.buffer.len();
        let back = (index % len) + 1;
        self.buffer[(self.input + len - back) % len]
    }

    /// Zeroes the contents without touching the cursors.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}
