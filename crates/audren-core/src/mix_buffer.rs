//! Flat per-tick sample storage shared by every command in a list.
//!
//! Buffer `i` occupies `[i * sample_count .. (i + 1) * sample_count)`. Indices
//! come from the command generator; the processor validates them against
//! [`MixBufferArena::buffer_count`] before any access.

#[cfg(not(feature = "std"))]
use alloc::vec;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// A flat arena of equally sized `i32` sample buffers.
#[derive(Debug, Clone)]
pub struct MixBufferArena {
    samples: Vec<i32>,
    buffer_count: usize,
    sample_count: usize,
}

impl MixBufferArena {
    /// Creates a zeroed arena.
    pub fn new(buffer_count: usize, sample_count: usize) -> Self {
        Self {
            samples: vec![0; buffer_count * sample_count],
            buffer_count,
            sample_count,
        }
    }

    /// Number of buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Samples per buffer.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// True if `index` names a buffer in this arena.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.buffer_count
    }

    /// Returns buffer `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= buffer_count()`.
    #[inline]
    pub fn get(&self, index: usize) -> &[i32] {
        let start = index * self.sample_count;
        &self.samples[start..start + self.sample_count]
    }

    /// Returns buffer `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= buffer_count()`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut [i32] {
        let start = index * self.sample_count;
        &mut self.samples[start..start + self.sample_count]
    }

    /// Borrows `src` immutably and `dst` mutably at the same time.
    ///
    /// Returns `None` when `src == dst`; callers handle the in-place case.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn get_ref_and_mut(&mut self, src: usize, dst: usize) -> Option<(&[i32], &mut [i32])> {
        if src == dst {
            return None;
        }
        let n = self.sample_count;
        if src < dst {
            let (head, tail) = self.samples.split_at_mut(dst * n);
            Some((&head[src * n..src * n + n], &mut tail[..n]))
        } else {
            let (head, tail) = self.samples.split_at_mut(src * n);
            Some((&tail[..n], &mut head[dst * n..dst * n + n]))
        }
    }

    /// Copies buffer `src` into buffer `dst`.
    pub fn copy(&mut self, src: usize, dst: usize) {
        if let Some((from, to)) = self.get_ref_and_mut(src, dst) {
            to.copy_from_slice(from);
        }
    }

    /// Zeroes buffer `index`.
    pub fn clear(&mut self, index: usize) {
        self.get_mut(index).fill(0);
    }

    /// Zeroes every buffer.
    pub fn clear_all(&mut self) {
        self.samples.fill(0);
    }

    /// The whole arena as one slice.
    pub fn as_slice(&self) -> &[i32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_disjoint() {
        let mut arena = MixBufferArena::new(3, 4);
        arena.get_mut(1).fill(7);
        assert_eq!(arena.get(0), &[0; 4]);
        assert_eq!(arena.get(1), &[7; 4]);
        assert_eq!(arena.get(2), &[0; 4]);
    }

    #[test]
    fn ref_and_mut_both_orders() {
        let mut arena = MixBufferArena::new(3, 2);
        arena.get_mut(0).copy_from_slice(&[1, 2]);
        arena.get_mut(2).copy_from_slice(&[5, 6]);
        {
            let (src, dst) = arena.get_ref_and_mut(0, 2).unwrap();
            assert_eq!(src, &[1, 2]);
            dst[0] = 9;
        }
        {
            let (src, dst) = arena.get_ref_and_mut(2, 0).unwrap();
            assert_eq!(src, &[9, 6]);
            dst[1] = 3;
        }
        assert_eq!(arena.get(0), &[1, 3]);
        assert!(arena.get_ref_and_mut(1, 1).is_none());
    }

    #[test]
    fn copy_and_clear() {
        let mut arena = MixBufferArena::new(2, 3);
        arena.get_mut(0).fill(4);
        arena.copy(0, 1);
        assert_eq!(arena.get(1), &[4; 3]);
        arena.clear_all();
        assert!(arena.as_slice().iter().all(|&s| s == 0));
    }
}
