//! Fixed-capacity sample store between the message context and the render tick.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::format::normalize;

/// Result of a [`SampleBuffer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Samples stored in the buffer.
    pub written: usize,
    /// Samples dropped from the end of the input because the buffer was full.
    pub dropped: usize,
}

impl WriteOutcome {
    /// Returns `true` if part of the input was dropped.
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }
}

/// A circular buffer of normalized mono samples.
///
/// Writes normalize 16-bit PCM into `[-1.0, 1.0)`; reads hand out the oldest
/// samples first. Capacity is fixed at construction and nothing allocates
/// afterwards.
///
/// The buffer has exactly one writer (the message context) and one reader
/// (the render tick). The two never run in the same scheduling turn, so the
/// owning bridge serializes them through `&mut self` rather than a lock.
///
/// The cursors are tracked alongside the ring so they can be observed: both
/// stay in `[0, capacity)` and advance by exactly the number of samples
/// stored or read.
pub struct SampleBuffer {
    ring: HeapRb<f32>,
    capacity: usize,
    read_cursor: usize,
    write_cursor: usize,
}

impl SampleBuffer {
    /// Creates an empty buffer holding up to `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Bridge configs reject that in
    /// `validate()` before a buffer is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample buffer capacity must be non-zero");
        Self {
            ring: HeapRb::new(capacity),
            capacity,
            read_cursor: 0,
            write_cursor: 0,
        }
    }

    /// Normalizes and appends `samples`.
    ///
    /// If the chunk is longer than the free space, only the leading
    /// `free_space()` samples are stored and the rest is reported as dropped.
    /// Zero-length input is a no-op.
    pub fn write(&mut self, samples: &[i16]) -> WriteOutcome {
        if samples.is_empty() {
            return WriteOutcome {
                written: 0,
                dropped: 0,
            };
        }

        let free = self.free_space();
        let accepted = samples.len().min(free);
        let written = self
            .ring
            .push_iter(samples[..accepted].iter().map(|&s| normalize(s)));

        self.write_cursor = (self.write_cursor + written) % self.capacity;

        WriteOutcome {
            written,
            dropped: samples.len() - written,
        }
    }

    /// Moves the oldest `out.len()` samples into `out`.
    ///
    /// Returns the number of samples read. The caller checks
    /// [`occupancy`](Self::occupancy) first; asking for more than is buffered
    /// is a logic error and only the available samples are read.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        debug_assert!(
            out.len() <= self.occupancy(),
            "read of {} samples with only {} buffered",
            out.len(),
            self.occupancy()
        );
        let read = self.ring.pop_slice(out);
        self.read_cursor = (self.read_cursor + read) % self.capacity;
        read
    }

    /// Discards all buffered audio, zero-fills the storage and rewinds both
    /// cursors to zero.
    pub fn reset(&mut self) {
        self.ring.clear();
        let (head, tail) = self.ring.vacant_slices_mut();
        for slot in head.iter_mut().chain(tail.iter_mut()) {
            slot.write(0.0);
        }
        self.read_cursor = 0;
        self.write_cursor = 0;
    }

    /// Number of samples currently buffered.
    pub fn occupancy(&self) -> usize {
        self.ring.occupied_len()
    }

    /// Number of samples that can be written before the buffer is full.
    pub fn free_space(&self) -> usize {
        self.ring.vacant_len()
    }

    /// Maximum number of samples the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position the next read starts from, in `[0, capacity)`.
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Position the next write starts at, in `[0, capacity)`.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("capacity", &self.capacity)
            .field("occupancy", &self.occupancy())
            .field("read_cursor", &self.read_cursor)
            .field("write_cursor", &self.write_cursor)
            .finish()
    }
}
