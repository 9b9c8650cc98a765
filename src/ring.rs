//! Single-producer/single-consumer byte ring used by the element parsers.
//!
//! The source extends this buffer by inheritance; here a parser **owns** a
//! `FrameRing` (composition), matching the rest of this crate's avoidance of
//! base-class-style reuse.

/// A linear (non-circular) byte ring with a reserved `margin`.
///
/// `get()` always returns a contiguous slice: when the tail would run past
/// capacity, the live bytes are shifted down to the front first. The
/// `margin` is the minimum block size the ring promises to hand back in one
/// read once that many bytes are buffered.
pub struct FrameRing {
    buffer: Vec<u8>,
    capacity: usize,
    margin: usize,
    head: usize,
    tail: usize,
}

impl FrameRing {
    /// Creates a ring of total `capacity` bytes, guaranteeing `margin`-byte
    /// contiguous reads.
    pub fn new(capacity: usize, margin: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            capacity,
            margin,
            head: 0,
            tail: 0,
        }
    }

    /// Bytes currently buffered and unread.
    pub fn available(&self) -> usize {
        self.tail - self.head
    }

    /// Bytes that may still be `put` before the ring is full (accounting for
    /// the reserved margin).
    pub fn free(&self) -> usize {
        self.capacity
            .saturating_sub(self.available())
            .saturating_sub(self.margin)
    }

    /// Discards all buffered data.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Appends as much of `data` as fits, compacting first if needed.
    /// Returns the number of bytes actually stored; a short write signals
    /// the caller should `clear()` and resynchronize.
    pub fn put(&mut self, data: &[u8]) -> usize {
        if self.tail + data.len() > self.capacity && self.head > 0 {
            self.buffer.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }

        let room = self.capacity - self.tail;
        let count = data.len().min(room);
        self.buffer[self.tail..self.tail + count].copy_from_slice(&data[..count]);
        self.tail += count;
        count
    }

    /// Returns the currently buffered bytes without consuming them.
    pub fn get(&self) -> &[u8] {
        &self.buffer[self.head..self.tail]
    }

    /// Removes `count` bytes from the front of the buffer.
    pub fn del(&mut self, count: usize) {
        self.head = (self.head + count).min(self.tail);
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
    }
}
