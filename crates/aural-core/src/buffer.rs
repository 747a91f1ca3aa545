//! Byte ring buffer with contiguous access windows.
//!
//! Zero-copy producers write into [`ByteBuffer::write_window`] and commit with
//! [`ByteBuffer::advance_write`]; consumers mirror that on the read side.
//! Windows are truncated at the wrap point, so a full drain may take two
//! passes.

/// A fixed-capacity byte ring.
#[derive(Debug)]
pub struct ByteBuffer {
    data: Vec<u8>,
    write_idx: usize,
    read_idx: usize,
    level: usize,
}

impl ByteBuffer {
    /// Create a ring holding `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        ByteBuffer {
            data: vec![0; capacity],
            write_idx: 0,
            read_idx: 0,
            level: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes queued and not yet read.
    pub fn queued(&self) -> usize {
        self.level
    }

    /// Bytes that can still be written before the ring is full.
    pub fn available(&self) -> usize {
        self.data.len() - self.level
    }

    /// Contiguous bytes writable from the current write index.
    pub fn writable(&self) -> usize {
        self.available().min(self.data.len() - self.write_idx)
    }

    /// Contiguous bytes readable from the current read index.
    pub fn readable(&self) -> usize {
        self.level.min(self.data.len() - self.read_idx)
    }

    /// Mutable window for the next write, up to [`Self::writable`] bytes.
    pub fn write_window(&mut self) -> &mut [u8] {
        let len = self.writable();
        let start = self.write_idx;
        &mut self.data[start..start + len]
    }

    /// Commit `n` written bytes. `n` must not exceed [`Self::writable`].
    pub fn advance_write(&mut self, n: usize) {
        debug_assert!(n <= self.writable());
        self.write_idx = (self.write_idx + n) % self.data.len();
        self.level += n;
    }

    /// Window over the next readable bytes, up to [`Self::readable`] bytes.
    pub fn read_window(&self) -> &[u8] {
        &self.data[self.read_idx..self.read_idx + self.readable()]
    }

    /// Consume `n` read bytes. `n` must not exceed [`Self::readable`].
    pub fn advance_read(&mut self, n: usize) {
        debug_assert!(n <= self.readable());
        self.read_idx = (self.read_idx + n) % self.data.len();
        self.level -= n;
    }

    /// Drop all queued bytes and rewind both indices.
    pub fn reset(&mut self) {
        self.write_idx = 0;
        self.read_idx = 0;
        self.level = 0;
    }

    /// Write zeros for up to `n` bytes, bounded by the writable space.
    /// Returns the number of bytes actually written.
    pub fn fill_zeros(&mut self, n: usize) -> usize {
        let mut remaining = n.min(self.available());
        let filled = remaining;
        while remaining > 0 {
            let chunk = remaining.min(self.writable());
            self.write_window()[..chunk].fill(0);
            self.advance_write(chunk);
            remaining -= chunk;
        }
        filled
    }
}
