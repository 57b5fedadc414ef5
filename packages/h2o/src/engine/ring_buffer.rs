// fixed-capacity circular byte store backing an engine.

use bytes::BytesMut;


/// Fixed-capacity circular byte store
///
/// Performs no synchronization of its own. Within an engine, it is only ever touched while the
/// engine's lock is held.
pub(crate) struct RingBuffer {
    // memory layout:
    //
    // - `input` is the storage index the next put writes to
    // - `output` is the storage index the next get reads from
    // - the `size` storage indices starting at `output` (wrapping) hold buffered bytes
    //
    // invariants: size <= buf.len(), input < buf.len(), output < buf.len(),
    //             input == (output + size) % buf.len()
    buf: Box<[u8]>,
    input: usize,
    output: usize,
    size: usize,
}

impl RingBuffer {
    /// Construct empty with the given capacity in bytes.
    ///
    /// Panics if capacity is zero.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be non-zero");
        RingBuffer {
            buf: vec![0; capacity].into_boxed_slice(),
            input: 0,
            output: 0,
            size: 0,
        }
    }

    /// Maximum number of bytes that can be buffered.
    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes currently buffered.
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    /// Number of bytes that can be put before the buffer is full.
    pub(crate) fn remaining(&self) -> usize {
        self.capacity() - self.size
    }

    pub(crate) fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Put a byte at the back. Panics if full.
    pub(crate) fn put(&mut self, b: u8) {
        assert!(!self.is_full(), "RingBuffer::put on full buffer (internal bug)");
        self.buf[self.input] = b;
        self.input = (self.input + 1) % self.capacity();
        self.size += 1;
    }

    /// Get the byte at the front, if any.
    pub(crate) fn get(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let b = self.buf[self.output];
        self.output = (self.output + 1) % self.capacity();
        self.size -= 1;
        Some(b)
    }

    /// Put as much of `src` as fits, in order. Returns the number of bytes committed.
    pub(crate) fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        for &b in &src[..n] {
            self.put(b);
        }
        n
    }

    /// Get up to `n` bytes from the front, appending them to `dst` oldest first. Returns the
    /// number of bytes moved.
    pub(crate) fn read(&mut self, n: usize, dst: &mut BytesMut) -> usize {
        let n = n.min(self.size);
        dst.reserve(n);
        for _ in 0..n {
            match self.get() {
                Some(b) => dst.extend_from_slice(&[b]),
                None => unreachable!("RingBuffer size out of sync (internal bug)"),
            }
        }
        n
    }

    /// Drop up to `n` bytes from the front without copying them anywhere. Returns the number of
    /// bytes dropped.
    pub(crate) fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.size);
        self.output = (self.output + n) % self.capacity();
        self.size -= n;
        n
    }
}
