//! # Byte Ring Buffer
//!
//! Fixed-capacity single-producer / single-consumer byte queue.
//!
//! [`ring_buffer`] hands out exactly one [`RingProducer`] and one
//! [`RingConsumer`]. Neither half is `Clone`, so a second writer or reader
//! cannot be created after construction. The producer never blocks: when the
//! queue is full the byte is dropped and counted.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Capacity of the UART and radio ring buffers
pub const RING_CAPACITY: usize = 256;

struct Shared {
    slots: Box<[AtomicU8]>,
    /// Total bytes ever consumed (wrapping)
    read: AtomicUsize,
    /// Total bytes ever produced (wrapping)
    write: AtomicUsize,
    dropped: AtomicU64,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, cursor: usize) -> &AtomicU8 {
        &self.slots[cursor % self.capacity()]
    }
}

/// Create a ring buffer of `capacity` bytes and split it into its two halves
///
/// # Panics
///
/// Panics if `capacity` is zero.
///
/// # Examples
///
/// ```
/// use uwb_bridge::buffer::ring_buffer;
///
/// let (mut tx, mut rx) = ring_buffer(4);
/// assert!(tx.push(0x99));
/// assert_eq!(rx.pop(), Some(0x99));
/// ```
pub fn ring_buffer(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring buffer capacity must be non-zero");

    let slots = (0..capacity).map(|_| AtomicU8::new(0)).collect();
    let shared = Arc::new(Shared {
        slots,
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });

    (
        RingProducer { shared: Arc::clone(&shared) },
        RingConsumer { shared },
    )
}

/// Writing half of a ring buffer
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Append one byte
    ///
    /// Returns `false` (and counts a drop) if the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);

        if write.wrapping_sub(read) >= self.shared.capacity() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("ring buffer full, dropped byte 0x{:02X}", byte);
            return false;
        }

        self.shared.slot(write).store(byte, Ordering::Relaxed);
        self.shared.write.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Append a slice, returning how many bytes were stored
    ///
    /// Bytes that do not fit are dropped individually.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&b| self.push(b)).count()
    }

    /// Free space in bytes
    pub fn free(&self) -> usize {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        self.shared.capacity() - write.wrapping_sub(read)
    }

    /// Number of bytes dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Reading half of a ring buffer
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        let write = self.shared.write.load(Ordering::Acquire);
        let read = self.shared.read.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    /// Returns `true` if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look at the byte `offset` positions from the head without consuming it
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset >= self.len() {
            return None;
        }

        let read = self.shared.read.load(Ordering::Relaxed);
        Some(self.shared.slot(read.wrapping_add(offset)).load(Ordering::Relaxed))
    }

    /// Remove and return the head byte
    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.advance(1);
        Some(byte)
    }

    /// Remove `n` bytes into a new vector
    ///
    /// Returns `None` without consuming anything if fewer than `n` bytes are
    /// buffered.
    pub fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if n > self.len() {
            return None;
        }

        let bytes = (0..n).filter_map(|i| self.peek(i)).collect();
        self.advance(n);
        Some(bytes)
    }

    /// Discard up to `n` bytes, returning how many were discarded
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        self.advance(n);
        n
    }

    /// Number of bytes the producer has dropped
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn advance(&mut self, n: usize) {
        let read = self.shared.read.load(Ordering::Relaxed);
        self.shared.read.store(read.wrapping_add(n), Ordering::Release);
    }
}

impl std::fmt::Debug for RingConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingConsumer")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
